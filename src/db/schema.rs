use rusqlite::Connection;

/// Initialize the ledger schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;

        -- Prices (read-only here; managed by admin tooling)
        CREATE TABLE IF NOT EXISTS prices (
            id TEXT PRIMARY KEY,
            entitlement_key TEXT NOT NULL,
            plan_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            period_days INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );

        -- Checkout sessions (terminal states only via webhook or sweep)
        CREATE TABLE IF NOT EXISTS checkout_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            provider TEXT NOT NULL CHECK (provider IN ('vnpay', 'momo', 'zalopay')),
            price_id TEXT NOT NULL REFERENCES prices(id),
            status TEXT NOT NULL CHECK (status IN ('started', 'pending', 'success', 'failed', 'expired')),
            redirect_url TEXT,
            return_url TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user_price ON checkout_sessions(user_id, price_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_sessions_sweep ON checkout_sessions(created_at)
            WHERE status IN ('started', 'pending');

        -- Payments (ledger; never deleted, only transitioned)
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            checkout_session_id TEXT REFERENCES checkout_sessions(id),
            provider TEXT NOT NULL,
            provider_ref TEXT NOT NULL,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'paid', 'failed', 'refunded', 'refunded_partial')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(provider, provider_ref)
        );
        CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id);
        CREATE INDEX IF NOT EXISTS idx_payments_session ON payments(checkout_session_id);

        -- Invoices (total is signed; negative for refunds)
        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY,
            payment_id TEXT REFERENCES payments(id),
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('sale', 'refund')),
            total INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('draft', 'open', 'paid', 'void', 'refunded')),
            number TEXT UNIQUE,
            issued_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_invoices_payment ON invoices(payment_id);
        CREATE INDEX IF NOT EXISTS idx_invoices_user ON invoices(user_id);

        -- Invoice numbers are assigned from a per-year counter on finalization
        CREATE TABLE IF NOT EXISTS invoice_counters (
            year INTEGER PRIMARY KEY,
            next_seq INTEGER NOT NULL
        );

        -- Subscriptions (one row per user+plan, extended on renewal)
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            plan_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('active', 'renewing', 'expired', 'canceled')),
            cancel_at_period_end INTEGER NOT NULL DEFAULT 0,
            started_at INTEGER NOT NULL,
            ends_at INTEGER NOT NULL,
            UNIQUE(user_id, plan_id)
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_ending ON subscriptions(ends_at)
            WHERE status IN ('active', 'renewing');

        -- Entitlements (upserted, never deleted; expires_at = now means revoked)
        CREATE TABLE IF NOT EXISTS entitlements (
            user_id TEXT NOT NULL,
            key TEXT NOT NULL,
            expires_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, key)
        );

        -- Casting profile visibility (content-store collaborator surface)
        CREATE TABLE IF NOT EXISTS profiles (
            user_id TEXT PRIMARY KEY,
            visibility TEXT NOT NULL CHECK (visibility IN ('public', 'private')),
            approved INTEGER NOT NULL DEFAULT 0,
            published_at INTEGER,
            unpublished_reason TEXT
        );

        -- Append-only notification delivery ledger, keyed by dedupe hash
        CREATE TABLE IF NOT EXISTS notification_message_log (
            id TEXT PRIMARY KEY,
            dedupe_hash TEXT NOT NULL,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('queued', 'sent', 'failed')),
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_message_log_hash ON notification_message_log(dedupe_hash, created_at DESC);

        -- Deferred delivery jobs for the retry queue
        CREATE TABLE IF NOT EXISTS notification_jobs (
            id TEXT PRIMARY KEY,
            log_id TEXT NOT NULL REFERENCES notification_message_log(id),
            channel TEXT NOT NULL CHECK (channel IN ('email', 'inapp')),
            recipient TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'failed')),
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            run_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_due ON notification_jobs(run_at)
            WHERE status = 'pending';

        -- In-app notifications (written synchronously, read by the UI layer)
        CREATE TABLE IF NOT EXISTS inapp_notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            read_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_inapp_user ON inapp_notifications(user_id, created_at DESC);

        -- Per-user channel preferences
        CREATE TABLE IF NOT EXISTS notification_prefs (
            user_id TEXT PRIMARY KEY,
            email TEXT,
            email_enabled INTEGER NOT NULL DEFAULT 1,
            inapp_enabled INTEGER NOT NULL DEFAULT 1,
            updated_at INTEGER NOT NULL
        );

        -- Outbox for post-commit entitlement sync; written inside the same
        -- transaction as the ledger mutation, drained post-commit and by sweeps
        CREATE TABLE IF NOT EXISTS sync_backlog (
            user_id TEXT PRIMARY KEY,
            enqueued_at INTEGER NOT NULL
        );

        -- Persisted sweep guards (no in-process mutable state)
        CREATE TABLE IF NOT EXISTS cron_watermarks (
            name TEXT PRIMARY KEY,
            last_run_at INTEGER NOT NULL
        );

        -- Enforcement / refund audit trail
        CREATE TABLE IF NOT EXISTS audit_events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            action TEXT NOT NULL,
            details TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_events_user ON audit_events(user_id, created_at DESC);
        "#,
    )?;
    Ok(())
}
