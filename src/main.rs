use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use castbill::config::Config;
use castbill::db::{create_pool, init_db, queries, AppState};
use castbill::handlers;
use castbill::models::{CreatePrice, Profile, Visibility, CAN_PUBLISH_PROFILE};
use castbill::notify::EmailService;

#[derive(Parser, Debug)]
#[command(name = "castbill")]
#[command(about = "Billing, entitlement, and notification core for a casting marketplace")]
struct Cli {
    /// Seed the database with dev data (publication price, demo user with an
    /// approved private profile)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with dev data for manual testing: one publication
/// price and a demo user whose approved profile is private, ready to be
/// auto-published by a paid checkout.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    // The demo user's prefs row doubles as the seeded marker.
    let marker = queries::get_notification_prefs(&conn, "user_demo")
        .expect("Failed to query seed marker");
    if marker.updated_at != 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let price = queries::create_price(
        &conn,
        &CreatePrice {
            entitlement_key: CAN_PUBLISH_PROFILE.to_string(),
            plan_id: "profile_publication".to_string(),
            amount: 5_000_000,
            currency: "vnd".to_string(),
            period_days: 30,
            active: true,
        },
    )
    .expect("Failed to create dev price");

    queries::upsert_profile(
        &conn,
        &Profile {
            user_id: "user_demo".to_string(),
            visibility: Visibility::Private,
            approved: true,
            published_at: None,
            unpublished_reason: None,
        },
    )
    .expect("Failed to create dev profile");

    queries::upsert_notification_prefs(&conn, "user_demo", Some("demo@castbill.vn"), true, true)
        .expect("Failed to create dev prefs");

    tracing::info!("============================================");
    tracing::info!("SEEDED DEV DATA");
    tracing::info!("Price: {} (5,000,000 VND / 30 days)", price.id);
    tracing::info!("User: user_demo (approved private profile)");
    tracing::info!("============================================");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "castbill=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.simulation_enabled {
        tracing::warn!("Webhook SIMULATION endpoint is enabled - never do this in production");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let mailer = Arc::new(EmailService::new(&config));
    let state = AppState {
        db: db_pool,
        config: config.clone(),
        mailer,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set CASTBILL_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = Router::new()
        // Public endpoints (rate-limited per IP)
        .merge(handlers::public_router())
        // Provider callbacks (signature-verified)
        .merge(handlers::webhook_router())
        // Shared-secret surface (cron triggers, refunds)
        .merge(handlers::internal_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("castbill server listening on {}", addr);

    // connect-info is needed for IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&config.database_path) {
            tracing::warn!("Failed to remove {}: {}", config.database_path, e);
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
