//! castbill - billing, entitlement, and notification core for a casting marketplace
//!
//! This library provides the payment checkout flow, idempotent webhook
//! reconciliation into the payment/invoice ledger, entitlement derivation with
//! cascading content-visibility enforcement, and a deduplicated, retried
//! notification queue.

pub mod checkout;
pub mod config;
pub mod db;
pub mod enforcement;
pub mod entitlements;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod models;
pub mod notify;
pub mod providers;
pub mod rate_limit;
pub mod reconcile;
pub mod token;
