mod schema;
pub mod from_row;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::notify::Mailer;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the ledger pool and configuration.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    /// Email delivery seam; production uses `EmailService`, tests use mocks.
    pub mailer: Arc<dyn Mailer>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
