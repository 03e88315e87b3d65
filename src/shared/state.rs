use crate::config::AppConfig;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig) -> Self {
        Self { conn, config }
    }
}

pub fn create_pool(database_url: &str) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().max_size(16).build(manager)
}
