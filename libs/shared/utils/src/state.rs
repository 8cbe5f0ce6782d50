use std::sync::Arc;

use chrono_tz::Tz;

use shared_config::AppConfig;
use shared_database::DbPool;

/// Shared handler state: immutable configuration plus the connection pool.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            db,
        })
    }

    pub fn display_zone(&self) -> Tz {
        self.config.display_timezone
    }
}
