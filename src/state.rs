use std::sync::Arc;

use crate::config::Config;
use crate::db::database::Database;

/// Everything a flow needs for one session: the injected configuration and
/// the key-value store.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    /// True when the configured store could not be opened and an in-memory
    /// one is used instead.
    pub degraded: bool,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: Database) -> Self {
        AppState {
            config,
            db,
            degraded: false,
        }
    }

    pub fn degraded(config: Arc<Config>, db: Database) -> Self {
        AppState {
            config,
            db,
            degraded: true,
        }
    }
}
