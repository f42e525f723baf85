use std::sync::Arc;

use crate::batch::TaskManager;
use crate::config::Config;

pub mod batch;
pub mod classify;
pub mod error;
pub mod health;
pub mod routes;

pub use error::ErrorResponse;

// ============================================
// Application State
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskManager,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            tasks: TaskManager::new(config.registry_limits()),
            config: Arc::new(config),
        }
    }
}
