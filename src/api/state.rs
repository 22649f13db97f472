use crate::AppCore;
use std::sync::Arc;

/// Application state shared across all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<AppCore>,
}

impl AppState {
    pub fn new(core: Arc<AppCore>) -> Self {
        Self { core }
    }
}
