//! Application state for the API server

use crate::{Config, Dispatcher};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; both fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the running dispatcher
    pub dispatcher: Dispatcher,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(dispatcher: Dispatcher, config: Arc<Config>) -> Self {
        Self { dispatcher, config }
    }
}
