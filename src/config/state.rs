// Application state module
// Immutable per-process state shared by every connection

use std::sync::Arc;
use tokio::sync::Notify;

use super::types::Config;
use crate::dispatch::Dispatcher;

/// Application state
///
/// Built once at startup and only read afterwards; requests never mutate it.
pub struct AppState {
    pub config: Config,
    pub dispatcher: Dispatcher,
    /// Fired by the signal handler to stop accepting connections
    pub shutdown_signal: Arc<Notify>,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher,
            shutdown_signal: Arc::new(Notify::new()),
        }
    }

    pub fn access_log_enabled(&self) -> bool {
        self.config.logging.access_log
    }
}
