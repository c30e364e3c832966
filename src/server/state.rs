//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::memory::engine::MemoryBridge;
use crate::memory::telemetry::Telemetry;

/// Shared application state.
pub struct AppState {
    /// Recall/capture pipeline observed by the dashboard.
    pub bridge: Arc<MemoryBridge>,
}

impl AppState {
    /// Wrap a bridge.
    #[must_use]
    pub fn new(bridge: Arc<MemoryBridge>) -> Arc<Self> {
        Arc::new(Self { bridge })
    }

    /// Telemetry of the wrapped bridge.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        self.bridge.telemetry()
    }
}
