use crate::config::EngineConfig;
use crate::runtime::{EventLoop, Offload};
use crate::view::ViewRenderer;
use std::sync::Arc;

/// Process-wide services shared by every request on one event loop.
pub struct AppContext {
    pub event_loop: EventLoop,
    pub views: Option<Arc<dyn ViewRenderer>>,
    pub offload: Option<Offload>,
    pub config: EngineConfig,
}

impl AppContext {
    pub fn new(event_loop: EventLoop) -> Self {
        Self {
            event_loop,
            views: None,
            offload: None,
            config: EngineConfig::default(),
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("views", &self.views.is_some())
            .field("offload", &self.offload.is_some())
            .field("config", &self.config)
            .finish()
    }
}
