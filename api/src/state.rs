use std::sync::Arc;
use std::time::Duration;

use evalgate_core::upstream::UpstreamConfigStatus;
use evalgate_mcp_runtime::{
    SessionReaper, SessionRouter, SessionStore, ToolDispatcher, ToolRegistry, UpstreamClient,
};

#[derive(Clone)]
pub struct AppState {
    pub router: SessionRouter,
}

impl AppState {
    /// Wire registry, dispatcher, store and router around an upstream client.
    /// The returned reaper must be spawned by the caller; it also expires
    /// sessions idle for longer than `idle_ttl`.
    pub fn new(upstream: Arc<dyn UpstreamClient>, idle_ttl: Duration) -> (Self, SessionReaper) {
        let dispatcher = Arc::new(ToolDispatcher::new(
            Arc::new(ToolRegistry::builtin()),
            upstream,
        ));
        let (store, reaper) = SessionStore::with_idle_ttl(dispatcher, idle_ttl);
        (
            Self {
                router: SessionRouter::new(store),
            },
            reaper,
        )
    }

    pub fn store(&self) -> &SessionStore {
        self.router.store()
    }

    pub fn upstream_status(&self) -> UpstreamConfigStatus {
        self.store().dispatcher().upstream_status()
    }
}
