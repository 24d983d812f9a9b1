//! Application State

use std::collections::HashMap;
use std::sync::Arc;

use dispatch_core::{
    DispatchConfig, Dispatcher, EngineRegistry, MemorySessionStore, SessionId, ToolRegistry,
};
use tokio::sync::{Mutex, RwLock};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Current engine registry; refreshing swaps in a new one
    registry: Arc<RwLock<Arc<EngineRegistry>>>,

    pub store: Arc<MemorySessionStore>,

    /// Local tools offered to every session
    pub tools: Arc<ToolRegistry>,

    pub dispatch: DispatchConfig,

    /// One dispatch at a time per session
    session_locks: Arc<Mutex<HashMap<SessionId, Arc<Mutex<()>>>>>,
}

impl AppState {
    pub fn new(
        registry: EngineRegistry,
        store: Arc<MemorySessionStore>,
        tools: Arc<ToolRegistry>,
        dispatch: DispatchConfig,
    ) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Arc::new(registry))),
            store,
            tools,
            dispatch,
            session_locks: Arc::default(),
        }
    }

    pub async fn registry(&self) -> Arc<EngineRegistry> {
        self.registry.read().await.clone()
    }

    pub async fn replace_registry(&self, registry: EngineRegistry) -> Arc<EngineRegistry> {
        let registry = Arc::new(registry);
        *self.registry.write().await = registry.clone();
        registry
    }

    /// Dispatcher bound to the current registry
    pub async fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.registry().await,
            self.store.clone(),
            self.tools.clone(),
            self.dispatch.clone(),
        )
    }

    pub async fn session_lock(&self, id: &SessionId) -> Arc<Mutex<()>> {
        self.session_locks
            .lock()
            .await
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// Forget a session's lock once no request holds or waits on it
    ///
    /// Callers drop their handle from [`Self::session_lock`] first.
    pub async fn release_session_lock(&self, id: &SessionId) {
        let mut locks = self.session_locks.lock().await;
        if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }
}
