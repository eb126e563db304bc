use std::sync::Arc;

use runbox_agent::{ProcessManager, ScriptStore, SpawnQueue};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub manager: ProcessManager,
    pub queue: SpawnQueue,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(manager: ProcessManager, config: ServerConfig) -> Self {
        let queue = SpawnQueue::new(manager.clone());
        Self {
            manager,
            queue,
            config: Arc::new(config),
        }
    }

    pub fn scripts(&self) -> &ScriptStore {
        self.manager.scripts()
    }
}
