use crate::shared::error::LibsResult;
use crate::shared::types::{InstanceState, RunningLibraryInstance};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use labperiph_runtime::ContainerRuntime;

#[cfg(test)]
pub(crate) mod fake;

/// Storage for running instances and per-library start counters
#[async_trait]
pub trait RunningRepository: Send + Sync {
    /// Take the next counter value for `name`. Values are never reused.
    async fn next_counter(&self, name: &str) -> LibsResult<u64>;

    async fn insert(&self, instance: RunningLibraryInstance) -> LibsResult<()>;

    /// First running instance backed by the library `name`
    async fn find_by_name(&self, name: &str) -> LibsResult<Option<RunningLibraryInstance>>;

    async fn get(&self, id: &str) -> LibsResult<Option<RunningLibraryInstance>>;

    async fn set_state(&self, id: &str, state: InstanceState) -> LibsResult<bool>;

    async fn remove(&self, id: &str) -> LibsResult<Option<RunningLibraryInstance>>;

    async fn list(&self) -> LibsResult<Vec<RunningLibraryInstance>>;
}

#[derive(Default)]
struct HostingState {
    running: HashMap<String, RunningLibraryInstance>,
    counters: HashMap<String, u64>,
}

/// In-memory running map; the map and the counters share one lock.
#[derive(Clone, Default)]
pub struct InMemoryRunningRepository {
    state: Arc<Mutex<HostingState>>,
}

impl InMemoryRunningRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunningRepository for InMemoryRunningRepository {
    async fn next_counter(&self, name: &str) -> LibsResult<u64> {
        let mut state = self.state.lock().await;
        let counter = state.counters.entry(name.to_string()).or_insert(0);
        let current = *counter;
        *counter += 1;
        Ok(current)
    }

    async fn insert(&self, instance: RunningLibraryInstance) -> LibsResult<()> {
        let mut state = self.state.lock().await;
        state.running.insert(instance.id.clone(), instance);
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> LibsResult<Option<RunningLibraryInstance>> {
        let state = self.state.lock().await;
        Ok(state
            .running
            .values()
            .filter(|instance| instance.name() == name && instance.state != InstanceState::Stopped)
            .min_by_key(|instance| instance.started_at)
            .cloned())
    }

    async fn get(&self, id: &str) -> LibsResult<Option<RunningLibraryInstance>> {
        let state = self.state.lock().await;
        Ok(state.running.get(id).cloned())
    }

    async fn set_state(&self, id: &str, new_state: InstanceState) -> LibsResult<bool> {
        let mut state = self.state.lock().await;
        match state.running.get_mut(id) {
            Some(instance) => {
                instance.state = new_state;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &str) -> LibsResult<Option<RunningLibraryInstance>> {
        let mut state = self.state.lock().await;
        Ok(state.running.remove(id))
    }

    async fn list(&self) -> LibsResult<Vec<RunningLibraryInstance>> {
        let state = self.state.lock().await;
        let mut instances: Vec<_> = state.running.values().cloned().collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }
}
