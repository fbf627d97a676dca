use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tars_models::recommendation::{AgentRun, Recommendation};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::RecommendationStore;

#[derive(Default)]
struct MemoryState {
    recommendations: Vec<Recommendation>,
    agent_runs: HashMap<Uuid, AgentRun>,
}

/// In-process store. Keeps everything for the life of the process; used by
/// tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store mutex poisoned: {e}")))
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.state()
            .map(|s| s.recommendations.clone())
            .unwrap_or_default()
    }

    pub fn agent_run(&self, id: Uuid) -> Option<AgentRun> {
        self.state().ok().and_then(|s| s.agent_runs.get(&id).cloned())
    }

    /// All agent runs, ordered by start time.
    pub fn agent_runs(&self) -> Vec<AgentRun> {
        let mut runs: Vec<AgentRun> = self
            .state()
            .map(|s| s.agent_runs.values().cloned().collect())
            .unwrap_or_default();
        runs.sort_by_key(|r| r.started_at);
        runs
    }
}

#[async_trait]
impl RecommendationStore for MemoryStore {
    async fn create_agent_run(&self, run: &AgentRun) -> Result<(), StoreError> {
        self.state()?.agent_runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_agent_run(&self, run: &AgentRun) -> Result<(), StoreError> {
        let mut state = self.state()?;
        match state.agent_runs.get_mut(&run.id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => Err(StoreError::Corrupt(format!("agent run {} not found", run.id))),
        }
    }

    async fn create_recommendation(&self, recommendation: &Recommendation) -> Result<(), StoreError> {
        self.state()?.recommendations.push(recommendation.clone());
        Ok(())
    }
}
