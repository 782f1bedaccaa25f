//! Worker pool (§4.F): the bounded set of long-running cooperative workers
//! a project runs. Grounded in `at-agents::supervisor::AgentSupervisor`'s
//! spawn/stop/list shape, adapted from its `Arc<Mutex<HashMap<Uuid,
//! ManagedAgent>>>` to the per-key `DashMap` idiom already used for bead,
//! lock, and provider state elsewhere in this workspace.

use bf_core::types::{Worker, WorkerStatus};
use chrono::Utc;
use dashmap::DashMap;

use crate::state::{WorkerEvent, WorkerStateError, WorkerStateMachine};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    State(#[from] WorkerStateError),
}

struct ManagedWorker {
    record: Worker,
    sm: WorkerStateMachine,
}

#[derive(Default)]
pub struct WorkerPool {
    workers: DashMap<String, ManagedWorker>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a new idle worker bound to a persona, a provider, and a
    /// project, and returns its id.
    pub fn spawn(&self, persona_name: impl Into<String>, provider_id: impl Into<String>, project_id: impl Into<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let record = Worker::new(id.clone(), id.clone(), persona_name.into(), provider_id.into(), project_id.into());
        self.workers.insert(id.clone(), ManagedWorker { record, sm: WorkerStateMachine::new() });
        tracing::info!(worker_id = %id, "worker spawned");
        id
    }

    /// Stops a worker from either idle or working. The caller is responsible
    /// for cancelling any in-flight task and releasing its locks before or
    /// after this call — the pool only tracks lifecycle state.
    pub fn stop(&self, id: &str) -> Result<(), PoolError> {
        let mut entry = self.workers.get_mut(id).ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        entry.sm.transition(WorkerEvent::Stop)?;
        entry.record.status = entry.sm.state();
        entry.record.current_bead = None;
        tracing::info!(worker_id = %id, "worker stopped");
        Ok(())
    }

    pub fn mark_error(&self, id: &str) -> Result<(), PoolError> {
        let mut entry = self.workers.get_mut(id).ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        entry.sm.transition(WorkerEvent::Fail)?;
        entry.record.status = entry.sm.state();
        Ok(())
    }

    pub fn recover(&self, id: &str) -> Result<(), PoolError> {
        let mut entry = self.workers.get_mut(id).ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        entry.sm.transition(WorkerEvent::Recover)?;
        entry.record.status = entry.sm.state();
        Ok(())
    }

    /// Atomically transitions idle -> working and assigns `bead_id`.
    pub fn claim(&self, id: &str, bead_id: &str) -> Result<(), PoolError> {
        let mut entry = self.workers.get_mut(id).ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        entry.sm.transition(WorkerEvent::Claim)?;
        entry.record.status = entry.sm.state();
        entry.record.current_bead = Some(bead_id.to_string());
        entry.record.last_heartbeat = Utc::now();
        Ok(())
    }

    /// Back to idle once a task finishes. Whether the task itself succeeded
    /// is surfaced through the workflow condition and action outcomes, not
    /// through pool state — a worker that completes a failed task is still
    /// a healthy, idle worker.
    pub fn release(&self, id: &str) -> Result<(), PoolError> {
        let mut entry = self.workers.get_mut(id).ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        entry.sm.transition(WorkerEvent::Complete)?;
        entry.record.status = entry.sm.state();
        entry.record.current_bead = None;
        Ok(())
    }

    pub fn heartbeat(&self, id: &str) -> Result<(), PoolError> {
        let mut entry = self.workers.get_mut(id).ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        entry.record.last_heartbeat = Utc::now();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Worker> {
        self.workers.get(id).map(|e| e.record.clone())
    }

    pub fn list(&self) -> Vec<Worker> {
        self.workers.iter().map(|e| e.record.clone()).collect()
    }

    /// Idle workers, the candidate pool the dispatcher's matching pass
    /// (§4.H) scores by persona capability.
    pub fn idle_workers(&self) -> Vec<Worker> {
        self.workers.iter().filter(|e| e.record.status == WorkerStatus::Idle).map(|e| e.record.clone()).collect()
    }

    /// Working workers whose heartbeat has gone stale past `threshold` —
    /// candidates for the dispatcher to mark errored and redispatch.
    pub fn stale_workers(&self, threshold: chrono::Duration) -> Vec<Worker> {
        self.workers
            .iter()
            .filter(|e| e.record.status == WorkerStatus::Working && e.record.is_stale(threshold))
            .map(|e| e.record.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.workers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_claim_release_round_trips() {
        let pool = WorkerPool::new();
        let id = pool.spawn("engineer", "provider-a", "proj");
        assert_eq!(pool.get(&id).unwrap().status, WorkerStatus::Idle);

        pool.claim(&id, "bf-1").unwrap();
        assert_eq!(pool.get(&id).unwrap().status, WorkerStatus::Working);
        assert_eq!(pool.get(&id).unwrap().current_bead.as_deref(), Some("bf-1"));

        pool.release(&id).unwrap();
        assert_eq!(pool.get(&id).unwrap().status, WorkerStatus::Idle);
        assert!(pool.get(&id).unwrap().current_bead.is_none());
    }

    #[test]
    fn idle_workers_excludes_working_ones() {
        let pool = WorkerPool::new();
        let a = pool.spawn("engineer", "provider-a", "proj");
        let b = pool.spawn("engineer", "provider-a", "proj");
        pool.claim(&a, "bf-1").unwrap();
        let idle = pool.idle_workers();
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].id, b);
    }

    #[test]
    fn stopping_an_unknown_worker_fails() {
        let pool = WorkerPool::new();
        assert!(matches!(pool.stop("nope"), Err(PoolError::NotFound(_))));
    }

    #[test]
    fn stale_workers_reports_workers_past_threshold() {
        let pool = WorkerPool::new();
        let id = pool.spawn("engineer", "provider-a", "proj");
        pool.claim(&id, "bf-1").unwrap();
        assert!(pool.stale_workers(chrono::Duration::seconds(-1)).iter().any(|w| w.id == id));
        assert!(pool.stale_workers(chrono::Duration::hours(1)).is_empty());
    }
}
