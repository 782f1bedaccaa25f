//! The dispatcher (§4.H): a periodic tick that assembles each project's
//! ready set, matches ready beads to idle workers, and claims them
//! atomically. Grounded in `at-daemon::scheduler::TaskScheduler`'s
//! next-bead/assign-bead shape and `at-daemon::daemon::Daemon`'s interval
//! loop, generalized from one project to many with round-robin fairness
//! across them (§9's open question: no per-project weighting, just a
//! stable pass order).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::time::MissedTickBehavior;

use bf_agents::pool::WorkerPool;
use bf_agents::persona::PersonaRegistry;
use bf_core::bead_store::{BeadStore, BeadStoreError};
use bf_core::config::DispatcherConfig;
use bf_core::lock_manager::LockManager;
use bf_core::project::Project;
use bf_core::types::WorkerStatus;
use bf_eventbus::{bead_topic, EventBus};
use bf_harness::shutdown::ShutdownSignal;
use bf_telemetry::metrics::{names, MetricsRegistry};

use crate::matching::{required_capabilities, select_worker};
use crate::routing::auto_bug_persona_hint;
use crate::stale::{reclaim_stale_workers, StaleError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] BeadStoreError),
    #[error(transparent)]
    Stale(#[from] StaleError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    pub assigned: u32,
    pub considered: u32,
}

/// Owns the long-lived handles a dispatch pass needs. One instance per
/// daemon process; projects are registered as they're loaded rather than
/// passed in on every call, since the set rarely changes between ticks.
pub struct Dispatcher {
    store: Arc<BeadStore>,
    pool: Arc<WorkerPool>,
    personas: Arc<PersonaRegistry>,
    locks: Arc<LockManager>,
    bus: EventBus,
    metrics: Arc<MetricsRegistry>,
    projects: DashMap<String, Project>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(store: Arc<BeadStore>, pool: Arc<WorkerPool>, personas: Arc<PersonaRegistry>, locks: Arc<LockManager>, bus: EventBus, metrics: Arc<MetricsRegistry>, config: DispatcherConfig) -> Self {
        Self { store, pool, personas, locks, bus, metrics, projects: DashMap::new(), config }
    }

    pub fn register_project(&self, project: Project) {
        self.projects.insert(project.id.clone(), project);
    }

    pub fn projects(&self) -> Vec<Project> {
        self.projects.iter().map(|e| e.value().clone()).collect()
    }

    /// One round-robin pass across every registered project: fill each
    /// project's concurrency slots with its best-matching idle workers
    /// before moving to the next project, in stable project-id order.
    pub async fn tick(&self) -> Result<TickReport, DispatchError> {
        let start = Instant::now();
        let mut report = TickReport::default();

        let mut project_ids: Vec<String> = self.projects.iter().map(|e| e.key().clone()).collect();
        project_ids.sort();

        for project_id in &project_ids {
            let Some(project) = self.projects.get(project_id).map(|e| e.value().clone()) else { continue };
            let (considered, assigned) = self.dispatch_project(&project).await?;
            report.considered += considered;
            report.assigned += assigned;
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.metrics.observe_latency_ms(names::DISPATCH_TICK_DURATION_MS, &[], elapsed_ms);
        Ok(report)
    }

    async fn dispatch_project(&self, project: &Project) -> Result<(u32, u32), DispatchError> {
        let ready = self.store.ready(&project.id).await?;
        self.metrics.set_gauge(names::READY_SET_SIZE, &[("project_id", &project.id)], ready.len() as u64);

        let working = self.pool.list().iter().filter(|w| w.project_id == project.id && w.status == WorkerStatus::Working).count() as u32;
        let mut slots = project.concurrency_cap.saturating_sub(working);
        let mut considered = 0u32;
        let mut assigned = 0u32;

        for bead in ready {
            if slots == 0 {
                break;
            }
            considered += 1;

            let required = required_capabilities(&bead);
            let hint = auto_bug_persona_hint(&bead);
            let idle: Vec<_> = self.pool.idle_workers().into_iter().filter(|w| w.project_id == project.id).collect();

            let Some(worker) = select_worker(&idle, &self.personas, &required, hint) else {
                continue;
            };

            match self.store.claim(&bead.id, &worker.id).await {
                Ok(_) => {
                    if let Err(e) = self.pool.claim(&worker.id, &bead.id) {
                        tracing::warn!(worker_id = %worker.id, bead_id = %bead.id, error = %e, "claimed bead but worker pool rejected assignment, rolling back");
                        self.store
                            .update(&bead.id, bf_core::bead_store::BeadPatch { status: Some(bf_core::types::BeadStatus::Open), assigned_to: Some(None), ..Default::default() })
                            .await?;
                        continue;
                    }
                    self.bus.publish(bead_topic("claimed"), serde_json::json!({"id": bead.id, "worker_id": worker.id, "project_id": project.id}));
                    slots -= 1;
                    assigned += 1;
                }
                Err(BeadStoreError::AlreadyClaimed(_)) => {
                    self.metrics.incr_counter(names::CLAIM_CONTENTION_TOTAL, &[("project_id", &project.id)]);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok((considered, assigned))
    }

    /// Runs `tick` on `config.tick_interval_secs`, interleaving a stale
    /// worker reclaim pass every `config.heartbeat_interval_secs *
    /// config.staleness_multiplier`, until `shutdown` fires (§4.H, §4.F).
    pub async fn run(self: Arc<Self>, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let staleness_threshold = chrono::Duration::seconds((self.config.heartbeat_interval_secs * self.config.staleness_multiplier as u64) as i64);
        let mut shutdown_rx = shutdown.subscribe();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = reclaim_stale_workers(&self.pool, &self.locks, &self.store, &self.bus, &self.metrics, staleness_threshold).await {
                        tracing::error!(error = %e, "stale worker reclaim failed");
                    }
                    match self.tick().await {
                        Ok(report) => tracing::debug!(assigned = report.assigned, considered = report.considered, "dispatch tick complete"),
                        Err(e) => tracing::error!(error = %e, "dispatch tick failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("dispatcher shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_core::types::{AutonomyLevel, BeadType, Persona};
    use std::collections::HashSet;

    fn sample_config() -> DispatcherConfig {
        DispatcherConfig { tick_interval_secs: 10, heartbeat_interval_secs: 30, staleness_multiplier: 3 }
    }

    async fn dispatcher() -> (Dispatcher, String) {
        let store = Arc::new(BeadStore::open_in_memory().await.unwrap());
        let pool = Arc::new(WorkerPool::new());
        let personas = Arc::new(PersonaRegistry::new());
        personas.register(Persona {
            name: "backend-engineer".into(),
            character: "".into(),
            tone: "".into(),
            mission: "".into(),
            focus_areas: vec![],
            capabilities: HashSet::from(["rust".to_string()]),
            autonomy_level: AutonomyLevel::Semi,
            collaboration: "".into(),
            standards: vec![],
        });
        let locks = Arc::new(LockManager::open_in_memory(chrono::Duration::minutes(10)).await.unwrap());
        let bus = EventBus::new();
        let metrics = Arc::new(MetricsRegistry::new());
        let dispatcher = Dispatcher::new(store.clone(), pool.clone(), personas, locks, bus, metrics, sample_config());
        let project = Project::new("proj", "Project", "bf", "/repo");
        dispatcher.register_project(project);
        (dispatcher, "proj".to_string())
    }

    #[tokio::test]
    async fn tick_claims_a_ready_bead_with_a_matching_idle_worker() {
        let (dispatcher, project_id) = dispatcher().await;
        dispatcher.pool.spawn("backend-engineer", "provider-a", &project_id);
        let bead_id = dispatcher.store.create(&project_id, "bf", "rust task".into(), BeadType::Task).await.unwrap();
        dispatcher.store.update(&bead_id, bf_core::bead_store::BeadPatch { tags: Some(HashSet::from(["rust".to_string()])), ..Default::default() }).await.unwrap();

        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.considered, 1);

        let bead = dispatcher.store.get(&bead_id).await.unwrap().unwrap();
        assert!(bead.assigned_to.is_some());
    }

    #[tokio::test]
    async fn tick_respects_project_concurrency_cap() {
        let (dispatcher, project_id) = dispatcher().await;
        {
            let mut project = dispatcher.projects.get_mut(&project_id).unwrap();
            project.concurrency_cap = 1;
        }
        dispatcher.pool.spawn("backend-engineer", "provider-a", &project_id);
        dispatcher.pool.spawn("backend-engineer", "provider-a", &project_id);

        let a = dispatcher.store.create(&project_id, "bf", "task a".into(), BeadType::Task).await.unwrap();
        let b = dispatcher.store.create(&project_id, "bf", "task b".into(), BeadType::Task).await.unwrap();

        dispatcher.tick().await.unwrap();

        let a_assigned = dispatcher.store.get(&a).await.unwrap().unwrap().assigned_to.is_some();
        let b_assigned = dispatcher.store.get(&b).await.unwrap().unwrap().assigned_to.is_some();
        assert_eq!([a_assigned, b_assigned].iter().filter(|x| **x).count(), 1);
    }

    #[tokio::test]
    async fn tick_skips_beads_with_no_capable_idle_worker() {
        let (dispatcher, project_id) = dispatcher().await;
        let bead_id = dispatcher.store.create(&project_id, "bf", "lonely task".into(), BeadType::Task).await.unwrap();
        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.considered, 1);
        assert!(dispatcher.store.get(&bead_id).await.unwrap().unwrap().assigned_to.is_none());
    }
}
