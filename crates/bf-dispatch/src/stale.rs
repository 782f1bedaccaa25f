//! Stale-worker reclaim (§4.F, §4.H): a worker whose heartbeat has gone
//! quiet past `staleness_multiplier * heartbeat_interval` is presumed dead.
//! Grounded in `at-daemon::heartbeat::HeartbeatMonitor::check_agents`,
//! adapted to `bf_agents::pool::WorkerPool`'s in-memory staleness check
//! rather than a separate tracked-agent table, since the pool already has
//! the heartbeat timestamps.

use bf_agents::pool::{PoolError, WorkerPool};
use bf_core::bead_store::{BeadPatch, BeadStore, BeadStoreError};
use bf_core::lock_manager::{LockError, LockManager};
use bf_core::types::BeadStatus;
use bf_eventbus::{bead_topic, EventBus};
use bf_telemetry::metrics::{names, MetricsRegistry};

#[derive(Debug, thiserror::Error)]
pub enum StaleError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Store(#[from] BeadStoreError),
}

/// Marks every worker idle for longer than `threshold` as errored, releases
/// its file locks, and reopens its current bead for redispatch. Returns the
/// number of workers reclaimed.
pub async fn reclaim_stale_workers(pool: &WorkerPool, locks: &LockManager, store: &BeadStore, bus: &EventBus, metrics: &MetricsRegistry, threshold: chrono::Duration) -> Result<usize, StaleError> {
    let stale = pool.stale_workers(threshold);
    for worker in &stale {
        tracing::warn!(worker_id = %worker.id, bead_id = ?worker.current_bead, "reclaiming stale worker");
        pool.mark_error(&worker.id)?;
        locks.release_agent_locks(&worker.id).await?;

        if let Some(bead_id) = &worker.current_bead {
            store
                .update(
                    bead_id,
                    BeadPatch { status: Some(BeadStatus::Open), assigned_to: Some(None), ..Default::default() },
                )
                .await?;
            bus.publish(bead_topic("redispatched"), serde_json::json!({"id": bead_id, "reason": "worker heartbeat stale"}));
        }

        metrics.incr_counter(names::WORKER_HEARTBEAT_STALE_TOTAL, &[("worker_id", &worker.id)]);
    }
    Ok(stale.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_core::types::BeadType;
    use chrono::Duration;

    #[tokio::test]
    async fn reclaims_a_worker_past_the_staleness_threshold() {
        let store = BeadStore::open_in_memory().await.unwrap();
        let locks = LockManager::open_in_memory(Duration::minutes(10)).await.unwrap();
        let bus = EventBus::new();
        let metrics = MetricsRegistry::new();
        let pool = WorkerPool::new();

        let bead_id = store.create("proj", "bf", "task".into(), BeadType::Task).await.unwrap();
        let worker_id = pool.spawn("engineer", "provider-a", "proj");
        pool.claim(&worker_id, &bead_id).unwrap();
        store.claim(&bead_id, &worker_id).await.unwrap();
        locks.acquire("proj", "src/lib.rs", &worker_id, &bead_id).await.unwrap();

        let reclaimed = reclaim_stale_workers(&pool, &locks, &store, &bus, &metrics, Duration::seconds(-1)).await.unwrap();
        assert_eq!(reclaimed, 1);

        let bead = store.get(&bead_id).await.unwrap().unwrap();
        assert_eq!(bead.status, BeadStatus::Open);
        assert!(bead.assigned_to.is_none());
        assert!(locks.list_for_project("proj").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_worker_is_left_alone() {
        let store = BeadStore::open_in_memory().await.unwrap();
        let locks = LockManager::open_in_memory(Duration::minutes(10)).await.unwrap();
        let bus = EventBus::new();
        let metrics = MetricsRegistry::new();
        let pool = WorkerPool::new();

        let worker_id = pool.spawn("engineer", "provider-a", "proj");
        pool.claim(&worker_id, "bf-1").unwrap();

        let reclaimed = reclaim_stale_workers(&pool, &locks, &store, &bus, &metrics, Duration::hours(1)).await.unwrap();
        assert_eq!(reclaimed, 0);
    }
}
