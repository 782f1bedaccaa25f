//! Read-only KPI snapshot computed from the bead store. Supplemental: useful
//! for the dispatcher's fairness accounting and for operators, not part of
//! any component's write path.

use chrono::Utc;

use crate::bead_store::{BeadFilter, BeadStore, BeadStoreError};
use crate::types::{BeadStatus, BeadType, KpiSnapshot};

pub async fn compute(store: &BeadStore, project_id: &str) -> Result<KpiSnapshot, BeadStoreError> {
    let all = store
        .list(BeadFilter { project_id: Some(project_id.to_string()), ..Default::default() })
        .await?;

    let open = all.iter().filter(|b| b.status == BeadStatus::Open).count() as u64;
    let in_progress = all.iter().filter(|b| b.status == BeadStatus::InProgress).count() as u64;
    let blocked = all.iter().filter(|b| b.status == BeadStatus::Blocked).count() as u64;
    let closed_beads: Vec<_> = all.iter().filter(|b| b.status == BeadStatus::Closed).collect();
    let closed = closed_beads.len() as u64;
    let escalated = all
        .iter()
        .filter(|b| b.bead_type == BeadType::Decision && b.is_escalation())
        .count() as u64;

    let cycle_times: Vec<i64> = closed_beads
        .iter()
        .filter_map(|b| b.closed_at.map(|closed_at| (closed_at - b.created_at).num_seconds()))
        .collect();
    let mean_cycle_time_secs = if cycle_times.is_empty() {
        0.0
    } else {
        cycle_times.iter().sum::<i64>() as f64 / cycle_times.len() as f64
    };

    Ok(KpiSnapshot {
        total_beads: all.len() as u64,
        open,
        in_progress,
        blocked,
        closed,
        escalated,
        active_workers: 0,
        mean_cycle_time_secs,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bead_store::BeadPatch;

    #[tokio::test]
    async fn snapshot_counts_by_status() {
        let store = BeadStore::open_in_memory().await.unwrap();
        let a = store.create("proj", "bf", "a".into(), BeadType::Task).await.unwrap();
        let _b = store.create("proj", "bf", "b".into(), BeadType::Task).await.unwrap();
        store
            .update(&a, BeadPatch { status: Some(BeadStatus::Closed), ..Default::default() })
            .await
            .unwrap();

        let snap = compute(&store, "proj").await.unwrap();
        assert_eq!(snap.total_beads, 2);
        assert_eq!(snap.closed, 1);
        assert_eq!(snap.open, 1);
    }
}
