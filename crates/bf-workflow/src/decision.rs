//! Decision & escalation (§4.I). A decision bead carries a question,
//! options, a recommendation, and (once resolved) a decision/rationale.
//! `can_auto_decide` is pure policy; `make_decision` is the one place a
//! decision bead is closed and its dependents are unblocked.

use bf_core::bead_store::{BeadPatch, BeadStore, BeadStoreError};
use bf_core::types::{AutonomyLevel, Bead, BeadStatus, BeadType, DecisionDetails};

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error(transparent)]
    Store(#[from] BeadStoreError),
    #[error("bead {0} is not a decision bead")]
    NotADecision(String),
    #[error("decision {0} is already resolved")]
    AlreadyResolved(String),
    #[error("decider autonomy does not permit deciding {0}")]
    NotPermitted(String),
}

/// `requires_human` comes from `bead.context[REQUIRES_HUMAN]`; supervised
/// deciders may decide nothing, semi-autonomous deciders may not decide
/// priority 0 or 1 (the two highest), full autonomy may decide anything
/// not human-required (§4.I).
pub fn can_auto_decide(requires_human: bool, priority: u8, decider_autonomy: AutonomyLevel) -> bool {
    if requires_human {
        return false;
    }
    match decider_autonomy {
        AutonomyLevel::Supervised => false,
        AutonomyLevel::Semi => priority > 1,
        AutonomyLevel::Full => true,
    }
}

fn requires_human(bead: &Bead) -> bool {
    bead.context.get(bf_core::types::context_keys::REQUIRES_HUMAN).map(|v| v == "true").unwrap_or(false)
}

/// Resolve a decision bead: close it with `(decision, rationale, decidedAt)`
/// and revisit every bead in its `blocks` set for unblocking via
/// `BeadStore::unblock` (§4.C).
pub async fn make_decision(store: &BeadStore, decision_bead_id: &str, decider_id: &str, decider_autonomy: AutonomyLevel, decision: String, rationale: String) -> Result<Bead, DecisionError> {
    let bead = store.get(decision_bead_id).await?.ok_or_else(|| BeadStoreError::NotFound(decision_bead_id.to_string()))?;

    if bead.bead_type != BeadType::Decision {
        return Err(DecisionError::NotADecision(decision_bead_id.to_string()));
    }

    let mut details = bead.decision.clone().unwrap_or_default();
    if details.is_resolved() {
        return Err(DecisionError::AlreadyResolved(decision_bead_id.to_string()));
    }

    if !can_auto_decide(requires_human(&bead), bead.priority, decider_autonomy) {
        return Err(DecisionError::NotPermitted(decision_bead_id.to_string()));
    }

    details.decider_id = Some(decider_id.to_string());
    details.decision = Some(decision);
    details.rationale = Some(rationale);
    details.decided_at = Some(chrono::Utc::now());

    let blocks: Vec<String> = bead.blocks.iter().cloned().collect();

    let updated = store
        .update(
            decision_bead_id,
            BeadPatch {
                status: Some(BeadStatus::Closed),
                decision: Some(details),
                ..Default::default()
            },
        )
        .await?;

    for blocked_id in blocks {
        store.unblock(&blocked_id, decision_bead_id).await?;
    }

    Ok(updated)
}

fn decision_details(question: String, options: Vec<String>, recommendation: Option<String>) -> DecisionDetails {
    DecisionDetails { question, options, recommendation, decider_id: None, decision: None, rationale: None, decided_at: None }
}

/// File (or, if `existing_id` is `Some`, update) a `[CEO]`-tagged decision
/// bead for a workflow failure policy escalation, and block `blocked_bead`
/// on it (§4.E, §4.I). Dependency wiring is only needed on first creation —
/// an update reuses the existing block.
pub async fn escalate(store: &BeadStore, project_id: &str, prefix: &str, blocked_bead: &str, node_key: &str, reason: &str, last_outcome: Option<&str>, existing_id: Option<&str>) -> Result<String, DecisionError> {
    let title = format!("[CEO] {node_key}: {reason}");
    let options = vec!["retry".to_string(), "skip".to_string(), "cancel".to_string()];
    let detail = decision_details(format!("workflow node {node_key} failed: {reason}"), options, last_outcome.map(|o| format!("last outcome: {o}")));

    let id = match existing_id {
        Some(id) => {
            store
                .update(
                    id,
                    BeadPatch {
                        title: Some(title),
                        priority: Some(0),
                        decision: Some(detail),
                        ..Default::default()
                    },
                )
                .await?;
            id.to_string()
        }
        None => {
            let id = store.create(project_id, prefix, title, BeadType::Decision).await?;
            store
                .update(
                    &id,
                    BeadPatch {
                        priority: Some(0),
                        decision: Some(detail),
                        ..Default::default()
                    },
                )
                .await?;
            store.add_dependency(blocked_bead, &id, bf_core::types::EdgeKind::Blocks).await?;
            id
        }
    };
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_core::types::BeadType;

    #[tokio::test]
    async fn supervised_decider_can_never_auto_decide() {
        assert!(!can_auto_decide(false, 3, AutonomyLevel::Supervised));
    }

    #[tokio::test]
    async fn semi_autonomous_decider_cannot_decide_top_priority() {
        assert!(!can_auto_decide(false, 0, AutonomyLevel::Semi));
        assert!(!can_auto_decide(false, 1, AutonomyLevel::Semi));
        assert!(can_auto_decide(false, 2, AutonomyLevel::Semi));
    }

    #[tokio::test]
    async fn requires_human_always_blocks_auto_decide() {
        assert!(!can_auto_decide(true, 3, AutonomyLevel::Full));
    }

    #[tokio::test]
    async fn make_decision_closes_bead_and_unblocks_dependents() {
        let store = BeadStore::open_in_memory().await.unwrap();
        let decision_id = store.create("proj", "bf", "pick one".into(), BeadType::Decision).await.unwrap();
        let dependent_id = store.create("proj", "bf", "dependent".into(), BeadType::Task).await.unwrap();
        store.add_dependency(&dependent_id, &decision_id, bf_core::types::EdgeKind::Blocks).await.unwrap();

        let updated = make_decision(&store, &decision_id, "ceo-agent", AutonomyLevel::Full, "proceed".into(), "looks fine".into()).await.unwrap();
        assert_eq!(updated.status, BeadStatus::Closed);

        let dependent = store.get(&dependent_id).await.unwrap().unwrap();
        assert_eq!(dependent.status, BeadStatus::Open);
        assert!(dependent.blocked_by.is_empty());
    }

    #[tokio::test]
    async fn make_decision_twice_fails_already_resolved() {
        let store = BeadStore::open_in_memory().await.unwrap();
        let decision_id = store.create("proj", "bf", "pick one".into(), BeadType::Decision).await.unwrap();
        make_decision(&store, &decision_id, "ceo-agent", AutonomyLevel::Full, "proceed".into(), "ok".into()).await.unwrap();
        let err = make_decision(&store, &decision_id, "ceo-agent", AutonomyLevel::Full, "again".into(), "ok".into()).await.unwrap_err();
        assert!(matches!(err, DecisionError::AlreadyResolved(_)));
    }

    #[tokio::test]
    async fn escalate_creates_ceo_bead_and_blocks_original() {
        let store = BeadStore::open_in_memory().await.unwrap();
        let original = store.create("proj", "bf", "do the thing".into(), BeadType::Task).await.unwrap();
        let decision_id = escalate(&store, "proj", "bf", &original, "implement", "attempts exhausted", Some("compile error"), None).await.unwrap();

        let decision_bead = store.get(&decision_id).await.unwrap().unwrap();
        assert!(decision_bead.title.starts_with("[CEO]"));
        assert_eq!(decision_bead.priority, 0);

        let original_bead = store.get(&original).await.unwrap().unwrap();
        assert!(original_bead.blocked_by.contains(&decision_id));
    }

    #[tokio::test]
    async fn escalate_with_existing_id_updates_in_place() {
        let store = BeadStore::open_in_memory().await.unwrap();
        let original = store.create("proj", "bf", "do the thing".into(), BeadType::Task).await.unwrap();
        let first_id = escalate(&store, "proj", "bf", &original, "implement", "first failure", None, None).await.unwrap();
        let second_id = escalate(&store, "proj", "bf", &original, "implement", "second failure", Some("still broken"), Some(&first_id)).await.unwrap();
        assert_eq!(first_id, second_id);

        let bead = store.get(&first_id).await.unwrap().unwrap();
        assert!(bead.title.contains("second failure"));
        let blockers: Vec<_> = store.get(&original).await.unwrap().unwrap().blocked_by.into_iter().collect();
        assert_eq!(blockers.len(), 1);
    }
}
