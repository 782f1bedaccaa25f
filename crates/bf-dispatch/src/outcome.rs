//! Outcome reconciliation (§4.E, §4.H): applies the side effects
//! `bf_agents::execute::execute_task` and `bf_workflow::execution::advance`
//! hand back — as data, not direct mutations, per the decoupling contract
//! those crates document — onto the bead store, and republishes them as
//! event bus notifications. Grounded in `at-daemon::orchestrator`'s
//! publish-at-each-step shape, generalized from a fixed pipeline to an
//! arbitrary `WorkflowEffect` list.

use bf_agents::execute::ExecuteTaskOutcome;
use bf_core::bead_store::{BeadPatch, BeadStore, BeadStoreError};
use bf_core::types::BeadStatus;
use bf_eventbus::{agent_messages_topic, bead_topic, workflow_topic, EventBus};
use bf_harness::router::RouterEvent;
use bf_workflow::decision::DecisionError;
use bf_workflow::execution::{WorkflowEffect, WorkflowEngine};

#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    #[error(transparent)]
    Store(#[from] BeadStoreError),
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error(transparent)]
    Workflow(#[from] bf_workflow::execution::WorkflowError),
}

/// Applies every effect in `outcome` to `bead_id`'s persisted state and
/// republishes the workflow/router events it carries onto `bus`. Returns
/// the bead's status after reconciliation for the caller's own bookkeeping
/// (e.g. deciding whether to release the claiming worker's concurrency
/// slot immediately or wait for a human decision).
pub async fn reconcile(
    outcome: &ExecuteTaskOutcome,
    store: &BeadStore,
    workflow: &WorkflowEngine,
    bus: &EventBus,
    bead_id: &str,
    project_id: &str,
    prefix: &str,
) -> Result<BeadStatus, OutcomeError> {
    publish_router_events(bus, &outcome.router_events);

    let mut final_status = store.get(bead_id).await?.ok_or_else(|| BeadStoreError::NotFound(bead_id.to_string()))?.status;

    for effect in &outcome.workflow_effects {
        match effect {
            WorkflowEffect::ContextPatch(patch) => {
                final_status = apply_context_patch(store, bus, bead_id, patch).await?;
            }
            WorkflowEffect::Escalate { node_key, reason, last_outcome } => {
                let existing = workflow.get(bead_id).and_then(|e| e.escalation_bead_id);
                let decision_id = bf_workflow::decision::escalate(
                    store,
                    project_id,
                    prefix,
                    bead_id,
                    node_key,
                    reason,
                    last_outcome.as_deref(),
                    existing.as_deref(),
                )
                .await?;
                workflow.record_escalation(bead_id, decision_id.clone())?;
                bus.publish(workflow_topic("escalated"), serde_json::json!({"bead_id": bead_id, "decision_bead_id": decision_id, "node_key": node_key}));
                final_status = store.get(bead_id).await?.ok_or_else(|| BeadStoreError::NotFound(bead_id.to_string()))?.status;
            }
        }
    }

    Ok(final_status)
}

async fn apply_context_patch(store: &BeadStore, bus: &EventBus, bead_id: &str, patch: &std::collections::HashMap<String, String>) -> Result<BeadStatus, OutcomeError> {
    let mut bead = store.get(bead_id).await?.ok_or_else(|| BeadStoreError::NotFound(bead_id.to_string()))?;
    bead.context.extend(patch.clone());

    let workflow_status = patch.get("workflow_status").map(String::as_str).unwrap_or_default();
    let redispatch = patch.get("redispatch_requested").map(|v| v == "true").unwrap_or(false);

    let new_status = if workflow_status == "completed" {
        Some(BeadStatus::Closed)
    } else if redispatch && bead.status != BeadStatus::Closed {
        Some(BeadStatus::Open)
    } else {
        None
    };

    let assigned_to = matches!(new_status, Some(BeadStatus::Closed) | Some(BeadStatus::Open)).then_some(None);

    let updated = store
        .update(
            bead_id,
            BeadPatch {
                context: Some(bead.context.clone()),
                status: new_status,
                assigned_to,
                ..Default::default()
            },
        )
        .await?;

    match new_status {
        Some(BeadStatus::Closed) => {
            bus.publish(bead_topic("closed"), serde_json::json!({"id": bead_id}));
        }
        Some(BeadStatus::Open) => {
            bus.publish(bead_topic("redispatched"), serde_json::json!({"id": bead_id, "reason": "workflow requested redispatch"}));
        }
        _ => {}
    }
    bus.publish(workflow_topic("advanced"), serde_json::json!({"bead_id": bead_id, "workflow_status": workflow_status}));

    Ok(updated.status)
}

fn publish_router_events(bus: &EventBus, events: &[RouterEvent]) {
    for event in events {
        match event {
            RouterEvent::BeadCreated { id } => {
                bus.publish(bead_topic("created"), serde_json::json!({"id": id}));
            }
            RouterEvent::BeadClosed { id } => {
                bus.publish(bead_topic("closed"), serde_json::json!({"id": id}));
            }
            RouterEvent::AgentMessage { to_agent_id, subject, body, requires_response, context } => {
                bus.publish(
                    agent_messages_topic(to_agent_id),
                    serde_json::json!({"subject": subject, "body": body, "requires_response": requires_response, "context": context}),
                );
            }
            RouterEvent::CeoEscalation { bead_id } => {
                bus.publish(workflow_topic("escalated"), serde_json::json!({"bead_id": bead_id}));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_core::types::{BeadType, EdgeKind};
    use bf_workflow::types::{Condition, Workflow, WorkflowEdge, WorkflowNode, END_NODE_KEY, START_NODE_KEY};

    fn single_node_workflow() -> Workflow {
        Workflow {
            name: "dev".into(),
            nodes: vec![WorkflowNode { key: "implement".into(), node_type: bf_workflow::types::NodeType::Task, max_attempts: 1 }],
            edges: vec![
                WorkflowEdge { from_node: START_NODE_KEY.into(), to_node: "implement".into(), condition: Condition::Success, priority: 0 },
                WorkflowEdge { from_node: "implement".into(), to_node: END_NODE_KEY.into(), condition: Condition::Success, priority: 0 },
            ],
        }
    }

    #[tokio::test]
    async fn completed_workflow_closes_the_bead() {
        let store = BeadStore::open_in_memory().await.unwrap();
        let bus = EventBus::new();
        let bead_id = store.create("proj", "bf", "task".into(), BeadType::Task).await.unwrap();
        store.claim(&bead_id, "agent-1").await.unwrap();

        let engine = WorkflowEngine::new(vec![single_node_workflow()]);
        engine.start(&bead_id, "dev").unwrap();
        engine.advance(&bead_id, Condition::Success, "agent-1", None).unwrap(); // -> implement
        let (execution, effects) = engine.advance(&bead_id, Condition::Success, "agent-1", None).unwrap(); // -> end

        let outcome = ExecuteTaskOutcome {
            condition: Condition::Success,
            last_outcome_detail: None,
            action_outcomes: vec![],
            router_events: vec![],
            workflow_execution: Some(execution),
            workflow_effects: effects,
        };

        let status = reconcile(&outcome, &store, &engine, &bus, &bead_id, "proj", "bf").await.unwrap();
        assert_eq!(status, BeadStatus::Closed);
        let bead = store.get(&bead_id).await.unwrap().unwrap();
        assert!(bead.assigned_to.is_none());
    }

    #[tokio::test]
    async fn failure_exhausted_escalation_blocks_original_bead() {
        let store = BeadStore::open_in_memory().await.unwrap();
        let bus = EventBus::new();
        let bead_id = store.create("proj", "bf", "task".into(), BeadType::Task).await.unwrap();
        store.claim(&bead_id, "agent-1").await.unwrap();

        let engine = WorkflowEngine::new(vec![single_node_workflow()]);
        engine.start(&bead_id, "dev").unwrap();
        engine.advance(&bead_id, Condition::Success, "agent-1", None).unwrap();
        let (execution, effects) = engine.advance(&bead_id, Condition::Failure, "agent-1", Some("boom".into())).unwrap();

        let outcome = ExecuteTaskOutcome {
            condition: Condition::Failure,
            last_outcome_detail: Some("boom".into()),
            action_outcomes: vec![],
            router_events: vec![],
            workflow_execution: Some(execution),
            workflow_effects: effects,
        };

        reconcile(&outcome, &store, &engine, &bus, &bead_id, "proj", "bf").await.unwrap();
        let bead = store.get(&bead_id).await.unwrap().unwrap();
        assert!(!bead.blocked_by.is_empty());
        let _ = EdgeKind::Blocks;
    }
}
