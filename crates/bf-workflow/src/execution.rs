//! Workflow execution runtime state (§4.E): one `WorkflowExecution` per
//! bead, driven forward by `advance`. Grounded in the same shape as
//! `AgentStateMachine` — explicit transition function, append-only history,
//! `tracing::debug!` on every move — generalized from a fixed seven-state
//! agent lifecycle to a template-defined node graph.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::{Condition, NodeType, Workflow, END_NODE_KEY, START_NODE_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Active,
    Completed,
    Failed,
    /// A human has pulled this execution out of automatic routing
    /// (§4.I's decision/escalation subsystem, not an `advance` condition):
    /// terminal for routing, but unlike `Failed` does not imply the
    /// original bead should be auto-closed (§4.E).
    Escalated,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Active => "active",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Escalated => "escalated",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from_node: String,
    pub condition: Condition,
    pub to_node: String,
    pub agent_id: String,
    pub outcome: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub bead_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub current_node_key: String,
    pub node_attempt_count: u32,
    pub last_node_at: DateTime<Utc>,
    pub history: Vec<HistoryEntry>,
    /// Id of the `[CEO]` decision bead filed for this execution's most
    /// recent escalation, if any — lets the caller update that bead on a
    /// repeat escalation instead of filing a new one each time (§4.E).
    pub escalation_bead_id: Option<String>,
}

impl WorkflowExecution {
    fn new(bead_id: String, workflow_name: String) -> Self {
        let now = Utc::now();
        Self {
            bead_id,
            workflow_name,
            status: ExecutionStatus::Active,
            current_node_key: START_NODE_KEY.to_string(),
            node_attempt_count: 0,
            last_node_at: now,
            history: Vec::new(),
            escalation_bead_id: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("unknown workflow template: {0}")]
    UnknownTemplate(String),
    #[error("no execution for bead {0}")]
    NoExecution(String),
    #[error("execution for bead {0} is not active")]
    NotActive(String),
    #[error("node {node} has no outgoing edge for condition {condition}")]
    NoMatchingEdge { node: String, condition: Condition },
    #[error("node {0} not found in workflow template")]
    UnknownNode(String),
    #[error("a failure/timeout condition cannot be reported at the synthetic start node")]
    FailureAtStart,
}

/// A side effect `advance` asks the caller to apply, kept decoupled from the
/// bead store the same way `bf_harness::router::ActionRouter` returns
/// `RouterEvent`s instead of depending on the event bus directly.
#[derive(Debug, Clone)]
pub enum WorkflowEffect {
    /// Patch these keys into `bead.context` (§4.E's redispatch contract:
    /// `workflow_node`, `workflow_status`, `redispatch_requested`).
    ContextPatch(HashMap<String, String>),
    /// Attempts exhausted on `failure`/`timeout`: file (or update) a `[CEO]`
    /// decision bead naming the node and failure reason, and block the
    /// original bead on it.
    Escalate { node_key: String, reason: String, last_outcome: Option<String> },
}

/// Whether `redispatch_requested` should be written as `"true"` for a node
/// the execution is now sitting at (§4.E).
fn wants_redispatch(status: ExecutionStatus, attempt_count: u32, node: Option<&crate::types::WorkflowNode>) -> bool {
    status == ExecutionStatus::Active
        && node.is_some_and(|n| attempt_count < n.max_attempts && matches!(n.node_type, NodeType::Task | NodeType::Commit | NodeType::Verify))
}

fn context_patch(node_key: &str, status: ExecutionStatus, redispatch: bool) -> HashMap<String, String> {
    let mut patch = HashMap::new();
    patch.insert("workflow_node".to_string(), if node_key == END_NODE_KEY { String::new() } else { node_key.to_string() });
    patch.insert("workflow_status".to_string(), status.to_string());
    patch.insert("redispatch_requested".to_string(), redispatch.to_string());
    patch
}

pub struct WorkflowEngine {
    templates: HashMap<String, Workflow>,
    executions: DashMap<String, WorkflowExecution>,
}

impl WorkflowEngine {
    pub fn new(templates: Vec<Workflow>) -> Self {
        Self {
            templates: templates.into_iter().map(|w| (w.name.clone(), w)).collect(),
            executions: DashMap::new(),
        }
    }

    fn template(&self, name: &str) -> Result<&Workflow, WorkflowError> {
        self.templates.get(name).ok_or_else(|| WorkflowError::UnknownTemplate(name.to_string()))
    }

    /// `start(bead, workflow)`: reentrant — if an execution already exists
    /// for `bead_id` it is returned unchanged rather than restarted (§4.E).
    pub fn start(&self, bead_id: &str, workflow_name: &str) -> Result<WorkflowExecution, WorkflowError> {
        self.template(workflow_name)?;
        if let Some(existing) = self.executions.get(bead_id) {
            return Ok(existing.clone());
        }
        let execution = WorkflowExecution::new(bead_id.to_string(), workflow_name.to_string());
        self.executions.insert(bead_id.to_string(), execution.clone());
        Ok(execution)
    }

    pub fn get(&self, bead_id: &str) -> Option<WorkflowExecution> {
        self.executions.get(bead_id).map(|e| e.clone())
    }

    /// The node type `bead_id`'s execution is currently sitting at, used to
    /// gate what a worker session's condition is allowed to report (§4.E) —
    /// `None` if there's no active execution or the current node is the
    /// synthetic start/end.
    pub fn current_node_type(&self, bead_id: &str) -> Option<NodeType> {
        let execution = self.executions.get(bead_id)?;
        let workflow = self.templates.get(&execution.workflow_name)?;
        workflow.node(&execution.current_node_key).map(|n| n.node_type)
    }

    /// Record which `[CEO]` decision bead was filed (or updated) for this
    /// execution's most recent escalation, so the caller can tell
    /// create-from-update apart on the next one.
    pub fn record_escalation(&self, bead_id: &str, decision_bead_id: String) -> Result<(), WorkflowError> {
        let mut entry = self.executions.get_mut(bead_id).ok_or_else(|| WorkflowError::NoExecution(bead_id.to_string()))?;
        entry.escalation_bead_id = Some(decision_bead_id);
        Ok(())
    }

    /// `advance(execution, condition, agentId, outcome)` (§4.E).
    ///
    /// `success` and `approval` select the matching edge and move the
    /// execution; `failure`/`timeout` retry at the current node while
    /// attempts remain, and escalate to a `[CEO]` decision once exhausted.
    pub fn advance(&self, bead_id: &str, condition: Condition, agent_id: &str, outcome: Option<String>) -> Result<(WorkflowExecution, Vec<WorkflowEffect>), WorkflowError> {
        let mut entry = self.executions.get_mut(bead_id).ok_or_else(|| WorkflowError::NoExecution(bead_id.to_string()))?;
        if entry.status != ExecutionStatus::Active {
            return Err(WorkflowError::NotActive(bead_id.to_string()));
        }
        let workflow = self.templates.get(&entry.workflow_name).ok_or_else(|| WorkflowError::UnknownTemplate(entry.workflow_name.clone()))?;
        let current_node_key = entry.current_node_key.clone();

        if matches!(condition, Condition::Failure | Condition::Timeout) {
            if current_node_key == START_NODE_KEY {
                return Err(WorkflowError::FailureAtStart);
            }
            let node = workflow.node(&current_node_key).ok_or_else(|| WorkflowError::UnknownNode(current_node_key.clone()))?;

            if entry.node_attempt_count + 1 >= node.max_attempts {
                entry.status = ExecutionStatus::Failed;
                entry.history.push(HistoryEntry {
                    from_node: current_node_key.clone(),
                    condition,
                    to_node: current_node_key.clone(),
                    agent_id: agent_id.to_string(),
                    outcome: outcome.clone(),
                    at: Utc::now(),
                });
                let patch = context_patch(&current_node_key, ExecutionStatus::Failed, false);
                tracing::debug!(bead_id, node = %current_node_key, %condition, "workflow node attempts exhausted, escalating");
                return Ok((
                    entry.clone(),
                    vec![
                        WorkflowEffect::ContextPatch(patch),
                        WorkflowEffect::Escalate {
                            node_key: current_node_key,
                            reason: format!("{condition} at node with attempts exhausted"),
                            last_outcome: outcome,
                        },
                    ],
                ));
            }

            entry.node_attempt_count += 1;
            entry.last_node_at = Utc::now();
            entry.history.push(HistoryEntry {
                from_node: current_node_key.clone(),
                condition,
                to_node: current_node_key.clone(),
                agent_id: agent_id.to_string(),
                outcome,
                at: Utc::now(),
            });
            let redispatch = wants_redispatch(entry.status, entry.node_attempt_count, Some(node));
            let patch = context_patch(&current_node_key, entry.status, redispatch);
            tracing::debug!(bead_id, node = %current_node_key, attempt = entry.node_attempt_count, "workflow node retry");
            return Ok((entry.clone(), vec![WorkflowEffect::ContextPatch(patch)]));
        }

        // Condition::Success / Condition::Approval: select the edge with
        // matching condition, highest priority, lexicographic `to_node`
        // tiebreak. An approval node's outgoing edge is guarded on
        // `approval`, reported only by an external approver signal, never
        // by a worker session (§4.E).
        let edges = workflow.edges_from(&current_node_key, condition);
        let edge = edges.first().ok_or_else(|| WorkflowError::NoMatchingEdge { node: current_node_key.clone(), condition })?;
        let to_node = edge.to_node.clone();

        entry.history.push(HistoryEntry {
            from_node: current_node_key.clone(),
            condition,
            to_node: to_node.clone(),
            agent_id: agent_id.to_string(),
            outcome,
            at: Utc::now(),
        });

        if to_node == END_NODE_KEY {
            entry.status = ExecutionStatus::Completed;
            entry.current_node_key = to_node.clone();
            let patch = context_patch(&to_node, ExecutionStatus::Completed, false);
            tracing::debug!(bead_id, "workflow execution completed");
            return Ok((entry.clone(), vec![WorkflowEffect::ContextPatch(patch)]));
        }

        entry.current_node_key = to_node.clone();
        entry.node_attempt_count = 0;
        entry.last_node_at = Utc::now();

        let next_node = workflow.node(&to_node).ok_or_else(|| WorkflowError::UnknownNode(to_node.clone()))?;
        let redispatch = wants_redispatch(entry.status, entry.node_attempt_count, Some(next_node));
        let patch = context_patch(&to_node, entry.status, redispatch);
        tracing::debug!(bead_id, from = %current_node_key, to = %to_node, "workflow execution advanced");
        Ok((entry.clone(), vec![WorkflowEffect::ContextPatch(patch)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeType, WorkflowEdge, WorkflowNode};

    fn linear_workflow() -> Workflow {
        Workflow {
            name: "dev".into(),
            nodes: vec![
                WorkflowNode { key: "implement".into(), node_type: NodeType::Task, max_attempts: 2 },
                WorkflowNode { key: "verify".into(), node_type: NodeType::Verify, max_attempts: 1 },
            ],
            edges: vec![
                WorkflowEdge { from_node: START_NODE_KEY.into(), to_node: "implement".into(), condition: Condition::Success, priority: 0 },
                WorkflowEdge { from_node: "implement".into(), to_node: "verify".into(), condition: Condition::Success, priority: 0 },
                WorkflowEdge { from_node: "verify".into(), to_node: END_NODE_KEY.into(), condition: Condition::Success, priority: 0 },
            ],
        }
    }

    #[test]
    fn start_is_reentrant() {
        let engine = WorkflowEngine::new(vec![linear_workflow()]);
        let a = engine.start("bd-1", "dev").unwrap();
        let b = engine.start("bd-1", "dev").unwrap();
        assert_eq!(a.current_node_key, b.current_node_key);
        assert_eq!(engine.executions.len(), 1);
    }

    #[test]
    fn advance_through_to_completion_sets_status_completed() {
        let engine = WorkflowEngine::new(vec![linear_workflow()]);
        engine.start("bd-1", "dev").unwrap();
        let (exec, _) = engine.advance("bd-1", Condition::Success, "agent-1", None).unwrap();
        assert_eq!(exec.current_node_key, "implement");
        let (exec, _) = engine.advance("bd-1", Condition::Success, "agent-1", None).unwrap();
        assert_eq!(exec.current_node_key, "verify");
        let (exec, effects) = engine.advance("bd-1", Condition::Success, "agent-1", None).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(matches!(&effects[0], WorkflowEffect::ContextPatch(p) if p["workflow_status"] == "completed"));
    }

    #[test]
    fn failure_retries_until_attempts_exhausted_then_escalates() {
        let engine = WorkflowEngine::new(vec![linear_workflow()]);
        engine.start("bd-1", "dev").unwrap();
        engine.advance("bd-1", Condition::Success, "agent-1", None).unwrap(); // now at "implement"

        let (exec, effects) = engine.advance("bd-1", Condition::Failure, "agent-1", Some("boom".into())).unwrap();
        assert_eq!(exec.current_node_key, "implement");
        assert_eq!(exec.node_attempt_count, 1);
        assert!(matches!(&effects[0], WorkflowEffect::ContextPatch(p) if p["redispatch_requested"] == "true"));

        let (exec, effects) = engine.advance("bd-1", Condition::Failure, "agent-1", Some("boom again".into())).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(effects.iter().any(|e| matches!(e, WorkflowEffect::Escalate { .. })));
    }

    #[test]
    fn approval_condition_advances_via_its_own_matching_edge() {
        let workflow = Workflow {
            name: "review".into(),
            nodes: vec![WorkflowNode { key: "approve".into(), node_type: NodeType::Approval, max_attempts: 1 }],
            edges: vec![
                WorkflowEdge { from_node: START_NODE_KEY.into(), to_node: "approve".into(), condition: Condition::Success, priority: 0 },
                WorkflowEdge { from_node: "approve".into(), to_node: END_NODE_KEY.into(), condition: Condition::Approval, priority: 0 },
            ],
        };
        let engine = WorkflowEngine::new(vec![workflow]);
        engine.start("bd-3", "review").unwrap();
        engine.advance("bd-3", Condition::Success, "agent-1", None).unwrap();

        // A plain `success` has no matching edge at an approval node.
        let err = engine.advance("bd-3", Condition::Success, "approver-1", None).unwrap_err();
        assert!(matches!(err, WorkflowError::NoMatchingEdge { .. }));

        let (exec, _) = engine.advance("bd-3", Condition::Approval, "approver-1", Some("looks good".into())).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
    }

    #[test]
    fn current_node_type_reflects_where_the_execution_is() {
        let engine = WorkflowEngine::new(vec![linear_workflow()]);
        engine.start("bd-1", "dev").unwrap();
        assert_eq!(engine.current_node_type("bd-1"), None);
        engine.advance("bd-1", Condition::Success, "agent-1", None).unwrap();
        assert_eq!(engine.current_node_type("bd-1"), Some(NodeType::Task));
        engine.advance("bd-1", Condition::Success, "agent-1", None).unwrap();
        assert_eq!(engine.current_node_type("bd-1"), Some(NodeType::Verify));
    }

    #[test]
    fn approval_node_never_requests_redispatch() {
        let workflow = Workflow {
            name: "review".into(),
            nodes: vec![WorkflowNode { key: "approve".into(), node_type: NodeType::Approval, max_attempts: 1 }],
            edges: vec![
                WorkflowEdge { from_node: START_NODE_KEY.into(), to_node: "approve".into(), condition: Condition::Success, priority: 0 },
                WorkflowEdge { from_node: "approve".into(), to_node: END_NODE_KEY.into(), condition: Condition::Success, priority: 0 },
            ],
        };
        let engine = WorkflowEngine::new(vec![workflow]);
        engine.start("bd-2", "review").unwrap();
        let (_, effects) = engine.advance("bd-2", Condition::Success, "agent-1", None).unwrap();
        assert!(matches!(&effects[0], WorkflowEffect::ContextPatch(p) if p["redispatch_requested"] == "false"));
    }
}
