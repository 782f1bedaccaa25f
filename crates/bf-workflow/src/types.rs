//! Workflow template types (§4.E): nodes, edges, and the synthetic
//! start/end nodes every execution begins and ends at. A `Workflow` is
//! immutable once built; all per-bead runtime state lives in
//! [`crate::execution::WorkflowExecution`].

use serde::{Deserialize, Serialize};

pub const START_NODE_KEY: &str = "__start__";
pub const END_NODE_KEY: &str = "__end__";

/// Node kinds, each with distinct success semantics (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Worker-executed; success if the worker emits `done` with no
    /// unresolved required sub-actions.
    Task,
    /// Success requires a `git_commit` action in the session that passed
    /// secret scan and attribution checks.
    Commit,
    /// Success requires the final `run_tests`/`build_project` exit code to
    /// be zero, as recorded in the session audit.
    Verify,
    /// Success only via an external signal; the engine never schedules a
    /// worker for this node.
    Approval,
}

/// The outcome an `advance` call reports for the current node (§3's edge
/// `condition ∈ {success, failure, approval, timeout}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Success,
    Failure,
    /// Reported by an external approver signal at an `approval` node,
    /// never by a worker session (§4.E).
    Approval,
    Timeout,
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Condition::Success => "success",
            Condition::Failure => "failure",
            Condition::Approval => "approval",
            Condition::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub key: String,
    pub node_type: NodeType,
    /// Attempts allowed at this node before the failure policy escalates.
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from_node: String,
    pub to_node: String,
    pub condition: Condition,
    pub priority: u32,
}

/// An immutable workflow template: the synthetic start node is
/// [`START_NODE_KEY`], the synthetic end node is [`END_NODE_KEY`]; neither
/// appears in `nodes` — only real nodes do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

impl Workflow {
    pub fn node(&self, key: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.key == key)
    }

    /// Edges leaving `from_node` matching `condition`, ordered
    /// highest-priority first, ties broken by lexicographically smallest
    /// `to_node` (§4.E) — the first entry is the one `advance` selects.
    pub fn edges_from(&self, from_node: &str, condition: Condition) -> Vec<&WorkflowEdge> {
        let mut matches: Vec<&WorkflowEdge> = self
            .edges
            .iter()
            .filter(|e| e.from_node == from_node && e.condition == condition)
            .collect();
        matches.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.to_node.cmp(&b.to_node)));
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Workflow {
        Workflow {
            name: "dev".into(),
            nodes: vec![WorkflowNode { key: "implement".into(), node_type: NodeType::Task, max_attempts: 3 }],
            edges: vec![
                WorkflowEdge { from_node: START_NODE_KEY.into(), to_node: "implement".into(), condition: Condition::Success, priority: 0 },
                WorkflowEdge { from_node: "implement".into(), to_node: "b".into(), condition: Condition::Success, priority: 1 },
                WorkflowEdge { from_node: "implement".into(), to_node: "a".into(), condition: Condition::Success, priority: 1 },
                WorkflowEdge { from_node: "implement".into(), to_node: END_NODE_KEY.into(), condition: Condition::Success, priority: 0 },
            ],
        }
    }

    #[test]
    fn edges_from_orders_by_priority_then_lexicographic_tiebreak() {
        let w = sample();
        let edges = w.edges_from("implement", Condition::Success);
        assert_eq!(edges[0].to_node, "a");
        assert_eq!(edges[1].to_node, "b");
        assert_eq!(edges[2].to_node, END_NODE_KEY);
    }
}
