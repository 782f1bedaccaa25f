//! Relational shape (§6). The backend is unspecified by the design; these
//! structs fix the column set any SQL-ish store (or a row mapper over one)
//! must expose. `bf-core`'s sqlite-backed store maps its tables onto these
//! shapes but is free to choose its own internal row representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeadRow {
    pub id: String,
    pub r#type: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: i32,
    pub project_id: String,
    pub assigned_to: Option<String>,
    pub parent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub context_json: String,
    pub tags_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeadEdgeRow {
    pub from_id: String,
    pub to_id: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRow {
    pub id: String,
    pub name: String,
    pub workflow_type: String,
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNodeRow {
    pub workflow_id: String,
    pub id: String,
    pub node_key: String,
    pub node_type: String,
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdgeRow {
    pub workflow_id: String,
    pub from_node_key: String,
    pub to_node_key: String,
    pub condition: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionRow {
    pub id: String,
    pub workflow_id: String,
    pub bead_id: String,
    pub project_id: String,
    pub current_node_key: String,
    pub status: String,
    pub cycle_count: i32,
    pub node_attempt_count: i32,
    pub started_at: DateTime<Utc>,
    pub last_node_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionHistoryRow {
    pub execution_id: String,
    pub node_key: String,
    pub condition: String,
    pub agent_id: Option<String>,
    pub outcome_json: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRow {
    pub id: String,
    pub r#type: String,
    pub endpoint: String,
    pub model: String,
    pub model_params_b: f64,
    pub capability_score: f64,
    pub avg_latency_ms: f64,
    pub cost_per_m_token: f64,
    pub context_window: i64,
    pub supports_function: bool,
    pub supports_vision: bool,
    pub supports_streaming: bool,
    pub tags_json: String,
    pub status: String,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLockRow {
    pub project_id: String,
    pub file_path: String,
    pub agent_id: String,
    pub bead_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMemoryRow {
    pub project_id: String,
    pub category: String,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
    pub source_bead: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedLockRow {
    pub name: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
