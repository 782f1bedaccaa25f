//! The data model: beads and their dependency graph, workers, personas,
//! providers, file locks, lessons, and project memory. Plain data only — the
//! owning stores in this crate are where behavior lives.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Bead id
// ---------------------------------------------------------------------------

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Render a counter as lowercase base36, the way every project's bead ids
/// (`<prefix>-<base36>`) stay short even after thousands of beads.
pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 alphabet is ascii")
}

pub fn bead_id(prefix: &str, counter: u64) -> String {
    format!("{prefix}-{}", to_base36(counter))
}

// ---------------------------------------------------------------------------
// BeadType / BeadStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadType {
    Epic,
    Feature,
    Task,
    Bug,
    Decision,
    Chore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl BeadStatus {
    /// Whether a bead currently in `self` may move directly to `next`.
    /// `closed` is terminal; every other pair is reachable, since blocking
    /// and unblocking can interleave with claim/release at any point.
    pub fn can_transition_to(self, next: BeadStatus) -> bool {
        if self == next {
            return true;
        }
        self != BeadStatus::Closed
    }
}

impl std::fmt::Display for BeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BeadStatus::Open => "open",
            BeadStatus::InProgress => "in_progress",
            BeadStatus::Blocked => "blocked",
            BeadStatus::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Decision-bead detail
// ---------------------------------------------------------------------------

/// Fields only populated when `bead_type == Decision`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionDetails {
    pub question: String,
    pub options: Vec<String>,
    pub recommendation: Option<String>,
    pub decider_id: Option<String>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl DecisionDetails {
    pub fn is_resolved(&self) -> bool {
        self.decision.is_some()
    }
}

// ---------------------------------------------------------------------------
// Bead
// ---------------------------------------------------------------------------

/// Context keys components read/write without the bead store needing to know
/// their meaning. Kept as constants so nobody typos a key string.
pub mod context_keys {
    pub const REDISPATCH_REQUESTED: &str = "redispatch_requested";
    pub const WORKFLOW_EXECUTION_ID: &str = "workflow_execution_id";
    pub const WORKFLOW_NODE_KEY: &str = "workflow_node_key";
    pub const REQUIRES_HUMAN: &str = "requires_human";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bead {
    pub id: String,
    pub title: String,
    pub description: String,
    pub bead_type: BeadType,
    /// 0 (highest) through 3 (lowest).
    pub priority: u8,
    pub status: BeadStatus,
    pub assigned_to: Option<String>,
    pub project_id: String,
    pub parent: Option<String>,
    pub children: HashSet<String>,
    pub blocked_by: HashSet<String>,
    pub blocks: HashSet<String>,
    pub related_to: HashSet<String>,
    pub tags: HashSet<String>,
    pub context: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub decision: Option<DecisionDetails>,
}

impl Bead {
    pub fn new(id: String, project_id: String, title: String, bead_type: BeadType) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            description: String::new(),
            bead_type,
            priority: 2,
            status: BeadStatus::Open,
            assigned_to: None,
            project_id,
            parent: None,
            children: HashSet::new(),
            blocked_by: HashSet::new(),
            blocks: HashSet::new(),
            related_to: HashSet::new(),
            tags: HashSet::new(),
            context: HashMap::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            decision: if matches!(bead_type, BeadType::Decision) {
                Some(DecisionDetails::default())
            } else {
                None
            },
        }
    }

    /// Ready to claim: open, not blocked by anything still open, not yet
    /// assigned.
    pub fn is_ready(&self) -> bool {
        self.status == BeadStatus::Open && self.assigned_to.is_none()
    }

    pub fn is_auto_filed(&self) -> bool {
        self.title.starts_with("[auto-filed]")
    }

    pub fn is_escalation(&self) -> bool {
        self.bead_type == BeadType::Decision && self.title.starts_with("[CEO]")
    }

    pub fn redispatch_requested(&self) -> bool {
        self.context
            .get(context_keys::REDISPATCH_REQUESTED)
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// WorkGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Blocks,
    Parent,
    Related,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// A read-only projection of beads plus their edges, returned by
/// `BeadStore::work_graph` for callers that want the whole dependency shape
/// (the dispatcher's ready-set pass, `beadctl show-graph`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkGraph {
    pub beads: HashMap<String, Bead>,
    pub edges: Vec<Edge>,
    pub computed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    Stopped,
    Error,
}

impl WorkerStatus {
    pub fn glyph(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "*",
            WorkerStatus::Working => "@",
            WorkerStatus::Stopped => "x",
            WorkerStatus::Error => "!",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub persona_name: String,
    pub provider_id: String,
    pub status: WorkerStatus,
    pub current_bead: Option<String>,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl Worker {
    pub fn new(id: String, name: String, persona_name: String, provider_id: String, project_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            persona_name,
            provider_id,
            status: WorkerStatus::Idle,
            current_bead: None,
            project_id,
            started_at: now,
            last_heartbeat: now,
        }
    }

    pub fn is_stale(&self, staleness_threshold: chrono::Duration) -> bool {
        Utc::now() - self.last_heartbeat > staleness_threshold
    }
}

// ---------------------------------------------------------------------------
// Persona
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    Supervised,
    Semi,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub character: String,
    pub tone: String,
    pub mission: String,
    pub focus_areas: Vec<String>,
    pub capabilities: HashSet<String>,
    pub autonomy_level: AutonomyLevel,
    pub collaboration: String,
    pub standards: Vec<String>,
}

// ---------------------------------------------------------------------------
// Provider descriptor (distinct from bf-provider's runtime health bookkeeping
// — this is the persisted record the store round-trips)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Active,
    Healthy,
    Degraded,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub provider_type: String,
    pub endpoint: String,
    pub model: String,
    pub model_params_billion: f64,
    pub context_window: u64,
    pub supports_function_calling: bool,
    pub supports_vision: bool,
    pub supports_streaming: bool,
    pub cost_per_million_tokens: f64,
    pub status: ProviderStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub avg_request_latency_ms: f64,
    pub success_rate: f64,
    pub sample_count: u64,
    pub tags: HashSet<String>,
}

// ---------------------------------------------------------------------------
// FileLock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLock {
    pub project_id: String,
    pub file_path: String,
    pub agent_id: String,
    pub bead_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FileLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Lessons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonCategory {
    BuildFailure,
    EditFailure,
    TestFailure,
    ReviewFeedback,
    General,
}

impl std::fmt::Display for LessonCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LessonCategory::BuildFailure => "build_failure",
            LessonCategory::EditFailure => "edit_failure",
            LessonCategory::TestFailure => "test_failure",
            LessonCategory::ReviewFeedback => "review_feedback",
            LessonCategory::General => "general",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonEntry {
    pub category: LessonCategory,
    pub title: String,
    pub detail: String,
    pub bead_id: Option<String>,
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Project memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMemoryEntry {
    pub project_id: String,
    pub category: String,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
    pub source_bead: Option<String>,
}

// ---------------------------------------------------------------------------
// KpiSnapshot (supplemented)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub total_beads: u64,
    pub open: u64,
    pub in_progress: u64,
    pub blocked: u64,
    pub closed: u64,
    pub escalated: u64,
    pub active_workers: u64,
    pub mean_cycle_time_secs: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_round_trips_zero_and_small_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn bead_id_formats_with_prefix() {
        assert_eq!(bead_id("bf", 36), "bf-10");
    }

    #[test]
    fn new_bead_is_ready_and_open() {
        let b = Bead::new("bf-1".into(), "proj".into(), "title".into(), BeadType::Task);
        assert!(b.is_ready());
        assert_eq!(b.status, BeadStatus::Open);
        assert!(b.decision.is_none());
    }

    #[test]
    fn decision_bead_gets_decision_details() {
        let b = Bead::new("bf-2".into(), "proj".into(), "pick one".into(), BeadType::Decision);
        assert!(b.decision.is_some());
        assert!(!b.decision.unwrap().is_resolved());
    }

    #[test]
    fn closed_status_is_terminal() {
        assert!(!BeadStatus::Closed.can_transition_to(BeadStatus::Open));
        assert!(BeadStatus::Open.can_transition_to(BeadStatus::Blocked));
    }

    #[test]
    fn auto_filed_and_escalation_detection() {
        let mut b = Bead::new("bf-3".into(), "proj".into(), "[auto-filed] build broke".into(), BeadType::Bug);
        assert!(b.is_auto_filed());
        b.title = "[CEO] pick a framework".into();
        b.bead_type = BeadType::Decision;
        assert!(b.is_escalation());
    }
}
