//! Action-envelope wire form (§4.A, §6).
//!
//! An LLM response parses into an [`ActionEnvelope`]. Strict encoding is
//! tagged JSON (`{"actions":[...],"notes":"..."}`); a lenient text encoding
//! (`ACTION: <VERB> <args>` lines, with `OLD:`/`NEW:` `<<<`/`>>>` blocks for
//! `edit_code`) is accepted as a fallback — see `bf-harness::envelope` for
//! the parser. Only the shapes live here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub actions: Vec<Action>,
    #[serde(default)]
    pub notes: String,
}

/// One action, tagged by verb. Field names match the contract table in §4.A.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    EditCode {
        path: String,
        old_text: String,
        new_text: String,
    },
    ReadTree {
        path: String,
        max_depth: u32,
    },
    SearchText {
        query: String,
        path: String,
    },
    RunCommand {
        command: String,
        timeout_ms: u64,
    },
    RunTests {
        pattern: Option<String>,
    },
    RunLinter {
        pattern: Option<String>,
    },
    BuildProject {
        pattern: Option<String>,
    },
    GitCommit {
        message: String,
        files: Vec<String>,
        #[serde(default)]
        allow_all: bool,
    },
    GitPush {
        branch: String,
        #[serde(default)]
        set_upstream: bool,
    },
    CreatePr {
        title: String,
        body: String,
        base: String,
        branch: String,
        #[serde(default)]
        reviewers: Vec<String>,
        #[serde(default)]
        draft: bool,
    },
    CreateBead {
        title: String,
        description: Option<String>,
        bead_type: String,
        priority: u8,
        parent: Option<String>,
    },
    CloseBead {
        bead_id: String,
    },
    EscalateCeo {
        reason: String,
    },
    StartDevelopment {
        args: serde_json::Value,
    },
    WhatsNext {
        args: serde_json::Value,
    },
    ProceedToPhase {
        phase: String,
    },
    ConductReview {
        args: serde_json::Value,
    },
    ResumeWorkflow {
        args: serde_json::Value,
    },
    SendAgentMessage {
        to_agent_id: String,
        subject: String,
        body: String,
        #[serde(default)]
        requires_response: bool,
        #[serde(default)]
        context: serde_json::Value,
    },
    Done {
        reason: String,
    },
}

impl Action {
    /// The verb string as it appears on the wire, used for logging and for
    /// the lenient `ACTION: <VERB>` encoding.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::ReadFile { .. } => "read_file",
            Action::WriteFile { .. } => "write_file",
            Action::EditCode { .. } => "edit_code",
            Action::ReadTree { .. } => "read_tree",
            Action::SearchText { .. } => "search_text",
            Action::RunCommand { .. } => "run_command",
            Action::RunTests { .. } => "run_tests",
            Action::RunLinter { .. } => "run_linter",
            Action::BuildProject { .. } => "build_project",
            Action::GitCommit { .. } => "git_commit",
            Action::GitPush { .. } => "git_push",
            Action::CreatePr { .. } => "create_pr",
            Action::CreateBead { .. } => "create_bead",
            Action::CloseBead { .. } => "close_bead",
            Action::EscalateCeo { .. } => "escalate_ceo",
            Action::StartDevelopment { .. } => "start_development",
            Action::WhatsNext { .. } => "whats_next",
            Action::ProceedToPhase { .. } => "proceed_to_phase",
            Action::ConductReview { .. } => "conduct_review",
            Action::ResumeWorkflow { .. } => "resume_workflow",
            Action::SendAgentMessage { .. } => "send_agent_message",
            Action::Done { .. } => "done",
        }
    }

    /// `true` for the five workflow-guide verbs that return `mcp_required`
    /// and are handled by an external collaborator (§4.E, §9).
    pub fn is_workflow_guide(&self) -> bool {
        matches!(
            self,
            Action::StartDevelopment { .. }
                | Action::WhatsNext { .. }
                | Action::ProceedToPhase { .. }
                | Action::ConductReview { .. }
                | Action::ResumeWorkflow { .. }
        )
    }
}

/// The scope an action executes within (§4.A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionContext {
    pub agent_id: String,
    pub bead_id: String,
    pub project_id: String,
    pub sandbox_root: String,
}

/// Error signals an action can surface (column 4 of the §4.A contract table,
/// plus the taxonomy in §7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionError {
    #[error("not found")]
    NotFound,
    #[error("path escapes sandbox root")]
    OutsideSandbox,
    #[error("io error: {0}")]
    IoError(String),
    #[error("no unique match for edit_code")]
    NoMatch,
    #[error("denied: {0}")]
    Denied(String),
    #[error("timed out")]
    Timeout,
    #[error("non-zero exit: {0}")]
    NonZeroExit(i32),
    #[error("build failure: {0}")]
    BuildFailure(String),
    #[error("commit attribution missing")]
    AttributionMissing,
    #[error("secret detected in diff")]
    SecretDetected,
    #[error("refused: protected branch")]
    ProtectedBranch,
    #[error("branch is not an agent/* branch")]
    NotOnAgentBranch,
    #[error("external tool unavailable: {0}")]
    ToolMissing(String),
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("lock conflict: {0}")]
    LockDenied(String),
}

/// Outcome of executing one action, recorded into the session audit and
/// (on failure) fed to the workflow engine as a `failure` condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub verb: String,
    pub success: bool,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub error: Option<ActionError>,
    pub duration_ms: u64,
}

impl ActionOutcome {
    pub fn ok(verb: &str, detail: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            verb: verb.to_string(),
            success: true,
            detail,
            error: None,
            duration_ms,
        }
    }

    pub fn fail(verb: &str, error: ActionError, duration_ms: u64) -> Self {
        Self {
            verb: verb.to_string(),
            success: false,
            detail: serde_json::Value::Null,
            error: Some(error),
            duration_ms,
        }
    }
}
