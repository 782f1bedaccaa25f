//! Action router (§4.A, §9): a fixed mapping from verb to a handler that
//! executes within an [`ActionContext`] against the sandbox adapters and the
//! bead store. Adding a verb is a match arm here, not a new trait — the
//! dispatch table is the `match` in [`ActionRouter::execute`].
//!
//! The router does not depend on the event bus or the workflow engine —
//! both sit above it in the crate graph. Side effects that belong to those
//! components (publishing `send_agent_message`, escalating to a CEO bead)
//! are returned as [`RouterEvent`]s for the caller (the worker execution
//! loop in `bf-agents`) to act on, the way §6 describes `onActionExecuted`
//! style hooks.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use bf_api_types::action::{Action, ActionContext, ActionEnvelope, ActionError, ActionOutcome};
use bf_core::bead_store::{BeadFilter, BeadPatch, BeadStore};
use bf_core::lock_manager::LockManager;
use bf_core::types::{BeadStatus, BeadType};
use bf_sandbox::git::GitSandbox;
use bf_sandbox::process::{ProcessExecutor, ProjectType};
use bf_sandbox::SandboxFs;

use crate::edit_match::{apply_edit, EditMatchError};
use crate::envelope::{self, EnvelopeParseError};

/// Everything one project's sandbox exposes to the router. One bundle per
/// project, constructed by whoever wires the worker pool up.
pub struct SandboxBundle {
    pub fs: SandboxFs,
    pub git: GitSandbox,
    pub root: std::path::PathBuf,
}

impl SandboxBundle {
    pub fn new(root: impl Into<std::path::PathBuf>, ssh_command: Option<String>) -> Self {
        let root = root.into();
        Self {
            fs: SandboxFs::new(root.clone()),
            git: GitSandbox::new(root.clone(), ssh_command),
            root,
        }
    }

    fn executor(&self) -> ProcessExecutor {
        ProcessExecutor::new(&self.root)
    }
}

/// A side effect the router observed but does not itself carry out.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    BeadCreated { id: String },
    BeadClosed { id: String },
    AgentMessage {
        to_agent_id: String,
        subject: String,
        body: String,
        requires_response: bool,
        context: serde_json::Value,
    },
    CeoEscalation { bead_id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("parse failure, filed as bead {bead_id}")]
    ParseFailure { bead_id: String, raw_truncated: String },
}

pub struct ActionRouter;

impl Default for ActionRouter {
    fn default() -> Self {
        Self
    }
}

impl ActionRouter {
    pub fn new() -> Self {
        Self
    }

    /// Parse `raw` into an envelope. On failure, files a bead tagged
    /// `parse-failure` with the truncated raw text and returns a structured
    /// error (§4.A) — the caller still gets the envelope parse error kind,
    /// not a panic or a swallowed failure.
    pub async fn parse_or_file(
        &self,
        raw: &str,
        ctx: &ActionContext,
        bead_store: &BeadStore,
        prefix: &str,
    ) -> Result<ActionEnvelope, RouterError> {
        match envelope::parse_envelope(raw) {
            Ok(env) => Ok(env),
            Err(EnvelopeParseError::Unparseable(truncated)) => {
                let id = bead_store
                    .create(&ctx.project_id, prefix, format!("[parse-failure] agent {} could not be parsed", ctx.agent_id), BeadType::Bug)
                    .await
                    .map_err(|e| RouterError::ParseFailure { bead_id: format!("<create failed: {e}>"), raw_truncated: truncated.clone() })?;
                let _ = bead_store
                    .update(
                        &id,
                        BeadPatch {
                            description: Some(truncated.clone()),
                            tags: Some(HashSet::from(["parse-failure".to_string()])),
                            ..Default::default()
                        },
                    )
                    .await;
                Err(RouterError::ParseFailure { bead_id: id, raw_truncated: truncated })
            }
        }
    }

    /// Execute every action in `envelope` sequentially, under per-file locks
    /// for write-class actions, stopping at the first `Done` (§4.A's `done`
    /// verb terminates the conversation).
    pub async fn execute_all(
        &self,
        ctx: &ActionContext,
        actions: &[Action],
        sandbox: &SandboxBundle,
        bead_store: &BeadStore,
        locks: &LockManager,
    ) -> (Vec<ActionOutcome>, Vec<RouterEvent>) {
        let mut outcomes = Vec::new();
        let mut events = Vec::new();
        for action in actions {
            let (outcome, mut action_events) = self.execute(ctx, action, sandbox, bead_store, locks).await;
            let is_done = matches!(action, Action::Done { .. });
            events.append(&mut action_events);
            outcomes.push(outcome);
            if is_done {
                break;
            }
        }
        (outcomes, events)
    }

    /// Execute one action. Write-class actions (`write_file`, `edit_code`,
    /// `git_commit`) acquire a [`LockManager`] scope for the duration of the
    /// action and release it on every exit path.
    pub async fn execute(
        &self,
        ctx: &ActionContext,
        action: &Action,
        sandbox: &SandboxBundle,
        bead_store: &BeadStore,
        locks: &LockManager,
    ) -> (ActionOutcome, Vec<RouterEvent>) {
        let start = Instant::now();
        let verb = action.verb();

        if action.is_workflow_guide() {
            let detail = serde_json::json!({"status": "mcp_required", "tool": verb});
            return (ActionOutcome::ok(verb, detail, elapsed_ms(start)), Vec::new());
        }

        match action {
            Action::ReadFile { path } => self.read_file(verb, start, sandbox, path).await,
            Action::WriteFile { path, content } => self.write_file(verb, start, sandbox, locks, ctx, path, content).await,
            Action::EditCode { path, old_text, new_text } => {
                self.edit_code(verb, start, sandbox, locks, ctx, path, old_text, new_text).await
            }
            Action::ReadTree { path, max_depth } => self.read_tree(verb, start, sandbox, path, *max_depth).await,
            Action::SearchText { query, path } => self.search_text(verb, start, sandbox, query, path).await,
            Action::RunCommand { command, timeout_ms } => self.run_command(verb, start, sandbox, command, *timeout_ms).await,
            Action::RunTests { pattern } => self.run_project_command(verb, start, sandbox, pattern.as_deref(), ProjectType::default_test_command).await,
            Action::RunLinter { pattern } => self.run_project_command(verb, start, sandbox, pattern.as_deref(), ProjectType::default_lint_command).await,
            Action::BuildProject { pattern } => self.run_project_command(verb, start, sandbox, pattern.as_deref(), ProjectType::default_build_command).await,
            Action::GitCommit { message, files, allow_all } => {
                self.git_commit(verb, start, sandbox, locks, ctx, message, files, *allow_all).await
            }
            Action::GitPush { branch, set_upstream } => self.git_push(verb, start, sandbox, branch, *set_upstream).await,
            Action::CreatePr { branch, .. } => self.create_pr(verb, start, branch).await,
            Action::CreateBead { title, description, bead_type, priority, parent } => {
                self.create_bead(verb, start, bead_store, ctx, title, description.as_deref(), bead_type, *priority, parent.as_deref()).await
            }
            Action::CloseBead { bead_id } => self.close_bead(verb, start, bead_store, bead_id).await,
            Action::EscalateCeo { reason } => self.escalate_ceo(verb, start, bead_store, ctx, reason).await,
            Action::SendAgentMessage { to_agent_id, subject, body, requires_response, context } => {
                let outcome = ActionOutcome::ok(verb, serde_json::json!({"queued": true}), elapsed_ms(start));
                let event = RouterEvent::AgentMessage {
                    to_agent_id: to_agent_id.clone(),
                    subject: subject.clone(),
                    body: body.clone(),
                    requires_response: *requires_response,
                    context: context.clone(),
                };
                (outcome, vec![event])
            }
            Action::Done { reason } => (ActionOutcome::ok(verb, serde_json::json!({"reason": reason}), elapsed_ms(start)), Vec::new()),
            Action::StartDevelopment { .. }
            | Action::WhatsNext { .. }
            | Action::ProceedToPhase { .. }
            | Action::ConductReview { .. }
            | Action::ResumeWorkflow { .. } => unreachable!("handled by is_workflow_guide() above"),
        }
    }

    async fn read_file(&self, verb: &'static str, start: Instant, sandbox: &SandboxBundle, path: &str) -> (ActionOutcome, Vec<RouterEvent>) {
        match sandbox.fs.read_to_string(path).await {
            Ok(content) => (ActionOutcome::ok(verb, serde_json::json!({"content": content}), elapsed_ms(start)), Vec::new()),
            Err(bf_sandbox::FsError::OutsideSandbox(_)) => (ActionOutcome::fail(verb, ActionError::OutsideSandbox, elapsed_ms(start)), Vec::new()),
            Err(bf_sandbox::FsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                (ActionOutcome::fail(verb, ActionError::NotFound, elapsed_ms(start)), Vec::new())
            }
            Err(e) => (ActionOutcome::fail(verb, ActionError::IoError(e.to_string()), elapsed_ms(start)), Vec::new()),
        }
    }

    async fn write_file(
        &self,
        verb: &'static str,
        start: Instant,
        sandbox: &SandboxBundle,
        locks: &LockManager,
        ctx: &ActionContext,
        path: &str,
        content: &str,
    ) -> (ActionOutcome, Vec<RouterEvent>) {
        if let Err(e) = self.acquire_scope(locks, ctx, path).await {
            return (ActionOutcome::fail(verb, e, elapsed_ms(start)), Vec::new());
        }
        let result = sandbox.fs.write(path, content).await;
        self.release_scope(locks, ctx, path).await;
        match result {
            Ok(()) => (ActionOutcome::ok(verb, serde_json::json!({"path": path}), elapsed_ms(start)), Vec::new()),
            Err(bf_sandbox::FsError::OutsideSandbox(_)) => (ActionOutcome::fail(verb, ActionError::OutsideSandbox, elapsed_ms(start)), Vec::new()),
            Err(e) => (ActionOutcome::fail(verb, ActionError::IoError(e.to_string()), elapsed_ms(start)), Vec::new()),
        }
    }

    async fn edit_code(
        &self,
        verb: &'static str,
        start: Instant,
        sandbox: &SandboxBundle,
        locks: &LockManager,
        ctx: &ActionContext,
        path: &str,
        old_text: &str,
        new_text: &str,
    ) -> (ActionOutcome, Vec<RouterEvent>) {
        if let Err(e) = self.acquire_scope(locks, ctx, path).await {
            return (ActionOutcome::fail(verb, e, elapsed_ms(start)), Vec::new());
        }
        let outcome = self.edit_code_locked(verb, sandbox, path, old_text, new_text).await;
        self.release_scope(locks, ctx, path).await;
        (ActionOutcome { duration_ms: elapsed_ms(start), ..outcome }, Vec::new())
    }

    async fn edit_code_locked(&self, verb: &'static str, sandbox: &SandboxBundle, path: &str, old_text: &str, new_text: &str) -> ActionOutcome {
        let current = match sandbox.fs.read_to_string(path).await {
            Ok(c) => c,
            Err(bf_sandbox::FsError::OutsideSandbox(_)) => return ActionOutcome::fail(verb, ActionError::OutsideSandbox, 0),
            Err(_) => return ActionOutcome::fail(verb, ActionError::NotFound, 0),
        };
        match apply_edit(&current, old_text, new_text) {
            Ok(updated) => match sandbox.fs.write(path, &updated).await {
                Ok(()) => ActionOutcome::ok(verb, serde_json::json!({"path": path}), 0),
                Err(e) => ActionOutcome::fail(verb, ActionError::IoError(e.to_string()), 0),
            },
            Err(EditMatchError::NoMatch) => ActionOutcome::fail(verb, ActionError::NoMatch, 0),
        }
    }

    async fn read_tree(&self, verb: &'static str, start: Instant, sandbox: &SandboxBundle, path: &str, max_depth: u32) -> (ActionOutcome, Vec<RouterEvent>) {
        let root = match sandbox.fs.resolve(path) {
            Ok(p) => p,
            Err(_) => return (ActionOutcome::fail(verb, ActionError::OutsideSandbox, elapsed_ms(start)), Vec::new()),
        };
        let mut entries = Vec::new();
        walk_tree(&root, &root, 0, max_depth, &mut entries);
        (ActionOutcome::ok(verb, serde_json::json!({"entries": entries}), elapsed_ms(start)), Vec::new())
    }

    async fn search_text(&self, verb: &'static str, start: Instant, sandbox: &SandboxBundle, query: &str, path: &str) -> (ActionOutcome, Vec<RouterEvent>) {
        let root = match sandbox.fs.resolve(path) {
            Ok(p) => p,
            Err(_) => return (ActionOutcome::fail(verb, ActionError::OutsideSandbox, elapsed_ms(start)), Vec::new()),
        };
        let mut hits = Vec::new();
        let mut entries = Vec::new();
        walk_tree(&root, &root, 0, 64, &mut entries);
        for entry in entries.iter().filter(|e| e.kind == "file") {
            let full = root.join(&entry.relpath);
            if let Ok(text) = tokio::fs::read_to_string(&full).await {
                for (line_no, line) in text.lines().enumerate() {
                    if let Some(col) = line.find(query) {
                        hits.push(serde_json::json!({
                            "path": entry.relpath,
                            "line": line_no + 1,
                            "col": col + 1,
                            "text": line,
                        }));
                    }
                }
            }
        }
        (ActionOutcome::ok(verb, serde_json::json!({"hits": hits}), elapsed_ms(start)), Vec::new())
    }

    async fn run_command(&self, verb: &'static str, start: Instant, sandbox: &SandboxBundle, command: &str, timeout_ms: u64) -> (ActionOutcome, Vec<RouterEvent>) {
        let parts: Vec<String> = shell_split(command);
        let Some((program, args)) = parts.split_first() else {
            return (ActionOutcome::fail(verb, ActionError::Validation("empty command".into()), elapsed_ms(start)), Vec::new());
        };
        let outcome = sandbox.executor().run(program, args, Duration::from_millis(timeout_ms)).await;
        self.process_result(verb, start, outcome)
    }

    async fn run_project_command(
        &self,
        verb: &'static str,
        start: Instant,
        sandbox: &SandboxBundle,
        pattern: Option<&str>,
        default_for: impl Fn(&ProjectType) -> Option<(&'static str, &'static [&'static str])>,
    ) -> (ActionOutcome, Vec<RouterEvent>) {
        if let Some(pattern) = pattern {
            let parts = shell_split(pattern);
            if let Some((program, args)) = parts.split_first() {
                let outcome = sandbox.executor().run(program, args, Duration::from_secs(600)).await;
                return self.process_result(verb, start, outcome);
            }
        }
        let project_type = ProjectType::detect(&sandbox.root);
        match default_for(&project_type) {
            Some((program, args)) => {
                let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
                let outcome = sandbox.executor().run(program, &args, Duration::from_secs(600)).await;
                self.process_result(verb, start, outcome)
            }
            None => (ActionOutcome::fail(verb, ActionError::BuildFailure("no recognized project type".into()), elapsed_ms(start)), Vec::new()),
        }
    }

    fn process_result(&self, verb: &'static str, start: Instant, outcome: Result<bf_sandbox::process::ProcessOutcome, bf_sandbox::process::ProcessError>) -> (ActionOutcome, Vec<RouterEvent>) {
        match outcome {
            Ok(out) if out.success() => (
                ActionOutcome::ok(verb, serde_json::json!({"stdout": out.stdout, "stderr": out.stderr, "exit_code": out.exit_code}), elapsed_ms(start)),
                Vec::new(),
            ),
            Ok(out) => {
                let code = out.exit_code.unwrap_or(-1);
                let mut outcome = ActionOutcome::fail(verb, ActionError::NonZeroExit(code), elapsed_ms(start));
                outcome.detail = serde_json::json!({"stdout": out.stdout, "stderr": out.stderr, "exit_code": out.exit_code});
                (outcome, Vec::new())
            }
            Err(bf_sandbox::process::ProcessError::TimedOut(_)) => (ActionOutcome::fail(verb, ActionError::Timeout, elapsed_ms(start)), Vec::new()),
            Err(e) => (ActionOutcome::fail(verb, ActionError::IoError(e.to_string()), elapsed_ms(start)), Vec::new()),
        }
    }

    async fn git_commit(
        &self,
        verb: &'static str,
        start: Instant,
        sandbox: &SandboxBundle,
        locks: &LockManager,
        ctx: &ActionContext,
        message: &str,
        files: &[String],
        allow_all: bool,
    ) -> (ActionOutcome, Vec<RouterEvent>) {
        let mut locked_files = Vec::new();
        if !allow_all {
            for file in files {
                if let Err(e) = self.acquire_scope(locks, ctx, file).await {
                    for held in &locked_files {
                        self.release_scope(locks, ctx, held).await;
                    }
                    return (ActionOutcome::fail(verb, e, elapsed_ms(start)), Vec::new());
                }
                locked_files.push(file.clone());
            }
        }

        let add_paths = if allow_all { vec![".".to_string()] } else { files.to_vec() };
        let outcome = self.git_commit_locked(verb, sandbox, &add_paths, message).await;
        for file in &locked_files {
            self.release_scope(locks, ctx, file).await;
        }
        (ActionOutcome { duration_ms: elapsed_ms(start), ..outcome }, Vec::new())
    }

    async fn git_commit_locked(&self, verb: &'static str, sandbox: &SandboxBundle, add_paths: &[String], message: &str) -> ActionOutcome {
        if let Err(e) = sandbox.git.add(add_paths).await {
            return ActionOutcome::fail(verb, ActionError::IoError(e.to_string()), 0);
        }
        match sandbox.git.commit(message).await {
            Ok(out) => ActionOutcome::ok(verb, serde_json::json!({"stdout": out.stdout}), 0),
            Err(bf_sandbox::git::GitError::ProtectedBranch(_)) => ActionOutcome::fail(verb, ActionError::ProtectedBranch, 0),
            Err(bf_sandbox::git::GitError::MissingAttribution) => ActionOutcome::fail(verb, ActionError::AttributionMissing, 0),
            Err(bf_sandbox::git::GitError::SecretDetected) => ActionOutcome::fail(verb, ActionError::SecretDetected, 0),
            Err(e) => ActionOutcome::fail(verb, ActionError::IoError(e.to_string()), 0),
        }
    }

    async fn git_push(&self, verb: &'static str, start: Instant, sandbox: &SandboxBundle, branch: &str, _set_upstream: bool) -> (ActionOutcome, Vec<RouterEvent>) {
        match sandbox.git.push("origin", branch).await {
            Ok(out) => (ActionOutcome::ok(verb, serde_json::json!({"stdout": out.stdout}), elapsed_ms(start)), Vec::new()),
            Err(bf_sandbox::git::GitError::ProtectedBranch(_) | bf_sandbox::git::GitError::InvalidBranch(_)) => {
                (ActionOutcome::fail(verb, ActionError::ProtectedBranch, elapsed_ms(start)), Vec::new())
            }
            Err(e) => (ActionOutcome::fail(verb, ActionError::IoError(e.to_string()), elapsed_ms(start)), Vec::new()),
        }
    }

    /// `create_pr` delegates to an external PR tool (§4.A); the core only
    /// enforces the `agent/*` branch precondition and reports `mcp_required`
    /// for the host to hand off to that collaborator.
    async fn create_pr(&self, verb: &'static str, start: Instant, branch: &str) -> (ActionOutcome, Vec<RouterEvent>) {
        if bf_sandbox::git::validate_branch_name(branch).is_err() {
            return (ActionOutcome::fail(verb, ActionError::NotOnAgentBranch, elapsed_ms(start)), Vec::new());
        }
        (ActionOutcome::ok(verb, serde_json::json!({"status": "mcp_required", "tool": "create_pr"}), elapsed_ms(start)), Vec::new())
    }

    async fn create_bead(
        &self,
        verb: &'static str,
        start: Instant,
        bead_store: &BeadStore,
        ctx: &ActionContext,
        title: &str,
        description: Option<&str>,
        bead_type: &str,
        priority: u8,
        parent: Option<&str>,
    ) -> (ActionOutcome, Vec<RouterEvent>) {
        let Some(bead_type) = parse_bead_type(bead_type) else {
            return (ActionOutcome::fail(verb, ActionError::Validation(format!("unknown bead type: {bead_type}")), elapsed_ms(start)), Vec::new());
        };
        let prefix = ctx.bead_id.split('-').next().unwrap_or("bd");
        match bead_store.create(&ctx.project_id, prefix, title.to_string(), bead_type).await {
            Ok(id) => {
                let patch = BeadPatch {
                    priority: Some(priority),
                    description: description.map(|d| d.to_string()),
                    ..Default::default()
                };
                let _ = bead_store.update(&id, patch).await;
                if let Some(parent) = parent {
                    let _ = bead_store.add_dependency(&id, parent, bf_core::types::EdgeKind::Parent).await;
                }
                let outcome = ActionOutcome::ok(verb, serde_json::json!({"bead_id": id}), elapsed_ms(start));
                (outcome, vec![RouterEvent::BeadCreated { id }])
            }
            Err(e) => (ActionOutcome::fail(verb, ActionError::Validation(e.to_string()), elapsed_ms(start)), Vec::new()),
        }
    }

    async fn close_bead(&self, verb: &'static str, start: Instant, bead_store: &BeadStore, bead_id: &str) -> (ActionOutcome, Vec<RouterEvent>) {
        match bead_store.update(bead_id, BeadPatch { status: Some(BeadStatus::Closed), ..Default::default() }).await {
            Ok(_) => (ActionOutcome::ok(verb, serde_json::json!({"bead_id": bead_id}), elapsed_ms(start)), vec![RouterEvent::BeadClosed { id: bead_id.to_string() }]),
            Err(e) => (ActionOutcome::fail(verb, ActionError::Validation(e.to_string()), elapsed_ms(start)), Vec::new()),
        }
    }

    /// Creates a priority-0 decision bead tagged `[CEO]` (§4.A, §7).
    async fn escalate_ceo(&self, verb: &'static str, start: Instant, bead_store: &BeadStore, ctx: &ActionContext, reason: &str) -> (ActionOutcome, Vec<RouterEvent>) {
        let prefix = ctx.bead_id.split('-').next().unwrap_or("bd");
        match bead_store.create(&ctx.project_id, prefix, format!("[CEO] {reason}"), BeadType::Decision).await {
            Ok(id) => {
                let _ = bead_store.update(&id, BeadPatch { priority: Some(0), ..Default::default() }).await;
                (
                    ActionOutcome::ok(verb, serde_json::json!({"bead_id": id}), elapsed_ms(start)),
                    vec![RouterEvent::CeoEscalation { bead_id: id }],
                )
            }
            Err(e) => (ActionOutcome::fail(verb, ActionError::Validation(e.to_string()), elapsed_ms(start)), Vec::new()),
        }
    }

    /// Acquire the file lock an action needs before it touches `path`.
    /// Callers must pair this with [`ActionRouter::release_scope`] on every
    /// exit path — write-class actions run through a `_locked` helper that
    /// never early-returns so the release always happens.
    async fn acquire_scope(&self, locks: &LockManager, ctx: &ActionContext, path: &str) -> Result<(), ActionError> {
        locks
            .acquire(&ctx.project_id, path, &ctx.agent_id, &ctx.bead_id)
            .await
            .map_err(|e| ActionError::LockDenied(e.to_string()))?;
        Ok(())
    }

    async fn release_scope(&self, locks: &LockManager, ctx: &ActionContext, path: &str) {
        if let Err(e) = locks.release(&ctx.project_id, path, &ctx.agent_id).await {
            tracing::warn!(project_id = %ctx.project_id, path, error = %e, "failed to release file lock");
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn parse_bead_type(s: &str) -> Option<BeadType> {
    match s {
        "epic" => Some(BeadType::Epic),
        "feature" => Some(BeadType::Feature),
        "task" => Some(BeadType::Task),
        "bug" => Some(BeadType::Bug),
        "decision" => Some(BeadType::Decision),
        "chore" => Some(BeadType::Chore),
        _ => None,
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct TreeEntry {
    relpath: String,
    kind: &'static str,
    size: u64,
}

fn walk_tree(root: &std::path::Path, dir: &std::path::Path, depth: u32, max_depth: u32, out: &mut Vec<TreeEntry>) {
    if depth > max_depth {
        return;
    }
    let Ok(read_dir) = std::fs::read_dir(dir) else { return };
    for entry in read_dir.flatten() {
        let path = entry.path();
        let relpath = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().to_string();
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            out.push(TreeEntry { relpath, kind: "dir", size: 0 });
            walk_tree(root, &path, depth + 1, max_depth, out);
        } else {
            out.push(TreeEntry { relpath, kind: "file", size: meta.len() });
        }
    }
}

/// Minimal shell-word split (quotes and backslash-escapes, no globbing or
/// variable expansion) used for `run_command`'s free-form command string.
fn shell_split(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes: Option<char> = None;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match in_quotes {
            Some(q) if c == q => in_quotes = None,
            Some(_) => current.push(c),
            None => match c {
                '"' | '\'' => in_quotes = Some(c),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                c => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_split_handles_quoted_args() {
        let parts = shell_split(r#"cargo test --package "my crate" -- --nocapture"#);
        assert_eq!(parts, vec!["cargo", "test", "--package", "my crate", "--", "--nocapture"]);
    }

    #[test]
    fn parse_bead_type_rejects_unknown() {
        assert!(parse_bead_type("nonsense").is_none());
        assert_eq!(parse_bead_type("bug"), Some(BeadType::Bug));
    }

    #[tokio::test]
    async fn read_file_outside_sandbox_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxBundle::new(dir.path(), None);
        let router = ActionRouter::new();
        let start = Instant::now();
        let (outcome, _events) = router.read_file("read_file", start, &sandbox, "../../etc/passwd").await;
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(ActionError::OutsideSandbox));
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_the_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxBundle::new(dir.path(), None);
        let router = ActionRouter::new();
        let locks = LockManager::open_in_memory(chrono::Duration::minutes(5)).await.unwrap();
        let ctx = ActionContext {
            agent_id: "agent-1".into(),
            bead_id: "bf-1".into(),
            project_id: "proj".into(),
            sandbox_root: dir.path().display().to_string(),
        };
        let (outcome, _) = router.write_file("write_file", Instant::now(), &sandbox, &locks, &ctx, "a.txt", "hello").await;
        assert!(outcome.success);
        let (outcome, _) = router.read_file("read_file", Instant::now(), &sandbox, "a.txt").await;
        assert!(outcome.success);
        assert_eq!(outcome.detail["content"], "hello");
    }
}
