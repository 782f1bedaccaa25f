//! Worker execution loop (§4.F): claim a bead, compose the system prompt
//! from persona + lessons tail, dispatch one chat completion, route the
//! returned action envelope, and advance the bead's workflow from the
//! outcome. Grounded in `at-agents::task_runner`'s single-pass task
//! execution shape, combined with `at-agents::supervisor`'s heartbeat loop
//! — here expressed as a `tokio::select!` race between the session future
//! and a heartbeat ticker rather than a second spawned task, since the pool
//! is borrowed rather than `Arc`-shared.

use std::time::Duration;

use bf_api_types::action::{ActionContext, ActionOutcome};
use bf_api_types::chat::{ChatMessage, ChatRequest};
use bf_core::bead_store::BeadStore;
use bf_core::lock_manager::LockManager;
use bf_core::lessons::LessonsJournal;
use bf_core::types::{LessonCategory, Persona};
use bf_harness::provider::ProviderError;
use bf_harness::router::{ActionRouter, RouterEvent, SandboxBundle};
use bf_provider::router::{MetricsSink, ProviderRouter};
use bf_workflow::execution::{WorkflowEffect, WorkflowEngine, WorkflowExecution};
use bf_workflow::types::{Condition, NodeType};

use crate::pool::{PoolError, WorkerPool};

/// Default heartbeat cadence (§4.F): a working worker's `lastHeartbeat`
/// advances at least this often.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Default per-task wall-clock budget (§4.F) before the worker is marked
/// errored and its bead redispatched.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub struct TaskContext<'a> {
    pub worker_id: &'a str,
    pub agent_id: &'a str,
    pub bead_id: &'a str,
    pub project_id: &'a str,
    pub bead_prefix: &'a str,
    pub provider_id: &'a str,
    pub model: &'a str,
    pub max_tokens: u32,
    pub persona: &'a Persona,
    pub task_prompt: String,
}

pub struct ExecuteTaskOutcome {
    pub condition: Condition,
    pub last_outcome_detail: Option<String>,
    pub action_outcomes: Vec<ActionOutcome>,
    pub router_events: Vec<RouterEvent>,
    pub workflow_execution: Option<WorkflowExecution>,
    pub workflow_effects: Vec<WorkflowEffect>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteTaskError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Workflow(#[from] bf_workflow::execution::WorkflowError),
}

struct SessionOutcome {
    condition: Condition,
    last_outcome_detail: Option<String>,
    action_outcomes: Vec<ActionOutcome>,
    router_events: Vec<RouterEvent>,
}

/// Runs one claim -> dispatch -> route -> advance pass for `ctx.bead_id`.
#[allow(clippy::too_many_arguments)]
pub async fn execute_task(
    pool: &WorkerPool,
    provider_router: &ProviderRouter,
    action_router: &ActionRouter,
    workflow: &WorkflowEngine,
    sandbox: &SandboxBundle,
    bead_store: &BeadStore,
    locks: &LockManager,
    lessons: &LessonsJournal,
    metrics: &dyn MetricsSink,
    ctx: TaskContext<'_>,
    heartbeat_interval: Duration,
    timeout: Duration,
) -> Result<ExecuteTaskOutcome, ExecuteTaskError> {
    pool.claim(ctx.worker_id, ctx.bead_id)?;

    let session = run_session(provider_router, action_router, workflow, sandbox, bead_store, locks, lessons, metrics, &ctx);
    tokio::pin!(session);
    let mut ticker = tokio::time::interval(heartbeat_interval);
    ticker.tick().await;

    let raced = tokio::time::timeout(timeout, async {
        loop {
            tokio::select! {
                outcome = &mut session => break outcome,
                _ = ticker.tick() => {
                    if pool.heartbeat(ctx.worker_id).is_err() {
                        tracing::warn!(worker_id = ctx.worker_id, "heartbeat on vanished worker");
                    }
                }
            }
        }
    })
    .await;

    let session_outcome = match raced {
        Ok(outcome) => outcome,
        Err(_elapsed) => {
            pool.mark_error(ctx.worker_id)?;
            let (execution, effects) = workflow.advance(ctx.bead_id, Condition::Timeout, ctx.agent_id, Some("worker task exceeded its time budget".to_string()))?;
            return Ok(ExecuteTaskOutcome {
                condition: Condition::Timeout,
                last_outcome_detail: Some("task timed out".to_string()),
                action_outcomes: Vec::new(),
                router_events: Vec::new(),
                workflow_execution: Some(execution),
                workflow_effects: effects,
            });
        }
    };

    pool.release(ctx.worker_id)?;

    let (execution, effects) = workflow.advance(ctx.bead_id, session_outcome.condition, ctx.agent_id, session_outcome.last_outcome_detail.clone())?;

    Ok(ExecuteTaskOutcome {
        condition: session_outcome.condition,
        last_outcome_detail: session_outcome.last_outcome_detail,
        action_outcomes: session_outcome.action_outcomes,
        router_events: session_outcome.router_events,
        workflow_execution: Some(execution),
        workflow_effects: effects,
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    provider_router: &ProviderRouter,
    action_router: &ActionRouter,
    workflow: &WorkflowEngine,
    sandbox: &SandboxBundle,
    bead_store: &BeadStore,
    locks: &LockManager,
    lessons: &LessonsJournal,
    metrics: &dyn MetricsSink,
    ctx: &TaskContext<'_>,
) -> SessionOutcome {
    let lessons_tail = lessons.get_lessons_for_prompt(4_000).await.unwrap_or_default();
    let system_prompt = crate::persona::compose_system_prompt(ctx.persona, &lessons_tail);

    let request = ChatRequest {
        model: ctx.model.to_string(),
        messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(ctx.task_prompt.clone())],
        temperature: 0.7,
        max_tokens: ctx.max_tokens,
        stream: false,
    };

    let response = match provider_router.send_chat_completion(ctx.provider_id, request, metrics).await {
        Ok(response) => response,
        Err(e) => {
            record_failure(lessons, ctx, &e).await;
            return SessionOutcome {
                condition: Condition::Failure,
                last_outcome_detail: Some(e.to_string()),
                action_outcomes: Vec::new(),
                router_events: Vec::new(),
            };
        }
    };

    let content = response.first_content().unwrap_or_default().to_string();

    let action_ctx = ActionContext {
        agent_id: ctx.agent_id.to_string(),
        bead_id: ctx.bead_id.to_string(),
        project_id: ctx.project_id.to_string(),
        sandbox_root: sandbox.root.to_string_lossy().to_string(),
    };

    let envelope = match action_router.parse_or_file(&content, &action_ctx, bead_store, ctx.bead_prefix).await {
        Ok(envelope) => envelope,
        Err(bf_harness::router::RouterError::ParseFailure { bead_id, .. }) => {
            let _ = lessons
                .record_edit_failure(format!("agent output could not be parsed; filed as {bead_id}"), Some(ctx.bead_id.to_string()), Some(ctx.agent_id.to_string()))
                .await;
            return SessionOutcome {
                condition: Condition::Failure,
                last_outcome_detail: Some(format!("parse failure filed as {bead_id}")),
                action_outcomes: Vec::new(),
                router_events: Vec::new(),
            };
        }
    };

    let (action_outcomes, router_events) = action_router.execute_all(&action_ctx, &envelope.actions, sandbox, bead_store, locks).await;

    if let Some(failure) = action_outcomes.iter().find(|o| !o.success) {
        let detail = failure.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
        let _ = lessons
            .record_lesson(LessonCategory::General, format!("{} failed", failure.verb), detail.clone(), Some(ctx.bead_id.to_string()), Some(ctx.agent_id.to_string()))
            .await;
        return SessionOutcome { condition: Condition::Failure, last_outcome_detail: Some(detail), action_outcomes, router_events };
    }

    let last_outcome_detail = action_outcomes.last().map(|o| o.detail.to_string());

    let (condition, detail) = match workflow.current_node_type(ctx.bead_id) {
        Some(NodeType::Commit) if !action_outcomes.iter().any(|o| o.verb == "git_commit" && o.success) => {
            (Condition::Failure, Some("commit node requires a successful git_commit action in the session".to_string()))
        }
        Some(NodeType::Verify) => match action_outcomes.iter().rev().find(|o| o.verb == "run_tests" || o.verb == "build_project") {
            Some(o) if o.success => (Condition::Success, last_outcome_detail),
            Some(o) => (Condition::Failure, Some(format!("verify node's {} action exited non-zero", o.verb))),
            None => (Condition::Failure, Some("verify node requires a run_tests or build_project action in the session".to_string())),
        },
        _ => (Condition::Success, last_outcome_detail),
    };

    if condition == Condition::Failure {
        let detail = detail.clone().unwrap_or_default();
        let category = match workflow.current_node_type(ctx.bead_id) {
            Some(NodeType::Verify) => LessonCategory::TestFailure,
            _ => LessonCategory::General,
        };
        let _ = lessons.record_lesson(category, "workflow node success criteria not met", detail.clone(), Some(ctx.bead_id.to_string()), Some(ctx.agent_id.to_string())).await;
        return SessionOutcome { condition, last_outcome_detail: Some(detail), action_outcomes, router_events };
    }

    SessionOutcome { condition, last_outcome_detail: detail, action_outcomes, router_events }
}

async fn record_failure(lessons: &LessonsJournal, ctx: &TaskContext<'_>, error: &bf_provider::router::RouterError) {
    let category = if matches!(error, bf_provider::router::RouterError::Provider(ProviderError::Timeout)) { LessonCategory::BuildFailure } else { LessonCategory::General };
    let _ = lessons.record_lesson(category, "provider request failed", error.to_string(), Some(ctx.bead_id.to_string()), Some(ctx.agent_id.to_string())).await;
}
