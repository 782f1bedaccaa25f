//! Per-worker state machine (§4.F): idle ↔ working → (idle | stopped |
//! error). Grounded in `at-agents::state_machine::AgentStateMachine`'s
//! explicit match-transition plus append-only history shape, narrowed from
//! a seven-state agent lifecycle to the four `bf_core::types::WorkerStatus`
//! values this system actually defines.

use bf_core::types::WorkerStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerEvent {
    Claim,
    Complete,
    Stop,
    Fail,
    Recover,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid worker transition: cannot apply {event:?} while {state:?}")]
pub struct WorkerStateError {
    pub state: WorkerStatus,
    pub event: WorkerEvent,
}

#[derive(Debug, Clone)]
pub struct WorkerStateMachine {
    current: WorkerStatus,
    history: Vec<(WorkerStatus, WorkerEvent, WorkerStatus)>,
}

impl WorkerStateMachine {
    pub fn new() -> Self {
        Self { current: WorkerStatus::Idle, history: Vec::new() }
    }

    pub fn state(&self) -> WorkerStatus {
        self.current
    }

    pub fn history(&self) -> &[(WorkerStatus, WorkerEvent, WorkerStatus)] {
        &self.history
    }

    /// Valid transitions:
    /// - Idle    + Claim    -> Working
    /// - Working + Complete -> Idle
    /// - Idle    + Stop     -> Stopped
    /// - Working + Stop     -> Stopped
    /// - Working + Fail     -> Error
    /// - Error   + Recover  -> Idle
    pub fn transition(&mut self, event: WorkerEvent) -> Result<WorkerStatus, WorkerStateError> {
        let next = match (self.current, event) {
            (WorkerStatus::Idle, WorkerEvent::Claim) => WorkerStatus::Working,
            (WorkerStatus::Working, WorkerEvent::Complete) => WorkerStatus::Idle,
            (WorkerStatus::Idle, WorkerEvent::Stop) => WorkerStatus::Stopped,
            (WorkerStatus::Working, WorkerEvent::Stop) => WorkerStatus::Stopped,
            (WorkerStatus::Working, WorkerEvent::Fail) => WorkerStatus::Error,
            (WorkerStatus::Error, WorkerEvent::Recover) => WorkerStatus::Idle,
            _ => return Err(WorkerStateError { state: self.current, event }),
        };
        let from = self.current;
        self.current = next;
        self.history.push((from, event, next));
        tracing::debug!(?from, ?event, to = ?next, "worker state transition");
        Ok(next)
    }
}

impl Default for WorkerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_then_complete_round_trips_to_idle() {
        let mut sm = WorkerStateMachine::new();
        assert_eq!(sm.transition(WorkerEvent::Claim).unwrap(), WorkerStatus::Working);
        assert_eq!(sm.transition(WorkerEvent::Complete).unwrap(), WorkerStatus::Idle);
        assert_eq!(sm.history().len(), 2);
    }

    #[test]
    fn fail_then_recover_returns_to_idle() {
        let mut sm = WorkerStateMachine::new();
        sm.transition(WorkerEvent::Claim).unwrap();
        assert_eq!(sm.transition(WorkerEvent::Fail).unwrap(), WorkerStatus::Error);
        assert_eq!(sm.transition(WorkerEvent::Recover).unwrap(), WorkerStatus::Idle);
    }

    #[test]
    fn stopping_an_already_stopped_worker_is_rejected() {
        let mut sm = WorkerStateMachine::new();
        sm.transition(WorkerEvent::Stop).unwrap();
        let err = sm.transition(WorkerEvent::Stop).unwrap_err();
        assert_eq!(err.state, WorkerStatus::Stopped);
    }
}
