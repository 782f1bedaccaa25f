//! Dispatch (§4.H): matches ready beads to idle, capability-matching
//! workers, applies auto-bug routing, reconciles task execution outcomes
//! back onto the bead store, and reclaims workers whose heartbeat has gone
//! stale. This crate is the one place that turns the decoupled outputs of
//! `bf-workflow` and `bf-agents::execute` into bead store mutations and
//! event bus notifications.

pub mod matching;
pub mod outcome;
pub mod routing;
pub mod stale;
pub mod tick;

pub use outcome::{reconcile, OutcomeError};
pub use stale::{reclaim_stale_workers, StaleError};
pub use tick::{DispatchError, Dispatcher, TickReport};
