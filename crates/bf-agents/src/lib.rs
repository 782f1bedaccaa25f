//! Worker pool, persona-driven prompt composition, and the per-task
//! execution loop (§4.F). Ties together the sandbox adapters, provider
//! router, action router, lock manager, and workflow engine into the single
//! claim -> dispatch -> route -> advance pass a worker runs per bead.

pub mod execute;
pub mod persona;
pub mod pool;
pub mod state;
