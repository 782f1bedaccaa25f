//! Wire-level contracts shared across the orchestrator crates.
//!
//! Everything here is a plain data shape: the abstract chat-completion
//! contract (§6) that concrete provider crates would implement against, the
//! action-envelope wire form an LLM response is parsed into, and the
//! relational shape the persisted stores follow. No behavior lives here.

pub mod action;
pub mod chat;
pub mod schema;
