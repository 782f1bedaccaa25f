//! Event bus & lessons distribution (§4.J): in-process pub/sub other
//! components use to observe bead/workflow/agent activity without coupling
//! to each other directly. The lessons journal itself lives in
//! `bf_core::lessons` (it owns its own state per §3's ownership rule); this
//! crate is only the notification fabric §6 calls `onBeadCreated`,
//! `onBeadClosed`, `onWorkflowAdvanced`, and `onActionExecuted`.

pub mod bus;
pub mod dead_letter;
pub mod dedupe;
pub mod envelope;

pub use bus::EventBus;
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use dedupe::Deduper;
pub use envelope::{agent_messages_topic, bead_topic, workflow_topic, Envelope, AGENT_BROADCAST_TOPIC};
