//! The message shape carried over every topic (§4.J, §6's `onActionExecuted`
//! style hooks). `message_id` is what a handler dedupes on — the bus
//! delivers at-least-once, so the same id can legitimately arrive twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            payload,
            published_at: Utc::now(),
        }
    }
}

/// Well-known topic constructors (§3, §4.J, §9). Kept as functions rather
/// than an enum so a caller can still publish to an arbitrary topic string
/// (e.g. a project-scoped `bead.<project>.<event>` variant) without the bus
/// needing to know about it.
pub fn agent_messages_topic(agent_id: &str) -> String {
    format!("agent.messages.{agent_id}")
}

pub const AGENT_BROADCAST_TOPIC: &str = "agent.broadcast";

pub fn bead_topic(event: &str) -> String {
    format!("bead.{event}")
}

pub fn workflow_topic(event: &str) -> String {
    format!("workflow.{event}")
}
