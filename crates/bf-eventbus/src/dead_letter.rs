//! Dead-letter inspection (§4.J, §7 "no silent swallowing"): spec.md names a
//! dead-letter topic but only the core contract — "after three delivery
//! attempts" — not an inspection surface. We keep one, since §7 forbids
//! every other error path from swallowing failures silently and there is no
//! reason this one should be the exception.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::envelope::Envelope;

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub subscriber_id: String,
    pub topic: String,
    pub envelope: Envelope,
    pub attempts: u32,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct DeadLetterQueue {
    entries: Mutex<Vec<DeadLetter>>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, subscriber_id: impl Into<String>, topic: impl Into<String>, envelope: Envelope, attempts: u32, reason: impl Into<String>) {
        let entry = DeadLetter {
            subscriber_id: subscriber_id.into(),
            topic: topic.into(),
            envelope,
            attempts,
            reason: reason.into(),
            recorded_at: Utc::now(),
        };
        self.entries.lock().expect("dead letter queue lock poisoned").push(entry);
    }

    pub fn list(&self) -> Vec<DeadLetter> {
        self.entries.lock().expect("dead letter queue lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("dead letter queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains and returns every entry, for an operator tool that wants to
    /// replay or archive them.
    pub fn drain(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.entries.lock().expect("dead letter queue lock poisoned"))
    }
}
