//! In-process pub/sub (§4.J): topics `agent.messages.<id>`,
//! `agent.broadcast`, `bead.<event>`, `workflow.<event>`, at-least-once
//! delivery. Grounded in `at-bridge::event_bus::EventBus`'s
//! subscribe/publish/prune shape, generalized from one implicit topic to a
//! `DashMap<topic, subscribers>` and given the delivery-attempt accounting
//! and dead-letter queue spec.md's contract calls for.

use std::sync::Arc;

use dashmap::DashMap;

use bf_telemetry::metrics::MetricsRegistry;

use crate::dead_letter::DeadLetterQueue;
use crate::envelope::Envelope;

/// Bounded per-subscriber mailbox capacity. A subscriber that cannot keep up
/// applies backpressure (the publisher retries) rather than growing memory
/// without limit.
const MAILBOX_CAPACITY: usize = 256;

/// Delivery attempts before a message is moved to the dead-letter queue
/// (§4.J: "A dead-letter topic receives messages after three delivery
/// attempts").
const MAX_DELIVERY_ATTEMPTS: u32 = 3;

struct Subscription {
    id: String,
    sender: flume::Sender<Envelope>,
}

/// Thread-safe, cheaply cloneable in-process event bus. One instance is
/// shared by every component that publishes or subscribes (dispatcher,
/// worker pool, action router, workflow engine).
#[derive(Clone)]
pub struct EventBus {
    topics: Arc<DashMap<String, Vec<Subscription>>>,
    dead_letters: Arc<DeadLetterQueue>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { topics: Arc::new(DashMap::new()), dead_letters: Arc::new(DeadLetterQueue::new()), metrics: None }
    }

    pub fn with_metrics(metrics: Arc<MetricsRegistry>) -> Self {
        Self { topics: Arc::new(DashMap::new()), dead_letters: Arc::new(DeadLetterQueue::new()), metrics: Some(metrics) }
    }

    /// Register a new subscriber on `topic` and return its id plus the
    /// receiving end of its mailbox. The subscriber receives every message
    /// published to `topic` from this point forward.
    pub fn subscribe(&self, topic: impl Into<String>) -> (String, flume::Receiver<Envelope>) {
        let (tx, rx) = flume::bounded(MAILBOX_CAPACITY);
        let id = uuid::Uuid::new_v4().to_string();
        self.topics.entry(topic.into()).or_default().push(Subscription { id: id.clone(), sender: tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, topic: &str, subscriber_id: &str) {
        if let Some(mut subs) = self.topics.get_mut(topic) {
            subs.retain(|s| s.id != subscriber_id);
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    /// Publish `payload` to every current subscriber of `topic`, returning
    /// the envelope that was sent (its `message_id` is what handlers dedupe
    /// on). Each subscriber gets up to [`MAX_DELIVERY_ATTEMPTS`] tries; a
    /// subscriber whose mailbox is still full after that, or whose receiver
    /// has been dropped, is recorded to the dead-letter queue instead of
    /// silently dropping the message (§7: no silent swallowing).
    pub fn publish(&self, topic: impl Into<String>, payload: serde_json::Value) -> Envelope {
        let topic = topic.into();
        let envelope = Envelope::new(topic.clone(), payload);
        self.deliver(&topic, &envelope);
        envelope
    }

    fn deliver(&self, topic: &str, envelope: &Envelope) {
        let Some(mut subs) = self.topics.get_mut(topic) else {
            return;
        };

        subs.retain(|sub| {
            let mut attempts = 0;
            loop {
                attempts += 1;
                match sub.sender.try_send(envelope.clone()) {
                    Ok(()) => return true,
                    Err(flume::TrySendError::Disconnected(_)) => {
                        self.record_dead_letter(&sub.id, topic, envelope, attempts, "subscriber disconnected");
                        return false;
                    }
                    Err(flume::TrySendError::Full(_)) if attempts < MAX_DELIVERY_ATTEMPTS => {
                        std::thread::yield_now();
                        continue;
                    }
                    Err(flume::TrySendError::Full(_)) => {
                        self.record_dead_letter(&sub.id, topic, envelope, attempts, "mailbox full after max attempts");
                        return true;
                    }
                }
            }
        });
    }

    fn record_dead_letter(&self, subscriber_id: &str, topic: &str, envelope: &Envelope, attempts: u32, reason: &str) {
        tracing::warn!(subscriber_id, topic, attempts, reason, "event undeliverable, moved to dead letter queue");
        self.dead_letters.push(subscriber_id, topic, envelope.clone(), attempts, reason);
        if let Some(metrics) = &self.metrics {
            metrics.incr_counter(bf_telemetry::metrics::names::EVENT_DEAD_LETTER_TOTAL, &[("topic", topic)]);
        }
    }

    pub fn dead_letters(&self) -> Vec<crate::dead_letter::DeadLetter> {
        self.dead_letters.list()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{agent_messages_topic, bead_topic, AGENT_BROADCAST_TOPIC};

    #[test]
    fn publish_delivers_to_every_subscriber_of_the_topic() {
        let bus = EventBus::new();
        let (_id_a, rx_a) = bus.subscribe(AGENT_BROADCAST_TOPIC);
        let (_id_b, rx_b) = bus.subscribe(AGENT_BROADCAST_TOPIC);
        bus.publish(AGENT_BROADCAST_TOPIC, serde_json::json!({"hello": "world"}));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn publish_does_not_cross_topics() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe(bead_topic("created"));
        bus.publish(bead_topic("closed"), serde_json::json!({}));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn agent_message_topic_is_scoped_per_agent() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe(agent_messages_topic("a1"));
        bus.publish(agent_messages_topic("a2"), serde_json::json!({"subject": "ping"}));
        assert!(rx.try_recv().is_err());
        bus.publish(agent_messages_topic("a1"), serde_json::json!({"subject": "ping"}));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn dropped_receiver_is_pruned_and_dead_lettered() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe(AGENT_BROADCAST_TOPIC);
        drop(rx);
        bus.publish(AGENT_BROADCAST_TOPIC, serde_json::json!({}));
        assert_eq!(bus.subscriber_count(AGENT_BROADCAST_TOPIC), 0);
        assert_eq!(bus.dead_letter_count(), 1);
    }

    #[test]
    fn full_mailbox_goes_to_dead_letter_after_max_attempts() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe(AGENT_BROADCAST_TOPIC);
        for _ in 0..MAILBOX_CAPACITY {
            bus.publish(AGENT_BROADCAST_TOPIC, serde_json::json!({}));
        }
        // Mailbox is now full; the next publish exhausts its attempts.
        bus.publish(AGENT_BROADCAST_TOPIC, serde_json::json!({"overflow": true}));
        assert_eq!(bus.dead_letter_count(), 1);
        assert_eq!(bus.dead_letters()[0].attempts, MAX_DELIVERY_ATTEMPTS);
        // The subscriber itself is still registered -- a full mailbox isn't
        // a disconnect.
        assert_eq!(bus.subscriber_count(AGENT_BROADCAST_TOPIC), 1);
        drop(rx);
    }

    #[test]
    fn unsubscribe_stops_further_delivery() {
        let bus = EventBus::new();
        let (id, rx) = bus.subscribe(AGENT_BROADCAST_TOPIC);
        bus.unsubscribe(AGENT_BROADCAST_TOPIC, &id);
        bus.publish(AGENT_BROADCAST_TOPIC, serde_json::json!({}));
        assert!(rx.try_recv().is_err());
    }
}
