use bf_eventbus::{bead_topic, EventBus};

#[test]
fn ordering_within_a_topic_preserves_publish_order() {
    let bus = EventBus::new();
    let (_id, rx) = bus.subscribe(bead_topic("created"));

    bus.publish(bead_topic("created"), serde_json::json!({"id": "bd-1"}));
    bus.publish(bead_topic("created"), serde_json::json!({"id": "bd-2"}));
    bus.publish(bead_topic("created"), serde_json::json!({"id": "bd-3"}));

    assert_eq!(rx.try_recv().unwrap().payload["id"], "bd-1");
    assert_eq!(rx.try_recv().unwrap().payload["id"], "bd-2");
    assert_eq!(rx.try_recv().unwrap().payload["id"], "bd-3");
}

#[test]
fn subscriber_does_not_receive_messages_published_before_it_subscribed() {
    let bus = EventBus::new();
    bus.publish(bead_topic("created"), serde_json::json!({}));

    let (_id, rx) = bus.subscribe(bead_topic("created"));
    assert!(rx.try_recv().is_err());
}

#[test]
fn clone_shares_the_same_underlying_state() {
    let bus1 = EventBus::new();
    let bus2 = bus1.clone();

    let (_id, rx) = bus1.subscribe(bead_topic("closed"));
    assert_eq!(bus2.subscriber_count(&bead_topic("closed")), 1);

    bus2.publish(bead_topic("closed"), serde_json::json!({"id": "bd-9"}));
    assert!(rx.try_recv().is_ok());
}

#[test]
fn each_published_message_gets_a_unique_id() {
    let bus = EventBus::new();
    let a = bus.publish(bead_topic("created"), serde_json::json!({}));
    let b = bus.publish(bead_topic("created"), serde_json::json!({}));
    assert_ne!(a.message_id, b.message_id);
}
