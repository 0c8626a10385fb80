use std::sync::{Arc, Mutex};

use livestate::sync::Broker;
use serde_json::json;

use super::helpers::*;
use crate::helpers::*;

#[tokio::test]
async fn test_publish_registers_fetch_and_post() {
    let (hub, broker) = counting_hub();
    let state = container(json!({"x": 0, "list": [1, 2]}));
    let publication = hub.publish("state", &state).await.unwrap();

    assert!(broker.local().is_registered("state/fetch"));
    assert!(broker.local().is_registered("state/post"));

    let fetched = broker.call("state/fetch", json!(null)).await.unwrap();
    assert_eq!(fetched, json!({"x": 0, "list": [1, 2]}));

    publication.close().await.unwrap();
}

#[tokio::test]
async fn test_post_replies_with_applied_change_or_null() {
    let (hub, broker) = counting_hub();
    let state = container(json!({"x": 0}));
    let publication = hub.publish("state", &state).await.unwrap();

    let accepted = broker
        .call("state/post", json!({"path": ["x"], "old": 0, "new": 1}))
        .await
        .unwrap();
    assert_eq!(accepted, json!({"path": ["x"], "old": 0, "new": 1}));
    assert_eq!(state.get("x"), 1);

    let stale = broker
        .call("state/post", json!({"path": ["x"], "old": 0, "new": 2}))
        .await
        .unwrap();
    assert_eq!(stale, json!(null));
    assert_eq!(state.get("x"), 1);

    let malformed = broker.call("state/post", json!({"old": 1})).await;
    assert!(malformed.unwrap_err().is_serialization_error());

    publication.close().await.unwrap();
}

#[tokio::test]
async fn test_changes_are_broadcast_in_order() {
    let (hub, broker) = counting_hub();
    let state = container(json!({}));
    let publication = hub.publish("state", &state).await.unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    broker
        .subscribe(
            "state",
            Arc::new(move |payload| sink.lock().unwrap().push(payload)),
        )
        .await
        .unwrap();

    state.set("a", 1).unwrap();
    state.set("a", value(json!({"b": [true]}))).unwrap();
    state.delete("a").unwrap();
    publication.flush().await.unwrap();

    assert_eq!(
        *received.lock().unwrap(),
        vec![
            json!({"path": ["a"], "new": 1}),
            json!({"path": ["a"], "old": 1, "new": {"b": [true]}}),
            json!({"path": ["a"], "old": {"b": [true]}}),
        ]
    );

    publication.close().await.unwrap();
}

#[tokio::test]
async fn test_topic_can_only_be_published_once() {
    let (hub, _broker) = counting_hub();
    let first = container(json!({}));
    let second = container(json!({}));

    let publication = hub.publish("state", &first).await.unwrap();
    let err = hub.publish("state", &second).await.unwrap_err();
    assert!(err.is_conflict());

    publication.close().await.unwrap();
    let again = hub.publish("state", &second).await.unwrap();
    again.close().await.unwrap();
}

#[tokio::test]
async fn test_close_stops_serving() {
    let (hub, broker) = counting_hub();
    let state = container(json!({"x": 0}));
    let publication = hub.publish("state", &state).await.unwrap();

    publication.close().await.unwrap();
    assert!(publication.is_closed());
    assert!(!broker.local().is_registered("state/fetch"));
    assert!(!broker.local().is_registered("state/post"));

    // Closing twice is fine; flushing a closed publication is not.
    publication.close().await.unwrap();
    assert!(publication.flush().await.unwrap_err().is_closed());

    let err = hub.subscribe("state").await.unwrap_err();
    assert!(err.is_not_found());
}
