//! Flattening behaviour seen from the broker side
//!
//! Properties over generated status records plus the end-to-end publish
//! path through a recording transport.

use mz2mqtt::bridge::{FlattenEncoder, FlattenError};
use mz2mqtt::protocol::StatusRecord;
use mz2mqtt::testing::MockTransport;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn record(value: Value) -> StatusRecord {
    match value {
        Value::Object(map) => map,
        _ => panic!("test record must be an object"),
    }
}

fn count_leaves(map: &Map<String, Value>) -> usize {
    map.values()
        .map(|v| match v {
            Value::Object(nested) => count_leaves(nested),
            _ => 1,
        })
        .sum()
}

fn nesting(map: &Map<String, Value>) -> usize {
    1 + map
        .values()
        .filter_map(|v| v.as_object().map(nesting))
        .max()
        .unwrap_or(0)
}

fn leaf_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ]
}

fn status_tree() -> impl Strategy<Value = Map<String, Value>> {
    let leaf = leaf_value();
    leaf.prop_recursive(4, 48, 5, |inner| {
        prop::collection::btree_map("[a-z]{1,6}", inner, 0..5)
            .prop_map(|entries| Value::Object(entries.into_iter().collect()))
    })
    .prop_map(|value| match value {
        Value::Object(map) => map,
        leaf => {
            let mut map = Map::new();
            map.insert("value".to_string(), leaf);
            map
        }
    })
}

proptest! {
    #[test]
    fn prop_one_pair_per_leaf(tree in status_tree()) {
        let pairs = FlattenEncoder::default().flatten(&tree, "VIN1", "base").unwrap();
        prop_assert_eq!(pairs.len(), count_leaves(&tree));
    }

    #[test]
    fn prop_topics_are_rooted_under_vehicle(tree in status_tree()) {
        let pairs = FlattenEncoder::default().flatten(&tree, "VIN1", "base").unwrap();
        for (topic, _) in pairs {
            prop_assert!(topic.starts_with("base/VIN1/"));
            prop_assert!(!topic.contains("//"));
            prop_assert!(topic.split('/').count() >= 3);
        }
    }

    #[test]
    fn prop_depth_limit_is_exact(tree in status_tree()) {
        let depth = nesting(&tree);
        prop_assert!(FlattenEncoder::new(depth).flatten(&tree, "V", "b").is_ok());
        if depth > 1 {
            let too_shallow = FlattenEncoder::new(depth - 1).flatten(&tree, "V", "b");
            let is_depth_error = matches!(too_shallow, Err(FlattenError::DepthExceeded { .. }));
            prop_assert!(is_depth_error);
        }
    }
}

#[test]
fn test_nested_record_publishes_in_document_order() {
    let status = record(json!({
        "fuel": {"level": 55, "range": {"km": 430}},
        "odometer": 1000,
        "doors": {"locked": true}
    }));

    let pairs = FlattenEncoder::default()
        .flatten(&status, "ABC123", "base")
        .unwrap();

    let topics: Vec<&str> = pairs.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        topics,
        vec![
            "base/ABC123/fuel/level",
            "base/ABC123/fuel/range/km",
            "base/ABC123/odometer",
            "base/ABC123/doors/locked",
        ]
    );
    assert_eq!(pairs[3].1, "true");
}

#[test]
fn test_leaf_payload_forms() {
    let status = record(json!({
        "name": "My Car",
        "missing": null,
        "tyres": [2.4, 2.5],
        "speed": 12.5
    }));

    let pairs = FlattenEncoder::default().flatten(&status, "V", "b").unwrap();

    assert_eq!(pairs[0].1, "My Car");
    assert_eq!(pairs[1].1, "");
    assert_eq!(pairs[2].1, "[2.4,2.5]");
    assert_eq!(pairs[3].1, "12.5");
}

#[test]
fn test_empty_nested_map_publishes_nothing() {
    let status = record(json!({"climate": {}, "odometer": 7}));
    let pairs = FlattenEncoder::default().flatten(&status, "V", "b").unwrap();
    assert_eq!(pairs, vec![("b/V/odometer".to_string(), "7".to_string())]);
}

#[tokio::test]
async fn test_publish_retains_every_pair() {
    let transport = MockTransport::connected();
    let status = record(json!({"fuel": {"level": 55}, "odometer": 1000}));

    let summary = FlattenEncoder::default()
        .publish(&transport, &status, "ABC123", "base")
        .await
        .unwrap();

    assert_eq!(summary.published, 2);
    assert_eq!(summary.failed, 0);

    let messages = transport.published_messages();
    assert!(messages.iter().all(|m| m.retain));
    assert_eq!(transport.last_payload("base/ABC123/fuel/level").as_deref(), Some("55"));
    assert_eq!(transport.last_payload("base/ABC123/odometer").as_deref(), Some("1000"));
}

#[tokio::test]
async fn test_publish_continues_past_failed_topic() {
    let transport = MockTransport::connected();
    transport.fail_publish_on("base/ABC123/fuel/level");
    let status = record(json!({"fuel": {"level": 55}, "odometer": 1000}));

    let summary = FlattenEncoder::default()
        .publish(&transport, &status, "ABC123", "base")
        .await
        .unwrap();

    assert_eq!(summary.published, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(transport.published_topics(), vec!["base/ABC123/odometer"]);
}

#[tokio::test]
async fn test_too_deep_record_publishes_nothing() {
    let transport = MockTransport::connected();
    let status = record(json!({"a": {"b": {"c": 1}}, "z": 2}));

    let result = FlattenEncoder::new(2)
        .publish(&transport, &status, "V", "b")
        .await;

    assert!(matches!(result, Err(FlattenError::DepthExceeded { .. })));
    assert!(transport.published_messages().is_empty());
}
