//! Deep operation integration tests
//!
//! Exercises equal/copy/diff/assign across plain values and live containers,
//! including cyclic container graphs.

use livestate::{
    Change, Container, Value,
    deep::{assign, copy, diff, equal},
};
use serde_json::json;

use crate::helpers::*;

// ===== COPY =====

#[test]
fn test_copy_of_container_is_plain_and_independent() {
    let live = container(json!({"a": [1, {"b": 2}], "c": "x"}));
    let mut copied = copy(&Value::from(&live));

    assert!(copied.as_container().is_none());
    assert!(copied.as_namespace().is_some());
    assert!(equal(&copied, &Value::from(&live)));

    copied
        .as_namespace_mut()
        .unwrap()
        .insert("d".into(), Value::from(true));
    assert!(!equal(&copied, &Value::from(&live)));
    assert!(live.get("d").is_nothing());

    live.set("c", "y").unwrap();
    assert_eq!(copied.as_namespace().unwrap()["c"], "x");
}

#[test]
fn test_copy_terminates_on_cycles() {
    let node = Container::namespace();
    node.set("name", "loop").unwrap();
    node.set("me", &node).unwrap();

    let copied = copy(&Value::from(&node));
    let map = copied.as_namespace().unwrap();
    assert_eq!(map["name"], "loop");
    assert!(map["me"].is_nothing());
}

// ===== EQUAL =====

#[test]
fn test_container_equals_its_plain_content() {
    let live = container(json!({"list": [1, 2], "flag": false}));
    assert!(equal(&Value::from(&live), &value(json!({"flag": false, "list": [1, 2]}))));
    assert!(!equal(&Value::from(&live), &value(json!({"list": [1, 2]}))));
}

#[test]
fn test_equal_on_distinct_cyclic_graphs() {
    let a = Container::namespace();
    let b = Container::namespace();
    a.set("me", &a).unwrap();
    b.set("me", &b).unwrap();

    assert!(equal(&Value::from(&a), &Value::from(&b)));

    b.set("extra", 1).unwrap();
    assert!(!equal(&Value::from(&a), &Value::from(&b)));
}

// ===== DIFF =====

#[test]
fn test_diff_terminates_on_distinct_cyclic_graphs() {
    let a = Container::namespace();
    a.set("me", &a).unwrap();
    a.set("x", 1).unwrap();
    let b = Container::namespace();
    b.set("me", &b).unwrap();
    b.set("x", 2).unwrap();

    assert_eq!(
        diff(&Value::from(&a), &Value::from(&b)),
        vec![Change::set("x", 1, 2)]
    );

    a.assign(&Value::from(&b)).unwrap();
    assert_eq!(a.get("x"), 2);
    assert!(a.get("me").as_container().unwrap().ptr_eq(&a));
    assert!(equal(&Value::from(&a), &Value::from(&b)));
}

fn assert_diff_reconstructs(old: serde_json::Value, new: serde_json::Value) {
    let old = value(old);
    let new = value(new);
    let mut target = copy(&old);
    for change in diff(&old, &new) {
        assert!(
            change.apply(&mut target).is_some(),
            "change {change} did not apply"
        );
    }
    assert!(equal(&target, &new), "got {target}, expected {new}");
}

#[test]
fn test_diff_then_apply_reconstructs() {
    assert_diff_reconstructs(json!({"a": 1, "b": [1, 2, 3]}), json!({"b": [1, 3], "c": "x"}));
    assert_diff_reconstructs(json!([1, 2, 3, 4]), json!([0, 2, 4, 5]));
    assert_diff_reconstructs(
        json!({"x": {"y": [{"z": 1}]}}),
        json!({"x": {"y": [{"z": 2}, {"z": 3}]}}),
    );
    assert_diff_reconstructs(json!([1, 2, 3, 4, 5]), json!([1, 5]));
    assert_diff_reconstructs(json!({"a": [1]}), json!({"a": {"b": 1}}));
}

#[test]
fn test_diff_of_value_with_itself_is_empty() {
    let live = container(json!({"a": [1, {"b": null}]}));
    assert!(diff(&Value::from(&live), &Value::from(&live)).is_empty());
    assert!(diff(&Value::from(&live), &live.snapshot()).is_empty());
}

#[test]
fn test_list_diff_is_minimal() {
    let changes = diff(&value(json!([1, 2, 3])), &value(json!([1, 3])));
    assert_eq!(changes, vec![Change::delete(1, 2)]);

    let changes = diff(&value(json!([1, 3])), &value(json!([1, 2, 3])));
    assert_eq!(changes, vec![Change::insert(1, 2)]);
}

#[test]
fn test_diff_against_container() {
    let live = container(json!({"a": 1, "b": [1, 2]}));
    let changes = diff(&Value::from(&live), &value(json!({"a": 2, "b": [1, 2]})));
    assert_eq!(changes, vec![Change::set("a", 1, 2)]);
}

// ===== ASSIGN =====

#[test]
fn test_assign_edits_container_in_place() {
    let live = container(json!({"a": [1, 2], "b": 1}));
    let inner = live.get("a").as_container().cloned().unwrap();
    let recorder = Recorder::attach(&live);

    let applied = live
        .assign(&value(json!({"a": [1, 2, 3], "c": true})))
        .unwrap();

    assert!(equal(&live.snapshot(), &value(json!({"a": [1, 2, 3], "c": true}))));
    assert_eq!(applied.len(), recorder.count());
    // Nested containers are edited, not replaced.
    assert!(live.get("a").as_container().unwrap().ptr_eq(&inner));
    assert_eq!(inner.len(), 3);
}

#[test]
fn test_assign_incompatible_kinds_fails() {
    let mut number = Value::from(1);
    let err = assign(&mut number, &Value::from("x")).unwrap_err();
    assert!(err.is_incompatible_assign());

    let live = container(json!({"a": 1}));
    let err = live.assign(&value(json!([1]))).unwrap_err();
    assert!(err.is_incompatible_assign());
    assert_eq!(live.get("a"), 1);
}
