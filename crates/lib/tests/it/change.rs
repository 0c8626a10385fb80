//! Change integration tests
//!
//! Applying changes to containers: preconditions, nested routing, dispatch of
//! applied changes and the wire format round trip through a container.

use livestate::{Change, ChangeKind, Value, deep::equal};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_apply_examples_on_container() {
    let live = container(json!({"a": 1}));
    let recorder = Recorder::attach(&live);

    assert!(live.apply(&Change::set("a", 3, 2)).is_none());
    assert!(live.apply(&Change::insert("a", 2)).is_none());
    assert!(live.apply(&Change::delete("a", 2)).is_none());
    assert_eq!(recorder.count(), 0);

    assert!(live.apply(&Change::set("a", 1, 2)).is_some());
    assert_eq!(live.get("a"), 2);

    assert!(live.apply(&Change::insert("b", 5)).is_some());
    assert!(live.apply(&Change::delete("a", 2)).is_some());
    assert!(equal(&live.snapshot(), &value(json!({"b": 5}))));

    assert_eq!(recorder.paths(), vec!["a", "b", "a"]);
}

#[test]
fn test_apply_routes_through_nested_containers() {
    let live = container(json!({"user": {"tags": ["x", "y"]}}));
    let recorder = Recorder::attach(&live);

    let applied = live.apply(&Change::insert("user.tags[1]", "new"));
    assert!(applied.is_some());
    assert!(equal(
        &live.get_path("user.tags"),
        &value(json!(["x", "new", "y"]))
    ));

    let delivered = recorder.changes();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].path().to_string(), "user.tags[1]");
    assert_eq!(delivered[0].kind(), ChangeKind::Insert);
}

#[test]
fn test_applied_plain_namespace_becomes_container() {
    let live = container(json!({}));
    live.apply(&Change::insert("cfg", value(json!({"depth": 1}))))
        .unwrap();

    let cfg = live.get("cfg");
    let nested = cfg.as_container().unwrap();
    assert!(nested.parents()[0].0.ptr_eq(&live));

    nested.set("depth", 2).unwrap();
    assert_eq!(live.get_path("cfg.depth"), 2);
}

#[test]
fn test_wire_change_applies_to_container() {
    let live = container(json!({"items": [{"done": false}]}));
    let change: Change =
        serde_json::from_value(json!({"path": ["items", 0, "done"], "old": false, "new": true}))
            .unwrap();

    assert!(live.apply(&change).is_some());
    assert_eq!(live.get_path("items[0].done"), true);
    // Second application: already `new`.
    assert!(live.apply(&change).is_none());
}

#[test]
fn test_null_is_a_value_not_an_absence() {
    let live = container(json!({"a": null}));
    let change: Change = serde_json::from_value(json!({"path": ["a"], "old": null})).unwrap();
    assert_eq!(change.kind(), ChangeKind::Delete);

    assert!(live.apply(&change).is_some());
    assert!(live.get("a").is_nothing());

    let insert: Change = serde_json::from_value(json!({"path": ["a"], "new": null})).unwrap();
    assert!(live.apply(&insert).is_some());
    assert!(live.get("a").is_null());
    assert_eq!(live.get("a"), Value::Null);
}
