//! Container integration tests
//!
//! Local mutation, parent tables, list shifting, and change propagation
//! through shared and cyclic container graphs.

use livestate::{ChangeKind, Container, ContainerKind, Function, Key, Value, deep::equal};
use serde_json::json;

use crate::helpers::*;

// ===== BASIC OPERATIONS =====

#[test]
fn test_namespace_set_get_delete() {
    let live = Container::namespace();
    assert!(live.is_empty());
    assert_eq!(live.kind(), ContainerKind::Namespace);

    let change = live.set("name", "Alice").unwrap().unwrap();
    assert_eq!(change.kind(), ChangeKind::Insert);
    assert_eq!(live.get("name"), "Alice");

    let change = live.set("name", "Bob").unwrap().unwrap();
    assert_eq!(change.kind(), ChangeKind::Set);
    assert_eq!(change.old(), Some(&Value::from("Alice")));

    let change = live.delete("name").unwrap().unwrap();
    assert_eq!(change.kind(), ChangeKind::Delete);
    assert!(live.get("name").is_nothing());
    assert!(live.delete("name").unwrap().is_none());
}

#[test]
fn test_setting_equal_value_is_a_noop() {
    let live = container(json!({"a": 1, "b": {"c": [1, 2]}}));
    let recorder = Recorder::attach(&live);

    assert!(live.set("a", 1).unwrap().is_none());
    assert!(live.set("b", value(json!({"c": [1, 2]}))).unwrap().is_none());
    assert_eq!(recorder.count(), 0);
}

#[test]
fn test_setting_nothing_deletes() {
    let live = container(json!({"a": 1}));
    let change = live.set("a", Value::Nothing).unwrap().unwrap();
    assert_eq!(change.kind(), ChangeKind::Delete);
    assert!(live.is_empty());
}

#[test]
fn test_invalid_input_is_rejected() {
    let live = Container::namespace();
    let err = live
        .set("f", Function::new(|_| Value::Null))
        .unwrap_err();
    assert!(err.is_invalid_input());

    let err = live.set(0, 1).unwrap_err();
    assert!(err.is_invalid_input());

    let list = Container::list();
    assert!(list.set("name", 1).unwrap_err().is_invalid_input());
    assert!(list.set(1, "past the end").unwrap_err().is_invalid_input());
    assert!(list.insert(2, 1).unwrap_err().is_invalid_input());
    assert!(live.push(1).unwrap_err().is_invalid_input());
    assert!(live.is_empty());
    assert!(list.is_empty());
}

#[test]
fn test_wrap_rejects_scalars() {
    let err = Container::wrap(Value::from(3)).unwrap_err();
    assert!(err.is_invalid_input());
}

#[test]
fn test_list_set_at_length_appends() {
    let list = container(json!(["a"]));
    let change = list.set(1, "b").unwrap().unwrap();
    assert_eq!(change.kind(), ChangeKind::Insert);
    assert_eq!(list.keys(), vec![Key::Index(0), Key::Index(1)]);
    assert!(equal(&list.snapshot(), &value(json!(["a", "b"]))));
}

#[test]
fn test_namespace_keys_keep_insertion_order() {
    let live = Container::namespace();
    live.set("z", 1).unwrap();
    live.set("a", 2).unwrap();
    live.set("m", 3).unwrap();
    live.delete("a").unwrap();
    assert_eq!(live.keys(), vec![Key::from("z"), Key::from("m")]);
    assert_eq!(
        serde_json::to_string(&live.snapshot()).unwrap(),
        r#"{"z":1,"m":3}"#
    );
}

// ===== PARENT TABLES =====

#[test]
fn test_storing_plain_values_wraps_them() {
    let root = Container::namespace();
    root.set("user", value(json!({"name": "Alice", "tags": ["a"]})))
        .unwrap();

    let user = root.get("user");
    let user = user.as_container().unwrap();
    let parents = user.parents();
    assert_eq!(parents.len(), 1);
    assert!(parents[0].0.ptr_eq(&root));
    assert_eq!(parents[0].1, Key::from("user"));

    let tags = user.get("tags");
    assert!(tags.as_container().unwrap().is_list());
}

#[test]
fn test_overwritten_child_loses_parent() {
    let root = Container::namespace();
    let child = Container::namespace();
    root.set("c", &child).unwrap();
    assert_eq!(child.parents().len(), 1);

    root.set("c", 5).unwrap();
    assert!(child.parents().is_empty());

    let recorder = Recorder::attach(&root);
    child.set("x", 1).unwrap();
    assert_eq!(recorder.count(), 0);
}

#[test]
fn test_shared_child_relinked_when_one_slot_removed() {
    let root = Container::namespace();
    let shared = Container::namespace();
    root.set("a", &shared).unwrap();
    root.set("b", &shared).unwrap();
    assert_eq!(shared.parents()[0].1, Key::from("b"));

    root.delete("b").unwrap();
    let parents = shared.parents();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].1, Key::from("a"));

    let recorder = Recorder::attach(&root);
    shared.set("x", 1).unwrap();
    assert_eq!(recorder.paths(), vec!["a.x"]);
}

#[test]
fn test_list_shifts_rekey_children() {
    let list = Container::list();
    let first = Container::namespace();
    let second = Container::namespace();
    list.push(&first).unwrap();
    list.push(&second).unwrap();

    list.insert(0, "head").unwrap();
    assert_eq!(first.parents()[0].1, Key::Index(1));
    assert_eq!(second.parents()[0].1, Key::Index(2));

    let recorder = Recorder::attach(&list);
    second.set("v", 1).unwrap();
    assert_eq!(recorder.paths(), vec!["[2].v"]);

    list.delete(0).unwrap();
    list.delete(0).unwrap();
    assert!(first.parents().is_empty());
    assert_eq!(second.parents()[0].1, Key::Index(0));

    let deleted = recorder.changes();
    assert_eq!(deleted[1].kind(), ChangeKind::Delete);
    assert_eq!(deleted[1].path().to_string(), "[0]");
}

#[test]
fn test_dropped_parent_is_forgotten() {
    let child = Container::namespace();
    {
        let parent = Container::namespace();
        parent.set("c", &child).unwrap();
        assert_eq!(child.parents().len(), 1);
    }
    assert!(child.parents().is_empty());
    child.set("x", 1).unwrap();
}

// ===== PROPAGATION =====

#[test]
fn test_nested_change_reaches_ancestors_with_full_path() {
    let root = container(json!({"a": {"b": {"c": 1}}}));
    let recorder = Recorder::attach(&root);

    let b = root.get_path("a.b");
    b.as_container().unwrap().set("c", 2).unwrap();

    let changes = recorder.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path().to_string(), "a.b.c");
    assert_eq!(changes[0].old(), Some(&Value::from(1)));
    assert_eq!(changes[0].new_value(), Some(&Value::from(2)));
}

#[test]
fn test_two_container_cycle_notifies_each_once() {
    let a = Container::namespace();
    let b = Container::namespace();
    a.set("b", &b).unwrap();
    b.set("a", &a).unwrap();

    let at_a = Recorder::attach(&a);
    let at_b = Recorder::attach(&b);

    a.set("x", 1).unwrap();
    assert_eq!(at_a.paths(), vec!["x"]);
    assert_eq!(at_b.paths(), vec!["a.x"]);

    b.set("y", 2).unwrap();
    assert_eq!(at_a.paths(), vec!["x", "b.y"]);
    assert_eq!(at_b.paths(), vec!["a.x", "y"]);
}

#[test]
fn test_self_reference_notifies_once() {
    let node = Container::namespace();
    node.set("me", &node).unwrap();
    let recorder = Recorder::attach(&node);

    node.set("x", 1).unwrap();
    assert_eq!(recorder.paths(), vec!["x"]);
    assert!(node.get_path("me.me.me").as_container().unwrap().ptr_eq(&node));
}

#[test]
fn test_diamond_delivers_once_at_the_top() {
    let top = Container::namespace();
    let left = Container::namespace();
    let right = Container::namespace();
    let bottom = Container::namespace();
    top.set("l", &left).unwrap();
    top.set("r", &right).unwrap();
    left.set("d", &bottom).unwrap();
    right.set("d", &bottom).unwrap();

    let at_top = Recorder::attach(&top);
    let at_left = Recorder::attach(&left);
    let at_right = Recorder::attach(&right);

    bottom.set("v", 1).unwrap();
    assert_eq!(at_top.count(), 1);
    assert_eq!(at_left.paths(), vec!["d.v"]);
    assert_eq!(at_right.paths(), vec!["d.v"]);
}

#[test]
fn test_callback_may_mutate_its_container() {
    let live = Container::namespace();
    let target = live.clone();
    let _follow = live.subscribe(move |change| {
        if change.path().to_string() == "x" {
            if let Some(x) = change.new_value().and_then(Value::as_number) {
                target.set("double", x * 2.0).unwrap();
            }
        }
    });
    let recorder = Recorder::attach(&live);

    live.set("x", 4).unwrap();
    assert_eq!(live.get("double"), 8);
    assert_eq!(recorder.count(), 2);
}

#[test]
fn test_cancelled_subscription_stops_receiving() {
    let live = Container::namespace();
    let recorder = Recorder::attach(&live);
    live.set("a", 1).unwrap();

    assert!(recorder.subscription.cancel());
    live.set("a", 2).unwrap();
    assert_eq!(recorder.count(), 1);
    assert!(!recorder.subscription.is_active());
}

#[test]
fn test_snapshot_is_detached() {
    let live = container(json!({"list": [1, 2]}));
    let snapshot = live.snapshot();

    live.get("list").as_container().unwrap().push(3).unwrap();
    assert!(equal(&snapshot, &value(json!({"list": [1, 2]}))));
    assert!(equal(&live.snapshot(), &value(json!({"list": [1, 2, 3]}))));
}
