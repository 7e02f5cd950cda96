//! Integration Tests for the Tracking Engine
//!
//! These tests drive stores, consumers and bindings together the way a UI
//! adapter would.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use serde_json::json;
use trellis_core::{Consumer, Key, Registry, Store, StoreError, Value, View, Wrapper};

fn counting_consumer(store: &Store) -> (Consumer, Arc<AtomicI32>) {
    let renders = Arc::new(AtomicI32::new(0));
    let renders_clone = renders.clone();
    let consumer = store.consumer(move || {
        renders_clone.fetch_add(1, Ordering::SeqCst);
    });
    (consumer, renders)
}

fn child(view: &View, key: &str) -> View {
    view.get(key).unwrap().into_node().unwrap()
}

/// Same-value writes are suppressed, real changes re-render once.
#[test]
fn scenario_a_same_value_write_is_suppressed() {
    let store = Store::new(json!({"a": {"x": 1}})).unwrap();
    let (consumer, renders) = counting_consumer(&store);

    let a = child(&consumer.view().unwrap(), "a");
    assert_eq!(a.get("x").unwrap().as_f64(), Some(1.0));

    let state_a = store.state().get("a").into_node().unwrap();
    state_a.set("x", 1).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 0);

    state_a.set("x", 2).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    let a = child(&consumer.view().unwrap(), "a");
    assert_eq!(a.get("x").unwrap().as_f64(), Some(2.0));
}

/// List tracking is keyed by index, not by value.
#[test]
fn scenario_b_list_removal_is_index_keyed() {
    let store = Store::new(json!({"list": [1, 2, 3]})).unwrap();
    let (consumer, renders) = counting_consumer(&store);

    let list = child(&consumer.view().unwrap(), "list");
    assert_eq!(list.get(0).unwrap().as_f64(), Some(1.0));

    let state_list = store.state().get("list").into_node().unwrap();
    state_list.remove(0).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(state_list.to_json(), json!([2, 3]));

    let list = child(&consumer.view().unwrap(), "list");
    assert_eq!(list.get(0).unwrap().as_f64(), Some(2.0));
}

/// Deleting an index always notifies its readers.
#[test]
fn scenario_b_index_delete_notifies() {
    let store = Store::new(json!({"list": [1, 2, 3]})).unwrap();
    let (consumer, renders) = counting_consumer(&store);

    child(&consumer.view().unwrap(), "list").get(0).unwrap();

    let state_list = store.state().get("list").into_node().unwrap();
    state_list.delete(0).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(state_list.len(), 3);
}

/// Reads made by a computed accessor are attributed to the reader of the
/// accessor.
#[test]
fn scenario_c_computed_accessor_tracks_transitively() {
    let store = Store::new(Value::object([
        ("nested", Value::from(json!({"a": 2}))),
        (
            "doubleA",
            Value::getter(|this| {
                let a = this
                    .get("nested")
                    .into_node()
                    .and_then(|nested| nested.get("a").as_f64())
                    .unwrap_or(0.0);
                Value::from(a * 2.0)
            }),
        ),
    ]))
    .unwrap();

    let (consumer, renders) = counting_consumer(&store);
    let view = consumer.view().unwrap();
    assert_eq!(view.get("doubleA").unwrap().as_f64(), Some(4.0));

    let nested = store.state().get("nested").into_node().unwrap();
    assert_eq!(Registry::readers(nested.raw().id(), &Key::from("a")), vec![consumer.id()]);

    nested.set("a", 5).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert_eq!(
        consumer.view().unwrap().get("doubleA").unwrap().as_f64(),
        Some(10.0)
    );
}

/// Destroying one of two readers leaves the other untouched.
#[test]
fn scenario_d_destroying_one_consumer_isolates_the_other() {
    let store = Store::new(json!({"x": 1})).unwrap();
    let (first, first_renders) = counting_consumer(&store);
    let (second, second_renders) = counting_consumer(&store);

    first.view().unwrap().get("x").unwrap();
    second.view().unwrap().get("x").unwrap();

    first.destroy().unwrap();
    store.state().set("x", 2).unwrap();

    assert_eq!(first_renders.load(Ordering::SeqCst), 0);
    assert_eq!(second_renders.load(Ordering::SeqCst), 1);
    assert_eq!(
        Registry::readers(store.root().id(), &Key::from("x")),
        vec![second.id()]
    );
}

#[test]
fn deleting_an_unset_property_still_notifies() {
    let store = Store::new(json!({"maybe": null})).unwrap();
    let (consumer, renders) = counting_consumer(&store);

    assert!(consumer.view().unwrap().get("missing").unwrap().is_undefined());
    store.state().delete("missing").unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);
}

#[test]
fn writes_to_unread_siblings_are_isolated() {
    let store = Store::new(json!({"user": {"name": "ada", "age": 36}})).unwrap();
    let (consumer, renders) = counting_consumer(&store);

    let user = child(&consumer.view().unwrap(), "user");
    assert_eq!(user.get("name").unwrap().as_str(), Some("ada"));

    let state_user = store.state().get("user").into_node().unwrap();
    state_user.set("age", 37).unwrap();
    state_user.set("email", "ada@example.com").unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 0);

    state_user.set("name", "grace").unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);
}

#[test]
fn structurally_equal_replacement_rerenders() {
    let store = Store::new(json!({"config": {"dark": true}})).unwrap();
    let (consumer, renders) = counting_consumer(&store);
    consumer.view().unwrap().get("config").unwrap();

    let same = store.state().get("config").into_value();
    store.state().set("config", same).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 0);

    store.state().set("config", json!({"dark": true})).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);
}

#[test]
fn wrapper_identity_is_stable_between_writes() {
    let store = Store::new(json!({"a": {"b": {"c": 1}}, "z": 0})).unwrap();
    let (consumer, _) = counting_consumer(&store);
    let view = consumer.view().unwrap();

    let b1 = child(&child(&view, "a"), "b");
    let b2 = child(&child(&view, "a"), "b");
    assert!(b1.ptr_eq(&b2));

    // a write elsewhere leaves the wrappers alone
    store.state().set("z", 1).unwrap();
    assert!(b1.ptr_eq(&child(&child(&view, "a"), "b")));

    b1.get("c").unwrap();
    b1.set("c", 2).unwrap();
    assert!(!b1.ptr_eq(&child(&child(&view, "a"), "b")));
}

#[test]
fn cleanup_is_complete_after_destroy() {
    let store = Store::new(json!({"a": {"x": 1}, "list": [1, 2]})).unwrap();
    let (consumer, renders) = counting_consumer(&store);
    let id = consumer.id();

    let view = consumer.view().unwrap();
    child(&view, "a").get("x").unwrap();
    child(&view, "list").len().unwrap();
    assert_eq!(Registry::dependency_count(id), Some(4));

    drop(consumer);
    assert!(!Registry::is_registered(id));
    assert_eq!(Registry::dependency_count(id), None);

    let a = store.state().get("a").into_node().unwrap();
    a.set("x", 99).unwrap();
    a.delete("x").unwrap();
    store.state().get("list").into_node().unwrap().push(3).unwrap();
    store.state().delete("a").unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 0);

    assert!(matches!(view.get("a"), Err(StoreError::Revoked(revoked)) if revoked == id));
}

#[test]
fn replaced_children_are_reclaimed_for_a_live_consumer() {
    let store = Store::new(json!({"a": {"x": 0}})).unwrap();
    let (consumer, renders) = counting_consumer(&store);
    child(&consumer.view().unwrap(), "a").get("x").unwrap();

    let old = store.state().get("a").into_value();
    let old_id = old.as_node().unwrap().id();
    let old_weak = old.as_node().unwrap().downgrade();
    drop(old);

    for i in 1..=20 {
        store.state().set("a", json!({"x": i})).unwrap();
        let x = child(&consumer.view().unwrap(), "a").get("x").unwrap();
        assert_eq!(x.as_f64(), Some(i as f64));
    }

    assert!(old_weak.upgrade().is_none());
    assert!(Registry::readers(old_id, &Key::from("x")).is_empty());
    // root.a plus the current a.x
    assert_eq!(Registry::dependency_count(consumer.id()), Some(2));
    assert_eq!(renders.load(Ordering::SeqCst), 20);
}

#[test]
fn truncating_a_list_notifies_readers_of_removed_indices() {
    let store = Store::new(json!({"list": ["a", "b", "c"]})).unwrap();
    let (tail_reader, tail_renders) = counting_consumer(&store);
    let (head_reader, head_renders) = counting_consumer(&store);

    child(&tail_reader.view().unwrap(), "list").get(2).unwrap();
    child(&head_reader.view().unwrap(), "list").get(0).unwrap();

    let list = store.state().get("list").into_node().unwrap();
    list.set("length", 1).unwrap();

    assert_eq!(tail_renders.load(Ordering::SeqCst), 1);
    assert_eq!(head_renders.load(Ordering::SeqCst), 0);
}

#[test]
fn actions_defined_on_the_root_notify_readers() {
    let store = Store::new(Value::object([
        ("count", Value::from(0)),
        (
            "increment",
            Value::action(|this, _| {
                this.update("count", |count| {
                    Value::from(count.as_f64().unwrap_or(0.0) + 1.0)
                })?;
                Ok(Value::Undefined)
            }),
        ),
    ]))
    .unwrap();

    let (consumer, renders) = counting_consumer(&store);
    let view = consumer.view().unwrap();
    assert_eq!(view.get("count").unwrap().as_f64(), Some(0.0));

    view.call("increment", &[]).unwrap();
    view.call("increment", &[]).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 2);
    assert_eq!(view.get("count").unwrap().as_f64(), Some(2.0));
}

#[test]
fn rerender_callback_can_read_synchronously() {
    let store = Store::new(json!({"x": 1})).unwrap();
    let seen = Arc::new(AtomicI32::new(0));

    let slot: Arc<parking_lot::Mutex<Option<View>>> = Arc::new(parking_lot::Mutex::new(None));
    let callback_slot = slot.clone();
    let callback_seen = seen.clone();
    let consumer = store.consumer(move || {
        if let Some(view) = callback_slot.lock().clone() {
            let x = view.get("x").unwrap().as_f64().unwrap_or(0.0);
            callback_seen.store(x as i32, Ordering::SeqCst);
        }
    });

    let view = consumer.view().unwrap();
    view.get("x").unwrap();
    *slot.lock() = Some(view);

    store.state().set("x", 7).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 7);

    slot.lock().take();
}
