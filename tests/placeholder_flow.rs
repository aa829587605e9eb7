mod common;

use common::{wait_for, MockTransport};
use outbox_core::{
    Behavior, FieldRead, LockLevel, Outbox, OutboxError, PlaceholderValue, RegenerateDescriptor,
    RequestDescriptor, StateRef, StateUpdate, Submission,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn outbox_with(transport: &MockTransport) -> Outbox {
    Outbox::builder()
        .transport(Arc::new(transport.clone()))
        .build()
        .unwrap()
}

fn child(root: &PlaceholderValue, key: &str) -> PlaceholderValue {
    match root.field(key).unwrap() {
        FieldRead::Placeholder(ph) => ph,
        other => panic!("expected a placeholder child, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn resolved_ids_rewrite_later_urls_in_the_queue() {
    let transport = MockTransport::new();
    transport.reply_ok(json!({"id": 7, "title": "first"}));
    transport.reply_ok(json!({"deleted": true}));
    let outbox = outbox_with(&transport);

    let registry = outbox.registry().clone();
    let (root, id_child) = registry.with_lock_level(LockLevel::Open, || {
        let root = registry.create(json!({"id": 0, "title": ""}));
        let id_child = child(&root, "id");
        (root, id_child)
    });

    outbox
        .submit(
            Submission::new(
                RequestDescriptor::new("POST", "/items").with_body(json!({"title": "first"})),
            )
            .behavior(Behavior::Silent)
            .virtual_response(root),
        )
        .await
        .unwrap();

    outbox
        .submit(
            Submission::new(RequestDescriptor::new(
                "DELETE",
                format!("/item/{}", id_child.url_token()),
            ))
            .behavior(Behavior::Silent),
        )
        .await
        .unwrap();

    wait_for(|| transport.send_count() == 2).await;
    let urls = transport.sent_urls();
    assert_eq!(urls[0], "/items");
    assert_eq!(urls[1], "/item/7");

    assert_eq!(registry.resolved(&id_child.id()), Some(json!(7)));
}

#[tokio::test(start_paused = true)]
async fn tagged_body_nodes_are_replaced_with_resolved_values() {
    let transport = MockTransport::new();
    transport.reply_ok(json!({"id": 3}));
    transport.reply_ok(json!({"ok": true}));
    let outbox = outbox_with(&transport);

    let registry = outbox.registry().clone();
    let (root, owner_node) = registry.with_lock_level(LockLevel::Open, || {
        let root = registry.create(json!({"id": 0}));
        let node = root.to_value();
        (root, node)
    });

    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/owners"))
                .behavior(Behavior::Silent)
                .virtual_response(root),
        )
        .await
        .unwrap();
    outbox
        .submit(
            Submission::new(
                RequestDescriptor::new("POST", "/pets").with_body(json!({"owner": owner_node})),
            )
            .behavior(Behavior::Silent),
        )
        .await
        .unwrap();

    wait_for(|| transport.send_count() == 2).await;
    let second = &transport.sends()[1].descriptor;
    assert_eq!(second.body, json!({"owner": {"id": 3}}));
}

fn delete_item_factory(args: &[Value]) -> outbox_core::Result<RequestDescriptor> {
    let id = args
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| OutboxError::Factory("id argument not resolved yet".to_string()))?;
    Ok(RequestDescriptor::new("DELETE", format!("/item/{id}")))
}

#[tokio::test(start_paused = true)]
async fn regenerate_factory_rebuilds_the_request_from_resolved_args() {
    let transport = MockTransport::new();
    transport.reply_ok(json!({"id": 5}));
    transport.reply_ok(json!({"deleted": true}));
    let outbox = outbox_with(&transport);
    outbox.factories().register("delete-item", delete_item_factory);

    let registry = outbox.registry().clone();
    let (root, id_arg) = registry.with_lock_level(LockLevel::Open, || {
        let root = registry.create(json!({"id": 0}));
        let id_arg = child(&root, "id").to_value();
        (root, id_arg)
    });

    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/items"))
                .behavior(Behavior::Silent)
                .virtual_response(root),
        )
        .await
        .unwrap();
    outbox
        .submit(
            Submission::new(RequestDescriptor::new("DELETE", "/item/pending"))
                .behavior(Behavior::Silent)
                .regenerate(RegenerateDescriptor::new("delete-item", vec![id_arg])),
        )
        .await
        .unwrap();

    wait_for(|| transport.send_count() == 2).await;
    assert_eq!(transport.sent_urls()[1], "/item/5");
}

#[tokio::test(start_paused = true)]
async fn regenerate_factory_may_call_back_into_the_outbox() {
    let transport = MockTransport::new();
    transport.reply_ok(json!({"id": 8}));
    transport.reply_ok(json!({"deleted": true}));
    let outbox = outbox_with(&transport);

    // A factory that inspects queue state while rebuilding must not stall
    // the runner that invoked it.
    let inspector = outbox.clone();
    outbox.factories().register("inspect-then-delete", move |args| {
        let summaries = inspector.records("default");
        assert!(!summaries.is_empty());
        delete_item_factory(args)
    });

    let registry = outbox.registry().clone();
    let (root, id_arg) = registry.with_lock_level(LockLevel::Open, || {
        let root = registry.create(json!({"id": 0}));
        let id_arg = child(&root, "id").to_value();
        (root, id_arg)
    });

    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/items"))
                .behavior(Behavior::Silent)
                .virtual_response(root),
        )
        .await
        .unwrap();
    outbox
        .submit(
            Submission::new(RequestDescriptor::new("DELETE", "/item/pending"))
                .behavior(Behavior::Silent)
                .regenerate(RegenerateDescriptor::new("inspect-then-delete", vec![id_arg])),
        )
        .await
        .unwrap();

    wait_for(|| transport.send_count() == 2).await;
    assert_eq!(transport.sent_urls()[1], "/item/8");
}

struct SharedState {
    state: Mutex<Value>,
}

impl StateUpdate for SharedState {
    fn apply(&self, _target: &StateRef, mutator: &mut dyn FnMut(&mut Value)) {
        mutator(&mut self.state.lock());
    }
}

#[tokio::test(start_paused = true)]
async fn live_state_is_patched_when_a_silent_record_resolves() {
    let transport = MockTransport::new();
    transport.reply_ok(json!({"id": 12}));

    // Placeholders minted ahead of outbox construction still substitute.
    let registry = outbox_core::PlaceholderRegistry::new();
    let (root, id_child) = registry.with_lock_level(LockLevel::Open, || {
        let root = registry.create(json!({"id": 0}));
        let id_child = child(&root, "id");
        (root, id_child)
    });

    // The host state holds the placeholder token until resolution.
    let state = Arc::new(SharedState {
        state: Mutex::new(json!({"items": [{"id": id_child.url_token()}]})),
    });

    let outbox = Outbox::builder()
        .transport(Arc::new(transport.clone()))
        .state_update(state.clone())
        .build()
        .unwrap();

    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/items"))
                .behavior(Behavior::Silent)
                .virtual_response(root)
                .state_ref(StateRef::new(json!({"cache": "items"}))),
        )
        .await
        .unwrap();

    wait_for(|| transport.send_count() == 1).await;
    wait_for(|| state.state.lock()["items"][0]["id"] == json!(12)).await;
}

#[tokio::test(start_paused = true)]
async fn success_event_carries_response_and_substitutions() {
    let transport = MockTransport::new();
    transport.reply_ok(json!({"id": 9}));
    let outbox = outbox_with(&transport);

    let registry = outbox.registry().clone();
    let root = registry.with_lock_level(LockLevel::Open, || {
        let root = registry.create(json!({"id": 0}));
        child(&root, "id");
        root
    });
    let root_id = root.id();

    let successes = Arc::new(AtomicUsize::new(0));
    let seen = successes.clone();
    outbox.events().on_success(move |event| {
        assert_eq!(event.response, Some(json!({"id": 9})));
        let map = event.substitution.as_ref().expect("substitution map");
        assert_eq!(map[&root_id], json!({"id": 9}));
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/items"))
                .behavior(Behavior::Silent)
                .virtual_response(root),
        )
        .await
        .unwrap();

    wait_for(|| successes.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test(start_paused = true)]
async fn resolutions_accumulate_across_the_whole_queue() {
    let transport = MockTransport::new();
    transport.reply_ok(json!({"id": 1}));
    transport.reply_ok(json!({"id": 2}));
    transport.reply_ok(json!({"ok": true}));
    let outbox = outbox_with(&transport);

    let registry = outbox.registry().clone();
    let (first_root, first_id, second_root, second_id) =
        registry.with_lock_level(LockLevel::Open, || {
            let first_root = registry.create(json!({"id": 0}));
            let first_id = child(&first_root, "id");
            let second_root = registry.create(json!({"id": 0}));
            let second_id = child(&second_root, "id");
            (first_root, first_id, second_root, second_id)
        });

    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/a"))
                .behavior(Behavior::Silent)
                .virtual_response(first_root),
        )
        .await
        .unwrap();
    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/b"))
                .behavior(Behavior::Silent)
                .virtual_response(second_root),
        )
        .await
        .unwrap();
    // The third record references placeholders from both earlier records.
    outbox
        .submit(
            Submission::new(RequestDescriptor::new(
                "PUT",
                format!("/link/{}/{}", first_id.url_token(), second_id.url_token()),
            ))
            .behavior(Behavior::Silent),
        )
        .await
        .unwrap();

    wait_for(|| transport.send_count() == 3).await;
    assert_eq!(transport.sent_urls()[2], "/link/1/2");
}
