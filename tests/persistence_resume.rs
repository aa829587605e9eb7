mod common;

use common::{wait_for, MockTransport};
use outbox_core::{
    BackoffConfig, Behavior, ErrorMatcher, LockLevel, MemoryStorage, Outbox, RecordHooks,
    RequestDescriptor, RetryPolicy, Submission,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn outbox_with(transport: &MockTransport, storage: &Arc<MemoryStorage>) -> Outbox {
    Outbox::builder()
        .transport(Arc::new(transport.clone()))
        .storage(storage.clone())
        .build()
        .unwrap()
}

fn no_retry_policy() -> RetryPolicy {
    RetryPolicy::new(ErrorMatcher::Any, 0, BackoffConfig::new(10))
}

#[tokio::test(start_paused = true)]
async fn failed_silent_record_survives_a_restart_and_resumes() {
    let storage = Arc::new(MemoryStorage::new());

    // First run: the write fails terminally and stays in the store.
    {
        let transport = MockTransport::new();
        transport.reply_transport_err("network down");
        let outbox = outbox_with(&transport, &storage);

        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        outbox.events().on_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        outbox
            .submit(
                Submission::new(
                    RequestDescriptor::new("POST", "/items").with_body(json!({"title": "x"})),
                )
                .behavior(Behavior::Silent)
                .retry_policy(no_retry_policy()),
            )
            .await
            .unwrap();

        wait_for(|| errors.load(Ordering::SeqCst) == 1).await;
        assert_eq!(transport.send_count(), 1);
        assert!(!storage.is_empty());
    }

    // Second run: boot reloads the record and this time it succeeds.
    let transport = MockTransport::new();
    transport.reply_ok(json!({"id": 4}));
    let outbox = outbox_with(&transport, &storage);

    let booted = Arc::new(Mutex::new(Vec::new()));
    let sink = booted.clone();
    outbox.events().on_boot(move |event| {
        sink.lock().extend(event.queues.clone());
        Ok(())
    });

    let resumed = outbox.boot().await.unwrap();
    assert_eq!(resumed, 1);
    assert_eq!(*booted.lock(), vec![("default".to_string(), 1)]);

    wait_for(|| transport.send_count() == 1).await;
    assert_eq!(transport.sends()[0].descriptor.body, json!({"title": "x"}));
    wait_for(|| storage.is_empty()).await;
}

#[tokio::test(start_paused = true)]
async fn resumed_virtual_response_still_pairs_with_the_real_one() {
    let storage = Arc::new(MemoryStorage::new());
    let root_child_id;

    {
        let transport = MockTransport::new();
        transport.reply_transport_err("network down");
        let outbox = outbox_with(&transport, &storage);

        let registry = outbox.registry().clone();
        let (root, id_child) = registry.with_lock_level(LockLevel::Open, || {
            let root = registry.create(json!({"id": 0}));
            let child = match root.field("id").unwrap() {
                outbox_core::FieldRead::Placeholder(ph) => ph,
                other => panic!("{other:?}"),
            };
            (root, child)
        });
        root_child_id = id_child.id();

        outbox
            .submit(
                Submission::new(RequestDescriptor::new("POST", "/items"))
                    .behavior(Behavior::Silent)
                    .retry_policy(no_retry_policy())
                    .virtual_response(root),
            )
            .await
            .unwrap();

        wait_for(|| transport.send_count() == 1).await;
        wait_for(|| !storage.is_empty()).await;
    }

    let transport = MockTransport::new();
    transport.reply_ok(json!({"id": 21}));
    let outbox = outbox_with(&transport, &storage);
    assert_eq!(outbox.boot().await.unwrap(), 1);

    wait_for(|| outbox.registry().resolved(&root_child_id).is_some()).await;
    assert_eq!(outbox.registry().resolved(&root_child_id), Some(json!(21)));
}

#[tokio::test(start_paused = true)]
async fn bound_fallback_takes_ownership_so_the_store_is_cleaned() {
    let storage = Arc::new(MemoryStorage::new());
    let transport = MockTransport::new();
    transport.reply_transport_err("network down");
    let outbox = outbox_with(&transport, &storage);

    let fallbacks = Arc::new(AtomicUsize::new(0));
    let seen = fallbacks.clone();
    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/items"))
                .behavior(Behavior::Silent)
                .retry_policy(no_retry_policy())
                .persist(true)
                .hooks(RecordHooks::new().on_fallback(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                })),
        )
        .await
        .unwrap();

    wait_for(|| fallbacks.load(Ordering::SeqCst) == 1).await;
    wait_for(|| storage.is_empty()).await;
}

#[tokio::test]
async fn veto_after_persisting_rolls_the_store_back() {
    let storage = Arc::new(MemoryStorage::new());
    let transport = MockTransport::new();
    let outbox = outbox_with(&transport, &storage);

    let outcome = outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/items"))
                .behavior(Behavior::Silent)
                .persist(true)
                .hooks(RecordHooks::new().on_enqueued(|| false)),
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        outbox_core::SubmitOutcome::Vetoed { .. }
    ));
    assert!(storage.is_empty());
    assert_eq!(transport.send_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn queued_records_can_be_listed_and_discarded_but_not_the_head() {
    let storage = Arc::new(MemoryStorage::new());
    let transport = MockTransport::new().with_latency(Duration::from_secs(3600));
    let outbox = outbox_with(&transport, &storage);

    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/slow"))
                .behavior(Behavior::Silent)
                .queue("writes"),
        )
        .await
        .unwrap();
    outbox
        .submit(
            Submission::new(RequestDescriptor::new("POST", "/waiting"))
                .behavior(Behavior::Silent)
                .queue("writes"),
        )
        .await
        .unwrap();

    wait_for(|| transport.send_count() == 1).await;
    let summaries = outbox.records("writes");
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].url, "/slow");
    assert_eq!(summaries[1].url, "/waiting");

    let head_id = summaries[0].id.clone();
    let queued_id = summaries[1].id.clone();

    assert!(outbox.discard("writes", &queued_id).unwrap());
    assert!(outbox.discard("writes", &head_id).is_err());
    assert!(!outbox.discard("writes", "sr_missing").unwrap());
    assert_eq!(outbox.records("writes").len(), 1);
}
