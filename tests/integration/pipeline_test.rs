// tests/integration/pipeline_test.rs

//! End-to-end message flow: ingest a raw payload through the running
//! orchestrator and observe the broadcast event and persisted row.

use super::test_helpers::TestContext;
use acarshub_core::config::DecoderKind;
use acarshub_core::core::sink::EVENT_MESSAGE;
use serde_json::json;

#[tokio::test]
async fn ingested_payload_is_broadcast_and_persisted() {
    let ctx = TestContext::new().await;

    ctx.ingest(
        DecoderKind::Acars,
        json!({"text": "UAL123 departed", "tail": "N8560Z", "flight": "UAL123"}),
    )
    .await;

    let events = ctx.sink.events.lock();
    assert_eq!(events[0].0, EVENT_MESSAGE);
    assert_eq!(events[0].1["text"], "UAL123 departed");
    assert_eq!(events[0].1["tail"], "N8560Z");
    drop(events);

    let stored = ctx
        .orchestrator
        .handle()
        .storage
        .all_messages()
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].flight, "UAL123");
}

#[tokio::test]
async fn empty_payload_without_save_all_is_dropped_silently() {
    let ctx = TestContext::new().await;

    ctx.orchestrator.handle().queue.push(DecoderKind::Hfdl, json!({}), 0);
    // Nothing to broadcast: give the processor a moment, then confirm
    // neither an event nor a stored row appeared.
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    assert!(ctx.sink.events.lock().is_empty());
    assert!(ctx
        .orchestrator
        .handle()
        .storage
        .all_messages()
        .await
        .unwrap()
        .is_empty());
}
