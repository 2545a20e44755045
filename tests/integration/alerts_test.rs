// tests/integration/alerts_test.rs

//! Alert matching driven through the running orchestrator: configured
//! terms are applied to every ingested message and reflected on the
//! broadcast event.

use super::test_helpers::TestContext;
use acarshub_core::config::DecoderKind;
use serde_json::json;

#[tokio::test]
async fn matched_message_carries_matches_in_three_fields_not_icao() {
    let ctx = TestContext::new().await;
    ctx.orchestrator
        .handle()
        .alerts
        .set_terms(vec!["UAL123".to_string(), "N8560Z".to_string()])
        .await
        .unwrap();

    ctx.ingest(
        DecoderKind::Acars,
        json!({
            "text": "UAL123 departed",
            "icao": "ABCDEF",
            "tail": "N8560Z",
            "flight": "UAL123",
        }),
    )
    .await;

    let events = ctx.sink.events.lock();
    let event = &events[0].1;
    assert_eq!(event["matched"], true);
    assert_eq!(event["matched_text"], json!(["UAL123"]));
    assert_eq!(event["matched_tail"], json!(["N8560Z"]));
    assert_eq!(event["matched_flight"], json!(["UAL123"]));
    assert_eq!(event["matched_icao"], json!(Vec::<String>::new()));
}

#[tokio::test]
async fn ignore_term_suppresses_a_matching_term_on_the_same_field() {
    let ctx = TestContext::new().await;
    let alerts = &ctx.orchestrator.handle().alerts;
    alerts.set_terms(vec!["UAL".to_string()]).await.unwrap();
    alerts.set_ignore(vec!["TEST".to_string()]).await.unwrap();

    ctx.orchestrator
        .handle()
        .queue
        .push(DecoderKind::Acars, json!({"text": "UAL test flight"}), 0);
    ctx.wait_for_events(1).await;

    let events = ctx.sink.events.lock();
    assert_eq!(events[0].1["matched"], false);

    let total: i64 = ctx
        .orchestrator
        .handle()
        .storage
        .alert_counts()
        .await
        .unwrap()
        .into_iter()
        .map(|(_, count)| count)
        .sum();
    assert_eq!(total, 0);
}
