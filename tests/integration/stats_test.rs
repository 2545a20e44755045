// tests/integration/stats_test.rs

//! Stats-endpoint fallback driven end-to-end: with no time-series rows
//! written yet (the scheduler hasn't ticked), the snapshot falls back to
//! the queue's cumulative totals.

use super::test_helpers::TestContext;
use acarshub_core::config::DecoderKind;
use serde_json::json;

#[tokio::test]
async fn falls_back_to_queue_totals_before_the_first_rollup() {
    let ctx = TestContext::new().await;

    ctx.ingest(DecoderKind::Acars, json!({"text": "a"})).await;
    ctx.ingest(DecoderKind::Acars, json!({"text": "b"})).await;
    ctx.ingest(DecoderKind::Vdlm2, json!({"text": "c"})).await;

    let snapshot = ctx.orchestrator.stats_snapshot().await.unwrap();
    assert_eq!(snapshot.acars, 2);
    assert_eq!(snapshot.vdlm2, 1);
    assert_eq!(snapshot.total, 3);
}
