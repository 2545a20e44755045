// src/core/processor/mod.rs

//! The message processor: the queue consumer that runs format, frequency
//! counter, save decision, level counter, alert match, enrichment, then
//! broadcast for every tuple, in arrival order. Every step is best-effort:
//! a failure is logged and the pipeline continues with the next tuple,
//! never propagating past this module.

pub mod format;

use crate::core::alerts::AlertEngine;
use crate::core::message::{Message, RawPayload};
use crate::core::queue::MessageQueue;
use crate::core::sink::{EventSink, EVENT_MESSAGE, EVENT_STATION_IDS};
use crate::core::storage::Storage;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tracing::error;

/// Looks up a two- or three-letter airline prefix from an ICAO hex isn't
/// meaningful (ICAO hexes are aircraft, not airline, identifiers); this
/// enrichment instead maps the flight's IATA/ICAO airline prefix to a
/// display name, decorative only.
fn airline_name(flight: &str) -> Option<&'static str> {
    let prefix = flight.get(0..3)?.to_uppercase();
    match prefix.as_str() {
        "UAL" => Some("United Airlines"),
        "DAL" => Some("Delta Air Lines"),
        "AAL" => Some("American Airlines"),
        "SWA" => Some("Southwest Airlines"),
        "BAW" => Some("British Airways"),
        _ => None,
    }
}

/// The enriched, broadcast-ready shape of a persisted message: the stored
/// record plus the decorative and alert metadata attached in steps 6-7.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub matched: bool,
    pub matched_text: Vec<String>,
    pub matched_icao: Vec<String>,
    pub matched_tail: Vec<String>,
    pub matched_flight: Vec<String>,
    pub airline: Option<&'static str>,
}

pub struct MessageProcessor {
    queue: MessageQueue,
    storage: Storage,
    alerts: Arc<AlertEngine>,
    sink: Arc<dyn EventSink>,
    save_all_flag: bool,
}

impl MessageProcessor {
    pub fn new(
        queue: MessageQueue,
        storage: Storage,
        alerts: Arc<AlertEngine>,
        sink: Arc<dyn EventSink>,
        save_all: bool,
    ) -> Self {
        Self {
            queue,
            storage,
            alerts,
            sink,
            save_all_flag: save_all,
        }
    }

    /// Runs forever, pulling tuples off the queue in FIFO order, until the
    /// shutdown signal fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                raw = self.queue.recv() => {
                    self.process_one(raw).await;
                }
                _ = shutdown.recv() => return,
            }
        }
    }

    async fn process_one(&self, raw: RawPayload) {
        let started = Instant::now();
        let mut message = format::format(raw.kind, raw.channel, &raw.value);

        let outcome = match self.storage.add_message(&mut message, self.save_all_flag).await {
            Ok(o) => o,
            Err(e) => {
                error!("storage error persisting message: {e}");
                return;
            }
        };

        if !outcome.persisted {
            return;
        }

        let now = now_secs();
        let hits = self.alerts.apply_and_persist(outcome.uid, &message, now).await;

        message.metadata.processing_duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let enriched = self.enrich(message.clone(), &hits);
        self.sink.emit(EVENT_MESSAGE, json!(enriched));

        match self.storage.record_station_id(&message.station_id).await {
            Ok(true) => {
                if let Ok(ids) = self.storage.all_station_ids().await {
                    self.sink.emit(EVENT_STATION_IDS, json!(ids));
                }
            }
            Ok(false) => {}
            Err(e) => error!("failed to record station id: {e}"),
        }
    }

    fn enrich(&self, message: Message, hits: &[crate::core::alerts::AlertHit]) -> EnrichedMessage {
        use crate::core::storage::alerts::MatchType;

        let mut matched_text = Vec::new();
        let mut matched_icao = Vec::new();
        let mut matched_tail = Vec::new();
        let mut matched_flight = Vec::new();
        for hit in hits {
            match hit.match_type {
                MatchType::Text => matched_text.push(hit.term.clone()),
                MatchType::Icao => matched_icao.push(hit.term.clone()),
                MatchType::Tail => matched_tail.push(hit.term.clone()),
                MatchType::Flight => matched_flight.push(hit.term.clone()),
            }
        }

        let airline = airline_name(&message.flight);

        EnrichedMessage {
            matched: !hits.is_empty(),
            matched_text,
            matched_icao,
            matched_tail,
            matched_flight,
            airline,
            message,
        }
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderKind;
    use crate::core::alerts::AlertEngine;
    use crate::core::sink::RecordingSink;
    use serde_json::json;

    async fn test_processor(save_all: bool, sink: Arc<RecordingSink>) -> (MessageProcessor, MessageQueue) {
        let storage = Storage::open_in_memory().await.unwrap();
        let alerts = Arc::new(AlertEngine::load(storage.clone()).await.unwrap());
        let queue = MessageQueue::new(15);
        let processor = MessageProcessor {
            queue: queue.clone(),
            storage,
            alerts,
            sink,
            save_all_flag: save_all,
        };
        (processor, queue)
    }

    #[tokio::test]
    async fn non_empty_message_is_persisted_and_broadcast() {
        let sink = Arc::new(RecordingSink::default());
        let (processor, _queue) = test_processor(false, sink.clone()).await;

        processor
            .process_one(RawPayload {
                kind: DecoderKind::Acars,
                channel: 0,
                value: json!({"text": "hello", "tail": "N1"}),
            })
            .await;

        let events = sink.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, EVENT_MESSAGE);
    }

    #[tokio::test]
    async fn empty_message_without_save_all_emits_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let (processor, _queue) = test_processor(false, sink.clone()).await;

        processor
            .process_one(RawPayload {
                kind: DecoderKind::Acars,
                channel: 0,
                value: json!({}),
            })
            .await;

        assert!(sink.events.lock().is_empty());
    }

    #[tokio::test]
    async fn alert_hit_is_reflected_in_enriched_broadcast() {
        let sink = Arc::new(RecordingSink::default());
        let (processor, _queue) = test_processor(false, sink.clone()).await;
        processor.alerts.set_terms(vec!["MAYDAY".to_string()]).await.unwrap();

        processor
            .process_one(RawPayload {
                kind: DecoderKind::Acars,
                channel: 0,
                value: json!({"text": "MAYDAY MAYDAY"}),
            })
            .await;

        let events = sink.events.lock();
        assert_eq!(events[0].1["matched"], true);
    }
}
