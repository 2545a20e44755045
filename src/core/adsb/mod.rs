// src/core/adsb/mod.rs

//! The ADS-B snapshot poller: periodically fetches a fixed-schema JSON
//! payload, projects it to a known field subset, and caches the last
//! successful snapshot. Failures retain the stale cache and are reported
//! to the sink as `error` events; they never interrupt the poll schedule.

use crate::config::AdsbConfig;
use crate::core::sink::{EventSink, EVENT_ADSB_SNAPSHOT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// One aircraft's projected fields, a fixed known subset of the upstream schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AircraftEntry {
    pub hex: String,
    #[serde(default)]
    pub flight: String,
    pub alt_baro: Option<f64>,
    pub gs: Option<f64>,
    pub track: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub seen: Option<f64>,
    pub seen_pos: Option<f64>,
    pub rssi: Option<f64>,
    pub messages: Option<i64>,
    #[serde(default)]
    pub category: String,
}

/// The cached, projected snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AdsbSnapshot {
    pub now: f64,
    pub aircraft: Vec<AircraftEntry>,
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Projects one raw aircraft object, dropping unrecognized fields and
/// coercing numeric strings to numbers. A missing `hex` makes the entry
/// unusable (nothing downstream can key on it), so it's skipped.
fn project_aircraft(raw: &Value) -> Option<AircraftEntry> {
    let hex = raw.get("hex").map(coerce_string).filter(|s| !s.is_empty())?;
    Some(AircraftEntry {
        hex,
        flight: raw.get("flight").map(coerce_string).unwrap_or_default().trim().to_string(),
        alt_baro: raw.get("alt_baro").and_then(coerce_f64),
        gs: raw.get("gs").and_then(coerce_f64),
        track: raw.get("track").and_then(coerce_f64),
        lat: raw.get("lat").and_then(coerce_f64),
        lon: raw.get("lon").and_then(coerce_f64),
        seen: raw.get("seen").and_then(coerce_f64),
        seen_pos: raw.get("seen_pos").and_then(coerce_f64),
        rssi: raw.get("rssi").and_then(coerce_f64),
        messages: raw.get("messages").and_then(coerce_i64),
        category: raw.get("category").map(coerce_string).unwrap_or_default(),
    })
}

fn project_snapshot(raw: &Value) -> Option<AdsbSnapshot> {
    let now = raw.get("now").and_then(coerce_f64)?;
    let aircraft = raw
        .get("aircraft")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(project_aircraft).collect())
        .unwrap_or_default();
    Some(AdsbSnapshot { now, aircraft })
}

pub struct AdsbPoller {
    config: AdsbConfig,
    client: reqwest::Client,
    cache: RwLock<Option<AdsbSnapshot>>,
    sink: Arc<dyn EventSink>,
}

impl AdsbPoller {
    pub fn new(config: AdsbConfig, sink: Arc<dyn EventSink>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            cache: RwLock::new(None),
            sink,
        }
    }

    /// The last successful snapshot, or `None` before the first success.
    pub async fn cached_data(&self) -> Option<AdsbSnapshot> {
        self.cache.read().await.clone()
    }

    async fn poll_once(&self) {
        let result = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let body = match result {
            Ok(response) => response.json::<Value>().await,
            Err(e) => Err(e),
        };

        match body {
            Ok(raw) => match project_snapshot(&raw) {
                Some(snapshot) => {
                    *self.cache.write().await = Some(snapshot.clone());
                    self.sink.emit(EVENT_ADSB_SNAPSHOT, json!(snapshot));
                }
                None => {
                    warn!("adsb poller: response did not match the expected schema");
                    self.sink.emit(
                        "error",
                        json!({"source": "adsb", "message": "malformed snapshot payload"}),
                    );
                }
            },
            Err(e) => {
                debug!("adsb poller: request failed: {e}");
                self.sink
                    .emit("error", json!({"source": "adsb", "message": e.to_string()}));
            }
        }
    }

    /// Runs the poll loop until `shutdown` fires. No-op if ADS-B is disabled.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            return;
        }
        let mut interval = tokio::time::interval(self.config.poll_interval());
        loop {
            tokio::select! {
                _ = interval.tick() => self.poll_once().await,
                _ = shutdown.recv() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sink::RecordingSink;

    #[test]
    fn projects_known_fields_and_coerces_numeric_strings() {
        let raw = json!({
            "now": "1700000000.0",
            "aircraft": [
                {"hex": "abc123", "flight": "UAL123 ", "alt_baro": "35000", "lat": 40.1, "unknown_field": "drop me"}
            ]
        });
        let snapshot = project_snapshot(&raw).unwrap();
        assert_eq!(snapshot.now, 1_700_000_000.0);
        assert_eq!(snapshot.aircraft.len(), 1);
        assert_eq!(snapshot.aircraft[0].flight, "UAL123");
        assert_eq!(snapshot.aircraft[0].alt_baro, Some(35000.0));
    }

    #[test]
    fn aircraft_without_hex_is_dropped() {
        let raw = json!({"now": 1.0, "aircraft": [{"flight": "UAL1"}]});
        let snapshot = project_snapshot(&raw).unwrap();
        assert!(snapshot.aircraft.is_empty());
    }

    #[test]
    fn missing_now_field_fails_projection() {
        assert!(project_snapshot(&json!({"aircraft": []})).is_none());
    }

    #[tokio::test]
    async fn cache_is_empty_before_first_poll() {
        let config = AdsbConfig {
            enabled: false,
            ..AdsbConfig::default()
        };
        let poller = AdsbPoller::new(config, Arc::new(RecordingSink::default()));
        assert!(poller.cached_data().await.is_none());
    }
}
