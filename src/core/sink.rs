// src/core/sink.rs

//! The real-time sink contract: `emit(event_name, payload)`. The subscriber
//! fabric that turns these into client connections is out of scope for
//! this crate; this module only defines the trait every stage emits
//! through and one broadcast-channel-backed production implementation (a
//! `DashMap` of named `tokio::broadcast` channels, one per event name).

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

/// The four event names the core emits.
pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_STATION_IDS: &str = "station_ids";
pub const EVENT_SYSTEM_STATUS: &str = "system_status";
pub const EVENT_ADSB_SNAPSHOT: &str = "adsb_snapshot";

/// Anything that can receive `(event_name, payload)` emissions from the
/// pipeline. The out-of-scope subscriber fabric implements this to fan
/// events out to connected clients; tests implement it to record emissions.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

const CHANNEL_CAPACITY: usize = 256;

/// Production `EventSink`: one broadcast channel per event name, created
/// lazily on first emit or subscribe.
pub struct BroadcastSink {
    channels: DashMap<String, broadcast::Sender<Value>>,
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastSink {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribes to a named event, creating its channel if this is the
    /// first subscriber.
    pub fn subscribe(&self, event: &str) -> broadcast::Receiver<Value> {
        self.channels
            .entry(event.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .value()
            .subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    fn emit(&self, event: &str, payload: Value) {
        let sender = self
            .channels
            .entry(event.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        // No subscribers is not an error: the subscriber fabric is
        // out-of-scope and may not yet (or ever) be listening.
        let _ = sender.send(payload);
    }
}

/// Test double that records every emission in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    pub events: parking_lot::Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl EventSink for RecordingSink {
    fn emit(&self, event: &str, payload: Value) {
        self.events.lock().push((event.to_string(), payload));
    }
}
