// src/core/message.rs

//! The normalized message record that flows through the pipeline, and the
//! raw payload shape listeners hand to the formatter.

use crate::config::DecoderKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A process-unique opaque identifier assigned at persistence time.
pub type Uid = u64;

/// A flat, normalized record produced by the formatter and enriched through
/// the remaining processing stages.
///
/// Every string field defaults to empty; callers must treat an absent field
/// identically to an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Message {
    #[serde(default)]
    pub uid: Uid,
    pub kind: DecoderKindWire,
    /// Seconds since epoch. Stored and compared as whole seconds throughout,
    /// never milliseconds.
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub station_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub flight: String,
    #[serde(default)]
    pub tail: String,
    #[serde(default)]
    pub icao: String,
    #[serde(default)]
    pub depa: String,
    #[serde(default)]
    pub dsta: String,
    /// Zero-padded to 7 characters by the formatter.
    #[serde(default)]
    pub freq: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub msgno: String,
    #[serde(default)]
    pub from_addr: String,
    #[serde(default)]
    pub to_addr: String,
    #[serde(default)]
    pub error: i64,
    #[serde(default)]
    pub eta: String,
    #[serde(default)]
    pub gate_out: String,
    #[serde(default)]
    pub gate_in: String,
    #[serde(default)]
    pub wheels_off: String,
    #[serde(default)]
    pub wheels_on: String,
    #[serde(default)]
    pub lat: String,
    #[serde(default)]
    pub lon: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub libacars: String,

    // Supplemental, additive fields not carried by every decoder.
    /// Zero-based index of the listener within its decoder kind.
    #[serde(default)]
    pub channel: usize,
    /// App-level diagnostics attached by the formatter and processor.
    /// Broadcast alongside the message but never persisted to storage.
    #[serde(default)]
    pub metadata: MessageMetadata,
}

/// Self-observability fields: how big the raw payload was, and how long
/// the processing pipeline took to turn it into a broadcast event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct MessageMetadata {
    #[serde(default)]
    pub payload_len: usize,
    #[serde(default)]
    pub processing_duration_ms: f64,
}

/// Wire-level mirror of `DecoderKind` so `Message` can round-trip through
/// JSON the way the pipeline's own producers/consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKindWire {
    Acars,
    Vdlm2,
    Hfdl,
    Imsl,
    Irdm,
}

impl Default for DecoderKindWire {
    fn default() -> Self {
        Self::Acars
    }
}

impl From<DecoderKind> for DecoderKindWire {
    fn from(k: DecoderKind) -> Self {
        match k {
            DecoderKind::Acars => Self::Acars,
            DecoderKind::Vdlm2 => Self::Vdlm2,
            DecoderKind::Hfdl => Self::Hfdl,
            DecoderKind::Imsl => Self::Imsl,
            DecoderKind::Irdm => Self::Irdm,
        }
    }
}

impl From<DecoderKindWire> for DecoderKind {
    fn from(k: DecoderKindWire) -> Self {
        match k {
            DecoderKindWire::Acars => Self::Acars,
            DecoderKindWire::Vdlm2 => Self::Vdlm2,
            DecoderKindWire::Hfdl => Self::Hfdl,
            DecoderKindWire::Imsl => Self::Imsl,
            DecoderKindWire::Irdm => Self::Irdm,
        }
    }
}

impl Message {
    /// True if any of a handful of payload-carrying fields is present and
    /// non-empty.
    pub fn is_non_empty(&self) -> bool {
        !self.text.is_empty()
            || !self.libacars.is_empty()
            || !self.dsta.is_empty()
            || !self.depa.is_empty()
            || !self.eta.is_empty()
            || !self.gate_out.is_empty()
            || !self.gate_in.is_empty()
            || !self.wheels_off.is_empty()
            || !self.wheels_on.is_empty()
            || !self.lat.is_empty()
            || !self.lon.is_empty()
            || !self.alt.is_empty()
    }
}

/// A raw, untyped payload as received from a listener, prior to formatting.
/// Kept as a `serde_json::Value` because each decoder kind has its own shape.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub kind: DecoderKind,
    pub channel: usize,
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_is_empty() {
        assert!(!Message::default().is_non_empty());
    }

    #[test]
    fn text_alone_makes_it_non_empty() {
        let mut m = Message::default();
        m.text = "hello".to_string();
        assert!(m.is_non_empty());
    }

    #[test]
    fn lat_lon_alone_makes_it_non_empty() {
        let mut m = Message::default();
        m.lat = "10.0".to_string();
        assert!(m.is_non_empty());
    }
}
