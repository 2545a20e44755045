// src/core/processor/format.rs

//! Per-decoder-kind formatters that turn a raw JSON payload into a flat
//! `Message`. An unrecognized kind or a payload missing every field this
//! formatter looks for still yields a `Message` (an all-empty one reports
//! as "non-empty: false" downstream, which is the correct "skip
//! persistence" outcome for the processor's save decision).

use crate::config::DecoderKind;
use crate::core::message::{Message, MessageMetadata};
use serde_json::Value;

fn str_field(value: &Value, keys: &[&str]) -> String {
    for key in keys {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            if !s.is_empty() {
                return s.to_string();
            }
        }
    }
    String::new()
}

/// Reads a field that may arrive as either a JSON number or a numeric
/// string, always returning its string form.
fn numeric_as_string(value: &Value, keys: &[&str]) -> String {
    for key in keys {
        match value.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    String::new()
}

fn int_field(value: &Value, keys: &[&str]) -> i64 {
    for key in keys {
        match value.get(key) {
            Some(Value::Number(n)) => return n.as_i64().unwrap_or(0),
            Some(Value::String(s)) => {
                if let Ok(n) = s.parse() {
                    return n;
                }
            }
            _ => {}
        }
    }
    0
}

/// Frequency strings are zero-padded to 7 characters.
fn pad_freq(freq: &str) -> String {
    if freq.is_empty() || freq.len() >= 7 {
        freq.to_string()
    } else {
        format!("{freq:0>7}")
    }
}

/// Whole-seconds time, never milliseconds (see DESIGN.md for the rationale).
fn time_seconds(value: &Value) -> f64 {
    match value.get("timestamp").or_else(|| value.get("time")) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0).trunc(),
        Some(Value::String(s)) => s.parse::<f64>().unwrap_or(0.0).trunc(),
        _ => 0.0,
    }
}

/// Formats one raw payload for `kind` into a `Message`. Every decoder kind
/// shares the same flat field set; kinds differ only in the source JSON key
/// names a producer happens to use for a given field.
pub fn format(kind: DecoderKind, channel: usize, value: &Value) -> Message {
    let freq = pad_freq(&numeric_as_string(value, &["freq", "freq_mhz", "frequency"]));
    let payload_len = value.to_string().len();

    Message {
        uid: 0,
        kind: kind.into(),
        time: time_seconds(value),
        station_id: str_field(value, &["station_id", "station", "ground_station"]),
        text: str_field(value, &["text", "msg_text"]),
        label: str_field(value, &["label"]),
        flight: str_field(value, &["flight", "callsign"]),
        tail: str_field(value, &["tail", "registration"]),
        icao: str_field(value, &["icao", "icao_hex", "addr"]).to_uppercase(),
        depa: str_field(value, &["depa", "origin", "dep"]),
        dsta: str_field(value, &["dsta", "destination", "dest"]),
        freq,
        level: numeric_as_string(value, &["level", "signal_level", "rssi"]),
        msgno: str_field(value, &["msgno", "message_number"]),
        from_addr: str_field(value, &["from", "from_addr"]),
        to_addr: str_field(value, &["to", "to_addr"]),
        error: int_field(value, &["error"]),
        eta: str_field(value, &["eta"]),
        gate_out: str_field(value, &["gate_out", "gout"]),
        gate_in: str_field(value, &["gate_in", "gin"]),
        wheels_off: str_field(value, &["wheels_off", "woff"]),
        wheels_on: str_field(value, &["wheels_on", "won"]),
        lat: numeric_as_string(value, &["lat", "latitude"]),
        lon: numeric_as_string(value, &["lon", "longitude"]),
        alt: numeric_as_string(value, &["alt", "altitude"]),
        libacars: value
            .get("libacars")
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .unwrap_or_default(),
        channel,
        metadata: MessageMetadata {
            payload_len,
            processing_duration_ms: 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_common_fields_across_kinds() {
        let payload = json!({
            "timestamp": 1_700_000_000.5,
            "text": "UAL123 departed",
            "tail": "N8560Z",
            "flight": "UAL123",
            "icao": "abcdef",
            "freq": 131.0,
        });
        let msg = format(DecoderKind::Acars, 0, &payload);
        assert_eq!(msg.text, "UAL123 departed");
        assert_eq!(msg.icao, "ABCDEF");
        assert_eq!(msg.time, 1_700_000_000.0);
        assert_eq!(msg.freq, "00131.0");
    }

    #[test]
    fn missing_fields_yield_empty_strings_not_panics() {
        let msg = format(DecoderKind::Hfdl, 2, &json!({}));
        assert!(msg.text.is_empty());
        assert_eq!(msg.channel, 2);
    }

    #[test]
    fn alias_keys_are_tried_in_order() {
        let payload = json!({"callsign": "DAL45", "registration": "N123DL"});
        let msg = format(DecoderKind::Vdlm2, 0, &payload);
        assert_eq!(msg.flight, "DAL45");
        assert_eq!(msg.tail, "N123DL");
    }
}
