// src/core/listener/framing.rs

//! Frame decoding shared by every transport: UTF-8 decode, trim, the
//! defensive `}{ -> }\n{` split for back-to-back JSON objects in a single
//! read, and per-segment JSON parsing.

use serde_json::Value;
use tracing::debug;

/// Splits a raw frame into zero or more JSON values.
///
/// A parse failure on one segment is logged at debug and that segment is
/// dropped; other segments in the same frame are unaffected.
pub fn split_and_parse(raw: &[u8], endpoint: &str) -> Vec<Value> {
    let text = match std::str::from_utf8(raw) {
        Ok(t) => t.trim(),
        Err(e) => {
            debug!("{endpoint}: frame was not valid UTF-8: {e}");
            return Vec::new();
        }
    };
    if text.is_empty() {
        return Vec::new();
    }

    split_segments(text)
        .into_iter()
        .filter_map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(segment) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!("{endpoint}: dropping unparsable segment: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Applies the `}{ -> }\n{` defensive split so concatenated JSON objects in
/// one read are separated, then splits on newlines.
fn split_segments(text: &str) -> Vec<String> {
    text.replace("}{", "}\n{")
        .lines()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object_parses() {
        let got = split_and_parse(br#"{"a":1}"#, "test");
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn concatenated_objects_are_split() {
        let got = split_and_parse(br#"{"a":1}{"b":2}"#, "test");
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn line_delimited_objects_all_parse() {
        let got = split_and_parse(b"{\"a\":1}\n{\"b\":2}\n", "test");
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn one_bad_segment_does_not_drop_the_others() {
        let got = split_and_parse(b"{\"a\":1}\nnot-json\n{\"b\":2}", "test");
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn empty_frame_yields_nothing() {
        assert!(split_and_parse(b"   \n  ", "test").is_empty());
    }
}
