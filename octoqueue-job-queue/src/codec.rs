//! Payload encoding inside issue bodies.
//!
//! A payload is stored as pretty-printed JSON inside a fenced block labelled
//! `json`, so it stays readable in the tracker's UI. Decoding is lenient:
//! bodies may have been edited by hand or written by older producers that did
//! not use the fence.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::types::Payload;

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// First `json` fence; the closing fence must start its own line, which a
/// pretty-printed JSON document can never do.
static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap());

/// Encode a payload as a canonical issue body.
pub fn encode(payload: &Payload) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string_pretty(payload)?;
    Ok(format!("{FENCE_OPEN}\n{json}\n{FENCE_CLOSE}"))
}

/// Recover a payload from an issue body.
///
/// Tries the first fenced block, then the first `{` from which a complete JSON
/// object parses. Returns `None` when neither yields an object.
pub fn decode(body: &str) -> Option<Payload> {
    decode_fenced(body).or_else(|| scan_for_object(body))
}

fn decode_fenced(body: &str) -> Option<Payload> {
    let captures = FENCED_BLOCK.captures(body)?;
    parse_object(captures.get(1)?.as_str())
}

fn parse_object(text: &str) -> Option<Payload> {
    match serde_json::from_str::<Value>(text.trim()).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Walk every opening brace and try to read one JSON value starting there.
/// Trailing text after the value is ignored.
fn scan_for_object(body: &str) -> Option<Payload> {
    body.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&body[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(map))) => Some(map),
            _ => None,
        }
    })
}
