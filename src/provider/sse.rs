//! Server-sent-events decoding for streamed chat completions.
//!
//! The wire protocol is line-oriented: each event is a `data: ` line whose
//! payload is either a JSON chunk carrying `choices[0].delta.content` or the
//! literal `[DONE]` terminator. Lines that are not data lines (comments,
//! blank keep-alives) are skipped.

use crate::error::ChatError;
use serde_json::Value;
use std::io::BufRead;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Extract the text delta from one event payload. `None` for the `[DONE]`
/// terminator, chunks without content (role-only first chunk, finish
/// chunk), and unparsable payloads.
pub fn delta_from_event(payload: &str) -> Option<String> {
    let payload = payload.trim();
    if payload.is_empty() || payload == DONE_MARKER {
        return None;
    }
    let chunk: Value = serde_json::from_str(payload).ok()?;
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string)
}

/// True when the payload signals end of stream.
pub fn is_done(payload: &str) -> bool {
    payload.trim() == DONE_MARKER
}

/// Read an SSE body line by line, pushing each content delta into `sink`.
/// Returns the accumulated text. Stops early when `sink` returns `false`
/// or the `[DONE]` marker arrives; a read error mid-stream is a connection
/// error.
pub fn read_stream<R: BufRead>(
    reader: R,
    sink: &mut dyn FnMut(&str) -> bool,
) -> Result<String, ChatError> {
    let mut accumulated = String::new();
    for line in reader.lines() {
        let line = line.map_err(|err| ChatError::Connection(err.to_string()))?;
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        if is_done(payload) {
            break;
        }
        if let Some(delta) = delta_from_event(payload) {
            if delta.is_empty() {
                continue;
            }
            accumulated.push_str(&delta);
            if !sink(&delta) {
                break;
            }
        }
    }
    Ok(accumulated)
}
