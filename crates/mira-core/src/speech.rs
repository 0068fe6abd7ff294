// framing and classification of the speech subprocess output
//
// stdout carries either `[overlay] <tag>` status lines or one JSON document per
// line with the final result. stderr is free-form diagnostics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// prefix the speech process puts in front of status tags
pub const STATUS_MARKER: &str = "[overlay]";

/// env var + value that switch the speech process into overlay output mode
pub const OVERLAY_MODE_ENV: (&str, &str) = ("SPEECH_OUTPUT_MODE", "overlay");

pub const LISTENING_MESSAGE: &str = "Listening…";
pub const NO_AUDIO_MESSAGE: &str = "No speech detected";
pub const EMPTY_RESPONSE_MESSAGE: &str = "Assistant returned no answer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicStatus {
    pub recording: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MicStatus {
    pub fn recording(message: impl Into<String>) -> Self {
        Self {
            recording: true,
            message: Some(message.into()),
        }
    }

    pub fn stopped(message: impl Into<String>) -> Self {
        Self {
            recording: false,
            message: Some(message.into()),
        }
    }
}

/// structured result emitted by the speech process
///
/// The payload is whatever JSON the process printed. Only the fields the
/// overlay cares about get typed accessors; everything else rides along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayResult(Value);

impl OverlayResult {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn transcript(&self) -> Option<String> {
        self.0.get("transcript").and_then(display_text)
    }

    /// assistant reply, preferring the nested `overlay_response` object
    pub fn reply(&self) -> Option<String> {
        match self.0.get("overlay_response") {
            Some(overlay @ Value::Object(_)) => first_present(overlay, &["reply", "response"]),
            _ => first_present(&self.0, &["reply", "response"]),
        }
    }

    pub fn model(&self) -> Option<String> {
        if let Some(overlay @ Value::Object(_)) = self.0.get("overlay_response") {
            if let Some(model) = overlay.get("model").and_then(display_text) {
                return Some(model);
            }
        }
        self.0.get("model").and_then(display_text)
    }
}

// first key that is present and non-null wins, even if its text is empty
fn first_present(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).filter(|v| !v.is_null()))
        .and_then(display_text)
}

fn display_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "true".to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[derive(Debug, Clone, PartialEq)]
pub enum MicEvent {
    Status(MicStatus),
    Response(OverlayResult),
}

/// Splits a byte stream into `\n`-terminated lines.
///
/// Bytes after the last newline stay buffered until the next chunk (or
/// [`LineBuffer::finish`]) completes them, so a line split across reads is
/// seen exactly once. Splitting happens on raw bytes: a multi-byte UTF-8
/// character cut between two reads is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.pending[start..end]).into_owned());
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// flush the trailing partial line once the stream ended
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// classify one complete stdout line; blank lines produce nothing
pub fn classify_stdout_line(line: &str) -> Option<MicEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') || line.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(line) {
            if value.is_object() || value.is_array() {
                return Some(MicEvent::Response(OverlayResult::new(value)));
            }
        }
    }

    if let Some(tag) = line.strip_prefix(STATUS_MARKER) {
        return Some(MicEvent::Status(status_from_tag(tag.trim())));
    }

    // unmarked chatter still counts as "in progress"
    Some(MicEvent::Status(MicStatus::recording(line)))
}

/// stderr is diagnostics only; every non-blank line reads as in-progress
pub fn classify_stderr_line(line: &str) -> Option<MicEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(MicEvent::Status(MicStatus::recording(line)))
}

fn status_from_tag(tag: &str) -> MicStatus {
    let lower = tag.to_ascii_lowercase();

    if lower.starts_with("error") {
        let detail = tag["error".len()..].trim_start_matches(':').trim();
        return if detail.is_empty() {
            MicStatus::stopped("Error")
        } else {
            MicStatus::stopped(format!("Error: {detail}"))
        };
    }
    if lower.contains("no-audio") || lower.contains("no audio") {
        return MicStatus::stopped(NO_AUDIO_MESSAGE);
    }
    if lower.contains("empty-response") || lower.contains("empty response") {
        return MicStatus::stopped(EMPTY_RESPONSE_MESSAGE);
    }
    if lower.contains("recording") {
        return MicStatus::recording(LISTENING_MESSAGE);
    }

    MicStatus {
        recording: false,
        message: (!tag.is_empty()).then(|| tag.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(chunks: &[&[u8]]) -> (Vec<String>, Option<String>) {
        let mut buffer = LineBuffer::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(buffer.push(chunk));
        }
        (lines, buffer.finish())
    }

    #[test]
    fn test_line_split_across_chunks() {
        let (lines, rest) = feed(&[b"[overlay] rec", b"ording\n{\"a\":", b"1}\npart"]);
        assert_eq!(lines, vec!["[overlay] recording", "{\"a\":1}"]);
        assert_eq!(rest.as_deref(), Some("part"));
    }

    #[test]
    fn test_every_split_point_recovers_the_stream() {
        let stream = "first line\n\nsecond ✓ line\n{\"transcript\":\"hé\"}\ntail";
        let bytes = stream.as_bytes();

        for cut_a in 0..=bytes.len() {
            for cut_b in cut_a..=bytes.len() {
                let (lines, rest) = feed(&[&bytes[..cut_a], &bytes[cut_a..cut_b], &bytes[cut_b..]]);
                assert_eq!(lines.len(), 4, "cuts at {cut_a}/{cut_b}");

                let mut rebuilt = lines.join("\n");
                rebuilt.push('\n');
                rebuilt.push_str(rest.as_deref().unwrap_or(""));
                assert_eq!(rebuilt, stream, "cuts at {cut_a}/{cut_b}");
            }
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let stream = b"a\nbb\nccc\n";
        let chunks: Vec<&[u8]> = stream.chunks(1).collect();
        let (lines, rest) = feed(&chunks);
        assert_eq!(lines, vec!["a", "bb", "ccc"]);
        assert!(rest.is_none());
    }

    #[test]
    fn test_json_object_and_array_are_responses() {
        let event = classify_stdout_line(r#"{"transcript":"hello","overlay_response":{"reply":"hi"}}"#);
        let result = match event {
            Some(MicEvent::Response(result)) => result,
            other => panic!("expected response, got {other:?}"),
        };
        assert_eq!(result.transcript().as_deref(), Some("hello"));
        assert_eq!(result.reply().as_deref(), Some("hi"));

        assert!(matches!(classify_stdout_line("[1, 2]"), Some(MicEvent::Response(_))));
    }

    #[test]
    fn test_json_scalars_are_not_responses() {
        assert_eq!(
            classify_stdout_line("42"),
            Some(MicEvent::Status(MicStatus::recording("42")))
        );
    }

    #[test]
    fn test_status_vocabulary() {
        let cases = [
            ("[overlay] recording", MicStatus::recording(LISTENING_MESSAGE)),
            ("[overlay] no-audio", MicStatus::stopped(NO_AUDIO_MESSAGE)),
            ("[overlay] empty-response", MicStatus::stopped(EMPTY_RESPONSE_MESSAGE)),
            ("[overlay] error: mic busy", MicStatus::stopped("Error: mic busy")),
            ("[overlay] error:recording failed", MicStatus::stopped("Error: recording failed")),
            ("[overlay] Capturing screenshot", MicStatus::stopped("Capturing screenshot")),
        ];
        for (line, expected) in cases {
            assert_eq!(classify_stdout_line(line), Some(MicEvent::Status(expected)), "{line}");
        }
    }

    #[test]
    fn test_bare_marker_has_no_message() {
        assert_eq!(
            classify_stdout_line("[overlay]"),
            Some(MicEvent::Status(MicStatus { recording: false, message: None }))
        );
    }

    #[test]
    fn test_unmarked_lines_count_as_recording() {
        assert_eq!(
            classify_stdout_line("  INFO warming up  "),
            Some(MicEvent::Status(MicStatus::recording("INFO warming up")))
        );
        assert_eq!(classify_stdout_line("   "), None);
        assert_eq!(
            classify_stderr_line("[INFO] Recording for 5 seconds"),
            Some(MicEvent::Status(MicStatus::recording("[INFO] Recording for 5 seconds")))
        );
    }

    #[test]
    fn test_reply_fallbacks() {
        let nested = OverlayResult::new(json!({"overlay_response": {"response": " ok ", "model": "gemini"}}));
        assert_eq!(nested.reply().as_deref(), Some("ok"));
        assert_eq!(nested.model().as_deref(), Some("gemini"));

        let flat = OverlayResult::new(json!({"reply": "flat", "model": "m"}));
        assert_eq!(flat.reply().as_deref(), Some("flat"));
        assert_eq!(flat.model().as_deref(), Some("m"));

        // null overlay response falls back to the top level
        let null_overlay = OverlayResult::new(json!({"overlay_response": null, "response": "top"}));
        assert_eq!(null_overlay.reply().as_deref(), Some("top"));

        let empty = OverlayResult::new(json!({"transcript": "  "}));
        assert_eq!(empty.transcript(), None);
        assert_eq!(empty.reply(), None);
    }
}
