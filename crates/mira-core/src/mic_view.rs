// view model for the mic pill, derived from the mic event stream

use crate::speech::{MicEvent, MicStatus, OverlayResult, LISTENING_MESSAGE};
use serde::Serialize;

pub const NO_ANSWER_TEXT: &str = "No answer returned.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MicPhase {
    Idle,
    Listening,
    Processing,
    Responded,
}

impl MicPhase {
    pub fn heading(self) -> &'static str {
        match self {
            MicPhase::Listening => LISTENING_MESSAGE,
            MicPhase::Processing => "Processing screenshot…",
            MicPhase::Responded => "Assistant reply",
            MicPhase::Idle => "Voice assistant",
        }
    }
}

/// what the pill renders; published on `mic:view`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MicView {
    pub phase: MicPhase,
    pub heading: &'static str,
    /// status line under the heading, hidden once a reply is shown
    pub message: Option<String>,
    pub transcript: Option<String>,
    pub reply: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MicViewModel {
    status: Option<MicStatus>,
    message: Option<String>,
    result: Option<OverlayResult>,
    was_recording: bool,
}

impl MicViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &MicEvent) {
        match event {
            MicEvent::Status(status) => {
                self.message = status
                    .message
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string);
                // a fresh recording starts a new exchange
                if status.recording && !self.was_recording {
                    self.result = None;
                }
                self.was_recording = status.recording;
                self.status = Some(status.clone());
            }
            MicEvent::Response(result) => {
                self.result = Some(result.clone());
                self.message = None;
            }
        }
    }

    pub fn phase(&self) -> MicPhase {
        let has_answer = self
            .result
            .as_ref()
            .is_some_and(|r| r.transcript().is_some() || r.reply().is_some());
        if has_answer {
            MicPhase::Responded
        } else if self.status.as_ref().is_some_and(|s| s.recording) {
            MicPhase::Listening
        } else if self.message.is_some() {
            MicPhase::Processing
        } else {
            MicPhase::Idle
        }
    }

    pub fn view(&self) -> MicView {
        let phase = self.phase();
        let responded = phase == MicPhase::Responded;
        let result = self.result.as_ref().filter(|_| responded);
        MicView {
            phase,
            heading: phase.heading(),
            message: self.message.clone().filter(|_| !responded),
            transcript: result.and_then(OverlayResult::transcript),
            reply: result.map(|r| r.reply().unwrap_or_else(|| NO_ANSWER_TEXT.to_string())),
            model: result.and_then(OverlayResult::model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(recording: bool, message: &str) -> MicEvent {
        MicEvent::Status(MicStatus {
            recording,
            message: Some(message.to_string()),
        })
    }

    fn response(value: serde_json::Value) -> MicEvent {
        MicEvent::Response(OverlayResult::new(value))
    }

    #[test]
    fn test_initial_view_is_idle() {
        let view = MicViewModel::new().view();
        assert_eq!(view.phase, MicPhase::Idle);
        assert_eq!(view.heading, "Voice assistant");
        assert_eq!(view.reply, None);
    }

    #[test]
    fn test_full_exchange() {
        let mut model = MicViewModel::new();

        model.apply(&status(true, "Listening…"));
        assert_eq!(model.phase(), MicPhase::Listening);

        model.apply(&status(false, "Capturing screenshot"));
        let view = model.view();
        assert_eq!(view.phase, MicPhase::Processing);
        assert_eq!(view.heading, "Processing screenshot…");
        assert_eq!(view.message.as_deref(), Some("Capturing screenshot"));

        model.apply(&response(json!({
            "transcript": "what is this",
            "overlay_response": {"reply": "a chart", "model": "gemini-pro"}
        })));
        let view = model.view();
        assert_eq!(view.phase, MicPhase::Responded);
        assert_eq!(view.heading, "Assistant reply");
        assert_eq!(view.message, None);
        assert_eq!(view.transcript.as_deref(), Some("what is this"));
        assert_eq!(view.reply.as_deref(), Some("a chart"));
        assert_eq!(view.model.as_deref(), Some("gemini-pro"));

        // the exit status keeps the answer on screen
        model.apply(&status(false, "Speech process finished"));
        let view = model.view();
        assert_eq!(view.phase, MicPhase::Responded);
        assert_eq!(view.message, None);
    }

    #[test]
    fn test_new_recording_clears_previous_answer() {
        let mut model = MicViewModel::new();
        model.apply(&response(json!({"reply": "old"})));
        model.apply(&status(false, "done"));
        assert_eq!(model.phase(), MicPhase::Responded);

        model.apply(&status(true, "Listening…"));
        assert_eq!(model.phase(), MicPhase::Listening);
        assert_eq!(model.view().reply, None);
    }

    #[test]
    fn test_transcript_only_shows_placeholder_reply() {
        let mut model = MicViewModel::new();
        model.apply(&response(json!({"transcript": "hello"})));
        let view = model.view();
        assert_eq!(view.phase, MicPhase::Responded);
        assert_eq!(view.reply.as_deref(), Some(NO_ANSWER_TEXT));
    }

    #[test]
    fn test_blank_message_is_dropped() {
        let mut model = MicViewModel::new();
        model.apply(&status(false, "   "));
        assert_eq!(model.phase(), MicPhase::Idle);
    }

    #[test]
    fn test_empty_result_does_not_count_as_answer() {
        let mut model = MicViewModel::new();
        model.apply(&status(true, "Listening…"));
        model.apply(&response(json!({"status": "ok"})));
        assert_eq!(model.phase(), MicPhase::Listening);
    }
}
