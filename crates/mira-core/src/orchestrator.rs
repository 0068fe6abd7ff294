// wires the overlay windows, the mic session and the event relay together
//
// Everything here is what the renderer reaches through commands; the shell
// only adapts arguments and return values.

use crate::backend::{AssistReply, BackendClient, BackendError};
use crate::capture::{capture_screen, CaptureError, ScreenCapturer, Screenshot};
use crate::mic::{MicError, MicEventSink, MicSupervisor, SpeechCommand};
use crate::mic_view::{MicView, MicViewModel};
use crate::overlay::{OverlayHost, OverlayKind, OverlayManager, SurfaceError};
use crate::relay::{EventRelay, MIC_VIEW};
use crate::speech::{MicEvent, MicStatus};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// the mic pill lingers this long after the last output of a session
pub const AUTO_HIDE_DELAY: Duration = Duration::from_secs(6);

/// name the voice upload is sent under
pub const VOICE_FILENAME: &str = "ptt_audio.webm";
const DEFAULT_VOICE_MIME: &str = "audio/webm";

/// `{ok, error?}` answer of the mic commands; these never fail the call itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

impl From<Result<(), MicError>> for CommandOutcome {
    fn from(result: Result<(), MicError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssistOutcome {
    fn answered(reply: AssistReply) -> Self {
        Self {
            ok: true,
            reply: Some(reply.reply),
            model: reply.model,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            reply: None,
            model: None,
            error: Some(error.into()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// answer of a voice question: the request id and, once synthesized, the
/// url of the spoken reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VoiceOutcome {
    fn failed(request_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            request_id,
            audio_url: None,
            error: Some(error.into()),
        }
    }
}

/// Mic events on their way to the renderer: relayed as-is, folded into the
/// pill's view model, and used to time the auto-hide.
pub(crate) struct MicEventRouter<H: OverlayHost> {
    relay: EventRelay,
    overlays: OverlayManager<H>,
    view: Arc<Mutex<MicViewModel>>,
    auto_hide: Duration,
}

impl<H: OverlayHost> MicEventRouter<H> {
    fn forward(&self, event: &MicEvent) {
        self.relay.publish_mic_event(event);

        let view = {
            let mut model = lock(&self.view);
            model.apply(event);
            model.view()
        };
        match serde_json::to_value(&view) {
            Ok(payload) => self.relay.publish(MIC_VIEW, &payload),
            Err(e) => warn!(error = %e, "failed to serialize mic view"),
        }
    }
}

impl<H: OverlayHost> MicEventSink for MicEventRouter<H> {
    fn publish(&self, event: MicEvent) {
        self.forward(&event);
        match event {
            MicEvent::Response(_) => self.overlays.schedule_hide(self.auto_hide),
            // more output after the answer pushes the hide back
            MicEvent::Status(_) if self.overlays.has_pending_hide() => {
                self.overlays.schedule_hide(self.auto_hide);
            }
            MicEvent::Status(_) => {}
        }
    }

    fn session_ended(&self, status: MicStatus) {
        self.forward(&MicEvent::Status(status));
        self.overlays.schedule_hide(self.auto_hide);
    }
}

pub struct Orchestrator<H: OverlayHost> {
    overlays: OverlayManager<H>,
    relay: EventRelay,
    mic: MicSupervisor,
    view: Arc<Mutex<MicViewModel>>,
    capturer: Arc<dyn ScreenCapturer>,
    backend: BackendClient,
}

impl<H: OverlayHost> Orchestrator<H> {
    pub fn new(
        host: H,
        relay: EventRelay,
        speech: SpeechCommand,
        stop_grace: Duration,
        capturer: Arc<dyn ScreenCapturer>,
        backend: BackendClient,
    ) -> Self {
        Self::with_auto_hide(host, relay, speech, stop_grace, capturer, backend, AUTO_HIDE_DELAY)
    }

    pub fn with_auto_hide(
        host: H,
        relay: EventRelay,
        speech: SpeechCommand,
        stop_grace: Duration,
        capturer: Arc<dyn ScreenCapturer>,
        backend: BackendClient,
        auto_hide: Duration,
    ) -> Self {
        let overlays = OverlayManager::new(host);
        let view = Arc::new(Mutex::new(MicViewModel::new()));
        let router = MicEventRouter {
            relay: relay.clone(),
            overlays: overlays.clone(),
            view: view.clone(),
            auto_hide,
        };
        let mic = MicSupervisor::new(speech, stop_grace, Arc::new(router));
        Self {
            overlays,
            relay,
            mic,
            view,
            capturer,
            backend,
        }
    }

    pub fn overlays(&self) -> &OverlayManager<H> {
        &self.overlays
    }

    pub fn relay(&self) -> &EventRelay {
        &self.relay
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn mic_running(&self) -> bool {
        self.mic.is_running()
    }

    pub fn mic_view(&self) -> MicView {
        lock(&self.view).view()
    }

    /// Show the pill first so the first status line lands in a visible window.
    pub fn start_mic(&self) -> CommandOutcome {
        if let Err(e) = self.overlays.show(OverlayKind::MicStatus) {
            warn!(error = %e, "mic overlay unavailable, starting session anyway");
        }
        match self.mic.start() {
            Ok(handle) => {
                info!(session = handle.session_id, pid = ?handle.pid, "mic session started");
                CommandOutcome::ok()
            }
            Err(e) => {
                debug!(error = %e, "mic start rejected");
                CommandOutcome::failed(e.to_string())
            }
        }
    }

    pub async fn stop_mic(&self) -> CommandOutcome {
        self.mic.stop().await.into()
    }

    /// push-to-talk: one key both starts and stops
    pub async fn toggle_mic(&self) -> CommandOutcome {
        if self.mic.is_running() {
            self.stop_mic().await
        } else {
            self.start_mic()
        }
    }

    pub async fn capture(&self) -> Result<Screenshot, CaptureError> {
        let capturer = self.capturer.clone();
        tokio::task::spawn_blocking(move || capture_screen(capturer.as_ref()))
            .await
            .map_err(|e| CaptureError::Capture(e.to_string()))?
    }

    /// PNG data URL of the screen under the pointer
    pub async fn capture_screen(&self) -> Result<String, String> {
        self.capture()
            .await
            .map(|shot| shot.to_data_url())
            .map_err(|e| e.to_string())
    }

    pub async fn assist_with_screenshot(&self, prompt: &str) -> AssistOutcome {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return AssistOutcome::failed("Prompt is empty");
        }

        let shot = match self.capture().await {
            Ok(shot) => shot,
            Err(e) => {
                warn!(error = %e, "screenshot for assist failed");
                return AssistOutcome::failed(e.to_string());
            }
        };
        debug!(width = shot.width, height = shot.height, "sending screenshot to assistant");

        match self.backend.overlay_assist(prompt, shot.png).await {
            Ok(reply) => AssistOutcome::answered(reply),
            Err(e) => {
                warn!(error = %e, "overlay assist failed");
                AssistOutcome::failed(e.to_string())
            }
        }
    }

    /// Upload a recorded question, then wait for the backend to speak the
    /// answer.
    pub async fn ask_by_voice(&self, audio: Vec<u8>, mime: Option<&str>) -> VoiceOutcome {
        if audio.is_empty() {
            return VoiceOutcome::failed(None, "Recording is empty");
        }
        let mime = mime.map(str::trim).filter(|m| !m.is_empty()).unwrap_or(DEFAULT_VOICE_MIME);

        info!(bytes = audio.len(), mime, "uploading voice question");
        let ticket = match self.backend.ingest_voice(audio, VOICE_FILENAME, mime).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(error = %e, "voice upload failed");
                return VoiceOutcome::failed(None, e.to_string());
            }
        };
        let Some(id) = ticket.id_string() else {
            let error = BackendError::Parse("voice upload returned no id".into());
            return VoiceOutcome::failed(None, error.to_string());
        };

        match self.backend.wait_for_tts(&id).await {
            Ok(url) => VoiceOutcome {
                ok: true,
                request_id: Some(id),
                audio_url: Some(url),
                error: None,
            },
            Err(e) => {
                warn!(id, error = %e, "no spoken reply");
                VoiceOutcome::failed(Some(id), e.to_string())
            }
        }
    }

    pub fn toggle_ask_overlay(&self) -> Result<bool, SurfaceError> {
        self.overlays.toggle(OverlayKind::Ask)
    }

    /// Escape from the pill
    pub fn hide_ask_overlay(&self) -> Result<(), SurfaceError> {
        self.overlays.escape_pressed(OverlayKind::Ask)
    }

    pub fn close_ask_overlay(&self) -> Result<(), SurfaceError> {
        self.overlays.close(OverlayKind::Ask)
    }

    /// stop a running session and drop timers; called on app exit
    pub async fn shutdown(&self) {
        self.overlays.cancel_pending_hide();
        match self.mic.stop().await {
            Ok(()) | Err(MicError::NotRunning) => {}
            Err(e) => warn!(error = %e, "mic shutdown failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::serve;
    use crate::capture::tests::{solid, FakeCapturer};
    use crate::geometry::tests::dual_setup;
    use crate::geometry::Point;
    use crate::mic::DEFAULT_STOP_GRACE;
    use crate::mic_view::MicPhase;
    use crate::overlay::mock::MockHost;
    use crate::relay::{MIC_RESPONSE, MIC_STATUS};
    use crate::speech::OverlayResult;
    use serde_json::{json, Value};

    type Recorded = Arc<Mutex<Vec<(String, Value)>>>;

    fn record(relay: &EventRelay, channels: &[&'static str]) -> (Recorded, Vec<crate::relay::Subscription>) {
        let seen: Recorded = Arc::default();
        let subs = channels
            .iter()
            .map(|&channel| {
                let seen = seen.clone();
                relay.subscribe(channel, move |payload| {
                    seen.lock().unwrap().push((channel.to_string(), payload.clone()));
                })
            })
            .collect();
        (seen, subs)
    }

    fn orchestrator(script: &str, capturer: FakeCapturer, auto_hide: Duration) -> (Orchestrator<MockHost>, MockHost) {
        // nothing listens here; only reached when a test wants a failure
        with_backend(script, capturer, auto_hide, BackendClient::new("http://127.0.0.1:9", None))
    }

    fn with_backend(
        script: &str,
        capturer: FakeCapturer,
        auto_hide: Duration,
        backend: BackendClient,
    ) -> (Orchestrator<MockHost>, MockHost) {
        let host = MockHost::with_displays(dual_setup(), Point::new(100.0, 100.0));
        let orchestrator = Orchestrator::with_auto_hide(
            host.clone(),
            EventRelay::new(None),
            SpeechCommand::new("sh").args(["-c", script]),
            DEFAULT_STOP_GRACE,
            Arc::new(capturer),
            backend,
            auto_hide,
        );
        (orchestrator, host)
    }

    fn no_capture() -> FakeCapturer {
        FakeCapturer {
            direct: Ok(None),
            enumerate: None,
        }
    }

    fn router(orch: &Orchestrator<MockHost>) -> MicEventRouter<MockHost> {
        MicEventRouter {
            relay: orch.relay.clone(),
            overlays: orch.overlays.clone(),
            view: orch.view.clone(),
            auto_hide: AUTO_HIDE_DELAY,
        }
    }

    async fn wait_until_idle(orch: &Orchestrator<MockHost>) {
        for _ in 0..200 {
            if !orch.mic_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("mic session did not end");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mic_session_end_to_end() {
        let script = r#"printf '[overlay] recording\n'; printf '{"transcript":"what is this","overlay_response":{"reply":"a chart","model":"m1"}}\n'"#;
        let (orch, _host) = orchestrator(script, no_capture(), Duration::from_millis(300));
        let (seen, _subs) = record(orch.relay(), &[MIC_STATUS, MIC_RESPONSE, MIC_VIEW]);

        assert_eq!(orch.start_mic(), CommandOutcome::ok());
        assert!(orch.overlays().state(OverlayKind::MicStatus).is_visible());

        wait_until_idle(&orch).await;
        // readers flush before the slot is released, so everything has arrived
        let channels: Vec<String> = seen.lock().unwrap().iter().map(|(c, _)| c.clone()).collect();
        assert_eq!(
            channels,
            vec![MIC_STATUS, MIC_VIEW, MIC_RESPONSE, MIC_VIEW, MIC_STATUS, MIC_VIEW]
        );

        let view = orch.mic_view();
        assert_eq!(view.phase, MicPhase::Responded);
        assert_eq!(view.reply.as_deref(), Some("a chart"));
        assert_eq!(view.model.as_deref(), Some("m1"));

        assert!(orch.overlays().state(OverlayKind::MicStatus).is_visible());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!orch.overlays().state(OverlayKind::MicStatus).is_visible());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_start_reports_error() {
        let (orch, _host) = orchestrator("sleep 5", no_capture(), AUTO_HIDE_DELAY);
        assert!(orch.start_mic().ok);

        let again = orch.start_mic();
        assert!(!again.ok);
        assert_eq!(again.error.as_deref(), Some("Mic session already running"));

        assert_eq!(orch.toggle_mic().await, CommandOutcome::ok());
        assert!(!orch.mic_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_ends_running_session_within_grace() {
        let (orch, _host) = orchestrator("sleep 5", no_capture(), AUTO_HIDE_DELAY);
        let (seen, _subs) = record(orch.relay(), &[MIC_STATUS]);
        assert!(orch.start_mic().ok);

        tokio::time::timeout(DEFAULT_STOP_GRACE + Duration::from_secs(1), orch.shutdown())
            .await
            .unwrap();
        assert!(!orch.mic_running());
        // listeners heard the session end before shutdown returned
        let (channel, payload) = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(channel, MIC_STATUS);
        assert_eq!(payload["recording"], json!(false));

        // a second exit request finds nothing to stop
        orch.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_without_session_is_an_outcome() {
        let (orch, _host) = orchestrator("true", no_capture(), AUTO_HIDE_DELAY);
        let outcome = orch.stop_mic().await;
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("Mic session not running"));
        assert_eq!(
            serde_json::to_value(CommandOutcome::ok()).unwrap(),
            json!({"ok": true})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pill_hides_six_seconds_after_last_output() {
        let (orch, _host) = orchestrator("true", no_capture(), AUTO_HIDE_DELAY);
        let sink = router(&orch);
        orch.overlays().show(OverlayKind::MicStatus).unwrap();

        sink.publish(MicEvent::Status(MicStatus::recording("Listening…")));
        assert!(!orch.overlays().has_pending_hide());

        sink.publish(MicEvent::Response(OverlayResult::new(json!({"transcript": "hi"}))));
        tokio::time::sleep(Duration::from_secs(4)).await;
        // exit status restarts the countdown
        sink.session_ended(MicStatus::stopped("Speech process finished"));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(orch.overlays().state(OverlayKind::MicStatus).is_visible());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(!orch.overlays().state(OverlayKind::MicStatus).is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_cancels_auto_hide() {
        let (orch, _host) = orchestrator("true", no_capture(), AUTO_HIDE_DELAY);
        let sink = router(&orch);
        orch.overlays().show(OverlayKind::MicStatus).unwrap();
        sink.session_ended(MicStatus::stopped("Speech process finished"));
        assert!(orch.overlays().has_pending_hide());

        orch.overlays().show(OverlayKind::MicStatus).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(orch.overlays().state(OverlayKind::MicStatus).is_visible());
    }

    #[tokio::test]
    async fn test_capture_screen_returns_data_url() {
        let capturer = FakeCapturer {
            direct: Ok(Some(solid(8, 6))),
            enumerate: None,
        };
        let (orch, _host) = orchestrator("true", capturer, AUTO_HIDE_DELAY);
        let url = orch.capture_screen().await.unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        let (orch, _host) = orchestrator("true", no_capture(), AUTO_HIDE_DELAY);
        assert_eq!(
            orch.capture_screen().await.unwrap_err(),
            "No capture method available"
        );
    }

    #[tokio::test]
    async fn test_assist_rejects_empty_prompt_and_capture_failure() {
        let (orch, _host) = orchestrator("true", no_capture(), AUTO_HIDE_DELAY);

        let empty = orch.assist_with_screenshot("   ").await;
        assert!(!empty.ok);
        assert_eq!(empty.error.as_deref(), Some("Prompt is empty"));

        let no_shot = orch.assist_with_screenshot("what is on screen").await;
        assert_eq!(no_shot.error.as_deref(), Some("No capture method available"));
        assert_eq!(
            serde_json::to_value(&no_shot).unwrap(),
            json!({"ok": false, "error": "No capture method available"})
        );
    }

    #[tokio::test]
    async fn test_ask_overlay_commands() {
        let (orch, host) = orchestrator("true", no_capture(), AUTO_HIDE_DELAY);
        assert!(orch.toggle_ask_overlay().unwrap());
        orch.hide_ask_overlay().unwrap();
        assert!(!orch.overlays().state(OverlayKind::Ask).is_visible());

        orch.toggle_ask_overlay().unwrap();
        orch.close_ask_overlay().unwrap();
        assert_eq!(
            orch.overlays().state(OverlayKind::Ask).lifecycle,
            crate::overlay::Lifecycle::Destroyed
        );
        assert_eq!(host.creates(OverlayKind::Ask), 1);
    }

    #[tokio::test]
    async fn test_ask_by_voice_uploads_then_returns_spoken_reply() {
        let (base, seen) = serve(vec![
            (200, r#"{"id":"v-9","status":"received"}"#),
            (200, r#"{"status":"transcribed"}"#),
            (200, r#"{"status":"tts_done","tts_audio_file":"/media/tts/v-9.mp3"}"#),
        ])
        .await;
        let backend = BackendClient::new(base, None).with_tts_polling(Duration::from_millis(5), 5);
        let (orch, _host) = with_backend("true", no_capture(), AUTO_HIDE_DELAY, backend);

        let outcome = orch.ask_by_voice(b"webm".to_vec(), Some("audio/webm;codecs=opus")).await;
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"ok": true, "request_id": "v-9", "audio_url": "/media/tts/v-9.mp3"})
        );

        let requests = seen.lock().unwrap();
        assert!(requests[0].starts_with("POST /api/voice/ingest/"));
        assert!(requests[0].contains("filename=\"ptt_audio.webm\""));
        assert!(requests[0].contains("audio/webm;codecs=opus"));
        assert!(requests[2].starts_with("GET /api/voice/requests/v-9/"));
    }

    #[tokio::test]
    async fn test_ask_by_voice_failures_are_outcomes() {
        let (orch, _host) = orchestrator("true", no_capture(), AUTO_HIDE_DELAY);
        let empty = orch.ask_by_voice(Vec::new(), None).await;
        assert_eq!(empty.error.as_deref(), Some("Recording is empty"));

        let (base, _seen) = serve(vec![(200, r#"{"id":"v-1"}"#), (200, r#"{"status":"queued"}"#)]).await;
        let backend = BackendClient::new(base, None).with_tts_polling(Duration::from_millis(1), 1);
        let (orch, _host) = with_backend("true", no_capture(), AUTO_HIDE_DELAY, backend);
        let silent = orch.ask_by_voice(b"webm".to_vec(), None).await;
        assert!(!silent.ok);
        assert_eq!(silent.request_id.as_deref(), Some("v-1"));
        assert_eq!(silent.error.as_deref(), Some("Voice request v-1 produced no audio in time"));
    }

    #[tokio::test]
    async fn test_escape_hides_ask_but_not_mic_pill() {
        let (orch, _host) = orchestrator("true", no_capture(), AUTO_HIDE_DELAY);
        orch.overlays().show(OverlayKind::MicStatus).unwrap();
        orch.toggle_ask_overlay().unwrap();

        orch.hide_ask_overlay().unwrap();
        assert!(!orch.overlays().state(OverlayKind::Ask).is_visible());
        assert!(orch.overlays().state(OverlayKind::MicStatus).is_visible());
    }
}
