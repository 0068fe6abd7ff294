// REST client for the dashboard, overlay-assist and voice endpoints

use crate::capture::SCREENSHOT_FILENAME;
use crate::dashboard::{DashboardPayload, DashboardSource};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const TTS_POLL_ATTEMPTS: u32 = 30;
const TTS_POLL_INTERVAL: Duration = Duration::from_secs(1);
const TTS_DONE: &str = "tts_done";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Prompt is empty")]
    EmptyPrompt,
    #[error("Voice request {0} produced no audio in time")]
    TtsTimeout(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistReply {
    #[serde(default)]
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// answer to a voice upload; the backend hands out numeric or string ids
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceTicket {
    pub id: Value,
    #[serde(default)]
    pub status: Option<String>,
}

impl VoiceTicket {
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceRequestStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tts_audio_file: Option<String>,
}

impl VoiceRequestStatus {
    pub fn audio_url(&self) -> Option<&str> {
        if self.status.as_deref() != Some(TTS_DONE) {
            return None;
        }
        self.tts_audio_file.as_deref().filter(|u| !u.is_empty())
    }
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base: String,
    token: Option<String>,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl BackendClient {
    pub fn new(base: impl Into<String>, token: Option<String>) -> Self {
        let base: String = base.into();
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
            token,
            poll_interval: TTS_POLL_INTERVAL,
            poll_attempts: TTS_POLL_ATTEMPTS,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_tts_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn fetch_dashboard(&self) -> Result<DashboardPayload, BackendError> {
        let stamp = chrono::Utc::now().timestamp_millis();
        let response = self
            .client
            .get(self.url(&format!("/api/dashboard/?t={stamp}")))
            .header("Cache-Control", "no-cache, no-store, must-revalidate")
            .header("Pragma", "no-cache")
            .header("Expires", "0")
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn overlay_assist(&self, prompt: &str, png: Vec<u8>) -> Result<AssistReply, BackendError> {
        if prompt.trim().is_empty() {
            return Err(BackendError::EmptyPrompt);
        }

        let screenshot = Part::bytes(png)
            .file_name(SCREENSHOT_FILENAME)
            .mime_str("image/png")?;
        let form = Form::new().text("prompt", prompt.to_string()).part("screenshot", screenshot);

        info!(prompt_len = prompt.len(), "posting overlay assist request");
        let response = self
            .client
            .post(self.url("/api/overlay-assist/"))
            .multipart(form)
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn ingest_voice(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime: &str,
    ) -> Result<VoiceTicket, BackendError> {
        let part = Part::bytes(audio).file_name(file_name.to_string()).mime_str(mime)?;
        let form = Form::new().part("audio_file", part);
        let response = self
            .authorized(self.client.post(self.url("/api/voice/ingest/")))
            .multipart(form)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn voice_request_status(&self, id: &str) -> Result<VoiceRequestStatus, BackendError> {
        let response = self
            .authorized(self.client.get(self.url(&format!("/api/voice/requests/{id}/"))))
            .send()
            .await?;
        parse_json(response).await
    }

    /// poll until the backend reports synthesized audio; returns its url
    pub async fn wait_for_tts(&self, id: &str) -> Result<String, BackendError> {
        for attempt in 1..=self.poll_attempts {
            let status = self.voice_request_status(id).await?;
            if let Some(url) = status.audio_url() {
                info!(id, attempt, "tts audio ready");
                return Ok(url.to_string());
            }
            debug!(id, attempt, status = ?status.status, "tts not ready");
            if attempt < self.poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Err(BackendError::TtsTimeout(id.to_string()))
    }
}

impl DashboardSource for BackendClient {
    fn fetch(&self) -> impl Future<Output = Result<DashboardPayload, BackendError>> + Send {
        self.fetch_dashboard()
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| BackendError::Parse(e.to_string()))
}
