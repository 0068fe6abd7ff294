// runtime configuration read from the environment (.env is loaded by the shell)

use crate::mic::{SpeechCommand, DEFAULT_STOP_GRACE};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const DEFAULT_OVERLAY_HOTKEY: &str = "CommandOrControl+Backslash";
pub const DEFAULT_PTT_HOTKEY: &str = "CommandOrControl+Shift+Space";
const DEFAULT_SPEECH_ARGS: &str = "-u -m elevenlabs_module.sts.speech_to_speech";

#[cfg(windows)]
const DEFAULT_SPEECH_PROGRAM: &str = "python";
#[cfg(not(windows))]
const DEFAULT_SPEECH_PROGRAM: &str = "python3";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidInteger { var: &'static str, value: String },
    #[error("{var} must be a non-negative number, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub speech: SpeechCommand,
    pub stop_grace: Duration,
    pub overlay_hotkey: String,
    pub ptt_hotkey: String,
    pub demo_mocks: bool,
    pub demo_hours_from_8: Option<f64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_token: None,
            speech: SpeechCommand::new(DEFAULT_SPEECH_PROGRAM)
                .args(DEFAULT_SPEECH_ARGS.split_whitespace()),
            stop_grace: DEFAULT_STOP_GRACE,
            overlay_hotkey: DEFAULT_OVERLAY_HOTKEY.to_string(),
            ptt_hotkey: DEFAULT_PTT_HOTKEY.to_string(),
            demo_mocks: false,
            demo_hours_from_8: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Invalid numbers are logged and
    /// replaced by their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let (config, errors) = Self::parse(lookup);
        for err in errors {
            warn!(error = %err, "ignoring invalid config value");
        }
        config
    }

    /// same as [`AppConfig::from_lookup`] but hands back what was rejected
    pub fn parse<F>(lookup: F) -> (Self, Vec<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut errors = Vec::new();
        let mut config = Self::default();

        if let Some(base) = get("MIRA_API_BASE").or_else(|| get("API_BASE")) {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        config.api_token = get("MIRA_API_TOKEN");

        if let Some(program) = get("MIRA_SPEECH_PYTHON") {
            config.speech.program = PathBuf::from(program);
        }
        if let Some(args) = get("MIRA_SPEECH_ARGS") {
            config.speech.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(cwd) = get("MIRA_SPEECH_CWD") {
            config.speech.cwd = Some(PathBuf::from(cwd));
        }

        if let Some(raw) = get("MIRA_MIC_STOP_GRACE_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => config.stop_grace = Duration::from_millis(ms),
                Err(_) => errors.push(ConfigError::InvalidInteger {
                    var: "MIRA_MIC_STOP_GRACE_MS",
                    value: raw,
                }),
            }
        }

        if let Some(hotkey) = get("MIRA_OVERLAY_HOTKEY") {
            config.overlay_hotkey = hotkey;
        }
        if let Some(hotkey) = get("MIRA_PTT_HOTKEY") {
            config.ptt_hotkey = hotkey;
        }

        config.demo_mocks = get("MIRA_DEMO_MOCKS")
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");

        if let Some(raw) = get("MIRA_DEMO_HOURS_FROM_8") {
            match raw.parse::<f64>() {
                Ok(hours) if hours.is_finite() && hours >= 0.0 => {
                    config.demo_hours_from_8 = Some(hours);
                }
                _ => errors.push(ConfigError::InvalidNumber {
                    var: "MIRA_DEMO_HOURS_FROM_8",
                    value: raw,
                }),
            }
        }

        (config, errors)
    }
}
