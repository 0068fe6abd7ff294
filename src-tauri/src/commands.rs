// renderer-facing commands; thin adapters over the orchestrator and dashboard

use crate::AppState;
use mira_core::mic_view::MicView;
use mira_core::orchestrator::{AssistOutcome, CommandOutcome, VoiceOutcome};
use serde_json::Value;
use tauri::State;
use tracing::{debug, info};

#[tauri::command]
pub async fn capture_screen(state: State<'_, AppState>) -> Result<String, String> {
    state.orchestrator.capture_screen().await
}

// mic commands report failures in the outcome, never as a rejected call
#[tauri::command]
pub async fn start_mic(state: State<'_, AppState>) -> Result<CommandOutcome, String> {
    Ok(state.orchestrator.start_mic())
}

#[tauri::command]
pub async fn stop_mic(state: State<'_, AppState>) -> Result<CommandOutcome, String> {
    Ok(state.orchestrator.stop_mic().await)
}

#[tauri::command]
pub fn get_mic_view(state: State<'_, AppState>) -> MicView {
    state.orchestrator.mic_view()
}

#[tauri::command]
pub async fn assist_with_screenshot(prompt: String, state: State<'_, AppState>) -> Result<AssistOutcome, String> {
    info!(chars = prompt.len(), "assist requested");
    Ok(state.orchestrator.assist_with_screenshot(&prompt).await)
}

/// recorded question from the renderer; answered with a spoken reply url
#[tauri::command]
pub async fn ask_by_voice(
    audio: Vec<u8>,
    mime: Option<String>,
    state: State<'_, AppState>,
) -> Result<VoiceOutcome, String> {
    Ok(state.orchestrator.ask_by_voice(audio, mime.as_deref()).await)
}

#[tauri::command]
pub async fn toggle_ask_overlay(state: State<'_, AppState>) -> Result<bool, String> {
    state.orchestrator.toggle_ask_overlay().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn hide_ask_overlay(state: State<'_, AppState>) -> Result<(), String> {
    state.orchestrator.hide_ask_overlay().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn close_ask_overlay(state: State<'_, AppState>) -> Result<(), String> {
    state.orchestrator.close_ask_overlay().map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_dashboard(state: State<'_, AppState>) -> Value {
    state.dashboard.snapshot()
}

#[tauri::command]
pub async fn refresh_dashboard(state: State<'_, AppState>) -> Result<Value, String> {
    let outcome = state.dashboard.refresh().await;
    debug!(?outcome, "dashboard refresh");
    Ok(state.dashboard.snapshot())
}

#[tauri::command]
pub fn debug_log(message: String) {
    debug!(target: "frontend", "{message}");
}
