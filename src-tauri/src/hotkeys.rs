// global shortcuts: ask overlay and push-to-talk

use crate::AppState;
use mira_core::config::AppConfig;
use tauri::{AppHandle, Manager};
use tauri_plugin_global_shortcut::{GlobalShortcutExt, ShortcutState};
use tracing::{info, warn};

pub fn register(app: &AppHandle, config: &AppConfig) {
    bind(app, &config.overlay_hotkey, |app| {
        let orchestrator = app.state::<AppState>().orchestrator.clone();
        tauri::async_runtime::spawn(async move {
            if let Err(e) = orchestrator.toggle_ask_overlay() {
                warn!(error = %e, "failed to toggle ask overlay");
            }
        });
    });

    bind(app, &config.ptt_hotkey, |app| {
        let orchestrator = app.state::<AppState>().orchestrator.clone();
        tauri::async_runtime::spawn(async move {
            let outcome = orchestrator.toggle_mic().await;
            if let Some(error) = outcome.error {
                warn!(%error, "push-to-talk failed");
            }
        });
    });
}

// a taken or malformed accelerator only costs us the shortcut
fn bind<F>(app: &AppHandle, accelerator: &str, action: F)
where
    F: Fn(&AppHandle) + Send + Sync + 'static,
{
    let result = app.global_shortcut().on_shortcut(accelerator, move |app, _shortcut, event| {
        if event.state == ShortcutState::Pressed {
            action(app);
        }
    });
    match result {
        Ok(()) => info!(accelerator, "global shortcut registered"),
        Err(e) => warn!(accelerator, error = %e, "global shortcut registration failed"),
    }
}

pub fn unregister_all(app: &AppHandle) {
    if let Err(e) = app.global_shortcut().unregister_all() {
        warn!(error = %e, "failed to unregister global shortcuts");
    }
}
