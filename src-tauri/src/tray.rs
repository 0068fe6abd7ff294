// menubar tray and its mic status sync

use crate::AppState;
use mira_core::overlay::OverlayKind;
use mira_core::relay::{EventRelay, Subscription, MIC_STATUS};
use serde_json::Value;
use tauri::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
use tauri::tray::TrayIconBuilder;
use tauri::{AppHandle, Emitter, Manager};
use tracing::{debug, warn};

pub const DASHBOARD_LABEL: &str = "dashboard";
/// asks the dashboard page to start or stop recording a voice question
pub const VOICE_TOGGLE: &str = "voice:toggle";

const START_VOICE: &str = "Start voice capture";
const STOP_VOICE: &str = "Stop voice capture";

/// keeps the tray in sync with mic status for as long as it is managed
pub struct TraySync {
    _subscription: Subscription,
}

pub fn build(app: &AppHandle, relay: &EventRelay) -> tauri::Result<TraySync> {
    let mic_item = MenuItem::with_id(app, "mic", START_VOICE, true, None::<&str>)?;
    let menu = Menu::with_items(
        app,
        &[
            &MenuItem::with_id(app, "dashboard", "Show dashboard", true, None::<&str>)?,
            &MenuItem::with_id(app, "ask", "Ask assistant", true, None::<&str>)?,
            &mic_item,
            &MenuItem::with_id(app, "voice", "Ask by voice", true, None::<&str>)?,
            &PredefinedMenuItem::separator(app)?,
            &MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?,
        ],
    )?;

    let mut builder = TrayIconBuilder::with_id("mira")
        .tooltip("Mira")
        .icon_as_template(false)
        .menu(&menu)
        .on_menu_event(on_menu_event);
    if let Some(icon) = app.default_window_icon() {
        builder = builder.icon(icon.clone());
    }
    let tray = builder.build(app)?;

    let subscription = relay.subscribe(MIC_STATUS, move |payload: &Value| {
        let recording = payload.get("recording").and_then(Value::as_bool).unwrap_or(false);
        let message = payload.get("message").and_then(Value::as_str).unwrap_or_default();

        if let Err(e) = mic_item.set_text(if recording { STOP_VOICE } else { START_VOICE }) {
            warn!(error = %e, "failed to update tray item");
        }
        let tooltip = if message.is_empty() {
            "Mira".to_string()
        } else {
            format!("Mira: {message}")
        };
        if let Err(e) = tray.set_tooltip(Some(tooltip)) {
            warn!(error = %e, "failed to update tray tooltip");
        }
    });
    Ok(TraySync {
        _subscription: subscription,
    })
}

pub fn show_dashboard(app: &AppHandle) {
    let Some(window) = app.get_webview_window(DASHBOARD_LABEL) else {
        warn!("dashboard window missing");
        return;
    };
    if let Err(e) = window.show().and_then(|()| window.set_focus()) {
        warn!(error = %e, "failed to show dashboard");
    }
}

// runs on the main thread; orchestrator work goes to the async runtime
fn on_menu_event(app: &AppHandle, event: MenuEvent) {
    debug!(id = event.id().as_ref(), "tray menu");
    match event.id().as_ref() {
        "dashboard" => show_dashboard(app),
        "ask" => {
            let orchestrator = app.state::<AppState>().orchestrator.clone();
            tauri::async_runtime::spawn(async move {
                if let Err(e) = orchestrator.overlays().show(OverlayKind::Ask) {
                    warn!(error = %e, "failed to show ask overlay");
                }
            });
        }
        "mic" => {
            let orchestrator = app.state::<AppState>().orchestrator.clone();
            tauri::async_runtime::spawn(async move {
                let outcome = orchestrator.toggle_mic().await;
                if let Some(error) = outcome.error {
                    warn!(%error, "voice capture toggle failed");
                }
            });
        }
        "voice" => {
            // the page records; it must be up to hear the toggle
            show_dashboard(app);
            if let Err(e) = app.emit_to(DASHBOARD_LABEL, VOICE_TOGGLE, ()) {
                warn!(error = %e, "failed to reach dashboard for voice question");
            }
        }
        "quit" => app.exit(0),
        _ => {}
    }
}
