// relay sink that emits to every live overlay window

use mira_core::overlay::OverlayKind;
use mira_core::relay::EventBroadcaster;
use serde_json::Value;
use tauri::{AppHandle, Emitter, Manager};

pub struct OverlayBroadcaster {
    app: AppHandle,
}

impl OverlayBroadcaster {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl EventBroadcaster for OverlayBroadcaster {
    fn broadcast(&self, channel: &str, payload: &Value) -> Result<(), String> {
        let mut failures = Vec::new();
        for kind in OverlayKind::ALL {
            let label = kind.label();
            // windows are created lazily; nothing to reach yet
            if self.app.get_webview_window(label).is_none() {
                continue;
            }
            if let Err(e) = self.app.emit_to(label, channel, payload) {
                failures.push(format!("{label}: {e}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }
}
