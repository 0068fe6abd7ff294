// xcap-backed screen capture for the assistant overlay

use crate::panels::TauriHost;
use image::RgbaImage;
use mira_core::capture::{CaptureError, CaptureSource, ScreenCapturer, SourceKind};
use mira_core::geometry::{nearest_display, Display, Point};
use mira_core::overlay::OverlayHost;
use tauri::AppHandle;
use tracing::debug;
use xcap::{Monitor, Window};

fn capture_err(e: impl std::fmt::Display) -> CaptureError {
    CaptureError::Capture(e.to_string())
}

pub struct XcapCapturer {
    app: AppHandle,
}

impl XcapCapturer {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    // monitor under the pointer, first monitor when the pointer is unknown
    fn target_monitor(&self) -> Result<Option<Monitor>, CaptureError> {
        if let Ok(pos) = self.app.cursor_position() {
            let displays = TauriHost::new(self.app.clone()).displays().unwrap_or_default();
            let (x, y) = xcap_point(&displays, Point::new(pos.x, pos.y), cfg!(target_os = "macos"));
            if let Ok(monitor) = Monitor::from_point(x, y) {
                return Ok(Some(monitor));
            }
            debug!(x, y, "no monitor at pointer");
        }
        Ok(Monitor::all().map_err(capture_err)?.into_iter().next())
    }
}

/// Cursor position in the space xcap looks monitors up in. Tauri reports
/// physical pixels; on macOS xcap wants points, so the pixel position is
/// scaled down by the factor of the display it falls on.
#[allow(clippy::cast_possible_truncation)]
fn xcap_point(displays: &[Display], cursor: Point, in_points: bool) -> (i32, i32) {
    let scale = if in_points {
        nearest_display(displays, cursor)
            .map(|d| d.scale_factor)
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(1.0)
    } else {
        1.0
    };
    ((cursor.x / scale).round() as i32, (cursor.y / scale).round() as i32)
}

impl ScreenCapturer for XcapCapturer {
    fn capture_at_pointer(&self) -> Result<Option<RgbaImage>, CaptureError> {
        let Some(monitor) = self.target_monitor()? else {
            return Ok(None);
        };
        monitor.capture_image().map(Some).map_err(capture_err)
    }

    fn supports_enumeration(&self) -> bool {
        true
    }

    fn sources(&self) -> Result<Vec<CaptureSource>, CaptureError> {
        let monitors = Monitor::all();
        let windows = Window::all();
        if let (Err(e), Err(_)) = (&monitors, &windows) {
            return Err(capture_err(e));
        }

        let mut sources = Vec::new();
        for monitor in monitors.unwrap_or_default() {
            let id = monitor.id().map_or_else(|_| "?".to_string(), |id| id.to_string());
            match monitor.capture_image() {
                Ok(image) => sources.push(CaptureSource {
                    id: format!("screen:{id}"),
                    kind: SourceKind::Screen,
                    image,
                }),
                Err(e) => debug!(monitor = %id, error = %e, "monitor capture failed"),
            }
        }

        for window in windows.unwrap_or_default() {
            if window.is_minimized().unwrap_or(false) {
                continue;
            }
            let id = window.id().map_or_else(|_| "?".to_string(), |id| id.to_string());
            match window.capture_image() {
                Ok(image) => sources.push(CaptureSource {
                    id: format!("window:{id}"),
                    kind: SourceKind::Window,
                    image,
                }),
                Err(e) => debug!(window = %id, error = %e, "window capture failed"),
            }
        }

        debug!(count = sources.len(), "enumerated capture sources");
        Ok(sources)
    }
}
