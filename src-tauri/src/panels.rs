// overlay windows backed by tauri webview windows
//
// All geometry is in physical pixels. Window calls from here are made off the
// main thread; AppKit-only calls are dispatched with run_on_main_thread and
// their result is waited for.

use mira_core::geometry::{Display, Point, Rect, Size};
use mira_core::overlay::{OverlayHost, OverlayKind, OverlaySurface, SurfaceError};
#[cfg(target_os = "macos")]
use std::sync::mpsc;
#[cfg(target_os = "macos")]
use std::time::Duration;
use tauri::{AppHandle, Manager, PhysicalPosition, PhysicalSize, WebviewUrl, WebviewWindow, WebviewWindowBuilder};
use tracing::debug;

#[cfg(target_os = "macos")]
const MAIN_THREAD_WAIT: Duration = Duration::from_secs(2);

fn window_err(e: impl std::fmt::Display) -> SurfaceError {
    SurfaceError::Window(e.to_string())
}

#[allow(clippy::cast_possible_truncation)]
fn to_px(v: f64) -> i32 {
    v.round() as i32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_len(v: f64) -> u32 {
    v.round().max(1.0) as u32
}

fn rect_of(position: PhysicalPosition<i32>, size: PhysicalSize<u32>) -> Rect {
    Rect::new(
        f64::from(position.x),
        f64::from(position.y),
        f64::from(size.width),
        f64::from(size.height),
    )
}

/// page each overlay loads; the renderer routes on the hash
fn overlay_url(kind: OverlayKind) -> WebviewUrl {
    WebviewUrl::App(format!("index.html#/{}", kind.label()).into())
}

/// only the ask pill is ever made key, whatever the caller asks for
fn makes_key(kind: OverlayKind, focus: bool) -> bool {
    focus && kind.takes_focus()
}

/// Run `f` on the main thread and wait for its answer. Runs inline when
/// already on the main thread.
#[cfg(target_os = "macos")]
fn on_main<R, F>(window: &WebviewWindow, f: F) -> Result<R, SurfaceError>
where
    R: Send + 'static,
    F: FnOnce(&WebviewWindow) -> Result<R, SurfaceError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let target = window.clone();
    window
        .run_on_main_thread(move || {
            let _ = tx.send(f(&target));
        })
        .map_err(window_err)?;
    rx.recv_timeout(MAIN_THREAD_WAIT)
        .map_err(|_| SurfaceError::Window("main thread did not answer".into()))?
}

#[derive(Clone)]
pub struct TauriHost {
    app: AppHandle,
}

impl TauriHost {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl OverlayHost for TauriHost {
    type Surface = TauriSurface;

    fn displays(&self) -> Result<Vec<Display>, SurfaceError> {
        let monitors = self.app.available_monitors().map_err(window_err)?;
        let primary = self
            .app
            .primary_monitor()
            .ok()
            .flatten()
            .map(|m| *m.position());

        let mut displays: Vec<Display> = monitors
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let work = m.work_area();
                Display {
                    id: m.name().cloned().unwrap_or_else(|| format!("monitor-{i}")),
                    bounds: rect_of(*m.position(), *m.size()),
                    work_area: rect_of(work.position, work.size),
                    scale_factor: m.scale_factor(),
                }
            })
            .collect();

        // primary first so it is the fallback when the pointer is unknown
        if let Some(origin) = primary {
            let origin = Point::new(f64::from(origin.x), f64::from(origin.y));
            if let Some(idx) = displays.iter().position(|d| d.bounds.origin() == origin) {
                displays.swap(0, idx);
            }
        }
        Ok(displays)
    }

    fn pointer(&self) -> Result<Point, SurfaceError> {
        let pos = self.app.cursor_position().map_err(window_err)?;
        Ok(Point::new(pos.x, pos.y))
    }

    fn create(&self, kind: OverlayKind, frame: Rect) -> Result<TauriSurface, SurfaceError> {
        let label = kind.label();
        // a window left over from an earlier slot (e.g. reload) is reused
        let window = if let Some(window) = self.app.get_webview_window(label) {
            debug!(overlay = label, "reusing existing window");
            window
        } else {
            let builder = WebviewWindowBuilder::new(&self.app, label, overlay_url(kind))
                .title("Mira")
                .decorations(false)
                .transparent(true)
                .shadow(false)
                .resizable(false)
                .skip_taskbar(true)
                .always_on_top(true)
                .visible(false)
                .focused(kind.takes_focus());
            // the mic pill must never activate when shown
            #[cfg(not(target_os = "macos"))]
            let builder = builder.focusable(kind.takes_focus());
            builder.build().map_err(window_err)?
        };

        #[cfg(target_os = "macos")]
        on_main(&window, move |w| mac::convert(w, kind))?;

        let surface = TauriSurface { kind, window };
        surface.set_frame(frame)?;
        Ok(surface)
    }
}

pub struct TauriSurface {
    kind: OverlayKind,
    window: WebviewWindow,
}

impl OverlaySurface for TauriSurface {
    fn set_frame(&self, frame: Rect) -> Result<(), SurfaceError> {
        self.window
            .set_size(PhysicalSize::new(to_len(frame.width), to_len(frame.height)))
            .map_err(window_err)?;
        self.window
            .set_position(PhysicalPosition::new(to_px(frame.x), to_px(frame.y)))
            .map_err(window_err)
    }

    fn outer_size(&self) -> Result<Size, SurfaceError> {
        let size = self.window.outer_size().map_err(window_err)?;
        Ok(Size::new(f64::from(size.width), f64::from(size.height)))
    }

    #[cfg(target_os = "macos")]
    fn show(&self, focus: bool) -> Result<(), SurfaceError> {
        let key = makes_key(self.kind, focus);
        on_main(&self.window, move |w| mac::show(w, key))
    }

    #[cfg(not(target_os = "macos"))]
    fn show(&self, focus: bool) -> Result<(), SurfaceError> {
        self.window.show().map_err(window_err)?;
        if makes_key(self.kind, focus) {
            self.window.set_focus().map_err(window_err)?;
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn hide(&self) -> Result<(), SurfaceError> {
        on_main(&self.window, mac::hide)
    }

    #[cfg(not(target_os = "macos"))]
    fn hide(&self) -> Result<(), SurfaceError> {
        self.window.hide().map_err(window_err)
    }

    fn close(&self) -> Result<(), SurfaceError> {
        self.window.destroy().map_err(window_err)
    }

    fn elevate(&self) -> Result<(), SurfaceError> {
        self.window.set_visible_on_all_workspaces(true).map_err(window_err)?;
        raise_level(&self.window)
    }

    fn set_always_on_top(&self) -> Result<(), SurfaceError> {
        self.window.set_always_on_top(true).map_err(window_err)
    }
}

#[cfg(target_os = "macos")]
fn raise_level(window: &WebviewWindow) -> Result<(), SurfaceError> {
    on_main(window, mac::raise)
}

// no level above always-on-top elsewhere
#[cfg(not(target_os = "macos"))]
fn raise_level(window: &WebviewWindow) -> Result<(), SurfaceError> {
    window.set_always_on_top(true).map_err(window_err)
}

// nspanel calls; main thread only
#[cfg(target_os = "macos")]
mod mac {
    use super::window_err;
    use mira_core::overlay::{OverlayKind, SurfaceError};
    use tauri::{Manager, WebviewWindow};
    use tauri_nspanel::{
        tauri_panel, CollectionBehavior, ManagerExt, PanelLevel, StyleMask, WebviewWindowExt,
    };

    tauri_panel! {
        panel!(AskPanel {
            config: {
                can_become_key_window: true,
                is_floating_panel: true
            }
        })

        panel!(PillPanel {
            config: {
                can_become_key_window: false,
                is_floating_panel: true
            }
        })
    }

    /// non-activating panel: showing it never activates the app
    pub fn convert(window: &WebviewWindow, kind: OverlayKind) -> Result<(), SurfaceError> {
        let panel = match kind {
            OverlayKind::Ask => window.to_panel::<AskPanel>(),
            OverlayKind::MicStatus => window.to_panel::<PillPanel>(),
        }
        .map_err(window_err)?;
        panel.set_style_mask(StyleMask::empty().nonactivating_panel().into());
        panel.set_hides_on_deactivate(false);
        Ok(())
    }

    pub fn raise(window: &WebviewWindow) -> Result<(), SurfaceError> {
        let panel = window
            .app_handle()
            .get_webview_panel(window.label())
            .map_err(window_err)?;
        panel.set_level(PanelLevel::ScreenSaver.value());
        panel.set_collection_behavior(
            CollectionBehavior::new()
                .full_screen_auxiliary()
                .can_join_all_spaces()
                .stationary()
                .into(),
        );
        Ok(())
    }

    pub fn show(window: &WebviewWindow, key: bool) -> Result<(), SurfaceError> {
        let panel = window
            .app_handle()
            .get_webview_panel(window.label())
            .map_err(window_err)?;
        if key {
            panel.show_and_make_key();
        } else {
            panel.show();
        }
        Ok(())
    }

    pub fn hide(window: &WebviewWindow) -> Result<(), SurfaceError> {
        let panel = window
            .app_handle()
            .get_webview_panel(window.label())
            .map_err(window_err)?;
        panel.hide();
        Ok(())
    }
}
