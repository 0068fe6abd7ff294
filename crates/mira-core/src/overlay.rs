// overlay window manager - one lazily created window per kind
//
// The manager is toolkit-agnostic: the shell implements `OverlayHost` /
// `OverlaySurface` over real windows. Methods take a short std mutex and call
// into the surface while holding it, so they must not be called from the UI
// main thread (hop onto the async runtime first).

use crate::geometry::{ask_frame, centered_in, nearest_display, Display, Point, Rect, Size};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// size used for the mic pill until the real window can be measured
pub const MIC_PILL_SIZE: Size = Size {
    width: 420.0,
    height: 132.0,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("No display available")]
    NoDisplay,
    #[error("Window operation failed: {0}")]
    Window(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Ask,
    MicStatus,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 2] = [OverlayKind::Ask, OverlayKind::MicStatus];

    /// window label, also the route of the page it loads
    pub fn label(self) -> &'static str {
        match self {
            OverlayKind::Ask => "ask-overlay",
            OverlayKind::MicStatus => "mic-overlay",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }

    /// the ask pill takes keyboard focus; the mic pill never does
    pub fn takes_focus(self) -> bool {
        matches!(self, OverlayKind::Ask)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Uninitialized,
    Hidden,
    Visible,
    /// explicitly closed; the next request recreates it
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayWindowState {
    pub kind: OverlayKind,
    pub lifecycle: Lifecycle,
    pub position: Option<Point>,
    pub bound_display_id: Option<String>,
}

impl OverlayWindowState {
    pub fn is_visible(&self) -> bool {
        self.lifecycle == Lifecycle::Visible
    }
}

/// one native window backing an overlay
pub trait OverlaySurface: Send + Sync {
    fn set_frame(&self, frame: Rect) -> Result<(), SurfaceError>;
    fn outer_size(&self) -> Result<Size, SurfaceError>;
    fn show(&self, focus: bool) -> Result<(), SurfaceError>;
    fn hide(&self) -> Result<(), SurfaceError>;
    fn close(&self) -> Result<(), SurfaceError>;
    /// all workspaces incl. full-screen spaces, highest window level
    fn elevate(&self) -> Result<(), SurfaceError>;
    fn set_always_on_top(&self) -> Result<(), SurfaceError>;
}

pub trait OverlayHost: Send + Sync + 'static {
    type Surface: OverlaySurface + 'static;

    fn displays(&self) -> Result<Vec<Display>, SurfaceError>;
    fn pointer(&self) -> Result<Point, SurfaceError>;
    /// create the window hidden, at `frame`, with its content view loaded
    fn create(&self, kind: OverlayKind, frame: Rect) -> Result<Self::Surface, SurfaceError>;
}

struct Slot<S> {
    surface: Option<S>,
    lifecycle: Lifecycle,
    position: Option<Point>,
    display_id: Option<String>,
}

impl<S> Slot<S> {
    fn new() -> Self {
        Self {
            surface: None,
            lifecycle: Lifecycle::Uninitialized,
            position: None,
            display_id: None,
        }
    }
}

struct Inner<H: OverlayHost> {
    host: H,
    slots: Mutex<HashMap<OverlayKind, Slot<H::Surface>>>,
    hide_generation: AtomicU64,
    pending_hide: Mutex<Option<JoinHandle<()>>>,
}

pub struct OverlayManager<H: OverlayHost> {
    inner: Arc<Inner<H>>,
}

impl<H: OverlayHost> Clone for OverlayManager<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<H: OverlayHost> OverlayManager<H> {
    pub fn new(host: H) -> Self {
        let slots = OverlayKind::ALL.into_iter().map(|k| (k, Slot::new())).collect();
        Self {
            inner: Arc::new(Inner {
                host,
                slots: Mutex::new(slots),
                hide_generation: AtomicU64::new(0),
                pending_hide: Mutex::new(None),
            }),
        }
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    pub fn state(&self, kind: OverlayKind) -> OverlayWindowState {
        let slots = lock(&self.inner.slots);
        let slot = &slots[&kind];
        OverlayWindowState {
            kind,
            lifecycle: slot.lifecycle,
            position: slot.position,
            bound_display_id: slot.display_id.clone(),
        }
    }

    /// kinds that currently have a live window
    pub fn existing(&self) -> Vec<OverlayKind> {
        let slots = lock(&self.inner.slots);
        OverlayKind::ALL
            .into_iter()
            .filter(|k| slots[k].surface.is_some())
            .collect()
    }

    /// create the window (hidden) if it does not exist yet
    pub fn ensure(&self, kind: OverlayKind) -> Result<(), SurfaceError> {
        let mut slots = lock(&self.inner.slots);
        let slot = slots.entry(kind).or_insert_with(Slot::new);
        self.ensure_slot(kind, slot)
    }

    pub fn show(&self, kind: OverlayKind) -> Result<(), SurfaceError> {
        if kind == OverlayKind::MicStatus {
            self.cancel_pending_hide();
        }

        let mut slots = lock(&self.inner.slots);
        let slot = slots.entry(kind).or_insert_with(Slot::new);
        self.ensure_slot(kind, slot)?;
        self.place(kind, slot)?;

        let Some(surface) = slot.surface.as_ref() else {
            return Err(SurfaceError::Window(format!("{} missing after create", kind.label())));
        };
        surface.show(kind.takes_focus())?;
        slot.lifecycle = Lifecycle::Visible;
        debug!(overlay = kind.label(), display = ?slot.display_id, "overlay shown");
        Ok(())
    }

    pub fn hide(&self, kind: OverlayKind) -> Result<(), SurfaceError> {
        let mut slots = lock(&self.inner.slots);
        let Some(slot) = slots.get_mut(&kind) else {
            return Ok(());
        };
        if slot.lifecycle != Lifecycle::Visible {
            return Ok(());
        }
        if let Some(surface) = slot.surface.as_ref() {
            surface.hide()?;
        }
        slot.lifecycle = Lifecycle::Hidden;
        debug!(overlay = kind.label(), "overlay hidden");
        Ok(())
    }

    /// returns the new visibility
    pub fn toggle(&self, kind: OverlayKind) -> Result<bool, SurfaceError> {
        if self.state(kind).is_visible() {
            self.hide(kind)?;
            Ok(false)
        } else {
            self.show(kind)?;
            Ok(true)
        }
    }

    /// The ask window is destroyed; the mic pill is only ever hidden.
    pub fn close(&self, kind: OverlayKind) -> Result<(), SurfaceError> {
        if kind == OverlayKind::MicStatus {
            return self.hide(kind);
        }

        let surface = {
            let mut slots = lock(&self.inner.slots);
            let Some(slot) = slots.get_mut(&kind) else {
                return Ok(());
            };
            let surface = slot.surface.take();
            if surface.is_some() {
                slot.lifecycle = Lifecycle::Destroyed;
            }
            surface
        };
        // closing fires the toolkit's destroyed event, which locks again
        if let Some(surface) = surface {
            surface.close()?;
            info!(overlay = kind.label(), "overlay closed");
        }
        Ok(())
    }

    pub fn focus_lost(&self, kind: OverlayKind) -> Result<(), SurfaceError> {
        match kind {
            OverlayKind::Ask => self.hide(kind),
            OverlayKind::MicStatus => Ok(()),
        }
    }

    pub fn escape_pressed(&self, kind: OverlayKind) -> Result<(), SurfaceError> {
        self.focus_lost(kind)
    }

    /// the toolkit tore the window down on its own
    pub fn window_destroyed(&self, kind: OverlayKind) {
        let mut slots = lock(&self.inner.slots);
        let Some(slot) = slots.get_mut(&kind) else {
            return;
        };
        // already released by close()
        if slot.surface.take().is_none() {
            return;
        }
        slot.lifecycle = match kind {
            OverlayKind::Ask => Lifecycle::Destroyed,
            OverlayKind::MicStatus => Lifecycle::Uninitialized,
        };
        debug!(overlay = kind.label(), "overlay window destroyed");
    }

    /// Hide the mic pill after `delay`, replacing any earlier schedule.
    /// A zero delay hides right away.
    pub fn schedule_hide(&self, delay: Duration) {
        self.cancel_pending_hide();

        if delay.is_zero() {
            if let Err(e) = self.hide(OverlayKind::MicStatus) {
                warn!(error = %e, "failed to hide mic overlay");
            }
            return;
        }

        let generation = self.inner.hide_generation.load(Ordering::SeqCst);
        let this = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // a show or reschedule that raced the abort bumps the generation
            if this.inner.hide_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if let Err(e) = this.hide(OverlayKind::MicStatus) {
                warn!(error = %e, "failed to hide mic overlay");
            }
        });
        *lock(&self.inner.pending_hide) = Some(task);
    }

    pub fn cancel_pending_hide(&self) {
        self.inner.hide_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = lock(&self.inner.pending_hide).take() {
            task.abort();
        }
    }

    pub fn has_pending_hide(&self) -> bool {
        lock(&self.inner.pending_hide)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    fn ensure_slot(&self, kind: OverlayKind, slot: &mut Slot<H::Surface>) -> Result<(), SurfaceError> {
        if slot.surface.is_some() {
            return Ok(());
        }

        let display = self.target_display()?;
        let frame = frame_for(kind, &display, MIC_PILL_SIZE);
        let surface = self.inner.host.create(kind, frame)?;

        if let Err(e) = surface.elevate() {
            warn!(overlay = kind.label(), error = %e, "elevated window level rejected, falling back to always-on-top");
            if let Err(e) = surface.set_always_on_top() {
                warn!(overlay = kind.label(), error = %e, "always-on-top rejected");
            }
        }

        slot.surface = Some(surface);
        slot.lifecycle = Lifecycle::Hidden;
        slot.position = Some(frame.origin());
        slot.display_id = Some(display.id);
        info!(overlay = kind.label(), "overlay created");
        Ok(())
    }

    fn place(&self, kind: OverlayKind, slot: &mut Slot<H::Surface>) -> Result<(), SurfaceError> {
        let Some(surface) = slot.surface.as_ref() else {
            return Ok(());
        };
        let display = self.target_display()?;
        let measured = match kind {
            OverlayKind::Ask => MIC_PILL_SIZE,
            OverlayKind::MicStatus => surface.outer_size().unwrap_or_else(|e| {
                debug!(error = %e, "could not measure mic overlay");
                MIC_PILL_SIZE
            }),
        };
        let frame = frame_for(kind, &display, measured);
        surface.set_frame(frame)?;
        slot.position = Some(frame.origin());
        slot.display_id = Some(display.id);
        Ok(())
    }

    fn target_display(&self) -> Result<Display, SurfaceError> {
        let displays = self.inner.host.displays()?;
        let pointer = match self.inner.host.pointer() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "pointer position unavailable, using primary display");
                None
            }
        };
        let chosen = match pointer {
            Some(p) => nearest_display(&displays, p),
            None => displays.first(),
        };
        chosen.cloned().ok_or(SurfaceError::NoDisplay)
    }
}

fn frame_for(kind: OverlayKind, display: &Display, mic_size: Size) -> Rect {
    match kind {
        OverlayKind::Ask => ask_frame(display),
        OverlayKind::MicStatus => centered_in(display.work_area, mic_size),
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Create(OverlayKind, Rect),
        SetFrame(OverlayKind, Rect),
        Show(OverlayKind, bool),
        Hide(OverlayKind),
        Close(OverlayKind),
        Elevate(OverlayKind),
        AlwaysOnTop(OverlayKind),
    }

    #[derive(Default)]
    pub(crate) struct MockState {
        pub displays: Vec<Display>,
        pub pointer: Option<Point>,
        pub calls: Vec<Call>,
        pub mic_size: Option<Size>,
        pub reject_elevate: bool,
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockHost {
        pub state: Arc<Mutex<MockState>>,
    }

    impl MockHost {
        pub fn with_displays(displays: Vec<Display>, pointer: Point) -> Self {
            let host = Self::default();
            {
                let mut s = host.state.lock().unwrap();
                s.displays = displays;
                s.pointer = Some(pointer);
            }
            host
        }

        pub fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn move_pointer(&self, p: Point) {
            self.state.lock().unwrap().pointer = Some(p);
        }

        pub fn creates(&self, kind: OverlayKind) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Create(k, _) if *k == kind))
                .count()
        }
    }

    pub(crate) struct MockSurface {
        kind: OverlayKind,
        state: Arc<Mutex<MockState>>,
    }

    impl MockSurface {
        fn record(&self, call: Call) {
            self.state.lock().unwrap().calls.push(call);
        }
    }

    impl OverlaySurface for MockSurface {
        fn set_frame(&self, frame: Rect) -> Result<(), SurfaceError> {
            self.record(Call::SetFrame(self.kind, frame));
            Ok(())
        }

        fn outer_size(&self) -> Result<Size, SurfaceError> {
            self.state
                .lock()
                .unwrap()
                .mic_size
                .ok_or_else(|| SurfaceError::Window("not measured".into()))
        }

        fn show(&self, focus: bool) -> Result<(), SurfaceError> {
            self.record(Call::Show(self.kind, focus));
            Ok(())
        }

        fn hide(&self) -> Result<(), SurfaceError> {
            self.record(Call::Hide(self.kind));
            Ok(())
        }

        fn close(&self) -> Result<(), SurfaceError> {
            self.record(Call::Close(self.kind));
            Ok(())
        }

        fn elevate(&self) -> Result<(), SurfaceError> {
            self.record(Call::Elevate(self.kind));
            if self.state.lock().unwrap().reject_elevate {
                return Err(SurfaceError::Window("level not supported".into()));
            }
            Ok(())
        }

        fn set_always_on_top(&self) -> Result<(), SurfaceError> {
            self.record(Call::AlwaysOnTop(self.kind));
            Ok(())
        }
    }

    impl OverlayHost for MockHost {
        type Surface = MockSurface;

        fn displays(&self) -> Result<Vec<Display>, SurfaceError> {
            Ok(self.state.lock().unwrap().displays.clone())
        }

        fn pointer(&self) -> Result<Point, SurfaceError> {
            self.state
                .lock()
                .unwrap()
                .pointer
                .ok_or_else(|| SurfaceError::Window("no pointer".into()))
        }

        fn create(&self, kind: OverlayKind, frame: Rect) -> Result<MockSurface, SurfaceError> {
            self.state.lock().unwrap().calls.push(Call::Create(kind, frame));
            Ok(MockSurface {
                kind,
                state: self.state.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{Call, MockHost};
    use super::*;
    use crate::geometry::tests::dual_setup;

    fn manager() -> (OverlayManager<MockHost>, MockHost) {
        let host = MockHost::with_displays(dual_setup(), Point::new(100.0, 100.0));
        (OverlayManager::new(host.clone()), host)
    }

    #[test]
    fn test_lazy_singleton_per_kind() {
        let (overlays, host) = manager();
        assert_eq!(overlays.state(OverlayKind::Ask).lifecycle, Lifecycle::Uninitialized);
        assert!(overlays.existing().is_empty());

        overlays.show(OverlayKind::Ask).unwrap();
        overlays.hide(OverlayKind::Ask).unwrap();
        overlays.show(OverlayKind::Ask).unwrap();
        overlays.ensure(OverlayKind::Ask).unwrap();

        assert_eq!(host.creates(OverlayKind::Ask), 1);
        assert_eq!(overlays.existing(), vec![OverlayKind::Ask]);
    }

    #[test]
    fn test_show_follows_pointer_to_secondary_display() {
        let (overlays, host) = manager();
        host.state.lock().unwrap().mic_size = Some(Size::new(400.0, 100.0));

        overlays.show(OverlayKind::MicStatus).unwrap();
        assert_eq!(
            overlays.state(OverlayKind::MicStatus).bound_display_id.as_deref(),
            Some("primary")
        );

        host.move_pointer(Point::new(2500.0, 300.0));
        overlays.show(OverlayKind::MicStatus).unwrap();
        overlays.show(OverlayKind::Ask).unwrap();

        let mic = overlays.state(OverlayKind::MicStatus);
        assert_eq!(mic.bound_display_id.as_deref(), Some("secondary"));
        // work area of the secondary is its full bounds
        assert_eq!(mic.position, Some(Point::new(2200.0, 290.0)));

        let calls = host.calls();
        assert!(calls.contains(&Call::SetFrame(
            OverlayKind::Ask,
            Rect::new(1440.0, -200.0, 1920.0, 1080.0)
        )));
        assert!(calls.contains(&Call::Show(OverlayKind::Ask, true)));
        assert!(calls.contains(&Call::Show(OverlayKind::MicStatus, false)));
    }

    #[test]
    fn test_mic_pill_uses_work_area() {
        let (overlays, host) = manager();
        host.state.lock().unwrap().mic_size = Some(Size::new(440.0, 100.0));
        overlays.show(OverlayKind::MicStatus).unwrap();
        // primary: 1440x875 work area below a 25px menu bar
        assert_eq!(
            overlays.state(OverlayKind::MicStatus).position,
            Some(Point::new(500.0, 413.0))
        );
    }

    #[test]
    fn test_toggle() {
        let (overlays, _host) = manager();
        assert!(overlays.toggle(OverlayKind::Ask).unwrap());
        assert!(!overlays.toggle(OverlayKind::Ask).unwrap());
        assert_eq!(overlays.state(OverlayKind::Ask).lifecycle, Lifecycle::Hidden);
    }

    #[test]
    fn test_dismissal_policy() {
        let (overlays, _host) = manager();
        overlays.show(OverlayKind::Ask).unwrap();
        overlays.show(OverlayKind::MicStatus).unwrap();

        overlays.focus_lost(OverlayKind::MicStatus).unwrap();
        overlays.escape_pressed(OverlayKind::MicStatus).unwrap();
        assert!(overlays.state(OverlayKind::MicStatus).is_visible());

        overlays.focus_lost(OverlayKind::Ask).unwrap();
        assert!(!overlays.state(OverlayKind::Ask).is_visible());

        overlays.show(OverlayKind::Ask).unwrap();
        overlays.escape_pressed(OverlayKind::Ask).unwrap();
        assert!(!overlays.state(OverlayKind::Ask).is_visible());
    }

    #[test]
    fn test_mic_pill_never_requests_focus() {
        let (overlays, host) = manager();
        overlays.show(OverlayKind::Ask).unwrap();
        overlays.show(OverlayKind::MicStatus).unwrap();
        overlays.toggle(OverlayKind::MicStatus).unwrap();
        overlays.toggle(OverlayKind::MicStatus).unwrap();

        assert!(!host.calls().contains(&Call::Show(OverlayKind::MicStatus, true)));
        assert!(overlays.state(OverlayKind::Ask).is_visible());
        assert!(!OverlayKind::MicStatus.takes_focus());
    }

    #[test]
    fn test_close_ask_recreates_on_next_show() {
        let (overlays, host) = manager();
        overlays.show(OverlayKind::Ask).unwrap();
        overlays.close(OverlayKind::Ask).unwrap();
        assert_eq!(overlays.state(OverlayKind::Ask).lifecycle, Lifecycle::Destroyed);

        // the toolkit reports the destroy afterwards; stays destroyed
        overlays.window_destroyed(OverlayKind::Ask);
        assert_eq!(overlays.state(OverlayKind::Ask).lifecycle, Lifecycle::Destroyed);

        overlays.show(OverlayKind::Ask).unwrap();
        assert_eq!(host.creates(OverlayKind::Ask), 2);
        assert!(overlays.state(OverlayKind::Ask).is_visible());
    }

    #[test]
    fn test_close_mic_only_hides() {
        let (overlays, host) = manager();
        overlays.show(OverlayKind::MicStatus).unwrap();
        overlays.close(OverlayKind::MicStatus).unwrap();
        assert_eq!(overlays.state(OverlayKind::MicStatus).lifecycle, Lifecycle::Hidden);
        assert!(!host.calls().contains(&Call::Close(OverlayKind::MicStatus)));
    }

    #[test]
    fn test_external_destroy_resets_mic_slot() {
        let (overlays, host) = manager();
        overlays.show(OverlayKind::MicStatus).unwrap();
        overlays.window_destroyed(OverlayKind::MicStatus);
        assert_eq!(
            overlays.state(OverlayKind::MicStatus).lifecycle,
            Lifecycle::Uninitialized
        );
        overlays.show(OverlayKind::MicStatus).unwrap();
        assert_eq!(host.creates(OverlayKind::MicStatus), 2);
    }

    #[test]
    fn test_elevation_falls_back_to_always_on_top() {
        let (overlays, host) = manager();
        host.state.lock().unwrap().reject_elevate = true;
        overlays.ensure(OverlayKind::MicStatus).unwrap();

        let calls = host.calls();
        assert!(calls.contains(&Call::Elevate(OverlayKind::MicStatus)));
        assert!(calls.contains(&Call::AlwaysOnTop(OverlayKind::MicStatus)));
        assert_eq!(overlays.state(OverlayKind::MicStatus).lifecycle, Lifecycle::Hidden);
    }

    #[test]
    fn test_no_display_fails_creation() {
        let overlays = OverlayManager::new(MockHost::default());
        assert_eq!(overlays.show(OverlayKind::Ask), Err(SurfaceError::NoDisplay));
        assert_eq!(overlays.state(OverlayKind::Ask).lifecycle, Lifecycle::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_hide_fires_after_delay() {
        let (overlays, _host) = manager();
        overlays.show(OverlayKind::MicStatus).unwrap();
        overlays.schedule_hide(Duration::from_secs(6));
        assert!(overlays.has_pending_hide());

        tokio::time::sleep(Duration::from_millis(5900)).await;
        assert!(overlays.state(OverlayKind::MicStatus).is_visible());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!overlays.state(OverlayKind::MicStatus).is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_show_cancels_scheduled_hide() {
        let (overlays, _host) = manager();
        overlays.show(OverlayKind::MicStatus).unwrap();
        overlays.schedule_hide(Duration::from_secs(6));

        tokio::time::sleep(Duration::from_secs(3)).await;
        overlays.show(OverlayKind::MicStatus).unwrap();
        assert!(!overlays.has_pending_hide());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(overlays.state(OverlayKind::MicStatus).is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_hide() {
        let (overlays, _host) = manager();
        overlays.show(OverlayKind::MicStatus).unwrap();
        overlays.schedule_hide(Duration::from_secs(2));
        overlays.schedule_hide(Duration::from_secs(6));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(overlays.state(OverlayKind::MicStatus).is_visible());

        overlays.schedule_hide(Duration::ZERO);
        assert!(!overlays.state(OverlayKind::MicStatus).is_visible());
    }
}
