// toolkit-free core of the mira desktop shell

pub mod aggregate;
pub mod backend;
pub mod capture;
pub mod config;
pub mod dashboard;
pub mod demo;
pub mod geometry;
pub mod mic;
pub mod mic_view;
pub mod orchestrator;
pub mod overlay;
pub mod relay;
pub mod speech;
pub mod storage;

pub use backend::{BackendClient, BackendError};
pub use capture::{CaptureError, CaptureSource, ScreenCapturer, SourceKind};
pub use config::AppConfig;
pub use dashboard::{DashboardPayload, DashboardProvider, DashboardSource, PollingHandle};
pub use geometry::{Display, Point, Rect, Size};
pub use mic::{MicError, MicSupervisor, SpeechCommand};
pub use orchestrator::{AssistOutcome, CommandOutcome, Orchestrator, VoiceOutcome};
pub use overlay::{OverlayHost, OverlayKind, OverlayManager, OverlaySurface, SurfaceError};
pub use relay::{EventBroadcaster, EventRelay, Subscription};
pub use speech::{MicEvent, MicStatus, OverlayResult};
pub use storage::SessionStore;
