// screen capture with an enumeration fallback, encoded as a PNG data URL

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, warn};

pub const SCREENSHOT_FILENAME: &str = "overlay_capture.png";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No screen sources available")]
    NoSources,
    #[error("Screen Recording permission required: thumbnails are empty")]
    PermissionRequired,
    #[error("No capture method available")]
    NoCaptureMethod,
    #[error("Screenshot error: {0}")]
    Capture(String),
    #[error("Encode error: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Screen,
    Window,
}

/// one enumerated display or window with its captured pixels
#[derive(Debug, Clone)]
pub struct CaptureSource {
    pub id: String,
    pub kind: SourceKind,
    pub image: RgbaImage,
}

impl CaptureSource {
    pub fn area(&self) -> u64 {
        u64::from(self.image.width()) * u64::from(self.image.height())
    }

    /// macOS hands back zero-sized (or fully transparent) images without permission
    pub fn is_empty(&self) -> bool {
        image_is_empty(&self.image)
    }
}

fn image_is_empty(image: &RgbaImage) -> bool {
    image.width() == 0 || image.height() == 0 || image.pixels().all(|p| p.0[3] == 0)
}

/// Platform capture backend. Calls block; run them off the async runtime.
pub trait ScreenCapturer: Send + Sync {
    /// the display under the pointer; `Ok(None)` when there is nothing to grab
    fn capture_at_pointer(&self) -> Result<Option<RgbaImage>, CaptureError>;

    fn supports_enumeration(&self) -> bool;

    /// every display and window the platform lets us see
    fn sources(&self) -> Result<Vec<CaptureSource>, CaptureError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Screenshot {
    pub fn from_image(image: &RgbaImage) -> Result<Self, CaptureError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        Ok(Self {
            png,
            width: image.width(),
            height: image.height(),
        })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(&self.png))
    }
}

/// Direct capture first; if that yields nothing, enumerate every source and
/// take the largest non-empty one.
pub fn capture_screen(capturer: &dyn ScreenCapturer) -> Result<Screenshot, CaptureError> {
    match capturer.capture_at_pointer() {
        Ok(Some(image)) if !image_is_empty(&image) => return Screenshot::from_image(&image),
        Ok(_) => debug!("direct capture returned nothing, trying source enumeration"),
        Err(e) => warn!(error = %e, "direct capture failed, trying source enumeration"),
    }

    if !capturer.supports_enumeration() {
        return Err(CaptureError::NoCaptureMethod);
    }

    let sources = capturer.sources()?;
    let best = pick_largest(&sources).ok_or(CaptureError::NoSources)?;
    if best.is_empty() {
        return Err(CaptureError::PermissionRequired);
    }
    debug!(source = %best.id, kind = ?best.kind, width = best.image.width(), height = best.image.height(), "captured via enumeration");
    Screenshot::from_image(&best.image)
}

// prefers non-empty sources; the first one wins a tie
fn pick_largest(sources: &[CaptureSource]) -> Option<&CaptureSource> {
    let non_empty: Vec<&CaptureSource> = sources.iter().filter(|s| !s.is_empty()).collect();
    let pool: Vec<&CaptureSource> = if non_empty.is_empty() {
        sources.iter().collect()
    } else {
        non_empty
    };
    pool.into_iter()
        .fold(None, |best: Option<&CaptureSource>, s| match best {
            Some(b) if b.area() >= s.area() => Some(b),
            _ => Some(s),
        })
}
