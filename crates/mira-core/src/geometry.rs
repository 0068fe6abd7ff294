// display selection and overlay placement math; all inputs share one pixel space

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// half-open, so a point on the shared edge of two displays belongs to one
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// euclidean distance from the point to the closest point of the rect
    pub fn distance_to(&self, p: Point) -> f64 {
        let dx = (self.x - p.x).max(p.x - self.right()).max(0.0);
        let dy = (self.y - p.y).max(p.y - self.bottom()).max(0.0);
        dx.hypot(dy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Display {
    pub id: String,
    pub bounds: Rect,
    /// bounds minus menu bar / dock / taskbar
    pub work_area: Rect,
    pub scale_factor: f64,
}

/// Display containing the pointer, else the one whose bounds are closest.
/// Ties keep the first display in enumeration order.
pub fn nearest_display(displays: &[Display], pointer: Point) -> Option<&Display> {
    if let Some(hit) = displays.iter().find(|d| d.bounds.contains(pointer)) {
        return Some(hit);
    }
    displays.iter().fold(None, |best: Option<&Display>, d| match best {
        Some(b) if b.bounds.distance_to(pointer) <= d.bounds.distance_to(pointer) => Some(b),
        _ => Some(d),
    })
}

/// the ask pill covers the whole display, the page centers its own content
pub fn ask_frame(display: &Display) -> Rect {
    display.bounds
}

/// Center `size` in the work area. A window larger than the work area is
/// pinned to its top-left corner instead of spilling off screen.
pub fn centered_in(work_area: Rect, size: Size) -> Rect {
    let x = work_area.x + ((work_area.width - size.width) / 2.0).round();
    let y = work_area.y + ((work_area.height - size.height) / 2.0).round();

    let max_x = (work_area.right() - size.width).max(work_area.x);
    let max_y = (work_area.bottom() - size.height).max(work_area.y);

    Rect::new(
        x.clamp(work_area.x, max_x),
        y.clamp(work_area.y, max_y),
        size.width,
        size.height,
    )
}
