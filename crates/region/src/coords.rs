//! Typed coordinates for the region canvas.
//!
//! Distinct types for the two coordinate spaces keep pointer positions from
//! being mixed up with region geometry at compile time.
//!
//! # Coordinate Spaces
//!
//! - **Canvas space**: where regions live (unbounded, zoomable)
//! - **Screen space**: pixels relative to the canvas element, after zoom/pan

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Position in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasPoint(pub Vec2);

/// Position in screen space (pixels relative to the canvas element).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint(pub Vec2);

/// Width and height in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasSize(pub Vec2);

/// Movement in canvas space (not a position).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasDelta(pub Vec2);

/// Axis-aligned rectangle in canvas space, anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasRect {
    pub origin: CanvasPoint,
    pub size: CanvasSize,
}

// === CanvasPoint ===

impl CanvasPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self(Vec2::new(x, y))
    }

    pub fn x(&self) -> f32 {
        self.0.x
    }

    pub fn y(&self) -> f32 {
        self.0.y
    }
}

impl From<Vec2> for CanvasPoint {
    fn from(v: Vec2) -> Self {
        Self(v)
    }
}

impl From<CanvasPoint> for Vec2 {
    fn from(p: CanvasPoint) -> Self {
        p.0
    }
}

impl Add<CanvasDelta> for CanvasPoint {
    type Output = CanvasPoint;

    fn add(self, delta: CanvasDelta) -> Self::Output {
        CanvasPoint(self.0 + delta.0)
    }
}

impl Sub for CanvasPoint {
    type Output = CanvasDelta;

    /// Subtracting two points gives a delta.
    fn sub(self, other: CanvasPoint) -> Self::Output {
        CanvasDelta(self.0 - other.0)
    }
}

// === ScreenPoint ===

impl ScreenPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self(Vec2::new(x, y))
    }

    pub fn x(&self) -> f32 {
        self.0.x
    }

    pub fn y(&self) -> f32 {
        self.0.y
    }
}

impl From<Vec2> for ScreenPoint {
    fn from(v: Vec2) -> Self {
        Self(v)
    }
}

// === CanvasSize ===

impl CanvasSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self(Vec2::new(width, height))
    }

    pub fn width(&self) -> f32 {
        self.0.x
    }

    pub fn height(&self) -> f32 {
        self.0.y
    }
}

impl From<Vec2> for CanvasSize {
    fn from(v: Vec2) -> Self {
        Self(v)
    }
}

impl Add<CanvasDelta> for CanvasSize {
    type Output = CanvasSize;

    /// Growing a size by a pointer delta, as a resize grip does.
    fn add(self, delta: CanvasDelta) -> Self::Output {
        CanvasSize(self.0 + delta.0)
    }
}

// === CanvasDelta ===

impl CanvasDelta {
    pub fn new(dx: f32, dy: f32) -> Self {
        Self(Vec2::new(dx, dy))
    }

    pub fn dx(&self) -> f32 {
        self.0.x
    }

    pub fn dy(&self) -> f32 {
        self.0.y
    }
}

impl From<Vec2> for CanvasDelta {
    fn from(v: Vec2) -> Self {
        Self(v)
    }
}

// === CanvasRect ===

impl CanvasRect {
    pub fn new(origin: CanvasPoint, size: CanvasSize) -> Self {
        Self { origin, size }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(CanvasPoint::new(x, y), CanvasSize::new(width, height))
    }

    pub fn min(&self) -> CanvasPoint {
        self.origin
    }

    pub fn max(&self) -> CanvasPoint {
        CanvasPoint(self.origin.0 + self.size.0)
    }

    pub fn width(&self) -> f32 {
        self.size.width()
    }

    pub fn height(&self) -> f32 {
        self.size.height()
    }

    /// Inclusive point-in-rect test.
    pub fn contains(&self, point: CanvasPoint) -> bool {
        let (min, max) = (self.min(), self.max());
        point.x() >= min.x() && point.x() <= max.x() && point.y() >= min.y() && point.y() <= max.y()
    }
}
