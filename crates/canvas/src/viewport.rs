use glam::Vec2;
use region::{CanvasPoint, CanvasRect, ScreenPoint};
use serde::{Deserialize, Serialize};

/// Camera/viewport state for the canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Pan offset in canvas coordinates
    pub offset: Vec2,
    /// Zoom level (1.0 = 100%)
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a point from screen coordinates to canvas coordinates.
    pub fn screen_to_canvas(&self, screen_point: ScreenPoint) -> CanvasPoint {
        CanvasPoint(screen_point.0 / self.zoom - self.offset)
    }

    /// Convert a point from canvas coordinates to screen coordinates.
    pub fn canvas_to_screen(&self, canvas_point: CanvasPoint) -> ScreenPoint {
        ScreenPoint((canvas_point.0 + self.offset) * self.zoom)
    }

    /// Screen-space origin and size of a canvas rectangle.
    pub fn canvas_to_screen_rect(&self, rect: CanvasRect) -> (ScreenPoint, Vec2) {
        (self.canvas_to_screen(rect.origin), rect.size.0 * self.zoom)
    }

    /// Pan the viewport by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta / self.zoom;
    }

    /// Zoom the viewport, keeping a screen point fixed.
    pub fn zoom_at(&mut self, screen_point: ScreenPoint, factor: f32) {
        let old_zoom = self.zoom;
        self.zoom = (self.zoom * factor).clamp(0.1, 10.0);

        // Keep the point under the cursor fixed
        if self.zoom != old_zoom {
            self.offset = screen_point.0 / self.zoom - (screen_point.0 / old_zoom - self.offset);
        }
    }

    /// Reset to default view.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_canvas_round_trip() {
        let mut viewport = Viewport::new();
        viewport.pan(Vec2::new(50.0, -20.0));
        viewport.zoom_at(ScreenPoint::new(0.0, 0.0), 2.0);

        let canvas = viewport.screen_to_canvas(ScreenPoint::new(300.0, 300.0));
        let screen = viewport.canvas_to_screen(canvas);
        assert!((screen.x() - 300.0).abs() < 1e-3);
        assert!((screen.y() - 300.0).abs() < 1e-3);
    }

    #[test]
    fn zoom_keeps_cursor_fixed() {
        let mut viewport = Viewport::new();
        let cursor = ScreenPoint::new(200.0, 100.0);
        let before = viewport.screen_to_canvas(cursor);
        viewport.zoom_at(cursor, 1.5);
        let after = viewport.screen_to_canvas(cursor);
        assert!((before.x() - after.x()).abs() < 1e-3);
        assert!((before.y() - after.y()).abs() < 1e-3);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut viewport = Viewport::new();
        viewport.zoom_at(ScreenPoint::default(), 100.0);
        assert_eq!(viewport.zoom, 10.0);
    }
}
