//! Per-region drawing surfaces and the shapes programs put on them.

use glam::Vec2;
use region::CanvasSize;
use script::{Rgba, ShapeField};
use serde::Serialize;

/// Fill and stroke of a drawn shape.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ShapeStyle {
    pub fill: Option<Rgba>,
    pub stroke: Option<Rgba>,
    pub stroke_width: f32,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            fill: None,
            stroke: None,
            stroke_width: 1.0,
        }
    }
}

/// A shape handed to the render backend, in surface-local coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Rect {
        left: f32,
        top: f32,
        width: f32,
        height: f32,
        style: ShapeStyle,
    },
    Ellipse {
        left: f32,
        top: f32,
        width: f32,
        height: f32,
        style: ShapeStyle,
    },
    Text {
        text: String,
        left: f32,
        top: f32,
        font_size: f32,
        style: ShapeStyle,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        style: ShapeStyle,
    },
    Polyline {
        points: Vec<Vec2>,
        style: ShapeStyle,
    },
}

impl Shape {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Rect { .. } => "rect",
            Shape::Ellipse { .. } => "ellipse",
            Shape::Text { .. } => "text",
            Shape::Line { .. } => "line",
            Shape::Polyline { .. } => "polyline",
        }
    }

    pub fn style(&self) -> &ShapeStyle {
        match self {
            Shape::Rect { style, .. }
            | Shape::Ellipse { style, .. }
            | Shape::Text { style, .. }
            | Shape::Line { style, .. }
            | Shape::Polyline { style, .. } => style,
        }
    }

    /// Change one numeric property. Fails when the shape has no such field.
    pub fn set_field(&mut self, field: ShapeField, value: f32) -> Result<(), String> {
        if field == ShapeField::StrokeWidth {
            self.style_mut().stroke_width = value.max(0.0);
            return Ok(());
        }
        let kind = self.kind_name();
        let slot: &mut f32 = match (self, field) {
            (Shape::Rect { left, .. } | Shape::Ellipse { left, .. } | Shape::Text { left, .. }, ShapeField::Left) => left,
            (Shape::Rect { top, .. } | Shape::Ellipse { top, .. } | Shape::Text { top, .. }, ShapeField::Top) => top,
            (Shape::Rect { width, .. } | Shape::Ellipse { width, .. }, ShapeField::Width) => width,
            (Shape::Rect { height, .. } | Shape::Ellipse { height, .. }, ShapeField::Height) => height,
            (Shape::Text { font_size, .. }, ShapeField::FontSize) => font_size,
            (Shape::Line { x1, .. }, ShapeField::X1) => x1,
            (Shape::Line { y1, .. }, ShapeField::Y1) => y1,
            (Shape::Line { x2, .. }, ShapeField::X2) => x2,
            (Shape::Line { y2, .. }, ShapeField::Y2) => y2,
            (_, field) => return Err(format!("a {} has no field {:?}", kind, field)),
        };
        *slot = value;
        Ok(())
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        match self {
            Shape::Rect { style, .. }
            | Shape::Ellipse { style, .. }
            | Shape::Text { style, .. }
            | Shape::Line { style, .. }
            | Shape::Polyline { style, .. } => style,
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    name: Option<String>,
    shape: Shape,
}

/// The drawing surface owned by one region attachment.
///
/// Shapes are kept in the order they were added, which is the paint order.
/// Adding a shape under a name that is already on the surface replaces it in
/// place, so a frame body can rebuild a named shape without it piling up.
#[derive(Clone, Debug)]
pub struct Surface {
    size: CanvasSize,
    entries: Vec<Entry>,
}

impl Surface {
    pub fn new(size: CanvasSize) -> Self {
        Self {
            size,
            entries: Vec::new(),
        }
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    pub fn add(&mut self, name: Option<String>, shape: Shape) {
        if let Some(name) = &name {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| e.name.as_deref() == Some(name.as_str()))
            {
                entry.shape = shape;
                return;
            }
        }
        self.entries.push(Entry { name, shape });
    }

    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.entries
            .iter()
            .find(|e| e.name.as_deref() == Some(name))
            .map(|e| &e.shape)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Shape> {
        self.entries
            .iter_mut()
            .find(|e| e.name.as_deref() == Some(name))
            .map(|e| &mut e.shape)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name.as_deref() != Some(name));
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the shapes in paint order, for flushing to a backend.
    pub fn shapes(&self) -> Vec<Shape> {
        self.entries.iter().map(|e| e.shape.clone()).collect()
    }
}
