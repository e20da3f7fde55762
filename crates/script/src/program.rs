//! Drawing programs - the instruction language the model writes.
//!
//! A program is intent-based: it describes shapes to construct and add to a
//! region's surface, when to flush, and whether to keep animating. It never
//! names anything outside its fixed parameter list:
//! - `surface` - the region's drawing surface
//! - `width`, `height` - surface dimensions
//! - `draw` - the shape vocabulary (implicit in the shape instructions)
//! - `schedule_frame`, `cancel_frame` - animation-frame primitives
//!
//! # Example
//! ```json
//! {
//!   "setup": [
//!     { "op": "rect", "name": "bg", "left": 0, "top": 0, "width": "width", "height": "height",
//!       "style": { "fill": "navy" } },
//!     { "op": "text", "name": "label", "text": "Frame {frame}", "left": 10, "top": 10,
//!       "style": { "fill": "white" } },
//!     { "op": "schedule_frame" }
//!   ],
//!   "frame": [
//!     { "op": "set", "target": "label", "field": "top", "value": "10 + frame % height" },
//!     { "op": "schedule_frame" }
//!   ]
//! }
//! ```

use crate::{ColorValue, Expr, TextTemplate};
use serde::{Deserialize, Serialize};

/// Canonical parameter list every accepted program is bound to, in order.
pub const CANONICAL_PARAMS: [&str; 6] = [
    "surface",
    "width",
    "height",
    "draw",
    "schedule_frame",
    "cancel_frame",
];

/// A self-contained program unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgramUnit {
    /// Declared parameters. `None` means the unit still needs wrapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    /// Runs once when the program is attached to a surface.
    #[serde(default)]
    pub setup: Vec<Instruction>,
    /// Runs on every scheduled animation frame.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frame: Vec<Instruction>,
}

/// Numeric shape properties that `set` can change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeField {
    Left,
    Top,
    Width,
    Height,
    X1,
    Y1,
    X2,
    Y2,
    FontSize,
    StrokeWidth,
}

/// Points of a polyline: either listed, or generated by a bounded loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointSource {
    List(Vec<[Expr; 2]>),
    Generated {
        count: Expr,
        #[serde(default = "default_loop_var")]
        var: String,
        x: Expr,
        y: Expr,
    },
}

/// Fill and stroke shared by every shape instruction.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<ColorValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<ColorValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<Expr>,
}

/// One step of a drawing program.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    // === Variables ===
    /// Bind or reassign a program variable. Variables persist across frames.
    Let { name: String, value: Expr },

    // === Shape construction (constructs the shape and adds it to the surface) ===
    Rect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        left: Expr,
        top: Expr,
        width: Expr,
        height: Expr,
        #[serde(default)]
        style: Style,
    },

    Ellipse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        left: Expr,
        top: Expr,
        width: Expr,
        height: Expr,
        #[serde(default)]
        style: Style,
    },

    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        text: TextTemplate,
        left: Expr,
        top: Expr,
        #[serde(default = "default_font_size")]
        font_size: Expr,
        #[serde(default)]
        style: Style,
    },

    Line {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        x1: Expr,
        y1: Expr,
        x2: Expr,
        y2: Expr,
        #[serde(default)]
        style: Style,
    },

    Polyline {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        points: PointSource,
        #[serde(default)]
        style: Style,
    },

    // === Mutation of named shapes ===
    /// Change a numeric property of a named shape.
    Set {
        target: String,
        field: ShapeField,
        value: Expr,
    },

    /// Remove a named shape from the surface.
    Remove { target: String },

    /// Remove every shape from the surface.
    Clear,

    // === Control flow ===
    /// Run `body` `count` times with `var` bound to the iteration index.
    Repeat {
        count: Expr,
        #[serde(default = "default_loop_var")]
        var: String,
        body: Vec<Instruction>,
    },

    /// Run `then` when `cond` is non-zero, otherwise `else`.
    If {
        cond: Expr,
        #[serde(default)]
        then: Vec<Instruction>,
        #[serde(default, rename = "else", skip_serializing_if = "Vec::is_empty")]
        otherwise: Vec<Instruction>,
    },

    // === Surface and frame primitives ===
    /// Flush the surface to the renderer.
    Render,

    /// Request the frame body to run on the next animation frame.
    ScheduleFrame,

    /// Cancel a pending animation frame.
    CancelFrame,
}

impl Instruction {
    /// Instructions that only flush or steer animation; a program made of
    /// nothing else has nothing to execute.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Instruction::Render | Instruction::ScheduleFrame | Instruction::CancelFrame
        )
    }

    pub fn is_frame_control(&self) -> bool {
        matches!(self, Instruction::ScheduleFrame | Instruction::CancelFrame)
    }

    /// Nested instruction blocks, for recursive walks.
    pub fn children(&self) -> Vec<&[Instruction]> {
        match self {
            Instruction::Repeat { body, .. } => vec![body.as_slice()],
            Instruction::If {
                then, otherwise, ..
            } => vec![then.as_slice(), otherwise.as_slice()],
            _ => Vec::new(),
        }
    }

    /// Name given to the shape this instruction constructs, if any.
    pub fn shape_name(&self) -> Option<&str> {
        match self {
            Instruction::Rect { name, .. }
            | Instruction::Ellipse { name, .. }
            | Instruction::Text { name, .. }
            | Instruction::Line { name, .. }
            | Instruction::Polyline { name, .. } => name.as_deref(),
            _ => None,
        }
    }

    /// Every numeric expression directly held by this instruction.
    pub fn expressions(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = Vec::new();
        match self {
            Instruction::Let { value, .. } => out.push(value),
            Instruction::Rect {
                left,
                top,
                width,
                height,
                style,
                ..
            }
            | Instruction::Ellipse {
                left,
                top,
                width,
                height,
                style,
                ..
            } => {
                out.extend([left, top, width, height]);
                out.extend(style.stroke_width.as_ref());
            }
            Instruction::Text {
                left,
                top,
                font_size,
                style,
                ..
            } => {
                out.extend([left, top, font_size]);
                out.extend(style.stroke_width.as_ref());
            }
            Instruction::Line {
                x1,
                y1,
                x2,
                y2,
                style,
                ..
            } => {
                out.extend([x1, y1, x2, y2]);
                out.extend(style.stroke_width.as_ref());
            }
            Instruction::Polyline { points, style, .. } => {
                match points {
                    PointSource::List(list) => {
                        for [x, y] in list {
                            out.extend([x, y]);
                        }
                    }
                    PointSource::Generated { count, x, y, .. } => out.extend([count, x, y]),
                }
                out.extend(style.stroke_width.as_ref());
            }
            Instruction::Set { value, .. } => out.push(value),
            Instruction::Repeat { count, .. } => out.push(count),
            Instruction::If { cond, .. } => out.push(cond),
            Instruction::Remove { .. }
            | Instruction::Clear
            | Instruction::Render
            | Instruction::ScheduleFrame
            | Instruction::CancelFrame => {}
        }
        out
    }

    pub fn style(&self) -> Option<&Style> {
        match self {
            Instruction::Rect { style, .. }
            | Instruction::Ellipse { style, .. }
            | Instruction::Text { style, .. }
            | Instruction::Line { style, .. }
            | Instruction::Polyline { style, .. } => Some(style),
            _ => None,
        }
    }
}

fn default_loop_var() -> String {
    "i".to_string()
}

fn default_font_size() -> Expr {
    Expr::number(16.0)
}

/// Walk every instruction in a block, depth first, with its nesting depth.
pub fn walk<'a>(block: &'a [Instruction], depth: usize, f: &mut dyn FnMut(&'a Instruction, usize)) {
    for instruction in block {
        f(instruction, depth);
        for child in instruction.children() {
            walk(child, depth + 1, f);
        }
    }
}

/// A validated program in canonical form, ready for the sandbox.
#[derive(Clone, Debug)]
pub struct GeneratedProgram {
    unit: ProgramUnit,
    source: String,
    explanation: Option<String>,
}

impl GeneratedProgram {
    pub(crate) fn new(unit: ProgramUnit, explanation: Option<String>) -> Self {
        // Serializing plain data into a String cannot fail.
        let source = serde_json::to_string_pretty(&unit).unwrap_or_default();
        Self {
            unit,
            source,
            explanation,
        }
    }

    /// Parameter names in binding order.
    pub fn params(&self) -> &[String] {
        self.unit.params.as_deref().unwrap_or(&[])
    }

    pub fn setup(&self) -> &[Instruction] {
        &self.unit.setup
    }

    pub fn frame(&self) -> &[Instruction] {
        &self.unit.frame
    }

    /// Canonical source text (pretty JSON).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The model's explanation, when the response carried one.
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    pub fn is_animated(&self) -> bool {
        !self.unit.frame.is_empty()
    }

    pub fn unit(&self) -> &ProgramUnit {
        &self.unit
    }
}
