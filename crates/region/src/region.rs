use crate::coords::{CanvasDelta, CanvasPoint, CanvasRect, CanvasSize};
use crate::RegionId;
use script::GeneratedProgram;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::Display;

/// Where a region is in its prompt/generate/render lifecycle.
#[derive(Default, Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    /// The prompt editor is showing.
    #[default]
    Editing,
    /// A codegen request is in flight.
    Generating,
    /// A program is attached and drawing.
    Rendering,
    /// The last attempt failed; behaves like Editing with a message.
    Error,
}

impl Phase {
    /// Phases in which the prompt can be edited and submitted.
    pub fn accepts_prompt(&self) -> bool {
        matches!(self, Phase::Editing | Phase::Error)
    }
}

/// A rectangular area of the canvas that owns one generated program.
///
/// Regions are kept in a flat list; the index is the paint order, with the
/// last region on top.
#[derive(Clone, Debug)]
pub struct Region {
    pub id: RegionId,

    /// Top-left corner in canvas space.
    pub position: CanvasPoint,
    pub size: CanvasSize,

    pub prompt: String,
    /// The last program that ran successfully. Replaced wholesale on regenerate.
    pub program: Option<Arc<GeneratedProgram>>,

    pub phase: Phase,
    /// User-visible message for the latest failure.
    pub last_error: Option<String>,
}

impl Region {
    pub fn new(rect: CanvasRect) -> Self {
        Self {
            id: RegionId::new(),
            position: rect.origin,
            size: rect.size,
            prompt: String::new(),
            program: None,
            phase: Phase::Editing,
            last_error: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn rect(&self) -> CanvasRect {
        CanvasRect::new(self.position, self.size)
    }

    pub fn contains_point(&self, point: CanvasPoint) -> bool {
        self.rect().contains(point)
    }

    pub fn translate(&mut self, delta: CanvasDelta) {
        self.position = self.position + delta;
    }

    /// Apply a patch. Returns true when anything changed.
    pub fn apply(&mut self, patch: RegionPatch) -> bool {
        match patch {
            RegionPatch::Position(position) => {
                let changed = self.position != position;
                self.position = position;
                changed
            }
            RegionPatch::Size(size) => {
                let changed = self.size != size;
                self.size = size;
                changed
            }
            RegionPatch::Prompt(prompt) => {
                let changed = self.prompt != prompt;
                self.prompt = prompt;
                changed
            }
            RegionPatch::Phase(phase) => {
                let changed = self.phase != phase;
                self.phase = phase;
                changed
            }
            RegionPatch::Program(program) => {
                self.program = program;
                true
            }
            RegionPatch::Error(message) => {
                let changed = self.last_error != message;
                self.last_error = message;
                changed
            }
        }
    }
}

/// A single mutation of a region, applied through the region store.
#[derive(Clone, Debug)]
pub enum RegionPatch {
    Position(CanvasPoint),
    Size(CanvasSize),
    Prompt(String),
    Phase(Phase),
    Program(Option<Arc<GeneratedProgram>>),
    Error(Option<String>),
}

impl RegionPatch {
    /// Patches that move or resize the region.
    pub fn is_geometry(&self) -> bool {
        matches!(self, RegionPatch::Position(_) | RegionPatch::Size(_))
    }
}
