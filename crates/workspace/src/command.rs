//! Workspace commands: every operation that changes regions, as data.
//!
//! Commands are what the CLI replays from a script file, one JSON object per
//! line, and what any other driver of a workspace would send.

use crate::error::{FailureKind, RegionFailure};
use glam::Vec2;
use region::RegionId;
use serde::{Deserialize, Serialize};

/// A command that modifies workspace state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // === Geometry ===
    /// Create a region directly, bypassing the draw gesture.
    CreateRegion { position: Vec2, size: Vec2 },

    /// Press, drag and release a pointer between two screen points. Lands on
    /// whatever is under `from`: empty canvas draws, handles drag or resize.
    Gesture {
        from: Vec2,
        to: Vec2,
        #[serde(default)]
        pointer: u32,
    },

    /// Set absolute position of a region.
    Move {
        #[serde(default)]
        target: RegionTarget,
        position: Vec2,
    },

    /// Resize a region. Sizes below the minimum are clamped.
    Resize {
        #[serde(default)]
        target: RegionTarget,
        size: Vec2,
    },

    /// Remove a region and everything attached to it.
    Delete {
        #[serde(default)]
        target: RegionTarget,
    },

    // === Lifecycle ===
    SetPrompt {
        #[serde(default)]
        target: RegionTarget,
        prompt: String,
    },

    /// Submit the region's prompt and wait for the result.
    Submit {
        #[serde(default)]
        target: RegionTarget,
    },

    /// Leave Rendering to change the prompt.
    Edit {
        #[serde(default)]
        target: RegionTarget,
    },

    Cancel {
        #[serde(default)]
        target: RegionTarget,
    },

    Regenerate {
        #[serde(default)]
        target: RegionTarget,
    },

    // === Time ===
    /// Advance the animation clock `count` times by `dt_ms`.
    AdvanceFrames {
        #[serde(default = "default_frame_count")]
        count: u32,
        #[serde(default = "default_frame_ms")]
        dt_ms: f64,
    },

    // === Canvas ===
    /// Pan the viewport.
    Pan { delta: Vec2 },

    /// Zoom the viewport.
    Zoom {
        factor: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        center: Option<Vec2>,
    },

    /// Reset viewport to default.
    ResetView,

    // === Batch ===
    /// Execute multiple commands in sequence, stopping at the first error.
    Batch { commands: Vec<Command> },
}

fn default_frame_count() -> u32 {
    1
}

fn default_frame_ms() -> f64 {
    16.0
}

/// Which region a command applies to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionTarget {
    /// The most recently created region still on the canvas.
    #[default]
    Last,
    /// Position in paint order, oldest first.
    Index(usize),
    /// Full id or its 8-character short form.
    Id(String),
    /// The topmost region under a canvas point.
    At(Vec2),
}

impl From<RegionId> for RegionTarget {
    fn from(id: RegionId) -> Self {
        Self::Id(id.to_uuid_string())
    }
}

/// Result of executing a command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResult {
    /// Command succeeded.
    Success {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        created: Vec<RegionId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        modified: Vec<RegionId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deleted: Vec<RegionId>,
    },
    /// Command failed. `kind` is set when a region failure caused it.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<FailureKind>,
    },
}

impl CommandResult {
    pub fn success() -> Self {
        Self::Success {
            created: vec![],
            modified: vec![],
            deleted: vec![],
        }
    }

    pub fn created(ids: Vec<RegionId>) -> Self {
        Self::Success {
            created: ids,
            modified: vec![],
            deleted: vec![],
        }
    }

    pub fn modified(ids: Vec<RegionId>) -> Self {
        Self::Success {
            created: vec![],
            modified: ids,
            deleted: vec![],
        }
    }

    pub fn deleted(ids: Vec<RegionId>) -> Self {
        Self::Success {
            created: vec![],
            modified: vec![],
            deleted: ids,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            kind: None,
        }
    }

    pub fn failure(failure: &RegionFailure) -> Self {
        Self::Error {
            message: failure.to_string(),
            kind: Some(failure.kind()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
