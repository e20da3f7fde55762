//! Workspace queries: read-only access to regions, surfaces and the view.

use crate::command::RegionTarget;
use glam::Vec2;
use region::{Phase, Region, RegionId};
use sandbox::Shape;
use script::ProgramUnit;
use serde::{Deserialize, Serialize};

/// A query for workspace state (read-only).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    /// All regions in paint order.
    ListRegions,

    GetRegion {
        #[serde(default)]
        target: RegionTarget,
    },

    /// The program a region is running, in canonical form.
    GetProgram {
        #[serde(default)]
        target: RegionTarget,
    },

    /// The shapes currently on a region's surface.
    GetSurface {
        #[serde(default)]
        target: RegionTarget,
    },

    GetViewport,

    GetRegionCount,

    /// Number of animation frames waiting to run.
    GetPendingFrames,
}

/// Response to a query.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryResult {
    Regions { regions: Vec<RegionInfo> },

    Region { region: Option<RegionInfo> },

    Program {
        region: RegionId,
        program: Option<ProgramUnit>,
        #[serde(skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },

    Surface {
        region: RegionId,
        size: Vec2,
        shapes: Vec<Shape>,
    },

    Viewport { offset: Vec2, zoom: f32 },

    Count { count: usize },

    Error { message: String },
}

/// Serializable region information.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub id: RegionId,
    pub position: Vec2,
    pub size: Vec2,
    pub phase: Phase,
    pub prompt: String,
    pub has_program: bool,
    pub animated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<&Region> for RegionInfo {
    fn from(region: &Region) -> Self {
        Self {
            id: region.id,
            position: region.position.0,
            size: region.size.0,
            phase: region.phase,
            prompt: region.prompt.clone(),
            has_program: region.program.is_some(),
            animated: region.program.as_ref().is_some_and(|p| p.is_animated()),
            last_error: region.last_error.clone(),
        }
    }
}
