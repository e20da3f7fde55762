//! Region geometry and the region data model.
//!
//! Regions are flat, non-overlapping rectangles in canvas space. This crate
//! holds the typed coordinates, the pure geometry functions the gesture
//! controllers are built on, and the [`Region`] record itself.

pub mod coords;
pub mod geometry;
mod region;
mod region_id;

pub use coords::{CanvasDelta, CanvasPoint, CanvasRect, CanvasSize, ScreenPoint};
pub use region::{Phase, Region, RegionPatch};
pub use region_id::RegionId;
