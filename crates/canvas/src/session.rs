//! Pointer sessions for moving and resizing existing regions.
//!
//! Each pointer-down on a region handle starts a session that remembers the
//! region's geometry at the start of the gesture. Pointer moves compute the
//! new geometry from that snapshot, so a session never accumulates drift.
//! Starting a session on a region that already has one preempts the stale
//! session (a lost pointer-up must not wedge the region).

use region::geometry::clamp_min_size;
use region::{CanvasPoint, CanvasSize, Region, RegionId, RegionPatch};
use serde::{Deserialize, Serialize};

/// Identifies one pointer (mouse, pen or touch contact).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointerId(pub u32);

/// Transient state for one pointer gesture on one region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingGesture {
    pub pointer: PointerId,
    pub region: RegionId,
    pub origin: CanvasPoint,
    pub original_position: CanvasPoint,
    pub original_size: CanvasSize,
}

#[derive(Clone, Debug, Default)]
struct Sessions {
    active: Vec<PendingGesture>,
}

impl Sessions {
    fn begin(&mut self, pointer: PointerId, region: &Region, origin: CanvasPoint) {
        self.active
            .retain(|s| s.region != region.id && s.pointer != pointer);
        self.active.push(PendingGesture {
            pointer,
            region: region.id,
            origin,
            original_position: region.position,
            original_size: region.size,
        });
    }

    fn get(&self, pointer: PointerId) -> Option<&PendingGesture> {
        self.active.iter().find(|s| s.pointer == pointer)
    }

    fn end(&mut self, pointer: PointerId) -> Option<PendingGesture> {
        let index = self.active.iter().position(|s| s.pointer == pointer)?;
        Some(self.active.remove(index))
    }

    fn forget_region(&mut self, region: RegionId) {
        self.active.retain(|s| s.region != region);
    }

    fn has_region(&self, region: RegionId) -> bool {
        self.active.iter().any(|s| s.region == region)
    }
}

/// Moves a region by its drag strip.
#[derive(Clone, Debug, Default)]
pub struct DragController {
    sessions: Sessions,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, pointer: PointerId, region: &Region, point: CanvasPoint) {
        log::debug!("drag session for {} on pointer {}", region.id, pointer.0);
        self.sessions.begin(pointer, region, point);
    }

    /// New position for the dragged region.
    pub fn update(&self, pointer: PointerId, point: CanvasPoint) -> Option<(RegionId, RegionPatch)> {
        let session = self.sessions.get(pointer)?;
        let position = session.original_position + (point - session.origin);
        Some((session.region, RegionPatch::Position(position)))
    }

    pub fn end(&mut self, pointer: PointerId) -> Option<RegionId> {
        self.sessions.end(pointer).map(|s| s.region)
    }

    pub fn session(&self, pointer: PointerId) -> Option<&PendingGesture> {
        self.sessions.get(pointer)
    }

    pub fn is_active(&self, region: RegionId) -> bool {
        self.sessions.has_region(region)
    }

    /// Drop any session on a region that no longer exists.
    pub fn forget(&mut self, region: RegionId) {
        self.sessions.forget_region(region);
    }
}

/// Resizes a region by its bottom-right grip, never below `min_size`.
#[derive(Clone, Debug)]
pub struct ResizeController {
    sessions: Sessions,
    min_size: f32,
}

impl ResizeController {
    pub fn new(min_size: f32) -> Self {
        Self {
            sessions: Sessions::default(),
            min_size,
        }
    }

    pub fn min_size(&self) -> f32 {
        self.min_size
    }

    pub fn begin(&mut self, pointer: PointerId, region: &Region, point: CanvasPoint) {
        log::debug!("resize session for {} on pointer {}", region.id, pointer.0);
        self.sessions.begin(pointer, region, point);
    }

    /// New size for the resized region.
    pub fn update(&self, pointer: PointerId, point: CanvasPoint) -> Option<(RegionId, RegionPatch)> {
        let session = self.sessions.get(pointer)?;
        let size = clamp_min_size(session.original_size + (point - session.origin), self.min_size);
        Some((session.region, RegionPatch::Size(size)))
    }

    pub fn end(&mut self, pointer: PointerId) -> Option<RegionId> {
        self.sessions.end(pointer).map(|s| s.region)
    }

    pub fn session(&self, pointer: PointerId) -> Option<&PendingGesture> {
        self.sessions.get(pointer)
    }

    pub fn is_active(&self, region: RegionId) -> bool {
        self.sessions.has_region(region)
    }

    pub fn forget(&mut self, region: RegionId) {
        self.sessions.forget_region(region);
    }
}
