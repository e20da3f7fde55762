use crate::surface::Shape;
use region::{CanvasSize, RegionId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// The 2-D painting library a sandbox flushes surfaces to.
pub trait RenderBackend {
    fn create_surface(&mut self, region: RegionId, size: CanvasSize);

    /// Flush the current shapes of a region's surface.
    fn present(&mut self, region: RegionId, size: CanvasSize, shapes: &[Shape]);

    fn dispose_surface(&mut self, region: RegionId);
}

/// Discards everything. Useful when only program behavior matters.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBackend;

impl RenderBackend for NullBackend {
    fn create_surface(&mut self, _region: RegionId, _size: CanvasSize) {}
    fn present(&mut self, _region: RegionId, _size: CanvasSize, _shapes: &[Shape]) {}
    fn dispose_surface(&mut self, _region: RegionId) {}
}

/// One flush seen by a [`RecordingBackend`].
#[derive(Clone, Debug)]
pub struct PresentedFrame {
    pub region: RegionId,
    pub size: CanvasSize,
    pub shapes: Vec<Shape>,
}

#[derive(Debug, Default)]
pub struct Recording {
    pub created: Vec<RegionId>,
    pub disposed: Vec<RegionId>,
    pub presented: Vec<PresentedFrame>,
    live: HashSet<RegionId>,
}

impl Recording {
    pub fn live_surfaces(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, region: RegionId) -> bool {
        self.live.contains(&region)
    }

    pub fn presents_for(&self, region: RegionId) -> usize {
        self.presented.iter().filter(|f| f.region == region).count()
    }

    pub fn last_frame(&self, region: RegionId) -> Option<&PresentedFrame> {
        self.presented.iter().rev().find(|f| f.region == region)
    }
}

/// Records every backend call. Clones share the same recording, so a test
/// can keep one clone while the sandbox owns another.
#[derive(Clone, Debug, Default)]
pub struct RecordingBackend {
    recording: Rc<RefCell<Recording>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording(&self) -> std::cell::Ref<'_, Recording> {
        self.recording.borrow()
    }
}

impl RenderBackend for RecordingBackend {
    fn create_surface(&mut self, region: RegionId, _size: CanvasSize) {
        let mut recording = self.recording.borrow_mut();
        recording.created.push(region);
        recording.live.insert(region);
    }

    fn present(&mut self, region: RegionId, size: CanvasSize, shapes: &[Shape]) {
        self.recording.borrow_mut().presented.push(PresentedFrame {
            region,
            size,
            shapes: shapes.to_vec(),
        });
    }

    fn dispose_surface(&mut self, region: RegionId) {
        let mut recording = self.recording.borrow_mut();
        recording.disposed.push(region);
        recording.live.remove(&region);
    }
}
