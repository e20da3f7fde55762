use crate::store::{OverlapRejected, RegionStore};
use region::geometry::{clamp_min_size, normalize};
use region::{CanvasPoint, CanvasRect, RegionId};

/// Default distance below which a draw gesture counts as a click.
pub const DEFAULT_MIN_DRAW_DISTANCE: f32 = 4.0;

/// State of the draw-a-new-region gesture.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DrawState {
    #[default]
    Idle,
    Drawing {
        origin: CanvasPoint,
        current: CanvasRect,
    },
}

/// How a finished draw gesture ended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawOutcome {
    Created(RegionId),
    /// The rectangle overlapped an existing region and was dropped.
    Rejected(OverlapRejected),
    /// The pointer barely moved.
    TooSmall,
    /// There was no gesture in progress.
    NotDrawing,
}

/// Turns a pointer press-move-release on empty canvas into a new region.
#[derive(Clone, Debug)]
pub struct DrawGestureController {
    state: DrawState,
    min_draw_distance: f32,
}

impl Default for DrawGestureController {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DRAW_DISTANCE)
    }
}

impl DrawGestureController {
    pub fn new(min_draw_distance: f32) -> Self {
        Self {
            state: DrawState::Idle,
            min_draw_distance,
        }
    }

    pub fn state(&self) -> DrawState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, DrawState::Drawing { .. })
    }

    /// The live rectangle while drawing, for preview.
    pub fn preview(&self) -> Option<CanvasRect> {
        match self.state {
            DrawState::Drawing { current, .. } => Some(current),
            DrawState::Idle => None,
        }
    }

    pub fn pointer_down(&mut self, point: CanvasPoint) {
        if let DrawState::Idle = self.state {
            self.state = DrawState::Drawing {
                origin: point,
                current: normalize(point, point),
            };
        }
    }

    pub fn pointer_move(&mut self, point: CanvasPoint) {
        if let DrawState::Drawing { origin, current } = &mut self.state {
            *current = normalize(*origin, point);
        }
    }

    /// Finish the gesture and try to commit it to the store.
    ///
    /// The committed rectangle is grown to at least `min_size` on each side.
    pub fn pointer_up(
        &mut self,
        point: CanvasPoint,
        store: &mut RegionStore,
        min_size: f32,
    ) -> DrawOutcome {
        let DrawState::Drawing { origin, .. } = std::mem::take(&mut self.state) else {
            return DrawOutcome::NotDrawing;
        };

        let rect = normalize(origin, point);
        if rect.width() < self.min_draw_distance || rect.height() < self.min_draw_distance {
            log::debug!("draw gesture too small: {:?}", rect.size);
            return DrawOutcome::TooSmall;
        }

        let rect = CanvasRect::new(rect.origin, clamp_min_size(rect.size, min_size));
        match store.create(rect) {
            Ok(id) => DrawOutcome::Created(id),
            Err(rejected) => DrawOutcome::Rejected(rejected),
        }
    }

    pub fn cancel(&mut self) {
        self.state = DrawState::Idle;
    }
}
