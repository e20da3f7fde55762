//! Region canvas interaction.
//!
//! Owns the authoritative [`RegionStore`] and the pointer state machines that
//! mutate it: drawing new regions, and dragging or resizing existing ones.

mod draw;
mod session;
mod store;
mod viewport;

pub use draw::{DrawGestureController, DrawOutcome, DrawState, DEFAULT_MIN_DRAW_DISTANCE};
pub use session::{DragController, PendingGesture, PointerId, ResizeController};
pub use store::{OverlapRejected, RegionStore, StoreEvent, SubscriptionId};
pub use viewport::Viewport;
