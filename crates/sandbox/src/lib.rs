//! Sandboxed execution of generated drawing programs.
//!
//! Each region gets its own [`Surface`] and at most one pending animation
//! frame. Programs can only reach the fixed parameter list they are bound
//! to; everything they draw goes through the [`RenderBackend`].

mod backend;
mod executor;
mod frame;
mod sandbox;
mod surface;

pub use backend::{NullBackend, PresentedFrame, RecordingBackend, Recording, RenderBackend};
pub use executor::RuntimeError;
pub use frame::{FrameCallback, FrameClock, FrameHost, FrameToken, ScheduledFrame};
pub use sandbox::{
    ExecutionFailed, ExecutionLimits, ExecutionSandbox, FrameOutcome, RunReport, SurfaceHandle,
};
pub use surface::{Shape, ShapeStyle, Surface};
