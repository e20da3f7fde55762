//! Animation-frame primitives.
//!
//! A frame callback is plain data naming the region and the attachment
//! generation it was scheduled for. The sandbox checks both when the frame
//! fires, so a callback that outlives its attachment does nothing.

use region::RegionId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameToken(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCallback {
    pub region: RegionId,
    pub generation: u64,
}

/// A callback that is due, with the host's clock at the time it fired.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledFrame {
    pub token: FrameToken,
    pub callback: FrameCallback,
    pub timestamp_ms: f64,
}

/// The host's animation-frame scheduler.
pub trait FrameHost {
    fn schedule_frame(&mut self, callback: FrameCallback) -> FrameToken;
    fn cancel_frame(&mut self, token: FrameToken);

    /// Current host time, on the same clock as [`ScheduledFrame::timestamp_ms`].
    fn now_ms(&self) -> f64;
}

/// An in-process frame host driven by explicit clock advances.
#[derive(Clone, Debug, Default)]
pub struct FrameClock {
    now_ms: f64,
    next_token: u64,
    pending: Vec<(FrameToken, FrameCallback)>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, token: FrameToken) -> bool {
        self.pending.iter().any(|(t, _)| *t == token)
    }

    /// Move the clock forward and return every callback that is now due.
    ///
    /// Callbacks scheduled while the returned frames run are due on the
    /// next advance.
    pub fn advance(&mut self, dt_ms: f64) -> Vec<ScheduledFrame> {
        self.now_ms += dt_ms.max(0.0);
        let timestamp_ms = self.now_ms;
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(token, callback)| ScheduledFrame {
                token,
                callback,
                timestamp_ms,
            })
            .collect()
    }
}

impl FrameHost for FrameClock {
    fn schedule_frame(&mut self, callback: FrameCallback) -> FrameToken {
        self.next_token += 1;
        let token = FrameToken(self.next_token);
        self.pending.push((token, callback));
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        self.pending.retain(|(t, _)| *t != token);
    }

    fn now_ms(&self) -> f64 {
        self.now_ms
    }
}
