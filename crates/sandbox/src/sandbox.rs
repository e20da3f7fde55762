use crate::backend::RenderBackend;
use crate::executor::Machine;
use crate::frame::{FrameClock, FrameHost, FrameToken, ScheduledFrame};
use crate::surface::Surface;
use rand::rngs::StdRng;
use rand::SeedableRng;
use region::{CanvasSize, Region, RegionId};
use script::{GeneratedProgram, CANONICAL_PARAMS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Budgets that bound a single run of a program block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    pub max_steps: u64,
    pub max_repeat: u64,
    pub max_shapes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: 200_000,
            max_repeat: 10_000,
            max_shapes: 5_000,
        }
    }
}

/// A program raised an error while running. Its attachment has been torn
/// down.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("execution failed: {message}")]
pub struct ExecutionFailed {
    pub message: String,
}

impl ExecutionFailed {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Names one attachment of a surface to a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceHandle {
    pub region: RegionId,
    pub generation: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Shapes on the surface after the run.
    pub shapes: usize,
    /// Times the surface was flushed.
    pub renders: usize,
    pub steps: u64,
    /// Whether a frame is pending after the run.
    pub frame_scheduled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Ran(RunReport),
    /// The callback belongs to a torn-down attachment or a cancelled frame.
    Stale,
    Failed(ExecutionFailed),
}

/// Everything the sandbox keeps for one attached region.
pub(crate) struct Attachment {
    pub region: RegionId,
    pub generation: u64,
    pub surface: Surface,
    /// Program variables. These persist from setup into every frame.
    pub vars: HashMap<String, f64>,
    pub program: Option<Arc<GeneratedProgram>>,
    pub pending_frame: Option<FrameToken>,
    pub frames_run: u64,
    pub attached_at_ms: f64,
}

/// Runs generated programs, each bound to exactly one region's surface.
///
/// A region has at most one attachment, and an attachment has at most one
/// pending animation frame. Attaching again, detaching, or a failed run
/// cancels that frame synchronously.
pub struct ExecutionSandbox<H: FrameHost> {
    host: H,
    backend: Box<dyn RenderBackend>,
    attachments: HashMap<RegionId, Attachment>,
    next_generation: u64,
    limits: ExecutionLimits,
    rng: StdRng,
}

impl<H: FrameHost> ExecutionSandbox<H> {
    pub fn new(host: H, backend: Box<dyn RenderBackend>) -> Self {
        Self {
            host,
            backend,
            attachments: HashMap::new(),
            next_generation: 0,
            limits: ExecutionLimits::default(),
            rng: StdRng::seed_from_u64(rand::random()),
        }
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Make `random()` reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Give a region a fresh surface sized to it, replacing any previous one.
    pub fn attach(&mut self, region: &Region) -> SurfaceHandle {
        self.detach(region.id);

        self.next_generation += 1;
        let generation = self.next_generation;
        self.backend.create_surface(region.id, region.size);
        self.attachments.insert(
            region.id,
            Attachment {
                region: region.id,
                generation,
                surface: Surface::new(region.size),
                vars: HashMap::new(),
                program: None,
                pending_frame: None,
                frames_run: 0,
                attached_at_ms: self.host.now_ms(),
            },
        );
        log::debug!("attached {} (generation {})", region.id, generation);
        SurfaceHandle {
            region: region.id,
            generation,
        }
    }

    /// Run a program's setup against an attachment.
    ///
    /// On failure the attachment is torn down before returning.
    pub fn run(
        &mut self,
        program: &Arc<GeneratedProgram>,
        handle: SurfaceHandle,
    ) -> Result<RunReport, ExecutionFailed> {
        if program.params() != CANONICAL_PARAMS {
            self.detach(handle.region);
            return Err(ExecutionFailed::new(format!(
                "program parameters must be ({}), found ({})",
                CANONICAL_PARAMS.join(", "),
                program.params().join(", ")
            )));
        }

        let attachment = match self.attachments.get_mut(&handle.region) {
            Some(a) if a.generation == handle.generation => a,
            _ => {
                return Err(ExecutionFailed::new(format!(
                    "surface for {} is no longer attached",
                    handle.region
                )))
            }
        };

        attachment.program = Some(program.clone());
        let mut machine = Machine::new(
            attachment,
            &mut self.host,
            self.backend.as_mut(),
            &mut self.rng,
            self.limits,
        );
        let result = machine.run(program.setup());
        let tally = machine.tally();

        match result {
            Ok(()) => Ok(self.report(handle.region, tally.renders, tally.steps)),
            Err(e) => {
                log::warn!("program for {} failed during setup: {}", handle.region, e);
                self.detach(handle.region);
                Err(ExecutionFailed::new(e.to_string()))
            }
        }
    }

    /// Tear down a region's attachment. Returns false when nothing was
    /// attached.
    pub fn detach(&mut self, region: RegionId) -> bool {
        let Some(attachment) = self.attachments.remove(&region) else {
            return false;
        };
        if let Some(token) = attachment.pending_frame {
            self.host.cancel_frame(token);
        }
        self.backend.dispose_surface(region);
        log::debug!("detached {} (generation {})", region, attachment.generation);
        true
    }

    /// Run the frame body for a due callback.
    pub fn on_frame(&mut self, frame: ScheduledFrame) -> FrameOutcome {
        let region = frame.callback.region;
        let attachment = match self.attachments.get_mut(&region) {
            Some(a)
                if a.generation == frame.callback.generation
                    && a.pending_frame == Some(frame.token) =>
            {
                a
            }
            _ => return FrameOutcome::Stale,
        };
        let Some(program) = attachment.program.clone() else {
            return FrameOutcome::Stale;
        };

        attachment.pending_frame = None;
        attachment.frames_run += 1;
        let elapsed = frame.timestamp_ms - attachment.attached_at_ms;

        let mut machine = Machine::new(
            attachment,
            &mut self.host,
            self.backend.as_mut(),
            &mut self.rng,
            self.limits,
        )
        .at_time(elapsed);
        let result = machine.run(program.frame());
        let tally = machine.tally();

        match result {
            Ok(()) => FrameOutcome::Ran(self.report(region, tally.renders, tally.steps)),
            Err(e) => {
                log::warn!("program for {} failed in frame: {}", region, e);
                self.detach(region);
                FrameOutcome::Failed(ExecutionFailed::new(e.to_string()))
            }
        }
    }

    pub fn is_attached(&self, region: RegionId) -> bool {
        self.attachments.contains_key(&region)
    }

    pub fn attached_count(&self) -> usize {
        self.attachments.len()
    }

    pub fn pending_frame(&self, region: RegionId) -> Option<FrameToken> {
        self.attachments.get(&region).and_then(|a| a.pending_frame)
    }

    pub fn surface(&self, region: RegionId) -> Option<&Surface> {
        self.attachments.get(&region).map(|a| &a.surface)
    }

    pub fn surface_size(&self, region: RegionId) -> Option<CanvasSize> {
        self.surface(region).map(Surface::size)
    }

    fn report(&self, region: RegionId, renders: usize, steps: u64) -> RunReport {
        let attachment = self.attachments.get(&region);
        RunReport {
            shapes: attachment.map_or(0, |a| a.surface.len()),
            renders,
            steps,
            frame_scheduled: attachment.is_some_and(|a| a.pending_frame.is_some()),
        }
    }
}

impl ExecutionSandbox<FrameClock> {
    /// Advance the in-process clock and run every frame that came due.
    pub fn tick(&mut self, dt_ms: f64) -> Vec<(RegionId, FrameOutcome)> {
        let due = self.host.advance(dt_ms);
        due.into_iter()
            .map(|frame| (frame.callback.region, self.on_frame(frame)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::frame::FrameCallback;
    use crate::surface::Shape;
    use region::CanvasRect;
    use script::ResponseParser;

    fn program(json: &str) -> Arc<GeneratedProgram> {
        Arc::new(ResponseParser::default().parse(json).unwrap())
    }

    fn region(w: f32, h: f32) -> Region {
        Region::new(CanvasRect::from_xywh(0.0, 0.0, w, h))
    }

    fn sandbox() -> (ExecutionSandbox<FrameClock>, RecordingBackend) {
        let backend = RecordingBackend::new();
        let sandbox = ExecutionSandbox::new(FrameClock::new(), Box::new(backend.clone())).with_seed(7);
        (sandbox, backend)
    }

    const FILL: &str = r#"[{"op": "rect", "left": 0, "top": 0, "width": "width", "height": "height", "style": {"fill": "red"}}]"#;

    const ANIMATED: &str = r#"{
        "setup": [
            {"op": "let", "name": "y", "value": 0},
            {"op": "text", "name": "drop", "text": "A", "left": 10, "top": "y", "style": {"fill": "lime"}},
            {"op": "schedule_frame"}
        ],
        "frame": [
            {"op": "let", "name": "y", "value": "y + 5"},
            {"op": "set", "target": "drop", "field": "top", "value": "y"},
            {"op": "schedule_frame"}
        ]
    }"#;

    #[test]
    fn test_fill_uses_surface_size() {
        let (mut sandbox, backend) = sandbox();
        let r = region(200.0, 150.0);
        let handle = sandbox.attach(&r);
        let report = sandbox.run(&program(FILL), handle).unwrap();
        assert_eq!(report.shapes, 1);
        assert_eq!(report.renders, 1);
        assert!(!report.frame_scheduled);

        let recording = backend.recording();
        let frame = recording.last_frame(r.id).unwrap();
        match &frame.shapes[0] {
            Shape::Rect { width, height, style, .. } => {
                assert_eq!((*width, *height), (200.0, 150.0));
                assert_eq!(style.fill.unwrap().to_hex(), "#ff0000");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_detach_is_idempotent() {
        let (mut sandbox, backend) = sandbox();
        let r = region(200.0, 200.0);
        let handle = sandbox.attach(&r);
        sandbox.run(&program(ANIMATED), handle).unwrap();
        assert_eq!(sandbox.host().pending_count(), 1);

        assert!(sandbox.detach(r.id));
        assert!(!sandbox.detach(r.id));
        assert_eq!(sandbox.host().pending_count(), 0);
        assert_eq!(backend.recording().live_surfaces(), 0);
        assert_eq!(backend.recording().disposed, vec![r.id]);
    }

    #[test]
    fn test_animation_runs_each_tick() {
        let (mut sandbox, _backend) = sandbox();
        let r = region(200.0, 200.0);
        let handle = sandbox.attach(&r);
        sandbox.run(&program(ANIMATED), handle).unwrap();

        for _ in 0..3 {
            let outcomes = sandbox.tick(16.0);
            assert_eq!(outcomes.len(), 1);
            assert!(matches!(outcomes[0].1, FrameOutcome::Ran(RunReport { frame_scheduled: true, .. })));
        }
        match sandbox.surface(r.id).unwrap().get("drop").unwrap() {
            Shape::Text { top, .. } => assert_eq!(*top, 15.0),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sandbox.host().pending_count(), 1);
    }

    #[test]
    fn test_stale_frame_is_noop() {
        let (mut sandbox, backend) = sandbox();
        let r = region(200.0, 200.0);
        let handle = sandbox.attach(&r);
        sandbox.run(&program(ANIMATED), handle).unwrap();
        let token = sandbox.pending_frame(r.id).unwrap();
        let old = ScheduledFrame {
            token,
            callback: FrameCallback {
                region: r.id,
                generation: handle.generation,
            },
            timestamp_ms: 16.0,
        };

        // Re-attaching invalidates everything scheduled for the old surface.
        let handle = sandbox.attach(&r);
        sandbox.run(&program(FILL), handle).unwrap();
        let presents = backend.recording().presents_for(r.id);

        assert_eq!(sandbox.on_frame(old), FrameOutcome::Stale);
        assert_eq!(backend.recording().presents_for(r.id), presents);
        assert_eq!(sandbox.surface(r.id).unwrap().len(), 1);
    }

    #[test]
    fn test_runtime_error_tears_down() {
        let (mut sandbox, backend) = sandbox();
        let r = region(200.0, 200.0);
        let handle = sandbox.attach(&r);
        let bad = program(r#"[{"op": "let", "name": "x", "value": "1 / 0"}, {"op": "clear"}]"#);
        let err = sandbox.run(&bad, handle).unwrap_err();
        assert!(err.message.contains("finite"));
        assert!(!sandbox.is_attached(r.id));
        assert!(!backend.recording().is_live(r.id));
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let (mut sandbox, _backend) = sandbox();
        let r = region(200.0, 200.0);
        let old = sandbox.attach(&r);
        sandbox.attach(&r);
        assert!(sandbox.run(&program(FILL), old).is_err());
        assert!(sandbox.is_attached(r.id));
    }

    #[test]
    fn test_step_budget() {
        let (sandbox, _backend) = sandbox();
        let mut sandbox = sandbox.with_limits(ExecutionLimits {
            max_steps: 50,
            ..ExecutionLimits::default()
        });
        let r = region(100.0, 100.0);
        let handle = sandbox.attach(&r);
        let busy = program(r#"[{"op": "repeat", "count": 100, "body": [{"op": "clear"}]}]"#);
        let err = sandbox.run(&busy, handle).unwrap_err();
        assert!(err.message.contains("50 steps"));
    }

    #[test]
    fn test_repeat_and_polyline() {
        let (mut sandbox, _backend) = sandbox();
        let r = region(100.0, 100.0);
        let handle = sandbox.attach(&r);
        let bars = program(
            r#"[
                {"op": "repeat", "count": 4, "body": [
                    {"op": "rect", "left": "i * 25", "top": "height - i * 10", "width": 20, "height": "i * 10"}
                ]},
                {"op": "polyline", "points": {"count": 5, "x": "i * 25", "y": "50 + sin(i) * 10"}, "style": {"stroke": "blue"}}
            ]"#,
        );
        let report = sandbox.run(&bars, handle).unwrap();
        assert_eq!(report.shapes, 5);
        let shapes = sandbox.surface(r.id).unwrap().shapes();
        match &shapes[4] {
            Shape::Polyline { points, .. } => assert_eq!(points.len(), 5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cancel_frame_stops_animation() {
        let (mut sandbox, _backend) = sandbox();
        let r = region(100.0, 100.0);
        let handle = sandbox.attach(&r);
        let once = program(
            r#"{
                "setup": [{"op": "clear"}, {"op": "schedule_frame"}],
                "frame": [
                    {"op": "rect", "name": "r", "left": 0, "top": 0, "width": 10, "height": 10},
                    {"op": "if", "cond": "frame >= 2", "then": [{"op": "cancel_frame"}], "else": [{"op": "schedule_frame"}]}
                ]
            }"#,
        );
        sandbox.run(&once, handle).unwrap();
        assert_eq!(sandbox.tick(16.0).len(), 1);
        assert_eq!(sandbox.tick(16.0).len(), 1);
        assert!(sandbox.tick(16.0).is_empty());
        assert!(sandbox.pending_frame(r.id).is_none());
    }
}
