use crate::config::WorkspaceConfig;
use crate::error::{LifecycleError, RegionFailure};
use crate::lifecycle::{Completion, GenerationResponse, PendingGeneration, RegionLifecycleController};
use canvas::{
    DragController, DrawGestureController, DrawOutcome, OverlapRejected, PointerId, RegionStore,
    ResizeController, StoreEvent, SubscriptionId, Viewport,
};
use codegen::CodegenClient;
use region::geometry::{clamp_min_size, sanitize_point};
use region::{CanvasPoint, CanvasRect, CanvasSize, Phase, Region, RegionId, RegionPatch, ScreenPoint};
use sandbox::{ExecutionSandbox, FrameClock, FrameOutcome, RenderBackend};
use script::ResponseParser;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

pub type Sandbox = ExecutionSandbox<FrameClock>;

/// What a pointer-down landed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "region", rename_all = "snake_case")]
pub enum PointerTarget {
    /// Empty canvas; a draw gesture started.
    Canvas,
    /// The strip along a region's top edge; a drag started.
    DragStrip(RegionId),
    /// The bottom-right grip; a resize started.
    ResizeGrip(RegionId),
    /// The region's content area.
    Body(RegionId),
}

/// What a pointer-up finished.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerRelease {
    Drew(DrawOutcome),
    Moved(RegionId),
    Resized(RegionId),
    Nothing,
}

/// The canvas workspace: regions, gestures, sandbox and lifecycle in one
/// place, driven through `&mut self` from a single thread.
pub struct Workspace {
    config: WorkspaceConfig,
    store: RegionStore,
    draw: DrawGestureController,
    drag: DragController,
    resize: ResizeController,
    viewport: Viewport,
    sandbox: Sandbox,
    lifecycle: RegionLifecycleController,
    events: Rc<RefCell<Vec<StoreEvent>>>,
    subscription: SubscriptionId,
}

impl Workspace {
    pub fn new(
        config: WorkspaceConfig,
        client: Rc<dyn CodegenClient>,
        backend: Box<dyn RenderBackend>,
    ) -> Self {
        let mut store = RegionStore::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let subscription = store.subscribe(move |event| {
            if matches!(event, StoreEvent::RegionRemoved(_)) {
                sink.borrow_mut().push(*event);
            }
        });

        let parser = ResponseParser::new(config.protocol);
        Self {
            draw: DrawGestureController::new(config.min_draw_distance),
            drag: DragController::new(),
            resize: ResizeController::new(config.min_region_size),
            viewport: Viewport::new(),
            sandbox: build_sandbox(&config, backend),
            lifecycle: RegionLifecycleController::new(client, parser),
            store,
            events,
            subscription,
            config,
        }
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn store(&self) -> &RegionStore {
        &self.store
    }

    /// Regions in paint order (back to front).
    pub fn list(&self) -> &[Region] {
        self.store.list()
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.store.get(id)
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    // === Pointer input ===

    /// Classify a canvas point against the topmost region's handles.
    pub fn hit_test(&self, point: CanvasPoint) -> PointerTarget {
        let Some(id) = self.store.region_at(point) else {
            return PointerTarget::Canvas;
        };
        let Some(region) = self.store.get(id) else {
            return PointerTarget::Canvas;
        };
        let handle = self.config.handle_size;
        let max = region.rect().max();
        if point.x() >= max.x() - handle && point.y() >= max.y() - handle {
            PointerTarget::ResizeGrip(id)
        } else if point.y() <= region.position.y() + handle {
            PointerTarget::DragStrip(id)
        } else {
            PointerTarget::Body(id)
        }
    }

    pub fn pointer_down(&mut self, pointer: PointerId, position: ScreenPoint) -> PointerTarget {
        let point = self.viewport.screen_to_canvas(position);
        let target = self.hit_test(point);
        match target {
            PointerTarget::Canvas => self.draw.pointer_down(point),
            PointerTarget::DragStrip(id) => {
                if let Some(region) = self.store.get(id) {
                    self.drag.begin(pointer, region, point);
                }
            }
            PointerTarget::ResizeGrip(id) => {
                if let Some(region) = self.store.get(id) {
                    self.resize.begin(pointer, region, point);
                }
            }
            PointerTarget::Body(_) => {}
        }
        target
    }

    pub fn pointer_move(&mut self, pointer: PointerId, position: ScreenPoint) {
        let point = self.viewport.screen_to_canvas(position);
        if let Some((id, patch)) = self.drag.update(pointer, point) {
            self.store.update(id, patch);
        } else if let Some((id, patch)) = self.resize.update(pointer, point) {
            self.apply_resize(id, patch);
        } else {
            self.draw.pointer_move(point);
        }
    }

    pub fn pointer_up(&mut self, pointer: PointerId, position: ScreenPoint) -> PointerRelease {
        self.pointer_move(pointer, position);
        if let Some(id) = self.drag.end(pointer) {
            return PointerRelease::Moved(id);
        }
        if let Some(id) = self.resize.end(pointer) {
            return PointerRelease::Resized(id);
        }
        if self.draw.is_drawing() {
            let point = self.viewport.screen_to_canvas(position);
            let outcome = self
                .draw
                .pointer_up(point, &mut self.store, self.config.min_region_size);
            return PointerRelease::Drew(outcome);
        }
        PointerRelease::Nothing
    }

    /// Abandon whatever the pointer was doing.
    pub fn pointer_cancel(&mut self, pointer: PointerId) {
        self.drag.end(pointer);
        self.resize.end(pointer);
        self.draw.cancel();
    }

    // === Direct geometry ===

    /// Create a region, grown to the minimum size, unless it overlaps.
    pub fn create_region(&mut self, rect: CanvasRect) -> Result<RegionId, OverlapRejected> {
        let size = clamp_min_size(rect.size, self.config.min_region_size);
        self.store.create(CanvasRect::new(sanitize_point(rect.origin), size))
    }

    pub fn move_region(&mut self, id: RegionId, position: CanvasPoint) -> Result<(), LifecycleError> {
        if !self.store.update(id, RegionPatch::Position(sanitize_point(position))) {
            return Err(LifecycleError::NotFound(id));
        }
        Ok(())
    }

    /// Resize a region, never below the minimum size. A rendering region
    /// gets a fresh surface at the new size and its program runs again.
    pub fn resize_region(
        &mut self,
        id: RegionId,
        size: CanvasSize,
    ) -> Result<Option<Completion>, LifecycleError> {
        if !self.store.contains(id) {
            return Err(LifecycleError::NotFound(id));
        }
        let size = clamp_min_size(size, self.config.min_region_size);
        Ok(self.apply_resize(id, RegionPatch::Size(size)))
    }

    fn apply_resize(&mut self, id: RegionId, patch: RegionPatch) -> Option<Completion> {
        let before = self.store.get(id).map(|r| r.size);
        self.store.update(id, patch);
        let after = self.store.get(id).map(|r| r.size);
        if before == after {
            return None;
        }
        self.lifecycle
            .rerender(id, &mut self.store, &mut self.sandbox)
    }

    // === Lifecycle ===

    pub fn set_prompt(&mut self, id: RegionId, prompt: impl Into<String>) -> Result<(), LifecycleError> {
        self.lifecycle.set_prompt(id, prompt, &mut self.store)
    }

    pub fn begin_submit(&mut self, id: RegionId) -> Result<Option<PendingGeneration>, LifecycleError> {
        self.lifecycle.begin_submit(id, &mut self.store)
    }

    pub fn complete_generation(&mut self, response: GenerationResponse) -> Completion {
        self.lifecycle
            .complete_generation(response, &mut self.store, &mut self.sandbox)
    }

    pub fn edit(&mut self, id: RegionId) -> Result<(), LifecycleError> {
        self.lifecycle.edit(id, &mut self.store, &mut self.sandbox)
    }

    pub fn cancel(&mut self, id: RegionId) -> Result<Option<Completion>, LifecycleError> {
        self.lifecycle.cancel(id, &mut self.store, &mut self.sandbox)
    }

    pub fn regenerate(&mut self, id: RegionId) -> Result<Option<PendingGeneration>, LifecycleError> {
        self.lifecycle
            .regenerate(id, &mut self.store, &mut self.sandbox)
    }

    /// Remove a region. Its sandbox attachment, pending frame, gesture
    /// sessions and any in-flight generation go with it.
    pub fn delete(&mut self, id: RegionId) -> Result<Region, LifecycleError> {
        let region = self.store.remove(id).ok_or(LifecycleError::NotFound(id))?;
        self.sync();
        Ok(region)
    }

    /// Advance the animation clock and run every frame that came due.
    pub fn advance_frames(&mut self, dt_ms: f64) -> Vec<(RegionId, FrameOutcome)> {
        let outcomes = self.sandbox.tick(dt_ms);
        for (id, outcome) in &outcomes {
            if let FrameOutcome::Failed(e) = outcome {
                if self.store.get(*id).map(|r| r.phase) == Some(Phase::Rendering) {
                    self.lifecycle
                        .fail(*id, RegionFailure::Execution(e.clone()), &mut self.store);
                }
            }
        }
        outcomes
    }

    /// React to store events that need cleanup elsewhere.
    fn sync(&mut self) {
        let events: Vec<StoreEvent> = self.events.borrow_mut().drain(..).collect();
        for event in events {
            if let StoreEvent::RegionRemoved(id) = event {
                self.sandbox.detach(id);
                self.drag.forget(id);
                self.resize.forget(id);
                self.lifecycle.forget(id);
                log::info!("deleted region {}", id);
            }
        }
    }
}

fn build_sandbox(config: &WorkspaceConfig, backend: Box<dyn RenderBackend>) -> Sandbox {
    let sandbox = ExecutionSandbox::new(FrameClock::new(), backend).with_limits(config.limits);
    match config.seed {
        Some(seed) => sandbox.with_seed(seed),
        None => sandbox,
    }
}

/// Submit a region's prompt and apply the response.
///
/// The workspace is only borrowed on either side of the codegen call, so
/// other regions stay interactive while this one is generating.
pub async fn submit_prompt(
    workspace: &RefCell<Workspace>,
    id: RegionId,
) -> Result<Option<Completion>, LifecycleError> {
    let pending = workspace.borrow_mut().begin_submit(id)?;
    resolve(workspace, pending).await
}

/// Regenerate a region's program from its current prompt.
pub async fn regenerate_prompt(
    workspace: &RefCell<Workspace>,
    id: RegionId,
) -> Result<Option<Completion>, LifecycleError> {
    let pending = workspace.borrow_mut().regenerate(id)?;
    resolve(workspace, pending).await
}

async fn resolve(
    workspace: &RefCell<Workspace>,
    pending: Option<PendingGeneration>,
) -> Result<Option<Completion>, LifecycleError> {
    let Some(pending) = pending else {
        return Ok(None);
    };
    let response = pending.resolve().await;
    Ok(Some(workspace.borrow_mut().complete_generation(response)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegen::ScriptedClient;
    use sandbox::RecordingBackend;
    use script::{CODE_MARKER, EXPLANATION_MARKER};

    const RAIN: &str = r#"{
        "setup": [
            {"op": "rect", "name": "bg", "left": 0, "top": 0, "width": "width", "height": "height", "style": {"fill": "black"}},
            {"op": "render"},
            {"op": "schedule_frame"}
        ],
        "frame": [
            {"op": "text", "name": "drop", "text": "{frame}", "left": "width / 2", "top": "frame * 2 % height", "style": {"fill": "lime"}},
            {"op": "render"},
            {"op": "schedule_frame"}
        ]
    }"#;

    fn delimited(code: &str) -> String {
        format!("{}\n{}\n{}\nFalling text.", CODE_MARKER, code, EXPLANATION_MARKER)
    }

    fn workspace() -> (Workspace, Rc<ScriptedClient>, RecordingBackend) {
        let client = Rc::new(ScriptedClient::new());
        let backend = RecordingBackend::new();
        let workspace = Workspace::new(
            WorkspaceConfig::default(),
            client.clone(),
            Box::new(backend.clone()),
        );
        (workspace, client, backend)
    }

    fn drag(ws: &mut Workspace, from: (f32, f32), to: (f32, f32)) -> PointerRelease {
        let pointer = PointerId(1);
        ws.pointer_down(pointer, ScreenPoint::new(from.0, from.1));
        ws.pointer_move(pointer, ScreenPoint::new(to.0, to.1));
        ws.pointer_up(pointer, ScreenPoint::new(to.0, to.1))
    }

    fn rendering(ws: &RefCell<Workspace>, client: &ScriptedClient, id: RegionId) {
        client.push_response(delimited(RAIN));
        ws.borrow_mut().set_prompt(id, "matrix rain").unwrap();
        let completion = smol::block_on(submit_prompt(ws, id)).unwrap();
        assert!(matches!(completion, Some(Completion::Rendered(_))));
    }

    #[test]
    fn test_pointer_draw_and_handles() {
        let (mut ws, _client, _backend) = workspace();
        let PointerRelease::Drew(DrawOutcome::Created(id)) = drag(&mut ws, (100.0, 100.0), (300.0, 300.0))
        else {
            panic!("expected a region");
        };

        assert_eq!(ws.hit_test(CanvasPoint::new(150.0, 105.0)), PointerTarget::DragStrip(id));
        assert_eq!(ws.hit_test(CanvasPoint::new(295.0, 295.0)), PointerTarget::ResizeGrip(id));
        assert_eq!(ws.hit_test(CanvasPoint::new(200.0, 200.0)), PointerTarget::Body(id));
        assert_eq!(ws.hit_test(CanvasPoint::new(50.0, 50.0)), PointerTarget::Canvas);

        assert_eq!(drag(&mut ws, (150.0, 105.0), (250.0, 155.0)), PointerRelease::Moved(id));
        assert_eq!(ws.get(id).unwrap().position, CanvasPoint::new(200.0, 150.0));

        // Grip is now at the new bottom-right corner.
        assert_eq!(drag(&mut ws, (395.0, 345.0), (245.0, 195.0)), PointerRelease::Resized(id));
        assert_eq!(ws.get(id).unwrap().size, CanvasSize::new(100.0, 100.0));
    }

    #[test]
    fn test_drawing_over_a_region_is_not_possible() {
        let (mut ws, _client, _backend) = workspace();
        ws.create_region(CanvasRect::from_xywh(100.0, 100.0, 200.0, 200.0))
            .unwrap();
        // Starts on empty canvas, ends inside the region.
        let release = drag(&mut ws, (20.0, 20.0), (150.0, 150.0));
        assert!(matches!(release, PointerRelease::Drew(DrawOutcome::Rejected(_))));
        assert_eq!(ws.list().len(), 1);
    }

    #[test]
    fn test_non_finite_origin_lands_at_zero() {
        let (mut ws, _client, _backend) = workspace();
        let id = ws
            .create_region(CanvasRect::from_xywh(f32::NAN, f32::INFINITY, 200.0, 200.0))
            .unwrap();
        assert_eq!(ws.get(id).unwrap().position, CanvasPoint::new(0.0, 0.0));
        assert_eq!(ws.hit_test(CanvasPoint::new(100.0, 100.0)), PointerTarget::Body(id));
        assert!(ws
            .create_region(CanvasRect::from_xywh(f32::NAN, f32::NAN, 50.0, 50.0))
            .is_err());

        ws.move_region(id, CanvasPoint::new(f32::NEG_INFINITY, 300.0)).unwrap();
        assert_eq!(ws.get(id).unwrap().position, CanvasPoint::new(0.0, 300.0));
    }

    // A rendering, animating region is resized; the old frame must never fire.
    #[test]
    fn test_resize_reattaches_before_next_frame() {
        let (ws, client, backend) = workspace();
        let ws = RefCell::new(ws);
        let id = ws
            .borrow_mut()
            .create_region(CanvasRect::from_xywh(0.0, 0.0, 200.0, 200.0))
            .unwrap();
        rendering(&ws, &client, id);
        ws.borrow_mut().advance_frames(16.0);
        let old_frame = ws.borrow().sandbox().pending_frame(id).unwrap();

        let completion = ws
            .borrow_mut()
            .resize_region(id, CanvasSize::new(300.0, 250.0))
            .unwrap();
        assert!(matches!(completion, Some(Completion::Rendered(_))));

        let ws = ws.into_inner();
        assert!(!ws.sandbox().host().is_pending(old_frame));
        assert_eq!(ws.sandbox().host().pending_count(), 1);
        assert_eq!(ws.sandbox().surface_size(id), Some(CanvasSize::new(300.0, 250.0)));
        assert_eq!(backend.recording().created.len(), 2);
        assert_eq!(backend.recording().live_surfaces(), 1);
        assert_eq!(ws.get(id).unwrap().phase, Phase::Rendering);
    }

    #[test]
    fn test_delete_tears_everything_down() {
        let (ws, client, backend) = workspace();
        let ws = RefCell::new(ws);
        let id = ws
            .borrow_mut()
            .create_region(CanvasRect::from_xywh(0.0, 0.0, 200.0, 200.0))
            .unwrap();
        rendering(&ws, &client, id);

        let mut ws = ws.into_inner();
        ws.delete(id).unwrap();
        assert!(!ws.sandbox().is_attached(id));
        assert_eq!(ws.sandbox().host().pending_count(), 0);
        assert_eq!(backend.recording().live_surfaces(), 0);
        assert!(ws.advance_frames(16.0).is_empty());
        assert!(matches!(ws.delete(id), Err(LifecycleError::NotFound(_))));
    }

    #[test]
    fn test_delete_during_generation_discards_response() {
        let (ws, client, _backend) = workspace();
        let ws = RefCell::new(ws);
        let id = ws
            .borrow_mut()
            .create_region(CanvasRect::from_xywh(0.0, 0.0, 200.0, 200.0))
            .unwrap();
        client.push_response(delimited(RAIN));
        ws.borrow_mut().set_prompt(id, "rain").unwrap();

        let pending = ws.borrow_mut().begin_submit(id).unwrap().unwrap();
        ws.borrow_mut().delete(id).unwrap();
        let response = smol::block_on(pending.resolve());
        assert_eq!(ws.borrow_mut().complete_generation(response), Completion::Discarded);
        assert_eq!(ws.borrow().sandbox().attached_count(), 0);
    }

    #[test]
    fn test_regions_generate_concurrently() {
        let (ws, client, _backend) = workspace();
        let ws = RefCell::new(ws);
        let a = ws
            .borrow_mut()
            .create_region(CanvasRect::from_xywh(0.0, 0.0, 200.0, 200.0))
            .unwrap();
        let b = ws
            .borrow_mut()
            .create_region(CanvasRect::from_xywh(300.0, 0.0, 200.0, 200.0))
            .unwrap();
        client.push_response(delimited(RAIN));
        client.push_response("not a program");
        ws.borrow_mut().set_prompt(a, "rain").unwrap();
        ws.borrow_mut().set_prompt(b, "broken").unwrap();

        let (first, second) = smol::block_on(smol::future::zip(
            submit_prompt(&ws, a),
            submit_prompt(&ws, b),
        ));
        assert!(matches!(first, Ok(Some(Completion::Rendered(_)))));
        assert!(matches!(second, Ok(Some(Completion::Failed(_)))));

        let ws = ws.into_inner();
        assert_eq!(ws.get(a).unwrap().phase, Phase::Rendering);
        assert_eq!(ws.get(b).unwrap().phase, Phase::Error);
        assert_eq!(client.requests().len(), 2);
    }

    #[test]
    fn test_frames_keep_animating() {
        let (ws, client, backend) = workspace();
        let ws = RefCell::new(ws);
        let id = ws
            .borrow_mut()
            .create_region(CanvasRect::from_xywh(0.0, 0.0, 200.0, 200.0))
            .unwrap();
        rendering(&ws, &client, id);

        let mut ws = ws.into_inner();
        for _ in 0..5 {
            let outcomes = ws.advance_frames(16.0);
            assert_eq!(outcomes.len(), 1);
        }
        // One flush from setup plus one per frame.
        assert_eq!(backend.recording().presents_for(id), 6);
        let last = backend.recording().last_frame(id).unwrap().shapes.clone();
        assert_eq!(last.len(), 2);
    }
}
