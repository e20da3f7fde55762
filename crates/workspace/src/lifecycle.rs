//! The prompt → generate → render lifecycle of a single region.
//!
//! ```text
//! Editing --submit--> Generating --success--> Rendering
//!                     Generating --failure--> Error
//!                     Generating --cancel---> Editing
//! Rendering --edit--> Editing --cancel--> Rendering (or Editing without a program)
//! Rendering --regenerate--> Generating
//! ```
//!
//! Generation is split in three so the caller never holds workspace state
//! across the only await: [`RegionLifecycleController::begin_submit`] issues a
//! ticket, [`PendingGeneration::resolve`] talks to the code generator, and
//! [`RegionLifecycleController::complete_generation`] applies the result if
//! the ticket is still current.

use crate::error::{LifecycleError, RegionFailure};
use canvas::RegionStore;
use codegen::{CodegenClient, CodegenRequest, CollaboratorUnavailable};
use region::{Phase, RegionId, RegionPatch};
use sandbox::{ExecutionSandbox, FrameHost, RunReport};
use script::ResponseParser;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Identifies one generation request. Tickets are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationTicket(u64);

/// A codegen call that has been issued but not awaited yet.
pub struct PendingGeneration {
    region: RegionId,
    ticket: GenerationTicket,
    request: CodegenRequest,
    client: Rc<dyn CodegenClient>,
}

impl PendingGeneration {
    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn ticket(&self) -> GenerationTicket {
        self.ticket
    }

    pub fn request(&self) -> &CodegenRequest {
        &self.request
    }

    pub async fn resolve(self) -> GenerationResponse {
        let result = self.client.generate(&self.request).await;
        GenerationResponse {
            region: self.region,
            ticket: self.ticket,
            result,
        }
    }
}

/// The raw outcome of a codegen call, waiting to be applied.
#[derive(Clone, Debug)]
pub struct GenerationResponse {
    pub region: RegionId,
    pub ticket: GenerationTicket,
    pub result: Result<String, CollaboratorUnavailable>,
}

/// What applying a generation response did.
#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    /// The program ran and the region is rendering it.
    Rendered(RunReport),
    /// The region moved to Error with this failure.
    Failed(RegionFailure),
    /// The response was stale (cancelled, superseded or deleted region).
    Discarded,
}

#[derive(Clone, Debug, Default)]
struct RegionState {
    /// Prompt to restore on cancel.
    snapshot: Option<String>,
    in_flight: Option<GenerationTicket>,
}

pub struct RegionLifecycleController {
    client: Rc<dyn CodegenClient>,
    parser: ResponseParser,
    states: HashMap<RegionId, RegionState>,
    next_ticket: u64,
}

impl RegionLifecycleController {
    pub fn new(client: Rc<dyn CodegenClient>, parser: ResponseParser) -> Self {
        Self {
            client,
            parser,
            states: HashMap::new(),
            next_ticket: 0,
        }
    }

    pub fn parser(&self) -> &ResponseParser {
        &self.parser
    }

    pub fn in_flight(&self, id: RegionId) -> Option<GenerationTicket> {
        self.states.get(&id).and_then(|s| s.in_flight)
    }

    /// Replace the prompt text of an editable region.
    pub fn set_prompt(
        &mut self,
        id: RegionId,
        prompt: impl Into<String>,
        store: &mut RegionStore,
    ) -> Result<(), LifecycleError> {
        let phase = phase_of(store, id)?;
        if !phase.accepts_prompt() {
            return Err(invalid(id, phase, "edit the prompt of"));
        }
        store.update(id, RegionPatch::Prompt(prompt.into()));
        if phase == Phase::Error {
            store.update(id, RegionPatch::Phase(Phase::Editing));
        }
        Ok(())
    }

    /// Start generating a program for the region's current prompt.
    ///
    /// A blank prompt is ignored and yields `None`.
    pub fn begin_submit(
        &mut self,
        id: RegionId,
        store: &mut RegionStore,
    ) -> Result<Option<PendingGeneration>, LifecycleError> {
        let phase = phase_of(store, id)?;
        if !phase.accepts_prompt() {
            return Err(invalid(id, phase, "submit"));
        }
        Ok(self.start_generation(id, store))
    }

    /// Throw away the rendered program's output and generate a new one from
    /// the same prompt.
    pub fn regenerate<H: FrameHost>(
        &mut self,
        id: RegionId,
        store: &mut RegionStore,
        sandbox: &mut ExecutionSandbox<H>,
    ) -> Result<Option<PendingGeneration>, LifecycleError> {
        let phase = phase_of(store, id)?;
        if phase == Phase::Generating {
            return Err(invalid(id, phase, "regenerate"));
        }
        sandbox.detach(id);
        if phase == Phase::Rendering {
            store.update(id, RegionPatch::Phase(Phase::Editing));
        }
        Ok(self.start_generation(id, store))
    }

    fn start_generation(&mut self, id: RegionId, store: &mut RegionStore) -> Option<PendingGeneration> {
        let raw = store.get(id)?.prompt.clone();
        let prompt = raw.trim().to_string();
        if prompt.is_empty() {
            log::debug!("ignoring empty prompt for {}", id);
            return None;
        }

        self.next_ticket += 1;
        let ticket = GenerationTicket(self.next_ticket);
        let state = self.states.entry(id).or_default();
        state.snapshot = Some(raw);
        state.in_flight = Some(ticket);

        store.update(id, RegionPatch::Error(None));
        store.update(id, RegionPatch::Phase(Phase::Generating));
        log::info!("generating program for {} ({:?})", id, ticket);

        Some(PendingGeneration {
            region: id,
            ticket,
            request: CodegenRequest::new(prompt),
            client: self.client.clone(),
        })
    }

    /// Apply a codegen response: parse, attach, run, and only then store the
    /// program and enter Rendering.
    pub fn complete_generation<H: FrameHost>(
        &mut self,
        response: GenerationResponse,
        store: &mut RegionStore,
        sandbox: &mut ExecutionSandbox<H>,
    ) -> Completion {
        let id = response.region;
        let current = self.states.get(&id).and_then(|s| s.in_flight);
        if current != Some(response.ticket) || !store.contains(id) {
            log::debug!("discarding stale response for {} ({:?})", id, response.ticket);
            return Completion::Discarded;
        }
        if let Some(state) = self.states.get_mut(&id) {
            state.in_flight = None;
        }

        let raw = match response.result {
            Ok(raw) => raw,
            Err(e) => return self.fail(id, e.into(), store),
        };
        let program = match self.parser.parse(&raw) {
            Ok(program) => Arc::new(program),
            Err(e) => return self.fail(id, e.into(), store),
        };
        match self.attach_and_run(id, &program, store, sandbox) {
            Ok(report) => {
                store.update(id, RegionPatch::Program(Some(program)));
                store.update(id, RegionPatch::Phase(Phase::Rendering));
                log::info!("{} is rendering ({} shapes)", id, report.shapes);
                Completion::Rendered(report)
            }
            Err(e) => self.fail(id, e, store),
        }
    }

    /// Leave Rendering to edit the prompt. The program stops and the prompt
    /// is remembered for cancel.
    pub fn edit<H: FrameHost>(
        &mut self,
        id: RegionId,
        store: &mut RegionStore,
        sandbox: &mut ExecutionSandbox<H>,
    ) -> Result<(), LifecycleError> {
        let phase = phase_of(store, id)?;
        match phase {
            Phase::Rendering => {
                sandbox.detach(id);
                let prompt = store.get(id).map(|r| r.prompt.clone());
                self.states.entry(id).or_default().snapshot = prompt;
                store.update(id, RegionPatch::Phase(Phase::Editing));
                Ok(())
            }
            Phase::Editing | Phase::Error => Ok(()),
            Phase::Generating => Err(invalid(id, phase, "edit")),
        }
    }

    /// Back out of editing or generating.
    ///
    /// While editing, the prompt reverts to its snapshot and a region that
    /// has a program goes back to rendering it. While generating, the
    /// in-flight response is discarded when it arrives.
    pub fn cancel<H: FrameHost>(
        &mut self,
        id: RegionId,
        store: &mut RegionStore,
        sandbox: &mut ExecutionSandbox<H>,
    ) -> Result<Option<Completion>, LifecycleError> {
        let phase = phase_of(store, id)?;
        match phase {
            Phase::Generating => {
                if let Some(state) = self.states.get_mut(&id) {
                    state.in_flight = None;
                }
                store.update(id, RegionPatch::Phase(Phase::Editing));
                log::info!("cancelled generation for {}", id);
                Ok(None)
            }
            Phase::Editing | Phase::Error => {
                if let Some(snapshot) = self.states.get(&id).and_then(|s| s.snapshot.clone()) {
                    store.update(id, RegionPatch::Prompt(snapshot));
                }
                store.update(id, RegionPatch::Error(None));
                store.update(id, RegionPatch::Phase(Phase::Editing));

                let Some(program) = store.get(id).and_then(|r| r.program.clone()) else {
                    return Ok(None);
                };
                let completion = match self.attach_and_run(id, &program, store, sandbox) {
                    Ok(report) => {
                        store.update(id, RegionPatch::Phase(Phase::Rendering));
                        Completion::Rendered(report)
                    }
                    Err(e) => self.fail(id, e, store),
                };
                Ok(Some(completion))
            }
            Phase::Rendering => Err(invalid(id, phase, "cancel")),
        }
    }

    /// Re-run a rendering region's program on a fresh surface, after its
    /// size changed.
    pub fn rerender<H: FrameHost>(
        &mut self,
        id: RegionId,
        store: &mut RegionStore,
        sandbox: &mut ExecutionSandbox<H>,
    ) -> Option<Completion> {
        let region = store.get(id)?;
        if region.phase != Phase::Rendering {
            return None;
        }
        let program = region.program.clone()?;
        Some(match self.attach_and_run(id, &program, store, sandbox) {
            Ok(report) => Completion::Rendered(report),
            Err(e) => self.fail(id, e, store),
        })
    }

    /// Record a failure that happened outside a generation, such as a frame
    /// that raised an error.
    pub fn fail(&mut self, id: RegionId, failure: RegionFailure, store: &mut RegionStore) -> Completion {
        log::warn!("{} failed: {}", id, failure);
        store.update(id, RegionPatch::Error(Some(failure.to_string())));
        store.update(id, RegionPatch::Phase(Phase::Error));
        Completion::Failed(failure)
    }

    /// Drop all state for a region that was removed from the store.
    pub fn forget(&mut self, id: RegionId) {
        self.states.remove(&id);
    }

    fn attach_and_run<H: FrameHost>(
        &self,
        id: RegionId,
        program: &Arc<script::GeneratedProgram>,
        store: &RegionStore,
        sandbox: &mut ExecutionSandbox<H>,
    ) -> Result<RunReport, RegionFailure> {
        let region = store.get(id).ok_or_else(|| {
            RegionFailure::Execution(sandbox::ExecutionFailed::new("region no longer exists"))
        })?;
        let handle = sandbox.attach(region);
        Ok(sandbox.run(program, handle)?)
    }
}

fn phase_of(store: &RegionStore, id: RegionId) -> Result<Phase, LifecycleError> {
    store
        .get(id)
        .map(|r| r.phase)
        .ok_or(LifecycleError::NotFound(id))
}

fn invalid(region: RegionId, phase: Phase, action: &'static str) -> LifecycleError {
    LifecycleError::InvalidTransition {
        region,
        phase,
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegen::ScriptedClient;
    use region::CanvasRect;
    use sandbox::{FrameClock, NullBackend};
    use script::{CODE_MARKER, EXPLANATION_MARKER};

    const SQUARE: &str = r#"[{"op": "rect", "left": 0, "top": 0, "width": 50, "height": 50, "style": {"fill": "red"}}]"#;

    struct Fixture {
        client: Rc<ScriptedClient>,
        lifecycle: RegionLifecycleController,
        store: RegionStore,
        sandbox: ExecutionSandbox<FrameClock>,
        id: RegionId,
    }

    fn fixture() -> Fixture {
        let client = Rc::new(ScriptedClient::new());
        let lifecycle = RegionLifecycleController::new(client.clone(), ResponseParser::default());
        let mut store = RegionStore::new();
        let id = store
            .create(CanvasRect::from_xywh(0.0, 0.0, 200.0, 200.0))
            .unwrap();
        Fixture {
            client,
            lifecycle,
            store,
            sandbox: ExecutionSandbox::new(FrameClock::new(), Box::new(NullBackend)),
            id,
        }
    }

    fn delimited(code: &str) -> String {
        format!("{}\n{}\n{}\nA square.", CODE_MARKER, code, EXPLANATION_MARKER)
    }

    impl Fixture {
        fn submit(&mut self, prompt: &str) -> Completion {
            self.lifecycle
                .set_prompt(self.id, prompt, &mut self.store)
                .unwrap();
            let pending = self
                .lifecycle
                .begin_submit(self.id, &mut self.store)
                .unwrap()
                .unwrap();
            let response = smol::block_on(pending.resolve());
            self.lifecycle
                .complete_generation(response, &mut self.store, &mut self.sandbox)
        }

        fn phase(&self) -> Phase {
            self.store.get(self.id).unwrap().phase
        }
    }

    #[test]
    fn test_submit_renders() {
        let mut f = fixture();
        f.client.push_response(delimited(SQUARE));
        let completion = f.submit("draw a red square");
        assert!(matches!(completion, Completion::Rendered(_)));
        assert_eq!(f.phase(), Phase::Rendering);
        let region = f.store.get(f.id).unwrap();
        assert_eq!(region.program.as_ref().unwrap().explanation(), Some("A square."));
        assert!(f.sandbox.is_attached(f.id));
        assert_eq!(f.client.requests()[0].prompt, "draw a red square");
    }

    // The collaborator answers with an empty code section.
    #[test]
    fn test_empty_code_section_fails_to_error() {
        let mut f = fixture();
        f.client
            .push_response(format!("{}\n\n{}\nnothing", CODE_MARKER, EXPLANATION_MARKER));
        let completion = f.submit("draw a red square");

        let Completion::Failed(failure) = completion else {
            panic!("expected a failure, got {:?}", completion);
        };
        assert_eq!(failure.kind(), crate::FailureKind::MalformedResponse);
        let region = f.store.get(f.id).unwrap();
        assert_eq!(region.phase, Phase::Error);
        assert!(region.program.is_none());
        assert!(region.last_error.as_ref().unwrap().contains("malformed"));
        assert!(!f.sandbox.is_attached(f.id));
    }

    #[test]
    fn test_failure_keeps_previous_program() {
        let mut f = fixture();
        f.client.push_response(delimited(SQUARE));
        f.submit("square");
        let first = f.store.get(f.id).unwrap().program.clone().unwrap();

        f.client.push_failure("rate limited");
        let pending = f
            .lifecycle
            .regenerate(f.id, &mut f.store, &mut f.sandbox)
            .unwrap()
            .unwrap();
        let response = smol::block_on(pending.resolve());
        let completion = f
            .lifecycle
            .complete_generation(response, &mut f.store, &mut f.sandbox);
        assert!(matches!(completion, Completion::Failed(RegionFailure::Unavailable(_))));

        let region = f.store.get(f.id).unwrap();
        assert_eq!(region.phase, Phase::Error);
        assert!(Arc::ptr_eq(region.program.as_ref().unwrap(), &first));
    }

    #[test]
    fn test_edit_then_cancel_restores() {
        let mut f = fixture();
        f.client.push_response(delimited(SQUARE));
        f.submit("square");
        let program = f.store.get(f.id).unwrap().program.clone().unwrap();

        f.lifecycle.edit(f.id, &mut f.store, &mut f.sandbox).unwrap();
        assert_eq!(f.phase(), Phase::Editing);
        assert!(!f.sandbox.is_attached(f.id));
        f.lifecycle
            .set_prompt(f.id, "something else entirely", &mut f.store)
            .unwrap();

        let completion = f.lifecycle.cancel(f.id, &mut f.store, &mut f.sandbox).unwrap();
        assert!(matches!(completion, Some(Completion::Rendered(_))));
        let region = f.store.get(f.id).unwrap();
        assert_eq!(region.phase, Phase::Rendering);
        assert_eq!(region.prompt, "square");
        assert!(Arc::ptr_eq(region.program.as_ref().unwrap(), &program));
        assert!(f.sandbox.is_attached(f.id));
    }

    #[test]
    fn test_cancel_while_generating_discards_response() {
        let mut f = fixture();
        f.client.push_response(delimited(SQUARE));
        f.lifecycle.set_prompt(f.id, "square", &mut f.store).unwrap();
        let pending = f.lifecycle.begin_submit(f.id, &mut f.store).unwrap().unwrap();
        assert_eq!(f.phase(), Phase::Generating);

        f.lifecycle.cancel(f.id, &mut f.store, &mut f.sandbox).unwrap();
        assert_eq!(f.phase(), Phase::Editing);

        let response = smol::block_on(pending.resolve());
        let completion = f
            .lifecycle
            .complete_generation(response, &mut f.store, &mut f.sandbox);
        assert_eq!(completion, Completion::Discarded);
        assert_eq!(f.phase(), Phase::Editing);
        assert!(f.store.get(f.id).unwrap().program.is_none());
    }

    #[test]
    fn test_cancel_after_failure_restores_prompt_verbatim() {
        let mut f = fixture();
        f.client.push_failure("rate limited");
        let completion = f.submit("  draw a red square\n");
        assert!(matches!(completion, Completion::Failed(_)));
        assert_eq!(f.phase(), Phase::Error);
        assert_eq!(f.client.requests()[0].prompt, "draw a red square");

        f.lifecycle
            .set_prompt(f.id, "half-typed edit", &mut f.store)
            .unwrap();
        f.lifecycle.cancel(f.id, &mut f.store, &mut f.sandbox).unwrap();
        assert_eq!(f.store.get(f.id).unwrap().prompt, "  draw a red square\n");
        assert_eq!(f.phase(), Phase::Editing);
    }

    #[test]
    fn test_blank_prompt_is_ignored() {
        let mut f = fixture();
        f.lifecycle.set_prompt(f.id, "   ", &mut f.store).unwrap();
        assert!(f.lifecycle.begin_submit(f.id, &mut f.store).unwrap().is_none());
        assert_eq!(f.phase(), Phase::Editing);
        assert!(f.client.requests().is_empty());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut f = fixture();
        assert!(matches!(
            f.lifecycle.cancel(RegionId::new(), &mut f.store, &mut f.sandbox),
            Err(LifecycleError::NotFound(_))
        ));

        f.client.push_response(delimited(SQUARE));
        f.submit("square");
        assert!(matches!(
            f.lifecycle.begin_submit(f.id, &mut f.store),
            Err(LifecycleError::InvalidTransition { .. })
        ));
        assert!(f.lifecycle.set_prompt(f.id, "x", &mut f.store).is_err());
    }

    #[test]
    fn test_unsafe_program_is_rejected() {
        let mut f = fixture();
        f.client
            .push_response(delimited(r#"[{"op": "let", "name": "x", "value": "document.cookie"}]"#));
        let completion = f.submit("steal cookies");
        let Completion::Failed(failure) = completion else {
            panic!("expected a failure, got {:?}", completion);
        };
        assert_eq!(failure.kind(), crate::FailureKind::UnsafeOrEmptyProgram);
    }
}
