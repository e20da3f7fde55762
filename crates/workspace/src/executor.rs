//! Command and query execution against a [`Workspace`].

use crate::command::{Command, CommandResult, RegionTarget};
use crate::error::{LifecycleError, RegionFailure};
use crate::lifecycle::Completion;
use crate::query::{Query, QueryResult, RegionInfo};
use crate::workspace::{regenerate_prompt, submit_prompt, PointerRelease, Workspace};
use canvas::{DrawOutcome, PointerId};
use glam::Vec2;
use region::{CanvasPoint, CanvasRect, CanvasSize, RegionId, ScreenPoint};
use std::cell::RefCell;

/// Execute a command against a workspace.
///
/// Takes the workspace by `RefCell` because `submit` and `regenerate` await
/// the code generator; the borrow is released while they do.
pub async fn execute_command(workspace: &RefCell<Workspace>, command: Command) -> CommandResult {
    match command {
        Command::Submit { target } => {
            let Some(id) = resolve_target(&workspace.borrow(), &target) else {
                return no_region(&target);
            };
            completion_result(id, submit_prompt(workspace, id).await)
        }

        Command::Regenerate { target } => {
            let Some(id) = resolve_target(&workspace.borrow(), &target) else {
                return no_region(&target);
            };
            completion_result(id, regenerate_prompt(workspace, id).await)
        }

        Command::Batch { commands } => {
            let mut all_created = Vec::new();
            let mut all_modified = Vec::new();
            let mut all_deleted = Vec::new();

            for cmd in commands {
                match Box::pin(execute_command(workspace, cmd)).await {
                    CommandResult::Success {
                        created,
                        modified,
                        deleted,
                    } => {
                        all_created.extend(created);
                        all_modified.extend(modified);
                        all_deleted.extend(deleted);
                    }
                    CommandResult::Error { message, kind } => {
                        return CommandResult::Error {
                            message: format!("batch failed: {}", message),
                            kind,
                        };
                    }
                }
            }

            CommandResult::Success {
                created: all_created,
                modified: all_modified,
                deleted: all_deleted,
            }
        }

        command => execute_sync(&mut workspace.borrow_mut(), command),
    }
}

fn execute_sync(workspace: &mut Workspace, command: Command) -> CommandResult {
    match command {
        Command::CreateRegion { position, size } => {
            match workspace.create_region(CanvasRect::new(CanvasPoint(position), CanvasSize(size))) {
                Ok(id) => CommandResult::created(vec![id]),
                Err(e) => CommandResult::failure(&RegionFailure::from(e)),
            }
        }

        Command::Gesture { from, to, pointer } => {
            let pointer = PointerId(pointer);
            workspace.pointer_down(pointer, ScreenPoint(from));
            workspace.pointer_move(pointer, ScreenPoint(to));
            match workspace.pointer_up(pointer, ScreenPoint(to)) {
                PointerRelease::Drew(DrawOutcome::Created(id)) => CommandResult::created(vec![id]),
                PointerRelease::Drew(DrawOutcome::Rejected(e)) => {
                    CommandResult::failure(&RegionFailure::from(e))
                }
                PointerRelease::Drew(DrawOutcome::TooSmall) => {
                    CommandResult::error("gesture too short to draw a region")
                }
                PointerRelease::Moved(id) | PointerRelease::Resized(id) => {
                    CommandResult::modified(vec![id])
                }
                PointerRelease::Drew(DrawOutcome::NotDrawing) | PointerRelease::Nothing => {
                    CommandResult::success()
                }
            }
        }

        Command::Move { target, position } => {
            with_region(workspace, &target, |ws, id| {
                ws.move_region(id, CanvasPoint(position))?;
                Ok(CommandResult::modified(vec![id]))
            })
        }

        Command::Resize { target, size } => with_region(workspace, &target, |ws, id| {
            let completion = ws.resize_region(id, CanvasSize(size))?;
            Ok(completion_result(id, Ok(completion)))
        }),

        Command::Delete { target } => with_region(workspace, &target, |ws, id| {
            ws.delete(id)?;
            Ok(CommandResult::deleted(vec![id]))
        }),

        Command::SetPrompt { target, prompt } => with_region(workspace, &target, |ws, id| {
            ws.set_prompt(id, prompt)?;
            Ok(CommandResult::modified(vec![id]))
        }),

        Command::Edit { target } => with_region(workspace, &target, |ws, id| {
            ws.edit(id)?;
            Ok(CommandResult::modified(vec![id]))
        }),

        Command::Cancel { target } => with_region(workspace, &target, |ws, id| {
            let completion = ws.cancel(id)?;
            Ok(completion_result(id, Ok(completion)))
        }),

        Command::AdvanceFrames { count, dt_ms } => {
            let mut touched: Vec<RegionId> = Vec::new();
            for _ in 0..count {
                for (id, _) in workspace.advance_frames(dt_ms) {
                    if !touched.contains(&id) {
                        touched.push(id);
                    }
                }
            }
            CommandResult::modified(touched)
        }

        Command::Pan { delta } => {
            workspace.viewport_mut().pan(delta);
            CommandResult::success()
        }

        Command::Zoom { factor, center } => {
            let center = center.unwrap_or(Vec2::ZERO);
            workspace
                .viewport_mut()
                .zoom_at(ScreenPoint(center), factor);
            CommandResult::success()
        }

        Command::ResetView => {
            workspace.viewport_mut().reset();
            CommandResult::success()
        }

        // Awaiting commands are routed by `execute_command`.
        Command::Submit { .. } | Command::Regenerate { .. } | Command::Batch { .. } => {
            CommandResult::error("command must be executed asynchronously")
        }
    }
}

/// Execute a query against a workspace.
pub fn execute_query(workspace: &Workspace, query: Query) -> QueryResult {
    match query {
        Query::ListRegions => QueryResult::Regions {
            regions: workspace.list().iter().map(RegionInfo::from).collect(),
        },

        Query::GetRegion { target } => QueryResult::Region {
            region: resolve_target(workspace, &target)
                .and_then(|id| workspace.get(id))
                .map(RegionInfo::from),
        },

        Query::GetProgram { target } => {
            let Some(region) = resolve_target(workspace, &target).and_then(|id| workspace.get(id))
            else {
                return QueryResult::Error {
                    message: no_region_message(&target),
                };
            };
            QueryResult::Program {
                region: region.id,
                program: region.program.as_ref().map(|p| p.unit().clone()),
                explanation: region
                    .program
                    .as_ref()
                    .and_then(|p| p.explanation())
                    .map(str::to_string),
            }
        }

        Query::GetSurface { target } => {
            let Some(id) = resolve_target(workspace, &target) else {
                return QueryResult::Error {
                    message: no_region_message(&target),
                };
            };
            match workspace.sandbox().surface(id) {
                Some(surface) => QueryResult::Surface {
                    region: id,
                    size: surface.size().0,
                    shapes: surface.shapes(),
                },
                None => QueryResult::Error {
                    message: format!("region {} has no surface", id),
                },
            }
        }

        Query::GetViewport => QueryResult::Viewport {
            offset: workspace.viewport().offset,
            zoom: workspace.viewport().zoom,
        },

        Query::GetRegionCount => QueryResult::Count {
            count: workspace.list().len(),
        },

        Query::GetPendingFrames => QueryResult::Count {
            count: workspace.sandbox().host().pending_count(),
        },
    }
}

/// Resolve a target to a region id, if one matches.
pub fn resolve_target(workspace: &Workspace, target: &RegionTarget) -> Option<RegionId> {
    match target {
        RegionTarget::Last => workspace.list().last().map(|r| r.id),
        RegionTarget::Index(index) => workspace.list().get(*index).map(|r| r.id),
        RegionTarget::Id(id) => workspace.store().find_by_str(id),
        RegionTarget::At(point) => workspace.store().region_at(CanvasPoint(*point)),
    }
}

fn with_region(
    workspace: &mut Workspace,
    target: &RegionTarget,
    f: impl FnOnce(&mut Workspace, RegionId) -> Result<CommandResult, LifecycleError>,
) -> CommandResult {
    let Some(id) = resolve_target(workspace, target) else {
        return no_region(target);
    };
    f(workspace, id).unwrap_or_else(|e| CommandResult::error(e.to_string()))
}

fn completion_result(
    id: RegionId,
    completion: Result<Option<Completion>, LifecycleError>,
) -> CommandResult {
    match completion {
        Ok(Some(Completion::Failed(failure))) => CommandResult::failure(&failure),
        Ok(Some(Completion::Rendered(_))) | Ok(None) => CommandResult::modified(vec![id]),
        Ok(Some(Completion::Discarded)) => CommandResult::success(),
        Err(e) => CommandResult::error(e.to_string()),
    }
}

fn no_region(target: &RegionTarget) -> CommandResult {
    CommandResult::error(no_region_message(target))
}

fn no_region_message(target: &RegionTarget) -> String {
    format!("no region matches {:?}", target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceConfig;
    use crate::error::FailureKind;
    use codegen::ScriptedClient;
    use region::Phase;
    use sandbox::NullBackend;
    use script::{CODE_MARKER, EXPLANATION_MARKER};
    use std::rc::Rc;

    const SQUARE: &str = r#"[
        {"op": "rect", "left": 0, "top": 0, "width": "width", "height": "height", "style": {"fill": "red"}},
        {"op": "render"}
    ]"#;

    fn workspace() -> (RefCell<Workspace>, Rc<ScriptedClient>) {
        let client = Rc::new(ScriptedClient::new());
        let ws = Workspace::new(WorkspaceConfig::default(), client.clone(), Box::new(NullBackend));
        (RefCell::new(ws), client)
    }

    fn run(ws: &RefCell<Workspace>, json: &str) -> CommandResult {
        let command: Command = serde_json::from_str(json).unwrap();
        smol::block_on(execute_command(ws, command))
    }

    #[test]
    fn test_overlapping_create_is_rejected() {
        let (ws, _client) = workspace();
        let first = run(
            &ws,
            r#"{"type": "create_region", "position": [0, 0], "size": [200, 200]}"#,
        );
        assert!(first.is_success());

        let second = run(
            &ws,
            r#"{"type": "create_region", "position": [100, 100], "size": [200, 200]}"#,
        );
        assert!(matches!(
            second,
            CommandResult::Error {
                kind: Some(FailureKind::OverlapRejected),
                ..
            }
        ));
        assert_eq!(ws.borrow().list().len(), 1);
    }

    #[test]
    fn test_prompt_to_surface() {
        let (ws, client) = workspace();
        client.push_response(format!(
            "{}\n{}\n{}\nA red square.",
            CODE_MARKER, SQUARE, EXPLANATION_MARKER
        ));

        run(&ws, r#"{"type": "gesture", "from": [50, 50], "to": [250, 200]}"#);
        run(&ws, r#"{"type": "set_prompt", "prompt": "a red square"}"#);
        let result = run(&ws, r#"{"type": "submit"}"#);
        assert!(result.is_success());
        assert_eq!(client.requests()[0].prompt, "a red square");

        let ws = ws.borrow();
        let QueryResult::Surface { size, shapes, .. } =
            execute_query(&ws, Query::GetSurface { target: RegionTarget::Last })
        else {
            panic!("expected a surface");
        };
        assert_eq!(size, Vec2::new(200.0, 150.0));
        assert_eq!(shapes.len(), 1);

        let QueryResult::Program { explanation, .. } =
            execute_query(&ws, Query::GetProgram { target: RegionTarget::Index(0) })
        else {
            panic!("expected a program");
        };
        assert_eq!(explanation.as_deref(), Some("A red square."));
    }

    #[test]
    fn test_collaborator_failure_is_reported() {
        let (ws, client) = workspace();
        client.push_failure("connection refused");
        run(
            &ws,
            r#"{"type": "create_region", "position": [0, 0], "size": [200, 200]}"#,
        );
        run(&ws, r#"{"type": "set_prompt", "prompt": "anything"}"#);

        let result = run(&ws, r#"{"type": "submit"}"#);
        assert!(matches!(
            result,
            CommandResult::Error {
                kind: Some(FailureKind::CollaboratorUnavailable),
                ..
            }
        ));
        let ws = ws.borrow();
        let region = &ws.list()[0];
        assert_eq!(region.phase, Phase::Error);
        assert!(region.last_error.as_deref().unwrap().contains("connection refused"));
    }

    #[test]
    fn test_batch_stops_at_first_error() {
        let (ws, _client) = workspace();
        let result = run(
            &ws,
            r#"{"type": "batch", "commands": [
                {"type": "create_region", "position": [0, 0], "size": [100, 100]},
                {"type": "edit", "target": {"id": "ffffffff"}},
                {"type": "create_region", "position": [500, 0], "size": [100, 100]}
            ]}"#,
        );
        match result {
            CommandResult::Error { message, kind } => {
                assert!(message.starts_with("batch failed"));
                assert_eq!(kind, None);
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(ws.borrow().list().len(), 1);
    }

    #[test]
    fn test_targets_resolve() {
        let (ws, _client) = workspace();
        run(
            &ws,
            r#"{"type": "create_region", "position": [0, 0], "size": [100, 100]}"#,
        );
        run(
            &ws,
            r#"{"type": "create_region", "position": [200, 0], "size": [100, 100]}"#,
        );

        let ws = ws.borrow();
        let first = ws.list()[0].id;
        let second = ws.list()[1].id;
        assert_eq!(resolve_target(&ws, &RegionTarget::Last), Some(second));
        assert_eq!(resolve_target(&ws, &RegionTarget::Index(0)), Some(first));
        assert_eq!(resolve_target(&ws, &RegionTarget::Id(first.to_string())), Some(first));
        assert_eq!(
            resolve_target(&ws, &RegionTarget::At(Vec2::new(250.0, 50.0))),
            Some(second)
        );
        assert_eq!(resolve_target(&ws, &RegionTarget::Index(5)), None);
    }

    #[test]
    fn test_delete_command() {
        let (ws, _client) = workspace();
        run(
            &ws,
            r#"{"type": "create_region", "position": [0, 0], "size": [100, 100]}"#,
        );
        let result = run(&ws, r#"{"type": "delete"}"#);
        assert!(matches!(result, CommandResult::Success { ref deleted, .. } if deleted.len() == 1));
        assert!(!run(&ws, r#"{"type": "delete"}"#).is_success());
    }
}
