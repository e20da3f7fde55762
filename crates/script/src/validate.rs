//! Structural validation and canonicalization of decoded program units.

use crate::expr::{Expr, Func, BUILTIN_VARS};
use crate::program::{walk, Instruction, PointSource, ProgramUnit, CANONICAL_PARAMS};
use std::collections::HashSet;

/// Check a decoded unit. Errors are human-readable reasons for rejection.
pub(crate) fn validate(unit: &ProgramUnit, max_depth: usize) -> Result<(), String> {
    if let Some(params) = &unit.params {
        check_params(params)?;
    }

    if !executes_something(unit) {
        return Err("program has nothing to execute".into());
    }

    let mut bound: HashSet<&str> = HashSet::new();
    let mut shapes: HashSet<&str> = HashSet::new();
    let mut deepest = 0;
    let mut schedules_frames = false;

    for block in [&unit.setup, &unit.frame] {
        let mut problem: Option<String> = None;
        walk(block, 0, &mut |instruction, depth| {
            deepest = deepest.max(depth);
            if matches!(instruction, Instruction::ScheduleFrame) {
                schedules_frames = true;
            }
            if let Some(name) = instruction.shape_name() {
                shapes.insert(name);
            }
            let binding = match instruction {
                Instruction::Let { name, .. } => Some(name.as_str()),
                Instruction::Repeat { var, .. } => Some(var.as_str()),
                Instruction::Polyline {
                    points: PointSource::Generated { var, .. },
                    ..
                } => Some(var.as_str()),
                _ => None,
            };
            if let Some(name) = binding {
                if problem.is_none() {
                    problem = check_binding_name(name).err();
                }
                bound.insert(name);
            }
        });
        if let Some(problem) = problem {
            return Err(problem);
        }
    }

    if deepest > max_depth {
        return Err(format!("instructions are nested deeper than {}", max_depth));
    }
    if schedules_frames && unit.frame.is_empty() {
        return Err("schedule_frame is used but the program has no frame body".into());
    }

    for block in [&unit.setup, &unit.frame] {
        let mut problem: Option<String> = None;
        walk(block, 0, &mut |instruction, _| {
            if problem.is_none() {
                problem = check_instruction(instruction, &bound, &shapes).err();
            }
        });
        if let Some(problem) = problem {
            return Err(problem);
        }
    }

    Ok(())
}

fn check_params(params: &[String]) -> Result<(), String> {
    if params.len() < 3 || params.len() > CANONICAL_PARAMS.len() {
        return Err(format!(
            "program must take between 3 and {} parameters, declares {}",
            CANONICAL_PARAMS.len(),
            params.len()
        ));
    }
    for (index, (declared, expected)) in params.iter().zip(CANONICAL_PARAMS).enumerate() {
        let aliased = index == 0 && declared == "canvas";
        if declared != expected && !aliased {
            return Err(format!(
                "unexpected parameter '{}' at position {} (expected '{}')",
                declared,
                index + 1,
                expected
            ));
        }
    }
    Ok(())
}

/// True when running the program can put something on the surface.
fn executes_something(unit: &ProgramUnit) -> bool {
    let has_work = |block: &[Instruction]| {
        let mut found = false;
        walk(block, 0, &mut |instruction, _| found |= !instruction.is_control());
        found
    };
    let mut starts_frames = false;
    walk(&unit.setup, 0, &mut |instruction, _| {
        starts_frames |= matches!(instruction, Instruction::ScheduleFrame)
    });
    has_work(&unit.setup[..]) || (starts_frames && has_work(&unit.frame[..]))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_binding_name(name: &str) -> Result<(), String> {
    if !is_identifier(name) {
        return Err(format!("'{}' is not a valid variable name", name));
    }
    if BUILTIN_VARS.contains(&name)
        || CANONICAL_PARAMS.contains(&name)
        || Func::from_name(name).is_some()
    {
        return Err(format!("'{}' is reserved and cannot be assigned", name));
    }
    Ok(())
}

fn check_expr(expr: &Expr, bound: &HashSet<&str>) -> Result<(), String> {
    if let Some(error) = expr.error() {
        return Err(format!("invalid expression '{}': {}", expr.source(), error));
    }
    for name in expr.variables() {
        if BUILTIN_VARS.contains(&name) || bound.contains(name) {
            continue;
        }
        if CANONICAL_PARAMS.contains(&name) {
            return Err(format!("'{}' is not a number", name));
        }
        return Err(format!("unknown identifier '{}' in '{}'", name, expr.source()));
    }
    Ok(())
}

fn check_instruction(
    instruction: &Instruction,
    bound: &HashSet<&str>,
    shapes: &HashSet<&str>,
) -> Result<(), String> {
    for expr in instruction.expressions() {
        check_expr(expr, bound)?;
    }

    if let Instruction::Text { text, .. } = instruction {
        if let Some(error) = text.error() {
            return Err(format!("invalid text '{}': {}", text.source(), error));
        }
        for expr in text.expressions() {
            check_expr(expr, bound)?;
        }
    }

    if let Some(style) = instruction.style() {
        for color in [&style.fill, &style.stroke].into_iter().flatten() {
            if let Some(error) = color.error() {
                return Err(error.to_string());
            }
        }
    }

    match instruction {
        Instruction::Set { target, .. } | Instruction::Remove { target } => {
            if !shapes.contains(target.as_str()) {
                return Err(format!("no shape is named '{}'", target));
            }
        }
        Instruction::Rect { name, .. }
        | Instruction::Ellipse { name, .. }
        | Instruction::Text { name, .. }
        | Instruction::Line { name, .. }
        | Instruction::Polyline { name, .. } => {
            if let Some(name) = name {
                if name.trim().is_empty() {
                    return Err("shape names cannot be empty".into());
                }
            }
        }
        _ => {}
    }

    Ok(())
}

/// Bring a validated unit into canonical form: the full parameter list and a
/// trailing render in every non-empty body.
pub(crate) fn canonicalize(mut unit: ProgramUnit) -> ProgramUnit {
    unit.params = Some(CANONICAL_PARAMS.iter().map(|p| p.to_string()).collect());
    ensure_trailing_render(&mut unit.setup);
    if !unit.frame.is_empty() {
        ensure_trailing_render(&mut unit.frame);
    }
    unit
}

/// Frame-control instructions may follow the final render, the way an
/// animation callback renders and then requests its next frame.
fn ensure_trailing_render(block: &mut Vec<Instruction>) {
    let split = block
        .iter()
        .rposition(|instruction| !instruction.is_frame_control())
        .map_or(0, |index| index + 1);
    if split > 0 && matches!(block[split - 1], Instruction::Render) {
        return;
    }
    block.insert(split, Instruction::Render);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(json: &str) -> ProgramUnit {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_params_prefix_and_alias() {
        assert!(check_params(&["canvas".into(), "width".into(), "height".into()]).is_ok());
        assert!(check_params(&["surface".into(), "w".into(), "h".into()]).is_err());
        assert!(check_params(&["surface".into()]).is_err());
    }

    #[test]
    fn test_rejects_control_only_program() {
        let u = unit(r#"{"setup": [{"op": "render"}, {"op": "cancel_frame"}]}"#);
        assert_eq!(validate(&u, 16).unwrap_err(), "program has nothing to execute");
    }

    #[test]
    fn test_rejects_frame_body_that_never_starts() {
        let u = unit(r#"{"setup": [], "frame": [{"op": "clear"}]}"#);
        assert!(validate(&u, 16).is_err());
    }

    #[test]
    fn test_rejects_ambient_identifiers() {
        let u = unit(r#"{"setup": [{"op": "let", "name": "x", "value": "window + 1"}]}"#);
        assert!(validate(&u, 16).unwrap_err().contains("unknown identifier 'window'"));

        let u = unit(r#"{"setup": [{"op": "let", "name": "x", "value": "draw * 2"}]}"#);
        assert_eq!(validate(&u, 16).unwrap_err(), "'draw' is not a number");
    }

    #[test]
    fn test_rejects_reserved_bindings() {
        let u = unit(r#"{"setup": [{"op": "let", "name": "width", "value": 1}]}"#);
        assert!(validate(&u, 16).unwrap_err().contains("reserved"));
    }

    #[test]
    fn test_rejects_unknown_shape_target() {
        let u = unit(r#"{"setup": [{"op": "set", "target": "ghost", "field": "top", "value": 1}]}"#);
        assert!(validate(&u, 16).unwrap_err().contains("ghost"));
    }

    #[test]
    fn test_rejects_schedule_without_frame_body() {
        let u = unit(r#"{"setup": [{"op": "clear"}, {"op": "schedule_frame"}]}"#);
        assert!(validate(&u, 16).unwrap_err().contains("no frame body"));
    }

    #[test]
    fn test_rejects_deep_nesting() {
        let mut json = String::from(r#"{"op": "clear"}"#);
        for _ in 0..5 {
            json = format!(r#"{{"op": "repeat", "count": 1, "body": [{}]}}"#, json);
        }
        let u = unit(&format!(r#"{{"setup": [{}]}}"#, json));
        assert!(validate(&u, 16).is_ok());
        assert!(validate(&u, 5).is_ok());
        let err = validate(&u, 4).unwrap_err();
        assert_eq!(err, "instructions are nested deeper than 4");
    }

    #[test]
    fn test_trailing_render_placement() {
        let u = unit(
            r#"{"setup": [{"op": "clear"}, {"op": "schedule_frame"}], "frame": [{"op": "clear"}, {"op": "render"}]}"#,
        );
        let canonical = canonicalize(u);
        assert!(matches!(canonical.setup[1], Instruction::Render));
        assert!(matches!(canonical.setup[2], Instruction::ScheduleFrame));
        assert_eq!(canonical.frame.len(), 2);
        assert_eq!(canonical.params.unwrap().len(), CANONICAL_PARAMS.len());
    }
}
