//! The interpreter that runs drawing programs against an attachment.

use crate::backend::RenderBackend;
use crate::frame::{FrameCallback, FrameHost};
use crate::sandbox::{Attachment, ExecutionLimits};
use crate::surface::{Shape, ShapeStyle};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::Rng;
use script::{Env, EvalError, Expr, Instruction, PointSource, Style};

/// Why a running program was stopped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("program exceeded {0} steps")]
    StepLimit(u64),
    #[error("repeat count {count} exceeds the limit of {max}")]
    RepeatLimit { count: f64, max: u64 },
    #[error("program drew more than {0} shapes")]
    ShapeLimit(usize),
    #[error("no shape named '{0}' is on the surface")]
    UnknownShape(String),
    #[error("cannot set field on '{name}': {message}")]
    Field { name: String, message: String },
}

/// Counters gathered while running one block.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Tally {
    pub steps: u64,
    pub renders: usize,
}

pub(crate) struct Machine<'a> {
    state: &'a mut Attachment,
    host: &'a mut dyn FrameHost,
    backend: &'a mut dyn RenderBackend,
    rng: &'a mut StdRng,
    limits: ExecutionLimits,
    time_ms: f64,
    tally: Tally,
}

impl<'a> Machine<'a> {
    pub fn new(
        state: &'a mut Attachment,
        host: &'a mut dyn FrameHost,
        backend: &'a mut dyn RenderBackend,
        rng: &'a mut StdRng,
        limits: ExecutionLimits,
    ) -> Self {
        Self {
            state,
            host,
            backend,
            rng,
            limits,
            time_ms: 0.0,
            tally: Tally::default(),
        }
    }

    /// Milliseconds since the attachment was created, exposed as `time`.
    pub fn at_time(mut self, time_ms: f64) -> Self {
        self.time_ms = time_ms;
        self
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn run(&mut self, block: &[Instruction]) -> Result<(), RuntimeError> {
        for instruction in block {
            self.step()?;
            self.exec(instruction)?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), RuntimeError> {
        self.tally.steps += 1;
        if self.tally.steps > self.limits.max_steps {
            return Err(RuntimeError::StepLimit(self.limits.max_steps));
        }
        Ok(())
    }

    fn num(&mut self, expr: &Expr) -> Result<f32, RuntimeError> {
        Ok(expr.eval(self)? as f32)
    }

    fn exec(&mut self, instruction: &Instruction) -> Result<(), RuntimeError> {
        match instruction {
            Instruction::Let { name, value } => {
                let value = value.eval(self)?;
                self.state.vars.insert(name.clone(), value);
            }
            Instruction::Rect {
                name,
                left,
                top,
                width,
                height,
                style,
            } => {
                let shape = Shape::Rect {
                    left: self.num(left)?,
                    top: self.num(top)?,
                    width: self.num(width)?,
                    height: self.num(height)?,
                    style: self.style(style)?,
                };
                self.add(name, shape)?;
            }
            Instruction::Ellipse {
                name,
                left,
                top,
                width,
                height,
                style,
            } => {
                let shape = Shape::Ellipse {
                    left: self.num(left)?,
                    top: self.num(top)?,
                    width: self.num(width)?,
                    height: self.num(height)?,
                    style: self.style(style)?,
                };
                self.add(name, shape)?;
            }
            Instruction::Text {
                name,
                text,
                left,
                top,
                font_size,
                style,
            } => {
                let shape = Shape::Text {
                    text: text.render(self)?,
                    left: self.num(left)?,
                    top: self.num(top)?,
                    font_size: self.num(font_size)?,
                    style: self.style(style)?,
                };
                self.add(name, shape)?;
            }
            Instruction::Line {
                name,
                x1,
                y1,
                x2,
                y2,
                style,
            } => {
                let shape = Shape::Line {
                    x1: self.num(x1)?,
                    y1: self.num(y1)?,
                    x2: self.num(x2)?,
                    y2: self.num(y2)?,
                    style: self.style(style)?,
                };
                self.add(name, shape)?;
            }
            Instruction::Polyline {
                name,
                points,
                style,
            } => {
                let points = self.points(points)?;
                let shape = Shape::Polyline {
                    points,
                    style: self.style(style)?,
                };
                self.add(name, shape)?;
            }
            Instruction::Set {
                target,
                field,
                value,
            } => {
                let value = self.num(value)?;
                let shape = self
                    .state
                    .surface
                    .get_mut(target)
                    .ok_or_else(|| RuntimeError::UnknownShape(target.clone()))?;
                shape
                    .set_field(*field, value)
                    .map_err(|message| RuntimeError::Field {
                        name: target.clone(),
                        message,
                    })?;
            }
            Instruction::Remove { target } => {
                if !self.state.surface.remove(target) {
                    return Err(RuntimeError::UnknownShape(target.clone()));
                }
            }
            Instruction::Clear => self.state.surface.clear(),
            Instruction::Repeat { count, var, body } => {
                let count = self.count(count)?;
                let saved = self.state.vars.get(var).copied();
                for i in 0..count {
                    self.state.vars.insert(var.clone(), i as f64);
                    self.run(body)?;
                }
                self.restore(var, saved);
            }
            Instruction::If {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval(self)? != 0.0 {
                    self.run(then)?;
                } else {
                    self.run(otherwise)?;
                }
            }
            Instruction::Render => {
                let shapes = self.state.surface.shapes();
                self.backend
                    .present(self.state.region, self.state.surface.size(), &shapes);
                self.tally.renders += 1;
            }
            Instruction::ScheduleFrame => {
                if let Some(token) = self.state.pending_frame.take() {
                    self.host.cancel_frame(token);
                }
                let token = self.host.schedule_frame(FrameCallback {
                    region: self.state.region,
                    generation: self.state.generation,
                });
                self.state.pending_frame = Some(token);
            }
            Instruction::CancelFrame => {
                if let Some(token) = self.state.pending_frame.take() {
                    self.host.cancel_frame(token);
                }
            }
        }
        Ok(())
    }

    fn add(&mut self, name: &Option<String>, shape: Shape) -> Result<(), RuntimeError> {
        self.state.surface.add(name.clone(), shape);
        if self.state.surface.len() > self.limits.max_shapes {
            return Err(RuntimeError::ShapeLimit(self.limits.max_shapes));
        }
        Ok(())
    }

    fn style(&mut self, style: &Style) -> Result<ShapeStyle, RuntimeError> {
        let mut out = ShapeStyle {
            fill: style.fill.as_ref().and_then(|c| c.rgba()),
            stroke: style.stroke.as_ref().and_then(|c| c.rgba()),
            ..ShapeStyle::default()
        };
        if let Some(width) = &style.stroke_width {
            out.stroke_width = self.num(width)?.max(0.0);
        }
        Ok(out)
    }

    fn count(&mut self, count: &Expr) -> Result<u64, RuntimeError> {
        let value = count.eval(self)?.floor();
        if value > self.limits.max_repeat as f64 {
            return Err(RuntimeError::RepeatLimit {
                count: value,
                max: self.limits.max_repeat,
            });
        }
        Ok(value.max(0.0) as u64)
    }

    fn points(&mut self, points: &PointSource) -> Result<Vec<Vec2>, RuntimeError> {
        match points {
            PointSource::List(list) => list
                .iter()
                .map(|[x, y]| -> Result<Vec2, RuntimeError> {
                    Ok(Vec2::new(self.num(x)?, self.num(y)?))
                })
                .collect(),
            PointSource::Generated { count, var, x, y } => {
                let count = self.count(count)?;
                let saved = self.state.vars.get(var).copied();
                let mut out = Vec::with_capacity(count as usize);
                for i in 0..count {
                    self.step()?;
                    self.state.vars.insert(var.clone(), i as f64);
                    out.push(Vec2::new(self.num(x)?, self.num(y)?));
                }
                self.restore(var, saved);
                Ok(out)
            }
        }
    }

    fn restore(&mut self, var: &str, saved: Option<f64>) {
        match saved {
            Some(value) => {
                self.state.vars.insert(var.to_string(), value);
            }
            None => {
                self.state.vars.remove(var);
            }
        }
    }
}

impl Env for Machine<'_> {
    fn lookup(&self, name: &str) -> Option<f64> {
        if let Some(value) = self.state.vars.get(name) {
            return Some(*value);
        }
        let size = self.state.surface.size();
        match name {
            "width" => Some(size.width() as f64),
            "height" => Some(size.height() as f64),
            "frame" => Some(self.state.frames_run as f64),
            "time" => Some(self.time_ms),
            "pi" => Some(std::f64::consts::PI),
            _ => None,
        }
    }

    fn random(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}
