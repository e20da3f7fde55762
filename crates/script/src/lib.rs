//! The drawing-program language for prompt-driven canvas regions.
//!
//! A model answers a prompt with a program written in a small JSON
//! instruction language. This crate defines that language, extracts programs
//! from raw model responses and rejects anything that is malformed, unsafe or
//! empty before it reaches a sandbox.

mod color;
mod expr;
mod parser;
mod program;
mod template;
mod validate;

pub use color::{parse_color, ColorValue, Rgba};
pub use expr::{format_number, Env, EvalError, Expr, BUILTIN_VARS};
pub use parser::{
    ParseError, ResponseParser, ResponseProtocol, CODE_MARKER, DEFAULT_MAX_DEPTH,
    EXPLANATION_MARKER,
};
pub use program::{
    walk, GeneratedProgram, Instruction, PointSource, ProgramUnit, ShapeField, Style,
    CANONICAL_PARAMS,
};
pub use template::TextTemplate;
