//! Turning raw model responses into canonical programs.
//!
//! The response text is untrusted input. Extraction follows the response
//! protocol, decoding checks the JSON shape, validation checks structure, and
//! canonicalization fixes the parameter list and the trailing render.

use crate::program::{GeneratedProgram, Instruction, ProgramUnit};
use crate::validate::{canonicalize, validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

pub const CODE_MARKER: &str = "---CODE---";
pub const EXPLANATION_MARKER: &str = "---EXPLANATION---";

/// Default limit on nested `repeat`/`if` blocks.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Why a response was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The response does not follow the protocol or is not a program at all.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The program decodes but is structurally unsafe or has nothing to run.
    #[error("unsafe or empty program: {0}")]
    UnsafeOrEmptyProgram(String),
}

/// How the code section is located in a response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseProtocol {
    /// Code between `---CODE---` and `---EXPLANATION---`.
    Delimited,
    /// The whole response is the program.
    Bare,
    /// Delimited when the code marker is present, bare otherwise.
    #[default]
    Auto,
}

#[derive(Clone, Debug)]
pub struct ResponseParser {
    protocol: ResponseProtocol,
    max_depth: usize,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(ResponseProtocol::Auto)
    }
}

impl ResponseParser {
    pub fn new(protocol: ResponseProtocol) -> Self {
        Self {
            protocol,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn protocol(&self) -> ResponseProtocol {
        self.protocol
    }

    /// Parse, validate and canonicalize a raw response.
    pub fn parse(&self, raw: &str) -> Result<GeneratedProgram, ParseError> {
        let (code, explanation) = self.extract(raw)?;
        let unit = decode(code)?;
        validate(&unit, self.max_depth).map_err(ParseError::UnsafeOrEmptyProgram)?;
        let program = GeneratedProgram::new(canonicalize(unit), explanation);
        log::debug!(
            "accepted program: {} setup / {} frame instructions",
            program.setup().len(),
            program.frame().len()
        );
        Ok(program)
    }

    fn extract<'a>(&self, raw: &'a str) -> Result<(&'a str, Option<String>), ParseError> {
        let delimited = match self.protocol {
            ResponseProtocol::Delimited => true,
            ResponseProtocol::Bare => false,
            ResponseProtocol::Auto => raw.contains(CODE_MARKER),
        };

        let (code, explanation) = if delimited {
            let start = raw.find(CODE_MARKER).ok_or_else(|| {
                ParseError::MalformedResponse(format!("missing {} marker", CODE_MARKER))
            })?;
            let after = &raw[start + CODE_MARKER.len()..];
            let end = after.find(EXPLANATION_MARKER).ok_or_else(|| {
                ParseError::MalformedResponse(format!("missing {} marker", EXPLANATION_MARKER))
            })?;
            let explanation = after[end + EXPLANATION_MARKER.len()..].trim();
            (
                &after[..end],
                (!explanation.is_empty()).then(|| explanation.to_string()),
            )
        } else {
            (raw, None)
        };

        let code = strip_code_fence(code.trim()).trim();
        if code.is_empty() {
            return Err(ParseError::MalformedResponse(if delimited {
                "empty code section".into()
            } else {
                "empty response".into()
            }));
        }
        Ok((code, explanation))
    }
}

fn empty_call_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?:""|'')\s*\(|\(\s*(?:""|'')\s*\)"#).expect("empty-call pattern is valid")
    })
}

fn code_fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)\A```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```\z")
            .expect("code-fence pattern is valid")
    })
}

/// Models like to wrap code in Markdown fences even when told not to.
fn strip_code_fence(code: &str) -> &str {
    code_fence_pattern()
        .captures(code)
        .and_then(|captures| captures.get(1))
        .map_or(code, |inner| inner.as_str())
}

fn decode(code: &str) -> Result<ProgramUnit, ParseError> {
    let value: Value = serde_json::from_str(code).map_err(|e| {
        if empty_call_pattern().is_match(code) {
            ParseError::UnsafeOrEmptyProgram("program invokes an empty string".into())
        } else {
            ParseError::MalformedResponse(format!("code section is not valid JSON: {}", e))
        }
    })?;

    let unsafe_program = |e: serde_json::Error| ParseError::UnsafeOrEmptyProgram(e.to_string());
    match value {
        Value::Array(_) => Ok(ProgramUnit {
            params: None,
            setup: serde_json::from_value::<Vec<Instruction>>(value).map_err(unsafe_program)?,
            frame: Vec::new(),
        }),
        Value::Object(ref map) if map.contains_key("op") => Ok(ProgramUnit {
            params: None,
            setup: vec![serde_json::from_value::<Instruction>(value).map_err(unsafe_program)?],
            frame: Vec::new(),
        }),
        Value::Object(_) => serde_json::from_value::<ProgramUnit>(value).map_err(unsafe_program),
        other => Err(ParseError::MalformedResponse(format!(
            "expected a program object or instruction list, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
