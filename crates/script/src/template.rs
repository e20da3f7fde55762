//! Text templates: literal text with `{expression}` interpolation.
//!
//! `"Q{i + 1}: {round(value)}"` renders each braced expression with
//! [`format_number`]. `{{` and `}}` produce literal braces.

use crate::expr::{format_number, Env, EvalError, Expr};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Debug)]
enum Part {
    Literal(String),
    Expr(Expr),
}

#[derive(Clone, Debug)]
pub struct TextTemplate {
    source: String,
    parts: Result<Vec<Part>, String>,
}

impl TextTemplate {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let parts = parse_parts(&source);
        Self { source, parts }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The first problem found in the template or in one of its expressions.
    pub fn error(&self) -> Option<String> {
        match &self.parts {
            Err(message) => Some(message.clone()),
            Ok(parts) => parts.iter().find_map(|part| match part {
                Part::Expr(expr) => expr
                    .error()
                    .map(|e| format!("in '{{{}}}': {}", expr.source(), e)),
                Part::Literal(_) => None,
            }),
        }
    }

    pub fn expressions(&self) -> Vec<&Expr> {
        match &self.parts {
            Ok(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Part::Expr(expr) => Some(expr),
                    Part::Literal(_) => None,
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn render(&self, env: &mut dyn Env) -> Result<String, EvalError> {
        let parts = self.parts.as_ref().map_err(|message| EvalError::Invalid {
            expr: self.source.clone(),
            message: message.clone(),
        })?;
        let mut out = String::new();
        for part in parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expr(expr) => out.push_str(&format_number(expr.eval(env)?)),
            }
        }
        Ok(out)
    }
}

fn parse_parts(source: &str) -> Result<Vec<Part>, String> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => inner.push(ch),
                        None => return Err("unclosed '{' in text".into()),
                    }
                }
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Expr(Expr::parse(inner)));
            }
            '}' => return Err("unmatched '}' in text".into()),
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    Ok(parts)
}

impl Serialize for TextTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for TextTemplate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => TextTemplate::parse(format_number(n)),
            Raw::Text(s) => TextTemplate::parse(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Env for Fixed {
        fn lookup(&self, name: &str) -> Option<f64> {
            (name == "i").then_some(2.0)
        }

        fn random(&mut self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_interpolation() {
        let template = TextTemplate::parse("Q{i + 1} of {i * 2.5}");
        assert_eq!(template.render(&mut Fixed).unwrap(), "Q3 of 5");
    }

    #[test]
    fn test_escaped_braces() {
        let template = TextTemplate::parse("{{literal}}");
        assert_eq!(template.render(&mut Fixed).unwrap(), "{literal}");
    }

    #[test]
    fn test_errors_surface() {
        assert!(TextTemplate::parse("open {i").error().is_some());
        assert!(TextTemplate::parse("bad {eval(1)}").error().is_some());
        assert!(TextTemplate::parse("plain").error().is_none());
    }
}
