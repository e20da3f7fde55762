//! Color values accepted by drawing programs.
//!
//! Programs write colors the way CSS does: named colors (`"red"`), hex codes
//! (`"#0F0"`, `"#ff8800"`), `rgb(...)`/`rgba(...)` or `"transparent"`.

use palette::Srgb;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An sRGB color with straight alpha.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0.0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 1.0);

    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_hex(&self) -> String {
        if self.a >= 1.0 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!(
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r,
                self.g,
                self.b,
                (self.a.clamp(0.0, 1.0) * 255.0).round() as u8
            )
        }
    }
}

impl From<Srgb<u8>> for Rgba {
    fn from(c: Srgb<u8>) -> Self {
        Self::new(c.red, c.green, c.blue, 1.0)
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Parse a CSS-style color string.
pub fn parse_color(input: &str) -> Result<Rgba, String> {
    let text = input.trim().to_ascii_lowercase();
    if text.is_empty() {
        return Err("empty color".into());
    }
    if text == "transparent" || text == "none" {
        return Ok(Rgba::TRANSPARENT);
    }
    if let Some(hex) = text.strip_prefix('#') {
        return Srgb::<u8>::from_str(hex)
            .map(Rgba::from)
            .map_err(|_| format!("invalid hex color '{}'", input));
    }
    if let Some(args) = text
        .strip_prefix("rgba(")
        .or_else(|| text.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_function(args).ok_or_else(|| format!("invalid color '{}'", input));
    }
    palette::named::from_str(&text)
        .map(Rgba::from)
        .ok_or_else(|| format!("unknown color '{}'", input))
}

fn parse_rgb_function(args: &str) -> Option<Rgba> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |s: &str| s.parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8);
    let alpha = match parts.get(3) {
        Some(a) => a.parse::<f32>().ok()?.clamp(0.0, 1.0),
        None => 1.0,
    };
    Some(Rgba::new(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        alpha,
    ))
}

/// A color as written in a program, with its parse result.
#[derive(Clone, Debug)]
pub struct ColorValue {
    source: String,
    parsed: Result<Rgba, String>,
}

impl ColorValue {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let parsed = parse_color(&source);
        Self { source, parsed }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn error(&self) -> Option<&str> {
        self.parsed.as_ref().err().map(String::as_str)
    }

    pub fn rgba(&self) -> Option<Rgba> {
        self.parsed.as_ref().ok().copied()
    }
}

impl Serialize for ColorValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for ColorValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(ColorValue::parse(String::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_and_hex() {
        assert_eq!(parse_color("red").unwrap(), Rgba::new(255, 0, 0, 1.0));
        assert_eq!(parse_color("#0F0").unwrap(), Rgba::new(0, 255, 0, 1.0));
        assert_eq!(parse_color("#336699").unwrap(), Rgba::new(0x33, 0x66, 0x99, 1.0));
    }

    #[test]
    fn test_rgb_functions() {
        assert_eq!(parse_color("rgb(10, 20, 30)").unwrap(), Rgba::new(10, 20, 30, 1.0));
        assert_eq!(
            parse_color("rgba(255,255,255,0.5)").unwrap(),
            Rgba::new(255, 255, 255, 0.5)
        );
        assert!(parse_color("rgb(1,2)").is_err());
    }

    #[test]
    fn test_transparent_and_unknown() {
        assert_eq!(parse_color("transparent").unwrap(), Rgba::TRANSPARENT);
        assert!(parse_color("not-a-color").is_err());
        assert!(parse_color("").is_err());
    }

    #[test]
    fn test_hex_output() {
        assert_eq!(Rgba::new(255, 0, 0, 1.0).to_hex(), "#ff0000");
        assert_eq!(Rgba::new(0, 0, 0, 0.0).to_hex(), "#00000000");
    }
}
