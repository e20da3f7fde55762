//! Shaping chat-completion requests for the code generator.

use script::{CODE_MARKER, EXPLANATION_MARKER};
use serde::{Deserialize, Serialize};

/// Model parameters for a chat-completion request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CodegenSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 1500,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// The body of a chat-completion call, ready for a transport to send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// The system prompt followed by the user's prompt.
    pub fn for_prompt(settings: &CodegenSettings, prompt: &str) -> Self {
        Self {
            model: settings.model.clone(),
            messages: vec![
                ChatMessage {
                    role: ChatRole::System,
                    content: system_prompt(),
                },
                ChatMessage {
                    role: ChatRole::User,
                    content: prompt.trim().to_string(),
                },
            ],
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Instructions that teach the model the drawing-program format.
pub fn system_prompt() -> String {
    format!(
        r#"You generate drawing programs for a canvas region. A program is JSON, never JavaScript.

RESPONSE FORMAT:
{code}
{{ "setup": [ ...instructions... ], "frame": [ ...instructions... ] }}
{explanation}
A short explanation of what the program draws.

PROGRAM:
- "setup" runs once. "frame" runs on every animation frame and is optional.
- Instructions are objects with an "op" field.
- Numbers may be JSON numbers or expression strings such as "width / 2 - 10".
- Expressions can use width, height, frame, time (ms since start), pi,
  variables you define, + - * / %, comparisons, && || !, and the functions
  sin cos tan abs floor ceil round sqrt min max pow clamp random.
- Text may interpolate expressions: "Value: {{round(x)}}".
- Colors are CSS names, hex codes, rgb()/rgba() or "transparent".

INSTRUCTIONS:
- {{"op": "let", "name": "x", "value": "width / 4"}}
- {{"op": "rect"|"ellipse", "name"?: "id", "left", "top", "width", "height", "style"?: {{"fill", "stroke", "stroke_width"}}}}
- {{"op": "text", "name"?: "id", "text": "...", "left", "top", "font_size"?, "style"?}}
- {{"op": "line", "x1", "y1", "x2", "y2", "style"?}}
- {{"op": "polyline", "points": [[x, y], ...] or {{"count", "var"?, "x", "y"}}, "style"?}}
- {{"op": "set", "target": "id", "field": "left|top|width|height|x1|y1|x2|y2|font_size|stroke_width", "value"}}
- {{"op": "remove", "target": "id"}}, {{"op": "clear"}}
- {{"op": "repeat", "count", "var"?: "i", "body": [...]}}
- {{"op": "if", "cond", "then": [...], "else"?: [...]}}
- {{"op": "render"}} flushes the surface.
- {{"op": "schedule_frame"}} runs "frame" on the next animation frame; {{"op": "cancel_frame"}} stops it.

RULES:
1. ALWAYS use width and height so the drawing fills the region.
2. ALWAYS end each body with {{"op": "render"}}.
3. To animate, call schedule_frame at the end of setup and at the end of frame.
4. NEVER reference anything that is not listed above.
5. Keep programs small and focused."#,
        code = CODE_MARKER,
        explanation = EXPLANATION_MARKER,
    )
}
