//! The code-generation collaborator contract.
//!
//! The HTTP transport to a language model is outside this workspace. This
//! crate defines the narrow async trait the lifecycle controller calls, the
//! request shaping a transport would send, and in-process clients for replay
//! and tests.

mod client;
mod prompt;

pub use client::{
    CodegenClient, CodegenRequest, CollaboratorUnavailable, ReplayClient, ScriptedClient,
};
pub use prompt::{system_prompt, ChatMessage, ChatRequest, ChatRole, CodegenSettings};
