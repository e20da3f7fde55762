//! The prompt canvas workspace.
//!
//! Ties the region store, gesture controllers, execution sandbox and code
//! generator together behind [`Workspace`], and exposes it as a serde
//! [`Command`]/[`Query`] language.

pub mod command;
mod config;
mod error;
mod executor;
mod lifecycle;
pub mod query;
mod workspace;

pub use command::{Command, CommandResult, RegionTarget};
pub use config::{ConfigError, WorkspaceConfig};
pub use error::{FailureKind, LifecycleError, RegionFailure};
pub use executor::{execute_command, execute_query, resolve_target};
pub use lifecycle::{
    Completion, GenerationResponse, GenerationTicket, PendingGeneration, RegionLifecycleController,
};
pub use query::{Query, QueryResult, RegionInfo};
pub use workspace::{
    regenerate_prompt, submit_prompt, PointerRelease, PointerTarget, Sandbox, Workspace,
};
