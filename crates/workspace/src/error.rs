use canvas::OverlapRejected;
use codegen::CollaboratorUnavailable;
use region::{Phase, RegionId};
use sandbox::ExecutionFailed;
use script::ParseError;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Any failure that can happen to a region. All of them are caught at the
/// lifecycle boundary and surfaced on the region as its last error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionFailure {
    #[error(transparent)]
    Overlap(#[from] OverlapRejected),
    #[error(transparent)]
    Unavailable(#[from] CollaboratorUnavailable),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Execution(#[from] ExecutionFailed),
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    OverlapRejected,
    CollaboratorUnavailable,
    MalformedResponse,
    UnsafeOrEmptyProgram,
    ExecutionFailed,
}

impl RegionFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            RegionFailure::Overlap(_) => FailureKind::OverlapRejected,
            RegionFailure::Unavailable(_) => FailureKind::CollaboratorUnavailable,
            RegionFailure::Parse(ParseError::MalformedResponse(_)) => FailureKind::MalformedResponse,
            RegionFailure::Parse(ParseError::UnsafeOrEmptyProgram(_)) => {
                FailureKind::UnsafeOrEmptyProgram
            }
            RegionFailure::Execution(_) => FailureKind::ExecutionFailed,
        }
    }
}

/// A boundary call that does not apply to the region it names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("region {0} does not exist")]
    NotFound(RegionId),
    #[error("cannot {action} region {region} while it is {phase}")]
    InvalidTransition {
        region: RegionId,
        phase: Phase,
        action: &'static str,
    },
}
