use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a region. Never reused within a workspace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionId(uuid::Uuid);

impl RegionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a full UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the full UUID string.
    pub fn to_uuid_string(&self) -> String {
        self.0.to_string()
    }

    /// Create a RegionId from a u128 (useful for tests).
    pub fn from_u128(value: u128) -> Self {
        Self(uuid::Uuid::from_u128(value))
    }

    /// Whether `s` is this id's full UUID or its short display form.
    pub fn matches(&self, s: &str) -> bool {
        let full = self.0.to_string();
        full == s || (s.len() >= 8 && full.starts_with(s))
    }
}

impl Default for RegionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}
