use codegen::CodegenSettings;
use sandbox::ExecutionLimits;
use script::ResponseProtocol;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for a workspace. Every field has a default, so a config file
/// only needs the values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Smallest width and height a region may have at rest.
    pub min_region_size: f32,
    /// Draw gestures shorter than this on either axis are treated as clicks.
    pub min_draw_distance: f32,
    /// Height of the drag strip and side of the resize grip.
    pub handle_size: f32,
    /// Seed for `random()` in programs. Unseeded workspaces draw from entropy.
    pub seed: Option<u64>,
    pub protocol: ResponseProtocol,
    pub limits: ExecutionLimits,
    pub codegen: CodegenSettings,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            min_region_size: 100.0,
            min_draw_distance: 4.0,
            handle_size: 20.0,
            seed: None,
            protocol: ResponseProtocol::default(),
            limits: ExecutionLimits::default(),
            codegen: CodegenSettings::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl WorkspaceConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = WorkspaceConfig::from_json(
            r#"{"min_region_size": 50, "protocol": "delimited", "limits": {"max_steps": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.min_region_size, 50.0);
        assert_eq!(config.protocol, ResponseProtocol::Delimited);
        assert_eq!(config.limits.max_steps, 10);
        assert_eq!(config.limits.max_repeat, 10_000);
        assert_eq!(config.handle_size, 20.0);
        assert_eq!(config.codegen.model, "gpt-4");
    }

    #[test]
    fn bad_config_is_an_error() {
        assert!(matches!(
            WorkspaceConfig::from_json(r#"{"protocol": "smoke-signals"}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
