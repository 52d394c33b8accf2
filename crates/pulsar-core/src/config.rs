//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a scheduling pass dispatches cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// One cell at a time, in plan order.
    #[default]
    Linear,
    /// Cells of one dependency level run concurrently; commits stay serial.
    Parallel,
}

/// Configuration for a notebook engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Names starting with this prefix are private to their cell.
    pub local_prefix: String,
    /// Dispatch policy for synchronous passes.
    pub policy: ExecutionPolicy,
    /// Signal the abort handle of a pass when a newer pass supersedes it.
    pub cancel_superseded: bool,
    /// Capacity of the session event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_prefix: "_".to_string(),
            policy: ExecutionPolicy::Linear,
            cancel_superseded: true,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    ///
    /// Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Use the given dispatch policy.
    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.local_prefix.is_empty() {
            return Err(Error::Config(
                "local_prefix must not be empty (every name would be local)".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Whether a name is cell-local under this configuration.
    pub fn is_local(&self, name: &str) -> bool {
        name.starts_with(&self.local_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.local_prefix, "_");
        assert_eq!(config.policy, ExecutionPolicy::Linear);
        assert!(config.cancel_superseded);
        assert!(config.is_local("_tmp"));
        assert!(!config.is_local("tmp"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "policy": "parallel" }"#).unwrap();
        assert_eq!(config.policy, ExecutionPolicy::Parallel);
        assert_eq!(config.local_prefix, "_");
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_rejects_empty_prefix() {
        let result = EngineConfig::from_json_str(r#"{ "local_prefix": "" }"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let result = EngineConfig::from_json_str(r#"{ "timeout": 5 }"#);
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pulsar.json");
        std::fs::write(&path, r#"{ "local_prefix": "__", "cancel_superseded": false }"#).unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.local_prefix, "__");
        assert!(!config.cancel_superseded);
    }
}
