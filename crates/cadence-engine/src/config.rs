//! Engine configuration.

use std::path::{Path, PathBuf};

use cadence_core::{CadenceError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for an [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Handler substituted for unknown handlers and used as the default finisher.
    pub fallback_handler: String,

    /// Maximum number of plan steps executed per run.
    pub max_steps: usize,

    /// Handlers allowed to produce the final user-facing answer.
    pub finisher_handlers: Vec<String>,

    /// Number of recent messages handed to the planner.
    pub history_window: usize,

    /// Messages kept in the conversation before the oldest are dropped.
    pub max_messages: usize,

    /// Default trace destination when a request names none.
    pub trace_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_handler: "general".to_string(),
            max_steps: 6,
            finisher_handlers: vec![
                "composer".to_string(),
                "writer".to_string(),
                "general".to_string(),
            ],
            history_window: 6,
            max_messages: 64,
            trace_path: None,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            CadenceError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Returns true if `name` may act as a finisher.
    pub fn is_finisher(&self, name: &str) -> bool {
        self.finisher_handlers.iter().any(|f| f == name)
    }

    fn validate(&self) -> Result<()> {
        if self.fallback_handler.trim().is_empty() {
            return Err(CadenceError::ConfigError(
                "fallback_handler must not be empty".to_string(),
            ));
        }
        if self.max_messages == 0 {
            return Err(CadenceError::ConfigError(
                "max_messages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_steps, 6);
        assert!(config.is_finisher("writer"));
        assert!(!config.is_finisher("retriever"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_steps = 3
            finisher_handlers = ["writer"]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.fallback_handler, "general");
        assert!(!config.is_finisher("general"));
    }

    #[test]
    fn test_invalid_config() {
        assert!(EngineConfig::from_toml_str(r#"fallback_handler = " ""#).is_err());
        assert!(EngineConfig::from_toml_str("max_steps = \"many\"").is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence.toml");
        std::fs::write(&path, "history_window = 2\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.history_window, 2);
        assert!(EngineConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
