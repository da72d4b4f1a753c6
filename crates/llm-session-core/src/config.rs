//! Configuration types for the lifecycle manager.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{BuildPolicy, ContextOptions, EngineLogLevel, EngineOptions, Error, GpuPreference};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Lifecycle configuration loaded from a YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Engine settings
    pub engine: EngineSettings,
    /// Context settings
    pub context: ContextSettings,
    /// Model settings
    pub model: ModelSettings,
    /// Chat session settings
    pub session: SessionSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

impl LifecycleConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: LifecycleConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.context.thread_count == 0 {
            return Err(Error::Config("context.thread_count must be > 0".to_string()));
        }

        if self.context.sequence_count == 0 {
            return Err(Error::Config(
                "context.sequence_count must be > 0".to_string(),
            ));
        }

        if let Some(path) = &self.model.path {
            if path.trim().is_empty() {
                return Err(Error::Config("model.path cannot be empty".to_string()));
            }
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(Error::Config(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine log verbosity
    pub log_level: EngineLogLevel,
    /// Native build policy
    pub build_policy: BuildPolicy,
    /// GPU backend preference
    pub gpu: GpuPreference,
}

impl EngineSettings {
    /// Engine options for the given GPU preference.
    pub fn options(&self, gpu: GpuPreference) -> EngineOptions {
        EngineOptions {
            log_level: self.log_level,
            build_policy: self.build_policy,
            gpu,
        }
    }
}

/// Context settings, applied to every context the manager creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Evaluation threads
    pub thread_count: u32,
    /// Sampling seed
    pub seed: u32,
    /// Sequences per context
    pub sequence_count: u32,
}

impl Default for ContextSettings {
    fn default() -> Self {
        let defaults = ContextOptions::default();
        Self {
            thread_count: defaults.thread_count,
            seed: defaults.seed,
            sequence_count: defaults.sequence_count,
        }
    }
}

impl From<ContextSettings> for ContextOptions {
    fn from(settings: ContextSettings) -> Self {
        Self {
            thread_count: settings.thread_count,
            seed: settings.seed,
            sequence_count: settings.sequence_count,
        }
    }
}

/// Model settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ModelSettings {
    /// Model file used by `load_all`
    pub path: Option<String>,
}

/// Chat session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionSettings {
    /// System prompt used by `load_all`
    pub system_prompt: String,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LifecycleConfig::default();
        assert_eq!(config.engine.gpu, GpuPreference::Auto);
        assert_eq!(config.engine.log_level, EngineLogLevel::Warn);
        assert_eq!(config.context.thread_count, 6);
        assert_eq!(config.context.seed, 1111);
        assert_eq!(config.context.sequence_count, 1);
        assert_eq!(config.model.path, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let config = LifecycleConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_thread_count() {
        let mut config = LifecycleConfig::default();
        config.context.thread_count = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_sequence_count() {
        let mut config = LifecycleConfig::default();
        config.context.sequence_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_model_path() {
        let mut config = LifecycleConfig::default();
        config.model.path = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = LifecycleConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
engine:
  log_level: error
  build_policy: never
  gpu: cuda

context:
  thread_count: 8
  seed: 42
  sequence_count: 2

model:
  path: models/llama-3.2-1b-instruct.Q4_K_M.gguf

session:
  system_prompt: "You are a terse assistant."

logging:
  level: debug
"#;

        let config = LifecycleConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.engine.log_level, EngineLogLevel::Error);
        assert_eq!(config.engine.build_policy, BuildPolicy::Never);
        assert_eq!(config.engine.gpu, GpuPreference::Cuda);
        assert_eq!(config.context.thread_count, 8);
        assert_eq!(config.context.seed, 42);
        assert_eq!(config.context.sequence_count, 2);
        assert_eq!(
            config.model.path.as_deref(),
            Some("models/llama-3.2-1b-instruct.Q4_K_M.gguf")
        );
        assert_eq!(config.session.system_prompt, "You are a terse assistant.");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = LifecycleConfig::from_yaml("context:\n  seed: 7\n").unwrap();
        assert_eq!(config.context.seed, 7);
        assert_eq!(config.context.thread_count, 6);
        assert_eq!(config.engine.gpu, GpuPreference::Auto);
    }

    #[test]
    fn test_yaml_rejects_invalid_values() {
        let result = LifecycleConfig::from_yaml("context:\n  thread_count: 0\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let result = LifecycleConfig::from_yaml("engine:\n  gpu: tpu\n");
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn test_context_options_from_settings() {
        let settings = ContextSettings {
            thread_count: 2,
            seed: 9,
            sequence_count: 1,
        };
        let options = ContextOptions::from(settings);
        assert_eq!(options.thread_count, 2);
        assert_eq!(options.seed, 9);
    }

    #[test]
    fn test_from_missing_file() {
        let result = LifecycleConfig::from_file("/nonexistent/llm-session.yaml");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
