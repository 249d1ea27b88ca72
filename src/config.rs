//! WolfLeader Configuration
//!
//! This module provides configuration structures for the embedded
//! leader election service.

use serde::{Deserialize, Serialize};

/// Main WolfLeader configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfLeaderConfig {
    /// Election service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How notification callbacks are run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Every callback is spawned onto the tokio runtime
    #[default]
    Parallel,
    /// Callbacks run one at a time, in submission order
    Serial,
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::Parallel => write!(f, "parallel"),
            ExecutorKind::Serial => write!(f, "serial"),
        }
    }
}

/// Election service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Executor used for contender and listener callbacks
    #[serde(default)]
    pub executor: ExecutorKind,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfLeaderConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfLeaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(crate::Error::Config("logging.level cannot be empty".into()));
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" => Ok(()),
            other => Err(crate::Error::Config(format!(
                "logging.format must be 'pretty' or 'compact', got '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[service]
executor = "serial"

[logging]
level = "debug"
format = "compact"
"#;

        let config = WolfLeaderConfig::from_str(toml).unwrap();
        assert_eq!(config.service.executor, ExecutorKind::Serial);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_defaults() {
        let config = WolfLeaderConfig::from_str("").unwrap();
        assert_eq!(config.service.executor, ExecutorKind::Parallel);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_rejects_unknown_format() {
        let err = WolfLeaderConfig::from_str("[logging]\nformat = \"xml\"\n").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));

        let err = WolfLeaderConfig::from_str("[service]\nexecutor = \"threads\"\n").unwrap_err();
        assert!(matches!(err, crate::Error::ConfigParse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[service]\nexecutor = \"parallel\"").unwrap();

        let config = WolfLeaderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.service.executor, ExecutorKind::Parallel);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            WolfLeaderConfig::from_file(&missing),
            Err(crate::Error::Io(_))
        ));
    }
}
