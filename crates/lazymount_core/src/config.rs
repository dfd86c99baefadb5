//! Page runtime configuration.
//!
//! # Responsibility
//! - Parse runtime settings from JSON documents.
//! - Reject settings that would break load watchdog or logging bootstrap.

use crate::logging::{default_log_level, LogLevel, LoggingError};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    InvalidLogLevel(LoggingError),
    ZeroTimeout,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid runtime config: {err}"),
            Self::InvalidLogLevel(err) => write!(f, "{err}"),
            Self::ZeroTimeout => write!(f, "load_timeout_ms must be greater than zero"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidLogLevel(err) => Some(err),
            Self::ZeroTimeout => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    log_level: Option<String>,
    log_dir: Option<PathBuf>,
    load_timeout_ms: Option<u64>,
    storage_namespace: Option<String>,
}

/// Settings for one page runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub log_level: LogLevel,
    /// Rolling log directory. Logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    /// Watchdog around each bundle load. Unbounded when unset.
    pub load_timeout: Option<Duration>,
    /// Prefix prepended to every persistence key, e.g. `site` -> `site.counter.count`.
    pub storage_namespace: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            load_timeout: None,
            storage_namespace: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let parsed: RawConfig = serde_json::from_str(raw).map_err(ConfigError::Parse)?;

        let log_level = match parsed.log_level.as_deref() {
            Some(level) => LogLevel::parse(level).map_err(ConfigError::InvalidLogLevel)?,
            None => default_log_level(),
        };
        let load_timeout = match parsed.load_timeout_ms {
            Some(0) => return Err(ConfigError::ZeroTimeout),
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };
        let storage_namespace = parsed
            .storage_namespace
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            log_level,
            log_dir: parsed.log_dir,
            load_timeout,
            storage_namespace,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    pub fn with_storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = Some(namespace.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, RuntimeConfig};
    use crate::logging::{default_log_level, LogLevel};
    use std::time::Duration;

    #[test]
    fn empty_document_uses_defaults() {
        let config = RuntimeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.log_level, default_log_level());
    }

    #[test]
    fn parses_all_fields() {
        let config = RuntimeConfig::from_json_str(
            r#"{"log_level":"warn","log_dir":"/tmp/lm","load_timeout_ms":2500,"storage_namespace":" site "}"#,
        )
        .unwrap();
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.load_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.storage_namespace.as_deref(), Some("site"));
    }

    #[test]
    fn rejects_zero_timeout_and_unknown_fields() {
        assert!(matches!(
            RuntimeConfig::from_json_str(r#"{"load_timeout_ms":0}"#),
            Err(ConfigError::ZeroTimeout)
        ));
        assert!(matches!(
            RuntimeConfig::from_json_str(r#"{"retries":3}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        std::fs::write(&path, r#"{"log_level":"error"}"#).unwrap();
        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.log_level, LogLevel::Error);
    }
}
