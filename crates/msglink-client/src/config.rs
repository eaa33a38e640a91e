//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/msglink/config.toml` by default. Every section is optional.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Level;

use msglink_core::{DEFAULT_BRIEF_CHARS, DEFAULT_BRIEF_LIMIT, TracingConfig, TracingOutputFormat};

use crate::dispatcher::{CallOptions, DEFAULT_TIMEOUT};
use crate::error::{ClientError, ClientResult};
use crate::long_message::DEFAULT_LONG_MESSAGE_THRESHOLD;
use crate::pagination::DEFAULT_PAGE_TIMEOUT;
use crate::transport::LONG_MESSAGE_COMMAND_ID;

/// Configuration for an account session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Request/response settings.
    pub dispatcher: DispatcherSettings,

    /// Paginated query settings.
    pub pagination: PaginationSettings,

    /// Long-message routing and upload settings.
    pub long_message: LongMessageSettings,

    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Request/response settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Time to wait for each response, in milliseconds.
    pub timeout_ms: u64,

    /// Retransmissions for ordinary requests.
    pub retries: u32,

    /// Retransmissions for idempotent group list and info queries.
    pub list_retries: u32,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            retries: 0,
            list_retries: 2,
        }
    }
}

impl DispatcherSettings {
    /// Options for ordinary requests.
    pub fn call_options(&self) -> CallOptions {
        CallOptions::new(Duration::from_millis(self.timeout_ms), self.retries)
    }

    /// Options for idempotent list and info queries.
    pub fn list_options(&self) -> CallOptions {
        self.call_options().with_retries(self.list_retries)
    }
}

/// Paginated query settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    /// Time to wait for each page, in milliseconds.
    pub page_timeout_ms: u64,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_timeout_ms: DEFAULT_PAGE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl PaginationSettings {
    pub fn call_options(&self) -> CallOptions {
        CallOptions::new(Duration::from_millis(self.page_timeout_ms), 0)
    }
}

/// Long-message routing and upload settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongMessageSettings {
    /// Estimated length above which a group message is uploaded.
    pub threshold: usize,

    /// Number of elements rendered in the preview.
    pub brief_limit: usize,

    /// Number of characters the preview may hold before `...`.
    pub brief_chars: usize,

    /// Highway command id for long-message uploads.
    pub upload_command_id: u32,
}

impl Default for LongMessageSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LONG_MESSAGE_THRESHOLD,
            brief_limit: DEFAULT_BRIEF_LIMIT,
            brief_chars: DEFAULT_BRIEF_CHARS,
            upload_command_id: LONG_MESSAGE_COMMAND_ID,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset: trace, debug, info, warn or error.
    pub level: String,

    /// Output format: pretty, compact or json.
    pub format: String,

    /// Whether events carry their source file and line.
    pub location: bool,

    /// Custom filter directive, overriding `level`.
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            location: false,
            filter: None,
        }
    }
}

impl LoggingSettings {
    /// Converts into a tracing configuration.
    pub fn tracing_config(&self) -> ClientResult<TracingConfig> {
        let level = Level::from_str(&self.level)
            .map_err(|_| ClientError::Config(format!("invalid log level: {}", self.level)))?;
        let format = TracingOutputFormat::from_str(&self.format)
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let mut config = TracingConfig::default()
            .with_level(level)
            .with_format(format)
            .with_location(self.location);
        if let Some(ref filter) = self.filter {
            config = config.with_env_filter(filter);
        }
        Ok(config)
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if it does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("msglink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.dispatcher.timeout_ms, 5000);
        assert_eq!(config.dispatcher.retries, 0);
        assert_eq!(config.dispatcher.list_retries, 2);
        assert_eq!(config.pagination.page_timeout_ms, 3000);
        assert_eq!(config.long_message.threshold, 702);
        assert_eq!(config.long_message.brief_limit, 27);
        assert_eq!(config.long_message.brief_chars, 100);
        assert_eq!(config.long_message.upload_command_id, 27);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [dispatcher]
            timeout_ms = 1500

            [long_message]
            brief_limit = 10
            brief_chars = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatcher.timeout_ms, 1500);
        assert_eq!(config.dispatcher.list_retries, 2);
        assert_eq!(config.long_message.brief_limit, 10);
        assert_eq!(config.long_message.brief_chars, 60);
        assert_eq!(config.long_message.threshold, 702);
        assert_eq!(config.pagination, PaginationSettings::default());
    }

    #[test]
    fn call_options_conversion() {
        let settings = DispatcherSettings {
            timeout_ms: 250,
            retries: 1,
            list_retries: 3,
        };
        assert_eq!(
            settings.call_options(),
            CallOptions::new(Duration::from_millis(250), 1)
        );
        assert_eq!(settings.list_options().retries, 3);
        assert_eq!(
            PaginationSettings::default().call_options().timeout,
            Duration::from_millis(3000)
        );
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"\nformat = \"json\"\nlocation = true").unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        let tracing = config.logging.tracing_config().unwrap();

        assert_eq!(tracing.default_level, Level::DEBUG);
        assert_eq!(tracing.output_format, TracingOutputFormat::Json);
        assert!(tracing.include_location);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dispatcher]\ntimeout_ms = \"soon\"").unwrap();

        let err = ClientConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ClientError::Config(ref msg) if msg.contains("failed to parse")));
    }

    #[test]
    fn load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ClientError::Config(ref msg) if msg.contains("failed to read")));
    }

    #[test]
    fn invalid_logging_settings() {
        let settings = LoggingSettings {
            level: "loud".into(),
            ..LoggingSettings::default()
        };
        assert!(matches!(settings.tracing_config(), Err(ClientError::Config(_))));

        let settings = LoggingSettings {
            format: "xml".into(),
            ..LoggingSettings::default()
        };
        assert!(settings.tracing_config().is_err());
    }

    #[test]
    fn default_path_is_under_msglink() {
        let path = ClientConfig::default_path();
        assert!(path.ends_with("msglink/config.toml"));
    }
}
