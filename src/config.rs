//! YAML configuration file support.
//!
//! A single file describes the store, intake limits, identifier extraction
//! and logging. It is loaded at startup and turned into a [`GatewayConfig`].
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "clinic intake"
//!
//! store:
//!   backend: "redb"
//!   path: "/var/lib/formvault/forms.redb"
//!   compression: "zstd"
//!   compression_level: 3
//!
//! intake:
//!   max_payload_bytes: 10485760
//!   max_conflict_rounds: 8
//!
//! identifiers:
//!   extra_patterns:
//!     - '<formKey>([\w-]+)</formKey>'
//!
//! logging:
//!   level: "info"
//!   json: false
//! ```
//!
//! `FORMVAULT_STORE_PATH`, when set, replaces `store.path` and selects the
//! redb backend.

use std::env;
use std::fs;
use std::path::Path;

use ingest::{IdentifierConfig, IngestConfig, IngestError};
use serde::{Deserialize, Serialize};
use store::{BackendConfig, CompressionCodec, CompressionConfig, StoreConfig, StoreError};
use thiserror::Error;

/// Environment variable overriding the store path.
pub const STORE_PATH_ENV: &str = "FORMVAULT_STORE_PATH";

/// Default bound on deprecate-and-resubmit rounds for one submission.
pub const DEFAULT_MAX_CONFLICT_ROUNDS: u32 = 8;

/// Errors that can occur when loading configuration or building a gateway from it.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid intake settings: {0}")]
    Ingest(#[from] IngestError),

    #[error("store could not be opened: {0}")]
    Store(#[from] StoreError),
}

/// Top-level YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FormvaultConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub store: StoreYamlConfig,

    #[serde(default)]
    pub intake: IntakeYamlConfig,

    #[serde(default)]
    pub identifiers: IdentifierConfig,

    #[serde(default)]
    pub logging: LoggingYamlConfig,
}

impl FormvaultConfig {
    /// Load a YAML configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: FormvaultConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.store.validate()?;
        self.intake.validate()?;
        self.logging.validate()?;
        self.identifiers.validate()?;
        Ok(())
    }

    /// Apply [`STORE_PATH_ENV`] if it is set to a non-empty value.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var(STORE_PATH_ENV) {
            self.override_store_path(path);
        }
    }

    fn override_store_path(&mut self, path: String) {
        if path.trim().is_empty() {
            return;
        }
        self.store.backend = "redb".to_string();
        self.store.path = Some(path);
    }

    /// Runtime settings for [`crate::SubmissionGateway`].
    pub fn gateway_config(&self) -> Result<GatewayConfig, ConfigLoadError> {
        Ok(GatewayConfig {
            store: self.store.store_config()?,
            ingest: IngestConfig {
                max_payload_bytes: self.intake.max_payload_bytes,
                identifiers: self.identifiers.clone(),
                ..IngestConfig::default()
            },
            max_conflict_rounds: self.intake.max_conflict_rounds,
        })
    }
}

impl Default for FormvaultConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            store: StoreYamlConfig::default(),
            intake: IntakeYamlConfig::default(),
            identifiers: IdentifierConfig::default(),
            logging: LoggingYamlConfig::default(),
        }
    }
}

/// Store YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file; required for `redb`.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

impl StoreYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "store.backend must be one of: {valid_backends:?}"
            )));
        }

        if self.backend == "redb" && self.path.is_none() {
            return Err(ConfigLoadError::Validation(
                "store.path is required when backend is 'redb'".to_string(),
            ));
        }

        let valid_compression = ["zstd", "none"];
        if !valid_compression.contains(&self.compression.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "store.compression must be one of: {valid_compression:?}"
            )));
        }

        if self.compression == "zstd" && !(1..=22).contains(&self.compression_level) {
            return Err(ConfigLoadError::Validation(
                "store.compression_level must be between 1 and 22 for zstd".to_string(),
            ));
        }

        Ok(())
    }

    fn store_config(&self) -> Result<StoreConfig, ConfigLoadError> {
        let backend = match (self.backend.as_str(), &self.path) {
            ("redb", Some(path)) => BackendConfig::redb(path.clone()),
            ("in_memory", _) => BackendConfig::in_memory(),
            (other, _) => {
                return Err(ConfigLoadError::Validation(format!(
                    "store backend `{other}` is not usable"
                )));
            }
        };
        let compression = match self.compression.as_str() {
            "none" => CompressionConfig::none(),
            _ => CompressionConfig::new(CompressionCodec::Zstd, self.compression_level),
        };
        Ok(StoreConfig::new()
            .with_backend(backend)
            .with_compression(compression))
    }
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            compression: default_compression(),
            compression_level: default_compression_level(),
        }
    }
}

/// Intake YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeYamlConfig {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: Option<usize>,

    #[serde(default = "default_max_conflict_rounds")]
    pub max_conflict_rounds: u32,
}

impl IntakeYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.max_payload_bytes == Some(0) {
            return Err(ConfigLoadError::Validation(
                "intake.max_payload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_conflict_rounds == 0 {
            return Err(ConfigLoadError::Validation(
                "intake.max_conflict_rounds must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for IntakeYamlConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            max_conflict_rounds: DEFAULT_MAX_CONFLICT_ROUNDS,
        }
    }
}

/// Logging YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingYamlConfig {
    /// `tracing` filter directive, e.g. `info` or `formvault=debug,store=info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl LoggingYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.level.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingYamlConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Runtime settings for a [`crate::SubmissionGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    /// Deprecate-and-resubmit rounds allowed before the submission is logged as a hard failure.
    pub max_conflict_rounds: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            ingest: IngestConfig::default(),
            max_conflict_rounds: DEFAULT_MAX_CONFLICT_ROUNDS,
        }
    }
}

fn default_backend() -> String {
    "in_memory".to_string()
}
fn default_compression() -> String {
    "zstd".to_string()
}
fn default_compression_level() -> i32 {
    3
}
fn default_max_payload_bytes() -> Option<usize> {
    Some(10 * 1024 * 1024) // 10MB
}
fn default_max_conflict_rounds() -> u32 {
    DEFAULT_MAX_CONFLICT_ROUNDS
}
fn default_log_level() -> String {
    "info".to_string()
}
