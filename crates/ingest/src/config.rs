//! Configuration types for the ingest layer.
//!
//! [`IngestConfig`] is cheap to clone and deserializes from any serde format;
//! the root crate embeds it in its YAML configuration file.
//!
//! ```rust
//! use ingest::{IdentifierConfig, IngestConfig};
//!
//! let config = IngestConfig {
//!     identifiers: IdentifierConfig {
//!         extra_patterns: vec![r"<formKey>([\w-]+)</formKey>".into()],
//!     },
//!     ..IngestConfig::default()
//! };
//! config.validate().expect("valid configuration");
//! ```
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::identifier::{IdentifierExtractor, PatternStrategy};
use crate::submission::Submission;

/// Runtime configuration for submission intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Configuration schema version.
    ///
    /// Default: `1`
    #[serde(default = "default_version")]
    pub version: u32,

    /// Maximum raw payload size accepted. `None` means unlimited.
    #[serde(default)]
    pub max_payload_bytes: Option<usize>,

    /// Identifier extraction settings.
    #[serde(default)]
    pub identifiers: IdentifierConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            max_payload_bytes: None,
            identifiers: IdentifierConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.version == 0 {
            return Err(IngestError::InvalidConfig("version must be >= 1".into()));
        }
        if self.max_payload_bytes == Some(0) {
            return Err(IngestError::InvalidConfig(
                "max_payload_bytes must be greater than zero".into(),
            ));
        }
        self.identifiers.validate()
    }

    /// Build the identifier extractor described by this configuration.
    pub fn extractor(&self) -> Result<IdentifierExtractor, IngestError> {
        IdentifierExtractor::from_config(&self.identifiers)
    }

    /// Reject submissions the intake refuses to store at all.
    pub fn check_submission(&self, submission: &Submission) -> Result<(), IngestError> {
        if submission.is_empty() {
            return Err(IngestError::EmptyPayload);
        }
        if let Some(limit) = self.max_payload_bytes {
            let len = submission.len();
            if len > limit {
                return Err(IngestError::PayloadTooLarge(format!(
                    "raw payload size {len} exceeds limit of {limit}"
                )));
            }
        }
        Ok(())
    }
}

/// Identifier extraction settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Regexes tried after the built-in strategies, in order. Each needs
    /// exactly one capture group.
    pub extra_patterns: Vec<String>,
}

impl IdentifierConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        for pattern in &self.extra_patterns {
            PatternStrategy::new(pattern)?;
        }
        Ok(())
    }
}

fn default_version() -> u32 {
    1
}
