//! Persisted document shape.
//!
//! Every submission attempt ends up as exactly one [`InstanceDocument`]; its
//! [`DocKind`] records how the pipeline classified it.
//!
//! | Kind | Written by | Stored under |
//! |------|------------|--------------|
//! | `instance` | gateway, first successful write | the submission's own identifier |
//! | `error` | gateway, post-save failure quarantine | the submission's own identifier |
//! | `duplicate` | duplicate handler | a fresh identifier |
//! | `deprecated` | deprecation handler | a fresh identifier, `orig_id` = old identifier |
//! | `error_log` | hard-failure logger | a fresh identifier |
use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use ingest::{Attachment, FormMetadata, content_digest};
use serde::{Deserialize, Serialize};

/// Classification of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Instance,
    Error,
    Duplicate,
    Deprecated,
    ErrorLog,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Instance => "instance",
            DocKind::Error => "error",
            DocKind::Duplicate => "duplicate",
            DocKind::Deprecated => "deprecated",
            DocKind::ErrorLog => "error_log",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment bytes as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAttachment {
    pub content_type: String,
    pub length: u64,
    pub data: Bytes,
}

impl From<&Attachment> for StoredAttachment {
    fn from(attachment: &Attachment) -> Self {
        Self {
            content_type: attachment.content_type.clone(),
            length: attachment.len() as u64,
            data: attachment.data.clone(),
        }
    }
}

/// The canonical stored record for one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDocument {
    pub id: String,
    pub kind: DocKind,
    /// Raw payload exactly as received.
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
    /// Human-readable reason for a non-`instance` kind.
    pub problem: Option<String>,
    /// Identifier a `deprecated` document occupied before it was superseded.
    pub orig_id: Option<String>,
    pub metadata: FormMetadata,
    pub attachments: BTreeMap<String, StoredAttachment>,
}

impl InstanceDocument {
    /// A fresh `instance` document for `payload` stored under `id`.
    pub fn instance(id: impl Into<String>, payload: Bytes) -> Self {
        let metadata = FormMetadata::extract(&payload);
        Self {
            id: id.into(),
            kind: DocKind::Instance,
            payload,
            received_at: Utc::now(),
            problem: None,
            orig_id: None,
            metadata,
            attachments: BTreeMap::new(),
        }
    }

    /// An `error_log` document preserving a payload that could not be stored.
    ///
    /// Metadata is deliberately not parsed; the payload may be what broke.
    pub fn error_log(id: impl Into<String>, payload: Bytes, problem: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DocKind::ErrorLog,
            payload,
            received_at: Utc::now(),
            problem: Some(problem.into()),
            orig_id: None,
            metadata: FormMetadata::default(),
            attachments: BTreeMap::new(),
        }
    }

    /// Hex digest of the stored payload.
    pub fn content_digest(&self) -> String {
        content_digest(&self.payload)
    }

    pub fn is_instance(&self) -> bool {
        self.kind == DocKind::Instance
    }

    /// Reclassify in place, recording why.
    pub fn mark(&mut self, kind: DocKind, problem: impl Into<String>) {
        self.kind = kind;
        self.problem = Some(problem.into());
    }
}
