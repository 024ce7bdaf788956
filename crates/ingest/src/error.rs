//! Error types produced by the ingest crate.
//!
//! Ingest never rejects a submission because of its content: identifier and
//! metadata extraction degrade to empty values instead of failing. The errors
//! here cover configuration problems and the few hard limits a caller can
//! opt into.
//!
//! # Error Categories
//!
//! | Error | Category | Description |
//! |-------|----------|-------------|
//! | [`InvalidPattern`](IngestError::InvalidPattern) | Configuration | Legacy identifier regex does not compile or lacks a capture group |
//! | [`EmptyPayload`](IngestError::EmptyPayload) | Validation | Submission carries zero payload bytes |
//! | [`PayloadTooLarge`](IngestError::PayloadTooLarge) | Validation | Size limit exceeded |
//! | [`InvalidAttachment`](IngestError::InvalidAttachment) | Validation | Attachment name is empty or reserved |
//!
//! # Examples
//!
//! ```rust
//! use ingest::{IdentifierExtractor, IngestError};
//!
//! match IdentifierExtractor::default().with_pattern("<uid>[a-z]+</uid>") {
//!     Err(IngestError::InvalidPattern { pattern, .. }) => {
//!         assert_eq!(pattern, "<uid>[a-z]+</uid>");
//!     }
//!     other => panic!("expected a pattern error, got {other:?}"),
//! }
//! ```
use thiserror::Error;

/// Errors that can occur while building submissions or ingest configuration.
///
/// The enum is marked `#[non_exhaustive]`; callers should keep a catch-all arm.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestError {
    /// A legacy identifier pattern could not be used.
    ///
    /// Patterns must compile and expose exactly one capture group holding the
    /// identifier.
    #[error("invalid identifier pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The submission payload has no bytes.
    #[error("submission payload is empty")]
    EmptyPayload,

    /// Payload exceeds the configured size limit.
    #[error("payload exceeds size limit: {0}")]
    PayloadTooLarge(String),

    /// Attachment name is unusable.
    #[error("invalid attachment: {0}")]
    InvalidAttachment(String),

    /// Configuration failed validation.
    #[error("invalid ingest configuration: {0}")]
    InvalidConfig(String),
}
