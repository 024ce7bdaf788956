//! Error surface of the submission pipeline.
//!
//! | Error | Recovered? | Caller sees |
//! |-------|------------|-------------|
//! | [`StoreError::Conflict`] on the first write | yes, by conflict resolution | a stored document |
//! | any other [`PipelineError`] | no | [`SubmissionError`] carrying the `error_log` document |
//! | [`DownstreamError`] after a successful write | no | the stored document, quarantined as `error` |
use ingest::IngestError;
use store::{InstanceDocument, StoreError};
use thiserror::Error;

use crate::hard_failure::LoggedFailure;
use crate::notify::NotifyError;

/// Failures that stop a submission from being stored normally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The endpoint answered but reported errors instead of storing the payload.
    #[error("store rejected submission: {}", errors.join("; "))]
    Rejected { errors: Vec<String> },

    /// Intake limits refused the submission before it reached the store.
    #[error("submission refused: {0}")]
    Ingest(#[from] IngestError),

    /// Concurrent resubmissions kept re-occupying the identifier.
    #[error("identifier `{id}` still conflicting after {rounds} resolution rounds")]
    ConflictRoundsExhausted { id: String, rounds: u32 },

    /// A post-save failure whose quarantine could not be written either.
    #[error("post-save processing failed and could not be quarantined: {0}")]
    Downstream(#[from] DownstreamError),
}

/// A failure after the document was durably written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DownstreamError {
    #[error("attachment `{name}` could not be stored: {source}")]
    Attachment { name: String, source: StoreError },

    #[error("saved document could not be reloaded: {0}")]
    Reload(StoreError),

    #[error(transparent)]
    Observer(#[from] NotifyError),
}

/// A submission that could not be classified or stored.
///
/// Always carries the `error_log` document holding the original payload.
/// `persisted` is false only when the failure log itself could not be
/// written; the payload then survives only in this value and in the logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("submission failed: {cause} (payload logged as `{}`)", error_log.id)]
pub struct SubmissionError {
    pub error_log: InstanceDocument,
    #[source]
    pub cause: PipelineError,
    pub persisted: bool,
}

impl SubmissionError {
    pub(crate) fn new(logged: LoggedFailure, cause: PipelineError) -> Self {
        Self {
            error_log: logged.document,
            cause,
            persisted: logged.persisted,
        }
    }
}
