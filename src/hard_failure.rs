//! Last line of defence against data loss.
//!
//! Any submission the pipeline cannot classify or store is written as an
//! `error_log` document under a fresh identifier, carrying the raw payload,
//! its attachments and the rendered cause.
use std::sync::Arc;

use ingest::Submission;
use store::{FormStore, InstanceDocument, StoredAttachment};
use tracing::error;

use crate::error::PipelineError;

/// Result of logging a hard failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedFailure {
    pub document: InstanceDocument,
    /// False when the store refused the `error_log` document too.
    pub persisted: bool,
}

#[derive(Debug, Clone)]
pub struct HardFailureLogger {
    store: Arc<FormStore>,
}

impl HardFailureLogger {
    pub fn new(store: Arc<FormStore>) -> Self {
        Self { store }
    }

    /// Persist `submission` as an `error_log` document describing `cause`.
    pub fn log_failure(&self, submission: &Submission, cause: &PipelineError) -> LoggedFailure {
        let mut document = InstanceDocument::error_log(
            self.store.new_id(),
            submission.payload().clone(),
            cause.to_string(),
        );
        for (name, attachment) in submission.attachments() {
            document
                .attachments
                .insert(name.clone(), StoredAttachment::from(attachment));
        }

        match self.store.create(&document) {
            Ok(()) => {
                error!(
                    log_id = %document.id,
                    cause = %cause,
                    bytes = submission.len(),
                    "hard_failure_logged"
                );
                LoggedFailure {
                    document,
                    persisted: true,
                }
            }
            Err(err) => {
                // The payload now survives only in the returned document.
                error!(
                    log_id = %document.id,
                    cause = %cause,
                    logger_error = %err,
                    bytes = submission.len(),
                    "hard_failure_unpersisted"
                );
                LoggedFailure {
                    document,
                    persisted: false,
                }
            }
        }
    }
}
