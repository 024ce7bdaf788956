//! Submission gateway: the single entry point for form payloads.
//!
//! ```text
//! submit ──► post ──┬─ Ok ──────────► attach ─► notify ─► Stored
//!                   │                    └─ failure ─► quarantine as `error`
//!                   ├─ Conflict ─► resolve_conflict
//!                   │                ├─ same content ─► mark_duplicate
//!                   │                └─ new content ──► deprecate ─► submit again
//!                   └─ other ─────► HardFailureLogger ─► Failed
//! ```
//!
//! The store's conflict-on-write is the only concurrency control. The gateway
//! holds no mutable state, so one instance can serve many threads.
use std::sync::Arc;
use std::time::Instant;

use ingest::{IdentifierExtractor, IngestConfig, Submission, content_digest};
use store::{DocKind, FormStore, InstanceDocument, StoreError};
use tracing::{error, info, info_span, warn};

use crate::config::{ConfigLoadError, GatewayConfig};
use crate::endpoint::{LocalEndpoint, PostOptions, SubmissionEndpoint};
use crate::error::{DownstreamError, PipelineError, SubmissionError};
use crate::hard_failure::HardFailureLogger;
use crate::notify::{Notifier, SubmissionObserver};

/// What became of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Stored as a new `instance`, or recorded as a `duplicate` of an existing one.
    Stored(InstanceDocument),
    /// Written, but attachment storage or notification failed afterwards. The
    /// document has been re-saved with kind `error`.
    StoredWithDownstreamFailure {
        document: InstanceDocument,
        cause: DownstreamError,
    },
    /// Not stored; the payload was preserved as an `error_log` document.
    Failed(SubmissionError),
}

impl SubmissionOutcome {
    /// The document the caller should look at: stored, quarantined or failure log.
    pub fn document(&self) -> &InstanceDocument {
        match self {
            SubmissionOutcome::Stored(document)
            | SubmissionOutcome::StoredWithDownstreamFailure { document, .. } => document,
            SubmissionOutcome::Failed(err) => &err.error_log,
        }
    }

    pub fn kind(&self) -> DocKind {
        self.document().kind
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, SubmissionOutcome::Stored(_))
    }

    pub fn into_result(self) -> Result<InstanceDocument, SubmissionError> {
        match self {
            SubmissionOutcome::Stored(document)
            | SubmissionOutcome::StoredWithDownstreamFailure { document, .. } => Ok(document),
            SubmissionOutcome::Failed(err) => Err(err),
        }
    }
}

/// Accepts submissions and drives them to exactly one terminal document.
pub struct SubmissionGateway {
    pub(crate) store: Arc<FormStore>,
    pub(crate) endpoint: Arc<dyn SubmissionEndpoint>,
    pub(crate) extractor: IdentifierExtractor,
    pub(crate) failures: HardFailureLogger,
    notifier: Notifier,
    ingest: IngestConfig,
    max_conflict_rounds: u32,
}

impl SubmissionGateway {
    /// Open the configured store and post through a [`LocalEndpoint`].
    pub fn new(cfg: &GatewayConfig) -> Result<Self, ConfigLoadError> {
        let store = Arc::new(FormStore::open(&cfg.store)?);
        Self::with_store(store, cfg)
    }

    /// Use an existing store, posting through a [`LocalEndpoint`] over it.
    pub fn with_store(store: Arc<FormStore>, cfg: &GatewayConfig) -> Result<Self, ConfigLoadError> {
        let endpoint = Arc::new(LocalEndpoint::new(
            Arc::clone(&store),
            cfg.ingest.extractor()?,
        ));
        Self::from_parts(store, endpoint, cfg)
    }

    /// Assemble a gateway around any endpoint implementation.
    pub fn from_parts(
        store: Arc<FormStore>,
        endpoint: Arc<dyn SubmissionEndpoint>,
        cfg: &GatewayConfig,
    ) -> Result<Self, ConfigLoadError> {
        cfg.ingest.validate()?;
        if cfg.max_conflict_rounds == 0 {
            return Err(ConfigLoadError::Validation(
                "max_conflict_rounds must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            failures: HardFailureLogger::new(Arc::clone(&store)),
            extractor: cfg.ingest.extractor()?,
            store,
            endpoint,
            notifier: Notifier::new(),
            ingest: cfg.ingest.clone(),
            max_conflict_rounds: cfg.max_conflict_rounds,
        })
    }

    /// Register a downstream consumer of newly saved instances.
    pub fn with_observer(mut self, observer: Arc<dyn SubmissionObserver>) -> Self {
        self.notifier.register(observer);
        self
    }

    pub fn store(&self) -> &Arc<FormStore> {
        &self.store
    }

    /// Submit one payload.
    ///
    /// Never panics and never drops the payload: the outcome always carries
    /// either the stored document or the `error_log` document preserving it.
    pub fn submit(&self, submission: &Submission) -> SubmissionOutcome {
        let digest = content_digest(submission.payload());
        let span = info_span!("formvault.submit", digest = %digest, bytes = submission.len());
        let _guard = span.enter();
        let started = Instant::now();

        let outcome = match self.ingest.check_submission(submission) {
            Ok(()) => self.submit_round(submission, 0),
            Err(err) => self.hard_failure(submission, err.into()),
        };

        let elapsed_us = started.elapsed().as_micros() as u64;
        match &outcome {
            SubmissionOutcome::Stored(doc) => {
                info!(id = %doc.id, kind = %doc.kind, elapsed_us, "submission_stored")
            }
            SubmissionOutcome::StoredWithDownstreamFailure { document, cause } => warn!(
                id = %document.id,
                error = %cause,
                elapsed_us,
                "submission_stored_with_downstream_failure"
            ),
            SubmissionOutcome::Failed(err) => error!(
                log_id = %err.error_log.id,
                persisted = err.persisted,
                error = %err.cause,
                elapsed_us,
                "submission_failed"
            ),
        }
        outcome
    }

    /// One write attempt. `round` counts completed deprecations for this submission.
    pub(crate) fn submit_round(&self, submission: &Submission, round: u32) -> SubmissionOutcome {
        match self.post(submission, &PostOptions::default()) {
            Ok(id) => self.finish(&id, submission),
            Err(PipelineError::Store(StoreError::Conflict { id })) => {
                info!(conflict_id = %id, round, "submission_conflict");
                if round >= self.max_conflict_rounds {
                    return self.hard_failure(
                        submission,
                        PipelineError::ConflictRoundsExhausted { id, rounds: round },
                    );
                }
                self.resolve_conflict(submission, round)
            }
            Err(err) => self.hard_failure(submission, err),
        }
    }

    /// Post the payload and return the identifier it was stored under.
    pub(crate) fn post(
        &self,
        submission: &Submission,
        options: &PostOptions,
    ) -> Result<String, PipelineError> {
        let response = self.endpoint.post(submission.payload(), options)?;
        if response.has_errors() {
            return Err(PipelineError::Rejected {
                errors: response.errors,
            });
        }
        Ok(response.id)
    }

    pub(crate) fn hard_failure(
        &self,
        submission: &Submission,
        cause: PipelineError,
    ) -> SubmissionOutcome {
        let logged = self.failures.log_failure(submission, &cause);
        SubmissionOutcome::Failed(SubmissionError::new(logged, cause))
    }

    /// Post-save processing for a freshly written instance.
    fn finish(&self, id: &str, submission: &Submission) -> SubmissionOutcome {
        match self.post_save(id, submission) {
            Ok(document) => SubmissionOutcome::Stored(document),
            Err(cause) => self.quarantine(id, submission, cause),
        }
    }

    fn post_save(
        &self,
        id: &str,
        submission: &Submission,
    ) -> Result<InstanceDocument, DownstreamError> {
        for (name, attachment) in submission.attachments() {
            self.store
                .attach(id, name, attachment)
                .map_err(|source| DownstreamError::Attachment {
                    name: name.clone(),
                    source,
                })?;
        }
        let document = self.store.get(id).map_err(DownstreamError::Reload)?;
        self.notifier.document_saved(&document)?;
        Ok(document)
    }

    /// Reclassify a written instance as `error` after a post-save failure.
    fn quarantine(
        &self,
        id: &str,
        submission: &Submission,
        cause: DownstreamError,
    ) -> SubmissionOutcome {
        warn!(id, error = %cause, "post_save_failed");
        let saved = self.store.get(id).and_then(|mut document| {
            document.mark(DocKind::Error, cause.to_string());
            self.store.save(&document).map(|()| document)
        });
        match saved {
            Ok(document) => SubmissionOutcome::StoredWithDownstreamFailure { document, cause },
            Err(err) => {
                error!(id, error = %err, "quarantine_failed");
                self.hard_failure(submission, PipelineError::Downstream(cause))
            }
        }
    }
}

impl std::fmt::Debug for SubmissionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionGateway")
            .field("store", &self.store)
            .field("extractor", &self.extractor)
            .field("notifier", &self.notifier)
            .field("max_conflict_rounds", &self.max_conflict_rounds)
            .finish_non_exhaustive()
    }
}
