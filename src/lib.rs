//! Workspace umbrella crate for formvault, an ingestion pipeline for XML form
//! submissions.
//!
//! Every submission ends as exactly one stored document:
//!
//! - a new `instance`,
//! - a `duplicate` when the same bytes arrive again under an occupied identifier,
//! - a fresh `instance` that supersedes a now-`deprecated` copy of the previous
//!   occupant when the bytes differ,
//! - an `error` document when post-save processing fails,
//! - an `error_log` document holding the raw payload when nothing else worked.
//!
//! ```
//! use std::sync::Arc;
//!
//! use formvault::{FormStore, GatewayConfig, Submission, SubmissionGateway};
//!
//! let gateway = SubmissionGateway::with_store(
//!     Arc::new(FormStore::in_memory()),
//!     &GatewayConfig::default(),
//! )
//! .unwrap();
//!
//! let form = &b"<data><meta><instanceID>visit-7</instanceID></meta></data>"[..];
//! let first = gateway.submit(&Submission::new(form));
//! let retry = gateway.submit(&Submission::new(form));
//!
//! assert_eq!(first.document().id, "visit-7");
//! assert_eq!(retry.kind(), formvault::DocKind::Duplicate);
//! ```

pub mod config;
mod conflict;
mod deprecate;
mod duplicate;
pub mod endpoint;
mod error;
mod gateway;
mod hard_failure;
pub mod notify;

pub use crate::config::{
    ConfigLoadError, DEFAULT_MAX_CONFLICT_ROUNDS, FormvaultConfig, GatewayConfig, STORE_PATH_ENV,
};
pub use crate::endpoint::{LocalEndpoint, PostOptions, PostResponse, SubmissionEndpoint};
pub use crate::error::{DownstreamError, PipelineError, SubmissionError};
pub use crate::gateway::{SubmissionGateway, SubmissionOutcome};
pub use crate::hard_failure::{HardFailureLogger, LoggedFailure};
pub use crate::notify::{NotifyError, Notifier, SubmissionObserver, TracingObserver};

pub use ingest::{
    Attachment, Attachments, FormMetadata, IdentifierExtractor, IngestConfig, IngestError,
    Submission, content_digest, same_content,
};
pub use store::{
    BackendConfig, DocKind, FormStore, InstanceDocument, StoreConfig, StoreError,
    StoredAttachment,
};
