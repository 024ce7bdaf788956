//! Formvault ingest layer.
//!
//! Everything the pipeline needs to know about a submission before it touches
//! the document store:
//!
//! - **Model**: [`Submission`] (raw XML payload plus named [`Attachment`]s).
//! - **Identifiers**: [`IdentifierExtractor`] resolves the instance identifier
//!   a payload claims, trying namespaced `meta/instanceID` first and legacy
//!   regex shapes after.
//! - **Metadata**: [`FormMetadata`] lifts `xmlns` and the `meta` block for
//!   reporting.
//! - **Digests**: [`content_digest`] and the duplicate classifier
//!   [`same_content`].
//!
//! Extraction never fails a submission; an unidentifiable payload resolves to
//! the empty string and the caller decides how loudly to complain.
//!
//! ## Example
//!
//! ```
//! use ingest::{FormMetadata, IdentifierExtractor, Submission, content_digest};
//!
//! let xml = br#"<data xmlns="urn:form:visit" xmlns:jrm="http://openrosa.org/jr/xforms">
//!   <jrm:meta><jrm:instanceID>visit-1</jrm:instanceID><jrm:username>ana</jrm:username></jrm:meta>
//! </data>"#;
//! let submission = Submission::new(&xml[..]);
//!
//! assert_eq!(IdentifierExtractor::default().extract(submission.payload()), "visit-1");
//! assert_eq!(FormMetadata::extract(submission.payload()).username.as_deref(), Some("ana"));
//! assert_eq!(content_digest(submission.payload()).len(), 64);
//! ```
mod config;
mod digest;
mod error;
mod identifier;
mod metadata;
mod submission;

pub use crate::config::{IdentifierConfig, IngestConfig};
pub use crate::digest::{content_digest, same_content};
pub use crate::error::IngestError;
pub use crate::identifier::{
    IdentifierExtractor, IdentifierStrategy, LEGACY_ID_PATTERNS, NamespacedMetaStrategy,
    OPENROSA_META_NS, PatternStrategy,
};
pub use crate::metadata::{FormMetadata, parse_form_date};
pub use crate::submission::{Attachment, Attachments, FORM_ATTACHMENT_NAME, Submission};
