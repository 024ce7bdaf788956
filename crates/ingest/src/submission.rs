//! Core data model for a received form submission.
//!
//! A [`Submission`] is the raw XML payload plus any named attachments that
//! arrived alongside it. Both are held as [`Bytes`] so the pipeline can hand
//! the same submission to the conflict machinery repeatedly without copying.
//!
//! ```text
//! Submission
//! ├── payload: Bytes            (raw XML, never modified)
//! └── attachments: Attachments
//!     └── name -> Attachment
//!         ├── content_type: String
//!         └── data: Bytes       (length derived from data)
//! ```
//!
//! # Examples
//!
//! ```rust
//! use ingest::{Attachment, Submission};
//!
//! let submission = Submission::new(&b"<data/>"[..])
//!     .with_attachment("photo.jpg", Attachment::new("image/jpeg", vec![0xFF, 0xD8]))
//!     .unwrap();
//!
//! assert_eq!(submission.payload().as_ref(), b"<data/>");
//! assert_eq!(submission.attachments().len(), 1);
//! assert_eq!(submission.attachments().get("photo.jpg").unwrap().len(), 2);
//! ```
use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Name under which the form payload itself is stored; attachments may not reuse it.
pub const FORM_ATTACHMENT_NAME: &str = "form.xml";

/// One named binary blob submitted alongside the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type reported by the submitter.
    pub content_type: String,
    /// Raw attachment bytes.
    pub data: Bytes,
}

impl Attachment {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Attachments keyed by their multipart field name, iterated in name order.
pub type Attachments = BTreeMap<String, Attachment>;

/// A received form submission. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    payload: Bytes,
    attachments: Attachments,
}

impl Submission {
    /// Wrap a raw payload with no attachments.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            attachments: Attachments::new(),
        }
    }

    /// Build a submission from a payload and an existing attachment map.
    pub fn with_attachments(
        payload: impl Into<Bytes>,
        attachments: Attachments,
    ) -> Result<Self, IngestError> {
        for name in attachments.keys() {
            validate_attachment_name(name)?;
        }
        Ok(Self {
            payload: payload.into(),
            attachments,
        })
    }

    /// Add one attachment, consuming and returning the submission.
    pub fn with_attachment(
        mut self,
        name: impl Into<String>,
        attachment: Attachment,
    ) -> Result<Self, IngestError> {
        let name = name.into();
        validate_attachment_name(&name)?;
        self.attachments.insert(name, attachment);
        Ok(self)
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

fn validate_attachment_name(name: &str) -> Result<(), IngestError> {
    if name.trim().is_empty() {
        return Err(IngestError::InvalidAttachment(
            "attachment name must not be blank".into(),
        ));
    }
    if name == FORM_ATTACHMENT_NAME {
        return Err(IngestError::InvalidAttachment(format!(
            "`{FORM_ATTACHMENT_NAME}` is reserved for the form payload"
        )));
    }
    Ok(())
}
