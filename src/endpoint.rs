//! The store-side write endpoint.
//!
//! The gateway never writes instance documents itself; it posts raw payloads
//! to a [`SubmissionEndpoint`] which decides the identifier and creates the
//! document. [`LocalEndpoint`] is the in-process implementation over a
//! [`FormStore`].
use std::sync::Arc;

use bytes::Bytes;
use ingest::IdentifierExtractor;
use store::{FormStore, InstanceDocument, StoreError};

/// Options for one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostOptions {
    /// Identifier to store under instead of the one found in the payload.
    pub uid: Option<String>,
}

impl PostOptions {
    pub fn with_uid(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
        }
    }
}

/// Endpoint reply: the identifier the payload was stored under, plus any
/// errors the endpoint reported instead of storing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostResponse {
    pub id: String,
    pub errors: Vec<String>,
}

impl PostResponse {
    pub fn stored(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Posts a raw payload to the document store.
///
/// Must fail with [`StoreError::Conflict`] when the chosen identifier is
/// already occupied; that signal drives conflict resolution.
pub trait SubmissionEndpoint: Send + Sync {
    fn post(&self, payload: &Bytes, options: &PostOptions) -> Result<PostResponse, StoreError>;
}

/// Endpoint that writes straight into a local [`FormStore`].
#[derive(Debug)]
pub struct LocalEndpoint {
    store: Arc<FormStore>,
    extractor: IdentifierExtractor,
}

impl LocalEndpoint {
    pub fn new(store: Arc<FormStore>, extractor: IdentifierExtractor) -> Self {
        Self { store, extractor }
    }

    fn choose_id(&self, payload: &[u8], options: &PostOptions) -> String {
        options
            .uid
            .clone()
            .filter(|uid| !uid.is_empty())
            .or_else(|| self.extractor.find(payload))
            .unwrap_or_else(|| self.store.new_id())
    }
}

impl SubmissionEndpoint for LocalEndpoint {
    fn post(&self, payload: &Bytes, options: &PostOptions) -> Result<PostResponse, StoreError> {
        let id = self.choose_id(payload, options);
        let doc = InstanceDocument::instance(id, payload.clone());
        self.store.create(&doc)?;
        Ok(PostResponse::stored(doc.id))
    }
}
