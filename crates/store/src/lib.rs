//! # Formvault Store
//!
//! The document store client used by the submission pipeline. It keeps one
//! [`InstanceDocument`] per identifier on top of a pluggable
//! [`StoreBackend`] and exposes the narrow contract the pipeline needs:
//!
//! - [`FormStore::create`] writes a new document and reports
//!   [`StoreError::Conflict`] when the identifier is already occupied. This
//!   conflict-on-write signal is the store's only concurrency control.
//! - [`FormStore::get`], [`FormStore::save`], [`FormStore::delete`].
//! - [`FormStore::copy`] duplicates a document under a store-assigned id.
//! - [`FormStore::attach`] adds a named attachment to a stored document.
//!
//! Records are bincode-encoded and optionally zstd-compressed (see
//! [`CompressionConfig`]). Backends: in-memory (tests, ephemeral use) and
//! redb (enabled by the default `backend-redb` feature).
//!
//! ## Example
//!
//! ```
//! use bytes::Bytes;
//! use store::{DocKind, FormStore, InstanceDocument, StoreError};
//!
//! let store = FormStore::in_memory();
//! let doc = InstanceDocument::instance("form-1", Bytes::from_static(b"<data/>"));
//! store.create(&doc).unwrap();
//!
//! assert!(matches!(store.create(&doc), Err(StoreError::Conflict { .. })));
//!
//! let copy_id = store.copy("form-1").unwrap();
//! assert_ne!(copy_id, "form-1");
//! assert_eq!(store.get(&copy_id).unwrap().kind, DocKind::Instance);
//! ```

mod backend;
mod codec;
mod document;
mod error;
mod ids;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use ingest::Attachment;
use tracing::debug;

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, InMemoryBackend, StoreBackend};
pub use codec::{CompressionCodec, CompressionConfig, DOCUMENT_SCHEMA_VERSION};
pub use document::{DocKind, InstanceDocument, StoredAttachment};
pub use error::StoreError;
pub use ids::{IdGenerator, SequenceGenerator, UuidGenerator};

/// Config for opening a [`FormStore`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub compression: CompressionConfig,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }
}

/// Document store client.
pub struct FormStore {
    backend: Box<dyn StoreBackend>,
    codec: CompressionConfig,
    ids: Arc<dyn IdGenerator>,
}

impl FormStore {
    /// Open the configured backend with random UUID identifiers.
    pub fn open(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let backend = cfg.backend.build()?;
        Ok(Self::with_backend(
            backend,
            cfg.compression.clone(),
            Arc::new(UuidGenerator),
        ))
    }

    /// Build a store over an existing backend, e.g. a failure-injecting one in tests.
    pub fn with_backend(
        backend: Box<dyn StoreBackend>,
        codec: CompressionConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { backend, codec, ids }
    }

    /// Ephemeral store with default compression and UUID identifiers.
    pub fn in_memory() -> Self {
        Self::with_backend(
            Box::new(InMemoryBackend::new()),
            CompressionConfig::default(),
            Arc::new(UuidGenerator),
        )
    }

    /// Mint a fresh identifier from the store's generator.
    pub fn new_id(&self) -> String {
        self.ids.new_id()
    }

    /// Write a new document. Fails with [`StoreError::Conflict`] if `doc.id` is taken.
    pub fn create(&self, doc: &InstanceDocument) -> Result<(), StoreError> {
        let record = self.codec.encode(doc)?;
        if self.backend.insert_new(&doc.id, &record)? {
            debug!(id = %doc.id, kind = %doc.kind, bytes = record.len(), "document_created");
            Ok(())
        } else {
            Err(StoreError::Conflict { id: doc.id.clone() })
        }
    }

    /// Fetch a document, failing with [`StoreError::NotFound`] if absent.
    pub fn get(&self, id: &str) -> Result<InstanceDocument, StoreError> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    /// Fetch a document if present.
    pub fn find(&self, id: &str) -> Result<Option<InstanceDocument>, StoreError> {
        match self.backend.get(id)? {
            Some(record) => Ok(Some(self.codec.decode(&record)?)),
            None => Ok(None),
        }
    }

    /// Overwrite a document in place.
    pub fn save(&self, doc: &InstanceDocument) -> Result<(), StoreError> {
        let record = self.codec.encode(doc)?;
        self.backend.put(&doc.id, &record)?;
        debug!(id = %doc.id, kind = %doc.kind, "document_saved");
        Ok(())
    }

    /// Remove a document, failing with [`StoreError::NotFound`] if absent.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        if self.backend.delete(id)? {
            debug!(id, "document_deleted");
            Ok(())
        } else {
            Err(StoreError::NotFound { id: id.to_string() })
        }
    }

    /// Copy a document to a fresh store-assigned identifier and return it.
    ///
    /// The copy is byte-for-byte the same record apart from its id.
    pub fn copy(&self, id: &str) -> Result<String, StoreError> {
        let mut doc = self.get(id)?;
        doc.id = self.new_id();
        self.create(&doc)?;
        debug!(source = id, copy = %doc.id, "document_copied");
        Ok(doc.id)
    }

    /// Attach a named blob to a stored document, replacing any previous one of that name.
    pub fn attach(&self, id: &str, name: &str, attachment: &Attachment) -> Result<(), StoreError> {
        let mut doc = self.get(id)?;
        doc.attachments
            .insert(name.to_string(), StoredAttachment::from(attachment));
        self.save(&doc)?;
        debug!(id, name, length = attachment.len(), "attachment_stored");
        Ok(())
    }

    /// Raw payload bytes of a stored document.
    pub fn payload(&self, id: &str) -> Result<Bytes, StoreError> {
        Ok(self.get(id)?.payload)
    }

    /// Every stored document, in backend order.
    pub fn list(&self) -> Result<Vec<InstanceDocument>, StoreError> {
        let mut docs = Vec::new();
        let codec = &self.codec;
        self.backend.scan(&mut |_, record| {
            docs.push(codec.decode(record)?);
            Ok(())
        })?;
        Ok(docs)
    }

    /// Flush backend buffers if supported.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.backend.flush()
    }
}

impl fmt::Debug for FormStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormStore")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
