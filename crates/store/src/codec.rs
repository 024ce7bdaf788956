//! On-disk record encoding.
//!
//! ```text
//! [codec tag: u8][payload]
//!   0 = raw bincode, 1 = zstd(bincode)
//! bincode(RecordEnvelope { schema_version, document })
//! ```
//!
//! The tag travels with every record so a store written with one compression
//! setting stays readable after the setting changes.
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use zstd::{decode_all, encode_all};

use crate::document::InstanceDocument;
use crate::error::StoreError;

/// Bump this value whenever the stored `InstanceDocument` layout changes.
pub const DOCUMENT_SCHEMA_VERSION: u16 = 1;

const TAG_RAW: u8 = 0;
const TAG_ZSTD: u8 = 1;

#[derive(Serialize, Deserialize)]
struct RecordEnvelope {
    schema_version: u16,
    document: InstanceDocument,
}

/// Compression codec options for stored records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionCodec {
    None,
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Zstd level, 1-22.
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn none() -> Self {
        Self::new(CompressionCodec::None, 0)
    }

    pub fn encode(&self, doc: &InstanceDocument) -> Result<Vec<u8>, StoreError> {
        let envelope = RecordEnvelope {
            schema_version: DOCUMENT_SCHEMA_VERSION,
            document: doc.clone(),
        };
        let body = encode_to_vec(&envelope, standard())?;
        let mut out = Vec::with_capacity(body.len() + 1);
        match self.codec {
            CompressionCodec::None => {
                out.push(TAG_RAW);
                out.extend_from_slice(&body);
            }
            CompressionCodec::Zstd => {
                out.push(TAG_ZSTD);
                out.extend_from_slice(&encode_all(body.as_slice(), self.level)?);
            }
        }
        Ok(out)
    }

    pub fn decode(&self, data: &[u8]) -> Result<InstanceDocument, StoreError> {
        let (tag, rest) = data
            .split_first()
            .ok_or_else(|| StoreError::Decode("empty record".into()))?;
        let body = match *tag {
            TAG_RAW => rest.to_vec(),
            TAG_ZSTD => decode_all(rest)?,
            other => return Err(StoreError::Decode(format!("unknown codec tag {other}"))),
        };
        let (envelope, _): (RecordEnvelope, usize) = decode_from_slice(&body, standard())?;
        if envelope.schema_version > DOCUMENT_SCHEMA_VERSION {
            return Err(StoreError::Decode(format!(
                "record schema version {} is newer than supported {}",
                envelope.schema_version, DOCUMENT_SCHEMA_VERSION
            )));
        }
        Ok(envelope.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocKind, StoredAttachment};
    use bytes::Bytes;

    fn sample() -> InstanceDocument {
        let mut doc = InstanceDocument::instance(
            "doc-1",
            Bytes::from_static(b"<data xmlns='urn:x'><meta><timeEnd>2012-01-01</timeEnd></meta></data>"),
        );
        doc.attachments.insert(
            "photo.jpg".into(),
            StoredAttachment {
                content_type: "image/jpeg".into(),
                length: 3,
                data: Bytes::from_static(&[1, 2, 3]),
            },
        );
        doc.mark(DocKind::Deprecated, "superseded");
        doc.orig_id = Some("orig".into());
        doc
    }

    #[test]
    fn records_written_compressed_read_back_uncompressed_config() {
        let doc = sample();
        let bytes = CompressionConfig::default().encode(&doc).unwrap();
        assert_eq!(bytes[0], TAG_ZSTD);
        assert_eq!(CompressionConfig::none().decode(&bytes).unwrap(), doc);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let cfg = CompressionConfig::default();
        assert!(matches!(cfg.decode(&[]), Err(StoreError::Decode(_))));
        assert!(matches!(cfg.decode(&[9, 1, 2]), Err(StoreError::Decode(_))));
    }
}
