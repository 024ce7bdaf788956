//! Instance identifier extraction.
//!
//! A submission names itself: the OpenRosa convention puts the identifier in
//! `{http://openrosa.org/jr/xforms}meta/instanceID` directly under the root
//! element. Older clients used bare `instanceID`, `uid` or `uuid` elements in
//! arbitrary places. [`IdentifierExtractor`] tries an ordered list of
//! [`IdentifierStrategy`] values and returns the first hit.
//!
//! ```text
//! payload ─▶ NamespacedMetaStrategy ─▶ <instanceID> ─▶ <uid> ─▶ <uuid> ─▶ ""
//!              (parsed XML)            (regex fallbacks, in order)
//! ```
//!
//! New legacy shapes are appended with [`IdentifierExtractor::with_pattern`];
//! they only ever run after every existing strategy has missed, so adding one
//! never changes what an already-recognised payload resolves to.
//!
//! # Examples
//!
//! ```rust
//! use ingest::IdentifierExtractor;
//!
//! let extractor = IdentifierExtractor::default();
//!
//! let modern = br#"<data xmlns:jrm="http://openrosa.org/jr/xforms">
//!   <jrm:meta><jrm:instanceID>uuid-1</jrm:instanceID></jrm:meta>
//! </data>"#;
//! assert_eq!(extractor.extract(modern), "uuid-1");
//!
//! let legacy = b"<data><Meta><uid>ABC123</uid></Meta></data>";
//! assert_eq!(extractor.extract(legacy), "ABC123");
//!
//! assert_eq!(extractor.extract(b"<data/>"), "");
//! ```
use std::fmt;

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use regex::Regex;
use tracing::debug;

use crate::config::IdentifierConfig;
use crate::error::IngestError;

/// Namespace of the OpenRosa `meta` block.
pub const OPENROSA_META_NS: &str = "http://openrosa.org/jr/xforms";

/// Legacy identifier shapes, tried in this order after the namespaced lookup.
pub const LEGACY_ID_PATTERNS: [&str; 3] = [
    r"<instanceID>([\w-]+)</instanceID>",
    r"<uid>([\w-]+)</uid>",
    r"<uuid>([\w-]+)</uuid>",
];

/// One way of locating a submission's identifier inside its raw payload.
pub trait IdentifierStrategy: Send + Sync {
    /// Short label used in diagnostics.
    fn name(&self) -> &str;

    /// Return the identifier, or `None` when this strategy does not apply.
    fn extract(&self, payload: &[u8]) -> Option<String>;
}

/// Reads `{ns}meta/{ns}instanceID` below the root element.
#[derive(Debug, Clone)]
pub struct NamespacedMetaStrategy {
    namespace: String,
    element: String,
}

impl NamespacedMetaStrategy {
    pub fn new(namespace: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            element: element.into(),
        }
    }
}

impl Default for NamespacedMetaStrategy {
    fn default() -> Self {
        Self::new(OPENROSA_META_NS, "instanceID")
    }
}

impl IdentifierStrategy for NamespacedMetaStrategy {
    fn name(&self) -> &str {
        "namespaced-meta"
    }

    fn extract(&self, payload: &[u8]) -> Option<String> {
        let mut reader = NsReader::from_reader(payload);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut meta_depth: Option<usize> = None;
        let mut capturing = false;
        let mut text = String::new();

        loop {
            let (resolved, event) = match reader.read_resolved_event_into(&mut buf) {
                Ok(pair) => pair,
                Err(err) => {
                    debug!(error = %err, "namespaced_meta_parse_failed");
                    return None;
                }
            };
            let in_namespace = matches!(
                resolved,
                ResolveResult::Bound(Namespace(ns)) if ns == self.namespace.as_bytes()
            );

            match event {
                Event::Start(start) => {
                    depth += 1;
                    let local = start.local_name();
                    if meta_depth.is_none() && depth == 2 && in_namespace && local.as_ref() == b"meta"
                    {
                        meta_depth = Some(depth);
                    } else if meta_depth == Some(depth - 1)
                        && in_namespace
                        && local.as_ref() == self.element.as_bytes()
                    {
                        capturing = true;
                        text.clear();
                    }
                }
                Event::Text(chunk) if capturing => match chunk.unescape() {
                    Ok(value) => text.push_str(&value),
                    Err(err) => {
                        debug!(error = %err, "namespaced_meta_unescape_failed");
                        return None;
                    }
                },
                Event::CData(chunk) if capturing => {
                    text.push_str(&String::from_utf8_lossy(&chunk));
                }
                Event::End(_) => {
                    if capturing {
                        capturing = false;
                        let value = text.trim();
                        if !value.is_empty() {
                            return Some(value.to_string());
                        }
                    }
                    if meta_depth == Some(depth) {
                        meta_depth = None;
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => return None,
                _ => {}
            }
            buf.clear();
        }
    }
}

/// Regex search over the payload text; the first capture group is the identifier.
#[derive(Debug, Clone)]
pub struct PatternStrategy {
    regex: Regex,
}

impl PatternStrategy {
    pub fn new(pattern: &str) -> Result<Self, IngestError> {
        let regex = Regex::new(pattern).map_err(|err| IngestError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;
        if regex.captures_len() != 2 {
            return Err(IngestError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: format!(
                    "expected exactly one capture group, found {}",
                    regex.captures_len() - 1
                ),
            });
        }
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl IdentifierStrategy for PatternStrategy {
    fn name(&self) -> &str {
        self.regex.as_str()
    }

    fn extract(&self, payload: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(payload);
        self.regex
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Ordered list of identifier strategies. First hit wins.
pub struct IdentifierExtractor {
    strategies: Vec<Box<dyn IdentifierStrategy>>,
}

impl IdentifierExtractor {
    /// An extractor with no strategies; every payload resolves to `""`.
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Build the default chain followed by the configured extra patterns.
    pub fn from_config(cfg: &IdentifierConfig) -> Result<Self, IngestError> {
        cfg.extra_patterns
            .iter()
            .try_fold(Self::default(), |extractor, pattern| {
                extractor.with_pattern(pattern)
            })
    }

    /// Append a regex strategy after all existing ones.
    pub fn with_pattern(self, pattern: &str) -> Result<Self, IngestError> {
        Ok(self.with_strategy(PatternStrategy::new(pattern)?))
    }

    /// Append an arbitrary strategy after all existing ones.
    pub fn with_strategy<S: IdentifierStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Strategy labels in evaluation order.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the strategies in order and return the first identifier found.
    pub fn find(&self, payload: &[u8]) -> Option<String> {
        self.strategies.iter().find_map(|strategy| {
            let found = strategy.extract(payload)?;
            debug!(strategy = strategy.name(), instance_id = %found, "identifier_extracted");
            Some(found)
        })
    }

    /// Like [`find`](Self::find) but degrades to the empty string.
    pub fn extract(&self, payload: &[u8]) -> String {
        self.find(payload).unwrap_or_default()
    }
}

impl Default for IdentifierExtractor {
    fn default() -> Self {
        let mut extractor = Self::empty().with_strategy(NamespacedMetaStrategy::default());
        for pattern in LEGACY_ID_PATTERNS {
            let strategy = PatternStrategy::new(pattern).expect("built-in identifier pattern");
            extractor = extractor.with_strategy(strategy);
        }
        extractor
    }
}

impl fmt::Debug for IdentifierExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierExtractor")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}
