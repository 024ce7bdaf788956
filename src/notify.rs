//! Post-save notification of downstream consumers.
//!
//! Observers run synchronously, in registration order, after a document has
//! been written and its attachments stored. The first failure stops the
//! chain and is handed back to the gateway; it is never swallowed.
use std::fmt;
use std::sync::Arc;

use store::InstanceDocument;
use thiserror::Error;
use tracing::info;

/// A downstream consumer failed while handling a saved document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("observer `{observer}` failed: {message}")]
pub struct NotifyError {
    pub observer: String,
    pub message: String,
}

impl NotifyError {
    pub fn new(observer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            message: message.into(),
        }
    }
}

/// Receives a `document_saved` event for every newly stored instance.
pub trait SubmissionObserver: Send + Sync {
    fn name(&self) -> &str;

    fn document_saved(&self, document: &InstanceDocument) -> Result<(), NotifyError>;
}

/// Ordered set of observers.
#[derive(Clone, Default)]
pub struct Notifier {
    observers: Vec<Arc<dyn SubmissionObserver>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn SubmissionObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `document_saved` to every observer, stopping at the first failure.
    pub fn document_saved(&self, document: &InstanceDocument) -> Result<(), NotifyError> {
        for observer in &self.observers {
            observer.document_saved(document)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.observers.iter().map(|o| o.name()).collect();
        f.debug_struct("Notifier").field("observers", &names).finish()
    }
}

/// Emits one structured `document_saved` event per stored instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SubmissionObserver for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    fn document_saved(&self, document: &InstanceDocument) -> Result<(), NotifyError> {
        info!(
            id = %document.id,
            kind = %document.kind,
            xmlns = ?document.metadata.xmlns,
            username = ?document.metadata.username,
            attachments = document.attachments.len(),
            "document_saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct Recording {
        name: &'static str,
        fail: bool,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl SubmissionObserver for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn document_saved(&self, document: &InstanceDocument) -> Result<(), NotifyError> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, document.id));
            if self.fail {
                Err(NotifyError::new(self.name, "case processing blew up"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn observers_run_in_order_and_stop_at_first_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = Notifier::new();
        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            notifier.register(Arc::new(Recording {
                name,
                fail,
                seen: Arc::clone(&seen),
            }));
        }

        let doc = InstanceDocument::instance("doc-1", Bytes::from_static(b"<a/>"));
        let err = notifier.document_saved(&doc).unwrap_err();

        assert_eq!(err.observer, "second");
        assert_eq!(*seen.lock().unwrap(), vec!["first:doc-1", "second:doc-1"]);
    }

    #[test]
    fn empty_notifier_succeeds() {
        let doc = InstanceDocument::instance("doc-1", Bytes::from_static(b"<a/>"));
        assert!(Notifier::new().document_saved(&doc).is_ok());
        assert!(TracingObserver.document_saved(&doc).is_ok());
    }
}
