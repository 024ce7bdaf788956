//! Hard failures, quarantine after post-save failures, and the guarantee that
//! a failed deprecation never loses the superseded payload.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use formvault::{
    Attachment, DocKind, DownstreamError, FormStore, GatewayConfig, InstanceDocument,
    NotifyError, PipelineError, PostOptions, PostResponse, StoreError, Submission,
    SubmissionEndpoint, SubmissionGateway, SubmissionObserver, SubmissionOutcome,
};
use store::{CompressionConfig, InMemoryBackend, SequenceGenerator, StoreBackend};

fn form(id: &str, value: &str) -> Vec<u8> {
    format!(
        "<data xmlns='urn:visit'><value>{value}</value>\
         <meta xmlns='http://openrosa.org/jr/xforms'><instanceID>{id}</instanceID></meta></data>"
    )
    .into_bytes()
}

/// Switches that make the wrapped backend fail specific operations.
#[derive(Default)]
struct Faults {
    /// Number of `insert_new` calls allowed through before `inserts` applies.
    insert_grace: AtomicUsize,
    /// Number of upcoming `insert_new` calls to fail.
    inserts: AtomicUsize,
    puts: AtomicBool,
    deletes: AtomicBool,
}

struct FaultyBackend {
    inner: InMemoryBackend,
    faults: Arc<Faults>,
}

impl StoreBackend for FaultyBackend {
    fn insert_new(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let in_grace = take_one(&self.faults.insert_grace);
        if !in_grace && take_one(&self.faults.inserts) {
            return Err(StoreError::backend("injected insert failure"));
        }
        self.inner.insert_new(key, value)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self.faults.puts.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected put failure"));
        }
        self.inner.put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        if self.faults.deletes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected delete failure"));
        }
        self.inner.delete(key)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.inner.scan(visitor)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn faulty_store() -> (Arc<FormStore>, Arc<Faults>) {
    let faults = Arc::new(Faults::default());
    let backend = FaultyBackend {
        inner: InMemoryBackend::new(),
        faults: Arc::clone(&faults),
    };
    let store = FormStore::with_backend(
        Box::new(backend),
        CompressionConfig::default(),
        Arc::new(SequenceGenerator::new("doc")),
    );
    (Arc::new(store), faults)
}

fn gateway(store: &Arc<FormStore>) -> SubmissionGateway {
    SubmissionGateway::with_store(Arc::clone(store), &GatewayConfig::default()).unwrap()
}

fn documents(store: &FormStore) -> Vec<InstanceDocument> {
    store.list().unwrap()
}

/// The superseded payload must survive either at its identifier or as a
/// `deprecated` copy pointing back at it.
fn assert_original_recoverable(store: &FormStore, id: &str, original: &[u8]) {
    let at_id = store
        .find(id)
        .unwrap()
        .is_some_and(|d| d.payload.as_ref() == original);
    let as_copy = documents(store).iter().any(|d| {
        d.kind == DocKind::Deprecated
            && d.orig_id.as_deref() == Some(id)
            && d.payload.as_ref() == original
    });
    assert!(at_id || as_copy, "original payload of `{id}` was lost");
}

#[test]
fn unrecoverable_first_write_is_logged_with_original_bytes() {
    let (store, faults) = faulty_store();
    faults.inserts.store(1, Ordering::SeqCst);
    let payload = form("X", "1");

    let outcome = gateway(&store).submit(&Submission::new(payload.clone()));

    let SubmissionOutcome::Failed(err) = outcome else {
        panic!("expected hard failure");
    };
    assert!(err.persisted);
    assert!(matches!(err.cause, PipelineError::Store(StoreError::Backend(_))));
    let log = store.get(&err.error_log.id).unwrap();
    assert_eq!(log.kind, DocKind::ErrorLog);
    assert_eq!(log.payload.as_ref(), payload.as_slice());
    assert!(log.problem.unwrap().contains("injected insert failure"));
    assert!(store.find("X").unwrap().is_none());
}

#[test]
fn failure_log_that_cannot_be_written_is_still_returned() {
    let (store, faults) = faulty_store();
    faults.inserts.store(usize::MAX, Ordering::SeqCst);
    let payload = form("X", "1");

    let err = gateway(&store)
        .submit(&Submission::new(payload.clone()))
        .into_result()
        .unwrap_err();

    assert!(!err.persisted);
    assert_eq!(err.error_log.payload.as_ref(), payload.as_slice());
    assert!(documents(&store).is_empty());
}

#[test]
fn failed_copy_leaves_original_in_place() {
    let (store, faults) = faulty_store();
    let gateway = gateway(&store);
    let v1 = form("X", "1");
    gateway.submit(&Submission::new(v1.clone()));

    // Let the conflicting create through; fail the copy.
    faults.insert_grace.store(1, Ordering::SeqCst);
    faults.inserts.store(1, Ordering::SeqCst);
    let outcome = gateway.submit(&Submission::new(form("X", "2")));

    let SubmissionOutcome::Failed(err) = outcome else {
        panic!("expected hard failure");
    };
    assert!(err.persisted);
    assert!(matches!(err.cause, PipelineError::Store(StoreError::Backend(_))));
    assert_eq!(store.get("X").unwrap().kind, DocKind::Instance);
    assert_original_recoverable(&store, "X", &v1);
    assert!(
        documents(&store)
            .iter()
            .all(|d| d.kind != DocKind::Deprecated)
    );
}

#[test]
fn failed_deprecation_save_removes_the_orphan_copy() {
    let (store, faults) = faulty_store();
    let gateway = gateway(&store);
    let v1 = form("X", "1");
    gateway.submit(&Submission::new(v1.clone()));

    faults.puts.store(true, Ordering::SeqCst);
    let err = gateway
        .submit(&Submission::new(form("X", "2")))
        .into_result()
        .unwrap_err();

    assert!(err.persisted);
    assert_original_recoverable(&store, "X", &v1);
    let kinds: Vec<DocKind> = documents(&store).iter().map(|d| d.kind).collect();
    assert_eq!(kinds.iter().filter(|k| **k == DocKind::Instance).count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == DocKind::ErrorLog).count(), 1);
}

#[test]
fn failed_delete_keeps_both_original_and_deprecated_copy() {
    let (store, faults) = faulty_store();
    let gateway = gateway(&store);
    let v1 = form("X", "1");
    let v2 = form("X", "2");
    gateway.submit(&Submission::new(v1.clone()));

    faults.deletes.store(true, Ordering::SeqCst);
    let err = gateway
        .submit(&Submission::new(v2.clone()))
        .into_result()
        .unwrap_err();

    assert_eq!(store.payload("X").unwrap().as_ref(), v1.as_slice());
    assert_original_recoverable(&store, "X", &v1);
    assert_eq!(store.get(&err.error_log.id).unwrap().payload.as_ref(), v2.as_slice());
}

struct FailingObserver {
    calls: Mutex<Vec<String>>,
}

impl SubmissionObserver for FailingObserver {
    fn name(&self) -> &str {
        "case-processor"
    }

    fn document_saved(&self, document: &InstanceDocument) -> Result<(), NotifyError> {
        self.calls.lock().unwrap().push(document.id.clone());
        Err(NotifyError::new("case-processor", "case update rejected"))
    }
}

#[test]
fn observer_failure_quarantines_the_saved_document() {
    let store = Arc::new(FormStore::in_memory());
    let observer = Arc::new(FailingObserver {
        calls: Mutex::new(Vec::new()),
    });
    let gateway = gateway(&store).with_observer(observer.clone());

    let outcome = gateway.submit(&Submission::new(form("X", "1")));

    let SubmissionOutcome::StoredWithDownstreamFailure { document, cause } = outcome else {
        panic!("expected downstream failure");
    };
    assert!(matches!(cause, DownstreamError::Observer(_)));
    assert_eq!(document.id, "X");
    assert_eq!(document.kind, DocKind::Error);
    assert!(document.problem.unwrap().contains("case update rejected"));
    assert_eq!(store.get("X").unwrap().kind, DocKind::Error);
    assert_eq!(*observer.calls.lock().unwrap(), vec!["X".to_string()]);
}

#[test]
fn duplicates_do_not_notify_observers() {
    let store = Arc::new(FormStore::in_memory());
    let gateway = gateway(&store);
    gateway.submit(&Submission::new(form("X", "1")));

    let observer = Arc::new(FailingObserver {
        calls: Mutex::new(Vec::new()),
    });
    let gateway = gateway.with_observer(observer.clone());
    let retry = gateway.submit(&Submission::new(form("X", "1")));

    assert_eq!(retry.kind(), DocKind::Duplicate);
    assert!(observer.calls.lock().unwrap().is_empty());
}

/// Accepts the create, then refuses every later write.
struct LockAfterCreate {
    store: Arc<FormStore>,
    faults: Arc<Faults>,
}

impl SubmissionEndpoint for LockAfterCreate {
    fn post(
        &self,
        payload: &bytes::Bytes,
        _: &PostOptions,
    ) -> Result<PostResponse, StoreError> {
        let doc = InstanceDocument::instance("locked", payload.clone());
        self.store.create(&doc)?;
        self.faults.puts.store(true, Ordering::SeqCst);
        Ok(PostResponse::stored(doc.id))
    }
}

#[test]
fn unquarantinable_attachment_failure_falls_back_to_failure_log() {
    let (store, faults) = faulty_store();
    let endpoint = Arc::new(LockAfterCreate {
        store: Arc::clone(&store),
        faults: Arc::clone(&faults),
    });
    let gateway =
        SubmissionGateway::from_parts(Arc::clone(&store), endpoint, &GatewayConfig::default())
            .unwrap();
    let submission = Submission::new(form("X", "1"))
        .with_attachment("photo.jpg", Attachment::new("image/jpeg", vec![1, 2, 3]))
        .unwrap();

    let err = gateway.submit(&submission).into_result().unwrap_err();

    let PipelineError::Downstream(DownstreamError::Attachment { name, .. }) = &err.cause else {
        panic!("unexpected cause {:?}", err.cause);
    };
    assert_eq!(name, "photo.jpg");
    let log = store.get(&err.error_log.id).unwrap();
    assert_eq!(log.kind, DocKind::ErrorLog);
    assert_eq!(log.attachments["photo.jpg"].length, 3);
}

/// Simulates a competing writer that re-occupies the identifier before every post.
struct RacingEndpoint {
    store: Arc<FormStore>,
    rivals: AtomicUsize,
}

impl SubmissionEndpoint for RacingEndpoint {
    fn post(
        &self,
        _payload: &bytes::Bytes,
        options: &PostOptions,
    ) -> Result<PostResponse, StoreError> {
        if let Some(uid) = &options.uid {
            return Ok(PostResponse::stored(uid.clone()));
        }
        let n = self.rivals.fetch_add(1, Ordering::SeqCst);
        let rival = InstanceDocument::instance("race", form("race", &format!("rival-{n}")).into());
        self.store.save(&rival)?;
        Err(StoreError::Conflict {
            id: "race".to_string(),
        })
    }
}

#[test]
fn endless_conflicts_stop_after_configured_rounds() {
    let store = Arc::new(FormStore::in_memory());
    let endpoint = Arc::new(RacingEndpoint {
        store: Arc::clone(&store),
        rivals: AtomicUsize::new(0),
    });
    let cfg = GatewayConfig {
        max_conflict_rounds: 3,
        ..GatewayConfig::default()
    };
    let gateway = SubmissionGateway::from_parts(Arc::clone(&store), endpoint, &cfg).unwrap();

    let err = gateway
        .submit(&Submission::new(form("race", "mine")))
        .into_result()
        .unwrap_err();

    assert_eq!(
        err.cause,
        PipelineError::ConflictRoundsExhausted {
            id: "race".to_string(),
            rounds: 3
        }
    );
    let deprecated = documents(&store)
        .into_iter()
        .filter(|d| d.kind == DocKind::Deprecated)
        .count();
    assert_eq!(deprecated, 3);
}

/// Writes a pending record at the key being deleted just before the delete,
/// as if a concurrent deprecation had freed the identifier and a third
/// submitter had stored a new instance there in between.
struct InterleavingBackend {
    inner: InMemoryBackend,
    pending: Arc<Mutex<Option<Vec<u8>>>>,
}

impl StoreBackend for InterleavingBackend {
    fn insert_new(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        self.inner.insert_new(key, value)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.inner.put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        if let Some(record) = self.pending.lock().unwrap().take() {
            self.inner.put(key, &record)?;
        }
        self.inner.delete(key)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.inner.scan(visitor)
    }
}

// The delete during a deprecation is unconditional, so an instance written
// between the copy and the delete is removed without ever being copied.
#[test]
fn delete_after_interleaved_write_drops_that_write() {
    let pending = Arc::new(Mutex::new(None));
    let backend = InterleavingBackend {
        inner: InMemoryBackend::new(),
        pending: Arc::clone(&pending),
    };
    let store = Arc::new(FormStore::with_backend(
        Box::new(backend),
        CompressionConfig::default(),
        Arc::new(SequenceGenerator::new("doc")),
    ));
    let gateway = gateway(&store);
    let original = form("X", "1");
    let interleaved = form("X", "A");
    let edit = form("X", "2");

    assert!(gateway.submit(&Submission::new(original.clone())).is_stored());
    let record = CompressionConfig::default()
        .encode(&InstanceDocument::instance("X", interleaved.clone().into()))
        .unwrap();
    *pending.lock().unwrap() = Some(record);

    let outcome = gateway.submit(&Submission::new(edit.clone()));

    assert!(outcome.is_stored());
    assert_eq!(store.get("X").unwrap().payload.as_ref(), edit.as_slice());
    assert_original_recoverable(&store, "X", &original);
    assert!(
        documents(&store)
            .iter()
            .all(|d| d.payload.as_ref() != interleaved.as_slice()),
        "interleaved write unexpectedly survived"
    );
}
