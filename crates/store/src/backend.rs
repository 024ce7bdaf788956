use crate::StoreError;
use std::collections::HashMap;
use std::sync::RwLock;

/// Key-value storage underneath the document store.
///
/// The only concurrency primitive the pipeline relies on is
/// [`insert_new`](StoreBackend::insert_new): it must check for an existing key
/// and insert in one atomic step so two writers racing for the same key see
/// exactly one winner.
pub trait StoreBackend: Send + Sync {
    /// Insert `value` under `key` only if the key is free.
    /// Returns `Ok(false)` when the key is already occupied.
    fn insert_new(&self, key: &str, value: &[u8]) -> Result<bool, StoreError>;
    /// Insert or overwrite.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Remove a key. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
    /// Visit every stored entry.
    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
    /// Flush any buffered writes.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use store::BackendConfig;
///
/// let config = BackendConfig::in_memory();
/// let config = BackendConfig::redb("/var/lib/formvault/forms.redb");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BackendConfig {
    /// Redb database file at `path`. Requires the `backend-redb` feature.
    Redb { path: String },
    /// Process-local `HashMap`; contents vanish on drop.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the configured backend.
    pub fn build(&self) -> Result<Box<dyn StoreBackend>, StoreError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Box::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(StoreError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// An in-memory backend using a `RwLock` around a `HashMap`.
#[derive(Default)]
pub struct InMemoryBackend {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for InMemoryBackend {
    fn insert_new(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        // Check and insert under one write guard.
        let mut guard = self
            .records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        if guard.contains_key(key) {
            return Ok(false);
        }
        guard.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?
            .remove(key)
            .is_some())
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        for (key, value) in guard.iter() {
            visitor(key, value)?;
        }
        Ok(())
    }
}

#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use redb::RedbBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_new_refuses_occupied_key() {
        let backend = InMemoryBackend::new();
        assert!(backend.insert_new("k", b"one").unwrap());
        assert!(!backend.insert_new("k", b"two").unwrap());
        assert_eq!(backend.get("k").unwrap(), Some(b"one".to_vec()));
    }

    #[test]
    fn delete_reports_presence() {
        let backend = InMemoryBackend::new();
        backend.put("k", b"v").unwrap();
        assert!(backend.delete("k").unwrap());
        assert!(!backend.delete("k").unwrap());
    }

    #[test]
    fn racing_inserts_have_one_winner() {
        use std::sync::Arc;
        use std::thread;

        let backend = Arc::new(InMemoryBackend::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let backend = Arc::clone(&backend);
                thread::spawn(move || backend.insert_new("same", &[i]).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
