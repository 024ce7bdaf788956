//! Redb backend for persistent document storage.
//!
//! Every mutation runs in its own write transaction. Redb serializes write
//! transactions, so the existence check and insert in
//! [`insert_new`](crate::StoreBackend::insert_new) cannot interleave with
//! another writer.
//!
//! # Configuration Example
//! ```yaml
//! store:
//!   backend: "redb"
//!   path: "/var/lib/formvault/forms.redb"
//! ```

use crate::{StoreBackend, StoreError};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("formvault_documents");

/// Redb-backed key-value storage.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a database file and make sure the documents table exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::backend)?;

        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            let _table = write_txn
                .open_table(DOCUMENTS)
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreBackend for RedbBackend {
    fn insert_new(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let inserted = {
            let mut table = write_txn
                .open_table(DOCUMENTS)
                .map_err(StoreError::backend)?;
            let occupied = table.get(key).map_err(StoreError::backend)?.is_some();
            if !occupied {
                table.insert(key, value).map_err(StoreError::backend)?;
            }
            !occupied
        };
        if inserted {
            write_txn.commit().map_err(StoreError::backend)?;
        } else {
            write_txn.abort().map_err(StoreError::backend)?;
        }
        Ok(inserted)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn
                .open_table(DOCUMENTS)
                .map_err(StoreError::backend)?;
            table.insert(key, value).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(DOCUMENTS)
            .map_err(StoreError::backend)?;
        let value = table.get(key).map_err(StoreError::backend)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let existed = {
            let mut table = write_txn
                .open_table(DOCUMENTS)
                .map_err(StoreError::backend)?;
            let removed = table.remove(key).map_err(StoreError::backend)?;
            removed.is_some()
        };
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(existed)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(DOCUMENTS)
            .map_err(StoreError::backend)?;

        for item in table.iter().map_err(StoreError::backend)? {
            let (key, value) = item.map_err(StoreError::backend)?;
            visitor(key.value(), value.value())?;
        }
        Ok(())
    }
}
