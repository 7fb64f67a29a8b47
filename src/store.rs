//! Embedded transactional key-value storage.
//!
//! Values live in named tables ("buckets") inside a single redb database
//! file. Every operation runs in its own transaction: reads use a read
//! transaction, writes commit before returning. Keys within a bucket are
//! iterated in byte order.

use std::path::Path;
use std::sync::Arc;

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition, TableHandle,
};

/// Storage error. `NotFound` maps to a 404 at the HTTP layer; everything
/// else is an internal fault.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("failed to open database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table access failed: {0}")]
    Table(redb::TableError),

    #[error("storage failed: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit failed: {0}")]
    Commit(#[from] redb::CommitError),
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        match err {
            // Opening a table that was never written means the bucket
            // does not exist.
            redb::TableError::TableDoesNotExist(_) => StoreError::NotFound,
            other => StoreError::Table(other),
        }
    }
}

fn bucket_table(name: &str) -> TableDefinition<'_, &str, &[u8]> {
    TableDefinition::new(name)
}

/// Handle to the embedded store. Cheap to clone; all clones share one
/// database.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Fetch the value stored under `bucket`/`key`.
    pub fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(bucket_table(bucket))?;
        let value = table.get(key)?.ok_or(StoreError::NotFound)?;
        Ok(value.value().to_vec())
    }

    /// Store `value` under `bucket`/`key`, creating the bucket if needed.
    pub fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(bucket_table(bucket))?;
            table.insert(key, value)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete `key` from `bucket`.
    ///
    /// A missing bucket is `NotFound`; deleting a key that is already
    /// absent from an existing bucket succeeds, matching the engine's
    /// delete semantics.
    pub fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        let exists = tx.list_tables()?.any(|t| t.name() == bucket);
        if !exists {
            tx.abort()?;
            return Err(StoreError::NotFound);
        }
        {
            let mut table = tx.open_table(bucket_table(bucket))?;
            table.remove(key)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// List all keys in `bucket` in byte order.
    pub fn list(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(bucket_table(bucket))?;
        let mut keys = Vec::with_capacity(table.len()? as usize);
        for entry in table.iter()? {
            let (key, _) = entry?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("kv.db")).expect("open store");
        (dir, store)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (_dir, store) = temp_store();
        store.put("users", "alice", b"hello").unwrap();
        assert_eq!(store.get("users", "alice").unwrap(), b"hello");
    }

    #[test]
    fn put_overwrites_existing_value() {
        let (_dir, store) = temp_store();
        store.put("users", "alice", b"one").unwrap();
        store.put("users", "alice", b"two").unwrap();
        assert_eq!(store.get("users", "alice").unwrap(), b"two");
    }

    #[test]
    fn get_missing_bucket_is_not_found() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.get("nope", "key"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn get_missing_key_is_not_found() {
        let (_dir, store) = temp_store();
        store.put("users", "alice", b"hello").unwrap();
        assert!(matches!(
            store.get("users", "bob"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_removes_key() {
        let (_dir, store) = temp_store();
        store.put("users", "alice", b"hello").unwrap();
        store.delete("users", "alice").unwrap();
        assert!(matches!(
            store.get("users", "alice"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_missing_bucket_is_not_found() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.delete("nope", "key"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_missing_key_in_existing_bucket_succeeds() {
        let (_dir, store) = temp_store();
        store.put("users", "alice", b"hello").unwrap();
        store.delete("users", "bob").unwrap();
        // The other key is untouched
        assert_eq!(store.get("users", "alice").unwrap(), b"hello");
    }

    #[test]
    fn list_returns_keys_in_order() {
        let (_dir, store) = temp_store();
        store.put("files", "c", b"3").unwrap();
        store.put("files", "a", b"1").unwrap();
        store.put("files", "b", b"2").unwrap();
        assert_eq!(store.list("files").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn list_missing_bucket_is_not_found() {
        let (_dir, store) = temp_store();
        assert!(matches!(store.list("nope"), Err(StoreError::NotFound)));
    }

    #[test]
    fn buckets_are_independent() {
        let (_dir, store) = temp_store();
        store.put("a", "key", b"from-a").unwrap();
        store.put("b", "key", b"from-b").unwrap();
        assert_eq!(store.get("a", "key").unwrap(), b"from-a");
        assert_eq!(store.get("b", "key").unwrap(), b"from-b");
    }

    #[test]
    fn keys_may_contain_slashes() {
        let (_dir, store) = temp_store();
        store.put("docs", "2024/q1/report", b"data").unwrap();
        assert_eq!(store.get("docs", "2024/q1/report").unwrap(), b"data");
        assert_eq!(store.list("docs").unwrap(), vec!["2024/q1/report"]);
    }
}
