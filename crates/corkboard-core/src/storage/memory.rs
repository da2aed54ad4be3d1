//! In-memory history storage.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::history::HistorySnapshot;
use std::collections::HashMap;
use std::sync::RwLock;

/// Ephemeral storage for tests and sessions without a disk.
#[derive(Default)]
pub struct MemoryStorage {
    snapshots: RwLock<HashMap<String, HistorySnapshot>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {e}"))
}

impl Storage for MemoryStorage {
    fn save(&self, doc_id: &str, snapshot: &HistorySnapshot) -> BoxFuture<'_, StorageResult<()>> {
        let doc_id = doc_id.to_string();
        let snapshot = snapshot.clone();
        Box::pin(async move {
            let mut snapshots = self.snapshots.write().map_err(lock_error)?;
            snapshots.insert(doc_id, snapshot);
            Ok(())
        })
    }

    fn load(&self, doc_id: &str) -> BoxFuture<'_, StorageResult<HistorySnapshot>> {
        let doc_id = doc_id.to_string();
        Box::pin(async move {
            let snapshots = self.snapshots.read().map_err(lock_error)?;
            snapshots
                .get(&doc_id)
                .cloned()
                .ok_or(StorageError::NotFound(doc_id))
        })
    }

    fn delete(&self, doc_id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let doc_id = doc_id.to_string();
        Box::pin(async move {
            let mut snapshots = self.snapshots.write().map_err(lock_error)?;
            snapshots.remove(&doc_id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let snapshots = self.snapshots.read().map_err(lock_error)?;
            Ok(snapshots.keys().cloned().collect())
        })
    }
}
