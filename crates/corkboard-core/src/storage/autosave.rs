//! Periodic persistence of undo history.

use super::{Storage, StorageError, StorageResult};
use crate::Instant;
use crate::history::History;
use std::sync::Arc;
use std::time::Duration;

/// Default interval between history saves.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5);

/// Saves a document's history when it is dirty and the interval has passed.
pub struct HistoryAutosave<S: Storage> {
    storage: Arc<S>,
    doc_id: String,
    interval: Duration,
    last_save: Option<Instant>,
}

impl<S: Storage> HistoryAutosave<S> {
    pub fn new(storage: Arc<S>, doc_id: impl Into<String>) -> Self {
        Self {
            storage,
            doc_id: doc_id.into(),
            interval: DEFAULT_AUTOSAVE_INTERVAL,
            last_save: None,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn should_save(&self, history: &History, now: Instant) -> bool {
        if !history.is_dirty() {
            return false;
        }
        match self.last_save {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Save if needed. Returns true if a save was performed.
    pub async fn maybe_save(&mut self, history: &mut History, now: Instant) -> StorageResult<bool> {
        if !self.should_save(history, now) {
            return Ok(false);
        }
        self.save(history, now).await?;
        Ok(true)
    }

    /// Save immediately.
    pub async fn save(&mut self, history: &mut History, now: Instant) -> StorageResult<()> {
        let snapshot = history.snapshot(&self.doc_id);
        if let Err(e) = self.storage.save(&self.doc_id, &snapshot).await {
            log::warn!("Failed to persist history for {}: {e}", self.doc_id);
            return Err(e);
        }
        history.mark_saved();
        self.last_save = Some(now);
        Ok(())
    }

    /// Load the stored history for this document, if any.
    pub async fn restore(&mut self, limit: usize, now: Instant) -> Option<History> {
        match self.storage.load(&self.doc_id).await {
            Ok(snapshot) => {
                log::info!(
                    "Restored history for {} ({} undo, {} redo)",
                    self.doc_id,
                    snapshot.undo.len(),
                    snapshot.redo.len()
                );
                self.last_save = Some(now);
                Some(History::restore(snapshot, limit))
            }
            Err(StorageError::NotFound(_)) => None,
            Err(e) => {
                log::warn!("Failed to load history for {}: {e}", self.doc_id);
                None
            }
        }
    }

    /// Forget the stored history for this document.
    pub async fn discard(&self) -> StorageResult<()> {
        self.storage.delete(&self.doc_id).await
    }
}
