//! Durable storage for per-document undo history.

mod autosave;
mod memory;

#[cfg(not(target_arch = "wasm32"))]
mod file;

pub use autosave::{DEFAULT_AUTOSAVE_INTERVAL, HistoryAutosave};
pub use memory::MemoryStorage;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

use crate::history::HistorySnapshot;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("History not found for document: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Backend persisting history snapshots keyed by document id.
///
/// Native implementations must be Send + Sync; on WASM the bounds are
/// dropped since everything runs on one thread.
#[cfg(not(target_arch = "wasm32"))]
pub trait Storage: Send + Sync {
    fn save(&self, doc_id: &str, snapshot: &HistorySnapshot) -> BoxFuture<'_, StorageResult<()>>;

    fn load(&self, doc_id: &str) -> BoxFuture<'_, StorageResult<HistorySnapshot>>;

    fn delete(&self, doc_id: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// Ids of documents with stored history.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;
}

#[cfg(target_arch = "wasm32")]
pub trait Storage {
    fn save(&self, doc_id: &str, snapshot: &HistorySnapshot) -> BoxFuture<'_, StorageResult<()>>;

    fn load(&self, doc_id: &str) -> BoxFuture<'_, StorageResult<HistorySnapshot>>;

    fn delete(&self, doc_id: &str) -> BoxFuture<'_, StorageResult<()>>;

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;
}

/// Minimal executor for the storage futures in tests.
#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
