//! Corkboard Core Library
//!
//! Platform-agnostic interaction engine for the Corkboard collaborative
//! whiteboard: viewport, object store with frame containment, hit testing,
//! connector anchoring, the tool state machine and the undo log.

pub mod anchors;
pub mod config;
pub mod engine;
pub mod frames;
pub mod history;
pub mod input;
pub mod patch;
pub mod presence;
pub mod raster;
pub mod render;
pub mod replication;
pub mod selection;
pub mod shapes;
pub mod storage;
pub mod store;
pub mod tools;
pub mod viewport;

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[cfg(target_arch = "wasm32")]
pub use web_time::{Instant, SystemTime, UNIX_EPOCH};

pub use config::EngineConfig;
pub use engine::{CanvasEngine, EngineError, EngineEvent};
pub use history::{History, HistoryError, UndoAction};
pub use input::{Key, Modifiers, PointerButton, PointerEvent, PointerKind};
pub use patch::ObjectPatch;
pub use replication::{MemoryReplica, ReplicationAdapter};
pub use selection::SelectionSet;
pub use shapes::{BoardObject, ObjectId, Shape};
pub use store::ObjectStore;
pub use tools::{ToolEvent, ToolKind, ToolSettings};
pub use viewport::{Viewport, ViewportController};

/// Milliseconds since the Unix epoch, 0 if the clock is before it.
pub(crate) fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
