//! Undo/redo log.
//!
//! Every entry stores the smallest delta that can be replayed in both
//! directions: field patches for updates, full snapshots for deletions and
//! creations. Replay goes to the local store first and is then mirrored to
//! the backing store.

use crate::frames::FrameContents;
use crate::patch::{ObjectPatch, PatchError};
use crate::replication::{PositionUpdate, RemoteWrite, ReplicationAdapter, dispatch};
use crate::shapes::{BoardObject, Comment, ObjectId};
use crate::store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Object {0} no longer exists")]
    TargetMissing(ObjectId),
    #[error("Object {0} already exists")]
    AlreadyExists(ObjectId),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Before/after patches of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub id: ObjectId,
    pub before: ObjectPatch,
    pub after: ObjectPatch,
}

impl FieldChange {
    /// Diff two versions of one object. None if nothing changed.
    pub fn between(before: &BoardObject, after: &BoardObject) -> Result<Option<Self>, PatchError> {
        let forward = ObjectPatch::diff(before, after)?;
        if forward.is_empty() {
            return Ok(None);
        }
        let backward = forward.capture(before)?;
        Ok(Some(Self {
            id: before.id(),
            before: backward,
            after: forward,
        }))
    }

    fn inverted(&self) -> Self {
        Self {
            id: self.id,
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

/// A reversible edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UndoAction {
    Create {
        object: BoardObject,
    },
    Update {
        change: FieldChange,
    },
    Delete {
        object: BoardObject,
    },
    BatchUpdate {
        changes: Vec<FieldChange>,
    },
    /// Removes a frame, its transitive children and the connectors touching them.
    DeleteFrameWithContents {
        frame: BoardObject,
        children: Vec<BoardObject>,
        connectors: Vec<BoardObject>,
    },
    RestoreFrameWithContents {
        frame: BoardObject,
        children: Vec<BoardObject>,
        connectors: Vec<BoardObject>,
    },
    DeleteComment {
        comment: Comment,
    },
    RestoreComment {
        comment: Comment,
    },
    /// Applied in order, inverted in reverse order.
    Compound {
        actions: Vec<UndoAction>,
    },
}

impl UndoAction {
    /// Entry for one gesture's updates: None if nothing changed, an
    /// `Update` for one object, a `BatchUpdate` for several.
    pub fn from_changes(before: &[BoardObject], after: &[BoardObject]) -> Result<Option<Self>, PatchError> {
        let mut changes = Vec::new();
        for new in after {
            if let Some(old) = before.iter().find(|o| o.id() == new.id()) {
                if let Some(change) = FieldChange::between(old, new)? {
                    changes.push(change);
                }
            }
        }
        Ok(match changes.len() {
            0 => None,
            1 => changes.pop().map(|change| UndoAction::Update { change }),
            _ => Some(UndoAction::BatchUpdate { changes }),
        })
    }

    pub fn delete_frame(frame: BoardObject, contents: FrameContents) -> Self {
        UndoAction::DeleteFrameWithContents {
            frame,
            children: contents.children,
            connectors: contents.connectors,
        }
    }

    /// The action that reverts this one.
    pub fn invert(&self) -> Self {
        match self {
            UndoAction::Create { object } => UndoAction::Delete { object: object.clone() },
            UndoAction::Delete { object } => UndoAction::Create { object: object.clone() },
            UndoAction::Update { change } => UndoAction::Update { change: change.inverted() },
            UndoAction::BatchUpdate { changes } => UndoAction::BatchUpdate {
                changes: changes.iter().map(FieldChange::inverted).collect(),
            },
            UndoAction::DeleteFrameWithContents { frame, children, connectors } => {
                UndoAction::RestoreFrameWithContents {
                    frame: frame.clone(),
                    children: children.clone(),
                    connectors: connectors.clone(),
                }
            }
            UndoAction::RestoreFrameWithContents { frame, children, connectors } => {
                UndoAction::DeleteFrameWithContents {
                    frame: frame.clone(),
                    children: children.clone(),
                    connectors: connectors.clone(),
                }
            }
            UndoAction::DeleteComment { comment } => UndoAction::RestoreComment { comment: comment.clone() },
            UndoAction::RestoreComment { comment } => UndoAction::DeleteComment { comment: comment.clone() },
            UndoAction::Compound { actions } => UndoAction::Compound {
                actions: actions.iter().rev().map(UndoAction::invert).collect(),
            },
        }
    }

    /// Ids of objects this action touches.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        match self {
            UndoAction::Create { object } | UndoAction::Delete { object } => vec![object.id()],
            UndoAction::Update { change } => vec![change.id],
            UndoAction::BatchUpdate { changes } => changes.iter().map(|c| c.id).collect(),
            UndoAction::DeleteFrameWithContents { frame, children, connectors }
            | UndoAction::RestoreFrameWithContents { frame, children, connectors } => {
                std::iter::once(frame)
                    .chain(children)
                    .chain(connectors)
                    .map(BoardObject::id)
                    .collect()
            }
            UndoAction::DeleteComment { .. } | UndoAction::RestoreComment { .. } => Vec::new(),
            UndoAction::Compound { actions } => actions.iter().flat_map(UndoAction::object_ids).collect(),
        }
    }

    /// Replay against the local store, then mirror to the backing store.
    ///
    /// Nothing is mutated when the action cannot be replayed.
    pub fn apply(&self, store: &mut ObjectStore, adapter: &mut dyn ReplicationAdapter) -> Result<(), HistoryError> {
        let mut writes = Vec::new();
        match self {
            UndoAction::Compound { .. } => {
                let mut scratch = store.clone();
                self.apply_local(&mut scratch, &mut writes)?;
                *store = scratch;
            }
            _ => self.apply_local(store, &mut writes)?,
        }
        dispatch(adapter, writes);
        Ok(())
    }

    /// Validates before mutating, except across the members of a compound.
    pub(crate) fn apply_local(&self, store: &mut ObjectStore, writes: &mut Vec<RemoteWrite>) -> Result<(), HistoryError> {
        match self {
            UndoAction::Create { object } => {
                if store.contains(object.id()) {
                    return Err(HistoryError::AlreadyExists(object.id()));
                }
                let created = store.put(object.clone()).clone();
                writes.push(RemoteWrite::Create(created));
            }
            UndoAction::Delete { object } => {
                let id = object.id();
                store.remove(id).ok_or(HistoryError::TargetMissing(id))?;
                writes.push(RemoteWrite::Delete(id));
            }
            UndoAction::Update { change } => {
                writes.push(apply_change(store, change)?);
            }
            UndoAction::BatchUpdate { changes } => {
                if let Some(missing) = changes.iter().find(|c| !store.contains(c.id)) {
                    return Err(HistoryError::TargetMissing(missing.id));
                }
                for change in changes {
                    writes.push(apply_change(store, change)?);
                }
            }
            UndoAction::DeleteFrameWithContents { frame, children, connectors } => {
                let frame_id = frame.id();
                if !store.contains(frame_id) {
                    return Err(HistoryError::TargetMissing(frame_id));
                }
                for object in std::iter::once(frame).chain(children).chain(connectors) {
                    if store.remove(object.id()).is_some() {
                        writes.push(RemoteWrite::Delete(object.id()));
                    }
                }
            }
            UndoAction::RestoreFrameWithContents { frame, children, connectors } => {
                if store.contains(frame.id()) {
                    return Err(HistoryError::AlreadyExists(frame.id()));
                }
                for object in std::iter::once(frame).chain(children).chain(connectors) {
                    if store.contains(object.id()) {
                        log::debug!("Not restoring {}: it exists again", object.id());
                        continue;
                    }
                    let restored = store.put(object.clone()).clone();
                    writes.push(RemoteWrite::Create(restored));
                }
            }
            UndoAction::DeleteComment { comment } => {
                store
                    .remove_comment(comment.id)
                    .ok_or(HistoryError::TargetMissing(comment.id))?;
                writes.push(RemoteWrite::DeleteComment(comment.id));
            }
            UndoAction::RestoreComment { comment } => {
                if store.comment(comment.id).is_some() {
                    return Err(HistoryError::AlreadyExists(comment.id));
                }
                store.put_comment(comment.clone());
                writes.push(RemoteWrite::CreateComment(comment.clone()));
            }
            UndoAction::Compound { actions } => {
                for action in actions {
                    action.apply_local(store, writes)?;
                }
            }
        }
        Ok(())
    }
}

fn apply_change(store: &mut ObjectStore, change: &FieldChange) -> Result<RemoteWrite, HistoryError> {
    let updated = store
        .apply_patch(change.id, &change.after)?
        .ok_or(HistoryError::TargetMissing(change.id))?;
    Ok(RemoteWrite::Update(PositionUpdate {
        id: change.id,
        patch: change.after.clone(),
        updated_at: updated.meta.updated_at,
    }))
}

/// Persisted form of a document's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub doc_id: String,
    pub undo: Vec<UndoAction>,
    pub redo: Vec<UndoAction>,
}

/// Bounded undo and redo stacks.
#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<UndoAction>,
    redo: VecDeque<UndoAction>,
    limit: usize,
    dirty: bool,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            limit: limit.max(1),
            dirty: false,
        }
    }

    /// Record an action that has already been applied. Clears redo.
    pub fn push(&mut self, action: UndoAction) {
        Self::push_bounded(&mut self.undo, action, self.limit);
        self.redo.clear();
        self.dirty = true;
    }

    fn push_bounded(stack: &mut VecDeque<UndoAction>, action: UndoAction, limit: usize) {
        stack.push_back(action);
        while stack.len() > limit {
            stack.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Revert the latest action. Returns the ids it touched, or None if
    /// there was nothing to undo or replay failed.
    pub fn undo(&mut self, store: &mut ObjectStore, adapter: &mut dyn ReplicationAdapter) -> Option<Vec<ObjectId>> {
        let action = self.undo.pop_back()?;
        match action.invert().apply(store, adapter) {
            Ok(()) => {
                let ids = action.object_ids();
                Self::push_bounded(&mut self.redo, action, self.limit);
                self.dirty = true;
                Some(ids)
            }
            Err(e) => {
                log::warn!("Undo failed, keeping the entry: {e}");
                self.undo.push_back(action);
                None
            }
        }
    }

    /// Re-apply the latest undone action.
    pub fn redo(&mut self, store: &mut ObjectStore, adapter: &mut dyn ReplicationAdapter) -> Option<Vec<ObjectId>> {
        let action = self.redo.pop_back()?;
        match action.apply(store, adapter) {
            Ok(()) => {
                let ids = action.object_ids();
                Self::push_bounded(&mut self.undo, action, self.limit);
                self.dirty = true;
                Some(ids)
            }
            Err(e) => {
                log::warn!("Redo failed, keeping the entry: {e}");
                self.redo.push_back(action);
                None
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.dirty = true;
    }

    /// Whether the stacks changed since the last [`History::mark_saved`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn snapshot(&self, doc_id: &str) -> HistorySnapshot {
        HistorySnapshot {
            doc_id: doc_id.to_string(),
            undo: self.undo.iter().cloned().collect(),
            redo: self.redo.iter().cloned().collect(),
        }
    }

    /// Rebuild from a persisted snapshot, keeping the newest entries.
    pub fn restore(snapshot: HistorySnapshot, limit: usize) -> Self {
        let mut history = Self::new(limit);
        for action in snapshot.undo {
            Self::push_bounded(&mut history.undo, action, history.limit);
        }
        for action in snapshot.redo {
            Self::push_bounded(&mut history.redo, action, history.limit);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{MemoryReplica, ReplicaCall};
    use crate::shapes::{Frame, Placement, Shape, Sticky};
    use kurbo::Point;

    fn note(x: f64) -> BoardObject {
        BoardObject::new(
            "a",
            Shape::Sticky(Sticky::new(Placement::new(Point::new(x, 0.0), 100.0, 100.0), "note")),
        )
    }

    /// Objects with write stamps cleared, sorted by id.
    fn normalized(store: &ObjectStore) -> Vec<BoardObject> {
        let mut objects = store.snapshot();
        for object in &mut objects {
            object.meta.updated_at = 0;
        }
        objects.sort_by_key(BoardObject::id);
        objects
    }

    fn record(store: &mut ObjectStore, history: &mut History, before: Vec<BoardObject>, after: Vec<BoardObject>) {
        for object in &after {
            store.put(object.clone());
        }
        if let Some(action) = UndoAction::from_changes(&before, &after).unwrap() {
            history.push(action);
        }
    }

    #[test]
    fn test_update_undo_redo_inverse_law() {
        let mut store = ObjectStore::new();
        let mut replica = MemoryReplica::new();
        let mut history = History::new(10);
        let original = note(0.0);
        let id = original.id();
        store.put(original.clone());
        let pre = normalized(&store);

        let mut moved = original.clone();
        moved.shape.translate(kurbo::Vec2::new(40.0, 10.0));
        moved.shape.placement_mut().unwrap().width = 300.0;
        record(&mut store, &mut history, vec![original], vec![moved]);
        let post = normalized(&store);

        assert!(history.undo(&mut store, &mut replica).is_some());
        assert_eq!(normalized(&store), pre);
        assert!(history.redo(&mut store, &mut replica).is_some());
        assert_eq!(normalized(&store), post);
        assert_eq!(store.get(id).unwrap().shape.placement().unwrap().width, 300.0);
    }

    #[test]
    fn test_push_clears_redo_and_bounds_stack() {
        let mut store = ObjectStore::new();
        let mut replica = MemoryReplica::new();
        let mut history = History::new(2);
        for x in [0.0, 1.0, 2.0] {
            let object = note(x);
            store.put(object.clone());
            history.push(UndoAction::Create { object });
        }
        assert_eq!(history.undo_len(), 2);

        history.undo(&mut store, &mut replica);
        assert!(history.can_redo());
        history.push(UndoAction::Create { object: note(9.0) });
        assert!(!history.can_redo());
    }

    #[test]
    fn test_failed_undo_keeps_entry() {
        let mut store = ObjectStore::new();
        let mut replica = MemoryReplica::new();
        let mut history = History::new(10);
        let object = note(0.0);
        history.push(UndoAction::Create { object });

        // The created object is gone already, so deleting it fails.
        assert!(history.undo(&mut store, &mut replica).is_none());
        assert_eq!(history.undo_len(), 1);
        assert!(replica.calls().is_empty());
    }

    #[test]
    fn test_compound_is_all_or_nothing() {
        let mut store = ObjectStore::new();
        let present = note(0.0);
        let absent = note(200.0);
        store.put(present.clone());
        let action = UndoAction::Compound {
            actions: vec![
                UndoAction::Delete { object: present.clone() },
                UndoAction::Delete { object: absent },
            ],
        };
        let mut replica = MemoryReplica::new();
        assert!(matches!(
            action.apply(&mut store, &mut replica),
            Err(HistoryError::TargetMissing(_))
        ));
        assert!(store.contains(present.id()));
    }

    #[test]
    fn test_frame_delete_restores_contents() {
        let mut store = ObjectStore::new();
        let mut replica = MemoryReplica::new();
        let frame = BoardObject::new("a", Shape::Frame(Frame::new(Point::ZERO, 500.0, 500.0, "F")));
        let mut child = note(10.0);
        child.shape.placement_mut().unwrap().parent_id = Some(frame.id());
        store.put(frame.clone());
        store.put(child.clone());

        let contents = crate::frames::collect_frame_contents(&store, frame.id());
        let action = UndoAction::delete_frame(frame.clone(), contents);
        action.apply(&mut store, &mut replica).unwrap();
        assert!(store.is_empty());
        assert_eq!(
            replica.take_calls(),
            vec![ReplicaCall::BatchDelete(vec![frame.id(), child.id()])]
        );

        action.invert().apply(&mut store, &mut replica).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(child.id()).unwrap().shape.parent_id(), Some(frame.id()));
    }

    #[test]
    fn test_comment_delete_undo() {
        let mut store = ObjectStore::new();
        let mut replica = MemoryReplica::new();
        let comment = Comment::new("a", "looks good", Point::new(5.0, 5.0));
        store.put_comment(comment.clone());

        let action = UndoAction::DeleteComment { comment: comment.clone() };
        action.apply(&mut store, &mut replica).unwrap();
        assert!(store.comment(comment.id).is_none());
        action.invert().apply(&mut store, &mut replica).unwrap();
        assert_eq!(store.comment(comment.id), Some(&comment));
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let mut history = History::new(5);
        history.push(UndoAction::Create { object: note(0.0) });
        let snapshot = history.snapshot("doc-1");
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: HistorySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(History::restore(restored, 5).undo_len(), 1);
    }
}
