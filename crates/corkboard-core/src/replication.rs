//! Backing-store replication seam.
//!
//! The engine writes through a [`ReplicationAdapter`] and never awaits the
//! result; delivery and retries belong to the adapter. Inbound snapshots
//! arrive through the listener passed to `subscribe` and are merged by the
//! store's last-writer-wins rule.

use crate::Instant;
use crate::patch::ObjectPatch;
use crate::shapes::{BoardObject, Comment, ObjectId};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

/// Callback receiving full remote snapshots.
pub type SnapshotListener = Box<dyn FnMut(Vec<BoardObject>)>;

/// A sparse update bound for the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: ObjectId,
    pub patch: ObjectPatch,
    /// Write stamp of the local object after the update.
    pub updated_at: u64,
}

/// Operations the engine issues against the replicated document.
pub trait ReplicationAdapter {
    fn subscribe(&mut self, doc_id: &str, on_change: SnapshotListener);
    fn create(&mut self, object: &BoardObject);
    fn update(&mut self, id: ObjectId, patch: &ObjectPatch, updated_at: u64);
    fn delete(&mut self, id: ObjectId);
    fn batch_update_positions(&mut self, updates: &[PositionUpdate]);
    fn batch_delete_objects(&mut self, ids: &[ObjectId]);
    fn create_comment(&mut self, comment: &Comment);
    fn delete_comment(&mut self, id: ObjectId);
}

/// One queued backing-store write.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteWrite {
    Create(BoardObject),
    Update(PositionUpdate),
    Delete(ObjectId),
    CreateComment(Comment),
    DeleteComment(ObjectId),
}

/// Send `writes` in order of kind: creates, updates, deletes, then comments.
/// Several updates or deletes go out as one batch call.
pub fn dispatch(adapter: &mut dyn ReplicationAdapter, writes: Vec<RemoteWrite>) {
    let mut updates = Vec::new();
    let mut deletes = Vec::new();
    let mut comments = Vec::new();
    for write in writes {
        match write {
            RemoteWrite::Create(object) => adapter.create(&object),
            RemoteWrite::Update(update) => updates.push(update),
            RemoteWrite::Delete(id) => deletes.push(id),
            other => comments.push(other),
        }
    }

    match updates.as_slice() {
        [] => {}
        [single] => adapter.update(single.id, &single.patch, single.updated_at),
        many => adapter.batch_update_positions(many),
    }
    match deletes.as_slice() {
        [] => {}
        [single] => adapter.delete(*single),
        many => adapter.batch_delete_objects(many),
    }
    for write in comments {
        match write {
            RemoteWrite::CreateComment(comment) => adapter.create_comment(&comment),
            RemoteWrite::DeleteComment(id) => adapter.delete_comment(id),
            _ => {}
        }
    }
}

/// Coalesces drag writes so fast sequential drags send one batch.
///
/// Each push restarts the delay; patches for the same id merge with later
/// fields winning.
#[derive(Debug, Clone)]
pub struct WriteDebouncer {
    delay: Duration,
    pending: HashMap<ObjectId, PositionUpdate>,
    deadline: Option<Instant>,
}

impl WriteDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
            deadline: None,
        }
    }

    pub fn push(&mut self, update: PositionUpdate, now: Instant) {
        match self.pending.get_mut(&update.id) {
            Some(existing) => {
                existing.patch.merge(update.patch);
                existing.updated_at = existing.updated_at.max(update.updated_at);
            }
            None => {
                self.pending.insert(update.id, update);
            }
        }
        self.deadline = Some(now + self.delay);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Pending updates if the delay has elapsed.
    pub fn flush_due(&mut self, now: Instant) -> Vec<PositionUpdate> {
        if self.is_due(now) {
            self.flush_all()
        } else {
            Vec::new()
        }
    }

    /// Every pending update, sorted by id.
    pub fn flush_all(&mut self) -> Vec<PositionUpdate> {
        self.deadline = None;
        let mut updates: Vec<PositionUpdate> = self.pending.drain().map(|(_, u)| u).collect();
        updates.sort_by_key(|u| u.id);
        updates
    }

    /// Drop a pending update, e.g. because the object was deleted.
    pub fn discard(&mut self, id: ObjectId) {
        self.pending.remove(&id);
        if self.pending.is_empty() {
            self.deadline = None;
        }
    }
}

/// A call recorded by [`MemoryReplica`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaCall {
    Subscribe(String),
    Create(ObjectId),
    Update { id: ObjectId, fields: Vec<String> },
    Delete(ObjectId),
    BatchUpdate(Vec<ObjectId>),
    BatchDelete(Vec<ObjectId>),
    CreateComment(ObjectId),
    DeleteComment(ObjectId),
}

#[derive(Default)]
struct ReplicaState {
    objects: HashMap<ObjectId, BoardObject>,
    comments: HashMap<ObjectId, Comment>,
    calls: Vec<ReplicaCall>,
    listeners: Vec<SnapshotListener>,
}

impl ReplicaState {
    fn apply_update(&mut self, id: ObjectId, patch: &ObjectPatch, updated_at: u64) {
        let Some(current) = self.objects.get(&id) else {
            log::debug!("Replica ignoring update for unknown object {id}");
            return;
        };
        match patch.apply(current) {
            Ok(mut updated) => {
                updated.meta.updated_at = updated_at;
                self.objects.insert(id, updated);
            }
            Err(e) => log::warn!("Replica failed to apply patch to {id}: {e}"),
        }
    }
}

/// In-process replicated document for tests and offline sessions.
///
/// Clones share state, so a caller can keep a handle while the engine owns
/// the adapter.
#[derive(Clone, Default)]
pub struct MemoryReplica {
    state: Rc<RefCell<ReplicaState>>,
}

impl MemoryReplica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ReplicaCall> {
        self.state.borrow().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<ReplicaCall> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    pub fn object(&self, id: ObjectId) -> Option<BoardObject> {
        self.state.borrow().objects.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn comment_count(&self) -> usize {
        self.state.borrow().comments.len()
    }

    /// Write as another participant would, without notifying listeners.
    pub fn inject(&self, object: BoardObject) {
        self.state.borrow_mut().objects.insert(object.id(), object);
    }

    /// Deliver the current document to every listener.
    pub fn publish(&self) {
        let snapshot: Vec<BoardObject> = self.state.borrow().objects.values().cloned().collect();
        // Listeners are taken out so one may call back into the replica.
        let mut listeners = std::mem::take(&mut self.state.borrow_mut().listeners);
        for listener in &mut listeners {
            listener(snapshot.clone());
        }
        let mut state = self.state.borrow_mut();
        listeners.append(&mut state.listeners);
        state.listeners = listeners;
    }
}

impl ReplicationAdapter for MemoryReplica {
    fn subscribe(&mut self, doc_id: &str, on_change: SnapshotListener) {
        let mut state = self.state.borrow_mut();
        state.calls.push(ReplicaCall::Subscribe(doc_id.to_string()));
        state.listeners.push(on_change);
    }

    fn create(&mut self, object: &BoardObject) {
        let mut state = self.state.borrow_mut();
        state.calls.push(ReplicaCall::Create(object.id()));
        state.objects.insert(object.id(), object.clone());
    }

    fn update(&mut self, id: ObjectId, patch: &ObjectPatch, updated_at: u64) {
        let mut state = self.state.borrow_mut();
        state.calls.push(ReplicaCall::Update {
            id,
            fields: patch.fields().map(str::to_string).collect(),
        });
        state.apply_update(id, patch, updated_at);
    }

    fn delete(&mut self, id: ObjectId) {
        let mut state = self.state.borrow_mut();
        state.calls.push(ReplicaCall::Delete(id));
        state.objects.remove(&id);
    }

    fn batch_update_positions(&mut self, updates: &[PositionUpdate]) {
        let mut state = self.state.borrow_mut();
        state
            .calls
            .push(ReplicaCall::BatchUpdate(updates.iter().map(|u| u.id).collect()));
        for update in updates {
            state.apply_update(update.id, &update.patch, update.updated_at);
        }
    }

    fn batch_delete_objects(&mut self, ids: &[ObjectId]) {
        let mut state = self.state.borrow_mut();
        state.calls.push(ReplicaCall::BatchDelete(ids.to_vec()));
        for id in ids {
            state.objects.remove(id);
        }
    }

    fn create_comment(&mut self, comment: &Comment) {
        let mut state = self.state.borrow_mut();
        state.calls.push(ReplicaCall::CreateComment(comment.id));
        state.comments.insert(comment.id, comment.clone());
    }

    fn delete_comment(&mut self, id: ObjectId) {
        let mut state = self.state.borrow_mut();
        state.calls.push(ReplicaCall::DeleteComment(id));
        state.comments.remove(&id);
    }
}
