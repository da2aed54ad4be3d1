//! In-memory object store.
//!
//! Holds the visible objects plus a pending layer recording which ids this
//! session has written and not yet seen confirmed by the backing store.
//! Remote snapshots merge per object by last-writer-wins on write stamps.

use crate::patch::{ObjectPatch, PatchError};
use crate::shapes::{BoardObject, Comment, ObjectId, Shape};
use kurbo::{Point, Rect};
use std::collections::HashMap;

/// A local write not yet confirmed by a remote snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingWrite {
    stamp: u64,
    deleted: bool,
    /// The backing store has never reported this object.
    created: bool,
}

/// Outcome of merging one remote snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Remote versions accepted.
    pub applied: usize,
    /// Remote versions ignored because a newer local write is pending.
    pub kept_local: usize,
    /// Objects removed because the remote no longer has them.
    pub removed: Vec<ObjectId>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: HashMap<ObjectId, BoardObject>,
    comments: HashMap<ObjectId, Comment>,
    pending: HashMap<ObjectId, PendingWrite>,
    last_stamp: u64,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ObjectId) -> Option<&BoardObject> {
        self.objects.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoardObject> {
        self.objects.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    /// All frames.
    pub fn frames(&self) -> impl Iterator<Item = &BoardObject> {
        self.objects.values().filter(|o| o.is_frame())
    }

    /// Next logical write stamp: wall clock, but strictly increasing.
    pub fn next_stamp(&mut self) -> u64 {
        self.last_stamp = crate::wall_clock_ms().max(self.last_stamp + 1);
        self.last_stamp
    }

    /// Insert or replace an object as a local write. Returns the stored copy.
    pub fn put(&mut self, mut object: BoardObject) -> &BoardObject {
        let stamp = self.next_stamp();
        object.meta.updated_at = stamp;
        object.shape.sanitize();
        let id = object.id();
        let created = match self.pending.get(&id) {
            Some(pending) if !pending.deleted => pending.created,
            _ => !self.objects.contains_key(&id),
        };
        self.pending.insert(
            id,
            PendingWrite {
                stamp,
                deleted: false,
                created,
            },
        );
        self.objects.insert(id, object);
        &self.objects[&id]
    }

    /// Remove an object as a local write.
    pub fn remove(&mut self, id: ObjectId) -> Option<BoardObject> {
        let removed = self.objects.remove(&id)?;
        let stamp = self.next_stamp();
        self.pending.insert(
            id,
            PendingWrite {
                stamp,
                deleted: true,
                created: false,
            },
        );
        Some(removed)
    }

    /// Apply a patch as a local write. `Ok(None)` if the object is missing.
    pub fn apply_patch(
        &mut self,
        id: ObjectId,
        patch: &ObjectPatch,
    ) -> Result<Option<&BoardObject>, PatchError> {
        let Some(current) = self.objects.get(&id) else {
            return Ok(None);
        };
        let patched = patch.apply(current)?;
        Ok(Some(self.put(patched)))
    }

    pub fn comment(&self, id: ObjectId) -> Option<&Comment> {
        self.comments.get(&id)
    }

    pub fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.values()
    }

    pub fn put_comment(&mut self, comment: Comment) {
        self.comments.insert(comment.id, comment);
    }

    pub fn remove_comment(&mut self, id: ObjectId) -> Option<Comment> {
        self.comments.remove(&id)
    }

    /// Whether `id` has a local write the backing store has not confirmed.
    pub fn is_pending(&self, id: ObjectId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Merge a full remote snapshot.
    ///
    /// A remote version replaces the local one unless a pending local write
    /// carries a newer stamp. Objects absent from the snapshot are removed
    /// unless they were created locally and are still pending; a pending
    /// update to an object the remote has deleted is dropped with it.
    pub fn merge_remote(&mut self, snapshot: Vec<BoardObject>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let mut seen = std::collections::HashSet::with_capacity(snapshot.len());

        for mut remote in snapshot {
            let id = remote.id();
            seen.insert(id);
            self.last_stamp = self.last_stamp.max(remote.meta.updated_at);

            if let Some(pending) = self.pending.get_mut(&id) {
                pending.created = false;
                if remote.meta.updated_at < pending.stamp {
                    log::debug!(
                        "Keeping pending local write for {id} (local {} > remote {})",
                        pending.stamp,
                        remote.meta.updated_at
                    );
                    summary.kept_local += 1;
                    continue;
                }
                self.pending.remove(&id);
            }

            remote.shape.sanitize();
            self.objects.insert(id, remote);
            summary.applied += 1;
        }

        let missing: Vec<ObjectId> = self
            .objects
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for id in missing {
            match self.pending.get(&id) {
                Some(pending) if pending.created => continue,
                Some(_) => {
                    log::debug!("Dropping pending update to {id}, deleted remotely");
                    self.pending.remove(&id);
                }
                None => {}
            }
            self.objects.remove(&id);
            summary.removed.push(id);
        }
        // Local deletions the remote no longer reports are confirmed.
        self.pending
            .retain(|id, pending| !(pending.deleted && !seen.contains(id)));

        summary
    }

    /// World position of an object.
    ///
    /// Nested objects resolve against their parent frame; a missing parent
    /// yields None. Connectors and strokes report the origin of their
    /// stored geometry.
    pub fn resolve_world_position(&self, object: &BoardObject) -> Option<Point> {
        match &object.shape {
            Shape::Frame(frame) => Some(frame.position),
            Shape::Stroke(stroke) => stroke.bounds().map(|b| b.origin()),
            Shape::Connector(_) => crate::hit_test::object_bounds(self, object).map(|b| b.origin()),
            _ => {
                let placement = object.shape.placement()?;
                match placement.parent_id {
                    None => Some(placement.position),
                    Some(parent_id) => {
                        let frame = self.get(parent_id)?.shape.as_frame()?;
                        Some(frame.position + placement.position.to_vec2())
                    }
                }
            }
        }
    }

    /// World box of a box-shaped object (nestable kinds and frames).
    ///
    /// An orphaned parent reference degrades to top-level treatment.
    pub fn world_rect(&self, object: &BoardObject) -> Option<Rect> {
        if let Some(frame) = object.shape.as_frame() {
            return Some(frame.rect());
        }
        let placement = object.shape.placement()?;
        let origin = self.resolve_world_position(object).unwrap_or_else(|| {
            log::debug!(
                "Parent of {} is missing, treating it as top-level",
                object.id()
            );
            placement.position
        });
        Some(Rect::from_origin_size(origin, (placement.width, placement.height)))
    }

    /// The parent frame if it exists, None for top-level or orphaned objects.
    pub fn live_parent(&self, object: &BoardObject) -> Option<ObjectId> {
        let parent_id = object.shape.parent_id()?;
        self.get(parent_id)
            .filter(|p| p.is_frame())
            .map(|p| p.id())
    }

    /// Full snapshot of every object, in no particular order.
    pub fn snapshot(&self) -> Vec<BoardObject> {
        self.objects.values().cloned().collect()
    }
}
