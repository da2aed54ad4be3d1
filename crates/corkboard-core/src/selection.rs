//! Selection set and text-editing focus.

use crate::shapes::ObjectId;
use std::collections::HashSet;

/// Currently selected object ids.
///
/// Ids must be pruned when their object disappears; [`SelectionSet::prune`]
/// does that against any existence check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: HashSet<ObjectId>,
    /// Object whose text editor has focus.
    editing: Option<ObjectId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection with a single id.
    pub fn select(&mut self, id: ObjectId) {
        self.ids.clear();
        self.ids.insert(id);
    }

    /// Replace the selection with `ids`.
    pub fn select_many(&mut self, ids: impl IntoIterator<Item = ObjectId>) {
        self.ids.clear();
        self.ids.extend(ids);
    }

    pub fn add(&mut self, id: ObjectId) {
        self.ids.insert(id);
    }

    /// Flip membership. Returns true if `id` is selected afterwards.
    pub fn toggle(&mut self, id: ObjectId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn remove(&mut self, id: ObjectId) {
        self.ids.remove(&id);
        if self.editing == Some(id) {
            self.editing = None;
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &HashSet<ObjectId> {
        &self.ids
    }

    /// Selected ids in a stable order.
    pub fn sorted_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.ids.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Drop ids for which `exists` is false. Returns the dropped ids.
    pub fn prune(&mut self, exists: impl Fn(ObjectId) -> bool) -> Vec<ObjectId> {
        let stale: Vec<ObjectId> = self.ids.iter().copied().filter(|id| !exists(*id)).collect();
        for id in &stale {
            self.ids.remove(id);
        }
        if self.editing.is_some_and(|id| !exists(id)) {
            self.editing = None;
        }
        stale
    }

    pub fn begin_editing(&mut self, id: ObjectId) {
        self.editing = Some(id);
    }

    pub fn end_editing(&mut self) {
        self.editing = None;
    }

    pub fn editing(&self) -> Option<ObjectId> {
        self.editing
    }

    /// Whether a text editor currently has focus.
    pub fn is_editing_text(&self) -> bool {
        self.editing.is_some()
    }
}
