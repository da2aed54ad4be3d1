//! Multi-object drag.
//!
//! Every dragged object receives the same translation. Per kind: frames and
//! strokes move directly, connectors move only their free endpoints, and
//! nestable objects move unless their parent frame is moving with them.

use crate::frames::{find_containing_frame, set_parent};
use crate::selection::SelectionSet;
use crate::shapes::{BoardObject, ObjectId};
use crate::store::ObjectStore;
use kurbo::Vec2;
use std::collections::HashSet;

/// Snapshot of the objects a drag on `grabbed` moves: the whole selection if
/// `grabbed` is part of it, otherwise just `grabbed`.
pub fn drag_set(store: &ObjectStore, selection: &SelectionSet, grabbed: ObjectId) -> Vec<BoardObject> {
    let ids = if selection.contains(grabbed) {
        selection.sorted_ids()
    } else {
        vec![grabbed]
    };
    ids.into_iter()
        .filter_map(|id| store.get(id).cloned())
        .collect()
}

fn moving_ids(originals: &[BoardObject]) -> HashSet<ObjectId> {
    originals.iter().map(BoardObject::id).collect()
}

/// Originals translated by `delta`, for the live preview.
pub fn translate(originals: &[BoardObject], delta: Vec2) -> Vec<BoardObject> {
    let moving = moving_ids(originals);
    originals
        .iter()
        .map(|original| {
            let mut moved = original.clone();
            let rides_with_parent = original
                .shape
                .parent_id()
                .is_some_and(|parent| moving.contains(&parent));
            if !rides_with_parent {
                moved.shape.translate(delta);
            }
            moved
        })
        .collect()
}

/// Final positions at drag end, with frame containment recomputed.
///
/// Frames being moved are never containment candidates, and objects riding
/// with a moving parent keep it.
pub fn finish(store: &ObjectStore, originals: &[BoardObject], delta: Vec2) -> Vec<BoardObject> {
    let moving = moving_ids(originals);
    let candidates: Vec<&BoardObject> = store
        .frames()
        .filter(|f| !moving.contains(&f.id()))
        .collect();

    translate(originals, delta)
        .into_iter()
        .zip(originals)
        .map(|(mut moved, original)| {
            if !original.shape.is_nestable() {
                return moved;
            }
            if store
                .live_parent(original)
                .is_some_and(|parent| moving.contains(&parent))
            {
                return moved;
            }
            if let Some(world) = store.world_rect(original).map(|r| r + delta) {
                let parent = find_containing_frame(world, candidates.iter().copied());
                set_parent(store, &mut moved, parent, world.origin());
            }
            moved
        })
        .collect()
}
