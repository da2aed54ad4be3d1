//! Frame containment: which frame an object belongs to.

use crate::shapes::{BoardObject, ObjectId, Shape};
use crate::store::ObjectStore;
use kurbo::{Point, Rect};
use std::collections::HashSet;

/// Whether `outer` fully contains `inner` (edges may touch).
fn contains_rect(outer: Rect, inner: Rect) -> bool {
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

/// The smallest frame fully containing `bbox`; ties go to the frontmost.
pub fn find_containing_frame<'a>(
    bbox: Rect,
    frames: impl IntoIterator<Item = &'a BoardObject>,
) -> Option<ObjectId> {
    frames
        .into_iter()
        .filter_map(|object| object.shape.as_frame().map(|f| (object, f)))
        .filter(|(_, frame)| contains_rect(frame.rect(), bbox))
        .min_by(|(a, fa), (b, fb)| {
            fa.area()
                .total_cmp(&fb.area())
                .then_with(|| b.meta.order_key().total_cmp(&a.meta.order_key()))
        })
        .map(|(object, _)| object.id())
}

/// Ids of the objects whose parent is `frame_id`.
pub fn children_of(store: &ObjectStore, frame_id: ObjectId) -> Vec<ObjectId> {
    store
        .iter()
        .filter(|o| o.shape.parent_id() == Some(frame_id))
        .map(BoardObject::id)
        .collect()
}

/// Rewrite `object` so its placement is nested under `parent` (or top-level)
/// while keeping world position `world`.
pub fn set_parent(store: &ObjectStore, object: &mut BoardObject, parent: Option<ObjectId>, world: Point) {
    let parent_origin = parent
        .and_then(|id| store.get(id))
        .and_then(|p| p.shape.as_frame())
        .map(|f| f.position);
    if let Some(placement) = object.shape.placement_mut() {
        match parent_origin {
            Some(origin) => {
                placement.parent_id = parent;
                placement.position = world - origin.to_vec2();
            }
            None => {
                placement.parent_id = None;
                placement.position = world;
            }
        }
    }
}

/// Nest a new object whose stored position is a world position into the
/// smallest frame containing it.
pub fn adopt_into_frame(store: &ObjectStore, object: &mut BoardObject) {
    let Some(placement) = object.shape.placement().copied() else {
        return;
    };
    let frame = find_containing_frame(placement.rect(), store.frames());
    set_parent(store, object, frame, placement.position);
}

/// Recompute containment for objects moved together in one gesture.
///
/// Frames in the move set are never candidates, and objects whose parent is
/// also moving keep their parent. Returns the objects whose parent changed.
pub fn reparent_moved(store: &ObjectStore, moved: &[ObjectId]) -> Vec<BoardObject> {
    let moving: HashSet<ObjectId> = moved.iter().copied().collect();
    let candidates: Vec<&BoardObject> = store
        .frames()
        .filter(|f| !moving.contains(&f.id()))
        .collect();

    let mut changed = Vec::new();
    for id in moved {
        let Some(object) = store.get(*id) else {
            continue;
        };
        if !object.shape.is_nestable() {
            continue;
        }
        if let Some(parent) = store.live_parent(object) {
            if moving.contains(&parent) {
                continue;
            }
        }
        let Some(world) = store.world_rect(object) else {
            continue;
        };
        let new_parent = find_containing_frame(world, candidates.iter().copied());
        if new_parent == store.live_parent(object) && new_parent == object.shape.parent_id() {
            continue;
        }
        let mut updated = object.clone();
        set_parent(store, &mut updated, new_parent, world.origin());
        changed.push(updated);
    }
    changed
}

/// Children of `frame_id` rewritten as top-level objects at their world position.
pub fn promote_children(store: &ObjectStore, frame_id: ObjectId) -> Vec<BoardObject> {
    children_of(store, frame_id)
        .into_iter()
        .filter_map(|id| store.get(id))
        .filter_map(|child| {
            let world = store.world_rect(child)?.origin();
            let mut promoted = child.clone();
            set_parent(store, &mut promoted, None, world);
            Some(promoted)
        })
        .collect()
}

/// Everything removed together with a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameContents {
    /// Transitively nested objects.
    pub children: Vec<BoardObject>,
    /// Connectors anchored to the frame or any removed child.
    pub connectors: Vec<BoardObject>,
}

/// Snapshot of the transitive contents of a frame and the connectors touching them.
pub fn collect_frame_contents(store: &ObjectStore, frame_id: ObjectId) -> FrameContents {
    let mut removed: HashSet<ObjectId> = HashSet::from([frame_id]);
    let mut queue = vec![frame_id];
    let mut children = Vec::new();

    while let Some(parent) = queue.pop() {
        for child in children_of(store, parent) {
            if removed.insert(child) {
                if let Some(object) = store.get(child) {
                    children.push(object.clone());
                }
                queue.push(child);
            }
        }
    }

    let connectors = store
        .iter()
        .filter(|o| !removed.contains(&o.id()))
        .filter(|o| match &o.shape {
            Shape::Connector(c) => removed.iter().any(|id| c.touches(*id)),
            _ => false,
        })
        .cloned()
        .collect();

    FrameContents { children, connectors }
}
