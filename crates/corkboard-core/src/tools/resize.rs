//! Resize handles and the per-kind resize contract.

use crate::frames::set_parent;
use crate::shapes::{BoardObject, Edge, MIN_SIZE, Shape};
use crate::store::ObjectStore;
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Corner positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Type of resize handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Corner(Corner),
    /// Edge midpoint.
    Side(Edge),
}

impl HandleKind {
    /// Which rectangle edges this handle drags: (left, right, top, bottom).
    fn moves(self) -> (bool, bool, bool, bool) {
        match self {
            HandleKind::Corner(Corner::TopLeft) => (true, false, true, false),
            HandleKind::Corner(Corner::TopRight) => (false, true, true, false),
            HandleKind::Corner(Corner::BottomLeft) => (true, false, false, true),
            HandleKind::Corner(Corner::BottomRight) => (false, true, false, true),
            HandleKind::Side(Edge::Top) => (false, false, true, false),
            HandleKind::Side(Edge::Right) => (false, true, false, false),
            HandleKind::Side(Edge::Bottom) => (false, false, false, true),
            HandleKind::Side(Edge::Left) => (true, false, false, false),
        }
    }
}

/// A resize handle in world coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub position: Point,
    pub kind: HandleKind,
}

impl Handle {
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    /// `tolerance` is in world units, already divided by the zoom scale.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        (point - self.position).hypot2() <= tolerance * tolerance
    }
}

/// Corner and edge-midpoint handles of `bounds`.
pub fn handles_for(bounds: Rect) -> Vec<Handle> {
    let c = bounds.center();
    vec![
        Handle::new(Point::new(bounds.x0, bounds.y0), HandleKind::Corner(Corner::TopLeft)),
        Handle::new(Point::new(bounds.x1, bounds.y0), HandleKind::Corner(Corner::TopRight)),
        Handle::new(Point::new(bounds.x0, bounds.y1), HandleKind::Corner(Corner::BottomLeft)),
        Handle::new(Point::new(bounds.x1, bounds.y1), HandleKind::Corner(Corner::BottomRight)),
        Handle::new(Point::new(c.x, bounds.y0), HandleKind::Side(Edge::Top)),
        Handle::new(Point::new(bounds.x1, c.y), HandleKind::Side(Edge::Right)),
        Handle::new(Point::new(c.x, bounds.y1), HandleKind::Side(Edge::Bottom)),
        Handle::new(Point::new(bounds.x0, c.y), HandleKind::Side(Edge::Left)),
    ]
}

/// Drag the handle's edges of `original` by `delta`, never shrinking below
/// `min_size`. With `square`, the result keeps equal sides, growing away
/// from the fixed corner.
pub fn resize_rect(original: Rect, handle: HandleKind, delta: Vec2, min_size: f64, square: bool) -> Rect {
    let (left, right, top, bottom) = handle.moves();
    let mut r = original;
    if left {
        r.x0 = (original.x0 + delta.x).min(original.x1 - min_size);
    }
    if right {
        r.x1 = (original.x1 + delta.x).max(original.x0 + min_size);
    }
    if top {
        r.y0 = (original.y0 + delta.y).min(original.y1 - min_size);
    }
    if bottom {
        r.y1 = (original.y1 + delta.y).max(original.y0 + min_size);
    }
    if square {
        let horizontal = left || right;
        let vertical = top || bottom;
        let side = match (horizontal, vertical) {
            (true, false) => r.width(),
            (false, true) => r.height(),
            _ => r.width().max(r.height()),
        };
        if left {
            r.x0 = r.x1 - side;
        } else {
            r.x1 = r.x0 + side;
        }
        if top {
            r.y0 = r.y1 - side;
        } else {
            r.y1 = r.y0 + side;
        }
    }
    r
}

/// Whether a kind keeps a square aspect while resizing.
pub fn keeps_square(shape: &Shape) -> bool {
    matches!(shape, Shape::Emoji(_))
}

/// Apply a new world box to `original` following its kind's contract.
///
/// Box kinds take the new size, text also scales its font with height, and
/// frames move their own box only (children keep local offsets). Connectors
/// and strokes are returned unchanged.
pub fn apply_resize(store: &ObjectStore, original: &BoardObject, world: Rect) -> BoardObject {
    let mut resized = original.clone();
    let width = world.width().max(MIN_SIZE);
    let height = world.height().max(MIN_SIZE);
    match &mut resized.shape {
        Shape::Frame(frame) => {
            frame.position = world.origin();
            frame.width = width;
            frame.height = height;
        }
        Shape::Text(text) => {
            let old_height = text.placement.height.max(MIN_SIZE);
            text.font_size = (text.font_size * height / old_height).max(MIN_SIZE);
        }
        Shape::Connector(_) | Shape::Stroke(_) => return resized,
        Shape::Sticky(_)
        | Shape::Primitive(_)
        | Shape::Polygon(_)
        | Shape::Star(_)
        | Shape::Emoji(_)
        | Shape::Embed(_) => {}
    }
    if let Some(placement) = resized.shape.placement_mut() {
        placement.width = width;
        placement.height = height;
    }
    if resized.shape.is_nestable() {
        let parent = store.live_parent(original);
        set_parent(store, &mut resized, parent, world.origin());
    }
    resized
}
