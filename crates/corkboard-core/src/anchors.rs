//! Connector anchoring and path shaping.
//!
//! Anchored endpoints are stored as `(edge, t)` and resolved against the
//! target's current bounds on every read, so connectors follow moves and
//! resizes without any cached coordinates.

use crate::shapes::{Anchor, BoardObject, Connector, Edge, Endpoint, ObjectId, Route};
use crate::store::ObjectStore;
use kurbo::{BezPath, Point, Rect, Vec2};

/// Control point offset of curved routes, relative to segment length.
pub const CURVE_BOW: f64 = 0.3;
/// Arrow head length in world units.
pub const ARROW_HEAD_LENGTH: f64 = 12.0;

/// A point on a rectangle's boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePoint {
    pub edge: Edge,
    pub t: f64,
    pub point: Point,
}

fn edge_segment(rect: Rect, edge: Edge) -> (Point, Point) {
    match edge {
        Edge::Top => (Point::new(rect.x0, rect.y0), Point::new(rect.x1, rect.y0)),
        Edge::Right => (Point::new(rect.x1, rect.y0), Point::new(rect.x1, rect.y1)),
        Edge::Bottom => (Point::new(rect.x0, rect.y1), Point::new(rect.x1, rect.y1)),
        Edge::Left => (Point::new(rect.x0, rect.y0), Point::new(rect.x0, rect.y1)),
    }
}

/// Nearest point to `cursor` on any of the four edges of `rect`.
pub fn nearest_edge_point(rect: Rect, cursor: Point) -> EdgePoint {
    let mut best: Option<(f64, EdgePoint)> = None;
    for edge in Edge::ALL {
        let (a, b) = edge_segment(rect, edge);
        let (t, point) = match edge {
            Edge::Top | Edge::Bottom => {
                let x = cursor.x.clamp(a.x, b.x);
                (normalize(x - a.x, b.x - a.x), Point::new(x, a.y))
            }
            Edge::Left | Edge::Right => {
                let y = cursor.y.clamp(a.y, b.y);
                (normalize(y - a.y, b.y - a.y), Point::new(a.x, y))
            }
        };
        let dist = (cursor - point).hypot2();
        if best.as_ref().is_none_or(|(d, _)| dist < *d) {
            best = Some((dist, EdgePoint { edge, t, point }));
        }
    }
    // Edge::ALL is non-empty.
    best.map(|(_, p)| p).unwrap_or(EdgePoint {
        edge: Edge::Top,
        t: 0.5,
        point: rect.center(),
    })
}

fn normalize(offset: f64, length: f64) -> f64 {
    if length.abs() < f64::EPSILON {
        0.5
    } else {
        (offset / length).clamp(0.0, 1.0)
    }
}

/// Inverse of [`nearest_edge_point`]: the point at `t` along `edge`.
pub fn resolve_anchor_point(rect: Rect, edge: Edge, t: f64) -> Point {
    let (a, b) = edge_segment(rect, edge);
    a.lerp(b, t.clamp(0.0, 1.0))
}

/// Bounds an anchor resolves against, or None if the target is gone or
/// cannot be anchored to.
fn anchor_target_rect(store: &ObjectStore, id: ObjectId) -> Option<Rect> {
    let target = store.get(id)?;
    if !target.shape.is_anchorable() {
        return None;
    }
    store.world_rect(target)
}

/// World position of an endpoint. Orphaned anchors fall back to the last
/// written position.
pub fn resolve_endpoint(store: &ObjectStore, endpoint: &Endpoint) -> Point {
    match endpoint {
        Endpoint::Free { point } => *point,
        Endpoint::Anchored { anchor, fallback } => match anchor_target_rect(store, anchor.object_id) {
            Some(rect) => resolve_anchor_point(rect, anchor.edge, anchor.t),
            None => {
                log::debug!(
                    "Anchor target {} is missing, using fallback point",
                    anchor.object_id
                );
                *fallback
            }
        },
    }
}

/// Resolved (start, end) of a connector.
pub fn connector_endpoints(store: &ObjectStore, connector: &Connector) -> (Point, Point) {
    (
        resolve_endpoint(store, &connector.start),
        resolve_endpoint(store, &connector.end),
    )
}

/// An anchored endpoint on `target` nearest to `cursor`.
pub fn anchor_endpoint(store: &ObjectStore, target: &BoardObject, cursor: Point) -> Option<Endpoint> {
    let rect = anchor_target_rect(store, target.id())?;
    let edge_point = nearest_edge_point(rect, cursor);
    Some(Endpoint::Anchored {
        anchor: Anchor {
            object_id: target.id(),
            edge: edge_point.edge,
            t: edge_point.t,
        },
        fallback: edge_point.point,
    })
}

/// Refresh the fallback points of anchored endpoints from current bounds.
pub fn refresh_fallbacks(store: &ObjectStore, connector: &mut Connector) {
    for endpoint in [&mut connector.start, &mut connector.end] {
        if let Endpoint::Anchored { anchor, fallback } = endpoint {
            if let Some(rect) = anchor_target_rect(store, anchor.object_id) {
                *fallback = resolve_anchor_point(rect, anchor.edge, anchor.t);
            }
        }
    }
}

/// Control point of a curved route. Fixed by route, independent of where
/// the endpoints lie.
fn curve_control(start: Point, end: Point, clockwise: bool) -> Point {
    let d = end - start;
    let normal = Vec2::new(d.y, -d.x);
    let bow = if clockwise { normal } else { -normal };
    start.midpoint(end) + bow * CURVE_BOW
}

/// Path between two resolved endpoints for `route`.
pub fn connector_path(start: Point, end: Point, route: Route) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(start);
    match route {
        Route::Straight => path.line_to(end),
        Route::RightAngle => {
            let mid_x = (start.x + end.x) / 2.0;
            path.line_to(Point::new(mid_x, start.y));
            path.line_to(Point::new(mid_x, end.y));
            path.line_to(end);
        }
        Route::CurveClockwise => path.quad_to(curve_control(start, end, true), end),
        Route::CurveCounterClockwise => path.quad_to(curve_control(start, end, false), end),
    }
    path
}

/// Direction the path arrives at `end` from.
fn arrival_point(start: Point, end: Point, route: Route) -> Point {
    match route {
        Route::Straight => start,
        Route::RightAngle => {
            let corner = Point::new((start.x + end.x) / 2.0, end.y);
            if (corner - end).hypot2() > f64::EPSILON { corner } else { start }
        }
        Route::CurveClockwise => curve_control(start, end, true),
        Route::CurveCounterClockwise => curve_control(start, end, false),
    }
}

/// Open arrow head at `end`.
pub fn arrow_head_path(start: Point, end: Point, route: Route) -> Option<BezPath> {
    let dir = end - arrival_point(start, end, route);
    let len = dir.hypot();
    if len < f64::EPSILON {
        return None;
    }
    let back = dir * (-ARROW_HEAD_LENGTH / len);
    let side = Vec2::new(-back.y, back.x) * 0.5;
    let mut path = BezPath::new();
    path.move_to(end + back + side);
    path.line_to(end);
    path.line_to(end + back - side);
    Some(path)
}

/// Fully resolved connector geometry.
#[derive(Debug, Clone)]
pub struct ConnectorGeometry {
    pub start: Point,
    pub end: Point,
    pub path: BezPath,
    pub head: Option<BezPath>,
}

pub fn connector_geometry(store: &ObjectStore, connector: &Connector) -> ConnectorGeometry {
    let (start, end) = connector_endpoints(store, connector);
    ConnectorGeometry {
        start,
        end,
        path: connector_path(start, end, connector.route),
        head: if connector.arrow_head {
            arrow_head_path(start, end, connector.route)
        } else {
            None
        },
    }
}
