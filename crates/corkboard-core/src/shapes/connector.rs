//! Connector lines and their endpoint bindings.

use super::{ObjectId, ShapeStyle, finite_or, sanitize_point};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// One side of an object's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Top, Edge::Right, Edge::Bottom, Edge::Left];
}

/// A normalized point on another object's boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub object_id: ObjectId,
    pub edge: Edge,
    /// Position along the edge, 0 at its start and 1 at its end.
    pub t: f64,
}

/// A connector endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Endpoint {
    Free { point: Point },
    /// Bound to an object. `fallback` is only used once the target is gone.
    Anchored { anchor: Anchor, fallback: Point },
}

impl Endpoint {
    pub fn free(point: Point) -> Self {
        Endpoint::Free { point }
    }

    pub fn anchor(&self) -> Option<&Anchor> {
        match self {
            Endpoint::Anchored { anchor, .. } => Some(anchor),
            Endpoint::Free { .. } => None,
        }
    }

    pub fn is_anchored_to(&self, id: ObjectId) -> bool {
        self.anchor().is_some_and(|a| a.object_id == id)
    }
}

/// Path shape between the two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    #[default]
    Straight,
    /// One 90° turn at the horizontal midpoint.
    RightAngle,
    CurveClockwise,
    CurveCounterClockwise,
}

/// A line between two endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub start: Endpoint,
    pub end: Endpoint,
    #[serde(default)]
    pub route: Route,
    #[serde(default)]
    pub arrow_head: bool,
    pub style: ShapeStyle,
}

impl Connector {
    pub fn new(start: Endpoint, end: Endpoint, route: Route, arrow_head: bool) -> Self {
        Self {
            start,
            end,
            route,
            arrow_head,
            style: ShapeStyle::default(),
        }
    }

    /// Whether either endpoint is bound to `id`.
    pub fn touches(&self, id: ObjectId) -> bool {
        self.start.is_anchored_to(id) || self.end.is_anchored_to(id)
    }

    /// Move free endpoints only.
    pub(crate) fn translate_free(&mut self, delta: Vec2) {
        for endpoint in [&mut self.start, &mut self.end] {
            if let Endpoint::Free { point } = endpoint {
                *point += delta;
            }
        }
    }

    pub(crate) fn sanitize(&mut self) {
        for endpoint in [&mut self.start, &mut self.end] {
            match endpoint {
                Endpoint::Free { point } => *point = sanitize_point(*point),
                Endpoint::Anchored { anchor, fallback } => {
                    anchor.t = finite_or(anchor.t, 0.5).clamp(0.0, 1.0);
                    *fallback = sanitize_point(*fallback);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_translate_skips_anchored_endpoint() {
        let target = Uuid::new_v4();
        let mut connector = Connector::new(
            Endpoint::free(Point::new(0.0, 0.0)),
            Endpoint::Anchored {
                anchor: Anchor { object_id: target, edge: Edge::Left, t: 0.5 },
                fallback: Point::new(100.0, 0.0),
            },
            Route::Straight,
            true,
        );
        connector.translate_free(Vec2::new(10.0, 5.0));
        assert_eq!(connector.start, Endpoint::free(Point::new(10.0, 5.0)));
        assert!(connector.end.is_anchored_to(target));
        assert!(connector.touches(target));
    }

    #[test]
    fn test_sanitize_clamps_anchor_t() {
        let mut connector = Connector::new(
            Endpoint::Anchored {
                anchor: Anchor { object_id: Uuid::new_v4(), edge: Edge::Top, t: 3.0 },
                fallback: Point::ZERO,
            },
            Endpoint::free(Point::new(f64::NAN, 1.0)),
            Route::RightAngle,
            false,
        );
        connector.sanitize();
        assert!((connector.start.anchor().unwrap().t - 1.0).abs() < f64::EPSILON);
        assert_eq!(connector.end, Endpoint::free(Point::new(0.0, 1.0)));
    }
}
