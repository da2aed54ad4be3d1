//! Geometric primitives: basic shapes, regular polygons and stars.

use super::{Placement, ShapeStyle, rect_path};
use kurbo::{BezPath, Ellipse, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Rectangle,
    Ellipse,
    Diamond,
    Triangle,
}

/// A basic shape fitted to its box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub placement: Placement,
    pub style: ShapeStyle,
}

impl Primitive {
    pub fn new(kind: PrimitiveKind, placement: Placement) -> Self {
        Self {
            kind,
            placement,
            style: ShapeStyle::default(),
        }
    }

    pub(crate) fn to_path(&self, rect: Rect) -> BezPath {
        match self.kind {
            PrimitiveKind::Rectangle => rect_path(rect),
            PrimitiveKind::Ellipse => Ellipse::from_rect(rect).to_path(0.1),
            PrimitiveKind::Diamond => {
                let c = rect.center();
                closed_polyline(&[
                    Point::new(c.x, rect.y0),
                    Point::new(rect.x1, c.y),
                    Point::new(c.x, rect.y1),
                    Point::new(rect.x0, c.y),
                ])
            }
            PrimitiveKind::Triangle => closed_polyline(&[
                Point::new(rect.center().x, rect.y0),
                Point::new(rect.x1, rect.y1),
                Point::new(rect.x0, rect.y1),
            ]),
        }
    }
}

/// A regular polygon inscribed in its box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub placement: Placement,
    pub sides: u32,
    pub style: ShapeStyle,
}

impl Polygon {
    pub fn new(placement: Placement, sides: u32) -> Self {
        Self {
            placement,
            sides,
            style: ShapeStyle::default(),
        }
    }

    pub(crate) fn to_path(&self, rect: Rect) -> BezPath {
        let n = self.sides.max(3);
        let vertices: Vec<Point> = (0..n)
            .map(|i| on_ellipse(rect, -FRAC_PI_2 + TAU * i as f64 / n as f64, 1.0))
            .collect();
        closed_polyline(&vertices)
    }
}

/// A star with `points` tips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Star {
    pub placement: Placement,
    pub points: u32,
    /// Inner radius relative to the outer radius.
    pub inner_ratio: f64,
    pub style: ShapeStyle,
}

impl Star {
    pub fn new(placement: Placement, points: u32) -> Self {
        Self {
            placement,
            points,
            inner_ratio: 0.5,
            style: ShapeStyle::default(),
        }
    }

    pub(crate) fn to_path(&self, rect: Rect) -> BezPath {
        let n = self.points.max(3) * 2;
        let vertices: Vec<Point> = (0..n)
            .map(|i| {
                let radius = if i % 2 == 0 { 1.0 } else { self.inner_ratio };
                on_ellipse(rect, -FRAC_PI_2 + TAU * i as f64 / n as f64, radius)
            })
            .collect();
        closed_polyline(&vertices)
    }
}

fn on_ellipse(rect: Rect, angle: f64, radius: f64) -> Point {
    let c = rect.center();
    Point::new(
        c.x + angle.cos() * rect.width() / 2.0 * radius,
        c.y + angle.sin() * rect.height() / 2.0 * radius,
    )
}

fn closed_polyline(points: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    if let Some((first, rest)) = points.split_first() {
        path.move_to(*first);
        for p in rest {
            path.line_to(*p);
        }
        path.close_path();
    }
    path
}
