//! Freehand strokes.

use super::{SerializableColor, ShapeStyle, point_to_segment_dist};
use kurbo::{BezPath, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeTool {
    Pen,
    Highlighter,
}

/// A freehand stroke in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub tool: StrokeTool,
    pub points: Vec<Point>,
    pub style: ShapeStyle,
}

impl Stroke {
    pub fn new(tool: StrokeTool, points: Vec<Point>) -> Self {
        let style = match tool {
            StrokeTool::Pen => ShapeStyle::default(),
            StrokeTool::Highlighter => ShapeStyle {
                stroke_color: SerializableColor::new(255, 220, 0, 255),
                stroke_width: 16.0,
                opacity: 0.4,
                ..ShapeStyle::default()
            },
        };
        Self { tool, points, style }
    }

    /// Min/max over the point list. None for an empty stroke.
    pub fn bounds(&self) -> Option<Rect> {
        let (first, rest) = self.points.split_first()?;
        let mut rect = Rect::from_points(*first, *first);
        for p in rest {
            rect = rect.union_pt(*p);
        }
        Some(rect)
    }

    /// Whether the stroke passes within `radius` of `point`.
    pub fn is_within(&self, point: Point, radius: f64) -> bool {
        self.distance_to(point) <= radius
    }

    /// Distance from `point` to the polyline through the stroke's points.
    pub fn distance_to(&self, point: Point) -> f64 {
        match self.points.as_slice() {
            [] => f64::INFINITY,
            [only] => (*only - point).hypot(),
            points => points
                .windows(2)
                .map(|w| point_to_segment_dist(point, w[0], w[1]))
                .fold(f64::INFINITY, f64::min),
        }
    }

    pub(crate) fn translate(&mut self, delta: Vec2) {
        for p in &mut self.points {
            *p += delta;
        }
    }

    pub(crate) fn sanitize(&mut self) {
        self.points.retain(|p| p.x.is_finite() && p.y.is_finite());
    }

    pub(crate) fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        if let Some((first, rest)) = self.points.split_first() {
            path.move_to(*first);
            if rest.is_empty() {
                path.line_to(*first);
            }
            for p in rest {
                path.line_to(*p);
            }
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_min_max() {
        let stroke = Stroke::new(
            StrokeTool::Pen,
            vec![Point::new(5.0, 10.0), Point::new(-3.0, 20.0), Point::new(8.0, 0.0)],
        );
        assert_eq!(stroke.bounds(), Some(Rect::new(-3.0, 0.0, 8.0, 20.0)));
    }

    #[test]
    fn test_empty_stroke_has_no_bounds() {
        assert!(Stroke::new(StrokeTool::Pen, Vec::new()).bounds().is_none());
    }

    #[test]
    fn test_is_within_between_sparse_points() {
        let stroke = Stroke::new(StrokeTool::Pen, vec![Point::ZERO, Point::new(100.0, 0.0)]);
        assert!(stroke.is_within(Point::new(50.0, 3.0), 10.0));
        assert!(!stroke.is_within(Point::new(50.0, 50.0), 10.0));
        assert!(Stroke::new(StrokeTool::Pen, vec![Point::ZERO]).is_within(Point::new(3.0, 4.0), 5.0));
    }

    #[test]
    fn test_sanitize_drops_non_finite_points() {
        let mut stroke = Stroke::new(StrokeTool::Highlighter, vec![Point::new(f64::NAN, 0.0), Point::ZERO]);
        stroke.sanitize();
        assert_eq!(stroke.points, vec![Point::ZERO]);
    }
}
