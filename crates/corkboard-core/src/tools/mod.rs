//! Tool system for the canvas.

pub mod drag;
pub mod gesture;
pub mod resize;

use crate::shapes::{
    Emoji, Frame, ObjectId, Placement, Polygon, Primitive, PrimitiveKind, Route, Shape, ShapeStyle,
    Star, Sticky, StrokeTool,
};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolKind {
    #[default]
    Pointer,
    Pen,
    Highlighter,
    Eraser,
    Lasso,
    /// Click a source object, then a target object.
    SmartConnector,
    /// Free two-point line.
    Line,
    /// Free two-point arrow.
    Arrow,
    Sticky,
    Rectangle,
    Ellipse,
    Diamond,
    Triangle,
    Polygon,
    Star,
    Text,
    Emoji,
    Frame,
}

impl ToolKind {
    /// Stroke tool for freehand drawing tools.
    pub fn stroke_tool(self) -> Option<StrokeTool> {
        match self {
            ToolKind::Pen => Some(StrokeTool::Pen),
            ToolKind::Highlighter => Some(StrokeTool::Highlighter),
            _ => None,
        }
    }

    /// Tools that drag out a free line.
    pub fn is_line_tool(self) -> bool {
        matches!(self, ToolKind::Line | ToolKind::Arrow)
    }

    /// Tools that place an object with a click.
    pub fn is_placement_tool(self) -> bool {
        matches!(
            self,
            ToolKind::Sticky
                | ToolKind::Rectangle
                | ToolKind::Ellipse
                | ToolKind::Diamond
                | ToolKind::Triangle
                | ToolKind::Polygon
                | ToolKind::Star
                | ToolKind::Emoji
                | ToolKind::Frame
        )
    }

    /// Shape placed by a click centered on `center` (world), or None if this
    /// tool does not place objects.
    pub fn placed_shape(self, center: Point, settings: &ToolSettings) -> Option<Shape> {
        let boxed = |w: f64, h: f64| Placement::new(center - Vec2::new(w / 2.0, h / 2.0), w, h);
        let size = settings.shape_size;
        let primitive = |kind| {
            let mut shape = Primitive::new(kind, boxed(size, size));
            shape.style = settings.style.clone();
            Shape::Primitive(shape)
        };
        let shape = match self {
            ToolKind::Sticky => Shape::Sticky(Sticky::new(
                boxed(Sticky::DEFAULT_SIZE, Sticky::DEFAULT_SIZE),
                "",
            )),
            ToolKind::Rectangle => primitive(PrimitiveKind::Rectangle),
            ToolKind::Ellipse => primitive(PrimitiveKind::Ellipse),
            ToolKind::Diamond => primitive(PrimitiveKind::Diamond),
            ToolKind::Triangle => primitive(PrimitiveKind::Triangle),
            ToolKind::Polygon => {
                let mut polygon = Polygon::new(boxed(size, size), settings.polygon_sides);
                polygon.style = settings.style.clone();
                Shape::Polygon(polygon)
            }
            ToolKind::Star => {
                let mut star = Star::new(boxed(size, size), settings.star_points);
                star.style = settings.style.clone();
                Shape::Star(star)
            }
            ToolKind::Emoji => Shape::Emoji(Emoji::new(
                boxed(Emoji::DEFAULT_SIZE, Emoji::DEFAULT_SIZE),
                settings.emoji.clone(),
            )),
            ToolKind::Frame => {
                let (w, h) = settings.frame_size;
                Shape::Frame(Frame::new(center - Vec2::new(w / 2.0, h / 2.0), w, h, "Frame"))
            }
            ToolKind::Pointer
            | ToolKind::Pen
            | ToolKind::Highlighter
            | ToolKind::Eraser
            | ToolKind::Lasso
            | ToolKind::SmartConnector
            | ToolKind::Line
            | ToolKind::Arrow
            | ToolKind::Text => return None,
        };
        Some(shape)
    }
}

/// Per-session options applied to objects created by tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub style: ShapeStyle,
    /// Side of newly placed primitive shapes.
    pub shape_size: f64,
    pub frame_size: (f64, f64),
    pub polygon_sides: u32,
    pub star_points: u32,
    pub emoji: String,
    pub connector_route: Route,
    pub font_size: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            style: ShapeStyle::default(),
            shape_size: 120.0,
            frame_size: (800.0, 600.0),
            polygon_sides: 6,
            star_points: 5,
            emoji: "👍".to_string(),
            connector_route: Route::Straight,
            font_size: crate::shapes::Text::DEFAULT_FONT_SIZE,
        }
    }
}

/// Events produced for UI chrome.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    BackgroundClick { world: Point },
    ObjectClick { id: ObjectId },
    ObjectDragEnd { ids: Vec<ObjectId> },
    ObjectResizeEnd { id: ObjectId },
    SelectionBoxEnd { rect: Rect, ids: Vec<ObjectId> },
    LassoEnd { ids: Vec<ObjectId> },
    /// Secondary click on an object; `screen` positions the menu.
    ContextMenu { id: ObjectId, screen: Point },
    /// A text editor should open for `id`, or for a new text object at `world`.
    TextEditRequested { id: Option<ObjectId>, world: Point },
}
