//! Board object definitions.
//!
//! Every object is a [`BoardObject`]: common metadata plus one [`Shape`]
//! variant. Dispatch over kinds is an exhaustive `match`, so adding a kind
//! means visiting every operation below.

mod comment;
mod connector;
mod frame;
mod geometric;
mod note;
mod stroke;

pub use comment::Comment;
pub use connector::{Anchor, Connector, Edge, Endpoint, Route};
pub use frame::{Embed, Frame, MediaKind};
pub use geometric::{Polygon, Primitive, PrimitiveKind, Star};
pub use note::{Emoji, Sticky, Text};
pub use stroke::{Stroke, StrokeTool};

use kurbo::{BezPath, Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for board objects and comments.
pub type ObjectId = Uuid;

/// Smallest width/height an object may have after sanitizing.
pub const MIN_SIZE: f64 = 1.0;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    /// Default sticky-note yellow.
    pub fn note_yellow() -> Self {
        Self::new(255, 235, 130, 255)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Style properties shared by every kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    pub stroke_color: SerializableColor,
    pub stroke_width: f64,
    /// Fill color (None = no fill).
    pub fill_color: Option<SerializableColor>,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            stroke_width: 2.0,
            fill_color: None,
            opacity: 1.0,
        }
    }
}

impl ShapeStyle {
    /// Style with a fill, used for notes.
    pub fn filled(fill: SerializableColor) -> Self {
        Self {
            fill_color: Some(fill),
            ..Self::default()
        }
    }

    pub fn stroke(&self) -> Color {
        self.stroke_color.into()
    }

    /// Stroke color with opacity applied.
    pub fn stroke_with_opacity(&self) -> Color {
        with_opacity(self.stroke_color, self.opacity)
    }

    pub fn fill(&self) -> Option<Color> {
        self.fill_color.map(|c| c.into())
    }

    /// Fill color with opacity applied.
    pub fn fill_with_opacity(&self) -> Option<Color> {
        self.fill_color.map(|c| with_opacity(c, self.opacity))
    }

    fn sanitize(&mut self) {
        self.stroke_width = finite_or(self.stroke_width, 2.0).max(0.0);
        self.opacity = finite_or(self.opacity, 1.0).clamp(0.0, 1.0);
    }
}

fn with_opacity(color: SerializableColor, opacity: f64) -> Color {
    let alpha = (color.a as f64 * opacity.clamp(0.0, 1.0)) as u8;
    Color::from_rgba8(color.r, color.g, color.b, alpha)
}

/// Box geometry of a nestable object.
///
/// When `parent_id` is set, `position` is an offset from the parent frame's
/// position; otherwise it is a world position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub position: Point,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub parent_id: Option<ObjectId>,
}

impl Placement {
    pub fn new(position: Point, width: f64, height: f64) -> Self {
        Self {
            position,
            width,
            height,
            parent_id: None,
        }
    }

    /// Rectangle in the placement's own coordinate space (local or world).
    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
    }

    fn sanitize(&mut self) {
        self.position = sanitize_point(self.position);
        self.width = sanitize_len(self.width);
        self.height = sanitize_len(self.height);
    }
}

/// Metadata common to every object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub id: ObjectId,
    pub owner: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Write stamp of the last mutation. Never part of a patch.
    pub updated_at: u64,
    /// Explicit z-order; falls back to `created_at`.
    #[serde(default)]
    pub display_order: Option<f64>,
    #[serde(default)]
    pub link_url: Option<String>,
}

impl ObjectMeta {
    pub fn new(owner: impl Into<String>) -> Self {
        let now = crate::wall_clock_ms();
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            created_at: now,
            updated_at: now,
            display_order: None,
            link_url: None,
        }
    }

    /// Effective z-order key.
    pub fn order_key(&self) -> f64 {
        self.display_order.unwrap_or(self.created_at as f64)
    }
}

/// Discriminant of [`Shape`], for logging and kind checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Sticky,
    Primitive,
    Polygon,
    Star,
    Connector,
    Stroke,
    Text,
    Emoji,
    Frame,
    Embed,
}

/// Closed set of object kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Sticky(Sticky),
    Primitive(Primitive),
    Polygon(Polygon),
    Star(Star),
    Connector(Connector),
    Stroke(Stroke),
    Text(Text),
    Emoji(Emoji),
    Frame(Frame),
    Embed(Embed),
}

impl Shape {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Shape::Sticky(_) => ObjectKind::Sticky,
            Shape::Primitive(_) => ObjectKind::Primitive,
            Shape::Polygon(_) => ObjectKind::Polygon,
            Shape::Star(_) => ObjectKind::Star,
            Shape::Connector(_) => ObjectKind::Connector,
            Shape::Stroke(_) => ObjectKind::Stroke,
            Shape::Text(_) => ObjectKind::Text,
            Shape::Emoji(_) => ObjectKind::Emoji,
            Shape::Frame(_) => ObjectKind::Frame,
            Shape::Embed(_) => ObjectKind::Embed,
        }
    }

    /// Placement of nestable kinds. Frames, connectors and strokes return None.
    pub fn placement(&self) -> Option<&Placement> {
        match self {
            Shape::Sticky(s) => Some(&s.placement),
            Shape::Primitive(s) => Some(&s.placement),
            Shape::Polygon(s) => Some(&s.placement),
            Shape::Star(s) => Some(&s.placement),
            Shape::Text(s) => Some(&s.placement),
            Shape::Emoji(s) => Some(&s.placement),
            Shape::Embed(s) => Some(&s.placement),
            Shape::Connector(_) | Shape::Stroke(_) | Shape::Frame(_) => None,
        }
    }

    pub fn placement_mut(&mut self) -> Option<&mut Placement> {
        match self {
            Shape::Sticky(s) => Some(&mut s.placement),
            Shape::Primitive(s) => Some(&mut s.placement),
            Shape::Polygon(s) => Some(&mut s.placement),
            Shape::Star(s) => Some(&mut s.placement),
            Shape::Text(s) => Some(&mut s.placement),
            Shape::Emoji(s) => Some(&mut s.placement),
            Shape::Embed(s) => Some(&mut s.placement),
            Shape::Connector(_) | Shape::Stroke(_) | Shape::Frame(_) => None,
        }
    }

    pub fn is_nestable(&self) -> bool {
        self.placement().is_some()
    }

    pub fn parent_id(&self) -> Option<ObjectId> {
        self.placement().and_then(|p| p.parent_id)
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Shape::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_connector(&self) -> Option<&Connector> {
        match self {
            Shape::Connector(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_stroke(&self) -> Option<&Stroke> {
        match self {
            Shape::Stroke(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the pointer tool can grab this object.
    pub fn is_draggable(&self) -> bool {
        true
    }

    /// Whether resize handles are offered for this object.
    pub fn is_resizable(&self) -> bool {
        !matches!(self, Shape::Connector(_) | Shape::Stroke(_))
    }

    /// Whether the smart connector may anchor to this object.
    pub fn is_anchorable(&self) -> bool {
        !matches!(self, Shape::Connector(_) | Shape::Stroke(_))
    }

    pub fn style(&self) -> &ShapeStyle {
        match self {
            Shape::Sticky(s) => &s.style,
            Shape::Primitive(s) => &s.style,
            Shape::Polygon(s) => &s.style,
            Shape::Star(s) => &s.style,
            Shape::Connector(s) => &s.style,
            Shape::Stroke(s) => &s.style,
            Shape::Text(s) => &s.style,
            Shape::Emoji(s) => &s.style,
            Shape::Frame(s) => &s.style,
            Shape::Embed(s) => &s.style,
        }
    }

    pub fn style_mut(&mut self) -> &mut ShapeStyle {
        match self {
            Shape::Sticky(s) => &mut s.style,
            Shape::Primitive(s) => &mut s.style,
            Shape::Polygon(s) => &mut s.style,
            Shape::Star(s) => &mut s.style,
            Shape::Connector(s) => &mut s.style,
            Shape::Stroke(s) => &mut s.style,
            Shape::Text(s) => &mut s.style,
            Shape::Emoji(s) => &mut s.style,
            Shape::Frame(s) => &mut s.style,
            Shape::Embed(s) => &mut s.style,
        }
    }

    /// Geometry of the object given its resolved world box.
    ///
    /// Connectors are shaped by [`crate::anchors::connector_path`] since they
    /// need their endpoints resolved first; here they fall back to a segment
    /// across `rect`.
    pub fn to_path(&self, rect: Rect) -> BezPath {
        match self {
            Shape::Sticky(s) => s.to_path(rect),
            Shape::Primitive(s) => s.to_path(rect),
            Shape::Polygon(s) => s.to_path(rect),
            Shape::Star(s) => s.to_path(rect),
            Shape::Stroke(s) => s.to_path(),
            Shape::Text(_) | Shape::Emoji(_) | Shape::Embed(_) | Shape::Frame(_) => {
                rect_path(rect)
            }
            Shape::Connector(_) => {
                let mut path = BezPath::new();
                path.move_to(rect.origin());
                path.line_to(Point::new(rect.x1, rect.y1));
                path
            }
        }
    }

    /// Translate the stored geometry by `delta`.
    ///
    /// Nestable kinds move their stored position (local when nested).
    /// Anchored connector endpoints are left alone: they follow their target.
    pub fn translate(&mut self, delta: Vec2) {
        if let Some(p) = self.placement_mut() {
            p.position += delta;
            return;
        }
        match self {
            Shape::Frame(f) => f.position += delta,
            Shape::Stroke(s) => s.translate(delta),
            Shape::Connector(c) => c.translate_free(delta),
            Shape::Sticky(_)
            | Shape::Primitive(_)
            | Shape::Polygon(_)
            | Shape::Star(_)
            | Shape::Text(_)
            | Shape::Emoji(_)
            | Shape::Embed(_) => {}
        }
    }

    /// Clamp invalid geometry (non-finite values, zero or negative sizes).
    pub fn sanitize(&mut self) {
        if let Some(p) = self.placement_mut() {
            p.sanitize();
        }
        match self {
            Shape::Frame(f) => f.sanitize(),
            Shape::Stroke(s) => s.sanitize(),
            Shape::Connector(c) => c.sanitize(),
            Shape::Polygon(p) => p.sides = p.sides.clamp(3, 64),
            Shape::Star(s) => {
                s.points = s.points.clamp(3, 64);
                s.inner_ratio = finite_or(s.inner_ratio, 0.5).clamp(0.05, 1.0);
            }
            Shape::Text(t) => t.font_size = sanitize_len(t.font_size),
            Shape::Sticky(_) | Shape::Primitive(_) | Shape::Emoji(_) | Shape::Embed(_) => {}
        }
        self.style_mut().sanitize();
    }
}

/// A typed object on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardObject {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    #[serde(flatten)]
    pub shape: Shape,
}

impl BoardObject {
    pub fn new(owner: impl Into<String>, shape: Shape) -> Self {
        let mut object = Self {
            meta: ObjectMeta::new(owner),
            shape,
        };
        object.shape.sanitize();
        object
    }

    pub fn id(&self) -> ObjectId {
        self.meta.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.shape.kind()
    }

    pub fn is_frame(&self) -> bool {
        matches!(self.shape, Shape::Frame(_))
    }

    /// Copy with a fresh id, for paste and duplicate.
    pub fn with_new_id(&self) -> Self {
        let mut copy = self.clone();
        copy.meta.id = Uuid::new_v4();
        copy
    }
}

pub(crate) fn rect_path(rect: Rect) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(Point::new(rect.x0, rect.y0));
    path.line_to(Point::new(rect.x1, rect.y0));
    path.line_to(Point::new(rect.x1, rect.y1));
    path.line_to(Point::new(rect.x0, rect.y1));
    path.close_path();
    path
}

pub(crate) fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

pub(crate) fn sanitize_len(value: f64) -> f64 {
    finite_or(value, MIN_SIZE).max(MIN_SIZE)
}

pub(crate) fn sanitize_point(point: Point) -> Point {
    Point::new(finite_or(point.x, 0.0), finite_or(point.y, 0.0))
}

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    (point - (a + seg * t)).hypot()
}
