//! Frames (containers) and embedded media.

use super::{Placement, SerializableColor, ShapeStyle, sanitize_len, sanitize_point};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A container. Children are not stored here; they are the objects whose
/// `parent_id` names this frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// World position of the top-left corner.
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub title: String,
    pub style: ShapeStyle,
}

impl Frame {
    pub fn new(position: Point, width: f64, height: f64, title: impl Into<String>) -> Self {
        Self {
            position,
            width,
            height,
            title: title.into(),
            style: ShapeStyle {
                fill_color: Some(SerializableColor::new(245, 245, 245, 255)),
                stroke_width: 1.0,
                ..ShapeStyle::default()
            },
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub(crate) fn sanitize(&mut self) {
        self.position = sanitize_point(self.position);
        self.width = sanitize_len(self.width);
        self.height = sanitize_len(self.height);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Link,
}

/// Embedded media or link preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub placement: Placement,
    pub url: String,
    pub media: MediaKind,
    pub style: ShapeStyle,
}

impl Embed {
    pub const DEFAULT_WIDTH: f64 = 320.0;
    pub const DEFAULT_HEIGHT: f64 = 240.0;

    pub fn new(placement: Placement, url: impl Into<String>, media: MediaKind) -> Self {
        Self {
            placement,
            url: url.into(),
            media,
            style: ShapeStyle::default(),
        }
    }
}
