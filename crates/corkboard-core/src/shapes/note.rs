//! Text-bearing kinds: sticky notes, free text and emoji.

use super::{Placement, SerializableColor, ShapeStyle};
use kurbo::{BezPath, Rect, RoundedRect, Shape as KurboShape};
use serde::{Deserialize, Serialize};

/// A sticky note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sticky {
    pub placement: Placement,
    pub text: String,
    pub style: ShapeStyle,
}

impl Sticky {
    /// Default size of a newly placed note.
    pub const DEFAULT_SIZE: f64 = 200.0;
    const CORNER_RADIUS: f64 = 6.0;

    pub fn new(placement: Placement, text: impl Into<String>) -> Self {
        Self {
            placement,
            text: text.into(),
            style: ShapeStyle::filled(SerializableColor::note_yellow()),
        }
    }

    pub(crate) fn to_path(&self, rect: Rect) -> BezPath {
        let radius = Self::CORNER_RADIUS.min(rect.width() / 2.0).min(rect.height() / 2.0);
        RoundedRect::from_rect(rect, radius).to_path(0.1)
    }
}

/// Free-standing text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub placement: Placement,
    pub content: String,
    pub font_size: f64,
    pub style: ShapeStyle,
}

impl Text {
    pub const DEFAULT_FONT_SIZE: f64 = 20.0;
    /// Line height relative to the font size.
    pub const LINE_HEIGHT: f64 = 1.25;
    /// Average glyph advance relative to the font size.
    pub const CHAR_WIDTH: f64 = 0.6;

    pub fn new(placement: Placement, content: impl Into<String>, font_size: f64) -> Self {
        Self {
            placement,
            content: content.into(),
            font_size,
            style: ShapeStyle::default(),
        }
    }

    /// Approximate box for `content` at `font_size`, used when committing text.
    pub fn estimate_size(content: &str, font_size: f64) -> (f64, f64) {
        let lines: Vec<&str> = content.lines().collect();
        let line_count = lines.len().max(1) as f64;
        let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0).max(1) as f64;
        (
            widest * font_size * Self::CHAR_WIDTH,
            line_count * font_size * Self::LINE_HEIGHT,
        )
    }
}

/// A single emoji glyph. Kept square on resize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emoji {
    pub placement: Placement,
    pub glyph: String,
    pub style: ShapeStyle,
}

impl Emoji {
    pub const DEFAULT_SIZE: f64 = 64.0;

    pub fn new(placement: Placement, glyph: impl Into<String>) -> Self {
        Self {
            placement,
            glyph: glyph.into(),
            style: ShapeStyle::default(),
        }
    }
}
