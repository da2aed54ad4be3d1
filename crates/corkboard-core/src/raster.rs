//! Stroke rasterization for handwriting recognition.
//!
//! Selected strokes are drawn black on white into an 8-bit grayscale
//! bitmap, scaled so the longer side fits a fixed size, and encoded as PNG.

use crate::shapes::{Stroke, Text, point_to_segment_dist};
use kurbo::{Point, Rect};
use thiserror::Error;

/// Longer side of the rendered bitmap, in pixels.
pub const DEFAULT_MAX_SIDE: u32 = 512;
/// Blank border around the ink, in pixels.
const PADDING_PX: f64 = 8.0;
const MIN_FONT_SIZE: f64 = 12.0;
const MAX_FONT_SIZE: f64 = 200.0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("No stroke points to rasterize")]
    Empty,
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] png::EncodingError),
}

/// A grayscale bitmap, row-major, 0 = ink, 255 = paper.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// World bounds of the rasterized ink.
    pub bounds: Rect,
}

impl Raster {
    fn blank(width: u32, height: u32, bounds: Rect) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width as usize * height as usize],
            bounds,
        }
    }

    /// Ink a disc-swept segment from `a` to `b` (pixel space).
    fn draw_segment(&mut self, a: Point, b: Point, radius: f64) {
        let x0 = (a.x.min(b.x) - radius).floor().max(0.0) as u32;
        let y0 = (a.y.min(b.y) - radius).floor().max(0.0) as u32;
        let x1 = ((a.x.max(b.x) + radius).ceil().max(0.0) as u32).min(self.width.saturating_sub(1));
        let y1 = ((a.y.max(b.y) + radius).ceil().max(0.0) as u32).min(self.height.saturating_sub(1));
        for y in y0..=y1 {
            for x in x0..=x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if point_to_segment_dist(center, a, b) <= radius {
                    self.pixels[(y * self.width + x) as usize] = 0;
                }
            }
        }
    }

    pub fn ink_count(&self) -> usize {
        self.pixels.iter().filter(|p| **p == 0).count()
    }

    pub fn to_png(&self) -> Result<Vec<u8>, RasterError> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&self.pixels)?;
        }
        Ok(out)
    }
}

/// World bounds of every point of `strokes`.
pub fn strokes_bounds<'a>(strokes: impl IntoIterator<Item = &'a Stroke>) -> Option<Rect> {
    strokes
        .into_iter()
        .filter_map(Stroke::bounds)
        .reduce(|a, b| a.union(b))
}

/// Draw `strokes` into a bitmap whose longer side is `max_side` pixels.
pub fn rasterize_strokes(strokes: &[&Stroke], max_side: u32) -> Result<Raster, RasterError> {
    let bounds = strokes_bounds(strokes.iter().copied()).ok_or(RasterError::Empty)?;
    let inner = (max_side.max(1) as f64 - 2.0 * PADDING_PX).max(1.0);
    let longest = bounds.width().max(bounds.height());
    let scale = if longest > 0.0 { inner / longest } else { 1.0 };
    let width = (bounds.width() * scale + 2.0 * PADDING_PX).round().max(1.0) as u32;
    let height = (bounds.height() * scale + 2.0 * PADDING_PX).round().max(1.0) as u32;

    let to_pixel = |p: Point| {
        Point::new(
            (p.x - bounds.x0) * scale + PADDING_PX,
            (p.y - bounds.y0) * scale + PADDING_PX,
        )
    };

    let mut raster = Raster::blank(width, height, bounds);
    for stroke in strokes {
        let radius = (stroke.style.stroke_width * scale / 2.0).max(1.0);
        match stroke.points.as_slice() {
            [] => {}
            [single] => {
                let p = to_pixel(*single);
                raster.draw_segment(p, p, radius);
            }
            points => {
                for pair in points.windows(2) {
                    raster.draw_segment(to_pixel(pair[0]), to_pixel(pair[1]), radius);
                }
            }
        }
    }
    Ok(raster)
}

/// Font size that makes `text` roughly fill `bounds`.
pub fn estimate_font_size(bounds: Rect, text: &str) -> f64 {
    let lines = text.lines().count().max(1) as f64;
    let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0).max(1) as f64;
    let by_height = bounds.height() / (lines * Text::LINE_HEIGHT);
    let by_width = bounds.width() / (longest * Text::CHAR_WIDTH);
    let size = by_height.min(by_width);
    if size.is_finite() {
        size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
    } else {
        Text::DEFAULT_FONT_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::StrokeTool;

    fn line(a: (f64, f64), b: (f64, f64)) -> Stroke {
        Stroke::new(StrokeTool::Pen, vec![Point::new(a.0, a.1), Point::new(b.0, b.1)])
    }

    #[test]
    fn test_rasterize_fits_max_side() {
        let a = line((0.0, 0.0), (200.0, 0.0));
        let b = line((0.0, 100.0), (200.0, 100.0));
        let raster = rasterize_strokes(&[&a, &b], 128).unwrap();
        assert_eq!(raster.width, 128);
        assert!(raster.height < raster.width);
        assert!(raster.ink_count() > 0);
        assert_eq!(raster.bounds, Rect::new(0.0, 0.0, 200.0, 100.0));
    }

    #[test]
    fn test_empty_selection_is_an_error() {
        let empty = Stroke::new(StrokeTool::Pen, Vec::new());
        assert!(matches!(rasterize_strokes(&[&empty], 64), Err(RasterError::Empty)));
    }

    #[test]
    fn test_png_signature() {
        let s = line((0.0, 0.0), (50.0, 50.0));
        let png = rasterize_strokes(&[&s], 64).unwrap().to_png().unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_font_size_from_bounds() {
        // Two lines in a 100 high box: 100 / (2 * 1.25) = 40.
        let size = estimate_font_size(Rect::new(0.0, 0.0, 1000.0, 100.0), "ab\ncd");
        assert!((size - 40.0).abs() < 1e-9);
        // Narrow boxes are limited by width.
        let narrow = estimate_font_size(Rect::new(0.0, 0.0, 60.0, 400.0), "hello");
        assert!((narrow - 20.0).abs() < 1e-9);
        assert_eq!(estimate_font_size(Rect::new(0.0, 0.0, 1.0, 1.0), "x"), MIN_FONT_SIZE);
    }
}
