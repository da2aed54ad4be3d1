//! Viewport transform for pan/zoom, plus the frame-coalescing controller
//! that feeds it from wheel and pan input.

use crate::Instant;
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{MAX_SCALE, MIN_SCALE};

/// Maps between screen space (render surface pixels) and world space.
///
/// `to_world(p) = (p - offset) / scale` and `to_screen(q) = q * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Screen position of the world origin.
    pub offset: Vec2,
    /// Zoom factor, always within `[min_scale, max_scale]`.
    pub scale: f64,
    /// Minimum allowed scale.
    pub min_scale: f64,
    /// Maximum allowed scale.
    pub max_scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: 1.0,
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a viewport with custom scale bounds.
    pub fn with_bounds(min_scale: f64, max_scale: f64) -> Self {
        Self {
            scale: 1.0_f64.clamp(min_scale, max_scale),
            min_scale,
            max_scale,
            ..Self::default()
        }
    }

    /// World to screen transform for rendering.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.scale)
    }

    /// Screen to world transform for input handling.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.scale) * Affine::translate(-self.offset)
    }

    pub fn to_world(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.offset.x) / self.scale,
            (screen.y - self.offset.y) / self.scale,
        )
    }

    pub fn to_screen(&self, world: Point) -> Point {
        Point::new(
            world.x * self.scale + self.offset.x,
            world.y * self.scale + self.offset.y,
        )
    }

    /// Project a world rectangle onto the screen.
    pub fn rect_to_screen(&self, world: Rect) -> Rect {
        Rect::from_points(self.to_screen(world.origin()), self.to_screen(Point::new(world.x1, world.y1)))
    }

    /// Convert a screen distance to a world distance.
    pub fn screen_dist_to_world(&self, dist: f64) -> f64 {
        dist / self.scale
    }

    /// Pan by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        if delta.x.is_finite() && delta.y.is_finite() {
            self.offset += delta;
        }
    }

    /// Zoom by `factor`, keeping the world point under `anchor` fixed on screen.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let new_scale = (self.scale * factor).clamp(self.min_scale, self.max_scale);
        if (new_scale - self.scale).abs() < f64::EPSILON {
            return;
        }
        let world = self.to_world(anchor);
        self.scale = new_scale;
        self.offset = Vec2::new(anchor.x - world.x * new_scale, anchor.y - world.y * new_scale);
    }

    /// Fit the view to show `bounds` inside a viewport of `size`.
    pub fn fit_to_bounds(&mut self, bounds: Rect, size: Size, padding: f64) {
        if bounds.is_zero_area() {
            self.offset = Vec2::new(
                size.width / 2.0 - bounds.center().x * self.scale,
                size.height / 2.0 - bounds.center().y * self.scale,
            );
            return;
        }

        let padded = Size::new(
            (size.width - padding * 2.0).max(1.0),
            (size.height - padding * 2.0).max(1.0),
        );
        let scale_x = padded.width / bounds.width();
        let scale_y = padded.height / bounds.height();
        self.scale = scale_x.min(scale_y).clamp(self.min_scale, self.max_scale);

        let center = bounds.center();
        self.offset = Vec2::new(
            size.width / 2.0 - center.x * self.scale,
            size.height / 2.0 - center.y * self.scale,
        );
    }
}

/// Zoom accumulated from wheel events since the last frame.
#[derive(Debug, Clone, Copy)]
struct PendingZoom {
    anchor: Point,
    factor: f64,
}

/// An in-progress pan, measured from the pointer-down origin.
#[derive(Debug, Clone, Copy)]
struct PanTrack {
    origin: Point,
    origin_offset: Vec2,
    latest: Point,
    dirty: bool,
}

/// Coalesces high-frequency wheel and pan input into at most one viewport
/// update per animation frame.
#[derive(Debug, Clone, Default)]
pub struct ViewportController {
    pub viewport: Viewport,
    pending_zoom: Option<PendingZoom>,
    last_wheel: Option<Instant>,
    pan: Option<PanTrack>,
}

impl ViewportController {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    /// Queue a wheel zoom. Nothing changes until the next [`Self::on_frame`].
    pub fn on_wheel(&mut self, anchor: Point, delta_y: f64, sensitivity: f64, now: Instant) {
        if !delta_y.is_finite() {
            return;
        }
        let factor = (-delta_y * sensitivity).exp();
        let pending = self.pending_zoom.get_or_insert(PendingZoom { anchor, factor: 1.0 });
        pending.anchor = anchor;
        pending.factor *= factor;
        // Extreme deltas can overflow the product; the clamp in zoom_at handles the rest.
        if !pending.factor.is_finite() {
            pending.factor = if delta_y < 0.0 { f64::MAX } else { f64::MIN_POSITIVE };
        }
        self.last_wheel = Some(now);
    }

    /// Whether a wheel event arrived within the quiet period.
    pub fn is_zooming(&self, now: Instant, quiet: Duration) -> bool {
        self.last_wheel
            .is_some_and(|last| now.saturating_duration_since(last) < quiet)
    }

    /// Start tracking a pan from `origin` (screen).
    pub fn begin_pan(&mut self, origin: Point) {
        self.pan = Some(PanTrack {
            origin,
            origin_offset: self.viewport.offset,
            latest: origin,
            dirty: false,
        });
    }

    /// Record the latest pan pointer position. Applied on the next frame.
    pub fn update_pan(&mut self, screen: Point) {
        if let Some(pan) = &mut self.pan {
            pan.latest = screen;
            pan.dirty = true;
        }
    }

    /// Finish a pan, applying the final position immediately.
    pub fn end_pan(&mut self, screen: Point) {
        if let Some(pan) = self.pan.take() {
            self.viewport.offset = pan.origin_offset + (screen - pan.origin);
        }
    }

    pub fn is_panning(&self) -> bool {
        self.pan.is_some()
    }

    /// Apply everything queued since the previous frame.
    /// Returns true if the viewport changed.
    pub fn on_frame(&mut self) -> bool {
        let mut changed = false;
        if let Some(zoom) = self.pending_zoom.take() {
            let before = self.viewport.scale;
            self.viewport.zoom_at(zoom.anchor, zoom.factor);
            changed |= (self.viewport.scale - before).abs() > f64::EPSILON;
        }
        if let Some(pan) = &mut self.pan {
            if pan.dirty {
                self.viewport.offset = pan.origin_offset + (pan.latest - pan.origin);
                pan.dirty = false;
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_identity() {
        let viewport = Viewport::new();
        let p = Point::new(100.0, 200.0);
        assert!(approx(viewport.to_world(p), p));
    }

    #[test]
    fn test_to_world_with_offset_and_scale() {
        let viewport = Viewport {
            offset: Vec2::new(50.0, 100.0),
            scale: 2.0,
            ..Viewport::default()
        };
        let world = viewport.to_world(Point::new(150.0, 300.0));
        assert!(approx(world, Point::new(50.0, 100.0)));
    }

    #[test]
    fn test_roundtrip_conversion() {
        let viewport = Viewport {
            offset: Vec2::new(30.0, -20.0),
            scale: 1.5,
            ..Viewport::default()
        };
        for &(x, y) in &[(0.0, 0.0), (123.0, 456.0), (-80.5, 1e4), (3.3, -7.7)] {
            let p = Point::new(x, y);
            assert!(approx(viewport.to_screen(viewport.to_world(p)), p));
        }
    }

    #[test]
    fn test_affine_matches_formula() {
        let viewport = Viewport {
            offset: Vec2::new(12.0, 7.0),
            scale: 0.75,
            ..Viewport::default()
        };
        let p = Point::new(40.0, -3.0);
        assert!(approx(viewport.transform() * p, viewport.to_screen(p)));
        assert!(approx(viewport.inverse_transform() * p, viewport.to_world(p)));
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut viewport = Viewport {
            offset: Vec2::new(40.0, 10.0),
            scale: 1.2,
            ..Viewport::default()
        };
        let anchor = Point::new(320.0, 240.0);
        let before = viewport.to_world(anchor);
        viewport.zoom_at(anchor, 1.7);
        assert!(approx(viewport.to_world(anchor), before));
        viewport.zoom_at(anchor, 0.3);
        assert!(approx(viewport.to_world(anchor), before));
    }

    #[test]
    fn test_zoom_clamp() {
        let mut viewport = Viewport::new();
        for _ in 0..50 {
            viewport.zoom_at(Point::ZERO, 0.001);
        }
        assert!((viewport.scale - viewport.min_scale).abs() < f64::EPSILON);

        viewport.zoom_at(Point::ZERO, 1e9);
        assert!((viewport.scale - viewport.max_scale).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zoom_ignores_invalid_factor() {
        let mut viewport = Viewport::new();
        viewport.zoom_at(Point::ZERO, f64::NAN);
        viewport.zoom_at(Point::ZERO, -2.0);
        assert!((viewport.scale - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fit_to_bounds_centers_content() {
        let mut viewport = Viewport::new();
        let bounds = Rect::new(0.0, 0.0, 200.0, 100.0);
        viewport.fit_to_bounds(bounds, Size::new(800.0, 600.0), 50.0);
        let center = viewport.to_screen(bounds.center());
        assert!(approx(center, Point::new(400.0, 300.0)));
    }

    #[test]
    fn test_wheel_coalesced_until_frame() {
        let mut controller = ViewportController::default();
        let now = Instant::now();
        controller.on_wheel(Point::new(10.0, 10.0), -100.0, 0.0015, now);
        controller.on_wheel(Point::new(10.0, 10.0), -100.0, 0.0015, now);
        assert!((controller.viewport.scale - 1.0).abs() < f64::EPSILON);

        assert!(controller.on_frame());
        let expected = (0.3_f64).exp();
        assert!((controller.viewport.scale - expected).abs() < 1e-9);
        assert!(!controller.on_frame());
    }

    #[test]
    fn test_extreme_wheel_never_below_min() {
        let mut controller = ViewportController::default();
        let now = Instant::now();
        for _ in 0..20 {
            controller.on_wheel(Point::ZERO, 1e12, 0.0015, now);
            controller.on_frame();
        }
        assert!(controller.viewport.scale >= controller.viewport.min_scale);
        assert!((controller.viewport.scale - controller.viewport.min_scale).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zooming_flag_quiet_period() {
        let mut controller = ViewportController::default();
        let start = Instant::now();
        let quiet = Duration::from_millis(200);
        assert!(!controller.is_zooming(start, quiet));
        controller.on_wheel(Point::ZERO, 10.0, 0.0015, start);
        assert!(controller.is_zooming(start + Duration::from_millis(150), quiet));
        assert!(!controller.is_zooming(start + Duration::from_millis(250), quiet));
    }

    #[test]
    fn test_pan_applied_per_frame_and_flushed_on_end() {
        let mut controller = ViewportController::default();
        controller.begin_pan(Point::new(100.0, 100.0));
        controller.update_pan(Point::new(110.0, 105.0));
        controller.update_pan(Point::new(120.0, 110.0));
        assert_eq!(controller.viewport.offset, Vec2::ZERO);

        assert!(controller.on_frame());
        assert_eq!(controller.viewport.offset, Vec2::new(20.0, 10.0));

        controller.update_pan(Point::new(130.0, 90.0));
        controller.end_pan(Point::new(135.0, 95.0));
        assert_eq!(controller.viewport.offset, Vec2::new(35.0, -5.0));
        assert!(!controller.is_panning());
    }
}
