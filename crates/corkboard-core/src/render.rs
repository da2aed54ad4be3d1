//! Backend-agnostic render plans.
//!
//! The engine does not draw. It produces a culled, paint-ordered list of
//! world-space items that a host renderer strokes and fills with its own
//! backend, plus selection overlays.

use crate::anchors;
use crate::config::EngineConfig;
use crate::hit_test::{is_visible, object_bounds, paint_order};
use crate::selection::SelectionSet;
use crate::shapes::{BoardObject, ObjectId, ObjectKind, Shape};
use crate::store::ObjectStore;
use crate::tools::resize::handles_for;
use crate::viewport::Viewport;
use kurbo::{Affine, BezPath, Point, Rect, Size};
use peniko::Color;

/// Screen size of a drawn resize handle.
const HANDLE_SIZE_PX: f64 = 8.0;

/// Everything a plan is computed from.
pub struct RenderContext<'a> {
    pub store: &'a ObjectStore,
    pub viewport: &'a Viewport,
    /// Render surface size in pixels.
    pub viewport_size: Size,
    pub selection: &'a SelectionSet,
    pub config: &'a EngineConfig,
    /// Active marquee in world coordinates.
    pub marquee: Option<Rect>,
    /// Live lasso outline in world coordinates.
    pub lasso: Option<Vec<Point>>,
    /// In-progress ink, line or connector, in world coordinates.
    pub preview: Option<BezPath>,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        store: &'a ObjectStore,
        viewport: &'a Viewport,
        viewport_size: Size,
        selection: &'a SelectionSet,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            viewport,
            viewport_size,
            selection,
            config,
            marquee: None,
            lasso: None,
            preview: None,
        }
    }

    pub fn with_marquee(mut self, rect: Option<Rect>) -> Self {
        self.marquee = rect;
        self
    }

    pub fn with_lasso(mut self, points: Option<Vec<Point>>) -> Self {
        self.lasso = points;
        self
    }

    pub fn with_preview(mut self, path: Option<BezPath>) -> Self {
        self.preview = path;
        self
    }
}

/// How an item is drawn.
#[derive(Debug, Clone)]
pub enum Geometry {
    /// Level-of-detail stand-in at low zoom.
    Flat { rect: Rect, color: Color },
    Path {
        path: BezPath,
        fill: Option<Color>,
        stroke: Color,
        stroke_width: f64,
    },
    Connector {
        path: BezPath,
        head: Option<BezPath>,
        stroke: Color,
        stroke_width: f64,
    },
}

/// One object to draw, in world coordinates.
#[derive(Debug, Clone)]
pub struct RenderItem {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub bounds: Rect,
    pub selected: bool,
    pub geometry: Geometry,
    /// Text drawn inside the object: note text, text content, emoji glyph
    /// or frame title. Omitted for the object being edited and at low zoom.
    pub label: Option<String>,
}

/// Chrome drawn above the objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    SelectionBounds(Rect),
    Handle(Rect),
    Marquee(Rect),
    Lasso(Vec<Point>),
    Preview(BezPath),
}

#[derive(Debug, Clone)]
pub struct RenderPlan {
    /// World to screen transform for every item and overlay.
    pub transform: Affine,
    /// True when items use flat level-of-detail geometry.
    pub low_detail: bool,
    pub items: Vec<RenderItem>,
    pub overlays: Vec<Overlay>,
}

/// Build the plan for one frame.
pub fn render_plan(ctx: &RenderContext) -> RenderPlan {
    let low_detail = ctx.viewport.scale < ctx.config.lod_scale_threshold;
    let editing = ctx.selection.editing();

    let items: Vec<RenderItem> = paint_order(ctx.store, ctx.selection.ids())
        .into_iter()
        .filter_map(|object| {
            let bounds = object_bounds(ctx.store, object)?;
            if !is_visible(ctx.viewport, bounds, ctx.viewport_size, ctx.config.cull_padding_px) {
                return None;
            }
            let geometry = if low_detail {
                flat_geometry(object, bounds)
            } else {
                full_geometry(ctx.store, object, bounds)
            };
            let label = if low_detail || editing == Some(object.id()) {
                None
            } else {
                label(object)
            };
            Some(RenderItem {
                id: object.id(),
                kind: object.kind(),
                bounds,
                selected: ctx.selection.contains(object.id()),
                geometry,
                label,
            })
        })
        .collect();

    let mut overlays = Vec::new();
    let handle_half = ctx.viewport.screen_dist_to_world(HANDLE_SIZE_PX) / 2.0;
    for item in items.iter().filter(|i| i.selected) {
        overlays.push(Overlay::SelectionBounds(item.bounds));
        let resizable = ctx
            .store
            .get(item.id)
            .is_some_and(|o| o.shape.is_resizable());
        if resizable && ctx.selection.len() == 1 {
            overlays.extend(handles_for(item.bounds).into_iter().map(|h| {
                Overlay::Handle(Rect::from_center_size(
                    h.position,
                    (handle_half * 2.0, handle_half * 2.0),
                ))
            }));
        }
    }
    if let Some(rect) = ctx.marquee {
        overlays.push(Overlay::Marquee(rect.abs()));
    }
    if let Some(points) = &ctx.lasso {
        overlays.push(Overlay::Lasso(points.clone()));
    }
    if let Some(path) = &ctx.preview {
        overlays.push(Overlay::Preview(path.clone()));
    }

    RenderPlan {
        transform: ctx.viewport.transform(),
        low_detail,
        items,
        overlays,
    }
}

fn flat_geometry(object: &BoardObject, bounds: Rect) -> Geometry {
    let style = object.shape.style();
    Geometry::Flat {
        rect: bounds,
        color: style.fill_with_opacity().unwrap_or_else(|| style.stroke_with_opacity()),
    }
}

fn full_geometry(store: &ObjectStore, object: &BoardObject, bounds: Rect) -> Geometry {
    let style = object.shape.style();
    match &object.shape {
        Shape::Connector(connector) => {
            let resolved = anchors::connector_geometry(store, connector);
            Geometry::Connector {
                path: resolved.path,
                head: resolved.head,
                stroke: style.stroke_with_opacity(),
                stroke_width: style.stroke_width,
            }
        }
        shape => Geometry::Path {
            path: shape.to_path(bounds),
            fill: style.fill_with_opacity(),
            stroke: style.stroke_with_opacity(),
            stroke_width: style.stroke_width,
        },
    }
}

fn label(object: &BoardObject) -> Option<String> {
    let text = match &object.shape {
        Shape::Sticky(s) => &s.text,
        Shape::Text(t) => &t.content,
        Shape::Emoji(e) => &e.glyph,
        Shape::Frame(f) => &f.title,
        Shape::Embed(e) => &e.url,
        Shape::Primitive(_) | Shape::Polygon(_) | Shape::Star(_) | Shape::Connector(_) | Shape::Stroke(_) => {
            return None;
        }
    };
    (!text.is_empty()).then(|| text.clone())
}
