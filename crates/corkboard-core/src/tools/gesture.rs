//! Pointer gesture state machine.
//!
//! The current gesture is one owned [`Gesture`] value. [`transition`] maps
//! `(gesture, input)` to the next gesture plus a list of [`Effect`]s; it
//! only reads the store, so every mutation is applied by the caller.

use super::drag;
use super::resize::{HandleKind, apply_resize, keeps_square, resize_rect};
use super::{ToolEvent, ToolKind, ToolSettings};
use crate::anchors;
use crate::config::EngineConfig;
use crate::history::UndoAction;
use crate::hit_test;
use crate::input::{PointerButton, PointerEvent};
use crate::selection::SelectionSet;
use crate::shapes::{
    BoardObject, Connector, Endpoint, MIN_SIZE, ObjectId, Shape, Stroke, StrokeTool,
};
use crate::store::ObjectStore;
use crate::viewport::Viewport;
use kurbo::{Point, Rect, Vec2};

/// Screen distance a pan may wander and still count as a click.
pub const CLICK_SLOP_PX: f64 = 3.0;

/// The gesture in progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Gesture {
    #[default]
    Idle,
    Panning {
        /// Screen position of the press.
        origin: Point,
        /// Last screen position seen.
        last: Point,
        moved: bool,
        world: Point,
    },
    DrawingFreehand {
        tool: StrokeTool,
        points: Vec<Point>,
    },
    Erasing {
        /// Strokes deleted so far in this gesture.
        deleted: Vec<BoardObject>,
    },
    Resizing {
        original: BoardObject,
        original_rect: Rect,
        handle: HandleKind,
        start: Point,
    },
    Dragging {
        grabbed: ObjectId,
        originals: Vec<BoardObject>,
        start: Point,
        moved: bool,
    },
    MarqueeSelecting {
        start: Point,
        current: Point,
    },
    LassoSelecting {
        points: Vec<Point>,
    },
    ConnectorPending {
        source: ObjectId,
        anchor: Endpoint,
        preview: Point,
    },
    ArrowDragging {
        start: Point,
        current: Point,
    },
}

impl Gesture {
    pub fn is_idle(&self) -> bool {
        matches!(self, Gesture::Idle)
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Gesture::Idle => "idle",
            Gesture::Panning { .. } => "panning",
            Gesture::DrawingFreehand { .. } => "drawing-freehand",
            Gesture::Erasing { .. } => "erasing",
            Gesture::Resizing { .. } => "resizing",
            Gesture::Dragging { .. } => "dragging",
            Gesture::MarqueeSelecting { .. } => "marquee-selecting",
            Gesture::LassoSelecting { .. } => "lasso-selecting",
            Gesture::ConnectorPending { .. } => "connector-pending",
            Gesture::ArrowDragging { .. } => "arrow-dragging",
        }
    }

    /// World rectangle of an active marquee.
    pub fn marquee_rect(&self) -> Option<Rect> {
        match self {
            Gesture::MarqueeSelecting { start, current } => Some(Rect::from_points(*start, *current)),
            _ => None,
        }
    }
}

/// Input fed to the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureInput {
    Down { event: PointerEvent, double_click: bool },
    Move(PointerEvent),
    Up(PointerEvent),
    /// Pointer left the canvas.
    Leave,
    Escape,
}

/// How a committed update reaches the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Immediate,
    Debounced,
}

/// Mutations and notifications requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    BeginPan(Point),
    PanTo(Point),
    EndPan(Point),
    /// Local visual update, no history entry and no backing-store write.
    Preview(Vec<BoardObject>),
    /// Final state of a gesture's updates: one undo entry.
    Commit {
        before: Vec<BoardObject>,
        after: Vec<BoardObject>,
        write: WriteMode,
    },
    Create(BoardObject),
    /// Delete now; the undo entry is recorded separately.
    Erase(ObjectId),
    Record(UndoAction),
    Select(Vec<ObjectId>),
    Toggle(ObjectId),
    ClearSelection,
    BeginTextEdit(ObjectId),
    Emit(ToolEvent),
}

/// Read-only view of everything a transition consults.
pub struct Context<'a> {
    pub store: &'a ObjectStore,
    pub viewport: &'a Viewport,
    pub selection: &'a SelectionSet,
    pub tool: ToolKind,
    pub settings: &'a ToolSettings,
    pub config: &'a EngineConfig,
    pub owner: &'a str,
}

impl Context<'_> {
    fn world(&self, screen: Point) -> Point {
        self.viewport.to_world(screen)
    }

    fn world_dist(&self, px: f64) -> f64 {
        self.viewport.screen_dist_to_world(px)
    }

    fn new_object(&self, shape: Shape) -> BoardObject {
        BoardObject::new(self.owner, shape)
    }
}

/// What a press landed on.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Handle(ObjectId, HandleKind),
    Object(ObjectId),
    Background,
}

fn classify(ctx: &Context, world: Point) -> Target {
    let selected = ctx.selection.ids();
    if ctx.tool == ToolKind::Pointer {
        let tolerance = ctx.world_dist(ctx.config.handle_tolerance_px);
        if let Some((id, handle)) = hit_test::hit_test_handle(ctx.store, selected, world, tolerance) {
            return Target::Handle(id, handle);
        }
    }
    let tolerance = ctx.world_dist(ctx.config.hit_tolerance_px);
    match hit_test::hit_test_point(ctx.store, selected, world, tolerance) {
        Some(id) => Target::Object(id),
        None => Target::Background,
    }
}

/// Advance the state machine by one input.
pub fn transition(gesture: Gesture, input: GestureInput, ctx: &Context) -> (Gesture, Vec<Effect>) {
    match input {
        GestureInput::Down { event, double_click } => on_down(gesture, event, double_click, ctx),
        GestureInput::Move(event) => on_move(gesture, event, ctx),
        GestureInput::Up(event) => on_up(gesture, event, ctx),
        GestureInput::Leave => on_leave(gesture),
        GestureInput::Escape => on_escape(gesture),
    }
}

fn on_down(gesture: Gesture, event: PointerEvent, double_click: bool, ctx: &Context) -> (Gesture, Vec<Effect>) {
    let world = ctx.world(event.position);
    match gesture {
        Gesture::Idle => {}
        Gesture::ConnectorPending { source, anchor, .. } => {
            return complete_connector(source, anchor, world, ctx);
        }
        // A second press while a gesture runs (another button or touch) is ignored.
        other => return (other, Vec::new()),
    }

    let primary = event.button == PointerButton::Primary;
    let target = classify(ctx, world);

    // (1) freehand drawing
    if let (Some(tool), true) = (ctx.tool.stroke_tool(), primary) {
        return (Gesture::DrawingFreehand { tool, points: vec![world] }, Vec::new());
    }

    // (2) eraser
    if ctx.tool == ToolKind::Eraser && primary {
        let mut deleted = Vec::new();
        let effects = erase_at(&mut deleted, world, ctx);
        return (Gesture::Erasing { deleted }, effects);
    }

    // (3) marquee from secondary button or shift+primary on background
    if event.button == PointerButton::Secondary {
        if let Target::Object(id) | Target::Handle(id, _) = target {
            return (
                Gesture::Idle,
                vec![Effect::Emit(ToolEvent::ContextMenu { id, screen: event.position })],
            );
        }
        return (Gesture::MarqueeSelecting { start: world, current: world }, Vec::new());
    }
    if primary && event.modifiers.shift && target == Target::Background {
        return (Gesture::MarqueeSelecting { start: world, current: world }, Vec::new());
    }

    // (4) lasso
    if ctx.tool == ToolKind::Lasso && primary && !event.modifiers.shift {
        return (Gesture::LassoSelecting { points: vec![world] }, Vec::new());
    }

    // (5) smart connector, phase 1
    if ctx.tool == ToolKind::SmartConnector && primary {
        if let Target::Object(id) = target {
            if let Some(source) = ctx.store.get(id) {
                if let Some(anchor) = anchors::anchor_endpoint(ctx.store, source, world) {
                    return (Gesture::ConnectorPending { source: id, anchor, preview: world }, Vec::new());
                }
            }
        }
    }

    // (6) free line
    if ctx.tool.is_line_tool() && primary {
        return (Gesture::ArrowDragging { start: world, current: world }, Vec::new());
    }

    if ctx.tool == ToolKind::Pointer && primary {
        match target {
            // (7) drag
            Target::Object(id) => return begin_drag(id, world, event, double_click, ctx),
            // (8) resize
            Target::Handle(id, handle) => {
                if let Some(original) = ctx.store.get(id) {
                    if let Some(rect) = hit_test::object_bounds(ctx.store, original) {
                        return (
                            Gesture::Resizing {
                                original: original.clone(),
                                original_rect: rect,
                                handle,
                                start: world,
                            },
                            Vec::new(),
                        );
                    }
                }
            }
            Target::Background => {}
        }
    }

    // (9) pan, resolved to a click on release if nothing moved
    if primary || event.button == PointerButton::Middle {
        return (
            Gesture::Panning {
                origin: event.position,
                last: event.position,
                moved: false,
                world,
            },
            vec![Effect::BeginPan(event.position)],
        );
    }
    (Gesture::Idle, Vec::new())
}

fn begin_drag(
    id: ObjectId,
    world: Point,
    event: PointerEvent,
    double_click: bool,
    ctx: &Context,
) -> (Gesture, Vec<Effect>) {
    let Some(object) = ctx.store.get(id) else {
        return (Gesture::Idle, Vec::new());
    };

    if double_click && matches!(object.shape, Shape::Sticky(_) | Shape::Text(_)) {
        return (
            Gesture::Idle,
            vec![
                Effect::Select(vec![id]),
                Effect::BeginTextEdit(id),
                Effect::Emit(ToolEvent::TextEditRequested { id: Some(id), world }),
            ],
        );
    }

    let mut effects = Vec::new();
    let mut selection = ctx.selection.clone();
    if event.modifiers.shift {
        effects.push(Effect::Toggle(id));
        if !selection.toggle(id) {
            return (Gesture::Idle, effects);
        }
    } else if !selection.contains(id) {
        effects.push(Effect::Select(vec![id]));
        selection.select(id);
    }

    let originals = drag::drag_set(ctx.store, &selection, id);
    (
        Gesture::Dragging {
            grabbed: id,
            originals,
            start: world,
            moved: false,
        },
        effects,
    )
}

/// Delete the first stroke within the eraser radius, if any.
///
/// Distance is measured to the stroke's segments, not only its sampled
/// points: fast strokes can be sparse, with gaps wider than the radius.
fn erase_at(deleted: &mut Vec<BoardObject>, world: Point, ctx: &Context) -> Vec<Effect> {
    let radius = ctx.world_dist(ctx.config.eraser_radius_px);
    let hit = hit_test::paint_order(ctx.store, ctx.selection.ids())
        .into_iter()
        .rev()
        .filter(|o| !deleted.iter().any(|d| d.id() == o.id()))
        .find(|o| o.shape.as_stroke().is_some_and(|s| s.is_within(world, radius)));
    match hit {
        Some(stroke) => {
            deleted.push(stroke.clone());
            vec![Effect::Erase(stroke.id())]
        }
        None => Vec::new(),
    }
}

fn complete_connector(source: ObjectId, anchor: Endpoint, world: Point, ctx: &Context) -> (Gesture, Vec<Effect>) {
    let target = match classify(ctx, world) {
        Target::Object(id) | Target::Handle(id, _) if id != source => ctx.store.get(id),
        _ => None,
    };
    let end = target.and_then(|t| anchors::anchor_endpoint(ctx.store, t, world));
    match end {
        Some(end) => {
            let connector = Connector::new(anchor, end, ctx.settings.connector_route, true);
            let mut object = ctx.new_object(Shape::Connector(connector));
            object.shape.style_mut().stroke_color = ctx.settings.style.stroke_color;
            (Gesture::Idle, vec![Effect::Create(object)])
        }
        None => {
            log::debug!("Connector cancelled: no target distinct from the source");
            (Gesture::Idle, Vec::new())
        }
    }
}

fn on_move(gesture: Gesture, event: PointerEvent, ctx: &Context) -> (Gesture, Vec<Effect>) {
    let world = ctx.world(event.position);
    match gesture {
        Gesture::Idle => (Gesture::Idle, Vec::new()),
        Gesture::Panning { origin, moved, world: start, .. } => {
            let moved = moved || (event.position - origin).hypot() > CLICK_SLOP_PX;
            (
                Gesture::Panning { origin, last: event.position, moved, world: start },
                vec![Effect::PanTo(event.position)],
            )
        }
        Gesture::DrawingFreehand { tool, mut points } => {
            if points.last() != Some(&world) {
                points.push(world);
            }
            (Gesture::DrawingFreehand { tool, points }, Vec::new())
        }
        Gesture::Erasing { mut deleted } => {
            let effects = erase_at(&mut deleted, world, ctx);
            (Gesture::Erasing { deleted }, effects)
        }
        Gesture::Resizing { original, original_rect, handle, start } => {
            let resized = resized(ctx, &original, original_rect, handle, world - start);
            (
                Gesture::Resizing { original, original_rect, handle, start },
                vec![Effect::Preview(vec![resized])],
            )
        }
        Gesture::Dragging { grabbed, originals, start, moved } => {
            let delta = world - start;
            let moved = moved || delta.hypot2() > 0.0;
            let preview = drag::translate(&originals, delta);
            (
                Gesture::Dragging { grabbed, originals, start, moved },
                vec![Effect::Preview(preview)],
            )
        }
        Gesture::MarqueeSelecting { start, .. } => {
            (Gesture::MarqueeSelecting { start, current: world }, Vec::new())
        }
        Gesture::LassoSelecting { mut points } => {
            points.push(world);
            (Gesture::LassoSelecting { points }, Vec::new())
        }
        Gesture::ConnectorPending { source, anchor, .. } => {
            (Gesture::ConnectorPending { source, anchor, preview: world }, Vec::new())
        }
        Gesture::ArrowDragging { start, .. } => (Gesture::ArrowDragging { start, current: world }, Vec::new()),
    }
}

fn resized(ctx: &Context, original: &BoardObject, rect: Rect, handle: HandleKind, delta: Vec2) -> BoardObject {
    let square = keeps_square(&original.shape);
    let world = resize_rect(rect, handle, delta, MIN_SIZE, square);
    apply_resize(ctx.store, original, world)
}

fn on_up(gesture: Gesture, event: PointerEvent, ctx: &Context) -> (Gesture, Vec<Effect>) {
    let world = ctx.world(event.position);
    let effects = match gesture {
        Gesture::Idle => Vec::new(),
        // Phase 1 survives its own release; the next press completes or cancels it.
        pending @ Gesture::ConnectorPending { .. } => return (pending, Vec::new()),
        Gesture::Panning { moved, world: start, .. } => {
            let mut effects = vec![Effect::EndPan(event.position)];
            if !moved {
                effects.extend(click_background(start, ctx));
            }
            effects
        }
        Gesture::DrawingFreehand { tool, mut points } => {
            if points.last() != Some(&world) {
                points.push(world);
            }
            let mut stroke = Stroke::new(tool, points);
            if tool == StrokeTool::Pen {
                stroke.style.stroke_color = ctx.settings.style.stroke_color;
            }
            vec![Effect::Create(ctx.new_object(Shape::Stroke(stroke)))]
        }
        Gesture::Erasing { deleted } => record_erasures(deleted),
        Gesture::Resizing { original, original_rect, handle, start } => {
            let after = resized(ctx, &original, original_rect, handle, world - start);
            let id = original.id();
            let mut effects = Vec::new();
            if after.shape != original.shape {
                effects.push(Effect::Commit {
                    before: vec![original],
                    after: vec![after],
                    write: WriteMode::Immediate,
                });
            } else {
                // Back where it started: drop whatever the last move previewed.
                effects.push(Effect::Preview(vec![original]));
            }
            effects.push(Effect::Emit(ToolEvent::ObjectResizeEnd { id }));
            effects
        }
        Gesture::Dragging { grabbed, originals, start, moved } => {
            let delta = world - start;
            if !moved && delta.hypot2() == 0.0 {
                vec![Effect::Emit(ToolEvent::ObjectClick { id: grabbed })]
            } else {
                let after = drag::finish(ctx.store, &originals, delta);
                let ids = originals.iter().map(BoardObject::id).collect();
                vec![
                    Effect::Commit {
                        before: originals,
                        after,
                        write: WriteMode::Debounced,
                    },
                    Effect::Emit(ToolEvent::ObjectDragEnd { ids }),
                ]
            }
        }
        Gesture::MarqueeSelecting { start, .. } => {
            let rect = Rect::from_points(start, world);
            let ids = hit_test::marquee_select(ctx.store, rect);
            vec![
                Effect::Select(ids.clone()),
                Effect::Emit(ToolEvent::SelectionBoxEnd { rect, ids }),
            ]
        }
        Gesture::LassoSelecting { mut points } => {
            points.push(world);
            let ids = hit_test::lasso_select(ctx.store, &points);
            vec![Effect::Select(ids.clone()), Effect::Emit(ToolEvent::LassoEnd { ids })]
        }
        Gesture::ArrowDragging { start, .. } => {
            let screen_len = (world - start).hypot() * ctx.viewport.scale;
            if screen_len > ctx.config.min_connector_drag_px {
                let connector = Connector::new(
                    Endpoint::free(start),
                    Endpoint::free(world),
                    ctx.settings.connector_route,
                    ctx.tool == ToolKind::Arrow,
                );
                let mut object = ctx.new_object(Shape::Connector(connector));
                object.shape.style_mut().stroke_color = ctx.settings.style.stroke_color;
                vec![Effect::Create(object)]
            } else {
                log::debug!("Line discarded: drag of {screen_len:.1}px is below the threshold");
                Vec::new()
            }
        }
    };
    (Gesture::Idle, effects)
}

/// A click on empty canvas, resolved per tool.
fn click_background(world: Point, ctx: &Context) -> Vec<Effect> {
    if ctx.tool == ToolKind::Text {
        return vec![Effect::Emit(ToolEvent::TextEditRequested { id: None, world })];
    }
    if let Some(shape) = ctx.tool.placed_shape(world, ctx.settings) {
        let mut object = ctx.new_object(shape);
        crate::frames::adopt_into_frame(ctx.store, &mut object);
        let id = object.id();
        return vec![Effect::Create(object), Effect::Select(vec![id])];
    }
    vec![
        Effect::ClearSelection,
        Effect::Emit(ToolEvent::BackgroundClick { world }),
    ]
}

fn record_erasures(deleted: Vec<BoardObject>) -> Vec<Effect> {
    if deleted.is_empty() {
        return Vec::new();
    }
    let actions = deleted
        .into_iter()
        .map(|object| UndoAction::Delete { object })
        .collect();
    vec![Effect::Record(UndoAction::Compound { actions })]
}

fn on_leave(gesture: Gesture) -> (Gesture, Vec<Effect>) {
    match gesture {
        // Captured at the document level.
        drawing @ Gesture::DrawingFreehand { .. } => (drawing, Vec::new()),
        Gesture::Panning { last, .. } => (Gesture::Idle, vec![Effect::EndPan(last)]),
        other => cancel(other, "pointer left the canvas"),
    }
}

fn on_escape(gesture: Gesture) -> (Gesture, Vec<Effect>) {
    match gesture {
        Gesture::Idle => (Gesture::Idle, vec![Effect::ClearSelection]),
        Gesture::Panning { last, .. } => (Gesture::Idle, vec![Effect::EndPan(last)]),
        other => cancel(other, "escape"),
    }
}

/// Return to idle without leaving a partial mutation behind.
fn cancel(gesture: Gesture, reason: &str) -> (Gesture, Vec<Effect>) {
    log::debug!("Cancelling {} gesture: {reason}", gesture.name());
    let effects = match gesture {
        Gesture::Dragging { originals, moved: true, .. } => vec![Effect::Preview(originals)],
        Gesture::Resizing { original, .. } => vec![Effect::Preview(vec![original])],
        // Erased strokes are already gone; keep them undoable.
        Gesture::Erasing { deleted } => record_erasures(deleted),
        _ => Vec::new(),
    };
    (Gesture::Idle, effects)
}
