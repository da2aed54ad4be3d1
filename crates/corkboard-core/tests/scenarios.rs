//! End-to-end board scenarios driven through the public API.

use corkboard_core::anchors::{anchor_endpoint, connector_endpoints};
use corkboard_core::frames::find_containing_frame;
use corkboard_core::hit_test::{lasso_select, marquee_select, object_bounds};
use corkboard_core::shapes::{Connector, Frame, Placement, Route, Sticky, Stroke, StrokeTool};
use corkboard_core::{
    BoardObject, CanvasEngine, EngineConfig, Instant, MemoryReplica, ObjectId, ObjectStore, PointerEvent, Shape,
    ToolKind, Viewport,
};
use kurbo::{Point, Rect, Size, Vec2};
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn assert_close(a: Point, b: Point) {
    assert!((a - b).hypot() < 1e-9, "{a:?} != {b:?}");
}

fn note(x: f64, y: f64, w: f64, h: f64) -> BoardObject {
    BoardObject::new("tester", Shape::Sticky(Sticky::new(Placement::new(Point::new(x, y), w, h), "")))
}

fn stroke(points: &[(f64, f64)]) -> BoardObject {
    BoardObject::new(
        "tester",
        Shape::Stroke(Stroke::new(
            StrokeTool::Pen,
            points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        )),
    )
}

fn open() -> (CanvasEngine, MemoryReplica) {
    init_logging();
    let replica = MemoryReplica::new();
    let mut engine = CanvasEngine::new("scenario", "tester", EngineConfig::default(), Box::new(replica.clone()))
        .expect("default config is valid");
    engine.set_viewport_size(Size::new(1280.0, 720.0));
    (engine, replica)
}

/// Create `object` through the engine so it is undoable like any other edit.
fn seed(engine: &mut CanvasEngine, object: BoardObject) -> ObjectId {
    let mut producer = Seed(Some(object.shape));
    let created = engine.apply_template(&mut producer, "seed").expect("seed applies");
    assert_eq!(created.len(), 1);
    created[0]
}

struct Seed(Option<Shape>);

impl corkboard_core::engine::TemplateProducer for Seed {
    fn produce(&mut self, _key: &str) -> Result<Vec<corkboard_core::engine::Instruction>, corkboard_core::engine::ProducerError> {
        Ok(self
            .0
            .take()
            .map(corkboard_core::engine::Instruction::Create)
            .into_iter()
            .collect())
    }
}

fn position(engine: &CanvasEngine, id: ObjectId) -> Point {
    engine
        .store()
        .get(id)
        .and_then(|o| o.shape.placement())
        .map(|p| p.position)
        .expect("placed object")
}

#[test]
fn screen_world_round_trip() {
    let mut viewport = Viewport::new();
    viewport.pan(Vec2::new(-137.5, 42.0));
    viewport.zoom_at(Point::new(300.0, 200.0), 2.7);
    viewport.zoom_at(Point::new(10.0, 700.0), 0.4);

    for p in [Point::ZERO, Point::new(-512.25, 99.0), Point::new(1e4, -3e3)] {
        assert_close(viewport.to_screen(viewport.to_world(p)), p);
        assert_close(viewport.to_world(viewport.to_screen(p)), p);
    }
}

#[test]
fn zoom_keeps_anchor_fixed() {
    let mut viewport = Viewport::new();
    viewport.pan(Vec2::new(80.0, -20.0));
    let anchor = Point::new(412.0, 233.0);
    let before = viewport.to_world(anchor);
    viewport.zoom_at(anchor, 1.75);
    assert_close(viewport.to_world(anchor), before);
    viewport.zoom_at(anchor, 0.3);
    assert_close(viewport.to_world(anchor), before);
}

#[test]
fn zoom_clamps_to_configured_bounds() {
    let config = EngineConfig::default();
    let mut viewport = Viewport::with_bounds(config.min_scale, config.max_scale);
    viewport.zoom_at(Point::new(50.0, 50.0), 1e6);
    assert_eq!(viewport.scale, config.max_scale);
    viewport.zoom_at(Point::new(50.0, 50.0), 1e-9);
    assert_eq!(viewport.scale, config.min_scale);
}

#[test]
fn wheel_zoom_applies_on_tick() {
    let (mut engine, _replica) = open();
    let anchor = Point::new(640.0, 360.0);
    let world = engine.viewport().to_world(anchor);
    let now = Instant::now();
    engine.wheel(anchor, -120.0, now);
    engine.wheel(anchor, -120.0, now);
    assert_eq!(engine.viewport().scale, 1.0);

    assert!(engine.tick(now + Duration::from_millis(16)));
    assert!(engine.viewport().scale > 1.0);
    assert_close(engine.viewport().to_world(anchor), world);
}

#[test]
fn marquee_selects_overlapping_objects_only() {
    let mut store = ObjectStore::new();
    let inside = note(10.0, 10.0, 50.0, 50.0);
    let straddling = note(90.0, 90.0, 50.0, 50.0);
    let outside = note(300.0, 300.0, 50.0, 50.0);
    let touching = note(100.0, 0.0, 50.0, 50.0);
    let ids = [inside.id(), straddling.id(), outside.id(), touching.id()];
    for object in [inside, straddling, outside, touching] {
        store.put(object);
    }

    // Dragged from bottom-right to top-left.
    let mut selected = marquee_select(&store, Rect::new(100.0, 100.0, 0.0, 0.0));
    selected.sort();
    let mut expected = vec![ids[0], ids[1]];
    expected.sort();
    assert_eq!(selected, expected);
}

#[test]
fn containment_picks_smallest_frame_deterministically() {
    let mut store = ObjectStore::new();
    let outer = BoardObject::new("t", Shape::Frame(Frame::new(Point::ZERO, 1000.0, 1000.0, "outer")));
    let inner = BoardObject::new("t", Shape::Frame(Frame::new(Point::new(100.0, 100.0), 300.0, 300.0, "inner")));
    let inner_id = inner.id();
    let outer_id = outer.id();
    store.put(outer);
    store.put(inner);

    let bbox = Rect::new(150.0, 150.0, 250.0, 250.0);
    for _ in 0..10 {
        assert_eq!(find_containing_frame(bbox, store.frames()), Some(inner_id));
    }
    assert_eq!(
        find_containing_frame(Rect::new(50.0, 50.0, 150.0, 150.0), store.frames()),
        Some(outer_id)
    );
    assert_eq!(find_containing_frame(Rect::new(-1.0, 0.0, 10.0, 10.0), store.frames()), None);
}

#[test]
fn dragging_a_multi_selection_keeps_relative_offsets() {
    let (mut engine, _replica) = open();
    let a = seed(&mut engine, note(0.0, 0.0, 100.0, 100.0));
    let b = seed(&mut engine, note(300.0, 40.0, 100.0, 100.0));
    let c = seed(&mut engine, note(120.0, 400.0, 80.0, 80.0));
    let offsets = [position(&engine, b) - position(&engine, a), position(&engine, c) - position(&engine, a)];

    let now = Instant::now();
    engine.pointer_down(PointerEvent::primary(Point::new(50.0, 50.0)), now);
    engine.pointer_up(PointerEvent::primary(Point::new(50.0, 50.0)), now);
    let shift = corkboard_core::Modifiers::SHIFT;
    for point in [Point::new(350.0, 90.0), Point::new(160.0, 440.0)] {
        let event = PointerEvent::primary(point).with_modifiers(shift);
        engine.pointer_down(event, now);
        engine.pointer_up(event, now);
    }
    assert_eq!(engine.selection().len(), 3);

    let later = now + Duration::from_secs(1);
    engine.pointer_down(PointerEvent::primary(Point::new(50.0, 50.0)), later);
    engine.pointer_move(PointerEvent::primary(Point::new(90.0, 10.0)), later);
    engine.pointer_move(PointerEvent::primary(Point::new(123.0, -77.0)), later);
    engine.pointer_up(PointerEvent::primary(Point::new(123.0, -77.0)), later);

    assert_close(position(&engine, a), Point::new(73.0, -127.0));
    assert_close(position(&engine, a) + offsets[0], position(&engine, b));
    assert_close(position(&engine, a) + offsets[1], position(&engine, c));
}

#[test]
fn undo_everything_restores_the_initial_board() {
    let (mut engine, replica) = open();
    let frame = seed(
        &mut engine,
        BoardObject::new("t", Shape::Frame(Frame::new(Point::ZERO, 600.0, 600.0, "plan"))),
    );
    let initial: Vec<BoardObject> = strip_stamps(engine.store().snapshot());
    let baseline = engine.history().undo_len();

    let now = Instant::now();
    engine.set_tool(ToolKind::Sticky, now);
    engine.pointer_down(PointerEvent::primary(Point::new(200.0, 200.0)), now);
    engine.pointer_up(PointerEvent::primary(Point::new(200.0, 200.0)), now);
    engine.set_tool(ToolKind::Pen, now);
    engine.pointer_down(PointerEvent::primary(Point::new(700.0, 700.0)), now);
    engine.pointer_move(PointerEvent::primary(Point::new(760.0, 720.0)), now);
    engine.pointer_up(PointerEvent::primary(Point::new(760.0, 720.0)), now);
    engine.set_tool(ToolKind::Pointer, now);
    engine.select_all();
    engine.update_style(|style| style.stroke_width = 7.0).expect("style applies");
    engine.add_comment(Point::new(5.0, 5.0), "why here?");
    engine.delete_frame(frame, false).expect("frame exists");
    assert!(!engine.store().contains(frame));

    while engine.history().undo_len() > baseline {
        assert!(engine.undo());
    }
    assert_eq!(strip_stamps(engine.store().snapshot()), initial);
    assert_eq!(engine.store().comments().count(), 0);

    engine.flush_writes();
    assert_eq!(replica.len(), initial.len());
}

fn strip_stamps(mut objects: Vec<BoardObject>) -> Vec<BoardObject> {
    for object in &mut objects {
        object.meta.updated_at = 0;
    }
    objects.sort_by_key(BoardObject::id);
    objects
}

#[test]
fn lasso_selects_strokes_inside_polygon() {
    let mut store = ObjectStore::new();
    let near = stroke(&[(40.0, 30.0), (60.0, 50.0)]);
    let far = stroke(&[(190.0, 190.0), (210.0, 210.0)]);
    let sticky = note(45.0, 35.0, 10.0, 10.0);
    let near_id = near.id();
    for object in [near, far, sticky] {
        store.put(object);
    }

    let polygon = [Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(50.0, 100.0)];
    assert_eq!(lasso_select(&store, &polygon), vec![near_id]);
}

#[test]
fn connector_follows_moved_and_resized_targets() {
    let mut store = ObjectStore::new();
    let a = note(0.0, 0.0, 100.0, 100.0);
    let b = note(300.0, 0.0, 100.0, 100.0);
    let (a_id, b_id) = (a.id(), b.id());
    store.put(a);
    store.put(b);

    let start = anchor_endpoint(&store, store.get(a_id).expect("a"), Point::new(99.0, 50.0)).expect("anchorable");
    let end = anchor_endpoint(&store, store.get(b_id).expect("b"), Point::new(301.0, 50.0)).expect("anchorable");
    let connector = Connector::new(start, end, Route::Straight, true);
    assert_eq!(
        connector_endpoints(&store, &connector),
        (Point::new(100.0, 50.0), Point::new(300.0, 50.0))
    );

    let mut moved = store.get(a_id).cloned().expect("a");
    moved.shape.translate(Vec2::new(30.0, 0.0));
    store.put(moved);
    let mut taller = store.get(b_id).cloned().expect("b");
    if let Some(placement) = taller.shape.placement_mut() {
        placement.height = 200.0;
    }
    store.put(taller);

    assert_eq!(
        connector_endpoints(&store, &connector),
        (Point::new(130.0, 50.0), Point::new(300.0, 100.0))
    );
}

#[test]
fn eraser_deletes_strokes_within_radius() {
    let (mut engine, replica) = open();
    let id = seed(&mut engine, stroke(&[(0.0, 0.0), (100.0, 0.0)]));
    let now = Instant::now();
    engine.set_tool(ToolKind::Eraser, now);

    engine.pointer_down(PointerEvent::primary(Point::new(50.0, 80.0)), now);
    engine.pointer_move(PointerEvent::primary(Point::new(50.0, 50.0)), now);
    assert!(engine.store().contains(id));
    engine.pointer_move(PointerEvent::primary(Point::new(50.0, 3.0)), now);
    assert!(!engine.store().contains(id));
    assert!(replica.object(id).is_none());
    engine.pointer_up(PointerEvent::primary(Point::new(50.0, 3.0)), now);

    assert!(engine.undo());
    assert!(engine.store().contains(id));
}

#[test]
fn smart_connector_survives_target_move() {
    let (mut engine, _replica) = open();
    let a = seed(&mut engine, note(0.0, 0.0, 100.0, 100.0));
    let b = seed(&mut engine, note(300.0, 0.0, 100.0, 100.0));
    let now = Instant::now();
    engine.set_tool(ToolKind::SmartConnector, now);
    for x in [97.0, 303.0] {
        engine.pointer_down(PointerEvent::primary(Point::new(x, 50.0)), now);
        engine.pointer_up(PointerEvent::primary(Point::new(x, 50.0)), now);
    }
    let connector = engine
        .store()
        .iter()
        .find_map(|o| o.shape.as_connector().cloned())
        .expect("connector created");
    assert!(connector.touches(a) && connector.touches(b));

    engine.set_tool(ToolKind::Pointer, now);
    let later = now + Duration::from_secs(1);
    engine.pointer_down(PointerEvent::primary(Point::new(350.0, 50.0)), later);
    engine.pointer_move(PointerEvent::primary(Point::new(350.0, 250.0)), later);
    engine.pointer_up(PointerEvent::primary(Point::new(350.0, 250.0)), later);

    let bounds = object_bounds(engine.store(), engine.store().get(b).expect("b")).expect("bounds");
    assert_eq!(bounds.origin(), Point::new(300.0, 200.0));
    let (start, end) = connector_endpoints(engine.store(), &connector);
    assert_eq!(start, Point::new(100.0, 50.0));
    assert_eq!(end, Point::new(300.0, 250.0));
}

#[test]
fn remote_deletion_prunes_selection() {
    let (mut engine, replica) = open();
    let mut other = CanvasEngine::new("scenario", "bob", EngineConfig::default(), Box::new(replica.clone()))
        .expect("valid config");
    let id = seed(&mut engine, note(0.0, 0.0, 100.0, 100.0));
    let now = Instant::now();
    replica.publish();
    engine.tick(now);
    other.tick(now);
    assert!(!engine.store().is_pending(id));
    assert!(other.store().contains(id));

    engine.select_all();
    other.select_all();
    other.delete_selected().expect("selection not empty");
    replica.publish();

    engine.tick(now);
    assert!(!engine.store().contains(id));
    assert!(engine.selection().is_empty());
}
