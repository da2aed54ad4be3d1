//! The canvas engine.
//!
//! [`CanvasEngine`] owns the store, viewport, selection and history of one
//! document, feeds input through the gesture state machine and applies the
//! resulting effects. Every mutation is applied locally first and mirrored
//! to the [`ReplicationAdapter`] without waiting for it.

use crate::Instant;
use crate::anchors;
use crate::config::{ConfigError, EngineConfig};
use crate::frames::{adopt_into_frame, children_of, collect_frame_contents, promote_children, set_parent};
use crate::history::{FieldChange, History, UndoAction};
use crate::hit_test::union_bounds;
use crate::input::{ClickTracker, Key, Modifiers, PointerButton, PointerEvent};
use crate::patch::{ObjectPatch, PatchError};
use crate::presence::{CursorBroadcaster, CursorPosition};
use crate::raster::{DEFAULT_MAX_SIDE, RasterError, estimate_font_size, rasterize_strokes};
use crate::render::{RenderContext, RenderPlan, render_plan};
use crate::replication::{PositionUpdate, RemoteWrite, ReplicationAdapter, WriteDebouncer, dispatch};
use crate::selection::SelectionSet;
use crate::shapes::{
    BoardObject, Comment, Embed, Endpoint, MediaKind, ObjectId, ObjectMeta, Placement, Shape, ShapeStyle,
    Text,
};
use crate::store::{MergeSummary, ObjectStore};
use crate::tools::gesture::{Context, Effect, Gesture, GestureInput, WriteMode, transition};
use crate::tools::{ToolEvent, ToolKind, ToolSettings};
use crate::viewport::{Viewport, ViewportController};
use kurbo::{BezPath, Point, Rect, Size, Vec2};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{Receiver, channel};
use thiserror::Error;

/// Padding around content for [`CanvasEngine::fit_to_content`], in pixels.
const FIT_PADDING_PX: f64 = 50.0;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} is already in progress")]
    Busy(&'static str),
    #[error("Nothing suitable is selected")]
    NothingSelected,
    #[error("Object {0} not found")]
    NotFound(ObjectId),
    #[error("Object {id} is not a {expected}")]
    WrongKind { id: ObjectId, expected: &'static str },
    #[error("Template producer failed: {0}")]
    Producer(String),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// Output for the host, drained with [`CanvasEngine::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Tool(ToolEvent),
    /// Throttled world cursor to broadcast to other participants.
    Cursor(CursorPosition),
    /// Transient user-facing message.
    Notification(String),
}

/// A mutation requested by a template or AI producer.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Create an object. Nestable shapes use world positions and are nested
    /// into the smallest containing frame.
    Create(Shape),
    Update { id: ObjectId, patch: ObjectPatch },
    Delete(ObjectId),
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProducerError(pub String);

/// Source of generated content for a prompt or template key.
pub trait TemplateProducer {
    fn produce(&mut self, key: &str) -> Result<Vec<Instruction>, ProducerError>;
}

/// Input for the handwriting recognition service.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub strokes: Vec<ObjectId>,
    /// World bounds of the strokes.
    pub bounds: Rect,
    /// Grayscale PNG of the strokes.
    pub png: Vec<u8>,
}

/// Identifies one upload started with [`CanvasEngine::begin_upload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadTicket(u64);

/// A finished media upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    pub url: String,
    pub media: MediaKind,
    /// Natural size, if known.
    pub size: Option<Size>,
}

pub struct CanvasEngine {
    doc_id: String,
    owner: String,
    config: EngineConfig,
    store: ObjectStore,
    view: ViewportController,
    viewport_size: Size,
    selection: SelectionSet,
    history: History,
    tool: ToolKind,
    settings: ToolSettings,
    gesture: Gesture,
    adapter: Box<dyn ReplicationAdapter>,
    inbox: Receiver<Vec<BoardObject>>,
    debouncer: WriteDebouncer,
    cursor: CursorBroadcaster,
    clicks: ClickTracker,
    clipboard: Vec<BoardObject>,
    /// Strokes sent for recognition; doubles as the busy flag.
    handwriting: Option<Vec<ObjectId>>,
    /// Upload in flight and its drop point; doubles as the busy flag.
    upload: Option<(UploadTicket, Point)>,
    next_ticket: u64,
    events: Vec<EngineEvent>,
}

impl CanvasEngine {
    /// Open `doc_id` for `owner` and subscribe to remote snapshots.
    pub fn new(
        doc_id: impl Into<String>,
        owner: impl Into<String>,
        config: EngineConfig,
        mut adapter: Box<dyn ReplicationAdapter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let doc_id = doc_id.into();
        let (tx, inbox) = channel();
        adapter.subscribe(
            &doc_id,
            Box::new(move |objects| {
                // The engine may already be gone; nothing to deliver to then.
                let _ = tx.send(objects);
            }),
        );
        log::info!("Opened board {doc_id}");

        Ok(Self {
            doc_id,
            owner: owner.into(),
            store: ObjectStore::new(),
            view: ViewportController::new(Viewport::with_bounds(config.min_scale, config.max_scale)),
            viewport_size: Size::new(800.0, 600.0),
            selection: SelectionSet::new(),
            history: History::new(config.history_limit),
            tool: ToolKind::default(),
            settings: ToolSettings::default(),
            gesture: Gesture::Idle,
            adapter,
            inbox,
            debouncer: WriteDebouncer::new(config.drag_write_debounce()),
            cursor: CursorBroadcaster::new(config.cursor_interval()),
            clicks: ClickTracker::default(),
            clipboard: Vec::new(),
            handwriting: None,
            upload: None,
            next_ticket: 0,
            events: Vec::new(),
            config,
        })
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn viewport(&self) -> &Viewport {
        &self.view.viewport
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Mutable history, for persistence.
    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    /// Replace the history, e.g. with one restored from storage.
    pub fn set_history(&mut self, history: History) {
        self.history = history;
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    /// Switch tools, cancelling any gesture in progress.
    pub fn set_tool(&mut self, tool: ToolKind, now: Instant) {
        if !self.gesture.is_idle() {
            self.run(GestureInput::Escape, now);
        }
        self.tool = tool;
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ToolSettings {
        &mut self.settings
    }

    pub fn set_viewport_size(&mut self, size: Size) {
        self.viewport_size = size;
    }

    pub fn is_zooming(&self, now: Instant) -> bool {
        self.view.is_zooming(now, self.config.zoom_quiet())
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.events.push(EngineEvent::Notification(message.into()));
    }

    // Input

    pub fn pointer_down(&mut self, event: PointerEvent, now: Instant) {
        let double_click = event.button == PointerButton::Primary
            && self.clicks.register(event.position, now);
        self.run(GestureInput::Down { event, double_click }, now);
    }

    pub fn pointer_move(&mut self, event: PointerEvent, now: Instant) {
        self.run(GestureInput::Move(event), now);
        let world = self.view.viewport.to_world(event.position);
        let suppressed = self.is_zooming(now) || self.selection.is_editing_text();
        if let Some(position) = self.cursor.offer(world, now, suppressed) {
            self.events.push(EngineEvent::Cursor(position));
        }
    }

    pub fn pointer_up(&mut self, event: PointerEvent, now: Instant) {
        self.run(GestureInput::Up(event), now);
    }

    pub fn pointer_leave(&mut self, now: Instant) {
        self.run(GestureInput::Leave, now);
    }

    /// Queue a wheel zoom about `anchor` (screen). Applied on the next tick.
    pub fn wheel(&mut self, anchor: Point, delta_y: f64, now: Instant) {
        self.view
            .on_wheel(anchor, delta_y, self.config.wheel_zoom_sensitivity, now);
    }

    /// Handle a key press. Returns true if the engine consumed it.
    pub fn key(&mut self, key: Key, modifiers: Modifiers, now: Instant) -> bool {
        if self.selection.is_editing_text() {
            // The host's text editor owns the keyboard, except for leaving it.
            if key == Key::Escape {
                self.selection.end_editing();
                return true;
            }
            return false;
        }
        match key {
            Key::Escape => {
                self.run(GestureInput::Escape, now);
                true
            }
            Key::Delete | Key::Backspace => self.gesture.is_idle() && self.delete_selected().is_ok(),
            Key::Character(c) if modifiers.command() => match c.to_ascii_lowercase() {
                'z' if modifiers.shift => self.redo(),
                'z' => self.undo(),
                'y' => self.redo(),
                'a' => {
                    self.select_all();
                    true
                }
                'c' => self.copy_selection() > 0,
                'v' => !self.paste().is_empty(),
                'd' => !self.duplicate_selected().is_empty(),
                _ => false,
            },
            Key::Character(_) => false,
        }
    }

    /// Per-frame work: apply coalesced viewport input, merge remote
    /// snapshots, send due writes and held cursor updates. Returns true if
    /// the host should redraw.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = self.view.on_frame();

        while let Ok(snapshot) = self.inbox.try_recv() {
            let summary = self.merge_remote(snapshot);
            changed |= summary.applied > 0 || !summary.removed.is_empty();
        }

        let due = self.debouncer.flush_due(now);
        if !due.is_empty() {
            dispatch(self.adapter.as_mut(), due.into_iter().map(RemoteWrite::Update).collect());
        }

        let suppressed = self.is_zooming(now) || self.selection.is_editing_text();
        if let Some(position) = self.cursor.flush(now, suppressed) {
            self.events.push(EngineEvent::Cursor(position));
        }
        changed
    }

    /// Merge a remote snapshot now, without waiting for the next tick.
    pub fn merge_remote(&mut self, snapshot: Vec<BoardObject>) -> MergeSummary {
        let summary = self.store.merge_remote(snapshot);
        if !summary.removed.is_empty() {
            let store = &self.store;
            let dropped = self.selection.prune(|id| store.contains(id));
            if !dropped.is_empty() {
                log::debug!("Dropped {} remotely deleted ids from the selection", dropped.len());
            }
        }
        summary
    }

    /// Send every pending debounced write immediately.
    pub fn flush_writes(&mut self) {
        let pending = self.debouncer.flush_all();
        if !pending.is_empty() {
            dispatch(
                self.adapter.as_mut(),
                pending.into_iter().map(RemoteWrite::Update).collect(),
            );
        }
    }

    /// Dispatch immediate writes after any debounced ones, so an older
    /// debounced patch never lands after a newer write.
    fn send(&mut self, writes: Vec<RemoteWrite>) {
        self.flush_writes();
        dispatch(self.adapter.as_mut(), writes);
    }

    fn run(&mut self, input: GestureInput, now: Instant) {
        let gesture = std::mem::take(&mut self.gesture);
        let (next, effects) = {
            let ctx = Context {
                store: &self.store,
                viewport: &self.view.viewport,
                selection: &self.selection,
                tool: self.tool,
                settings: &self.settings,
                config: &self.config,
                owner: &self.owner,
            };
            transition(gesture, input, &ctx)
        };
        self.gesture = next;
        for effect in effects {
            self.apply_effect(effect, now);
        }
    }

    fn apply_effect(&mut self, effect: Effect, now: Instant) {
        match effect {
            Effect::BeginPan(screen) => self.view.begin_pan(screen),
            Effect::PanTo(screen) => self.view.update_pan(screen),
            Effect::EndPan(screen) => self.view.end_pan(screen),
            Effect::Preview(objects) => {
                // A remote delete mid-gesture wins over the preview.
                for object in objects {
                    if self.store.contains(object.id()) {
                        self.store.put(object);
                    }
                }
            }
            Effect::Commit { before, after, write } => self.commit_updates(&before, after, write, now),
            Effect::Create(object) => {
                self.perform(UndoAction::Create { object });
            }
            Effect::Erase(id) => {
                self.debouncer.discard(id);
                if self.store.remove(id).is_some() {
                    self.selection.remove(id);
                    self.send(vec![RemoteWrite::Delete(id)]);
                }
            }
            Effect::Record(action) => self.history.push(action),
            Effect::Select(ids) => self.selection.select_many(ids),
            Effect::Toggle(id) => {
                self.selection.toggle(id);
            }
            Effect::ClearSelection => {
                self.selection.clear();
                self.selection.end_editing();
            }
            Effect::BeginTextEdit(id) => self.selection.begin_editing(id),
            Effect::Emit(event) => self.events.push(EngineEvent::Tool(event)),
        }
    }

    /// Store the final versions of a gesture's objects, write them out and
    /// record one undo entry.
    fn commit_updates(&mut self, before: &[BoardObject], after: Vec<BoardObject>, mode: WriteMode, now: Instant) {
        let after: Vec<BoardObject> = after
            .into_iter()
            .filter(|o| self.store.contains(o.id()))
            .collect();
        let action = match UndoAction::from_changes(before, &after) {
            Ok(action) => action,
            Err(e) => {
                log::warn!("Could not diff committed objects: {e}");
                None
            }
        };
        for object in after {
            self.store.put(object);
        }
        let Some(action) = action else {
            return;
        };

        let changes: Vec<&FieldChange> = match &action {
            UndoAction::Update { change } => vec![change],
            UndoAction::BatchUpdate { changes } => changes.iter().collect(),
            _ => Vec::new(),
        };
        let updates: Vec<PositionUpdate> = changes
            .into_iter()
            .filter_map(|change| {
                let stored = self.store.get(change.id)?;
                Some(PositionUpdate {
                    id: change.id,
                    patch: change.after.clone(),
                    updated_at: stored.meta.updated_at,
                })
            })
            .collect();
        match mode {
            WriteMode::Debounced => {
                for update in updates {
                    self.debouncer.push(update, now);
                }
            }
            WriteMode::Immediate => self.send(updates.into_iter().map(RemoteWrite::Update).collect()),
        }
        self.history.push(action);
    }

    /// Apply a new action and record it.
    fn perform(&mut self, action: UndoAction) -> bool {
        self.flush_writes();
        match action.apply(&mut self.store, self.adapter.as_mut()) {
            Ok(()) => {
                self.history.push(action);
                true
            }
            Err(e) => {
                log::warn!("Edit could not be applied: {e}");
                false
            }
        }
    }

    /// Update `before` objects to `after` immediately with one undo entry.
    fn perform_updates(&mut self, before: &[BoardObject], after: &[BoardObject]) -> Result<(), EngineError> {
        if let Some(action) = UndoAction::from_changes(before, after)? {
            self.perform(action);
        }
        Ok(())
    }

    fn prune_selection(&mut self) {
        let store = &self.store;
        self.selection.prune(|id| store.contains(id));
    }

    // Commands

    pub fn undo(&mut self) -> bool {
        if !self.gesture.is_idle() {
            return false;
        }
        self.flush_writes();
        let undone = self.history.undo(&mut self.store, self.adapter.as_mut()).is_some();
        self.prune_selection();
        undone
    }

    pub fn redo(&mut self) -> bool {
        if !self.gesture.is_idle() {
            return false;
        }
        self.flush_writes();
        let redone = self.history.redo(&mut self.store, self.adapter.as_mut()).is_some();
        self.prune_selection();
        redone
    }

    pub fn select_all(&mut self) {
        self.selection.select_many(self.store.ids());
    }

    /// Delete the selection. Selected frames release their children to the
    /// top level unless those are selected too.
    pub fn delete_selected(&mut self) -> Result<(), EngineError> {
        let ids = self.selection.sorted_ids();
        if ids.is_empty() {
            return Err(EngineError::NothingSelected);
        }
        let selected: HashSet<ObjectId> = ids.iter().copied().collect();
        let mut promotions = Vec::new();
        let mut deletions = Vec::new();
        for id in &ids {
            let Some(object) = self.store.get(*id) else {
                continue;
            };
            if object.is_frame() {
                for promoted in promote_children(&self.store, *id) {
                    if selected.contains(&promoted.id()) {
                        continue;
                    }
                    if let Some(child) = self.store.get(promoted.id()) {
                        if let Some(change) = FieldChange::between(child, &promoted)? {
                            promotions.push(change);
                        }
                    }
                }
            }
            deletions.push(UndoAction::Delete { object: object.clone() });
        }

        let mut actions = Vec::new();
        if !promotions.is_empty() {
            actions.push(UndoAction::BatchUpdate { changes: promotions });
        }
        actions.extend(deletions);
        self.delete_with(actions, &selected);
        Ok(())
    }

    /// Delete a frame. With `with_contents` its transitive children and the
    /// connectors touching them go too; otherwise children are promoted.
    pub fn delete_frame(&mut self, id: ObjectId, with_contents: bool) -> Result<(), EngineError> {
        let frame = self.store.get(id).ok_or(EngineError::NotFound(id))?;
        if !frame.is_frame() {
            return Err(EngineError::WrongKind { id, expected: "frame" });
        }
        let frame = frame.clone();
        if with_contents {
            let contents = collect_frame_contents(&self.store, id);
            let mut removed: HashSet<ObjectId> = contents.children.iter().map(BoardObject::id).collect();
            removed.extend(contents.connectors.iter().map(BoardObject::id));
            removed.insert(id);
            self.delete_with(vec![UndoAction::delete_frame(frame, contents)], &removed);
            return Ok(());
        }

        let mut changes = Vec::new();
        for promoted in promote_children(&self.store, id) {
            if let Some(child) = self.store.get(promoted.id()) {
                if let Some(change) = FieldChange::between(child, &promoted)? {
                    changes.push(change);
                }
            }
        }
        let mut actions = Vec::new();
        if !changes.is_empty() {
            actions.push(UndoAction::BatchUpdate { changes });
        }
        actions.push(UndoAction::Delete { object: frame });
        self.delete_with(actions, &HashSet::from([id]));
        Ok(())
    }

    fn delete_with(&mut self, mut actions: Vec<UndoAction>, removed: &HashSet<ObjectId>) {
        self.refresh_orphan_fallbacks(removed);
        for id in removed {
            self.debouncer.discard(*id);
        }
        let action = if actions.len() == 1 {
            actions.remove(0)
        } else {
            UndoAction::Compound { actions }
        };
        self.perform(action);
        self.prune_selection();
    }

    /// Connectors left behind by a deletion keep their anchors but get
    /// current fallback points, so they stay where they were drawn.
    fn refresh_orphan_fallbacks(&mut self, removed: &HashSet<ObjectId>) {
        let refreshed: Vec<BoardObject> = self
            .store
            .iter()
            .filter(|o| !removed.contains(&o.id()))
            .filter_map(|o| {
                let connector = o.shape.as_connector()?;
                if !removed.iter().any(|id| connector.touches(*id)) {
                    return None;
                }
                let mut updated = o.clone();
                if let Shape::Connector(c) = &mut updated.shape {
                    anchors::refresh_fallbacks(&self.store, c);
                }
                (updated != *o).then_some(updated)
            })
            .collect();
        let mut writes = Vec::new();
        for object in refreshed {
            let Some(before) = self.store.get(object.id()).cloned() else {
                continue;
            };
            let patch = match ObjectPatch::diff(&before, &object) {
                Ok(patch) => patch,
                Err(e) => {
                    log::warn!("Could not diff connector {}: {e}", object.id());
                    continue;
                }
            };
            let stored = self.store.put(object);
            writes.push(RemoteWrite::Update(PositionUpdate {
                id: stored.id(),
                patch,
                updated_at: stored.meta.updated_at,
            }));
        }
        if !writes.is_empty() {
            self.send(writes);
        }
    }

    /// Raise the selection above everything else, keeping its relative order.
    pub fn bring_to_front(&mut self) -> Result<(), EngineError> {
        let top = self
            .store
            .iter()
            .map(|o| o.meta.order_key())
            .fold(f64::MIN, f64::max);
        self.reorder_selection(|rank| top + 1.0 + rank)
    }

    /// Lower the selection below everything else, keeping its relative order.
    pub fn send_to_back(&mut self) -> Result<(), EngineError> {
        let bottom = self
            .store
            .iter()
            .map(|o| o.meta.order_key())
            .fold(f64::MAX, f64::min);
        let count = self.selection.len() as f64;
        self.reorder_selection(|rank| bottom - count + rank)
    }

    fn reorder_selection(&mut self, key: impl Fn(f64) -> f64) -> Result<(), EngineError> {
        let mut before: Vec<BoardObject> = self
            .selection
            .ids()
            .iter()
            .filter_map(|id| self.store.get(*id).cloned())
            .collect();
        if before.is_empty() {
            return Err(EngineError::NothingSelected);
        }
        before.sort_by(|a, b| a.meta.order_key().total_cmp(&b.meta.order_key()));
        let after: Vec<BoardObject> = before
            .iter()
            .enumerate()
            .map(|(rank, object)| {
                let mut moved = object.clone();
                moved.meta.display_order = Some(key(rank as f64));
                moved
            })
            .collect();
        self.perform_updates(&before, &after)
    }

    /// Copy the selection, plus the contents of selected frames, to the
    /// engine clipboard. Returns the number of objects copied.
    pub fn copy_selection(&mut self) -> usize {
        self.clipboard = self.collect_for_copy();
        self.clipboard.len()
    }

    fn collect_for_copy(&self) -> Vec<BoardObject> {
        let mut ids: Vec<ObjectId> = self.selection.sorted_ids();
        let mut seen: HashSet<ObjectId> = ids.iter().copied().collect();
        let mut i = 0;
        while i < ids.len() {
            for child in children_of(&self.store, ids[i]) {
                if seen.insert(child) {
                    ids.push(child);
                }
            }
            i += 1;
        }
        let copied: HashSet<ObjectId> = ids.iter().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.store.get(id))
            .map(|object| {
                let mut copy = object.clone();
                // Objects copied without their frame are carried in world space.
                let parent_copied = object.shape.parent_id().is_some_and(|p| copied.contains(&p));
                if object.shape.is_nestable() && !parent_copied {
                    if let Some(world) = self.store.world_rect(object) {
                        set_parent(&self.store, &mut copy, None, world.origin());
                    }
                }
                copy
            })
            .collect()
    }

    /// Paste the clipboard, offset from the originals. Returns the new ids,
    /// which become the selection.
    pub fn paste(&mut self) -> Vec<ObjectId> {
        if self.clipboard.is_empty() {
            return Vec::new();
        }
        let offset = Vec2::new(self.config.paste_offset, self.config.paste_offset);
        // Repeated pastes cascade.
        for object in &mut self.clipboard {
            if object.shape.parent_id().is_none() {
                object.shape.translate(offset);
            }
        }
        let clipboard = self.clipboard.clone();
        self.insert_copies(&clipboard)
    }

    pub fn duplicate_selected(&mut self) -> Vec<ObjectId> {
        let offset = Vec2::new(self.config.paste_offset, self.config.paste_offset);
        let mut copies = self.collect_for_copy();
        for object in &mut copies {
            if object.shape.parent_id().is_none() {
                object.shape.translate(offset);
            }
        }
        self.insert_copies(&copies)
    }

    /// Create fresh copies of `objects`, remapping parents and anchors that
    /// point inside the set.
    fn insert_copies(&mut self, objects: &[BoardObject]) -> Vec<ObjectId> {
        let ids: HashMap<ObjectId, ObjectId> = objects
            .iter()
            .map(|o| (o.id(), uuid::Uuid::new_v4()))
            .collect();
        let mut created = Vec::new();
        for object in objects {
            let mut copy = object.clone();
            copy.meta = ObjectMeta {
                id: ids[&object.id()],
                link_url: object.meta.link_url.clone(),
                ..ObjectMeta::new(self.owner.as_str())
            };
            match &mut copy.shape {
                Shape::Connector(connector) => {
                    for endpoint in [&mut connector.start, &mut connector.end] {
                        if let Endpoint::Anchored { anchor, .. } = endpoint {
                            if let Some(new_id) = ids.get(&anchor.object_id) {
                                anchor.object_id = *new_id;
                            }
                        }
                    }
                }
                shape => {
                    if let Some(placement) = shape.placement_mut() {
                        placement.parent_id = placement.parent_id.and_then(|p| ids.get(&p).copied());
                    }
                }
            }
            if copy.shape.is_nestable() && copy.shape.parent_id().is_none() {
                adopt_into_frame(&self.store, &mut copy);
            }
            created.push(copy);
        }
        let new_ids: Vec<ObjectId> = created.iter().map(BoardObject::id).collect();
        let actions = created
            .into_iter()
            .map(|object| UndoAction::Create { object })
            .collect();
        if self.perform(UndoAction::Compound { actions }) {
            self.selection.select_many(new_ids.iter().copied());
            new_ids
        } else {
            Vec::new()
        }
    }

    /// Zoom and pan so every object is visible.
    pub fn fit_to_content(&mut self) {
        if let Some(bounds) = union_bounds(&self.store, self.store.ids()) {
            self.view
                .viewport
                .fit_to_bounds(bounds, self.viewport_size, FIT_PADDING_PX);
        }
    }

    /// Change the style of every selected object as one undo entry.
    pub fn update_style(&mut self, change: impl Fn(&mut ShapeStyle)) -> Result<(), EngineError> {
        let before: Vec<BoardObject> = self
            .selection
            .sorted_ids()
            .into_iter()
            .filter_map(|id| self.store.get(id).cloned())
            .collect();
        if before.is_empty() {
            return Err(EngineError::NothingSelected);
        }
        let after: Vec<BoardObject> = before
            .iter()
            .map(|object| {
                let mut styled = object.clone();
                change(styled.shape.style_mut());
                styled
            })
            .collect();
        self.perform_updates(&before, &after)
    }

    pub fn set_link_url(&mut self, id: ObjectId, url: Option<String>) -> Result<(), EngineError> {
        let before = self.store.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        let mut after = before.clone();
        after.meta.link_url = url.filter(|u| !u.trim().is_empty());
        self.perform_updates(&[before], &[after])
    }

    /// Finish a text edit. With `id`, replaces the text of a sticky or text
    /// object; without, creates a text object at `world` unless `text` is
    /// empty. Returns the id of the created object.
    pub fn commit_text(&mut self, id: Option<ObjectId>, world: Point, text: &str) -> Result<Option<ObjectId>, EngineError> {
        self.selection.end_editing();
        let Some(id) = id else {
            if text.trim().is_empty() {
                return Ok(None);
            }
            let font_size = self.settings.font_size;
            let (width, height) = Text::estimate_size(text, font_size);
            let mut shape = Text::new(Placement::new(world, width, height), text, font_size);
            shape.style.stroke_color = self.settings.style.stroke_color;
            let mut object = BoardObject::new(self.owner.as_str(), Shape::Text(shape));
            adopt_into_frame(&self.store, &mut object);
            let new_id = object.id();
            if self.perform(UndoAction::Create { object }) {
                self.selection.select(new_id);
                return Ok(Some(new_id));
            }
            return Ok(None);
        };

        let before = self.store.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        let mut after = before.clone();
        match &mut after.shape {
            Shape::Sticky(sticky) => sticky.text = text.to_string(),
            Shape::Text(t) => {
                t.content = text.to_string();
                let (width, height) = Text::estimate_size(text, t.font_size);
                t.placement.width = width;
                t.placement.height = height;
            }
            _ => return Err(EngineError::WrongKind { id, expected: "sticky note or text" }),
        }
        self.perform_updates(&[before], &[after])?;
        Ok(None)
    }

    pub fn add_comment(&mut self, world: Point, text: &str) -> ObjectId {
        let comment = Comment::new(self.owner.as_str(), text, world);
        let id = comment.id;
        self.perform(UndoAction::RestoreComment { comment });
        id
    }

    pub fn delete_comment(&mut self, id: ObjectId) -> Result<(), EngineError> {
        let comment = self.store.comment(id).cloned().ok_or(EngineError::NotFound(id))?;
        self.perform(UndoAction::DeleteComment { comment });
        Ok(())
    }

    /// Apply a producer's instructions as one undo entry.
    pub fn apply_template(
        &mut self,
        producer: &mut dyn TemplateProducer,
        key: &str,
    ) -> Result<Vec<ObjectId>, EngineError> {
        let instructions = match producer.produce(key) {
            Ok(instructions) => instructions,
            Err(e) => {
                log::error!("Template producer failed for {key}: {e}");
                self.notify(format!("Could not generate \"{key}\": {e}"));
                return Err(EngineError::Producer(e.0));
            }
        };

        // Instructions may refer to objects created earlier in the batch.
        let mut scratch = self.store.clone();
        let mut writes = Vec::new();
        let mut actions = Vec::new();
        let mut created = Vec::new();
        for instruction in instructions {
            let action = match instruction {
                Instruction::Create(shape) => {
                    let mut object = BoardObject::new(self.owner.as_str(), shape);
                    adopt_into_frame(&scratch, &mut object);
                    created.push(object.id());
                    UndoAction::Create { object }
                }
                Instruction::Update { id, patch } => {
                    let before = scratch.get(id).ok_or(EngineError::NotFound(id))?;
                    let after = patch.apply(before)?;
                    match FieldChange::between(before, &after)? {
                        Some(change) => UndoAction::Update { change },
                        None => continue,
                    }
                }
                Instruction::Delete(id) => {
                    let object = scratch.get(id).cloned().ok_or(EngineError::NotFound(id))?;
                    UndoAction::Delete { object }
                }
            };
            if let Err(e) = action.apply_local(&mut scratch, &mut writes) {
                log::warn!("Template instruction for {key} could not be applied: {e}");
                return Err(EngineError::Producer(e.to_string()));
            }
            actions.push(action);
        }
        if actions.is_empty() {
            return Ok(created);
        }

        self.store = scratch;
        self.send(writes);
        self.history.push(UndoAction::Compound { actions });
        self.prune_selection();
        log::info!("Applied template {key}: {} objects created", created.len());
        Ok(created)
    }

    /// Start handwriting recognition of the selected strokes.
    pub fn begin_handwriting(&mut self) -> Result<RecognitionRequest, EngineError> {
        if self.handwriting.is_some() {
            return Err(EngineError::Busy("Handwriting recognition"));
        }
        let strokes: Vec<(ObjectId, &crate::shapes::Stroke)> = self
            .selection
            .sorted_ids()
            .into_iter()
            .filter_map(|id| Some((id, self.store.get(id)?.shape.as_stroke()?)))
            .collect();
        if strokes.is_empty() {
            return Err(EngineError::NothingSelected);
        }
        let refs: Vec<&crate::shapes::Stroke> = strokes.iter().map(|(_, s)| *s).collect();
        let raster = rasterize_strokes(&refs, DEFAULT_MAX_SIDE)?;
        let png = raster.to_png()?;
        let ids: Vec<ObjectId> = strokes.iter().map(|(id, _)| *id).collect();
        self.handwriting = Some(ids.clone());
        Ok(RecognitionRequest {
            strokes: ids,
            bounds: raster.bounds,
            png,
        })
    }

    pub fn is_recognizing(&self) -> bool {
        self.handwriting.is_some()
    }

    /// Finish recognition: on success replace the strokes with a text
    /// object in one undo entry; on failure notify and change nothing.
    pub fn complete_handwriting(&mut self, result: Result<String, String>) -> Option<ObjectId> {
        let Some(stroke_ids) = self.handwriting.take() else {
            log::debug!("Ignoring recognition result with no request in flight");
            return None;
        };
        let text = match result {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                self.notify("No handwriting was recognized");
                return None;
            }
            Err(e) => {
                log::error!("Handwriting recognition failed: {e}");
                self.notify(format!("Handwriting recognition failed: {e}"));
                return None;
            }
        };

        let strokes: Vec<BoardObject> = stroke_ids
            .iter()
            .filter_map(|id| self.store.get(*id).cloned())
            .collect();
        let bounds = crate::raster::strokes_bounds(strokes.iter().filter_map(|o| o.shape.as_stroke()))?;
        let font_size = estimate_font_size(bounds, &text);
        let (width, height) = Text::estimate_size(&text, font_size);
        let mut shape = Text::new(Placement::new(bounds.origin(), width, height), text, font_size);
        shape.style.stroke_color = self.settings.style.stroke_color;
        let mut object = BoardObject::new(self.owner.as_str(), Shape::Text(shape));
        adopt_into_frame(&self.store, &mut object);
        let id = object.id();

        let mut actions = vec![UndoAction::Create { object }];
        actions.extend(strokes.into_iter().map(|object| UndoAction::Delete { object }));
        if self.perform(UndoAction::Compound { actions }) {
            self.selection.select(id);
            Some(id)
        } else {
            None
        }
    }

    /// Start an upload that will be placed at `world`.
    pub fn begin_upload(&mut self, world: Point) -> Result<UploadTicket, EngineError> {
        if self.upload.is_some() {
            return Err(EngineError::Busy("Upload"));
        }
        self.next_ticket += 1;
        let ticket = UploadTicket(self.next_ticket);
        self.upload = Some((ticket, world));
        Ok(ticket)
    }

    pub fn is_uploading(&self) -> bool {
        self.upload.is_some()
    }

    /// Finish an upload by placing an embed centered on the drop point.
    /// Results for any ticket but the one in flight are ignored.
    pub fn complete_upload(&mut self, ticket: UploadTicket, result: Result<UploadedMedia, String>) -> Option<ObjectId> {
        let world = match self.upload {
            Some((current, world)) if current == ticket => world,
            _ => {
                log::debug!("Ignoring result for stale upload {ticket:?}");
                return None;
            }
        };
        self.upload = None;
        let media = match result {
            Ok(media) => media,
            Err(e) => {
                log::error!("Upload failed: {e}");
                self.notify(format!("Upload failed: {e}"));
                return None;
            }
        };
        let size = media
            .size
            .unwrap_or(Size::new(Embed::DEFAULT_WIDTH, Embed::DEFAULT_HEIGHT));
        let placement = Placement::new(world - Vec2::new(size.width / 2.0, size.height / 2.0), size.width, size.height);
        let mut object = BoardObject::new(
            self.owner.as_str(),
            Shape::Embed(Embed::new(placement, media.url, media.media)),
        );
        adopt_into_frame(&self.store, &mut object);
        let id = object.id();
        if self.perform(UndoAction::Create { object }) {
            self.selection.select(id);
            Some(id)
        } else {
            None
        }
    }

    /// What to draw this frame.
    pub fn render_plan(&self) -> RenderPlan {
        let lasso = match &self.gesture {
            Gesture::LassoSelecting { points } => Some(points.clone()),
            _ => None,
        };
        let ctx = RenderContext::new(
            &self.store,
            &self.view.viewport,
            self.viewport_size,
            &self.selection,
            &self.config,
        )
        .with_marquee(self.gesture.marquee_rect())
        .with_lasso(lasso)
        .with_preview(self.gesture_preview());
        render_plan(&ctx)
    }

    fn gesture_preview(&self) -> Option<BezPath> {
        match &self.gesture {
            Gesture::DrawingFreehand { points, .. } => {
                let (first, rest) = points.split_first()?;
                let mut path = BezPath::new();
                path.move_to(*first);
                for point in rest {
                    path.line_to(*point);
                }
                Some(path)
            }
            Gesture::ConnectorPending { anchor, preview, .. } => {
                let start = anchors::resolve_endpoint(&self.store, anchor);
                Some(anchors::connector_path(start, *preview, self.settings.connector_route))
            }
            Gesture::ArrowDragging { start, current } => {
                Some(anchors::connector_path(*start, *current, self.settings.connector_route))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{MemoryReplica, ReplicaCall};
    use crate::shapes::{Frame, Sticky, Stroke, StrokeTool};
    use std::time::Duration;

    fn engine() -> (CanvasEngine, MemoryReplica) {
        let replica = MemoryReplica::new();
        let engine = CanvasEngine::new("board", "alice", EngineConfig::default(), Box::new(replica.clone())).unwrap();
        (engine, replica)
    }

    fn place_note(engine: &mut CanvasEngine, x: f64, y: f64) -> ObjectId {
        let object = BoardObject::new(
            "alice",
            Shape::Sticky(Sticky::new(Placement::new(Point::new(x, y), 100.0, 100.0), "")),
        );
        let id = object.id();
        assert!(engine.perform(UndoAction::Create { object }));
        id
    }

    fn click(engine: &mut CanvasEngine, x: f64, y: f64, now: Instant) {
        let event = PointerEvent::primary(Point::new(x, y));
        engine.pointer_down(event, now);
        engine.pointer_up(event, now);
    }

    fn drag(engine: &mut CanvasEngine, from: (f64, f64), to: (f64, f64), now: Instant) {
        engine.pointer_down(PointerEvent::primary(Point::new(from.0, from.1)), now);
        engine.pointer_move(PointerEvent::primary(Point::new(to.0, to.1)), now);
        engine.pointer_up(PointerEvent::primary(Point::new(to.0, to.1)), now);
    }

    #[test]
    fn test_subscribes_on_open() {
        let (_engine, replica) = engine();
        assert_eq!(replica.calls(), vec![ReplicaCall::Subscribe("board".to_string())]);
    }

    #[test]
    fn test_drag_writes_are_debounced() {
        let (mut engine, replica) = engine();
        let id = place_note(&mut engine, 0.0, 0.0);
        replica.take_calls();
        let t0 = Instant::now();

        drag(&mut engine, (50.0, 50.0), (80.0, 50.0), t0);
        drag(&mut engine, (80.0, 50.0), (110.0, 50.0), t0 + Duration::from_millis(20));
        assert!(replica.calls().is_empty());
        assert_eq!(engine.history().undo_len(), 3);

        engine.tick(t0 + Duration::from_millis(200));
        let calls = replica.take_calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], ReplicaCall::Update { id: updated, .. } if *updated == id));
        let remote = replica.object(id).unwrap();
        assert_eq!(remote.shape.placement().unwrap().position, Point::new(60.0, 0.0));
    }

    #[test]
    fn test_remote_echo_does_not_clobber_newer_local_edit() {
        let (mut engine, replica) = engine();
        let id = place_note(&mut engine, 0.0, 0.0);
        let t0 = Instant::now();
        drag(&mut engine, (50.0, 50.0), (150.0, 50.0), t0);

        // The replica still has the creation-time version.
        replica.publish();
        engine.tick(t0 + Duration::from_millis(10));
        let local = engine.store().get(id).unwrap();
        assert_eq!(local.shape.placement().unwrap().position, Point::new(100.0, 0.0));

        engine.tick(t0 + Duration::from_millis(200));
        replica.publish();
        engine.tick(t0 + Duration::from_millis(210));
        assert!(!engine.store().is_pending(id));
    }

    #[test]
    fn test_undo_redo_through_engine() {
        let (mut engine, replica) = engine();
        let id = place_note(&mut engine, 0.0, 0.0);
        let t0 = Instant::now();
        drag(&mut engine, (50.0, 50.0), (70.0, 90.0), t0);

        assert!(engine.undo());
        assert_eq!(
            engine.store().get(id).unwrap().shape.placement().unwrap().position,
            Point::ZERO
        );
        assert!(engine.redo());
        assert_eq!(
            engine.store().get(id).unwrap().shape.placement().unwrap().position,
            Point::new(20.0, 40.0)
        );
        assert_eq!(
            replica.object(id).unwrap().shape.placement().unwrap().position,
            Point::new(20.0, 40.0)
        );
    }

    #[test]
    fn test_delete_frame_promotes_children_and_undoes() {
        let (mut engine, _replica) = engine();
        let frame = BoardObject::new("alice", Shape::Frame(Frame::new(Point::new(100.0, 100.0), 400.0, 400.0, "F")));
        let frame_id = frame.id();
        assert!(engine.perform(UndoAction::Create { object: frame }));
        let child = place_note(&mut engine, 150.0, 150.0);
        // Re-nest the child as if it had been dropped into the frame.
        let mut nested = engine.store().get(child).unwrap().clone();
        adopt_into_frame(engine.store(), &mut nested);
        engine.store.put(nested);
        assert_eq!(engine.store().get(child).unwrap().shape.parent_id(), Some(frame_id));

        engine.delete_frame(frame_id, false).unwrap();
        let promoted = engine.store().get(child).unwrap();
        assert_eq!(promoted.shape.parent_id(), None);
        assert_eq!(promoted.shape.placement().unwrap().position, Point::new(150.0, 150.0));

        assert!(engine.undo());
        let restored = engine.store().get(child).unwrap();
        assert_eq!(restored.shape.parent_id(), Some(frame_id));
        assert!(engine.store().contains(frame_id));
    }

    #[test]
    fn test_delete_frame_with_contents() {
        let (mut engine, _replica) = engine();
        let frame = BoardObject::new("alice", Shape::Frame(Frame::new(Point::ZERO, 400.0, 400.0, "F")));
        let frame_id = frame.id();
        engine.perform(UndoAction::Create { object: frame });
        engine.settings_mut().shape_size = 50.0;
        engine.set_tool(ToolKind::Rectangle, Instant::now());
        click(&mut engine, 100.0, 100.0, Instant::now());
        assert_eq!(engine.store().len(), 2);

        engine.delete_frame(frame_id, true).unwrap();
        assert!(engine.store().is_empty());
        assert!(engine.selection().is_empty());
        assert!(engine.undo());
        assert_eq!(engine.store().len(), 2);
    }

    #[test]
    fn test_wrong_kind_and_missing() {
        let (mut engine, _replica) = engine();
        let note = place_note(&mut engine, 0.0, 0.0);
        assert!(matches!(engine.delete_frame(note, true), Err(EngineError::WrongKind { .. })));
        assert!(matches!(
            engine.delete_frame(uuid::Uuid::new_v4(), true),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(engine.delete_selected(), Err(EngineError::NothingSelected)));
    }

    #[test]
    fn test_copy_paste_remaps_anchors() {
        let (mut engine, _replica) = engine();
        let a = place_note(&mut engine, 0.0, 0.0);
        let b = place_note(&mut engine, 300.0, 0.0);
        engine.set_tool(ToolKind::SmartConnector, Instant::now());
        click(&mut engine, 95.0, 50.0, Instant::now());
        click(&mut engine, 305.0, 50.0, Instant::now());
        assert_eq!(engine.store().len(), 3);

        engine.select_all();
        assert_eq!(engine.copy_selection(), 3);
        let pasted = engine.paste();
        assert_eq!(pasted.len(), 3);
        assert_eq!(engine.store().len(), 6);

        let connector = pasted
            .iter()
            .filter_map(|id| engine.store().get(*id)?.shape.as_connector())
            .next()
            .unwrap();
        assert!(!connector.touches(a) && !connector.touches(b));
        let (start, _) = anchors::connector_endpoints(engine.store(), connector);
        assert_eq!(start, Point::new(120.0, 70.0));

        assert!(engine.undo());
        assert_eq!(engine.store().len(), 3);
    }

    #[test]
    fn test_z_order_commands() {
        let (mut engine, _replica) = engine();
        let a = place_note(&mut engine, 0.0, 0.0);
        let b = place_note(&mut engine, 10.0, 10.0);
        engine.selection.select(a);
        engine.bring_to_front().unwrap();
        let key = |e: &CanvasEngine, id| e.store().get(id).unwrap().meta.order_key();
        assert!(key(&engine, a) > key(&engine, b));
        engine.send_to_back().unwrap();
        assert!(key(&engine, a) < key(&engine, b));
        assert_eq!(engine.history().undo_len(), 4);
    }

    #[test]
    fn test_text_commit_creates_and_edits() {
        let (mut engine, _replica) = engine();
        engine.set_tool(ToolKind::Text, Instant::now());
        click(&mut engine, 40.0, 40.0, Instant::now());
        let events = engine.drain_events();
        assert!(events.contains(&EngineEvent::Tool(ToolEvent::TextEditRequested {
            id: None,
            world: Point::new(40.0, 40.0)
        })));

        let id = engine.commit_text(None, Point::new(40.0, 40.0), "hello").unwrap().unwrap();
        engine.commit_text(Some(id), Point::ZERO, "hello world").unwrap();
        match &engine.store().get(id).unwrap().shape {
            Shape::Text(text) => assert_eq!(text.content, "hello world"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(engine.commit_text(None, Point::ZERO, "   ").unwrap().is_none());
    }

    #[test]
    fn test_double_click_on_note_requests_edit() {
        let (mut engine, _replica) = engine();
        let id = place_note(&mut engine, 0.0, 0.0);
        let t0 = Instant::now();
        click(&mut engine, 50.0, 50.0, t0);
        click(&mut engine, 50.0, 50.0, t0 + Duration::from_millis(100));
        assert_eq!(engine.selection().editing(), Some(id));
        // While editing, Delete belongs to the text editor.
        assert!(!engine.key(Key::Delete, Modifiers::NONE, t0));
        assert!(engine.store().contains(id));
        assert!(engine.key(Key::Escape, Modifiers::NONE, t0));
        assert!(!engine.selection().is_editing_text());
    }

    #[test]
    fn test_keyboard_shortcuts() {
        let (mut engine, _replica) = engine();
        place_note(&mut engine, 0.0, 0.0);
        let now = Instant::now();
        let cmd = Modifiers { ctrl: true, ..Modifiers::NONE };
        assert!(engine.key(Key::Character('a'), cmd, now));
        assert_eq!(engine.selection().len(), 1);
        assert!(engine.key(Key::Delete, Modifiers::NONE, now));
        assert!(engine.store().is_empty());
        assert!(engine.key(Key::Character('z'), cmd, now));
        assert_eq!(engine.store().len(), 1);
        let redo = Modifiers { shift: true, ..cmd };
        assert!(engine.key(Key::Character('Z'), redo, now));
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_handwriting_flow() {
        let (mut engine, _replica) = engine();
        let stroke = BoardObject::new(
            "alice",
            Shape::Stroke(Stroke::new(StrokeTool::Pen, vec![Point::new(0.0, 0.0), Point::new(120.0, 40.0)])),
        );
        let stroke_id = stroke.id();
        engine.perform(UndoAction::Create { object: stroke });
        engine.selection.select(stroke_id);

        let request = engine.begin_handwriting().unwrap();
        assert_eq!(request.strokes, vec![stroke_id]);
        assert!(matches!(engine.begin_handwriting(), Err(EngineError::Busy(_))));
        // Another async tool is not blocked.
        assert!(engine.begin_upload(Point::ZERO).is_ok());

        let text_id = engine.complete_handwriting(Ok("hi".to_string())).unwrap();
        assert!(!engine.store().contains(stroke_id));
        assert!(engine.store().contains(text_id));
        assert!(!engine.is_recognizing());

        assert!(engine.undo());
        assert!(engine.store().contains(stroke_id));
        assert!(!engine.store().contains(text_id));
    }

    #[test]
    fn test_handwriting_failure_notifies() {
        let (mut engine, _replica) = engine();
        let stroke = BoardObject::new(
            "alice",
            Shape::Stroke(Stroke::new(StrokeTool::Pen, vec![Point::ZERO, Point::new(10.0, 10.0)])),
        );
        let stroke_id = stroke.id();
        engine.perform(UndoAction::Create { object: stroke });
        engine.selection.select(stroke_id);
        engine.begin_handwriting().unwrap();

        assert!(engine.complete_handwriting(Err("service unavailable".to_string())).is_none());
        assert!(!engine.is_recognizing());
        assert!(engine.store().contains(stroke_id));
        assert!(engine
            .drain_events()
            .iter()
            .any(|e| matches!(e, EngineEvent::Notification(_))));
    }

    #[test]
    fn test_upload_places_embed() {
        let (mut engine, _replica) = engine();
        let ticket = engine.begin_upload(Point::new(500.0, 500.0)).unwrap();
        assert!(matches!(engine.begin_upload(Point::ZERO), Err(EngineError::Busy(_))));
        assert!(engine.complete_upload(UploadTicket(ticket.0 + 1), Err("late".to_string())).is_none());
        assert!(engine.is_uploading());
        let id = engine
            .complete_upload(ticket, Ok(UploadedMedia {
                url: "https://example.com/cat.png".to_string(),
                media: MediaKind::Image,
                size: Some(Size::new(200.0, 100.0)),
            }))
            .unwrap();
        let placement = *engine.store().get(id).unwrap().shape.placement().unwrap();
        assert_eq!(placement.rect(), Rect::new(400.0, 450.0, 600.0, 550.0));
        assert!(!engine.is_uploading());
    }

    struct Kanban;

    impl TemplateProducer for Kanban {
        fn produce(&mut self, key: &str) -> Result<Vec<Instruction>, ProducerError> {
            if key != "kanban" {
                return Err(ProducerError(format!("unknown template {key}")));
            }
            Ok((0..3)
                .map(|i| {
                    Instruction::Create(Shape::Sticky(Sticky::new(
                        Placement::new(Point::new(i as f64 * 250.0, 0.0), 200.0, 200.0),
                        format!("Column {i}"),
                    )))
                })
                .collect())
        }
    }

    #[test]
    fn test_template_is_one_undo_entry() {
        let (mut engine, replica) = engine();
        let created = engine.apply_template(&mut Kanban, "kanban").unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(replica.len(), 3);
        assert_eq!(engine.history().undo_len(), 1);
        assert!(engine.undo());
        assert!(engine.store().is_empty());

        assert!(matches!(
            engine.apply_template(&mut Kanban, "retro"),
            Err(EngineError::Producer(_))
        ));
        assert!(engine
            .drain_events()
            .iter()
            .any(|e| matches!(e, EngineEvent::Notification(_))));
    }

    #[test]
    fn test_cursor_broadcast_suppressed_while_zooming() {
        let (mut engine, _replica) = engine();
        let t0 = Instant::now();
        engine.pointer_move(PointerEvent::primary(Point::new(10.0, 10.0)), t0);
        assert_eq!(engine.drain_events().len(), 1);

        engine.wheel(Point::ZERO, -100.0, t0 + Duration::from_millis(150));
        engine.pointer_move(
            PointerEvent::primary(Point::new(20.0, 20.0)),
            t0 + Duration::from_millis(200),
        );
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn test_comments_undo() {
        let (mut engine, replica) = engine();
        let id = engine.add_comment(Point::new(5.0, 5.0), "ship it");
        assert_eq!(replica.comment_count(), 1);
        engine.delete_comment(id).unwrap();
        assert!(engine.store().comment(id).is_none());
        assert!(engine.undo());
        assert!(engine.store().comment(id).is_some());
        assert_eq!(replica.comment_count(), 1);
    }

    #[test]
    fn test_deleting_anchor_target_keeps_connector_in_place() {
        let (mut engine, _replica) = engine();
        let a = place_note(&mut engine, 0.0, 0.0);
        let b = place_note(&mut engine, 300.0, 0.0);
        engine.set_tool(ToolKind::SmartConnector, Instant::now());
        click(&mut engine, 95.0, 50.0, Instant::now());
        click(&mut engine, 305.0, 50.0, Instant::now());
        engine.set_tool(ToolKind::Pointer, Instant::now());

        // Move B, then delete it: the orphaned end stays at B's last edge.
        drag(&mut engine, (350.0, 50.0), (350.0, 150.0), Instant::now());
        engine.selection.select(b);
        engine.delete_selected().unwrap();

        let connector = engine
            .store()
            .iter()
            .find_map(|o| o.shape.as_connector())
            .unwrap();
        assert!(connector.touches(a));
        let (_, end) = anchors::connector_endpoints(engine.store(), connector);
        assert_eq!(end, Point::new(300.0, 150.0));
    }

    #[test]
    fn test_secondary_drag_selects_by_marquee() {
        let (mut engine, _replica) = engine();
        let a = place_note(&mut engine, 0.0, 0.0);
        place_note(&mut engine, 500.0, 500.0);
        let now = Instant::now();
        let down = PointerEvent::new(Point::new(-10.0, -10.0), PointerButton::Secondary);
        engine.pointer_down(down, now);
        engine.pointer_move(PointerEvent::new(Point::new(150.0, 150.0), PointerButton::Secondary), now);
        assert!(engine.render_plan().overlays.iter().any(|o| matches!(o, crate::render::Overlay::Marquee(_))));
        engine.pointer_up(PointerEvent::new(Point::new(150.0, 150.0), PointerButton::Secondary), now);
        assert_eq!(engine.selection().sorted_ids(), vec![a]);
    }

    #[test]
    fn test_resize_back_to_start_leaves_object_untouched() {
        let (mut engine, replica) = engine();
        let id = place_note(&mut engine, 0.0, 0.0);
        let now = Instant::now();
        click(&mut engine, 50.0, 50.0, now);
        replica.take_calls();

        engine.pointer_down(PointerEvent::primary(Point::new(100.0, 100.0)), now);
        engine.pointer_move(PointerEvent::primary(Point::new(180.0, 180.0)), now);
        assert_eq!(engine.store().get(id).unwrap().shape.placement().unwrap().width, 180.0);
        engine.pointer_up(PointerEvent::primary(Point::new(100.0, 100.0)), now);

        assert_eq!(engine.store().get(id).unwrap().shape.placement().unwrap().width, 100.0);
        assert_eq!(engine.history().undo_len(), 1);
        assert!(replica.calls().is_empty());
    }

    #[test]
    fn test_remote_delete_during_drag_wins() {
        let (mut engine, replica) = engine();
        let id = place_note(&mut engine, 0.0, 0.0);
        let t0 = Instant::now();
        replica.publish();
        engine.tick(t0);
        assert!(!engine.store().is_pending(id));

        engine.pointer_down(PointerEvent::primary(Point::new(50.0, 50.0)), t0);
        engine.pointer_move(PointerEvent::primary(Point::new(80.0, 50.0)), t0);
        assert!(engine.store().is_pending(id));

        let summary = engine.merge_remote(Vec::new());
        assert_eq!(summary.removed, vec![id]);
        engine.pointer_move(PointerEvent::primary(Point::new(90.0, 50.0)), t0);
        engine.pointer_up(PointerEvent::primary(Point::new(90.0, 50.0)), t0);

        assert!(!engine.store().contains(id));
        assert!(!engine.store().is_pending(id));
        assert!(engine.selection().is_empty());
        assert_eq!(engine.history().undo_len(), 1);
    }
}
