//! Board orchestrator.
//!
//! Owns the shape adapters, the selection and focus, the camera and the
//! pointer gesture tracker. Every document write goes through
//! [`CrdtDocument::transact`]; changes that arrive only as observed deltas
//! (remote imports, undo and redo) are reconciled in [`Board::process_changes`].

mod gesture;

use std::collections::{HashMap, HashSet};

use kurbo::{Point, Rect, Vec2};

use self::gesture::{MoveSelection, PanCanvas, PointHandleDrag, RubberBandSelect, Tracker};
use crate::camera::Camera;
use crate::config::BoardConfig;
use crate::crdt::{Change, CrdtDocument};
use crate::error::{BoardError, Result};
use crate::event::Event;
use crate::geometry::{Edge, rects_intersect};
use crate::input::{Modifiers, MouseButton, PointerEvent};
use crate::presence::{Awareness, PresenceLayer};
use crate::scene::Scene;
use crate::schema::{self, Anchor, ShapeId, ShapeRecord, create_association_record, create_class_record};
use crate::shapes::{HitTarget, PointDrag, ShapeAdapter, ShapeContext};

pub use crate::shapes::AnchorCandidate;

/// Payload of [`Board::selection_changed`].
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionChanged {
    pub selection: Vec<ShapeId>,
    pub focused: Option<ShapeId>,
}

/// The interactive diagram surface bound to one replicated document.
pub struct Board {
    ctx: ShapeContext,
    /// Adapters in canonical sequence order.
    shapes: Vec<ShapeAdapter>,
    selection: Vec<ShapeId>,
    focused: Option<ShapeId>,
    camera: Camera,
    tracker: Tracker,
    awareness: Box<dyn Awareness>,
    presence: PresenceLayer,
    /// Fired once per selection operation.
    pub selection_changed: Event<SelectionChanged>,
    /// Fired after a shape's bounds changed and its listeners ran.
    pub shape_bounds_changed: Event<ShapeId>,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("shapes", &self.shapes.len())
            .field("selection", &self.selection)
            .field("focused", &self.focused)
            .field("camera", &self.camera)
            .finish()
    }
}

impl Board {
    /// Bind a board to `doc`, adapting every record it already holds.
    pub fn new(
        doc: CrdtDocument,
        scene: Box<dyn Scene>,
        awareness: Box<dyn Awareness>,
        config: BoardConfig,
    ) -> Self {
        let camera = Camera::from_config(&config);
        let mut board = Self {
            ctx: ShapeContext::new(doc, scene, config),
            shapes: Vec::new(),
            selection: Vec::new(),
            focused: None,
            camera,
            tracker: Tracker::Idle,
            awareness,
            presence: PresenceLayer::new(),
            selection_changed: Event::new(),
            shape_bounds_changed: Event::new(),
        };
        board.apply_camera();
        board.ctx.doc.drain_changes();
        board.reconcile();
        board
    }

    pub fn doc(&self) -> &CrdtDocument {
        &self.ctx.doc
    }

    pub fn config(&self) -> &BoardConfig {
        &self.ctx.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn awareness(&self) -> &dyn Awareness {
        self.awareness.as_ref()
    }

    pub fn presence(&self) -> &PresenceLayer {
        &self.presence
    }

    /// Adapters in canonical sequence order.
    pub fn shapes(&self) -> &[ShapeAdapter] {
        &self.shapes
    }

    pub fn shape(&self, id: &ShapeId) -> Option<&ShapeAdapter> {
        self.shapes.iter().find(|s| s.id() == *id)
    }

    /// Adapter whose record has `key`.
    pub fn shape_by_key(&self, key: &str) -> Option<&ShapeAdapter> {
        self.shapes.iter().find(|s| s.key() == key)
    }

    fn index_of(&self, id: &ShapeId) -> Option<usize> {
        self.shapes.iter().position(|s| s.id() == *id)
    }

    pub fn selection(&self) -> &[ShapeId] {
        &self.selection
    }

    pub fn focused(&self) -> Option<&ShapeId> {
        self.focused.as_ref()
    }

    // --- Coordinates ---

    pub fn to_canvas_coordinates(&self, screen: Point) -> Point {
        self.camera.to_canvas_coordinates(screen)
    }

    pub fn from_canvas_coordinates(&self, canvas: Point) -> Point {
        self.camera.from_canvas_coordinates(canvas)
    }

    fn apply_camera(&mut self) {
        self.ctx
            .scene
            .set_canvas_transform(self.camera.offset, self.camera.scale);
        self.presence
            .refresh(self.awareness.as_ref(), self.ctx.scene.as_mut(), &self.camera);
    }

    /// Pan by a screen-space delta.
    pub fn pan(&mut self, delta: Vec2) {
        self.camera.pan(delta);
        self.apply_camera();
    }

    /// Zoom one wheel notch around `screen`. Negative `delta_y` zooms in.
    pub fn zoom_canvas(&mut self, screen: Point, delta_y: f64) {
        let step = if delta_y < 0.0 {
            self.ctx.config.zoom_step
        } else if delta_y > 0.0 {
            -self.ctx.config.zoom_step
        } else {
            return;
        };
        if self.camera.zoom_at(screen, step) {
            log::debug!("Zoomed to {:.1}", self.camera.scale);
            self.apply_camera();
        }
    }

    // --- Selection ---

    fn emit_selection_changed(&mut self) {
        let payload = SelectionChanged {
            selection: self.selection.clone(),
            focused: self.focused.clone(),
        };
        self.selection_changed.emit(&payload);
    }

    /// Focus the sole selected shape, or nothing when the selection is not a singleton.
    fn sync_focus(&mut self) {
        let wanted = match self.selection.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };
        if wanted == self.focused {
            return;
        }
        if let Some(i) = self.focused.take().and_then(|id| self.index_of(&id)) {
            self.shapes[i].as_shape_mut().blur(&mut self.ctx);
        }
        if let Some(i) = wanted.as_ref().and_then(|id| self.index_of(id)) {
            self.shapes[i].as_shape_mut().focus(&mut self.ctx);
            self.focused = wanted;
        }
    }

    /// Clear the selection.
    pub fn discard_selection(&mut self) {
        for id in std::mem::take(&mut self.selection) {
            if let Some(i) = self.index_of(&id) {
                self.shapes[i].as_shape_mut().deselect(&mut self.ctx);
            }
        }
        self.sync_focus();
        self.emit_selection_changed();
    }

    /// Add shapes to the selection. Unknown or already selected shapes are skipped.
    pub fn add_to_selection(&mut self, ids: &[ShapeId]) {
        for id in ids {
            if self.selection.contains(id) {
                continue;
            }
            if let Some(i) = self.index_of(id) {
                self.shapes[i].as_shape_mut().select(&mut self.ctx);
                self.selection.push(id.clone());
            }
        }
        self.sync_focus();
        self.emit_selection_changed();
    }

    /// Remove shapes from the selection.
    pub fn remove_from_selection(&mut self, ids: &[ShapeId]) {
        for id in ids {
            let Some(pos) = self.selection.iter().position(|s| s == id) else {
                continue;
            };
            self.selection.remove(pos);
            if let Some(i) = self.index_of(id) {
                self.shapes[i].as_shape_mut().deselect(&mut self.ctx);
            }
        }
        self.sync_focus();
        self.emit_selection_changed();
    }

    /// Make `id` the only selected and focused shape.
    pub fn focus(&mut self, id: &ShapeId) {
        self.discard_selection();
        self.add_to_selection(std::slice::from_ref(id));
    }

    pub fn select_all(&mut self) {
        let ids: Vec<ShapeId> = self.shapes.iter().map(|s| s.id()).collect();
        self.add_to_selection(&ids);
    }

    /// Delete every selected shape from the document.
    pub fn delete_selection(&mut self) -> Result<()> {
        if self.selection.is_empty() {
            return Ok(());
        }
        let ids = self.selection.clone();
        self.discard_selection();
        self.ctx.doc.transact(|list| {
            for id in &ids {
                if let Some(index) = schema::index_of(list, id) {
                    list.delete(index, 1)?;
                }
            }
            Ok(())
        })?;
        for id in &ids {
            self.remove_adapter(id);
        }
        log::debug!("Deleted {} shape(s)", ids.len());
        Ok(())
    }

    fn remove_adapter(&mut self, id: &ShapeId) {
        if let Some(i) = self.index_of(id) {
            let mut shape = self.shapes.remove(i);
            shape.as_shape_mut().remove(&mut self.ctx);
        }
    }

    // --- Creation and editing ---

    fn push_adapter(&mut self, record: ShapeRecord) -> ShapeId {
        let adapter = ShapeAdapter::adapt(&mut self.ctx, record);
        let id = adapter.id();
        self.shapes.push(adapter);
        id
    }

    /// Create a class with its top-left corner at `position` (logical units).
    pub fn add_class(&mut self, position: Point, title: &str) -> Result<ShapeId> {
        let record = self
            .ctx
            .doc
            .transact(|list| create_class_record(list, position, title))?;
        log::debug!("Created class {} at {position:?}", record.key());
        Ok(self.push_adapter(ShapeRecord::Class(record)))
    }

    /// Create an association from `start` to `end` with an optional start anchor.
    pub fn add_association(&mut self, start: Point, end: Point, anchor1: Option<Anchor>) -> Result<ShapeId> {
        let properties = self.ctx.config.default_association_properties.clone();
        let record = self.ctx.doc.transact(|list| {
            create_association_record(list, start, end, anchor1.as_ref(), &properties)
        })?;
        log::debug!("Created association {}", record.key());
        Ok(self.push_adapter(ShapeRecord::Association(record)))
    }

    /// Replace a shape's raw property text.
    pub fn set_properties(&mut self, id: &ShapeId, text: &str) -> Result<()> {
        let i = self.index_of(id).ok_or(BoardError::UnknownShape)?;
        let record = self.shapes[i].as_shape().record().clone();
        self.ctx.doc.transact(|_| record.set_properties_text(text))?;
        self.shapes[i].as_shape_mut().update(&mut self.ctx);
        self.flush_bounds_changed();
        Ok(())
    }

    // --- Alignment ---

    fn align_selection(&mut self, edge: Edge) -> Result<()> {
        if self.selection.len() < 2 {
            return Ok(());
        }
        let indices: Vec<usize> = self.selection.iter().filter_map(|id| self.index_of(id)).collect();
        let Some(value) = edge.extreme(indices.iter().map(|i| self.shapes[*i].bounds())) else {
            return Ok(());
        };
        for i in indices {
            self.shapes[i].as_shape_mut().align(&mut self.ctx, edge, value)?;
        }
        self.flush_bounds_changed();
        Ok(())
    }

    pub fn align_selection_left(&mut self) -> Result<()> {
        self.align_selection(Edge::Left)
    }

    pub fn align_selection_right(&mut self) -> Result<()> {
        self.align_selection(Edge::Right)
    }

    pub fn align_selection_top(&mut self) -> Result<()> {
        self.align_selection(Edge::Top)
    }

    pub fn align_selection_bottom(&mut self) -> Result<()> {
        self.align_selection(Edge::Bottom)
    }

    // --- Geometry queries ---

    /// First shape, in sequence order, with a perimeter position at `point`.
    pub fn get_anchor_candidate(&self, point: Point) -> Option<AnchorCandidate> {
        self.shapes.iter().find_map(|shape| {
            let shape = shape.as_shape();
            let position = shape.get_snap_position(point)?;
            Some(AnchorCandidate {
                shape: shape.id(),
                anchor: Anchor::new(shape.key(), position),
                point: shape.get_anchor_point(position)?,
            })
        })
    }

    /// Topmost hit at a logical point: handles first, then shape bodies.
    pub fn hit_test(&self, canvas: Point) -> Option<(ShapeId, HitTarget)> {
        let tolerance = self.ctx.config.hit_tolerance;
        self.shapes
            .iter()
            .rev()
            .find_map(|s| s.as_shape().hit_test_handles(canvas).map(|t| (s.id(), t)))
            .or_else(|| {
                self.shapes
                    .iter()
                    .rev()
                    .find(|s| s.as_shape().hit_test(canvas, tolerance))
                    .map(|s| (s.id(), HitTarget::Body))
            })
    }

    /// Shapes whose bounds touch `area` (logical units). Bounds are one unit
    /// wider and taller, so the right and bottom edge pixels count.
    pub fn shapes_in_rect(&self, area: Rect) -> Vec<ShapeId> {
        self.shapes
            .iter()
            .filter(|s| {
                let b = s.bounds();
                rects_intersect(area, Rect::new(b.x0, b.y0, b.x1 + 1.0, b.y1 + 1.0))
            })
            .map(|s| s.id())
            .collect()
    }

    // --- Bounds broadcast ---

    /// Deliver queued bounds changes to every other shape, then to the public event.
    pub(crate) fn flush_bounds_changed(&mut self) {
        loop {
            let pending = self.ctx.take_bounds_changed();
            if pending.is_empty() {
                break;
            }
            for id in pending {
                let Some(source) = self.shape(&id).map(|s| s.anchor_source()) else {
                    continue;
                };
                for shape in &mut self.shapes {
                    if shape.id() == id {
                        continue;
                    }
                    if let Err(err) = shape.as_shape_mut().on_shape_bounds_changed(&mut self.ctx, &source) {
                        log::warn!("Failed to follow bounds of {}: {err}", source.key);
                    }
                }
                self.shape_bounds_changed.emit(&id);
            }
        }
    }

    // --- Interactive moves (driven by gestures) ---

    fn selection_keys(&self) -> HashSet<String> {
        self.selection
            .iter()
            .filter_map(|id| self.shape(id))
            .map(|s| s.key().to_string())
            .collect()
    }

    pub(crate) fn start_interactive_move(&mut self, ids: &[ShapeId]) {
        let keys = self.selection_keys();
        for id in ids {
            if let Some(i) = self.index_of(id) {
                self.shapes[i].as_shape_mut().start_interactive_move(&mut self.ctx, &keys);
            }
        }
    }

    pub(crate) fn interactive_move(&mut self, ids: &[ShapeId], delta: Vec2) -> Result<()> {
        for id in ids {
            if let Some(i) = self.index_of(id) {
                self.shapes[i].as_shape_mut().interactive_move(&mut self.ctx, delta)?;
            }
        }
        self.flush_bounds_changed();
        Ok(())
    }

    pub(crate) fn end_interactive_move(&mut self, ids: &[ShapeId]) {
        for id in ids {
            if let Some(i) = self.index_of(id) {
                self.shapes[i].as_shape_mut().end_interactive_move(&mut self.ctx);
            }
        }
        self.flush_bounds_changed();
    }

    /// Start dragging point `index` of an association.
    pub(crate) fn begin_point_drag(&mut self, id: &ShapeId, index: usize) -> Option<PointDrag> {
        let i = self.index_of(id)?;
        let shape = self.shapes[i].as_association_mut()?;
        Some(shape.begin_point_drag(&mut self.ctx, index))
    }

    pub(crate) fn drag_point(&mut self, id: &ShapeId, drag: &PointDrag, canvas: Point) -> Result<()> {
        let candidate = self.get_anchor_candidate(canvas);
        let Some(i) = self.index_of(id) else {
            return Ok(());
        };
        if let Some(shape) = self.shapes[i].as_association_mut() {
            shape.drag_point(&mut self.ctx, drag, canvas, candidate.as_ref())?;
        }
        self.flush_bounds_changed();
        Ok(())
    }

    pub(crate) fn end_point_drag(&mut self, id: &ShapeId, drag: PointDrag) {
        if let Some(shape) = self.index_of(id).and_then(|i| self.shapes[i].as_association_mut()) {
            shape.end_point_drag(&mut self.ctx, drag);
        }
    }

    // --- Pointer input ---

    /// Dispatch a pointer event.
    pub fn handle_pointer_event(&mut self, event: PointerEvent) -> Result<()> {
        match event {
            PointerEvent::Down {
                position,
                button,
                modifiers,
            } => self.pointer_down(position, button, modifiers),
            PointerEvent::Up { position, button } => self.pointer_up(position, button),
            PointerEvent::Move { position } => self.pointer_move(position),
            PointerEvent::DoubleClick { position } => self.double_click(position),
            PointerEvent::Wheel { position, delta_y } => {
                self.zoom_canvas(position, delta_y);
                Ok(())
            }
        }
    }

    /// Press at a screen position.
    pub fn pointer_down(&mut self, screen: Point, button: MouseButton, modifiers: Modifiers) -> Result<()> {
        if self.is_tracking() {
            return Ok(());
        }
        match button {
            MouseButton::Secondary => {
                self.track_pointer(button, screen, Box::new(PanCanvas));
                Ok(())
            }
            MouseButton::Primary => self.primary_down(screen, modifiers),
            MouseButton::Middle => Ok(()),
        }
    }

    fn primary_down(&mut self, screen: Point, modifiers: Modifiers) -> Result<()> {
        let canvas = self.to_canvas_coordinates(screen);
        match self.hit_test(canvas) {
            None => {
                self.discard_selection();
                self.track_pointer(MouseButton::Primary, screen, Box::new(RubberBandSelect::new(screen)));
            }
            Some((id, HitTarget::ClassHandle(position))) => {
                self.start_association_from(&id, position, canvas, screen)?;
            }
            Some((id, HitTarget::PointHandle(index))) => {
                self.start_point_drag(id, index, screen);
            }
            Some((id, HitTarget::MidpointHandle(index))) => {
                if let Some(i) = self.index_of(&id) {
                    if let Some(shape) = self.shapes[i].as_association_mut() {
                        shape.insert_point(&mut self.ctx, index, canvas)?;
                    }
                }
                self.start_point_drag(id, index, screen);
            }
            Some((id, HitTarget::Body)) => {
                let selected = self.selection.contains(&id);
                if modifiers.toggles_selection() {
                    if selected {
                        self.remove_from_selection(std::slice::from_ref(&id));
                        return Ok(());
                    }
                    self.add_to_selection(std::slice::from_ref(&id));
                } else if !selected {
                    self.focus(&id);
                }
                let ids = self.selection.clone();
                self.track_pointer(MouseButton::Primary, screen, Box::new(MoveSelection::new(ids)));
            }
        }
        self.flush_bounds_changed();
        Ok(())
    }

    fn start_point_drag(&mut self, id: ShapeId, index: usize, screen: Point) {
        if let Some(drag) = self.begin_point_drag(&id, index) {
            self.track_pointer(MouseButton::Primary, screen, Box::new(PointHandleDrag::new(id, drag)));
        }
    }

    /// Create an association anchored at a class handle and drag its far end.
    fn start_association_from(&mut self, class: &ShapeId, position: f64, canvas: Point, screen: Point) -> Result<()> {
        let Some(shape) = self.shape(class) else {
            return Ok(());
        };
        let shape = shape.as_shape();
        let Some(start) = shape.get_anchor_point(position) else {
            return Ok(());
        };
        let anchor = Anchor::new(shape.key(), position);
        self.discard_selection();
        let id = self.add_association(start, canvas, Some(anchor))?;
        self.focus(&id);
        self.start_point_drag(id, 1, screen);
        Ok(())
    }

    /// Pointer moved to a screen position.
    pub fn pointer_move(&mut self, screen: Point) -> Result<()> {
        let canvas = self.to_canvas_coordinates(screen);
        self.awareness.set_local_cursor(Some(canvas.into()));
        self.track_move(screen)
    }

    /// Release, including release outside the canvas.
    pub fn pointer_up(&mut self, screen: Point, button: MouseButton) -> Result<()> {
        let result = self.track_release(screen, button);
        self.flush_bounds_changed();
        result
    }

    /// Double-click: delete an interior association point under the pointer,
    /// or create a class on empty canvas.
    pub fn double_click(&mut self, screen: Point) -> Result<()> {
        let canvas = self.to_canvas_coordinates(screen);
        match self.hit_test(canvas) {
            Some((id, HitTarget::PointHandle(index))) => {
                if let Some(i) = self.index_of(&id) {
                    if let Some(shape) = self.shapes[i].as_association_mut() {
                        shape.delete_point(&mut self.ctx, index)?;
                    }
                }
                self.flush_bounds_changed();
                Ok(())
            }
            Some(_) => Ok(()),
            None => {
                let title = self.ctx.config.default_class_title.clone();
                let id = self.add_class(canvas, &title)?;
                self.focus(&id);
                Ok(())
            }
        }
    }

    // --- Replication ---

    /// Undo the last local change and reconcile.
    pub fn undo(&mut self) -> Result<bool> {
        let undone = self.ctx.doc.undo()?;
        self.process_changes();
        Ok(undone)
    }

    /// Redo the last undone change and reconcile.
    pub fn redo(&mut self) -> Result<bool> {
        let redone = self.ctx.doc.redo()?;
        self.process_changes();
        Ok(redone)
    }

    /// Import updates from another replica and reconcile.
    pub fn import_updates(&mut self, bytes: &[u8]) -> Result<()> {
        self.ctx.doc.import(bytes)?;
        self.process_changes();
        Ok(())
    }

    /// Reconcile adapters with every change observed since the last call.
    ///
    /// Local changes are skipped: the operation that made them already
    /// updated its adapter. Remote and undo/redo changes are applied here.
    pub fn process_changes(&mut self) {
        let mut structural = false;
        let mut touched: Vec<ShapeId> = Vec::new();
        for batch in self.ctx.doc.drain_changes() {
            if !batch.origin.needs_reconcile() {
                continue;
            }
            for change in &batch.changes {
                match change {
                    Change::Sequence => structural = true,
                    Change::Nested { path } => {
                        if let Some(shape) = self.shapes.iter().find(|s| s.owns_path(path)) {
                            let id = shape.id();
                            if !touched.contains(&id) {
                                touched.push(id);
                            }
                        }
                    }
                }
            }
        }
        if structural {
            self.reconcile();
        }
        for id in touched {
            if let Some(i) = self.index_of(&id) {
                self.shapes[i].as_shape_mut().update(&mut self.ctx);
            }
        }
        self.flush_bounds_changed();
        self.sync_presence();
    }

    /// Apply pending awareness changes to the remote cursor markers.
    pub fn sync_presence(&mut self) {
        self.presence
            .sync(self.awareness.as_mut(), self.ctx.scene.as_mut(), &self.camera);
    }

    /// Make the adapter set mirror the canonical sequence: drop adapters whose
    /// record is gone, then adapt new records in sequence order.
    fn reconcile(&mut self) {
        let records = schema::records(&self.ctx.doc.elements());
        let order: HashMap<ShapeId, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id(), i))
            .collect();

        let stale: Vec<ShapeId> = self
            .shapes
            .iter()
            .map(|s| s.id())
            .filter(|id| !order.contains_key(id))
            .collect();
        if !stale.is_empty() {
            log::debug!("Removing {} adapter(s) for deleted records", stale.len());
            let before = self.selection.len();
            self.selection.retain(|id| !stale.contains(id));
            if self.focused.as_ref().is_some_and(|f| stale.contains(f)) {
                self.focused = None;
            }
            for id in &stale {
                self.remove_adapter(id);
            }
            if self.selection.len() != before {
                self.sync_focus();
                self.emit_selection_changed();
            }
        }

        for record in records {
            if self.index_of(&record.id()).is_none() {
                log::debug!("Adapting record {}", record.key());
                self.push_adapter(record);
            }
        }
        self.shapes
            .sort_by_key(|s| order.get(&s.id()).copied().unwrap_or(usize::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::{AwarenessMessage, AwarenessState, CursorPosition, InMemoryAwareness};
    use crate::scene::{Layer, RecordingScene};
    use crate::schema::AnchorEnd;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn board() -> Board {
        Board::new(
            CrdtDocument::default(),
            Box::new(RecordingScene::new()),
            Box::new(InMemoryAwareness::new(1)),
            BoardConfig::default(),
        )
    }

    fn press(board: &mut Board, at: Point) {
        board
            .pointer_down(at, MouseButton::Primary, Modifiers::NONE)
            .expect("down");
    }

    fn drag(board: &mut Board, from: Point, to: Point) {
        press(board, from);
        board.pointer_move(from + (to - from) / 2.0).expect("move");
        board.pointer_move(to).expect("move");
        board.pointer_up(to, MouseButton::Primary).expect("up");
    }

    fn class_position(board: &Board, id: &ShapeId) -> Point {
        board.shape(id).and_then(|s| s.as_class()).expect("class").position()
    }

    fn association_points(board: &Board, id: &ShapeId) -> Vec<Point> {
        board
            .shape(id)
            .and_then(|s| s.as_association())
            .expect("association")
            .points()
    }

    fn assert_focus_invariant(board: &Board) {
        match board.selection() {
            [only] => assert_eq!(board.focused(), Some(only)),
            _ => assert_eq!(board.focused(), None),
        }
        for shape in board.shapes() {
            let s = shape.as_shape();
            assert_eq!(s.is_selected(), board.selection().contains(&s.id()));
            assert_eq!(s.is_focused(), board.focused() == Some(&s.id()));
        }
    }

    #[test]
    fn test_selection_focus_rules() {
        let mut board = board();
        let a = board.add_class(Point::new(0.0, 0.0), "A").expect("a");
        let b = board.add_class(Point::new(200.0, 0.0), "B").expect("b");

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        board
            .selection_changed
            .add_listener(move |e: &SelectionChanged| sink.borrow_mut().push(e.clone()));

        board.add_to_selection(&[a.clone()]);
        assert_eq!(board.focused(), Some(&a));
        board.add_to_selection(&[b.clone()]);
        assert_eq!(board.focused(), None);
        board.remove_from_selection(&[a.clone()]);
        assert_eq!(board.focused(), Some(&b));
        assert_focus_invariant(&board);

        assert_eq!(events.borrow().len(), 3);
        assert_eq!(events.borrow()[2].focused, Some(b.clone()));

        board.select_all();
        assert_eq!(board.selection().len(), 2);
        board.focus(&a);
        assert_eq!(board.selection(), &[a.clone()]);
        board.discard_selection();
        assert!(board.selection().is_empty());
        assert_focus_invariant(&board);
    }

    #[test]
    fn test_double_click_creates_class_at_logical_position() {
        let mut board = board();
        board.pan(Vec2::new(100.0, 50.0));
        board.double_click(Point::new(150.0, 80.0)).expect("double click");

        assert_eq!(board.shapes().len(), 1);
        let id = board.shapes()[0].id();
        assert_eq!(class_position(&board, &id), Point::new(50.0, 30.0));
        assert_eq!(board.focused(), Some(&id));
        let props = board.shapes()[0].as_class().expect("class").properties();
        assert_eq!(props.title, "SimpleClass");
    }

    #[test]
    fn test_drag_moves_selection() {
        let mut board = board();
        let a = board.add_class(Point::new(0.0, 0.0), "A").expect("a");
        let b = board.add_class(Point::new(200.0, 0.0), "B").expect("b");
        board.add_to_selection(&[a.clone(), b.clone()]);

        drag(&mut board, Point::new(10.0, 10.0), Point::new(40.0, 30.0));

        assert_eq!(class_position(&board, &a), Point::new(30.0, 20.0));
        assert_eq!(class_position(&board, &b), Point::new(230.0, 20.0));
        assert_eq!(board.selection().len(), 2);
    }

    #[test]
    fn test_click_replaces_and_ctrl_toggles() {
        let mut board = board();
        let a = board.add_class(Point::new(0.0, 0.0), "A").expect("a");
        let b = board.add_class(Point::new(200.0, 0.0), "B").expect("b");

        press(&mut board, Point::new(10.0, 10.0));
        board.pointer_up(Point::new(10.0, 10.0), MouseButton::Primary).expect("up");
        assert_eq!(board.selection(), &[a.clone()]);

        board
            .pointer_down(Point::new(210.0, 10.0), MouseButton::Primary, Modifiers::CTRL)
            .expect("down");
        board.pointer_up(Point::new(210.0, 10.0), MouseButton::Primary).expect("up");
        assert_eq!(board.selection(), &[a.clone(), b.clone()]);

        board
            .pointer_down(Point::new(10.0, 10.0), MouseButton::Primary, Modifiers::CTRL)
            .expect("down");
        board.pointer_up(Point::new(10.0, 10.0), MouseButton::Primary).expect("up");
        assert_eq!(board.selection(), &[b.clone()]);
        assert_focus_invariant(&board);
    }

    #[test]
    fn test_rubber_band_select() {
        let shared = RecordingScene::shared();
        let mut board = Board::new(
            CrdtDocument::default(),
            Box::new(shared.clone()),
            Box::new(InMemoryAwareness::new(1)),
            BoardConfig::default(),
        );
        let a = board.add_class(Point::new(0.0, 0.0), "A").expect("a");
        let b = board.add_class(Point::new(200.0, 0.0), "B").expect("b");
        board.add_class(Point::new(0.0, 300.0), "C").expect("c");

        press(&mut board, Point::new(-20.0, -20.0));
        board.pointer_move(Point::new(150.0, 20.0)).expect("move");
        assert_eq!(shared.borrow().nodes_on(Layer::Selection).count(), 1);
        board.pointer_move(Point::new(250.0, 40.0)).expect("move");
        board.pointer_up(Point::new(250.0, 40.0), MouseButton::Primary).expect("up");

        assert_eq!(shared.borrow().nodes_on(Layer::Selection).count(), 0);
        assert_eq!(board.selection(), &[a, b]);
    }

    #[test]
    fn test_shapes_in_rect_grows_only_right_and_bottom() {
        let mut board = board();
        let id = board.add_class(Point::new(100.0, 100.0), "A").expect("a");

        // Left and top edges are exact.
        assert!(board.shapes_in_rect(Rect::new(0.0, 0.0, 99.5, 300.0)).is_empty());
        assert!(board.shapes_in_rect(Rect::new(0.0, 0.0, 300.0, 99.5)).is_empty());
        assert_eq!(board.shapes_in_rect(Rect::new(0.0, 0.0, 100.0, 100.0)), vec![id.clone()]);

        // Right edge is x = 220, bottom edge y = 135; both reach one unit further.
        assert_eq!(board.shapes_in_rect(Rect::new(220.5, 0.0, 300.0, 300.0)), vec![id.clone()]);
        assert_eq!(board.shapes_in_rect(Rect::new(0.0, 135.5, 300.0, 300.0)), vec![id]);
        assert!(board.shapes_in_rect(Rect::new(221.5, 0.0, 300.0, 300.0)).is_empty());
    }

    #[test]
    fn test_release_outside_ends_gesture() {
        let mut board = board();
        let a = board.add_class(Point::new(0.0, 0.0), "A").expect("a");
        press(&mut board, Point::new(10.0, 10.0));
        board.pointer_move(Point::new(20.0, 10.0)).expect("move");
        board.pointer_up(Point::new(-500.0, -500.0), MouseButton::Primary).expect("up");

        board.pointer_move(Point::new(80.0, 10.0)).expect("move");
        assert_eq!(class_position(&board, &a), Point::new(10.0, 0.0));
    }

    #[test]
    fn test_secondary_pans() {
        let mut board = board();
        board
            .pointer_down(Point::new(10.0, 10.0), MouseButton::Secondary, Modifiers::NONE)
            .expect("down");
        board.pointer_move(Point::new(40.0, 30.0)).expect("move");
        board.pointer_up(Point::new(40.0, 30.0), MouseButton::Secondary).expect("up");

        assert_eq!(board.camera().offset, Vec2::new(30.0, 20.0));
        assert_eq!(board.to_canvas_coordinates(Point::new(30.0, 20.0)), Point::ZERO);
    }

    #[test]
    fn test_wheel_zoom_is_clamped() {
        let mut board = board();
        for _ in 0..30 {
            board.zoom_canvas(Point::new(100.0, 100.0), -1.0);
        }
        assert!((board.camera().scale - 2.0).abs() < 1e-9);
        for _ in 0..30 {
            board.zoom_canvas(Point::new(100.0, 100.0), 1.0);
        }
        assert!((board.camera().scale - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_align_left_is_idempotent() {
        let mut board = board();
        let a = board.add_class(Point::new(40.0, 0.0), "A").expect("a");
        let b = board.add_class(Point::new(10.0, 100.0), "B").expect("b");
        let c = board.add_class(Point::new(90.0, 200.0), "C").expect("c");

        board.align_selection_left().expect("no-op");
        assert_eq!(class_position(&board, &a).x, 40.0);

        board.select_all();
        board.align_selection_left().expect("align");
        let once: Vec<Point> = [&a, &b, &c].iter().map(|id| class_position(&board, id)).collect();
        board.align_selection_left().expect("align again");
        let twice: Vec<Point> = [&a, &b, &c].iter().map(|id| class_position(&board, id)).collect();

        assert_eq!(once, twice);
        assert!(once.iter().all(|p| p.x == 10.0));
    }

    #[test]
    fn test_align_bottom_uses_box_size() {
        let mut board = board();
        let a = board.add_class(Point::new(0.0, 0.0), "A").expect("a");
        let b = board.add_class(Point::new(200.0, 100.0), "B\n-\nx: int\ny: int").expect("b");
        board.select_all();
        board.align_selection_bottom().expect("align");

        let bottom_b = board.shape(&b).expect("b").bounds().y1;
        assert!((board.shape(&a).expect("a").bounds().y1 - bottom_b).abs() < 1e-9);
    }

    #[test]
    fn test_association_scenario() {
        let mut board = board();
        let c1 = board.add_class(Point::new(0.0, 0.0), "Foo").expect("c1");
        let c2 = board.add_class(Point::new(300.0, 0.0), "Bar").expect("c2");
        let key1 = board.shape(&c1).expect("c1").key().to_string();
        let key2 = board.shape(&c2).expect("c2").key().to_string();

        // Focus C1 so its handles show, then drag from the east handle onto C2's west edge.
        board.focus(&c1);
        let east_handle = Point::new(120.0 + 15.0, 17.5);
        press(&mut board, east_handle);
        board.pointer_move(Point::new(200.0, 20.0)).expect("move");
        board.pointer_move(Point::new(301.0, 17.5)).expect("move");
        board.pointer_up(Point::new(301.0, 17.5), MouseButton::Primary).expect("up");

        let assoc = board
            .shapes()
            .iter()
            .find(|s| s.as_association().is_some())
            .map(|s| s.id())
            .expect("association created");
        assert_eq!(board.focused(), Some(&assoc));
        let shape = board.shape(&assoc).and_then(|s| s.as_association()).expect("association");
        let anchor1 = shape.anchor(AnchorEnd::Start).expect("anchor1");
        let anchor2 = shape.anchor(AnchorEnd::End).expect("anchor2");
        assert_eq!(anchor1.key, key1);
        assert_eq!(anchor1.position.floor(), 2.0);
        assert_eq!(anchor2.key, key2);
        assert_eq!(anchor2.position.floor(), 0.0);
        let before = association_points(&board, &assoc);
        assert_eq!(before[0], Point::new(120.0, 17.5));
        assert_eq!(before[1], Point::new(300.0, 17.5));

        // Move C2 alone by (50, 0).
        board.focus(&c2);
        drag(&mut board, Point::new(350.0, 10.0), Point::new(400.0, 10.0));
        assert_eq!(class_position(&board, &c2), Point::new(350.0, 0.0));

        let after = association_points(&board, &assoc);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1], before[1] + Vec2::new(50.0, 0.0));
    }

    #[test]
    fn test_multi_drag_preserves_anchor() {
        let mut board = board();
        let c1 = board.add_class(Point::new(0.0, 0.0), "Foo").expect("c1");
        let c2 = board.add_class(Point::new(300.0, 0.0), "Bar").expect("c2");
        let key1 = board.shape(&c1).expect("c1").key().to_string();
        let key2 = board.shape(&c2).expect("c2").key().to_string();
        let assoc = board
            .add_association(Point::new(120.0, 17.5), Point::new(300.0, 17.5), Some(Anchor::new(key1, 2.5)))
            .expect("assoc");
        let ShapeRecord::Association(record) = board.shape(&assoc).expect("assoc").as_shape().record().clone() else {
            panic!("association record expected");
        };
        board
            .doc()
            .transact(|_| record.set_anchor(AnchorEnd::End, Some(&Anchor::new(key2, 0.5))))
            .expect("anchor2");
        board.process_changes();

        board.select_all();
        drag(&mut board, Point::new(10.0, 10.0), Point::new(30.0, 60.0));

        let shape = board.shape(&assoc).and_then(|s| s.as_association()).expect("association");
        assert!(shape.anchor(AnchorEnd::Start).is_some());
        assert!(shape.anchor(AnchorEnd::End).is_some());
        assert_eq!(shape.points(), vec![Point::new(140.0, 67.5), Point::new(320.0, 67.5)]);
    }

    #[test]
    fn test_dragging_association_alone_detaches() {
        let mut board = board();
        let c1 = board.add_class(Point::new(0.0, 0.0), "Foo").expect("c1");
        let key1 = board.shape(&c1).expect("c1").key().to_string();
        let assoc = board
            .add_association(Point::new(120.0, 17.5), Point::new(300.0, 17.5), Some(Anchor::new(key1, 2.5)))
            .expect("assoc");

        drag(&mut board, Point::new(200.0, 17.5), Point::new(200.0, 100.0));

        let shape = board.shape(&assoc).and_then(|s| s.as_association()).expect("association");
        assert_eq!(shape.anchor(AnchorEnd::Start), None);
        assert_eq!(shape.points()[0], Point::new(120.0, 100.0));
    }

    #[test]
    fn test_anchor_candidate_first_match() {
        let mut board = board();
        let a = board.add_class(Point::new(0.0, 0.0), "A").expect("a");
        board.add_class(Point::new(0.0, 0.0), "B").expect("b");

        let candidate = board.get_anchor_candidate(Point::new(1.0, 17.5)).expect("candidate");
        assert_eq!(candidate.shape, a);
        assert_eq!(candidate.anchor.position, 0.5);
        assert_eq!(candidate.point, Point::new(0.0, 17.5));
        assert!(board.get_anchor_candidate(Point::new(60.0, 17.0)).is_none());
    }

    #[test]
    fn test_delete_selection() {
        let mut board = board();
        let a = board.add_class(Point::new(0.0, 0.0), "A").expect("a");
        let b = board.add_class(Point::new(200.0, 0.0), "B").expect("b");
        board.focus(&a);
        board.delete_selection().expect("delete");

        assert!(board.shape(&a).is_none());
        assert!(board.shape(&b).is_some());
        assert_eq!(board.doc().elements().len(), 1);
        assert!(board.selection().is_empty());
        board.delete_selection().expect("empty is a no-op");
    }

    #[test]
    fn test_set_properties_resizes_and_moves_anchored_end() {
        let mut board = board();
        let c1 = board.add_class(Point::new(0.0, 0.0), "Foo").expect("c1");
        let key1 = board.shape(&c1).expect("c1").key().to_string();
        let assoc = board
            .add_association(Point::new(60.0, 35.0), Point::new(60.0, 200.0), Some(Anchor::new(key1, 3.5)))
            .expect("assoc");

        board.set_properties(&c1, "Foo\n-\na: int\nb: int").expect("set");
        let bottom = board.shape(&c1).expect("c1").bounds().y1;
        assert!(bottom > 35.0);
        assert_eq!(association_points(&board, &assoc)[0], Point::new(60.0, bottom));

        let unknown = board.doc().elements_id().clone();
        assert!(matches!(board.set_properties(&unknown, "x"), Err(BoardError::UnknownShape)));
    }

    #[test]
    fn test_midpoint_insert_and_double_click_delete() {
        let mut board = board();
        let assoc = board
            .add_association(Point::new(0.0, 0.0), Point::new(200.0, 0.0), None)
            .expect("assoc");
        board.focus(&assoc);

        drag(&mut board, Point::new(100.0, 0.0), Point::new(100.0, 80.0));
        assert_eq!(
            association_points(&board, &assoc),
            vec![Point::new(0.0, 0.0), Point::new(100.0, 80.0), Point::new(200.0, 0.0)]
        );

        board.double_click(Point::new(100.0, 80.0)).expect("double click");
        assert_eq!(association_points(&board, &assoc).len(), 2);

        board.double_click(Point::new(0.0, 0.0)).expect("endpoint");
        assert_eq!(association_points(&board, &assoc).len(), 2);
    }

    #[test]
    fn test_remote_add_update_remove() {
        let mut local = board();
        let mut remote = board();
        let since = remote.doc().version();
        let id = remote.add_class(Point::new(10.0, 10.0), "Remote").expect("add");

        local
            .import_updates(&remote.doc().export_updates(&since))
            .expect("import");
        assert_eq!(local.shapes().len(), 1);
        assert_eq!(class_position(&local, &id), Point::new(10.0, 10.0));

        let since = remote.doc().version();
        remote.set_properties(&id, "Renamed\n-\nfield").expect("rename");
        local
            .import_updates(&remote.doc().export_updates(&since))
            .expect("import");
        let props = local.shape(&id).and_then(|s| s.as_class()).expect("class").properties();
        assert_eq!(props.title, "Renamed");
        assert_eq!(props.members, "field");

        local.focus(&id);
        let since = remote.doc().version();
        remote.focus(&id);
        remote.delete_selection().expect("delete");
        local
            .import_updates(&remote.doc().export_updates(&since))
            .expect("import");
        assert!(local.shapes().is_empty());
        assert!(local.selection().is_empty());
        assert_eq!(local.focused(), None);
    }

    #[test]
    fn test_remote_move_drags_anchored_end() {
        let mut local = board();
        let mut remote = board();
        let c1 = local.add_class(Point::new(0.0, 0.0), "Foo").expect("c1");
        let key1 = local.shape(&c1).expect("c1").key().to_string();
        let assoc = local
            .add_association(Point::new(120.0, 17.5), Point::new(300.0, 17.5), Some(Anchor::new(key1, 2.5)))
            .expect("assoc");
        remote
            .import_updates(&local.doc().export_snapshot())
            .expect("initial sync");
        assert_eq!(remote.shapes().len(), 2);

        let since = remote.doc().version();
        remote.focus(&c1);
        drag(&mut remote, Point::new(10.0, 10.0), Point::new(10.0, 110.0));
        local
            .import_updates(&remote.doc().export_updates(&since))
            .expect("import");

        assert_eq!(class_position(&local, &c1), Point::new(0.0, 100.0));
        assert_eq!(association_points(&local, &assoc)[0], Point::new(120.0, 117.5));
    }

    #[test]
    fn test_undo_redo_reconcile() {
        let mut board = board();
        let id = board.add_class(Point::new(0.0, 0.0), "A").expect("add");
        assert!(board.undo().expect("undo"));
        assert!(board.shape(&id).is_none());
        assert!(board.shapes().is_empty());

        assert!(board.redo().expect("redo"));
        assert_eq!(board.shapes().len(), 1);
    }

    #[test]
    fn test_remote_cursors() {
        let awareness = Rc::new(RefCell::new(InMemoryAwareness::new(1)));
        let shared = RecordingScene::shared();
        let mut board = Board::new(
            CrdtDocument::default(),
            Box::new(shared.clone()),
            Box::new(awareness.clone()),
            BoardConfig::default(),
        );
        board.pan(Vec2::new(20.0, 0.0));
        board.pointer_move(Point::new(120.0, 50.0)).expect("move");
        assert_eq!(
            awareness.borrow().local_state().cursor,
            Some(CursorPosition { x: 100.0, y: 50.0 })
        );

        let message = serde_json::to_string(&AwarenessMessage::Update {
            peer_id: 9,
            state: AwarenessState {
                cursor: Some(CursorPosition { x: 10.0, y: 10.0 }),
            },
        })
        .expect("serialize");
        awareness.borrow_mut().apply_remote(&message).expect("apply");
        board.sync_presence();
        assert_eq!(shared.borrow().nodes_on(Layer::Awareness).count(), 1);

        awareness.borrow_mut().remove_peer(9);
        board.process_changes();
        assert_eq!(shared.borrow().nodes_on(Layer::Awareness).count(), 0);
    }

    #[derive(Debug, Clone)]
    enum SelectionOp {
        Add(usize),
        Remove(usize),
        Focus(usize),
        Discard,
        SelectAll,
    }

    fn selection_op() -> impl Strategy<Value = SelectionOp> {
        prop_oneof![
            (0usize..4).prop_map(SelectionOp::Add),
            (0usize..4).prop_map(SelectionOp::Remove),
            (0usize..4).prop_map(SelectionOp::Focus),
            Just(SelectionOp::Discard),
            Just(SelectionOp::SelectAll),
        ]
    }

    proptest! {
        #[test]
        fn test_focus_invariant_holds(ops in proptest::collection::vec(selection_op(), 1..30)) {
            let mut board = board();
            let ids: Vec<ShapeId> = (0..4)
                .map(|i| board.add_class(Point::new(i as f64 * 200.0, 0.0), "C").expect("add"))
                .collect();
            for op in ops {
                match op {
                    SelectionOp::Add(i) => board.add_to_selection(&[ids[i].clone()]),
                    SelectionOp::Remove(i) => board.remove_from_selection(&[ids[i].clone()]),
                    SelectionOp::Focus(i) => board.focus(&ids[i]),
                    SelectionOp::Discard => board.discard_selection(),
                    SelectionOp::SelectAll => board.select_all(),
                }
                match board.selection() {
                    [only] => prop_assert_eq!(board.focused(), Some(only)),
                    _ => prop_assert_eq!(board.focused(), None),
                }
            }
        }
    }
}
