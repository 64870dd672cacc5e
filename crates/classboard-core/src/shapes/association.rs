//! Association (connector) shape.

use std::cell::Cell;
use std::collections::HashSet;
use std::f64::consts::FRAC_PI_2;

use kurbo::{Affine, Point, Rect, Vec2};
use once_cell::sync::Lazy;
use peniko::Color;
use regex::Regex;

use super::{AnchorCandidate, AnchorSource, HitTarget, Properties, ShapeBase, ShapeContext, ShapeTrait};
use crate::error::{BoardError, Result};
use crate::geometry::{Edge, bounds_of_points, polyline_contains, snap_point_axes};
use crate::scene::{Layer, NodeId, Primitive, StrokeStyle, black, blue, white};
use crate::schema::{Anchor, AnchorEnd, AssociationRecord, ShapeId, ShapeRecord};

const POINT_HANDLE_RADIUS: f64 = 10.0;
const MIDPOINT_HANDLE_RADIUS: f64 = 8.0;
/// Tip of the arrowhead glyph, in glyph coordinates.
const ARROW_PIVOT: Vec2 = Vec2::new(10.0, 0.0);
const ARROW_WINGS: [Point; 2] = [Point::new(3.0, 10.0), Point::new(17.0, 10.0)];

static LINE_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"lt=(<{0,2})(-|\.{1,2})(>{0,2})").expect("valid line type pattern"));
static START_MULTIPLICITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"m1=(.+)").expect("valid multiplicity pattern"));
static END_MULTIPLICITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"m2=(.+)").expect("valid multiplicity pattern"));

/// Stroke pattern of the connector line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineType {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl LineType {
    fn parse(token: &str) -> Self {
        match token {
            "." => LineType::Dashed,
            ".." => LineType::Dotted,
            _ => LineType::Solid,
        }
    }

    /// Dash and gap lengths.
    pub fn dash(self) -> Option<[f64; 2]> {
        match self {
            LineType::Solid => None,
            LineType::Dashed => Some([6.0, 4.0]),
            LineType::Dotted => Some([2.0, 2.0]),
        }
    }
}

/// Glyph drawn at a connector end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Arrowhead {
    #[default]
    None,
    /// Open arrow (`>` or `<`).
    Arrow,
    /// Filled triangle (`>>` or `<<`).
    Triangle,
}

impl Arrowhead {
    fn parse(token: &str) -> Self {
        match token.len() {
            0 => Arrowhead::None,
            1 => Arrowhead::Arrow,
            _ => Arrowhead::Triangle,
        }
    }
}

/// Parsed association property text.
///
/// `lt=<end><line><start>` sets the line type and arrowheads; the `>` side
/// is the start arrowhead, the `<` side the end arrowhead. `m1=` and `m2=`
/// set the multiplicity labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationProperties {
    pub line_type: LineType,
    pub start_arrowhead: Arrowhead,
    pub end_arrowhead: Arrowhead,
    pub start_multiplicity: String,
    pub end_multiplicity: String,
}

impl Properties for AssociationProperties {
    fn parse(raw: &str) -> Self {
        let mut props = Self::default();
        if let Some(caps) = LINE_TYPE.captures(raw) {
            props.end_arrowhead = Arrowhead::parse(&caps[1]);
            props.line_type = LineType::parse(&caps[2]);
            props.start_arrowhead = Arrowhead::parse(&caps[3]);
        }
        if let Some(caps) = START_MULTIPLICITY.captures(raw) {
            props.start_multiplicity = caps[1].trim_end().to_string();
        }
        if let Some(caps) = END_MULTIPLICITY.captures(raw) {
            props.end_multiplicity = caps[1].trim_end().to_string();
        }
        props
    }
}

/// Text anchor and offset of a multiplicity label.
///
/// `angle` is the direction of the end segment pointing out of the line,
/// `side` the perimeter side (`floor` of the anchor parameter) the end is
/// bound to, if any.
pub fn multiplicity_placement(angle: f64, side: Option<i64>) -> (Vec2, Vec2) {
    let (anchor, offset) = if angle < -FRAC_PI_2 {
        if side == Some(3) { ((1.0, 0.0), (-5.0, 5.0)) } else { ((0.0, 1.0), (5.0, -5.0)) }
    } else if angle < 0.0 {
        if side == Some(3) { ((0.0, 0.0), (5.0, 5.0)) } else { ((1.0, 1.0), (-5.0, -5.0)) }
    } else if angle < FRAC_PI_2 {
        if side == Some(1) { ((0.0, 1.0), (5.0, -5.0)) } else { ((1.0, 0.0), (-5.0, 5.0)) }
    } else if side == Some(1) {
        ((1.0, 1.0), (-5.0, -5.0))
    } else {
        ((0.0, 0.0), (5.0, 5.0))
    };
    (Vec2::new(anchor.0, anchor.1), Vec2::new(offset.0, offset.1))
}

/// Glyph for `kind` with its tip on `tip`, rotated to face away from `toward`.
fn arrowhead_primitives(kind: Arrowhead, tip: Point, toward: Point, color: Color) -> Vec<Primitive> {
    let rotation = -(toward.x - tip.x).atan2(toward.y - tip.y);
    let transform = Affine::translate(tip.to_vec2()) * Affine::rotate(rotation) * Affine::translate(-ARROW_PIVOT);
    let [left, right] = ARROW_WINGS.map(|p| transform * p);
    match kind {
        Arrowhead::None => Vec::new(),
        Arrowhead::Arrow => vec![
            Primitive::Line {
                from: tip,
                to: left,
                stroke: StrokeStyle::solid(color, 1.0),
            },
            Primitive::Line {
                from: tip,
                to: right,
                stroke: StrokeStyle::solid(color, 1.0),
            },
        ],
        Arrowhead::Triangle => vec![Primitive::Polygon {
            points: vec![tip, left, right],
            fill: Some(white()),
            stroke: Some(StrokeStyle::solid(color, 1.0)),
        }],
    }
}

fn end_index(end: AnchorEnd, count: usize) -> usize {
    match end {
        AnchorEnd::Start => 0,
        AnchorEnd::End => count.saturating_sub(1),
    }
}

fn end_slot(end: AnchorEnd) -> usize {
    match end {
        AnchorEnd::Start => 0,
        AnchorEnd::End => 1,
    }
}

const ENDS: [AnchorEnd; 2] = [AnchorEnd::Start, AnchorEnd::End];

/// State of a single point drag, from press to release.
#[derive(Debug, Clone)]
pub struct PointDrag {
    pub index: usize,
    prev: Option<Point>,
    next: Option<Point>,
    restore_controls: bool,
}

/// A polyline connector whose ends may be glued to other shapes.
#[derive(Debug)]
pub struct AssociationShape {
    base: ShapeBase<AssociationProperties>,
    record: AssociationRecord,
    bounds: Cell<Option<Rect>>,
    node: NodeId,
    point_handles: Vec<NodeId>,
    midpoint_handles: Vec<NodeId>,
    controls_hidden: bool,
    /// Anchors kept but not followed while their target moves along.
    suppressed: [bool; 2],
    move_selection: Option<HashSet<String>>,
    snap_tolerance: f64,
    font_size: f64,
}

impl AssociationShape {
    pub fn new(ctx: &mut ShapeContext, record: AssociationRecord) -> Self {
        let node = ctx.scene.add_node(Layer::Canvas);
        let mut shape = Self {
            base: ShapeBase::new(ShapeRecord::Association(record.clone())),
            record,
            bounds: Cell::new(None),
            node,
            point_handles: Vec::new(),
            midpoint_handles: Vec::new(),
            controls_hidden: false,
            suppressed: [false; 2],
            move_selection: None,
            snap_tolerance: ctx.config.snap_tolerance,
            font_size: ctx.config.font_size,
        };
        shape.redraw(ctx);
        shape
    }

    pub fn properties(&self) -> std::rc::Rc<AssociationProperties> {
        self.base.properties()
    }

    pub fn points(&self) -> Vec<Point> {
        self.record.points()
    }

    pub fn anchor(&self, end: AnchorEnd) -> Option<Anchor> {
        self.record.anchor(end)
    }

    pub fn is_suppressed(&self, end: AnchorEnd) -> bool {
        self.suppressed[end_slot(end)]
    }

    fn controls_visible(&self) -> bool {
        self.base.focused && !self.controls_hidden
    }

    /// Centres of the point handles and midpoint handles while shown.
    pub fn visible_handles(&self) -> (Vec<Point>, Vec<Point>) {
        if !self.controls_visible() {
            return (Vec::new(), Vec::new());
        }
        let points = self.points();
        let midpoints = points.windows(2).map(|w| w[0].midpoint(w[1])).collect();
        (points, midpoints)
    }

    fn redraw(&mut self, ctx: &mut ShapeContext) {
        let points = self.points();
        let mut primitives = Vec::new();
        if let (Some(&first), Some(&second), Some(&last), Some(&before_last)) = (
            points.first(),
            points.get(1),
            points.last(),
            points.len().checked_sub(2).and_then(|i| points.get(i)),
        ) {
            let props = self.base.properties();
            let color = if self.base.selected { blue() } else { black() };
            primitives.push(Primitive::Polyline {
                points: points.clone(),
                stroke: StrokeStyle::solid(color, 1.0).with_dash(props.line_type.dash()),
            });
            primitives.extend(arrowhead_primitives(props.start_arrowhead, last, before_last, color));
            primitives.extend(arrowhead_primitives(props.end_arrowhead, first, second, color));

            let labels = [
                (&props.start_multiplicity, first, first - second, AnchorEnd::Start),
                (&props.end_multiplicity, last, last - before_last, AnchorEnd::End),
            ];
            for (text, at, direction, end) in labels {
                if text.is_empty() {
                    continue;
                }
                let side = self.anchor(end).map(|a| a.position.floor() as i64);
                let (anchor, offset) = multiplicity_placement(direction.atan2(), side);
                primitives.push(Primitive::Text {
                    text: text.clone(),
                    position: at + offset,
                    anchor,
                    font_size: self.font_size,
                    color,
                });
            }
        }
        ctx.scene.draw(self.node, primitives);
        self.draw_handles(ctx);
    }

    /// Keep one handle node per point and per segment while visible.
    fn draw_handles(&mut self, ctx: &mut ShapeContext) {
        let (points, midpoints) = self.visible_handles();
        if self.point_handles.len() != points.len() {
            for node in self.point_handles.drain(..) {
                ctx.scene.remove_node(node);
            }
            self.point_handles = points.iter().map(|_| ctx.scene.add_node(Layer::Canvas)).collect();
        }
        if self.midpoint_handles.len() != midpoints.len() {
            for node in self.midpoint_handles.drain(..) {
                ctx.scene.remove_node(node);
            }
            self.midpoint_handles = midpoints.iter().map(|_| ctx.scene.add_node(Layer::Canvas)).collect();
        }
        for (node, center) in self.point_handles.iter().zip(&points) {
            ctx.scene.draw(
                *node,
                vec![Primitive::Circle {
                    center: *center,
                    radius: POINT_HANDLE_RADIUS,
                    fill: None,
                    stroke: Some(StrokeStyle::solid(blue(), 1.0)),
                }],
            );
        }
        for (node, center) in self.midpoint_handles.iter().zip(&midpoints) {
            ctx.scene.draw(
                *node,
                vec![Primitive::Circle {
                    center: *center,
                    radius: MIDPOINT_HANDLE_RADIUS,
                    fill: Some(blue()),
                    stroke: None,
                }],
            );
        }
    }

    fn set_controls_hidden(&mut self, ctx: &mut ShapeContext, hidden: bool) {
        self.controls_hidden = hidden;
        self.draw_handles(ctx);
    }

    /// Redraw after a geometry write and queue the bounds broadcast.
    fn geometry_changed(&mut self, ctx: &mut ShapeContext) {
        self.bounds.set(None);
        self.redraw(ctx);
        ctx.notify_bounds_changed(self.id());
    }

    /// Insert a point at `index`.
    pub fn insert_point(&mut self, ctx: &mut ShapeContext, index: usize, point: Point) -> Result<()> {
        let record = self.record.clone();
        ctx.doc.transact(|_| record.insert_point(index, point))?;
        self.geometry_changed(ctx);
        Ok(())
    }

    /// Delete an interior point. Endpoints are never deleted.
    pub fn delete_point(&mut self, ctx: &mut ShapeContext, index: usize) -> Result<bool> {
        let count = self.record.point_count();
        if index == 0 || index + 1 >= count {
            return Ok(false);
        }
        let record = self.record.clone();
        ctx.doc.transact(|_| record.delete_point(index))?;
        self.geometry_changed(ctx);
        Ok(true)
    }

    /// Where endpoint `index` goes for a pointer at `pointer`, and the anchor
    /// it ends up bound to.
    ///
    /// Fails for interior points, which cannot carry anchors.
    pub fn snap_point_to_anchor(
        &self,
        index: usize,
        pointer: Point,
        candidate: Option<&AnchorCandidate>,
    ) -> Result<(Point, Option<Anchor>)> {
        let count = self.record.point_count();
        if index != 0 && index + 1 != count {
            return Err(BoardError::NotAnEndpoint { index });
        }
        Ok(match candidate {
            Some(candidate) => (candidate.point, Some(candidate.anchor.clone())),
            None => (pointer, None),
        })
    }

    fn end_of(&self, index: usize) -> Option<AnchorEnd> {
        let count = self.record.point_count();
        if index == 0 {
            Some(AnchorEnd::Start)
        } else if index + 1 == count {
            Some(AnchorEnd::End)
        } else {
            None
        }
    }

    /// Start dragging point `index`; hides the handles until the drag ends.
    pub fn begin_point_drag(&mut self, ctx: &mut ShapeContext, index: usize) -> PointDrag {
        let points = self.points();
        let drag = PointDrag {
            index,
            prev: index.checked_sub(1).and_then(|i| points.get(i)).copied(),
            next: points.get(index + 1).copied(),
            restore_controls: self.controls_visible(),
        };
        self.set_controls_hidden(ctx, true);
        drag
    }

    /// Move the dragged point toward `pointer`.
    ///
    /// Endpoints bind to `candidate` when there is one and lose their anchor
    /// otherwise. Every point that ends up unanchored, interior or endpoint,
    /// snaps to its neighbours axis by axis; an anchored endpoint sits
    /// exactly on the anchor point.
    pub fn drag_point(
        &mut self,
        ctx: &mut ShapeContext,
        drag: &PointDrag,
        pointer: Point,
        candidate: Option<&AnchorCandidate>,
    ) -> Result<()> {
        if drag.index >= self.record.point_count() {
            return Ok(());
        }
        let end = self.end_of(drag.index);
        let (mut target, anchor) = match end {
            Some(_) => self.snap_point_to_anchor(drag.index, pointer, candidate)?,
            None => (pointer, None),
        };
        if anchor.is_none() {
            for neighbour in [drag.prev, drag.next].into_iter().flatten() {
                target = snap_point_axes(target, neighbour, self.snap_tolerance);
            }
        }
        let record = self.record.clone();
        ctx.doc.transact(|_| {
            if let Some(end) = end {
                record.set_anchor(end, anchor.as_ref())?;
            }
            record.set_point(drag.index, target)
        })?;
        self.geometry_changed(ctx);
        Ok(())
    }

    pub fn end_point_drag(&mut self, ctx: &mut ShapeContext, drag: PointDrag) {
        if drag.restore_controls {
            self.set_controls_hidden(ctx, false);
        }
    }
}

impl ShapeTrait for AssociationShape {
    fn id(&self) -> ShapeId {
        self.record.id()
    }

    fn key(&self) -> &str {
        &self.base.key
    }

    fn record(&self) -> &ShapeRecord {
        &self.base.record
    }

    fn bounds(&self) -> Rect {
        if let Some(bounds) = self.bounds.get() {
            return bounds;
        }
        let bounds = bounds_of_points(&self.points()).unwrap_or(Rect::ZERO);
        self.bounds.set(Some(bounds));
        bounds
    }

    fn is_selected(&self) -> bool {
        self.base.selected
    }

    fn is_focused(&self) -> bool {
        self.base.focused
    }

    fn select(&mut self, ctx: &mut ShapeContext) {
        self.base.selected = true;
        self.redraw(ctx);
    }

    fn deselect(&mut self, ctx: &mut ShapeContext) {
        self.base.selected = false;
        self.redraw(ctx);
    }

    fn focus(&mut self, ctx: &mut ShapeContext) {
        self.base.focused = true;
        self.draw_handles(ctx);
    }

    fn blur(&mut self, ctx: &mut ShapeContext) {
        self.base.focused = false;
        self.draw_handles(ctx);
    }

    fn update(&mut self, ctx: &mut ShapeContext) {
        let before = self.bounds();
        if self.base.refresh_properties() {
            log::trace!("Association {} properties changed", self.base.key);
        }
        self.bounds.set(None);
        self.redraw(ctx);
        if self.bounds() != before {
            ctx.notify_bounds_changed(self.id());
        }
    }

    fn align(&mut self, ctx: &mut ShapeContext, edge: Edge, value: f64) -> Result<bool> {
        if self.record.anchor1().is_some() || self.record.anchor2().is_some() {
            return Ok(false);
        }
        let delta = edge.delta_to(self.bounds(), value);
        if delta == Vec2::ZERO {
            return Ok(false);
        }
        let record = self.record.clone();
        ctx.doc.transact(|_| record.translate(delta))?;
        self.geometry_changed(ctx);
        Ok(true)
    }

    fn start_interactive_move(&mut self, ctx: &mut ShapeContext, selection: &HashSet<String>) {
        self.set_controls_hidden(ctx, true);
        for end in ENDS {
            self.suppressed[end_slot(end)] = self
                .record
                .anchor(end)
                .is_some_and(|a| selection.contains(&a.key));
        }
        self.move_selection = Some(selection.clone());
    }

    fn interactive_move(&mut self, ctx: &mut ShapeContext, delta: Vec2) -> Result<()> {
        let mut detach = Vec::new();
        for end in ENDS {
            let Some(anchor) = self.record.anchor(end) else {
                continue;
            };
            let in_selection = self
                .move_selection
                .as_ref()
                .is_some_and(|s| s.contains(&anchor.key));
            self.suppressed[end_slot(end)] = in_selection;
            if !in_selection {
                detach.push(end);
            }
        }
        let record = self.record.clone();
        ctx.doc.transact(|_| {
            for end in &detach {
                record.set_anchor(*end, None)?;
            }
            record.translate(delta)
        })?;
        self.geometry_changed(ctx);
        Ok(())
    }

    fn end_interactive_move(&mut self, ctx: &mut ShapeContext) {
        self.suppressed = [false; 2];
        self.move_selection = None;
        self.set_controls_hidden(ctx, false);
    }

    fn get_anchor_point(&self, _position: f64) -> Option<Point> {
        None
    }

    fn get_snap_position(&self, _point: Point) -> Option<f64> {
        None
    }

    fn hit_test_handles(&self, point: Point) -> Option<HitTarget> {
        let (points, midpoints) = self.visible_handles();
        if let Some(i) = points.iter().position(|p| p.distance(point) <= POINT_HANDLE_RADIUS) {
            return Some(HitTarget::PointHandle(i));
        }
        midpoints
            .iter()
            .position(|p| p.distance(point) <= MIDPOINT_HANDLE_RADIUS)
            .map(|i| HitTarget::MidpointHandle(i + 1))
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        polyline_contains(&self.points(), point, tolerance)
    }

    fn on_shape_bounds_changed(&mut self, ctx: &mut ShapeContext, source: &AnchorSource) -> Result<()> {
        if source.id == self.id() {
            return Ok(());
        }
        let points = self.points();
        let mut moves = Vec::new();
        for end in ENDS {
            if self.suppressed[end_slot(end)] {
                continue;
            }
            let Some(anchor) = self.record.anchor(end) else {
                continue;
            };
            if anchor.key != source.key {
                continue;
            }
            let index = end_index(end, points.len());
            if let Some(target) = source.anchor_point(anchor.position) {
                if points.get(index) != Some(&target) {
                    moves.push((index, target));
                }
            }
        }
        if moves.is_empty() {
            return Ok(());
        }
        log::trace!("Association {} follows {}", self.base.key, source.key);
        let record = self.record.clone();
        ctx.doc.transact(|_| {
            moves
                .iter()
                .try_for_each(|(index, target)| record.set_point(*index, *target))
        })?;
        self.geometry_changed(ctx);
        Ok(())
    }

    fn remove(&mut self, ctx: &mut ShapeContext) {
        for node in self.point_handles.drain(..).chain(self.midpoint_handles.drain(..)) {
            ctx.scene.remove_node(node);
        }
        ctx.scene.remove_node(self.node);
    }
}
