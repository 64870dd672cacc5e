//! Class box shape.

use std::cell::Cell;
use std::collections::HashSet;

use kurbo::{Point, Rect, Size, Vec2};

use super::{AnchorSource, HitTarget, Properties, ShapeBase, ShapeContext, ShapeTrait};
use crate::error::Result;
use crate::geometry::Edge;
use crate::scene::{Layer, NodeId, Primitive, StrokeStyle, black, blue, white};
use crate::schema::{ClassRecord, ShapeId, ShapeRecord};

/// Distance of the perimeter handles from the box edge.
const HANDLE_OFFSET: f64 = 15.0;
const HANDLE_RADIUS: f64 = 6.0;
const MIN_WIDTH: f64 = 100.0;
const MIN_HEIGHT: f64 = 35.0;
const PADDING: f64 = 5.0;

/// Perimeter parameters of the west, north, east and south handles.
pub const HANDLE_POSITIONS: [f64; 4] = [0.5, 1.5, 2.5, 3.5];

/// Title and member blocks of a class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassProperties {
    pub title: String,
    pub members: String,
}

impl Properties for ClassProperties {
    /// Lines up to a `-` line (or one starting with `--`) form the title,
    /// the remaining lines the members.
    fn parse(raw: &str) -> Self {
        let mut title = Vec::new();
        let mut members = Vec::new();
        let mut in_members = false;
        for line in raw.split('\n') {
            if !in_members && (line == "-" || line.starts_with("--")) {
                in_members = true;
                continue;
            }
            if in_members {
                members.push(line);
            } else {
                title.push(line);
            }
        }
        Self {
            title: title.join("\n"),
            members: members.join("\n"),
        }
    }
}

impl ClassProperties {
    /// Serialize back into property text.
    pub fn to_text(&self) -> String {
        if self.members.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n-\n{}", self.title, self.members)
        }
    }
}

/// Point addressed by perimeter parameter `position` on `rect`.
///
/// `[0, 1)` runs down the west edge, `[1, 2)` right along the north edge,
/// `[2, 3)` down the east edge and `[3, 4)` right along the south edge.
pub fn perimeter_point(rect: Rect, position: f64) -> Point {
    let (w, h) = (rect.width(), rect.height());
    if position < 1.0 {
        Point::new(rect.x0, rect.y0 + h * position)
    } else if position < 2.0 {
        Point::new(rect.x0 + w * (position - 1.0), rect.y0)
    } else if position < 3.0 {
        Point::new(rect.x1, rect.y0 + h * (position - 2.0))
    } else {
        Point::new(rect.x0 + w * (position - 3.0), rect.y1)
    }
}

/// Perimeter parameter of `point` if it lies within `tolerance` of an edge.
///
/// Edges are tested west, north, east, south; corners belong to none.
fn perimeter_position(rect: Rect, point: Point, tolerance: f64) -> Option<f64> {
    let (w, h) = (rect.width(), rect.height());
    let near = |v: f64, edge: f64| v > edge - tolerance && v < edge + tolerance;
    let within_y = point.y > rect.y0 && point.y < rect.y1;
    let within_x = point.x > rect.x0 && point.x < rect.x1;
    if near(point.x, rect.x0) && within_y {
        Some((point.y - rect.y0) / h)
    } else if near(point.y, rect.y0) && within_x {
        Some(1.0 + (point.x - rect.x0) / w)
    } else if near(point.x, rect.x1) && within_y {
        Some(2.0 + (point.y - rect.y0) / h)
    } else if near(point.y, rect.y1) && within_x {
        Some(3.0 + (point.x - rect.x0) / w)
    } else {
        None
    }
}

fn handle_center(rect: Rect, position: f64) -> Point {
    let on_edge = perimeter_point(rect, position);
    let outward = match position.floor() as i64 {
        0 => Vec2::new(-HANDLE_OFFSET, 0.0),
        1 => Vec2::new(0.0, -HANDLE_OFFSET),
        2 => Vec2::new(HANDLE_OFFSET, 0.0),
        _ => Vec2::new(0.0, HANDLE_OFFSET),
    };
    on_edge + outward
}

/// Measured text blocks of a class.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Layout {
    title: Size,
    members: Size,
    size: Size,
}

/// A box whose size follows its title and member text.
#[derive(Debug)]
pub struct ClassShape {
    base: ShapeBase<ClassProperties>,
    record: ClassRecord,
    layout: Layout,
    bounds: Cell<Option<Rect>>,
    node: NodeId,
    handles: Vec<NodeId>,
    controls_hidden: bool,
    snap_tolerance: f64,
}

impl ClassShape {
    pub fn new(ctx: &mut ShapeContext, record: ClassRecord) -> Self {
        let node = ctx.scene.add_node(Layer::Canvas);
        let mut shape = Self {
            base: ShapeBase::new(ShapeRecord::Class(record.clone())),
            record,
            layout: Layout::default(),
            bounds: Cell::new(None),
            node,
            handles: Vec::new(),
            controls_hidden: false,
            snap_tolerance: ctx.config.snap_tolerance,
        };
        shape.base.refresh_properties();
        shape.relayout(ctx);
        shape.redraw(ctx);
        shape
    }

    pub fn properties(&self) -> std::rc::Rc<ClassProperties> {
        self.base.properties()
    }

    pub fn position(&self) -> Point {
        self.record.position()
    }

    pub fn size(&self) -> Size {
        self.layout.size
    }

    /// Handle centres while the handles are shown.
    pub fn visible_handles(&self) -> Vec<(f64, Point)> {
        if self.handles.is_empty() {
            return Vec::new();
        }
        let bounds = self.bounds();
        HANDLE_POSITIONS
            .iter()
            .map(|p| (*p, handle_center(bounds, *p)))
            .collect()
    }

    fn relayout(&mut self, ctx: &ShapeContext) {
        let props = self.base.properties();
        let font = ctx.config.font_size;
        let title = ctx.scene.measure_text(&props.title, font);
        let members = ctx.scene.measure_text(&props.members, font);
        let width = title.width.max(members.width).max(MIN_WIDTH) + 2.0 * 10.0;
        let mut height = 0.0;
        if !props.title.is_empty() {
            height += PADDING + title.height + PADDING;
        }
        if !props.members.is_empty() {
            height += PADDING + members.height + PADDING;
        }
        self.layout = Layout {
            title,
            members,
            size: Size::new(width, height.max(MIN_HEIGHT)),
        };
        self.bounds.set(None);
    }

    fn redraw(&mut self, ctx: &mut ShapeContext) {
        let props = self.base.properties();
        let bounds = self.bounds();
        let border = if self.base.selected { blue() } else { black() };
        let mut primitives = vec![Primitive::Rect {
            rect: bounds,
            fill: Some(white()),
            stroke: Some(StrokeStyle::solid(border, 1.0)),
        }];
        if !props.title.is_empty() {
            primitives.push(Primitive::Text {
                text: props.title.clone(),
                position: Point::new(bounds.x0 + bounds.width() / 2.0, bounds.y0 + PADDING),
                anchor: Vec2::new(0.5, 0.0),
                font_size: ctx.config.font_size,
                color: black(),
            });
        }
        if !props.members.is_empty() {
            let separator = bounds.y0 + self.layout.title.height + 2.0 * PADDING;
            primitives.push(Primitive::Line {
                from: Point::new(bounds.x0, separator),
                to: Point::new(bounds.x1, separator),
                stroke: StrokeStyle::solid(border, 1.0),
            });
            primitives.push(Primitive::Text {
                text: props.members.clone(),
                position: Point::new(bounds.x0 + 10.0, separator + PADDING),
                anchor: Vec2::ZERO,
                font_size: ctx.config.font_size,
                color: black(),
            });
        }
        ctx.scene.draw(self.node, primitives);
        self.draw_handles(ctx);
    }

    fn draw_handles(&mut self, ctx: &mut ShapeContext) {
        let visible = self.base.focused && !self.controls_hidden;
        if !visible {
            for node in self.handles.drain(..) {
                ctx.scene.remove_node(node);
            }
            return;
        }
        if self.handles.len() != HANDLE_POSITIONS.len() {
            self.handles = HANDLE_POSITIONS
                .iter()
                .map(|_| ctx.scene.add_node(Layer::Canvas))
                .collect();
        }
        let bounds = self.bounds();
        for (node, position) in self.handles.iter().zip(HANDLE_POSITIONS) {
            ctx.scene.draw(
                *node,
                vec![Primitive::Circle {
                    center: handle_center(bounds, position),
                    radius: HANDLE_RADIUS,
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

    /// Write a new position and queue the bounds-changed broadcast.
    fn move_to(&mut self, ctx: &mut ShapeContext, position: Point) -> Result<()> {
        let record = self.record.clone();
        ctx.doc.transact(|_| record.set_position(position))?;
        self.bounds.set(None);
        self.redraw(ctx);
        ctx.notify_bounds_changed(self.id());
        Ok(())
    }
}

impl ShapeTrait for ClassShape {
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
        let bounds = Rect::from_origin_size(self.record.position(), self.layout.size);
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
            log::trace!("Class {} properties changed", self.base.key);
            self.relayout(ctx);
        }
        self.bounds.set(None);
        self.redraw(ctx);
        if self.bounds() != before {
            ctx.notify_bounds_changed(self.id());
        }
    }

    fn align(&mut self, ctx: &mut ShapeContext, edge: Edge, value: f64) -> Result<bool> {
        let bounds = self.bounds();
        let target = bounds.origin() + edge.delta_to(bounds, value);
        if target == bounds.origin() {
            return Ok(false);
        }
        self.move_to(ctx, target)?;
        Ok(true)
    }

    fn start_interactive_move(&mut self, ctx: &mut ShapeContext, _selection: &HashSet<String>) {
        self.set_controls_hidden(ctx, true);
    }

    fn interactive_move(&mut self, ctx: &mut ShapeContext, delta: Vec2) -> Result<()> {
        let position = self.record.position() + delta;
        self.move_to(ctx, position)
    }

    fn end_interactive_move(&mut self, ctx: &mut ShapeContext) {
        self.set_controls_hidden(ctx, false);
    }

    fn get_anchor_point(&self, position: f64) -> Option<Point> {
        Some(perimeter_point(self.bounds(), position))
    }

    fn get_snap_position(&self, point: Point) -> Option<f64> {
        perimeter_position(self.bounds(), point, self.snap_tolerance)
    }

    fn hit_test_handles(&self, point: Point) -> Option<HitTarget> {
        self.visible_handles()
            .into_iter()
            .find(|(_, center)| center.distance(point) <= HANDLE_RADIUS)
            .map(|(position, _)| HitTarget::ClassHandle(position))
    }

    fn hit_test(&self, point: Point, _tolerance: f64) -> bool {
        self.bounds().contains(point)
    }

    fn on_shape_bounds_changed(&mut self, _ctx: &mut ShapeContext, _source: &AnchorSource) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, ctx: &mut ShapeContext) {
        for node in self.handles.drain(..) {
            ctx.scene.remove_node(node);
        }
        ctx.scene.remove_node(self.node);
    }
}
