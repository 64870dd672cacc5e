//! Render layer interface.
//!
//! The engine never rasterizes. Shapes and the board describe what each node
//! looks like as a list of [`Primitive`]s and hand it to a [`Scene`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use kurbo::{Point, Rect, Size, Vec2};
use peniko::Color;

/// Display layer a node lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Logical canvas content, transformed by pan and zoom.
    Canvas,
    /// Screen-space selection feedback (rubber band).
    Selection,
    /// Screen-space remote cursors.
    Awareness,
}

/// Handle to a node added to a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// How a line is stroked.
#[derive(Debug, Clone, Copy)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f64,
    /// Dash and gap lengths, `None` for a solid line.
    pub dash: Option<[f64; 2]>,
}

impl StrokeStyle {
    pub fn solid(color: Color, width: f64) -> Self {
        Self {
            color,
            width,
            dash: None,
        }
    }

    pub fn with_dash(mut self, dash: Option<[f64; 2]>) -> Self {
        self.dash = dash;
        self
    }
}

/// A drawing command.
#[derive(Debug, Clone)]
pub enum Primitive {
    Rect {
        rect: Rect,
        fill: Option<Color>,
        stroke: Option<StrokeStyle>,
    },
    Polyline {
        points: Vec<Point>,
        stroke: StrokeStyle,
    },
    Line {
        from: Point,
        to: Point,
        stroke: StrokeStyle,
    },
    Circle {
        center: Point,
        radius: f64,
        fill: Option<Color>,
        stroke: Option<StrokeStyle>,
    },
    Polygon {
        points: Vec<Point>,
        fill: Option<Color>,
        stroke: Option<StrokeStyle>,
    },
    /// Text placed so that `anchor` (normalised, `(0, 0)` top-left to
    /// `(1, 1)` bottom-right of the text box) sits on `position`.
    Text {
        text: String,
        position: Point,
        anchor: Vec2,
        font_size: f64,
        color: Color,
    },
}

pub fn black() -> Color {
    Color::from_rgba8(0, 0, 0, 255)
}

pub fn white() -> Color {
    Color::from_rgba8(255, 255, 255, 255)
}

pub fn blue() -> Color {
    Color::from_rgba8(0, 0, 255, 255)
}

/// Backend that owns the display hierarchy.
pub trait Scene {
    /// Add an empty node on `layer`.
    fn add_node(&mut self, layer: Layer) -> NodeId;
    /// Remove a node. Unknown nodes are ignored.
    fn remove_node(&mut self, node: NodeId);
    /// Replace the contents of a node.
    fn draw(&mut self, node: NodeId, primitives: Vec<Primitive>);
    /// Transform applied to the [`Layer::Canvas`] layer.
    fn set_canvas_transform(&mut self, offset: Vec2, scale: f64);
    /// Size of `text` rendered at `font_size`.
    fn measure_text(&self, text: &str, font_size: f64) -> Size;
}

impl<S: Scene> Scene for Rc<RefCell<S>> {
    fn add_node(&mut self, layer: Layer) -> NodeId {
        self.borrow_mut().add_node(layer)
    }

    fn remove_node(&mut self, node: NodeId) {
        self.borrow_mut().remove_node(node)
    }

    fn draw(&mut self, node: NodeId, primitives: Vec<Primitive>) {
        self.borrow_mut().draw(node, primitives)
    }

    fn set_canvas_transform(&mut self, offset: Vec2, scale: f64) {
        self.borrow_mut().set_canvas_transform(offset, scale)
    }

    fn measure_text(&self, text: &str, font_size: f64) -> Size {
        self.borrow().measure_text(text, font_size)
    }
}

/// A node held by [`RecordingScene`].
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub layer: Layer,
    pub primitives: Vec<Primitive>,
}

/// Retained in-memory scene.
///
/// Text is measured with a fixed advance of `0.6 * font_size` per character
/// and a line height of `1.2 * font_size`.
#[derive(Debug)]
pub struct RecordingScene {
    nodes: BTreeMap<NodeId, SceneNode>,
    next_id: u64,
    offset: Vec2,
    scale: f64,
}

impl Default for RecordingScene {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 0,
            offset: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scene behind a shared handle, so a host can keep inspecting it
    /// after handing a clone to a board.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes on `layer` in creation order.
    pub fn nodes_on(&self, layer: Layer) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes
            .iter()
            .filter(move |(_, node)| node.layer == layer)
            .map(|(id, node)| (*id, node))
    }

    /// Every primitive drawn on `layer`.
    pub fn primitives_on(&self, layer: Layer) -> Vec<&Primitive> {
        self.nodes_on(layer)
            .flat_map(|(_, node)| node.primitives.iter())
            .collect()
    }

    /// Every string drawn on the canvas layer.
    pub fn canvas_texts(&self) -> Vec<String> {
        self.primitives_on(Layer::Canvas)
            .into_iter()
            .filter_map(|p| match p {
                Primitive::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn canvas_transform(&self) -> (Vec2, f64) {
        (self.offset, self.scale)
    }
}

impl Scene for RecordingScene {
    fn add_node(&mut self, layer: Layer) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            SceneNode {
                layer,
                primitives: Vec::new(),
            },
        );
        id
    }

    fn remove_node(&mut self, node: NodeId) {
        self.nodes.remove(&node);
    }

    fn draw(&mut self, node: NodeId, primitives: Vec<Primitive>) {
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.primitives = primitives;
        }
    }

    fn set_canvas_transform(&mut self, offset: Vec2, scale: f64) {
        self.offset = offset;
        self.scale = scale;
    }

    fn measure_text(&self, text: &str, font_size: f64) -> Size {
        if text.is_empty() {
            return Size::ZERO;
        }
        let lines = text.split('\n');
        let (count, longest) = lines.fold((0usize, 0usize), |(count, longest), line| {
            (count + 1, longest.max(line.chars().count()))
        });
        Size::new(
            longest as f64 * font_size * 0.6,
            count as f64 * font_size * 1.2,
        )
    }
}
