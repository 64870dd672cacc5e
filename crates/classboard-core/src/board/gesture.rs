//! Pointer gesture tracking.
//!
//! One gesture at a time. A press installs a [`GestureHandler`] in the
//! tracker slot; moves are fanned out to it; the matching release tears it
//! down whether or not the pointer is still over the canvas.

use kurbo::{Point, Rect, Vec2};
use peniko::Color;

use super::Board;
use crate::error::Result;
use crate::input::MouseButton;
use crate::scene::{Layer, NodeId, Primitive, StrokeStyle, blue};
use crate::schema::ShapeId;
use crate::shapes::PointDrag;

/// Callbacks of a tracked gesture. Every callback is optional.
pub(crate) trait GestureHandler: std::fmt::Debug {
    /// First move after the press.
    fn move_begin(&mut self, _board: &mut Board) -> Result<()> {
        Ok(())
    }

    /// Move delta in logical canvas units.
    fn canvas_relative_move(&mut self, _board: &mut Board, _delta: Vec2) -> Result<()> {
        Ok(())
    }

    /// Move delta in screen pixels.
    fn screen_relative_move(&mut self, _board: &mut Board, _delta: Vec2) -> Result<()> {
        Ok(())
    }

    /// Absolute pointer position.
    fn move_to(&mut self, _board: &mut Board, _screen: Point, _canvas: Point) -> Result<()> {
        Ok(())
    }

    /// Release. Called exactly once.
    fn move_end(&mut self, _board: &mut Board, _screen: Point) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct ActiveGesture {
    button: MouseButton,
    last: Point,
    moved: bool,
    handler: Box<dyn GestureHandler>,
}

/// The single active-tracker slot.
#[derive(Debug, Default)]
pub(crate) enum Tracker {
    #[default]
    Idle,
    Tracking(ActiveGesture),
}

impl Board {
    pub(crate) fn is_tracking(&self) -> bool {
        matches!(self.tracker, Tracker::Tracking(_))
    }

    pub(crate) fn track_pointer(&mut self, button: MouseButton, screen: Point, handler: Box<dyn GestureHandler>) {
        log::trace!("Tracking {handler:?} with {button:?}");
        self.tracker = Tracker::Tracking(ActiveGesture {
            button,
            last: screen,
            moved: false,
            handler,
        });
    }

    pub(crate) fn track_move(&mut self, screen: Point) -> Result<()> {
        let Tracker::Tracking(mut gesture) = std::mem::take(&mut self.tracker) else {
            return Ok(());
        };
        let result = self.dispatch_move(&mut gesture, screen);
        gesture.last = screen;
        self.tracker = Tracker::Tracking(gesture);
        result
    }

    fn dispatch_move(&mut self, gesture: &mut ActiveGesture, screen: Point) -> Result<()> {
        if !gesture.moved {
            gesture.moved = true;
            gesture.handler.move_begin(self)?;
        }
        let delta = screen - gesture.last;
        gesture.handler.canvas_relative_move(self, delta / self.camera.scale)?;
        gesture.handler.screen_relative_move(self, delta)?;
        let canvas = self.to_canvas_coordinates(screen);
        gesture.handler.move_to(self, screen, canvas)
    }

    /// End the active gesture if `button` started it.
    pub(crate) fn track_release(&mut self, screen: Point, button: MouseButton) -> Result<()> {
        match std::mem::take(&mut self.tracker) {
            Tracker::Tracking(mut gesture) if gesture.button == button => {
                log::trace!("Gesture {:?} ended", gesture.handler);
                gesture.handler.move_end(self, screen)
            }
            other => {
                self.tracker = other;
                Ok(())
            }
        }
    }
}

/// Primary press on empty canvas: drag out a selection rectangle.
#[derive(Debug)]
pub(crate) struct RubberBandSelect {
    origin: Point,
    node: Option<NodeId>,
}

impl RubberBandSelect {
    pub(crate) fn new(origin: Point) -> Self {
        Self { origin, node: None }
    }
}

impl GestureHandler for RubberBandSelect {
    fn move_begin(&mut self, board: &mut Board) -> Result<()> {
        self.node = Some(board.ctx.scene.add_node(Layer::Selection));
        Ok(())
    }

    fn move_to(&mut self, board: &mut Board, screen: Point, _canvas: Point) -> Result<()> {
        if let Some(node) = self.node {
            board.ctx.scene.draw(
                node,
                vec![Primitive::Rect {
                    rect: Rect::from_points(self.origin, screen),
                    fill: Some(Color::from_rgba8(0, 0, 255, 32)),
                    stroke: Some(StrokeStyle::solid(blue(), 1.0)),
                }],
            );
        }
        Ok(())
    }

    fn move_end(&mut self, board: &mut Board, screen: Point) -> Result<()> {
        let Some(node) = self.node.take() else {
            return Ok(());
        };
        board.ctx.scene.remove_node(node);
        let area = Rect::from_points(
            board.to_canvas_coordinates(self.origin),
            board.to_canvas_coordinates(screen),
        );
        let hits = board.shapes_in_rect(area);
        board.add_to_selection(&hits);
        Ok(())
    }
}

/// Primary press on a shape: move the whole selection.
#[derive(Debug)]
pub(crate) struct MoveSelection {
    shapes: Vec<ShapeId>,
}

impl MoveSelection {
    pub(crate) fn new(shapes: Vec<ShapeId>) -> Self {
        Self { shapes }
    }
}

impl GestureHandler for MoveSelection {
    fn move_begin(&mut self, board: &mut Board) -> Result<()> {
        board.start_interactive_move(&self.shapes);
        Ok(())
    }

    fn canvas_relative_move(&mut self, board: &mut Board, delta: Vec2) -> Result<()> {
        board.interactive_move(&self.shapes, delta)
    }

    fn move_end(&mut self, board: &mut Board, _screen: Point) -> Result<()> {
        if !self.shapes.is_empty() {
            board.end_interactive_move(&self.shapes);
        }
        Ok(())
    }
}

/// Secondary press: pan the canvas in screen space.
#[derive(Debug, Default)]
pub(crate) struct PanCanvas;

impl GestureHandler for PanCanvas {
    fn screen_relative_move(&mut self, board: &mut Board, delta: Vec2) -> Result<()> {
        board.pan(delta);
        Ok(())
    }
}

/// Press on an association point handle: drag that point.
#[derive(Debug)]
pub(crate) struct PointHandleDrag {
    shape: ShapeId,
    drag: Option<PointDrag>,
}

impl PointHandleDrag {
    pub(crate) fn new(shape: ShapeId, drag: PointDrag) -> Self {
        Self {
            shape,
            drag: Some(drag),
        }
    }
}

impl GestureHandler for PointHandleDrag {
    fn move_to(&mut self, board: &mut Board, _screen: Point, canvas: Point) -> Result<()> {
        match &self.drag {
            Some(drag) => board.drag_point(&self.shape, drag, canvas),
            None => Ok(()),
        }
    }

    fn move_end(&mut self, board: &mut Board, _screen: Point) -> Result<()> {
        if let Some(drag) = self.drag.take() {
            board.end_point_drag(&self.shape, drag);
        }
        Ok(())
    }
}
