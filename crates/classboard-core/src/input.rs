//! Pointer input types.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    /// Select and move.
    Primary,
    /// Pan the canvas.
    Secondary,
    Middle,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const CTRL: Self = Self {
        shift: false,
        ctrl: true,
        alt: false,
        meta: false,
    };

    /// Whether a press with these modifiers toggles selection membership
    /// instead of replacing the selection.
    pub fn toggles_selection(self) -> bool {
        self.ctrl || self.meta
    }
}

/// Pointer event in screen coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PointerEvent {
    Down {
        position: Point,
        button: MouseButton,
        modifiers: Modifiers,
    },
    /// Release, wherever the pointer is. Also used for release outside the
    /// canvas, which ends the active gesture the same way.
    Up {
        position: Point,
        button: MouseButton,
    },
    Move {
        position: Point,
    },
    DoubleClick {
        position: Point,
    },
    /// Wheel with vertical delta; negative zooms in.
    Wheel {
        position: Point,
        delta_y: f64,
    },
}
