//! Camera module for pan/zoom transforms.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

use crate::config::BoardConfig;

/// Camera manages the view transform for the canvas.
///
/// Screen coordinates are raw pointer pixels; canvas coordinates are the
/// logical units every stored geometry uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    /// Current translation offset (pan), in screen pixels.
    pub offset: Vec2,
    /// Current scale.
    pub scale: f64,
    /// Minimum allowed scale.
    pub min_scale: f64,
    /// Maximum allowed scale.
    pub max_scale: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: 1.0,
            min_scale: 0.3,
            max_scale: 2.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a camera using the scale limits from `config`.
    pub fn from_config(config: &BoardConfig) -> Self {
        Self {
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            ..Self::default()
        }
    }

    /// Canvas-to-screen transform.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.scale)
    }

    /// Screen-to-canvas transform.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.scale) * Affine::translate(-self.offset)
    }

    /// Convert a screen point to logical canvas coordinates.
    pub fn to_canvas_coordinates(&self, screen_point: Point) -> Point {
        self.inverse_transform() * screen_point
    }

    /// Convert a logical canvas point to screen coordinates.
    pub fn from_canvas_coordinates(&self, canvas_point: Point) -> Point {
        self.transform() * canvas_point
    }

    /// Pan the camera by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Change the scale by `step`, keeping the canvas point under
    /// `screen_point` fixed. Returns whether the scale changed.
    pub fn zoom_at(&mut self, screen_point: Point, step: f64) -> bool {
        let new_scale = (((self.scale + step) * 1e6).round() / 1e6).clamp(self.min_scale, self.max_scale);
        if (new_scale - self.scale).abs() < f64::EPSILON {
            return false;
        }

        let canvas_point = self.to_canvas_coordinates(screen_point);
        self.scale = new_scale;

        // Adjust offset so canvas_point stays at screen_point
        let new_screen = self.from_canvas_coordinates(canvas_point);
        self.offset += screen_point - new_screen;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_camera() {
        let camera = Camera::new();
        assert_eq!(camera.offset, Vec2::ZERO);
        assert!((camera.scale - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_to_canvas_with_offset_and_scale() {
        let mut camera = Camera::new();
        camera.offset = Vec2::new(50.0, 100.0);
        camera.scale = 2.0;
        let canvas = camera.to_canvas_coordinates(Point::new(150.0, 300.0));
        assert!((canvas.x - 50.0).abs() < 1e-10);
        assert!((canvas.y - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_roundtrip_conversion() {
        let mut camera = Camera::new();
        camera.offset = Vec2::new(30.0, -20.0);
        camera.scale = 1.5;

        let original = Point::new(123.0, 456.0);
        let back = camera.from_canvas_coordinates(camera.to_canvas_coordinates(original));

        assert!((back.x - original.x).abs() < 1e-10);
        assert!((back.y - original.y).abs() < 1e-10);
    }

    #[test]
    fn test_zoom_keeps_cursor_point_fixed() {
        let mut camera = Camera::new();
        let cursor = Point::new(200.0, 120.0);
        let before = camera.to_canvas_coordinates(cursor);

        assert!(camera.zoom_at(cursor, 0.1));
        let after = camera.to_canvas_coordinates(cursor);

        assert!((camera.scale - 1.1).abs() < 1e-9);
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_clamp() {
        let mut camera = Camera::new();
        for _ in 0..30 {
            camera.zoom_at(Point::ZERO, 0.1);
        }
        assert!((camera.scale - 2.0).abs() < f64::EPSILON);
        assert!(!camera.zoom_at(Point::ZERO, 0.1));

        for _ in 0..30 {
            camera.zoom_at(Point::ZERO, -0.1);
        }
        assert!((camera.scale - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pan() {
        let mut camera = Camera::new();
        camera.pan(Vec2::new(10.0, 20.0));
        assert!((camera.offset.x - 10.0).abs() < f64::EPSILON);
        assert!((camera.offset.y - 20.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn test_zoom_stays_in_range(steps in proptest::collection::vec(prop_oneof![Just(0.1), Just(-0.1)], 0..60)) {
            let mut camera = Camera::new();
            for step in steps {
                camera.zoom_at(Point::new(400.0, 300.0), step);
                prop_assert!(camera.scale >= 0.3 && camera.scale <= 2.0);
            }
        }
    }
}
