use glam::{Affine2, Vec2, Vec3};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    /// World position; `z` is the light height above the plane.
    pub position: Vec3,
    pub color: [f32; 3],
    pub intensity: f32,
    pub radius: f32,
    pub scroll_factor: Vec2,
}

impl PointLight {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self {
            position: Vec3::new(x, y, 100.0),
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            radius,
            scroll_factor: Vec2::ONE,
        }
    }
}

/// Lights visible to a camera.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LightEnvironment {
    pub ambient: [f32; 3],
    pub lights: Vec<PointLight>,
}

/// A 2D camera viewing a rectangle of the world.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera2D {
    /// Viewport placement in the drawing context.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub scroll: Vec2,
    pub zoom: f32,
    pub rotation: f32,
    pub alpha: f32,
    pub round_pixels: bool,
    pub lights: Option<Rc<LightEnvironment>>,
}

impl Camera2D {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            scroll: Vec2::ZERO,
            zoom: 1.0,
            rotation: 0.0,
            alpha: 1.0,
            round_pixels: false,
            lights: None,
        }
    }

    /// Viewport transform: zoom and rotation about the viewport center.
    pub fn matrix(&self) -> Affine2 {
        let half = Vec2::new(self.width, self.height) * 0.5;
        Affine2::from_translation(Vec2::new(self.x, self.y) + half)
            * Affine2::from_angle(self.rotation)
            * Affine2::from_scale(Vec2::splat(self.zoom))
            * Affine2::from_translation(-half)
    }

    /// View matrix for an object with the given scroll factor.
    pub fn view_matrix(&self, scroll_factor: Vec2) -> Affine2 {
        self.matrix() * Affine2::from_translation(-self.scroll * scroll_factor)
    }
}

impl Default for Camera2D {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unzoomed_camera_only_scrolls() {
        let mut cam = Camera2D::new(800.0, 600.0);
        cam.scroll = Vec2::new(100.0, 50.0);
        let p = cam
            .view_matrix(Vec2::ONE)
            .transform_point2(Vec2::new(150.0, 60.0));
        assert!(p.abs_diff_eq(Vec2::new(50.0, 10.0), 1e-4));
    }

    #[test]
    fn zoom_keeps_center_fixed() {
        let mut cam = Camera2D::new(800.0, 600.0);
        cam.zoom = 2.0;
        let p = cam.matrix().transform_point2(Vec2::new(400.0, 300.0));
        assert!(p.abs_diff_eq(Vec2::new(400.0, 300.0), 1e-4));
    }

    #[test]
    fn zero_scroll_factor_pins_to_screen() {
        let mut cam = Camera2D::new(800.0, 600.0);
        cam.scroll = Vec2::new(100.0, 50.0);
        let p = cam.view_matrix(Vec2::ZERO).transform_point2(Vec2::new(5.0, 5.0));
        assert!(p.abs_diff_eq(Vec2::new(5.0, 5.0), 1e-4));
    }
}
