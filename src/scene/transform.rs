use glam::{Affine2, Vec2};

/// Position, rotation and scale of a 2D game object, plus the pieces of
/// placement state the transformer nodes read (origin, scroll factor, flip).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform2D {
    pub position: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
    /// Normalized pivot inside the frame, (0.5, 0.5) is the center.
    pub origin: Vec2,
    pub scroll_factor: Vec2,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
            origin: Vec2::splat(0.5),
            scroll_factor: Vec2::ONE,
            flip_x: false,
            flip_y: false,
        }
    }
}

impl Transform2D {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            ..Self::default()
        }
    }

    /// Scale with the flip applied as a sign.
    pub fn signed_scale(&self) -> Vec2 {
        Vec2::new(
            if self.flip_x { -self.scale.x } else { self.scale.x },
            if self.flip_y { -self.scale.y } else { self.scale.y },
        )
    }

    pub fn matrix(&self) -> Affine2 {
        Affine2::from_scale_angle_translation(self.signed_scale(), self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matrix_is_identity() {
        let m = Transform2D::default().matrix();
        assert!(m.abs_diff_eq(Affine2::IDENTITY, 1e-6));
    }

    #[test]
    fn flip_mirrors_around_position() {
        let t = Transform2D {
            flip_x: true,
            ..Transform2D::at(10.0, 0.0)
        };
        let p = t.matrix().transform_point2(Vec2::new(4.0, 1.0));
        assert!(p.abs_diff_eq(Vec2::new(6.0, 1.0), 1e-6));
    }
}
