// renderer/filters/effects.rs
use super::shader::FilterShader;
use super::{BlurQuality, FilterController};
use crate::renderer::commands::{ProgramKey, TextureId, UniformValue};
use crate::renderer::context::DrawingContext;
use smallvec::{smallvec, SmallVec};

type Uniforms = Vec<(&'static str, UniformValue)>;

fn mismatch(shader: &str, controller: &FilterController) -> Uniforms {
    log::warn!("{} given a {:?} controller, drawing with defaults", shader, controller.node_key());
    Vec::new()
}

fn flag(value: bool) -> UniformValue {
    UniformValue::Int(i32::from(value))
}

/// Draws the input unchanged, optionally into a padded target.
#[derive(Debug, Default)]
pub struct CopyShader;

impl FilterShader for CopyShader {
    fn name(&self) -> &'static str {
        "FilterCopy"
    }

    fn program(&self, _controller: &FilterController) -> ProgramKey {
        ProgramKey::new("filter_copy")
    }
}

/// One directional gaussian pass.
#[derive(Debug)]
pub struct BlurPassShader {
    quality: BlurQuality,
}

impl BlurPassShader {
    pub fn new(quality: BlurQuality) -> Self {
        Self { quality }
    }
}

impl FilterShader for BlurPassShader {
    fn name(&self) -> &'static str {
        match self.quality {
            BlurQuality::Low => "FilterBlurLow",
            BlurQuality::Medium => "FilterBlurMed",
            BlurQuality::High => "FilterBlurHigh",
        }
    }

    fn program(&self, _controller: &FilterController) -> ProgramKey {
        match self.quality {
            BlurQuality::Low => ProgramKey::new("filter_blur_low"),
            BlurQuality::Medium => ProgramKey::new("filter_blur_med"),
            BlurQuality::High => ProgramKey::new("filter_blur_high"),
        }
    }

    fn uniforms(&self, controller: &FilterController, input: &DrawingContext) -> Uniforms {
        let FilterController::BlurPass {
            direction,
            strength,
            ..
        } = controller
        else {
            return mismatch(self.name(), controller);
        };
        // offsets are in texels of the input
        let step = *direction * *strength
            / glam::Vec2::new(input.width() as f32, input.height() as f32);
        vec![
            ("uOffset", UniformValue::Vec2(step.to_array())),
            ("uStrength", UniformValue::Float(*strength)),
        ]
    }
}

#[derive(Debug, Default)]
pub struct ColorMatrixShader;

impl FilterShader for ColorMatrixShader {
    fn name(&self) -> &'static str {
        "FilterColorMatrix"
    }

    fn program(&self, _controller: &FilterController) -> ProgramKey {
        ProgramKey::new("filter_color_matrix")
    }

    fn uniforms(&self, controller: &FilterController, _input: &DrawingContext) -> Uniforms {
        match controller {
            FilterController::ColorMatrix { matrix, alpha } => vec![
                ("uColorMatrix", UniformValue::Floats(matrix.to_vec())),
                ("uAlpha", UniformValue::Float(*alpha)),
            ],
            _ => mismatch(self.name(), controller),
        }
    }
}

#[derive(Debug, Default)]
pub struct ThresholdShader;

impl FilterShader for ThresholdShader {
    fn name(&self) -> &'static str {
        "FilterThreshold"
    }

    fn program(&self, _controller: &FilterController) -> ProgramKey {
        ProgramKey::new("filter_threshold")
    }

    fn uniforms(&self, controller: &FilterController, _input: &DrawingContext) -> Uniforms {
        match controller {
            FilterController::Threshold {
                edge1,
                edge2,
                invert,
            } => vec![
                ("uEdge1", UniformValue::Vec4(*edge1)),
                ("uEdge2", UniformValue::Vec4(*edge2)),
                ("uInvert", flag(*invert)),
            ],
            _ => mismatch(self.name(), controller),
        }
    }
}

#[derive(Debug, Default)]
pub struct GlowShader;

impl FilterShader for GlowShader {
    fn name(&self) -> &'static str {
        "FilterGlow"
    }

    fn program(&self, controller: &FilterController) -> ProgramKey {
        // knockout drops the source pixels, which is a separate variant
        let knockout = matches!(controller, FilterController::Glow { knockout: true, .. });
        ProgramKey::new("filter_glow").with_variant(u32::from(knockout))
    }

    fn uniforms(&self, controller: &FilterController, _input: &DrawingContext) -> Uniforms {
        match controller {
            FilterController::Glow {
                color,
                outer_strength,
                inner_strength,
                scale,
                ..
            } => vec![
                ("uColor", UniformValue::Vec4([color[0], color[1], color[2], 1.0])),
                ("uOuterStrength", UniformValue::Float(*outer_strength)),
                ("uInnerStrength", UniformValue::Float(*inner_strength)),
                ("uScale", UniformValue::Float(*scale)),
            ],
            _ => mismatch(self.name(), controller),
        }
    }
}

#[derive(Debug, Default)]
pub struct ShadowShader;

impl FilterShader for ShadowShader {
    fn name(&self) -> &'static str {
        "FilterShadow"
    }

    fn program(&self, _controller: &FilterController) -> ProgramKey {
        ProgramKey::new("filter_shadow")
    }

    fn uniforms(&self, controller: &FilterController, input: &DrawingContext) -> Uniforms {
        match controller {
            FilterController::Shadow {
                offset,
                decay,
                power,
                color,
                samples,
                intensity,
            } => {
                let size = glam::Vec2::new(input.width() as f32, input.height() as f32);
                vec![
                    ("uOffset", UniformValue::Vec2((*offset / size).to_array())),
                    ("uDecay", UniformValue::Float(*decay)),
                    ("uPower", UniformValue::Float(*power)),
                    ("uColor", UniformValue::Vec4([color[0], color[1], color[2], 1.0])),
                    ("uSamples", UniformValue::Int((*samples).max(1) as i32)),
                    ("uIntensity", UniformValue::Float(*intensity)),
                ]
            }
            _ => mismatch(self.name(), controller),
        }
    }
}

#[derive(Debug, Default)]
pub struct DisplacementShader;

impl FilterShader for DisplacementShader {
    fn name(&self) -> &'static str {
        "FilterDisplacement"
    }

    fn program(&self, _controller: &FilterController) -> ProgramKey {
        ProgramKey::new("filter_displacement")
    }

    fn textures(&self, controller: &FilterController, input: TextureId) -> SmallVec<[TextureId; 4]> {
        match controller {
            FilterController::Displacement { texture, .. } => smallvec![input, *texture],
            _ => smallvec![input, TextureId::FALLBACK],
        }
    }

    fn uniforms(&self, controller: &FilterController, input: &DrawingContext) -> Uniforms {
        match controller {
            FilterController::Displacement { amount, .. } => {
                let size = glam::Vec2::new(input.width() as f32, input.height() as f32);
                vec![("uAmount", UniformValue::Vec2((*amount / size).to_array()))]
            }
            _ => mismatch(self.name(), controller),
        }
    }
}

#[derive(Debug, Default)]
pub struct MaskShader;

impl FilterShader for MaskShader {
    fn name(&self) -> &'static str {
        "FilterMask"
    }

    fn program(&self, _controller: &FilterController) -> ProgramKey {
        ProgramKey::new("filter_mask")
    }

    fn textures(&self, controller: &FilterController, input: TextureId) -> SmallVec<[TextureId; 4]> {
        match controller {
            FilterController::Mask { texture, .. } => smallvec![input, *texture],
            _ => smallvec![input, TextureId::FALLBACK],
        }
    }

    fn uniforms(&self, controller: &FilterController, _input: &DrawingContext) -> Uniforms {
        match controller {
            FilterController::Mask { invert, .. } => vec![("uInvert", flag(*invert))],
            _ => mismatch(self.name(), controller),
        }
    }
}

/// Blends a second texture over the input with one of the blend modes.
#[derive(Debug, Default)]
pub struct BlendShader;

impl FilterShader for BlendShader {
    fn name(&self) -> &'static str {
        "FilterBlend"
    }

    fn program(&self, _controller: &FilterController) -> ProgramKey {
        ProgramKey::new("filter_blend")
    }

    fn textures(&self, controller: &FilterController, input: TextureId) -> SmallVec<[TextureId; 4]> {
        match controller {
            FilterController::Blend { texture, .. } => smallvec![input, *texture],
            _ => smallvec![input, TextureId::FALLBACK],
        }
    }

    fn uniforms(&self, controller: &FilterController, _input: &DrawingContext) -> Uniforms {
        match controller {
            FilterController::Blend {
                mode,
                amount,
                color,
                ..
            } => vec![
                ("uBlendMode", UniformValue::Int(mode.shader_id())),
                ("uAmount", UniformValue::Float(*amount)),
                ("uColor", UniformValue::Vec4(*color)),
            ],
            _ => mismatch(self.name(), controller),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::blend::BlendMode;
    use glam::Vec2;

    #[test]
    fn blur_offset_is_in_texels() {
        let ctx = DrawingContext::canvas(100, 50);
        let controller = FilterController::BlurPass {
            quality: BlurQuality::Medium,
            direction: Vec2::new(1.0, 0.0),
            strength: 2.0,
        };
        let uniforms = BlurPassShader::new(BlurQuality::Medium).uniforms(&controller, &ctx);
        assert_eq!(uniforms[0], ("uOffset", UniformValue::Vec2([0.02, 0.0])));
    }

    #[test]
    fn blend_binds_the_second_texture() {
        let controller = FilterController::Blend {
            texture: TextureId(9),
            mode: BlendMode::Multiply,
            amount: 1.0,
            color: [1.0; 4],
        };
        let textures = BlendShader.textures(&controller, TextureId(3));
        assert_eq!(textures.as_slice(), &[TextureId(3), TextureId(9)]);
    }

    #[test]
    fn knockout_glow_uses_its_own_variant() {
        let glow = |knockout| FilterController::Glow {
            color: [1.0; 3],
            outer_strength: 4.0,
            inner_strength: 0.0,
            scale: 1.0,
            knockout,
        };
        assert_ne!(GlowShader.program(&glow(true)), GlowShader.program(&glow(false)));
    }

    #[test]
    fn mismatched_controller_yields_no_uniforms() {
        let ctx = DrawingContext::canvas(4, 4);
        assert!(MaskShader.uniforms(&FilterController::Copy, &ctx).is_empty());
    }
}
