// renderer/filters/mod.rs
//
// Filters read a drawing context's texture and write a new context through
// one or more full-target shader passes.

mod blur;
mod effects;
mod parallel;
mod shader;

pub use blur::FilterBlur;
pub use effects::{
    BlendShader, BlurPassShader, ColorMatrixShader, CopyShader, DisplacementShader, GlowShader,
    MaskShader, ShadowShader, ThresholdShader,
};
pub use parallel::FilterParallelFilters;
pub use shader::{filter_layout, filter_quad_vertices, FilterShader, ShaderFilter};

use super::blend::BlendMode;
use super::commands::TextureId;
use super::context::DrawingContext;
use super::manager::RenderNodeManager;
use super::node::{NodeKey, RenderNode, RenderNodeError};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Extra pixels a pass adds on each side of its input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Padding {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Padding {
    pub const ZERO: Padding = Padding {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    pub fn uniform(amount: f32) -> Self {
        Self {
            left: amount,
            top: amount,
            right: amount,
            bottom: amount,
        }
    }

    /// The larger of each side.
    pub fn max(self, other: Padding) -> Padding {
        Padding {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Size of a `width` x `height` input once padded.
    pub fn grow(&self, width: u32, height: u32) -> (u32, u32) {
        let w = (width as f32 + self.left + self.right).round().max(1.0);
        let h = (height as f32 + self.top + self.bottom).round().max(1.0);
        (w as u32, h as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurQuality {
    #[default]
    Low,
    Medium,
    High,
}

impl BlurQuality {
    pub fn pass_key(self) -> NodeKey {
        match self {
            BlurQuality::Low => NodeKey::FilterBlurLow,
            BlurQuality::Medium => NodeKey::FilterBlurMed,
            BlurQuality::High => NodeKey::FilterBlurHigh,
        }
    }

    /// Sample reach of one pass, in multiples of the blur offset.
    pub fn kernel_radius(self) -> f32 {
        match self {
            BlurQuality::Low => 2.0,
            BlurQuality::Medium => 4.0,
            BlurQuality::High => 7.0,
        }
    }
}

/// Parameters for one filter. Each variant names the node that runs it.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterController {
    Copy,
    Blur {
        quality: BlurQuality,
        x: f32,
        y: f32,
        strength: f32,
        steps: u32,
    },
    /// One directional pass, issued by [`FilterBlur`].
    BlurPass {
        quality: BlurQuality,
        direction: Vec2,
        strength: f32,
    },
    ColorMatrix {
        matrix: [f32; 20],
        alpha: f32,
    },
    Threshold {
        edge1: [f32; 4],
        edge2: [f32; 4],
        invert: bool,
    },
    Glow {
        color: [f32; 3],
        outer_strength: f32,
        inner_strength: f32,
        scale: f32,
        knockout: bool,
    },
    Shadow {
        offset: Vec2,
        decay: f32,
        power: f32,
        color: [f32; 3],
        samples: u32,
        intensity: f32,
    },
    Displacement {
        texture: TextureId,
        amount: Vec2,
    },
    Mask {
        texture: TextureId,
        invert: bool,
    },
    Blend {
        texture: TextureId,
        mode: BlendMode,
        amount: f32,
        color: [f32; 4],
    },
    ParallelFilters {
        top: Vec<FilterController>,
        bottom: Vec<FilterController>,
        mode: BlendMode,
        amount: f32,
    },
}

impl FilterController {
    pub fn blur(quality: BlurQuality, strength: f32, steps: u32) -> Self {
        FilterController::Blur {
            quality,
            x: 1.0,
            y: 1.0,
            strength,
            steps,
        }
    }

    pub fn identity_color_matrix() -> Self {
        let mut matrix = [0.0; 20];
        for i in 0..4 {
            matrix[i * 5 + i] = 1.0;
        }
        FilterController::ColorMatrix { matrix, alpha: 1.0 }
    }

    pub fn node_key(&self) -> NodeKey {
        match self {
            FilterController::Copy => NodeKey::FilterCopy,
            FilterController::Blur { .. } => NodeKey::FilterBlur,
            FilterController::BlurPass { quality, .. } => quality.pass_key(),
            FilterController::ColorMatrix { .. } => NodeKey::FilterColorMatrix,
            FilterController::Threshold { .. } => NodeKey::FilterThreshold,
            FilterController::Glow { .. } => NodeKey::FilterGlow,
            FilterController::Shadow { .. } => NodeKey::FilterShadow,
            FilterController::Displacement { .. } => NodeKey::FilterDisplacement,
            FilterController::Mask { .. } => NodeKey::FilterMask,
            FilterController::Blend { .. } => NodeKey::FilterBlend,
            FilterController::ParallelFilters { .. } => NodeKey::FilterParallelFilters,
        }
    }

    /// Padding the filter needs around its input so its effect is not cut
    /// off at the edges.
    pub fn padding(&self) -> Padding {
        match self {
            FilterController::Blur {
                quality,
                x,
                y,
                strength,
                steps,
            } => {
                let reach = x.abs().max(y.abs()) * strength * quality.kernel_radius();
                Padding::uniform((reach * (*steps).max(1) as f32).ceil())
            }
            FilterController::Glow {
                outer_strength,
                scale,
                ..
            } => Padding::uniform((outer_strength * scale).ceil()),
            FilterController::ParallelFilters { top, bottom, .. } => {
                chain_padding(top).max(chain_padding(bottom))
            }
            FilterController::Shadow { offset, .. } => Padding {
                left: (-offset.x).max(0.0).ceil(),
                top: (-offset.y).max(0.0).ceil(),
                right: offset.x.max(0.0).ceil(),
                bottom: offset.y.max(0.0).ceil(),
            },
            _ => Padding::ZERO,
        }
    }
}

pub trait Filter: RenderNode {
    /// Consumes `input` and returns the context holding the result. When
    /// `output` is given the result is drawn into it, otherwise a context is
    /// allocated at the padded input size.
    fn run(
        &self,
        manager: &mut RenderNodeManager,
        controller: &FilterController,
        input: DrawingContext,
        output: Option<DrawingContext>,
        padding: Option<Padding>,
    ) -> Result<DrawingContext, RenderNodeError>;
}

/// An ordered chain of filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterList {
    pub filters: Vec<FilterController>,
}

impl FilterList {
    pub fn new(filters: Vec<FilterController>) -> Self {
        Self { filters }
    }

    pub fn run(
        &self,
        manager: &mut RenderNodeManager,
        input: DrawingContext,
        output: Option<DrawingContext>,
    ) -> Result<DrawingContext, RenderNodeError> {
        run_chain(manager, &self.filters, input, output)
    }
}

/// Padding a whole chain adds, each filter growing the previous result.
pub fn chain_padding(filters: &[FilterController]) -> Padding {
    filters.iter().fold(Padding::ZERO, |sum, filter| {
        let p = filter.padding();
        Padding {
            left: sum.left + p.left,
            top: sum.top + p.top,
            right: sum.right + p.right,
            bottom: sum.bottom + p.bottom,
        }
    })
}

/// Runs `filters` in order. Only the last filter writes into `output`.
pub fn run_chain(
    manager: &mut RenderNodeManager,
    filters: &[FilterController],
    input: DrawingContext,
    output: Option<DrawingContext>,
) -> Result<DrawingContext, RenderNodeError> {
    run_chain_with(manager, filters, input, output, true)
}

/// Like [`run_chain`], but with `padded` false every pass keeps its input
/// size. Used when the input was padded up front.
pub(crate) fn run_chain_with(
    manager: &mut RenderNodeManager,
    filters: &[FilterController],
    input: DrawingContext,
    mut output: Option<DrawingContext>,
    padded: bool,
) -> Result<DrawingContext, RenderNodeError> {
    if filters.is_empty() {
        return match output {
            None => Ok(input),
            Some(out) => {
                let copy = manager.filter(&NodeKey::FilterCopy)?;
                copy.run(manager, &FilterController::Copy, input, Some(out), None)
            }
        };
    }

    let mut current = input;
    for (i, controller) in filters.iter().enumerate() {
        let node = manager.filter(&controller.node_key())?;
        let out = if i + 1 == filters.len() {
            output.take()
        } else {
            None
        };
        let padding = controller.padding();
        current = node.run(
            manager,
            controller,
            current,
            out,
            (padded && !padding.is_zero()).then_some(padding),
        )?;
    }
    Ok(current)
}
