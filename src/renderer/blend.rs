use serde::{Deserialize, Serialize};

/// Blend modes that can be expressed with fixed-function blending.
/// Colors are premultiplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Multiply,
    Screen,
    Erase,
    /// Overwrites the destination, used by filter passes.
    Copy,
}

impl BlendMode {
    pub fn to_wgpu(self) -> wgpu::BlendState {
        use wgpu::BlendFactor as F;

        let component = |src_factor, dst_factor| wgpu::BlendComponent {
            src_factor,
            dst_factor,
            operation: wgpu::BlendOperation::Add,
        };

        match self {
            BlendMode::Normal => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            BlendMode::Add => wgpu::BlendState {
                color: component(F::One, F::One),
                alpha: component(F::One, F::One),
            },
            BlendMode::Multiply => wgpu::BlendState {
                color: component(F::Dst, F::OneMinusSrcAlpha),
                alpha: component(F::One, F::OneMinusSrcAlpha),
            },
            BlendMode::Screen => wgpu::BlendState {
                color: component(F::One, F::OneMinusSrc),
                alpha: component(F::One, F::OneMinusSrcAlpha),
            },
            BlendMode::Erase => wgpu::BlendState {
                color: component(F::Zero, F::OneMinusSrcAlpha),
                alpha: component(F::Zero, F::OneMinusSrcAlpha),
            },
            BlendMode::Copy => wgpu::BlendState::REPLACE,
        }
    }

    /// Numeric id passed to blend filters.
    pub fn shader_id(self) -> i32 {
        match self {
            BlendMode::Normal => 0,
            BlendMode::Add => 1,
            BlendMode::Multiply => 2,
            BlendMode::Screen => 3,
            BlendMode::Erase => 4,
            BlendMode::Copy => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_replaces_destination() {
        assert_eq!(BlendMode::Copy.to_wgpu(), wgpu::BlendState::REPLACE);
    }

    #[test]
    fn erase_ignores_source_color() {
        let state = BlendMode::Erase.to_wgpu();
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::Zero);
        assert_eq!(state.alpha.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }
}
