// renderer/filters/blur.rs
use super::{Filter, FilterController, Padding};
use crate::renderer::context::DrawingContext;
use crate::renderer::manager::RenderNodeManager;
use crate::renderer::node::{RenderNode, RenderNodeError};
use glam::Vec2;
use std::borrow::Cow;

/// Separable blur: every step runs a horizontal then a vertical pass
/// through the pass node for the controller's quality.
#[derive(Debug, Default)]
pub struct FilterBlur;

impl RenderNode for FilterBlur {
    fn name(&self) -> &str {
        "FilterBlur"
    }
}

impl Filter for FilterBlur {
    fn run(
        &self,
        manager: &mut RenderNodeManager,
        controller: &FilterController,
        input: DrawingContext,
        mut output: Option<DrawingContext>,
        mut padding: Option<Padding>,
    ) -> Result<DrawingContext, RenderNodeError> {
        let FilterController::Blur {
            quality,
            x,
            y,
            strength,
            steps,
        } = controller
        else {
            return Err(RenderNodeError::WrongController {
                node: Cow::Borrowed("FilterBlur"),
                expected: "blur",
            });
        };

        manager.start_stand_alone_render();
        let pass = manager.filter(&quality.pass_key())?;
        let steps = (*steps).max(1);
        let directions = [Vec2::new(*x, 0.0), Vec2::new(0.0, *y)];

        let mut current = input;
        for step in 0..steps {
            for (i, direction) in directions.iter().enumerate() {
                let last = step + 1 == steps && i + 1 == directions.len();
                let pass_controller = FilterController::BlurPass {
                    quality: *quality,
                    direction: *direction,
                    strength: *strength,
                };
                // the first pass pads, later passes keep the size
                current = pass.run(
                    manager,
                    &pass_controller,
                    current,
                    if last { output.take() } else { None },
                    padding.take(),
                )?;
            }
        }
        Ok(current)
    }
}
