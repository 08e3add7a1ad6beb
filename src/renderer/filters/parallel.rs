// renderer/filters/parallel.rs
use super::{run_chain_with, Filter, FilterController, Padding};
use crate::renderer::blend::BlendMode;
use crate::renderer::commands::TextureId;
use crate::renderer::context::DrawingContext;
use crate::renderer::manager::RenderNodeManager;
use crate::renderer::node::{NodeKey, RenderNode, RenderNodeError};
use std::borrow::Cow;

/// Runs two filter chains over the same input and blends the top result
/// over the bottom one.
#[derive(Debug, Default)]
pub struct FilterParallelFilters;

impl RenderNode for FilterParallelFilters {
    fn name(&self) -> &str {
        "FilterParallelFilters"
    }
}

impl Filter for FilterParallelFilters {
    fn run(
        &self,
        manager: &mut RenderNodeManager,
        controller: &FilterController,
        input: DrawingContext,
        output: Option<DrawingContext>,
        padding: Option<Padding>,
    ) -> Result<DrawingContext, RenderNodeError> {
        let FilterController::ParallelFilters {
            top,
            bottom,
            mode,
            amount,
        } = controller
        else {
            return Err(RenderNodeError::WrongController {
                node: Cow::Borrowed("FilterParallelFilters"),
                expected: "parallel filters",
            });
        };

        manager.start_stand_alone_render();
        manager.recorder_mut().trace_begin(self.name());
        let result = blend_branches(manager, top, bottom, *mode, *amount, input, output, padding);
        manager.recorder_mut().trace_end();
        result
    }
}

#[allow(clippy::too_many_arguments)]
fn blend_branches(
    manager: &mut RenderNodeManager,
    top: &[FilterController],
    bottom: &[FilterController],
    mode: BlendMode,
    amount: f32,
    input: DrawingContext,
    output: Option<DrawingContext>,
    padding: Option<Padding>,
) -> Result<DrawingContext, RenderNodeError> {
    let input = match padding.filter(|p| !p.is_zero()) {
        Some(padding) => {
            let copy = manager.filter(&NodeKey::FilterCopy)?;
            copy.run(manager, &FilterController::Copy, input, None, Some(padding))?
        }
        None => input,
    };

    // both branches read the same input; the lease keeps it alive until the
    // bottom branch releases it. The input is already padded for both, so
    // the branches keep its size and line up for the blend.
    let top_result = run_chain_with(manager, top, input.clone(), None, false)?;
    let bottom_result = run_chain_with(manager, bottom, input, None, false)?;

    let blend = FilterController::Blend {
        texture: top_result.texture().unwrap_or(TextureId::FALLBACK),
        mode,
        amount,
        color: [1.0; 4],
    };
    let node = manager.filter(&NodeKey::FilterBlend)?;
    let result = node.run(manager, &blend, bottom_result, output, None);
    manager.release_context(top_result);
    result
}
