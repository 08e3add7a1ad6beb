// renderer/submitter.rs
use super::batch::{BatchPrimitive, QuadInstance, QuadLighting, RenderOptions};
use super::commands::traced;
use super::context::DrawingContext;
use super::manager::RenderNodeManager;
use super::node::{RenderNode, RenderNodeError};
use super::texturer::Texturer;
use super::tinter::Tinter;
use super::transformer::Transformer;
use crate::scene::{GameObject, TileElement};
use glam::Affine2;
use std::rc::Rc;

/// The computation nodes a submitter runs for one object, resolved by the
/// manager from the object's defaults and overrides.
#[derive(Clone)]
pub struct SubmitNodes {
    pub texturer: Rc<dyn Texturer>,
    pub transformer: Rc<dyn Transformer>,
    pub tinter: Rc<dyn Tinter>,
}

pub trait Submitter: RenderNode {
    /// Turns `object` into primitives and hands them to its batch handler.
    /// Objects with tile elements submit one primitive per element.
    fn run(
        &self,
        manager: &mut RenderNodeManager,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        parent: Option<&Affine2>,
        nodes: &SubmitNodes,
    ) -> Result<(), RenderNodeError>;
}

#[derive(Debug, Default)]
pub struct SubmitterQuad;

impl SubmitterQuad {
    fn quad(
        &self,
        manager: &mut RenderNodeManager,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        parent: Option<&Affine2>,
        element: Option<&TileElement>,
        nodes: &SubmitNodes,
    ) -> QuadInstance {
        let rec = manager.recorder_mut();
        let texture = traced(rec, nodes.texturer.name(), |_| {
            nodes.texturer.run(object, element)
        });
        let transform = traced(rec, nodes.transformer.name(), |_| {
            nodes.transformer.run(ctx, object, parent, element, &texture)
        });
        let tint = traced(rec, nodes.tinter.name(), |_| nodes.tinter.run(ctx, object, element));

        let lighting = object.normal_map().map(|normal_map| QuadLighting {
            normal_map,
            rotation: object.transform().rotation + ctx.camera().rotation,
        });
        let mut render_options = object.render_options();
        render_options.set(RenderOptions::LIGHTING, lighting.is_some());

        QuadInstance {
            texture: texture.texture,
            corners: transform.corners,
            uv: texture.uv,
            vertex_uvs: texture.vertex_uvs,
            tints: tint.tints,
            tint_fill: tint.fill,
            lighting,
            render_options,
        }
    }
}

impl RenderNode for SubmitterQuad {
    fn name(&self) -> &str {
        "SubmitterQuad"
    }
}

impl Submitter for SubmitterQuad {
    fn run(
        &self,
        manager: &mut RenderNodeManager,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        parent: Option<&Affine2>,
        nodes: &SubmitNodes,
    ) -> Result<(), RenderNodeError> {
        let handler = manager.resolve_batch_handler(object);
        manager.recorder_mut().trace_begin(self.name());

        let mut result = Ok(());
        match object.tile_elements() {
            Some(tiles) => {
                for tile in tiles {
                    let quad = self.quad(manager, ctx, object, parent, Some(tile), nodes);
                    result = manager.batch(&handler, ctx, BatchPrimitive::Quad(&quad));
                    if result.is_err() {
                        break;
                    }
                }
            }
            None => {
                let quad = self.quad(manager, ctx, object, parent, None, nodes);
                result = manager.batch(&handler, ctx, BatchPrimitive::Quad(&quad));
            }
        }

        manager.recorder_mut().trace_end();
        result
    }
}
