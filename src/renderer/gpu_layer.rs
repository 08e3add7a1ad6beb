// renderer/gpu_layer.rs
//
// Stand-alone instanced rendering for image GPU layers. Member data is
// baked into a static instance buffer and redrawn every frame with one
// instanced draw.

use super::commands::{
    BufferId, DrawCall, DrawRecorder, GpuCommand, ProgramKey, ResourceIds, UniformValue,
};
use super::context::DrawingContext;
use super::manager::RenderNodeManager;
use super::node::{RenderNode, RenderNodeError};
use super::tinter::pack_tint;
use super::vertex_layout::{
    AttributeDescriptor, AttributeType, BufferUsage, VertexBuffer, VertexBufferLayout,
};
use crate::scene::{ImageGpuLayer, Tint};
use log::debug;
use smallvec::smallvec;
use std::borrow::Cow;
use std::cell::Cell;

/// Corner indices TL, BL, TR, BR; the shader expands them per instance.
const CORNERS: [f32; 4] = [0.0, 1.0, 2.0, 3.0];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

/// Draws an [`ImageGpuLayer`] outside the batch system.
pub struct SubmitterImageGpuLayer {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    geometry_uploaded: Cell<bool>,
}

impl SubmitterImageGpuLayer {
    pub const PROGRAM: ProgramKey = ProgramKey::new("image_gpu_layer");

    pub fn new(ids: &ResourceIds) -> Self {
        Self {
            vertex_buffer: ids.buffer(),
            index_buffer: ids.buffer(),
            geometry_uploaded: Cell::new(false),
        }
    }

    /// The per-vertex buffer: just the corner index.
    pub fn vertex_layout() -> VertexBufferLayout {
        VertexBufferLayout::complete(
            BufferUsage::Static,
            &[AttributeDescriptor::float("inVertex", 1)],
        )
    }

    /// Per-instance attributes as the shader reads them.
    pub fn instance_layout() -> VertexBufferLayout {
        let mut attributes = member_attributes();
        for corner in ["inTintTL", "inTintBL", "inTintTR", "inTintBR"] {
            attributes.push(AttributeDescriptor::new(corner, 4, AttributeType::Uint8).normalized());
        }
        attributes.push(AttributeDescriptor::float("inAlpha", 1));
        VertexBufferLayout::complete(BufferUsage::Static, &attributes)
    }

    /// The same bytes as [`instance_layout`](Self::instance_layout), with the
    /// four corner tints seen as whole packed words so baking can write
    /// them in one pass.
    pub fn bake_layout() -> VertexBufferLayout {
        let mut attributes = member_attributes();
        attributes.push(AttributeDescriptor::new("inTints", 4, AttributeType::Uint32));
        attributes.push(AttributeDescriptor::float("inAlpha", 1));
        VertexBufferLayout::complete(BufferUsage::Static, &attributes)
    }

    /// Writes every member into a fresh instance buffer, uploads it and
    /// hands it to the layer.
    pub fn bake(
        &self,
        layer: &mut ImageGpuLayer,
        buffer: BufferId,
        recorder: &mut DrawRecorder,
    ) -> Result<(), RenderNodeError> {
        let mut baked = VertexBuffer::new(Self::bake_layout(), layer.len());
        for (index, member) in layer.members().iter().enumerate() {
            let t = &member.transform;
            let [tl, bl, tr, br] = corner_tints(&member.tint);
            baked
                .writer_at(index)
                .vec2(t.position)
                .f32(t.rotation)
                .vec2(t.signed_scale())
                .vec2(t.origin)
                .vec2(t.scroll_factor)
                .f32(member.uv.u0)
                .f32(member.uv.v0)
                .f32(member.uv.u1)
                .f32(member.uv.v1)
                .vec2(member.size)
                .f32(if member.tint.fill { 1.0 } else { 0.0 })
                .u32(tl)
                .u32(bl)
                .u32(tr)
                .u32(br)
                .f32(member.alpha);
        }

        let instances = baked.relayout(Self::instance_layout())?;
        recorder.push(GpuCommand::UploadVertices {
            buffer,
            bytes: instances.bytes().to_vec(),
        });
        debug!("Baked {} GPU layer members", instances.count());
        layer.finish_bake(instances);
        Ok(())
    }

    /// Renders `layer` with one instanced draw, rebaking first if a member
    /// changed since the last bake.
    pub fn run(
        &self,
        manager: &mut RenderNodeManager,
        ctx: &DrawingContext,
        layer: &mut ImageGpuLayer,
    ) -> Result<(), RenderNodeError> {
        if !layer.visible || layer.is_empty() {
            return Ok(());
        }
        manager.start_stand_alone_render();
        let buffer = layer.instance_buffer(manager.ids());

        let rec = manager.recorder_mut();
        rec.trace_begin(self.name());
        if !self.geometry_uploaded.replace(true) {
            rec.push(GpuCommand::UploadVertices {
                buffer: self.vertex_buffer,
                bytes: bytemuck::cast_slice(&CORNERS).to_vec(),
            });
            rec.push(GpuCommand::UploadIndices {
                buffer: self.index_buffer,
                indices: QUAD_INDICES.to_vec(),
            });
        }
        if layer.needs_update() {
            if let Err(err) = self.bake(layer, buffer, rec) {
                rec.trace_end();
                return Err(err);
            }
        }

        let camera = ctx.camera();
        let view = camera.matrix();
        let uniforms = [
            (
                "uViewMatrix",
                UniformValue::Floats(vec![
                    view.matrix2.x_axis.x,
                    view.matrix2.x_axis.y,
                    view.matrix2.y_axis.x,
                    view.matrix2.y_axis.y,
                    view.translation.x,
                    view.translation.y,
                ]),
            ),
            (
                "uCameraScrollAndAlpha",
                UniformValue::Vec3([camera.scroll.x, camera.scroll.y, camera.alpha * layer.alpha]),
            ),
            (
                "uRoundPixels",
                UniformValue::Float(if camera.round_pixels { 1.0 } else { 0.0 }),
            ),
        ];
        for (name, value) in uniforms {
            rec.push(GpuCommand::SetUniform {
                program: Self::PROGRAM,
                name: Cow::Borrowed(name),
                value,
            });
        }

        rec.push(GpuCommand::Draw(DrawCall {
            node: Cow::Borrowed("SubmitterImageGpuLayer"),
            target: ctx.target(),
            viewport: (ctx.width(), ctx.height()),
            program: Self::PROGRAM,
            blend: layer.blend_mode,
            scissor: ctx.scissor(),
            vertex_buffer: self.vertex_buffer,
            index_buffer: self.index_buffer,
            textures: smallvec![layer.frame.texture],
            first_index: 0,
            index_count: QUAD_INDICES.len() as u32,
            instance_buffer: Some(buffer),
            instance_count: layer.len() as u32,
        }));
        rec.trace_end();
        Ok(())
    }
}

impl RenderNode for SubmitterImageGpuLayer {
    fn name(&self) -> &str {
        "SubmitterImageGpuLayer"
    }
}

fn member_attributes() -> Vec<AttributeDescriptor> {
    vec![
        AttributeDescriptor::float("inPosition", 2),
        AttributeDescriptor::float("inRotation", 1),
        AttributeDescriptor::float("inScale", 2),
        AttributeDescriptor::float("inOrigin", 2),
        AttributeDescriptor::float("inScrollFactor", 2),
        AttributeDescriptor::float("inFrameUVs", 4),
        AttributeDescriptor::float("inSize", 2),
        AttributeDescriptor::float("inTintFill", 1),
    ]
}

// Tint alphas are stored TL, TR, BL, BR.
fn corner_tints(tint: &Tint) -> [u32; 4] {
    [
        pack_tint(tint.top_left, tint.alpha[0]),
        pack_tint(tint.bottom_left, tint.alpha[2]),
        pack_tint(tint.top_right, tint.alpha[1]),
        pack_tint(tint.bottom_right, tint.alpha[3]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::batch::{BatchPrimitive, QuadInstance};
    use crate::renderer::commands::TextureId;
    use crate::renderer::node::NodeKey;
    use crate::scene::{Frame, GpuLayerMember, Texture};
    use crate::settings::RenderSettings;

    fn layer(members: usize) -> ImageGpuLayer {
        let texture = Texture {
            id: TextureId(7),
            width: 32,
            height: 32,
            resolution: 1.0,
        };
        let frame = Frame::whole(&texture);
        let mut layer = ImageGpuLayer::new(frame);
        for i in 0..members {
            layer.add(GpuLayerMember::new(&frame, i as f32 * 10.0, 5.0));
        }
        layer
    }

    fn draws(manager: &RenderNodeManager) -> Vec<&DrawCall> {
        manager
            .recorder()
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    fn uploads_to(manager: &RenderNodeManager, buffer: BufferId) -> Vec<&[u8]> {
        manager
            .recorder()
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::UploadVertices { buffer: b, bytes } if *b == buffer => {
                    Some(bytes.as_slice())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn both_layouts_describe_the_same_bytes() {
        let shader = SubmitterImageGpuLayer::instance_layout();
        let bake = SubmitterImageGpuLayer::bake_layout();
        assert_eq!(shader.stride(), bake.stride());
        assert_eq!(shader.stride(), 84);
        assert_eq!(
            shader.attribute("inTintTL").map(|a| a.offset),
            bake.attribute("inTints").map(|a| a.offset)
        );
        assert_eq!(shader.attribute("inTintBR").map(|a| a.offset), Some(76));
        assert_eq!(shader.usage, BufferUsage::Static);
        assert!(shader.wgpu_attributes().is_ok());
    }

    #[test]
    fn a_layer_is_one_instanced_draw() {
        let mut manager = RenderNodeManager::new(RenderSettings::default());
        let ctx = manager.canvas_context();
        let mut layer = layer(3);
        if let Some(member) = layer.member_mut(1) {
            member.tint = Tint::solid(0x102030);
        }

        manager
            .submit_gpu_layer(&ctx, &mut layer)
            .expect("layer renders");

        let draws = draws(&manager);
        assert_eq!(draws.len(), 1);
        let call = draws[0];
        assert_eq!(call.program, SubmitterImageGpuLayer::PROGRAM);
        assert_eq!(call.instance_count, 3);
        assert_eq!(call.index_count, 6);
        assert_eq!(call.textures.as_slice(), &[TextureId(7)]);

        let buffer = call.instance_buffer.expect("instance buffer");
        let uploads = uploads_to(&manager, buffer);
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].len(), 3 * 84);

        // the packed BL tint of member 1, read back through the shader layout
        let instances = layer.instances().expect("baked");
        let bl = instances
            .layout()
            .attribute("inTintBL")
            .map(|a| a.offset as usize)
            .expect("attribute");
        let start = 84 + bl;
        assert_eq!(&uploads[0][start..start + 4], &[0x10, 0x20, 0x30, 0xff]);
        assert!(!layer.needs_update());
    }

    #[test]
    fn static_instances_upload_only_after_changes() {
        let mut manager = RenderNodeManager::new(RenderSettings::default());
        let ctx = manager.canvas_context();
        let mut layer = layer(2);

        manager.submit_gpu_layer(&ctx, &mut layer).expect("first frame");
        manager.end_frame();
        manager.submit_gpu_layer(&ctx, &mut layer).expect("second frame");

        let buffer = layer.instance_buffer(manager.ids());
        assert!(uploads_to(&manager, buffer).is_empty());
        assert_eq!(draws(&manager)[0].instance_count, 2);

        let frame = layer.frame;
        layer.add(GpuLayerMember::new(&frame, 0.0, 0.0));
        manager.submit_gpu_layer(&ctx, &mut layer).expect("third draw");
        let uploads = uploads_to(&manager, buffer);
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].len(), 3 * 84);
    }

    #[test]
    fn pending_batches_flush_before_the_layer_draws() {
        let mut manager = RenderNodeManager::new(RenderSettings::default());
        let ctx = manager.canvas_context();
        let quad = QuadInstance::rect(TextureId(1), 0.0, 0.0, 8.0, 8.0);
        manager
            .batch(&NodeKey::BatchHandlerQuad, &ctx, BatchPrimitive::Quad(&quad))
            .expect("batch quad");

        let mut layer = layer(1);
        manager.submit_gpu_layer(&ctx, &mut layer).expect("layer renders");

        let draws = draws(&manager);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].instance_buffer, None);
        assert_eq!(draws[1].program, SubmitterImageGpuLayer::PROGRAM);
        assert_eq!(manager.current_batch_node(), None);
    }

    #[test]
    fn empty_layers_draw_nothing() {
        let mut manager = RenderNodeManager::new(RenderSettings::default());
        let ctx = manager.canvas_context();
        let mut layer = layer(0);
        manager.submit_gpu_layer(&ctx, &mut layer).expect("empty layer");
        assert!(draws(&manager).is_empty());
    }
}
