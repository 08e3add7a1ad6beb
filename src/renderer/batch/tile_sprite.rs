use super::{
    draw_call, quads_per_batch, BatchEntries, BatchHandler, BatchPrimitive, QuadGeometry,
    QuadInstance, RenderOptions, WRITE_ORDER,
};
use crate::renderer::commands::{DrawRecorder, GpuCommand, ProgramKey, ResourceIds, TextureId};
use crate::renderer::context::DrawingContext;
use crate::renderer::node::{RenderNode, RenderNodeError};
use crate::renderer::vertex_layout::{
    AttributeDescriptor, AttributeType, BufferUsage, VertexBufferLayout, VertexWriter,
};
use crate::settings::RenderSettings;
use std::borrow::Cow;

/// Batches repeating-texture quads. Each vertex carries its own tiling UV
/// plus the frame rectangle the shader wraps or clamps into. Render options
/// select the shader variant, so changing them flushes.
#[derive(Debug)]
pub struct BatchHandlerTileSprite {
    geometry: QuadGeometry,
    entries: BatchEntries,
    instance_count: usize,
    render_options: RenderOptions,
}

impl BatchHandlerTileSprite {
    pub const PROGRAM: ProgramKey = ProgramKey::new("tile_sprite");

    pub fn new(settings: &RenderSettings, ids: &ResourceIds) -> Self {
        Self::with_capacity(settings.batch_size, settings.max_textures, ids)
    }

    pub fn with_capacity(batch_size: usize, max_textures: usize, ids: &ResourceIds) -> Self {
        Self {
            geometry: QuadGeometry::new(Self::layout(), quads_per_batch(batch_size), ids),
            entries: BatchEntries::new(max_textures),
            instance_count: 0,
            render_options: RenderOptions::empty(),
        }
    }

    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout::complete(
            BufferUsage::Dynamic,
            &[
                AttributeDescriptor::float("inPosition", 2),
                AttributeDescriptor::float("inTexCoord", 2),
                AttributeDescriptor::float("inFrame", 4),
                AttributeDescriptor::float("inTexDatum", 1),
                AttributeDescriptor::float("inTintEffect", 1),
                AttributeDescriptor::new("inTint", 4, AttributeType::Uint8).normalized(),
            ],
        )
    }

    pub fn render_options(&self) -> RenderOptions {
        self.render_options
    }

    fn program(&self) -> ProgramKey {
        Self::PROGRAM.with_variant(self.render_options.bits())
    }
}

fn write_tile_quad(writer: &mut VertexWriter<'_>, quad: &QuadInstance, unit: u32) {
    let effect = if quad.tint_fill { 1.0 } else { 0.0 };
    let frame = [quad.uv.u0, quad.uv.v0, quad.uv.width(), quad.uv.height()];
    for corner in WRITE_ORDER {
        writer.vec2(quad.corners[corner]).vec2(quad.corner_uv(corner));
        for component in frame {
            writer.f32(component);
        }
        writer
            .f32(unit as f32)
            .f32(effect)
            .u32(quad.tints[corner]);
    }
}

impl RenderNode for BatchHandlerTileSprite {
    fn name(&self) -> &str {
        "BatchHandlerTileSprite"
    }
}

impl BatchHandler for BatchHandlerTileSprite {
    fn instance_count(&self) -> usize {
        self.instance_count
    }

    fn instances_per_batch(&self) -> usize {
        self.geometry.capacity
    }

    fn batch(
        &mut self,
        ctx: &DrawingContext,
        primitive: BatchPrimitive<'_>,
        recorder: &mut DrawRecorder,
    ) -> Result<(), RenderNodeError> {
        let BatchPrimitive::Quad(quad) = primitive else {
            return Err(RenderNodeError::UnsupportedPrimitive {
                key: Cow::Borrowed("BatchHandlerTileSprite"),
                primitive: primitive.kind(),
            });
        };

        if self.instance_count > 0 && quad.render_options != self.render_options {
            self.run(ctx, recorder);
        }
        self.render_options = quad.render_options;

        let unit = self.entries.bind_texture(quad.texture, self.instance_count);
        write_tile_quad(&mut self.geometry.writer(self.instance_count), quad, unit);
        self.instance_count += 1;
        self.entries.record_instance();

        if self.instance_count == self.instances_per_batch() {
            self.run(ctx, recorder);
        }
        Ok(())
    }

    fn submit_batch(&mut self, ctx: &DrawingContext, recorder: &mut DrawRecorder) {
        let name = Cow::Borrowed("BatchHandlerTileSprite");
        let program = self.program();
        self.geometry.upload(self.instance_count, recorder);
        for entry in self.entries.drain() {
            recorder.push(GpuCommand::Draw(draw_call(
                &name,
                ctx,
                program,
                self.geometry.vertex_buffer,
                self.geometry.index_buffer,
                entry.textures.iter().copied().collect(),
                entry.start * 6,
                entry.count * 6,
            )));
        }
        self.instance_count = 0;
    }

    fn set_max_textures(&mut self, max_textures: usize) {
        self.entries.set_max_textures(max_textures);
    }

    fn texture_unit(&self, texture: TextureId) -> Option<u32> {
        self.entries.texture_unit(texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(options: RenderOptions) -> QuadInstance {
        QuadInstance {
            render_options: options,
            ..QuadInstance::rect(TextureId(4), 0.0, 0.0, 32.0, 32.0)
        }
    }

    #[test]
    fn stride_fits_frame_attribute() {
        assert_eq!(BatchHandlerTileSprite::layout().stride(), 44);
    }

    #[test]
    fn option_change_flushes_and_selects_variant() {
        let mut node = BatchHandlerTileSprite::with_capacity(16, 4, &ResourceIds::default());
        let ctx = DrawingContext::canvas(64, 64);
        let mut rec = DrawRecorder::default();

        node.batch(&ctx, BatchPrimitive::Quad(&tile(RenderOptions::WRAP_FRAME)), &mut rec)
            .unwrap();
        node.batch(&ctx, BatchPrimitive::Quad(&tile(RenderOptions::WRAP_FRAME)), &mut rec)
            .unwrap();
        node.batch(&ctx, BatchPrimitive::Quad(&tile(RenderOptions::CLAMP_FRAME)), &mut rec)
            .unwrap();
        node.run(&ctx, &mut rec);

        let draws: Vec<_> = rec.draw_calls().collect();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].index_count, 12);
        assert_eq!(draws[0].program.variant, RenderOptions::WRAP_FRAME.bits());
        assert_eq!(draws[1].program.variant, RenderOptions::CLAMP_FRAME.bits());
    }
}
