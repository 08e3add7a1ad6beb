use super::{
    draw_call, quad_layout, quads_per_batch, write_quad, BatchEntries, BatchHandler,
    BatchPrimitive, QuadGeometry, RenderOptions,
};
use crate::renderer::commands::{
    DrawRecorder, GpuCommand, ProgramKey, ResourceIds, TextureId, UniformValue,
};
use crate::renderer::context::DrawingContext;
use crate::renderer::node::{RenderNode, RenderNodeError};
use crate::settings::RenderSettings;
use std::borrow::Cow;

/// Batches textured, tinted quads. Each quad picks a texture unit inside the
/// current entry; when the units run out a new entry starts over the same
/// vertex upload. Smooth pixel art is a shader variant, so toggling it
/// flushes.
#[derive(Debug)]
pub struct BatchHandlerQuad {
    name: Cow<'static, str>,
    program: ProgramKey,
    geometry: QuadGeometry,
    entries: BatchEntries,
    instance_count: usize,
    render_options: RenderOptions,
}

impl BatchHandlerQuad {
    pub const PROGRAM: ProgramKey = ProgramKey::new("quad");

    pub fn new(settings: &RenderSettings, ids: &ResourceIds) -> Self {
        Self::with_capacity(settings.batch_size, settings.max_textures, ids)
    }

    pub fn with_capacity(batch_size: usize, max_textures: usize, ids: &ResourceIds) -> Self {
        let capacity = quads_per_batch(batch_size);
        Self {
            name: Cow::Borrowed("BatchHandlerQuad"),
            program: Self::PROGRAM,
            geometry: QuadGeometry::new(quad_layout(), capacity, ids),
            entries: BatchEntries::new(max_textures),
            instance_count: 0,
            render_options: RenderOptions::empty(),
        }
    }

    /// Options that select a variant of the quad program.
    pub const VARIANT_OPTIONS: RenderOptions = RenderOptions::SMOOTH_PIXEL_ART;

    /// Renames the node and points it at another program, for custom quad
    /// shaders sharing this vertex layout.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>, program: ProgramKey) -> Self {
        self.name = name.into();
        self.program = program;
        self
    }

    pub fn entry_count(&self) -> usize {
        self.entries.entry_count()
    }

    fn variant(&self) -> ProgramKey {
        self.program.with_variant(self.render_options.bits())
    }
}

impl RenderNode for BatchHandlerQuad {
    fn name(&self) -> &str {
        &self.name
    }
}

impl BatchHandler for BatchHandlerQuad {
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
                key: self.name.clone(),
                primitive: primitive.kind(),
            });
        };

        let options = quad.render_options & Self::VARIANT_OPTIONS;
        if self.instance_count > 0 && options != self.render_options {
            self.run(ctx, recorder);
        }
        self.render_options = options;

        let unit = self.entries.bind_texture(quad.texture, self.instance_count);
        write_quad(&mut self.geometry.writer(self.instance_count), quad, unit);
        self.instance_count += 1;
        self.entries.record_instance();

        if self.instance_count == self.instances_per_batch() {
            self.run(ctx, recorder);
        }
        Ok(())
    }

    fn on_run_begin(&mut self, ctx: &DrawingContext, recorder: &mut DrawRecorder) {
        let program = self.variant();
        recorder.push(GpuCommand::SetUniform {
            program,
            name: Cow::Borrowed("uRoundPixels"),
            value: UniformValue::Int(i32::from(ctx.camera().round_pixels)),
        });
        recorder.push(GpuCommand::SetUniform {
            program,
            name: Cow::Borrowed("uResolution"),
            value: UniformValue::Vec2([ctx.width() as f32, ctx.height() as f32]),
        });
    }

    fn submit_batch(&mut self, ctx: &DrawingContext, recorder: &mut DrawRecorder) {
        let program = self.variant();
        self.geometry.upload(self.instance_count, recorder);
        for entry in self.entries.drain() {
            recorder.push(GpuCommand::Draw(draw_call(
                &self.name,
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
        debug_assert_eq!(self.instance_count, 0, "flush before changing texture units");
        self.entries.set_max_textures(max_textures);
    }

    fn texture_unit(&self, texture: TextureId) -> Option<u32> {
        self.entries.texture_unit(texture)
    }
}
