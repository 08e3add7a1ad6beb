// renderer/batch/mod.rs
//
// Batch handlers accumulate primitives into a shared vertex buffer and turn
// them into as few draws as texture units, blend state and capacity allow.

mod quad;
mod quad_light;
mod tile_sprite;
mod tri_flat;

pub use quad::BatchHandlerQuad;
pub use quad_light::BatchHandlerQuadLight;
pub use tile_sprite::BatchHandlerTileSprite;
pub use tri_flat::BatchHandlerTriFlat;

use super::commands::{
    BufferId, DrawCall, DrawRecorder, GpuCommand, ProgramKey, ResourceIds, TextureId,
};
use super::context::DrawingContext;
use super::node::{RenderNode, RenderNodeError};
use super::vertex_layout::{
    AttributeDescriptor, AttributeType, BufferUsage, VertexBuffer, VertexBufferLayout,
    VertexWriter,
};
use crate::scene::UvRect;
use bitflags::bitflags;
use glam::Vec2;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::HashMap;

/// Largest vertex count addressable by 16-bit indices.
pub const MAX_VERTICES: usize = 65536;

bitflags! {
    /// Shader options a quad needs. Quads with different options cannot share
    /// a draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderOptions: u32 {
        const LIGHTING = 1 << 0;
        const SMOOTH_PIXEL_ART = 1 << 1;
        const WRAP_FRAME = 1 << 2;
        const CLAMP_FRAME = 1 << 3;
    }
}

/// Normal-mapping data for a lit quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadLighting {
    pub normal_map: TextureId,
    /// Object rotation relative to the camera, used to rotate normals.
    pub rotation: f32,
}

/// One textured quad, already in screen space.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadInstance {
    pub texture: TextureId,
    /// Corners in TL, BL, TR, BR order.
    pub corners: [Vec2; 4],
    pub uv: UvRect,
    /// Per-corner texture coordinates, TL, BL, TR, BR. Overrides `uv`.
    pub vertex_uvs: Option<[Vec2; 4]>,
    /// Packed colors in TL, BL, TR, BR order.
    pub tints: [u32; 4],
    pub tint_fill: bool,
    pub lighting: Option<QuadLighting>,
    pub render_options: RenderOptions,
}

impl QuadInstance {
    pub fn new(texture: TextureId, corners: [Vec2; 4], uv: UvRect) -> Self {
        Self {
            texture,
            corners,
            uv,
            vertex_uvs: None,
            tints: [0xffff_ffff; 4],
            tint_fill: false,
            lighting: None,
            render_options: RenderOptions::empty(),
        }
    }

    /// Axis-aligned quad, handy for tests and fills.
    pub fn rect(texture: TextureId, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(
            texture,
            [
                Vec2::new(x, y),
                Vec2::new(x, y + height),
                Vec2::new(x + width, y),
                Vec2::new(x + width, y + height),
            ],
            UvRect::FULL,
        )
    }

    fn corner_uv(&self, corner: usize) -> Vec2 {
        if let Some(uvs) = &self.vertex_uvs {
            return uvs[corner];
        }
        match corner {
            0 => Vec2::new(self.uv.u0, self.uv.v0),
            1 => Vec2::new(self.uv.u0, self.uv.v1),
            2 => Vec2::new(self.uv.u1, self.uv.v0),
            _ => Vec2::new(self.uv.u1, self.uv.v1),
        }
    }
}

/// Untextured, vertex-colored triangles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatTriangles {
    pub vertices: Vec<Vec2>,
    /// One packed color per vertex.
    pub colors: Vec<u32>,
    /// Indices into `vertices`.
    pub indices: Vec<u16>,
}

impl FlatTriangles {
    /// Two triangles over corners in TL, BL, TR, BR order.
    pub fn quad(corners: [Vec2; 4], colors: [u32; 4]) -> Self {
        Self {
            vertices: corners.to_vec(),
            colors: colors.to_vec(),
            indices: vec![0, 1, 2, 2, 1, 3],
        }
    }
}

#[derive(Clone, Copy)]
pub enum BatchPrimitive<'a> {
    Quad(&'a QuadInstance),
    Triangles(&'a FlatTriangles),
}

impl BatchPrimitive<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            BatchPrimitive::Quad(_) => "quads",
            BatchPrimitive::Triangles(_) => "triangles",
        }
    }
}

/// A render node that accumulates primitives and draws them on `run`.
///
/// Only the manager decides which handler is current; handlers never switch
/// batches themselves, they only flush on their own capacity or state
/// changes.
pub trait BatchHandler: RenderNode {
    fn instance_count(&self) -> usize;

    fn instances_per_batch(&self) -> usize;

    /// Adds one primitive. Flushes first or afterwards when the handler's
    /// own limits demand it.
    fn batch(
        &mut self,
        ctx: &DrawingContext,
        primitive: BatchPrimitive<'_>,
        recorder: &mut DrawRecorder,
    ) -> Result<(), RenderNodeError>;

    /// Uploads the pending data, issues the draws and resets.
    fn submit_batch(&mut self, ctx: &DrawingContext, recorder: &mut DrawRecorder);

    fn on_run_begin(&mut self, _ctx: &DrawingContext, _recorder: &mut DrawRecorder) {}

    fn on_run_end(&mut self, _ctx: &DrawingContext, _recorder: &mut DrawRecorder) {}

    /// Changes how many textures one draw may bind. Callers flush first.
    fn set_max_textures(&mut self, _max_textures: usize) {}

    /// Unit `texture` is bound to in the pending batch, if any.
    fn texture_unit(&self, _texture: TextureId) -> Option<u32> {
        None
    }

    fn run(&mut self, ctx: &DrawingContext, recorder: &mut DrawRecorder) {
        if self.instance_count() == 0 {
            return;
        }
        recorder.trace_begin(self.name());
        self.on_run_begin(ctx, recorder);
        log::debug!("{} flushing {} instances", self.name(), self.instance_count());
        self.submit_batch(ctx, recorder);
        self.on_run_end(ctx, recorder);
        recorder.trace_end();
    }
}

/// Instances drawn together with one set of bound textures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchEntry {
    pub start: usize,
    pub count: usize,
    pub textures: SmallVec<[TextureId; 8]>,
}

/// Splits a batch into entries whenever the texture units run out, so one
/// upload can serve several draws.
#[derive(Debug)]
pub struct BatchEntries {
    max_textures: usize,
    current: BatchEntry,
    finished: Vec<BatchEntry>,
    units: HashMap<TextureId, u32>,
}

impl BatchEntries {
    pub fn new(max_textures: usize) -> Self {
        Self {
            max_textures: max_textures.max(1),
            current: BatchEntry::default(),
            finished: Vec::new(),
            units: HashMap::new(),
        }
    }

    pub fn max_textures(&self) -> usize {
        self.max_textures
    }

    pub fn set_max_textures(&mut self, max_textures: usize) {
        self.max_textures = max_textures.max(1);
    }

    /// Unit currently assigned to `texture` in the open entry.
    pub fn texture_unit(&self, texture: TextureId) -> Option<u32> {
        self.units.get(&texture).copied()
    }

    /// Assigns a unit to `texture`, closing the open entry first when its
    /// units are exhausted.
    pub fn bind_texture(&mut self, texture: TextureId, instance_count: usize) -> u32 {
        if let Some(unit) = self.units.get(&texture) {
            return *unit;
        }
        if self.current.textures.len() >= self.max_textures {
            self.push_current(instance_count);
        }
        let unit = self.current.textures.len() as u32;
        self.current.textures.push(texture);
        self.units.insert(texture, unit);
        unit
    }

    pub fn record_instance(&mut self) {
        self.current.count += 1;
    }

    /// Closes the open entry and starts a new one at `instance_count`.
    pub fn push_current(&mut self, instance_count: usize) {
        self.units.clear();
        let next = BatchEntry {
            start: instance_count,
            ..BatchEntry::default()
        };
        let done = std::mem::replace(&mut self.current, next);
        if done.count > 0 {
            self.finished.push(done);
        }
    }

    /// Closes the open entry and returns every entry of the batch, leaving
    /// the tracker empty with no textures resident.
    pub fn drain(&mut self) -> Vec<BatchEntry> {
        self.push_current(0);
        std::mem::take(&mut self.finished)
    }

    pub fn entry_count(&self) -> usize {
        self.finished.len() + usize::from(self.current.count > 0)
    }
}

/// `i, i+1, i+2, i+2, i+1, i+3` per quad over vertices written BL, TL, BR, TR.
pub fn quad_indices(quads: usize) -> Vec<u16> {
    let mut indices = Vec::with_capacity(quads * 6);
    for quad in 0..quads {
        let i = (quad * 4) as u16;
        indices.extend_from_slice(&[i, i + 1, i + 2, i + 2, i + 1, i + 3]);
    }
    indices
}

/// Vertex order inside a quad, as corner indices into `QuadInstance::corners`.
const WRITE_ORDER: [usize; 4] = [1, 0, 3, 2];

/// Layout shared by plain and lit quads.
pub fn quad_layout() -> VertexBufferLayout {
    VertexBufferLayout::complete(
        BufferUsage::Dynamic,
        &[
            AttributeDescriptor::float("inPosition", 2),
            AttributeDescriptor::float("inTexCoord", 2),
            AttributeDescriptor::float("inTexId", 1),
            AttributeDescriptor::float("inTintEffect", 1),
            AttributeDescriptor::new("inTint", 4, AttributeType::Uint8).normalized(),
        ],
    )
}

fn write_quad(writer: &mut VertexWriter<'_>, quad: &QuadInstance, unit: u32) {
    let effect = if quad.tint_fill { 1.0 } else { 0.0 };
    for corner in WRITE_ORDER {
        writer
            .vec2(quad.corners[corner])
            .vec2(quad.corner_uv(corner))
            .f32(unit as f32)
            .f32(effect)
            .u32(quad.tints[corner]);
    }
}

/// Vertex storage and GPU buffer ids for a quad batcher with a static index
/// buffer.
#[derive(Debug)]
struct QuadGeometry {
    vertices: VertexBuffer,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    capacity: usize,
    indices_uploaded: bool,
}

impl QuadGeometry {
    fn new(layout: VertexBufferLayout, capacity: usize, ids: &ResourceIds) -> Self {
        Self {
            vertices: VertexBuffer::new(layout, capacity * 4),
            vertex_buffer: ids.buffer(),
            index_buffer: ids.buffer(),
            capacity,
            indices_uploaded: false,
        }
    }

    fn writer(&mut self, instance: usize) -> VertexWriter<'_> {
        self.vertices.writer_at(instance * 4)
    }

    fn upload(&mut self, instances: usize, recorder: &mut DrawRecorder) {
        if !self.indices_uploaded {
            recorder.push(GpuCommand::UploadIndices {
                buffer: self.index_buffer,
                indices: quad_indices(self.capacity),
            });
            self.indices_uploaded = true;
        }
        recorder.push(GpuCommand::UploadVertices {
            buffer: self.vertex_buffer,
            bytes: self.vertices.populated_bytes(instances * 4).to_vec(),
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_call(
    node: &Cow<'static, str>,
    ctx: &DrawingContext,
    program: ProgramKey,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    textures: SmallVec<[TextureId; 4]>,
    first_index: usize,
    index_count: usize,
) -> DrawCall {
    DrawCall {
        node: node.clone(),
        target: ctx.target(),
        viewport: (ctx.width(), ctx.height()),
        program,
        blend: ctx.blend_mode(),
        scissor: ctx.scissor(),
        vertex_buffer,
        index_buffer,
        textures,
        first_index: first_index as u32,
        index_count: index_count as u32,
        instance_buffer: None,
        instance_count: 1,
    }
}

/// Quads per batch: the configured size, capped so 16-bit indices suffice.
pub fn quads_per_batch(batch_size: usize) -> usize {
    batch_size.clamp(1, MAX_VERTICES / 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_bl_tl_br_tr_winding() {
        assert_eq!(
            quad_indices(2),
            vec![0, 1, 2, 2, 1, 3, 4, 5, 6, 6, 5, 7]
        );
    }

    #[test]
    fn capacity_is_capped_by_index_range() {
        assert_eq!(quads_per_batch(100_000), 16384);
        assert_eq!(quads_per_batch(0), 1);
    }

    #[test]
    fn entries_split_when_units_run_out() {
        let mut entries = BatchEntries::new(2);
        let a = TextureId(1);
        let b = TextureId(2);
        let c = TextureId(3);

        assert_eq!(entries.bind_texture(a, 0), 0);
        entries.record_instance();
        assert_eq!(entries.bind_texture(b, 1), 1);
        entries.record_instance();
        assert_eq!(entries.bind_texture(a, 2), 0);
        entries.record_instance();
        assert_eq!(entries.bind_texture(c, 3), 0);
        entries.record_instance();

        assert_eq!(entries.texture_unit(a), None);
        assert_eq!(entries.texture_unit(c), Some(0));

        let drained = entries.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!((drained[0].start, drained[0].count), (0, 3));
        assert_eq!((drained[1].start, drained[1].count), (3, 1));
        assert_eq!(entries.texture_unit(c), None);
        assert_eq!(entries.entry_count(), 0);
    }

    #[test]
    fn rect_corners_are_tl_bl_tr_br() {
        let quad = QuadInstance::rect(TextureId(1), 0.0, 0.0, 2.0, 1.0);
        assert_eq!(quad.corners[1], Vec2::new(0.0, 1.0));
        assert_eq!(quad.corner_uv(1), Vec2::new(0.0, 1.0));
        assert_eq!(quad.corner_uv(2), Vec2::new(1.0, 0.0));
    }
}
