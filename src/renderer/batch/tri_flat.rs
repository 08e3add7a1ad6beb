use super::{draw_call, BatchHandler, BatchPrimitive, MAX_VERTICES};
use crate::renderer::commands::{BufferId, DrawRecorder, GpuCommand, ProgramKey, ResourceIds};
use crate::renderer::context::DrawingContext;
use crate::renderer::node::{RenderNode, RenderNodeError};
use crate::renderer::vertex_layout::{
    AttributeDescriptor, AttributeType, BufferUsage, VertexBuffer, VertexBufferLayout,
};
use crate::settings::RenderSettings;
use glam::Vec2;
use smallvec::SmallVec;
use std::borrow::Cow;

/// Batches flat-colored indexed triangles (fills, polygons). Unlike the quad
/// handlers the index buffer is rebuilt each batch, and capacity is counted
/// in vertices and indices.
#[derive(Debug)]
pub struct BatchHandlerTriFlat {
    vertices: VertexBuffer,
    indices: Vec<u16>,
    vertex_count: usize,
    vertex_capacity: usize,
    index_capacity: usize,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
}

impl BatchHandlerTriFlat {
    pub const PROGRAM: ProgramKey = ProgramKey::new("tri_flat");

    pub fn new(settings: &RenderSettings, ids: &ResourceIds) -> Self {
        Self::with_capacity(settings.batch_size, ids)
    }

    pub fn with_capacity(batch_size: usize, ids: &ResourceIds) -> Self {
        let batch_size = batch_size.max(1);
        let vertex_capacity = (batch_size * 4).min(MAX_VERTICES);
        Self {
            vertices: VertexBuffer::new(Self::layout(), vertex_capacity),
            indices: Vec::with_capacity(batch_size * 6),
            vertex_count: 0,
            vertex_capacity,
            index_capacity: batch_size * 6,
            vertex_buffer: ids.buffer(),
            index_buffer: ids.buffer(),
        }
    }

    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout::complete(
            BufferUsage::Stream,
            &[
                AttributeDescriptor::float("inPosition", 2),
                AttributeDescriptor::new("inTint", 4, AttributeType::Uint8).normalized(),
            ],
        )
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Writes one primitive that fits an empty batch, flushing first when it
    /// does not fit the current one.
    fn append(
        &mut self,
        ctx: &DrawingContext,
        recorder: &mut DrawRecorder,
        vertices: impl ExactSizeIterator<Item = (Vec2, u32)>,
        indices: &[u16],
    ) {
        if self.vertex_count + vertices.len() > self.vertex_capacity
            || self.indices.len() + indices.len() > self.index_capacity
        {
            self.run(ctx, recorder);
        }

        let base = self.vertex_count as u16;
        let written = vertices.len();
        let mut writer = self.vertices.writer_at(self.vertex_count);
        for (position, color) in vertices {
            writer.vec2(position).u32(color);
        }
        self.indices.extend(indices.iter().map(|index| base + index));
        self.vertex_count += written;
    }
}

impl RenderNode for BatchHandlerTriFlat {
    fn name(&self) -> &str {
        "BatchHandlerTriFlat"
    }
}

impl BatchHandler for BatchHandlerTriFlat {
    /// Triangles waiting to be drawn.
    fn instance_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn instances_per_batch(&self) -> usize {
        self.index_capacity / 3
    }

    fn batch(
        &mut self,
        ctx: &DrawingContext,
        primitive: BatchPrimitive<'_>,
        recorder: &mut DrawRecorder,
    ) -> Result<(), RenderNodeError> {
        let BatchPrimitive::Triangles(tris) = primitive else {
            return Err(RenderNodeError::UnsupportedPrimitive {
                key: Cow::Borrowed("BatchHandlerTriFlat"),
                primitive: primitive.kind(),
            });
        };

        if let Some(&index) = tris
            .indices
            .iter()
            .find(|&&index| usize::from(index) >= tris.vertices.len())
        {
            return Err(RenderNodeError::IndexOutOfRange {
                index,
                vertices: tris.vertices.len(),
            });
        }

        let fallback = tris.colors.last().copied().unwrap_or(0xffff_ffff);
        let color = |i: usize| tris.colors.get(i).copied().unwrap_or(fallback);

        if tris.vertices.len() <= self.vertex_capacity && tris.indices.len() <= self.index_capacity {
            let vertices = tris.vertices.iter().enumerate().map(|(i, v)| (*v, color(i)));
            self.append(ctx, recorder, vertices, &tris.indices);
            return Ok(());
        }

        // too big for one batch: unshare the vertices and spread the
        // triangles over as many flushes as needed
        log::debug!(
            "Splitting polygon with {} vertices over batches of {}",
            tris.vertices.len(),
            self.vertex_capacity
        );
        for triangle in tris.indices.chunks_exact(3) {
            let corners = triangle.iter().map(|&index| {
                let i = usize::from(index);
                (tris.vertices[i], color(i))
            });
            self.append(ctx, recorder, corners, &[0, 1, 2]);
        }
        Ok(())
    }

    fn submit_batch(&mut self, ctx: &DrawingContext, recorder: &mut DrawRecorder) {
        recorder.push(GpuCommand::UploadVertices {
            buffer: self.vertex_buffer,
            bytes: self.vertices.populated_bytes(self.vertex_count).to_vec(),
        });
        let index_count = self.indices.len();
        recorder.push(GpuCommand::UploadIndices {
            buffer: self.index_buffer,
            indices: std::mem::take(&mut self.indices),
        });
        recorder.push(GpuCommand::Draw(draw_call(
            &Cow::Borrowed("BatchHandlerTriFlat"),
            ctx,
            Self::PROGRAM,
            self.vertex_buffer,
            self.index_buffer,
            SmallVec::new(),
            0,
            index_count,
        )));
        self.vertex_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::batch::FlatTriangles;

    fn square() -> FlatTriangles {
        FlatTriangles::quad(
            [
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
            ],
            [0xff00_00ff; 4],
        )
    }

    #[test]
    fn indices_are_rebased_per_primitive() {
        let mut node = BatchHandlerTriFlat::with_capacity(8, &ResourceIds::default());
        let ctx = DrawingContext::canvas(16, 16);
        let mut rec = DrawRecorder::default();

        node.batch(&ctx, BatchPrimitive::Triangles(&square()), &mut rec)
            .unwrap();
        node.batch(&ctx, BatchPrimitive::Triangles(&square()), &mut rec)
            .unwrap();
        node.run(&ctx, &mut rec);

        let uploaded = rec.commands().iter().find_map(|c| match c {
            GpuCommand::UploadIndices { indices, .. } => Some(indices.clone()),
            _ => None,
        });
        assert_eq!(
            uploaded,
            Some(vec![0, 1, 2, 2, 1, 3, 4, 5, 6, 6, 5, 7])
        );
        assert_eq!(rec.draw_calls().next().map(|d| d.index_count), Some(12));
    }

    #[test]
    fn overflow_flushes_before_writing() {
        let mut node = BatchHandlerTriFlat::with_capacity(1, &ResourceIds::default());
        let ctx = DrawingContext::canvas(16, 16);
        let mut rec = DrawRecorder::default();

        node.batch(&ctx, BatchPrimitive::Triangles(&square()), &mut rec)
            .unwrap();
        node.batch(&ctx, BatchPrimitive::Triangles(&square()), &mut rec)
            .unwrap();

        assert_eq!(rec.stats().draw_calls, 1);
        assert_eq!(node.vertex_count(), 4);
    }

    fn fan(points: usize) -> FlatTriangles {
        let vertices: Vec<Vec2> = (0..points)
            .map(|i| {
                let angle = i as f32 / points as f32 * std::f32::consts::TAU;
                Vec2::new(angle.cos(), angle.sin()) * 10.0
            })
            .collect();
        let indices = (1..points as u16 - 1)
            .flat_map(|i| [0, i, i + 1])
            .collect();
        FlatTriangles {
            colors: vec![0xffff_ffff; points],
            vertices,
            indices,
        }
    }

    #[test]
    fn oversized_polygons_are_split_across_flushes() {
        // two quads per batch: 8 vertices, 12 indices
        let mut node = BatchHandlerTriFlat::with_capacity(2, &ResourceIds::default());
        let ctx = DrawingContext::canvas(16, 16);
        let mut rec = DrawRecorder::default();

        node.batch(&ctx, BatchPrimitive::Triangles(&fan(10)), &mut rec)
            .unwrap();
        node.run(&ctx, &mut rec);

        // 8 triangles, at most 2 whole triangles per batch by vertex count
        let drawn: u32 = rec.draw_calls().map(|d| d.index_count).sum();
        assert_eq!(drawn, 8 * 3);
        assert_eq!(rec.stats().draw_calls, 4);
        assert_eq!(node.vertex_count(), 0);
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut node = BatchHandlerTriFlat::with_capacity(8, &ResourceIds::default());
        let ctx = DrawingContext::canvas(16, 16);
        let mut rec = DrawRecorder::default();
        let mut tris = square();
        tris.indices[4] = 60_000;

        let err = node
            .batch(&ctx, BatchPrimitive::Triangles(&tris), &mut rec)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderNodeError::IndexOutOfRange {
                index: 60_000,
                vertices: 4
            }
        ));
        assert_eq!(node.vertex_count(), 0);
    }
}
