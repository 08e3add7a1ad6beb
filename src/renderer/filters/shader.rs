// renderer/filters/shader.rs
use super::{Filter, FilterController, Padding};
use crate::renderer::blend::BlendMode;
use crate::renderer::commands::{
    BufferId, DrawCall, GpuCommand, ProgramKey, ResourceIds, TextureId, UniformValue,
};
use crate::renderer::context::DrawingContext;
use crate::renderer::manager::RenderNodeManager;
use crate::renderer::node::{RenderNode, RenderNodeError};
use crate::renderer::vertex_layout::{AttributeDescriptor, BufferUsage, VertexBufferLayout};
use smallvec::{smallvec, SmallVec};
use std::borrow::Cow;
use std::cell::Cell;

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

/// Clip-space position and texture coordinate per vertex.
pub fn filter_layout() -> VertexBufferLayout {
    VertexBufferLayout::complete(
        BufferUsage::Stream,
        &[
            AttributeDescriptor::float("inPosition", 2),
            AttributeDescriptor::float("inTexCoord", 2),
        ],
    )
}

/// A quad covering the whole output, in BL, TL, BR, TR order. Texture
/// coordinates reach past 0..1 by the padding so the input lands unscaled.
pub fn filter_quad_vertices(padding: Padding, width: u32, height: u32) -> [f32; 16] {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    let u0 = -padding.left / w;
    let u1 = 1.0 + padding.right / w;
    let v0 = -padding.top / h;
    let v1 = 1.0 + padding.bottom / h;
    [
        -1.0, -1.0, u0, v1, //
        -1.0, 1.0, u0, v0, //
        1.0, -1.0, u1, v1, //
        1.0, 1.0, u1, v0,
    ]
}

/// The parts of a single-pass filter that differ between effects.
pub trait FilterShader {
    fn name(&self) -> &'static str;

    fn program(&self, controller: &FilterController) -> ProgramKey;

    /// Textures bound for the pass. The input comes first.
    fn textures(&self, _controller: &FilterController, input: TextureId) -> SmallVec<[TextureId; 4]> {
        smallvec![input]
    }

    fn uniforms(
        &self,
        _controller: &FilterController,
        _input: &DrawingContext,
    ) -> Vec<(&'static str, UniformValue)> {
        Vec::new()
    }
}

/// Runs one full-target pass with a [`FilterShader`].
pub struct ShaderFilter<S> {
    shader: S,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    indices_uploaded: Cell<bool>,
}

impl<S: FilterShader> ShaderFilter<S> {
    pub fn new(shader: S, ids: &ResourceIds) -> Self {
        Self {
            shader,
            vertex_buffer: ids.buffer(),
            index_buffer: ids.buffer(),
            indices_uploaded: Cell::new(false),
        }
    }

    pub fn shader(&self) -> &S {
        &self.shader
    }
}

impl<S: FilterShader> RenderNode for ShaderFilter<S> {
    fn name(&self) -> &str {
        self.shader.name()
    }
}

impl<S: FilterShader> Filter for ShaderFilter<S> {
    fn run(
        &self,
        manager: &mut RenderNodeManager,
        controller: &FilterController,
        input: DrawingContext,
        output: Option<DrawingContext>,
        padding: Option<Padding>,
    ) -> Result<DrawingContext, RenderNodeError> {
        let texture = input.texture().ok_or(RenderNodeError::CanvasInput)?;
        manager.start_stand_alone_render();

        let padding = padding.unwrap_or_default();
        let output = match output {
            Some(output) => output,
            None => {
                let (width, height) = padding.grow(input.width(), input.height());
                manager.allocate_context(width, height)
            }
        };

        manager.recorder_mut().trace_begin(self.shader.name());
        manager.use_context(&output);

        let program = self.shader.program(controller);
        let vertices = filter_quad_vertices(padding, input.width(), input.height());
        let mut uniforms = vec![(
            "uResolution",
            UniformValue::Vec2([input.width() as f32, input.height() as f32]),
        )];
        uniforms.extend(self.shader.uniforms(controller, &input));

        let rec = manager.recorder_mut();
        if !self.indices_uploaded.replace(true) {
            rec.push(GpuCommand::UploadIndices {
                buffer: self.index_buffer,
                indices: QUAD_INDICES.to_vec(),
            });
        }
        rec.push(GpuCommand::UploadVertices {
            buffer: self.vertex_buffer,
            bytes: bytemuck::cast_slice(&vertices).to_vec(),
        });
        for (name, value) in uniforms {
            rec.push(GpuCommand::SetUniform {
                program,
                name: Cow::Borrowed(name),
                value,
            });
        }
        rec.push(GpuCommand::Draw(DrawCall {
            node: Cow::Borrowed(self.shader.name()),
            target: output.target(),
            viewport: (output.width(), output.height()),
            program,
            blend: BlendMode::Copy,
            scissor: None,
            vertex_buffer: self.vertex_buffer,
            index_buffer: self.index_buffer,
            textures: self.shader.textures(controller, texture),
            first_index: 0,
            index_count: QUAD_INDICES.len() as u32,
            instance_buffer: None,
            instance_count: 1,
        }));
        rec.trace_end();

        manager.release_context(input);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_two_vec2s() {
        let layout = filter_layout();
        assert_eq!(layout.stride(), 16);
        assert_eq!(layout.attribute("inTexCoord").map(|a| a.offset), Some(8));
    }

    #[test]
    fn padding_extends_texture_coordinates() {
        let v = filter_quad_vertices(Padding::uniform(5.0), 10, 20);
        // bottom-left
        assert_eq!(&v[0..4], &[-1.0, -1.0, -0.5, 1.25]);
        // top-right
        assert_eq!(&v[12..16], &[1.0, 1.0, 1.5, -0.25]);
    }

    #[test]
    fn unpadded_quad_maps_unit_square() {
        let v = filter_quad_vertices(Padding::ZERO, 8, 8);
        assert_eq!(&v[4..8], &[-1.0, 1.0, 0.0, 0.0]);
        assert_eq!(&v[8..12], &[1.0, -1.0, 1.0, 1.0]);
    }
}
