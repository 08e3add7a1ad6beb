// renderer/gpu/executor.rs
//
// Replays recorded frames on a wgpu device.

use super::pipeline_builder::PipelineBuilder;
use super::program::{pack_uniforms, ProgramDescriptor, UniformTable, UNIFORM_SLOTS};
use super::shaders::{builtin_programs, CLEAR_SOURCE};
use crate::renderer::blend::BlendMode;
use crate::renderer::commands::{
    BufferId, DrawCall, GpuCommand, ScissorBox, TargetId, TextureId,
};
use crate::renderer::vertex_layout::LayoutError;
use crate::settings::RenderSettings;
use log::{debug, info, warn};
use std::collections::HashMap;
use thiserror::Error;
use wgpu::util::DeviceExt;

// Never handed out by `ResourceIds`, which counts up from 1.
const CANVAS_TEXTURE: TextureId = TextureId(u32::MAX);

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no program named `{0}` is registered")]
    UnknownProgram(&'static str),
    #[error("draw targets {0:?}, which was never created")]
    UnknownTarget(TargetId),
    #[error("buffer {0:?} was used before anything was uploaded to it")]
    UnknownBuffer(BufferId),
    #[error("texture data is {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    TextureSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("the canvas was drawn to before `attach_canvas`")]
    NoCanvas,
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("no suitable adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct Program {
    descriptor: ProgramDescriptor,
    shader: wgpu::ShaderModule,
    bind_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

struct ClearPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
}

pub struct WgpuExecutor {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    texture_units: u32,
    sampler: wgpu::Sampler,
    fallback: GpuTexture,
    programs: HashMap<&'static str, Program>,
    pipelines: HashMap<(&'static str, BlendMode), wgpu::RenderPipeline>,
    uniforms: HashMap<&'static str, UniformTable>,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    textures: HashMap<TextureId, GpuTexture>,
    targets: HashMap<TargetId, TextureId>,
    clear: ClearPipeline,
}

impl WgpuExecutor {
    /// Wraps an existing device. Registers the built-in programs for
    /// `texture_units` quad texture slots, capped by the device limits.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        texture_units: u32,
    ) -> Self {
        let texture_units = texture_units
            .min(device.limits().max_sampled_textures_per_shader_stage)
            .max(1);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Batch Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let clear = create_clear_pipeline(&device, format);
        // a 1x1 white texel stands in for unbound slots
        let fallback = create_texture(&device, format, 1, 1, wgpu::TextureUsages::COPY_DST);
        write_pixels(&queue, &fallback, &[255; 4]);

        let mut executor = Self {
            device,
            queue,
            format,
            texture_units,
            sampler,
            fallback,
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            uniforms: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            targets: HashMap::new(),
            clear,
        };

        for descriptor in builtin_programs(texture_units) {
            executor.register_program(descriptor);
        }
        executor
    }

    /// Requests an adapter without a surface and renders offscreen.
    pub async fn headless(settings: &RenderSettings) -> Result<Self, ExecutorError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        info!("Using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Batch Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        let mut executor = Self::new(
            device,
            queue,
            wgpu::TextureFormat::Rgba8Unorm,
            requested_units(settings),
        );
        executor.attach_canvas(settings.resolution.width, settings.resolution.height);
        Ok(executor)
    }

    /// Quad texture slots the shaders were built with. Feed this back to the
    /// node manager so batches never outgrow the shader.
    pub fn texture_units(&self) -> u32 {
        self.texture_units
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn register_program(&mut self, descriptor: ProgramDescriptor) {
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(descriptor.name),
                source: wgpu::ShaderSource::Wgsl(descriptor.source.clone()),
            });

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        for slot in 0..descriptor.texture_slots {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot + 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }

        let bind_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(descriptor.name),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(descriptor.name),
                bind_group_layouts: &[&bind_layout],
                push_constant_ranges: &[],
            });

        debug!("Registered program {}", descriptor.name);
        self.pipelines.retain(|(name, _), _| *name != descriptor.name);
        self.programs.insert(
            descriptor.name,
            Program {
                descriptor,
                shader,
                bind_layout,
                pipeline_layout,
            },
        );
    }

    /// Uploads tightly packed RGBA8 pixels for a texture registered with the
    /// node manager.
    pub fn upload_texture(
        &mut self,
        id: TextureId,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<(), ExecutorError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected || width == 0 || height == 0 {
            return Err(ExecutorError::TextureSize {
                width,
                height,
                expected,
                actual: rgba.len(),
            });
        }
        let texture = create_texture(
            &self.device,
            self.format,
            width,
            height,
            wgpu::TextureUsages::COPY_DST,
        );
        write_pixels(&self.queue, &texture, rgba);
        self.textures.insert(id, texture);
        Ok(())
    }

    /// Creates the offscreen texture that stands in for the canvas.
    pub fn attach_canvas(&mut self, width: u32, height: u32) {
        self.insert_texture(
            CANVAS_TEXTURE,
            width.max(1),
            height.max(1),
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        self.targets.insert(TargetId::CANVAS, CANVAS_TEXTURE);
    }

    pub fn canvas_view(&self) -> Option<&wgpu::TextureView> {
        self.textures.get(&CANVAS_TEXTURE).map(|t| &t.view)
    }

    /// Replays one frame and submits it.
    pub fn execute(&mut self, commands: &[GpuCommand]) -> Result<(), ExecutorError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Batch Encoder"),
            });

        for command in commands {
            match command {
                GpuCommand::CreateTarget {
                    target,
                    texture,
                    width,
                    height,
                } => {
                    self.insert_texture(
                        *texture,
                        *width,
                        *height,
                        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    );
                    self.targets.insert(*target, *texture);
                }
                GpuCommand::DestroyTarget { target } => {
                    if let Some(texture) = self.targets.remove(target) {
                        self.textures.remove(&texture);
                    }
                }
                GpuCommand::UploadIndices { buffer, indices } => {
                    self.upload(*buffer, bytemuck::cast_slice(indices), wgpu::BufferUsages::INDEX);
                }
                GpuCommand::UploadVertices { buffer, bytes } => {
                    self.upload(*buffer, bytes, wgpu::BufferUsages::VERTEX);
                }
                GpuCommand::SetUniform {
                    program,
                    name,
                    value,
                } => {
                    self.uniforms
                        .entry(program.name)
                        .or_default()
                        .insert(name.clone(), value.clone());
                }
                GpuCommand::Clear {
                    target,
                    color,
                    scissor,
                } => self.clear(&mut encoder, *target, *color, *scissor)?,
                GpuCommand::Draw(call) => self.draw(&mut encoder, call)?,
            }
        }

        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn insert_texture(&mut self, id: TextureId, width: u32, height: u32, extra: wgpu::TextureUsages) {
        let texture = create_texture(&self.device, self.format, width, height, extra);
        self.textures.insert(id, texture);
    }

    // Every upload gets a fresh buffer so draws already encoded keep the
    // contents they were recorded with.
    fn upload(&mut self, id: BufferId, bytes: &[u8], usage: wgpu::BufferUsages) {
        if bytes.is_empty() {
            return;
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytes,
                usage,
            });
        self.buffers.insert(id, buffer);
    }

    fn target_texture(&self, target: TargetId) -> Result<&GpuTexture, ExecutorError> {
        self.targets
            .get(&target)
            .and_then(|texture| self.textures.get(texture))
            .ok_or(if target == TargetId::CANVAS {
                ExecutorError::NoCanvas
            } else {
                ExecutorError::UnknownTarget(target)
            })
    }

    fn clear(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: TargetId,
        color: [f32; 4],
        scissor: Option<ScissorBox>,
    ) -> Result<(), ExecutorError> {
        let texture = self.target_texture(target)?;
        let [r, g, b, a] = color.map(f64::from);

        let region = scissor.filter(|s| !s.covers(texture.width, texture.height));
        let Some(region) = region else {
            let _ = begin_pass(
                encoder,
                &texture.view,
                wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
            );
            return Ok(());
        };

        let Some((x, y, w, h)) = clip_scissor(region, texture.width, texture.height) else {
            return Ok(());
        };
        let color_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Clear Color"),
                contents: bytemuck::cast_slice(&color),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clear Bind Group"),
            layout: &self.clear.bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: color_buffer.as_entire_binding(),
            }],
        });

        let mut pass = begin_pass(encoder, &texture.view, wgpu::LoadOp::Load);
        pass.set_pipeline(&self.clear.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_scissor_rect(x, y, w, h);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn pipeline(&mut self, name: &'static str, blend: BlendMode) -> Result<(), ExecutorError> {
        if self.pipelines.contains_key(&(name, blend)) {
            return Ok(());
        }
        let program = self
            .programs
            .get(name)
            .ok_or(ExecutorError::UnknownProgram(name))?;
        let layout = &program.descriptor.layout;
        let attributes = layout.wgpu_attributes()?;
        let instances = match &program.descriptor.instance_layout {
            Some(instance_layout) => Some((
                instance_layout.stride(),
                instance_layout.wgpu_attributes_from(layout.location_count())?,
            )),
            None => None,
        };

        let mut builder = PipelineBuilder::new(&self.device, &program.pipeline_layout, &program.shader)
            .with_label(name)
            .with_vertex_buffer(wgpu::VertexBufferLayout {
                array_stride: layout.stride() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            });
        if let Some((stride, instance_attributes)) = &instances {
            builder = builder.with_vertex_buffer(wgpu::VertexBufferLayout {
                array_stride: *stride as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: instance_attributes,
            });
        }
        let pipeline = builder
            .with_color_target(self.format, Some(blend.to_wgpu()))
            .build();

        debug!("Built pipeline {name} with {blend:?} blending");
        self.pipelines.insert((name, blend), pipeline);
        Ok(())
    }

    fn draw(&mut self, encoder: &mut wgpu::CommandEncoder, call: &DrawCall) -> Result<(), ExecutorError> {
        if call.index_count == 0 || call.instance_count == 0 {
            return Ok(());
        }
        self.pipeline(call.program.name, call.blend)?;

        let program = self
            .programs
            .get(call.program.name)
            .ok_or(ExecutorError::UnknownProgram(call.program.name))?;
        let target = self.target_texture(call.target)?;
        let vertices = self
            .buffers
            .get(&call.vertex_buffer)
            .ok_or(ExecutorError::UnknownBuffer(call.vertex_buffer))?;
        let indices = self
            .buffers
            .get(&call.index_buffer)
            .ok_or(ExecutorError::UnknownBuffer(call.index_buffer))?;
        let instances = match call.instance_buffer {
            Some(id) => Some(self.buffers.get(&id).ok_or(ExecutorError::UnknownBuffer(id))?),
            None => None,
        };

        let scissor = match call.scissor {
            Some(scissor) => match clip_scissor(scissor, target.width, target.height) {
                Some(rect) => Some(rect),
                None => return Ok(()),
            },
            None => None,
        };

        let block = pack_uniforms(
            &program.descriptor,
            call.program.variant,
            call.viewport,
            self.uniforms.get(call.program.name),
        );
        debug_assert_eq!(block.len(), UNIFORM_SLOTS);
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(call.program.name),
                contents: bytemuck::cast_slice(&block),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let fallback = &self.fallback.view;
        let views: Vec<&wgpu::TextureView> = (0..program.descriptor.texture_slots as usize)
            .map(|slot| {
                let id = call.textures.get(slot).copied().unwrap_or(TextureId::FALLBACK);
                match self.textures.get(&id) {
                    Some(texture) => &texture.view,
                    None if id == TextureId::FALLBACK => fallback,
                    None => {
                        warn!("{} samples unknown texture {id:?}", call.node);
                        fallback
                    }
                }
            })
            .collect();

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for (slot, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 + 2,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(call.program.name),
            layout: &program.bind_layout,
            entries: &entries,
        });

        let Some(pipeline) = self.pipelines.get(&(call.program.name, call.blend)) else {
            return Err(ExecutorError::UnknownProgram(call.program.name));
        };
        let mut pass = begin_pass(encoder, &target.view, wgpu::LoadOp::Load);
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        if let Some((x, y, w, h)) = scissor {
            pass.set_scissor_rect(x, y, w, h);
        }
        pass.set_vertex_buffer(0, vertices.slice(..));
        if let Some(instances) = instances {
            pass.set_vertex_buffer(1, instances.slice(..));
        }
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(
            call.first_index..call.first_index + call.index_count,
            0,
            0..call.instance_count,
        );
        Ok(())
    }
}

/// Texture units the settings ask for; `new` caps them by the device.
fn requested_units(settings: &RenderSettings) -> u32 {
    u32::try_from(settings.max_textures).unwrap_or(u32::MAX)
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: None,
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            depth_slice: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

/// Intersects a scissor box with the target. `None` when nothing is left.
fn clip_scissor(scissor: ScissorBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x = scissor.x.min(width);
    let y = scissor.y.min(height);
    let w = scissor.width.min(width - x);
    let h = scissor.height.min(height - y);
    (w > 0 && h > 0).then_some((x, y, w, h))
}

fn create_texture(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    extra: wgpu::TextureUsages,
) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: None,
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | extra,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        width,
        height,
    }
}

fn write_pixels(queue: &wgpu::Queue, target: &GpuTexture, rgba: &[u8]) {
    let size = wgpu::Extent3d {
        width: target.width,
        height: target.height,
        depth_or_array_layers: 1,
    };
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * target.width),
            rows_per_image: Some(target.height),
        },
        size,
    );
}

fn create_clear_pipeline(device: &wgpu::Device, format: wgpu::TextureFormat) -> ClearPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Clear Shader"),
        source: wgpu::ShaderSource::Wgsl(CLEAR_SOURCE.into()),
    });
    let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Clear Bind Group Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Clear Pipeline Layout"),
        bind_group_layouts: &[&bind_layout],
        push_constant_ranges: &[],
    });
    let pipeline = PipelineBuilder::new(device, &layout, &shader)
        .with_label("Clear Pipeline")
        .with_color_target(format, Some(wgpu::BlendState::REPLACE))
        .build();
    ClearPipeline {
        pipeline,
        bind_layout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_is_clipped_to_target() {
        let clipped = clip_scissor(ScissorBox::new(50, 10, 100, 100), 100, 80);
        assert_eq!(clipped, Some((50, 10, 50, 70)));
    }

    #[test]
    fn requested_units_saturate() {
        let mut settings = RenderSettings::default();
        settings.max_textures = 8;
        assert_eq!(requested_units(&settings), 8);
        settings.max_textures = usize::MAX;
        assert_eq!(requested_units(&settings), u32::MAX);
    }

    #[test]
    fn scissor_outside_target_is_empty() {
        assert_eq!(clip_scissor(ScissorBox::new(120, 0, 10, 10), 100, 100), None);
        assert_eq!(clip_scissor(ScissorBox::new(0, 0, 0, 10), 100, 100), None);
    }
}
