use super::{
    draw_call, quad_layout, quads_per_batch, write_quad, BatchHandler, BatchPrimitive,
    QuadGeometry,
};
use crate::renderer::commands::{
    DrawRecorder, GpuCommand, ProgramKey, ResourceIds, TextureId, UniformValue,
};
use crate::renderer::context::DrawingContext;
use crate::renderer::gpu::MAX_SHADER_LIGHTS;
use crate::renderer::node::{RenderNode, RenderNodeError};
use crate::settings::RenderSettings;
use smallvec::smallvec;
use std::borrow::Cow;

/// Batches normal-mapped quads. The diffuse texture is always unit 0 and the
/// normal map unit 1, so any texture change flushes, as does a change of
/// normal-map rotation (it is a uniform).
#[derive(Debug)]
pub struct BatchHandlerQuadLight {
    geometry: QuadGeometry,
    instance_count: usize,
    textures: Option<(TextureId, TextureId)>,
    rotation: f32,
    max_lights: usize,
}

impl BatchHandlerQuadLight {
    pub const PROGRAM: ProgramKey = ProgramKey::new("quad_light");

    pub fn new(settings: &RenderSettings, ids: &ResourceIds) -> Self {
        Self::with_capacity(settings.batch_size, settings.max_lights, ids)
    }

    pub fn with_capacity(batch_size: usize, max_lights: usize, ids: &ResourceIds) -> Self {
        Self {
            geometry: QuadGeometry::new(quad_layout(), quads_per_batch(batch_size), ids),
            instance_count: 0,
            textures: None,
            rotation: 0.0,
            max_lights: max_lights.clamp(1, MAX_SHADER_LIGHTS),
        }
    }

    fn set_uniform(
        &self,
        recorder: &mut DrawRecorder,
        name: impl Into<Cow<'static, str>>,
        value: UniformValue,
    ) {
        recorder.push(GpuCommand::SetUniform {
            program: Self::PROGRAM,
            name: name.into(),
            value,
        });
    }
}

impl RenderNode for BatchHandlerQuadLight {
    fn name(&self) -> &str {
        "BatchHandlerQuadLight"
    }
}

impl BatchHandler for BatchHandlerQuadLight {
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
                key: Cow::Borrowed("BatchHandlerQuadLight"),
                primitive: primitive.kind(),
            });
        };

        let (normal_map, rotation) = match quad.lighting {
            Some(lighting) => (lighting.normal_map, lighting.rotation),
            None => (TextureId::FALLBACK, 0.0),
        };
        let textures = (quad.texture, normal_map);

        if self.instance_count > 0 && (self.textures != Some(textures) || self.rotation != rotation)
        {
            self.run(ctx, recorder);
        }
        self.textures = Some(textures);
        self.rotation = rotation;

        write_quad(&mut self.geometry.writer(self.instance_count), quad, 0);
        self.instance_count += 1;

        if self.instance_count == self.instances_per_batch() {
            self.run(ctx, recorder);
        }
        Ok(())
    }

    fn on_run_begin(&mut self, ctx: &DrawingContext, recorder: &mut DrawRecorder) {
        let camera = ctx.camera();
        self.set_uniform(
            recorder,
            "uCamera",
            UniformValue::Vec4([camera.scroll.x, camera.scroll.y, camera.rotation, camera.zoom]),
        );
        self.set_uniform(
            recorder,
            "uResolution",
            UniformValue::Vec2([ctx.width() as f32, ctx.height() as f32]),
        );

        let (s, c) = self.rotation.sin_cos();
        self.set_uniform(
            recorder,
            "uInverseRotationMatrix",
            UniformValue::Floats(vec![c, -s, s, c]),
        );

        let Some(env) = camera.lights.as_deref() else {
            self.set_uniform(recorder, "uAmbientLightColor", UniformValue::Vec3([1.0; 3]));
            self.set_uniform(recorder, "uLightCount", UniformValue::Int(0));
            return;
        };

        self.set_uniform(recorder, "uAmbientLightColor", UniformValue::Vec3(env.ambient));
        let lights = &env.lights[..env.lights.len().min(self.max_lights)];
        self.set_uniform(recorder, "uLightCount", UniformValue::Int(lights.len() as i32));

        for (i, light) in lights.iter().enumerate() {
            let screen = camera
                .view_matrix(light.scroll_factor)
                .transform_point2(light.position.truncate());
            self.set_uniform(
                recorder,
                format!("uLights[{i}].position"),
                UniformValue::Vec3([screen.x, ctx.height() as f32 - screen.y, light.position.z]),
            );
            self.set_uniform(
                recorder,
                format!("uLights[{i}].color"),
                UniformValue::Vec3(light.color),
            );
            self.set_uniform(
                recorder,
                format!("uLights[{i}].intensity"),
                UniformValue::Float(light.intensity),
            );
            self.set_uniform(
                recorder,
                format!("uLights[{i}].radius"),
                UniformValue::Float(light.radius * camera.zoom),
            );
        }
    }

    fn submit_batch(&mut self, ctx: &DrawingContext, recorder: &mut DrawRecorder) {
        let Some((texture, normal_map)) = self.textures else {
            return;
        };
        self.geometry.upload(self.instance_count, recorder);
        recorder.push(GpuCommand::Draw(draw_call(
            &Cow::Borrowed("BatchHandlerQuadLight"),
            ctx,
            Self::PROGRAM,
            self.geometry.vertex_buffer,
            self.geometry.index_buffer,
            smallvec![texture, normal_map],
            0,
            self.instance_count * 6,
        )));
        self.instance_count = 0;
        self.textures = None;
    }
}
