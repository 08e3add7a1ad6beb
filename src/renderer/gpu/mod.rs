// renderer/gpu/mod.rs
//
// wgpu backend: turns recorded `GpuCommand`s into render passes.

mod executor;
mod pipeline_builder;
mod program;
mod shaders;

pub use executor::{ExecutorError, WgpuExecutor};
pub use pipeline_builder::PipelineBuilder;
pub use program::{pack_uniforms, ProgramDescriptor, UniformSlot, UniformTable, UNIFORM_SLOTS};
pub use shaders::{builtin_programs, MAX_SHADER_LIGHTS};
