// renderer/gpu/program.rs
use crate::renderer::commands::UniformValue;
use crate::renderer::vertex_layout::VertexBufferLayout;
use std::borrow::Cow;
use std::collections::HashMap;

/// vec4 slots in every program's uniform block.
pub const UNIFORM_SLOTS: usize = 64;

/// Named uniform values last set for one program.
pub type UniformTable = HashMap<Cow<'static, str>, UniformValue>;

/// A uniform a program reads and the vec4 slots reserved for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: Cow<'static, str>,
    pub slots: usize,
}

impl UniformSlot {
    pub fn new(name: impl Into<Cow<'static, str>>, slots: usize) -> Self {
        Self {
            name: name.into(),
            slots: slots.max(1),
        }
    }
}

/// Everything the executor needs to build pipelines for one program.
///
/// Slot 0 of the uniform block is filled by the executor with
/// `(variant, viewport width, viewport height, 0)`. Declared uniforms
/// follow in order.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub name: &'static str,
    pub source: Cow<'static, str>,
    pub layout: VertexBufferLayout,
    /// Bound to the second vertex slot and stepped per instance.
    pub instance_layout: Option<VertexBufferLayout>,
    pub uniforms: Vec<UniformSlot>,
    pub texture_slots: u32,
}

impl ProgramDescriptor {
    pub fn new(name: &'static str, source: impl Into<Cow<'static, str>>, layout: VertexBufferLayout) -> Self {
        Self {
            name,
            source: source.into(),
            layout,
            instance_layout: None,
            uniforms: Vec::new(),
            texture_slots: 0,
        }
    }

    pub fn with_uniform(mut self, name: impl Into<Cow<'static, str>>, slots: usize) -> Self {
        self.uniforms.push(UniformSlot::new(name, slots));
        self
    }

    pub fn with_instances(mut self, layout: VertexBufferLayout) -> Self {
        self.instance_layout = Some(layout);
        self
    }

    pub fn with_textures(mut self, texture_slots: u32) -> Self {
        self.texture_slots = texture_slots;
        self
    }

    /// First slot of `name` inside the uniform block.
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        let mut slot = 1;
        for uniform in &self.uniforms {
            if uniform.name == name {
                return Some(slot);
            }
            slot += uniform.slots;
        }
        None
    }
}

/// Lays the program's uniforms out in declaration order. Values that were
/// never set stay zero; slots past the block are dropped.
pub fn pack_uniforms(
    descriptor: &ProgramDescriptor,
    variant: u32,
    viewport: (u32, u32),
    values: Option<&UniformTable>,
) -> Vec<[f32; 4]> {
    let mut block = vec![[0.0f32; 4]; UNIFORM_SLOTS];
    block[0] = [variant as f32, viewport.0 as f32, viewport.1 as f32, 0.0];

    let mut slot = 1;
    for uniform in &descriptor.uniforms {
        let end = (slot + uniform.slots).min(UNIFORM_SLOTS);
        if slot >= end {
            log::warn!(
                "Program {} uniform {} does not fit the uniform block",
                descriptor.name,
                uniform.name
            );
            break;
        }
        if let Some(value) = values.and_then(|table| table.get(&uniform.name)) {
            value.write_slots(&mut block[slot..end]);
        }
        slot += uniform.slots;
    }
    block
}
