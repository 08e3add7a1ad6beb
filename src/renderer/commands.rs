// renderer/commands.rs
//
// Everything the node graph wants the GPU to do is appended here as a
// `GpuCommand`. The executor in `gpu` replays a frame's commands in order.

use super::blend::BlendMode;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl TextureId {
    /// Never allocated; executors bind their fallback texture for it.
    pub const FALLBACK: TextureId = TextureId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

impl TargetId {
    /// The presentation surface.
    pub const CANVAS: TargetId = TargetId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Hands out ids for GPU resources. Shared by reference during node
/// construction, hence the interior mutability.
#[derive(Debug)]
pub struct ResourceIds {
    next_texture: Cell<u32>,
    next_target: Cell<u32>,
    next_buffer: Cell<u32>,
}

impl Default for ResourceIds {
    fn default() -> Self {
        Self {
            next_texture: Cell::new(1),
            // 0 is the canvas
            next_target: Cell::new(1),
            next_buffer: Cell::new(1),
        }
    }
}

impl ResourceIds {
    pub fn texture(&self) -> TextureId {
        TextureId(bump(&self.next_texture))
    }

    pub fn target(&self) -> TargetId {
        TargetId(bump(&self.next_target))
    }

    pub fn buffer(&self) -> BufferId {
        BufferId(bump(&self.next_buffer))
    }
}

fn bump(cell: &Cell<u32>) -> u32 {
    let id = cell.get();
    cell.set(id + 1);
    id
}

/// Identifies a shader program. `variant` selects compile-time options such
/// as tile sprite wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub name: &'static str,
    pub variant: u32,
}

impl ProgramKey {
    pub const fn new(name: &'static str) -> Self {
        Self { name, variant: 0 }
    }

    pub const fn with_variant(self, variant: u32) -> Self {
        Self {
            name: self.name,
            variant,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Floats(Vec<f32>),
}

impl UniformValue {
    /// Number of vec4 slots the value occupies once packed.
    pub fn slots(&self) -> usize {
        match self {
            UniformValue::Floats(values) => values.len().div_ceil(4).max(1),
            _ => 1,
        }
    }

    pub fn write_slots(&self, out: &mut [[f32; 4]]) {
        match self {
            UniformValue::Float(v) => out[0] = [*v, 0.0, 0.0, 0.0],
            UniformValue::Int(v) => out[0] = [*v as f32, 0.0, 0.0, 0.0],
            UniformValue::Vec2([x, y]) => out[0] = [*x, *y, 0.0, 0.0],
            UniformValue::Vec3([x, y, z]) => out[0] = [*x, *y, *z, 0.0],
            UniformValue::Vec4(v) => out[0] = *v,
            UniformValue::Floats(values) => {
                for (slot, chunk) in out.iter_mut().zip(values.chunks(4)) {
                    slot[..chunk.len()].copy_from_slice(chunk);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width >= width && self.height >= height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Name of the node that issued the draw.
    pub node: Cow<'static, str>,
    pub target: TargetId,
    pub viewport: (u32, u32),
    pub program: ProgramKey,
    pub blend: BlendMode,
    pub scissor: Option<ScissorBox>,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub textures: SmallVec<[TextureId; 4]>,
    pub first_index: u32,
    pub index_count: u32,
    /// Per-instance attributes, stepped once per instance in the second
    /// vertex slot.
    pub instance_buffer: Option<BufferId>,
    pub instance_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateTarget {
        target: TargetId,
        texture: TextureId,
        width: u32,
        height: u32,
    },
    DestroyTarget {
        target: TargetId,
    },
    UploadIndices {
        buffer: BufferId,
        indices: Vec<u16>,
    },
    /// Only the populated prefix of a vertex buffer is uploaded.
    UploadVertices {
        buffer: BufferId,
        bytes: Vec<u8>,
    },
    SetUniform {
        program: ProgramKey,
        name: Cow<'static, str>,
        value: UniformValue,
    },
    Clear {
        target: TargetId,
        color: [f32; 4],
        scissor: Option<ScissorBox>,
    },
    Draw(DrawCall),
}

/// One node invocation in the debug call tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub name: String,
    pub children: Vec<TraceEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: usize,
    pub vertex_uploads: usize,
    pub uploaded_bytes: usize,
    pub clears: usize,
}

#[derive(Debug, Default)]
pub struct DrawRecorder {
    commands: Vec<GpuCommand>,
    stats: FrameStats,
    debug: bool,
    trace_roots: Vec<TraceEntry>,
    trace_stack: Vec<TraceEntry>,
}

impl DrawRecorder {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            ..Self::default()
        }
    }

    pub fn push(&mut self, command: GpuCommand) {
        match &command {
            GpuCommand::Draw(_) => self.stats.draw_calls += 1,
            GpuCommand::UploadVertices { bytes, .. } => {
                self.stats.vertex_uploads += 1;
                self.stats.uploaded_bytes += bytes.len();
            }
            GpuCommand::Clear { .. } => self.stats.clears += 1,
            _ => {}
        }
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|cmd| match cmd {
            GpuCommand::Draw(call) => Some(call),
            _ => None,
        })
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Hands the recorded frame over and starts a new one.
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        self.stats = FrameStats::default();
        std::mem::take(&mut self.commands)
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
        if !debug {
            self.trace_roots.clear();
            self.trace_stack.clear();
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn trace_begin(&mut self, name: &str) {
        if self.debug {
            self.trace_stack.push(TraceEntry {
                name: name.to_owned(),
                children: Vec::new(),
            });
        }
    }

    pub fn trace_end(&mut self) {
        if !self.debug {
            return;
        }
        if let Some(done) = self.trace_stack.pop() {
            match self.trace_stack.last_mut() {
                Some(parent) => parent.children.push(done),
                None => self.trace_roots.push(done),
            }
        }
    }

    pub fn take_trace(&mut self) -> Vec<TraceEntry> {
        std::mem::take(&mut self.trace_roots)
    }
}

/// Runs `f` inside a trace scope named `name`.
pub fn traced<R>(
    recorder: &mut DrawRecorder,
    name: &str,
    f: impl FnOnce(&mut DrawRecorder) -> R,
) -> R {
    recorder.trace_begin(name);
    let result = f(recorder);
    recorder.trace_end();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_builds_nested_tree() {
        let mut rec = DrawRecorder::new(true);
        rec.trace_begin("SubmitterQuad");
        traced(&mut rec, "TexturerImage", |_| {});
        rec.trace_begin("BatchHandlerQuad");
        rec.trace_end();
        rec.trace_end();

        let trace = rec.take_trace();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].name, "SubmitterQuad");
        let children: Vec<&str> = trace[0].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(children, vec!["TexturerImage", "BatchHandlerQuad"]);
    }

    #[test]
    fn trace_is_inert_without_debug() {
        let mut rec = DrawRecorder::new(false);
        rec.trace_begin("BatchHandlerQuad");
        rec.trace_end();
        assert!(rec.take_trace().is_empty());
    }

    #[test]
    fn floats_pack_into_vec4_slots() {
        let value = UniformValue::Floats((0..6).map(|i| i as f32).collect());
        assert_eq!(value.slots(), 2);
        let mut out = [[0.0; 4]; 2];
        value.write_slots(&mut out);
        assert_eq!(out[1], [4.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn ids_are_unique_per_kind() {
        let ids = ResourceIds::default();
        assert_ne!(ids.target(), TargetId::CANVAS);
        assert_ne!(ids.buffer(), ids.buffer());
    }
}
