// scene/gpu_layer.rs
use super::frame::{Frame, UvRect};
use super::objects::Tint;
use super::transform::Transform2D;
use crate::renderer::blend::BlendMode;
use crate::renderer::commands::{BufferId, ResourceIds};
use crate::renderer::vertex_layout::VertexBuffer;
use glam::Vec2;

/// One image inside an [`ImageGpuLayer`]. Flip flags flip the quad by
/// negating its scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpuLayerMember {
    pub transform: Transform2D,
    pub uv: UvRect,
    pub size: Vec2,
    pub tint: Tint,
    pub alpha: f32,
}

impl GpuLayerMember {
    /// A member showing all of `frame` at its display size.
    pub fn new(frame: &Frame, x: f32, y: f32) -> Self {
        Self {
            transform: Transform2D::at(x, y),
            uv: frame.uv,
            size: frame.display_size(),
            tint: Tint::default(),
            alpha: 1.0,
        }
    }
}

/// Many images sharing one texture, drawn together in a single instanced
/// draw. The member data is baked into a static instance buffer that is
/// only rebuilt after a member changes.
#[derive(Debug)]
pub struct ImageGpuLayer {
    pub frame: Frame,
    pub alpha: f32,
    pub blend_mode: BlendMode,
    pub visible: bool,
    members: Vec<GpuLayerMember>,
    needs_update: bool,
    buffer: Option<BufferId>,
    instances: Option<VertexBuffer>,
}

impl ImageGpuLayer {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            alpha: 1.0,
            blend_mode: BlendMode::Normal,
            visible: true,
            members: Vec::new(),
            needs_update: true,
            buffer: None,
            instances: None,
        }
    }

    /// Appends a member and returns its index.
    pub fn add(&mut self, member: GpuLayerMember) -> usize {
        self.members.push(member);
        self.needs_update = true;
        self.members.len() - 1
    }

    pub fn member(&self, index: usize) -> Option<&GpuLayerMember> {
        self.members.get(index)
    }

    /// Mutable access marks the layer for rebaking.
    pub fn member_mut(&mut self, index: usize) -> Option<&mut GpuLayerMember> {
        let member = self.members.get_mut(index)?;
        self.needs_update = true;
        Some(member)
    }

    pub fn remove(&mut self, index: usize) -> Option<GpuLayerMember> {
        if index >= self.members.len() {
            return None;
        }
        self.needs_update = true;
        Some(self.members.remove(index))
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.needs_update = true;
    }

    pub fn members(&self) -> &[GpuLayerMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// The baked instance data, as last uploaded.
    pub fn instances(&self) -> Option<&VertexBuffer> {
        self.instances.as_ref()
    }

    /// The GPU buffer the instances live in, allocated on first use.
    pub fn instance_buffer(&mut self, ids: &ResourceIds) -> BufferId {
        *self.buffer.get_or_insert_with(|| ids.buffer())
    }

    pub(crate) fn finish_bake(&mut self, instances: VertexBuffer) {
        self.instances = Some(instances);
        self.needs_update = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::commands::TextureId;
    use crate::renderer::gpu_layer::SubmitterImageGpuLayer;
    use crate::scene::Texture;

    fn frame() -> Frame {
        let texture = Texture {
            id: TextureId(3),
            width: 64,
            height: 32,
            resolution: 1.0,
        };
        Frame::new(&texture, 0.0, 0.0, 32.0, 32.0)
    }

    #[test]
    fn members_take_the_frame_size_and_uvs() {
        let member = GpuLayerMember::new(&frame(), 10.0, 20.0);
        assert_eq!(member.size, Vec2::new(32.0, 32.0));
        assert_eq!(member.uv.u1, 0.5);
        assert_eq!(member.transform.position, Vec2::new(10.0, 20.0));
    }

    #[test]
    fn edits_mark_the_layer_dirty() {
        let frame = frame();
        let mut layer = ImageGpuLayer::new(frame);
        let index = layer.add(GpuLayerMember::new(&frame, 0.0, 0.0));
        assert!(layer.needs_update());

        layer.finish_bake(VertexBuffer::new(SubmitterImageGpuLayer::instance_layout(), 1));
        assert!(!layer.needs_update());

        assert!(layer.member(index).is_some());
        assert!(!layer.needs_update());
        if let Some(member) = layer.member_mut(index) {
            member.alpha = 0.5;
        }
        assert!(layer.needs_update());

        assert!(layer.remove(4).is_none());
        assert_eq!(layer.remove(index).map(|m| m.alpha), Some(0.5));
        assert!(layer.is_empty());
    }

    #[test]
    fn the_instance_buffer_id_is_stable() {
        let ids = ResourceIds::default();
        let mut layer = ImageGpuLayer::new(frame());
        let first = layer.instance_buffer(&ids);
        assert_eq!(layer.instance_buffer(&ids), first);
    }
}
