// renderer/context.rs
//
// Drawing contexts and the pool of render targets they draw into.

use super::blend::BlendMode;
use super::commands::{DrawRecorder, GpuCommand, ResourceIds, ScissorBox, TargetId, TextureId};
use crate::scene::Camera2D;
use bitflags::bitflags;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

bitflags! {
    /// Buffers cleared when a context is put into use.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AutoClear: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_context_id() -> u64 {
    NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// An offscreen color target owned by the pool.
#[derive(Debug)]
pub struct RenderTarget {
    pub id: TargetId,
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    last_used: Cell<u64>,
}

#[derive(Debug, Clone)]
enum Surface {
    Canvas,
    Texture(Rc<RenderTarget>),
}

/// Where and how draws land: target, camera, blend mode, scissor and clear
/// state.
///
/// `Clone` takes a lease on the same context (same id, same target), which
/// keeps a pooled target out of circulation until every lease is dropped.
/// Use [`DrawingContext::get_clone`] to fork a distinct context that can
/// carry a different blend mode or scissor.
#[derive(Debug, Clone)]
pub struct DrawingContext {
    id: u64,
    surface: Surface,
    width: u32,
    height: u32,
    camera: Camera2D,
    blend_mode: BlendMode,
    scissor: ScissorBox,
    scissor_enabled: bool,
    clear_color: [f32; 4],
    auto_clear: AutoClear,
    in_use: Cell<bool>,
}

impl DrawingContext {
    /// A context drawing to the presentation surface.
    pub fn canvas(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            id: next_context_id(),
            surface: Surface::Canvas,
            width,
            height,
            camera: Camera2D::new(width as f32, height as f32),
            blend_mode: BlendMode::Normal,
            scissor: ScissorBox::new(0, 0, width, height),
            scissor_enabled: false,
            clear_color: [0.0; 4],
            auto_clear: AutoClear::empty(),
            in_use: Cell::new(false),
        }
    }

    /// A context drawing into a pooled render target.
    pub fn for_target(target: Rc<RenderTarget>) -> Self {
        let (width, height) = (target.width, target.height);
        Self {
            id: next_context_id(),
            surface: Surface::Texture(target),
            width,
            height,
            camera: Camera2D::new(width as f32, height as f32),
            blend_mode: BlendMode::Normal,
            scissor: ScissorBox::new(0, 0, width, height),
            scissor_enabled: false,
            clear_color: [0.0; 4],
            auto_clear: AutoClear::COLOR,
            in_use: Cell::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Forks a new context with a copy of this one's state.
    pub fn get_clone(&self) -> Self {
        Self {
            id: next_context_id(),
            in_use: Cell::new(false),
            ..self.clone()
        }
    }

    /// True when both hold the same id and the same pipeline-affecting state.
    pub fn same_state(&self, other: &DrawingContext) -> bool {
        self.id == other.id
            && self.blend_mode == other.blend_mode
            && self.scissor_enabled == other.scissor_enabled
            && (!self.scissor_enabled || self.scissor == other.scissor)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn target(&self) -> TargetId {
        match &self.surface {
            Surface::Canvas => TargetId::CANVAS,
            Surface::Texture(target) => target.id,
        }
    }

    /// The texture drawn into, `None` for the canvas.
    pub fn texture(&self) -> Option<TextureId> {
        match &self.surface {
            Surface::Canvas => None,
            Surface::Texture(target) => Some(target.texture),
        }
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }

    pub fn set_camera(&mut self, camera: Camera2D) {
        self.camera = camera;
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, blend_mode: BlendMode) {
        self.blend_mode = blend_mode;
    }

    pub fn scissor(&self) -> Option<ScissorBox> {
        self.scissor_enabled.then_some(self.scissor)
    }

    pub fn set_scissor_box(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.scissor = ScissorBox::new(x, y, width, height);
        self.scissor_enabled = !self.scissor.covers(self.width, self.height);
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear_color = [r, g, b, a];
    }

    pub fn auto_clear(&self) -> AutoClear {
        self.auto_clear
    }

    pub fn set_auto_clear(&mut self, auto_clear: AutoClear) {
        self.auto_clear = auto_clear;
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.get()
    }

    pub(crate) fn set_in_use(&self, in_use: bool) {
        self.in_use.set(in_use);
    }

    /// Resizes a canvas context. Dimensions are rounded and clamped to at
    /// least one pixel; the scissor is reset to the full area.
    pub fn resize(&mut self, width: f32, height: f32) {
        let width = width.round().max(1.0) as u32;
        let height = height.round().max(1.0) as u32;
        debug_assert!(
            matches!(self.surface, Surface::Canvas),
            "pooled targets are reallocated, not resized"
        );
        self.width = width;
        self.height = height;
        self.scissor = ScissorBox::new(0, 0, width, height);
        self.scissor_enabled = false;
        self.camera.width = width as f32;
        self.camera.height = height as f32;
    }

    /// Number of live leases on this context's target, canvas excluded.
    pub fn lease_count(&self) -> usize {
        match &self.surface {
            Surface::Canvas => 0,
            Surface::Texture(target) => Rc::strong_count(target) - 1,
        }
    }
}

/// Pool of offscreen targets. A target is free when only the pool holds it.
#[derive(Debug)]
pub struct DrawingContextPool {
    targets: Vec<Rc<RenderTarget>>,
    frame: u64,
    max_age: u64,
}

impl DrawingContextPool {
    pub fn new(max_age: u64) -> Self {
        Self {
            targets: Vec::new(),
            frame: 0,
            max_age: max_age.max(1),
        }
    }

    /// Returns a free target of exactly `width` x `height`, creating one if
    /// none is free.
    pub fn acquire(
        &mut self,
        width: u32,
        height: u32,
        ids: &ResourceIds,
        recorder: &mut DrawRecorder,
    ) -> Rc<RenderTarget> {
        let width = width.max(1);
        let height = height.max(1);

        if let Some(target) = self
            .targets
            .iter()
            .find(|t| t.width == width && t.height == height && Rc::strong_count(t) == 1)
        {
            target.last_used.set(self.frame);
            return Rc::clone(target);
        }

        let target = Rc::new(RenderTarget {
            id: ids.target(),
            texture: ids.texture(),
            width,
            height,
            last_used: Cell::new(self.frame),
        });
        recorder.push(GpuCommand::CreateTarget {
            target: target.id,
            texture: target.texture,
            width,
            height,
        });
        log::debug!(
            "Context pool grew to {} targets ({}x{})",
            self.targets.len() + 1,
            width,
            height
        );
        self.targets.push(Rc::clone(&target));
        target
    }

    /// Advances the frame counter and destroys free targets that have not
    /// been used for `max_age` frames.
    pub fn end_frame(&mut self, recorder: &mut DrawRecorder) {
        self.frame += 1;
        let frame = self.frame;
        let max_age = self.max_age;
        let before = self.targets.len();

        self.targets.retain(|target| {
            let stale = Rc::strong_count(target) == 1
                && frame.saturating_sub(target.last_used.get()) > max_age;
            if stale {
                recorder.push(GpuCommand::DestroyTarget { target: target.id });
            }
            !stale
        });

        let pruned = before - self.targets.len();
        if pruned > 0 {
            log::debug!("Pruned {} idle render targets", pruned);
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Targets currently leased by at least one context.
    pub fn in_use(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| Rc::strong_count(t) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_a_lease_and_get_clone_forks() {
        let mut pool = DrawingContextPool::new(4);
        let ids = ResourceIds::default();
        let mut rec = DrawRecorder::default();

        let ctx = DrawingContext::for_target(pool.acquire(32, 32, &ids, &mut rec));
        let lease = ctx.clone();
        let fork = ctx.get_clone();

        assert_eq!(lease.id(), ctx.id());
        assert_ne!(fork.id(), ctx.id());
        assert_eq!(fork.target(), ctx.target());
        assert_eq!(ctx.lease_count(), 3);

        drop((ctx, lease, fork));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn pool_reuses_free_targets_of_same_size() {
        let mut pool = DrawingContextPool::new(4);
        let ids = ResourceIds::default();
        let mut rec = DrawRecorder::default();

        let first = pool.acquire(64, 64, &ids, &mut rec);
        let first_id = first.id;
        drop(first);
        let again = pool.acquire(64, 64, &ids, &mut rec);
        let other = pool.acquire(64, 64, &ids, &mut rec);

        assert_eq!(again.id, first_id);
        assert_ne!(other.id, first_id);
        assert_eq!(pool.len(), 2);
        assert_eq!(
            rec.commands()
                .iter()
                .filter(|c| matches!(c, GpuCommand::CreateTarget { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn idle_targets_age_out() {
        let mut pool = DrawingContextPool::new(2);
        let ids = ResourceIds::default();
        let mut rec = DrawRecorder::default();

        let held = pool.acquire(8, 8, &ids, &mut rec);
        drop(pool.acquire(16, 16, &ids, &mut rec));
        for _ in 0..3 {
            pool.end_frame(&mut rec);
        }

        assert_eq!(pool.len(), 1);
        assert!(rec
            .commands()
            .iter()
            .any(|c| matches!(c, GpuCommand::DestroyTarget { .. })));
        drop(held);
    }

    #[test]
    fn scissor_covering_everything_is_disabled() {
        let mut ctx = DrawingContext::canvas(100, 100);
        ctx.set_scissor_box(0, 0, 100, 100);
        assert_eq!(ctx.scissor(), None);
        ctx.set_scissor_box(10, 10, 20, 20);
        assert_eq!(ctx.scissor(), Some(ScissorBox::new(10, 10, 20, 20)));
    }

    #[test]
    fn resize_clamps_and_rounds() {
        let mut ctx = DrawingContext::canvas(10, 10);
        ctx.resize(0.2, 99.6);
        assert_eq!((ctx.width(), ctx.height()), (1, 100));
    }
}
