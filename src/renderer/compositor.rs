// renderer/compositor.rs
use super::batch::{BatchPrimitive, FlatTriangles};
use super::context::DrawingContext;
use super::manager::RenderNodeManager;
use super::node::{NodeKey, RenderNode, RenderNodeError};
use super::tinter::pack_tint;
use crate::scene::GameObject;
use glam::{Affine2, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// TL, BL, TR, BR.
    pub fn corners(&self) -> [Vec2; 4] {
        let (l, t) = (self.x, self.y);
        let (r, b) = (self.x + self.width, self.y + self.height);
        [Vec2::new(l, t), Vec2::new(l, b), Vec2::new(r, t), Vec2::new(r, b)]
    }
}

/// Submits a list of children in order. Children whose blend mode differs
/// from the context draw through a forked context carrying their mode; the
/// fork is kept while consecutive children share it.
#[derive(Debug, Default)]
pub struct ListCompositor;

impl RenderNode for ListCompositor {
    fn name(&self) -> &str {
        "ListCompositor"
    }
}

impl ListCompositor {
    pub fn run(
        &self,
        manager: &mut RenderNodeManager,
        ctx: &DrawingContext,
        children: &[&dyn GameObject],
        parent: Option<&Affine2>,
    ) -> Result<(), RenderNodeError> {
        manager.recorder_mut().trace_begin(self.name());
        let mut blended: Option<DrawingContext> = None;
        let mut result = Ok(());

        for child in children.iter().filter(|child| child.visible()) {
            let mode = child.blend_mode();
            let target = if mode == ctx.blend_mode() {
                ctx
            } else {
                if blended.as_ref().map(|c| c.blend_mode()) != Some(mode) {
                    if let Some(previous) = blended.take() {
                        manager.release_context(previous);
                    }
                    let mut fork = ctx.get_clone();
                    fork.set_blend_mode(mode);
                    blended = Some(fork);
                }
                blended.as_ref().unwrap_or(ctx)
            };
            result = manager.submit(target, *child, parent);
            if result.is_err() {
                break;
            }
        }

        if let Some(fork) = blended {
            manager.release_context(fork);
        }
        manager.recorder_mut().trace_end();
        result
    }
}

/// Solid or gradient rectangles through the flat triangle batcher.
#[derive(Debug, Default)]
pub struct FillRect;

impl RenderNode for FillRect {
    fn name(&self) -> &str {
        "FillRect"
    }
}

impl FillRect {
    /// `tints` are packed colors in TL, BL, TR, BR order. `matrix` maps the
    /// rectangle to screen space; `None` draws it as given.
    pub fn run(
        &self,
        manager: &mut RenderNodeManager,
        ctx: &DrawingContext,
        matrix: Option<&Affine2>,
        rect: Rect,
        tints: [u32; 4],
    ) -> Result<(), RenderNodeError> {
        let matrix = matrix.copied().unwrap_or(Affine2::IDENTITY);
        let corners = rect.corners().map(|c| matrix.transform_point2(c));
        let triangles = FlatTriangles::quad(corners, tints);
        manager.batch(
            &NodeKey::BatchHandlerTriFlat,
            ctx,
            BatchPrimitive::Triangles(&triangles),
        )
    }
}

/// Fills the camera's viewport with one color.
#[derive(Debug, Default)]
pub struct FillCamera;

impl RenderNode for FillCamera {
    fn name(&self) -> &str {
        "FillCamera"
    }
}

impl FillCamera {
    pub fn run(
        &self,
        manager: &mut RenderNodeManager,
        ctx: &DrawingContext,
        color: u32,
        alpha: f32,
    ) -> Result<(), RenderNodeError> {
        let camera = ctx.camera();
        let rect = Rect::new(camera.x, camera.y, camera.width, camera.height);
        let fill = manager.fill_rect(&NodeKey::FillRect)?;
        fill.run(manager, ctx, None, rect, [pack_tint(color, alpha); 4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_corners_follow_quad_order() {
        let corners = Rect::new(1.0, 2.0, 3.0, 4.0).corners();
        assert_eq!(corners[0], Vec2::new(1.0, 2.0));
        assert_eq!(corners[1], Vec2::new(1.0, 6.0));
        assert_eq!(corners[2], Vec2::new(4.0, 2.0));
        assert_eq!(corners[3], Vec2::new(4.0, 6.0));
    }
}
