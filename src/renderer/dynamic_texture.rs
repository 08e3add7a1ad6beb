// renderer/dynamic_texture.rs
//
// Replays a dynamic texture's queued drawing commands into its context.

use super::blend::BlendMode;
use super::commands::ScissorBox;
use super::compositor::Rect;
use super::context::{AutoClear, DrawingContext};
use super::manager::RenderNodeManager;
use super::node::{NodeKey, RenderNode, RenderNodeError};
use super::tinter::pack_tint;
use crate::scene::{Frame, GameObject, Image, TileSprite, Tiling, Tint};
use glam::{Affine2, Vec2};

/// How a frame is stamped onto a dynamic texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampOptions {
    pub alpha: f32,
    pub tint: u32,
    pub rotation: f32,
    pub scale: Vec2,
    pub origin: Vec2,
    pub blend_mode: BlendMode,
}

impl Default for StampOptions {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            tint: 0xffffff,
            rotation: 0.0,
            scale: Vec2::ONE,
            origin: Vec2::splat(0.5),
            blend_mode: BlendMode::Normal,
        }
    }
}

pub enum DynamicTextureCommand<'a> {
    /// Clears the whole texture, or only `region`.
    Clear {
        region: Option<ScissorBox>,
        color: [f32; 4],
    },
    Fill {
        rect: Rect,
        color: u32,
        alpha: f32,
    },
    Draw {
        object: &'a dyn GameObject,
        parent: Option<Affine2>,
    },
    Stamp {
        frame: Frame,
        x: f32,
        y: f32,
        options: StampOptions,
    },
    /// Fills `rect` with a repeating frame.
    Repeat {
        frame: Frame,
        rect: Rect,
        tiling: Tiling,
    },
    /// Following draws remove alpha instead of adding color.
    SetErase(bool),
}

#[derive(Debug, Default)]
pub struct DynamicTextureHandler;

impl RenderNode for DynamicTextureHandler {
    fn name(&self) -> &str {
        "DynamicTextureHandler"
    }
}

impl DynamicTextureHandler {
    pub fn run(
        &self,
        manager: &mut RenderNodeManager,
        ctx: &DrawingContext,
        commands: &[DynamicTextureCommand<'_>],
    ) -> Result<(), RenderNodeError> {
        manager.recorder_mut().trace_begin(self.name());
        let mut erase: Option<DrawingContext> = None;
        let mut result = Ok(());

        for command in commands {
            result = match command {
                DynamicTextureCommand::SetErase(on) => {
                    if *on && erase.is_none() {
                        let mut fork = ctx.get_clone();
                        fork.set_blend_mode(BlendMode::Erase);
                        erase = Some(fork);
                    } else if !*on {
                        if let Some(fork) = erase.take() {
                            manager.release_context(fork);
                        }
                    }
                    Ok(())
                }
                DynamicTextureCommand::Clear { region, color } => {
                    clear(manager, ctx, *region, *color);
                    Ok(())
                }
                other => draw(manager, erase.as_ref().unwrap_or(ctx), other),
            };
            if result.is_err() {
                break;
            }
        }

        if let Some(fork) = erase {
            manager.release_context(fork);
        }
        manager.recorder_mut().trace_end();
        result
    }
}

fn clear(
    manager: &mut RenderNodeManager,
    ctx: &DrawingContext,
    region: Option<ScissorBox>,
    color: [f32; 4],
) {
    let mut clearing = ctx.get_clone();
    if let Some(region) = region {
        clearing.set_scissor_box(region.x, region.y, region.width, region.height);
    }
    let [r, g, b, a] = color;
    clearing.set_clear_color(r, g, b, a);
    clearing.set_auto_clear(AutoClear::COLOR);
    manager.use_context(&clearing);
    manager.release_context(clearing);
}

fn draw(
    manager: &mut RenderNodeManager,
    ctx: &DrawingContext,
    command: &DynamicTextureCommand<'_>,
) -> Result<(), RenderNodeError> {
    match command {
        DynamicTextureCommand::Fill { rect, color, alpha } => {
            let fill = manager.fill_rect(&NodeKey::FillRect)?;
            fill.run(manager, ctx, None, *rect, [pack_tint(*color, *alpha); 4])
        }
        DynamicTextureCommand::Draw { object, parent } => {
            manager.submit(ctx, *object, parent.as_ref())
        }
        DynamicTextureCommand::Stamp {
            frame,
            x,
            y,
            options,
        } => {
            let mut image = Image::new(*frame);
            image.transform.position = Vec2::new(*x, *y);
            image.transform.rotation = options.rotation;
            image.transform.scale = options.scale;
            image.transform.origin = options.origin;
            image.tint = Tint::solid(options.tint).with_alpha(options.alpha);

            // erase mode wins over the stamp's own blend mode
            if ctx.blend_mode() == BlendMode::Erase || options.blend_mode == ctx.blend_mode() {
                return manager.submit(ctx, &image, None);
            }
            let mut blended = ctx.get_clone();
            blended.set_blend_mode(options.blend_mode);
            let result = manager.submit(&blended, &image, None);
            manager.release_context(blended);
            result
        }
        DynamicTextureCommand::Repeat {
            frame,
            rect,
            tiling,
        } => {
            let mut sprite = TileSprite::new(*frame, rect.width, rect.height);
            sprite.transform.position = Vec2::new(rect.x, rect.y);
            sprite.transform.origin = Vec2::ZERO;
            sprite.tiling = *tiling;
            manager.submit(ctx, &sprite, None)
        }
        DynamicTextureCommand::Clear { .. } | DynamicTextureCommand::SetErase(_) => Ok(()),
    }
}
