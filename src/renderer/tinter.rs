// renderer/tinter.rs
use super::context::DrawingContext;
use super::node::RenderNode;
use crate::scene::{GameObject, TileElement};

/// Packs 0xRRGGBB and an alpha into the byte order the vertex layout reads
/// as normalized RGBA.
pub fn pack_tint(rgb: u32, alpha: f32) -> u32 {
    let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u32;
    let bgr = ((rgb & 0xff) << 16) | (rgb & 0xff00) | ((rgb >> 16) & 0xff);
    (a << 24) | bgr
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TinterOutput {
    /// TL, BL, TR, BR.
    pub tints: [u32; 4],
    pub fill: bool,
}

pub trait Tinter: RenderNode {
    fn run(
        &self,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        element: Option<&TileElement>,
    ) -> TinterOutput;
}

#[derive(Debug, Default)]
pub struct TinterImage;

impl RenderNode for TinterImage {
    fn name(&self) -> &str {
        "TinterImage"
    }
}

impl Tinter for TinterImage {
    fn run(
        &self,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        _element: Option<&TileElement>,
    ) -> TinterOutput {
        let tint = object.tint();
        let camera_alpha = ctx.camera().alpha;
        let [tl, tr, bl, br] = tint.alpha.map(|a| a * camera_alpha);
        TinterOutput {
            tints: [
                pack_tint(tint.top_left, tl),
                pack_tint(tint.bottom_left, bl),
                pack_tint(tint.top_right, tr),
                pack_tint(tint.bottom_right, br),
            ],
            fill: tint.fill,
        }
    }
}

/// One color for the whole tile, combined with the layer's alpha.
#[derive(Debug, Default)]
pub struct TinterTile;

impl RenderNode for TinterTile {
    fn name(&self) -> &str {
        "TinterTile"
    }
}

impl Tinter for TinterTile {
    fn run(
        &self,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        element: Option<&TileElement>,
    ) -> TinterOutput {
        let Some(tile) = element else {
            return TinterImage.run(ctx, object, None);
        };
        let alpha = tile.alpha * object.tint().alpha[0] * ctx.camera().alpha;
        TinterOutput {
            tints: [pack_tint(tile.tint, alpha); 4],
            fill: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::commands::TextureId;
    use crate::scene::{Frame, Image, Texture, Tint};

    #[test]
    fn packing_swizzles_to_rgba_bytes() {
        let packed = pack_tint(0x112233, 1.0);
        assert_eq!(packed.to_le_bytes(), [0x11, 0x22, 0x33, 0xff]);
    }

    #[test]
    fn camera_alpha_scales_every_corner() {
        let mut ctx = DrawingContext::canvas(10, 10);
        let mut camera = ctx.camera().clone();
        camera.alpha = 0.5;
        ctx.set_camera(camera);

        let texture = Texture {
            id: TextureId(1),
            width: 4,
            height: 4,
            resolution: 1.0,
        };
        let mut image = Image::new(Frame::whole(&texture));
        image.tint = Tint::solid(0xffffff);
        image.tint.alpha = [1.0, 1.0, 0.0, 1.0];

        let out = TinterImage.run(&ctx, &image, None);
        assert_eq!(out.tints[0] >> 24, 128);
        // bottom-left had alpha 0
        assert_eq!(out.tints[1] >> 24, 0);
    }
}
