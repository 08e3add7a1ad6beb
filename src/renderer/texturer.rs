// renderer/texturer.rs
use super::commands::TextureId;
use super::node::RenderNode;
use crate::scene::{GameObject, TileElement, Tiling, UvRect};
use glam::{Affine2, Vec2};

/// Texture coordinates and the drawn region of one quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturerOutput {
    pub texture: TextureId,
    pub uv: UvRect,
    /// Per-corner coordinates in TL, BL, TR, BR order, for repeating textures.
    pub vertex_uvs: Option<[Vec2; 4]>,
    /// Size the object's origin is measured against, in display pixels.
    pub frame_size: Vec2,
    /// Top-left of the drawn region relative to the frame.
    pub offset: Vec2,
    /// Drawn size in display pixels.
    pub size: Vec2,
}

pub trait Texturer: RenderNode {
    fn run(&self, object: &dyn GameObject, element: Option<&TileElement>) -> TexturerOutput;
}

/// Frame UVs, or crop UVs when the object is cropped.
#[derive(Debug, Default)]
pub struct TexturerImage;

impl RenderNode for TexturerImage {
    fn name(&self) -> &str {
        "TexturerImage"
    }
}

impl Texturer for TexturerImage {
    fn run(&self, object: &dyn GameObject, element: Option<&TileElement>) -> TexturerOutput {
        if let Some(tile) = element {
            let size = tile.frame.display_size();
            return TexturerOutput {
                texture: tile.frame.texture,
                uv: tile.frame.uv.flipped(tile.flip_x, tile.flip_y),
                vertex_uvs: None,
                frame_size: size,
                offset: Vec2::ZERO,
                size,
            };
        }

        let frame = object.frame();
        let frame_size = frame.display_size();
        match object.crop() {
            Some(crop) => {
                let transform = object.transform();
                let (uv, offset) = crop.resolve(frame, transform.flip_x, transform.flip_y);
                TexturerOutput {
                    texture: frame.texture,
                    uv,
                    vertex_uvs: None,
                    frame_size,
                    offset,
                    size: frame.uv_size(&uv),
                }
            }
            None => TexturerOutput {
                texture: frame.texture,
                uv: frame.uv,
                vertex_uvs: None,
                frame_size,
                offset: Vec2::ZERO,
                size: frame_size,
            },
        }
    }
}

/// Repeating texture over the object's display size.
#[derive(Debug, Default)]
pub struct TexturerTileSprite;

impl TexturerTileSprite {
    /// Tiling coordinates, in frame units, at the corners of a `size` quad.
    pub fn corner_uvs(tiling: &Tiling, size: Vec2, frame_size: Vec2) -> [Vec2; 4] {
        let to_tile = Affine2::from_scale_angle_translation(
            tiling.scale,
            tiling.rotation,
            -tiling.position,
        )
        .inverse();
        let frame_size = frame_size.max(Vec2::ONE);
        [
            Vec2::ZERO,
            Vec2::new(0.0, size.y),
            Vec2::new(size.x, 0.0),
            size,
        ]
        .map(|corner| to_tile.transform_point2(corner) / frame_size)
    }
}

impl RenderNode for TexturerTileSprite {
    fn name(&self) -> &str {
        "TexturerTileSprite"
    }
}

impl Texturer for TexturerTileSprite {
    fn run(&self, object: &dyn GameObject, _element: Option<&TileElement>) -> TexturerOutput {
        let frame = object.frame();
        let frame_size = frame.display_size();
        let size = object.size().unwrap_or(frame_size);
        let tiling = object.tiling().copied().unwrap_or_default();

        TexturerOutput {
            texture: frame.texture,
            uv: frame.uv,
            vertex_uvs: Some(Self::corner_uvs(&tiling, size, frame_size)),
            frame_size: size,
            offset: Vec2::ZERO,
            size,
        }
    }
}
