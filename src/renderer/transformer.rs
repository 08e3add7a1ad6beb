// renderer/transformer.rs
use super::context::DrawingContext;
use super::node::RenderNode;
use super::texturer::TexturerOutput;
use crate::scene::{GameObject, TileElement};
use glam::{Affine2, Mat2, Vec2};
use serde::{Deserialize, Serialize};

/// When screen-space vertices are snapped to whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexRoundMode {
    Off,
    /// Round only when the transform is a pure translation.
    Safe,
    /// `Safe`, but only if the camera asks for pixel rounding.
    #[default]
    SafeAuto,
    /// Always round.
    Full,
    /// Round whenever the camera asks for pixel rounding.
    FullAuto,
}

impl VertexRoundMode {
    pub fn should_round(self, matrix: &Affine2, camera_round_pixels: bool) -> bool {
        let translation_only = matrix.matrix2.abs_diff_eq(Mat2::IDENTITY, f32::EPSILON);
        match self {
            VertexRoundMode::Off => false,
            VertexRoundMode::Safe => translation_only,
            VertexRoundMode::SafeAuto => camera_round_pixels && translation_only,
            VertexRoundMode::Full => true,
            VertexRoundMode::FullAuto => camera_round_pixels,
        }
    }
}

/// Screen-space corners of one quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformerOutput {
    /// TL, BL, TR, BR.
    pub corners: [Vec2; 4],
    pub matrix: Affine2,
}

pub trait Transformer: RenderNode {
    fn run(
        &self,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        parent: Option<&Affine2>,
        element: Option<&TileElement>,
        texture: &TexturerOutput,
    ) -> TransformerOutput;
}

/// Camera view, then the parent, then the object itself.
pub fn world_matrix(
    ctx: &DrawingContext,
    object: &dyn GameObject,
    parent: Option<&Affine2>,
) -> Affine2 {
    let transform = object.transform();
    let view = ctx.camera().view_matrix(transform.scroll_factor);
    view * parent.copied().unwrap_or(Affine2::IDENTITY) * transform.matrix()
}

fn project(
    ctx: &DrawingContext,
    object: &dyn GameObject,
    matrix: Affine2,
    top_left: Vec2,
    size: Vec2,
) -> TransformerOutput {
    let bottom_right = top_left + size;
    let mut corners = [
        top_left,
        Vec2::new(top_left.x, bottom_right.y),
        Vec2::new(bottom_right.x, top_left.y),
        bottom_right,
    ]
    .map(|corner| matrix.transform_point2(corner));

    if object
        .round_mode()
        .should_round(&matrix, ctx.camera().round_pixels)
    {
        corners = corners.map(Vec2::round);
    }

    TransformerOutput { corners, matrix }
}

#[derive(Debug, Default)]
pub struct TransformerImage;

impl RenderNode for TransformerImage {
    fn name(&self) -> &str {
        "TransformerImage"
    }
}

impl Transformer for TransformerImage {
    fn run(
        &self,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        parent: Option<&Affine2>,
        _element: Option<&TileElement>,
        texture: &TexturerOutput,
    ) -> TransformerOutput {
        let origin = object.transform().origin;
        let top_left = -origin * texture.frame_size + texture.offset;
        project(ctx, object, world_matrix(ctx, object, parent), top_left, texture.size)
    }
}

/// Like [`TransformerImage`] but sized by the object rather than its frame.
#[derive(Debug, Default)]
pub struct TransformerTileSprite;

impl RenderNode for TransformerTileSprite {
    fn name(&self) -> &str {
        "TransformerTileSprite"
    }
}

impl Transformer for TransformerTileSprite {
    fn run(
        &self,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        parent: Option<&Affine2>,
        _element: Option<&TileElement>,
        texture: &TexturerOutput,
    ) -> TransformerOutput {
        let size = object.size().unwrap_or(texture.size);
        let top_left = -object.transform().origin * size;
        project(ctx, object, world_matrix(ctx, object, parent), top_left, size)
    }
}

/// Places one tile of a layer at its grid cell.
#[derive(Debug, Default)]
pub struct TransformerTile;

impl RenderNode for TransformerTile {
    fn name(&self) -> &str {
        "TransformerTile"
    }
}

impl Transformer for TransformerTile {
    fn run(
        &self,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        parent: Option<&Affine2>,
        element: Option<&TileElement>,
        texture: &TexturerOutput,
    ) -> TransformerOutput {
        let matrix = world_matrix(ctx, object, parent);
        let Some(tile) = element else {
            return project(ctx, object, matrix, Vec2::ZERO, texture.size);
        };
        let cell = Vec2::new(tile.frame.width, tile.frame.height);
        let top_left = Vec2::new(tile.column as f32, tile.row as f32) * cell;
        project(ctx, object, matrix, top_left, texture.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::texturer::{Texturer, TexturerImage};
    use crate::scene::{Frame, Image, Texture, TilemapLayer, Tileset};
    use crate::renderer::commands::TextureId;

    fn texture() -> Texture {
        Texture {
            id: TextureId(1),
            width: 64,
            height: 64,
            resolution: 1.0,
        }
    }

    #[test]
    fn centered_image_corners() {
        let ctx = DrawingContext::canvas(200, 200);
        let image = Image::new(Frame::new(&texture(), 0.0, 0.0, 10.0, 20.0)).with_position(50.0, 50.0);
        let tex = TexturerImage.run(&image, None);
        let out = TransformerImage.run(&ctx, &image, None, None, &tex);

        assert_eq!(out.corners[0], Vec2::new(45.0, 40.0));
        assert_eq!(out.corners[1], Vec2::new(45.0, 60.0));
        assert_eq!(out.corners[2], Vec2::new(55.0, 40.0));
        assert_eq!(out.corners[3], Vec2::new(55.0, 60.0));
    }

    #[test]
    fn parent_matrix_is_applied_before_camera() {
        let mut ctx = DrawingContext::canvas(200, 200);
        let mut camera = ctx.camera().clone();
        camera.scroll = Vec2::new(10.0, 0.0);
        ctx.set_camera(camera);

        let image = Image::new(Frame::new(&texture(), 0.0, 0.0, 10.0, 10.0)).with_origin(0.0, 0.0);
        let parent = Affine2::from_translation(Vec2::new(100.0, 5.0));
        let tex = TexturerImage.run(&image, None);
        let out = TransformerImage.run(&ctx, &image, Some(&parent), None, &tex);

        assert_eq!(out.corners[0], Vec2::new(90.0, 5.0));
    }

    #[test]
    fn safe_rounding_only_for_translations() {
        let translated = Affine2::from_translation(Vec2::new(0.4, 0.6));
        let rotated = Affine2::from_angle(0.3);
        assert!(VertexRoundMode::Safe.should_round(&translated, false));
        assert!(!VertexRoundMode::Safe.should_round(&rotated, false));
        assert!(!VertexRoundMode::SafeAuto.should_round(&translated, false));
        assert!(VertexRoundMode::FullAuto.should_round(&rotated, true));
        assert!(!VertexRoundMode::Off.should_round(&translated, true));
    }

    #[test]
    fn tiles_land_on_their_cell() {
        let ctx = DrawingContext::canvas(200, 200);
        let mut layer = TilemapLayer::new(Tileset::new(texture(), 16.0, 16.0));
        layer.transform.position = Vec2::new(8.0, 0.0);
        layer.put_tile(1, 2, 3);

        let tile = layer.tiles()[0];
        let tex = TexturerImage.run(&layer, Some(&tile));
        let out = TransformerTile.run(&ctx, &layer, None, Some(&tile), &tex);

        assert_eq!(out.corners[0], Vec2::new(40.0, 48.0));
        assert_eq!(out.corners[3], Vec2::new(56.0, 64.0));
    }
}
