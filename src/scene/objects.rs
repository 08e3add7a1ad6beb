// scene/objects.rs
use super::frame::{Crop, Frame};
use super::tilemap::TileElement;
use super::transform::Transform2D;
use crate::renderer::batch::RenderOptions;
use crate::renderer::blend::BlendMode;
use crate::renderer::commands::TextureId;
use crate::renderer::node::NodeKey;
use crate::renderer::transformer::VertexRoundMode;
use glam::Vec2;

/// Per-corner colors (0xRRGGBB) and alphas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tint {
    pub top_left: u32,
    pub top_right: u32,
    pub bottom_left: u32,
    pub bottom_right: u32,
    /// Alpha per corner in TL, TR, BL, BR order.
    pub alpha: [f32; 4],
    /// Replace the texture color instead of multiplying it.
    pub fill: bool,
}

impl Default for Tint {
    fn default() -> Self {
        Self::solid(0xffffff)
    }
}

impl Tint {
    pub fn solid(color: u32) -> Self {
        Self {
            top_left: color,
            top_right: color,
            bottom_left: color,
            bottom_right: color,
            alpha: [1.0; 4],
            fill: false,
        }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = [alpha; 4];
        self
    }
}

/// The render nodes an object type uses unless it overrides them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultNodes {
    pub submitter: NodeKey,
    pub texturer: NodeKey,
    pub transformer: NodeKey,
    pub tinter: NodeKey,
    pub batch_handler: NodeKey,
}

impl DefaultNodes {
    pub fn image() -> Self {
        Self {
            submitter: NodeKey::SubmitterQuad,
            texturer: NodeKey::TexturerImage,
            transformer: NodeKey::TransformerImage,
            tinter: NodeKey::TinterImage,
            batch_handler: NodeKey::BatchHandlerQuad,
        }
    }

    pub fn lit_image() -> Self {
        Self {
            batch_handler: NodeKey::BatchHandlerQuadLight,
            ..Self::image()
        }
    }

    pub fn tile_sprite() -> Self {
        Self {
            submitter: NodeKey::SubmitterQuad,
            texturer: NodeKey::TexturerTileSprite,
            transformer: NodeKey::TransformerTileSprite,
            tinter: NodeKey::TinterImage,
            batch_handler: NodeKey::BatchHandlerTileSprite,
        }
    }

    pub fn tilemap_layer() -> Self {
        Self {
            submitter: NodeKey::SubmitterQuad,
            texturer: NodeKey::TexturerImage,
            transformer: NodeKey::TransformerTile,
            tinter: NodeKey::TinterTile,
            batch_handler: NodeKey::BatchHandlerQuad,
        }
    }
}

/// Per-object replacements for default render nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeOverrides {
    pub submitter: Option<NodeKey>,
    pub texturer: Option<NodeKey>,
    pub transformer: Option<NodeKey>,
    pub tinter: Option<NodeKey>,
    pub batch_handler: Option<NodeKey>,
}

/// What the render nodes need to know about a game object.
pub trait GameObject {
    fn transform(&self) -> &Transform2D;
    fn frame(&self) -> &Frame;
    fn tint(&self) -> &Tint;
    fn default_nodes(&self) -> DefaultNodes;

    fn crop(&self) -> Option<&Crop> {
        None
    }

    /// Display size for objects not sized by their frame.
    fn size(&self) -> Option<Vec2> {
        None
    }

    fn tiling(&self) -> Option<&Tiling> {
        None
    }

    /// Sub-elements drawn in place of the object itself.
    fn tile_elements(&self) -> Option<&[TileElement]> {
        None
    }

    fn normal_map(&self) -> Option<TextureId> {
        None
    }

    fn round_mode(&self) -> VertexRoundMode {
        VertexRoundMode::SafeAuto
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions::empty()
    }

    fn blend_mode(&self) -> BlendMode {
        BlendMode::Normal
    }

    fn node_overrides(&self) -> Option<&NodeOverrides> {
        None
    }

    fn visible(&self) -> bool {
        true
    }
}

#[derive(Clone, Debug)]
pub struct Image {
    pub transform: Transform2D,
    pub frame: Frame,
    pub tint: Tint,
    pub crop: Option<Crop>,
    pub normal_map: Option<TextureId>,
    pub round_mode: VertexRoundMode,
    pub blend_mode: BlendMode,
    /// Only `SMOOTH_PIXEL_ART` matters to plain quads.
    pub render_options: RenderOptions,
    pub overrides: Option<NodeOverrides>,
    pub visible: bool,
}

impl Image {
    pub fn new(frame: Frame) -> Self {
        Self {
            transform: Transform2D::default(),
            frame,
            tint: Tint::default(),
            crop: None,
            normal_map: None,
            round_mode: VertexRoundMode::SafeAuto,
            blend_mode: BlendMode::Normal,
            render_options: RenderOptions::empty(),
            overrides: None,
            visible: true,
        }
    }

    pub fn with_smooth_pixel_art(mut self, smooth: bool) -> Self {
        self.render_options.set(RenderOptions::SMOOTH_PIXEL_ART, smooth);
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.transform.position = Vec2::new(x, y);
        self
    }

    pub fn with_origin(mut self, x: f32, y: f32) -> Self {
        self.transform.origin = Vec2::new(x, y);
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn with_normal_map(mut self, normal_map: TextureId) -> Self {
        self.normal_map = Some(normal_map);
        self
    }
}

impl GameObject for Image {
    fn transform(&self) -> &Transform2D {
        &self.transform
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn tint(&self) -> &Tint {
        &self.tint
    }

    fn default_nodes(&self) -> DefaultNodes {
        if self.normal_map.is_some() {
            DefaultNodes::lit_image()
        } else {
            DefaultNodes::image()
        }
    }

    fn crop(&self) -> Option<&Crop> {
        self.crop.as_ref()
    }

    fn normal_map(&self) -> Option<TextureId> {
        self.normal_map
    }

    fn round_mode(&self) -> VertexRoundMode {
        self.round_mode
    }

    fn render_options(&self) -> RenderOptions {
        self.render_options
    }

    fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    fn node_overrides(&self) -> Option<&NodeOverrides> {
        self.overrides.as_ref()
    }

    fn visible(&self) -> bool {
        self.visible
    }
}

/// Scroll, scale and rotation of a repeating texture inside a tile sprite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tiling {
    pub position: Vec2,
    pub scale: Vec2,
    pub rotation: f32,
}

impl Default for Tiling {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TileSprite {
    pub transform: Transform2D,
    pub frame: Frame,
    pub tint: Tint,
    pub size: Vec2,
    pub tiling: Tiling,
    pub render_options: RenderOptions,
    pub blend_mode: BlendMode,
    pub overrides: Option<NodeOverrides>,
}

impl TileSprite {
    pub fn new(frame: Frame, width: f32, height: f32) -> Self {
        Self {
            transform: Transform2D::default(),
            frame,
            tint: Tint::default(),
            size: Vec2::new(width, height),
            tiling: Tiling::default(),
            render_options: RenderOptions::WRAP_FRAME,
            blend_mode: BlendMode::Normal,
            overrides: None,
        }
    }
}

impl GameObject for TileSprite {
    fn transform(&self) -> &Transform2D {
        &self.transform
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn tint(&self) -> &Tint {
        &self.tint
    }

    fn default_nodes(&self) -> DefaultNodes {
        DefaultNodes::tile_sprite()
    }

    fn size(&self) -> Option<Vec2> {
        Some(self.size)
    }

    fn tiling(&self) -> Option<&Tiling> {
        Some(&self.tiling)
    }

    fn render_options(&self) -> RenderOptions {
        self.render_options
    }

    fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    fn node_overrides(&self) -> Option<&NodeOverrides> {
        self.overrides.as_ref()
    }
}
