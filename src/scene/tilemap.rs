use super::frame::{Frame, Texture};
use super::objects::{DefaultNodes, GameObject, Tint};
use super::transform::Transform2D;
use crate::renderer::transformer::VertexRoundMode;

/// A grid of equally sized tiles inside one texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tileset {
    pub texture: Texture,
    pub tile_width: f32,
    pub tile_height: f32,
    pub margin: f32,
    pub spacing: f32,
}

impl Tileset {
    pub fn new(texture: Texture, tile_width: f32, tile_height: f32) -> Self {
        Self {
            texture,
            tile_width,
            tile_height,
            margin: 0.0,
            spacing: 0.0,
        }
    }

    pub fn columns(&self) -> u32 {
        let usable = self.texture.width as f32 - 2.0 * self.margin + self.spacing;
        (usable / (self.tile_width + self.spacing)).floor().max(0.0) as u32
    }

    pub fn rows(&self) -> u32 {
        let usable = self.texture.height as f32 - 2.0 * self.margin + self.spacing;
        (usable / (self.tile_height + self.spacing)).floor().max(0.0) as u32
    }

    pub fn frame(&self, index: u32) -> Option<Frame> {
        let columns = self.columns();
        if columns == 0 || index >= columns * self.rows() {
            return None;
        }
        let col = (index % columns) as f32;
        let row = (index / columns) as f32;
        Some(Frame::new(
            &self.texture,
            self.margin + col * (self.tile_width + self.spacing),
            self.margin + row * (self.tile_height + self.spacing),
            self.tile_width,
            self.tile_height,
        ))
    }
}

/// One drawable tile of a layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileElement {
    pub frame: Frame,
    pub column: u32,
    pub row: u32,
    pub flip_x: bool,
    pub flip_y: bool,
    pub tint: u32,
    pub alpha: f32,
}

#[derive(Clone, Debug)]
pub struct TilemapLayer {
    pub transform: Transform2D,
    pub tileset: Tileset,
    pub tint: Tint,
    frame: Frame,
    tiles: Vec<TileElement>,
}

impl TilemapLayer {
    pub fn new(tileset: Tileset) -> Self {
        Self {
            transform: Transform2D {
                origin: glam::Vec2::ZERO,
                ..Transform2D::default()
            },
            frame: Frame::whole(&tileset.texture),
            tileset,
            tint: Tint::default(),
            tiles: Vec::new(),
        }
    }

    /// Places tile `index` of the tileset. Returns false when the index is
    /// outside the tileset.
    pub fn put_tile(&mut self, index: u32, column: u32, row: u32) -> bool {
        let Some(frame) = self.tileset.frame(index) else {
            return false;
        };
        self.tiles.retain(|t| !(t.column == column && t.row == row));
        self.tiles.push(TileElement {
            frame,
            column,
            row,
            flip_x: false,
            flip_y: false,
            tint: 0xffffff,
            alpha: 1.0,
        });
        true
    }

    pub fn tile_mut(&mut self, column: u32, row: u32) -> Option<&mut TileElement> {
        self.tiles
            .iter_mut()
            .find(|t| t.column == column && t.row == row)
    }

    pub fn tiles(&self) -> &[TileElement] {
        &self.tiles
    }
}

impl GameObject for TilemapLayer {
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
        DefaultNodes::tilemap_layer()
    }

    fn tile_elements(&self) -> Option<&[TileElement]> {
        Some(&self.tiles)
    }

    fn round_mode(&self) -> VertexRoundMode {
        VertexRoundMode::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::commands::TextureId;

    fn tileset() -> Tileset {
        Tileset::new(
            Texture {
                id: TextureId(3),
                width: 64,
                height: 32,
                resolution: 1.0,
            },
            16.0,
            16.0,
        )
    }

    #[test]
    fn tileset_frames_walk_rows() {
        let set = tileset();
        assert_eq!(set.columns(), 4);
        let frame = set.frame(5).expect("tile 5");
        assert_eq!((frame.x, frame.y), (16.0, 16.0));
        assert!(set.frame(8).is_none());
    }

    #[test]
    fn put_tile_replaces_cell() {
        let mut layer = TilemapLayer::new(tileset());
        assert!(layer.put_tile(0, 1, 1));
        assert!(layer.put_tile(2, 1, 1));
        assert!(!layer.put_tile(99, 0, 0));
        assert_eq!(layer.tiles().len(), 1);
        assert_eq!(layer.tiles()[0].frame.x, 32.0);
    }
}
