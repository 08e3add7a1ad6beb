use crate::renderer::commands::TextureId;
use glam::Vec2;
use std::cell::Cell;

/// A texture the renderer can sample. Pixel data lives with the executor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Texture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    /// Source pixels per display pixel.
    pub resolution: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl UvRect {
    pub const FULL: UvRect = UvRect {
        u0: 0.0,
        v0: 0.0,
        u1: 1.0,
        v1: 1.0,
    };

    pub fn width(&self) -> f32 {
        self.u1 - self.u0
    }

    pub fn height(&self) -> f32 {
        self.v1 - self.v0
    }

    pub fn flipped(self, flip_x: bool, flip_y: bool) -> Self {
        let (u0, u1) = if flip_x { (self.u1, self.u0) } else { (self.u0, self.u1) };
        let (v0, v1) = if flip_y { (self.v1, self.v0) } else { (self.v0, self.v1) };
        Self { u0, v0, u1, v1 }
    }
}

/// A rectangular region of a texture, in source pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    pub texture: TextureId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub source_width: f32,
    pub source_height: f32,
    pub resolution: f32,
    pub uv: UvRect,
}

impl Frame {
    pub fn new(texture: &Texture, x: f32, y: f32, width: f32, height: f32) -> Self {
        let mut frame = Self {
            texture: texture.id,
            x,
            y,
            width,
            height,
            source_width: texture.width as f32,
            source_height: texture.height as f32,
            resolution: texture.resolution,
            uv: UvRect::default(),
        };
        frame.uv = frame.region_uv(0.0, 0.0, width, height);
        frame
    }

    pub fn whole(texture: &Texture) -> Self {
        Self::new(texture, 0.0, 0.0, texture.width as f32, texture.height as f32)
    }

    /// UVs of a frame-relative pixel rectangle.
    pub fn region_uv(&self, x: f32, y: f32, width: f32, height: f32) -> UvRect {
        let sw = self.source_width.max(1.0);
        let sh = self.source_height.max(1.0);
        UvRect {
            u0: (self.x + x) / sw,
            v0: (self.y + y) / sh,
            u1: (self.x + x + width) / sw,
            v1: (self.y + y + height) / sh,
        }
    }

    /// Display size of a UV rectangle inside this frame's texture.
    pub fn uv_size(&self, uv: &UvRect) -> Vec2 {
        let res = if self.resolution > 0.0 { self.resolution } else { 1.0 };
        Vec2::new(
            uv.width().abs() * self.source_width,
            uv.height().abs() * self.source_height,
        ) / res
    }

    /// Size in display pixels.
    pub fn display_size(&self) -> Vec2 {
        let res = if self.resolution > 0.0 { self.resolution } else { 1.0 };
        Vec2::new(self.width, self.height) / res
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CropCache {
    frame: Frame,
    rect: [f32; 4],
    flip_x: bool,
    flip_y: bool,
    uv: UvRect,
    offset: Vec2,
}

/// A crop rectangle in frame pixels. The UVs are regenerated lazily, when
/// the frame, the rectangle or the flip state differs from the one they
/// were computed for.
#[derive(Debug, Default)]
pub struct Crop {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    cache: Cell<Option<CropCache>>,
    regenerations: Cell<u32>,
}

impl Clone for Crop {
    fn clone(&self) -> Self {
        Self {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            cache: Cell::new(self.cache.get()),
            regenerations: Cell::new(0),
        }
    }
}

impl Crop {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Self::default()
        }
    }

    /// Moves the crop rectangle and drops the cached UVs.
    pub fn set(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        self.cache.set(None);
    }

    /// Returns the crop UVs and the crop's offset inside the frame (display
    /// pixels), taking the flip into account. The drawn size follows from
    /// the UVs, see [`Frame::uv_size`].
    pub fn resolve(&self, frame: &Frame, flip_x: bool, flip_y: bool) -> (UvRect, Vec2) {
        let rect = [self.x, self.y, self.width, self.height];
        if let Some(cached) = self.cache.get() {
            if cached.flip_x == flip_x
                && cached.flip_y == flip_y
                && cached.rect == rect
                && cached.frame == *frame
            {
                return (cached.uv, cached.offset);
            }
        }

        let x = self.x.clamp(0.0, frame.width);
        let y = self.y.clamp(0.0, frame.height);
        let width = self.width.clamp(0.0, frame.width - x);
        let height = self.height.clamp(0.0, frame.height - y);

        // A flipped object mirrors the crop back into place, so the crop
        // window is mirrored inside the frame first.
        let cx = if flip_x { frame.width - x - width } else { x };
        let cy = if flip_y { frame.height - y - height } else { y };

        let uv = frame.region_uv(cx, cy, width, height);
        let res = if frame.resolution > 0.0 { frame.resolution } else { 1.0 };
        let offset = Vec2::new(cx, cy) / res;

        self.cache.set(Some(CropCache {
            frame: *frame,
            rect,
            flip_x,
            flip_y,
            uv,
            offset,
        }));
        self.regenerations.set(self.regenerations.get() + 1);
        (uv, offset)
    }

    pub fn regenerations(&self) -> u32 {
        self.regenerations.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture() -> Texture {
        Texture {
            id: TextureId(1),
            width: 256,
            height: 128,
            resolution: 1.0,
        }
    }

    #[test]
    fn frame_uvs_are_normalized() {
        let frame = Frame::new(&texture(), 64.0, 32.0, 64.0, 32.0);
        assert_eq!(
            frame.uv,
            UvRect {
                u0: 0.25,
                v0: 0.25,
                u1: 0.5,
                v1: 0.5
            }
        );
    }

    #[test]
    fn crop_regenerates_only_on_flip_change() {
        let frame = Frame::new(&texture(), 0.0, 0.0, 100.0, 100.0);
        let crop = Crop::new(10.0, 0.0, 20.0, 100.0);

        let (uv, offset) = crop.resolve(&frame, false, false);
        crop.resolve(&frame, false, false);
        assert_eq!(crop.regenerations(), 1);
        assert_eq!(offset, Vec2::new(10.0, 0.0));
        assert!((uv.u0 - 10.0 / 256.0).abs() < 1e-6);

        let (_, flipped) = crop.resolve(&frame, true, false);
        assert_eq!(crop.regenerations(), 2);
        assert_eq!(flipped, Vec2::new(70.0, 0.0));
    }

    #[test]
    fn crop_follows_frame_and_rect_changes() {
        let tex = texture();
        let crop_frame = Frame::new(&tex, 0.0, 0.0, 64.0, 64.0);
        let mut image = crate::scene::Image::new(crop_frame);
        image.crop = Some(Crop::new(0.0, 0.0, 32.0, 32.0));
        let crop = image.crop.clone().expect("crop set");

        let (first, _) = crop.resolve(&image.frame, false, false);
        assert_eq!(first.u0, 0.0);

        image.frame = Frame::new(&tex, 128.0, 64.0, 64.0, 64.0);
        let (swapped, _) = crop.resolve(&image.frame, false, false);
        assert_eq!(swapped, image.frame.region_uv(0.0, 0.0, 32.0, 32.0));
        assert_eq!(crop.regenerations(), 2);

        let mut moved = crop.clone();
        moved.x = 16.0;
        let (shifted, offset) = moved.resolve(&image.frame, false, false);
        assert_eq!(shifted, image.frame.region_uv(16.0, 0.0, 32.0, 32.0));
        assert_eq!(offset, Vec2::new(16.0, 0.0));
    }

    #[test]
    fn crop_is_clamped_to_frame() {
        let frame = Frame::new(&texture(), 0.0, 0.0, 50.0, 50.0);
        let crop = Crop::new(40.0, 40.0, 100.0, 100.0);
        let (uv, _) = crop.resolve(&frame, false, false);
        assert!((uv.u1 - 50.0 / 256.0).abs() < 1e-6);
    }
}
