// scene/mod.rs

pub mod camera;
pub mod frame;
pub mod gpu_layer;
pub mod objects;
pub mod tilemap;
pub mod transform;

pub use camera::{Camera2D, LightEnvironment, PointLight};
pub use frame::{Crop, Frame, Texture, UvRect};
pub use gpu_layer::{GpuLayerMember, ImageGpuLayer};
pub use objects::{DefaultNodes, GameObject, Image, NodeOverrides, TileSprite, Tiling, Tint};
pub use tilemap::{TileElement, TilemapLayer, Tileset};
pub use transform::Transform2D;
