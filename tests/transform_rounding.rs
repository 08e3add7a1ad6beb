//! Pixel rounding of submitted quads, checked on the uploaded vertex data.

use wgpu_quadbatch::renderer::{GpuCommand, RenderNodeManager};
use wgpu_quadbatch::scene::{Frame, Image};
use wgpu_quadbatch::RenderSettings;

const QUAD_STRIDE_WORDS: usize = 7;

fn manager(round_pixels: bool) -> RenderNodeManager {
    RenderNodeManager::new(RenderSettings {
        round_pixels,
        ..RenderSettings::default()
    })
}

/// Positions of the four vertices of the first uploaded quad.
fn first_quad_positions(commands: &[GpuCommand]) -> Vec<(f32, f32)> {
    let bytes = commands
        .iter()
        .find_map(|command| match command {
            GpuCommand::UploadVertices { bytes, .. } => Some(bytes),
            _ => None,
        })
        .expect("vertex upload");
    let floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    (0..4)
        .map(|v| {
            let base = v * QUAD_STRIDE_WORDS;
            (floats[base], floats[base + 1])
        })
        .collect()
}

fn draw_image(manager: &mut RenderNodeManager, image: &Image) -> Vec<GpuCommand> {
    let canvas = manager.canvas_context();
    manager.use_context(&canvas);
    manager.submit(&canvas, image, None).expect("submit");
    manager.release_context(canvas);
    manager.end_frame()
}

#[test]
fn translated_quads_snap_when_the_camera_rounds() {
    let mut manager = manager(true);
    let texture = manager.register_texture(32, 32, 1.0);
    let image = Image::new(Frame::whole(&texture)).with_position(10.3, 20.6);

    let positions = first_quad_positions(&draw_image(&mut manager, &image));
    // bottom-left is written first
    assert_eq!(positions[0], (-6.0, 37.0));
    assert_eq!(positions[1], (-6.0, 5.0));
    assert!(positions
        .iter()
        .all(|(x, y)| x.fract() == 0.0 && y.fract() == 0.0));
}

#[test]
fn quads_keep_subpixel_positions_without_camera_rounding() {
    let mut manager = manager(false);
    let texture = manager.register_texture(32, 32, 1.0);
    let image = Image::new(Frame::whole(&texture)).with_position(10.3, 20.6);

    let positions = first_quad_positions(&draw_image(&mut manager, &image));
    let (x, y) = positions[0];
    assert!((x - -5.7).abs() < 1e-4);
    assert!((y - 36.6).abs() < 1e-4);
}

#[test]
fn rotated_quads_are_not_snapped_in_safe_mode() {
    let mut manager = manager(true);
    let texture = manager.register_texture(32, 32, 1.0);
    let mut image = Image::new(Frame::whole(&texture)).with_position(10.3, 20.6);
    image.transform.rotation = 0.3;

    let positions = first_quad_positions(&draw_image(&mut manager, &image));
    assert!(positions
        .iter()
        .any(|(x, y)| x.fract().abs() > 1e-3 || y.fract().abs() > 1e-3));
}
