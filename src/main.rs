use glam::Vec2;
use log::{error, info, warn};
use std::rc::Rc;
use wgpu_quadbatch::renderer::{
    BlendMode, BlurQuality, FilterController, FilterList, GpuCommand, NodeKey, RenderNodeError,
    RenderNodeManager, WgpuExecutor,
};
use wgpu_quadbatch::scene::{
    Frame, GameObject, GpuLayerMember, Image, ImageGpuLayer, LightEnvironment, PointLight,
    Texture, TileSprite, TilemapLayer, Tileset,
};
use wgpu_quadbatch::{init_logging, RenderSettings};

/// Checkerboard pixels for the demo textures.
fn checker(width: u32, height: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let cell = ((x / 8) + (y / 8)) % 2 == 0;
            pixels.extend_from_slice(if cell { &a } else { &b });
        }
    }
    pixels
}

struct DemoTextures {
    sprite: Texture,
    tiles: Texture,
    normals: Texture,
}

/// A field of small sprites baked once and redrawn every frame.
fn star_field(texture: &Texture) -> ImageGpuLayer {
    let frame = Frame::new(texture, 0.0, 0.0, 8.0, 8.0);
    let mut layer = ImageGpuLayer::new(frame);
    for i in 0..500u32 {
        let mut member = GpuLayerMember::new(&frame, (i * 37 % 800) as f32, (i * 91 % 600) as f32);
        member.transform.rotation = i as f32 * 0.1;
        member.transform.scroll_factor = Vec2::splat(0.5);
        member.alpha = 0.6;
        layer.add(member);
    }
    layer
}

fn record_frame(
    manager: &mut RenderNodeManager,
    textures: &DemoTextures,
    stars: &mut ImageGpuLayer,
) -> Result<Vec<GpuCommand>, RenderNodeError> {
    let mut canvas = manager.canvas_context();
    let mut camera = canvas.camera().clone();
    camera.lights = Some(Rc::new(LightEnvironment {
        ambient: [0.2, 0.2, 0.25],
        lights: vec![PointLight::new(200.0, 150.0, 300.0)],
    }));
    canvas.set_camera(camera);
    manager.use_context(&canvas);

    let fill = manager.fill_camera(&NodeKey::FillCamera)?;
    fill.run(manager, &canvas, 0x203040, 1.0)?;
    manager.submit_gpu_layer(&canvas, stars)?;

    let mut layer = TilemapLayer::new(Tileset::new(textures.tiles, 16.0, 16.0));
    for column in 0..20 {
        layer.put_tile(column % 4, column, 10);
    }

    let sprites: Vec<Image> = (0..64)
        .map(|i| {
            Image::new(Frame::whole(&textures.sprite))
                .with_position(40.0 + (i % 16) as f32 * 45.0, 60.0 + (i / 16) as f32 * 45.0)
        })
        .collect();
    let lit = Image::new(Frame::whole(&textures.sprite))
        .with_position(600.0, 400.0)
        .with_normal_map(textures.normals.id);
    let mut water = TileSprite::new(Frame::whole(&textures.tiles), 800.0, 64.0);
    water.transform.position = Vec2::new(400.0, 560.0);
    water.tiling.position = Vec2::new(12.0, 0.0);

    let mut children: Vec<&dyn GameObject> = vec![&layer, &water, &lit];
    children.extend(sprites.iter().map(|s| s as &dyn GameObject));

    let compositor = manager.list_compositor(&NodeKey::ListCompositor)?;
    compositor.run(manager, &canvas, &children, None)?;

    // glow: the sprite drawn offscreen, blurred and added over itself
    let offscreen = manager.allocate_context(64, 64);
    manager.use_context(&offscreen);
    let mut stamp = Image::new(Frame::whole(&textures.sprite));
    stamp.transform.position = Vec2::splat(32.0);
    manager.submit(&offscreen, &stamp, None)?;

    let glow = FilterController::ParallelFilters {
        top: vec![FilterController::blur(BlurQuality::Medium, 2.0, 2)],
        bottom: vec![FilterController::Copy],
        mode: BlendMode::Add,
        amount: 1.0,
    };
    let filters = FilterList::new(vec![glow]);
    let filtered = filters.run(manager, offscreen, None)?;

    if let Some(texture) = filtered.texture() {
        let result = Texture {
            id: texture,
            width: filtered.width(),
            height: filtered.height(),
            resolution: 1.0,
        };
        let preview = Image::new(Frame::whole(&result)).with_position(700.0, 80.0);
        manager.submit(&canvas, &preview, None)?;
    }
    manager.release_context(filtered);
    manager.release_context(canvas);

    let stats = manager.recorder().stats();
    info!(
        "Recorded {} draws with {} vertex uploads",
        stats.draw_calls, stats.vertex_uploads
    );
    Ok(manager.end_frame())
}

fn main() {
    init_logging();
    let settings = RenderSettings::load();
    info!(
        "Rendering {}x{} with batches of {} quads",
        settings.resolution.width, settings.resolution.height, settings.batch_size
    );

    let mut executor = match pollster::block_on(WgpuExecutor::headless(&settings)) {
        Ok(executor) => Some(executor),
        Err(err) => {
            warn!("Recording without a GPU: {err}");
            None
        }
    };

    let mut manager = RenderNodeManager::new(settings);
    if let Some(executor) = &executor {
        manager.update_texture_count(executor.texture_units() as usize);
    }

    let textures = DemoTextures {
        sprite: manager.register_texture(32, 32, 1.0),
        tiles: manager.register_texture(64, 64, 1.0),
        normals: manager.register_texture(32, 32, 1.0),
    };

    if let Some(executor) = executor.as_mut() {
        let uploads = [
            (textures.sprite, checker(32, 32, [255, 200, 0, 255], [200, 80, 0, 255])),
            (textures.tiles, checker(64, 64, [40, 140, 220, 255], [20, 90, 160, 255])),
            (textures.normals, checker(32, 32, [128, 128, 255, 255], [160, 128, 230, 255])),
        ];
        for (texture, pixels) in uploads {
            if let Err(err) = executor.upload_texture(texture.id, texture.width, texture.height, &pixels) {
                error!("Texture upload failed: {err}");
                return;
            }
        }
    }

    let mut stars = star_field(&textures.sprite);
    for frame in 0..3 {
        let commands = match record_frame(&mut manager, &textures, &mut stars) {
            Ok(commands) => commands,
            Err(err) => {
                error!("Frame {frame} failed: {err}");
                return;
            }
        };
        info!("Frame {frame}: {} commands", commands.len());
        if let Some(executor) = executor.as_mut() {
            if let Err(err) = executor.execute(&commands) {
                error!("Frame {frame} could not be replayed: {err}");
                return;
            }
        }
    }
}
