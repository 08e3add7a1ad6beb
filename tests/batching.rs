//! Batching behavior seen through the node manager: capacity flushes,
//! texture-unit entries, flush idempotence and the single current batch.

use wgpu_quadbatch::renderer::gpu::builtin_programs;
use wgpu_quadbatch::renderer::{
    BatchHandlerQuad, BatchHandlerTileSprite, BatchPrimitive, BlendMode, DrawCall,
    DrawingContext, GpuCommand, Node, NodeKey, QuadInstance, RenderNodeError, RenderNodeManager,
    TextureId,
};
use wgpu_quadbatch::scene::{Frame, TileSprite};
use wgpu_quadbatch::RenderSettings;

fn manager(batch_size: usize, max_textures: usize) -> RenderNodeManager {
    RenderNodeManager::new(RenderSettings {
        batch_size,
        max_textures,
        ..RenderSettings::default()
    })
}

fn quad(texture: u32, x: f32) -> QuadInstance {
    QuadInstance::rect(TextureId(texture), x, 0.0, 16.0, 16.0)
}

fn draws(manager: &RenderNodeManager) -> Vec<DrawCall> {
    manager.recorder().draw_calls().cloned().collect()
}

fn batch_quads(manager: &mut RenderNodeManager, ctx: &DrawingContext, textures: &[u32]) {
    for (i, texture) in textures.iter().enumerate() {
        manager
            .batch(
                &NodeKey::BatchHandlerQuad,
                ctx,
                BatchPrimitive::Quad(&quad(*texture, i as f32 * 16.0)),
            )
            .expect("batch quad");
    }
}

#[test]
fn full_batch_flushes_on_its_own() {
    let mut manager = manager(2, 8);
    let ctx = DrawingContext::canvas(128, 128);

    batch_quads(&mut manager, &ctx, &[1, 1, 1]);
    let early = draws(&manager);
    assert_eq!(early.len(), 1);
    assert_eq!(early[0].index_count, 12);

    manager.finish_batch();
    let all = draws(&manager);
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].index_count, 6);
    assert_eq!(all[1].first_index, 0);
}

#[test]
fn running_out_of_units_splits_one_upload_into_entries() {
    let mut manager = manager(100, 2);
    let ctx = DrawingContext::canvas(128, 128);

    batch_quads(&mut manager, &ctx, &[1, 2, 3]);
    manager.finish_batch();

    let all = draws(&manager);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].textures.as_slice(), &[TextureId(1), TextureId(2)]);
    assert_eq!(all[0].index_count, 12);
    assert_eq!(all[1].textures.as_slice(), &[TextureId(3)]);
    assert_eq!(all[1].first_index, 12);
    assert_eq!(manager.recorder().stats().vertex_uploads, 1);
}

#[test]
fn finishing_twice_draws_nothing_more() {
    let mut manager = manager(100, 8);
    let ctx = DrawingContext::canvas(64, 64);

    batch_quads(&mut manager, &ctx, &[1, 2]);
    manager.finish_batch();
    let commands = manager.recorder().commands().len();
    manager.finish_batch();
    manager.start_stand_alone_render();

    assert_eq!(manager.recorder().commands().len(), commands);
    assert_eq!(manager.current_batch_node(), None);
}

#[test]
fn context_state_change_flushes_the_current_batch() {
    let mut manager = manager(100, 8);
    let ctx = DrawingContext::canvas(64, 64);
    let mut additive = ctx.get_clone();
    additive.set_blend_mode(BlendMode::Add);

    batch_quads(&mut manager, &ctx, &[1]);
    // a lease of the same context keeps the batch open
    batch_quads(&mut manager, &ctx.clone(), &[1]);
    assert!(draws(&manager).is_empty());

    batch_quads(&mut manager, &additive, &[1]);
    let first = draws(&manager);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].blend, BlendMode::Normal);
    assert_eq!(first[0].index_count, 12);

    manager.finish_batch();
    assert_eq!(draws(&manager)[1].blend, BlendMode::Add);
}

#[test]
fn texture_units_are_released_after_a_flush() {
    let mut manager = manager(100, 8);
    let ctx = DrawingContext::canvas(64, 64);

    batch_quads(&mut manager, &ctx, &[7, 9]);
    let handler = manager
        .batch_handler(&NodeKey::BatchHandlerQuad)
        .expect("quad handler");
    assert_eq!(handler.texture_unit(TextureId(9)), Some(1));

    manager.finish_batch();
    let handler = manager
        .batch_handler(&NodeKey::BatchHandlerQuad)
        .expect("quad handler");
    assert_eq!(handler.texture_unit(TextureId(7)), None);
    assert_eq!(handler.instance_count(), 0);
}

#[test]
fn draws_record_target_and_viewport() {
    let mut manager = manager(100, 8);
    let ctx = manager.allocate_context(40, 30);
    manager.use_context(&ctx);

    batch_quads(&mut manager, &ctx, &[1]);
    manager.release_context(ctx);

    let commands = manager.end_frame();
    let draw = commands
        .iter()
        .find_map(|command| match command {
            GpuCommand::Draw(call) => Some(call),
            _ => None,
        })
        .expect("a draw");
    assert_eq!(draw.viewport, (40, 30));
    assert_eq!(draw.program, BatchHandlerQuad::PROGRAM);
    assert!(commands
        .iter()
        .any(|c| matches!(c, GpuCommand::CreateTarget { width: 40, height: 30, .. })));
}

#[test]
fn duplicate_registrations_are_rejected() {
    let mut manager = manager(100, 8);
    let key = NodeKey::custom("OverlayQuads");
    let build = |manager: &RenderNodeManager| {
        Node::Batch(Box::new(
            BatchHandlerQuad::with_capacity(16, 4, manager.ids())
                .named("OverlayQuads", BatchHandlerQuad::PROGRAM),
        ))
    };

    let node = build(&manager);
    manager.add_node(key.clone(), node).expect("first registration");
    let node = build(&manager);
    assert!(matches!(
        manager.add_node(key.clone(), node),
        Err(RenderNodeError::DuplicateNode(_))
    ));

    let err = manager
        .add_node_constructor(NodeKey::BatchHandlerQuad, |b| {
            Node::Batch(Box::new(BatchHandlerQuad::new(b.settings, b.ids)))
        })
        .err();
    assert!(matches!(err, Some(RenderNodeError::DuplicateConstructor(_))));

    // the custom node batches like any built-in one
    let ctx = DrawingContext::canvas(32, 32);
    manager
        .batch(&key, &ctx, BatchPrimitive::Quad(&quad(1, 0.0)))
        .expect("custom batch");
    manager.finish_batch();
    assert_eq!(draws(&manager)[0].node, "OverlayQuads");
}

#[test]
fn missing_nodes_are_reported() {
    let mut manager = RenderNodeManager::empty(RenderSettings::default());
    let ctx = DrawingContext::canvas(32, 32);
    let err = manager
        .batch(&NodeKey::BatchHandlerQuad, &ctx, BatchPrimitive::Quad(&quad(1, 0.0)))
        .err();
    assert!(matches!(err, Some(RenderNodeError::MissingNode(_))));
}

#[test]
fn tile_sprites_with_different_textures_share_a_draw() {
    let mut manager = manager(100, 4);
    let first = manager.register_texture(16, 16, 1.0);
    let second = manager.register_texture(32, 32, 1.0);
    let ctx = manager.canvas_context();
    manager.use_context(&ctx);

    for (texture, x) in [(first, 0.0), (second, 64.0)] {
        let mut sprite = TileSprite::new(Frame::whole(&texture), 48.0, 48.0);
        sprite.transform.position.x = x;
        manager.submit(&ctx, &sprite, None).expect("submit tile sprite");
    }
    manager.release_context(ctx);

    let all = draws(&manager);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].program.name, BatchHandlerTileSprite::PROGRAM.name);
    assert_eq!(all[0].textures.as_slice(), &[first.id, second.id]);

    // the shader must declare a unit for every texture the draw binds
    let programs = builtin_programs(4);
    let program = programs
        .iter()
        .find(|p| p.name == all[0].program.name)
        .expect("tile sprite program");
    assert!(program.texture_slots as usize >= all[0].textures.len());

    // and the second sprite's vertices point at unit 1
    let bytes = manager
        .recorder()
        .commands()
        .iter()
        .find_map(|command| match command {
            GpuCommand::UploadVertices { bytes, .. } => Some(bytes.clone()),
            _ => None,
        })
        .expect("vertex upload");
    let stride = BatchHandlerTileSprite::layout().stride() as usize;
    let datum = |vertex: usize| {
        let at = vertex * stride + 32;
        f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    };
    assert_eq!(datum(0), 0.0);
    assert_eq!(datum(4), 1.0);
}
