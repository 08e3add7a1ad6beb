//! Filter chains: padding, pass structure and pooled target leases.

use wgpu_quadbatch::renderer::{
    BlendMode, BlurQuality, DrawCall, FilterController, FilterList, RenderNodeError,
    RenderNodeManager, TextureId,
};
use wgpu_quadbatch::RenderSettings;

fn manager() -> RenderNodeManager {
    RenderNodeManager::new(RenderSettings::default())
}

fn draws(manager: &RenderNodeManager) -> Vec<DrawCall> {
    manager.recorder().draw_calls().cloned().collect()
}

#[test]
fn blur_output_grows_by_its_padding() {
    let mut manager = manager();
    let input = manager.allocate_context(32, 32);

    let blur = FilterController::blur(BlurQuality::Low, 1.0, 2);
    let padding = blur.padding();
    let result = FilterList::new(vec![blur])
        .run(&mut manager, input, None)
        .expect("blur runs");

    assert_eq!((result.width(), result.height()), padding.grow(32, 32));
    assert_eq!((result.width(), result.height()), (40, 40));

    // two steps of a horizontal and a vertical pass
    let passes = draws(&manager);
    assert_eq!(passes.len(), 4);
    assert!(passes.iter().all(|d| d.program.name == "filter_blur_low"));
    assert!(passes.iter().all(|d| d.blend == BlendMode::Copy));
    assert_eq!(passes[3].target, result.target());
}

#[test]
fn parallel_filters_release_every_intermediate() {
    let mut manager = manager();
    let input = manager.allocate_context(16, 16);

    let parallel = FilterController::ParallelFilters {
        top: vec![FilterController::blur(BlurQuality::Medium, 1.0, 1)],
        bottom: Vec::new(),
        mode: BlendMode::Add,
        amount: 1.0,
    };
    let result = FilterList::new(vec![parallel])
        .run(&mut manager, input, None)
        .expect("parallel runs");

    // branches share the padded input, so the blend keeps its size
    assert_eq!((result.width(), result.height()), (24, 24));
    assert_eq!(manager.pool().in_use(), 1);
    assert_eq!(draws(&manager).last().map(|d| d.program.name), Some("filter_blend"));

    manager.release_context(result);
    assert_eq!(manager.pool().in_use(), 0);
}

#[test]
fn two_input_filters_bind_their_extra_texture() {
    let mut manager = manager();
    let input = manager.allocate_context(8, 8);
    let source = input.texture().expect("pooled contexts have textures");

    let mask = FilterController::Mask {
        texture: TextureId(42),
        invert: true,
    };
    let result = FilterList::new(vec![mask])
        .run(&mut manager, input, None)
        .expect("mask runs");

    let pass = draws(&manager).pop().expect("one pass");
    assert_eq!(pass.program.name, "filter_mask");
    assert_eq!(pass.textures.as_slice(), &[source, TextureId(42)]);
    manager.release_context(result);
}

#[test]
fn empty_chain_copies_into_a_given_output() {
    let mut manager = manager();
    let input = manager.allocate_context(8, 8);
    let output = manager.allocate_context(8, 8);
    let target = output.target();

    let result = FilterList::default()
        .run(&mut manager, input, Some(output))
        .expect("copy runs");

    assert_eq!(result.target(), target);
    let passes = draws(&manager);
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].program.name, "filter_copy");
}

#[test]
fn canvas_cannot_be_filtered() {
    let mut manager = manager();
    let canvas = manager.canvas_context();
    let err = FilterList::new(vec![FilterController::Copy])
        .run(&mut manager, canvas, None)
        .err();
    assert!(matches!(err, Some(RenderNodeError::CanvasInput)));
}
