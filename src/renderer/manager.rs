// renderer/manager.rs
//
// Owns the render node registry, the single current batch, the drawing
// context pool and the frame's command recorder.

use super::batch::{
    BatchHandler, BatchHandlerQuad, BatchHandlerQuadLight, BatchHandlerTileSprite,
    BatchHandlerTriFlat, BatchPrimitive,
};
use super::commands::{DrawRecorder, GpuCommand, ResourceIds, TraceEntry};
use super::compositor::{FillCamera, FillRect, ListCompositor};
use super::context::{AutoClear, DrawingContext, DrawingContextPool};
use super::dynamic_texture::DynamicTextureHandler;
use super::filters::{
    BlendShader, BlurPassShader, BlurQuality, ColorMatrixShader, CopyShader, DisplacementShader,
    Filter, FilterBlur, FilterParallelFilters, FilterShader, GlowShader, MaskShader, ShaderFilter,
    ShadowShader, ThresholdShader,
};
use super::gpu_layer::SubmitterImageGpuLayer;
use super::node::{Node, NodeBuildContext, NodeConstructor, NodeKey, RenderNodeError};
use super::submitter::{SubmitNodes, Submitter, SubmitterQuad};
use super::texturer::{Texturer, TexturerImage, TexturerTileSprite};
use super::tinter::{Tinter, TinterImage, TinterTile};
use super::transformer::{Transformer, TransformerImage, TransformerTile, TransformerTileSprite};
use crate::scene::{GameObject, ImageGpuLayer, Texture};
use crate::settings::RenderSettings;
use glam::Affine2;
use log::{debug, info};
use std::collections::HashMap;
use std::rc::Rc;

pub struct RenderNodeManager {
    settings: RenderSettings,
    nodes: HashMap<NodeKey, Node>,
    constructors: HashMap<NodeKey, NodeConstructor>,
    current_batch: Option<(NodeKey, DrawingContext)>,
    default_batch_handler: NodeKey,
    recorder: DrawRecorder,
    pool: DrawingContextPool,
    ids: ResourceIds,
}

impl RenderNodeManager {
    /// A manager with every built-in node registered as a constructor.
    /// Nodes are built on first use.
    pub fn new(settings: RenderSettings) -> Self {
        let mut manager = Self::empty(settings);
        manager.register_builtin_nodes();
        info!(
            "Render node manager ready with {} node constructors",
            manager.constructors.len()
        );
        manager
    }

    /// A manager with no nodes registered.
    pub fn empty(settings: RenderSettings) -> Self {
        Self {
            recorder: DrawRecorder::new(settings.debug),
            pool: DrawingContextPool::new(settings.context_pool_max_age),
            settings,
            nodes: HashMap::new(),
            constructors: HashMap::new(),
            current_batch: None,
            default_batch_handler: NodeKey::BatchHandlerQuad,
            ids: ResourceIds::default(),
        }
    }

    fn register_builtin_nodes(&mut self) {
        let builtins: Vec<(NodeKey, NodeConstructor)> = vec![
            (
                NodeKey::BatchHandlerQuad,
                constructor(|b| Node::Batch(Box::new(BatchHandlerQuad::new(b.settings, b.ids)))),
            ),
            (
                NodeKey::BatchHandlerQuadLight,
                constructor(|b| {
                    Node::Batch(Box::new(BatchHandlerQuadLight::new(b.settings, b.ids)))
                }),
            ),
            (
                NodeKey::BatchHandlerTileSprite,
                constructor(|b| {
                    Node::Batch(Box::new(BatchHandlerTileSprite::new(b.settings, b.ids)))
                }),
            ),
            (
                NodeKey::BatchHandlerTriFlat,
                constructor(|b| Node::Batch(Box::new(BatchHandlerTriFlat::new(b.settings, b.ids)))),
            ),
            (
                NodeKey::TexturerImage,
                constructor(|_| Node::Texturer(Rc::new(TexturerImage))),
            ),
            (
                NodeKey::TexturerTileSprite,
                constructor(|_| Node::Texturer(Rc::new(TexturerTileSprite))),
            ),
            (
                NodeKey::TransformerImage,
                constructor(|_| Node::Transformer(Rc::new(TransformerImage))),
            ),
            (
                NodeKey::TransformerTile,
                constructor(|_| Node::Transformer(Rc::new(TransformerTile))),
            ),
            (
                NodeKey::TransformerTileSprite,
                constructor(|_| Node::Transformer(Rc::new(TransformerTileSprite))),
            ),
            (
                NodeKey::TinterImage,
                constructor(|_| Node::Tinter(Rc::new(TinterImage))),
            ),
            (
                NodeKey::TinterTile,
                constructor(|_| Node::Tinter(Rc::new(TinterTile))),
            ),
            (
                NodeKey::SubmitterQuad,
                constructor(|_| Node::Submitter(Rc::new(SubmitterQuad))),
            ),
            (
                NodeKey::SubmitterImageGpuLayer,
                constructor(|b| Node::GpuLayer(Rc::new(SubmitterImageGpuLayer::new(b.ids)))),
            ),
            (
                NodeKey::ListCompositor,
                constructor(|_| Node::ListCompositor(Rc::new(ListCompositor))),
            ),
            (
                NodeKey::FillRect,
                constructor(|_| Node::FillRect(Rc::new(FillRect))),
            ),
            (
                NodeKey::FillCamera,
                constructor(|_| Node::FillCamera(Rc::new(FillCamera))),
            ),
            (
                NodeKey::DynamicTextureHandler,
                constructor(|_| Node::DynamicTexture(Rc::new(DynamicTextureHandler))),
            ),
            (
                NodeKey::FilterBlur,
                constructor(|_| Node::Filter(Rc::new(FilterBlur))),
            ),
            (
                NodeKey::FilterParallelFilters,
                constructor(|_| Node::Filter(Rc::new(FilterParallelFilters))),
            ),
            (NodeKey::FilterCopy, shader_filter(|| CopyShader)),
            (
                NodeKey::FilterBlurLow,
                shader_filter(|| BlurPassShader::new(BlurQuality::Low)),
            ),
            (
                NodeKey::FilterBlurMed,
                shader_filter(|| BlurPassShader::new(BlurQuality::Medium)),
            ),
            (
                NodeKey::FilterBlurHigh,
                shader_filter(|| BlurPassShader::new(BlurQuality::High)),
            ),
            (NodeKey::FilterColorMatrix, shader_filter(|| ColorMatrixShader)),
            (NodeKey::FilterThreshold, shader_filter(|| ThresholdShader)),
            (NodeKey::FilterGlow, shader_filter(|| GlowShader)),
            (NodeKey::FilterShadow, shader_filter(|| ShadowShader)),
            (NodeKey::FilterDisplacement, shader_filter(|| DisplacementShader)),
            (NodeKey::FilterMask, shader_filter(|| MaskShader)),
            (NodeKey::FilterBlend, shader_filter(|| BlendShader)),
        ];
        for (key, constructor) in builtins {
            self.constructors.insert(key, constructor);
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn ids(&self) -> &ResourceIds {
        &self.ids
    }

    pub fn recorder(&self) -> &DrawRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut DrawRecorder {
        &mut self.recorder
    }

    pub fn pool(&self) -> &DrawingContextPool {
        &self.pool
    }

    // --- registry ---

    pub fn add_node(&mut self, key: NodeKey, node: Node) -> Result<(), RenderNodeError> {
        if self.nodes.contains_key(&key) {
            return Err(RenderNodeError::DuplicateNode(key));
        }
        debug!("Registered render node {} ({})", key, node.role());
        self.nodes.insert(key, node);
        Ok(())
    }

    pub fn add_node_constructor(
        &mut self,
        key: NodeKey,
        constructor: impl Fn(&NodeBuildContext) -> Node + 'static,
    ) -> Result<(), RenderNodeError> {
        if self.constructors.contains_key(&key) {
            return Err(RenderNodeError::DuplicateConstructor(key));
        }
        debug!("Registered constructor for render node {}", key);
        self.constructors.insert(key, Box::new(constructor));
        Ok(())
    }

    /// Whether `key` names a node. With `constructed_only` a registered but
    /// not yet built constructor does not count.
    pub fn has_node(&self, key: &NodeKey, constructed_only: bool) -> bool {
        self.nodes.contains_key(key) || (!constructed_only && self.constructors.contains_key(key))
    }

    /// Looks a node up, building it from its constructor on first use.
    pub fn get_node(&mut self, key: &NodeKey) -> Option<&mut Node> {
        if !self.nodes.contains_key(key) {
            let constructor = self.constructors.get(key)?;
            let node = constructor(&NodeBuildContext {
                settings: &self.settings,
                ids: &self.ids,
            });
            debug!("Constructed render node {} ({})", key, node.role());
            self.nodes.insert(key.clone(), node);
        }
        self.nodes.get_mut(key)
    }

    fn shared<T: ?Sized>(
        &mut self,
        key: &NodeKey,
        expected: &'static str,
        pick: fn(&Node) -> Option<Rc<T>>,
    ) -> Result<Rc<T>, RenderNodeError> {
        let node = self
            .get_node(key)
            .ok_or_else(|| RenderNodeError::MissingNode(key.clone()))?;
        pick(node).ok_or_else(|| RenderNodeError::WrongRole {
            key: key.clone(),
            expected,
        })
    }

    pub fn texturer(&mut self, key: &NodeKey) -> Result<Rc<dyn Texturer>, RenderNodeError> {
        self.shared(key, "texturer", |node| match node {
            Node::Texturer(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn transformer(&mut self, key: &NodeKey) -> Result<Rc<dyn Transformer>, RenderNodeError> {
        self.shared(key, "transformer", |node| match node {
            Node::Transformer(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn tinter(&mut self, key: &NodeKey) -> Result<Rc<dyn Tinter>, RenderNodeError> {
        self.shared(key, "tinter", |node| match node {
            Node::Tinter(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn submitter(&mut self, key: &NodeKey) -> Result<Rc<dyn Submitter>, RenderNodeError> {
        self.shared(key, "submitter", |node| match node {
            Node::Submitter(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn gpu_layer_submitter(
        &mut self,
        key: &NodeKey,
    ) -> Result<Rc<SubmitterImageGpuLayer>, RenderNodeError> {
        self.shared(key, "gpu layer submitter", |node| match node {
            Node::GpuLayer(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn filter(&mut self, key: &NodeKey) -> Result<Rc<dyn Filter>, RenderNodeError> {
        self.shared(key, "filter", |node| match node {
            Node::Filter(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn list_compositor(&mut self, key: &NodeKey) -> Result<Rc<ListCompositor>, RenderNodeError> {
        self.shared(key, "list compositor", |node| match node {
            Node::ListCompositor(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn fill_rect(&mut self, key: &NodeKey) -> Result<Rc<FillRect>, RenderNodeError> {
        self.shared(key, "fill rect", |node| match node {
            Node::FillRect(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn fill_camera(&mut self, key: &NodeKey) -> Result<Rc<FillCamera>, RenderNodeError> {
        self.shared(key, "fill camera", |node| match node {
            Node::FillCamera(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn dynamic_texture(
        &mut self,
        key: &NodeKey,
    ) -> Result<Rc<DynamicTextureHandler>, RenderNodeError> {
        self.shared(key, "dynamic texture handler", |node| match node {
            Node::DynamicTexture(n) => Some(Rc::clone(n)),
            _ => None,
        })
    }

    pub fn batch_handler(
        &mut self,
        key: &NodeKey,
    ) -> Result<&mut (dyn BatchHandler + 'static), RenderNodeError> {
        match self.get_node(key) {
            Some(Node::Batch(handler)) => Ok(handler.as_mut()),
            Some(_) => Err(RenderNodeError::WrongRole {
                key: key.clone(),
                expected: "batch handler",
            }),
            None => Err(RenderNodeError::MissingNode(key.clone())),
        }
    }

    // --- batching ---

    pub fn default_batch_handler(&self) -> &NodeKey {
        &self.default_batch_handler
    }

    pub fn set_default_batch_handler(&mut self, key: NodeKey) {
        self.default_batch_handler = key;
    }

    pub fn current_batch_node(&self) -> Option<&NodeKey> {
        self.current_batch.as_ref().map(|(key, _)| key)
    }

    /// Makes `next` the current batch. Switching to a different handler or
    /// a context with different state runs the previous handler first.
    pub fn set_current_batch_node(&mut self, next: Option<(&NodeKey, &DrawingContext)>) {
        let unchanged = match (&self.current_batch, next) {
            (Some((key, ctx)), Some((next_key, next_ctx))) => {
                key == next_key && ctx.same_state(next_ctx)
            }
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some((key, ctx)) = self.current_batch.take() {
            if let Some(Node::Batch(handler)) = self.nodes.get_mut(&key) {
                handler.run(&ctx, &mut self.recorder);
            }
        }
        self.current_batch = next.map(|(key, ctx)| (key.clone(), ctx.clone()));
    }

    /// Flushes the current batch, if any.
    pub fn finish_batch(&mut self) {
        self.set_current_batch_node(None);
    }

    /// Called before drawing outside the batch system.
    pub fn start_stand_alone_render(&mut self) {
        self.finish_batch();
    }

    /// Adds a primitive to the handler named `key`, making it current.
    pub fn batch(
        &mut self,
        key: &NodeKey,
        ctx: &DrawingContext,
        primitive: BatchPrimitive<'_>,
    ) -> Result<(), RenderNodeError> {
        self.batch_handler(key)?;
        self.set_current_batch_node(Some((key, ctx)));
        match self.nodes.get_mut(key) {
            Some(Node::Batch(handler)) => handler.batch(ctx, primitive, &mut self.recorder),
            _ => Err(RenderNodeError::MissingNode(key.clone())),
        }
    }

    /// Changes how many textures a draw may bind, flushing first.
    pub fn update_texture_count(&mut self, max_textures: usize) {
        self.finish_batch();
        let max_textures = max_textures.max(1);
        self.settings.max_textures = max_textures;
        for node in self.nodes.values_mut() {
            if let Node::Batch(handler) = node {
                handler.set_max_textures(max_textures);
            }
        }
        info!("Batch handlers now bind up to {} textures", max_textures);
    }

    /// Batch handler for `object`: its override, else its default if
    /// registered, else the manager's default.
    pub fn resolve_batch_handler(&self, object: &dyn GameObject) -> NodeKey {
        if let Some(key) = object.node_overrides().and_then(|o| o.batch_handler.clone()) {
            return key;
        }
        let key = object.default_nodes().batch_handler;
        if self.has_node(&key, false) {
            key
        } else {
            self.default_batch_handler.clone()
        }
    }

    /// Runs the object's submitter with its resolved computation nodes.
    pub fn submit(
        &mut self,
        ctx: &DrawingContext,
        object: &dyn GameObject,
        parent: Option<&Affine2>,
    ) -> Result<(), RenderNodeError> {
        if !object.visible() {
            return Ok(());
        }
        let defaults = object.default_nodes();
        let overrides = object.node_overrides().cloned().unwrap_or_default();

        let submitter = self.submitter(&overrides.submitter.unwrap_or(defaults.submitter))?;
        let nodes = SubmitNodes {
            texturer: self.texturer(&overrides.texturer.unwrap_or(defaults.texturer))?,
            transformer: self
                .transformer(&overrides.transformer.unwrap_or(defaults.transformer))?,
            tinter: self.tinter(&overrides.tinter.unwrap_or(defaults.tinter))?,
        };
        submitter.run(self, ctx, object, parent, &nodes)
    }

    /// Draws a GPU layer with the built-in layer submitter. Any open batch is
    /// flushed first.
    pub fn submit_gpu_layer(
        &mut self,
        ctx: &DrawingContext,
        layer: &mut ImageGpuLayer,
    ) -> Result<(), RenderNodeError> {
        let submitter = self.gpu_layer_submitter(&NodeKey::SubmitterImageGpuLayer)?;
        submitter.run(self, ctx, layer)
    }

    // --- contexts ---

    /// A context for the presentation surface at the configured resolution.
    pub fn canvas_context(&self) -> DrawingContext {
        let mut ctx = DrawingContext::canvas(
            self.settings.resolution.width,
            self.settings.resolution.height,
        );
        let [r, g, b, a] = self.settings.clear_color;
        ctx.set_clear_color(r, g, b, a);
        let mut camera = ctx.camera().clone();
        camera.round_pixels = self.settings.round_pixels;
        ctx.set_camera(camera);
        ctx
    }

    /// A context over a pooled target of exactly `width` x `height`.
    pub fn allocate_context(&mut self, width: u32, height: u32) -> DrawingContext {
        let target = self.pool.acquire(width, height, &self.ids, &mut self.recorder);
        DrawingContext::for_target(target)
    }

    /// Starts drawing into `ctx`, clearing it if it auto-clears color.
    pub fn use_context(&mut self, ctx: &DrawingContext) {
        self.finish_batch();
        ctx.set_in_use(true);
        if ctx.auto_clear().contains(AutoClear::COLOR) {
            self.clear_context(ctx);
        }
    }

    pub fn clear_context(&mut self, ctx: &DrawingContext) {
        self.recorder.push(GpuCommand::Clear {
            target: ctx.target(),
            color: ctx.clear_color(),
            scissor: ctx.scissor(),
        });
    }

    /// Ends this lease on `ctx`. Pending draws are flushed first so nothing
    /// still batched refers to a target that may be reused.
    pub fn release_context(&mut self, ctx: DrawingContext) {
        self.finish_batch();
        ctx.set_in_use(false);
    }

    /// Allocates an id for a texture the executor will be given pixels for.
    pub fn register_texture(&mut self, width: u32, height: u32, resolution: f32) -> Texture {
        Texture {
            id: self.ids.texture(),
            width,
            height,
            resolution,
        }
    }

    /// Flushes, ages the context pool and hands over the frame's commands.
    pub fn end_frame(&mut self) -> Vec<GpuCommand> {
        self.finish_batch();
        self.pool.end_frame(&mut self.recorder);
        let stats = self.recorder.stats();
        debug!(
            "Frame recorded {} draws, {} uploads ({} bytes), {} clears",
            stats.draw_calls, stats.vertex_uploads, stats.uploaded_bytes, stats.clears
        );
        self.recorder.take_commands()
    }

    pub fn take_trace(&mut self) -> Vec<TraceEntry> {
        self.recorder.take_trace()
    }
}

fn constructor(build: impl Fn(&NodeBuildContext) -> Node + 'static) -> NodeConstructor {
    Box::new(build)
}

fn shader_filter<S, F>(make: F) -> NodeConstructor
where
    S: FilterShader + 'static,
    F: Fn() -> S + 'static,
{
    constructor(move |b| Node::Filter(Rc::new(ShaderFilter::new(make(), b.ids))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::batch::QuadInstance;
    use crate::renderer::commands::TextureId;

    fn manager() -> RenderNodeManager {
        RenderNodeManager::new(RenderSettings::default())
    }

    #[test]
    fn nodes_are_built_lazily() {
        let mut manager = manager();
        assert!(manager.has_node(&NodeKey::BatchHandlerQuad, false));
        assert!(!manager.has_node(&NodeKey::BatchHandlerQuad, true));
        assert!(manager.get_node(&NodeKey::BatchHandlerQuad).is_some());
        assert!(manager.has_node(&NodeKey::BatchHandlerQuad, true));
    }

    #[test]
    fn role_mismatch_is_an_error() {
        let mut manager = manager();
        let err = manager.texturer(&NodeKey::TinterImage).err();
        assert!(matches!(err, Some(RenderNodeError::WrongRole { .. })));
        let err = manager.batch(
            &NodeKey::TinterImage,
            &DrawingContext::canvas(8, 8),
            BatchPrimitive::Quad(&QuadInstance::rect(TextureId(1), 0.0, 0.0, 1.0, 1.0)),
        );
        assert!(err.is_err());
        assert_eq!(manager.current_batch_node(), None);
    }

    #[test]
    fn switching_handlers_flushes_the_previous_one() {
        let mut manager = manager();
        let ctx = DrawingContext::canvas(64, 64);
        let quad = QuadInstance::rect(TextureId(1), 0.0, 0.0, 8.0, 8.0);

        manager
            .batch(&NodeKey::BatchHandlerQuad, &ctx, BatchPrimitive::Quad(&quad))
            .expect("batch quad");
        assert_eq!(manager.recorder().stats().draw_calls, 0);

        manager
            .batch(&NodeKey::BatchHandlerTileSprite, &ctx, BatchPrimitive::Quad(&quad))
            .expect("batch tile");
        assert_eq!(manager.recorder().stats().draw_calls, 1);
        assert_eq!(
            manager.current_batch_node(),
            Some(&NodeKey::BatchHandlerTileSprite)
        );
    }

    #[test]
    fn use_context_clears_pooled_targets() {
        let mut manager = manager();
        let ctx = manager.allocate_context(32, 16);
        manager.use_context(&ctx);
        assert!(ctx.is_in_use());
        assert!(matches!(
            manager.recorder().commands().last(),
            Some(GpuCommand::Clear { .. })
        ));
        manager.release_context(ctx);
        assert_eq!(manager.pool().in_use(), 0);
    }
}
