pub mod batch;
pub mod blend;
pub mod commands;
pub mod compositor;
pub mod context;
pub mod dynamic_texture;
pub mod filters;
pub mod gpu;
pub mod gpu_layer;
pub mod manager;
pub mod node;
pub mod submitter;
pub mod texturer;
pub mod tinter;
pub mod transformer;
pub mod vertex_layout;

pub use batch::{
    BatchHandler, BatchHandlerQuad, BatchHandlerQuadLight, BatchHandlerTileSprite,
    BatchHandlerTriFlat, BatchPrimitive, FlatTriangles, QuadInstance, RenderOptions,
};
pub use blend::BlendMode;
pub use commands::{
    BufferId, DrawCall, DrawRecorder, FrameStats, GpuCommand, ProgramKey, ResourceIds,
    ScissorBox, TargetId, TextureId, TraceEntry, UniformValue,
};
pub use compositor::{FillCamera, FillRect, ListCompositor, Rect};
pub use context::{AutoClear, DrawingContext, DrawingContextPool, RenderTarget};
pub use dynamic_texture::{DynamicTextureCommand, DynamicTextureHandler, StampOptions};
pub use filters::{BlurQuality, Filter, FilterController, FilterList, Padding};
pub use gpu::{ExecutorError, WgpuExecutor};
pub use gpu_layer::SubmitterImageGpuLayer;
pub use manager::RenderNodeManager;
pub use node::{Node, NodeKey, RenderNode, RenderNodeError};
pub use submitter::{SubmitNodes, Submitter, SubmitterQuad};
pub use texturer::{Texturer, TexturerOutput};
pub use tinter::{pack_tint, Tinter, TinterOutput};
pub use transformer::{Transformer, TransformerOutput, VertexRoundMode};
pub use vertex_layout::{
    AttributeDescriptor, AttributeType, BufferUsage, LayoutError, VertexBuffer,
    VertexBufferLayout,
};
