// renderer/node.rs
use super::batch::BatchHandler;
use super::commands::ResourceIds;
use super::compositor::{FillCamera, FillRect, ListCompositor};
use super::dynamic_texture::DynamicTextureHandler;
use super::filters::Filter;
use super::gpu_layer::SubmitterImageGpuLayer;
use super::submitter::Submitter;
use super::texturer::Texturer;
use super::tinter::Tinter;
use super::transformer::Transformer;
use super::vertex_layout::LayoutError;
use crate::settings::RenderSettings;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderNodeError {
    #[error("render node `{0}` is already registered")]
    DuplicateNode(NodeKey),
    #[error("a constructor for render node `{0}` is already registered")]
    DuplicateConstructor(NodeKey),
    #[error("no render node or constructor named `{0}`")]
    MissingNode(NodeKey),
    #[error("render node `{key}` is not a {expected}")]
    WrongRole { key: NodeKey, expected: &'static str },
    #[error("batch handler `{key}` cannot batch {primitive}")]
    UnsupportedPrimitive {
        key: Cow<'static, str>,
        primitive: &'static str,
    },
    #[error("render node `{node}` expects a {expected} controller")]
    WrongController {
        node: Cow<'static, str>,
        expected: &'static str,
    },
    #[error("triangle index {index} is out of range for {vertices} vertices")]
    IndexOutOfRange { index: u16, vertices: usize },
    #[error("filter input must be a texture-backed context")]
    CanvasInput,
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Names of the built-in render nodes, plus `Custom` for nodes registered
/// at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    BatchHandlerQuad,
    BatchHandlerQuadLight,
    BatchHandlerTileSprite,
    BatchHandlerTriFlat,
    TexturerImage,
    TexturerTileSprite,
    TransformerImage,
    TransformerTile,
    TransformerTileSprite,
    TinterImage,
    TinterTile,
    SubmitterQuad,
    SubmitterImageGpuLayer,
    ListCompositor,
    FillRect,
    FillCamera,
    DynamicTextureHandler,
    FilterBlend,
    FilterBlur,
    FilterBlurLow,
    FilterBlurMed,
    FilterBlurHigh,
    FilterColorMatrix,
    FilterCopy,
    FilterDisplacement,
    FilterGlow,
    FilterMask,
    FilterParallelFilters,
    FilterShadow,
    FilterThreshold,
    Custom(Cow<'static, str>),
}

impl NodeKey {
    pub fn custom(name: impl Into<Cow<'static, str>>) -> Self {
        NodeKey::Custom(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            NodeKey::BatchHandlerQuad => "BatchHandlerQuad",
            NodeKey::BatchHandlerQuadLight => "BatchHandlerQuadLight",
            NodeKey::BatchHandlerTileSprite => "BatchHandlerTileSprite",
            NodeKey::BatchHandlerTriFlat => "BatchHandlerTriFlat",
            NodeKey::TexturerImage => "TexturerImage",
            NodeKey::TexturerTileSprite => "TexturerTileSprite",
            NodeKey::TransformerImage => "TransformerImage",
            NodeKey::TransformerTile => "TransformerTile",
            NodeKey::TransformerTileSprite => "TransformerTileSprite",
            NodeKey::TinterImage => "TinterImage",
            NodeKey::TinterTile => "TinterTile",
            NodeKey::SubmitterQuad => "SubmitterQuad",
            NodeKey::SubmitterImageGpuLayer => "SubmitterImageGpuLayer",
            NodeKey::ListCompositor => "ListCompositor",
            NodeKey::FillRect => "FillRect",
            NodeKey::FillCamera => "FillCamera",
            NodeKey::DynamicTextureHandler => "DynamicTextureHandler",
            NodeKey::FilterBlend => "FilterBlend",
            NodeKey::FilterBlur => "FilterBlur",
            NodeKey::FilterBlurLow => "FilterBlurLow",
            NodeKey::FilterBlurMed => "FilterBlurMed",
            NodeKey::FilterBlurHigh => "FilterBlurHigh",
            NodeKey::FilterColorMatrix => "FilterColorMatrix",
            NodeKey::FilterCopy => "FilterCopy",
            NodeKey::FilterDisplacement => "FilterDisplacement",
            NodeKey::FilterGlow => "FilterGlow",
            NodeKey::FilterMask => "FilterMask",
            NodeKey::FilterParallelFilters => "FilterParallelFilters",
            NodeKey::FilterShadow => "FilterShadow",
            NodeKey::FilterThreshold => "FilterThreshold",
            NodeKey::Custom(name) => name,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Behavior shared by every render node.
pub trait RenderNode {
    fn name(&self) -> &str;
}

/// A registered render node, tagged by role.
///
/// Batch handlers are owned by the manager because they hold the frame's
/// accumulating vertex data. Every other role is stateless between calls
/// and shared, so it can be taken out of the registry while the manager is
/// borrowed mutably.
pub enum Node {
    Batch(Box<dyn BatchHandler>),
    Texturer(Rc<dyn Texturer>),
    Transformer(Rc<dyn Transformer>),
    Tinter(Rc<dyn Tinter>),
    Submitter(Rc<dyn Submitter>),
    GpuLayer(Rc<SubmitterImageGpuLayer>),
    Filter(Rc<dyn Filter>),
    ListCompositor(Rc<ListCompositor>),
    FillRect(Rc<FillRect>),
    FillCamera(Rc<FillCamera>),
    DynamicTexture(Rc<DynamicTextureHandler>),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Batch(node) => node.name(),
            Node::Texturer(node) => node.name(),
            Node::Transformer(node) => node.name(),
            Node::Tinter(node) => node.name(),
            Node::Submitter(node) => node.name(),
            Node::GpuLayer(node) => node.name(),
            Node::Filter(node) => node.name(),
            Node::ListCompositor(node) => node.name(),
            Node::FillRect(node) => node.name(),
            Node::FillCamera(node) => node.name(),
            Node::DynamicTexture(node) => node.name(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Node::Batch(_) => "batch handler",
            Node::Texturer(_) => "texturer",
            Node::Transformer(_) => "transformer",
            Node::Tinter(_) => "tinter",
            Node::Submitter(_) => "submitter",
            Node::GpuLayer(_) => "gpu layer submitter",
            Node::Filter(_) => "filter",
            Node::ListCompositor(_) => "list compositor",
            Node::FillRect(_) => "fill rect",
            Node::FillCamera(_) => "fill camera",
            Node::DynamicTexture(_) => "dynamic texture handler",
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({} {})", self.role(), self.name())
    }
}

/// What a constructor gets to build a node with.
pub struct NodeBuildContext<'a> {
    pub settings: &'a RenderSettings,
    pub ids: &'a ResourceIds,
}

pub type NodeConstructor = Box<dyn Fn(&NodeBuildContext) -> Node>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_keys_use_their_name() {
        let key = NodeKey::custom("MyBatcher");
        assert_eq!(key.name(), "MyBatcher");
        assert_eq!(key.to_string(), "MyBatcher");
        assert_ne!(key, NodeKey::BatchHandlerQuad);
    }
}
