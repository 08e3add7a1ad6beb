// renderer/vertex_layout.rs
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("vertex storage holds {actual} bytes but {required} are required")]
    BufferTooSmall { required: usize, actual: usize },
    #[error("attribute `{name}` has no vertex format ({size} x {ty:?}, normalized: {normalized})")]
    UnsupportedFormat {
        name: String,
        size: u32,
        ty: AttributeType,
        normalized: bool,
    },
    #[error("layouts over shared storage need equal strides ({expected} != {actual})")]
    StrideMismatch { expected: u32, actual: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Float32,
    Uint32,
    Int32,
    Uint16,
    Int16,
    Uint8,
    Int8,
}

impl AttributeType {
    pub const fn byte_size(self) -> u32 {
        match self {
            Self::Float32 | Self::Uint32 | Self::Int32 => 4,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint8 | Self::Int8 => 1,
        }
    }
}

/// How often the buffer contents are expected to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    Static,
    #[default]
    Dynamic,
    Stream,
}

/// An attribute as declared by a node, before offsets are known.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: Cow<'static, str>,
    pub size: u32,
    pub ty: AttributeType,
    pub normalized: bool,
    pub columns: u32,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<Cow<'static, str>>, size: u32, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            size,
            ty,
            normalized: false,
            columns: 1,
        }
    }

    pub fn float(name: impl Into<Cow<'static, str>>, size: u32) -> Self {
        Self::new(name, size, AttributeType::Float32)
    }

    pub fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }

    /// Matrix attributes occupy one shader location per column.
    pub fn with_columns(mut self, columns: u32) -> Self {
        self.columns = columns.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    pub name: Cow<'static, str>,
    pub size: u32,
    pub ty: AttributeType,
    pub normalized: bool,
    pub columns: u32,
    pub offset: u32,
    pub bytes: u32,
    pub location: u32,
}

/// A completed attribute layout. Attribute order is memory order and
/// shader-location order.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBufferLayout {
    pub usage: BufferUsage,
    attributes: Vec<VertexAttribute>,
    stride: u32,
}

impl VertexBufferLayout {
    /// Folds the declared attributes in order, assigning offsets, byte sizes
    /// and shader locations.
    pub fn complete(usage: BufferUsage, declared: &[AttributeDescriptor]) -> Self {
        let mut offset = 0;
        let mut location = 0;
        let attributes = declared
            .iter()
            .map(|desc| {
                let bytes = desc.size * desc.ty.byte_size() * desc.columns;
                let attribute = VertexAttribute {
                    name: desc.name.clone(),
                    size: desc.size,
                    ty: desc.ty,
                    normalized: desc.normalized,
                    columns: desc.columns,
                    offset,
                    bytes,
                    location,
                };
                offset += bytes;
                location += desc.columns;
                attribute
            })
            .collect();

        Self {
            usage,
            attributes,
            stride: offset,
        }
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Shader locations the layout occupies.
    pub fn location_count(&self) -> u32 {
        self.attributes
            .last()
            .map_or(0, |attr| attr.location + attr.columns)
    }

    /// Converts the layout into wgpu attributes, one per column.
    pub fn wgpu_attributes(&self) -> Result<Vec<wgpu::VertexAttribute>, LayoutError> {
        self.wgpu_attributes_from(0)
    }

    /// Like [`wgpu_attributes`](Self::wgpu_attributes), with shader locations
    /// starting at `first_location`. Used for a second buffer slot.
    pub fn wgpu_attributes_from(
        &self,
        first_location: u32,
    ) -> Result<Vec<wgpu::VertexAttribute>, LayoutError> {
        let mut out = Vec::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            let format = vertex_format(attr)?;
            let column_bytes = attr.bytes / attr.columns;
            for column in 0..attr.columns {
                out.push(wgpu::VertexAttribute {
                    format,
                    offset: (attr.offset + column * column_bytes) as wgpu::BufferAddress,
                    shader_location: first_location + attr.location + column,
                });
            }
        }
        Ok(out)
    }
}

fn vertex_format(attr: &VertexAttribute) -> Result<wgpu::VertexFormat, LayoutError> {
    use wgpu::VertexFormat as F;
    use AttributeType as T;

    let format = match (attr.ty, attr.size, attr.normalized) {
        (T::Float32, 1, _) => Some(F::Float32),
        (T::Float32, 2, _) => Some(F::Float32x2),
        (T::Float32, 3, _) => Some(F::Float32x3),
        (T::Float32, 4, _) => Some(F::Float32x4),
        (T::Uint32, 1, false) => Some(F::Uint32),
        (T::Uint32, 2, false) => Some(F::Uint32x2),
        (T::Uint32, 3, false) => Some(F::Uint32x3),
        (T::Uint32, 4, false) => Some(F::Uint32x4),
        (T::Int32, 1, false) => Some(F::Sint32),
        (T::Int32, 2, false) => Some(F::Sint32x2),
        (T::Int32, 3, false) => Some(F::Sint32x3),
        (T::Int32, 4, false) => Some(F::Sint32x4),
        (T::Uint16, 2, false) => Some(F::Uint16x2),
        (T::Uint16, 4, false) => Some(F::Uint16x4),
        (T::Uint16, 2, true) => Some(F::Unorm16x2),
        (T::Uint16, 4, true) => Some(F::Unorm16x4),
        (T::Int16, 2, false) => Some(F::Sint16x2),
        (T::Int16, 4, false) => Some(F::Sint16x4),
        (T::Int16, 2, true) => Some(F::Snorm16x2),
        (T::Int16, 4, true) => Some(F::Snorm16x4),
        (T::Uint8, 2, false) => Some(F::Uint8x2),
        (T::Uint8, 4, false) => Some(F::Uint8x4),
        (T::Uint8, 2, true) => Some(F::Unorm8x2),
        (T::Uint8, 4, true) => Some(F::Unorm8x4),
        (T::Int8, 2, false) => Some(F::Sint8x2),
        (T::Int8, 4, false) => Some(F::Sint8x4),
        (T::Int8, 2, true) => Some(F::Snorm8x2),
        (T::Int8, 4, true) => Some(F::Snorm8x4),
        _ => None,
    };

    format.ok_or_else(|| LayoutError::UnsupportedFormat {
        name: attr.name.to_string(),
        size: attr.size,
        ty: attr.ty,
        normalized: attr.normalized,
    })
}

/// CPU-side vertex storage for a completed layout.
///
/// The backing store is word-aligned so it can be viewed as `f32`, `u32`
/// or bytes without copying.
#[derive(Debug, Clone)]
pub struct VertexBuffer {
    layout: VertexBufferLayout,
    count: usize,
    storage: Vec<u32>,
}

impl VertexBuffer {
    pub fn new(layout: VertexBufferLayout, count: usize) -> Self {
        let words = words_for(layout.stride() as usize * count);
        Self {
            layout,
            count,
            storage: vec![0; words],
        }
    }

    /// Wraps caller-provided storage. The storage must hold `stride * count`
    /// bytes.
    pub fn from_storage(
        layout: VertexBufferLayout,
        count: usize,
        storage: Vec<u32>,
    ) -> Result<Self, LayoutError> {
        let required = layout.stride() as usize * count;
        let actual = storage.len() * 4;
        if actual < required {
            return Err(LayoutError::BufferTooSmall { required, actual });
        }
        Ok(Self {
            layout,
            count,
            storage,
        })
    }

    /// Hands the same storage to `layout`, which must describe elements of
    /// the same size.
    pub fn relayout(self, layout: VertexBufferLayout) -> Result<Self, LayoutError> {
        if layout.stride() != self.layout.stride() {
            return Err(LayoutError::StrideMismatch {
                expected: self.layout.stride(),
                actual: layout.stride(),
            });
        }
        Self::from_storage(layout, self.count, self.storage)
    }

    pub fn into_storage(self) -> Vec<u32> {
        self.storage
    }

    pub fn layout(&self) -> &VertexBufferLayout {
        &self.layout
    }

    /// Number of vertices the buffer can hold.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn stride(&self) -> usize {
        self.layout.stride() as usize
    }

    /// Reallocates for a new vertex count. Contents are discarded; the stride
    /// is unchanged.
    pub fn resize(&mut self, count: usize) {
        self.count = count;
        self.storage = vec![0; words_for(self.stride() * count)];
    }

    pub fn as_f32(&self) -> &[f32] {
        bytemuck::cast_slice(&self.storage)
    }

    pub fn as_u32(&self) -> &[u32] {
        &self.storage
    }

    pub fn as_f32_mut(&mut self) -> &mut [f32] {
        bytemuck::cast_slice_mut(&mut self.storage)
    }

    pub fn as_u32_mut(&mut self) -> &mut [u32] {
        &mut self.storage
    }

    /// Byte view over the whole backing store, including any padding past
    /// the last vertex.
    pub fn as_u8_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.storage)
    }

    pub fn bytes(&self) -> &[u8] {
        let len = self.stride() * self.count;
        &bytemuck::cast_slice(&self.storage)[..len]
    }

    /// The bytes of the first `vertices` vertices.
    pub fn populated_bytes(&self, vertices: usize) -> &[u8] {
        let len = self.stride() * vertices.min(self.count);
        &bytemuck::cast_slice(&self.storage)[..len]
    }

    /// Returns a sequential writer positioned at `vertex`.
    pub fn writer_at(&mut self, vertex: usize) -> VertexWriter<'_> {
        debug_assert!(self.stride() % 4 == 0, "writer needs a word-aligned stride");
        let cursor = vertex * self.stride() / 4;
        VertexWriter {
            words: &mut self.storage,
            cursor,
        }
    }
}

fn words_for(bytes: usize) -> usize {
    bytes.div_ceil(4)
}

/// Writes consecutive 32-bit components into a vertex buffer.
pub struct VertexWriter<'a> {
    words: &'a mut [u32],
    cursor: usize,
}

impl VertexWriter<'_> {
    #[inline]
    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.words[self.cursor] = value.to_bits();
        self.cursor += 1;
        self
    }

    #[inline]
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.words[self.cursor] = value;
        self.cursor += 1;
        self
    }

    #[inline]
    pub fn vec2(&mut self, value: glam::Vec2) -> &mut Self {
        self.f32(value.x).f32(value.y)
    }

    pub fn position(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_attributes() -> Vec<AttributeDescriptor> {
        vec![
            AttributeDescriptor::float("inPosition", 2),
            AttributeDescriptor::float("inTexCoord", 2),
            AttributeDescriptor::float("inTexId", 1),
            AttributeDescriptor::float("inTintEffect", 1),
            AttributeDescriptor::new("inTint", 4, AttributeType::Uint8).normalized(),
        ]
    }

    #[test]
    fn offsets_fold_in_declaration_order() {
        let layout = VertexBufferLayout::complete(BufferUsage::Dynamic, &quad_attributes());

        let offsets: Vec<u32> = layout.attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 20, 24]);
        assert_eq!(layout.stride(), 28);
        assert_eq!(layout.attribute("inTint").map(|a| a.bytes), Some(4));
    }

    #[test]
    fn reordering_moves_offsets_but_keeps_stride() {
        let forward = VertexBufferLayout::complete(BufferUsage::Dynamic, &quad_attributes());
        let mut reversed_attributes = quad_attributes();
        reversed_attributes.reverse();
        let reversed = VertexBufferLayout::complete(BufferUsage::Dynamic, &reversed_attributes);

        assert_eq!(forward.stride(), reversed.stride());
        assert_eq!(reversed.stride(), 28);
        let offsets = |layout: &VertexBufferLayout| -> Vec<Option<u32>> {
            quad_attributes()
                .iter()
                .map(|desc| layout.attribute(&desc.name).map(|a| a.offset))
                .collect()
        };
        assert_eq!(
            offsets(&forward),
            vec![Some(0), Some(8), Some(16), Some(20), Some(24)]
        );
        assert_eq!(
            offsets(&reversed),
            vec![Some(20), Some(12), Some(8), Some(4), Some(0)]
        );
    }

    #[test]
    fn completion_is_deterministic() {
        let a = VertexBufferLayout::complete(BufferUsage::Static, &quad_attributes());
        let b = VertexBufferLayout::complete(BufferUsage::Static, &quad_attributes());
        assert_eq!(a, b);
    }

    #[test]
    fn matrix_columns_take_consecutive_locations() {
        let layout = VertexBufferLayout::complete(
            BufferUsage::Dynamic,
            &[
                AttributeDescriptor::float("inMatrix", 3).with_columns(3),
                AttributeDescriptor::float("inColor", 4),
            ],
        );

        let attrs = layout.wgpu_attributes().expect("formats");
        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs[2].offset, 24);
        assert_eq!(attrs[3].shader_location, 3);
        assert_eq!(layout.stride(), 52);
    }

    #[test]
    fn normalized_u32_has_no_format() {
        let layout = VertexBufferLayout::complete(
            BufferUsage::Dynamic,
            &[AttributeDescriptor::new("bad", 1, AttributeType::Uint32).normalized()],
        );
        assert!(matches!(
            layout.wgpu_attributes(),
            Err(LayoutError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn from_storage_rejects_short_buffers() {
        let layout = VertexBufferLayout::complete(BufferUsage::Dynamic, &quad_attributes());
        let err = VertexBuffer::from_storage(layout, 4, vec![0; 10]).unwrap_err();
        assert_eq!(
            err,
            LayoutError::BufferTooSmall {
                required: 112,
                actual: 40
            }
        );
    }

    #[test]
    fn resize_keeps_stride() {
        let layout = VertexBufferLayout::complete(BufferUsage::Dynamic, &quad_attributes());
        let mut buffer = VertexBuffer::new(layout, 4);
        buffer.resize(16);
        assert_eq!(buffer.stride(), 28);
        assert_eq!(buffer.bytes().len(), 28 * 16);
    }

    #[test]
    fn writer_fills_words_in_order() {
        let layout = VertexBufferLayout::complete(BufferUsage::Dynamic, &quad_attributes());
        let mut buffer = VertexBuffer::new(layout, 2);
        buffer
            .writer_at(1)
            .f32(1.5)
            .f32(2.5)
            .f32(0.0)
            .f32(1.0)
            .f32(3.0)
            .f32(0.0)
            .u32(0xff00_00ff);

        assert_eq!(buffer.as_f32()[7], 1.5);
        assert_eq!(buffer.as_f32()[11], 3.0);
        assert_eq!(buffer.as_u32()[13], 0xff00_00ff);
        assert_eq!(buffer.populated_bytes(1).len(), 28);
    }

    #[test]
    fn mutable_views_share_words() {
        let layout = VertexBufferLayout::complete(BufferUsage::Dynamic, &quad_attributes());
        let mut buffer = VertexBuffer::new(layout, 1);
        buffer.as_f32_mut()[6] = 1.0;
        assert_eq!(buffer.as_u32()[6], 1.0f32.to_bits());

        // the tint word rewritten byte by byte as packed RGBA
        let tint = layout_offset(&buffer, "inTint");
        buffer.as_u8_mut()[tint..tint + 4].copy_from_slice(&[0x11, 0x22, 0x33, 0xff]);
        assert_eq!(buffer.as_u32()[6], u32::from_le_bytes([0x11, 0x22, 0x33, 0xff]));

        buffer.as_u32_mut()[0] = 2.5f32.to_bits();
        assert_eq!(buffer.as_f32()[0], 2.5);
    }

    fn layout_offset(buffer: &VertexBuffer, name: &str) -> usize {
        buffer
            .layout()
            .attribute(name)
            .map(|a| a.offset as usize)
            .expect("attribute")
    }

    #[test]
    fn relayout_keeps_the_bytes() {
        let packed = VertexBufferLayout::complete(
            BufferUsage::Static,
            &[
                AttributeDescriptor::float("inPosition", 2),
                AttributeDescriptor::new("inColor", 1, AttributeType::Uint32),
            ],
        );
        let split = VertexBufferLayout::complete(
            BufferUsage::Static,
            &[
                AttributeDescriptor::float("inPosition", 2),
                AttributeDescriptor::new("inColor", 4, AttributeType::Uint8).normalized(),
            ],
        );
        let mut buffer = VertexBuffer::new(packed, 2);
        buffer.writer_at(1).f32(3.0).f32(4.0).u32(0x8000_00ff);

        let relaid = buffer.relayout(split).expect("same stride");
        assert_eq!(relaid.count(), 2);
        assert_eq!(relaid.layout().attribute("inColor").map(|a| a.size), Some(4));
        assert_eq!(&relaid.bytes()[20..24], &[0xff, 0x00, 0x00, 0x80]);
        assert_eq!(relaid.as_f32()[3], 3.0);
    }

    #[test]
    fn relayout_rejects_a_different_stride() {
        let layout = VertexBufferLayout::complete(BufferUsage::Dynamic, &quad_attributes());
        let narrow = VertexBufferLayout::complete(
            BufferUsage::Dynamic,
            &[AttributeDescriptor::float("inPosition", 2)],
        );
        let err = VertexBuffer::new(layout, 4).relayout(narrow).unwrap_err();
        assert_eq!(
            err,
            LayoutError::StrideMismatch {
                expected: 28,
                actual: 8
            }
        );
    }

    #[test]
    fn second_slot_locations_are_shifted() {
        let layout = VertexBufferLayout::complete(BufferUsage::Static, &quad_attributes());
        assert_eq!(layout.location_count(), 5);
        let attrs = layout.wgpu_attributes_from(1).expect("formats");
        assert_eq!(attrs[0].shader_location, 1);
        assert_eq!(attrs[4].shader_location, 5);
        assert_eq!(attrs[4].offset, 24);
    }
}
