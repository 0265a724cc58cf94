//! Buffer descriptors consumed by the bridge's create calls.
//!
//! Every create call validates its descriptor *before* any GPU allocation is
//! attempted; an invalid descriptor yields no buffer.

use serde::Deserialize;

use crate::bridge::format::{
    DataFormat, InstanceSemantic, Interleaving, SpriteSemantic, VertexSemantic,
};

/// Expected update frequency of a buffer.
///
/// Static buffers are filled once; dynamic and streaming buffers take a CPU
/// write every frame. Streaming has no distinct allocation mode and is
/// treated identically to dynamic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferUsageHint {
    #[default]
    Static,
    Dynamic,
    Streaming,
}

/// Primitive topology a draw batch is issued with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    #[default]
    TriangleList,
    LineList,
    PointList,
}

/// Triangle culling mode for a draw batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullMode {
    Disabled,
    #[default]
    Clockwise,
    CounterClockwise,
}

/// Describes the semantics and layout of a vertex buffer.
#[derive(Clone, Debug)]
pub struct VertexBufferDesc {
    /// Maximum number of vertices the buffer will store.
    pub max_verts: u32,
    pub hint: BufferUsageHint,
    /// Requested format per semantic; `Unspecified` disables the channel.
    pub formats: [DataFormat; VertexSemantic::COUNT],
}

impl Default for VertexBufferDesc {
    fn default() -> Self {
        Self {
            max_verts: 0,
            hint: BufferUsageHint::Static,
            formats: [DataFormat::Unspecified; VertexSemantic::COUNT],
        }
    }
}

impl VertexBufferDesc {
    /// Request `format` for `semantic`, returning the descriptor for chaining.
    pub fn with(mut self, semantic: VertexSemantic, format: DataFormat) -> Self {
        self.formats[semantic.index()] = format;
        self
    }

    pub fn interleaving(&self) -> Interleaving {
        Interleaving::from_formats(&self.formats)
    }

    /// A vertex buffer needs a nonzero capacity and at least one live channel.
    pub fn is_valid(&self) -> bool {
        self.max_verts > 0 && !self.interleaving().is_empty()
    }
}

/// Describes an index buffer.
#[derive(Clone, Debug)]
pub struct IndexBufferDesc {
    pub max_indices: u32,
    pub format: DataFormat,
    pub hint: BufferUsageHint,
    pub primitive: PrimitiveKind,
}

impl Default for IndexBufferDesc {
    fn default() -> Self {
        Self {
            max_indices: 0,
            format: DataFormat::UInt1,
            hint: BufferUsageHint::Static,
            primitive: PrimitiveKind::TriangleList,
        }
    }
}

impl IndexBufferDesc {
    /// Indices must be 16- or 32-bit unsigned scalars.
    pub fn is_valid(&self) -> bool {
        self.max_indices > 0
            && matches!(self.format, DataFormat::UShort1 | DataFormat::UInt1)
    }
}

/// Describes a surface buffer: a width x height x depth block of elements.
#[derive(Clone, Debug)]
pub struct SurfaceBufferDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: DataFormat,
    pub hint: BufferUsageHint,
}

impl Default for SurfaceBufferDesc {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            depth: 1,
            format: DataFormat::Unspecified,
            hint: BufferUsageHint::Dynamic,
        }
    }
}

impl SurfaceBufferDesc {
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.depth > 0
            && self.format != DataFormat::Unspecified
    }
}

/// Describes a bone buffer holding per-bone pose transforms.
#[derive(Clone, Debug)]
pub struct BoneBufferDesc {
    pub max_bones: u32,
    pub transform_format: DataFormat,
    pub hint: BufferUsageHint,
}

impl Default for BoneBufferDesc {
    fn default() -> Self {
        Self {
            max_bones: 0,
            transform_format: DataFormat::Float3x4,
            hint: BufferUsageHint::Dynamic,
        }
    }
}

impl BoneBufferDesc {
    pub fn is_valid(&self) -> bool {
        self.max_bones > 0
            && matches!(
                self.transform_format,
                DataFormat::Float3x4 | DataFormat::Float4x4
            )
    }
}

/// Describes the semantics and layout of an instance buffer.
#[derive(Clone, Debug)]
pub struct InstanceBufferDesc {
    pub max_instances: u32,
    pub hint: BufferUsageHint,
    pub formats: [DataFormat; InstanceSemantic::COUNT],
}

impl Default for InstanceBufferDesc {
    fn default() -> Self {
        Self {
            max_instances: 0,
            hint: BufferUsageHint::Dynamic,
            formats: [DataFormat::Unspecified; InstanceSemantic::COUNT],
        }
    }
}

impl InstanceBufferDesc {
    pub fn with(mut self, semantic: InstanceSemantic, format: DataFormat) -> Self {
        self.formats[semantic.index()] = format;
        self
    }

    pub fn interleaving(&self) -> Interleaving {
        Interleaving::from_formats(&self.formats)
    }

    pub fn is_valid(&self) -> bool {
        self.max_instances > 0 && !self.interleaving().is_empty()
    }
}

/// Describes the semantics and layout of a sprite buffer.
#[derive(Clone, Debug)]
pub struct SpriteBufferDesc {
    pub max_sprites: u32,
    pub hint: BufferUsageHint,
    pub formats: [DataFormat; SpriteSemantic::COUNT],
}

impl Default for SpriteBufferDesc {
    fn default() -> Self {
        Self {
            max_sprites: 0,
            hint: BufferUsageHint::Dynamic,
            formats: [DataFormat::Unspecified; SpriteSemantic::COUNT],
        }
    }
}

impl SpriteBufferDesc {
    pub fn with(mut self, semantic: SpriteSemantic, format: DataFormat) -> Self {
        self.formats[semantic.index()] = format;
        self
    }

    pub fn interleaving(&self) -> Interleaving {
        Interleaving::from_formats(&self.formats)
    }

    pub fn is_valid(&self) -> bool {
        self.max_sprites > 0 && !self.interleaving().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_desc_stride_sums_live_channels() {
        let desc = VertexBufferDesc::default()
            .with(VertexSemantic::Position, DataFormat::Float3)
            .with(VertexSemantic::TexCoord0, DataFormat::Float2);
        assert_eq!(desc.interleaving().stride(), 20);
    }

    #[test]
    fn vertex_desc_valid_only_with_capacity() {
        let mut desc = VertexBufferDesc::default()
            .with(VertexSemantic::Position, DataFormat::Float3)
            .with(VertexSemantic::TexCoord0, DataFormat::Float2);
        assert!(!desc.is_valid());
        desc.max_verts = 16;
        assert!(desc.is_valid());
    }

    #[test]
    fn vertex_desc_without_semantics_is_invalid() {
        let desc = VertexBufferDesc {
            max_verts: 128,
            ..Default::default()
        };
        assert!(!desc.is_valid());
    }

    #[test]
    fn index_desc_rejects_non_index_formats() {
        let desc = IndexBufferDesc {
            max_indices: 64,
            format: DataFormat::Float3,
            ..Default::default()
        };
        assert!(!desc.is_valid());

        let desc = IndexBufferDesc {
            max_indices: 64,
            format: DataFormat::UShort1,
            ..Default::default()
        };
        assert!(desc.is_valid());
    }

    #[test]
    fn surface_desc_requires_nonzero_extent() {
        let desc = SurfaceBufferDesc {
            width: 8,
            height: 0,
            depth: 1,
            format: DataFormat::Float1,
            hint: BufferUsageHint::Dynamic,
        };
        assert!(!desc.is_valid());
    }

    #[test]
    fn hint_parses_from_config() {
        let hint: BufferUsageHint = serde_json::from_str("\"streaming\"").unwrap();
        assert_eq!(hint, BufferUsageHint::Streaming);
        // An unrecognized hint fails before any buffer is created.
        assert!(serde_json::from_str::<BufferUsageHint>("\"scratch\"").is_err());
    }
}
