//! Element formats and channel semantics understood by the render bridge.
//!
//! A buffer descriptor names, for each semantic the producer may emit, the
//! element format it wants stored. `Unspecified` disables a channel; the
//! remaining channels are packed into one interleaved array in declaration
//! order.

use serde::Deserialize;

/// Element format of a single semantic channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// Channel disabled.
    #[default]
    Unspecified,
    UByte4,
    UShort1,
    UShort2,
    UShort4,
    UInt1,
    UInt2,
    Half2,
    Half4,
    Float1,
    Float2,
    Float3,
    Float4,
    /// Row-major 3x4 transform, used for bone poses.
    Float3x4,
    Float4x4,
}

impl DataFormat {
    /// Byte size of one element in this format.
    pub const fn size(self) -> usize {
        match self {
            DataFormat::Unspecified => 0,
            DataFormat::UByte4 => 4,
            DataFormat::UShort1 => 2,
            DataFormat::UShort2 => 4,
            DataFormat::UShort4 => 8,
            DataFormat::UInt1 => 4,
            DataFormat::UInt2 => 8,
            DataFormat::Half2 => 4,
            DataFormat::Half4 => 8,
            DataFormat::Float1 => 4,
            DataFormat::Float2 => 8,
            DataFormat::Float3 => 12,
            DataFormat::Float4 => 16,
            DataFormat::Float3x4 => 48,
            DataFormat::Float4x4 => 64,
        }
    }

    /// The wgpu vertex attribute format, for formats that can be bound as a
    /// single attribute. Matrix formats and `UShort1` have no equivalent.
    pub fn vertex_format(self) -> Option<wgpu::VertexFormat> {
        match self {
            DataFormat::UByte4 => Some(wgpu::VertexFormat::Uint8x4),
            DataFormat::UShort2 => Some(wgpu::VertexFormat::Uint16x2),
            DataFormat::UShort4 => Some(wgpu::VertexFormat::Uint16x4),
            DataFormat::UInt1 => Some(wgpu::VertexFormat::Uint32),
            DataFormat::UInt2 => Some(wgpu::VertexFormat::Uint32x2),
            DataFormat::Half2 => Some(wgpu::VertexFormat::Float16x2),
            DataFormat::Half4 => Some(wgpu::VertexFormat::Float16x4),
            DataFormat::Float1 => Some(wgpu::VertexFormat::Float32),
            DataFormat::Float2 => Some(wgpu::VertexFormat::Float32x2),
            DataFormat::Float3 => Some(wgpu::VertexFormat::Float32x3),
            DataFormat::Float4 => Some(wgpu::VertexFormat::Float32x4),
            _ => None,
        }
    }
}

/// Semantics a vertex buffer may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum VertexSemantic {
    Position = 0,
    Normal,
    Tangent,
    Binormal,
    Color,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
    BoneIndex,
    BoneWeight,
    DisplacementTexCoord,
    DisplacementFlags,
}

impl VertexSemantic {
    pub const COUNT: usize = 13;

    pub const ALL: [VertexSemantic; Self::COUNT] = [
        VertexSemantic::Position,
        VertexSemantic::Normal,
        VertexSemantic::Tangent,
        VertexSemantic::Binormal,
        VertexSemantic::Color,
        VertexSemantic::TexCoord0,
        VertexSemantic::TexCoord1,
        VertexSemantic::TexCoord2,
        VertexSemantic::TexCoord3,
        VertexSemantic::BoneIndex,
        VertexSemantic::BoneWeight,
        VertexSemantic::DisplacementTexCoord,
        VertexSemantic::DisplacementFlags,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Semantics an instance buffer may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum InstanceSemantic {
    Position = 0,
    RotationScale,
    VelocityLife,
    Density,
    Color,
    UvOffset,
    LocalOffset,
}

impl InstanceSemantic {
    pub const COUNT: usize = 7;

    pub const ALL: [InstanceSemantic; Self::COUNT] = [
        InstanceSemantic::Position,
        InstanceSemantic::RotationScale,
        InstanceSemantic::VelocityLife,
        InstanceSemantic::Density,
        InstanceSemantic::Color,
        InstanceSemantic::UvOffset,
        InstanceSemantic::LocalOffset,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Semantics a sprite buffer may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum SpriteSemantic {
    Position = 0,
    Color,
    Velocity,
    Scale,
    LifeRemain,
    Density,
    Subtexture,
    Orientation,
}

impl SpriteSemantic {
    pub const COUNT: usize = 8;

    pub const ALL: [SpriteSemantic; Self::COUNT] = [
        SpriteSemantic::Position,
        SpriteSemantic::Color,
        SpriteSemantic::Velocity,
        SpriteSemantic::Scale,
        SpriteSemantic::LifeRemain,
        SpriteSemantic::Density,
        SpriteSemantic::Subtexture,
        SpriteSemantic::Orientation,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Byte offsets of the live channels of an interleaved buffer.
///
/// Built from a per-semantic format table; channels requesting
/// `Unspecified` are skipped and get no offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interleaving {
    offsets: Vec<Option<usize>>,
    stride: usize,
}

impl Interleaving {
    pub fn from_formats(formats: &[DataFormat]) -> Self {
        let mut offsets = Vec::with_capacity(formats.len());
        let mut stride = 0;
        for format in formats {
            if *format == DataFormat::Unspecified {
                offsets.push(None);
            } else {
                offsets.push(Some(stride));
                stride += format.size();
            }
        }
        Interleaving { offsets, stride }
    }

    /// Byte size of one interleaved element.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Byte offset of a channel within one element, if the channel is live.
    pub fn offset(&self, channel: usize) -> Option<usize> {
        self.offsets.get(channel).copied().flatten()
    }

    /// True if no channel is live.
    pub fn is_empty(&self) -> bool {
        self.stride == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_sizes() {
        assert_eq!(DataFormat::Unspecified.size(), 0);
        assert_eq!(DataFormat::Float3.size(), 12);
        assert_eq!(DataFormat::Float2.size(), 8);
        assert_eq!(DataFormat::UByte4.size(), 4);
        assert_eq!(DataFormat::Float3x4.size(), 48);
    }

    #[test]
    fn semantic_indices_match_declaration_order() {
        for (i, semantic) in VertexSemantic::ALL.iter().enumerate() {
            assert_eq!(semantic.index(), i);
        }
        for (i, semantic) in SpriteSemantic::ALL.iter().enumerate() {
            assert_eq!(semantic.index(), i);
        }
    }

    #[test]
    fn interleaving_packs_live_channels_in_order() {
        let mut formats = [DataFormat::Unspecified; VertexSemantic::COUNT];
        formats[VertexSemantic::Position.index()] = DataFormat::Float3;
        formats[VertexSemantic::Color.index()] = DataFormat::UByte4;
        formats[VertexSemantic::TexCoord0.index()] = DataFormat::Float2;

        let layout = Interleaving::from_formats(&formats);
        assert_eq!(layout.stride(), 12 + 4 + 8);
        assert_eq!(layout.offset(VertexSemantic::Position.index()), Some(0));
        assert_eq!(layout.offset(VertexSemantic::Color.index()), Some(12));
        assert_eq!(layout.offset(VertexSemantic::TexCoord0.index()), Some(16));
        assert_eq!(layout.offset(VertexSemantic::Normal.index()), None);
    }

    #[test]
    fn interleaving_with_no_live_channels_is_empty() {
        let formats = [DataFormat::Unspecified; VertexSemantic::COUNT];
        let layout = Interleaving::from_formats(&formats);
        assert!(layout.is_empty());
        assert_eq!(layout.stride(), 0);
    }
}
