//! The render resource bridge: adapts producer-described buffer layouts to
//! native GPU buffers and copies per-frame attribute data into them.

pub mod buffers;
pub mod desc;
pub mod format;
pub mod manager;
pub mod resource;

pub use buffers::{
    BoneBuffer, IndexBuffer, InstanceBuffer, InstanceWriteData, SemanticSource, SpriteBuffer,
    SpriteWriteData, SurfaceBuffer, VertexBuffer, VertexWriteData, WriteError,
};
pub use desc::{
    BoneBufferDesc, BufferUsageHint, CullMode, IndexBufferDesc, InstanceBufferDesc, PrimitiveKind,
    SpriteBufferDesc, SurfaceBufferDesc, VertexBufferDesc,
};
pub use format::{DataFormat, InstanceSemantic, Interleaving, SpriteSemantic, VertexSemantic};
pub use manager::{BufferCounts, RenderResourceManager};
pub use resource::{BufferRange, MaterialId, RenderResource, RenderResourceDesc};
