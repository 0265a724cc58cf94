//! Composite render resource: one drawable batch over bridge buffers.
//!
//! A resource holds *references* to its member buffers, never ownership:
//! releasing a resource leaves every member buffer alive and independently
//! releasable through its own create/release pair.

use std::sync::Arc;

use crate::bridge::buffers::{BoneBuffer, IndexBuffer, InstanceBuffer, SpriteBuffer, VertexBuffer};
use crate::bridge::desc::{CullMode, PrimitiveKind};

/// Opaque material reference recorded on a resource; the renderer maps it to
/// a pipeline at dispatch time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// Active element range within a bound buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferRange {
    pub first: u32,
    pub count: u32,
}

impl BufferRange {
    pub fn new(first: u32, count: u32) -> Self {
        Self { first, count }
    }
}

/// Everything that makes up one drawable batch.
///
/// Counts in the ranges require the matching buffer to be bound; a resource
/// may interleave several vertex buffers with non-overlapping semantics.
#[derive(Default)]
pub struct RenderResourceDesc {
    pub vertex_buffers: Vec<Arc<VertexBuffer>>,
    pub vertex_range: BufferRange,

    pub index_buffer: Option<Arc<IndexBuffer>>,
    pub index_range: BufferRange,

    pub bone_buffer: Option<Arc<BoneBuffer>>,
    pub bone_range: BufferRange,

    pub instance_buffer: Option<Arc<InstanceBuffer>>,
    pub instance_range: BufferRange,

    pub sprite_buffer: Option<Arc<SpriteBuffer>>,
    pub sprite_range: BufferRange,

    pub material: Option<MaterialId>,
    pub cull_mode: CullMode,
    pub primitive: PrimitiveKind,
}

impl RenderResourceDesc {
    pub fn is_valid(&self) -> bool {
        let mut failed = 0;
        if self.vertex_buffers.len() >= 255 {
            failed += 1;
        }
        if self.index_range.count > 0 && self.index_buffer.is_none() {
            failed += 1;
        }
        if self.bone_range.count > 0 && self.bone_buffer.is_none() {
            failed += 1;
        }
        if self.instance_range.count > 0 && self.instance_buffer.is_none() {
            failed += 1;
        }
        if self.sprite_range.count > 0 && self.sprite_buffer.is_none() {
            failed += 1;
        }
        failed == 0
    }
}

/// A live drawable batch. Ranges and material are metadata consumed at
/// dispatch time; updating them never touches buffer contents.
pub struct RenderResource {
    vertex_buffers: Vec<Arc<VertexBuffer>>,
    vertex_range: BufferRange,

    index_buffer: Option<Arc<IndexBuffer>>,
    index_range: BufferRange,

    bone_buffer: Option<Arc<BoneBuffer>>,
    bone_range: BufferRange,

    instance_buffer: Option<Arc<InstanceBuffer>>,
    instance_range: BufferRange,

    sprite_buffer: Option<Arc<SpriteBuffer>>,
    sprite_range: BufferRange,

    material: Option<MaterialId>,
    cull_mode: CullMode,
    primitive: PrimitiveKind,
}

impl RenderResource {
    pub(crate) fn new(desc: RenderResourceDesc) -> Self {
        Self {
            vertex_buffers: desc.vertex_buffers,
            vertex_range: desc.vertex_range,
            index_buffer: desc.index_buffer,
            index_range: desc.index_range,
            bone_buffer: desc.bone_buffer,
            bone_range: desc.bone_range,
            instance_buffer: desc.instance_buffer,
            instance_range: desc.instance_range,
            sprite_buffer: desc.sprite_buffer,
            sprite_range: desc.sprite_range,
            material: desc.material,
            cull_mode: desc.cull_mode,
            primitive: desc.primitive,
        }
    }

    pub fn vertex_buffer_count(&self) -> usize {
        self.vertex_buffers.len()
    }

    pub fn vertex_buffer(&self, index: usize) -> Option<&Arc<VertexBuffer>> {
        self.vertex_buffers.get(index)
    }

    pub fn index_buffer(&self) -> Option<&Arc<IndexBuffer>> {
        self.index_buffer.as_ref()
    }

    pub fn bone_buffer(&self) -> Option<&Arc<BoneBuffer>> {
        self.bone_buffer.as_ref()
    }

    pub fn instance_buffer(&self) -> Option<&Arc<InstanceBuffer>> {
        self.instance_buffer.as_ref()
    }

    pub fn sprite_buffer(&self) -> Option<&Arc<SpriteBuffer>> {
        self.sprite_buffer.as_ref()
    }

    pub fn vertex_range(&self) -> BufferRange {
        self.vertex_range
    }

    pub fn index_range(&self) -> BufferRange {
        self.index_range
    }

    pub fn bone_range(&self) -> BufferRange {
        self.bone_range
    }

    pub fn instance_range(&self) -> BufferRange {
        self.instance_range
    }

    pub fn sprite_range(&self) -> BufferRange {
        self.sprite_range
    }

    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    pub fn cull_mode(&self) -> CullMode {
        self.cull_mode
    }

    pub fn primitive(&self) -> PrimitiveKind {
        self.primitive
    }

    /// Replace the material reference; buffer bindings are untouched.
    pub fn set_material(&mut self, material: Option<MaterialId>) {
        self.material = material;
    }

    pub fn set_vertex_buffer_range(&mut self, first: u32, count: u32) {
        self.vertex_range = BufferRange::new(first, count);
    }

    pub fn set_index_buffer_range(&mut self, first: u32, count: u32) {
        self.index_range = BufferRange::new(first, count);
    }

    pub fn set_bone_buffer_range(&mut self, first: u32, count: u32) {
        self.bone_range = BufferRange::new(first, count);
    }

    pub fn set_instance_buffer_range(&mut self, first: u32, count: u32) {
        self.instance_range = BufferRange::new(first, count);
    }

    pub fn set_sprite_buffer_range(&mut self, first: u32, count: u32) {
        self.sprite_range = BufferRange::new(first, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desc_requires_buffers_for_nonzero_counts() {
        let desc = RenderResourceDesc {
            index_range: BufferRange::new(0, 36),
            ..Default::default()
        };
        assert!(!desc.is_valid());

        let desc = RenderResourceDesc {
            sprite_range: BufferRange::new(0, 100),
            ..Default::default()
        };
        assert!(!desc.is_valid());

        assert!(RenderResourceDesc::default().is_valid());
    }

    #[test]
    fn range_updates_are_metadata_only() {
        let mut resource = RenderResource::new(RenderResourceDesc::default());
        resource.set_sprite_buffer_range(8, 120);
        assert_eq!(resource.sprite_range(), BufferRange::new(8, 120));

        resource.set_material(Some(MaterialId(7)));
        assert_eq!(resource.material(), Some(MaterialId(7)));
        assert_eq!(resource.sprite_range(), BufferRange::new(8, 120));
    }
}
