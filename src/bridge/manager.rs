//! Create/release surface for bridge buffers and composite resources.
//!
//! Descriptor validation happens here, before any GPU allocation. A failed
//! create returns `None` and the caller treats the feature as unavailable;
//! nothing in the bridge is fatal.

use std::sync::Arc;

use crate::bridge::buffers::{
    BoneBuffer, IndexBuffer, InstanceBuffer, SpriteBuffer, SurfaceBuffer, VertexBuffer,
};
use crate::bridge::desc::{
    BoneBufferDesc, IndexBufferDesc, InstanceBufferDesc, SpriteBufferDesc, SurfaceBufferDesc,
    VertexBufferDesc,
};
use crate::bridge::resource::{RenderResource, RenderResourceDesc};

/// Live object counts, incremented on create and decremented on release.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferCounts {
    pub vertex: usize,
    pub index: usize,
    pub surface: usize,
    pub bone: usize,
    pub instance: usize,
    pub sprite: usize,
    pub resources: usize,
}

pub struct RenderResourceManager {
    device: wgpu::Device,
    queue: wgpu::Queue,
    counts: BufferCounts,
    created: u64,
}

impl RenderResourceManager {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            counts: BufferCounts::default(),
            created: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn counts(&self) -> BufferCounts {
        self.counts
    }

    fn next_label(&mut self, kind: &str) -> String {
        self.created += 1;
        format!("{}-{}", kind, self.created)
    }

    pub fn create_vertex_buffer(&mut self, desc: &VertexBufferDesc) -> Option<Arc<VertexBuffer>> {
        if !desc.is_valid() {
            log::warn!(
                "rejecting vertex buffer: max_verts={} stride={}",
                desc.max_verts,
                desc.interleaving().stride()
            );
            return None;
        }
        let label = self.next_label("vertex-buffer");
        let buffer = VertexBuffer::new(&self.device, desc, &label);
        self.counts.vertex += 1;
        Some(Arc::new(buffer))
    }

    pub fn release_vertex_buffer(&mut self, buffer: Arc<VertexBuffer>) {
        debug_assert!(self.counts.vertex > 0);
        self.counts.vertex = self.counts.vertex.saturating_sub(1);
        drop(buffer);
    }

    pub fn create_index_buffer(&mut self, desc: &IndexBufferDesc) -> Option<Arc<IndexBuffer>> {
        if !desc.is_valid() {
            log::warn!(
                "rejecting index buffer: max_indices={} format={:?}",
                desc.max_indices,
                desc.format
            );
            return None;
        }
        let label = self.next_label("index-buffer");
        let buffer = IndexBuffer::new(&self.device, desc, &label);
        self.counts.index += 1;
        Some(Arc::new(buffer))
    }

    pub fn release_index_buffer(&mut self, buffer: Arc<IndexBuffer>) {
        debug_assert!(self.counts.index > 0);
        self.counts.index = self.counts.index.saturating_sub(1);
        drop(buffer);
    }

    pub fn create_surface_buffer(&mut self, desc: &SurfaceBufferDesc) -> Option<Arc<SurfaceBuffer>> {
        if !desc.is_valid() {
            log::warn!(
                "rejecting surface buffer: {}x{}x{} format={:?}",
                desc.width,
                desc.height,
                desc.depth,
                desc.format
            );
            return None;
        }
        let label = self.next_label("surface-buffer");
        let buffer = SurfaceBuffer::new(&self.device, desc, &label);
        self.counts.surface += 1;
        Some(Arc::new(buffer))
    }

    pub fn release_surface_buffer(&mut self, buffer: Arc<SurfaceBuffer>) {
        debug_assert!(self.counts.surface > 0);
        self.counts.surface = self.counts.surface.saturating_sub(1);
        drop(buffer);
    }

    pub fn create_bone_buffer(&mut self, desc: &BoneBufferDesc) -> Option<Arc<BoneBuffer>> {
        if !desc.is_valid() {
            log::warn!(
                "rejecting bone buffer: max_bones={} format={:?}",
                desc.max_bones,
                desc.transform_format
            );
            return None;
        }
        let label = self.next_label("bone-buffer");
        let buffer = BoneBuffer::new(&self.device, desc, &label);
        self.counts.bone += 1;
        Some(Arc::new(buffer))
    }

    pub fn release_bone_buffer(&mut self, buffer: Arc<BoneBuffer>) {
        debug_assert!(self.counts.bone > 0);
        self.counts.bone = self.counts.bone.saturating_sub(1);
        drop(buffer);
    }

    pub fn create_instance_buffer(
        &mut self,
        desc: &InstanceBufferDesc,
    ) -> Option<Arc<InstanceBuffer>> {
        if !desc.is_valid() {
            log::warn!(
                "rejecting instance buffer: max_instances={} stride={}",
                desc.max_instances,
                desc.interleaving().stride()
            );
            return None;
        }
        let label = self.next_label("instance-buffer");
        let buffer = InstanceBuffer::new(&self.device, desc, &label);
        self.counts.instance += 1;
        Some(Arc::new(buffer))
    }

    pub fn release_instance_buffer(&mut self, buffer: Arc<InstanceBuffer>) {
        debug_assert!(self.counts.instance > 0);
        self.counts.instance = self.counts.instance.saturating_sub(1);
        drop(buffer);
    }

    pub fn create_sprite_buffer(&mut self, desc: &SpriteBufferDesc) -> Option<Arc<SpriteBuffer>> {
        if !desc.is_valid() {
            log::warn!(
                "rejecting sprite buffer: max_sprites={} stride={}",
                desc.max_sprites,
                desc.interleaving().stride()
            );
            return None;
        }
        let label = self.next_label("sprite-buffer");
        let buffer = SpriteBuffer::new(&self.device, desc, &label);
        self.counts.sprite += 1;
        Some(Arc::new(buffer))
    }

    pub fn release_sprite_buffer(&mut self, buffer: Arc<SpriteBuffer>) {
        debug_assert!(self.counts.sprite > 0);
        self.counts.sprite = self.counts.sprite.saturating_sub(1);
        drop(buffer);
    }

    /// Bundle previously created buffers into one drawable batch. The
    /// resource references its members; it does not own them.
    pub fn create_resource(&mut self, desc: RenderResourceDesc) -> Option<RenderResource> {
        if !desc.is_valid() {
            log::warn!("rejecting render resource: inconsistent ranges");
            return None;
        }
        self.counts.resources += 1;
        Some(RenderResource::new(desc))
    }

    /// Drop a resource. Member buffers stay alive under their own handles.
    pub fn release_resource(&mut self, resource: RenderResource) {
        debug_assert!(self.counts.resources > 0);
        self.counts.resources = self.counts.resources.saturating_sub(1);
        drop(resource);
    }
}
