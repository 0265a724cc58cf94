//! GPU buffers owned by the render bridge, one concrete type per kind.
//!
//! Producers never touch the underlying `wgpu::Buffer`; they describe their
//! data through per-semantic sources and the bridge gathers it into each
//! buffer's interleaved layout. A write either lands whole or not at all:
//! staging is assembled and validated first, then copied in one upload
//! starting at `first * stride`.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::bridge::desc::{
    BoneBufferDesc, BufferUsageHint, IndexBufferDesc, InstanceBufferDesc, PrimitiveKind,
    SpriteBufferDesc, SurfaceBufferDesc, VertexBufferDesc,
};
use crate::bridge::format::{
    DataFormat, InstanceSemantic, Interleaving, SpriteSemantic, VertexSemantic,
};

/// Why a buffer write was skipped. The write is a no-op in every case; the
/// caller logs and moves on, the frame's data is simply not drawn.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("write of {count} elements at {first} exceeds capacity {capacity}")]
    OutOfRange { first: u32, count: u32, capacity: u32 },
    #[error("source data ends {missing} bytes short of element {count}")]
    SourceTooShort { count: u32, missing: usize },
    #[error("static buffer cannot be rewritten after its initial upload")]
    StaticRewrite,
    #[error("block {width}x{height}x{depth} at {first} does not fit the surface")]
    BlockOutOfRange {
        first: u32,
        width: u32,
        height: u32,
        depth: u32,
    },
}

/// One semantic channel's source data; elements are `stride` bytes apart.
#[derive(Clone, Copy, Debug)]
pub struct SemanticSource<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

/// Per-semantic sources for a vertex buffer write. A semantic without a
/// source is not written.
#[derive(Default)]
pub struct VertexWriteData<'a> {
    pub sources: [Option<SemanticSource<'a>>; VertexSemantic::COUNT],
}

impl<'a> VertexWriteData<'a> {
    pub fn with(mut self, semantic: VertexSemantic, data: &'a [u8], stride: usize) -> Self {
        self.sources[semantic.index()] = Some(SemanticSource { data, stride });
        self
    }
}

/// Per-semantic sources for an instance buffer write.
#[derive(Default)]
pub struct InstanceWriteData<'a> {
    pub sources: [Option<SemanticSource<'a>>; InstanceSemantic::COUNT],
}

impl<'a> InstanceWriteData<'a> {
    pub fn with(mut self, semantic: InstanceSemantic, data: &'a [u8], stride: usize) -> Self {
        self.sources[semantic.index()] = Some(SemanticSource { data, stride });
        self
    }
}

/// Per-semantic sources for a sprite buffer write.
#[derive(Default)]
pub struct SpriteWriteData<'a> {
    pub sources: [Option<SemanticSource<'a>>; SpriteSemantic::COUNT],
}

impl<'a> SpriteWriteData<'a> {
    pub fn with(mut self, semantic: SpriteSemantic, data: &'a [u8], stride: usize) -> Self {
        self.sources[semantic.index()] = Some(SemanticSource { data, stride });
        self
    }
}

/// Checks the destination range and returns the byte offset of the write.
fn destination_offset(
    first: u32,
    count: u32,
    capacity: u32,
    stride: usize,
) -> Result<u64, WriteError> {
    if first.checked_add(count).map_or(true, |end| end > capacity) {
        return Err(WriteError::OutOfRange {
            first,
            count,
            capacity,
        });
    }
    Ok(first as u64 * stride as u64)
}

/// Gathers `count` elements of every sourced live channel into one
/// interleaved staging block. Channels without a source stay zeroed.
pub(crate) fn gather_channels(
    interleaving: &Interleaving,
    formats: &[DataFormat],
    sources: &[Option<SemanticSource<'_>>],
    count: u32,
) -> Result<Vec<u8>, WriteError> {
    let stride = interleaving.stride();
    let mut staged = vec![0u8; stride * count as usize];

    for (channel, format) in formats.iter().enumerate() {
        let Some(offset) = interleaving.offset(channel) else {
            continue;
        };
        let Some(source) = sources.get(channel).copied().flatten() else {
            continue;
        };
        let size = format.size();
        for i in 0..count as usize {
            let src_start = i * source.stride;
            let Some(src) = source.data.get(src_start..src_start + size) else {
                return Err(WriteError::SourceTooShort {
                    count,
                    missing: src_start + size - source.data.len(),
                });
            };
            let dst_start = i * stride + offset;
            staged[dst_start..dst_start + size].copy_from_slice(src);
        }
    }
    Ok(staged)
}

/// Repacks `count` flat elements of `elem_size` bytes from a source whose
/// elements are `src_stride` bytes apart.
pub(crate) fn gather_flat(
    src: &[u8],
    src_stride: usize,
    elem_size: usize,
    count: u32,
) -> Result<Vec<u8>, WriteError> {
    let mut staged = vec![0u8; elem_size * count as usize];
    for i in 0..count as usize {
        let src_start = i * src_stride;
        let Some(chunk) = src.get(src_start..src_start + elem_size) else {
            return Err(WriteError::SourceTooShort {
                count,
                missing: src_start + elem_size - src.len(),
            });
        };
        staged[i * elem_size..(i + 1) * elem_size].copy_from_slice(chunk);
    }
    Ok(staged)
}

/// Shared allocation and write-access bookkeeping for all buffer kinds.
struct RawBuffer {
    buffer: wgpu::Buffer,
    hint: BufferUsageHint,
    written: AtomicBool,
}

impl RawBuffer {
    fn new(
        device: &wgpu::Device,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
        hint: BufferUsageHint,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            hint,
            written: AtomicBool::new(false),
        }
    }

    /// Static buffers accept exactly one upload; later writes are refused
    /// the way a map on a non-mappable allocation is.
    fn acquire_write(&self) -> Result<(), WriteError> {
        let first_write = !self.written.swap(true, Ordering::Relaxed);
        if self.hint == BufferUsageHint::Static && !first_write {
            return Err(WriteError::StaticRewrite);
        }
        Ok(())
    }
}

/// An interleaved per-vertex attribute buffer.
pub struct VertexBuffer {
    raw: RawBuffer,
    formats: [DataFormat; VertexSemantic::COUNT],
    interleaving: Interleaving,
    capacity: u32,
}

impl VertexBuffer {
    pub(crate) fn new(device: &wgpu::Device, desc: &VertexBufferDesc, label: &str) -> Self {
        let interleaving = desc.interleaving();
        let size = desc.max_verts as u64 * interleaving.stride() as u64;
        Self {
            raw: RawBuffer::new(device, label, size, wgpu::BufferUsages::VERTEX, desc.hint),
            formats: desc.formats,
            interleaving,
            capacity: desc.max_verts,
        }
    }

    pub fn stride(&self) -> usize {
        self.interleaving.stride()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn format(&self, semantic: VertexSemantic) -> DataFormat {
        self.formats[semantic.index()]
    }

    pub fn interleaving(&self) -> &Interleaving {
        &self.interleaving
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw.buffer
    }

    /// Gather the sourced semantics of `count` vertices and upload them at
    /// vertex `first`.
    pub fn write(
        &self,
        queue: &wgpu::Queue,
        data: &VertexWriteData<'_>,
        first: u32,
        count: u32,
    ) -> Result<(), WriteError> {
        if count == 0 {
            return Ok(());
        }
        let offset = destination_offset(first, count, self.capacity, self.stride())?;
        let staged = gather_channels(&self.interleaving, &self.formats, &data.sources, count)?;
        self.raw.acquire_write()?;
        queue.write_buffer(&self.raw.buffer, offset, &staged);
        Ok(())
    }
}

/// A flat index buffer.
pub struct IndexBuffer {
    raw: RawBuffer,
    format: DataFormat,
    primitive: PrimitiveKind,
    capacity: u32,
}

impl IndexBuffer {
    pub(crate) fn new(device: &wgpu::Device, desc: &IndexBufferDesc, label: &str) -> Self {
        let size = desc.max_indices as u64 * desc.format.size() as u64;
        Self {
            raw: RawBuffer::new(device, label, size, wgpu::BufferUsages::INDEX, desc.hint),
            format: desc.format,
            primitive: desc.primitive,
            capacity: desc.max_indices,
        }
    }

    pub fn stride(&self) -> usize {
        self.format.size()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn primitive(&self) -> PrimitiveKind {
        self.primitive
    }

    pub fn wgpu_format(&self) -> wgpu::IndexFormat {
        match self.format {
            DataFormat::UShort1 => wgpu::IndexFormat::Uint16,
            _ => wgpu::IndexFormat::Uint32,
        }
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw.buffer
    }

    pub fn write(
        &self,
        queue: &wgpu::Queue,
        src: &[u8],
        src_stride: usize,
        first: u32,
        count: u32,
    ) -> Result<(), WriteError> {
        if count == 0 {
            return Ok(());
        }
        let elem = self.format.size();
        let offset = destination_offset(first, count, self.capacity, elem)?;
        let staged = gather_flat(src, src_stride, elem, count)?;
        self.raw.acquire_write()?;
        queue.write_buffer(&self.raw.buffer, offset, &staged);
        Ok(())
    }
}

/// A width x height x depth block of elements, written by sub-block.
pub struct SurfaceBuffer {
    raw: RawBuffer,
    format: DataFormat,
    width: u32,
    height: u32,
    depth: u32,
}

impl SurfaceBuffer {
    pub(crate) fn new(device: &wgpu::Device, desc: &SurfaceBufferDesc, label: &str) -> Self {
        let elements = desc.width as u64 * desc.height as u64 * desc.depth as u64;
        let size = elements * desc.format.size() as u64;
        Self {
            raw: RawBuffer::new(device, label, size, wgpu::BufferUsages::STORAGE, desc.hint),
            format: desc.format,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
        }
    }

    pub fn extent(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw.buffer
    }

    /// Copy a `width` x `height` x `depth` block of elements into the
    /// surface starting at element `first`. Source rows are `src_row_pitch`
    /// bytes apart; destination rows keep the surface's full width.
    pub fn write(
        &self,
        queue: &wgpu::Queue,
        src: &[u8],
        src_row_pitch: usize,
        first: u32,
        width: u32,
        height: u32,
        depth: u32,
    ) -> Result<(), WriteError> {
        if width == 0 || height == 0 || depth == 0 {
            return Ok(());
        }
        let total = self.width as u64 * self.height as u64 * self.depth as u64;
        let slice_elems = self.width as u64 * self.height as u64;
        let last = first as u64
            + (depth as u64 - 1) * slice_elems
            + (height as u64 - 1) * self.width as u64
            + (width as u64 - 1);
        if width > self.width || height > self.height || depth > self.depth || last >= total {
            return Err(WriteError::BlockOutOfRange {
                first,
                width,
                height,
                depth,
            });
        }

        let elem = self.format.size();
        let row_bytes = width as usize * elem;
        let rows = height as u64 * depth as u64;
        if src.len() < (rows as usize - 1) * src_row_pitch + row_bytes {
            return Err(WriteError::SourceTooShort {
                count: width * height * depth,
                missing: (rows as usize - 1) * src_row_pitch + row_bytes - src.len(),
            });
        }

        self.raw.acquire_write()?;
        for z in 0..depth as u64 {
            for y in 0..height as u64 {
                let src_start = (z * height as u64 + y) as usize * src_row_pitch;
                let dst_elem = first as u64 + z * slice_elems + y * self.width as u64;
                queue.write_buffer(
                    &self.raw.buffer,
                    dst_elem * elem as u64,
                    &src[src_start..src_start + row_bytes],
                );
            }
        }
        Ok(())
    }
}

/// A per-bone pose transform buffer, bound as shader storage.
pub struct BoneBuffer {
    raw: RawBuffer,
    transform_format: DataFormat,
    capacity: u32,
}

impl BoneBuffer {
    pub(crate) fn new(device: &wgpu::Device, desc: &BoneBufferDesc, label: &str) -> Self {
        let size = desc.max_bones as u64 * desc.transform_format.size() as u64;
        Self {
            raw: RawBuffer::new(device, label, size, wgpu::BufferUsages::STORAGE, desc.hint),
            transform_format: desc.transform_format,
            capacity: desc.max_bones,
        }
    }

    pub fn stride(&self) -> usize {
        self.transform_format.size()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw.buffer
    }

    pub fn write(
        &self,
        queue: &wgpu::Queue,
        transforms: &[u8],
        src_stride: usize,
        first: u32,
        count: u32,
    ) -> Result<(), WriteError> {
        if count == 0 {
            return Ok(());
        }
        let elem = self.stride();
        let offset = destination_offset(first, count, self.capacity, elem)?;
        let staged = gather_flat(transforms, src_stride, elem, count)?;
        self.raw.acquire_write()?;
        queue.write_buffer(&self.raw.buffer, offset, &staged);
        Ok(())
    }
}

/// An interleaved per-instance attribute buffer, bound with instance step.
pub struct InstanceBuffer {
    raw: RawBuffer,
    formats: [DataFormat; InstanceSemantic::COUNT],
    interleaving: Interleaving,
    capacity: u32,
}

impl InstanceBuffer {
    pub(crate) fn new(device: &wgpu::Device, desc: &InstanceBufferDesc, label: &str) -> Self {
        let interleaving = desc.interleaving();
        let size = desc.max_instances as u64 * interleaving.stride() as u64;
        Self {
            raw: RawBuffer::new(device, label, size, wgpu::BufferUsages::VERTEX, desc.hint),
            formats: desc.formats,
            interleaving,
            capacity: desc.max_instances,
        }
    }

    pub fn stride(&self) -> usize {
        self.interleaving.stride()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn interleaving(&self) -> &Interleaving {
        &self.interleaving
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw.buffer
    }

    pub fn write(
        &self,
        queue: &wgpu::Queue,
        data: &InstanceWriteData<'_>,
        first: u32,
        count: u32,
    ) -> Result<(), WriteError> {
        if count == 0 {
            return Ok(());
        }
        let offset = destination_offset(first, count, self.capacity, self.stride())?;
        let staged = gather_channels(&self.interleaving, &self.formats, &data.sources, count)?;
        self.raw.acquire_write()?;
        queue.write_buffer(&self.raw.buffer, offset, &staged);
        Ok(())
    }
}

/// An interleaved per-sprite attribute buffer, bound with instance step.
pub struct SpriteBuffer {
    raw: RawBuffer,
    formats: [DataFormat; SpriteSemantic::COUNT],
    interleaving: Interleaving,
    capacity: u32,
}

impl SpriteBuffer {
    pub(crate) fn new(device: &wgpu::Device, desc: &SpriteBufferDesc, label: &str) -> Self {
        let interleaving = desc.interleaving();
        let size = desc.max_sprites as u64 * interleaving.stride() as u64;
        Self {
            raw: RawBuffer::new(device, label, size, wgpu::BufferUsages::VERTEX, desc.hint),
            formats: desc.formats,
            interleaving,
            capacity: desc.max_sprites,
        }
    }

    pub fn stride(&self) -> usize {
        self.interleaving.stride()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn format(&self, semantic: SpriteSemantic) -> DataFormat {
        self.formats[semantic.index()]
    }

    pub fn interleaving(&self) -> &Interleaving {
        &self.interleaving
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw.buffer
    }

    pub fn write(
        &self,
        queue: &wgpu::Queue,
        data: &SpriteWriteData<'_>,
        first: u32,
        count: u32,
    ) -> Result<(), WriteError> {
        if count == 0 {
            return Ok(());
        }
        let offset = destination_offset(first, count, self.capacity, self.stride())?;
        let staged = gather_channels(&self.interleaving, &self.formats, &data.sources, count)?;
        self.raw.acquire_write()?;
        queue.write_buffer(&self.raw.buffer, offset, &staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::desc::VertexBufferDesc;

    fn pos_uv_desc() -> VertexBufferDesc {
        VertexBufferDesc::default()
            .with(VertexSemantic::Position, DataFormat::Float3)
            .with(VertexSemantic::TexCoord0, DataFormat::Float2)
    }

    #[test]
    fn destination_offset_is_first_times_stride() {
        assert_eq!(destination_offset(3, 4, 16, 20).unwrap(), 60);
        assert_eq!(destination_offset(0, 16, 16, 20).unwrap(), 0);
    }

    #[test]
    fn destination_offset_rejects_overrun() {
        let err = destination_offset(10, 8, 16, 20).unwrap_err();
        assert_eq!(
            err,
            WriteError::OutOfRange {
                first: 10,
                count: 8,
                capacity: 16
            }
        );
        // first + count overflowing u32 must not wrap into range
        assert!(destination_offset(u32::MAX, 2, 16, 20).is_err());
    }

    #[test]
    fn gather_interleaves_each_element_at_stride_boundaries() {
        let desc = pos_uv_desc();
        let interleaving = desc.interleaving();

        // Two vertices, tightly packed sources.
        let positions: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        let uvs: Vec<u8> = [0.25f32, 0.5, 0.75, 1.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();

        let data = VertexWriteData::default()
            .with(VertexSemantic::Position, &positions, 12)
            .with(VertexSemantic::TexCoord0, &uvs, 8);

        let staged = gather_channels(&interleaving, &desc.formats, &data.sources, 2).unwrap();
        assert_eq!(staged.len(), 2 * 20);

        // Element 1 starts at byte 20: position then uv.
        assert_eq!(&staged[20..24], &4.0f32.to_le_bytes());
        assert_eq!(&staged[32..36], &0.75f32.to_le_bytes());
    }

    #[test]
    fn gather_skips_unsourced_semantics() {
        let desc = pos_uv_desc();
        let interleaving = desc.interleaving();
        let positions: Vec<u8> = [9.0f32, 8.0, 7.0].iter().flat_map(|f| f.to_le_bytes()).collect();

        let data = VertexWriteData::default().with(VertexSemantic::Position, &positions, 12);
        let staged = gather_channels(&interleaving, &desc.formats, &data.sources, 1).unwrap();

        // Unsourced uv channel stays zeroed.
        assert_eq!(&staged[12..20], &[0u8; 8]);
    }

    #[test]
    fn gather_reports_short_source() {
        let desc = pos_uv_desc();
        let interleaving = desc.interleaving();
        let positions = [0u8; 20]; // 2 vertices need 24 bytes

        let data = VertexWriteData::default().with(VertexSemantic::Position, &positions, 12);
        let err = gather_channels(&interleaving, &desc.formats, &data.sources, 2).unwrap_err();
        assert!(matches!(err, WriteError::SourceTooShort { count: 2, .. }));
    }

    #[test]
    fn gather_flat_repacks_strided_elements() {
        // Three u32 indices padded to 8-byte stride.
        let mut src = Vec::new();
        for i in [10u32, 20, 30] {
            src.extend_from_slice(&i.to_le_bytes());
            src.extend_from_slice(&[0xAA; 4]);
        }
        let staged = gather_flat(&src, 8, 4, 3).unwrap();
        assert_eq!(staged.len(), 12);
        assert_eq!(&staged[4..8], &20u32.to_le_bytes());
    }
}
