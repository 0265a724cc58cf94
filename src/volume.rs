//! Render volumes: bounded regions that aggregate the particles drawn
//! together, batched into render resources through the bridge.
//!
//! Per frame the volume is driven as lock -> update -> dispatch -> unlock.
//! The lock is a guard value, so the unlock runs on every exit path; batch
//! buffers are only rewritten while the guard is held.

use std::sync::Arc;

use glam::Vec3;

use crate::bridge::{
    CullMode, MaterialId, PrimitiveKind, RenderResource, RenderResourceDesc,
    RenderResourceManager, SpriteBuffer, SpriteBufferDesc, SpriteSemantic, SpriteWriteData,
    BufferUsageHint, DataFormat,
};

/// Sprites per drawable batch; the volume rebuilds its batching as the
/// population crosses multiples of this.
pub const MAX_SPRITES_PER_BATCH: u32 = 4096;

/// Number of batches a population of `count` sprites needs.
pub(crate) fn batches_needed(count: u32, per_batch: u32) -> usize {
    count.div_ceil(per_batch) as usize
}

/// CPU-side particle state published by the simulation after a fetch.
#[derive(Clone, Debug, Default)]
pub struct ParticleSnapshot {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
    pub scales: Vec<f32>,
}

impl ParticleSnapshot {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.colors.clear();
        self.scales.clear();
    }

    pub fn push(&mut self, position: [f32; 3], color: [f32; 4], scale: f32) {
        self.positions.push(position);
        self.colors.push(color);
        self.scales.push(scale);
    }
}

struct VolumeBatch {
    sprite_buffer: Arc<SpriteBuffer>,
    resource: RenderResource,
}

pub struct RenderVolume {
    material: MaterialId,
    snapshot: ParticleSnapshot,
    batches: Vec<VolumeBatch>,
    bounds_min: Vec3,
    bounds_max: Vec3,
    locked: bool,
}

impl RenderVolume {
    pub fn new(material: MaterialId) -> Self {
        Self {
            material,
            snapshot: ParticleSnapshot::default(),
            batches: Vec::new(),
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::ZERO,
            locked: false,
        }
    }

    /// Replace the published particle state. Called by the simulation after
    /// results are fetched, never while the volume is locked.
    pub fn publish(&mut self, snapshot: ParticleSnapshot) {
        debug_assert!(!self.locked, "publish while volume is locked");
        self.bounds_min = Vec3::ZERO;
        self.bounds_max = Vec3::ZERO;
        for (i, p) in snapshot.positions.iter().enumerate() {
            let p = Vec3::from_array(*p);
            if i == 0 {
                self.bounds_min = p;
                self.bounds_max = p;
            } else {
                self.bounds_min = self.bounds_min.min(p);
                self.bounds_max = self.bounds_max.max(p);
            }
        }
        self.snapshot = snapshot;
    }

    pub fn snapshot(&self) -> &ParticleSnapshot {
        &self.snapshot
    }

    /// Axis-aligned bounds of the published population.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.bounds_min, self.bounds_max)
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Acquire the volume for this frame's update/dispatch. The returned
    /// guard unlocks on drop.
    pub fn lock(&mut self) -> VolumeGuard<'_> {
        debug_assert!(!self.locked, "volume locked twice");
        self.locked = true;
        VolumeGuard { volume: self }
    }

    /// Release all batches back through the manager. Used at teardown; the
    /// member buffers die with their handles.
    pub fn release_batches(&mut self, manager: &mut RenderResourceManager) {
        while let Some(batch) = self.batches.pop() {
            manager.release_resource(batch.resource);
            manager.release_sprite_buffer(batch.sprite_buffer);
        }
    }

    /// The layout the output stage requests for each sprite batch.
    fn sprite_desc(&self) -> SpriteBufferDesc {
        SpriteBufferDesc {
            max_sprites: MAX_SPRITES_PER_BATCH,
            hint: BufferUsageHint::Streaming,
            ..Default::default()
        }
        .with(SpriteSemantic::Position, DataFormat::Float3)
        .with(SpriteSemantic::Color, DataFormat::Float4)
        .with(SpriteSemantic::Scale, DataFormat::Float1)
    }

    fn update_batches(&mut self, manager: &mut RenderResourceManager) {
        let count = self.snapshot.len() as u32;
        let needed = batches_needed(count, MAX_SPRITES_PER_BATCH);

        // Batching rebuilds lazily: extra batches are retired, missing ones
        // created, existing ones rewritten in place.
        while self.batches.len() > needed {
            let batch = self.batches.pop().expect("len checked");
            manager.release_resource(batch.resource);
            manager.release_sprite_buffer(batch.sprite_buffer);
        }
        while self.batches.len() < needed {
            let Some(sprite_buffer) = manager.create_sprite_buffer(&self.sprite_desc()) else {
                log::warn!("sprite batch unavailable; volume draws partially");
                break;
            };
            let desc = RenderResourceDesc {
                sprite_buffer: Some(sprite_buffer.clone()),
                material: Some(self.material),
                cull_mode: CullMode::Disabled,
                primitive: PrimitiveKind::TriangleList,
                ..Default::default()
            };
            let Some(resource) = manager.create_resource(desc) else {
                manager.release_sprite_buffer(sprite_buffer);
                break;
            };
            self.batches.push(VolumeBatch {
                sprite_buffer,
                resource,
            });
        }

        for (i, batch) in self.batches.iter_mut().enumerate() {
            let start = i * MAX_SPRITES_PER_BATCH as usize;
            let chunk = (self.snapshot.len() - start).min(MAX_SPRITES_PER_BATCH as usize);
            let end = start + chunk;

            let data = SpriteWriteData::default()
                .with(
                    SpriteSemantic::Position,
                    bytemuck::cast_slice(&self.snapshot.positions[start..end]),
                    12,
                )
                .with(
                    SpriteSemantic::Color,
                    bytemuck::cast_slice(&self.snapshot.colors[start..end]),
                    16,
                )
                .with(
                    SpriteSemantic::Scale,
                    bytemuck::cast_slice(&self.snapshot.scales[start..end]),
                    4,
                );

            match batch
                .sprite_buffer
                .write(manager.queue(), &data, 0, chunk as u32)
            {
                Ok(()) => batch.resource.set_sprite_buffer_range(0, chunk as u32),
                Err(err) => {
                    // Skipped, not fatal: this batch simply draws nothing.
                    log::warn!("sprite write skipped: {err}");
                    batch.resource.set_sprite_buffer_range(0, 0);
                }
            }
        }
    }
}

/// Exclusive access to a volume for one frame. Unlocks on drop.
pub struct VolumeGuard<'a> {
    volume: &'a mut RenderVolume,
}

impl VolumeGuard<'_> {
    /// Recompute batching and push the published particle state into the
    /// batch buffers.
    pub fn update(&mut self, manager: &mut RenderResourceManager) {
        self.volume.update_batches(manager);
    }

    /// The drawable batches, for dispatch.
    pub fn resources(&self) -> impl Iterator<Item = &RenderResource> {
        self.volume.batches.iter().map(|b| &b.resource)
    }
}

impl Drop for VolumeGuard<'_> {
    fn drop(&mut self) {
        self.volume.locked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_count_scales_with_population() {
        assert_eq!(batches_needed(0, 4096), 0);
        assert_eq!(batches_needed(1, 4096), 1);
        assert_eq!(batches_needed(4096, 4096), 1);
        assert_eq!(batches_needed(4097, 4096), 2);
    }

    #[test]
    fn publish_tracks_bounds() {
        let mut volume = RenderVolume::new(MaterialId(1));
        let mut snap = ParticleSnapshot::default();
        snap.push([-1.0, 0.0, 2.0], [1.0; 4], 0.1);
        snap.push([3.0, 5.0, -4.0], [1.0; 4], 0.1);
        volume.publish(snap);

        let (min, max) = volume.bounds();
        assert_eq!(min, Vec3::new(-1.0, 0.0, -4.0));
        assert_eq!(max, Vec3::new(3.0, 5.0, 2.0));
    }

    #[test]
    fn guard_unlocks_on_every_exit_path() {
        let mut volume = RenderVolume::new(MaterialId(1));
        {
            let guard = volume.lock();
            assert_eq!(guard.resources().count(), 0);
        }
        // A second lock after the guard dropped must not trip the debug
        // assertion.
        let guard = volume.lock();
        drop(guard);
        let _again = volume.lock();
    }
}
