//! Owning application context: clock, SDK, scene, and particle setup in one
//! explicit struct passed to whoever needs it.

use std::sync::Arc;

use crate::bridge::{
    BufferUsageHint, CullMode, DataFormat, IndexBuffer, IndexBufferDesc, PrimitiveKind,
    RenderResource, RenderResourceDesc, RenderResourceManager, VertexBuffer, VertexBufferDesc,
    VertexSemantic, VertexWriteData, BufferRange,
};
use crate::clock::SimulationClock;
use crate::emitter::{EmitterOptions, ParticleSetup};
use crate::gpu::mesh;
use crate::gpu::renderer::{Renderer, MATERIAL_GROUND, MATERIAL_PARTICLES};
use crate::heightfield::Heightfield;
use crate::scene::{ActorId, EffectsScene, Ground};
use crate::sdk::EffectsSdk;

/// The static ground draw batch and the buffer handles needed to release it
/// symmetrically.
pub struct GroundResource {
    resource: RenderResource,
    vertex_buffer: Arc<VertexBuffer>,
    index_buffer: Arc<IndexBuffer>,
}

impl GroundResource {
    pub fn resource(&self) -> &RenderResource {
        &self.resource
    }

    pub fn release(self, manager: &mut RenderResourceManager) {
        manager.release_resource(self.resource);
        manager.release_vertex_buffer(self.vertex_buffer);
        manager.release_index_buffer(self.index_buffer);
    }
}

pub struct ParticleApp {
    clock: SimulationClock,
    sdk: EffectsSdk,
    scene: EffectsScene,
    setup: ParticleSetup,
    options: EmitterOptions,
    emitter: Option<ActorId>,
}

impl ParticleApp {
    pub fn new(options: EmitterOptions) -> Self {
        Self::with_sdk(EffectsSdk::new(), options)
    }

    /// Build against a caller-provided registry; used when module
    /// registrations need staging.
    pub fn with_sdk(mut sdk: EffectsSdk, options: EmitterOptions) -> Self {
        let setup = ParticleSetup::init(&mut sdk, &options);
        Self {
            clock: SimulationClock::default(),
            sdk,
            scene: EffectsScene::new(),
            setup,
            options,
            emitter: None,
        }
    }

    pub fn install_heightfield(&mut self, heightfield: Heightfield) {
        self.scene.set_ground(Ground::Heightfield(heightfield));
    }

    /// One-time emitter creation. Returns false when the feature ended up
    /// disabled; the app keeps running either way.
    pub fn init_particles(&mut self) -> bool {
        self.emitter = self.setup.create_emitter(
            &mut self.sdk,
            &mut self.scene,
            &self.options,
            MATERIAL_PARTICLES,
        );
        self.emitter.is_some()
    }

    /// Accumulate wall-clock time; when one fixed step is due, kick the
    /// simulation and report that results must be fetched.
    pub fn advance(&mut self, dt: f32) -> bool {
        if !self.clock.advance(dt) {
            return false;
        }
        self.scene.simulate(self.clock.step_secs());
        true
    }

    /// Complete the pending step. Blocks until particle state is published;
    /// must run before this frame's render reads it.
    pub fn fetch_results(&mut self) {
        self.scene.fetch_results();
    }

    pub fn emitter(&self) -> Option<ActorId> {
        self.emitter
    }

    pub fn scene(&self) -> &EffectsScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut EffectsScene {
        &mut self.scene
    }

    pub fn particle_count(&self) -> usize {
        self.scene.particle_count()
    }

    /// Build the ground mesh as a static vertex+index resource through the
    /// bridge. The interleaved mesh array doubles as the per-semantic source
    /// by offsetting into it at the shared stride.
    pub fn build_ground_resource(
        &self,
        manager: &mut RenderResourceManager,
    ) -> Option<GroundResource> {
        let (vertices, indices) = mesh::create_ground_geometry(self.scene.ground());

        let vertex_desc = VertexBufferDesc {
            max_verts: vertices.len() as u32,
            hint: BufferUsageHint::Static,
            ..Default::default()
        }
        .with(VertexSemantic::Position, DataFormat::Float3)
        .with(VertexSemantic::Normal, DataFormat::Float3)
        .with(VertexSemantic::Color, DataFormat::Float3);

        let vertex_buffer = manager.create_vertex_buffer(&vertex_desc)?;

        let stride = std::mem::size_of::<mesh::Vertex>();
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let data = VertexWriteData::default()
            .with(VertexSemantic::Position, bytes, stride)
            .with(VertexSemantic::Normal, &bytes[12..], stride)
            .with(VertexSemantic::Color, &bytes[24..], stride);
        if let Err(err) = vertex_buffer.write(manager.queue(), &data, 0, vertices.len() as u32) {
            log::warn!("ground vertex upload skipped: {err}");
        }

        let index_desc = IndexBufferDesc {
            max_indices: indices.len() as u32,
            format: DataFormat::UInt1,
            hint: BufferUsageHint::Static,
            primitive: PrimitiveKind::TriangleList,
        };
        let Some(index_buffer) = manager.create_index_buffer(&index_desc) else {
            manager.release_vertex_buffer(vertex_buffer);
            return None;
        };
        if let Err(err) = index_buffer.write(
            manager.queue(),
            bytemuck::cast_slice(&indices),
            4,
            0,
            indices.len() as u32,
        ) {
            log::warn!("ground index upload skipped: {err}");
        }

        let desc = RenderResourceDesc {
            vertex_buffers: vec![vertex_buffer.clone()],
            vertex_range: BufferRange::new(0, vertices.len() as u32),
            index_buffer: Some(index_buffer.clone()),
            index_range: BufferRange::new(0, indices.len() as u32),
            material: Some(MATERIAL_GROUND),
            cull_mode: CullMode::CounterClockwise,
            primitive: PrimitiveKind::TriangleList,
            ..Default::default()
        };
        let Some(resource) = manager.create_resource(desc) else {
            manager.release_index_buffer(index_buffer);
            manager.release_vertex_buffer(vertex_buffer);
            return None;
        };

        Some(GroundResource {
            resource,
            vertex_buffer,
            index_buffer,
        })
    }

    /// Issue this frame's draw calls.
    pub fn render(
        &mut self,
        renderer: &mut Renderer,
        view: &wgpu::TextureView,
        ground: Option<&GroundResource>,
        manager: &mut RenderResourceManager,
    ) {
        renderer.render(view, &mut self.scene, ground.map(|g| g.resource()), manager);
    }

    /// Retire the per-volume batches at teardown.
    pub fn release_render_resources(&mut self, manager: &mut RenderResourceManager) {
        for actor in self.scene.actors_mut() {
            actor.volume_mut().release_batches(manager);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::{Module, MODULE_EMITTER, SDK_VERSION};

    #[test]
    fn advance_kicks_exactly_one_step_per_accumulated_interval() {
        let mut app = ParticleApp::new(EmitterOptions::default());
        assert!(app.init_particles());

        // Two half-steps sum exactly to one step: only the second simulates.
        let mut stepped = 0;
        for _ in 0..2 {
            if app.advance(1.0 / 120.0) {
                app.fetch_results();
                stepped += 1;
            }
        }
        assert_eq!(stepped, 1);
        assert!(app.particle_count() > 0);
    }

    #[test]
    fn app_survives_a_missing_emitter_module() {
        let mut sdk = EffectsSdk::new();
        sdk.register_module(Module::new(MODULE_EMITTER, SDK_VERSION - 1, Vec::new()));

        let mut app = ParticleApp::with_sdk(sdk, EmitterOptions::default());
        assert!(!app.init_particles());

        // Frames still run; there is just nothing to simulate.
        assert!(app.advance(1.0 / 30.0));
        app.fetch_results();
        assert_eq!(app.particle_count(), 0);
    }
}
