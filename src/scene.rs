//! Simulation scene: emitter actors, the particle pool, and the
//! simulate / fetch-results step contract.
//!
//! `simulate` kicks off one fixed step; `fetch_results` completes it and
//! publishes render snapshots. Issuing a second `simulate` before fetching
//! is a contract violation: it is logged and dropped, never compounded.

use glam::Vec3;

use crate::bridge::MaterialId;
use crate::heightfield::Heightfield;
use crate::sdk::{
    EffectsSdk, EmitterAssetParams, EmitterShape, IntegratorAssetParams, SpriteOutputAssetParams,
};
use crate::volume::{ParticleSnapshot, RenderVolume};

/// What the particles land on.
pub enum Ground {
    Plane { y: f32 },
    Heightfield(Heightfield),
}

impl Ground {
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        match self {
            Ground::Plane { y } => *y,
            Ground::Heightfield(hf) => hf.height_at(x, z),
        }
    }
}

/// Module tunables the scene consumes, resolved once at setup.
#[derive(Clone, Copy, Debug)]
pub struct SceneTuning {
    /// Emission rate multiplier from the emitter module.
    pub rate_scale: f32,
    /// Particles spawned immediately when emission starts.
    pub start_burst: u32,
    /// Integration substeps per simulation step.
    pub substeps: u32,
}

impl Default for SceneTuning {
    fn default() -> Self {
        Self {
            rate_scale: 1.0,
            start_burst: 0,
            substeps: 1,
        }
    }
}

struct Particle {
    position: Vec3,
    velocity: Vec3,
    age: f32,
    lifetime: f32,
    scale_mult: f32,
}

/// A running emission instance bound to one render volume.
pub struct EmitterActor {
    position: Vec3,
    emitting: bool,
    asset: EmitterAssetParams,
    integrator: IntegratorAssetParams,
    output: SpriteOutputAssetParams,
    volume: RenderVolume,
    particles: Vec<Particle>,
    emit_accumulator: f32,
    burst_pending: u32,
    rng_state: u64,
}

impl EmitterActor {
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    /// Start or stop emission. Starting arms the configured initial burst.
    pub fn start_emit(&mut self, emit: bool) {
        self.emitting = emit;
    }

    pub fn volume(&self) -> &RenderVolume {
        &self.volume
    }

    pub fn volume_mut(&mut self) -> &mut RenderVolume {
        &mut self.volume
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    // xorshift64; seed 0 is degenerate, so it is replaced on first use.
    fn next_f32(&mut self) -> f32 {
        if self.rng_state == 0 {
            self.rng_state = 0x5DEECE66D;
        }
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        (self.rng_state as f32) / (u64::MAX as f32)
    }

    fn unit_direction(&mut self) -> Vec3 {
        let x = self.next_f32() - 0.5;
        let y = self.next_f32() - 0.5;
        let z = self.next_f32() - 0.5;
        let v = Vec3::new(x, y, z);
        if v.length_squared() < 1e-8 {
            Vec3::Y
        } else {
            v.normalize()
        }
    }

    fn spawn_one(&mut self) {
        if self.particles.len() >= self.integrator.max_particles as usize {
            // Pool is full; retire the oldest instance.
            self.particles.remove(0);
        }

        let offset = match self.asset.shape {
            EmitterShape::Point => Vec3::ZERO,
            EmitterShape::Sphere { radius } => {
                // Uniform within the sphere.
                let r = radius * self.next_f32().cbrt();
                self.unit_direction() * r
            }
        };
        let speed = self.asset.initial_speed * (0.75 + 0.5 * self.next_f32());
        let velocity = self.unit_direction() * speed;

        let scale_mult = 0.8 + 0.4 * self.next_f32();
        let position = self.position + offset;
        self.particles.push(Particle {
            position,
            velocity,
            age: 0.0,
            lifetime: self.asset.lifetime_secs,
            scale_mult,
        });
    }

    fn step(&mut self, dt: f32, gravity: Vec3, ground: &Ground, tuning: &SceneTuning) {
        if self.emitting {
            while self.burst_pending > 0 {
                self.burst_pending -= 1;
                self.spawn_one();
            }
            self.emit_accumulator += self.asset.rate * tuning.rate_scale * dt;
            while self.emit_accumulator >= 1.0 {
                self.emit_accumulator -= 1.0;
                self.spawn_one();
            }
        }

        let substeps = tuning.substeps.max(1);
        let h = dt / substeps as f32;
        let damping = self.integrator.damping;
        for particle in &mut self.particles {
            for _ in 0..substeps {
                particle.velocity += gravity * h;
                particle.velocity *= 1.0 - damping * h;
                particle.position += particle.velocity * h;
            }
            particle.age += dt;
            // Particles drain on the ground.
            let floor = ground.height_at(particle.position.x, particle.position.z);
            if particle.position.y <= floor {
                particle.age = particle.lifetime;
            }
        }
        self.particles.retain(|p| p.age < p.lifetime);
    }

    fn build_snapshot(&self) -> ParticleSnapshot {
        let mut snapshot = ParticleSnapshot::default();
        for particle in &self.particles {
            let fade = 1.0 - particle.age / particle.lifetime;
            let mut color = self.asset.color;
            color[3] *= fade;
            snapshot.push(
                particle.position.to_array(),
                color,
                self.output.base_size * particle.scale_mult,
            );
        }
        snapshot
    }
}

/// Handle to an actor owned by the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActorId(usize);

pub struct EffectsScene {
    gravity: Vec3,
    ground: Ground,
    actors: Vec<EmitterActor>,
    tuning: SceneTuning,
    pending_step: Option<f32>,
}

impl EffectsScene {
    pub fn new() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            // A static plane five units below the origin, as a baseline
            // floor until a heightfield is installed.
            ground: Ground::Plane { y: -5.0 },
            actors: Vec::new(),
            tuning: SceneTuning::default(),
            pending_step: None,
        }
    }

    pub fn set_ground(&mut self, ground: Ground) {
        self.ground = ground;
    }

    pub fn ground(&self) -> &Ground {
        &self.ground
    }

    pub fn set_tuning(&mut self, tuning: SceneTuning) {
        self.tuning = tuning;
    }

    pub fn tuning(&self) -> SceneTuning {
        self.tuning
    }

    /// Instantiate an actor from a named emitter asset. Missing or
    /// mismatched asset references disable the feature and return `None`.
    pub fn create_actor(
        &mut self,
        sdk: &EffectsSdk,
        emitter_asset: &str,
        material: MaterialId,
    ) -> Option<ActorId> {
        let Some(asset) = sdk.emitter_asset(emitter_asset) else {
            log::warn!("emitter asset not found: {emitter_asset}");
            return None;
        };
        let Some(integrator) = sdk.integrator_asset(&asset.integrator_asset) else {
            log::warn!("integrator asset not found: {}", asset.integrator_asset);
            return None;
        };
        let Some(output) = sdk.sprite_output_asset(&asset.output_asset) else {
            log::warn!("output asset not found: {}", asset.output_asset);
            return None;
        };

        self.actors.push(EmitterActor {
            position: Vec3::ZERO,
            emitting: false,
            asset: asset.clone(),
            integrator: integrator.clone(),
            output: output.clone(),
            volume: RenderVolume::new(material),
            particles: Vec::new(),
            emit_accumulator: 0.0,
            burst_pending: self.tuning.start_burst,
            rng_state: 0x2545F4914F6CDD1D,
        });
        Some(ActorId(self.actors.len() - 1))
    }

    pub fn actor(&self, id: ActorId) -> &EmitterActor {
        &self.actors[id.0]
    }

    pub fn actor_mut(&mut self, id: ActorId) -> &mut EmitterActor {
        &mut self.actors[id.0]
    }

    pub fn actors_mut(&mut self) -> impl Iterator<Item = &mut EmitterActor> {
        self.actors.iter_mut()
    }

    pub fn particle_count(&self) -> usize {
        self.actors.iter().map(|a| a.particles.len()).sum()
    }

    /// Kick off one simulation step of `step` seconds.
    pub fn simulate(&mut self, step: f32) {
        if self.pending_step.is_some() {
            log::warn!("simulate called before previous results were fetched; step dropped");
            return;
        }
        self.pending_step = Some(step);
    }

    /// Complete the pending step and publish a render snapshot per volume.
    /// A fetch with no pending step is a no-op.
    pub fn fetch_results(&mut self) {
        let Some(step) = self.pending_step.take() else {
            return;
        };
        for actor in &mut self.actors {
            actor.step(step, self.gravity, &self.ground, &self.tuning);
            let snapshot = actor.build_snapshot();
            actor.volume.publish(snapshot);
        }
    }
}

impl Default for EffectsScene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::AssetDef;

    fn scene_with_actor(rate: f32) -> (EffectsScene, ActorId) {
        let mut sdk = EffectsSdk::new();
        sdk.create_asset(
            "test-integrator",
            AssetDef::Integrator(IntegratorAssetParams::default()),
        )
        .unwrap();
        sdk.create_asset(
            "test-sprites",
            AssetDef::SpriteOutput(SpriteOutputAssetParams::default()),
        )
        .unwrap();
        sdk.create_asset(
            "test-emitter",
            AssetDef::Emitter(EmitterAssetParams {
                integrator_asset: "test-integrator".into(),
                output_asset: "test-sprites".into(),
                rate,
                lifetime_secs: 10.0,
                ..Default::default()
            }),
        )
        .unwrap();

        let mut scene = EffectsScene::new();
        // Keep the floor far away so count assertions are not affected by
        // drain.
        scene.set_ground(Ground::Plane { y: -1000.0 });
        let id = scene
            .create_actor(&sdk, "test-emitter", MaterialId(1))
            .unwrap();
        scene.actor_mut(id).set_position(Vec3::new(0.0, 5.0, 0.0));
        scene.actor_mut(id).start_emit(true);
        (scene, id)
    }

    #[test]
    fn emission_rate_matches_step_time() {
        let (mut scene, id) = scene_with_actor(60.0);
        scene.simulate(1.0);
        scene.fetch_results();
        assert_eq!(scene.actor(id).particle_count(), 60);
    }

    #[test]
    fn second_simulate_before_fetch_is_dropped() {
        let (mut scene, id) = scene_with_actor(60.0);
        scene.simulate(1.0);
        scene.simulate(1.0);
        scene.fetch_results();
        // Only one step's worth of emission happened.
        assert_eq!(scene.actor(id).particle_count(), 60);
    }

    #[test]
    fn fetch_without_simulate_is_a_noop() {
        let (mut scene, id) = scene_with_actor(60.0);
        scene.fetch_results();
        assert_eq!(scene.actor(id).particle_count(), 0);
    }

    #[test]
    fn particles_expire_after_their_lifetime() {
        let (mut scene, id) = scene_with_actor(10.0);
        scene.simulate(1.0 / 60.0);
        scene.fetch_results();
        assert!(scene.actor(id).particle_count() > 0);

        // Step far past the lifetime with emission off.
        scene.actor_mut(id).start_emit(false);
        for _ in 0..20 {
            scene.simulate(1.0);
            scene.fetch_results();
        }
        assert_eq!(scene.actor(id).particle_count(), 0);
    }

    #[test]
    fn ground_drains_particles() {
        let (mut scene, id) = scene_with_actor(60.0);
        // Raise the floor to just below the emitter.
        scene.set_ground(Ground::Plane { y: 4.9 });
        scene.simulate(1.0 / 60.0);
        scene.fetch_results();
        scene.actor_mut(id).start_emit(false);

        for _ in 0..120 {
            scene.simulate(1.0 / 60.0);
            scene.fetch_results();
        }
        assert_eq!(scene.actor(id).particle_count(), 0);
    }

    #[test]
    fn missing_asset_reference_disables_actor_creation() {
        let sdk = EffectsSdk::new();
        let mut scene = EffectsScene::new();
        assert!(scene.create_actor(&sdk, "missing", MaterialId(1)).is_none());
    }

    #[test]
    fn snapshot_is_published_to_the_volume() {
        let (mut scene, id) = scene_with_actor(60.0);
        scene.simulate(0.5);
        scene.fetch_results();
        let actor = scene.actor(id);
        assert_eq!(actor.volume().snapshot().len(), actor.particle_count());
    }

    #[test]
    fn start_burst_spawns_on_first_step() {
        let mut sdk = EffectsSdk::new();
        sdk.create_asset(
            "test-integrator",
            AssetDef::Integrator(IntegratorAssetParams::default()),
        )
        .unwrap();
        sdk.create_asset(
            "test-sprites",
            AssetDef::SpriteOutput(SpriteOutputAssetParams::default()),
        )
        .unwrap();
        sdk.create_asset(
            "test-emitter",
            AssetDef::Emitter(EmitterAssetParams {
                integrator_asset: "test-integrator".into(),
                output_asset: "test-sprites".into(),
                rate: 0.0,
                lifetime_secs: 10.0,
                ..Default::default()
            }),
        )
        .unwrap();

        let mut scene = EffectsScene::new();
        scene.set_tuning(SceneTuning {
            start_burst: 32,
            ..Default::default()
        });
        let id = scene
            .create_actor(&sdk, "test-emitter", MaterialId(1))
            .unwrap();
        scene.actor_mut(id).start_emit(true);
        scene.simulate(1.0 / 60.0);
        scene.fetch_results();
        assert_eq!(scene.actor(id).particle_count(), 32);
    }
}
