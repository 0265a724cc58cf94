//! One-time particle setup: module acquisition, asset authoring, and
//! emitter actor creation.
//!
//! Every acquisition step can fail without taking the process down: a
//! missing module or asset is logged, the slot stays empty, and later steps
//! skip the feature.

use glam::Vec3;
use serde::Deserialize;

use crate::bridge::MaterialId;
use crate::scene::{ActorId, EffectsScene, SceneTuning};
use crate::sdk::{
    AssetDef, EffectsSdk, EmitterAssetParams, IntegratorAssetParams, ModuleId,
    SpriteOutputAssetParams, MODULE_EMITTER, MODULE_INTEGRATOR, MODULE_SPRITE_OUTPUT,
};

/// Asset names authored by the setup path.
pub const INTEGRATOR_ASSET: &str = "ember-integrator";
pub const SPRITE_OUTPUT_ASSET: &str = "ember-sprites";
pub const EMITTER_ASSET: &str = "sphere-emitter";

/// Setup options, deserializable from a JSON config file.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EmitterOptions {
    /// Force every emitter-module tunable to its declared maximum. A stress
    /// configuration; off unless explicitly requested.
    pub max_stress: bool,
    /// World position of the emitter actor.
    pub position: [f32; 3],
    pub integrator: IntegratorAssetParams,
    pub output: SpriteOutputAssetParams,
    pub emitter: EmitterAssetParams,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            max_stress: false,
            position: [0.0, 5.0, 0.0],
            integrator: IntegratorAssetParams::default(),
            output: SpriteOutputAssetParams::default(),
            emitter: EmitterAssetParams::default(),
        }
    }
}

/// Holds the acquired subsystem modules.
pub struct ParticleSetup {
    integrator_module: Option<ModuleId>,
    output_module: Option<ModuleId>,
    emitter_module: Option<ModuleId>,
}

impl ParticleSetup {
    /// Acquire the three subsystem modules by name and initialize each with
    /// its default configuration.
    pub fn init(sdk: &mut EffectsSdk, options: &EmitterOptions) -> Self {
        let integrator_module = Self::acquire(sdk, MODULE_INTEGRATOR);
        let output_module = Self::acquire(sdk, MODULE_SPRITE_OUTPUT);
        let emitter_module = Self::acquire(sdk, MODULE_EMITTER);

        if options.max_stress {
            if let Some(id) = emitter_module {
                for i in 0..sdk.module(id).parameter_count() {
                    let max = sdk.module(id).parameter(i).expect("index in range").max;
                    sdk.module_mut(id).set_parameter(i, max);
                }
                log::info!("max-stress: emitter tunables forced to their declared maximums");
            }
        }

        Self {
            integrator_module,
            output_module,
            emitter_module,
        }
    }

    fn acquire(sdk: &mut EffectsSdk, name: &str) -> Option<ModuleId> {
        match sdk.create_module(name) {
            Ok(id) => {
                let config = sdk.module(id).default_config();
                sdk.module_mut(id).init(config);
                Some(id)
            }
            Err(err) => {
                log::warn!("module '{name}' unavailable: {err}");
                None
            }
        }
    }

    pub fn integrator_module(&self) -> Option<ModuleId> {
        self.integrator_module
    }

    pub fn output_module(&self) -> Option<ModuleId> {
        self.output_module
    }

    pub fn emitter_module(&self) -> Option<ModuleId> {
        self.emitter_module
    }

    /// Resolve the scene tunables from the acquired modules; absent modules
    /// contribute their defaults.
    pub fn tuning(&self, sdk: &EffectsSdk) -> SceneTuning {
        let mut tuning = SceneTuning::default();
        if let Some(id) = self.emitter_module {
            let module = sdk.module(id);
            if let Some(p) = module.parameter_by_name("rate-scale") {
                tuning.rate_scale = p.value as f32;
            }
            if let Some(p) = module.parameter_by_name("start-burst") {
                tuning.start_burst = p.value as u32;
            }
        }
        if let Some(id) = self.integrator_module {
            if let Some(p) = sdk.module(id).parameter_by_name("substeps") {
                tuning.substeps = p.value as u32;
            }
        }
        tuning
    }

    /// Author the integrator, output, and emitter assets, then instantiate
    /// an actor, place it, and start emission. Any missing piece leaves the
    /// feature disabled and returns `None`.
    pub fn create_emitter(
        &self,
        sdk: &mut EffectsSdk,
        scene: &mut EffectsScene,
        options: &EmitterOptions,
        material: MaterialId,
    ) -> Option<ActorId> {
        if self.integrator_module.is_none()
            || self.output_module.is_none()
            || self.emitter_module.is_none()
        {
            log::warn!("particle modules incomplete; emitter disabled");
            return None;
        }

        if let Err(err) = sdk.create_asset(
            INTEGRATOR_ASSET,
            AssetDef::Integrator(options.integrator.clone()),
        ) {
            log::warn!("integrator asset rejected: {err}");
            return None;
        }
        if let Err(err) = sdk.create_asset(
            SPRITE_OUTPUT_ASSET,
            AssetDef::SpriteOutput(options.output.clone()),
        ) {
            log::warn!("output asset rejected: {err}");
            return None;
        }

        // The emitter asset references the other two by name.
        let mut emitter = options.emitter.clone();
        emitter.integrator_asset = INTEGRATOR_ASSET.to_owned();
        emitter.output_asset = SPRITE_OUTPUT_ASSET.to_owned();
        if let Err(err) = sdk.create_asset(EMITTER_ASSET, AssetDef::Emitter(emitter)) {
            log::warn!("emitter asset rejected: {err}");
            return None;
        }

        scene.set_tuning(self.tuning(sdk));
        let id = scene.create_actor(sdk, EMITTER_ASSET, material)?;
        let actor = scene.actor_mut(id);
        actor.set_position(Vec3::from_array(options.position));
        actor.start_emit(true);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::{Module, SDK_VERSION};

    #[test]
    fn init_acquires_all_builtin_modules() {
        let mut sdk = EffectsSdk::new();
        let setup = ParticleSetup::init(&mut sdk, &EmitterOptions::default());
        assert!(setup.integrator_module().is_some());
        assert!(setup.output_module().is_some());
        assert!(setup.emitter_module().is_some());
    }

    #[test]
    fn wrong_version_module_stays_unacquired() {
        let mut sdk = EffectsSdk::new();
        sdk.register_module(Module::new(MODULE_EMITTER, SDK_VERSION - 1, Vec::new()));

        let setup = ParticleSetup::init(&mut sdk, &EmitterOptions::default());
        assert!(setup.emitter_module().is_none());
        assert!(setup.integrator_module().is_some());

        // Later steps must skip the feature instead of touching the empty
        // slot.
        let mut scene = EffectsScene::new();
        let actor = setup.create_emitter(
            &mut sdk,
            &mut scene,
            &EmitterOptions::default(),
            MaterialId(1),
        );
        assert!(actor.is_none());
    }

    #[test]
    fn max_stress_forces_tunables_to_their_maximums() {
        let mut sdk = EffectsSdk::new();
        let options = EmitterOptions {
            max_stress: true,
            ..Default::default()
        };
        let setup = ParticleSetup::init(&mut sdk, &options);

        let id = setup.emitter_module().unwrap();
        for i in 0..sdk.module(id).parameter_count() {
            let p = sdk.module(id).parameter(i).unwrap();
            assert_eq!(p.value, p.max);
        }

        let tuning = setup.tuning(&sdk);
        assert_eq!(tuning.rate_scale, 8.0);
        assert_eq!(tuning.start_burst, 128);
    }

    #[test]
    fn create_emitter_places_actor_and_starts_emission() {
        let mut sdk = EffectsSdk::new();
        let options = EmitterOptions::default();
        let setup = ParticleSetup::init(&mut sdk, &options);

        let mut scene = EffectsScene::new();
        let id = setup
            .create_emitter(&mut sdk, &mut scene, &options, MaterialId(1))
            .unwrap();

        let actor = scene.actor(id);
        assert_eq!(actor.position(), Vec3::new(0.0, 5.0, 0.0));
        assert!(actor.is_emitting());
    }

    #[test]
    fn invalid_emitter_options_disable_the_feature() {
        let mut sdk = EffectsSdk::new();
        let options = EmitterOptions {
            emitter: EmitterAssetParams {
                lifetime_secs: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let setup = ParticleSetup::init(&mut sdk, &options);
        let mut scene = EffectsScene::new();
        assert!(setup
            .create_emitter(&mut sdk, &mut scene, &options, MaterialId(1))
            .is_none());
    }

    #[test]
    fn options_parse_from_json() {
        let options: EmitterOptions = serde_json::from_str(
            r#"{
                "max_stress": true,
                "position": [1.0, 8.0, 0.0],
                "emitter": { "rate": 500.0, "shape": { "kind": "sphere", "radius": 1.5 } }
            }"#,
        )
        .unwrap();
        assert!(options.max_stress);
        assert_eq!(options.position[1], 8.0);
        assert_eq!(options.emitter.rate, 500.0);
    }
}
