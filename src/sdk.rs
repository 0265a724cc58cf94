//! The effects runtime registry: modules acquired by name, assets authored
//! and looked up by name.
//!
//! Module acquisition mirrors a middleware SDK surface: a create call either
//! returns a handle or a create-error enum. Callers are expected to log the
//! error, leave the slot empty, and treat the feature as disabled; nothing
//! here aborts the process.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

/// Runtime interface version modules are built against.
pub const SDK_VERSION: u32 = 3;

/// Name of the particle integrator module.
pub const MODULE_INTEGRATOR: &str = "particle-integrator";
/// Name of the sprite output module.
pub const MODULE_SPRITE_OUTPUT: &str = "sprite-output";
/// Name of the emitter module.
pub const MODULE_EMITTER: &str = "emitter";

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CreateError {
    #[error("nothing is registered under that name")]
    NotFound,
    #[error("registered against an incompatible runtime version")]
    WrongVersion,
    #[error("descriptor failed validation")]
    InvalidDescriptor,
}

/// An integer tunable exposed by a module, with its declared range.
#[derive(Clone, Debug)]
pub struct ModuleParameter {
    pub name: String,
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

impl ModuleParameter {
    pub fn new(name: &str, value: i64, min: i64, max: i64) -> Self {
        Self {
            name: name.to_owned(),
            value,
            min,
            max,
        }
    }
}

/// Default initialization payload for a module.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub enabled: bool,
}

/// A loadable runtime module.
#[derive(Clone, Debug)]
pub struct Module {
    name: String,
    version: u32,
    initialized: bool,
    parameters: Vec<ModuleParameter>,
}

impl Module {
    pub fn new(name: &str, version: u32, parameters: Vec<ModuleParameter>) -> Self {
        Self {
            name: name.to_owned(),
            version,
            initialized: false,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_config(&self) -> ModuleConfig {
        ModuleConfig { enabled: true }
    }

    pub fn init(&mut self, config: ModuleConfig) {
        self.initialized = config.enabled;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter(&self, index: usize) -> Option<&ModuleParameter> {
        self.parameters.get(index)
    }

    pub fn parameter_by_name(&self, name: &str) -> Option<&ModuleParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Set a tunable, clamped to its declared range.
    pub fn set_parameter(&mut self, index: usize, value: i64) {
        if let Some(p) = self.parameters.get_mut(index) {
            p.value = value.clamp(p.min, p.max);
        }
    }
}

/// Handle to an acquired module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleId(usize);

/// Shape of the emission region.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmitterShape {
    Point,
    Sphere { radius: f32 },
}

impl Default for EmitterShape {
    fn default() -> Self {
        EmitterShape::Sphere { radius: 0.5 }
    }
}

/// Authoring parameters for an integrator asset.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IntegratorAssetParams {
    pub max_particles: u32,
    pub gravity: [f32; 3],
    pub damping: f32,
}

impl Default for IntegratorAssetParams {
    fn default() -> Self {
        Self {
            max_particles: 4096,
            gravity: [0.0, -9.81, 0.0],
            damping: 0.02,
        }
    }
}

impl IntegratorAssetParams {
    pub fn is_valid(&self) -> bool {
        self.max_particles > 0 && (0.0..=1.0).contains(&self.damping)
    }
}

/// Authoring parameters for a sprite output asset: the buffer layout the
/// output stage will request from the render bridge.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SpriteOutputAssetParams {
    pub base_size: f32,
}

impl Default for SpriteOutputAssetParams {
    fn default() -> Self {
        Self { base_size: 0.08 }
    }
}

impl SpriteOutputAssetParams {
    pub fn is_valid(&self) -> bool {
        self.base_size > 0.0
    }
}

/// Authoring parameters for an emitter asset. References the integrator and
/// output assets by name; resolution happens at actor creation.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EmitterAssetParams {
    pub integrator_asset: String,
    pub output_asset: String,
    pub shape: EmitterShape,
    /// Particles emitted per second.
    pub rate: f32,
    pub lifetime_secs: f32,
    pub initial_speed: f32,
    pub color: [f32; 4],
}

impl Default for EmitterAssetParams {
    fn default() -> Self {
        Self {
            integrator_asset: String::new(),
            output_asset: String::new(),
            shape: EmitterShape::default(),
            rate: 300.0,
            lifetime_secs: 3.0,
            initial_speed: 2.0,
            color: [1.0, 0.55, 0.15, 1.0],
        }
    }
}

impl EmitterAssetParams {
    pub fn is_valid(&self) -> bool {
        !self.integrator_asset.is_empty()
            && !self.output_asset.is_empty()
            && self.rate >= 0.0
            && self.lifetime_secs > 0.0
    }
}

/// A named, validated asset held by the registry.
#[derive(Clone, Debug)]
pub enum AssetDef {
    Integrator(IntegratorAssetParams),
    SpriteOutput(SpriteOutputAssetParams),
    Emitter(EmitterAssetParams),
}

impl AssetDef {
    fn is_valid(&self) -> bool {
        match self {
            AssetDef::Integrator(p) => p.is_valid(),
            AssetDef::SpriteOutput(p) => p.is_valid(),
            AssetDef::Emitter(p) => p.is_valid(),
        }
    }
}

/// Module and asset registry.
pub struct EffectsSdk {
    modules: Vec<Module>,
    assets: HashMap<String, AssetDef>,
}

impl EffectsSdk {
    /// A registry with the three built-in modules at the current version.
    pub fn new() -> Self {
        let modules = vec![
            Module::new(
                MODULE_INTEGRATOR,
                SDK_VERSION,
                vec![ModuleParameter::new("substeps", 1, 1, 4)],
            ),
            Module::new(MODULE_SPRITE_OUTPUT, SDK_VERSION, Vec::new()),
            Module::new(
                MODULE_EMITTER,
                SDK_VERSION,
                vec![
                    ModuleParameter::new("rate-scale", 1, 1, 8),
                    ModuleParameter::new("start-burst", 0, 0, 128),
                ],
            ),
        ];
        Self {
            modules,
            assets: HashMap::new(),
        }
    }

    /// Replace or add a module registration. Also the hook tests use to
    /// stage version mismatches.
    pub fn register_module(&mut self, module: Module) {
        if let Some(existing) = self.modules.iter_mut().find(|m| m.name() == module.name()) {
            *existing = module;
        } else {
            self.modules.push(module);
        }
    }

    /// Acquire a module by name.
    pub fn create_module(&mut self, name: &str) -> Result<ModuleId, CreateError> {
        let index = self
            .modules
            .iter()
            .position(|m| m.name() == name)
            .ok_or(CreateError::NotFound)?;
        if self.modules[index].version != SDK_VERSION {
            return Err(CreateError::WrongVersion);
        }
        Ok(ModuleId(index))
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0]
    }

    /// Author an asset under `name`. Validation happens before anything is
    /// stored; an existing asset of the same name is replaced.
    pub fn create_asset(&mut self, name: &str, def: AssetDef) -> Result<(), CreateError> {
        if name.is_empty() || !def.is_valid() {
            return Err(CreateError::InvalidDescriptor);
        }
        self.assets.insert(name.to_owned(), def);
        Ok(())
    }

    pub fn asset(&self, name: &str) -> Option<&AssetDef> {
        self.assets.get(name)
    }

    pub fn integrator_asset(&self, name: &str) -> Option<&IntegratorAssetParams> {
        match self.assets.get(name) {
            Some(AssetDef::Integrator(p)) => Some(p),
            _ => None,
        }
    }

    pub fn sprite_output_asset(&self, name: &str) -> Option<&SpriteOutputAssetParams> {
        match self.assets.get(name) {
            Some(AssetDef::SpriteOutput(p)) => Some(p),
            _ => None,
        }
    }

    pub fn emitter_asset(&self, name: &str) -> Option<&EmitterAssetParams> {
        match self.assets.get(name) {
            Some(AssetDef::Emitter(p)) => Some(p),
            _ => None,
        }
    }
}

impl Default for EffectsSdk {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_modules_resolve_by_name() {
        let mut sdk = EffectsSdk::new();
        let id = sdk.create_module(MODULE_EMITTER).unwrap();
        assert_eq!(sdk.module(id).name(), MODULE_EMITTER);
        assert_eq!(
            sdk.create_module("fracture").unwrap_err(),
            CreateError::NotFound
        );
    }

    #[test]
    fn version_mismatch_is_reported() {
        let mut sdk = EffectsSdk::new();
        sdk.register_module(Module::new(MODULE_EMITTER, SDK_VERSION - 1, Vec::new()));
        assert_eq!(
            sdk.create_module(MODULE_EMITTER).unwrap_err(),
            CreateError::WrongVersion
        );
    }

    #[test]
    fn parameters_clamp_to_declared_range() {
        let mut sdk = EffectsSdk::new();
        let id = sdk.create_module(MODULE_EMITTER).unwrap();
        sdk.module_mut(id).set_parameter(0, 99);
        assert_eq!(sdk.module(id).parameter(0).unwrap().value, 8);
    }

    #[test]
    fn invalid_asset_params_are_rejected_before_storage() {
        let mut sdk = EffectsSdk::new();
        let bad = EmitterAssetParams {
            lifetime_secs: 0.0,
            integrator_asset: "i".into(),
            output_asset: "o".into(),
            ..Default::default()
        };
        assert_eq!(
            sdk.create_asset("emitter", AssetDef::Emitter(bad)).unwrap_err(),
            CreateError::InvalidDescriptor
        );
        assert!(sdk.asset("emitter").is_none());
    }

    #[test]
    fn assets_resolve_by_name_and_kind() {
        let mut sdk = EffectsSdk::new();
        sdk.create_asset(
            "ember-integrator",
            AssetDef::Integrator(IntegratorAssetParams::default()),
        )
        .unwrap();
        assert!(sdk.integrator_asset("ember-integrator").is_some());
        assert!(sdk.emitter_asset("ember-integrator").is_none());
    }
}
