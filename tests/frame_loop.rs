//! GPU-free end-to-end checks of the frame loop contract: fixed stepping,
//! simulate/fetch ordering, emitter setup, and descriptor math.
//!
//! Run with: cargo test --test frame_loop

use embers::app::ParticleApp;
use embers::bridge::{DataFormat, VertexBufferDesc, VertexSemantic};
use embers::emitter::EmitterOptions;
use embers::heightfield::Heightfield;
use embers::scene::Ground;
use embers::sdk::{EffectsSdk, Module, MODULE_EMITTER, SDK_VERSION};

fn default_app() -> ParticleApp {
    let mut app = ParticleApp::new(EmitterOptions::default());
    assert!(app.init_particles());
    app
}

#[test]
fn sub_step_deltas_accumulate_into_exactly_one_tick() {
    let mut app = default_app();

    // 1/60 s delivered as two exact halves: the first call reports no step,
    // the second reports the step, and results are fetched only then.
    let mut steps = 0;
    for _ in 0..2 {
        if app.advance(1.0 / 120.0) {
            app.fetch_results();
            steps += 1;
        }
    }
    assert_eq!(steps, 1);
    assert!(app.particle_count() > 0);
}

#[test]
fn deltas_below_one_step_do_no_simulation_work() {
    let mut app = default_app();
    for _ in 0..5 {
        assert!(!app.advance(1.0 / 600.0));
    }
    assert_eq!(app.particle_count(), 0);
}

#[test]
fn long_runs_keep_the_population_bounded_by_lifetime() {
    let mut app = default_app();
    let mut last_count = 0;
    for _ in 0..1200 {
        if app.advance(1.0 / 60.0) {
            app.fetch_results();
        }
        last_count = app.particle_count();
    }
    // rate * lifetime bounds the steady-state population.
    assert!(last_count > 0);
    assert!(last_count <= 4096);
}

#[test]
fn wrong_version_module_disables_particles_without_aborting() {
    let mut sdk = EffectsSdk::new();
    sdk.register_module(Module::new(MODULE_EMITTER, SDK_VERSION - 1, Vec::new()));
    let mut app = ParticleApp::with_sdk(sdk, EmitterOptions::default());

    assert!(!app.init_particles());
    for _ in 0..10 {
        if app.advance(1.0 / 60.0) {
            app.fetch_results();
        }
    }
    assert_eq!(app.particle_count(), 0);
}

#[test]
fn heightfield_ground_drains_particles_at_terrain_height() {
    // A bowl-shaped floor right under the emitter.
    let hf = Heightfield::from_samples(3, 3, vec![100, 100, 100, 100, 0, 100, 100, 100, 100], 8.0, 0.04);
    let mut app = ParticleApp::new(EmitterOptions::default());
    app.install_heightfield(hf);
    assert!(app.init_particles());

    for _ in 0..600 {
        if app.advance(1.0 / 60.0) {
            app.fetch_results();
        }
    }
    // Fallen particles drained on the terrain instead of accumulating
    // forever below it.
    let floor = match app.scene().ground() {
        Ground::Heightfield(hf) => hf.height_at(0.0, 0.0),
        Ground::Plane { y } => *y,
    };
    for position in &app
        .scene()
        .actor(app.emitter().unwrap())
        .volume()
        .snapshot()
        .positions
    {
        assert!(position[1] >= floor - 1e-3);
    }
}

#[test]
fn position_normal_texcoord_descriptor_matches_expected_sizes() {
    let desc = VertexBufferDesc {
        max_verts: 24,
        ..Default::default()
    }
    .with(VertexSemantic::Position, DataFormat::Float3)
    .with(VertexSemantic::Normal, DataFormat::Float3)
    .with(VertexSemantic::TexCoord0, DataFormat::Float2);

    assert!(desc.is_valid());
    let stride = desc.interleaving().stride();
    assert_eq!(stride, 32);
    assert_eq!(stride * desc.max_verts as usize, 768);
}
