use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::app::ParticleApp;
use crate::bridge::RenderResourceManager;
use crate::emitter::EmitterOptions;
use crate::gpu::renderer::Renderer;
use crate::heightfield::Heightfield;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Step the simulation and render frames to disk
    Render {
        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Duration in seconds
        #[arg(long, default_value_t = 5.0)]
        duration: f32,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Raw heightfield file to use as the ground
        #[arg(long)]
        heightfield: Option<PathBuf>,

        /// Heightfield side length in samples
        #[arg(long, default_value_t = 257)]
        heightfield_size: u32,

        /// Emitter options JSON file
        #[arg(long)]
        emitter_config: Option<PathBuf>,

        /// Force every emitter tunable to its declared maximum
        #[arg(long)]
        max_stress: bool,
    },
    /// Step the simulation without a GPU and report particle counts
    Simulate {
        /// Duration in seconds
        #[arg(long, default_value_t = 10.0)]
        duration: f32,

        /// Simulated frame rate
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Raw heightfield file to use as the ground
        #[arg(long)]
        heightfield: Option<PathBuf>,

        /// Heightfield side length in samples
        #[arg(long, default_value_t = 257)]
        heightfield_size: u32,

        /// Emitter options JSON file
        #[arg(long)]
        emitter_config: Option<PathBuf>,

        /// Force every emitter tunable to its declared maximum
        #[arg(long)]
        max_stress: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            out,
            fps,
            duration,
            width,
            height,
            heightfield,
            heightfield_size,
            emitter_config,
            max_stress,
        } => {
            let app = build_app(
                emitter_config.as_deref(),
                max_stress,
                heightfield.as_deref(),
                heightfield_size,
            )?;
            pollster::block_on(render_offline(app, out, fps, duration, width, height))?;
        }
        Commands::Simulate {
            duration,
            fps,
            heightfield,
            heightfield_size,
            emitter_config,
            max_stress,
        } => {
            let app = build_app(
                emitter_config.as_deref(),
                max_stress,
                heightfield.as_deref(),
                heightfield_size,
            )?;
            simulate(app, duration, fps);
        }
    }
    Ok(())
}

fn load_options(path: Option<&Path>, max_stress: bool) -> Result<EmitterOptions> {
    let mut options = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        }
        None => EmitterOptions::default(),
    };
    if max_stress {
        options.max_stress = true;
    }
    Ok(options)
}

fn build_app(
    config: Option<&Path>,
    max_stress: bool,
    heightfield: Option<&Path>,
    heightfield_size: u32,
) -> Result<ParticleApp> {
    let options = load_options(config, max_stress)?;
    let mut app = ParticleApp::new(options);

    if let Some(path) = heightfield {
        let hf = Heightfield::load(path, heightfield_size, heightfield_size)?;
        app.install_heightfield(hf);
    }

    if !app.init_particles() {
        log::warn!("emitter unavailable; continuing with ground only");
    }
    Ok(app)
}

fn simulate(mut app: ParticleApp, duration: f32, fps: f32) {
    let dt = 1.0 / fps;
    let total_frames = (duration * fps).ceil() as usize;
    let frames_per_report = fps.ceil() as usize;

    for frame in 0..total_frames {
        if app.advance(dt) {
            app.fetch_results();
        }
        if frame % frames_per_report == frames_per_report - 1 {
            println!(
                "t={:5.1}s  particles={}",
                (frame + 1) as f32 * dt,
                app.particle_count()
            );
        }
    }
    println!("Done. Final particle count: {}", app.particle_count());
}

async fn render_offline(
    mut app: ParticleApp,
    out_dir: PathBuf,
    fps: f32,
    duration: f32,
    width: u32,
    height: u32,
) -> Result<()> {
    let total_frames = (duration * fps).ceil() as usize;
    let dt = 1.0 / fps;

    std::fs::create_dir_all(&out_dir)?;

    // WGPU Init
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None, // Headless
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await?;

    let texture_desc = wgpu::TextureDescriptor {
        label: Some("Target Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    };
    let texture = device.create_texture(&texture_desc);
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Readback buffer with rows padded to the required alignment.
    let u32_size = std::mem::size_of::<u32>() as u32;
    let unpadded_bytes_per_row = u32_size * width;
    let align = 256;
    let padded_bytes_per_row_padding = (align - unpadded_bytes_per_row % align) % align;
    let padded_bytes_per_row = unpadded_bytes_per_row + padded_bytes_per_row_padding;

    let output_buffer_size = (padded_bytes_per_row * height) as wgpu::BufferAddress;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Output Buffer"),
        size: output_buffer_size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut manager = RenderResourceManager::new(device.clone(), queue.clone());
    let mut renderer = Renderer::new(device, queue, texture_desc.format, width, height);
    let ground = app.build_ground_resource(&mut manager);

    println!("Rendering {} frames to {:?}...", total_frames, out_dir);

    for i in 0..total_frames {
        // Fixed order per frame: simulate, fetch, then draw.
        if app.advance(dt) {
            app.fetch_results();
        }
        app.render(&mut renderer, &texture_view, ground.as_ref(), &mut manager);

        // Copy texture to buffer
        let mut encoder = renderer
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            texture_desc.size,
        );
        renderer.queue().submit(Some(encoder.finish()));

        // Map buffer and save
        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| tx.send(v).unwrap());
        renderer.device().poll(wgpu::Maintain::Wait);
        rx.recv()??;

        let data = buffer_slice.get_mapped_range();
        let mut unpadded_data = Vec::with_capacity((width * height * 4) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            let end = start + (width * 4) as usize;
            unpadded_data.extend_from_slice(&data[start..end]);
        }

        let frame_path = out_dir.join(format!("frame_{:05}.png", i));
        image::save_buffer(
            &frame_path,
            &unpadded_data,
            width,
            height,
            image::ColorType::Rgba8,
        )?;

        drop(data);
        output_buffer.unmap();

        if i % 60 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }

    // Symmetric teardown: batches, then the ground's resource and buffers.
    app.release_render_resources(&mut manager);
    if let Some(ground) = ground {
        ground.release(&mut manager);
    }
    let counts = manager.counts();
    log::info!("bridge objects remaining at shutdown: {:?}", counts);

    println!("\nDone.");
    Ok(())
}
