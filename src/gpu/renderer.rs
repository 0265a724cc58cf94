//! Frame renderer: issues this frame's draw calls against the bridge's
//! render resources.
//!
//! Per frame the renderer locks each emitter volume, lets it update its
//! batch buffers, records dispatches for every bound resource, and unlocks.
//! The lock guards are held across dispatch and released afterwards on
//! every path.

use std::iter;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::bridge::{MaterialId, RenderResource, RenderResourceManager};
use crate::gpu::mesh;
use crate::gpu::pipeline;
use crate::scene::EffectsScene;
use crate::volume::VolumeGuard;

/// Material the ground resource is tagged with.
pub const MATERIAL_GROUND: MaterialId = MaterialId(1);
/// Material the sprite batches are tagged with.
pub const MATERIAL_PARTICLES: MaterialId = MaterialId(2);

/// Orbit-style look-at camera.
#[derive(Clone, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fovy_degrees: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(12.0, 7.0, 12.0),
            target: Vec3::new(0.0, 2.0, 0.0),
            up: Vec3::Y,
            fovy_degrees: 45.0,
            znear: 0.1,
            zfar: 300.0,
        }
    }
}

impl Camera {
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let proj =
            Mat4::perspective_rh(self.fovy_degrees.to_radians(), aspect, self.znear, self.zfar);
        let view = Mat4::look_at_rh(self.eye, self.target, self.up);
        proj * view
    }

    fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize_or_zero()
    }

    /// World-space right vector, for billboard expansion.
    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize_or_zero()
    }

    /// World-space up vector orthogonal to the view direction.
    pub fn billboard_up(&self) -> Vec3 {
        self.right().cross(self.forward()).normalize_or_zero()
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct GroundUniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
}

/// Matches shader_sprite.wgsl SpriteUniforms.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct SpriteUniforms {
    view_proj: [[f32; 4]; 4],
    camera_right: [f32; 4],
    camera_up: [f32; 4],
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    size: wgpu::Extent3d,

    ground_pipeline: wgpu::RenderPipeline,
    ground_uniform_buffer: wgpu::Buffer,
    ground_bind_group: wgpu::BindGroup,

    sprite_pipeline: wgpu::RenderPipeline,
    sprite_uniform_buffer: wgpu::Buffer,
    sprite_bind_group: wgpu::BindGroup,
    quad_vertex_buffer: wgpu::Buffer,
    quad_index_buffer: wgpu::Buffer,

    camera: Camera,
}

impl Renderer {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let uniform_layout_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        // === Ground pipeline ===

        let ground_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[uniform_layout_entry(0)],
                label: Some("ground_bind_group_layout"),
            });

        let ground_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ground Uniform Buffer"),
            size: std::mem::size_of::<GroundUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let ground_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &ground_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: ground_uniform_buffer.as_entire_binding(),
            }],
            label: Some("ground_bind_group"),
        });

        let ground_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Ground Pipeline Layout"),
                bind_group_layouts: &[&ground_bind_group_layout],
                push_constant_ranges: &[],
            });
        let ground_pipeline =
            pipeline::create_ground_pipeline(&device, &ground_pipeline_layout, format);

        // === Sprite pipeline ===

        let sprite_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[uniform_layout_entry(0)],
                label: Some("sprite_bind_group_layout"),
            });

        let sprite_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sprite Uniform Buffer"),
            size: std::mem::size_of::<SpriteUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sprite_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &sprite_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: sprite_uniform_buffer.as_entire_binding(),
            }],
            label: Some("sprite_bind_group"),
        });

        let sprite_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Sprite Pipeline Layout"),
                bind_group_layouts: &[&sprite_bind_group_layout],
                push_constant_ranges: &[],
            });
        let sprite_pipeline =
            pipeline::create_sprite_pipeline(&device, &sprite_pipeline_layout, format);

        let (quad_vertices, quad_indices) = mesh::create_billboard_quad();
        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Billboard Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&quad_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Billboard Quad Index Buffer"),
            contents: bytemuck::cast_slice(&quad_indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            device,
            queue,
            size,
            ground_pipeline,
            ground_uniform_buffer,
            ground_bind_group,
            sprite_pipeline,
            sprite_uniform_buffer,
            sprite_bind_group,
            quad_vertex_buffer,
            quad_index_buffer,
            camera: Camera::default(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size.width = width.max(1);
        self.size.height = height.max(1);
    }

    /// Record and submit one frame: ground first, then every emitter
    /// volume's batches. Volumes are locked before their buffers are
    /// touched and unlocked when the guards drop, after dispatch.
    pub fn render(
        &mut self,
        view: &wgpu::TextureView,
        scene: &mut EffectsScene,
        ground: Option<&RenderResource>,
        manager: &mut RenderResourceManager,
    ) {
        let aspect = self.size.width as f32 / self.size.height as f32;
        let view_proj = self.camera.view_projection(aspect).to_cols_array_2d();

        let ground_uniforms = GroundUniforms {
            view_proj,
            model: Mat4::IDENTITY.to_cols_array_2d(),
        };
        self.queue.write_buffer(
            &self.ground_uniform_buffer,
            0,
            bytemuck::bytes_of(&ground_uniforms),
        );

        let right = self.camera.right();
        let up = self.camera.billboard_up();
        let sprite_uniforms = SpriteUniforms {
            view_proj,
            camera_right: [right.x, right.y, right.z, 0.0],
            camera_up: [up.x, up.y, up.z, 0.0],
        };
        self.queue.write_buffer(
            &self.sprite_uniform_buffer,
            0,
            bytemuck::bytes_of(&sprite_uniforms),
        );

        // Lock and update every volume, then dispatch while the locks are
        // held.
        let mut guards: Vec<VolumeGuard<'_>> = Vec::new();
        for actor in scene.actors_mut() {
            let mut guard = actor.volume_mut().lock();
            guard.update(manager);
            guards.push(guard);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.012,
                            g: 0.016,
                            b: 0.028,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(resource) = ground {
                self.draw_resource(&mut pass, resource);
            }
            for guard in &guards {
                for resource in guard.resources() {
                    self.draw_resource(&mut pass, resource);
                }
            }
        }

        self.queue.submit(iter::once(encoder.finish()));
        drop(guards);
    }

    /// Issue the draw calls for one render resource, selected by material.
    fn draw_resource(&self, pass: &mut wgpu::RenderPass<'_>, resource: &RenderResource) {
        match resource.material() {
            Some(MATERIAL_PARTICLES) => {
                let Some(sprites) = resource.sprite_buffer() else {
                    return;
                };
                let range = resource.sprite_range();
                if range.count == 0 {
                    return;
                }
                debug_assert_eq!(sprites.stride(), 32, "sprite layout drifted from pipeline");

                pass.set_pipeline(&self.sprite_pipeline);
                pass.set_bind_group(0, &self.sprite_bind_group, &[]);
                pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
                pass.set_vertex_buffer(1, sprites.raw().slice(..));
                pass.set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(0..6, 0, range.first..range.first + range.count);
            }
            Some(MATERIAL_GROUND) => {
                let Some(vertices) = resource.vertex_buffer(0) else {
                    return;
                };
                pass.set_pipeline(&self.ground_pipeline);
                pass.set_bind_group(0, &self.ground_bind_group, &[]);
                pass.set_vertex_buffer(0, vertices.raw().slice(..));
                if let Some(indices) = resource.index_buffer() {
                    let range = resource.index_range();
                    pass.set_index_buffer(indices.raw().slice(..), indices.wgpu_format());
                    pass.draw_indexed(range.first..range.first + range.count, 0, 0..1);
                } else {
                    let range = resource.vertex_range();
                    pass.draw(range.first..range.first + range.count, 0..1);
                }
            }
            other => {
                log::debug!("skipping resource with unmapped material {other:?}");
            }
        }
    }
}
