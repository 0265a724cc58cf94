use bytemuck::{Pod, Zeroable};

use crate::heightfield::Heightfield;
use crate::scene::Ground;

/// Ground mesh vertex. Field order matches the bridge's interleaved layout
/// for position/normal/color, so the whole array doubles as the per-semantic
/// source with a shared stride.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    const fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 24,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Corner of the unit billboard quad, expanded in the vertex shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub corner: [f32; 2],
}

impl QuadVertex {
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

/// The camera-facing quad every sprite instance is expanded from.
pub fn create_billboard_quad() -> (Vec<QuadVertex>, Vec<u16>) {
    let vertices = vec![
        QuadVertex { corner: [-0.5, -0.5] },
        QuadVertex { corner: [0.5, -0.5] },
        QuadVertex { corner: [0.5, 0.5] },
        QuadVertex { corner: [-0.5, 0.5] },
    ];
    let indices = vec![0, 1, 2, 2, 3, 0];
    (vertices, indices)
}

/// A flat ground plane at `y`, centered at the origin.
pub fn create_plane_geometry(half_extent: f32, y: f32) -> (Vec<Vertex>, Vec<u32>) {
    let up = [0.0, 1.0, 0.0];
    let vertices = vec![
        Vertex::new([-half_extent, y, -half_extent], up, [0.32, 0.33, 0.36]),
        Vertex::new([half_extent, y, -half_extent], up, [0.36, 0.37, 0.40]),
        Vertex::new([half_extent, y, half_extent], up, [0.42, 0.43, 0.46]),
        Vertex::new([-half_extent, y, half_extent], up, [0.36, 0.37, 0.40]),
    ];
    let indices = vec![0, 2, 1, 0, 3, 2];
    (vertices, indices)
}

/// Triangulate a heightfield into a decimated grid mesh. The grid is
/// sampled down so neither side exceeds `max_cells` quads.
pub fn create_heightfield_geometry(hf: &Heightfield, max_cells: u32) -> (Vec<Vertex>, Vec<u32>) {
    let step_c = (hf.width() - 1).max(1).div_ceil(max_cells).max(1);
    let step_r = (hf.height() - 1).max(1).div_ceil(max_cells).max(1);
    let cols = (hf.width() - 1) / step_c + 1;
    let rows = (hf.height() - 1) / step_r + 1;

    let half_w = (hf.width() as f32 - 1.0) * 0.5 * hf.horizontal_scale();
    let half_h = (hf.height() as f32 - 1.0) * 0.5 * hf.horizontal_scale();

    let mut vertices = Vec::with_capacity((cols * rows) as usize);
    for r in 0..rows {
        for c in 0..cols {
            let gc = (c * step_c) as i64;
            let gr = (r * step_r) as i64;
            let x = gc as f32 * hf.horizontal_scale() - half_w;
            let z = gr as f32 * hf.horizontal_scale() - half_h;
            let y = hf.sample(gc, gr);

            // Central-difference normal from neighboring samples.
            let dx = hf.sample(gc + step_c as i64, gr) - hf.sample(gc - step_c as i64, gr);
            let dz = hf.sample(gc, gr + step_r as i64) - hf.sample(gc, gr - step_r as i64);
            let n = glam::Vec3::new(-dx, 2.0 * step_c as f32 * hf.horizontal_scale(), -dz)
                .normalize_or_zero();

            // Low ground reads mossy, peaks read rocky.
            let t = ((y + 1.0) * 0.25).clamp(0.0, 1.0);
            let color = [0.25 + 0.35 * t, 0.40 - 0.10 * t, 0.22 + 0.08 * t];

            vertices.push(Vertex::new([x, y, z], n.to_array(), color));
        }
    }

    let mut indices = Vec::with_capacity(((cols - 1) * (rows - 1) * 6) as usize);
    for r in 0..rows - 1 {
        for c in 0..cols - 1 {
            let i0 = r * cols + c;
            let i1 = i0 + 1;
            let i2 = i0 + cols;
            let i3 = i2 + 1;
            indices.extend_from_slice(&[i0, i2, i1, i1, i2, i3]);
        }
    }

    (vertices, indices)
}

/// Geometry for whatever the scene's ground is.
pub fn create_ground_geometry(ground: &Ground) -> (Vec<Vertex>, Vec<u32>) {
    match ground {
        Ground::Plane { y } => create_plane_geometry(24.0, *y),
        Ground::Heightfield(hf) => create_heightfield_geometry(hf, 64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_is_two_triangles() {
        let (vertices, indices) = create_plane_geometry(10.0, -5.0);
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices.len(), 6);
        assert!(vertices.iter().all(|v| v.position[1] == -5.0));
    }

    #[test]
    fn heightfield_grid_is_decimated() {
        let hf = Heightfield::from_samples(129, 129, vec![0; 129 * 129], 0.5, 0.01);
        let (vertices, indices) = create_heightfield_geometry(&hf, 64);
        // 129 samples at step 2 -> 65 per side.
        assert_eq!(vertices.len(), 65 * 65);
        assert_eq!(indices.len(), 64 * 64 * 6);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn billboard_quad_is_indexable() {
        let (vertices, indices) = create_billboard_quad();
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices, vec![0, 1, 2, 2, 3, 0]);
    }
}
