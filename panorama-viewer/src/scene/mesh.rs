//! Mesh generation for panorama surfaces
//!
//! Generates inside-out sphere and open cylinder meshes. Triangles wind
//! counter-clockwise when seen from outside, so front-face culling keeps the
//! interior. Normals point inward and U runs left-to-right for a viewer at the
//! centre.

use bytemuck::{Pod, Zeroable};
use std::f32::consts::{PI, TAU};

/// Vertex for panorama meshes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PanoramaVertex {
    /// Position in world space
    pub position: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
    /// Inward-facing normal
    pub normal: [f32; 3],
}

impl PanoramaVertex {
    /// Size of vertex in bytes
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Vertex buffer layout for wgpu
    pub fn buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // uv
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // normal
                wgpu::VertexAttribute {
                    offset: 20,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Generated mesh data
#[derive(Debug, Clone, PartialEq)]
pub struct PanoramaMesh {
    pub vertices: Vec<PanoramaVertex>,
    pub indices: Vec<u32>,
}

/// Horizontal direction for texture column `u`, with u = 0.5 straight ahead (-Z)
fn column_direction(u: f32) -> (f32, f32) {
    let alpha = (u - 0.5) * TAU;
    (alpha.sin(), -alpha.cos())
}

fn inward_normal(position: [f32; 3]) -> [f32; 3] {
    let [x, y, z] = position;
    let len = (x * x + y * y + z * z).sqrt();
    if len <= f32::EPSILON {
        return [0.0, 0.0, 0.0];
    }
    [-x / len, -y / len, -z / len]
}

/// Two triangles per grid cell, outward counter-clockwise
fn grid_indices(rows: u32, columns: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity((rows * columns * 6) as usize);
    for row in 0..rows {
        for col in 0..columns {
            let top_left = row * (columns + 1) + col;
            let top_right = top_left + 1;
            let bottom_left = top_left + columns + 1;
            let bottom_right = bottom_left + 1;

            indices.extend_from_slice(&[top_left, bottom_left, top_right]);
            indices.extend_from_slice(&[top_right, bottom_left, bottom_right]);
        }
    }
    indices
}

impl PanoramaMesh {
    /// Full sphere with equirectangular mapping.
    ///
    /// Row 0 is the zenith (v = 0), the last row the nadir (v = 1). Columns
    /// start behind the viewer so the image seam sits at +Z.
    pub fn sphere(radius: f32, horiz_segments: u32, vert_segments: u32) -> Self {
        let horiz_segments = horiz_segments.max(8);
        let vert_segments = vert_segments.max(4);
        let mut vertices = Vec::with_capacity(((horiz_segments + 1) * (vert_segments + 1)) as usize);

        for v in 0..=vert_segments {
            let v_coord = v as f32 / vert_segments as f32;
            let phi = v_coord * PI;
            let y = phi.cos() * radius;
            let ring_radius = phi.sin() * radius;

            for h in 0..=horiz_segments {
                // Mirrored: U decreases as the outward angle increases
                let u = 1.0 - h as f32 / horiz_segments as f32;
                let (dx, dz) = column_direction(u);
                let position = [dx * ring_radius, y, dz * ring_radius];

                vertices.push(PanoramaVertex {
                    position,
                    uv: [u, v_coord],
                    normal: inward_normal(position),
                });
            }
        }

        Self {
            vertices,
            indices: grid_indices(vert_segments, horiz_segments),
        }
    }

    /// Open cylinder centred on the origin, no caps
    pub fn cylinder(radius: f32, height: f32, segments: u32) -> Self {
        let segments = segments.max(8);
        let half_height = height * 0.5;
        let mut vertices = Vec::with_capacity(((segments + 1) * 2) as usize);

        for (row, y) in [half_height, -half_height].into_iter().enumerate() {
            for h in 0..=segments {
                let u = 1.0 - h as f32 / segments as f32;
                let (dx, dz) = column_direction(u);
                let position = [dx * radius, y, dz * radius];

                vertices.push(PanoramaVertex {
                    position,
                    uv: [u, row as f32],
                    normal: inward_normal([position[0], 0.0, position[2]]),
                });
            }
        }

        Self {
            vertices,
            indices: grid_indices(1, segments),
        }
    }

    /// Get vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get index count
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn triangle_facing(mesh: &PanoramaMesh) -> Vec<f32> {
        mesh.indices
            .chunks(3)
            .map(|tri| {
                let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(mesh.vertices[i as usize].position));
                let normal = (b - a).cross(c - a);
                let centroid = (a + b + c) / 3.0;
                normal.dot(centroid)
            })
            .collect()
    }

    #[test]
    fn test_sphere_mesh() {
        let mesh = PanoramaMesh::sphere(10.0, 96, 48);
        // (vert_segments + 1) * (horiz_segments + 1) vertices
        assert_eq!(mesh.vertex_count(), 49 * 97);
        // vert_segments * horiz_segments * 2 triangles * 3 indices
        assert_eq!(mesh.index_count(), 48 * 96 * 6);
    }

    #[test]
    fn test_cylinder_mesh() {
        let mesh = PanoramaMesh::cylinder(10.0, 12.0, 96);
        assert_eq!(mesh.vertex_count(), 2 * 97);
        assert_eq!(mesh.index_count(), 96 * 6);
    }

    #[test]
    fn test_winding_is_outward_so_front_culling_keeps_interior() {
        for mesh in [PanoramaMesh::sphere(5.0, 16, 8), PanoramaMesh::cylinder(5.0, 4.0, 16)] {
            let facing = triangle_facing(&mesh);
            assert!(facing.iter().all(|&f| f >= -1e-3));
            assert!(facing.iter().filter(|&&f| f > 1e-3).count() > facing.len() / 2);
        }
    }

    #[test]
    fn test_normals_point_inward() {
        let mesh = PanoramaMesh::sphere(5.0, 16, 8);
        for vertex in &mesh.vertices {
            let p = Vec3::from(vertex.position);
            let n = Vec3::from(vertex.normal);
            assert!(p.dot(n) < 0.0);
        }
    }

    #[test]
    fn test_texture_centre_is_straight_ahead() {
        let mesh = PanoramaMesh::cylinder(10.0, 2.0, 16);
        let centre = mesh
            .vertices
            .iter()
            .find(|v| (v.uv[0] - 0.5).abs() < 1e-6 && v.uv[1] == 0.0)
            .unwrap();
        assert!(centre.position[2] < -9.99);
        assert!(centre.position[0].abs() < 1e-4);

        // Columns to the right of centre have larger U
        let right = mesh
            .vertices
            .iter()
            .find(|v| v.uv[1] == 0.0 && v.uv[0] > 0.5 && v.uv[0] < 0.6)
            .unwrap();
        assert!(right.position[0] > 0.0);
    }
}
