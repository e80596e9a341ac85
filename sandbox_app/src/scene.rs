//! Scene data: the cube mesh, its uniforms and the orbit camera

use bytemuck::{Pod, Zeroable};
use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, Rotation3, Vector3};
use render_device::prelude::VertexFormat;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Attribute layout matching `scene.vert`
    pub const FORMATS: [VertexFormat; 3] = [VertexFormat::Float3, VertexFormat::Float3, VertexFormat::Float2];
}

/// Per-frame uniform block of `scene.vert`/`scene.frag`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SceneUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub light_dir: [f32; 4],
    pub camera_pos: [f32; 4],
}

/// Unit cube with per-face normals and UVs
pub fn cube() -> (Vec<Vertex>, Vec<u16>) {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, tangent, bitangent) in faces {
        let base = vertices.len() as u16;
        for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let (su, sv) = (u * 2.0 - 1.0, v * 2.0 - 1.0);
            let position = [
                0.5 * (normal[0] + su * tangent[0] + sv * bitangent[0]),
                0.5 * (normal[1] + su * tangent[1] + sv * bitangent[1]),
                0.5 * (normal[2] + su * tangent[2] + sv * bitangent[2]),
            ];
            vertices.push(Vertex {
                position,
                normal,
                uv: [u, 1.0 - v],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// RGBA8 checkerboard used when no albedo texture is configured
pub fn checkerboard(size: u32, cells: u32) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut texels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let value = if light { 220 } else { 40 };
            texels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    texels
}

/// Camera orbiting the origin
pub struct OrbitCamera {
    pub distance: f32,
    pub height: f32,
    pub fov_y: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            distance: 3.0,
            height: 1.2,
            fov_y: std::f32::consts::FRAC_PI_4,
        }
    }
}

impl OrbitCamera {
    pub fn uniforms(&self, time: f32, aspect: f32) -> SceneUniforms {
        let eye = Point3::new(0.0, self.height, self.distance);
        let view = Isometry3::look_at_rh(&eye, &Point3::origin(), &Vector3::y()).to_homogeneous();

        let mut proj = Perspective3::new(aspect.max(1e-3), self.fov_y, 0.1, 100.0).to_homogeneous();
        // Vulkan clip space has Y pointing down
        proj[(1, 1)] *= -1.0;

        let model: Matrix4<f32> = Rotation3::from_euler_angles(time * 0.3, time * 0.7, 0.0).to_homogeneous();
        let light = Vector3::new(-0.4, -1.0, -0.6).normalize();

        SceneUniforms {
            view_proj: (proj * view).into(),
            model: model.into(),
            light_dir: [light.x, light.y, light.z, 0.0],
            camera_pos: [eye.x, eye.y, eye.z, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_has_24_vertices_and_12_triangles() {
        let (vertices, indices) = cube();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
        assert!(vertices
            .iter()
            .all(|v| v.position.iter().all(|c| (c.abs() - 0.5).abs() < 1e-6)));
    }

    #[test]
    fn test_checkerboard_alternates() {
        let texels = checkerboard(4, 2);
        assert_eq!(texels.len(), 4 * 4 * 4);
        assert_eq!(texels[0], 220);
        assert_eq!(texels[2 * 4], 40);
    }

    #[test]
    fn test_uniforms_size_matches_std140_block() {
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 160);
    }
}
