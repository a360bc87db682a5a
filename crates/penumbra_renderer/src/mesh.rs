use std::collections::HashMap;
use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

/// Adjacency slot with no neighbouring triangle (open edge).
pub const NO_NEIGHBOR: u32 = u32::MAX;

// 1. The GPU-Compatible Vertex
// #[repr(C)] ensures C-like memory layout (needed for graphics drivers)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4], // .w = bitangent sign
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0, // @location(0) in shader
                    format: wgpu::VertexFormat::Float32x3, // position
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: (mem::size_of::<[f32; 3]>() * 2) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: (mem::size_of::<[f32; 3]>() * 2 + mem::size_of::<[f32; 4]>()) as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Homogeneous world-space position of an extruded shadow-volume vertex.
pub type ShadowVertex = [f32; 4];

pub fn shadow_vertex_desc() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: mem::size_of::<ShadowVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x4,
        }],
    }
}

#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Positions plus triangle-with-adjacency indices, six per triangle:
/// `v0, adj01, v1, adj12, v2, adj20`.
#[derive(Clone, Debug, Default)]
pub struct AdjacencyMesh {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl AdjacencyMesh {
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 6]> + '_ {
        self.indices
            .chunks_exact(6)
            .map(|c| [c[0], c[1], c[2], c[3], c[4], c[5]])
    }
}

/// Annotates a plain triangle list with the vertex opposite each edge.
pub fn build_adjacency(indices: &[u32]) -> Vec<u32> {
    let mut opposite: HashMap<(u32, u32), u32> = HashMap::new();
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]];
        opposite.insert((a, b), c);
        opposite.insert((b, c), a);
        opposite.insert((c, a), b);
    }

    // The neighbour across directed edge (a, b) owns the edge as (b, a)
    let across = |a: u32, b: u32| opposite.get(&(b, a)).copied().unwrap_or(NO_NEIGHBOR);

    let mut adjacency = Vec::with_capacity(indices.len() * 2);
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]];
        adjacency.extend_from_slice(&[a, across(a, b), b, across(b, c), c, across(c, a)]);
    }
    adjacency
}

// (normal, u, v) with u x v = normal
const CUBE_FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

// Corner order around a face, counter-clockwise seen from outside
const FACE_CORNERS: [(f32, f32, [f32; 2]); 4] = [
    (-0.5, -0.5, [0.0, 1.0]),
    (0.5, -0.5, [1.0, 1.0]),
    (0.5, 0.5, [1.0, 0.0]),
    (-0.5, 0.5, [0.0, 0.0]),
];

const FACE_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

fn face_vertices(normal: Vec3, u: Vec3, v: Vec3, center: Vec3) -> impl Iterator<Item = Vertex> {
    FACE_CORNERS.into_iter().map(move |(su, sv, uv)| Vertex {
        position: (center + u * su + v * sv).to_array(),
        normal: normal.to_array(),
        tangent: u.extend(1.0).to_array(),
        uv,
    })
}

/// Unit quad in the XZ plane facing +Y.
pub fn create_quad() -> MeshData {
    MeshData {
        vertices: face_vertices(Vec3::Y, Vec3::X, Vec3::NEG_Z, Vec3::ZERO).collect(),
        indices: FACE_INDICES.to_vec(),
    }
}

/// Unit cube centred at the origin, 4 vertices per face.
pub fn create_cube() -> MeshData {
    let mut mesh = MeshData::default();
    for (face, (normal, u, v)) in CUBE_FACES.into_iter().enumerate() {
        mesh.vertices.extend(face_vertices(normal, u, v, normal * 0.5));
        mesh.indices
            .extend(FACE_INDICES.iter().map(|i| i + face as u32 * 4));
    }
    mesh
}

/// The same cube as eight shared corners, with adjacency.
pub fn create_cube_adjacency() -> AdjacencyMesh {
    let corner = |p: Vec3| (p.x > 0.0) as u32 | ((p.y > 0.0) as u32) << 1 | ((p.z > 0.0) as u32) << 2;

    let positions = (0..8u32)
        .map(|i| Vec3::new((i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32) - Vec3::splat(0.5))
        .collect();

    let mut triangles = Vec::with_capacity(36);
    for (normal, u, v) in CUBE_FACES {
        let quad: Vec<u32> = face_vertices(normal, u, v, normal * 0.5)
            .map(|vertex| corner(Vec3::from_array(vertex.position)))
            .collect();
        triangles.extend(FACE_INDICES.iter().map(|&i| quad[i as usize]));
    }

    AdjacencyMesh {
        positions,
        indices: build_adjacency(&triangles),
    }
}

pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, data: &MeshData, label: &str) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
        (b - a).cross(c - a)
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(mem::size_of::<Vertex>(), 48);
        let desc = Vertex::desc();
        assert_eq!(desc.attributes[3].offset, 40);
    }

    #[test]
    fn quad_faces_up() {
        let quad = create_quad();
        assert_eq!(quad.indices.len(), 6);
        for tri in quad.indices.chunks_exact(3) {
            let p = |i: u32| Vec3::from_array(quad.vertices[i as usize].position);
            let n = triangle_normal(p(tri[0]), p(tri[1]), p(tri[2]));
            assert!(n.y > 0.0);
        }
    }

    #[test]
    fn cube_triangles_wind_outward() {
        let cube = create_cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for tri in cube.indices.chunks_exact(3) {
            let v = |i: u32| cube.vertices[i as usize];
            let p = |i: u32| Vec3::from_array(v(i).position);
            let n = triangle_normal(p(tri[0]), p(tri[1]), p(tri[2])).normalize();
            let expected = Vec3::from_array(v(tri[0]).normal);
            assert_relative_eq!(n.dot(expected), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn cube_adjacency_is_closed() {
        let mesh = create_cube_adjacency();
        assert_eq!(mesh.positions.len(), 8);
        assert_eq!(mesh.index_count(), 72);

        for [v0, a01, v1, a12, v2, a20] in mesh.triangles() {
            for (edge, adj) in [((v0, v1), a01), ((v1, v2), a12), ((v2, v0), a20)] {
                assert_ne!(adj, NO_NEIGHBOR);
                // some triangle contains the reversed edge and the adjacent vertex
                let found = mesh.triangles().any(|[w0, _, w1, _, w2, _]| {
                    let tri = [w0, w1, w2];
                    (0..3).any(|k| tri[k] == edge.1 && tri[(k + 1) % 3] == edge.0 && tri[(k + 2) % 3] == adj)
                });
                assert!(found, "edge {edge:?} adj {adj}");
            }
        }
    }

    #[test]
    fn cube_adjacency_winds_outward() {
        let mesh = create_cube_adjacency();
        for [v0, _, v1, _, v2, _] in mesh.triangles() {
            let p = |i: u32| mesh.positions[i as usize];
            let n = triangle_normal(p(v0), p(v1), p(v2));
            let centroid = (p(v0) + p(v1) + p(v2)) / 3.0;
            assert!(n.dot(centroid) > 0.0);
        }
    }

    #[test]
    fn open_edges_have_no_neighbor() {
        let adjacency = build_adjacency(&[0, 1, 2]);
        assert_eq!(adjacency, vec![0, NO_NEIGHBOR, 1, NO_NEIGHBOR, 2, NO_NEIGHBOR]);
    }
}
