//! Silhouette extrusion for stencil shadow volumes.
//!
//! wgpu has no geometry stage, so the volume of every instance is built on the
//! CPU from the adjacency mesh. Vertices are homogeneous: `w = 1` for points
//! on the caster, `w = 0` for points projected to infinity away from the light.
//! Every emitted triangle is counter-clockwise when seen from outside the
//! volume, which is what the front/back stencil operations rely on.

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::mesh::{AdjacencyMesh, NO_NEIGHBOR, ShadowVertex};

/// Caps and sides start this far behind the caster surface, seen from the light,
/// so they do not z-fight with the depth-primed caster.
pub const VOLUME_OFFSET: f32 = 0.005;

fn faces_light(a: Vec3, b: Vec3, c: Vec3, light: Vec3) -> bool {
    (b - a).cross(c - a).dot(light - a) > 0.0
}

fn near(p: Vec3, light: Vec3) -> ShadowVertex {
    (p + (p - light).normalize_or_zero() * VOLUME_OFFSET).extend(1.0).to_array()
}

fn infinite(p: Vec3, light: Vec3) -> ShadowVertex {
    (p - light).extend(0.0).to_array()
}

/// Appends the closed shadow volume of one instance as a triangle list.
pub fn extrude_instance(mesh: &AdjacencyMesh, model: &Mat4, light: Vec3, out: &mut Vec<ShadowVertex>) {
    let world: Vec<Vec3> = mesh.positions.iter().map(|p| model.transform_point3(*p)).collect();
    let at = |i: u32| world[i as usize];

    for [v0, a01, v1, a12, v2, a20] in mesh.triangles() {
        let (p0, p1, p2) = (at(v0), at(v1), at(v2));

        if !faces_light(p0, p1, p2, light) {
            // back cap, same winding at infinity
            out.extend([infinite(p0, light), infinite(p1, light), infinite(p2, light)]);
            continue;
        }

        // front cap
        out.extend([near(p0, light), near(p1, light), near(p2, light)]);

        for (a, b, adjacent) in [(v0, v1, a01), (v1, v2, a12), (v2, v0, a20)] {
            // the neighbour owns this edge reversed: (b, a, adjacent)
            let silhouette = adjacent == NO_NEIGHBOR || !faces_light(at(a), at(adjacent), at(b), light);
            if !silhouette {
                continue;
            }
            let (pa, pb) = (at(a), at(b));
            out.extend([
                near(pb, light),
                near(pa, light),
                infinite(pa, light),
                near(pb, light),
                infinite(pa, light),
                infinite(pb, light),
            ]);
        }
    }
}

/// Volumes for all instances, extruded in parallel and concatenated in instance order.
pub fn build_shadow_volumes(mesh: &AdjacencyMesh, models: &[Mat4], light: Vec3) -> Vec<ShadowVertex> {
    models
        .par_iter()
        .flat_map_iter(|model| {
            let mut vertices = Vec::with_capacity(mesh.indices.len() * 3);
            extrude_instance(mesh, model, light, &mut vertices);
            vertices
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::create_cube_adjacency;
    use crate::render_pass::StencilPolicy;
    use glam::Vec4;

    const LIGHT: Vec3 = Vec3::new(0.3, 5.0, 0.2);
    const EYE: Vec3 = Vec3::new(7.3, 2.1, 4.7);
    const SHADOWED: Vec3 = Vec3::new(0.12, -0.8, 0.07);
    const LIT: [Vec3; 3] = [
        Vec3::new(2.5, -0.8, 1.3),
        Vec3::new(4.0, 1.5, 2.0),
        Vec3::new(0.31, 3.0, 0.17),
    ];

    fn caster() -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0))
    }

    /// Replaces points at infinity with points far out along the same ray.
    fn finite_triangles(vertices: &[ShadowVertex], light: Vec3) -> Vec<[Vec3; 3]> {
        let resolve = |v: &ShadowVertex| {
            let v = Vec4::from_array(*v);
            if v.w == 0.0 {
                light + v.truncate().normalize() * 500.0
            } else {
                v.truncate() / v.w
            }
        };
        vertices
            .chunks_exact(3)
            .map(|t| [resolve(&t[0]), resolve(&t[1]), resolve(&t[2])])
            .collect()
    }

    fn intersect(origin: Vec3, dir: Vec3, tri: &[Vec3; 3]) -> Option<f32> {
        let e1 = tri[1] - tri[0];
        let e2 = tri[2] - tri[0];
        let p = dir.cross(e2);
        let det = e1.dot(p);
        if det.abs() < 1e-9 {
            return None;
        }
        let s = origin - tri[0];
        let u = s.dot(p) / det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = dir.dot(q) / det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        Some(e2.dot(q) / det)
    }

    /// Net stencil value the volume leaves at the pixel showing `point`.
    fn stencil_count(tris: &[[Vec3; 3]], eye: Vec3, point: Vec3, policy: StencilPolicy) -> i32 {
        let dir = point - eye;
        let mut count = 0;
        for tri in tris {
            let Some(t) = intersect(eye, dir, tri) else {
                continue;
            };
            let front = (tri[1] - tri[0]).cross(tri[2] - tri[0]).dot(dir) < 0.0;
            match policy {
                // face in front of the surface: depth test passes
                StencilPolicy::DepthPass if t > 0.0 && t < 1.0 => count += if front { 1 } else { -1 },
                // face behind the surface: depth test fails
                StencilPolicy::DepthFail if t > 1.0 => count += if front { -1 } else { 1 },
                _ => {}
            }
        }
        count
    }

    fn volume() -> Vec<[Vec3; 3]> {
        let vertices = build_shadow_volumes(&create_cube_adjacency(), &[caster()], LIGHT);
        finite_triangles(&vertices, LIGHT)
    }

    #[test]
    fn volume_is_a_triangle_list() {
        let vertices = build_shadow_volumes(&create_cube_adjacency(), &[caster(), caster()], LIGHT);
        assert_eq!(vertices.len() % 3, 0);
        assert!(vertices.iter().any(|v| v[3] == 0.0));
        assert!(vertices.iter().any(|v| v[3] == 1.0));

        // one cube facing the light with its top face: 2 front, 10 back, 4 side quads
        let single = build_shadow_volumes(&create_cube_adjacency(), &[caster()], LIGHT);
        assert_eq!(single.len(), (2 + 10 + 4 * 2) * 3);
        assert_eq!(vertices.len(), single.len() * 2);
    }

    #[test]
    fn volume_is_closed() {
        // every undirected edge is shared by exactly two triangles, in opposite directions
        let vertices = build_shadow_volumes(&create_cube_adjacency(), &[caster()], LIGHT);
        let key = |v: &ShadowVertex| v.map(f32::to_bits);
        let mut edges = std::collections::HashMap::new();
        for tri in vertices.chunks_exact(3) {
            for k in 0..3 {
                *edges.entry((key(&tri[k]), key(&tri[(k + 1) % 3]))).or_insert(0) += 1;
            }
        }
        for ((a, b), n) in &edges {
            assert_eq!(*n, 1);
            assert_eq!(edges.get(&(*b, *a)), Some(&1));
        }
    }

    #[test]
    fn shadowed_point_counts_non_zero_for_both_policies() {
        let tris = volume();
        for policy in [StencilPolicy::DepthFail, StencilPolicy::DepthPass] {
            assert_ne!(stencil_count(&tris, EYE, SHADOWED, policy), 0, "{policy:?}");
        }
    }

    #[test]
    fn lit_points_count_zero_for_both_policies() {
        let tris = volume();
        for policy in [StencilPolicy::DepthFail, StencilPolicy::DepthPass] {
            for point in LIT {
                assert_eq!(stencil_count(&tris, EYE, point, policy), 0, "{policy:?} {point}");
            }
        }
    }

    #[test]
    fn policies_agree_on_classification() {
        let tris = volume();
        for point in LIT.into_iter().chain([SHADOWED]) {
            let fail = stencil_count(&tris, EYE, point, StencilPolicy::DepthFail) != 0;
            let pass = stencil_count(&tris, EYE, point, StencilPolicy::DepthPass) != 0;
            assert_eq!(fail, pass, "{point}");
        }
    }

    #[test]
    fn depth_fail_survives_eye_inside_volume() {
        let tris = volume();
        let eye = Vec3::new(0.2, -4.0, 0.1);
        assert_ne!(stencil_count(&tris, eye, SHADOWED, StencilPolicy::DepthFail), 0);
        assert_eq!(stencil_count(&tris, eye, LIT[0], StencilPolicy::DepthFail), 0);
        // the naive count breaks here
        assert_ne!(stencil_count(&tris, eye, LIT[0], StencilPolicy::DepthPass), 0);
    }
}
