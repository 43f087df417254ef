use glam::{Quat, Vec3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::shape::{Aabb, CollisionShape, ShapeGeometry};

/// Contacts closer than this are generated ahead of time so resting bodies keep their support.
pub const CONTACT_MARGIN: f32 = 0.02;

/// Half-thickness given to triangle mesh surfaces.
const MESH_THICKNESS: f32 = 0.05;

const RIM_SAMPLES: usize = 8;

/// Contact between two proxies. `normal` points from `b` towards `a`.
#[derive(Debug, Clone, Copy)]
pub struct ContactPoint {
    pub a: usize,
    pub b: usize,
    pub point: Vec3,
    pub normal: Vec3,
    /// Positive when penetrating, negative while still separated.
    pub depth: f32,
}

/// Scaled, body-local geometry used for contact generation.
///
/// Every proxy is described by a set of sample spheres tested against the
/// other proxy's distance function, both ways round.
#[derive(Debug, Clone)]
pub enum ContactGeometry {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Capsule { radius: f32, half_length: f32 },
    Cylinder { radius: f32, half_height: f32 },
    Cone { radius: f32, half_height: f32 },
    Hull { center: Vec3, half_extents: Vec3, vertices: Vec<Vec3>, margin: f32 },
    Mesh { triangles: Vec<[Vec3; 3]>, vertices: Vec<Vec3> },
}

impl ContactGeometry {
    pub fn from_shape(shape: &CollisionShape, scale: Vec3) -> Self {
        let scale = scale.abs();
        let radial = scale.x.max(scale.y);
        match &shape.geometry {
            ShapeGeometry::Box { half_extents } => ContactGeometry::Box {
                half_extents: *half_extents * scale,
            },
            ShapeGeometry::Sphere { radius } => ContactGeometry::Sphere {
                radius: radius * scale.max_element(),
            },
            ShapeGeometry::Capsule { radius, height } => ContactGeometry::Capsule {
                radius: radius * radial,
                half_length: 0.5 * height * scale.z,
            },
            ShapeGeometry::Cylinder {
                radius,
                half_height,
            } => ContactGeometry::Cylinder {
                radius: radius * radial,
                half_height: half_height * scale.z,
            },
            ShapeGeometry::Cone { radius, height } => ContactGeometry::Cone {
                radius: radius * radial,
                half_height: 0.5 * height * scale.z,
            },
            ShapeGeometry::ConvexHull { vertices } => {
                let vertices: Vec<Vec3> = vertices.iter().map(|v| *v * scale).collect();
                let bounds = Aabb::from_points(&vertices).expanded(shape.margin);
                ContactGeometry::Hull {
                    center: bounds.center(),
                    half_extents: bounds.extent(),
                    vertices,
                    margin: shape.margin,
                }
            }
            ShapeGeometry::TriangleMesh { mesh, .. } => {
                let vertices: Vec<Vec3> = mesh.vertices.iter().map(|v| *v * scale).collect();
                let triangles = mesh
                    .triangles
                    .iter()
                    .filter_map(|tri| {
                        Some([
                            *vertices.get(tri[0] as usize)?,
                            *vertices.get(tri[1] as usize)?,
                            *vertices.get(tri[2] as usize)?,
                        ])
                    })
                    .collect();
                ContactGeometry::Mesh {
                    triangles,
                    vertices,
                }
            }
        }
    }

    /// Local sample spheres as `(center, radius)`.
    pub fn samples(&self) -> Vec<(Vec3, f32)> {
        match self {
            ContactGeometry::Box { half_extents } => (0..8)
                .map(|i| {
                    let sign = Vec3::new(
                        if i & 1 == 0 { -1.0 } else { 1.0 },
                        if i & 2 == 0 { -1.0 } else { 1.0 },
                        if i & 4 == 0 { -1.0 } else { 1.0 },
                    );
                    (*half_extents * sign, 0.0)
                })
                .collect(),
            ContactGeometry::Sphere { radius } => vec![(Vec3::ZERO, *radius)],
            ContactGeometry::Capsule {
                radius,
                half_length,
            } => vec![
                (Vec3::new(0.0, 0.0, -half_length), *radius),
                (Vec3::ZERO, *radius),
                (Vec3::new(0.0, 0.0, *half_length), *radius),
            ],
            ContactGeometry::Cylinder {
                radius,
                half_height,
            } => {
                let mut samples = rim(*radius, -half_height);
                samples.extend(rim(*radius, *half_height));
                samples
            }
            ContactGeometry::Cone {
                radius,
                half_height,
            } => {
                let mut samples = rim(*radius, -half_height);
                samples.push((Vec3::new(0.0, 0.0, *half_height), 0.0));
                samples
            }
            ContactGeometry::Hull {
                vertices, margin, ..
            } => vertices.iter().map(|v| (*v, *margin)).collect(),
            ContactGeometry::Mesh { vertices, .. } => {
                vertices.iter().map(|v| (*v, 0.0)).collect()
            }
        }
    }

    /// Signed distance from a local point to the surface, with the outward normal.
    pub fn distance(&self, p: Vec3) -> (f32, Vec3) {
        match self {
            ContactGeometry::Box { half_extents } => box_distance(p, *half_extents),
            ContactGeometry::Sphere { radius } => {
                let len = p.length();
                let normal = if len > 1e-6 { p / len } else { Vec3::Z };
                (len - radius, normal)
            }
            ContactGeometry::Capsule {
                radius,
                half_length,
            } => {
                let closest = Vec3::new(0.0, 0.0, p.z.clamp(-half_length, *half_length));
                let offset = p - closest;
                let len = offset.length();
                let normal = if len > 1e-6 {
                    offset / len
                } else {
                    Vec3::Z * p.z.signum()
                };
                (len - radius, normal)
            }
            ContactGeometry::Cylinder {
                radius,
                half_height,
            } => cylinder_distance(p, *radius, *half_height, 1.0, 0.0),
            ContactGeometry::Cone {
                radius,
                half_height,
            } => {
                let height = 2.0 * half_height;
                let slant = (radius * radius + height * height).sqrt().max(1e-6);
                let t = ((half_height - p.z) / height.max(1e-6)).clamp(0.0, 1.0);
                cylinder_distance(p, radius * t, *half_height, height / slant, radius / slant)
            }
            ContactGeometry::Hull {
                center,
                half_extents,
                ..
            } => box_distance(p - *center, *half_extents),
            ContactGeometry::Mesh { triangles, .. } => {
                let mut best = (f32::MAX, Vec3::Z);
                for tri in triangles {
                    let closest = closest_point_on_triangle(p, tri);
                    let offset = p - closest;
                    let len = offset.length();
                    if len < best.0 {
                        let normal = if len > 1e-6 {
                            offset / len
                        } else {
                            (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize_or_zero()
                        };
                        best = (len, normal);
                    }
                }
                (best.0 - MESH_THICKNESS, best.1)
            }
        }
    }
}

/// Body pose plus contact geometry for one simulated body.
#[derive(Debug, Clone)]
pub struct CollisionProxy {
    pub position: Vec3,
    pub rotation: Quat,
    pub geometry: ContactGeometry,
    samples: Vec<(Vec3, f32)>,
}

impl CollisionProxy {
    pub fn new(geometry: ContactGeometry, position: Vec3, rotation: Quat) -> Self {
        let samples = geometry.samples();
        Self {
            position,
            rotation,
            geometry,
            samples,
        }
    }

    pub fn set_pose(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation;
    }

    /// World bounds of the sample set, padded by the contact margin.
    pub fn world_aabb(&self) -> Aabb {
        let mut bounds = Aabb::empty();
        for (point, radius) in &self.samples {
            let world = self.position + self.rotation * *point;
            bounds.extend(world - Vec3::splat(*radius));
            bounds.extend(world + Vec3::splat(*radius));
        }
        if let ContactGeometry::Mesh { .. } = self.geometry {
            bounds = bounds.expanded(MESH_THICKNESS);
        }
        bounds.expanded(CONTACT_MARGIN)
    }

    /// Samples of `self` against the surface of `other`. Normals point from `other` to `self`.
    fn touch_points(&self, other: &CollisionProxy, out: &mut Vec<(Vec3, Vec3, f32)>) {
        let inverse = other.rotation.inverse();
        for (point, radius) in &self.samples {
            let world = self.position + self.rotation * *point;
            let local = inverse * (world - other.position);
            let (distance, normal) = other.geometry.distance(local);
            let separation = distance - radius;
            if separation < CONTACT_MARGIN {
                let normal = other.rotation * normal;
                out.push((world - normal * *radius, normal, -separation));
            }
        }
    }
}

/// Generates contacts for one proxy pair.
pub fn collide(
    a: usize,
    b: usize,
    proxy_a: &CollisionProxy,
    proxy_b: &CollisionProxy,
) -> Vec<ContactPoint> {
    let mut found = Vec::new();
    proxy_a.touch_points(proxy_b, &mut found);
    let mut contacts: Vec<ContactPoint> = found
        .drain(..)
        .map(|(point, normal, depth)| ContactPoint {
            a,
            b,
            point,
            normal,
            depth,
        })
        .collect();

    proxy_b.touch_points(proxy_a, &mut found);
    contacts.extend(found.into_iter().map(|(point, normal, depth)| ContactPoint {
        a,
        b,
        point,
        normal: -normal,
        depth,
    }));
    contacts
}

/// Narrow phase over all candidate pairs.
pub fn find_contacts(pairs: &[(usize, usize)], proxies: &[CollisionProxy]) -> Vec<ContactPoint> {
    #[cfg(feature = "parallel")]
    {
        pairs
            .par_iter()
            .flat_map_iter(|&(a, b)| collide(a, b, &proxies[a], &proxies[b]))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        pairs
            .iter()
            .flat_map(|&(a, b)| collide(a, b, &proxies[a], &proxies[b]))
            .collect()
    }
}

fn rim(radius: f32, z: f32) -> Vec<(Vec3, f32)> {
    (0..RIM_SAMPLES)
        .map(|i| {
            let angle = i as f32 / RIM_SAMPLES as f32 * std::f32::consts::TAU;
            (Vec3::new(radius * angle.cos(), radius * angle.sin(), z), 0.0)
        })
        .collect()
}

fn box_distance(p: Vec3, half_extents: Vec3) -> (f32, Vec3) {
    let q = p.abs() - half_extents;
    if q.max_element() > 0.0 {
        let outside = q.max(Vec3::ZERO);
        let distance = outside.length();
        let normal = (outside * p.signum()).normalize_or_zero();
        return (distance, normal);
    }

    let axis = if q.x >= q.y && q.x >= q.z {
        Vec3::X * p.x.signum()
    } else if q.y >= q.z {
        Vec3::Y * p.y.signum()
    } else {
        Vec3::Z * p.z.signum()
    };
    (q.max_element(), axis)
}

/// Upright cylinder along Z. `cos`/`sin` tilt the side normal for cones.
fn cylinder_distance(p: Vec3, radius: f32, half_height: f32, cos: f32, sin: f32) -> (f32, Vec3) {
    let planar = Vec3::new(p.x, p.y, 0.0);
    let planar_len = planar.length();
    let radial = if planar_len > 1e-6 {
        planar / planar_len
    } else {
        Vec3::X
    };
    let side_normal = (radial * cos + Vec3::Z * sin).normalize_or_zero();
    let d_side = (planar_len - radius) * cos;
    let d_cap = p.z.abs() - half_height;
    let cap_normal = Vec3::Z * p.z.signum();

    if d_side > 0.0 || d_cap > 0.0 {
        let side = d_side.max(0.0);
        let cap = d_cap.max(0.0);
        let distance = (side * side + cap * cap).sqrt();
        let normal = (side_normal * side + cap_normal * cap).normalize_or_zero();
        (distance, normal)
    } else if d_side > d_cap {
        (d_side, side_normal)
    } else {
        (d_cap, cap_normal)
    }
}

fn closest_point_on_triangle(p: Vec3, tri: &[Vec3; 3]) -> Vec3 {
    let [a, b, c] = *tri;
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shape::TriangleMesh;
    use approx::assert_relative_eq;

    fn proxy(geometry: ShapeGeometry, position: Vec3) -> CollisionProxy {
        let shape = CollisionShape::new(geometry);
        CollisionProxy::new(
            ContactGeometry::from_shape(&shape, Vec3::ONE),
            position,
            Quat::IDENTITY,
        )
    }

    #[test]
    fn box_resting_on_box_touches_at_four_corners() {
        let top = proxy(
            ShapeGeometry::Box {
                half_extents: Vec3::splat(0.5),
            },
            Vec3::new(0.0, 0.0, -0.99),
        );
        let ground = proxy(
            ShapeGeometry::Box {
                half_extents: Vec3::splat(0.5),
            },
            Vec3::new(0.0, 0.0, -2.0),
        );
        let contacts = collide(0, 1, &top, &ground);
        assert!(contacts.len() >= 4);
        for contact in &contacts {
            assert_relative_eq!(contact.normal.z, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn separated_spheres_do_not_touch() {
        let a = proxy(ShapeGeometry::Sphere { radius: 1.0 }, Vec3::ZERO);
        let b = proxy(ShapeGeometry::Sphere { radius: 1.0 }, Vec3::new(3.0, 0.0, 0.0));
        assert!(collide(0, 1, &a, &b).is_empty());
    }

    #[test]
    fn sphere_sinks_into_triangle_mesh() {
        let mesh = TriangleMesh::new(
            vec![
                Vec3::new(-5.0, -5.0, 0.0),
                Vec3::new(5.0, -5.0, 0.0),
                Vec3::new(0.0, 5.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        let ground = proxy(
            ShapeGeometry::TriangleMesh {
                mesh,
                kind: crate::backend::shape::TriangleMeshKind::Bvh,
            },
            Vec3::ZERO,
        );
        let ball = proxy(ShapeGeometry::Sphere { radius: 0.5 }, Vec3::new(0.0, 0.0, 0.5));
        let contacts = collide(0, 1, &ball, &ground);
        assert!(!contacts.is_empty());
        assert!(contacts.iter().any(|c| c.depth > 0.0 && c.normal.z > 0.9));
    }

    #[test]
    fn triangle_closest_point_projects_inside() {
        let tri = [Vec3::ZERO, Vec3::X * 2.0, Vec3::Y * 2.0];
        let closest = closest_point_on_triangle(Vec3::new(0.5, 0.5, 3.0), &tri);
        assert_relative_eq!(closest.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(closest.y, 0.5, epsilon = 1e-6);
        assert_relative_eq!(closest.z, 0.0, epsilon = 1e-6);
    }
}
