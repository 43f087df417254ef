use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::utils::math::{inertia_box, inertia_capsule, inertia_sphere};

/// Axis-aligned bounding box used for shape bounds and broad-phase proxies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-extents.
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    pub fn expanded(&self, amount: f32) -> Aabb {
        Aabb::new(self.min - Vec3::splat(amount), self.max + Vec3::splat(amount))
    }
}

/// Triangle soup used by both triangle mesh representations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    pub bounds: Aabb,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        let bounds = Aabb::from_points(&vertices);
        Self {
            vertices,
            triangles,
            bounds,
        }
    }

    /// Replaces vertex positions in place, keeping the triangle topology.
    ///
    /// Extra positions are ignored and missing ones keep their previous value.
    pub fn update_vertices(&mut self, positions: &[Vec3], bounds_hint: Option<Aabb>) {
        for (vertex, position) in self.vertices.iter_mut().zip(positions) {
            *vertex = *position;
        }
        self.bounds = match bounds_hint {
            Some(bounds) if bounds.is_valid() => bounds,
            _ => Aabb::from_points(&self.vertices),
        };
    }

    pub fn triangle(&self, index: usize) -> Option<[Vec3; 3]> {
        let tri = self.triangles.get(index)?;
        Some([
            *self.vertices.get(tri[0] as usize)?,
            *self.vertices.get(tri[1] as usize)?,
            *self.vertices.get(tri[2] as usize)?,
        ])
    }
}

/// Triangle mesh flavours: static BVH meshes for immovable bodies, GImpact for moving ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriangleMeshKind {
    Bvh,
    GImpact,
}

/// Enumeration of supported collision geometries. Round shapes stand upright along local Z.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShapeGeometry {
    Box {
        half_extents: Vec3,
    },
    Sphere {
        radius: f32,
    },
    /// `height` is the length of the cylindrical mid-section only.
    Capsule {
        radius: f32,
        height: f32,
    },
    Cylinder {
        radius: f32,
        half_height: f32,
    },
    /// `height` is the full apex-to-base height, centered on the origin.
    Cone {
        radius: f32,
        height: f32,
    },
    ConvexHull {
        vertices: Vec<Vec3>,
    },
    TriangleMesh {
        mesh: TriangleMesh,
        kind: TriangleMeshKind,
    },
}

/// Backend collision shape: geometry plus the collision margin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionShape {
    pub geometry: ShapeGeometry,
    pub margin: f32,
}

impl CollisionShape {
    pub fn new(geometry: ShapeGeometry) -> Self {
        Self {
            geometry,
            margin: 0.0,
        }
    }

    /// Local bounds with `scale` applied.
    pub fn local_aabb(&self, scale: Vec3) -> Aabb {
        let scale = scale.abs();
        match &self.geometry {
            ShapeGeometry::Box { half_extents } => {
                let he = *half_extents * scale;
                Aabb::new(-he, he)
            }
            ShapeGeometry::Sphere { radius } => {
                let r = radius * scale.max_element();
                Aabb::new(Vec3::splat(-r), Vec3::splat(r))
            }
            ShapeGeometry::Capsule { radius, height } => {
                let r = radius * scale.x.max(scale.y);
                let hz = 0.5 * height * scale.z + r;
                Aabb::new(Vec3::new(-r, -r, -hz), Vec3::new(r, r, hz))
            }
            ShapeGeometry::Cylinder {
                radius,
                half_height,
            } => {
                let r = radius * scale.x.max(scale.y);
                let hz = half_height * scale.z;
                Aabb::new(Vec3::new(-r, -r, -hz), Vec3::new(r, r, hz))
            }
            ShapeGeometry::Cone { radius, height } => {
                let r = radius * scale.x.max(scale.y);
                let hz = 0.5 * height * scale.z;
                Aabb::new(Vec3::new(-r, -r, -hz), Vec3::new(r, r, hz))
            }
            ShapeGeometry::ConvexHull { vertices } => {
                let scaled: Vec<Vec3> = vertices.iter().map(|v| *v * scale).collect();
                Aabb::from_points(&scaled).expanded(self.margin)
            }
            ShapeGeometry::TriangleMesh { mesh, .. } => {
                Aabb::new(mesh.bounds.min * scale, mesh.bounds.max * scale)
            }
        }
    }

    /// Diagonal of the body-space inertia tensor for `mass`.
    pub fn local_inertia(&self, mass: f32, scale: Vec3) -> Vec3 {
        let scale = scale.abs();
        match &self.geometry {
            ShapeGeometry::Sphere { radius } => inertia_sphere(radius * scale.max_element(), mass),
            ShapeGeometry::Capsule { radius, height } => {
                inertia_capsule(radius * scale.x.max(scale.y), height * scale.z, mass)
            }
            // Everything else approximates its inertia by its bounds.
            _ => inertia_box(self.local_aabb(scale).extent(), mass),
        }
    }

    pub fn is_static_mesh(&self) -> bool {
        matches!(
            self.geometry,
            ShapeGeometry::TriangleMesh {
                kind: TriangleMeshKind::Bvh,
                ..
            }
        )
    }
}

/// Exclusively-owned collision shape handle.
///
/// Bodies built from the shape keep a shared reference to the geometry, so
/// in-place updates (trimesh deformation, margin changes) are seen by them.
#[derive(Debug)]
pub struct ShapeHandle {
    inner: Arc<RwLock<CollisionShape>>,
}

impl ShapeHandle {
    pub fn new(shape: CollisionShape) -> Self {
        Self {
            inner: Arc::new(RwLock::new(shape)),
        }
    }

    pub fn new_box(x: f32, y: f32, z: f32) -> Self {
        Self::new(CollisionShape::new(ShapeGeometry::Box {
            half_extents: Vec3::new(x, y, z),
        }))
    }

    pub fn new_sphere(radius: f32) -> Self {
        Self::new(CollisionShape::new(ShapeGeometry::Sphere { radius }))
    }

    pub fn new_capsule(radius: f32, height: f32) -> Self {
        Self::new(CollisionShape::new(ShapeGeometry::Capsule { radius, height }))
    }

    pub fn new_cylinder(radius: f32, half_height: f32) -> Self {
        Self::new(CollisionShape::new(ShapeGeometry::Cylinder {
            radius,
            half_height,
        }))
    }

    pub fn new_cone(radius: f32, height: f32) -> Self {
        Self::new(CollisionShape::new(ShapeGeometry::Cone { radius, height }))
    }

    pub fn new_convex_hull(vertices: Vec<Vec3>) -> Self {
        Self::new(CollisionShape::new(ShapeGeometry::ConvexHull { vertices }))
    }

    pub fn new_trimesh(mesh: TriangleMesh) -> Self {
        Self::new(CollisionShape::new(ShapeGeometry::TriangleMesh {
            mesh,
            kind: TriangleMeshKind::Bvh,
        }))
    }

    pub fn new_gimpact_mesh(mesh: TriangleMesh) -> Self {
        Self::new(CollisionShape::new(ShapeGeometry::TriangleMesh {
            mesh,
            kind: TriangleMeshKind::GImpact,
        }))
    }

    pub fn margin(&self) -> f32 {
        self.inner.read().margin
    }

    pub fn set_margin(&mut self, margin: f32) {
        self.inner.write().margin = margin.max(0.0);
    }

    /// Pushes new vertex positions into a triangle mesh shape. No-op for other shapes.
    pub fn update_trimesh(&mut self, positions: &[Vec3], bounds_hint: Option<Aabb>) -> bool {
        let mut shape = self.inner.write();
        match &mut shape.geometry {
            ShapeGeometry::TriangleMesh { mesh, .. } => {
                mesh.update_vertices(positions, bounds_hint);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the current geometry.
    pub fn geometry(&self) -> ShapeGeometry {
        self.inner.read().geometry.clone()
    }

    pub fn local_aabb(&self, scale: Vec3) -> Aabb {
        self.inner.read().local_aabb(scale)
    }

    pub(crate) fn shared(&self) -> Arc<RwLock<CollisionShape>> {
        Arc::clone(&self.inner)
    }
}
