//! Collision shape construction from object bounds and mesh data.

use glam::Vec3;
use thiserror::Error;

use super::settings::{CollisionShapeKind, MeshSource, ObjectFlags, RigidBodyOb, RigidBodyType};
use crate::{
    backend::{Aabb, ShapeHandle, TriangleMesh},
    config::CONVEX_HULL_AUTO_MARGIN,
    scene::{Mesh, Object},
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShapeError {
    #[error("object `{0}` is not a mesh")]
    NotAMesh(String),
    #[error("object `{0}` has no mesh data")]
    MissingMesh(String),
    #[error("mesh of `{0}` has no {1}")]
    NoGeometry(String, &'static str),
    #[error("convex hull of `{0}` has non-finite vertices")]
    DegenerateHull(String),
}

/// Convex hull shape plus whether the requested margin could be embedded.
#[derive(Debug)]
pub struct ConvexHull {
    pub shape: ShapeHandle,
    pub can_embed: bool,
}

/// Half-extents of the object's bounds, `0.5` per axis when it has none.
pub fn bounds_half_size(object: &Object) -> Vec3 {
    object
        .bound_box()
        .map_or(Vec3::ONE, |bounds| bounds.max - bounds.min)
        * 0.5
}

/// Primitive shape sized from the bounding box. Round shapes stand upright
/// along local Z.
pub fn primitive_shape(kind: CollisionShapeKind, size: Vec3) -> Option<ShapeHandle> {
    let radius = size.x.max(size.y);
    let height = size.z;
    match kind {
        CollisionShapeKind::Box => Some(ShapeHandle::new_box(size.x, size.y, size.z)),
        CollisionShapeKind::Sphere => Some(ShapeHandle::new_sphere(size.max_element())),
        CollisionShapeKind::Capsule => {
            let cylinder_height = ((height - radius) * 2.0).max(0.0);
            Some(ShapeHandle::new_capsule(radius, cylinder_height))
        }
        CollisionShapeKind::Cylinder => Some(ShapeHandle::new_cylinder(radius, height)),
        CollisionShapeKind::Cone => Some(ShapeHandle::new_cone(radius, height * 2.0)),
        CollisionShapeKind::ConvexHull | CollisionShapeKind::Trimesh => None,
    }
}

fn source_mesh<'a>(object: &'a Object, source: MeshSource) -> Result<&'a Mesh, ShapeError> {
    if !object.is_mesh() {
        return Err(ShapeError::NotAMesh(object.name.clone()));
    }
    object
        .mesh_for_source(source)
        .ok_or_else(|| ShapeError::MissingMesh(object.name.clone()))
}

/// Builds a convex hull from the selected mesh, shrinking it by `margin` so
/// the collision margin sits on the original surface. Hulls too thin for the
/// margin are kept at full size and report `can_embed == false`.
pub fn convex_hull_from_mesh(
    object: &Object,
    source: MeshSource,
    margin: f32,
) -> Result<ConvexHull, ShapeError> {
    let mesh = source_mesh(object, source)?;
    if mesh.vertices.is_empty() {
        return Err(ShapeError::NoGeometry(object.name.clone(), "vertices"));
    }
    if mesh.vertices.iter().any(|v| !v.is_finite()) {
        return Err(ShapeError::DegenerateHull(object.name.clone()));
    }

    let bounds = Aabb::from_points(&mesh.vertices);
    let center = bounds.center();
    let half = bounds.extent();
    let can_embed = margin <= 0.0 || half.min_element() > margin;

    let vertices = if margin > 0.0 && can_embed {
        let shrink = (half - Vec3::splat(margin)) / half;
        mesh.vertices
            .iter()
            .map(|v| center + (*v - center) * shrink)
            .collect()
    } else {
        mesh.vertices.clone()
    };

    Ok(ConvexHull {
        shape: ShapeHandle::new_convex_hull(vertices),
        can_embed,
    })
}

/// Triangle mesh shape from the selected mesh. Passive bodies get the static
/// BVH representation, active bodies the GImpact one.
pub fn trimesh_from_mesh(
    object: &Object,
    source: MeshSource,
    body_type: RigidBodyType,
) -> Result<ShapeHandle, ShapeError> {
    let mesh = source_mesh(object, source)?;
    if mesh.vertices.is_empty() {
        return Err(ShapeError::NoGeometry(object.name.clone(), "vertices"));
    }
    let triangles = mesh.triangles();
    if triangles.is_empty() {
        return Err(ShapeError::NoGeometry(object.name.clone(), "faces"));
    }

    let data = TriangleMesh::new(mesh.vertices.clone(), triangles);
    Ok(match body_type {
        RigidBodyType::Passive => ShapeHandle::new_trimesh(data),
        RigidBodyType::Active => ShapeHandle::new_gimpact_mesh(data),
    })
}

/// Makes sure `settings` carries a collision shape for `object`.
///
/// A failed build keeps the previous shape if there is one; otherwise the
/// kind falls back to a box built from the bounding box.
pub fn validate_shape(object: &Object, settings: &mut RigidBodyOb, rebuild: bool) {
    if settings.physics_shape.is_some() && !rebuild {
        return;
    }

    let size = bounds_half_size(object);
    let built = match settings.shape {
        CollisionShapeKind::ConvexHull => {
            let has_volume = size.min_element() > 0.0;
            let user_margin = settings.flag.contains(ObjectFlags::USE_MARGIN);
            let hull_margin = if !user_margin && has_volume {
                CONVEX_HULL_AUTO_MARGIN
            } else {
                0.0
            };
            let hull = convex_hull_from_mesh(object, settings.mesh_source, hull_margin);
            if !user_margin {
                let embedded = hull.as_ref().is_ok_and(|hull| hull.can_embed) && has_volume;
                settings.margin = if embedded {
                    CONVEX_HULL_AUTO_MARGIN
                } else {
                    0.0
                };
            }
            hull.map(|hull| hull.shape)
        }
        CollisionShapeKind::Trimesh => {
            trimesh_from_mesh(object, settings.mesh_source, settings.body_type)
        }
        kind => primitive_shape(kind, size)
            .ok_or_else(|| ShapeError::NoGeometry(object.name.clone(), "bounds")),
    };

    match built {
        Ok(mut shape) => {
            shape.set_margin(settings.collision_margin());
            settings.physics_shape = Some(shape);
        }
        Err(err) => {
            match err {
                ShapeError::NotAMesh(_) => {
                    log::error!("cannot build {:?} collision shape: {err}", settings.shape)
                }
                _ => log::warn!("cannot build {:?} collision shape: {err}", settings.shape),
            }
            if settings.physics_shape.is_none() {
                settings.shape = CollisionShapeKind::Box;
                validate_shape(object, settings, true);
            }
        }
    }
}
