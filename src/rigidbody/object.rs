//! Keeps each object's backend body consistent with its settings.

use glam::{Quat, Vec3};

use super::{
    settings::{
        CollisionShapeKind, DirtyState, ObjectFlags, RigidBodyOb, RigidBodyType, RigidBodyWorld,
    },
    shape::validate_shape,
    world::cache_reset,
};
use crate::{
    backend::{Aabb, BodyHandle, DynamicsWorld},
    scene::{Object, TransformLock},
    utils::math::{mat4_to_loc_quat, mat4_to_size},
};

/// Creates default settings for `object`, seeded with its current transform.
///
/// Returns `None` if the object already has rigid body settings.
pub fn create_object(
    rbw: Option<&mut RigidBodyWorld>,
    object: &Object,
    body_type: RigidBodyType,
) -> Option<RigidBodyOb> {
    if object.rigidbody_object.is_some() {
        return None;
    }
    let mut settings = RigidBodyOb::new(body_type);
    (settings.pos, settings.orn) = mat4_to_loc_quat(&object.obmat);
    cache_reset(rbw);
    Some(settings)
}

/// Duplicates settings without their handles. The copy validates on first use.
pub fn copy_object(object: &Object) -> Option<RigidBodyOb> {
    let source = object.rigidbody_object.as_ref()?;
    Some(RigidBodyOb {
        body_type: source.body_type,
        shape: source.shape,
        mesh_source: source.mesh_source,
        flag: source.flag,
        mass: source.mass,
        friction: source.friction,
        restitution: source.restitution,
        margin: source.margin,
        lin_damping: source.lin_damping,
        ang_damping: source.ang_damping,
        lin_sleep_thresh: source.lin_sleep_thresh,
        ang_sleep_thresh: source.ang_sleep_thresh,
        col_groups: source.col_groups,
        pos: source.pos,
        orn: source.orn,
        dirty: DirtyState::NeedsValidate,
        physics_object: None,
        physics_shape: None,
    })
}

/// Drops the object's settings after unregistering its body.
pub fn free_object(rbw: Option<&mut RigidBodyWorld>, object: &mut Object) {
    let Some(settings) = object.rigidbody_object.take() else {
        return;
    };
    let world = rbw.and_then(|rbw| rbw.physics_world.as_mut());
    if let (Some(world), Some(body)) = (world, settings.physics_object.as_ref()) {
        world.remove_body(body);
    }
}

/// Pushes every cheap body parameter from the settings.
fn apply_body_settings(body: &mut BodyHandle, object: &Object, settings: &RigidBodyOb) {
    body.set_friction(settings.friction);
    body.set_restitution(settings.restitution);
    body.set_damping(settings.lin_damping, settings.ang_damping);
    body.set_sleep_thresholds(settings.lin_sleep_thresh, settings.ang_sleep_thresh);
    body.set_activation_state(settings.flag.contains(ObjectFlags::USE_DEACTIVATION));

    let lock = object.protect;
    body.set_linear_factor(
        !lock.contains(TransformLock::LOC_X),
        !lock.contains(TransformLock::LOC_Y),
        !lock.contains(TransformLock::LOC_Z),
    );
    body.set_angular_factor(
        !lock.contains(TransformLock::ROT_X),
        !lock.contains(TransformLock::ROT_Y),
        !lock.contains(TransformLock::ROT_Z),
    );

    body.set_mass(settings.simulation_mass());
    body.set_kinematic_state(settings.kinematic_state());
}

/// Ensures the object has a registered body built from its current shape.
///
/// With `rebuild` the shape and body are recreated from scratch. Otherwise an
/// existing body is re-registered and its parameters patched in place.
pub fn validate_object(rbw: &mut RigidBodyWorld, object: &mut Object, rebuild: bool) {
    let Some(mut settings) = object.rigidbody_object.take() else {
        return;
    };
    validate_body(rbw.physics_world.as_mut(), object, &mut settings, rebuild);
    object.rigidbody_object = Some(settings);
}

pub(crate) fn validate_body(
    mut world: Option<&mut DynamicsWorld>,
    object: &Object,
    settings: &mut RigidBodyOb,
    rebuild: bool,
) {
    if settings.physics_shape.is_none() || rebuild {
        validate_shape(object, settings, true);
    }

    if !rebuild {
        if let (Some(world), Some(body)) =
            (world.as_deref_mut(), settings.physics_object.as_ref())
        {
            world.remove_body(body);
        }
    }

    if settings.physics_object.is_none() || rebuild {
        if let Some(stale) = settings.physics_object.take() {
            if let Some(world) = world.as_deref_mut() {
                world.remove_body(&stale);
            }
        }

        let Some(shape) = settings.physics_shape.as_ref() else {
            return;
        };
        let (loc, rot) = mat4_to_loc_quat(&object.obmat);
        let mut body = BodyHandle::new(shape, loc, rot);
        body.set_scale(mat4_to_size(&object.obmat));
        apply_body_settings(&mut body, object, settings);
        if settings.body_type == RigidBodyType::Passive
            || settings.flag.contains(ObjectFlags::START_DEACTIVATED)
        {
            body.deactivate();
        }
        log::debug!("created rigid body for `{}`", object.name);
        settings.physics_object = Some(body);
    } else if let Some(mut body) = settings.physics_object.take() {
        apply_body_settings(&mut body, object, settings);
        settings.physics_object = Some(body);
    }

    if let (Some(world), Some(body)) = (world, settings.physics_object.as_ref()) {
        world.add_body(body, settings.col_groups);
    }
}

/// Replaces the body's collision shape with a freshly built one.
pub(crate) fn reshape_body(object: &Object, settings: &mut RigidBodyOb) {
    validate_shape(object, settings, true);
    if let (Some(body), Some(shape)) =
        (settings.physics_object.as_mut(), settings.physics_shape.as_ref())
    {
        body.set_collision_shape(shape);
    }
}

/// Per-step push of scene state into the body: deformed trimesh vertices,
/// scale, the scaled hull margin and user-driven transforms.
pub fn update_sim_object(object: &mut Object, is_interactive_drag: bool) {
    let Some(mut settings) = object.rigidbody_object.take() else {
        return;
    };
    update_body(object, &mut settings, is_interactive_drag);
    object.rigidbody_object = Some(settings);
}

pub(crate) fn update_body(object: &Object, settings: &mut RigidBodyOb, is_interactive_drag: bool) {
    if settings.physics_object.is_none() {
        return;
    }

    if settings.shape == CollisionShapeKind::Trimesh
        && settings.flag.contains(ObjectFlags::USE_DEFORM)
    {
        if let (Some(mesh), Some(shape)) =
            (object.derived_deform.as_ref(), settings.physics_shape.as_mut())
        {
            let hint = object
                .bound_box()
                .map(|bounds| Aabb::new(bounds.min, bounds.max));
            if !shape.update_trimesh(&mesh.vertices, hint) {
                log::debug!(
                    "`{}` has no triangle mesh shape, skipping deform update",
                    object.name
                );
            }
        }
    }

    let (loc, rot) = mat4_to_loc_quat(&object.obmat);
    let scale = mat4_to_size(&object.obmat);

    if settings.shape == CollisionShapeKind::ConvexHull
        && !settings.flag.contains(ObjectFlags::USE_MARGIN)
    {
        let margin = settings.collision_margin() * scale.min_element();
        if let Some(shape) = settings.physics_shape.as_mut() {
            shape.set_margin(margin);
        }
    }

    let dragged = object.selected && is_interactive_drag;
    let kinematic = settings.is_kinematic();
    let Some(body) = settings.physics_object.as_mut() else {
        return;
    };
    body.set_scale(scale);

    if dragged {
        body.set_kinematic_state(true);
        body.set_mass(0.0);
    }
    if kinematic || dragged {
        body.activate();
        body.set_loc_rot(loc, rot);
    }
}

/// Ends an interactive transform of a simulated object.
///
/// The transform the user applied becomes the cached simulation transform and
/// is pushed into the body; the object's own channels return to `old_loc` and
/// `old_rot`.
pub fn aftertrans_update(object: &mut Object, old_loc: Vec3, old_rot: Quat) {
    let Some(settings) = object.rigidbody_object.as_mut() else {
        return;
    };

    settings.pos = object.loc;
    settings.orn = object.rot.normalize();
    object.loc = old_loc;
    object.rot = old_rot;

    if let Some(body) = settings.physics_object.as_mut() {
        if settings.body_type == RigidBodyType::Passive {
            body.set_kinematic_state(true);
        }
        body.set_loc_rot(settings.pos, settings.orn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{ActivationState, ShapeGeometry, ShapeHandle, TriangleMeshKind},
        scene::Mesh,
    };
    use approx::assert_relative_eq;

    fn cube_object(body_type: RigidBodyType) -> Object {
        let mut object = Object::new_mesh("cube", Mesh::cuboid(Vec3::splat(0.5)))
            .with_location(Vec3::new(0.0, 0.0, 2.0));
        object.rigidbody_object = Some(RigidBodyOb::new(body_type));
        object
    }

    #[test]
    fn validate_creates_and_registers_body() {
        let mut rbw = RigidBodyWorld::default();
        rbw.physics_world = Some(DynamicsWorld::new(Vec3::ZERO));
        let mut object = cube_object(RigidBodyType::Active);

        validate_object(&mut rbw, &mut object, false);

        let settings = object.rigidbody_object.as_ref().expect("settings kept");
        let body = settings.physics_object.as_ref().expect("body created");
        assert!(settings.physics_shape.is_some());
        assert_relative_eq!(body.position().z, 2.0);
        assert_relative_eq!(body.mass(), 1.0);
        assert_eq!(
            body.activation_state(),
            ActivationState::DisableDeactivation
        );
        assert!(rbw
            .physics_world
            .as_ref()
            .is_some_and(|world| world.contains_body(body)));
    }

    #[test]
    fn passive_bodies_are_massless_and_asleep() {
        let mut rbw = RigidBodyWorld::default();
        let mut object = cube_object(RigidBodyType::Passive);
        object.protect = TransformLock::LOC_X | TransformLock::ROT_Z;

        validate_object(&mut rbw, &mut object, true);

        let body = object
            .rigidbody_object
            .as_ref()
            .and_then(|settings| settings.physics_object.as_ref())
            .expect("body created without a world");
        assert_eq!(body.mass(), 0.0);
        assert!(!body.is_active());
        assert_eq!(body.linear_factor(), Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(body.angular_factor(), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn non_rebuild_validate_patches_parameters() {
        let mut rbw = RigidBodyWorld::default();
        let mut object = cube_object(RigidBodyType::Active);
        validate_object(&mut rbw, &mut object, false);

        if let Some(settings) = object.rigidbody_object.as_mut() {
            settings.friction = 0.9;
            settings.flag.insert(ObjectFlags::KINEMATIC);
        }
        validate_object(&mut rbw, &mut object, false);

        let body = object
            .rigidbody_object
            .as_ref()
            .and_then(|settings| settings.physics_object.as_ref())
            .expect("body kept");
        assert_relative_eq!(body.friction(), 0.9);
        assert!(body.is_kinematic());
        assert_eq!(body.mass(), 0.0);
    }

    fn deforming_trimesh(object: &mut Object) {
        if let Some(settings) = object.rigidbody_object.as_mut() {
            settings.shape = CollisionShapeKind::Trimesh;
            settings.flag.insert(ObjectFlags::USE_DEFORM);
        }
    }

    #[test]
    fn deforming_trimesh_takes_new_vertices_each_step() {
        let mut rbw = RigidBodyWorld::default();
        rbw.physics_world = Some(DynamicsWorld::new(Vec3::ZERO));
        let mut object = cube_object(RigidBodyType::Active);
        deforming_trimesh(&mut object);
        validate_object(&mut rbw, &mut object, false);

        let deformed = Mesh::cuboid(Vec3::new(1.0, 0.5, 0.25));
        object.derived_deform = Some(deformed.clone());
        update_sim_object(&mut object, false);

        let shape = object
            .rigidbody_object
            .as_ref()
            .and_then(|settings| settings.physics_shape.as_ref())
            .expect("shape");
        match shape.geometry() {
            ShapeGeometry::TriangleMesh { mesh, kind } => {
                assert_eq!(kind, TriangleMeshKind::GImpact);
                assert_eq!(mesh.vertices, deformed.vertices);
            }
            other => panic!("expected triangle mesh, got {other:?}"),
        }
    }

    #[test]
    fn deform_update_leaves_fallback_box_alone() {
        let mut rbw = RigidBodyWorld::default();
        let mut mesh = Mesh::cuboid(Vec3::splat(0.5));
        mesh.faces.clear();
        let mut object = Object::new_mesh("points", mesh);
        object.rigidbody_object = Some(RigidBodyOb::new(RigidBodyType::Active));
        deforming_trimesh(&mut object);
        validate_object(&mut rbw, &mut object, false);

        // The kind asks for a deforming trimesh while the live shape is the box fallback.
        if let Some(settings) = object.rigidbody_object.as_mut() {
            assert_eq!(settings.shape, CollisionShapeKind::Box);
            settings.shape = CollisionShapeKind::Trimesh;
        }
        object.derived_deform = Some(Mesh::cuboid(Vec3::splat(2.0)));
        update_sim_object(&mut object, false);

        let settings = object.rigidbody_object.as_ref().expect("settings");
        assert!(matches!(
            settings.physics_shape.as_ref().map(ShapeHandle::geometry),
            Some(ShapeGeometry::Box { half_extents }) if half_extents == Vec3::splat(0.5)
        ));
    }

    #[test]
    fn start_deactivated_bodies_begin_asleep() {
        let mut rbw = RigidBodyWorld::default();
        let mut object = cube_object(RigidBodyType::Active);
        if let Some(settings) = object.rigidbody_object.as_mut() {
            settings.flag |= ObjectFlags::USE_DEACTIVATION | ObjectFlags::START_DEACTIVATED;
        }
        validate_object(&mut rbw, &mut object, true);

        let body = object
            .rigidbody_object
            .as_ref()
            .and_then(|settings| settings.physics_object.as_ref())
            .expect("body created");
        assert_relative_eq!(body.mass(), 1.0);
        assert!(!body.is_active());
        assert_eq!(body.activation_state(), ActivationState::Sleeping);

        let mut awake = cube_object(RigidBodyType::Active);
        validate_object(&mut rbw, &mut awake, true);
        assert!(awake
            .rigidbody_object
            .as_ref()
            .and_then(|settings| settings.physics_object.as_ref())
            .is_some_and(BodyHandle::is_active));
    }

    #[test]
    fn hull_margin_follows_smallest_scale() {
        let mut rbw = RigidBodyWorld::default();
        let mut object = cube_object(RigidBodyType::Active);
        validate_object(&mut rbw, &mut object, false);

        object.scale = Vec3::new(2.0, 0.5, 1.0);
        object.where_is_calc();
        update_sim_object(&mut object, false);

        let settings = object.rigidbody_object.as_ref().expect("settings");
        let margin = settings
            .physics_shape
            .as_ref()
            .map(|shape| shape.margin())
            .unwrap_or_default();
        assert_relative_eq!(margin, settings.margin * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn dragged_bodies_follow_the_object() {
        let mut rbw = RigidBodyWorld::default();
        let mut object = cube_object(RigidBodyType::Active);
        validate_object(&mut rbw, &mut object, false);

        object.selected = true;
        object.loc = Vec3::new(3.0, 0.0, 0.0);
        object.where_is_calc();
        update_sim_object(&mut object, true);

        let body = object
            .rigidbody_object
            .as_ref()
            .and_then(|settings| settings.physics_object.as_ref())
            .expect("body");
        assert!(body.is_kinematic());
        assert_relative_eq!(body.position().x, 3.0);
    }

    #[test]
    fn aftertrans_moves_cached_transform() {
        let mut rbw = RigidBodyWorld::default();
        let mut object = cube_object(RigidBodyType::Passive);
        validate_object(&mut rbw, &mut object, false);

        object.loc = Vec3::new(5.0, 0.0, 0.0);
        aftertrans_update(&mut object, Vec3::ZERO, Quat::IDENTITY);

        assert_eq!(object.loc, Vec3::ZERO);
        let settings = object.rigidbody_object.as_ref().expect("settings");
        assert_eq!(settings.pos, Vec3::new(5.0, 0.0, 0.0));
        let body = settings.physics_object.as_ref().expect("body");
        assert!(body.is_kinematic());
        assert_relative_eq!(body.position().x, 5.0);
    }
}
