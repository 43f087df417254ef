#![cfg(feature = "backend")]

use approx::assert_relative_eq;
use rigidbody_sync::{
    backend::{ConstraintHandle, ConstraintKind, LimitAxis, SpringModel},
    rigidbody::{self, ConstraintAxis, ConstraintFlags, ConstraintType, RigidBodyType, SpringType},
    scene::{Group, Mesh, Object, Scene},
    GroupId, ObjectId, Vec3,
};

struct Rig {
    scene: Scene,
    a: ObjectId,
    b: ObjectId,
    carrier: ObjectId,
}

fn rig(
    constraint_type: ConstraintType,
    configure: impl FnOnce(&mut rigidbody::RigidBodyCon),
) -> Rig {
    let mut scene = Scene::new();
    let bodies = scene.add_group(Group::new("RigidBodyWorld"));
    let constraints = scene.add_group(Group::new("RigidBodyConstraints"));
    let mut rbw = rigidbody::create_world(&scene).expect("world settings");
    rbw.group = Some(bodies);
    rbw.constraints = Some(constraints);
    scene.rigidbody_world = Some(rbw);

    let a = add_cube(&mut scene, bodies, "a", Vec3::new(-1.0, 0.0, 0.0));
    let b = add_cube(&mut scene, bodies, "b", Vec3::new(1.0, 0.0, 0.0));

    let mut joint = Object::new_empty("joint");
    let mut settings =
        rigidbody::create_constraint(scene.rigidbody_world.as_mut(), &joint, constraint_type)
            .expect("settings");
    settings.ob1 = Some(a);
    settings.ob2 = Some(b);
    configure(&mut settings);
    joint.rigidbody_constraint = Some(settings);
    let carrier = scene.add_object(joint);
    assert!(scene.link_object(constraints, carrier));

    Rig { scene, a, b, carrier }
}

fn add_cube(scene: &mut Scene, group: GroupId, name: &str, loc: Vec3) -> ObjectId {
    let mut object = Object::new_mesh(name, Mesh::cuboid(Vec3::splat(0.5)))
        .with_location(loc);
    object.rigidbody_object =
        rigidbody::create_object(scene.rigidbody_world.as_mut(), &object, RigidBodyType::Active);
    let id = scene.add_object(object);
    scene.link_object(group, id);
    id
}

fn constraint(scene: &Scene, carrier: ObjectId) -> Option<&ConstraintHandle> {
    scene
        .object(carrier)?
        .rigidbody_constraint
        .as_ref()?
        .physics_constraint
        .as_ref()
}

fn has_body(scene: &Scene, id: Option<ObjectId>) -> bool {
    id.and_then(|id| scene.object(id))
        .and_then(|object| object.rigidbody_object.as_ref())
        .is_some_and(|settings| settings.physics_object.is_some())
}

/// A constraint handle only exists while both participants have bodies.
fn assert_pairing(scene: &Scene, carrier: ObjectId) {
    let Some(settings) = scene
        .object(carrier)
        .and_then(|o| o.rigidbody_constraint.as_ref())
    else {
        return;
    };
    if settings.physics_constraint.is_some() {
        assert!(has_body(scene, settings.ob1), "ob1 must have a body");
        assert!(has_body(scene, settings.ob2), "ob2 must have a body");
    }
}

fn live_constraints(scene: &Scene) -> Option<usize> {
    scene
        .rigidbody_world
        .as_ref()
        .and_then(|rbw| rbw.physics_world.as_ref())
        .map(|world| world.constraint_count())
}

fn location(scene: &Scene, id: ObjectId) -> Vec3 {
    scene.object(id).expect("object").obmat.w_axis.truncate()
}

#[test]
fn fixed_pair_moves_together() {
    let mut r = rig(ConstraintType::Fixed, |_| {});
    r.scene.update_for_frame(1.0);
    r.scene.update_for_frame(2.0);
    let offset = location(&r.scene, r.b) - location(&r.scene, r.a);

    for frame in 3..=31 {
        r.scene.update_for_frame(frame as f32);
        assert_pairing(&r.scene, r.carrier);
    }

    let moved = location(&r.scene, r.b) - location(&r.scene, r.a);
    assert!(location(&r.scene, r.a).z < -1.0, "pair should fall under gravity");
    assert_relative_eq!(moved.x, offset.x, epsilon = 0.05);
    assert_relative_eq!(moved.y, offset.y, epsilon = 0.05);
    assert_relative_eq!(moved.z, offset.z, epsilon = 0.05);
}

#[test]
fn constraint_is_built_after_its_bodies() {
    let mut r = rig(ConstraintType::Point, |_| {});
    r.scene.update_for_frame(1.0);
    assert!(constraint(&r.scene, r.carrier).is_none());

    r.scene.update_for_frame(2.0);
    let handle = constraint(&r.scene, r.carrier).expect("constraint built on rebuild");
    assert_eq!(handle.kind(), ConstraintKind::Point);
    assert_pairing(&r.scene, r.carrier);

    let world = r
        .scene
        .rigidbody_world
        .as_ref()
        .and_then(|rbw| rbw.physics_world.as_ref())
        .expect("world");
    assert_eq!(world.constraint_count(), 1);
    assert_eq!(world.body_count(), 2);
}

#[test]
fn deleted_participant_tears_constraint_down() {
    let mut r = rig(ConstraintType::Fixed, |_| {});
    for frame in 1..=4 {
        r.scene.update_for_frame(frame as f32);
    }
    assert!(constraint(&r.scene, r.carrier).is_some());

    // The constraint is not told about the deletion.
    assert!(r.scene.remove_object(r.b).is_some());
    r.scene.update_for_frame(5.0);

    assert!(constraint(&r.scene, r.carrier).is_none());
    assert_pairing(&r.scene, r.carrier);
    assert_eq!(live_constraints(&r.scene), Some(0));

    for frame in 6..=8 {
        r.scene.update_for_frame(frame as f32);
    }
    assert!(location(&r.scene, r.a).z < 0.0);
}

#[test]
fn pairing_holds_on_every_frame_after_deletion() {
    let mut r = rig(ConstraintType::Fixed, |_| {});
    for frame in 1..=3 {
        r.scene.update_for_frame(frame as f32);
    }
    assert_eq!(live_constraints(&r.scene), Some(1));

    r.scene.remove_object(r.b);
    for frame in 4..=10 {
        r.scene.update_for_frame(frame as f32);
        assert_pairing(&r.scene, r.carrier);
        assert!(constraint(&r.scene, r.carrier).is_none(), "frame {frame}");
        assert_eq!(live_constraints(&r.scene), Some(0), "frame {frame}");
    }
}

#[test]
fn removing_a_participant_through_the_world_detaches_its_constraints() {
    let mut r = rig(ConstraintType::Hinge, |_| {});
    for frame in 1..=3 {
        r.scene.update_for_frame(frame as f32);
    }

    rigidbody::remove_object(&mut r.scene, r.a);

    assert!(r.scene.object(r.carrier).is_some_and(|o| o.rigidbody_constraint.is_none()));
    assert!(r.scene.object(r.a).is_some_and(|o| o.rigidbody_object.is_none()));
    let rbw = r.scene.rigidbody_world.as_ref().expect("world");
    assert!(rbw.point_cache.outdated);
    assert_eq!(rbw.physics_world.as_ref().map(|world| world.constraint_count()), Some(0));
    assert_eq!(rbw.physics_world.as_ref().map(|world| world.body_count()), Some(1));
}

#[test]
fn hinge_without_z_limit_reports_free_range() {
    let mut r = rig(ConstraintType::Hinge, |_| {});
    for frame in 1..=3 {
        r.scene.update_for_frame(frame as f32);
    }
    let handle = constraint(&r.scene, r.carrier).expect("hinge");
    assert_eq!(handle.kind(), ConstraintKind::Hinge);
    assert_eq!(handle.limits(LimitAxis::AngZ), (0.0, -1.0));
}

#[test]
fn hinge_limit_and_overrides_reach_the_backend() {
    let mut r = rig(ConstraintType::Hinge, |settings| {
        settings.set_limit(ConstraintAxis::AngZ, -0.25, 0.5);
        settings
            .flag
            .insert(ConstraintFlags::USE_BREAKING | ConstraintFlags::OVERRIDE_SOLVER_ITERATIONS);
        settings.breaking_threshold = 4.0;
        settings.num_solver_iterations = 30;
    });
    r.scene.update_for_frame(1.0);
    r.scene.update_for_frame(2.0);

    let handle = constraint(&r.scene, r.carrier).expect("hinge");
    assert_eq!(handle.limits(LimitAxis::AngZ), (-0.25, 0.5));
    assert_eq!(handle.breaking_threshold(), 4.0);
    assert_eq!(handle.solver_iterations(), 30);
}

#[test]
fn spring_settings_reach_every_axis() {
    let formulations = [
        (SpringType::Spring1, SpringModel::Explicit),
        (SpringType::Spring2, SpringModel::Implicit),
    ];
    for (spring_type, model) in formulations {
        let mut r = rig(ConstraintType::GenericSpring, |settings| {
            settings.spring_type = spring_type;
            for axis in ConstraintAxis::ALL {
                settings.spring_stiffness[axis.index()] = 1.0 + axis.index() as f32;
                settings.spring_damping[axis.index()] = 0.1 * (axis.index() + 1) as f32;
            }
            settings
                .flag
                .insert(ConstraintFlags::USE_SPRING_X | ConstraintFlags::USE_SPRING_ANG_Y);
        });
        r.scene.update_for_frame(1.0);
        r.scene.update_for_frame(2.0);

        let handle = constraint(&r.scene, r.carrier).expect("spring constraint");
        assert_eq!(handle.kind(), ConstraintKind::Generic6DofSpring(model));
        for (axis, limit_axis) in ConstraintAxis::ALL.into_iter().zip(LimitAxis::ALL) {
            let spring = handle.spring(limit_axis);
            let enabled = matches!(axis, ConstraintAxis::LinX | ConstraintAxis::AngY);
            assert_eq!(spring.enabled, enabled, "{axis:?}");
            assert_relative_eq!(spring.stiffness, 1.0 + axis.index() as f32);
            assert_relative_eq!(spring.damping, 0.1 * (axis.index() + 1) as f32);
        }
    }
}

#[test]
fn motor_settings_reach_the_backend() {
    let mut r = rig(ConstraintType::Motor, |settings| {
        settings.flag.insert(ConstraintFlags::USE_MOTOR_LIN);
        settings.motor_lin_target_velocity = 2.0;
        settings.motor_lin_max_impulse = 5.0;
        settings.motor_ang_target_velocity = -1.5;
        settings.motor_ang_max_impulse = 0.5;
    });
    r.scene.update_for_frame(1.0);
    r.scene.update_for_frame(2.0);

    let handle = constraint(&r.scene, r.carrier).expect("motor");
    assert_eq!(handle.kind(), ConstraintKind::Motor);
    let motor = handle.motor();
    assert!(motor.linear_enabled);
    assert!(!motor.angular_enabled);
    assert_relative_eq!(motor.linear_target_velocity, 2.0);
    assert_relative_eq!(motor.linear_max_impulse, 5.0);
    assert_relative_eq!(motor.angular_target_velocity, -1.5);
    assert_relative_eq!(motor.angular_max_impulse, 0.5);
}

#[test]
fn flagged_settings_are_patched_in_place() {
    let mut r = rig(ConstraintType::Slider, |_| {});
    r.scene.update_for_frame(1.0);
    r.scene.update_for_frame(2.0);
    assert_eq!(
        constraint(&r.scene, r.carrier).map(|h| h.limits(LimitAxis::LinX)),
        Some((0.0, -1.0))
    );

    if let Some(settings) = r
        .scene
        .object_mut(r.carrier)
        .and_then(|o| o.rigidbody_constraint.as_mut())
    {
        settings.set_limit(ConstraintAxis::LinX, -0.5, 0.5);
    }
    r.scene.update_for_frame(3.0);

    let handle = constraint(&r.scene, r.carrier).expect("slider");
    assert_eq!(handle.limits(LimitAxis::LinX), (-0.5, 0.5));
    let dirty = r
        .scene
        .object(r.carrier)
        .and_then(|o| o.rigidbody_constraint.as_ref())
        .map(|s| s.dirty);
    assert_eq!(dirty, Some(rigidbody::DirtyState::Clean));
}

#[test]
fn unset_carrier_gets_default_fixed_settings() {
    let mut r = rig(ConstraintType::Fixed, |_| {});
    let loose = r.scene.add_object(Object::new_empty("loose"));
    let constraints = r
        .scene
        .rigidbody_world
        .as_ref()
        .and_then(|rbw| rbw.constraints)
        .expect("constraint group");
    r.scene.link_object(constraints, loose);

    r.scene.update_for_frame(1.0);
    r.scene.update_for_frame(2.0);

    let settings = r
        .scene
        .object(loose)
        .and_then(|o| o.rigidbody_constraint.as_ref())
        .expect("defaults created");
    assert_eq!(settings.constraint_type, ConstraintType::Fixed);
    assert!(settings.physics_constraint.is_none());
    let defaults = ConstraintFlags::ENABLED | ConstraintFlags::DISABLE_COLLISIONS;
    assert!(settings.flag.contains(defaults));
}
