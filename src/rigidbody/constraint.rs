//! Keeps each carrier's backend constraint consistent with its settings and
//! with the bodies of its two participants.

use glam::{Quat, Vec3};

use super::{
    settings::{
        ConstraintAxis, ConstraintFlags, ConstraintType, DirtyState, RigidBodyCon, RigidBodyWorld,
        SpringType,
    },
    world::cache_reset,
};
use crate::{
    backend::{BodyHandle, BodyLink, ConstraintHandle, DynamicsWorld, LimitAxis, SpringModel},
    scene::Object,
    utils::{
        allocator::{Arena, ObjectId},
        math::mat4_to_loc_quat,
    },
};

fn backend_axis(axis: ConstraintAxis) -> LimitAxis {
    match axis {
        ConstraintAxis::LinX => LimitAxis::LinX,
        ConstraintAxis::LinY => LimitAxis::LinY,
        ConstraintAxis::LinZ => LimitAxis::LinZ,
        ConstraintAxis::AngX => LimitAxis::AngX,
        ConstraintAxis::AngY => LimitAxis::AngY,
        ConstraintAxis::AngZ => LimitAxis::AngZ,
    }
}

fn spring_model(spring_type: SpringType) -> SpringModel {
    match spring_type {
        SpringType::Spring1 => SpringModel::Explicit,
        SpringType::Spring2 => SpringModel::Implicit,
    }
}

/// Creates default settings for a constraint carrier.
///
/// Returns `None` if the object already carries a constraint.
pub fn create_constraint(
    rbw: Option<&mut RigidBodyWorld>,
    object: &Object,
    constraint_type: ConstraintType,
) -> Option<RigidBodyCon> {
    if object.rigidbody_constraint.is_some() {
        return None;
    }
    cache_reset(rbw);
    Some(RigidBodyCon::new(constraint_type))
}

/// Duplicates constraint settings without the handle.
pub fn copy_constraint(object: &Object) -> Option<RigidBodyCon> {
    let source = object.rigidbody_constraint.as_ref()?;
    Some(RigidBodyCon {
        constraint_type: source.constraint_type,
        ob1: source.ob1,
        ob2: source.ob2,
        flag: source.flag,
        breaking_threshold: source.breaking_threshold,
        num_solver_iterations: source.num_solver_iterations,
        limit_lower: source.limit_lower,
        limit_upper: source.limit_upper,
        spring_stiffness: source.spring_stiffness,
        spring_damping: source.spring_damping,
        spring_type: source.spring_type,
        motor_lin_max_impulse: source.motor_lin_max_impulse,
        motor_ang_max_impulse: source.motor_ang_max_impulse,
        motor_lin_target_velocity: source.motor_lin_target_velocity,
        motor_ang_target_velocity: source.motor_ang_target_velocity,
        dirty: DirtyState::NeedsValidate,
        physics_constraint: None,
    })
}

/// Drops the carrier's constraint settings after unregistering the handle.
pub fn free_constraint(rbw: Option<&mut RigidBodyWorld>, object: &mut Object) {
    let Some(settings) = object.rigidbody_constraint.take() else {
        return;
    };
    let world = rbw.and_then(|rbw| rbw.physics_world.as_mut());
    if let (Some(world), Some(handle)) = (world, settings.physics_constraint.as_ref()) {
        world.remove_constraint(handle);
    }
}

/// Removes, drops and clears the carrier's backend constraint, if any.
pub(crate) fn teardown(world: Option<&mut DynamicsWorld>, settings: &mut RigidBodyCon) -> bool {
    let Some(handle) = settings.physics_constraint.take() else {
        return false;
    };
    if let Some(world) = world {
        world.remove_constraint(&handle);
    }
    true
}

fn participant_link(objects: &Arena<ObjectId, Object>, id: Option<ObjectId>) -> Option<BodyLink> {
    objects
        .get(id?)?
        .rigidbody_object
        .as_ref()?
        .physics_object
        .as_ref()
        .map(BodyHandle::link)
}

fn new_handle(
    settings: &RigidBodyCon,
    (pivot, rotation): (Vec3, Quat),
    a: &BodyLink,
    b: &BodyLink,
) -> Option<ConstraintHandle> {
    match settings.constraint_type {
        ConstraintType::Point => ConstraintHandle::new_point(pivot, a, b),
        ConstraintType::Fixed => ConstraintHandle::new_fixed(pivot, rotation, a, b),
        ConstraintType::Hinge => ConstraintHandle::new_hinge(pivot, rotation, a, b),
        ConstraintType::Slider => ConstraintHandle::new_slider(pivot, rotation, a, b),
        ConstraintType::Piston => ConstraintHandle::new_piston(pivot, rotation, a, b),
        ConstraintType::Generic => ConstraintHandle::new_6dof(pivot, rotation, a, b),
        ConstraintType::GenericSpring => ConstraintHandle::new_6dof_spring(
            pivot,
            rotation,
            a,
            b,
            spring_model(settings.spring_type),
        ),
        ConstraintType::Motor => ConstraintHandle::new_motor(pivot, rotation, a, b),
    }
}

/// Type-specific parameters: limits, springs and motor.
///
/// The spring rest state is only captured when the constraint is created, so
/// patching a live constraint keeps its equilibrium.
fn apply_type_settings(
    handle: &mut ConstraintHandle,
    settings: &RigidBodyCon,
    capture_equilibrium: bool,
) {
    match settings.constraint_type {
        ConstraintType::Point | ConstraintType::Fixed => {}
        ConstraintType::Hinge => {
            let (lower, upper) = settings.effective_limit(ConstraintAxis::AngZ);
            handle.set_limits_hinge(lower, upper);
        }
        ConstraintType::Slider => {
            let (lower, upper) = settings.effective_limit(ConstraintAxis::LinX);
            handle.set_limits_slider(lower, upper);
        }
        ConstraintType::Piston => {
            let (lin_lower, lin_upper) = settings.effective_limit(ConstraintAxis::LinX);
            let (ang_lower, ang_upper) = settings.effective_limit(ConstraintAxis::AngX);
            handle.set_limits_piston(lin_lower, lin_upper, ang_lower, ang_upper);
        }
        ConstraintType::Generic | ConstraintType::GenericSpring => {
            if settings.constraint_type == ConstraintType::GenericSpring {
                for axis in ConstraintAxis::ALL {
                    let limit_axis = backend_axis(axis);
                    handle.set_spring(limit_axis, settings.flag.contains(axis.spring_flag()));
                    handle.set_stiffness(limit_axis, settings.spring_stiffness[axis.index()]);
                    handle.set_damping(limit_axis, settings.spring_damping[axis.index()]);
                }
                if capture_equilibrium {
                    handle.set_equilibrium_point();
                }
            }
            for axis in ConstraintAxis::ALL {
                let (lower, upper) = settings.effective_limit(axis);
                handle.set_limits(backend_axis(axis), lower, upper);
            }
        }
        ConstraintType::Motor => {
            handle.set_enable_motor(
                settings.flag.contains(ConstraintFlags::USE_MOTOR_LIN),
                settings.flag.contains(ConstraintFlags::USE_MOTOR_ANG),
            );
            handle.set_max_impulse_motor(
                settings.motor_lin_max_impulse,
                settings.motor_ang_max_impulse,
            );
            handle.set_target_velocity_motor(
                settings.motor_lin_target_velocity,
                settings.motor_ang_target_velocity,
            );
        }
    }
}

fn apply_common_settings(handle: &mut ConstraintHandle, settings: &RigidBodyCon) {
    handle.set_enabled(settings.flag.contains(ConstraintFlags::ENABLED));
    handle.set_breaking_threshold(settings.effective_breaking_threshold());
    handle.set_solver_iterations(settings.effective_solver_iterations());
}

/// Tears the carrier's constraint down once either participant has lost its
/// body. Runs on every step, whether or not the carrier is flagged.
pub(crate) fn release_orphaned(
    rbw: &mut RigidBodyWorld,
    objects: &mut Arena<ObjectId, Object>,
    carrier: ObjectId,
) {
    let Some(settings) = objects
        .get(carrier)
        .and_then(|object| object.rigidbody_constraint.as_ref())
    else {
        return;
    };
    if settings.physics_constraint.is_none() {
        return;
    }
    if participant_link(objects, settings.ob1).is_some()
        && participant_link(objects, settings.ob2).is_some()
    {
        return;
    }

    let settings = objects
        .get_mut(carrier)
        .and_then(|object| object.rigidbody_constraint.as_mut());
    if let Some(settings) = settings {
        if teardown(rbw.physics_world.as_mut(), settings) {
            log::debug!("constraint on {carrier:?} lost a participant, tearing it down");
        }
    }
}

/// Ensures the carrier has a registered constraint between the bodies of its
/// two participants.
///
/// If either participant is gone or has no body, any existing constraint is
/// torn down instead: a constraint never outlives one of its bodies.
pub fn validate_constraint(
    rbw: &mut RigidBodyWorld,
    objects: &mut Arena<ObjectId, Object>,
    carrier: ObjectId,
    rebuild: bool,
) {
    let Some(carrier_object) = objects.get(carrier) else {
        return;
    };
    let Some(settings) = carrier_object.rigidbody_constraint.as_ref() else {
        return;
    };
    let links = (
        participant_link(objects, settings.ob1),
        participant_link(objects, settings.ob2),
    );
    let frame = mat4_to_loc_quat(&carrier_object.obmat);

    let Some(settings) = objects
        .get_mut(carrier)
        .and_then(|object| object.rigidbody_constraint.as_mut())
    else {
        return;
    };
    let mut world = rbw.physics_world.as_mut();

    let (Some(link_a), Some(link_b)) = links else {
        if teardown(world, settings) {
            log::debug!("constraint on {carrier:?} lost a participant, tearing it down");
        }
        return;
    };

    if !rebuild {
        if let (Some(world), Some(handle)) =
            (world.as_deref_mut(), settings.physics_constraint.as_ref())
        {
            world.remove_constraint(handle);
        }
    }

    if settings.physics_constraint.is_none() || rebuild {
        teardown(world.as_deref_mut(), settings);
        let Some(mut handle) = new_handle(settings, frame, &link_a, &link_b) else {
            return;
        };
        apply_type_settings(&mut handle, settings, true);
        apply_common_settings(&mut handle, settings);
        settings.physics_constraint = Some(handle);
    } else if let Some(mut handle) = settings.physics_constraint.take() {
        apply_type_settings(&mut handle, settings, false);
        apply_common_settings(&mut handle, settings);
        settings.physics_constraint = Some(handle);
    }

    if let (Some(world), Some(handle)) = (world, settings.physics_constraint.as_ref()) {
        world.add_constraint(
            handle,
            settings.flag.contains(ConstraintFlags::DISABLE_COLLISIONS),
        );
    }
}
