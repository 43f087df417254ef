//! Scene-level simulation world lifecycle.

use glam::Vec3;

use super::{cache::PointCache, constraint, settings::RigidBodyWorld};
use crate::{
    backend::DynamicsWorld,
    scene::{Group, Object, Scene},
    utils::allocator::{Arena, GroupId, ObjectId},
};

/// New world settings spanning the scene's frame range. The backend world is
/// created lazily by the first rebuild.
pub fn create_world(scene: &Scene) -> Option<RigidBodyWorld> {
    Some(RigidBodyWorld::new(scene.start_frame, scene.end_frame))
}

/// Copies the settings of a world. The copy owns no backend state and starts
/// with an empty object array and an empty, outdated cache.
pub fn copy_world(rbw: &RigidBodyWorld) -> Option<RigidBodyWorld> {
    Some(RigidBodyWorld {
        group: rbw.group,
        constraints: rbw.constraints,
        time_scale: rbw.time_scale,
        steps_per_second: rbw.steps_per_second,
        num_solver_iterations: rbw.num_solver_iterations,
        ltime: rbw.ltime,
        flag: rbw.flag,
        gravity_weight: rbw.gravity_weight,
        use_global_gravity: rbw.use_global_gravity,
        point_cache: PointCache::new(rbw.point_cache.start_frame, rbw.point_cache.end_frame),
        physics_world: None,
        objects: None,
    })
}

/// Creates the backend world if missing (or recreates it with `rebuild`),
/// then pushes the solver settings.
pub fn validate_world(rbw: &mut RigidBodyWorld, scene_gravity: Vec3, rebuild: bool) {
    if rebuild || rbw.physics_world.is_none() {
        rbw.physics_world = Some(DynamicsWorld::new(rbw.effective_gravity(scene_gravity)));
        log::debug!("created dynamics world (rebuild: {rebuild})");
    }
    let iterations = rbw.num_solver_iterations;
    let split_impulse = rbw.use_split_impulse();
    if let Some(world) = rbw.physics_world.as_mut() {
        world.set_solver_iterations(iterations);
        world.set_split_impulse(split_impulse);
    }
}

/// Unregisters every constraint and body of the world's groups, then drops
/// the backend world and the object array. Settings and handles stay on the
/// objects, so the world can be validated again later.
pub fn free_world(
    rbw: &mut RigidBodyWorld,
    objects: &Arena<ObjectId, Object>,
    groups: &Arena<GroupId, Group>,
) {
    if let Some(world) = rbw.physics_world.as_mut() {
        for id in group_members(groups, objects, rbw.constraints) {
            let handle = objects
                .get(id)
                .and_then(|object| object.rigidbody_constraint.as_ref())
                .and_then(|settings| settings.physics_constraint.as_ref());
            if let Some(handle) = handle {
                world.remove_constraint(handle);
            }
        }
        for id in group_members(groups, objects, rbw.group) {
            let body = objects
                .get(id)
                .and_then(|object| object.rigidbody_object.as_ref())
                .and_then(|settings| settings.physics_object.as_ref());
            if let Some(body) = body {
                world.remove_body(body);
            }
        }
        log::debug!(
            "freeing dynamics world ({} bodies, {} constraints left registered)",
            world.body_count(),
            world.constraint_count()
        );
    }
    rbw.physics_world = None;
    rbw.objects = None;
}

/// Live members of `group`, in group order.
pub(crate) fn group_members(
    groups: &Arena<GroupId, Group>,
    objects: &Arena<ObjectId, Object>,
    group: Option<GroupId>,
) -> Vec<ObjectId> {
    group
        .and_then(|id| groups.get(id))
        .map(|group| {
            group
                .objects()
                .iter()
                .copied()
                .filter(|id| objects.contains(*id))
                .collect()
        })
        .unwrap_or_default()
}

/// Rebuilds the flat object array from the body group.
pub fn update_ob_array(
    rbw: &mut RigidBodyWorld,
    groups: &Arena<GroupId, Group>,
    objects: &Arena<ObjectId, Object>,
) {
    rbw.objects = Some(group_members(groups, objects, rbw.group));
}

/// Per-frame world refresh: effective gravity and the object array.
pub fn update_sim_world(
    rbw: &mut RigidBodyWorld,
    scene_gravity: Vec3,
    groups: &Arena<GroupId, Group>,
    objects: &Arena<ObjectId, Object>,
) {
    let gravity = rbw.effective_gravity(scene_gravity);
    if let Some(world) = rbw.physics_world.as_mut() {
        world.set_gravity(gravity);
    }
    update_ob_array(rbw, groups, objects);
}

/// Whether object transforms come from the simulation at `ctime`.
pub fn check_sim_running(rbw: Option<&RigidBodyWorld>, ctime: f32) -> bool {
    rbw.is_some_and(|rbw| !rbw.is_muted() && ctime > rbw.point_cache.start_frame as f32)
}

/// Marks cached frames as stale.
pub fn cache_reset(rbw: Option<&mut RigidBodyWorld>) {
    if let Some(rbw) = rbw {
        rbw.point_cache.mark_outdated();
    }
}

/// Takes `id` out of the simulation: unlinks it from the body group, tears
/// down constraints that reference it and drops its settings.
pub fn remove_object(scene: &mut Scene, id: ObjectId) {
    let Scene {
        rigidbody_world,
        objects,
        groups,
        ..
    } = scene;

    if let Some(rbw) = rigidbody_world.as_mut() {
        if let Some(group) = rbw.group.and_then(|group| groups.get_mut(group)) {
            group.remove_object(id);
        }
        if let Some(array) = rbw.objects.as_mut() {
            array.retain(|member| *member != id);
        }

        for carrier in group_members(groups, objects, rbw.constraints) {
            let references = objects
                .get(carrier)
                .and_then(|object| object.rigidbody_constraint.as_ref())
                .is_some_and(|settings| settings.ob1 == Some(id) || settings.ob2 == Some(id));
            if references {
                detach_constraint(rbw, objects, groups, carrier);
            }
        }
    }

    if let Some(object) = objects.get_mut(id) {
        super::object::free_object(rigidbody_world.as_mut(), object);
    }
    cache_reset(rigidbody_world.as_mut());
}

/// Takes a constraint carrier out of the simulation and drops its settings.
pub fn remove_constraint(scene: &mut Scene, id: ObjectId) {
    let Scene {
        rigidbody_world,
        objects,
        groups,
        ..
    } = scene;
    match rigidbody_world.as_mut() {
        Some(rbw) => detach_constraint(rbw, objects, groups, id),
        None => {
            if let Some(object) = objects.get_mut(id) {
                constraint::free_constraint(None, object);
            }
        }
    }
}

fn detach_constraint(
    rbw: &mut RigidBodyWorld,
    objects: &mut Arena<ObjectId, Object>,
    groups: &mut Arena<GroupId, Group>,
    carrier: ObjectId,
) {
    if let Some(group) = rbw.constraints.and_then(|group| groups.get_mut(group)) {
        group.remove_object(carrier);
    }
    if let Some(object) = objects.get_mut(carrier) {
        constraint::free_constraint(Some(&mut *rbw), object);
    }
    cache_reset(Some(rbw));
}
