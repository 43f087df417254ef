//! Frame synchronization between the scene and the backend world.

use glam::{Mat4, Vec3};

use super::{
    cache::CachedTransform,
    constraint::{create_constraint, release_orphaned, teardown, validate_constraint},
    object::{create_object, reshape_body, update_body, validate_body},
    settings::{ConstraintType, DirtyState, RigidBodyType, RigidBodyWorld},
    world::{check_sim_running, group_members, update_ob_array, update_sim_world, validate_world},
};
use crate::{
    scene::{Group, Object, Scene},
    utils::{
        allocator::{Arena, GroupId, ObjectId},
        logging::ScopedTimer,
        math::{mat4_to_loc_quat, mat4_to_size, normalize_or_identity},
    },
};

/// Scene state the per-step update reads alongside the world.
struct SceneView<'a> {
    objects: &'a mut Arena<ObjectId, Object>,
    groups: &'a Arena<GroupId, Group>,
    gravity: Vec3,
    ctime: f32,
    is_interactive_drag: bool,
}

/// Object transform evaluation: world matrix from the object's own channels,
/// then overridden by the simulation where it applies.
pub fn where_is_calc(
    rbw: Option<&RigidBodyWorld>,
    object: &mut Object,
    ctime: f32,
    is_interactive_drag: bool,
) {
    object.where_is_calc();
    sync_transforms(rbw, object, ctime, is_interactive_drag);
}

/// Reconciles an object's world matrix with its simulated transform.
///
/// Kinematic and passive objects always keep their own transform. While the
/// simulation runs, other objects take the simulated rotation and location
/// and keep their own scale; otherwise the simulated transform is refreshed
/// from the object.
pub fn sync_transforms(
    rbw: Option<&RigidBodyWorld>,
    object: &mut Object,
    ctime: f32,
    is_interactive_drag: bool,
) {
    let Some(settings) = object.rigidbody_object.as_mut() else {
        return;
    };
    if rbw.is_none() || settings.is_kinematic() || settings.body_type == RigidBodyType::Passive {
        return;
    }

    let dragged = object.selected && is_interactive_drag;
    if check_sim_running(rbw, ctime) && !dragged {
        settings.orn = normalize_or_identity(settings.orn);
        let size = mat4_to_size(&object.obmat);
        object.obmat =
            Mat4::from_rotation_translation(settings.orn, settings.pos) * Mat4::from_scale(size);
    } else {
        (settings.pos, settings.orn) = mat4_to_loc_quat(&object.obmat);
    }
}

/// Brings every body and constraint up to date with the scene.
///
/// A rebuild recreates the backend world and tears down every constraint
/// before any body is touched, then rebuilds all handles.
fn update_simulation(rbw: &mut RigidBodyWorld, scene: &mut SceneView<'_>, rebuild: bool) {
    if rebuild {
        validate_world(rbw, scene.gravity, true);
        for id in group_members(scene.groups, scene.objects, rbw.constraints) {
            if let Some(settings) = scene
                .objects
                .get_mut(id)
                .and_then(|object| object.rigidbody_constraint.as_mut())
            {
                teardown(rbw.physics_world.as_mut(), settings);
            }
        }
    }
    update_sim_world(rbw, scene.gravity, scene.groups, scene.objects);

    let bodies = rbw.objects.clone().unwrap_or_default();
    for id in bodies {
        let Some(object) = scene.objects.get_mut(id) else {
            continue;
        };
        where_is_calc(Some(&*rbw), object, scene.ctime, scene.is_interactive_drag);

        let (mut settings, created) = match object.rigidbody_object.take() {
            Some(settings) => (settings, false),
            None => match create_object(Some(&mut *rbw), object, RigidBodyType::Active) {
                Some(settings) => (settings, true),
                None => continue,
            },
        };

        let world = rbw.physics_world.as_mut();
        if rebuild || created {
            validate_body(world, object, &mut settings, true);
        } else if settings.dirty == DirtyState::NeedsReshape {
            validate_body(world, object, &mut settings, false);
            reshape_body(object, &mut settings);
        } else if settings.dirty == DirtyState::NeedsValidate {
            validate_body(world, object, &mut settings, false);
        }
        settings.dirty = DirtyState::Clean;

        update_body(object, &mut settings, scene.is_interactive_drag);
        object.rigidbody_object = Some(settings);
    }

    for id in group_members(scene.groups, scene.objects, rbw.constraints) {
        let (created, dirty) = {
            let Some(object) = scene.objects.get_mut(id) else {
                continue;
            };
            where_is_calc(Some(&*rbw), object, scene.ctime, scene.is_interactive_drag);
            match object.rigidbody_constraint.as_ref() {
                Some(settings) => (false, settings.dirty),
                None => {
                    object.rigidbody_constraint =
                        create_constraint(Some(&mut *rbw), object, ConstraintType::Fixed);
                    (true, DirtyState::NeedsValidate)
                }
            }
        };

        if rebuild || created {
            validate_constraint(rbw, scene.objects, id, true);
        } else if dirty != DirtyState::Clean {
            validate_constraint(rbw, scene.objects, id, false);
        } else {
            release_orphaned(rbw, scene.objects, id);
        }

        if let Some(settings) = scene
            .objects
            .get_mut(id)
            .and_then(|object| object.rigidbody_constraint.as_mut())
        {
            settings.dirty = DirtyState::Clean;
        }
    }
}

/// Restores bodies the user dragged this step and copies every body's
/// simulated transform into its settings.
fn update_simulation_post_step(
    rbw: &RigidBodyWorld,
    objects: &mut Arena<ObjectId, Object>,
    is_interactive_drag: bool,
) {
    for id in rbw.objects.iter().flatten() {
        let Some(object) = objects.get_mut(*id) else {
            continue;
        };
        let dragged = object.selected && is_interactive_drag;
        let Some(settings) = object.rigidbody_object.as_mut() else {
            continue;
        };
        let kinematic = settings.kinematic_state();
        let mass = settings.simulation_mass();
        let passive = settings.body_type == RigidBodyType::Passive;
        let Some(body) = settings.physics_object.as_mut() else {
            continue;
        };

        if dragged {
            body.set_kinematic_state(kinematic);
            body.set_mass(mass);
            if passive {
                body.deactivate();
            }
        }
        let (pos, orn) = (body.position(), body.orientation());
        settings.pos = pos;
        settings.orn = orn;
    }
}

fn write_cache(rbw: &mut RigidBodyWorld, objects: &Arena<ObjectId, Object>, frame: i32) {
    let transforms = rbw
        .objects
        .iter()
        .flatten()
        .filter_map(|id| {
            let settings = objects.get(*id)?.rigidbody_object.as_ref()?;
            (settings.body_type == RigidBodyType::Active).then_some(CachedTransform {
                object: *id,
                pos: settings.pos,
                orn: settings.orn,
            })
        })
        .collect();
    rbw.point_cache.write(frame, transforms);
}

fn read_cache(rbw: &RigidBodyWorld, objects: &mut Arena<ObjectId, Object>, frame: i32) -> bool {
    let Some(transforms) = rbw.point_cache.read(frame) else {
        return false;
    };
    for cached in transforms {
        let settings = objects
            .get_mut(cached.object)
            .and_then(|object| object.rigidbody_object.as_mut());
        if let Some(settings) = settings {
            if settings.body_type == RigidBodyType::Active {
                settings.pos = cached.pos;
                settings.orn = cached.orn;
            }
        }
    }
    true
}

/// Rebuilds the simulation from scratch when playback restarts at the first
/// simulated frame and the cache no longer matches the scene.
pub fn rebuild_world(scene: &mut Scene, ctime: f32) {
    let gravity = scene.effective_gravity();
    let Scene {
        rigidbody_world,
        objects,
        groups,
        transforming,
        ..
    } = scene;
    let Some(rbw) = rigidbody_world.as_mut() else {
        return;
    };

    let start = rbw.point_cache.start_frame as f32;
    let members = group_members(groups, objects, rbw.group).len();
    if rbw.physics_world.is_none() || rbw.numbodies() != members {
        rbw.point_cache.mark_outdated();
    }

    if ctime == start + 1.0 && rbw.ltime == start && rbw.point_cache.outdated {
        rbw.point_cache.reset();
        let mut view = SceneView {
            objects: &mut *objects,
            groups: &*groups,
            gravity,
            ctime,
            is_interactive_drag: *transforming,
        };
        update_simulation(rbw, &mut view, true);
        log::debug!("rebuilt rigid body world with {} bodies", rbw.numbodies());
    }
}

/// Advances the simulation to `ctime`.
///
/// The simulation only ever moves forward one frame at a time: jumps leave
/// it untouched, frames at or before the start reset it, and frames past the
/// end are clamped. Previously simulated frames are served from the cache.
pub fn do_simulation(scene: &mut Scene, ctime: f32) {
    let gravity = scene.effective_gravity();
    let fps = scene.frames_per_second;
    let Scene {
        rigidbody_world,
        objects,
        groups,
        transforming,
        ..
    } = scene;
    let Some(rbw) = rigidbody_world.as_mut() else {
        return;
    };

    let start = rbw.point_cache.start_frame as f32;
    let end = rbw.point_cache.end_frame as f32;
    if ctime <= start {
        rbw.ltime = start;
        return;
    }
    let ctime = ctime.min(end);

    if rbw.physics_world.is_none() {
        return;
    }
    if rbw.objects.is_none() {
        update_ob_array(rbw, groups, objects);
    }

    if read_cache(rbw, objects, ctime as i32) {
        rbw.ltime = ctime;
        return;
    }

    let can_simulate = ctime == rbw.ltime + 1.0 && !rbw.is_muted();
    if !can_simulate {
        return;
    }

    let _timer = ScopedTimer::new("rigidbody frame");
    let mut view = SceneView {
        objects: &mut *objects,
        groups: &*groups,
        gravity,
        ctime,
        is_interactive_drag: *transforming,
    };
    update_simulation(rbw, &mut view, false);

    let timestep = (ctime - rbw.ltime) / fps * rbw.time_scale;
    let fixed_step = rbw.fixed_substep();
    if let Some(world) = rbw.physics_world.as_mut() {
        world.step_simulation(timestep, u32::MAX, fixed_step);
    }

    update_simulation_post_step(rbw, objects, *transforming);
    write_cache(rbw, objects, ctime as i32);
    rbw.ltime = ctime;
}
