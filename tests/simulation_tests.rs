#![cfg(feature = "backend")]

use approx::assert_relative_eq;
use rigidbody_sync::{
    rigidbody::{self, ObjectFlags, RigidBodyType, WorldFlags},
    scene::{Group, Mesh, Object, Scene},
    GroupId, ObjectId, Quat, Vec3,
};

fn scene_with_world() -> (Scene, GroupId) {
    let mut scene = Scene::new();
    let bodies = scene.add_group(Group::new("RigidBodyWorld"));
    let mut rbw = rigidbody::create_world(&scene).expect("world settings");
    rbw.group = Some(bodies);
    rbw.steps_per_second = 60;
    scene.rigidbody_world = Some(rbw);
    (scene, bodies)
}

fn add_cube(
    scene: &mut Scene,
    group: GroupId,
    name: &str,
    loc: Vec3,
    body_type: RigidBodyType,
) -> ObjectId {
    let mut object = Object::new_mesh(name, Mesh::cuboid(Vec3::splat(0.5)))
        .with_location(loc);
    object.rigidbody_object =
        rigidbody::create_object(scene.rigidbody_world.as_mut(), &object, body_type);
    let id = scene.add_object(object);
    assert!(scene.link_object(group, id));
    id
}

fn world_location(scene: &Scene, id: ObjectId) -> Vec3 {
    scene
        .object(id)
        .expect("object exists")
        .obmat
        .w_axis
        .truncate()
}

fn step_count(scene: &Scene) -> u64 {
    scene
        .rigidbody_world
        .as_ref()
        .and_then(|rbw| rbw.physics_world.as_ref())
        .map_or(0, |world| world.step_count())
}

fn ltime(scene: &Scene) -> f32 {
    scene.rigidbody_world.as_ref().map_or(f32::NAN, |rbw| rbw.ltime)
}

#[test]
fn box_falls_and_settles_on_ground() {
    let (mut scene, bodies) = scene_with_world();
    let cube = add_cube(&mut scene, bodies, "cube", Vec3::ZERO, RigidBodyType::Active);
    add_cube(
        &mut scene,
        bodies,
        "ground",
        Vec3::new(0.0, 0.0, -2.0),
        RigidBodyType::Passive,
    );

    let mut heights = Vec::new();
    for frame in 1..=60 {
        scene.update_for_frame(frame as f32);
        heights.push(world_location(&scene, cube).z);
    }

    // Free fall until the first contact around frame ten.
    for pair in heights[..10].windows(2) {
        assert!(pair[1] <= pair[0] + 1e-4, "box should not rise while falling: {pair:?}");
    }
    assert!(heights[5] < -0.05, "box should be falling, z = {}", heights[5]);

    let rest = heights[59];
    assert!(rest > -1.1 && rest < -0.85, "box should rest on the ground, z = {rest}");
    assert!((heights[59] - heights[54]).abs() < 0.01, "box should have settled");
    assert_relative_eq!(world_location(&scene, cube).x, 0.0, epsilon = 0.05);
}

#[test]
fn single_frame_advance_steps_once() {
    let (mut scene, bodies) = scene_with_world();
    add_cube(&mut scene, bodies, "cube", Vec3::ZERO, RigidBodyType::Active);

    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);
    assert_eq!(ltime(&scene), 2.0);
    assert_eq!(step_count(&scene), 1);

    scene.update_for_frame(2.0);
    assert_eq!(ltime(&scene), 2.0);
    assert_eq!(step_count(&scene), 1);

    scene.update_for_frame(3.0);
    assert_eq!(ltime(&scene), 3.0);
    assert_eq!(step_count(&scene), 2);
}

#[test]
fn jumping_ahead_does_not_step() {
    let (mut scene, bodies) = scene_with_world();
    let cube = add_cube(&mut scene, bodies, "cube", Vec3::ZERO, RigidBodyType::Active);

    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);
    let before = world_location(&scene, cube);

    scene.update_for_frame(7.0);
    assert_eq!(ltime(&scene), 2.0);
    assert_eq!(step_count(&scene), 1);
    assert_eq!(world_location(&scene, cube), before);
}

#[test]
fn frames_past_the_end_are_clamped() {
    let (mut scene, bodies) = scene_with_world();
    add_cube(&mut scene, bodies, "cube", Vec3::ZERO, RigidBodyType::Active);
    if let Some(rbw) = scene.rigidbody_world.as_mut() {
        rbw.point_cache.end_frame = 3;
    }

    for frame in 1..=3 {
        scene.update_for_frame(frame as f32);
    }
    scene.update_for_frame(10.0);
    assert_eq!(ltime(&scene), 3.0);
    assert_eq!(step_count(&scene), 2);
}

#[test]
fn returning_to_start_resets_time() {
    let (mut scene, bodies) = scene_with_world();
    let cube = add_cube(&mut scene, bodies, "cube", Vec3::ZERO, RigidBodyType::Active);

    for frame in 1..=4 {
        scene.update_for_frame(frame as f32);
    }
    scene.update_for_frame(1.0);
    assert_eq!(ltime(&scene), 1.0);
    assert_eq!(world_location(&scene, cube), Vec3::ZERO);
}

#[test]
fn simulated_frames_replay_from_cache() {
    let (mut scene, bodies) = scene_with_world();
    let cube = add_cube(&mut scene, bodies, "cube", Vec3::ZERO, RigidBodyType::Active);

    let mut at_five = Vec3::ZERO;
    for frame in 1..=10 {
        scene.update_for_frame(frame as f32);
        if frame == 5 {
            at_five = world_location(&scene, cube);
        }
    }
    let steps = step_count(&scene);
    assert_eq!(steps, 9);

    scene.update_for_frame(1.0);
    scene.update_for_frame(5.0);
    assert_eq!(ltime(&scene), 5.0);
    assert_eq!(step_count(&scene), steps);
    assert_relative_eq!(world_location(&scene, cube).z, at_five.z, epsilon = 1e-6);
}

#[test]
fn muted_world_keeps_object_transforms() {
    let (mut scene, bodies) = scene_with_world();
    let cube = add_cube(
        &mut scene,
        bodies,
        "cube",
        Vec3::new(0.0, 0.0, 5.0),
        RigidBodyType::Active,
    );
    if let Some(rbw) = scene.rigidbody_world.as_mut() {
        rbw.flag.insert(WorldFlags::MUTED);
    }

    for frame in 1..=5 {
        scene.update_for_frame(frame as f32);
    }
    assert_eq!(step_count(&scene), 0);
    assert_eq!(world_location(&scene, cube), Vec3::new(0.0, 0.0, 5.0));
}

#[test]
fn kinematic_and_passive_objects_keep_their_own_transform() {
    let (mut scene, bodies) = scene_with_world();
    let ground = add_cube(
        &mut scene,
        bodies,
        "ground",
        Vec3::new(0.0, 0.0, -2.0),
        RigidBodyType::Passive,
    );
    let driven = add_cube(
        &mut scene,
        bodies,
        "driven",
        Vec3::new(3.0, 0.0, 0.0),
        RigidBodyType::Active,
    );
    if let Some(settings) = scene
        .object_mut(driven)
        .and_then(|o| o.rigidbody_object.as_mut())
    {
        settings.flag.insert(ObjectFlags::KINEMATIC);
    }

    for frame in 1..=6 {
        if frame == 4 {
            if let Some(object) = scene.object_mut(driven) {
                object.loc = Vec3::new(3.0, 1.0, 0.0);
            }
        }
        scene.update_for_frame(frame as f32);
    }

    assert_eq!(world_location(&scene, ground), Vec3::new(0.0, 0.0, -2.0));
    assert_eq!(world_location(&scene, driven), Vec3::new(3.0, 1.0, 0.0));

    let body_position = scene
        .object(driven)
        .and_then(|o| o.rigidbody_object.as_ref())
        .and_then(|s| s.physics_object.as_ref())
        .map(|body| body.position());
    assert_eq!(body_position, Some(Vec3::new(3.0, 1.0, 0.0)));
}

#[test]
fn sync_ignores_simulated_transform_for_passive_bodies() {
    let (mut scene, bodies) = scene_with_world();
    let ground = add_cube(
        &mut scene,
        bodies,
        "ground",
        Vec3::new(0.0, 0.0, -2.0),
        RigidBodyType::Passive,
    );
    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);

    let Scene {
        objects,
        rigidbody_world,
        ..
    } = &mut scene;
    let object = objects.get_mut(ground).expect("ground");
    if let Some(settings) = object.rigidbody_object.as_mut() {
        settings.pos = Vec3::new(9.0, 9.0, 9.0);
        settings.orn = Quat::from_rotation_x(1.0);
    }
    let before = object.obmat;
    rigidbody::sync_transforms(rigidbody_world.as_ref(), object, 2.0, false);
    assert_eq!(object.obmat, before);
}

#[test]
fn active_objects_keep_their_scale_while_simulated() {
    let (mut scene, bodies) = scene_with_world();
    let cube = add_cube(&mut scene, bodies, "cube", Vec3::ZERO, RigidBodyType::Active);
    if let Some(object) = scene.object_mut(cube) {
        object.scale = Vec3::new(2.0, 1.0, 0.5);
    }

    for frame in 1..=3 {
        scene.update_for_frame(frame as f32);
    }
    let (scale, _, translation) = scene
        .object(cube)
        .expect("cube")
        .obmat
        .to_scale_rotation_translation();
    assert_relative_eq!(scale.x, 2.0, epsilon = 1e-4);
    assert_relative_eq!(scale.z, 0.5, epsilon = 1e-4);
    assert!(translation.z < 0.0);
}

#[test]
fn new_group_members_get_default_active_settings() {
    let (mut scene, bodies) = scene_with_world();
    let plain = scene.add_object(Object::new_mesh("plain", Mesh::cuboid(Vec3::splat(0.5))));
    scene.link_object(bodies, plain);

    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);

    let settings = scene
        .object(plain)
        .and_then(|o| o.rigidbody_object.as_ref())
        .expect("settings created on demand");
    assert_eq!(settings.body_type, RigidBodyType::Active);
    assert!(settings.physics_object.is_some());
    assert_eq!(scene.rigidbody_world.as_ref().map(|rbw| rbw.numbodies()), Some(1));
}
