#![cfg(feature = "backend")]

use rigidbody_sync::{
    backend::{ShapeGeometry, ShapeHandle},
    rigidbody::{self, CollisionShapeKind, DirtyState, RigidBodyOb, RigidBodyType, RigidBodyWorld},
    scene::{Group, Mesh, Object, Scene},
    ObjectId, Vec3,
};

fn scene_with_world() -> Scene {
    let mut scene = Scene::new();
    let bodies = scene.add_group(Group::new("RigidBodyWorld"));
    let mut rbw = rigidbody::create_world(&scene).expect("world settings");
    rbw.group = Some(bodies);
    scene.rigidbody_world = Some(rbw);
    scene
}

fn body_group(scene: &Scene) -> rigidbody_sync::GroupId {
    scene.rigidbody_world.as_ref().and_then(|rbw| rbw.group).expect("body group")
}

fn add_member(scene: &mut Scene, object: Object) -> ObjectId {
    let group = body_group(scene);
    let id = scene.add_object(object);
    scene.link_object(group, id);
    id
}

#[test]
fn object_array_follows_group_order() {
    let mut scene = scene_with_world();
    let ids: Vec<_> = (0..4)
        .map(|i| add_member(&mut scene, Object::new_empty(format!("ob{i}"))))
        .collect();
    scene.remove_object(ids[1]);

    let Scene {
        rigidbody_world,
        groups,
        objects,
        ..
    } = &mut scene;
    let rbw = rigidbody_world.as_mut().expect("world");
    rigidbody::update_ob_array(rbw, groups, objects);

    assert_eq!(rbw.numbodies(), 3);
    assert_eq!(rbw.objects.as_deref(), Some(&[ids[0], ids[2], ids[3]][..]));
}

#[test]
fn missing_geometry_falls_back_to_bounding_box() {
    let mut scene = scene_with_world();
    let mut mesh = Mesh::cuboid(Vec3::new(0.5, 1.5, 0.25));
    mesh.faces.clear();
    let mut object = Object::new_mesh("points", mesh);
    object.rigidbody_object = Some(RigidBodyOb::new(RigidBodyType::Passive));
    let id = add_member(&mut scene, object);

    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);

    let settings = scene
        .object(id)
        .and_then(|o| o.rigidbody_object.as_ref())
        .expect("settings");
    assert_eq!(settings.shape, CollisionShapeKind::Box);
    match settings.physics_shape.as_ref().map(ShapeHandle::geometry) {
        Some(ShapeGeometry::Box { half_extents }) => {
            assert_eq!(half_extents, Vec3::new(0.5, 1.5, 0.25))
        }
        other => panic!("expected box fallback, got {other:?}"),
    }
    assert!(settings.physics_object.is_some());
}

#[test]
fn non_mesh_objects_simulate_as_unit_boxes() {
    let mut scene = scene_with_world();
    let id = add_member(&mut scene, Object::new_empty("empty"));

    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);

    let settings = scene
        .object(id)
        .and_then(|o| o.rigidbody_object.as_ref())
        .expect("settings");
    match settings.physics_shape.as_ref().map(ShapeHandle::geometry) {
        Some(ShapeGeometry::Box { half_extents }) => {
            assert_eq!(half_extents, Vec3::splat(0.5))
        }
        other => panic!("expected box fallback, got {other:?}"),
    }
}

#[test]
fn reshape_rebuilds_the_collision_shape() {
    let mut scene = scene_with_world();
    let mut object = Object::new_mesh("ball", Mesh::cuboid(Vec3::splat(0.5)));
    object.rigidbody_object = Some(RigidBodyOb::new(RigidBodyType::Active));
    let id = add_member(&mut scene, object);

    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);
    if let Some(settings) = scene
        .object_mut(id)
        .and_then(|o| o.rigidbody_object.as_mut())
    {
        settings.set_shape(CollisionShapeKind::Sphere);
        assert_eq!(settings.dirty, DirtyState::NeedsReshape);
    }
    scene.update_for_frame(3.0);

    let settings = scene
        .object(id)
        .and_then(|o| o.rigidbody_object.as_ref())
        .expect("settings");
    assert_eq!(settings.dirty, DirtyState::Clean);
    assert!(matches!(
        settings.physics_shape.as_ref().map(ShapeHandle::geometry),
        Some(ShapeGeometry::Sphere { radius }) if radius == 0.5
    ));
    let body_margin = settings.physics_object.as_ref().map(|body| body.shape_margin());
    assert_eq!(body_margin, settings.physics_shape.as_ref().map(ShapeHandle::margin));
}

#[test]
fn membership_change_forces_rebuild_at_first_frame() {
    let mut scene = scene_with_world();
    add_member(&mut scene, Object::new_mesh("a", Mesh::cuboid(Vec3::splat(0.5))));
    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);
    scene.update_for_frame(1.0);

    let b = Object::new_mesh("b", Mesh::cuboid(Vec3::splat(0.5)))
        .with_location(Vec3::X * 3.0);
    add_member(&mut scene, b);
    scene.update_for_frame(2.0);

    let rbw = scene.rigidbody_world.as_ref().expect("world");
    assert_eq!(rbw.numbodies(), 2);
    assert_eq!(rbw.physics_world.as_ref().map(|world| world.body_count()), Some(2));
    assert_eq!(rbw.physics_world.as_ref().map(|world| world.step_count()), Some(1));
}

#[test]
fn dragging_overrides_simulation_for_the_step() {
    let mut scene = scene_with_world();
    let mut object = Object::new_mesh("cube", Mesh::cuboid(Vec3::splat(0.5)));
    object.rigidbody_object = Some(RigidBodyOb::new(RigidBodyType::Active));
    let id = add_member(&mut scene, object);
    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);

    scene.transforming = true;
    if let Some(object) = scene.object_mut(id) {
        object.selected = true;
        object.loc = Vec3::new(4.0, 0.0, 0.0);
    }
    scene.update_for_frame(3.0);

    let object = scene.object(id).expect("cube");
    assert_eq!(object.obmat.w_axis.truncate(), Vec3::new(4.0, 0.0, 0.0));
    let settings = object.rigidbody_object.as_ref().expect("settings");
    assert_eq!(settings.pos, Vec3::new(4.0, 0.0, 0.0));
    let body = settings.physics_object.as_ref().expect("body");
    assert!(!body.is_kinematic());
    assert_eq!(body.mass(), 1.0);
}

#[test]
fn free_world_unregisters_everything() {
    let mut scene = scene_with_world();
    let cube = Object::new_mesh("cube", Mesh::cuboid(Vec3::splat(0.5)));
    let id = add_member(&mut scene, cube);
    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);

    let Scene {
        rigidbody_world,
        groups,
        objects,
        ..
    } = &mut scene;
    let rbw = rigidbody_world.as_mut().expect("world");
    rigidbody::free_world(rbw, objects, groups);
    assert!(rbw.physics_world.is_none());
    assert!(rbw.objects.is_none());

    // Settings keep their handles and are revalidated into a fresh world.
    assert!(scene
        .object(id)
        .and_then(|o| o.rigidbody_object.as_ref())
        .is_some_and(|s| s.physics_object.is_some()));
    scene.update_for_frame(3.0);
    let world = scene.rigidbody_world.as_ref();
    assert!(world.is_some_and(|rbw| rbw.physics_world.is_none()));
}

#[test]
fn persisted_settings_come_back_without_handles() {
    let mut scene = scene_with_world();
    let mut object = Object::new_mesh("cube", Mesh::cuboid(Vec3::splat(0.5)));
    object.rigidbody_object = Some(RigidBodyOb::new(RigidBodyType::Active));
    let id = add_member(&mut scene, object);
    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);

    let object = scene.object(id).expect("cube");
    assert!(object.rigidbody_object.as_ref().is_some_and(|s| s.physics_object.is_some()));
    let json = serde_json::to_string(object).expect("serialize object");
    let restored: Object = serde_json::from_str(&json).expect("deserialize object");
    let settings = restored.rigidbody_object.expect("settings survive");
    assert!(settings.physics_object.is_none());
    assert!(settings.physics_shape.is_none());
    assert_eq!(settings.shape, CollisionShapeKind::ConvexHull);

    let rbw = scene.rigidbody_world.as_ref().expect("world");
    let json = serde_json::to_string(rbw).expect("serialize world");
    let restored: RigidBodyWorld = serde_json::from_str(&json).expect("deserialize world");
    assert!(restored.physics_world.is_none());
    assert!(restored.objects.is_none());
    assert_eq!(restored.group, rbw.group);
    assert_eq!(restored.point_cache.frame_count(), 0);
}

#[test]
fn partial_documents_fill_in_defaults() {
    let settings: RigidBodyOb =
        serde_json::from_str(r#"{ "body_type": "Passive", "mass": 4.0 }"#).expect("parse");
    assert_eq!(settings.body_type, RigidBodyType::Passive);
    assert_eq!(settings.mass, 4.0);
    assert_eq!(settings.friction, 0.5);
    assert_eq!(settings.dirty, DirtyState::NeedsValidate);
}

#[test]
fn copies_never_share_handles() {
    let mut scene = scene_with_world();
    let mut object = Object::new_mesh("cube", Mesh::cuboid(Vec3::splat(0.5)));
    object.rigidbody_object = Some(RigidBodyOb::new(RigidBodyType::Active));
    let id = add_member(&mut scene, object);
    scene.update_for_frame(1.0);
    scene.update_for_frame(2.0);

    let source = scene.object(id).expect("cube");
    let copy = rigidbody::copy_object(source).expect("copy");
    assert!(copy.physics_object.is_none());
    assert!(copy.physics_shape.is_none());
    assert_eq!(copy.dirty, DirtyState::NeedsValidate);

    let world_copy = scene
        .rigidbody_world
        .as_ref()
        .and_then(rigidbody::copy_world)
        .expect("world copy");
    assert!(world_copy.physics_world.is_none());
    assert_eq!(world_copy.group, Some(body_group(&scene)));
}
