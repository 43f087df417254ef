//! Entry points used when the crate is built without a physics backend.
//!
//! Settings still load, save and copy, but nothing is ever simulated: every
//! creation returns `None`, every query reports "not running" and objects
//! keep the transforms of their own channels.

use glam::{Quat, Vec3};

use super::settings::{ConstraintType, RigidBodyCon, RigidBodyOb, RigidBodyType, RigidBodyWorld};
use crate::{
    scene::{Group, Object, Scene},
    utils::allocator::{Arena, GroupId, ObjectId},
};

pub fn create_world(_scene: &Scene) -> Option<RigidBodyWorld> {
    None
}

pub fn copy_world(_rbw: &RigidBodyWorld) -> Option<RigidBodyWorld> {
    None
}

pub fn validate_world(_rbw: &mut RigidBodyWorld, _scene_gravity: Vec3, _rebuild: bool) {}

pub fn free_world(
    _rbw: &mut RigidBodyWorld,
    _objects: &Arena<ObjectId, Object>,
    _groups: &Arena<GroupId, Group>,
) {
}

pub fn update_ob_array(
    _rbw: &mut RigidBodyWorld,
    _groups: &Arena<GroupId, Group>,
    _objects: &Arena<ObjectId, Object>,
) {
}

pub fn update_sim_world(
    _rbw: &mut RigidBodyWorld,
    _scene_gravity: Vec3,
    _groups: &Arena<GroupId, Group>,
    _objects: &Arena<ObjectId, Object>,
) {
}

pub fn check_sim_running(_rbw: Option<&RigidBodyWorld>, _ctime: f32) -> bool {
    false
}

pub fn cache_reset(_rbw: Option<&mut RigidBodyWorld>) {}

pub fn remove_object(_scene: &mut Scene, _id: ObjectId) {}

pub fn remove_constraint(_scene: &mut Scene, _id: ObjectId) {}

pub fn create_object(
    _rbw: Option<&mut RigidBodyWorld>,
    _object: &Object,
    _body_type: RigidBodyType,
) -> Option<RigidBodyOb> {
    None
}

pub fn copy_object(_object: &Object) -> Option<RigidBodyOb> {
    None
}

pub fn free_object(_rbw: Option<&mut RigidBodyWorld>, _object: &mut Object) {}

pub fn validate_object(_rbw: &mut RigidBodyWorld, _object: &mut Object, _rebuild: bool) {}

pub fn update_sim_object(_object: &mut Object, _is_interactive_drag: bool) {}

pub fn aftertrans_update(_object: &mut Object, _old_loc: Vec3, _old_rot: Quat) {}

pub fn create_constraint(
    _rbw: Option<&mut RigidBodyWorld>,
    _object: &Object,
    _constraint_type: ConstraintType,
) -> Option<RigidBodyCon> {
    None
}

pub fn copy_constraint(_object: &Object) -> Option<RigidBodyCon> {
    None
}

pub fn free_constraint(_rbw: Option<&mut RigidBodyWorld>, _object: &mut Object) {}

pub fn validate_constraint(
    _rbw: &mut RigidBodyWorld,
    _objects: &mut Arena<ObjectId, Object>,
    _carrier: ObjectId,
    _rebuild: bool,
) {
}

pub fn rebuild_world(_scene: &mut Scene, _ctime: f32) {}

pub fn do_simulation(_scene: &mut Scene, _ctime: f32) {}

pub fn sync_transforms(
    _rbw: Option<&RigidBodyWorld>,
    _object: &mut Object,
    _ctime: f32,
    _is_interactive_drag: bool,
) {
}

/// Objects are still evaluated from their own channels.
pub fn where_is_calc(
    _rbw: Option<&RigidBodyWorld>,
    object: &mut Object,
    _ctime: f32,
    _is_interactive_drag: bool,
) {
    object.where_is_calc();
}
