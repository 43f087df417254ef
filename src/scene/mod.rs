//! Minimal scene model the rigid body subsystem synchronizes against.

pub mod group;
pub mod mesh;
pub mod object;

pub use group::Group;
pub use mesh::{BoundBox, Mesh};
pub use object::{Object, ObjectType, TransformLock};

use glam::Vec3;

use crate::{
    config::{DEFAULT_END_FRAME, DEFAULT_FRAMES_PER_SECOND, DEFAULT_GRAVITY, DEFAULT_START_FRAME},
    rigidbody::{self, RigidBodyWorld},
    utils::allocator::{Arena, GroupId, ObjectId},
};

#[derive(Debug)]
pub struct Scene {
    pub objects: Arena<ObjectId, Object>,
    pub groups: Arena<GroupId, Group>,
    pub gravity: Vec3,
    pub use_gravity: bool,
    pub frames_per_second: f32,
    pub start_frame: i32,
    pub end_frame: i32,
    /// An interactive transform of the selected objects is in progress.
    pub transforming: bool,
    pub rigidbody_world: Option<RigidBodyWorld>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Arena::new(),
            groups: Arena::new(),
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            use_gravity: true,
            frames_per_second: DEFAULT_FRAMES_PER_SECOND,
            start_frame: DEFAULT_START_FRAME,
            end_frame: DEFAULT_END_FRAME,
            transforming: false,
            rigidbody_world: None,
        }
    }

    /// Gravity the scene exposes to simulations.
    pub fn effective_gravity(&self) -> Vec3 {
        if self.use_gravity {
            self.gravity
        } else {
            Vec3::ZERO
        }
    }

    pub fn add_object(&mut self, mut object: Object) -> ObjectId {
        object.where_is_calc();
        self.objects.insert(object)
    }

    /// Deletes an object and unlinks it from every group.
    ///
    /// Rigid body bookkeeping is left alone: constraints referencing the
    /// object release their backend constraint on the next simulated frame.
    pub fn remove_object(&mut self, id: ObjectId) -> Option<Object> {
        let object = self.objects.remove(id)?;
        for group_id in self.groups.ids().collect::<Vec<_>>() {
            if let Some(group) = self.groups.get_mut(group_id) {
                group.remove_object(id);
            }
        }
        Some(object)
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(id)
    }

    pub fn add_group(&mut self, group: Group) -> GroupId {
        self.groups.insert(group)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(id)
    }

    /// Adds an object to a group. Returns `false` when either is missing or
    /// the object already belongs to the group.
    pub fn link_object(&mut self, group: GroupId, object: ObjectId) -> bool {
        if !self.objects.contains(object) {
            return false;
        }
        self.groups
            .get_mut(group)
            .is_some_and(|group| group.add_object(object))
    }

    /// Evaluates the scene for `ctime`: rebuilds the simulation when
    /// needed, advances it, then refreshes every object's world matrix.
    pub fn update_for_frame(&mut self, ctime: f32) {
        rigidbody::rebuild_world(self, ctime);
        rigidbody::do_simulation(self, ctime);

        let Scene {
            objects,
            rigidbody_world,
            transforming,
            ..
        } = self;
        for id in objects.ids().collect::<Vec<_>>() {
            if let Some(object) = objects.get_mut(id) {
                rigidbody::where_is_calc(rigidbody_world.as_ref(), object, ctime, *transforming);
            }
        }
    }
}
