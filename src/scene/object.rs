use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::mesh::{BoundBox, Mesh};
use crate::rigidbody::{MeshSource, RigidBodyCon, RigidBodyOb};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Mesh,
    Empty,
    Curve,
    Camera,
    Lamp,
}

bitflags! {
    /// Transform channels the user locked. Locked axes are also frozen in the simulation.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TransformLock: u32 {
        const LOC_X = 1 << 0;
        const LOC_Y = 1 << 1;
        const LOC_Z = 1 << 2;
        const ROT_X = 1 << 3;
        const ROT_Y = 1 << 4;
        const ROT_Z = 1 << 5;
    }
}

/// Scene object: local transform channels, evaluated world matrix, optional
/// mesh data and optional rigid body settings.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Object {
    pub name: String,
    pub kind: ObjectType,
    pub loc: Vec3,
    pub rot: Quat,
    pub scale: Vec3,
    /// World matrix, refreshed by [`Object::where_is_calc`].
    pub obmat: Mat4,
    pub protect: TransformLock,
    pub selected: bool,
    /// Base mesh as authored.
    pub data: Option<Mesh>,
    /// Mesh after deforming modifiers.
    #[serde(skip)]
    pub derived_deform: Option<Mesh>,
    /// Mesh after the full modifier stack.
    #[serde(skip)]
    pub derived_final: Option<Mesh>,
    pub rigidbody_object: Option<RigidBodyOb>,
    pub rigidbody_constraint: Option<RigidBodyCon>,
}

impl Default for Object {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ObjectType::Empty,
            loc: Vec3::ZERO,
            rot: Quat::IDENTITY,
            scale: Vec3::ONE,
            obmat: Mat4::IDENTITY,
            protect: TransformLock::empty(),
            selected: false,
            data: None,
            derived_deform: None,
            derived_final: None,
            rigidbody_object: None,
            rigidbody_constraint: None,
        }
    }
}

impl Object {
    pub fn new_empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn new_mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            name: name.into(),
            kind: ObjectType::Mesh,
            data: Some(mesh),
            ..Self::default()
        }
    }

    /// Sets the location and refreshes the world matrix.
    pub fn with_location(mut self, loc: Vec3) -> Self {
        self.loc = loc;
        self.where_is_calc();
        self
    }

    pub fn is_mesh(&self) -> bool {
        self.kind == ObjectType::Mesh
    }

    /// Recomputes the world matrix from the transform channels.
    pub fn where_is_calc(&mut self) {
        self.obmat =
            Mat4::from_scale_rotation_translation(self.scale, self.rot.normalize(), self.loc);
    }

    /// Mesh for the requested evaluation stage. Missing derived meshes fall
    /// back to the previous stage, since an undeformed object's deformed mesh
    /// is its base mesh.
    pub fn mesh_for_source(&self, source: MeshSource) -> Option<&Mesh> {
        if !self.is_mesh() {
            return None;
        }
        match source {
            MeshSource::Base => self.data.as_ref(),
            MeshSource::Deform => self.derived_deform.as_ref().or(self.data.as_ref()),
            MeshSource::Final => self
                .derived_final
                .as_ref()
                .or(self.derived_deform.as_ref())
                .or(self.data.as_ref()),
        }
    }

    /// Bounds of the most evaluated mesh available.
    pub fn bound_box(&self) -> Option<BoundBox> {
        self.mesh_for_source(MeshSource::Final).and_then(Mesh::bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn world_matrix_follows_channels() {
        let mut object = Object::new_empty("pivot");
        object.loc = Vec3::new(1.0, 2.0, 3.0);
        object.scale = Vec3::splat(2.0);
        object.where_is_calc();
        let p = object.obmat.transform_point3(Vec3::X);
        assert_relative_eq!(p.x, 3.0);
        assert_relative_eq!(p.y, 2.0);
        assert_relative_eq!(p.z, 3.0);
    }

    #[test]
    fn derived_meshes_fall_back_to_base() {
        let mut object = Object::new_mesh("cube", Mesh::cuboid(Vec3::ONE));
        assert!(object.mesh_for_source(MeshSource::Final).is_some());

        object.derived_deform = Some(Mesh::cuboid(Vec3::splat(2.0)));
        let bounds = object.bound_box().expect("mesh bounds");
        assert_relative_eq!(bounds.max.x, 2.0);

        let empty = Object::new_empty("empty");
        assert!(empty.bound_box().is_none());
    }
}
