//! Rigid body world synchronization.
//!
//! Keeps a scene's objects, collision shapes and constraints in step with a
//! physics backend: settings live on scene objects, the backend mirrors them
//! as bodies and joints, and every frame the simulated transforms flow back
//! into object matrices. Stepped frames are cached so scrubbing back over
//! simulated frames does not re-run the solver.
//!
//! The `backend` feature (on by default) brings in the bundled dynamics
//! backend; without it the scene still evaluates, but nothing simulates.

pub mod backend;
pub mod config;
pub mod rigidbody;
pub mod scene;
pub mod utils;

pub use glam::{Mat4, Quat, Vec3};

pub use rigidbody::{
    do_simulation, rebuild_world, CollisionShapeKind, ConstraintType, MeshSource, PointCache,
    RigidBodyCon, RigidBodyOb, RigidBodyType, RigidBodyWorld,
};
pub use scene::{BoundBox, Group, Mesh, Object, ObjectType, Scene};
pub use utils::allocator::{Arena, GenerationalId, GroupId, ObjectId};
