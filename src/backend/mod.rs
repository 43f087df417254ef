//! Physics backend consumed by the rigid body subsystem through a narrow
//! handle API: worlds, bodies, shapes and constraints are created, configured,
//! stepped and dropped, nothing else leaks out.
//!
//! Without the `backend` feature every handle type is uninhabited, so any
//! `Option` holding one is statically `None`.

#[cfg(feature = "backend")]
pub mod body;
#[cfg(feature = "backend")]
pub mod broadphase;
#[cfg(feature = "backend")]
pub mod constraint;
#[cfg(feature = "backend")]
pub mod integrator;
#[cfg(feature = "backend")]
pub mod narrowphase;
#[cfg(feature = "backend")]
pub mod shape;
#[cfg(feature = "backend")]
pub mod solver;
#[cfg(feature = "backend")]
pub mod world;

#[cfg(feature = "backend")]
pub use body::{ActivationState, BodyHandle, BodyLink};
#[cfg(feature = "backend")]
pub use constraint::{ConstraintHandle, ConstraintKind, LimitAxis, SpringModel};
#[cfg(feature = "backend")]
pub use shape::{Aabb, CollisionShape, ShapeGeometry, ShapeHandle, TriangleMesh, TriangleMeshKind};
#[cfg(feature = "backend")]
pub use world::DynamicsWorld;

/// Backend world owned by a rigid body world.
#[cfg(feature = "backend")]
pub type WorldHandle = DynamicsWorld;

#[cfg(not(feature = "backend"))]
mod stub;
#[cfg(not(feature = "backend"))]
pub use stub::{BodyHandle, ConstraintHandle, ShapeHandle, WorldHandle};
