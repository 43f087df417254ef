//! Rigid body simulation subsystem.
//!
//! Objects in the world's body group are mirrored as backend bodies, carriers
//! in its constraint group as backend constraints. Each frame the scene calls
//! [`rebuild_world`] and [`do_simulation`]; object evaluation then pulls the
//! simulated transforms back through [`sync_transforms`].
//!
//! Without the `backend` feature the same entry points exist as no-ops.

pub mod cache;
pub mod settings;

#[cfg(feature = "backend")]
pub mod constraint;
#[cfg(feature = "backend")]
pub mod object;
#[cfg(feature = "backend")]
pub mod shape;
#[cfg(feature = "backend")]
pub mod simulation;
#[cfg(feature = "backend")]
pub mod world;

#[cfg(not(feature = "backend"))]
mod stub;

pub use cache::{CachedTransform, PointCache};
pub use settings::{
    CollisionShapeKind, ConstraintAxis, ConstraintFlags, ConstraintType, DirtyState, MeshSource,
    ObjectFlags, RigidBodyCon, RigidBodyOb, RigidBodyType, RigidBodyWorld, SpringType, WorldFlags,
};

#[cfg(feature = "backend")]
pub use constraint::{copy_constraint, create_constraint, free_constraint, validate_constraint};
#[cfg(feature = "backend")]
pub use object::{
    aftertrans_update, copy_object, create_object, free_object, update_sim_object, validate_object,
};
#[cfg(feature = "backend")]
pub use shape::ShapeError;
#[cfg(feature = "backend")]
pub use simulation::{do_simulation, rebuild_world, sync_transforms, where_is_calc};
#[cfg(feature = "backend")]
pub use world::{
    cache_reset, check_sim_running, copy_world, create_world, free_world, remove_constraint,
    remove_object, update_ob_array, update_sim_world, validate_world,
};

#[cfg(not(feature = "backend"))]
pub use stub::{
    aftertrans_update, cache_reset, check_sim_running, copy_constraint, copy_object, copy_world,
    create_constraint, create_object, create_world, do_simulation, free_constraint, free_object,
    free_world, rebuild_world, remove_constraint, remove_object, sync_transforms, update_ob_array,
    update_sim_object, update_sim_world, validate_constraint, validate_object, validate_world,
    where_is_calc,
};
