//! Persistent rigid body settings stored on the scene, its objects and
//! constraint carriers.
//!
//! Settings own the backend handles but never serialize them: every handle is
//! `#[serde(skip)]`, so a loaded scene always starts with empty slots and the
//! binders recreate whatever the next frame needs.

use bitflags::bitflags;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::cache::PointCache;
use crate::{
    backend::{BodyHandle, ConstraintHandle, ShapeHandle, WorldHandle},
    config::{
        CONVEX_HULL_AUTO_MARGIN, DEFAULT_ANGULAR_DAMPING, DEFAULT_ANGULAR_SLEEP_THRESHOLD,
        DEFAULT_BREAKING_THRESHOLD, DEFAULT_COLLISION_GROUPS, DEFAULT_CONSTRAINT_SOLVER_ITERATIONS,
        DEFAULT_END_FRAME, DEFAULT_FRICTION, DEFAULT_LINEAR_DAMPING, DEFAULT_LINEAR_SLEEP_THRESHOLD,
        DEFAULT_MARGIN, DEFAULT_MASS, DEFAULT_MOTOR_MAX_IMPULSE, DEFAULT_MOTOR_TARGET_VELOCITY,
        DEFAULT_RESTITUTION, DEFAULT_SOLVER_ITERATIONS, DEFAULT_SPRING_DAMPING,
        DEFAULT_SPRING_STIFFNESS, DEFAULT_START_FRAME, DEFAULT_STEPS_PER_SECOND, DEFAULT_TIME_SCALE,
    },
    utils::allocator::{GroupId, ObjectId},
};

/// Pending work for the binders, ordered by how much has to be redone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DirtyState {
    #[default]
    Clean,
    /// Parameters changed: re-register the handle and patch it.
    NeedsValidate,
    /// Geometry changed: rebuild the collision shape as well.
    NeedsReshape,
}

impl DirtyState {
    /// Raises the pending state, never lowering it.
    pub fn raise(&mut self, state: DirtyState) {
        *self = (*self).max(state);
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct WorldFlags: u32 {
        /// Simulation is paused; objects keep their own transforms.
        const MUTED = 1 << 0;
        const USE_SPLIT_IMPULSE = 1 << 1;
    }
}

/// Scene-level simulation settings plus the backend world.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyWorld {
    /// Objects simulated as rigid bodies.
    pub group: Option<GroupId>,
    /// Objects carrying rigid body constraints.
    pub constraints: Option<GroupId>,
    pub time_scale: f32,
    pub steps_per_second: u32,
    pub num_solver_iterations: u32,
    /// Last frame the simulation was evaluated at.
    pub ltime: f32,
    pub flag: WorldFlags,
    pub gravity_weight: f32,
    pub use_global_gravity: bool,
    pub point_cache: PointCache,
    #[serde(skip)]
    pub physics_world: Option<WorldHandle>,
    /// Flattened body group, `None` until first populated.
    #[serde(skip)]
    pub objects: Option<Vec<ObjectId>>,
}

impl Default for RigidBodyWorld {
    fn default() -> Self {
        Self::new(DEFAULT_START_FRAME, DEFAULT_END_FRAME)
    }
}

impl RigidBodyWorld {
    pub fn new(start_frame: i32, end_frame: i32) -> Self {
        Self {
            group: None,
            constraints: None,
            time_scale: DEFAULT_TIME_SCALE,
            steps_per_second: DEFAULT_STEPS_PER_SECOND,
            num_solver_iterations: DEFAULT_SOLVER_ITERATIONS,
            ltime: start_frame as f32,
            flag: WorldFlags::empty(),
            gravity_weight: 1.0,
            use_global_gravity: true,
            point_cache: PointCache::new(start_frame, end_frame),
            physics_world: None,
            objects: None,
        }
    }

    pub fn numbodies(&self) -> usize {
        self.objects.as_ref().map_or(0, Vec::len)
    }

    pub fn is_muted(&self) -> bool {
        self.flag.contains(WorldFlags::MUTED)
    }

    pub fn use_split_impulse(&self) -> bool {
        self.flag.contains(WorldFlags::USE_SPLIT_IMPULSE)
    }

    /// Gravity actually applied to the backend world.
    pub fn effective_gravity(&self, scene_gravity: Vec3) -> Vec3 {
        if self.use_global_gravity {
            scene_gravity * self.gravity_weight
        } else {
            Vec3::ZERO
        }
    }

    /// Backend sub-step length. Slowed-down simulations take smaller steps.
    pub fn fixed_substep(&self) -> f32 {
        1.0 / self.steps_per_second.max(1) as f32 * self.time_scale.min(1.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RigidBodyType {
    #[default]
    Active,
    /// Static or animated collider, never moved by the simulation.
    Passive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionShapeKind {
    Box,
    Sphere,
    Capsule,
    Cylinder,
    Cone,
    #[default]
    ConvexHull,
    Trimesh,
}

impl CollisionShapeKind {
    /// Kinds built from mesh geometry rather than the bounding box.
    pub fn needs_mesh(self) -> bool {
        matches!(self, CollisionShapeKind::ConvexHull | CollisionShapeKind::Trimesh)
    }
}

/// Which evaluation stage of the object's mesh feeds mesh-based shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshSource {
    Base,
    #[default]
    Deform,
    Final,
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ObjectFlags: u32 {
        /// Transform is driven by animation instead of the simulation.
        const KINEMATIC = 1 << 0;
        const DISABLED = 1 << 1;
        /// Allow the body to fall asleep once it comes to rest.
        const USE_DEACTIVATION = 1 << 2;
        const START_DEACTIVATED = 1 << 3;
        /// User-controlled collision margin.
        const USE_MARGIN = 1 << 4;
        /// Feed deformed vertices into trimesh shapes every step.
        const USE_DEFORM = 1 << 5;
    }
}

/// Per-object rigid body settings.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyOb {
    pub body_type: RigidBodyType,
    pub shape: CollisionShapeKind,
    pub mesh_source: MeshSource,
    pub flag: ObjectFlags,
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    pub margin: f32,
    pub lin_damping: f32,
    pub ang_damping: f32,
    pub lin_sleep_thresh: f32,
    pub ang_sleep_thresh: f32,
    /// One bit per collision group, twenty groups.
    pub col_groups: u32,
    /// Last simulated (or cached) world transform.
    pub pos: Vec3,
    pub orn: Quat,
    pub dirty: DirtyState,
    #[serde(skip)]
    pub physics_object: Option<BodyHandle>,
    #[serde(skip)]
    pub physics_shape: Option<ShapeHandle>,
}

impl Default for RigidBodyOb {
    fn default() -> Self {
        Self::new(RigidBodyType::Active)
    }
}

impl RigidBodyOb {
    /// Active bodies default to convex hulls, passive ones to triangle meshes.
    pub fn new(body_type: RigidBodyType) -> Self {
        let shape = match body_type {
            RigidBodyType::Active => CollisionShapeKind::ConvexHull,
            RigidBodyType::Passive => CollisionShapeKind::Trimesh,
        };
        Self {
            body_type,
            shape,
            mesh_source: MeshSource::Deform,
            flag: ObjectFlags::empty(),
            mass: DEFAULT_MASS,
            friction: DEFAULT_FRICTION,
            restitution: DEFAULT_RESTITUTION,
            margin: DEFAULT_MARGIN,
            lin_damping: DEFAULT_LINEAR_DAMPING,
            ang_damping: DEFAULT_ANGULAR_DAMPING,
            lin_sleep_thresh: DEFAULT_LINEAR_SLEEP_THRESHOLD,
            ang_sleep_thresh: DEFAULT_ANGULAR_SLEEP_THRESHOLD,
            col_groups: DEFAULT_COLLISION_GROUPS,
            pos: Vec3::ZERO,
            orn: Quat::IDENTITY,
            dirty: DirtyState::NeedsValidate,
            physics_object: None,
            physics_shape: None,
        }
    }

    pub fn is_kinematic(&self) -> bool {
        self.flag.contains(ObjectFlags::KINEMATIC)
    }

    /// Kinematic and disabled bodies are both driven from outside the simulation.
    pub fn kinematic_state(&self) -> bool {
        self.flag.intersects(ObjectFlags::KINEMATIC | ObjectFlags::DISABLED)
    }

    /// Mass handed to the backend; zero makes the body immovable.
    pub fn simulation_mass(&self) -> f32 {
        if self.body_type == RigidBodyType::Passive || self.kinematic_state() {
            0.0
        } else {
            self.mass
        }
    }

    /// Margin applied to the collision shape.
    pub fn collision_margin(&self) -> f32 {
        let uses_own_margin = self.flag.contains(ObjectFlags::USE_MARGIN)
            || matches!(
                self.shape,
                CollisionShapeKind::ConvexHull
                    | CollisionShapeKind::Trimesh
                    | CollisionShapeKind::Cone
            );
        if uses_own_margin {
            self.margin
        } else {
            CONVEX_HULL_AUTO_MARGIN
        }
    }

    pub fn mark_dirty(&mut self, state: DirtyState) {
        self.dirty.raise(state);
    }

    /// Changing the shape kind always rebuilds the collision shape.
    pub fn set_shape(&mut self, shape: CollisionShapeKind) {
        self.shape = shape;
        self.mark_dirty(DirtyState::NeedsReshape);
    }

    /// Mass and the trimesh flavour depend on the type, so the shape is rebuilt too.
    pub fn set_type(&mut self, body_type: RigidBodyType) {
        self.body_type = body_type;
        self.mark_dirty(DirtyState::NeedsReshape);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    Point,
    #[default]
    Fixed,
    Hinge,
    Slider,
    Piston,
    Generic,
    GenericSpring,
    Motor,
}

/// Spring formulation used by `GenericSpring` constraints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpringType {
    /// Explicit forces clamped against the limits.
    Spring1,
    /// Implicit soft constraint, stable at high stiffness.
    #[default]
    Spring2,
}

/// Degree of freedom of a constraint, in the carrier's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintAxis {
    LinX,
    LinY,
    LinZ,
    AngX,
    AngY,
    AngZ,
}

impl ConstraintAxis {
    pub const ALL: [ConstraintAxis; 6] = [
        ConstraintAxis::LinX,
        ConstraintAxis::LinY,
        ConstraintAxis::LinZ,
        ConstraintAxis::AngX,
        ConstraintAxis::AngY,
        ConstraintAxis::AngZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn limit_flag(self) -> ConstraintFlags {
        ConstraintFlags::from_bits_truncate(ConstraintFlags::USE_LIMIT_LIN_X.bits() << self.index())
    }

    pub fn spring_flag(self) -> ConstraintFlags {
        ConstraintFlags::from_bits_truncate(ConstraintFlags::USE_SPRING_X.bits() << self.index())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ConstraintFlags: u32 {
        const ENABLED = 1 << 0;
        /// No contacts between the two constrained bodies.
        const DISABLE_COLLISIONS = 1 << 1;
        const USE_BREAKING = 1 << 2;
        const OVERRIDE_SOLVER_ITERATIONS = 1 << 3;

        const USE_LIMIT_LIN_X = 1 << 4;
        const USE_LIMIT_LIN_Y = 1 << 5;
        const USE_LIMIT_LIN_Z = 1 << 6;
        const USE_LIMIT_ANG_X = 1 << 7;
        const USE_LIMIT_ANG_Y = 1 << 8;
        const USE_LIMIT_ANG_Z = 1 << 9;

        const USE_SPRING_X = 1 << 10;
        const USE_SPRING_Y = 1 << 11;
        const USE_SPRING_Z = 1 << 12;
        const USE_SPRING_ANG_X = 1 << 13;
        const USE_SPRING_ANG_Y = 1 << 14;
        const USE_SPRING_ANG_Z = 1 << 15;

        const USE_MOTOR_LIN = 1 << 16;
        const USE_MOTOR_ANG = 1 << 17;
    }
}

/// Constraint settings stored on the carrier object.
///
/// The carrier's world matrix is the pivot frame; `ob1` and `ob2` are plain
/// references to the constrained objects and stop resolving once deleted.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyCon {
    pub constraint_type: ConstraintType,
    pub ob1: Option<ObjectId>,
    pub ob2: Option<ObjectId>,
    pub flag: ConstraintFlags,
    pub breaking_threshold: f32,
    pub num_solver_iterations: i32,
    /// Indexed by [`ConstraintAxis::index`].
    pub limit_lower: [f32; 6],
    pub limit_upper: [f32; 6],
    pub spring_stiffness: [f32; 6],
    pub spring_damping: [f32; 6],
    pub spring_type: SpringType,
    pub motor_lin_max_impulse: f32,
    pub motor_ang_max_impulse: f32,
    pub motor_lin_target_velocity: f32,
    pub motor_ang_target_velocity: f32,
    pub dirty: DirtyState,
    #[serde(skip)]
    pub physics_constraint: Option<ConstraintHandle>,
}

impl Default for RigidBodyCon {
    fn default() -> Self {
        Self::new(ConstraintType::Fixed)
    }
}

impl RigidBodyCon {
    pub fn new(constraint_type: ConstraintType) -> Self {
        let lin = 1.0;
        let ang = std::f32::consts::FRAC_PI_4;
        Self {
            constraint_type,
            ob1: None,
            ob2: None,
            flag: ConstraintFlags::ENABLED | ConstraintFlags::DISABLE_COLLISIONS,
            breaking_threshold: DEFAULT_BREAKING_THRESHOLD,
            num_solver_iterations: DEFAULT_CONSTRAINT_SOLVER_ITERATIONS,
            limit_lower: [-lin, -lin, -lin, -ang, -ang, -ang],
            limit_upper: [lin, lin, lin, ang, ang, ang],
            spring_stiffness: [DEFAULT_SPRING_STIFFNESS; 6],
            spring_damping: [DEFAULT_SPRING_DAMPING; 6],
            spring_type: SpringType::default(),
            motor_lin_max_impulse: DEFAULT_MOTOR_MAX_IMPULSE,
            motor_ang_max_impulse: DEFAULT_MOTOR_MAX_IMPULSE,
            motor_lin_target_velocity: DEFAULT_MOTOR_TARGET_VELOCITY,
            motor_ang_target_velocity: DEFAULT_MOTOR_TARGET_VELOCITY,
            dirty: DirtyState::NeedsValidate,
            physics_constraint: None,
        }
    }

    pub fn uses_limit(&self, axis: ConstraintAxis) -> bool {
        self.flag.contains(axis.limit_flag())
    }

    /// Limits for `axis`, or the free range `[0, -1]` when the limit is off.
    pub fn effective_limit(&self, axis: ConstraintAxis) -> (f32, f32) {
        if self.uses_limit(axis) {
            (self.limit_lower[axis.index()], self.limit_upper[axis.index()])
        } else {
            (0.0, -1.0)
        }
    }

    pub fn set_limit(&mut self, axis: ConstraintAxis, lower: f32, upper: f32) {
        self.limit_lower[axis.index()] = lower;
        self.limit_upper[axis.index()] = upper;
        self.flag.insert(axis.limit_flag());
        self.mark_dirty();
    }

    /// Breaking threshold handed to the backend; unbreakable unless enabled.
    pub fn effective_breaking_threshold(&self) -> f32 {
        if self.flag.contains(ConstraintFlags::USE_BREAKING) {
            self.breaking_threshold
        } else {
            f32::MAX
        }
    }

    /// Solver iterations handed to the backend; `-1` uses the world setting.
    pub fn effective_solver_iterations(&self) -> i32 {
        if self.flag.contains(ConstraintFlags::OVERRIDE_SOLVER_ITERATIONS) {
            self.num_solver_iterations
        } else {
            -1
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty.raise(DirtyState::NeedsValidate);
    }
}
