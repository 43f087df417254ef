//! Global configuration constants for the rigid body subsystem.

/// Default scene gravity (Z-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, 0.0, -9.81];

/// Scene frame rate used to convert frames into seconds.
pub const DEFAULT_FRAMES_PER_SECOND: f32 = 24.0;

/// Default simulated frame range.
pub const DEFAULT_START_FRAME: i32 = 1;
pub const DEFAULT_END_FRAME: i32 = 250;

/// Number of backend sub-steps per second of simulated time.
pub const DEFAULT_STEPS_PER_SECOND: u32 = 60;

/// Number of constraint solver iterations performed per sub-step.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 10;

pub const DEFAULT_TIME_SCALE: f32 = 1.0;

/// Collision margin embedded into convex hulls when the user has not set one.
pub const CONVEX_HULL_AUTO_MARGIN: f32 = 0.04;

pub const DEFAULT_MASS: f32 = 1.0;
pub const DEFAULT_FRICTION: f32 = 0.5;
pub const DEFAULT_RESTITUTION: f32 = 0.0;
pub const DEFAULT_MARGIN: f32 = 0.04;

pub const DEFAULT_LINEAR_DAMPING: f32 = 0.04;
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.1;

pub const DEFAULT_LINEAR_SLEEP_THRESHOLD: f32 = 0.4;
pub const DEFAULT_ANGULAR_SLEEP_THRESHOLD: f32 = 0.5;

/// Seconds a body must stay below its sleep thresholds before it deactivates.
pub const DEACTIVATION_TIME: f32 = 2.0;

pub const DEFAULT_BREAKING_THRESHOLD: f32 = 10.0;
pub const DEFAULT_CONSTRAINT_SOLVER_ITERATIONS: i32 = 10;

pub const DEFAULT_SPRING_STIFFNESS: f32 = 10.0;
pub const DEFAULT_SPRING_DAMPING: f32 = 0.5;

pub const DEFAULT_MOTOR_MAX_IMPULSE: f32 = 1.0;
pub const DEFAULT_MOTOR_TARGET_VELOCITY: f32 = 1.0;

/// Collision group mask with only the first of the twenty groups enabled.
pub const DEFAULT_COLLISION_GROUPS: u32 = 1;
pub const COLLISION_GROUP_COUNT: u32 = 20;
