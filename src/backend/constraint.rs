use std::sync::{Arc, Weak};

use glam::{Quat, Vec3};
use parking_lot::Mutex;

use super::body::{Body, BodyLink};
use crate::utils::math::normalize_or_identity;

/// One of the six degrees of freedom of a constraint frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitAxis {
    LinX,
    LinY,
    LinZ,
    AngX,
    AngY,
    AngZ,
}

impl LimitAxis {
    pub const ALL: [LimitAxis; 6] = [
        LimitAxis::LinX,
        LimitAxis::LinY,
        LimitAxis::LinZ,
        LimitAxis::AngX,
        LimitAxis::AngY,
        LimitAxis::AngZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_angular(self) -> bool {
        self.index() >= 3
    }
}

/// `lower > upper` leaves the axis unconstrained, `lower == upper` locks it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimit {
    pub lower: f32,
    pub upper: f32,
}

impl AxisLimit {
    pub const LOCKED: AxisLimit = AxisLimit {
        lower: 0.0,
        upper: 0.0,
    };
    pub const FREE: AxisLimit = AxisLimit {
        lower: 0.0,
        upper: -1.0,
    };

    pub fn is_free(&self) -> bool {
        self.lower > self.upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpringModel {
    /// Explicit spring force, stiff springs can overshoot.
    Explicit,
    /// Implicitly integrated spring, stable for any stiffness.
    Implicit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSpring {
    pub enabled: bool,
    pub stiffness: f32,
    pub damping: f32,
    pub equilibrium: f32,
}

impl Default for AxisSpring {
    fn default() -> Self {
        Self {
            enabled: false,
            stiffness: 0.0,
            damping: 0.0,
            equilibrium: 0.0,
        }
    }
}

/// Velocity motor acting along the frame's X axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisMotor {
    pub linear_enabled: bool,
    pub angular_enabled: bool,
    pub linear_max_impulse: f32,
    pub angular_max_impulse: f32,
    pub linear_target_velocity: f32,
    pub angular_target_velocity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Point,
    Fixed,
    Hinge,
    Slider,
    Piston,
    Generic6Dof,
    Generic6DofSpring(SpringModel),
    Motor,
}

/// Constraint frame expressed relative to one body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub position: Vec3,
    pub rotation: Quat,
}

/// Generic six-axis joint. Every constraint kind is a preset of locked,
/// limited and free axes in the pivot frame.
#[derive(Debug)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub body_a: BodyLink,
    pub body_b: BodyLink,
    pub frame_a: LocalFrame,
    pub frame_b: LocalFrame,
    pub limits: [AxisLimit; 6],
    pub springs: [AxisSpring; 6],
    pub motor: AxisMotor,
    pub enabled: bool,
    pub breaking_threshold: f32,
    /// `-1` solves with the world's iteration count.
    pub solver_iterations: i32,
    pub applied_impulse: f32,
}

impl Constraint {
    /// Current coordinates of every axis between the two bodies.
    pub fn coordinates(&self, a: &Body, b: &Body) -> [f32; 6] {
        relative_coordinates(
            self.frame_a.to_world(a.position, a.rotation),
            self.frame_b.to_world(b.position, b.rotation),
        )
    }
}

impl LocalFrame {
    pub fn to_world(&self, body_position: Vec3, body_rotation: Quat) -> (Vec3, Quat) {
        (
            body_position + body_rotation * self.position,
            body_rotation * self.rotation,
        )
    }
}

/// Offsets of frame B along the axes of frame A, then the rotation vector
/// taking frame A onto frame B.
pub fn relative_coordinates(frame_a: (Vec3, Quat), frame_b: (Vec3, Quat)) -> [f32; 6] {
    let (pos_a, rot_a) = frame_a;
    let (pos_b, rot_b) = frame_b;
    let local_offset = rot_a.inverse() * (pos_b - pos_a);
    let mut relative = rot_a.inverse() * rot_b;
    if relative.w < 0.0 {
        relative = -relative;
    }
    let angles = relative.to_scaled_axis();
    [
        local_offset.x,
        local_offset.y,
        local_offset.z,
        angles.x,
        angles.y,
        angles.z,
    ]
}

/// Exclusively-owned backend constraint.
#[derive(Debug)]
pub struct ConstraintHandle {
    inner: Arc<Mutex<Constraint>>,
}

/// Weak reference held by the dynamics world.
#[derive(Debug, Clone)]
pub struct ConstraintLink(Weak<Mutex<Constraint>>);

impl ConstraintLink {
    pub fn upgrade(&self) -> Option<Arc<Mutex<Constraint>>> {
        self.0.upgrade()
    }

    pub fn points_to(&self, constraint: &ConstraintHandle) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&constraint.inner))
    }
}

impl ConstraintHandle {
    fn with_preset(
        kind: ConstraintKind,
        pivot: Vec3,
        rotation: Quat,
        body_a: &BodyLink,
        body_b: &BodyLink,
        limits: [AxisLimit; 6],
    ) -> Option<Self> {
        let a = body_a.upgrade()?;
        let b = body_b.upgrade()?;
        let rotation = normalize_or_identity(rotation);
        let frame_a = relative_frame(&a.lock(), pivot, rotation);
        let frame_b = if Arc::ptr_eq(&a, &b) {
            frame_a
        } else {
            relative_frame(&b.lock(), pivot, rotation)
        };

        Some(Self {
            inner: Arc::new(Mutex::new(Constraint {
                kind,
                body_a: body_a.clone(),
                body_b: body_b.clone(),
                frame_a,
                frame_b,
                limits,
                springs: [AxisSpring::default(); 6],
                motor: AxisMotor::default(),
                enabled: true,
                breaking_threshold: f32::MAX,
                solver_iterations: -1,
                applied_impulse: 0.0,
            })),
        })
    }

    pub fn new_point(pivot: Vec3, body_a: &BodyLink, body_b: &BodyLink) -> Option<Self> {
        use AxisLimit as L;
        Self::with_preset(
            ConstraintKind::Point,
            pivot,
            Quat::IDENTITY,
            body_a,
            body_b,
            [L::LOCKED, L::LOCKED, L::LOCKED, L::FREE, L::FREE, L::FREE],
        )
    }

    pub fn new_fixed(
        pivot: Vec3,
        rotation: Quat,
        body_a: &BodyLink,
        body_b: &BodyLink,
    ) -> Option<Self> {
        Self::with_preset(
            ConstraintKind::Fixed,
            pivot,
            rotation,
            body_a,
            body_b,
            [AxisLimit::LOCKED; 6],
        )
    }

    /// Hinge rotating about the frame's Z axis.
    pub fn new_hinge(
        pivot: Vec3,
        rotation: Quat,
        body_a: &BodyLink,
        body_b: &BodyLink,
    ) -> Option<Self> {
        use AxisLimit as L;
        Self::with_preset(
            ConstraintKind::Hinge,
            pivot,
            rotation,
            body_a,
            body_b,
            [L::LOCKED, L::LOCKED, L::LOCKED, L::LOCKED, L::LOCKED, L::FREE],
        )
    }

    /// Slider translating along the frame's X axis.
    pub fn new_slider(
        pivot: Vec3,
        rotation: Quat,
        body_a: &BodyLink,
        body_b: &BodyLink,
    ) -> Option<Self> {
        use AxisLimit as L;
        Self::with_preset(
            ConstraintKind::Slider,
            pivot,
            rotation,
            body_a,
            body_b,
            [L::FREE, L::LOCKED, L::LOCKED, L::LOCKED, L::LOCKED, L::LOCKED],
        )
    }

    /// Slider that may also spin about its X axis.
    pub fn new_piston(
        pivot: Vec3,
        rotation: Quat,
        body_a: &BodyLink,
        body_b: &BodyLink,
    ) -> Option<Self> {
        use AxisLimit as L;
        Self::with_preset(
            ConstraintKind::Piston,
            pivot,
            rotation,
            body_a,
            body_b,
            [L::FREE, L::LOCKED, L::LOCKED, L::FREE, L::LOCKED, L::LOCKED],
        )
    }

    pub fn new_6dof(
        pivot: Vec3,
        rotation: Quat,
        body_a: &BodyLink,
        body_b: &BodyLink,
    ) -> Option<Self> {
        Self::with_preset(
            ConstraintKind::Generic6Dof,
            pivot,
            rotation,
            body_a,
            body_b,
            [AxisLimit::LOCKED; 6],
        )
    }

    pub fn new_6dof_spring(
        pivot: Vec3,
        rotation: Quat,
        body_a: &BodyLink,
        body_b: &BodyLink,
        model: SpringModel,
    ) -> Option<Self> {
        Self::with_preset(
            ConstraintKind::Generic6DofSpring(model),
            pivot,
            rotation,
            body_a,
            body_b,
            [AxisLimit::LOCKED; 6],
        )
    }

    /// Motor driving linear and angular velocity along X, all axes otherwise free.
    pub fn new_motor(
        pivot: Vec3,
        rotation: Quat,
        body_a: &BodyLink,
        body_b: &BodyLink,
    ) -> Option<Self> {
        Self::with_preset(
            ConstraintKind::Motor,
            pivot,
            rotation,
            body_a,
            body_b,
            [AxisLimit::FREE; 6],
        )
    }

    pub fn link(&self) -> ConstraintLink {
        ConstraintLink(Arc::downgrade(&self.inner))
    }

    pub fn kind(&self) -> ConstraintKind {
        self.inner.lock().kind
    }

    pub fn set_limits_hinge(&mut self, lower: f32, upper: f32) {
        self.set_limits(LimitAxis::AngZ, lower, upper);
    }

    pub fn set_limits_slider(&mut self, lower: f32, upper: f32) {
        self.set_limits(LimitAxis::LinX, lower, upper);
    }

    pub fn set_limits_piston(
        &mut self,
        lin_lower: f32,
        lin_upper: f32,
        ang_lower: f32,
        ang_upper: f32,
    ) {
        self.set_limits(LimitAxis::LinX, lin_lower, lin_upper);
        self.set_limits(LimitAxis::AngX, ang_lower, ang_upper);
    }

    pub fn set_limits(&mut self, axis: LimitAxis, lower: f32, upper: f32) {
        self.inner.lock().limits[axis.index()] = AxisLimit { lower, upper };
    }

    pub fn limits(&self, axis: LimitAxis) -> (f32, f32) {
        let limit = self.inner.lock().limits[axis.index()];
        (limit.lower, limit.upper)
    }

    pub fn set_spring(&mut self, axis: LimitAxis, enabled: bool) {
        self.inner.lock().springs[axis.index()].enabled = enabled;
    }

    pub fn set_stiffness(&mut self, axis: LimitAxis, stiffness: f32) {
        self.inner.lock().springs[axis.index()].stiffness = stiffness.max(0.0);
    }

    pub fn set_damping(&mut self, axis: LimitAxis, damping: f32) {
        self.inner.lock().springs[axis.index()].damping = damping.max(0.0);
    }

    pub fn spring(&self, axis: LimitAxis) -> AxisSpring {
        self.inner.lock().springs[axis.index()]
    }

    /// Makes the current relative placement of the two bodies the spring rest state.
    pub fn set_equilibrium_point(&mut self) {
        let mut constraint = self.inner.lock();
        let (Some(a), Some(b)) = (constraint.body_a.upgrade(), constraint.body_b.upgrade()) else {
            return;
        };
        let coordinates = if Arc::ptr_eq(&a, &b) {
            [0.0; 6]
        } else {
            let a = a.lock();
            let b = b.lock();
            constraint.coordinates(&a, &b)
        };
        for (spring, value) in constraint.springs.iter_mut().zip(coordinates) {
            spring.equilibrium = value;
        }
    }

    pub fn set_enable_motor(&mut self, linear: bool, angular: bool) {
        let mut constraint = self.inner.lock();
        constraint.motor.linear_enabled = linear;
        constraint.motor.angular_enabled = angular;
    }

    pub fn set_max_impulse_motor(&mut self, linear: f32, angular: f32) {
        let mut constraint = self.inner.lock();
        constraint.motor.linear_max_impulse = linear.max(0.0);
        constraint.motor.angular_max_impulse = angular.max(0.0);
    }

    pub fn set_target_velocity_motor(&mut self, linear: f32, angular: f32) {
        let mut constraint = self.inner.lock();
        constraint.motor.linear_target_velocity = linear;
        constraint.motor.angular_target_velocity = angular;
    }

    pub fn motor(&self) -> AxisMotor {
        self.inner.lock().motor
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.inner.lock().enabled = enabled;
    }

    /// False once disabled or broken.
    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    pub fn set_breaking_threshold(&mut self, threshold: f32) {
        self.inner.lock().breaking_threshold = threshold;
    }

    pub fn breaking_threshold(&self) -> f32 {
        self.inner.lock().breaking_threshold
    }

    pub fn set_solver_iterations(&mut self, iterations: i32) {
        self.inner.lock().solver_iterations = iterations;
    }

    pub fn solver_iterations(&self) -> i32 {
        self.inner.lock().solver_iterations
    }

    pub fn applied_impulse(&self) -> f32 {
        self.inner.lock().applied_impulse
    }

    pub fn connects(&self, a: &BodyLink, b: &BodyLink) -> bool {
        let constraint = self.inner.lock();
        constraint.body_a.ptr() == a.ptr() && constraint.body_b.ptr() == b.ptr()
    }
}

fn relative_frame(body: &Body, pivot: Vec3, rotation: Quat) -> LocalFrame {
    let inverse = body.rotation.inverse();
    LocalFrame {
        position: inverse * (pivot - body.position),
        rotation: (inverse * rotation).normalize(),
    }
}
