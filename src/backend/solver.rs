use glam::{Mat3, Quat, Vec3};

use super::{
    body::{ActivationState, Body},
    constraint::{
        relative_coordinates, AxisLimit, AxisMotor, AxisSpring, Constraint, ConstraintKind,
        LimitAxis, LocalFrame, SpringModel,
    },
    narrowphase::ContactPoint,
};
use crate::utils::math::world_inverse_inertia;

/// Fraction of contact penetration removed per step.
const CONTACT_ERP: f32 = 0.2;
const JOINT_ERP: f32 = 0.2;
const ALLOWED_PENETRATION: f32 = 0.005;
/// Approach speeds below this do not bounce.
const RESTITUTION_THRESHOLD: f32 = 1.0;
const MAX_JOINT_BIAS: f32 = 20.0;

/// Per-step copy of a backend body the solver works on.
#[derive(Debug, Clone)]
pub struct SolverBody {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub pseudo_linear: Vec3,
    pub pseudo_angular: Vec3,
    pub inverse_mass: f32,
    pub local_inverse_inertia: Vec3,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub linear_sleep_threshold: f32,
    pub angular_sleep_threshold: f32,
    pub activation: ActivationState,
    pub sleep_timer: f32,
    pub dynamic: bool,
    pub groups: u32,
    inv_mass: f32,
    inv_inertia: Mat3,
}

impl SolverBody {
    pub fn from_body(body: &Body, groups: u32) -> Self {
        Self {
            position: body.position,
            rotation: body.rotation,
            linear_velocity: body.linear_velocity,
            angular_velocity: body.angular_velocity,
            pseudo_linear: Vec3::ZERO,
            pseudo_angular: Vec3::ZERO,
            inverse_mass: body.inverse_mass,
            local_inverse_inertia: body.local_inverse_inertia,
            linear_factor: body.linear_factor,
            angular_factor: body.angular_factor,
            friction: body.friction,
            restitution: body.restitution,
            linear_damping: body.linear_damping,
            angular_damping: body.angular_damping,
            linear_sleep_threshold: body.linear_sleep_threshold,
            angular_sleep_threshold: body.angular_sleep_threshold,
            activation: body.activation,
            sleep_timer: body.sleep_timer,
            dynamic: body.is_dynamic(),
            groups,
            inv_mass: 0.0,
            inv_inertia: Mat3::ZERO,
        }
    }

    pub fn write_back(&self, body: &mut Body) {
        if !self.dynamic {
            return;
        }
        body.position = self.position;
        body.rotation = self.rotation;
        body.linear_velocity = self.linear_velocity;
        body.angular_velocity = self.angular_velocity;
        body.activation = self.activation;
        body.sleep_timer = self.sleep_timer;
    }

    /// Dynamic and awake.
    pub fn is_simulated(&self) -> bool {
        self.dynamic && self.activation != ActivationState::Sleeping
    }

    pub fn wake(&mut self) {
        if self.activation == ActivationState::Sleeping {
            self.activation = ActivationState::Active;
        }
        self.sleep_timer = 0.0;
    }

    fn refresh_mass(&mut self) {
        if self.is_simulated() {
            self.inv_mass = self.inverse_mass;
            self.inv_inertia = world_inverse_inertia(self.local_inverse_inertia, self.rotation);
        } else {
            self.inv_mass = 0.0;
            self.inv_inertia = Mat3::ZERO;
        }
    }
}

/// One scalar constraint row between two bodies.
#[derive(Debug, Clone, Copy)]
struct Jacobian {
    a: usize,
    b: usize,
    linear_a: Vec3,
    angular_a: Vec3,
    linear_b: Vec3,
    angular_b: Vec3,
    effective_mass: f32,
}

impl Jacobian {
    fn new(
        bodies: &[SolverBody],
        (a, b): (usize, usize),
        (linear_a, angular_a): (Vec3, Vec3),
        (linear_b, angular_b): (Vec3, Vec3),
    ) -> Self {
        let body_a = &bodies[a];
        let body_b = &bodies[b];
        let k = body_a.inv_mass * (linear_a * body_a.linear_factor).dot(linear_a)
            + (body_a.inv_inertia * angular_a * body_a.angular_factor).dot(angular_a)
            + body_b.inv_mass * (linear_b * body_b.linear_factor).dot(linear_b)
            + (body_b.inv_inertia * angular_b * body_b.angular_factor).dot(angular_b);

        Self {
            a,
            b,
            linear_a,
            angular_a,
            linear_b,
            angular_b,
            effective_mass: if k > 1e-9 { 1.0 / k } else { 0.0 },
        }
    }

    fn velocity(&self, bodies: &[SolverBody]) -> f32 {
        let a = &bodies[self.a];
        let b = &bodies[self.b];
        self.linear_a.dot(a.linear_velocity)
            + self.angular_a.dot(a.angular_velocity)
            + self.linear_b.dot(b.linear_velocity)
            + self.angular_b.dot(b.angular_velocity)
    }

    fn pseudo_velocity(&self, bodies: &[SolverBody]) -> f32 {
        let a = &bodies[self.a];
        let b = &bodies[self.b];
        self.linear_a.dot(a.pseudo_linear)
            + self.angular_a.dot(a.pseudo_angular)
            + self.linear_b.dot(b.pseudo_linear)
            + self.angular_b.dot(b.pseudo_angular)
    }

    fn apply(&self, bodies: &mut [SolverBody], impulse: f32) {
        let a = &mut bodies[self.a];
        a.linear_velocity += self.linear_a * a.linear_factor * (a.inv_mass * impulse);
        a.angular_velocity += a.inv_inertia * self.angular_a * a.angular_factor * impulse;
        let b = &mut bodies[self.b];
        b.linear_velocity += self.linear_b * b.linear_factor * (b.inv_mass * impulse);
        b.angular_velocity += b.inv_inertia * self.angular_b * b.angular_factor * impulse;
    }

    fn apply_pseudo(&self, bodies: &mut [SolverBody], impulse: f32) {
        let a = &mut bodies[self.a];
        a.pseudo_linear += self.linear_a * a.linear_factor * (a.inv_mass * impulse);
        a.pseudo_angular += a.inv_inertia * self.angular_a * a.angular_factor * impulse;
        let b = &mut bodies[self.b];
        b.pseudo_linear += self.linear_b * b.linear_factor * (b.inv_mass * impulse);
        b.pseudo_angular += b.inv_inertia * self.angular_b * b.angular_factor * impulse;
    }
}

#[derive(Debug, Clone)]
struct ContactConstraint {
    normal: Jacobian,
    tangents: [Jacobian; 2],
    friction: f32,
    velocity_target: f32,
    position_bias: f32,
    normal_impulse: f32,
    tangent_impulse: [f32; 2],
    pseudo_impulse: f32,
}

#[derive(Debug, Clone)]
struct JointRow {
    jacobian: Jacobian,
    target: f32,
    lower: f32,
    upper: f32,
    impulse: f32,
    joint: usize,
    iterations: u32,
    counts_for_breaking: bool,
}

/// Per-step copy of a backend constraint resolved to solver body indices.
#[derive(Debug, Clone)]
pub struct JointDef {
    pub a: usize,
    pub b: usize,
    pub kind: ConstraintKind,
    pub frame_a: LocalFrame,
    pub frame_b: LocalFrame,
    pub limits: [AxisLimit; 6],
    pub springs: [AxisSpring; 6],
    pub motor: AxisMotor,
    pub enabled: bool,
    pub breaking_threshold: f32,
    pub iterations: u32,
    pub applied_impulse: f32,
}

impl JointDef {
    pub fn from_constraint(
        constraint: &Constraint,
        a: usize,
        b: usize,
        world_iterations: u32,
    ) -> Self {
        let iterations = if constraint.solver_iterations > 0 {
            constraint.solver_iterations as u32
        } else {
            world_iterations
        };
        Self {
            a,
            b,
            kind: constraint.kind,
            frame_a: constraint.frame_a,
            frame_b: constraint.frame_b,
            limits: constraint.limits,
            springs: constraint.springs,
            motor: constraint.motor,
            enabled: constraint.enabled,
            breaking_threshold: constraint.breaking_threshold,
            iterations,
            applied_impulse: 0.0,
        }
    }

    pub fn write_back(&self, constraint: &mut Constraint) {
        constraint.enabled = self.enabled;
        constraint.applied_impulse = self.applied_impulse;
    }

    fn spring_model(&self) -> SpringModel {
        match self.kind {
            ConstraintKind::Generic6DofSpring(model) => model,
            _ => SpringModel::Implicit,
        }
    }
}

/// Sequential impulse solver for contacts and six-axis joints.
#[derive(Debug, Clone)]
pub struct Solver {
    pub iterations: u32,
    pub split_impulse: bool,
}

impl Solver {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations,
            split_impulse: false,
        }
    }

    pub fn solve(
        &self,
        bodies: &mut [SolverBody],
        contacts: &[ContactPoint],
        joints: &mut [JointDef],
        dt: f32,
    ) {
        if dt <= 0.0 {
            return;
        }
        for body in bodies.iter_mut() {
            body.refresh_mass();
        }

        let mut contact_constraints: Vec<ContactConstraint> = contacts
            .iter()
            .filter_map(|contact| self.prepare_contact(bodies, contact, dt))
            .collect();

        let mut rows = Vec::new();
        for (index, joint) in joints.iter().enumerate() {
            if joint.enabled && joint.a != joint.b {
                prepare_joint(index, joint, bodies, dt, &mut rows);
            }
        }

        let max_iterations = rows
            .iter()
            .map(|row| row.iterations)
            .fold(self.iterations, u32::max);

        for iteration in 0..max_iterations {
            for row in rows.iter_mut() {
                if iteration < row.iterations {
                    solve_row(bodies, row);
                }
            }
            if iteration < self.iterations {
                for contact in contact_constraints.iter_mut() {
                    solve_contact(bodies, contact);
                }
            }
        }

        for joint in joints.iter_mut() {
            joint.applied_impulse = 0.0;
        }
        for row in rows.iter().filter(|row| row.counts_for_breaking) {
            joints[row.joint].applied_impulse += row.impulse.abs();
        }
        for joint in joints.iter_mut() {
            if joint.enabled && joint.applied_impulse > joint.breaking_threshold {
                log::debug!(
                    "constraint broke with impulse {:.3} over threshold {:.3}",
                    joint.applied_impulse,
                    joint.breaking_threshold
                );
                joint.enabled = false;
            }
        }

        if self.split_impulse {
            for _ in 0..self.iterations {
                for contact in contact_constraints.iter_mut() {
                    solve_contact_pseudo(bodies, contact);
                }
            }
        }
    }

    fn prepare_contact(
        &self,
        bodies: &[SolverBody],
        contact: &ContactPoint,
        dt: f32,
    ) -> Option<ContactConstraint> {
        let body_a = &bodies[contact.a];
        let body_b = &bodies[contact.b];
        let n = contact.normal;
        let ra = contact.point - body_a.position;
        let rb = contact.point - body_b.position;
        let pair = (contact.a, contact.b);

        let normal = Jacobian::new(bodies, pair, (n, ra.cross(n)), (-n, -rb.cross(n)));
        if normal.effective_mass == 0.0 {
            return None;
        }

        let (t1, t2) = n.any_orthonormal_pair();
        let tangents = [
            Jacobian::new(bodies, pair, (t1, ra.cross(t1)), (-t1, -rb.cross(t1))),
            Jacobian::new(bodies, pair, (t2, ra.cross(t2)), (-t2, -rb.cross(t2))),
        ];

        let approach = normal.velocity(bodies);
        let correction = CONTACT_ERP / dt * (contact.depth - ALLOWED_PENETRATION).max(0.0);
        let mut velocity_target = if contact.depth < 0.0 {
            contact.depth / dt
        } else if self.split_impulse {
            0.0
        } else {
            correction
        };

        let restitution = body_a.restitution * body_b.restitution;
        if approach < -RESTITUTION_THRESHOLD {
            velocity_target = velocity_target.max(-restitution * approach);
        }

        Some(ContactConstraint {
            normal,
            tangents,
            friction: body_a.friction * body_b.friction,
            velocity_target,
            position_bias: if self.split_impulse { correction } else { 0.0 },
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
            pseudo_impulse: 0.0,
        })
    }
}

fn solve_contact(bodies: &mut [SolverBody], contact: &mut ContactConstraint) {
    let velocity = contact.normal.velocity(bodies);
    let lambda = contact.normal.effective_mass * (contact.velocity_target - velocity);
    let accumulated = (contact.normal_impulse + lambda).max(0.0);
    let delta = accumulated - contact.normal_impulse;
    contact.normal_impulse = accumulated;
    contact.normal.apply(bodies, delta);

    let limit = contact.friction * contact.normal_impulse;
    for (tangent, impulse) in contact.tangents.iter().zip(contact.tangent_impulse.iter_mut()) {
        if tangent.effective_mass == 0.0 {
            continue;
        }
        let lambda = -tangent.effective_mass * tangent.velocity(bodies);
        let accumulated = (*impulse + lambda).clamp(-limit, limit);
        let delta = accumulated - *impulse;
        *impulse = accumulated;
        tangent.apply(bodies, delta);
    }
}

fn solve_contact_pseudo(bodies: &mut [SolverBody], contact: &mut ContactConstraint) {
    if contact.position_bias <= 0.0 {
        return;
    }
    let velocity = contact.normal.pseudo_velocity(bodies);
    let lambda = contact.normal.effective_mass * (contact.position_bias - velocity);
    let accumulated = (contact.pseudo_impulse + lambda).max(0.0);
    let delta = accumulated - contact.pseudo_impulse;
    contact.pseudo_impulse = accumulated;
    contact.normal.apply_pseudo(bodies, delta);
}

fn solve_row(bodies: &mut [SolverBody], row: &mut JointRow) {
    let velocity = row.jacobian.velocity(bodies);
    let lambda = row.jacobian.effective_mass * (row.target - velocity);
    let accumulated = (row.impulse + lambda).clamp(row.lower, row.upper);
    let delta = accumulated - row.impulse;
    row.impulse = accumulated;
    row.jacobian.apply(bodies, delta);
}

fn axis_direction(index: usize) -> Vec3 {
    match index % 3 {
        0 => Vec3::X,
        1 => Vec3::Y,
        _ => Vec3::Z,
    }
}

/// Builds the limit and motor rows of one joint and applies its springs.
fn prepare_joint(
    index: usize,
    joint: &JointDef,
    bodies: &mut [SolverBody],
    dt: f32,
    rows: &mut Vec<JointRow>,
) {
    let (a, b) = (joint.a, joint.b);
    let frame_a = joint.frame_a.to_world(bodies[a].position, bodies[a].rotation);
    let frame_b = joint.frame_b.to_world(bodies[b].position, bodies[b].rotation);
    let coordinates = relative_coordinates(frame_a, frame_b);
    let ra = frame_a.0 - bodies[a].position;
    let rb = frame_b.0 - bodies[b].position;

    for axis in LimitAxis::ALL {
        let i = axis.index();
        let direction = frame_a.1 * axis_direction(i);
        let jacobian = if axis.is_angular() {
            Jacobian::new(bodies, (a, b), (Vec3::ZERO, -direction), (Vec3::ZERO, direction))
        } else {
            Jacobian::new(
                bodies,
                (a, b),
                (-direction, -ra.cross(direction)),
                (direction, rb.cross(direction)),
            )
        };
        if jacobian.effective_mass == 0.0 {
            continue;
        }
        let value = coordinates[i];

        let spring = joint.springs[i];
        if spring.enabled {
            apply_spring(bodies, &jacobian, &spring, joint.spring_model(), value, dt);
        }

        let limit = joint.limits[i];
        if !limit.is_free() {
            let bounds = if limit.lower == limit.upper {
                Some((value - limit.lower, f32::MIN, f32::MAX))
            } else if value < limit.lower {
                Some((value - limit.lower, 0.0, f32::MAX))
            } else if value > limit.upper {
                Some((value - limit.upper, f32::MIN, 0.0))
            } else {
                None
            };
            if let Some((error, lower, upper)) = bounds {
                rows.push(JointRow {
                    jacobian,
                    target: (-JOINT_ERP / dt * error).clamp(-MAX_JOINT_BIAS, MAX_JOINT_BIAS),
                    lower,
                    upper,
                    impulse: 0.0,
                    joint: index,
                    iterations: joint.iterations,
                    counts_for_breaking: true,
                });
            }
        }

        let motor = match axis {
            LimitAxis::LinX if joint.motor.linear_enabled => Some((
                joint.motor.linear_target_velocity,
                joint.motor.linear_max_impulse,
            )),
            LimitAxis::AngX if joint.motor.angular_enabled => Some((
                joint.motor.angular_target_velocity,
                joint.motor.angular_max_impulse,
            )),
            _ => None,
        };
        if let Some((target, max_impulse)) = motor {
            rows.push(JointRow {
                jacobian,
                target,
                lower: -max_impulse,
                upper: max_impulse,
                impulse: 0.0,
                joint: index,
                iterations: joint.iterations,
                counts_for_breaking: false,
            });
        }
    }
}

fn apply_spring(
    bodies: &mut [SolverBody],
    jacobian: &Jacobian,
    spring: &AxisSpring,
    model: SpringModel,
    value: f32,
    dt: f32,
) {
    let stretch = value - spring.equilibrium;
    let velocity = jacobian.velocity(bodies);
    let impulse = match model {
        SpringModel::Implicit => {
            let softness = spring.damping + dt * spring.stiffness;
            if softness <= 0.0 {
                return;
            }
            let gamma = 1.0 / (dt * softness);
            let bias = stretch * spring.stiffness / softness;
            -(velocity + bias) / (1.0 / jacobian.effective_mass + gamma)
        }
        SpringModel::Explicit => {
            let raw = -dt * (spring.stiffness * stretch + spring.damping * velocity);
            let cap = jacobian.effective_mass * (velocity.abs() + stretch.abs() / dt);
            raw.clamp(-cap, cap)
        }
    };
    jacobian.apply(bodies, impulse);
}
