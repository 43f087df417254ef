use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use glam::Vec3;
use parking_lot::Mutex;

use super::{
    body::{Body, BodyHandle, BodyLink},
    broadphase::BroadPhase,
    constraint::{Constraint, ConstraintHandle, ConstraintLink},
    integrator::Integrator,
    narrowphase::{find_contacts, CollisionProxy, ContactGeometry},
    solver::{JointDef, Solver, SolverBody},
};
use crate::{
    config::{COLLISION_GROUP_COUNT, DEFAULT_SOLVER_ITERATIONS},
    utils::logging::ScopedTimer,
};

const BROADPHASE_CELL_SIZE: f32 = 2.0;

struct RegisteredBody {
    link: BodyLink,
    groups: u32,
}

struct RegisteredConstraint {
    link: ConstraintLink,
    disable_collisions: bool,
}

/// Dynamics world stepping every registered body and constraint.
///
/// Registration holds weak links only: a handle that is dropped while still
/// registered is skipped and pruned on the next step.
pub struct DynamicsWorld {
    integrator: Integrator,
    solver: Solver,
    broadphase: BroadPhase,
    bodies: Vec<RegisteredBody>,
    constraints: Vec<RegisteredConstraint>,
    time_accumulated: f32,
    step_calls: u64,
    substeps_taken: u64,
}

impl std::fmt::Debug for DynamicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicsWorld")
            .field("gravity", &self.integrator.gravity)
            .field("solver_iterations", &self.solver.iterations)
            .field("split_impulse", &self.solver.split_impulse)
            .field("bodies", &self.bodies.len())
            .field("constraints", &self.constraints.len())
            .field("step_calls", &self.step_calls)
            .finish()
    }
}

/// Snapshot of one registered constraint for the duration of a step.
struct ActiveJoint {
    constraint: Arc<Mutex<Constraint>>,
    def: JointDef,
}

impl DynamicsWorld {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            integrator: Integrator::new(gravity),
            solver: Solver::new(DEFAULT_SOLVER_ITERATIONS),
            broadphase: BroadPhase::new(BROADPHASE_CELL_SIZE),
            bodies: Vec::new(),
            constraints: Vec::new(),
            time_accumulated: 0.0,
            step_calls: 0,
            substeps_taken: 0,
        }
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.integrator.gravity = gravity;
    }

    pub fn gravity(&self) -> Vec3 {
        self.integrator.gravity
    }

    pub fn set_solver_iterations(&mut self, iterations: u32) {
        self.solver.iterations = iterations.max(1);
    }

    pub fn solver_iterations(&self) -> u32 {
        self.solver.iterations
    }

    pub fn set_split_impulse(&mut self, split_impulse: bool) {
        self.solver.split_impulse = split_impulse;
    }

    pub fn split_impulse(&self) -> bool {
        self.solver.split_impulse
    }

    /// Registers a body. Adding an already registered body only updates its groups.
    pub fn add_body(&mut self, body: &BodyHandle, collision_groups: u32) {
        let collision_groups = collision_groups & ((1 << COLLISION_GROUP_COUNT) - 1);
        if let Some(entry) = self.bodies.iter_mut().find(|entry| entry.link.points_to(body)) {
            entry.groups = collision_groups;
            return;
        }
        self.bodies.push(RegisteredBody {
            link: body.link(),
            groups: collision_groups,
        });
    }

    /// Unregisters a body; unknown bodies are ignored.
    pub fn remove_body(&mut self, body: &BodyHandle) {
        self.bodies.retain(|entry| !entry.link.points_to(body));
    }

    pub fn contains_body(&self, body: &BodyHandle) -> bool {
        self.bodies.iter().any(|entry| entry.link.points_to(body))
    }

    /// Number of registered bodies still alive.
    pub fn body_count(&self) -> usize {
        self.bodies.iter().filter(|entry| entry.link.is_alive()).count()
    }

    pub fn add_constraint(&mut self, constraint: &ConstraintHandle, disable_collisions: bool) {
        if let Some(entry) = self
            .constraints
            .iter_mut()
            .find(|entry| entry.link.points_to(constraint))
        {
            entry.disable_collisions = disable_collisions;
            return;
        }
        self.constraints.push(RegisteredConstraint {
            link: constraint.link(),
            disable_collisions,
        });
    }

    pub fn remove_constraint(&mut self, constraint: &ConstraintHandle) {
        self.constraints
            .retain(|entry| !entry.link.points_to(constraint));
    }

    pub fn contains_constraint(&self, constraint: &ConstraintHandle) -> bool {
        self.constraints
            .iter()
            .any(|entry| entry.link.points_to(constraint))
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints
            .iter()
            .filter(|entry| entry.link.upgrade().is_some())
            .count()
    }

    /// Number of `step_simulation` calls so far.
    pub fn step_count(&self) -> u64 {
        self.step_calls
    }

    pub fn substep_count(&self) -> u64 {
        self.substeps_taken
    }

    /// Advances the world by `timestep` seconds in fixed sub-steps of
    /// `fixed_step`, carrying the remainder over to the next call.
    ///
    /// Returns the number of sub-steps taken.
    pub fn step_simulation(&mut self, timestep: f32, max_substeps: u32, fixed_step: f32) -> u32 {
        let _timer = ScopedTimer::new("dynamics_world_step");
        self.step_calls += 1;

        if fixed_step <= 0.0 || !timestep.is_finite() {
            return 0;
        }

        self.bodies.retain(|entry| entry.link.is_alive());
        self.constraints
            .retain(|entry| entry.link.upgrade().is_some());

        self.time_accumulated += timestep.max(0.0);
        // Slack keeps frame lengths that are exact multiples of the sub-step
        // from losing a step to rounding.
        let available = ((self.time_accumulated + 1e-6) / fixed_step).floor() as u32;
        let substeps = available.min(max_substeps);
        if substeps < available {
            self.time_accumulated = 0.0;
        } else {
            let consumed = substeps as f32 * fixed_step;
            self.time_accumulated = (self.time_accumulated - consumed).max(0.0);
        }
        if substeps == 0 {
            return 0;
        }

        let arcs: Vec<(Arc<Mutex<Body>>, u32)> = self
            .bodies
            .iter()
            .filter_map(|entry| entry.link.upgrade().map(|arc| (arc, entry.groups)))
            .collect();

        let mut solver_bodies = Vec::with_capacity(arcs.len());
        let mut proxies = Vec::with_capacity(arcs.len());
        let mut index_of = HashMap::with_capacity(arcs.len());
        for (index, (arc, groups)) in arcs.iter().enumerate() {
            let body = arc.lock();
            let geometry = ContactGeometry::from_shape(&body.shape.read(), body.scale);
            proxies.push(CollisionProxy::new(geometry, body.position, body.rotation));
            solver_bodies.push(SolverBody::from_body(&body, *groups));
            index_of.insert(Arc::as_ptr(arc), index);
        }

        let mut joints = Vec::new();
        let mut ignored_pairs = HashSet::new();
        for entry in &self.constraints {
            let Some(constraint) = entry.link.upgrade() else {
                continue;
            };
            let def = {
                let guard = constraint.lock();
                let (Some(a), Some(b)) = (
                    index_of.get(&guard.body_a.ptr()),
                    index_of.get(&guard.body_b.ptr()),
                ) else {
                    continue;
                };
                if entry.disable_collisions {
                    ignored_pairs.insert(((*a).min(*b), (*a).max(*b)));
                }
                JointDef::from_constraint(&guard, *a, *b, self.solver.iterations)
            };
            joints.push(ActiveJoint { constraint, def });
        }

        for _ in 0..substeps {
            self.substep(
                &mut solver_bodies,
                &mut proxies,
                &mut joints,
                &ignored_pairs,
                fixed_step,
            );
        }

        for ((arc, _), state) in arcs.iter().zip(&solver_bodies) {
            state.write_back(&mut arc.lock());
        }
        for joint in &joints {
            joint.def.write_back(&mut joint.constraint.lock());
        }

        self.substeps_taken += u64::from(substeps);
        log::trace!(
            "stepped {} bodies and {} constraints over {} sub-steps",
            solver_bodies.len(),
            joints.len(),
            substeps
        );
        substeps
    }

    fn substep(
        &mut self,
        bodies: &mut [SolverBody],
        proxies: &mut [CollisionProxy],
        joints: &mut [ActiveJoint],
        ignored_pairs: &HashSet<(usize, usize)>,
        dt: f32,
    ) {
        for body in bodies.iter_mut() {
            self.integrator.integrate_velocity(body, dt);
        }

        for (proxy, body) in proxies.iter_mut().zip(bodies.iter()) {
            proxy.set_pose(body.position, body.rotation);
        }
        let bounds: Vec<_> = proxies.iter().map(CollisionProxy::world_aabb).collect();
        let pairs: Vec<(usize, usize)> = self
            .broadphase
            .potential_pairs(&bounds)
            .into_iter()
            .filter(|&(a, b)| {
                let (body_a, body_b) = (&bodies[a], &bodies[b]);
                (body_a.is_simulated() || body_b.is_simulated())
                    && body_a.groups & body_b.groups != 0
                    && !ignored_pairs.contains(&(a, b))
            })
            .collect();
        let contacts = find_contacts(&pairs, proxies);

        for contact in &contacts {
            wake_pair(bodies, contact.a, contact.b);
        }
        for joint in joints.iter().filter(|joint| joint.def.enabled) {
            wake_pair(bodies, joint.def.a, joint.def.b);
        }

        let mut defs: Vec<JointDef> = joints.iter().map(|joint| joint.def.clone()).collect();
        self.solver.solve(bodies, &contacts, &mut defs, dt);
        for (joint, def) in joints.iter_mut().zip(defs) {
            joint.def = def;
        }

        for body in bodies.iter_mut() {
            self.integrator.integrate_position(body, dt);
            self.integrator.update_sleeping(body, dt);
        }
    }
}

/// An awake dynamic body wakes a sleeping dynamic partner.
fn wake_pair(bodies: &mut [SolverBody], a: usize, b: usize) {
    if bodies[a].is_simulated() && bodies[b].dynamic && !bodies[b].is_simulated() {
        bodies[b].wake();
    } else if bodies[b].is_simulated() && bodies[a].dynamic && !bodies[a].is_simulated() {
        bodies[a].wake();
    }
}
