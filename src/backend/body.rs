use std::sync::{Arc, Weak};

use glam::{Quat, Vec3};
use parking_lot::{Mutex, RwLock};

use super::shape::{CollisionShape, ShapeHandle};
use crate::utils::math::normalize_or_identity;

/// Activation state of a body, mirroring the backend's sleeping model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Active,
    Sleeping,
    /// Body never goes to sleep.
    DisableDeactivation,
}

/// Core rigid body description storing kinematic state and properties.
#[derive(Debug)]
pub struct Body {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub shape: Arc<RwLock<CollisionShape>>,
    pub mass: f32,
    pub inverse_mass: f32,
    pub local_inverse_inertia: Vec3,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub linear_sleep_threshold: f32,
    pub angular_sleep_threshold: f32,
    pub activation: ActivationState,
    pub sleep_timer: f32,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    pub kinematic: bool,
}

impl Body {
    fn new(shape: Arc<RwLock<CollisionShape>>, position: Vec3, rotation: Quat) -> Self {
        let mut body = Self {
            position,
            rotation: normalize_or_identity(rotation),
            scale: Vec3::ONE,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            shape,
            mass: 0.0,
            inverse_mass: 0.0,
            local_inverse_inertia: Vec3::ZERO,
            friction: 0.5,
            restitution: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            linear_sleep_threshold: 0.8,
            angular_sleep_threshold: 1.0,
            activation: ActivationState::Active,
            sleep_timer: 0.0,
            linear_factor: Vec3::ONE,
            angular_factor: Vec3::ONE,
            kinematic: false,
        };
        body.recompute_inverses();
        body
    }

    /// Bodies with zero mass, or driven externally, are never solved.
    pub fn is_static_or_kinematic(&self) -> bool {
        self.kinematic || self.inverse_mass == 0.0
    }

    pub fn is_dynamic(&self) -> bool {
        !self.is_static_or_kinematic()
    }

    pub fn is_awake(&self) -> bool {
        self.activation != ActivationState::Sleeping
    }

    pub fn wake(&mut self) {
        if self.activation == ActivationState::Sleeping {
            self.activation = ActivationState::Active;
        }
        self.sleep_timer = 0.0;
    }

    pub(crate) fn recompute_inverses(&mut self) {
        if self.kinematic || self.mass.abs() < f32::EPSILON {
            self.inverse_mass = 0.0;
            self.local_inverse_inertia = Vec3::ZERO;
            return;
        }

        self.inverse_mass = 1.0 / self.mass;
        let inertia = self.shape.read().local_inertia(self.mass, self.scale);
        self.local_inverse_inertia = Vec3::new(
            if inertia.x > f32::EPSILON { 1.0 / inertia.x } else { 0.0 },
            if inertia.y > f32::EPSILON { 1.0 / inertia.y } else { 0.0 },
            if inertia.z > f32::EPSILON { 1.0 / inertia.z } else { 0.0 },
        );
    }
}

/// Exclusively-owned backend rigid body.
///
/// The dynamics world and constraints only ever hold a [`BodyLink`], so a
/// dropped handle silently disappears from the simulation.
#[derive(Debug)]
pub struct BodyHandle {
    inner: Arc<Mutex<Body>>,
}

/// Weak, cloneable reference to a body used by worlds and constraints.
#[derive(Debug, Clone)]
pub struct BodyLink(Weak<Mutex<Body>>);

impl BodyLink {
    pub fn upgrade(&self) -> Option<Arc<Mutex<Body>>> {
        self.0.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn points_to(&self, body: &BodyHandle) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&body.inner))
    }

    pub(crate) fn ptr(&self) -> *const Mutex<Body> {
        self.0.as_ptr()
    }
}

impl BodyHandle {
    pub fn new(shape: &ShapeHandle, position: Vec3, rotation: Quat) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Body::new(shape.shared(), position, rotation))),
        }
    }

    pub fn link(&self) -> BodyLink {
        BodyLink(Arc::downgrade(&self.inner))
    }

    pub fn set_collision_shape(&mut self, shape: &ShapeHandle) {
        let mut body = self.inner.lock();
        body.shape = shape.shared();
        body.recompute_inverses();
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.inner.lock().friction = friction.max(0.0);
    }

    pub fn friction(&self) -> f32 {
        self.inner.lock().friction
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.inner.lock().restitution = restitution.max(0.0);
    }

    pub fn restitution(&self) -> f32 {
        self.inner.lock().restitution
    }

    pub fn set_damping(&mut self, linear: f32, angular: f32) {
        let mut body = self.inner.lock();
        body.linear_damping = linear.clamp(0.0, 1.0);
        body.angular_damping = angular.clamp(0.0, 1.0);
    }

    pub fn damping(&self) -> (f32, f32) {
        let body = self.inner.lock();
        (body.linear_damping, body.angular_damping)
    }

    pub fn set_sleep_thresholds(&mut self, linear: f32, angular: f32) {
        let mut body = self.inner.lock();
        body.linear_sleep_threshold = linear.max(0.0);
        body.angular_sleep_threshold = angular.max(0.0);
    }

    /// `use_deactivation == false` keeps the body awake forever.
    pub fn set_activation_state(&mut self, use_deactivation: bool) {
        let mut body = self.inner.lock();
        body.activation = if use_deactivation {
            ActivationState::Active
        } else {
            ActivationState::DisableDeactivation
        };
        body.sleep_timer = 0.0;
    }

    pub fn activation_state(&self) -> ActivationState {
        self.inner.lock().activation
    }

    pub fn activate(&mut self) {
        self.inner.lock().wake();
    }

    pub fn deactivate(&mut self) {
        let mut body = self.inner.lock();
        body.activation = ActivationState::Sleeping;
        body.linear_velocity = Vec3::ZERO;
        body.angular_velocity = Vec3::ZERO;
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().is_awake()
    }

    pub fn set_linear_factor(&mut self, x: bool, y: bool, z: bool) {
        self.inner.lock().linear_factor = axis_factor(x, y, z);
    }

    pub fn linear_factor(&self) -> Vec3 {
        self.inner.lock().linear_factor
    }

    pub fn set_angular_factor(&mut self, x: bool, y: bool, z: bool) {
        self.inner.lock().angular_factor = axis_factor(x, y, z);
    }

    pub fn angular_factor(&self) -> Vec3 {
        self.inner.lock().angular_factor
    }

    /// Zero mass turns the body static.
    pub fn set_mass(&mut self, mass: f32) {
        let mut body = self.inner.lock();
        body.mass = mass.max(0.0);
        body.recompute_inverses();
    }

    pub fn mass(&self) -> f32 {
        self.inner.lock().mass
    }

    pub fn set_kinematic_state(&mut self, kinematic: bool) {
        let mut body = self.inner.lock();
        body.kinematic = kinematic;
        if kinematic {
            body.linear_velocity = Vec3::ZERO;
            body.angular_velocity = Vec3::ZERO;
        }
        body.recompute_inverses();
    }

    pub fn is_kinematic(&self) -> bool {
        self.inner.lock().kinematic
    }

    pub fn set_loc_rot(&mut self, position: Vec3, rotation: Quat) {
        let mut body = self.inner.lock();
        body.position = position;
        body.rotation = normalize_or_identity(rotation);
    }

    pub fn position(&self) -> Vec3 {
        self.inner.lock().position
    }

    pub fn orientation(&self) -> Quat {
        self.inner.lock().rotation
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        let mut body = self.inner.lock();
        if body.scale != scale {
            body.scale = scale;
            body.recompute_inverses();
        }
    }

    pub fn scale(&self) -> Vec3 {
        self.inner.lock().scale
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.inner.lock().linear_velocity = velocity;
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.inner.lock().linear_velocity
    }

    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.inner.lock().angular_velocity = velocity;
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.inner.lock().angular_velocity
    }

    pub fn shape_margin(&self) -> f32 {
        self.inner.lock().shape.read().margin
    }

    #[cfg(test)]
    pub(crate) fn with_body<R>(&self, f: impl FnOnce(&Body) -> R) -> R {
        f(&self.inner.lock())
    }
}

fn axis_factor(x: bool, y: bool, z: bool) -> Vec3 {
    Vec3::new(
        if x { 1.0 } else { 0.0 },
        if y { 1.0 } else { 0.0 },
        if z { 1.0 } else { 0.0 },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mass_bodies_are_static() {
        let shape = ShapeHandle::new_box(1.0, 1.0, 1.0);
        let mut body = BodyHandle::new(&shape, Vec3::ZERO, Quat::IDENTITY);
        assert!(body.inner.lock().is_static_or_kinematic());
        body.set_mass(2.0);
        assert!(body.inner.lock().is_dynamic());
        body.set_kinematic_state(true);
        assert!(body.inner.lock().is_static_or_kinematic());
        assert_eq!(body.mass(), 2.0);
    }

    #[test]
    fn links_die_with_their_handle() {
        let shape = ShapeHandle::new_sphere(1.0);
        let body = BodyHandle::new(&shape, Vec3::ZERO, Quat::IDENTITY);
        let link = body.link();
        assert!(link.points_to(&body));
        assert!(link.is_alive());
        drop(body);
        assert!(!link.is_alive());
        assert!(link.upgrade().is_none());
    }

    #[test]
    fn reshaping_keeps_transform() {
        let small = ShapeHandle::new_box(0.5, 0.5, 0.5);
        let large = ShapeHandle::new_box(2.0, 2.0, 2.0);
        let mut body = BodyHandle::new(&small, Vec3::Z, Quat::IDENTITY);
        body.set_mass(1.0);
        let before = body.inner.lock().local_inverse_inertia;
        body.set_collision_shape(&large);
        assert_eq!(body.position(), Vec3::Z);
        assert!(body.inner.lock().local_inverse_inertia.x < before.x);
    }
}
