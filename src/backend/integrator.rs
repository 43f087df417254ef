use glam::Vec3;

use super::{body::ActivationState, solver::SolverBody};
use crate::{config::DEACTIVATION_TIME, utils::math::angular_velocity_to_quat};

/// Integrator responsible for stepping solver bodies forward in time.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub gravity: Vec3,
}

impl Integrator {
    pub fn new(gravity: Vec3) -> Self {
        Self { gravity }
    }

    /// Gravity and damping, applied before contacts are solved.
    pub fn integrate_velocity(&self, body: &mut SolverBody, dt: f32) {
        if !body.is_simulated() {
            return;
        }

        body.linear_velocity += self.gravity * body.linear_factor * dt;

        body.linear_velocity *= (1.0 - body.linear_damping).max(0.0).powf(dt);
        body.angular_velocity *= (1.0 - body.angular_damping).max(0.0).powf(dt);
    }

    pub fn integrate_position(&self, body: &mut SolverBody, dt: f32) {
        if !body.is_simulated() {
            body.pseudo_linear = Vec3::ZERO;
            body.pseudo_angular = Vec3::ZERO;
            return;
        }

        body.position += (body.linear_velocity + body.pseudo_linear) * dt;

        let omega = body.angular_velocity + body.pseudo_angular;
        let delta = angular_velocity_to_quat(omega, dt);
        body.rotation = (delta * body.rotation).normalize();

        body.pseudo_linear = Vec3::ZERO;
        body.pseudo_angular = Vec3::ZERO;
    }

    /// Puts bodies to sleep once they stayed slow for long enough.
    pub fn update_sleeping(&self, body: &mut SolverBody, dt: f32) {
        if !body.is_simulated() || body.activation != ActivationState::Active {
            return;
        }

        let slow = body.linear_velocity.length() < body.linear_sleep_threshold
            && body.angular_velocity.length() < body.angular_sleep_threshold;
        if !slow {
            body.sleep_timer = 0.0;
            return;
        }

        body.sleep_timer += dt;
        if body.sleep_timer > DEACTIVATION_TIME {
            body.activation = ActivationState::Sleeping;
            body.linear_velocity = Vec3::ZERO;
            body.angular_velocity = Vec3::ZERO;
        }
    }
}
