//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Mat4, Quat, Vec3};

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-6 {
        return Quat::IDENTITY;
    }
    let axis = angular.normalize();
    Quat::from_axis_angle(axis, angle)
}

/// Splits a world matrix into location and a normalized rotation, dropping scale.
pub fn mat4_to_loc_quat(mat: &Mat4) -> (Vec3, Quat) {
    let (_, rotation, translation) = mat.to_scale_rotation_translation();
    (translation, normalize_or_identity(rotation))
}

/// Per-axis scale of a world matrix.
pub fn mat4_to_size(mat: &Mat4) -> Vec3 {
    Vec3::new(
        mat.x_axis.truncate().length(),
        mat.y_axis.truncate().length(),
        mat.z_axis.truncate().length(),
    )
}

pub fn normalize_or_identity(q: Quat) -> Quat {
    let len = q.length();
    if len < 1e-6 || !len.is_finite() {
        Quat::IDENTITY
    } else {
        q / len
    }
}

/// Rotates a body-space inverse inertia tensor into world space.
pub fn world_inverse_inertia(local_inverse: Vec3, rotation: Quat) -> Mat3 {
    let r = Mat3::from_quat(rotation);
    r * Mat3::from_diagonal(local_inverse) * r.transpose()
}

/// Diagonal inertia tensor for a solid box with the given half-extents.
pub fn inertia_box(half_extents: Vec3, mass: f32) -> Vec3 {
    let lx = half_extents.x * 2.0;
    let ly = half_extents.y * 2.0;
    let lz = half_extents.z * 2.0;
    let factor = mass / 12.0;
    Vec3::new(
        factor * (ly * ly + lz * lz),
        factor * (lx * lx + lz * lz),
        factor * (lx * lx + ly * ly),
    )
}

/// Diagonal inertia tensor for a solid sphere.
pub fn inertia_sphere(radius: f32, mass: f32) -> Vec3 {
    Vec3::splat(0.4 * mass * radius * radius)
}

/// Diagonal inertia tensor for a solid capsule standing along Z.
pub fn inertia_capsule(radius: f32, height: f32, mass: f32) -> Vec3 {
    let cylinder_mass = mass * 0.6;
    let sphere_mass = (mass - cylinder_mass) / 2.0;

    let lateral = (1.0 / 12.0) * cylinder_mass * (3.0 * radius * radius + height * height);
    let cylinder = Vec3::new(lateral, lateral, 0.5 * cylinder_mass * radius * radius);
    let sphere = Vec3::splat(0.4 * sphere_mass * radius * radius);

    cylinder + sphere
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn loc_quat_ignores_scale() {
        let rot = Quat::from_rotation_z(0.7);
        let mat = Mat4::from_scale_rotation_translation(Vec3::new(2.0, 3.0, 0.5), rot, Vec3::X);
        let (loc, orn) = mat4_to_loc_quat(&mat);
        assert_relative_eq!(loc.x, 1.0, epsilon = 1e-5);
        assert!(orn.dot(rot).abs() > 0.9999);
        let size = mat4_to_size(&mat);
        assert_relative_eq!(size.y, 3.0, epsilon = 1e-5);
        assert_relative_eq!(size.z, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn box_inertia_is_symmetric_for_cubes() {
        let i = inertia_box(Vec3::splat(0.5), 6.0);
        assert_relative_eq!(i.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(i.x, i.z, epsilon = 1e-6);
    }
}
