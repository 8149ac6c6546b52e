//! Rotation vector to yaw/pitch/roll conversion.
//!
//! Angles follow `R = Rz(roll) · Ry(yaw) · Rx(pitch)`: pitch about the
//! camera x axis, yaw about y, roll about z. Other Euler conventions give
//! different axis meanings for the same matrix.

use crate::{constants::GIMBAL_LOCK_EPSILON, types::EulerAngles};
use nalgebra::{Matrix3, Vector3};

/// Convert an axis-angle rotation vector to a rotation matrix (Rodrigues)
#[must_use]
pub fn rotation_vector_to_matrix(rotation: &Vector3<f64>) -> Matrix3<f64> {
    let theta = rotation.norm();
    if theta < f64::EPSILON {
        return Matrix3::identity();
    }

    let axis = rotation / theta;
    let k = axis.cross_matrix();
    Matrix3::identity() + k * theta.sin() + k * k * (1.0 - theta.cos())
}

/// Extract Euler angles in degrees from a rotation matrix
#[must_use]
pub fn rotation_matrix_to_euler(r: &Matrix3<f64>) -> EulerAngles {
    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();

    let (pitch, yaw, roll) = if sy >= GIMBAL_LOCK_EPSILON {
        (
            r[(2, 1)].atan2(r[(2, 2)]),
            (-r[(2, 0)]).atan2(sy),
            r[(1, 0)].atan2(r[(0, 0)]),
        )
    } else {
        // Gimbal lock: roll is folded into pitch
        ((-r[(1, 2)]).atan2(r[(1, 1)]), (-r[(2, 0)]).atan2(sy), 0.0)
    };

    EulerAngles {
        yaw: yaw.to_degrees(),
        pitch: pitch.to_degrees(),
        roll: roll.to_degrees(),
    }
}

/// Decompose a rotation vector into yaw, pitch and roll in degrees
#[must_use]
pub fn decompose(rotation: &Vector3<f64>) -> EulerAngles {
    rotation_matrix_to_euler(&rotation_vector_to_matrix(rotation))
}
