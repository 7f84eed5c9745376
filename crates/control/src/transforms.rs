//! Clarke and Park reference-frame transforms.

use crate::math::{fast_sin_cos, INV_SQRT3};

/// Two-phase Clarke transform.
///
/// Projects phase A and B currents onto the stationary αβ frame assuming a
/// balanced system (`ic = -ia - ib`).
pub fn clarke_2phase(ia: f32, ib: f32) -> (f32, f32) {
    let alpha = ia;
    let beta = (ia + 2.0 * ib) * INV_SQRT3;
    (alpha, beta)
}

/// Three-phase Clarke transform.
///
/// Uses all three measured phases, valid for unbalanced systems.
pub fn clarke_3phase(ia: f32, ib: f32, ic: f32) -> (f32, f32) {
    let alpha = ia;
    let beta = (ib - ic) * INV_SQRT3;
    (alpha, beta)
}

/// Park transform: stationary αβ into the rotating dq frame at rotor angle
/// `theta`.
pub fn park(alpha: f32, beta: f32, theta: f32) -> (f32, f32) {
    let (sin_theta, cos_theta) = fast_sin_cos(theta);
    let d = alpha * cos_theta + beta * sin_theta;
    let q = -alpha * sin_theta + beta * cos_theta;
    (d, q)
}

/// Inverse Park transform: rotating dq back into the stationary αβ frame.
pub fn inverse_park(d: f32, q: f32, theta: f32) -> (f32, f32) {
    let (sin_theta, cos_theta) = fast_sin_cos(theta);
    let alpha = d * cos_theta - q * sin_theta;
    let beta = d * sin_theta + q * cos_theta;
    (alpha, beta)
}
