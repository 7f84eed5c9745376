//! Space-vector PWM duty synthesis
//!
//! Converts an electrical angle and a modulation index into center-aligned
//! per-phase duty cycles using angle-based sector detection.

use std::f32::consts::FRAC_PI_3;

use crate::error::UtilsError;
use crate::math::{clamp, fast_sin_cos, normalize_angle, TWO_OVER_SQRT3};

/// Generate per-phase duty cycles for the reference vector at `theta_e`
/// (radians) with modulation index `modulation`.
///
/// The angle is normalized and the modulation index clamped to `[0, 1]`.
/// The zero-vector time is split evenly around the active vectors, which
/// centers the pulses for center-aligned PWM hardware. Duties stay inside
/// `[0, 1]` up to the linear modulation limit (m = √3/2).
pub fn generate(theta_e: f32, modulation: f32) -> Result<[f32; 3], UtilsError> {
    let theta = normalize_angle(theta_e);
    let m = clamp(modulation, 0.0, 1.0);

    let sector = (theta / FRAC_PI_3) as u8;
    let sector_theta = theta - f32::from(sector) * FRAC_PI_3;

    let (sin_a, _) = fast_sin_cos(sector_theta);
    let (sin_b, _) = fast_sin_cos(FRAC_PI_3 - sector_theta);

    // t1: dwell on the leading active vector, t2: on the trailing one,
    // t0: remaining null-vector time
    let t1 = m * sin_b * TWO_OVER_SQRT3;
    let t2 = m * sin_a * TWO_OVER_SQRT3;
    let t0 = 1.0 - t1 - t2;
    let half_t0 = 0.5 * t0;

    let duties = match sector {
        0 => [t1 + t2 + half_t0, t2 + half_t0, half_t0],
        1 => [t1 + half_t0, t1 + t2 + half_t0, half_t0],
        2 => [half_t0, t1 + t2 + half_t0, t2 + half_t0],
        3 => [half_t0, t1 + half_t0, t1 + t2 + half_t0],
        4 => [t2 + half_t0, half_t0, t1 + t2 + half_t0],
        5 => [t1 + t2 + half_t0, half_t0, t1 + half_t0],
        _ => return Err(UtilsError::Internal),
    };

    Ok(duties)
}
