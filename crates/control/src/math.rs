//! Small math helpers shared by the commutation and FOC paths.

use std::f32::consts::TAU;

/// sqrt(3)
pub const SQRT3: f32 = 1.732_050_8;
/// 1 / sqrt(3)
pub const INV_SQRT3: f32 = 0.577_350_26;
/// 2 / sqrt(3)
pub const TWO_OVER_SQRT3: f32 = 1.154_700_5;

/// Clamp `value` into `[min, max]`.
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value >= max {
        max
    } else if value <= min {
        min
    } else {
        value
    }
}

/// Normalize an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid of a tiny negative input can round up to exactly 2π
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Convert a mechanical angle to the electrical angle for a rotor with
/// `pole_pairs` pole pairs.
pub fn mech_to_elec_angle(mechanical_angle: f32, pole_pairs: u8) -> f32 {
    normalize_angle(mechanical_angle * f32::from(pole_pairs))
}

/// Sine and cosine of an angle in a single call.
///
/// The two are always consumed together by the transforms and SVPWM, so they
/// are produced together.
pub fn fast_sin_cos(angle: f32) -> (f32, f32) {
    angle.sin_cos()
}

/// Newton-Raphson square root for non-negative inputs.
///
/// Converges to within 1e-5 absolute error; negative inputs map to 0.
pub fn sqrt_nr(value: f32) -> f32 {
    if value <= 0.0 {
        return 0.0;
    }

    let mut guess = if value > 1.0 { value * 0.5 } else { 1.0 };
    for _ in 0..48 {
        let next = 0.5 * (guess + value / guess);
        if (next - guess).abs() <= 1e-6 * next.max(1.0) {
            return next;
        }
        guess = next;
    }
    guess
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_clamp_inside_range() {
        assert_eq!(clamp(7.0, 1.0, 9.0), 7.0);
    }

    #[test]
    fn test_clamp_above_max() {
        assert_eq!(clamp(10.0, 1.0, 9.0), 9.0);
    }

    #[test]
    fn test_clamp_below_min() {
        assert_eq!(clamp(0.5, 1.0, 9.0), 1.0);
    }

    #[test]
    fn test_clamp_idempotent() {
        let once = clamp(12.3, -1.0, 1.0);
        assert_eq!(clamp(once, -1.0, 1.0), once);
    }

    #[test]
    fn test_normalize_angle_periodic() {
        for k in -4i32..=4 {
            let theta = 1.25;
            let shifted = theta + (k as f32) * TAU;
            assert!((normalize_angle(shifted) - theta).abs() < 1e-4);
        }
    }

    #[test]
    fn test_normalize_angle_range() {
        for raw in [-10.0, -PI, -0.001, 0.0, 0.001, PI, 10.0, 100.0] {
            let n = normalize_angle(raw);
            assert!((0.0..TAU).contains(&n), "normalize({raw}) = {n}");
        }
    }

    #[test]
    fn test_mech_to_elec_scales_by_pole_pairs() {
        let elec = mech_to_elec_angle(0.5, 7);
        assert!((elec - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_sqrt_nr_matches_reference() {
        for x in [0.0f32, 1e-4, 0.25, 1.0, 2.0, 144.0, 1.0e6] {
            let reference = (x as f64).sqrt() as f32;
            assert!((sqrt_nr(x) - reference).abs() <= 1e-5 * reference.max(1.0));
        }
    }

    #[test]
    fn test_sqrt_nr_negative_is_zero() {
        assert_eq!(sqrt_nr(-4.0), 0.0);
    }
}
