//! Back-EMF + PLL rotor observer.
//!
//! Estimates the rotor's electrical angle and angular velocity from the
//! stationary-frame voltages and currents using the motor voltage equation
//! (the inductive di/dt term is omitted at this model level), with a PLL
//! locking onto the back-EMF direction.

use serde::{Deserialize, Serialize};

use control::math::{fast_sin_cos, sqrt_nr};
use control::{Pll, PllConfig, UtilsError};

/// Back-EMF magnitude below which the estimate is frozen (V)
const MIN_BEMF_MAGNITUDE: f32 = 0.01;

/// Configuration for the back-EMF + PLL observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BemfPllConfig {
    /// Inner PLL tuning
    pub pll: PllConfig,
    /// Stator resistance (Ω)
    pub stator_resistance: f32,
    /// Stator inductance (H)
    pub stator_inductance: f32,
    /// Permanent-magnet flux linkage (Wb)
    pub flux_linkage: f32,
    /// Speed below which the estimate is unreliable (rad/s)
    pub min_speed: f32,
    /// Speed ceiling (rad/s)
    pub max_speed: f32,
}

impl BemfPllConfig {
    pub fn new(pll: PllConfig, stator_resistance: f32) -> Self {
        Self {
            pll,
            stator_resistance,
            stator_inductance: 0.0,
            flux_linkage: 0.0,
            min_speed: 0.0,
            max_speed: f32::INFINITY,
        }
    }
}

/// Back-EMF + PLL observer with state.
#[derive(Debug, Clone)]
pub struct BemfPllObserver {
    config: BemfPllConfig,
    pll: Pll,
    bemf_alpha: f32,
    bemf_beta: f32,
    bemf_magnitude: f32,
    theta: f32,
    omega: f32,
    update_count: u32,
    initialized: bool,
}

impl BemfPllObserver {
    /// Create an observer; [`init`](Self::init) must run before updates.
    pub fn new(config: BemfPllConfig) -> Self {
        let pll = Pll::new(config.pll.clone());
        Self {
            config,
            pll,
            bemf_alpha: 0.0,
            bemf_beta: 0.0,
            bemf_magnitude: 0.0,
            theta: 0.0,
            omega: 0.0,
            update_count: 0,
            initialized: false,
        }
    }

    /// Reset all estimation state and arm the observer.
    pub fn init(&mut self) {
        self.reset();
        self.initialized = true;
    }

    /// Clear the estimation state, keeping the configuration.
    pub fn reset(&mut self) {
        self.pll.reset();
        self.bemf_alpha = 0.0;
        self.bemf_beta = 0.0;
        self.bemf_magnitude = 0.0;
        self.theta = 0.0;
        self.omega = 0.0;
        self.update_count = 0;
    }

    /// Ingest one sample of stationary-frame voltages and currents and return
    /// the updated `(theta, omega)` estimate.
    ///
    /// Below [`MIN_BEMF_MAGNITUDE`] the signal carries no usable direction and
    /// the previous estimate is returned unchanged.
    pub fn update(
        &mut self,
        v_alpha: f32,
        v_beta: f32,
        i_alpha: f32,
        i_beta: f32,
        dt: f32,
    ) -> Result<(f32, f32), UtilsError> {
        if dt <= 0.0 {
            return Err(UtilsError::InvalidArgs);
        }
        if !self.initialized {
            return Err(UtilsError::Uninitialized);
        }

        // e = v - Rs*i, the di/dt term is omitted at this model level
        self.bemf_alpha = v_alpha - self.config.stator_resistance * i_alpha;
        self.bemf_beta = v_beta - self.config.stator_resistance * i_beta;
        self.bemf_magnitude = sqrt_nr(
            self.bemf_alpha * self.bemf_alpha + self.bemf_beta * self.bemf_beta,
        );

        self.update_count = self.update_count.wrapping_add(1);

        if self.bemf_magnitude < MIN_BEMF_MAGNITUDE {
            return Ok((self.theta, self.omega));
        }

        // Expected back-EMF direction for the current angle estimate
        let (sin_theta, cos_theta) = fast_sin_cos(self.pll.theta());
        let expected_alpha = -self.bemf_magnitude * sin_theta;
        let expected_beta = self.bemf_magnitude * cos_theta;

        // Normalized cross product of measured and expected directions
        let phase_error = (self.bemf_alpha * expected_beta - self.bemf_beta * expected_alpha)
            / (self.bemf_magnitude * self.bemf_magnitude + 1e-6);

        let (theta, omega) = self.pll.update(phase_error, dt);
        self.theta = theta;
        self.omega = omega;

        Ok((theta, omega))
    }

    /// Estimated back-EMF `(alpha, beta, magnitude)`
    pub fn bemf(&self) -> (f32, f32, f32) {
        (self.bemf_alpha, self.bemf_beta, self.bemf_magnitude)
    }

    /// True while the inner PLL phase error is below its lock threshold
    pub fn is_converged(&self) -> bool {
        self.pll.is_converged()
    }

    /// Largest phase error the inner PLL has seen since the last reset
    pub fn peak_error(&self) -> f32 {
        self.pll.peak_error()
    }

    /// Number of samples ingested since the last reset
    pub fn update_count(&self) -> u32 {
        self.update_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BemfPllConfig {
        BemfPllConfig::new(PllConfig::new(100.0, 5_000.0, 10_000.0), 0.1)
    }

    #[test]
    fn test_update_before_init_fails() {
        let mut observer = BemfPllObserver::new(test_config());
        assert_eq!(
            observer.update(1.0, 0.0, 0.0, 0.0, 0.001),
            Err(UtilsError::Uninitialized)
        );
    }

    #[test]
    fn test_non_positive_dt_rejected() {
        let mut observer = BemfPllObserver::new(test_config());
        observer.init();
        assert_eq!(
            observer.update(1.0, 0.0, 0.0, 0.0, 0.0),
            Err(UtilsError::InvalidArgs)
        );
        assert_eq!(
            observer.update(1.0, 0.0, 0.0, 0.0, -0.1),
            Err(UtilsError::InvalidArgs)
        );
    }

    #[test]
    fn test_weak_bemf_freezes_estimate() {
        let mut observer = BemfPllObserver::new(test_config());
        observer.init();

        let (theta, omega) = observer.update(0.001, 0.001, 0.0, 0.0, 0.001).unwrap();
        assert_eq!(theta, 0.0);
        assert_eq!(omega, 0.0);
        assert_eq!(observer.update_count(), 1);
    }

    #[test]
    fn test_bemf_computed_from_voltage_equation() {
        let mut observer = BemfPllObserver::new(test_config());
        observer.init();

        // e = v - Rs*i with Rs = 0.1
        observer.update(2.0, -1.0, 5.0, 5.0, 0.001).unwrap();
        let (alpha, beta, magnitude) = observer.bemf();
        assert!((alpha - 1.5).abs() < 1e-5);
        assert!((beta + 1.5).abs() < 1e-5);
        let expected = (1.5f32 * 1.5 + 1.5 * 1.5).sqrt();
        assert!((magnitude - expected).abs() < 1e-4);
    }

    #[test]
    fn test_aligned_bemf_keeps_estimate_converged() {
        let mut observer = BemfPllObserver::new(test_config());
        observer.init();

        // A back-EMF exactly along the expected direction for theta = 0
        // produces zero phase error: e = |e| * (-sin 0, cos 0) = (0, |e|)
        let (theta, _) = observer.update(0.0, 2.0, 0.0, 0.0, 0.001).unwrap();
        assert!(theta.abs() < 1e-6);
        assert!(observer.is_converged());
    }

    #[test]
    fn test_phase_error_drives_pll() {
        let mut observer = BemfPllObserver::new(test_config());
        observer.init();

        // Back-EMF orthogonal to the expected direction: maximal error,
        // the PLL must move the estimate
        let (theta, omega) = observer.update(2.0, 0.0, 0.0, 0.0, 0.001).unwrap();
        assert!(theta != 0.0);
        assert!(omega != 0.0);
        assert!(observer.peak_error() > 0.5);
    }

    #[test]
    fn test_reset_clears_state_keeps_arming() {
        let mut observer = BemfPllObserver::new(test_config());
        observer.init();
        observer.update(2.0, 0.0, 0.0, 0.0, 0.001).unwrap();
        assert!(observer.update_count() > 0);

        observer.reset();
        assert_eq!(observer.update_count(), 0);
        let (alpha, beta, magnitude) = observer.bemf();
        assert_eq!((alpha, beta, magnitude), (0.0, 0.0, 0.0));
        // Still armed after a reset
        assert!(observer.update(0.0, 2.0, 0.0, 0.0, 0.001).is_ok());
    }
}
