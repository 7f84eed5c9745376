//! Phase-locked loop
//!
//! A discrete PI loop that locks a rotating phasor onto a phase-error signal,
//! producing angle and angular-velocity estimates.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::math;

/// Phase error magnitude below which the loop is considered locked
const CONVERGENCE_THRESHOLD: f32 = 0.05;
/// Largest phase error the loop will act on
const MAX_PHASE_ERROR: f32 = TAU;
/// Integrator saturation bound
const MAX_INTEGRATOR: f32 = 50.0;

/// Configuration for a [`Pll`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PllConfig {
    /// Proportional gain
    pub kp: f32,
    /// Integral gain
    pub ki: f32,
    /// Angular velocity saturation (rad/s)
    pub max_omega: f32,
    /// EMA coefficient applied to theta and omega when filtering is enabled
    pub filter_alpha: f32,
    /// Enable the output EMA filter
    pub enable_filtering: bool,
}

impl PllConfig {
    /// Create an unfiltered PLL configuration
    pub fn new(kp: f32, ki: f32, max_omega: f32) -> Self {
        Self {
            kp,
            ki,
            max_omega,
            filter_alpha: 1.0,
            enable_filtering: false,
        }
    }

    /// Enable single-pole EMA filtering of the outputs
    pub fn with_filter(mut self, alpha: f32) -> Self {
        self.filter_alpha = alpha;
        self.enable_filtering = true;
        self
    }
}

/// Phase-locked loop with state
#[derive(Debug, Clone)]
pub struct Pll {
    config: PllConfig,
    integrator: f32,
    prev_error: f32,
    theta: f32,
    omega: f32,
    peak_error: f32,
    converged: bool,
}

impl Pll {
    /// Create a new loop from a configuration
    pub fn new(config: PllConfig) -> Self {
        Self {
            config,
            integrator: 0.0,
            prev_error: 0.0,
            theta: 0.0,
            omega: 0.0,
            peak_error: 0.0,
            converged: false,
        }
    }

    /// Clear the loop state, keeping the configuration
    pub fn reset(&mut self) {
        self.integrator = 0.0;
        self.prev_error = 0.0;
        self.theta = 0.0;
        self.omega = 0.0;
        self.peak_error = 0.0;
        self.converged = false;
    }

    /// Advance the loop by one sample and return `(theta, omega)`.
    pub fn update(&mut self, phase_error: f32, dt: f32) -> (f32, f32) {
        let error = math::clamp(phase_error, -MAX_PHASE_ERROR, MAX_PHASE_ERROR);

        let abs_error = error.abs();
        if abs_error > self.peak_error {
            self.peak_error = abs_error;
        }
        self.converged = abs_error < CONVERGENCE_THRESHOLD;

        self.integrator = math::clamp(
            self.integrator + self.config.ki * error * dt,
            -MAX_INTEGRATOR,
            MAX_INTEGRATOR,
        );

        let omega = math::clamp(
            self.config.kp * error + self.integrator,
            -self.config.max_omega,
            self.config.max_omega,
        );
        let theta = self.theta + omega * dt;

        if self.config.enable_filtering {
            self.theta =
                self.config.filter_alpha * self.theta + (1.0 - self.config.filter_alpha) * theta;
            self.omega =
                self.config.filter_alpha * self.omega + (1.0 - self.config.filter_alpha) * omega;
        } else {
            self.theta = theta;
            self.omega = omega;
        }

        self.prev_error = error;
        (self.theta, self.omega)
    }

    /// Current angle estimate (rad)
    pub fn theta(&self) -> f32 {
        self.theta
    }

    /// Current angular velocity estimate (rad/s)
    pub fn omega(&self) -> f32 {
        self.omega
    }

    /// True while the phase error magnitude is below the lock threshold
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Largest phase error magnitude observed since the last reset
    pub fn peak_error(&self) -> f32 {
        self.peak_error
    }

    /// The clamped phase error from the previous update
    pub fn last_error(&self) -> f32 {
        self.prev_error
    }
}
