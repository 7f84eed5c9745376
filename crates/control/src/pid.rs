//! PID regulator
//!
//! A discrete PI(D) regulator with a trapezoidal integral, an EMA-filtered
//! derivative and back-calculated integral anti-windup.

use serde::{Deserialize, Serialize};

/// Configuration for a PID regulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidConfig {
    /// Proportional gain
    pub kp: f32,
    /// Integral gain
    pub ki: f32,
    /// Derivative gain
    pub kd: f32,
    /// Minimum output value
    pub output_min: f32,
    /// Maximum output value
    pub output_max: f32,
    /// EMA coefficient for the derivative low-pass filter (1.0 disables it)
    pub derivative_ema_alpha: f32,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            output_min: f32::NEG_INFINITY,
            output_max: f32::INFINITY,
            derivative_ema_alpha: 1.0,
        }
    }
}

impl PidConfig {
    /// Create a P-only regulator
    pub fn p(kp: f32) -> Self {
        Self { kp, ..Default::default() }
    }

    /// Create a PI regulator
    pub fn pi(kp: f32, ki: f32) -> Self {
        Self { kp, ki, ..Default::default() }
    }

    /// Create a PID regulator
    pub fn pid(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd, ..Default::default() }
    }

    /// Set output saturation limits
    pub fn with_limits(mut self, min: f32, max: f32) -> Self {
        self.output_min = min;
        self.output_max = max;
        self
    }

    /// Set the derivative EMA filter coefficient
    pub fn with_derivative_filter(mut self, alpha: f32) -> Self {
        self.derivative_ema_alpha = alpha;
        self
    }
}

/// PID regulator with state
#[derive(Debug, Clone)]
pub struct PidController {
    config: PidConfig,
    integral: f32,
    prev_error: f32,
    prev_derivative: f32,
}

impl PidController {
    /// Create a new regulator from a configuration
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            integral: 0.0,
            prev_error: 0.0,
            prev_derivative: 0.0,
        }
    }

    /// Clear the integral and derivative history
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.prev_derivative = 0.0;
    }

    /// Advance the regulator by one sample and return the control output.
    ///
    /// The integral uses the trapezoidal rule; the derivative is only formed
    /// when `dt > 0` and a previous error exists, and is low-pass filtered
    /// with the configured EMA coefficient. When the output saturates, the
    /// integral is back-calculated so it cannot wind up.
    pub fn update(&mut self, setpoint: f32, measurement: f32, dt: f32) -> f32 {
        let error = setpoint - measurement;

        self.integral += 0.5 * dt * (error + self.prev_error);

        let mut derivative = 0.0;
        if dt > 0.0 && self.prev_error != 0.0 {
            derivative = (error - self.prev_error) / dt;
            derivative = self.config.derivative_ema_alpha * derivative
                + (1.0 - self.config.derivative_ema_alpha) * self.prev_derivative;
            self.prev_derivative = derivative;
        }
        self.prev_error = error;

        let mut output = self.config.kp * error
            + self.config.ki * self.integral
            + self.config.kd * derivative;

        if output > self.config.output_max {
            if self.config.ki != 0.0 {
                self.integral -= (output - self.config.output_max) / self.config.ki;
            }
            output = self.config.output_max;
        } else if output < self.config.output_min {
            if self.config.ki != 0.0 {
                self.integral += (self.config.output_min - output) / self.config.ki;
            }
            output = self.config.output_min;
        }

        output
    }

    /// Current integral accumulator value
    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &PidConfig {
        &self.config
    }
}
