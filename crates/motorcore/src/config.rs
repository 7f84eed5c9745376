//! Motor configuration.

use serde::{Deserialize, Serialize};

use control::PidConfig;

use crate::hal::{AdcConfig, PwmConfig};
use crate::types::{ControlMethod, ControlMode, MotorType};

/// Per-motor configuration, immutable after init except for `control_mode`,
/// which the setpoint setters may switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Motor construction type
    pub motor_type: MotorType,
    /// Commutation / regulation strategy
    pub control_method: ControlMethod,
    /// Which setpoint the control loops track
    pub control_mode: ControlMode,

    /// Number of rotor pole pairs
    pub pole_pairs: u8,
    /// Phase resistance (Ω)
    pub phase_resistance: f32,
    /// Phase inductance (H)
    pub phase_inductance: f32,
    /// Torque constant (N·m/A)
    pub torque_constant: f32,
    /// Permanent-magnet flux linkage (Wb)
    pub flux_linkage: f32,

    /// Maximum phase current magnitude (A)
    pub max_current: f32,
    /// Maximum phase voltage magnitude (V)
    pub max_voltage: f32,
    /// Maximum velocity (RPM)
    pub max_velocity: f32,
    /// Speed the rotor must reach during sensorless startup (RPM)
    pub min_startup_speed: f32,

    /// Current loop tuning (output is PWM duty)
    pub current_pid: PidConfig,
    /// Voltage loop tuning
    pub voltage_pid: PidConfig,
    /// Velocity loop tuning (output is PWM duty for six-step, q-axis current
    /// reference for FOC)
    pub velocity_pid: PidConfig,
    /// FOC d-axis current loop tuning (output in volts)
    pub current_d_pid: PidConfig,
    /// FOC q-axis current loop tuning (output in volts)
    pub current_q_pid: PidConfig,

    /// d-axis current reference applied when field weakening is commanded (A).
    /// Only the configured value is honored; there is no tuning strategy.
    pub field_weakening_ref: f32,

    /// PWM peripheral configuration
    pub pwm: PwmConfig,
    /// ADC peripheral configuration
    pub adc: AdcConfig,
}

/// FOC inner current-loop defaults (both axes): output saturation in volts,
/// heavily filtered derivative.
const FOC_AXIS_KP: f32 = 2.0;
const FOC_AXIS_KI: f32 = 500.0;
const FOC_AXIS_KD: f32 = 0.0;
const FOC_AXIS_OUTPUT_LIMIT_V: f32 = 24.0;
const FOC_AXIS_DERIV_EMA_ALPHA: f32 = 0.1;

impl Default for MotorConfig {
    fn default() -> Self {
        let foc_axis_pid = PidConfig::pid(FOC_AXIS_KP, FOC_AXIS_KI, FOC_AXIS_KD)
            .with_limits(-FOC_AXIS_OUTPUT_LIMIT_V, FOC_AXIS_OUTPUT_LIMIT_V)
            .with_derivative_filter(FOC_AXIS_DERIV_EMA_ALPHA);

        Self {
            motor_type: MotorType::Bldc,
            control_method: ControlMethod::Sensorless,
            control_mode: ControlMode::Voltage,
            pole_pairs: 7,
            phase_resistance: 0.1,
            phase_inductance: 0.0001,
            torque_constant: 0.01,
            flux_linkage: 0.01,
            max_current: 20.0,
            max_voltage: 24.0,
            max_velocity: 1000.0,
            min_startup_speed: 0.0,
            current_pid: PidConfig::pi(0.1, 1.0).with_limits(0.0, 1.0),
            voltage_pid: PidConfig::pi(0.1, 1.0).with_limits(0.0, 1.0),
            velocity_pid: PidConfig::pi(0.01, 0.1).with_limits(0.0, 1.0),
            current_d_pid: foc_axis_pid.clone(),
            current_q_pid: foc_axis_pid,
            field_weakening_ref: 0.0,
            pwm: PwmConfig::default(),
            adc: AdcConfig::default(),
        }
    }
}

impl MotorConfig {
    /// Set the motor type
    pub fn with_motor_type(mut self, motor_type: MotorType) -> Self {
        self.motor_type = motor_type;
        self
    }

    /// Set the control method
    pub fn with_control_method(mut self, method: ControlMethod) -> Self {
        self.control_method = method;
        self
    }

    /// Set the control mode
    pub fn with_control_mode(mut self, mode: ControlMode) -> Self {
        self.control_mode = mode;
        self
    }

    /// Set the electrical parameters
    pub fn with_electrical(
        mut self,
        pole_pairs: u8,
        resistance: f32,
        inductance: f32,
        torque_constant: f32,
    ) -> Self {
        self.pole_pairs = pole_pairs;
        self.phase_resistance = resistance;
        self.phase_inductance = inductance;
        self.torque_constant = torque_constant;
        self
    }

    /// Set the safety limits
    pub fn with_limits(mut self, max_current: f32, max_voltage: f32, max_velocity: f32) -> Self {
        self.max_current = max_current;
        self.max_voltage = max_voltage;
        self.max_velocity = max_velocity;
        self
    }

    /// Set the current loop tuning
    pub fn with_current_pid(mut self, config: PidConfig) -> Self {
        self.current_pid = config;
        self
    }

    /// Set the velocity loop tuning
    pub fn with_velocity_pid(mut self, config: PidConfig) -> Self {
        self.velocity_pid = config;
        self
    }

    /// Set both FOC axis current loops
    pub fn with_foc_axis_pids(mut self, d_axis: PidConfig, q_axis: PidConfig) -> Self {
        self.current_d_pid = d_axis;
        self.current_q_pid = q_axis;
        self
    }
}
