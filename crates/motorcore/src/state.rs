//! Sampled motor state and control setpoints.

use crate::hal::NUM_PHASES;

/// Electrical and mechanical state sampled each tick.
#[derive(Debug, Clone, Default)]
pub struct MotorState {
    /// Phase voltages (V)
    pub phase_voltages: [f32; NUM_PHASES],
    /// Phase currents (A)
    pub phase_currents: [f32; NUM_PHASES],
    /// DC bus voltage (V)
    pub dc_voltage: f32,
    /// Motor temperature (°C)
    pub temperature: f32,
    /// Mechanical position (rad)
    pub position: f32,
    /// Mechanical velocity; RPM for the six-step drivers, rad/s from encoders
    pub velocity: f32,
    /// Set once the driver's init has completed
    pub is_initialized: bool,
    /// Timestamp of the last state update (µs, wraps at `u32::MAX`)
    pub last_update_time: u32,
}

/// Control-loop setpoints. Only the field selected by the current control
/// mode is authoritative; the others are latent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Setpoints {
    /// Voltage setpoint (V)
    pub voltage: f32,
    /// Current setpoint (A)
    pub current: f32,
    /// Velocity setpoint
    pub velocity: f32,
    /// Position setpoint (rad)
    pub position: f32,
    /// Torque setpoint (N·m)
    pub torque: f32,
}
