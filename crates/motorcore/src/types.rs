//! Shared enums of the motor control core.

use serde::{Deserialize, Serialize};

/// Motor construction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorType {
    /// Brushless DC
    Bldc,
    /// Permanent-magnet synchronous
    Pmsm,
    /// Stepper
    Stepper,
}

/// Commutation / regulation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMethod {
    /// Six-step trapezoidal commutation
    SixStep,
    /// Field-oriented control
    Foc,
    /// Direct torque control
    Dtc,
    /// Back-EMF based sensorless commutation
    Sensorless,
    /// Volts-per-hertz control
    Vf,
}

/// Which setpoint the control loops track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    Voltage,
    Current,
    Velocity,
    Position,
    Torque,
}

/// Commanded rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// Operational mode of a commutation driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotorMode {
    /// Just constructed, not yet started
    #[default]
    Idle,
    /// Outputs released, motor at rest
    Stopped,
    /// Initial rotor alignment phase
    Aligning,
    /// Open-loop startup sequence
    OpenLoop,
    /// Hand-over from open to closed loop
    Transition,
    /// Normal closed-loop operation
    Running,
    /// Active braking
    Braking,
    /// Latched fault, actuation suppressed
    Error,
}

/// Expected polarity of the next back-EMF zero crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroCrossing {
    /// Rising edge expected
    Rising,
    /// Falling edge expected
    Falling,
    /// Reserved
    Invalid,
}

impl ZeroCrossing {
    /// The polarity expected after a detected crossing. Trapezoidal symmetry
    /// alternates rising and falling edges.
    pub fn opposite(self) -> Self {
        match self {
            ZeroCrossing::Rising => ZeroCrossing::Falling,
            ZeroCrossing::Falling => ZeroCrossing::Rising,
            ZeroCrossing::Invalid => ZeroCrossing::Invalid,
        }
    }
}
