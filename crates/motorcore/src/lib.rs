//! Shared core of the three-phase motor controller
//!
//! This crate holds everything the control drivers have in common: the error
//! and mode taxonomy, the motor configuration and sampled state, the hardware
//! abstraction contract, and the motor façade that sequences one control tick
//! (`update_state` → `commutate` → `update_pwm`) over the active driver.

pub mod config;
pub mod error;
pub mod hal;
pub mod motor;
pub mod state;
pub mod types;

pub use config::MotorConfig;
pub use error::MotorError;
pub use hal::{AdcConfig, Hal, Phase, PwmConfig, NUM_PHASES};
pub use motor::{ControlLoops, Motor, MotorContext, MotorDriver};
pub use state::{MotorState, Setpoints};
pub use types::{ControlMethod, ControlMode, Direction, MotorMode, MotorType, ZeroCrossing};
