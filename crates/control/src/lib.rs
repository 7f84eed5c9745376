//! Control-loop and signal-processing primitives for three-phase inverters
//!
//! This crate provides:
//! - Angle, clamping and square-root helpers shared by the control loops
//! - A PID regulator with anti-windup and a filtered derivative
//! - A phase-locked loop for angle/speed tracking
//! - Clarke/Park reference-frame transforms
//! - Space-vector PWM duty synthesis

pub mod error;
pub mod math;
pub mod pid;
pub mod pll;
pub mod svpwm;
pub mod transforms;

pub use error::UtilsError;
pub use pid::{PidConfig, PidController};
pub use pll::{Pll, PllConfig};
