//! Motor façade and driver capability contract.
//!
//! A driver is a strategy object implementing [`MotorDriver`]; the façade
//! [`Motor`] owns the shared context (configuration, sampled state, setpoints
//! and the shared regulators), borrows the HAL for the lifetime of the outer
//! control loop, and sequences the three per-tick operations.

use control::PidController;

use crate::config::MotorConfig;
use crate::error::MotorError;
use crate::hal::Hal;
use crate::state::{MotorState, Setpoints};
use crate::types::ControlMode;

/// Shared closed-loop regulators, rebuilt from the configuration at init.
#[derive(Debug, Clone)]
pub struct ControlLoops {
    /// Current regulator (duty output for six-step)
    pub current: PidController,
    /// Velocity regulator
    pub velocity: PidController,
}

impl ControlLoops {
    /// Build the loops from a motor configuration
    pub fn from_config(config: &MotorConfig) -> Self {
        Self {
            current: PidController::new(config.current_pid.clone()),
            velocity: PidController::new(config.velocity_pid.clone()),
        }
    }
}

/// Everything a driver shares with the façade: configuration, sampled state,
/// setpoints and the shared regulators. Driver-private state stays inside the
/// driver value.
#[derive(Debug, Clone)]
pub struct MotorContext {
    pub config: MotorConfig,
    pub state: MotorState,
    pub setpoint: Setpoints,
    pub loops: ControlLoops,
}

impl MotorContext {
    /// Create a fresh context for a configuration
    pub fn new(config: MotorConfig) -> Self {
        let loops = ControlLoops::from_config(&config);
        Self {
            config,
            state: MotorState::default(),
            setpoint: Setpoints::default(),
            loops,
        }
    }

    /// Microseconds elapsed since the last state update, as seconds.
    /// Wrap-around safe.
    pub fn elapsed_secs(&self, now: u32) -> f32 {
        now.wrapping_sub(self.state.last_update_time) as f32 / 1_000_000.0
    }
}

/// Capability set every motor driver provides.
///
/// The three tick operations are invoked in order by [`Motor::run`]; the
/// first non-`Ok` result aborts the tick. The setpoint setters share uniform
/// provided implementations: voltage, current and velocity clamp to the
/// configured maxima, position and torque pass through, and every setter
/// switches the control mode.
pub trait MotorDriver<H: Hal> {
    /// Bring up the hardware and run the startup sequence.
    fn init(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError>;

    /// Release all phases and stop. Idempotent.
    fn deinit(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError>;

    /// Sample and validate electrical state, update the duty command.
    fn update_state(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError>;

    /// Decide whether to advance the commutation step.
    fn commutate(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError>;

    /// Emit the drive pattern for the current step.
    fn update_pwm(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError>;

    fn set_voltage(&mut self, ctx: &mut MotorContext, voltage: f32) -> Result<(), MotorError> {
        ctx.setpoint.voltage = voltage.min(ctx.config.max_voltage);
        ctx.config.control_mode = ControlMode::Voltage;
        Ok(())
    }

    fn set_current(&mut self, ctx: &mut MotorContext, current: f32) -> Result<(), MotorError> {
        ctx.setpoint.current = current.min(ctx.config.max_current);
        ctx.config.control_mode = ControlMode::Current;
        Ok(())
    }

    fn set_velocity(&mut self, ctx: &mut MotorContext, velocity: f32) -> Result<(), MotorError> {
        ctx.setpoint.velocity = velocity.min(ctx.config.max_velocity);
        ctx.config.control_mode = ControlMode::Velocity;
        Ok(())
    }

    fn set_position(&mut self, ctx: &mut MotorContext, position: f32) -> Result<(), MotorError> {
        ctx.setpoint.position = position;
        ctx.config.control_mode = ControlMode::Position;
        Ok(())
    }

    fn set_torque(&mut self, ctx: &mut MotorContext, torque: f32) -> Result<(), MotorError> {
        ctx.setpoint.torque = torque;
        ctx.setpoint.current = torque / ctx.config.torque_constant;
        ctx.config.control_mode = ControlMode::Torque;
        Ok(())
    }
}

/// Motor façade: one configured motor with its active driver.
pub struct Motor<'h, H: Hal> {
    ctx: MotorContext,
    driver: Box<dyn MotorDriver<H> + 'h>,
    hal: &'h mut H,
}

impl<'h, H: Hal> Motor<'h, H> {
    /// Bind a driver and configuration to the HAL. Exactly one motor may hold
    /// the HAL borrow at a time.
    pub fn new(hal: &'h mut H, config: MotorConfig, driver: Box<dyn MotorDriver<H> + 'h>) -> Self {
        Self {
            ctx: MotorContext::new(config),
            driver,
            hal,
        }
    }

    /// Initialize the driver; may block for the startup sequence.
    pub fn init(&mut self) -> Result<(), MotorError> {
        self.driver.init(&mut self.ctx, self.hal)
    }

    /// Release all phases and stop the driver.
    pub fn deinit(&mut self) -> Result<(), MotorError> {
        self.driver.deinit(&mut self.ctx, self.hal)
    }

    /// Run one control tick: `update_state` → `commutate` → `update_pwm`.
    /// The first failing stage aborts the tick and its error is returned.
    pub fn run(&mut self) -> Result<(), MotorError> {
        self.driver.update_state(&mut self.ctx, self.hal)?;
        self.driver.commutate(&mut self.ctx, self.hal)?;
        self.driver.update_pwm(&mut self.ctx, self.hal)
    }

    pub fn set_voltage(&mut self, voltage: f32) -> Result<(), MotorError> {
        self.driver.set_voltage(&mut self.ctx, voltage)
    }

    pub fn set_current(&mut self, current: f32) -> Result<(), MotorError> {
        self.driver.set_current(&mut self.ctx, current)
    }

    pub fn set_velocity(&mut self, velocity: f32) -> Result<(), MotorError> {
        self.driver.set_velocity(&mut self.ctx, velocity)
    }

    pub fn set_position(&mut self, position: f32) -> Result<(), MotorError> {
        self.driver.set_position(&mut self.ctx, position)
    }

    pub fn set_torque(&mut self, torque: f32) -> Result<(), MotorError> {
        self.driver.set_torque(&mut self.ctx, torque)
    }

    /// Latest sampled state
    pub fn state(&self) -> &MotorState {
        &self.ctx.state
    }

    /// The full shared context
    pub fn context(&self) -> &MotorContext {
        &self.ctx
    }
}
