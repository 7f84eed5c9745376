//! Hall-sensored six-step commutation.
//!
//! Rotor position comes from the three Hall sensors, read as the packed code
//! `HallA << 2 | HallB << 1 | HallC`. Each of the six legal codes maps to one
//! commutation step; `0b000` and `0b111` are electrically impossible and
//! latch a fault. Speed is estimated from the time between Hall edges.

use log::{debug, info, warn};

use control::math;
use motorcore::{
    ControlMode, Direction, Hal, MotorContext, MotorDriver, MotorError, MotorMode, Phase,
};

use super::{
    apply_step, commutation_speed_rpm, conducting_current, release_all_phases, COMMUTATION_TABLE,
    DEFAULT_ALIGNMENT_TIME_MS, DEFAULT_STARTUP_DUTY, NUM_STEPS,
};

/// Translate a Hall code into a commutation step, or `None` for the two
/// illegal codes. Reverse rotation shifts the forward table by one step.
pub fn hall_to_step(hall_state: u8, direction: Direction) -> Option<u8> {
    let forward = match hall_state {
        0b011 => 0,
        0b001 => 1,
        0b101 => 2,
        0b100 => 3,
        0b110 => 4,
        0b010 => 5,
        _ => return None,
    };
    match direction {
        Direction::Forward => Some(forward),
        Direction::Reverse => Some((forward + NUM_STEPS - 1) % NUM_STEPS),
    }
}

/// Hall-commutated driver for BLDC motors.
pub struct SixStepSensored {
    step: u8,
    direction: Direction,
    pwm_duty: f32,
    last_hall_state: u8,
    last_commutation_time: u32,
    commutation_period: u32,
    estimated_speed: f32,
    mode: MotorMode,
}

impl Default for SixStepSensored {
    fn default() -> Self {
        Self::new()
    }
}

impl SixStepSensored {
    pub fn new() -> Self {
        Self {
            step: 0,
            direction: Direction::Forward,
            pwm_duty: 0.0,
            last_hall_state: 0,
            last_commutation_time: 0,
            commutation_period: 0,
            estimated_speed: 0.0,
            mode: MotorMode::Idle,
        }
    }

    /// Set the commanded rotation direction
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Current commutation step (0-5)
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Current operational mode
    pub fn mode(&self) -> MotorMode {
        self.mode
    }

    /// Current PWM duty cycle command in `[0, 1]`
    pub fn pwm_duty(&self) -> f32 {
        self.pwm_duty
    }

    /// Estimated speed from Hall edge timing (RPM)
    pub fn estimated_speed(&self) -> f32 {
        self.estimated_speed
    }

    /// Hold the rotor against step 0, then latch the step the Hall sensors
    /// report.
    fn startup_sequence<H: Hal>(
        &mut self,
        ctx: &mut MotorContext,
        hal: &mut H,
    ) -> Result<(), MotorError> {
        let resolution = ctx.config.pwm.resolution;

        self.mode = MotorMode::Aligning;
        self.step = 0;
        self.pwm_duty = DEFAULT_STARTUP_DUTY;
        apply_step(hal, &COMMUTATION_TABLE[0], self.pwm_duty, resolution);
        hal.delay_ms(DEFAULT_ALIGNMENT_TIME_MS);

        let hall_state = hal.hall_state();
        let Some(step) = hall_to_step(hall_state, self.direction) else {
            warn!("six-step sensored: illegal initial hall code {hall_state:#05b}");
            self.mode = MotorMode::Error;
            release_all_phases(hal);
            return Err(MotorError::Init);
        };

        self.step = step;
        apply_step(
            hal,
            &COMMUTATION_TABLE[self.step as usize],
            self.pwm_duty,
            resolution,
        );
        self.last_commutation_time = hal.micros();
        self.last_hall_state = hall_state;

        self.mode = MotorMode::Running;
        info!("six-step sensored: running from hall step {step}");
        Ok(())
    }
}

impl<H: Hal> MotorDriver<H> for SixStepSensored {
    fn init(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        self.step = 0;
        self.pwm_duty = 0.0;
        self.last_hall_state = 0;
        self.last_commutation_time = 0;
        self.commutation_period = 0;
        self.estimated_speed = 0.0;
        self.mode = MotorMode::Idle;

        ctx.loops = motorcore::ControlLoops::from_config(&ctx.config);

        if !hal.pwm_init(&ctx.config.pwm)
            || !hal.adc_init(&ctx.config.adc)
            || !hal.gpio_init()
            || !hal.hall_init()
        {
            return Err(MotorError::Init);
        }

        self.startup_sequence(ctx, hal)?;

        ctx.state.is_initialized = true;
        Ok(())
    }

    fn deinit(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        release_all_phases(hal);
        ctx.state.is_initialized = false;
        self.pwm_duty = 0.0;
        self.mode = MotorMode::Stopped;
        Ok(())
    }

    fn update_state(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        if self.mode == MotorMode::Stopped || self.mode == MotorMode::Error {
            self.pwm_duty = 0.0;
            release_all_phases(hal);
            return Ok(());
        }

        hal.adc_start_conversion();
        ctx.state.phase_voltages = hal.adc_phase_voltages();
        ctx.state.phase_currents = hal.adc_phase_currents();
        ctx.state.temperature = hal.adc_temperature();
        ctx.state.dc_voltage = hal.adc_dc_voltage();

        let now = hal.micros();
        let dt = ctx.elapsed_secs(now);
        ctx.state.last_update_time = now;

        for phase in Phase::ALL {
            let i = phase.index();
            if ctx.state.phase_voltages[i].abs() > ctx.config.max_voltage {
                warn!(
                    "six-step sensored: overvoltage on phase {:?} ({:.2} V)",
                    phase, ctx.state.phase_voltages[i]
                );
                self.mode = MotorMode::Error;
                return Err(MotorError::Overvoltage);
            } else if ctx.state.phase_currents[i].abs() > ctx.config.max_current {
                warn!(
                    "six-step sensored: overcurrent on phase {:?} ({:.2} A)",
                    phase, ctx.state.phase_currents[i]
                );
                self.mode = MotorMode::Error;
                return Err(MotorError::Overcurrent);
            }
        }

        // Estimate speed whenever the hall state moved since the last sample
        let hall_state = hal.hall_state();
        if hall_state != self.last_hall_state {
            if self.last_commutation_time != 0 {
                let edge_interval = now.wrapping_sub(self.last_commutation_time);
                if edge_interval > 0 {
                    self.commutation_period = edge_interval;
                    self.estimated_speed = commutation_speed_rpm(self.commutation_period);
                }
            }
            self.last_commutation_time = now;
            self.last_hall_state = hall_state;
        }
        ctx.state.velocity = self.estimated_speed;

        match ctx.config.control_mode {
            ControlMode::Current | ControlMode::Torque => {
                let measured = conducting_current(&ctx.state, self.step);
                self.pwm_duty = ctx.loops.current.update(ctx.setpoint.current, measured, dt);
            }
            ControlMode::Velocity => {
                self.pwm_duty =
                    ctx.loops
                        .velocity
                        .update(ctx.setpoint.velocity, self.estimated_speed, dt);
            }
            ControlMode::Voltage => {
                self.pwm_duty = ctx.setpoint.voltage / ctx.config.max_voltage;
            }
            // No outer position loop is defined for trapezoidal drive
            ControlMode::Position => {}
        }

        self.pwm_duty = math::clamp(self.pwm_duty, 0.0, 1.0);
        Ok(())
    }

    fn commutate(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        if self.mode != MotorMode::Running {
            release_all_phases(hal);
            return Ok(());
        }

        let hall_state = hal.hall_state();
        if hall_state != self.last_hall_state {
            let Some(next_step) = hall_to_step(hall_state, self.direction) else {
                warn!("six-step sensored: illegal hall code {hall_state:#05b}");
                self.mode = MotorMode::Error;
                return Err(MotorError::Hall);
            };

            self.step = next_step;
            apply_step(
                hal,
                &COMMUTATION_TABLE[self.step as usize],
                self.pwm_duty,
                ctx.config.pwm.resolution,
            );

            self.last_hall_state = hall_state;
            self.last_commutation_time = hal.micros();
            debug!("six-step sensored: hall {hall_state:#05b} -> step {next_step}");
        }

        Ok(())
    }

    fn update_pwm(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        if self.mode != MotorMode::Running {
            release_all_phases(hal);
            return Ok(());
        }

        apply_step(
            hal,
            &COMMUTATION_TABLE[self.step as usize],
            self.pwm_duty,
            ctx.config.pwm.resolution,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testhal::{MockHal, PinState};
    use motorcore::MotorConfig;

    fn init_running(initial_hall: u8) -> (SixStepSensored, MotorContext, MockHal) {
        let mut driver = SixStepSensored::new();
        let mut ctx = MotorContext::new(MotorConfig::default());
        let mut hal = MockHal::new();
        hal.hall = initial_hall;
        driver.init(&mut ctx, &mut hal).unwrap();
        (driver, ctx, hal)
    }

    fn feed_nominal_samples(hal: &mut MockHal) {
        for phase in Phase::ALL {
            hal.set_phase_voltage(phase, 12.0);
            hal.set_phase_current(phase, 5.0);
        }
    }

    #[test]
    fn test_hall_forward_mapping() {
        assert_eq!(hall_to_step(0b011, Direction::Forward), Some(0));
        assert_eq!(hall_to_step(0b001, Direction::Forward), Some(1));
        assert_eq!(hall_to_step(0b101, Direction::Forward), Some(2));
        assert_eq!(hall_to_step(0b100, Direction::Forward), Some(3));
        assert_eq!(hall_to_step(0b110, Direction::Forward), Some(4));
        assert_eq!(hall_to_step(0b010, Direction::Forward), Some(5));
    }

    #[test]
    fn test_hall_reverse_mapping_is_shifted() {
        assert_eq!(hall_to_step(0b011, Direction::Reverse), Some(5));
        assert_eq!(hall_to_step(0b001, Direction::Reverse), Some(0));
        assert_eq!(hall_to_step(0b101, Direction::Reverse), Some(1));
        assert_eq!(hall_to_step(0b100, Direction::Reverse), Some(2));
        assert_eq!(hall_to_step(0b110, Direction::Reverse), Some(3));
        assert_eq!(hall_to_step(0b010, Direction::Reverse), Some(4));
    }

    #[test]
    fn test_hall_illegal_codes_rejected() {
        for direction in [Direction::Forward, Direction::Reverse] {
            assert_eq!(hall_to_step(0b000, direction), None);
            assert_eq!(hall_to_step(0b111, direction), None);
        }
    }

    #[test]
    fn test_init_latches_initial_hall_step() {
        let (driver, ctx, _hal) = init_running(0b100);
        assert_eq!(driver.step(), 3);
        assert_eq!(driver.mode(), MotorMode::Running);
        assert!(ctx.state.is_initialized);
    }

    #[test]
    fn test_init_with_illegal_hall_fails() {
        let mut driver = SixStepSensored::new();
        let mut ctx = MotorContext::new(MotorConfig::default());
        let mut hal = MockHal::new();
        hal.hall = 0b111;
        assert_eq!(driver.init(&mut ctx, &mut hal), Err(MotorError::Init));
        assert_eq!(driver.mode(), MotorMode::Error);
    }

    #[test]
    fn test_commutate_follows_hall_edges() {
        let (mut driver, mut ctx, mut hal) = init_running(0b011);
        assert_eq!(driver.step(), 0);

        hal.hall = 0b001;
        hal.advance_micros(2_000);
        driver.commutate(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.step(), 1);

        hal.hall = 0b101;
        hal.advance_micros(2_000);
        driver.commutate(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.step(), 2);
    }

    #[test]
    fn test_commutate_ignores_unchanged_hall() {
        let (mut driver, mut ctx, mut hal) = init_running(0b011);
        driver.commutate(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.step(), 0);
    }

    #[test]
    fn test_illegal_hall_at_runtime_latches_error() {
        let (mut driver, mut ctx, mut hal) = init_running(0b011);
        hal.hall = 0b111;
        assert_eq!(
            driver.commutate(&mut ctx, &mut hal),
            Err(MotorError::Hall)
        );
        assert_eq!(driver.mode(), MotorMode::Error);

        // Actuation is suppressed from here on
        driver.update_pwm(&mut ctx, &mut hal).unwrap();
        for state in hal.pin_state {
            assert_eq!(state, PinState::Float);
        }
    }

    #[test]
    fn test_speed_estimated_from_hall_interval() {
        let (mut driver, mut ctx, mut hal) = init_running(0b011);
        feed_nominal_samples(&mut hal);

        // One hall edge 10 ms after the startup latch
        hal.hall = 0b001;
        hal.advance_micros(10_000);
        driver.update_state(&mut ctx, &mut hal).unwrap();

        assert!((driver.estimated_speed() - 1000.0).abs() < 1.0);
        assert_eq!(ctx.state.velocity, driver.estimated_speed());
    }

    #[test]
    fn test_overvoltage_latches_error() {
        let (mut driver, mut ctx, mut hal) = init_running(0b011);
        feed_nominal_samples(&mut hal);
        hal.set_phase_voltage(Phase::B, -30.0);
        hal.advance_micros(1_000);

        assert_eq!(
            driver.update_state(&mut ctx, &mut hal),
            Err(MotorError::Overvoltage)
        );
        assert_eq!(driver.mode(), MotorMode::Error);
    }

    #[test]
    fn test_voltage_mode_duty() {
        let (mut driver, mut ctx, mut hal) = init_running(0b011);
        feed_nominal_samples(&mut hal);
        hal.advance_micros(1_000);

        ctx.config.control_mode = ControlMode::Voltage;
        ctx.setpoint.voltage = 6.0;
        driver.update_state(&mut ctx, &mut hal).unwrap();
        assert!((driver.pwm_duty() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_deinit_releases_and_is_idempotent() {
        let (mut driver, mut ctx, mut hal) = init_running(0b011);
        driver.deinit(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.mode(), MotorMode::Stopped);
        for state in hal.pin_state {
            assert_eq!(state, PinState::Float);
        }
        driver.deinit(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.mode(), MotorMode::Stopped);
    }
}
