//! Sensorless six-step commutation from back-EMF zero crossings.
//!
//! Startup is open loop: align the rotor against step 0, then step through an
//! accelerating commutation ramp until the back-EMF is strong enough for
//! closed-loop operation. In closed loop the floating phase of each step is
//! sampled, low-pass filtered, and a threshold-plus-hysteresis comparison in
//! the expected direction detects the zero crossing that schedules the next
//! step.

use log::{debug, info, warn};

use control::math;
use motorcore::{
    ControlMode, Direction, Hal, MotorContext, MotorDriver, MotorError, MotorMode, Phase,
    ZeroCrossing, NUM_PHASES,
};

use super::{
    advance_step, apply_step, commutation_speed_rpm, conducting_current, floating_phase,
    release_all_phases, startup_duty, startup_period_us, COMMUTATION_TABLE,
    DEFAULT_ALIGNMENT_TIME_MS, DEFAULT_STARTUP_DUTY, DEFAULT_STARTUP_STEPS, MAX_COMMUTATION_PERIOD_US,
    MAX_STALL_TIME_MS, MIN_COMMUTATION_PERIOD_US, ZERO_CROSSING_HYSTERESIS,
};

/// Default back-EMF zero-crossing threshold (V)
const DEFAULT_ZC_THRESHOLD: f32 = 0.1;
/// Default back-EMF low-pass EMA coefficient
const DEFAULT_BEMF_FILTER_ALPHA: f32 = 0.1;

/// Back-EMF commutation driver for BLDC motors without position sensors.
pub struct SixStepSensorless {
    step: u8,
    direction: Direction,
    pwm_duty: f32,
    zc_state: ZeroCrossing,
    zc_threshold: f32,
    bemf: [f32; NUM_PHASES],
    bemf_filtered: [f32; NUM_PHASES],
    bemf_filter_alpha: f32,
    last_zc_time: u32,
    commutation_period: u32,
    estimated_speed: f32,
    mode: MotorMode,
}

impl Default for SixStepSensorless {
    fn default() -> Self {
        Self::new()
    }
}

impl SixStepSensorless {
    pub fn new() -> Self {
        Self {
            step: 0,
            direction: Direction::Forward,
            pwm_duty: 0.0,
            zc_state: ZeroCrossing::Rising,
            zc_threshold: DEFAULT_ZC_THRESHOLD,
            bemf: [0.0; NUM_PHASES],
            bemf_filtered: [0.0; NUM_PHASES],
            bemf_filter_alpha: DEFAULT_BEMF_FILTER_ALPHA,
            last_zc_time: 0,
            commutation_period: MAX_COMMUTATION_PERIOD_US,
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

    /// Estimated speed from the commutation period (RPM)
    pub fn estimated_speed(&self) -> f32 {
        self.estimated_speed
    }

    /// Expected polarity of the next zero crossing
    pub fn expected_crossing(&self) -> ZeroCrossing {
        self.zc_state
    }

    fn has_zero_crossed(&self, bemf: f32) -> bool {
        match self.zc_state {
            ZeroCrossing::Rising => bemf > self.zc_threshold + ZERO_CROSSING_HYSTERESIS,
            ZeroCrossing::Falling => bemf < -(self.zc_threshold + ZERO_CROSSING_HYSTERESIS),
            ZeroCrossing::Invalid => false,
        }
    }

    /// Align the rotor, ramp through the open-loop steps, then hand over to
    /// closed loop. Blocks on the HAL delays.
    fn startup_sequence<H: Hal>(
        &mut self,
        ctx: &mut MotorContext,
        hal: &mut H,
    ) -> Result<(), MotorError> {
        let resolution = ctx.config.pwm.resolution;
        let start_time = hal.micros();

        self.mode = MotorMode::Aligning;
        self.step = 0;
        self.pwm_duty = DEFAULT_STARTUP_DUTY;
        apply_step(hal, &COMMUTATION_TABLE[0], self.pwm_duty, resolution);
        hal.delay_ms(DEFAULT_ALIGNMENT_TIME_MS);

        self.mode = MotorMode::OpenLoop;
        info!("six-step sensorless: open-loop startup ramp");
        for i in 0..DEFAULT_STARTUP_STEPS {
            let period = startup_period_us(i);
            self.pwm_duty = startup_duty(
                i,
                ctx.config.current_pid.output_min,
                ctx.config.current_pid.output_max,
            );

            self.step = advance_step(self.step, self.direction);
            apply_step(
                hal,
                &COMMUTATION_TABLE[self.step as usize],
                self.pwm_duty,
                resolution,
            );
            hal.delay_us(period);

            let elapsed = hal.micros().wrapping_sub(start_time);
            if elapsed > MAX_STALL_TIME_MS * 1_000
                && self.estimated_speed < ctx.config.min_startup_speed
            {
                warn!(
                    "six-step sensorless: stalled during startup ({:.1} RPM after {} us)",
                    self.estimated_speed, elapsed
                );
                self.mode = MotorMode::Error;
                release_all_phases(hal);
                return Err(MotorError::Init);
            }
        }

        self.mode = MotorMode::Transition;
        self.last_zc_time = hal.micros();
        self.commutation_period = startup_period_us(DEFAULT_STARTUP_STEPS - 1);
        self.bemf_filtered = [0.0; NUM_PHASES];

        self.mode = MotorMode::Running;
        info!("six-step sensorless: closed loop");
        Ok(())
    }
}

impl<H: Hal> MotorDriver<H> for SixStepSensorless {
    fn init(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        self.step = 0;
        self.pwm_duty = 0.0;
        self.zc_state = ZeroCrossing::Rising;
        self.zc_threshold = DEFAULT_ZC_THRESHOLD;
        self.bemf = [0.0; NUM_PHASES];
        self.bemf_filtered = [0.0; NUM_PHASES];
        self.bemf_filter_alpha = DEFAULT_BEMF_FILTER_ALPHA;
        self.estimated_speed = 0.0;
        self.commutation_period = MAX_COMMUTATION_PERIOD_US;
        self.mode = MotorMode::Idle;

        ctx.loops = motorcore::ControlLoops::from_config(&ctx.config);

        if !hal.pwm_init(&ctx.config.pwm) || !hal.adc_init(&ctx.config.adc) || !hal.gpio_init() {
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

        // Blocks until the sample set is coherent
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
                    "six-step sensorless: overvoltage on phase {:?} ({:.2} V)",
                    phase, ctx.state.phase_voltages[i]
                );
                self.mode = MotorMode::Error;
                return Err(MotorError::Overvoltage);
            } else if ctx.state.phase_currents[i].abs() > ctx.config.max_current {
                warn!(
                    "six-step sensorless: overcurrent on phase {:?} ({:.2} A)",
                    phase, ctx.state.phase_currents[i]
                );
                self.mode = MotorMode::Error;
                return Err(MotorError::Overcurrent);
            }
        }

        // Sample and low-pass the back-EMF on the floating phase
        let floating = floating_phase(self.step).index();
        self.bemf[floating] = ctx.state.phase_voltages[floating];
        self.bemf_filtered[floating] = self.bemf_filter_alpha * self.bemf[floating]
            + (1.0 - self.bemf_filter_alpha) * self.bemf_filtered[floating];

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

        let now = hal.micros();
        let bemf = self.bemf_filtered[floating_phase(self.step).index()];

        // Gate on a minimum interval since the last crossing so switching
        // glitches cannot double-commutate
        if now.wrapping_sub(self.last_zc_time) >= MIN_COMMUTATION_PERIOD_US
            && self.has_zero_crossed(bemf)
        {
            self.commutation_period = now.wrapping_sub(self.last_zc_time);
            self.estimated_speed = commutation_speed_rpm(self.commutation_period);
            ctx.state.velocity = self.estimated_speed;

            self.step = advance_step(self.step, self.direction);
            apply_step(
                hal,
                &COMMUTATION_TABLE[self.step as usize],
                self.pwm_duty,
                ctx.config.pwm.resolution,
            );

            self.last_zc_time = now;
            self.zc_state = self.zc_state.opposite();
            debug!(
                "six-step sensorless: step {} period {} us speed {:.1} RPM",
                self.step, self.commutation_period, self.estimated_speed
            );
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

    fn init_running() -> (SixStepSensorless, MotorContext, MockHal) {
        let mut driver = SixStepSensorless::new();
        let mut ctx = MotorContext::new(MotorConfig::default());
        let mut hal = MockHal::new();
        MotorDriver::<MockHal>::init(&mut driver, &mut ctx, &mut hal).unwrap();
        (driver, ctx, hal)
    }

    fn feed_nominal_samples(hal: &mut MockHal) {
        for phase in Phase::ALL {
            hal.set_phase_voltage(phase, 12.0);
            hal.set_phase_current(phase, 5.0);
        }
    }

    #[test]
    fn test_init_reaches_running() {
        let (driver, ctx, _hal) = init_running();
        assert_eq!(driver.mode(), MotorMode::Running);
        assert!(ctx.state.is_initialized);
        assert!(driver.step() < 6);
    }

    #[test]
    fn test_init_fails_when_hal_fails() {
        let mut driver = SixStepSensorless::new();
        let mut ctx = MotorContext::new(MotorConfig::default());
        let mut hal = MockHal::new();
        hal.fail_pwm_init = true;
        let err = MotorDriver::<MockHal>::init(&mut driver, &mut ctx, &mut hal);
        assert_eq!(err, Err(MotorError::Init));
    }

    #[test]
    fn test_startup_stall_aborts_to_error() {
        let mut driver = SixStepSensorless::new();
        let mut config = MotorConfig::default();
        config.min_startup_speed = 100.0;
        let mut ctx = MotorContext::new(config);
        let mut hal = MockHal::new();

        // The mock never produces zero crossings, so the estimated speed
        // stays at zero and the stall ceiling trips
        let err = MotorDriver::<MockHal>::init(&mut driver, &mut ctx, &mut hal);
        assert_eq!(err, Err(MotorError::Init));
        assert_eq!(driver.mode(), MotorMode::Error);
        for state in hal.pin_state {
            assert_eq!(state, PinState::Float);
        }
    }

    #[test]
    fn test_deinit_is_idempotent() {
        let (mut driver, mut ctx, mut hal) = init_running();
        assert!(MotorDriver::<MockHal>::deinit(&mut driver, &mut ctx, &mut hal).is_ok());
        assert_eq!(driver.mode(), MotorMode::Stopped);
        assert!(!ctx.state.is_initialized);
        assert!(MotorDriver::<MockHal>::deinit(&mut driver, &mut ctx, &mut hal).is_ok());
        assert_eq!(driver.mode(), MotorMode::Stopped);
    }

    #[test]
    fn test_update_state_nominal() {
        let (mut driver, mut ctx, mut hal) = init_running();
        feed_nominal_samples(&mut hal);
        hal.advance_micros(1_000);

        ctx.config.control_mode = ControlMode::Current;
        ctx.setpoint.current = 10.0;
        assert!(driver.update_state(&mut ctx, &mut hal).is_ok());
        assert!((0.0..=1.0).contains(&driver.pwm_duty()));
        assert_eq!(ctx.state.phase_voltages, [12.0; 3]);
    }

    #[test]
    fn test_overvoltage_latches_error_and_releases_phases() {
        let (mut driver, mut ctx, mut hal) = init_running();
        feed_nominal_samples(&mut hal);
        hal.set_phase_voltage(Phase::A, 30.0);
        hal.advance_micros(1_000);

        let err = driver.update_state(&mut ctx, &mut hal);
        assert_eq!(err, Err(MotorError::Overvoltage));
        assert_eq!(driver.mode(), MotorMode::Error);

        // The next emission releases everything: zero duty, all floating
        assert!(driver.update_pwm(&mut ctx, &mut hal).is_ok());
        for i in 0..3 {
            assert_eq!(hal.pwm_duty[i], 0);
            assert_eq!(hal.pin_state[i], PinState::Float);
        }

        // The next sampling pass zeroes the duty command and stays released
        assert!(driver.update_state(&mut ctx, &mut hal).is_ok());
        assert_eq!(driver.pwm_duty(), 0.0);
    }

    #[test]
    fn test_overcurrent_latches_error() {
        let (mut driver, mut ctx, mut hal) = init_running();
        feed_nominal_samples(&mut hal);
        hal.set_phase_current(Phase::C, 25.0);
        hal.advance_micros(1_000);

        let err = driver.update_state(&mut ctx, &mut hal);
        assert_eq!(err, Err(MotorError::Overcurrent));
        assert_eq!(driver.mode(), MotorMode::Error);
    }

    #[test]
    fn test_update_pwm_step_zero_pattern() {
        let (mut driver, mut ctx, mut hal) = init_running();
        driver.step = 0;
        // 1000 raw counts at 12-bit resolution
        driver.pwm_duty = 1000.0 / 4095.0;

        assert!(driver.update_pwm(&mut ctx, &mut hal).is_ok());
        assert_eq!(hal.pwm_duty[Phase::A.index()], 1000);
        assert_eq!(hal.pin_state[Phase::A.index()], PinState::Pwm);
        assert_eq!(hal.pin_state[Phase::B.index()], PinState::Low);
        assert_eq!(hal.pin_state[Phase::C.index()], PinState::Float);
    }

    #[test]
    fn test_zero_crossing_advances_step_and_flips_polarity() {
        let (mut driver, mut ctx, mut hal) = init_running();
        driver.step = 0;
        driver.zc_state = ZeroCrossing::Rising;
        hal.advance_micros(1_000);

        // Threshold 0.1 V + hysteresis 0.5 V: 0.61 V on the floating phase
        // (phase C at step 0) crosses
        driver.bemf_filtered[Phase::C.index()] = 0.61;
        assert!(driver.commutate(&mut ctx, &mut hal).is_ok());
        assert_eq!(driver.step(), 1);
        assert_eq!(driver.expected_crossing(), ZeroCrossing::Falling);
    }

    #[test]
    fn test_polarity_alternates_on_each_crossing() {
        let (mut driver, mut ctx, mut hal) = init_running();
        driver.step = 0;
        driver.zc_state = ZeroCrossing::Rising;

        hal.advance_micros(10_000);
        driver.bemf_filtered[Phase::C.index()] = 0.61;
        driver.commutate(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.step(), 1);
        assert_eq!(driver.expected_crossing(), ZeroCrossing::Falling);

        // Step 1 floats phase B; a falling crossing needs a value below
        // -(threshold + hysteresis)
        hal.advance_micros(10_000);
        driver.bemf_filtered[Phase::B.index()] = -0.61;
        driver.commutate(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.step(), 2);
        assert_eq!(driver.expected_crossing(), ZeroCrossing::Rising);
    }

    #[test]
    fn test_sub_threshold_bemf_does_not_commutate() {
        let (mut driver, mut ctx, mut hal) = init_running();
        driver.step = 0;
        driver.zc_state = ZeroCrossing::Rising;
        hal.advance_micros(1_000);

        // Above threshold but inside the hysteresis band
        driver.bemf_filtered[Phase::C.index()] = 0.55;
        driver.commutate(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.step(), 0);
    }

    #[test]
    fn test_noise_gate_rejects_fast_recrossing() {
        let (mut driver, mut ctx, mut hal) = init_running();
        driver.step = 0;
        driver.zc_state = ZeroCrossing::Rising;
        driver.last_zc_time = hal.micros;

        // Only 5 us since the last crossing: below the gate
        hal.advance_micros(5);
        driver.bemf_filtered[Phase::C.index()] = 5.0;
        driver.commutate(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.step(), 0);
    }

    #[test]
    fn test_speed_estimated_from_commutation_period() {
        let (mut driver, mut ctx, mut hal) = init_running();
        driver.step = 0;
        driver.zc_state = ZeroCrossing::Rising;
        driver.last_zc_time = hal.micros;

        hal.advance_micros(10_000);
        driver.bemf_filtered[Phase::C.index()] = 0.61;
        driver.commutate(&mut ctx, &mut hal).unwrap();

        // 10 ms per 60 electrical degrees = 1000 RPM
        assert!((driver.estimated_speed() - 1000.0).abs() < 1.0);
        assert_eq!(ctx.state.velocity, driver.estimated_speed());
    }

    #[test]
    fn test_reverse_direction_steps_backwards() {
        let (mut driver, mut ctx, mut hal) = init_running();
        driver.direction = Direction::Reverse;
        driver.step = 0;
        driver.zc_state = ZeroCrossing::Rising;
        hal.advance_micros(1_000);

        driver.bemf_filtered[Phase::C.index()] = 0.61;
        driver.commutate(&mut ctx, &mut hal).unwrap();
        assert_eq!(driver.step(), 5);
    }

    #[test]
    fn test_voltage_mode_duty_is_normalized_setpoint() {
        let (mut driver, mut ctx, mut hal) = init_running();
        feed_nominal_samples(&mut hal);
        hal.advance_micros(1_000);

        ctx.config.control_mode = ControlMode::Voltage;
        ctx.setpoint.voltage = 12.0;
        driver.update_state(&mut ctx, &mut hal).unwrap();
        assert!((driver.pwm_duty() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_duty_and_step_stay_bounded_over_many_ticks() {
        let (mut driver, mut ctx, mut hal) = init_running();
        feed_nominal_samples(&mut hal);
        ctx.config.control_mode = ControlMode::Velocity;
        ctx.setpoint.velocity = 500.0;

        for _ in 0..100 {
            hal.advance_micros(100);
            driver.update_state(&mut ctx, &mut hal).unwrap();
            driver.commutate(&mut ctx, &mut hal).unwrap();
            driver.update_pwm(&mut ctx, &mut hal).unwrap();
            assert!(driver.step() < 6);
            assert!((0.0..=1.0).contains(&driver.pwm_duty()));
        }
    }
}
