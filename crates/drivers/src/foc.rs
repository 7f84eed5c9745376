//! Field-oriented control for PMSM.
//!
//! Per tick: sample, compute the electrical angle (encoder or observer),
//! Clarke and Park the measured currents into the dq frame, regulate them
//! with the inner d/q PIDs, inverse-Park the voltage command and synthesize
//! center-aligned duties with SVPWM.

use log::warn;

use control::math::{mech_to_elec_angle, normalize_angle, sqrt_nr};
use control::{svpwm, transforms, PidController};
use motorcore::{
    ControlMode, Hal, MotorContext, MotorDriver, MotorError, MotorMode, Phase,
};

use crate::observer::{BemfPllConfig, BemfPllObserver};

/// FOC driver; encoder-fed by default, observer-fed when constructed with
/// [`Foc::with_observer`].
pub struct Foc {
    electrical_angle: f32,
    id: f32,
    iq: f32,
    vd: f32,
    vq: f32,
    v_alpha: f32,
    v_beta: f32,
    pid_d: PidController,
    pid_q: PidController,
    /// Configured d-axis current reference for field weakening
    fw_id_ref: f32,
    observer: Option<BemfPllObserver>,
    mode: MotorMode,
}

impl Default for Foc {
    fn default() -> Self {
        Self::sensored()
    }
}

impl Foc {
    /// Encoder-fed FOC. The axis regulators are rebuilt from the motor
    /// configuration at init.
    pub fn sensored() -> Self {
        Self {
            electrical_angle: 0.0,
            id: 0.0,
            iq: 0.0,
            vd: 0.0,
            vq: 0.0,
            v_alpha: 0.0,
            v_beta: 0.0,
            pid_d: PidController::new(Default::default()),
            pid_q: PidController::new(Default::default()),
            fw_id_ref: 0.0,
            observer: None,
            mode: MotorMode::Idle,
        }
    }

    /// Sensorless FOC: rotor angle and speed come from the back-EMF + PLL
    /// observer instead of an encoder.
    pub fn with_observer(config: BemfPllConfig) -> Self {
        let mut foc = Self::sensored();
        foc.observer = Some(BemfPllObserver::new(config));
        foc
    }

    /// Current operational mode
    pub fn mode(&self) -> MotorMode {
        self.mode
    }

    /// Latest electrical angle used for the transforms (rad)
    pub fn electrical_angle(&self) -> f32 {
        self.electrical_angle
    }

    /// Latest measured dq currents
    pub fn dq_currents(&self) -> (f32, f32) {
        (self.id, self.iq)
    }

    /// Latest dq voltage commands
    pub fn dq_voltages(&self) -> (f32, f32) {
        (self.vd, self.vq)
    }

    /// Latest stationary-frame voltage command, after the inverse Park
    pub fn alpha_beta_voltages(&self) -> (f32, f32) {
        (self.v_alpha, self.v_beta)
    }

    /// The rotor observer, when running sensorless
    pub fn observer(&self) -> Option<&BemfPllObserver> {
        self.observer.as_ref()
    }

    fn release<H: Hal>(&self, ctx: &MotorContext, hal: &mut H) {
        hal.set_pwm(&ctx.config.pwm, 0.0, 0.0, 0.0);
        for phase in Phase::ALL {
            hal.gpio_set_phase_float(phase);
        }
    }
}

impl<H: Hal> MotorDriver<H> for Foc {
    fn init(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        self.electrical_angle = 0.0;
        self.id = 0.0;
        self.iq = 0.0;
        self.vd = 0.0;
        self.vq = 0.0;
        self.v_alpha = 0.0;
        self.v_beta = 0.0;
        self.mode = MotorMode::Idle;

        ctx.loops = motorcore::ControlLoops::from_config(&ctx.config);
        self.pid_d = PidController::new(ctx.config.current_d_pid.clone());
        self.pid_q = PidController::new(ctx.config.current_q_pid.clone());
        self.fw_id_ref = ctx.config.field_weakening_ref;

        if !hal.pwm_init(&ctx.config.pwm) || !hal.adc_init(&ctx.config.adc) {
            return Err(MotorError::Init);
        }
        match &mut self.observer {
            Some(observer) => observer.init(),
            None => {
                if !hal.encoder_init() {
                    return Err(MotorError::Init);
                }
            }
        }

        ctx.state.is_initialized = true;
        self.mode = MotorMode::Running;
        Ok(())
    }

    fn deinit(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        self.release(ctx, hal);
        ctx.state.is_initialized = false;
        self.vd = 0.0;
        self.vq = 0.0;
        self.mode = MotorMode::Stopped;
        Ok(())
    }

    fn update_state(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        if self.mode == MotorMode::Stopped || self.mode == MotorMode::Error {
            self.release(ctx, hal);
            return Ok(());
        }

        hal.adc_start_conversion();
        ctx.state.phase_voltages = hal.adc_phase_voltages();
        ctx.state.phase_currents = hal.adc_phase_currents();
        ctx.state.temperature = hal.adc_temperature();
        ctx.state.dc_voltage = hal.adc_dc_voltage();

        if self.observer.is_none() {
            ctx.state.position = hal.encoder_position();
            ctx.state.velocity = hal.encoder_velocity();
        }

        for phase in Phase::ALL {
            let i = phase.index();
            if ctx.state.phase_voltages[i].abs() > ctx.config.max_voltage {
                warn!(
                    "foc: overvoltage on phase {:?} ({:.2} V)",
                    phase, ctx.state.phase_voltages[i]
                );
                self.mode = MotorMode::Error;
                return Err(MotorError::Overvoltage);
            } else if ctx.state.phase_currents[i].abs() > ctx.config.max_current {
                warn!(
                    "foc: overcurrent on phase {:?} ({:.2} A)",
                    phase, ctx.state.phase_currents[i]
                );
                self.mode = MotorMode::Error;
                return Err(MotorError::Overcurrent);
            }
        }

        Ok(())
    }

    fn commutate(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        if self.mode != MotorMode::Running {
            return Ok(());
        }

        let now = hal.micros();
        let dt = ctx.elapsed_secs(now);
        ctx.state.last_update_time = now;

        let ia = ctx.state.phase_currents[Phase::A.index()];
        let ib = ctx.state.phase_currents[Phase::B.index()];
        let (i_alpha, i_beta) = transforms::clarke_2phase(ia, ib);

        match &mut self.observer {
            Some(observer) => {
                let [va, vb, vc] = ctx.state.phase_voltages;
                let (v_alpha, v_beta) = transforms::clarke_3phase(va, vb, vc);
                let (theta, omega) = observer.update(v_alpha, v_beta, i_alpha, i_beta, dt)?;
                self.electrical_angle = normalize_angle(theta);
                // Observer speed is electrical; report mechanical
                ctx.state.velocity = omega / f32::from(ctx.config.pole_pairs.max(1));
            }
            None => {
                self.electrical_angle =
                    mech_to_elec_angle(ctx.state.position, ctx.config.pole_pairs);
            }
        }

        let (id, iq) = transforms::park(i_alpha, i_beta, self.electrical_angle);
        self.id = id;
        self.iq = iq;

        match ctx.config.control_mode {
            ControlMode::Current | ControlMode::Torque => {
                let iq_ref = if ctx.config.control_mode == ControlMode::Torque {
                    ctx.setpoint.torque / ctx.config.torque_constant
                } else {
                    ctx.setpoint.current
                };
                self.vd = self.pid_d.update(self.fw_id_ref, self.id, dt);
                self.vq = self.pid_q.update(iq_ref, self.iq, dt);
            }
            ControlMode::Velocity => {
                let iq_ref =
                    ctx.loops
                        .velocity
                        .update(ctx.setpoint.velocity, ctx.state.velocity, dt);
                self.vd = self.pid_d.update(self.fw_id_ref, self.id, dt);
                self.vq = self.pid_q.update(iq_ref, self.iq, dt);
            }
            ControlMode::Voltage | ControlMode::Position => {
                self.vd = ctx.setpoint.voltage;
                self.vq = 0.0;
            }
        }

        let (v_alpha, v_beta) =
            transforms::inverse_park(self.vd, self.vq, self.electrical_angle);
        self.v_alpha = v_alpha;
        self.v_beta = v_beta;

        Ok(())
    }

    fn update_pwm(&mut self, ctx: &mut MotorContext, hal: &mut H) -> Result<(), MotorError> {
        if self.mode != MotorMode::Running {
            self.release(ctx, hal);
            return Ok(());
        }

        let modulation = sqrt_nr(self.vd * self.vd + self.vq * self.vq);
        let [duty_a, duty_b, duty_c] = svpwm::generate(self.electrical_angle, modulation)?;
        hal.set_pwm(&ctx.config.pwm, duty_a, duty_b, duty_c);
        Ok(())
    }
}
