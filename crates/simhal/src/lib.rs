//! Simulation HAL
//!
//! Implements the [`motorcore::Hal`] contract against the
//! [`electrical::BldcModel`] plant: PWM and GPIO commands become phase
//! terminal voltages, each ADC conversion steps the plant by the elapsed
//! wall-clock time, and the timebase is a real monotonic microsecond counter
//! (wrapping at `u32::MAX`). Supports injected faults and optional uniform
//! ADC noise for robustness testing.

use std::time::Instant;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use electrical::BldcModel;
use motorcore::{AdcConfig, Hal, Phase, PwmConfig, NUM_PHASES};

/// Phase voltage reported while an overvoltage fault is injected (V)
const FAULT_OVERVOLTAGE_V: f32 = 1_000.0;
/// Phase current reported while an overcurrent fault is injected (A)
const FAULT_OVERCURRENT_A: f32 = 1_000.0;
/// Temperature reported while an overtemperature fault is injected (°C)
const FAULT_OVERTEMP_C: f32 = 150.0;
/// Nominal temperature (°C)
const NOMINAL_TEMP_C: f32 = 25.0;

/// Injectable sensor faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Phase A voltage reads far above any sane limit
    Overvoltage,
    /// Phase A current reads far above any sane limit
    Overcurrent,
    /// Temperature reads far above operating range
    Overtemp,
}

/// Simulation HAL over a BLDC plant model.
pub struct SimHal {
    model: BldcModel,
    pwm_config: PwmConfig,
    adc_config: AdcConfig,
    start: Instant,
    last_step_us: u32,
    fault: Option<Fault>,
    noise_amplitude: f32,
    rng: StdRng,
}

impl SimHal {
    pub fn new(model: BldcModel) -> Self {
        Self {
            model,
            pwm_config: PwmConfig::default(),
            adc_config: AdcConfig::default(),
            start: Instant::now(),
            last_step_us: 0,
            fault: None,
            noise_amplitude: 0.0,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    /// Add uniform measurement noise of the given amplitude to ADC samples.
    pub fn with_noise(mut self, amplitude: f32) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    /// Inject or clear a sensor fault.
    pub fn inject_fault(&mut self, fault: Option<Fault>) {
        if let Some(kind) = fault {
            info!("simhal: injecting fault {kind:?}");
        }
        self.fault = fault;
    }

    /// The plant behind the HAL
    pub fn model(&self) -> &BldcModel {
        &self.model
    }

    /// Mutable access to the plant, e.g. to apply a load torque
    pub fn model_mut(&mut self) -> &mut BldcModel {
        &mut self.model
    }

    fn noise(&mut self) -> f32 {
        if self.noise_amplitude == 0.0 {
            return 0.0;
        }
        (self.rng.gen::<f32>() - 0.5) * 2.0 * self.noise_amplitude
    }

    fn now_us(&self) -> u32 {
        self.start.elapsed().as_micros() as u32
    }
}

impl Hal for SimHal {
    fn pwm_init(&mut self, config: &PwmConfig) -> bool {
        self.pwm_config = config.clone();
        true
    }

    fn adc_init(&mut self, config: &AdcConfig) -> bool {
        self.adc_config = config.clone();
        true
    }

    fn gpio_init(&mut self) -> bool {
        true
    }

    fn hall_init(&mut self) -> bool {
        true
    }

    fn encoder_init(&mut self) -> bool {
        true
    }

    fn pwm_set_duty(&mut self, phase: Phase, duty: u16) {
        let full_scale = ((1u32 << self.pwm_config.resolution) - 1) as f32;
        let duty_fraction = f32::from(duty) / full_scale;
        let voltage = duty_fraction * self.model.config().dc_voltage;
        self.model.set_phase_voltage(phase.index(), voltage);
    }

    fn set_pwm(&mut self, _config: &PwmConfig, duty_a: f32, duty_b: f32, duty_c: f32) {
        let bus = self.model.config().dc_voltage;
        self.model.set_phase_voltage(Phase::A.index(), duty_a * bus);
        self.model.set_phase_voltage(Phase::B.index(), duty_b * bus);
        self.model.set_phase_voltage(Phase::C.index(), duty_c * bus);
    }

    fn gpio_set_phase_high(&mut self, phase: Phase) {
        let bus = self.model.config().dc_voltage;
        self.model.set_phase_voltage(phase.index(), bus);
    }

    fn gpio_set_phase_low(&mut self, phase: Phase) {
        self.model.set_phase_voltage(phase.index(), 0.0);
    }

    fn gpio_set_phase_float(&mut self, phase: Phase) {
        self.model.set_phase_float(phase.index());
    }

    fn adc_start_conversion(&mut self) {
        let now = self.now_us();
        let dt = now.wrapping_sub(self.last_step_us) as f32 / 1_000_000.0;
        self.model.step(dt);
        self.last_step_us = now;
    }

    fn adc_phase_voltages(&mut self) -> [f32; NUM_PHASES] {
        let mut voltages = self.model.phase_voltages();
        for voltage in &mut voltages {
            *voltage += self.noise();
        }
        if self.fault == Some(Fault::Overvoltage) {
            voltages[Phase::A.index()] = FAULT_OVERVOLTAGE_V;
        }
        voltages
    }

    fn adc_phase_currents(&mut self) -> [f32; NUM_PHASES] {
        let mut currents = self.model.phase_currents();
        for current in &mut currents {
            *current += self.noise();
        }
        if self.fault == Some(Fault::Overcurrent) {
            currents[Phase::A.index()] = FAULT_OVERCURRENT_A;
        }
        currents
    }

    fn adc_dc_voltage(&mut self) -> f32 {
        self.model.config().dc_voltage
    }

    fn adc_temperature(&mut self) -> f32 {
        if self.fault == Some(Fault::Overtemp) {
            FAULT_OVERTEMP_C
        } else {
            NOMINAL_TEMP_C
        }
    }

    fn micros(&mut self) -> u32 {
        self.now_us()
    }

    fn delay_us(&mut self, delay: u32) {
        std::thread::sleep(std::time::Duration::from_micros(u64::from(delay)));
    }

    fn delay_ms(&mut self, delay: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(delay)));
    }

    fn hall_state(&mut self) -> u8 {
        // Synthesize the hall code from the plant's electrical sector
        const SECTOR_TO_HALL: [u8; 6] = [0b011, 0b001, 0b101, 0b100, 0b110, 0b010];
        let angle = self.model.electrical_angle().rem_euclid(std::f32::consts::TAU);
        let sector = ((angle / (std::f32::consts::PI / 3.0)) as usize).min(5);
        SECTOR_TO_HALL[sector]
    }

    fn encoder_position(&mut self) -> f32 {
        self.model.rotor_angle()
    }

    fn encoder_velocity(&mut self) -> f32 {
        self.model.rotor_speed()
    }
}
