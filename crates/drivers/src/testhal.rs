//! Settable HAL mock for driver tests.

use motorcore::{AdcConfig, Hal, Phase, PwmConfig, NUM_PHASES};

/// Last commanded half-bridge mode per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinState {
    #[default]
    Float,
    Low,
    High,
    Pwm,
}

/// In-memory HAL whose samples and clock the test scripts. The clock advances
/// across `delay_us`/`delay_ms`, so blocking startup sequences observe real
/// elapsed time.
#[derive(Debug, Default)]
pub struct MockHal {
    pub pwm_duty: [u16; NUM_PHASES],
    pub pin_state: [PinState; NUM_PHASES],
    pub float_duties: [f32; NUM_PHASES],
    pub phase_voltages: [f32; NUM_PHASES],
    pub phase_currents: [f32; NUM_PHASES],
    pub dc_voltage: f32,
    pub temperature: f32,
    pub micros: u32,
    pub hall: u8,
    pub encoder_position: f32,
    pub encoder_velocity: f32,
    pub fail_pwm_init: bool,
}

impl MockHal {
    pub fn new() -> Self {
        Self {
            dc_voltage: 24.0,
            temperature: 25.0,
            micros: 1_000,
            ..Default::default()
        }
    }

    pub fn set_phase_voltage(&mut self, phase: Phase, voltage: f32) {
        self.phase_voltages[phase.index()] = voltage;
    }

    pub fn set_phase_current(&mut self, phase: Phase, current: f32) {
        self.phase_currents[phase.index()] = current;
    }

    pub fn advance_micros(&mut self, delta: u32) {
        self.micros = self.micros.wrapping_add(delta);
    }
}

impl Hal for MockHal {
    fn pwm_init(&mut self, _config: &PwmConfig) -> bool {
        !self.fail_pwm_init
    }

    fn adc_init(&mut self, _config: &AdcConfig) -> bool {
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
        self.pwm_duty[phase.index()] = duty;
        self.pin_state[phase.index()] = PinState::Pwm;
    }

    fn set_pwm(&mut self, _config: &PwmConfig, duty_a: f32, duty_b: f32, duty_c: f32) {
        self.float_duties = [duty_a, duty_b, duty_c];
    }

    fn gpio_set_phase_high(&mut self, phase: Phase) {
        self.pin_state[phase.index()] = PinState::High;
    }

    fn gpio_set_phase_low(&mut self, phase: Phase) {
        self.pin_state[phase.index()] = PinState::Low;
    }

    fn gpio_set_phase_float(&mut self, phase: Phase) {
        self.pin_state[phase.index()] = PinState::Float;
    }

    fn adc_start_conversion(&mut self) {}

    fn adc_phase_voltages(&mut self) -> [f32; NUM_PHASES] {
        self.phase_voltages
    }

    fn adc_phase_currents(&mut self) -> [f32; NUM_PHASES] {
        self.phase_currents
    }

    fn adc_dc_voltage(&mut self) -> f32 {
        self.dc_voltage
    }

    fn adc_temperature(&mut self) -> f32 {
        self.temperature
    }

    fn micros(&mut self) -> u32 {
        self.micros
    }

    fn delay_us(&mut self, delay: u32) {
        self.micros = self.micros.wrapping_add(delay);
    }

    fn delay_ms(&mut self, delay: u32) {
        self.micros = self.micros.wrapping_add(delay.wrapping_mul(1_000));
    }

    fn hall_state(&mut self) -> u8 {
        self.hall
    }

    fn encoder_position(&mut self) -> f32 {
        self.encoder_position
    }

    fn encoder_velocity(&mut self) -> f32 {
        self.encoder_velocity
    }
}
