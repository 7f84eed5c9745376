//! Hardware abstraction contract consumed by the control drivers.
//!
//! Exactly one driver owns the HAL at a time; the single-threaded tick loop
//! makes all access race-free.

use serde::{Deserialize, Serialize};

use control::math;

/// Number of motor phases
pub const NUM_PHASES: usize = 3;

/// Motor phase tag. All per-phase containers are `[T; 3]` keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    /// All phases, in container order
    pub const ALL: [Phase; NUM_PHASES] = [Phase::A, Phase::B, Phase::C];

    /// Index of this phase into per-phase arrays
    pub fn index(self) -> usize {
        match self {
            Phase::A => 0,
            Phase::B => 1,
            Phase::C => 2,
        }
    }
}

/// PWM peripheral configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PwmConfig {
    /// Switching frequency in Hz
    pub frequency: u32,
    /// Dead time between complementary transitions, in nanoseconds
    pub dead_time_ns: u32,
    /// Counter resolution in bits
    pub resolution: u16,
    /// Drive both sides of each half-bridge
    pub complementary_output: bool,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            frequency: 20_000,
            dead_time_ns: 1_000,
            resolution: 12,
            complementary_output: true,
        }
    }
}

/// ADC peripheral configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdcConfig {
    /// Sampling frequency in Hz
    pub sampling_freq: u32,
    /// Converter resolution in bits
    pub resolution: u16,
    /// Reference voltage
    pub v_ref: f32,
    /// Current sensor gain (V/A)
    pub current_gain: f32,
    /// Voltage sensor gain (V/V)
    pub voltage_gain: f32,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            sampling_freq: 20_000,
            resolution: 12,
            v_ref: 3.3,
            current_gain: 0.1,
            voltage_gain: 0.1,
        }
    }
}

/// Convert a `[0, 1]` duty cycle into raw counter units for the given PWM
/// resolution.
pub fn duty_to_raw(duty: f32, resolution: u16) -> u16 {
    let full_scale = ((1u32 << resolution) - 1) as f32;
    (math::clamp(duty, 0.0, 1.0) * full_scale).round() as u16
}

/// Hardware abstraction layer for the inverter, sensing and timebase.
///
/// `adc_start_conversion` blocks until samples are ready; the `adc_*` getters
/// then return one coherent snapshot. `micros` is a monotonic microsecond
/// counter that wraps at `u32::MAX`; consumers take differences with
/// `wrapping_sub`.
pub trait Hal {
    fn pwm_init(&mut self, config: &PwmConfig) -> bool;
    fn adc_init(&mut self, config: &AdcConfig) -> bool;
    fn gpio_init(&mut self) -> bool;
    fn hall_init(&mut self) -> bool;
    fn encoder_init(&mut self) -> bool;

    /// Apply a raw-resolution duty cycle to the high side of `phase`
    fn pwm_set_duty(&mut self, phase: Phase, duty: u16);
    /// Apply float duty cycles in `[0, 1]` to all three phases at once
    fn set_pwm(&mut self, config: &PwmConfig, duty_a: f32, duty_b: f32, duty_c: f32);

    fn gpio_set_phase_high(&mut self, phase: Phase);
    fn gpio_set_phase_low(&mut self, phase: Phase);
    fn gpio_set_phase_float(&mut self, phase: Phase);

    /// Start an ADC conversion, blocking until samples are ready
    fn adc_start_conversion(&mut self);
    fn adc_phase_voltages(&mut self) -> [f32; NUM_PHASES];
    fn adc_phase_currents(&mut self) -> [f32; NUM_PHASES];
    fn adc_dc_voltage(&mut self) -> f32;
    fn adc_temperature(&mut self) -> f32;

    /// Monotonic microsecond timebase, wrapping at `u32::MAX`
    fn micros(&mut self) -> u32;
    fn delay_us(&mut self, delay: u32);
    fn delay_ms(&mut self, delay: u32);

    /// Hall code packed as `HallA << 2 | HallB << 1 | HallC`
    fn hall_state(&mut self) -> u8;

    /// Mechanical rotor angle in radians
    fn encoder_position(&mut self) -> f32;
    /// Mechanical rotor velocity in rad/s
    fn encoder_velocity(&mut self) -> f32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duty_to_raw_full_scale() {
        assert_eq!(duty_to_raw(1.0, 12), 4095);
        assert_eq!(duty_to_raw(0.0, 12), 0);
    }

    #[test]
    fn test_duty_to_raw_clamps() {
        assert_eq!(duty_to_raw(1.5, 12), 4095);
        assert_eq!(duty_to_raw(-0.2, 12), 0);
    }

    #[test]
    fn test_duty_to_raw_rounds_to_nearest() {
        assert_eq!(duty_to_raw(1000.0 / 4095.0, 12), 1000);
    }

    #[test]
    fn test_phase_indices_cover_containers() {
        for (expected, phase) in Phase::ALL.iter().enumerate() {
            assert_eq!(phase.index(), expected);
        }
    }
}
