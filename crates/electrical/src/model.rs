//! Trapezoidal-back-EMF BLDC plant model.
//!
//! Models the behavioral electrical and mechanical dynamics a controller
//! observes: per-phase RL current dynamics against a trapezoidal back-EMF,
//! electromagnetic torque, and rotor mechanics with viscous friction and an
//! external load. Integration is explicit Euler, stepped by the caller.

use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

const NUM_PHASES: usize = 3;

/// Parameters of the simulated motor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BldcModelConfig {
    /// Number of rotor pole pairs
    pub pole_pairs: u8,
    /// Rotor moment of inertia (kg·m²)
    pub moment_of_inertia: f32,
    /// Viscous friction coefficient (N·m·s)
    pub friction_coefficient: f32,
    /// DC bus voltage (V)
    pub dc_voltage: f32,
    /// Phase resistance (Ω)
    pub phase_resistance: f32,
    /// Phase inductance (H)
    pub phase_inductance: f32,
    /// Phase current limit applied by the model (A)
    pub max_current: f32,
    /// Back-EMF constant (V·s/rad)
    pub back_emf_constant: f32,
    /// Torque constant (N·m/A)
    pub torque_constant: f32,
}

impl Default for BldcModelConfig {
    fn default() -> Self {
        Self {
            pole_pairs: 7,
            moment_of_inertia: 0.0001,
            friction_coefficient: 0.0001,
            dc_voltage: 24.0,
            phase_resistance: 0.1,
            phase_inductance: 0.0001,
            max_current: 20.0,
            back_emf_constant: 0.01,
            torque_constant: 0.01,
        }
    }
}

/// BLDC plant with state.
#[derive(Debug, Clone)]
pub struct BldcModel {
    config: BldcModelConfig,
    phase_voltages: [f32; NUM_PHASES],
    phase_currents: [f32; NUM_PHASES],
    back_emf: [f32; NUM_PHASES],
    rotor_angle: f32,
    rotor_speed: f32,
    electrical_angle: f32,
    load_torque: f32,
}

/// Sign of the trapezoidal back-EMF waveform at a normalized phase angle.
/// Flat spans with polarity flips, as seen by trapezoidal commutation.
fn bemf_shape(normalized_angle: f32) -> f32 {
    if normalized_angle < 2.0 * PI / 3.0 {
        1.0
    } else if normalized_angle < 4.0 * PI / 3.0 {
        -1.0
    } else {
        1.0
    }
}

impl BldcModel {
    pub fn new(config: BldcModelConfig) -> Self {
        Self {
            config,
            phase_voltages: [0.0; NUM_PHASES],
            phase_currents: [0.0; NUM_PHASES],
            back_emf: [0.0; NUM_PHASES],
            rotor_angle: 0.0,
            rotor_speed: 0.0,
            electrical_angle: 0.0,
            load_torque: 0.0,
        }
    }

    /// Advance the plant by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        self.update_back_emf();
        self.update_phase_currents(dt);

        let torque = self.electromagnetic_torque()
            - self.config.friction_coefficient * self.rotor_speed
            - self.load_torque;

        let accel = torque / self.config.moment_of_inertia;
        self.rotor_speed += accel * dt;
        self.rotor_angle = (self.rotor_angle + self.rotor_speed * dt).rem_euclid(TAU);
        self.electrical_angle = self.rotor_angle * f32::from(self.config.pole_pairs);
    }

    fn update_back_emf(&mut self) {
        let ke = self.config.back_emf_constant;
        for (phase, back_emf) in self.back_emf.iter_mut().enumerate() {
            let phase_angle = self.electrical_angle + phase as f32 * (2.0 / 3.0) * PI;
            let shape = bemf_shape(phase_angle.rem_euclid(TAU));
            *back_emf = shape * ke * self.rotor_speed;
        }
    }

    fn update_phase_currents(&mut self, dt: f32) {
        for phase in 0..NUM_PHASES {
            let voltage = self.phase_voltages[phase];
            let current = self.phase_currents[phase];
            let di_dt = (voltage
                - current * self.config.phase_resistance
                - self.back_emf[phase])
                / self.config.phase_inductance;

            let next = current + di_dt * dt;
            self.phase_currents[phase] = next.clamp(-self.config.max_current, self.config.max_current);
        }
    }

    /// Torque from the interaction of each phase current with its back-EMF
    /// waveform. The shape sign carries the commutation geometry, so this is
    /// `ke * shape * i` summed over phases, well defined at standstill.
    fn electromagnetic_torque(&self) -> f32 {
        let ke = self.config.back_emf_constant;
        let mut torque = 0.0;
        for phase in 0..NUM_PHASES {
            let phase_angle = self.electrical_angle + phase as f32 * (2.0 / 3.0) * PI;
            let shape = bemf_shape(phase_angle.rem_euclid(TAU));
            torque += ke * shape * self.phase_currents[phase];
        }
        torque
    }

    /// Drive one phase terminal, clamped to the bus voltage.
    pub fn set_phase_voltage(&mut self, phase: usize, voltage: f32) {
        if phase < NUM_PHASES {
            self.phase_voltages[phase] =
                voltage.clamp(-self.config.dc_voltage, self.config.dc_voltage);
        }
    }

    /// Float one phase. The terminal settles to the half-bus guess, which is
    /// what a controller samples between zero crossings.
    pub fn set_phase_float(&mut self, phase: usize) {
        if phase < NUM_PHASES {
            self.phase_voltages[phase] = self.config.dc_voltage / 2.0;
        }
    }

    /// External load torque opposing rotation (N·m)
    pub fn set_load_torque(&mut self, torque: f32) {
        self.load_torque = torque;
    }

    pub fn phase_voltages(&self) -> [f32; NUM_PHASES] {
        self.phase_voltages
    }

    pub fn phase_currents(&self) -> [f32; NUM_PHASES] {
        self.phase_currents
    }

    /// Mechanical rotor angle (rad)
    pub fn rotor_angle(&self) -> f32 {
        self.rotor_angle
    }

    /// Mechanical rotor speed (rad/s)
    pub fn rotor_speed(&self) -> f32 {
        self.rotor_speed
    }

    /// Electrical rotor angle (rad)
    pub fn electrical_angle(&self) -> f32 {
        self.electrical_angle
    }

    pub fn config(&self) -> &BldcModelConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_zero_dt_is_a_no_op() {
        let mut model = BldcModel::new(BldcModelConfig::default());
        model.set_phase_voltage(0, 12.0);
        model.step(0.0);
        assert_eq!(model.phase_currents(), [0.0; 3]);
        assert_eq!(model.rotor_speed(), 0.0);
    }

    #[test]
    fn test_driven_phase_builds_current_and_torque() {
        let mut model = BldcModel::new(BldcModelConfig::default());
        // Drive like commutation step 0: A high, B low, C floating
        model.set_phase_voltage(0, 12.0);
        model.set_phase_voltage(1, 0.0);
        model.set_phase_float(2);

        for _ in 0..1000 {
            model.step(1e-5);
        }

        assert!(model.phase_currents()[0] > 0.0);
        assert!(model.rotor_speed() > 0.0);
    }

    #[test]
    fn test_current_limited_by_model() {
        let config = BldcModelConfig {
            max_current: 5.0,
            ..Default::default()
        };
        let mut model = BldcModel::new(config);
        model.set_phase_voltage(0, 24.0);

        for _ in 0..10_000 {
            model.step(1e-5);
        }
        for current in model.phase_currents() {
            assert!(current.abs() <= 5.0);
        }
    }

    #[test]
    fn test_phase_voltage_clamped_to_bus() {
        let mut model = BldcModel::new(BldcModelConfig::default());
        model.set_phase_voltage(0, 100.0);
        assert_eq!(model.phase_voltages()[0], 24.0);
        model.set_phase_voltage(0, -100.0);
        assert_eq!(model.phase_voltages()[0], -24.0);
    }

    #[test]
    fn test_floating_phase_reads_half_bus() {
        let mut model = BldcModel::new(BldcModelConfig::default());
        model.set_phase_float(2);
        assert_eq!(model.phase_voltages()[2], 12.0);
    }

    #[test]
    fn test_rotor_angle_wraps() {
        let mut model = BldcModel::new(BldcModelConfig::default());
        model.set_phase_voltage(0, 24.0);
        model.set_phase_voltage(1, 0.0);
        for _ in 0..50_000 {
            model.step(1e-4);
        }
        assert!((0.0..TAU).contains(&model.rotor_angle()));
    }

    #[test]
    fn test_friction_decays_spin() {
        let config = BldcModelConfig {
            friction_coefficient: 0.01,
            ..Default::default()
        };
        let mut model = BldcModel::new(config);
        model.rotor_speed = 100.0;

        for _ in 0..1000 {
            model.step(1e-4);
        }
        assert!(model.rotor_speed() < 100.0);
    }

    #[test]
    fn test_back_emf_scales_with_speed() {
        let mut model = BldcModel::new(BldcModelConfig::default());
        model.rotor_speed = 100.0;
        model.update_back_emf();
        // ke * speed = 0.01 * 100 = 1 V magnitude on every phase
        for emf in model.back_emf {
            assert!((emf.abs() - 1.0).abs() < 1e-6);
        }
    }
}
