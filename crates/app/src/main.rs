//! Simulation shell: spins a sensorless BLDC controller against the plant
//! model and logs its progress.
//!
//! Usage: `motorsim [config.json] [seconds]`
//!
//! The optional JSON file overrides the default motor configuration; the
//! optional duration bounds the run (default 5 s).

use std::error::Error;
use std::fs;
use std::time::{Duration, Instant};

use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use drivers::SixStepSensorless;
use electrical::{BldcModel, BldcModelConfig};
use motorcore::{ControlMode, Motor, MotorConfig};
use simhal::SimHal;

const STATUS_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_RUN_SECONDS: u64 = 5;

fn load_config() -> Result<MotorConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            info!("loading motor configuration from {path}");
            let raw = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(MotorConfig::default().with_control_mode(ControlMode::Voltage)),
    }
}

fn run_duration() -> Duration {
    let seconds = std::env::args()
        .nth(2)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_RUN_SECONDS);
    Duration::from_secs(seconds)
}

fn main() -> Result<(), Box<dyn Error>> {
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let config = load_config()?;
    let duration = run_duration();

    info!(
        "motor: {:?} / {:?}, {} pole pairs, {} V bus limit",
        config.motor_type, config.control_method, config.pole_pairs, config.max_voltage
    );

    let model = BldcModel::new(BldcModelConfig::default());
    let mut hal = SimHal::new(model);
    let mut motor = Motor::new(&mut hal, config, Box::new(SixStepSensorless::new()));

    info!("starting sensorless startup sequence");
    motor.init()?;
    motor.set_voltage(12.0)?;

    let started = Instant::now();
    let mut last_status = started;

    while started.elapsed() < duration {
        if let Err(fault) = motor.run() {
            error!("control tick aborted: {fault}");
            break;
        }

        if last_status.elapsed() >= STATUS_INTERVAL {
            let state = motor.state();
            info!(
                "t={:.1}s speed={:.1} RPM v=[{:.2} {:.2} {:.2}] i=[{:.2} {:.2} {:.2}]",
                started.elapsed().as_secs_f32(),
                state.velocity,
                state.phase_voltages[0],
                state.phase_voltages[1],
                state.phase_voltages[2],
                state.phase_currents[0],
                state.phase_currents[1],
                state.phase_currents[2],
            );
            last_status = Instant::now();
        }
    }

    motor.deinit()?;
    info!("motor released after {:.1}s", started.elapsed().as_secs_f32());
    Ok(())
}
