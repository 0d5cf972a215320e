//! Simulated mechanism backend for running subsystems without hardware.
//!
//! [`SimMechanism`] integrates a [`DcMotorSim`] by exactly one control period
//! on every [`update_inputs`][Mechanism::update_inputs] call and closes the
//! velocity loop in software (`feedforward + PID`), where the real backend
//! leaves that loop to motor-controller firmware.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::{Mechanism, SimMechanism};
//! use rover_types::SimMechanismConfig;
//!
//! let config = SimMechanismConfig {
//!     moment_of_inertia_kg_m2: 0.001,
//!     gear_ratio: 1.0,
//!     feedforward: Default::default(),
//!     feedback: Default::default(),
//! };
//! let mut roller = SimMechanism::new("roller", &config, 0.02).expect("valid config");
//!
//! roller.set_voltage(6.0);
//! let inputs = roller.update_inputs();
//! assert!(inputs.velocity_rotations_per_sec > 0.0);
//! assert_eq!(inputs.applied_volts, 6.0);
//! ```

use rover_types::{MAX_VOLTAGE, MechanismInputs, RoverError, SimMechanismConfig};
use tracing::info;

use crate::dc_motor::{DcMotor, DcMotorSim};
use crate::feedforward::SimpleMotorFeedforward;
use crate::mechanism::{Mechanism, clamp_voltage};
use crate::pid::PidController;

/// A mechanism backed by a DC-motor physics model.
pub struct SimMechanism {
    name: String,
    sim: DcMotorSim,
    feedforward: SimpleMotorFeedforward,
    pid: PidController,
    period: f64,
}

impl SimMechanism {
    /// Build a simulated Kraken X60 (FOC) driven mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::InvalidConfig`] for a non-positive inertia, gear
    /// ratio, or control period.
    pub fn new(
        name: impl Into<String>,
        config: &SimMechanismConfig,
        period: f64,
    ) -> Result<Self, RoverError> {
        Self::with_motor(name, config, DcMotor::kraken_x60_foc(1), period)
    }

    /// Like [`new`][Self::new] with an explicit motor model.
    pub fn with_motor(
        name: impl Into<String>,
        config: &SimMechanismConfig,
        motor: DcMotor,
        period: f64,
    ) -> Result<Self, RoverError> {
        config.validate()?;
        if !(period > 0.0) {
            return Err(RoverError::InvalidConfig(format!(
                "control period must be positive, got {period}"
            )));
        }
        let name = name.into();
        let mut pid = PidController::from_gains(config.feedback);
        pid.set_output_limits(-MAX_VOLTAGE, MAX_VOLTAGE);
        info!(
            mechanism = %name,
            moi = config.moment_of_inertia_kg_m2,
            gear_ratio = config.gear_ratio,
            "simulated mechanism ready"
        );
        Ok(Self {
            name,
            sim: DcMotorSim::new(motor, config.moment_of_inertia_kg_m2, config.gear_ratio),
            feedforward: SimpleMotorFeedforward::new(config.feedforward),
            pid,
            period,
        })
    }
}

impl Mechanism for SimMechanism {
    fn name(&self) -> &str {
        &self.name
    }

    fn update_inputs(&mut self) -> MechanismInputs {
        self.sim.update(self.period);
        MechanismInputs {
            velocity_rotations_per_sec: self.sim.velocity_rps(),
            applied_volts: self.sim.input_voltage(),
            stator_current_amps: self.sim.current_draw_amps(),
            supply_current_amps: 0.0,
            temp_celsius: 0.0,
            connected: true,
        }
    }

    fn set_voltage(&mut self, volts: f64) {
        self.sim.set_input_voltage(clamp_voltage(volts));
    }

    fn set_velocity(&mut self, target_rps: f64) {
        let measured = self.sim.velocity_rps();
        let volts = self.feedforward.calculate(target_rps)
            + self.pid.calculate(measured, target_rps, self.period);
        self.set_voltage(volts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::{FeedforwardGains, PidGains};

    fn config() -> SimMechanismConfig {
        let motor = DcMotor::kraken_x60_foc(1);
        SimMechanismConfig {
            moment_of_inertia_kg_m2: 0.001,
            gear_ratio: 1.0,
            feedforward: FeedforwardGains {
                ks: 0.0,
                kv: 1.0 / motor.rps_per_volt(),
                ka: 0.0,
            },
            feedback: PidGains { kp: 0.05, ki: 0.0, kd: 0.0 },
        }
    }

    #[test]
    fn rejects_bad_config() {
        let mut bad = config();
        bad.moment_of_inertia_kg_m2 = 0.0;
        assert!(SimMechanism::new("roller", &bad, 0.02).is_err());
        assert!(SimMechanism::new("roller", &config(), 0.0).is_err());
    }

    #[test]
    fn voltage_is_clamped() {
        let mut m = SimMechanism::new("roller", &config(), 0.02).unwrap();
        m.set_voltage(40.0);
        assert_eq!(m.update_inputs().applied_volts, 12.0);
        m.set_voltage(-40.0);
        assert_eq!(m.update_inputs().applied_volts, -12.0);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut m = SimMechanism::new("roller", &config(), 0.02).unwrap();
        m.set_voltage(8.0);
        m.update_inputs();
        m.stop();
        m.stop();
        assert_eq!(m.update_inputs().applied_volts, 0.0);
    }

    #[test]
    fn velocity_loop_converges() {
        let mut m = SimMechanism::new("roller", &config(), 0.02).unwrap();
        let mut inputs = m.update_inputs();
        for _ in 0..150 {
            m.set_velocity(40.0);
            inputs = m.update_inputs();
        }
        assert!((inputs.velocity_rotations_per_sec - 40.0).abs() < 0.5);
        assert!(inputs.stator_current_amps.abs() < 5.0);
    }

    #[test]
    fn update_advances_exactly_one_period() {
        let mut stepped = SimMechanism::new("a", &config(), 0.02).unwrap();
        let mut reference = DcMotorSim::new(DcMotor::kraken_x60_foc(1), 0.001, 1.0);
        stepped.set_voltage(5.0);
        reference.set_input_voltage(5.0);
        for _ in 0..3 {
            stepped.update_inputs();
            reference.update(0.02);
        }
        let inputs = stepped.update_inputs();
        reference.update(0.02);
        assert!((inputs.velocity_rotations_per_sec - reference.velocity_rps()).abs() < 1e-12);
    }
}
