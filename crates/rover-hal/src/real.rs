//! Physical mechanism backend.
//!
//! [`RealMechanism`] talks to a motor controller through the
//! [`MotorController`] driver trait.  Vendor drivers (CAN, serial, …)
//! implement that trait; the rest of the workspace only sees the
//! [`Mechanism`] contract.
//!
//! The velocity loop runs in the controller firmware.  This backend only
//! converts between mechanism units and rotor units using the configured
//! reduction.
//!
//! Driver errors never escape: a failed read returns the previous snapshot
//! with `connected = false`, a failed write is logged and dropped, and the
//! next tick simply tries again.

use rover_types::{MechanismInputs, RealMechanismConfig, RoverError};
use tracing::{info, warn};

use crate::mechanism::{Mechanism, clamp_voltage};

/// Settings pushed to the motor controller once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorControllerConfig {
    pub stator_current_limit_amps: f64,
    pub supply_current_limit_amps: f64,
    pub inverted: bool,
    /// Brake (`true`) or coast (`false`) when neutral.
    pub brake_mode: bool,
}

impl From<&RealMechanismConfig> for MotorControllerConfig {
    fn from(cfg: &RealMechanismConfig) -> Self {
        Self {
            stator_current_limit_amps: cfg.stator_current_limit_amps,
            supply_current_limit_amps: cfg.supply_current_limit_amps,
            inverted: cfg.invert,
            brake_mode: cfg.brake_mode,
        }
    }
}

/// One status frame reported by a motor controller, in rotor units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorStatus {
    pub rotor_velocity_rps: f64,
    pub applied_volts: f64,
    pub stator_current_amps: f64,
    pub supply_current_amps: f64,
    pub temp_celsius: f64,
}

/// Driver for one physical motor controller.
pub trait MotorController: Send {
    /// Apply current limits, inversion, and neutral mode.
    fn configure(&mut self, config: &MotorControllerConfig) -> Result<(), RoverError>;

    /// Open-loop voltage output.
    fn set_voltage(&mut self, volts: f64) -> Result<(), RoverError>;

    /// Hand a rotor velocity target to the onboard closed loop.
    fn set_velocity(&mut self, rotor_rps: f64) -> Result<(), RoverError>;

    /// Fetch the latest status frame.
    fn read_status(&mut self) -> Result<MotorStatus, RoverError>;
}

/// A mechanism driven by a physical motor controller.
pub struct RealMechanism {
    name: String,
    device: Box<dyn MotorController>,
    reduction: f64,
    last_inputs: MechanismInputs,
    faults: u64,
}

impl RealMechanism {
    /// Validate `config` and configure the device.
    ///
    /// # Errors
    ///
    /// - [`RoverError::InvalidConfig`] for non-positive current limits or
    ///   reduction.
    /// - [`RoverError::HardwareFault`] if the device rejects its
    ///   configuration.
    pub fn new(
        name: impl Into<String>,
        config: &RealMechanismConfig,
        mut device: Box<dyn MotorController>,
    ) -> Result<Self, RoverError> {
        config.validate()?;
        let name = name.into();
        device.configure(&MotorControllerConfig::from(config))?;
        info!(
            mechanism = %name,
            id = config.id,
            bus = %config.bus,
            reduction = config.reduction,
            "motor controller configured"
        );
        Ok(Self {
            name,
            device,
            reduction: config.reduction,
            last_inputs: MechanismInputs::default(),
            faults: 0,
        })
    }

    /// Number of failed reads and writes since construction.
    pub fn fault_count(&self) -> u64 {
        self.faults
    }

    fn record_fault(&mut self, operation: &str, err: &RoverError) {
        self.faults += 1;
        warn!(mechanism = %self.name, operation, error = %err, "motor controller fault");
    }
}

impl Mechanism for RealMechanism {
    fn name(&self) -> &str {
        &self.name
    }

    fn update_inputs(&mut self) -> MechanismInputs {
        match self.device.read_status() {
            Ok(status) => {
                self.last_inputs = MechanismInputs {
                    velocity_rotations_per_sec: status.rotor_velocity_rps / self.reduction,
                    applied_volts: status.applied_volts,
                    stator_current_amps: status.stator_current_amps,
                    supply_current_amps: status.supply_current_amps,
                    temp_celsius: status.temp_celsius,
                    connected: true,
                };
            }
            Err(e) => {
                self.record_fault("read_status", &e);
                self.last_inputs.connected = false;
            }
        }
        self.last_inputs
    }

    fn set_voltage(&mut self, volts: f64) {
        if let Err(e) = self.device.set_voltage(clamp_voltage(volts)) {
            self.record_fault("set_voltage", &e);
        }
    }

    fn set_velocity(&mut self, target_rps: f64) {
        let rotor_rps = if target_rps.is_finite() { target_rps * self.reduction } else { 0.0 };
        if let Err(e) = self.device.set_velocity(rotor_rps) {
            self.record_fault("set_velocity", &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        config: Option<MotorControllerConfig>,
        volts: Vec<f64>,
        velocities: Vec<f64>,
        fail_reads: bool,
        reject_config: bool,
    }

    /// Driver double that records every command into shared state.
    struct RecordingController(Arc<Mutex<Recorded>>);

    impl MotorController for RecordingController {
        fn configure(&mut self, config: &MotorControllerConfig) -> Result<(), RoverError> {
            let mut rec = self.0.lock().unwrap();
            if rec.reject_config {
                return Err(RoverError::hardware("test", "config rejected"));
            }
            rec.config = Some(*config);
            Ok(())
        }

        fn set_voltage(&mut self, volts: f64) -> Result<(), RoverError> {
            self.0.lock().unwrap().volts.push(volts);
            Ok(())
        }

        fn set_velocity(&mut self, rotor_rps: f64) -> Result<(), RoverError> {
            self.0.lock().unwrap().velocities.push(rotor_rps);
            Ok(())
        }

        fn read_status(&mut self) -> Result<MotorStatus, RoverError> {
            let rec = self.0.lock().unwrap();
            if rec.fail_reads {
                return Err(RoverError::hardware("test", "bus timeout"));
            }
            Ok(MotorStatus {
                rotor_velocity_rps: 30.0,
                applied_volts: rec.volts.last().copied().unwrap_or(0.0),
                stator_current_amps: 12.0,
                supply_current_amps: 4.0,
                temp_celsius: 31.0,
            })
        }
    }

    fn config() -> RealMechanismConfig {
        RealMechanismConfig {
            id: 14,
            bus: "canivore".to_string(),
            stator_current_limit_amps: 80.0,
            supply_current_limit_amps: 40.0,
            invert: true,
            brake_mode: false,
            reduction: 3.0,
        }
    }

    fn build() -> (RealMechanism, Arc<Mutex<Recorded>>) {
        let shared = Arc::new(Mutex::new(Recorded::default()));
        let device = Box::new(RecordingController(shared.clone()));
        (RealMechanism::new("end_effector", &config(), device).unwrap(), shared)
    }

    #[test]
    fn construction_pushes_device_config() {
        let (_, shared) = build();
        let cfg = shared.lock().unwrap().config.unwrap();
        assert!(cfg.inverted);
        assert!(!cfg.brake_mode);
        assert_eq!(cfg.stator_current_limit_amps, 80.0);
    }

    #[test]
    fn construction_rejects_invalid_limits_and_device_refusal() {
        let mut bad = config();
        bad.supply_current_limit_amps = -1.0;
        let device = Box::new(RecordingController(Arc::default()));
        assert!(matches!(
            RealMechanism::new("m", &bad, device),
            Err(RoverError::InvalidConfig(_))
        ));

        let refusing = Arc::new(Mutex::new(Recorded {
            reject_config: true,
            ..Recorded::default()
        }));
        let device = Box::new(RecordingController(refusing));
        assert!(matches!(
            RealMechanism::new("m", &config(), device),
            Err(RoverError::HardwareFault { .. })
        ));
    }

    #[test]
    fn velocity_is_converted_through_reduction() {
        let (mut m, shared) = build();
        m.set_velocity(10.0);
        assert_eq!(shared.lock().unwrap().velocities, vec![30.0]);
        let inputs = m.update_inputs();
        assert!((inputs.velocity_rotations_per_sec - 10.0).abs() < 1e-12);
        assert!(inputs.connected);
    }

    #[test]
    fn voltage_is_clamped_before_the_device() {
        let (mut m, shared) = build();
        m.set_voltage(100.0);
        m.set_voltage(f64::NAN);
        assert_eq!(shared.lock().unwrap().volts, vec![12.0, 0.0]);
    }

    #[test]
    fn read_failure_degrades_to_stale_inputs() {
        let (mut m, shared) = build();
        m.set_voltage(6.0);
        let fresh = m.update_inputs();
        shared.lock().unwrap().fail_reads = true;
        let stale = m.update_inputs();
        assert!(!stale.connected);
        assert_eq!(stale.applied_volts, fresh.applied_volts);
        assert_eq!(stale.velocity_rotations_per_sec, fresh.velocity_rotations_per_sec);
        assert_eq!(m.fault_count(), 1);

        shared.lock().unwrap().fail_reads = false;
        assert!(m.update_inputs().connected);
    }

    #[test]
    fn stop_twice_leaves_zero_volts() {
        let (mut m, _) = build();
        m.set_voltage(9.0);
        m.stop();
        m.stop();
        assert_eq!(m.update_inputs().applied_volts, 0.0);
    }
}
