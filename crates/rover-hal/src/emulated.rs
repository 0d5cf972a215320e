//! Software stand-in for motor-controller firmware.
//!
//! [`EmulatedMotorController`] implements [`MotorController`] on top of a
//! rotor-side [`DcMotorSim`] and runs its own velocity loop at 1 kHz, the way
//! the onboard firmware of a smart motor controller does.  It lets the real
//! backend run on a laptop or in CI and exercises the firmware side of the
//! backend-equivalence contract.
//!
//! Each [`read_status`][MotorController::read_status] call advances the
//! plant by one control period.  A shared fault switch makes every driver
//! call fail while it is set, to rehearse bus outages.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rover_types::{MAX_VOLTAGE, RoverError};

use crate::dc_motor::{DcMotor, DcMotorSim};
use crate::mechanism::clamp_voltage;
use crate::pid::PidController;
use crate::real::{MotorController, MotorControllerConfig, MotorStatus};

const FIRMWARE_RATE_HZ: f64 = 1000.0;
const AMBIENT_CELSIUS: f64 = 25.0;

/// Onboard velocity-loop gains, in volts per rotor rotation per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FirmwareGains {
    pub kv: f64,
    pub kp: f64,
    pub ki: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ControlMode {
    Voltage(f64),
    Velocity(f64),
}

/// An emulated motor controller with a rotor-side plant.
pub struct EmulatedMotorController {
    plant: DcMotorSim,
    motor: DcMotor,
    gains: FirmwareGains,
    loop_pid: PidController,
    mode: ControlMode,
    config: Option<MotorControllerConfig>,
    period: f64,
    faulted: Arc<AtomicBool>,
}

impl EmulatedMotorController {
    /// Emulate `motor` driving `rotor_inertia` (kg·m² reflected to the rotor),
    /// stepped once per `period` seconds.  Firmware gains default to an exact
    /// back-EMF feedforward plus a light proportional trim.
    pub fn new(motor: DcMotor, rotor_inertia: f64, period: f64) -> Self {
        let gains = FirmwareGains {
            kv: 1.0 / motor.rps_per_volt(),
            kp: 0.1,
            ki: 0.0,
        };
        Self::with_gains(motor, rotor_inertia, period, gains)
    }

    pub fn with_gains(motor: DcMotor, rotor_inertia: f64, period: f64, gains: FirmwareGains) -> Self {
        let mut loop_pid = PidController::new(gains.kp, gains.ki, 0.0);
        loop_pid.set_output_limits(-MAX_VOLTAGE, MAX_VOLTAGE);
        Self {
            plant: DcMotorSim::new(motor, rotor_inertia, 1.0),
            motor,
            gains,
            loop_pid,
            mode: ControlMode::Voltage(0.0),
            config: None,
            period,
            faulted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Switch that, while `true`, makes every driver call fail.
    pub fn fault_switch(&self) -> Arc<AtomicBool> {
        self.faulted.clone()
    }

    fn check_bus(&self) -> Result<(), RoverError> {
        if self.faulted.load(Ordering::Relaxed) {
            Err(RoverError::hardware("emulated_motor", "no response on bus"))
        } else {
            Ok(())
        }
    }

    fn direction(&self) -> f64 {
        match self.config {
            Some(cfg) if cfg.inverted => -1.0,
            _ => 1.0,
        }
    }

    /// Measured rotor velocity in the caller's (possibly inverted) frame.
    fn rotor_rps(&self) -> f64 {
        self.plant.velocity_rps() * self.direction()
    }

    /// Bound the output so the stator current stays under its limit.
    fn limit_stator_current(&self, volts: f64) -> f64 {
        let Some(cfg) = self.config else {
            return volts;
        };
        let back_emf = self.plant.angular_velocity() / self.motor.kv;
        let headroom = cfg.stator_current_limit_amps * self.motor.r_ohms;
        if !(headroom > 0.0) {
            return volts;
        }
        // Limiting only ever scales the output toward neutral.
        volts
            .clamp(back_emf - headroom, back_emf + headroom)
            .clamp(volts.min(0.0), volts.max(0.0))
    }

    fn firmware_step(&mut self, dt: f64) {
        let requested = match self.mode {
            ControlMode::Voltage(volts) => volts,
            ControlMode::Velocity(target) => {
                let measured = self.rotor_rps();
                self.gains.kv * target + self.loop_pid.calculate(measured, target, dt)
            }
        };
        let plant_volts = clamp_voltage(requested * self.direction());
        self.plant.set_input_voltage(self.limit_stator_current(plant_volts));
        self.plant.update(dt);
    }
}

impl MotorController for EmulatedMotorController {
    fn configure(&mut self, config: &MotorControllerConfig) -> Result<(), RoverError> {
        self.check_bus()?;
        self.config = Some(*config);
        Ok(())
    }

    fn set_voltage(&mut self, volts: f64) -> Result<(), RoverError> {
        self.check_bus()?;
        self.mode = ControlMode::Voltage(clamp_voltage(volts));
        self.loop_pid.reset();
        Ok(())
    }

    fn set_velocity(&mut self, rotor_rps: f64) -> Result<(), RoverError> {
        self.check_bus()?;
        if !matches!(self.mode, ControlMode::Velocity(_)) {
            self.loop_pid.reset();
        }
        self.mode = ControlMode::Velocity(rotor_rps);
        Ok(())
    }

    fn read_status(&mut self) -> Result<MotorStatus, RoverError> {
        self.check_bus()?;
        let steps = (self.period * FIRMWARE_RATE_HZ).round().max(1.0) as usize;
        let dt = self.period / steps as f64;
        for _ in 0..steps {
            self.firmware_step(dt);
        }

        let applied = self.plant.input_voltage() * self.direction();
        let stator = self.plant.current_draw_amps() * self.direction();
        let mut supply = stator * applied / MAX_VOLTAGE;
        if let Some(cfg) = self.config
            && cfg.supply_current_limit_amps > 0.0
        {
            supply = supply.clamp(-cfg.supply_current_limit_amps, cfg.supply_current_limit_amps);
        }
        Ok(MotorStatus {
            rotor_velocity_rps: self.rotor_rps(),
            applied_volts: applied,
            stator_current_amps: stator,
            supply_current_amps: supply,
            temp_celsius: AMBIENT_CELSIUS,
        })
    }
}
