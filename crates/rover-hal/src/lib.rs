//! `rover-hal` – Mechanism hardware abstraction layer.
//!
//! Every actuator-driven subsystem talks to its motor through the
//! [`Mechanism`] trait, so the same subsystem logic runs against physical
//! hardware or a physics model.  The backend is chosen once, when the
//! mechanism is built, and never swapped.
//!
//! # Modules
//!
//! - [`mechanism`] – the [`Mechanism`] capability trait and voltage clamping.
//! - [`real`] – [`RealMechanism`]: drives a physical motor controller through
//!   the [`MotorController`] driver trait; the velocity loop runs in firmware.
//! - [`sim`] – [`SimMechanism`]: integrates a [`DcMotorSim`] one control
//!   period per cycle and closes the velocity loop in software.
//! - [`emulated`] – [`EmulatedMotorController`]: firmware emulator that lets
//!   the real backend run without hardware.
//! - [`dc_motor`] – DC motor constants and the flywheel plant.
//! - [`feedforward`] – [`SimpleMotorFeedforward`].
//! - [`pid`] – [`PidController`].

pub mod dc_motor;
pub mod emulated;
pub mod feedforward;
pub mod mechanism;
pub mod pid;
pub mod real;
pub mod sim;

pub use dc_motor::{DcMotor, DcMotorSim};
pub use emulated::{EmulatedMotorController, FirmwareGains};
pub use feedforward::SimpleMotorFeedforward;
pub use mechanism::{Mechanism, clamp_voltage};
pub use pid::PidController;
pub use real::{MotorController, MotorControllerConfig, MotorStatus, RealMechanism};
pub use sim::SimMechanism;

use rover_types::{MechanismConfig, RoverError};

/// Build the backend selected by `config`.
///
/// `device` is only consulted for [`MechanismConfig::Real`]; it produces the
/// motor-controller driver for the configured bus and id.
///
/// # Errors
///
/// Propagates construction failures of the chosen backend.
pub fn build_mechanism<F>(
    name: &str,
    config: &MechanismConfig,
    period: f64,
    device: F,
) -> Result<Box<dyn Mechanism>, RoverError>
where
    F: FnOnce(&rover_types::RealMechanismConfig) -> Result<Box<dyn MotorController>, RoverError>,
{
    match config {
        MechanismConfig::Real(real) => {
            let driver = device(real)?;
            Ok(Box::new(RealMechanism::new(name, real, driver)?))
        }
        MechanismConfig::Sim(sim) => Ok(Box::new(SimMechanism::new(name, sim, period)?)),
    }
}
