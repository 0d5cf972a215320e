//! The `Mechanism` capability trait shared by every actuator backend.
//!
//! A mechanism is bound to exactly one backend for its whole life: either
//! [`RealMechanism`][crate::real::RealMechanism], which drives a physical
//! motor controller, or [`SimMechanism`][crate::sim::SimMechanism], which
//! integrates a DC-motor model.  Subsystem logic only ever holds a
//! `Box<dyn Mechanism>`, so the same code runs on the robot and in headless
//! tests.

use rover_types::{MAX_VOLTAGE, MechanismInputs};

/// An actuator-driven subsystem (roller, intake, end effector, …).
///
/// None of the methods return errors.  Hardware faults surface as degraded
/// [`MechanismInputs`] (see [`MechanismInputs::connected`]) so the control
/// loop keeps running every tick.
pub trait Mechanism: Send {
    /// Stable identifier, e.g. `"end_effector"`.
    fn name(&self) -> &str;

    /// Refresh and return the sensor snapshot for this control cycle.
    ///
    /// Must be called exactly once per cycle, before any output call that
    /// depends on fresh state.  The simulated backend advances its physics by
    /// one control period here.
    fn update_inputs(&mut self) -> MechanismInputs;

    /// Apply an open-loop voltage, clamped to `[-12, 12]` V.
    fn set_voltage(&mut self, volts: f64);

    /// Close the loop on mechanism velocity in rotations per second.
    fn set_velocity(&mut self, target_rps: f64);

    /// Equivalent to `set_voltage(0.0)`.  Idempotent.
    fn stop(&mut self) {
        self.set_voltage(0.0);
    }
}

/// Clamp a requested voltage into the safe output range.
///
/// Non-finite requests map to 0 V.
pub fn clamp_voltage(volts: f64) -> f64 {
    if volts.is_finite() {
        volts.clamp(-MAX_VOLTAGE, MAX_VOLTAGE)
    } else {
        0.0
    }
}
