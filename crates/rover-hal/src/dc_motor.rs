//! Brushless DC motor model and a single-mechanism flywheel simulation.
//!
//! The plant is the standard first-order velocity model of a motor driving a
//! pure inertia through a gearbox:
//!
//! ```text
//! ω' = A·ω + B·u      A = -G²·Kt / (Kv·R·J)      B = G·Kt / (R·J)
//! ```
//!
//! [`DcMotorSim::update`] integrates it with the exact zero-order-hold
//! discretisation, so a step of any length is deterministic and O(1).

use std::f64::consts::TAU;

/// Electrical and mechanical constants of one or more identical motors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcMotor {
    pub nominal_voltage: f64,
    /// N·m at stall, summed over all motors.
    pub stall_torque: f64,
    /// A at stall, summed over all motors.
    pub stall_current: f64,
    pub free_current: f64,
    /// rad/s with no load.
    pub free_speed: f64,
    /// Winding resistance in Ω.
    pub r_ohms: f64,
    /// rad/s per volt of back-EMF.
    pub kv: f64,
    /// N·m per ampere.
    pub kt: f64,
}

impl DcMotor {
    pub fn new(
        nominal_voltage: f64,
        stall_torque: f64,
        stall_current: f64,
        free_current: f64,
        free_speed: f64,
        count: u32,
    ) -> Self {
        let count = f64::from(count.max(1));
        let stall_torque = stall_torque * count;
        let stall_current = stall_current * count;
        let free_current = free_current * count;
        let r_ohms = nominal_voltage / stall_current;
        Self {
            nominal_voltage,
            stall_torque,
            stall_current,
            free_current,
            free_speed,
            r_ohms,
            kv: free_speed / (nominal_voltage - r_ohms * free_current),
            kt: stall_torque / stall_current,
        }
    }

    /// Kraken X60 running field-oriented control.
    pub fn kraken_x60_foc(count: u32) -> Self {
        Self::new(12.0, 9.37, 483.0, 2.0, 5800.0 / 60.0 * TAU, count)
    }

    /// Current drawn at motor speed `speed` (rad/s) with `volts` applied.
    pub fn current(&self, speed: f64, volts: f64) -> f64 {
        -speed / (self.kv * self.r_ohms) + volts / self.r_ohms
    }

    /// Steady-state speed per volt in rotations per second.
    pub fn rps_per_volt(&self) -> f64 {
        self.kv / TAU
    }
}

/// A gearbox-reduced inertia driven by a [`DcMotor`].
#[derive(Debug, Clone)]
pub struct DcMotorSim {
    motor: DcMotor,
    gearing: f64,
    a: f64,
    b: f64,
    position_rad: f64,
    velocity_rad_per_sec: f64,
    input_voltage: f64,
}

impl DcMotorSim {
    /// `gearing` is motor rotations per output rotation; `moment_of_inertia`
    /// is at the output in kg·m².  Both must be positive.
    pub fn new(motor: DcMotor, moment_of_inertia: f64, gearing: f64) -> Self {
        let a = -gearing * gearing * motor.kt / (motor.kv * motor.r_ohms * moment_of_inertia);
        let b = gearing * motor.kt / (motor.r_ohms * moment_of_inertia);
        Self {
            motor,
            gearing,
            a,
            b,
            position_rad: 0.0,
            velocity_rad_per_sec: 0.0,
            input_voltage: 0.0,
        }
    }

    pub fn set_input_voltage(&mut self, volts: f64) {
        self.input_voltage = volts;
    }

    pub fn input_voltage(&self) -> f64 {
        self.input_voltage
    }

    /// Advance the plant by `dt` seconds with the current input held.
    pub fn update(&mut self, dt: f64) {
        if !(dt > 0.0) {
            return;
        }
        let u = self.input_voltage;
        let v0 = self.velocity_rad_per_sec;
        let decay = (self.a * dt).exp();
        let gain = (decay - 1.0) / self.a;

        self.position_rad += gain * v0 + self.b * u * (gain - dt) / self.a;
        self.velocity_rad_per_sec = decay * v0 + gain * self.b * u;
    }

    /// Output shaft velocity in rad/s.
    pub fn angular_velocity(&self) -> f64 {
        self.velocity_rad_per_sec
    }

    /// Output shaft velocity in rotations per second.
    pub fn velocity_rps(&self) -> f64 {
        self.velocity_rad_per_sec / TAU
    }

    pub fn position_rotations(&self) -> f64 {
        self.position_rad / TAU
    }

    /// Stator current at the motor, signed with the applied voltage.
    pub fn current_draw_amps(&self) -> f64 {
        self.motor
            .current(self.velocity_rad_per_sec * self.gearing, self.input_voltage)
    }
}
