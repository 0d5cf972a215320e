//! PID (Proportional–Integral–Derivative) feedback controller.
//!
//! Hardware-agnostic: the caller supplies the measurement, the set-point and
//! the elapsed time, and applies the returned output (volts, for every
//! mechanism in this workspace) wherever it needs to.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::pid::PidController;
//!
//! let mut pid = PidController::new(0.5, 0.0, 0.0);
//! pid.set_output_limits(-12.0, 12.0);
//!
//! // 10 rot/s below target → 5 V of correction.
//! let volts = pid.calculate(30.0, 40.0, 0.02);
//! assert!((volts - 5.0).abs() < 1e-9);
//! ```

use rover_types::PidGains;

/// A tunable PID controller with output clamping and integral anti-windup.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    integral: f64,
    last_error: Option<f64>,
    output_min: f64,
    output_max: f64,
}

impl PidController {
    /// Create a controller with unclamped output.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            last_error: None,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
        }
    }

    pub fn from_gains(gains: PidGains) -> Self {
        Self::new(gains.kp, gains.ki, gains.kd)
    }

    /// Clamp the output (and the integral contribution) to `[min, max]`.
    pub fn set_output_limits(&mut self, min: f64, max: f64) {
        self.output_min = min;
        self.output_max = max;
    }

    /// Compute the output that drives `measurement` toward `set_point`.
    ///
    /// `dt` is the time since the previous call in seconds.  A non-positive
    /// `dt` returns `0.0` and leaves the controller untouched.
    pub fn calculate(&mut self, measurement: f64, set_point: f64, dt: f64) -> f64 {
        if !(dt > 0.0) {
            return 0.0;
        }
        let error = set_point - measurement;

        self.integral += error * dt;
        let i = (self.ki * self.integral).clamp(self.output_min, self.output_max);
        if self.ki.abs() > f64::EPSILON {
            // Back-calculate so the accumulator never winds past the limits.
            self.integral = i / self.ki;
        }

        let d = self
            .last_error
            .map_or(0.0, |prev| self.kd * (error - prev) / dt);
        self.last_error = Some(error);

        (self.kp * error + i + d).clamp(self.output_min, self.output_max)
    }

    /// Clear the integral accumulator and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}
