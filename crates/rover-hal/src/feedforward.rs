//! Permanent-magnet DC motor velocity feedforward.

use rover_types::FeedforwardGains;

/// `V = ks·sign(v) + kv·v + ka·a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleMotorFeedforward {
    gains: FeedforwardGains,
}

impl SimpleMotorFeedforward {
    pub fn new(gains: FeedforwardGains) -> Self {
        Self { gains }
    }

    /// Voltage needed to hold `velocity` (zero acceleration).
    pub fn calculate(&self, velocity: f64) -> f64 {
        self.calculate_with_accel(velocity, 0.0)
    }

    pub fn calculate_with_accel(&self, velocity: f64, accel: f64) -> f64 {
        let static_term = if velocity == 0.0 { 0.0 } else { self.gains.ks * velocity.signum() };
        static_term + self.gains.kv * velocity + self.gains.ka * accel
    }
}
