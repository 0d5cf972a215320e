//! Simulated drivetrain for hardware-free runs.
//!
//! [`SimDrivetrain`] follows a constant chassis twist, publishes the true
//! pose to a [`GroundTruth`] for simulated cameras, and reports odometry
//! that over-reads translation by a configurable wheel-slip fraction, so the
//! estimate drifts the way real wheel odometry does and vision has
//! something to correct.

use std::sync::Arc;

use rover_perception::GroundTruth;
use rover_types::{OdometrySample, Pose2D, Twist2D};

use crate::subsystems::OdometrySource;

pub struct SimDrivetrain {
    truth: Arc<GroundTruth>,
    /// Chassis velocity per second, in the robot frame.
    twist: Twist2D,
    wheel_slip: f64,
    pose: Pose2D,
    last_timestamp: f64,
}

impl SimDrivetrain {
    pub fn new(truth: Arc<GroundTruth>, twist: Twist2D, wheel_slip: f64) -> Self {
        let (last_timestamp, pose) = truth.get();
        Self {
            truth,
            twist,
            wheel_slip,
            pose,
            last_timestamp,
        }
    }

    pub fn true_pose(&self) -> Pose2D {
        self.pose
    }
}

impl OdometrySource for SimDrivetrain {
    fn sample(&mut self, timestamp: f64) -> Option<OdometrySample> {
        let dt = timestamp - self.last_timestamp;
        if !(dt > 0.0) {
            return None;
        }
        self.last_timestamp = timestamp;

        let delta = Pose2D::identity().exp(self.twist.scaled(dt));
        self.pose = self.pose.compose(&delta);
        self.truth.set(timestamp, self.pose);

        let scale = 1.0 + self.wheel_slip;
        Some(OdometrySample::new(
            timestamp,
            Pose2D::new(delta.x * scale, delta.y * scale, delta.theta),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn full_circle_returns_to_start() {
        let start = Pose2D::new(8.0, 4.0, 0.0);
        let truth = Arc::new(GroundTruth::new(0.0, start));
        // 1 m/s with a 2 s turn period.
        let mut drive = SimDrivetrain::new(truth.clone(), Twist2D::new(1.0, 0.0, PI), 0.0);
        for i in 1..=100 {
            drive.sample(i as f64 * 0.02);
        }
        let (t, pose) = truth.get();
        assert!((t - 2.0).abs() < 1e-9);
        assert!((pose.x - start.x).abs() < 1e-9);
        assert!((pose.y - start.y).abs() < 1e-9);
    }

    #[test]
    fn slip_inflates_reported_translation() {
        let truth = Arc::new(GroundTruth::new(0.0, Pose2D::identity()));
        let mut drive = SimDrivetrain::new(truth, Twist2D::new(2.0, 0.0, 0.0), 0.05);
        let sample = drive.sample(0.5).unwrap();
        assert!((sample.delta.x - 1.05).abs() < 1e-12);
        assert!((drive.true_pose().x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn repeated_timestamp_yields_nothing() {
        let truth = Arc::new(GroundTruth::new(1.0, Pose2D::identity()));
        let mut drive = SimDrivetrain::new(truth, Twist2D::new(1.0, 0.0, 0.0), 0.0);
        assert!(drive.sample(1.0).is_none());
        assert!(drive.sample(1.02).is_some());
        assert!(drive.sample(1.02).is_none());
    }
}
