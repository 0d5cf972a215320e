//! Whole control graph against simulated hardware: a roller, the localizer,
//! and a delayed simulated camera.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rover_hal::{DcMotor, SimMechanism};
use rover_perception::{
    EstimatorConfig, GroundTruth, PoseEstimator, SimVisionIo, TagLayout, VisionSource,
};
use rover_runtime::{Localizer, Roller, RollerGoal, SimDrivetrain, UpdateManagerBuilder};
use rover_types::{
    CameraConfig, FeedforwardGains, PidGains, Pose2D, Pose3D, SimMechanismConfig, Twist2D,
    VisionObservation,
};

const PERIOD: f64 = 0.02;

fn layout() -> Arc<TagLayout> {
    Arc::new(TagLayout::new([
        (1, Pose3D::from_xyz_rpy(8.0, 5.0, 0.5, 0.0, 0.0, 0.0)),
        (2, Pose3D::from_xyz_rpy(5.0, 5.0, 0.5, 0.0, 0.0, 0.0)),
        (3, Pose3D::from_xyz_rpy(11.0, 5.0, 0.5, 0.0, 0.0, 0.0)),
        (4, Pose3D::from_xyz_rpy(8.0, 1.0, 0.5, 0.0, 0.0, 0.0)),
    ]))
}

fn roller_config() -> SimMechanismConfig {
    SimMechanismConfig {
        moment_of_inertia_kg_m2: 0.002,
        gear_ratio: 1.0,
        feedforward: FeedforwardGains {
            ks: 0.0,
            kv: 1.0 / DcMotor::kraken_x60_foc(1).rps_per_volt(),
            ka: 0.0,
        },
        feedback: PidGains { kp: 0.05, ki: 0.0, kd: 0.0 },
    }
}

fn distance(a: &Pose2D, b: &Pose2D) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Drive a circle with 5 % wheel slip for `ticks` ticks and return the final
/// distance between the estimate and ground truth.
fn drive_circle(ticks: usize, with_vision: bool) -> f64 {
    let start = Pose2D::new(8.0, 3.0, 0.0);
    let truth = Arc::new(GroundTruth::new(0.0, start));
    let estimator = Arc::new(PoseEstimator::new(EstimatorConfig::default(), start, 0.0).unwrap());
    let drivetrain = SimDrivetrain::new(truth.clone(), Twist2D::new(1.0, 0.0, 0.5), 0.05);

    let mut manager = UpdateManagerBuilder::new(Duration::from_millis(20))
        .register(Box::new(Localizer::new(Box::new(drivetrain), estimator.clone())))
        .build()
        .unwrap();

    let extrinsic = Pose3D::from_xyz_rpy(0.3, 0.0, 0.5, 0.0, 0.0, 0.0);
    let io = SimVisionIo::new(truth.clone(), extrinsic, layout(), 8.0, Duration::ZERO);
    let camera = CameraConfig {
        instance_name: "northstar_0".to_string(),
        device: "sim".to_string(),
        extrinsic,
    };
    let mut source = VisionSource::new(0, camera, Box::new(io), layout());

    // Frames are delivered three ticks after capture.
    let mut in_flight: VecDeque<(usize, Vec<VisionObservation>)> = VecDeque::new();
    for i in 1..=ticks {
        manager.tick(i as f64 * PERIOD);
        if !with_vision {
            continue;
        }
        if i % 5 == 0 {
            in_flight.push_back((i + 3, source.poll()));
        }
        while in_flight.front().is_some_and(|(due, _)| *due <= i) {
            if let Some((_, observations)) = in_flight.pop_front() {
                for obs in observations {
                    assert!(estimator.add_vision_observation(obs).is_accepted());
                }
            }
        }
    }

    let (_, true_pose) = truth.get();
    distance(&estimator.latest_pose(), &true_pose)
}

#[test]
fn vision_corrects_wheel_slip_drift() {
    let odometry_error = drive_circle(300, false);
    let fused_error = drive_circle(300, true);
    assert!(odometry_error > 0.1, "slip should cause visible drift, got {odometry_error}");
    assert!(fused_error < 0.1, "fused error {fused_error}");
    assert!(fused_error < odometry_error);
}

#[test]
fn roller_reaches_its_velocity_goal() {
    let mechanism = SimMechanism::new("intake", &roller_config(), PERIOD).unwrap();
    let roller = Roller::new(Box::new(mechanism));
    let handle = roller.handle();
    let mut manager = UpdateManagerBuilder::new(Duration::from_millis(20))
        .register(Box::new(roller))
        .build()
        .unwrap();

    handle.set_goal(RollerGoal::Velocity(30.0));
    for i in 1..=150 {
        manager.tick(i as f64 * PERIOD);
    }
    let inputs = handle.inputs();
    assert!((inputs.velocity_rotations_per_sec - 30.0).abs() < 0.5);
    assert!(inputs.connected);

    handle.set_goal(RollerGoal::Idle);
    manager.tick(151.0 * PERIOD);
    manager.tick(152.0 * PERIOD);
    assert_eq!(handle.inputs().applied_volts, 0.0);
}
