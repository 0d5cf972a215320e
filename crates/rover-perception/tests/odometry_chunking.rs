//! Property tests: odometry-only drift does not depend on how the motion is
//! chunked into samples.

use proptest::prelude::*;
use rover_perception::{EstimatorConfig, PoseEstimator};
use rover_types::{OdometrySample, Pose2D};

fn arb_delta() -> impl Strategy<Value = Pose2D> {
    (-0.2..0.2f64, -0.2..0.2f64, -0.3..0.3f64).prop_map(|(x, y, theta)| Pose2D::new(x, y, theta))
}

/// Deltas plus a boolean per delta deciding whether it starts a new chunk.
fn arb_motion() -> impl Strategy<Value = (Vec<Pose2D>, Vec<bool>)> {
    (1usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(arb_delta(), n),
            prop::collection::vec(any::<bool>(), n),
        )
    })
}

fn estimator(start: Pose2D) -> PoseEstimator {
    PoseEstimator::new(EstimatorConfig::default(), start, 0.0).expect("default config")
}

fn assert_close(a: &Pose2D, b: &Pose2D) -> Result<(), TestCaseError> {
    prop_assert!((a.x - b.x).abs() < 1e-9, "x {} vs {}", a.x, b.x);
    prop_assert!((a.y - b.y).abs() < 1e-9, "y {} vs {}", a.y, b.y);
    let dtheta = rover_types::normalize_angle(a.theta - b.theta);
    prop_assert!(dtheta.abs() < 1e-9, "theta {} vs {}", a.theta, b.theta);
    Ok(())
}

proptest! {
    #[test]
    fn proptest_chunking_does_not_change_the_pose((deltas, breaks) in arb_motion()) {
        let start = Pose2D::new(3.0, 4.0, 0.5);
        let fine = estimator(start);
        for (i, delta) in deltas.iter().enumerate() {
            fine.add_odometry_sample(OdometrySample::new((i + 1) as f64 * 0.01, *delta));
        }

        let coarse = estimator(start);
        let mut pending = Pose2D::identity();
        for (i, (delta, new_chunk)) in deltas.iter().zip(&breaks).enumerate() {
            if *new_chunk && i > 0 {
                coarse.add_odometry_sample(OdometrySample::new(i as f64 * 0.01, pending));
                pending = Pose2D::identity();
            }
            pending = pending.compose(delta);
        }
        coarse.add_odometry_sample(OdometrySample::new(deltas.len() as f64 * 0.01, pending));

        assert_close(&fine.latest_pose(), &coarse.latest_pose())?;
        prop_assert_eq!(fine.latest_estimate().timestamp, coarse.latest_estimate().timestamp);
    }

    #[test]
    fn proptest_odometry_matches_plain_composition(deltas in prop::collection::vec(arb_delta(), 1..80)) {
        let start = Pose2D::new(1.0, 1.0, -0.3);
        let est = estimator(start);
        let mut expected = start;
        for (i, delta) in deltas.iter().enumerate() {
            est.add_odometry_sample(OdometrySample::new((i + 1) as f64 * 0.02, *delta));
            expected = expected.compose(delta);
        }
        assert_close(&est.latest_pose(), &expected)?;
    }

    #[test]
    fn proptest_variance_never_shrinks_without_vision(deltas in prop::collection::vec(arb_delta(), 1..40)) {
        let est = estimator(Pose2D::identity());
        let mut last = est.latest_estimate().covariance;
        for (i, delta) in deltas.iter().enumerate() {
            est.add_odometry_sample(OdometrySample::new((i + 1) as f64 * 0.02, *delta));
            let cov = est.latest_estimate().covariance;
            prop_assert!(cov.xx >= last.xx && cov.yy >= last.yy && cov.tt >= last.tt);
            last = cov;
        }
    }
}
