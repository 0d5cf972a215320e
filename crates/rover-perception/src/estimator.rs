//! Latency-compensated pose fusion.
//!
//! [`PoseEstimator`] owns the single authoritative [`FusedPoseEstimate`].
//! The control thread feeds it odometry once per tick; camera worker threads
//! feed it vision observations whenever frames arrive, usually a few tens of
//! milliseconds after capture.  A late observation is fused at its capture
//! time and the odometry recorded since then is replayed on top, so the
//! correction lands where the robot actually was.
//!
//! All state lives behind one [`Mutex`]; every method takes `&self` so the
//! estimator is shared as `Arc<PoseEstimator>`.  Counters are atomics and
//! can be read without the lock.
//!
//! # Example
//!
//! ```rust
//! use rover_perception::{EstimatorConfig, PoseEstimator};
//! use rover_types::{OdometrySample, Pose2D};
//!
//! let estimator = PoseEstimator::new(EstimatorConfig::default(), Pose2D::identity(), 0.0)
//!     .expect("default config is valid");
//! estimator.add_odometry_sample(OdometrySample::new(0.02, Pose2D::new(0.1, 0.0, 0.0)));
//! assert!((estimator.latest_pose().x - 0.1).abs() < 1e-12);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rover_types::{
    FusedPoseEstimate, OdometrySample, Pose2D, RoverError, StdDevModel, VisionObservation,
    VisionStdDevs,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::acceptance::{RejectReason, VisionAcceptancePolicy};
use crate::fusion_law::{Correction, FusionLaw, FusionPolicy};
use crate::odometry_buffer::{BufferEntry, OdometryBuffer, OdometryDrift};

/// Tunables for [`PoseEstimator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub std_dev_model: StdDevModel,
    pub acceptance: VisionAcceptancePolicy,
    pub drift: OdometryDrift,
    pub fusion: FusionPolicy,
    /// How far behind the newest odometry a vision capture may be.
    pub horizon_secs: f64,
    /// Hard bound on buffered entries, corrections included.
    pub capacity: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            std_dev_model: StdDevModel::default(),
            acceptance: VisionAcceptancePolicy::default(),
            drift: OdometryDrift::default(),
            fusion: FusionPolicy::default(),
            horizon_secs: 0.3,
            capacity: 256,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), RoverError> {
        if !(self.horizon_secs > 0.0 && self.horizon_secs.is_finite()) {
            return Err(RoverError::InvalidConfig(format!(
                "buffer horizon must be positive, got {}",
                self.horizon_secs
            )));
        }
        if self.capacity < 2 {
            return Err(RoverError::InvalidConfig(format!(
                "buffer capacity must be at least 2, got {}",
                self.capacity
            )));
        }
        if self.std_dev_model.per_camera_factors.iter().any(|f| !(*f > 0.0)) {
            return Err(RoverError::InvalidConfig(
                "std-dev factors must be positive".to_string(),
            ));
        }
        if self.drift.state_std_devs.iter().any(|s| !(*s >= 0.0))
            || !(self.drift.drift_xy >= 0.0 && self.drift.drift_theta >= 0.0)
        {
            return Err(RoverError::InvalidConfig(
                "odometry drift parameters must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of offering a vision observation to the estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VisionOutcome {
    Accepted(VisionStdDevs),
    Rejected(RejectReason),
}

impl VisionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, VisionOutcome::Accepted(_))
    }
}

/// Snapshot of the estimator counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EstimatorStats {
    pub accepted: u64,
    pub zero_targets: u64,
    pub ambiguous: u64,
    pub outside_field: u64,
    pub outside_z: u64,
    pub unknown_camera: u64,
    pub stale: u64,
    pub disordered_odometry: u64,
}

impl EstimatorStats {
    pub fn rejected(&self, reason: RejectReason) -> u64 {
        match reason {
            RejectReason::ZeroTargets => self.zero_targets,
            RejectReason::Ambiguous => self.ambiguous,
            RejectReason::OutsideField => self.outside_field,
            RejectReason::OutsideZ => self.outside_z,
            RejectReason::UnknownCamera => self.unknown_camera,
            RejectReason::Stale => self.stale,
        }
    }

    pub fn total_rejected(&self) -> u64 {
        RejectReason::ALL.iter().map(|r| self.rejected(*r)).sum()
    }
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: [AtomicU64; RejectReason::ALL.len()],
    disordered_odometry: AtomicU64,
}

struct EstimatorState {
    estimate: FusedPoseEstimate,
    buffer: OdometryBuffer,
}

/// Fuses odometry and delayed vision into one pose.
pub struct PoseEstimator {
    state: Mutex<EstimatorState>,
    std_dev_model: StdDevModel,
    acceptance: VisionAcceptancePolicy,
    drift: OdometryDrift,
    law: Box<dyn FusionLaw>,
    counters: Counters,
}

impl std::fmt::Debug for PoseEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseEstimator")
            .field("estimate", &self.latest_estimate())
            .field("law", &self.law)
            .finish_non_exhaustive()
    }
}

impl PoseEstimator {
    /// Start at `initial_pose` at `timestamp`.
    ///
    /// # Errors
    ///
    /// [`RoverError::InvalidConfig`] when `config` fails validation.
    pub fn new(
        config: EstimatorConfig,
        initial_pose: Pose2D,
        timestamp: f64,
    ) -> Result<Self, RoverError> {
        config.validate()?;
        let covariance = config.drift.initial_covariance();
        let mut buffer = OdometryBuffer::new(config.horizon_secs, config.capacity);
        buffer.seed(BufferEntry::anchor(timestamp, initial_pose, covariance));
        info!(
            horizon_secs = config.horizon_secs,
            capacity = config.capacity,
            cameras = config.std_dev_model.per_camera_factors.len(),
            law = ?config.fusion,
            "pose estimator ready"
        );
        Ok(Self {
            state: Mutex::new(EstimatorState {
                estimate: FusedPoseEstimate {
                    pose: initial_pose,
                    timestamp,
                    covariance,
                },
                buffer,
            }),
            law: config.fusion.build(),
            std_dev_model: config.std_dev_model,
            acceptance: config.acceptance,
            drift: config.drift,
            counters: Counters::default(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, EstimatorState> {
        // Every mutation leaves the state consistent, so a panic elsewhere
        // while holding the lock does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Integrate one odometry delta.  Samples older than the estimate are
    /// dropped and counted.
    pub fn add_odometry_sample(&self, sample: OdometrySample) {
        let mut state = self.lock();
        if !(sample.timestamp >= state.estimate.timestamp) {
            self.counters.disordered_odometry.fetch_add(1, Ordering::Relaxed);
            debug!(
                timestamp = sample.timestamp,
                latest = state.estimate.timestamp,
                "disordered odometry dropped"
            );
            return;
        }

        let pose = state.estimate.pose.compose(&sample.delta);
        let covariance = self.drift.grow(&state.estimate.covariance, &sample.delta);
        state.buffer.push(BufferEntry {
            timestamp: sample.timestamp,
            delta: sample.delta,
            pose,
            covariance,
            correction: None,
        });
        state.estimate = FusedPoseEstimate {
            pose,
            timestamp: sample.timestamp,
            covariance,
        };
    }

    /// Gate `obs`, then fuse it at its capture time.
    pub fn add_vision_observation(&self, obs: VisionObservation) -> VisionOutcome {
        if let Err(reason) = self.acceptance.check(&obs) {
            return self.reject(&obs, reason);
        }
        let Some(std_devs) = self.std_dev_model.std_devs(&obs) else {
            return self.reject(&obs, RejectReason::UnknownCamera);
        };

        let correction = Correction {
            measurement: obs.estimated_pose.to_pose2d(),
            std_devs,
        };

        let mut state = self.lock();
        let Some(index) = state.buffer.insert_correction(obs.timestamp, correction) else {
            drop(state);
            return self.reject(&obs, RejectReason::Stale);
        };

        let (drift, law) = (&self.drift, self.law.as_ref());
        state.buffer.replay_from(index, |prev, entry| {
            let pose = prev.pose.compose(&entry.delta);
            let covariance = drift.grow(&prev.covariance, &entry.delta);
            match &entry.correction {
                Some(c) => law.fuse(&pose, &covariance, c),
                None => (pose, covariance),
            }
        });

        if let Some(latest) = state.buffer.latest().copied() {
            state.estimate.pose = latest.pose;
            state.estimate.covariance = latest.covariance;
        }
        drop(state);

        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        debug!(
            camera = obs.camera_id,
            timestamp = obs.timestamp,
            targets = obs.num_targets,
            xy_std_dev = std_devs.xy,
            theta_std_dev = std_devs.theta,
            "vision observation fused"
        );
        VisionOutcome::Accepted(std_devs)
    }

    fn reject(&self, obs: &VisionObservation, reason: RejectReason) -> VisionOutcome {
        self.counters.rejected[reason.index()].fetch_add(1, Ordering::Relaxed);
        debug!(
            camera = obs.camera_id,
            timestamp = obs.timestamp,
            reason = %reason,
            "vision observation rejected"
        );
        VisionOutcome::Rejected(reason)
    }

    /// Jump to `pose` and forget all history.
    ///
    /// The reset instant is clamped to the current estimate timestamp so the
    /// estimate never moves backwards in time.
    pub fn reset(&self, pose: Pose2D, timestamp: f64) {
        let mut state = self.lock();
        let timestamp = if timestamp >= state.estimate.timestamp {
            timestamp
        } else {
            state.estimate.timestamp
        };
        let covariance = self.drift.initial_covariance();
        state.buffer.seed(BufferEntry::anchor(timestamp, pose, covariance));
        state.estimate = FusedPoseEstimate {
            pose,
            timestamp,
            covariance,
        };
        info!(x = pose.x, y = pose.y, theta = pose.theta, timestamp, "pose estimate reset");
    }

    pub fn latest_pose(&self) -> Pose2D {
        self.lock().estimate.pose
    }

    pub fn latest_estimate(&self) -> FusedPoseEstimate {
        self.lock().estimate
    }

    /// Number of entries currently buffered.
    pub fn buffered_entries(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn stats(&self) -> EstimatorStats {
        let rejected = |reason: RejectReason| {
            self.counters.rejected[reason.index()].load(Ordering::Relaxed)
        };
        EstimatorStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            zero_targets: rejected(RejectReason::ZeroTargets),
            ambiguous: rejected(RejectReason::Ambiguous),
            outside_field: rejected(RejectReason::OutsideField),
            outside_z: rejected(RejectReason::OutsideZ),
            unknown_camera: rejected(RejectReason::UnknownCamera),
            stale: rejected(RejectReason::Stale),
            disordered_odometry: self.counters.disordered_odometry.load(Ordering::Relaxed),
        }
    }
}
