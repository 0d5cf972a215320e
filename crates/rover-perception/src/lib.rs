//! `rover-perception` – Pose estimation from wheel odometry and AprilTag
//! vision.
//!
//! # Modules
//!
//! - [`estimator`] – [`PoseEstimator`]: the shared, mutex-guarded fused pose
//!   with latency-compensated vision fusion.
//! - [`odometry_buffer`] – bounded history of odometry deltas replayed when a
//!   late observation arrives.
//! - [`acceptance`] – [`VisionAcceptancePolicy`] and [`RejectReason`].
//! - [`fusion_law`] – the [`FusionLaw`] policies blending vision into the
//!   estimate.
//! - [`vision`] – per-camera [`VisionSource`] adapters and the synthetic
//!   [`SimVisionIo`] camera.

pub mod acceptance;
pub mod estimator;
pub mod fusion_law;
pub mod odometry_buffer;
pub mod vision;

pub use acceptance::{RejectReason, VisionAcceptancePolicy};
pub use estimator::{EstimatorConfig, EstimatorStats, PoseEstimator, VisionOutcome};
pub use fusion_law::{Correction, FixedGain, FusionGains, FusionLaw, FusionPolicy, InverseVariance};
pub use odometry_buffer::{BufferEntry, OdometryBuffer, OdometryDrift};
pub use vision::{
    GroundTruth, PoseCandidate, RawFrame, SimVisionIo, TagLayout, TagPose, VisionIo, VisionSource,
};
