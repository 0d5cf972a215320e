//! Camera adapter: raw pose solves in, [`VisionObservation`]s out.
//!
//! Each physical camera gets its own [`VisionSource`] wrapping a
//! [`VisionIo`] backend.  The source picks a candidate solve, moves it from
//! the camera frame to the robot frame, and derives the quality metrics the
//! estimator gates on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rover_types::{CameraConfig, Pose2D, Pose3D, RoverError, Translation3, VisionObservation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ────────────────────────────────────────────────────────────────────────────
// Frames
// ────────────────────────────────────────────────────────────────────────────

/// One solution of the camera-pose problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseCandidate {
    /// Camera pose in the field frame.
    pub camera_pose: Pose3D,
    pub reprojection_error: f64,
}

/// One decoded camera frame.
///
/// A multi-tag solve has one candidate; a single-tag solve has two (the
/// planar ambiguity); an empty frame has none.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Capture time in seconds.
    pub timestamp: f64,
    pub candidates: Vec<PoseCandidate>,
    pub tag_ids: Vec<u32>,
}

/// Camera backend.
pub trait VisionIo: Send {
    /// Frames that arrived since the last poll, oldest first.
    fn poll_frames(&mut self) -> Result<Vec<RawFrame>, RoverError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Tag layout
// ────────────────────────────────────────────────────────────────────────────

/// One AprilTag as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagPose {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Degrees, counter-clockwise from the field x axis.
    #[serde(default)]
    pub yaw_deg: f64,
}

/// Field poses of every known AprilTag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagLayout {
    tags: HashMap<u32, Pose3D>,
}

impl TagLayout {
    pub fn new(tags: impl IntoIterator<Item = (u32, Pose3D)>) -> Self {
        Self {
            tags: tags.into_iter().collect(),
        }
    }

    pub fn from_tag_poses(tags: &[TagPose]) -> Self {
        Self::new(tags.iter().map(|t| {
            (t.id, Pose3D::from_xyz_rpy(t.x, t.y, t.z, 0.0, 0.0, t.yaw_deg.to_radians()))
        }))
    }

    pub fn get(&self, id: u32) -> Option<&Pose3D> {
        self.tags.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Pose3D)> {
        self.tags.iter().map(|(id, pose)| (*id, pose))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Source
// ────────────────────────────────────────────────────────────────────────────

/// Turns frames from one camera into observations.
pub struct VisionSource {
    camera_id: usize,
    config: CameraConfig,
    io: Box<dyn VisionIo>,
    layout: Arc<TagLayout>,
    camera_to_robot: Pose3D,
}

impl VisionSource {
    pub fn new(
        camera_id: usize,
        config: CameraConfig,
        io: Box<dyn VisionIo>,
        layout: Arc<TagLayout>,
    ) -> Self {
        info!(
            camera = camera_id,
            instance = %config.instance_name,
            device = %config.device,
            "vision source ready"
        );
        Self {
            camera_id,
            camera_to_robot: config.extrinsic.inverse(),
            config,
            io,
            layout,
        }
    }

    pub fn camera_id(&self) -> usize {
        self.camera_id
    }

    pub fn name(&self) -> &str {
        &self.config.instance_name
    }

    pub fn process_frame(&self, frame: &RawFrame) -> Option<VisionObservation> {
        let (best, ambiguity) = match frame.candidates.as_slice() {
            [] => return None,
            [only] => (only, 0.0),
            [a, b, ..] => {
                let (best, other) = if a.reprojection_error <= b.reprojection_error { (a, b) } else { (b, a) };
                let ambiguity = if other.reprojection_error > 0.0 {
                    best.reprojection_error / other.reprojection_error
                } else {
                    1.0
                };
                (best, ambiguity)
            }
        };

        let camera_position = best.camera_pose.translation;
        let distances: Vec<f64> = frame
            .tag_ids
            .iter()
            .filter_map(|id| self.layout.get(*id))
            .map(|tag| camera_position.distance(&tag.translation))
            .collect();
        if distances.is_empty() {
            return None;
        }

        Some(VisionObservation {
            camera_id: self.camera_id,
            timestamp: frame.timestamp,
            estimated_pose: best.camera_pose.compose(&self.camera_to_robot),
            ambiguity,
            target_distance: distances.iter().sum::<f64>() / distances.len() as f64,
            num_targets: distances.len(),
        })
    }

    /// Poll the backend once.  Backend errors are logged and yield nothing.
    pub fn poll(&mut self) -> Vec<VisionObservation> {
        match self.io.poll_frames() {
            Ok(frames) => frames.iter().filter_map(|f| self.process_frame(f)).collect(),
            Err(e) => {
                warn!(camera = self.camera_id, instance = %self.config.instance_name, error = %e, "camera poll failed");
                Vec::new()
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated camera
// ────────────────────────────────────────────────────────────────────────────

/// Timestamped robot pose shared between a simulated drivetrain and its
/// simulated cameras.
#[derive(Debug, Default)]
pub struct GroundTruth {
    inner: Mutex<(f64, Pose2D)>,
}

impl GroundTruth {
    pub fn new(timestamp: f64, pose: Pose2D) -> Self {
        Self {
            inner: Mutex::new((timestamp, pose)),
        }
    }

    pub fn set(&self, timestamp: f64, pose: Pose2D) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = (timestamp, pose);
    }

    pub fn get(&self) -> (f64, Pose2D) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Synthetic camera rendering perfect single-candidate solves.
pub struct SimVisionIo {
    truth: Arc<GroundTruth>,
    extrinsic: Pose3D,
    layout: Arc<TagLayout>,
    max_range: f64,
    latency: Duration,
}

impl SimVisionIo {
    pub fn new(
        truth: Arc<GroundTruth>,
        extrinsic: Pose3D,
        layout: Arc<TagLayout>,
        max_range: f64,
        latency: Duration,
    ) -> Self {
        Self {
            truth,
            extrinsic,
            layout,
            max_range,
            latency,
        }
    }

    fn render(&self, timestamp: f64, robot: Pose2D) -> RawFrame {
        let camera_pose = Pose3D::from(robot).compose(&self.extrinsic);
        let position: Translation3 = camera_pose.translation;
        let mut tag_ids: Vec<u32> = self
            .layout
            .iter()
            .filter(|(_, tag)| position.distance(&tag.translation) <= self.max_range)
            .map(|(id, _)| id)
            .collect();
        tag_ids.sort_unstable();
        let candidates = if tag_ids.is_empty() {
            Vec::new()
        } else {
            vec![PoseCandidate {
                camera_pose,
                reprojection_error: 0.1,
            }]
        };
        RawFrame {
            timestamp,
            candidates,
            tag_ids,
        }
    }
}

impl VisionIo for SimVisionIo {
    fn poll_frames(&mut self) -> Result<Vec<RawFrame>, RoverError> {
        let (timestamp, robot) = self.truth.get();
        let frame = self.render(timestamp, robot);
        // Capture-to-delivery delay of the decode pipeline.
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(vec![frame])
    }
}
