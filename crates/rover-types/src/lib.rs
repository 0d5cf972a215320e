//! `rover-types` – shared value types for the rover estimation and actuation
//! core.
//!
//! Everything here is plain data: geometry, sensor samples, static
//! configuration, and the workspace-wide [`RoverError`].  Behaviour lives in
//! `rover-hal`, `rover-perception`, and `rover-runtime`.

pub mod geometry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use geometry::{Pose2D, Pose3D, Rotation3, Translation3, Twist2D, normalize_angle};

/// Largest magnitude any backend will ever apply to a motor, in volts.
pub const MAX_VOLTAGE: f64 = 12.0;

/// Default control period of the update loop, in seconds.
pub const DEFAULT_PERIOD_SECS: f64 = 0.02;

// ────────────────────────────────────────────────────────────────────────────
// Odometry & vision
// ────────────────────────────────────────────────────────────────────────────

/// One drivetrain odometry step.
///
/// `delta` is the robot's motion since the previous sample, expressed in the
/// robot frame at the start of the step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometrySample {
    /// Capture time in seconds.
    pub timestamp: f64,
    pub delta: Pose2D,
}

impl OdometrySample {
    pub fn new(timestamp: f64, delta: Pose2D) -> Self {
        Self { timestamp, delta }
    }

    /// Build a sample from a twist integrated over the step.
    pub fn from_twist(timestamp: f64, twist: Twist2D) -> Self {
        Self::new(timestamp, Pose2D::identity().exp(twist))
    }
}

/// Static description of one physical camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    /// Name of the vision co-processor instance, e.g. `"northstar_0"`.
    pub instance_name: String,
    /// Device path on the co-processor.
    pub device: String,
    /// Robot → camera transform.
    pub extrinsic: Pose3D,
}

/// A robot pose solved from one camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionObservation {
    /// Index of the camera in the configured camera list.
    pub camera_id: usize,
    /// Capture time in seconds (not arrival time).
    pub timestamp: f64,
    pub estimated_pose: Pose3D,
    /// Solver ambiguity in `[0, 1]`; higher is less trustworthy.
    pub ambiguity: f64,
    /// Mean camera-to-target distance in metres.
    pub target_distance: f64,
    pub num_targets: usize,
}

/// Converts vision quality metrics into measurement standard deviations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdDevModel {
    pub xy_coefficient: f64,
    pub theta_coefficient: f64,
    /// One scale factor per camera, indexed by camera id.
    pub per_camera_factors: Vec<f64>,
}

impl Default for StdDevModel {
    fn default() -> Self {
        Self {
            xy_coefficient: 0.005,
            theta_coefficient: 0.01,
            per_camera_factors: vec![1.0; 4],
        }
    }
}

impl StdDevModel {
    /// Standard deviations for `obs`, or `None` when its camera has no
    /// configured factor, it carries no targets, or its target distance is
    /// not finite.
    ///
    /// Both grow with the square of the target distance and shrink with the
    /// number of targets seen.
    pub fn std_devs(&self, obs: &VisionObservation) -> Option<VisionStdDevs> {
        if obs.num_targets == 0 {
            return None;
        }
        let factor = *self.per_camera_factors.get(obs.camera_id)?;
        let base = obs.target_distance.powi(2) / obs.num_targets as f64;
        if !base.is_finite() {
            return None;
        }
        Some(VisionStdDevs {
            xy: self.xy_coefficient * base * factor,
            theta: self.theta_coefficient * base * factor,
        })
    }
}

/// Measurement standard deviations of one vision observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionStdDevs {
    /// Metres, applied to both x and y.
    pub xy: f64,
    /// Radians.
    pub theta: f64,
}

/// Diagonal pose covariance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Covariance2D {
    pub xx: f64,
    pub yy: f64,
    pub tt: f64,
}

impl Covariance2D {
    pub fn diagonal(xx: f64, yy: f64, tt: f64) -> Self {
        Self { xx, yy, tt }
    }

    /// Covariance of independent axes with the given standard deviations.
    pub fn from_std_devs(x: f64, y: f64, theta: f64) -> Self {
        Self::diagonal(x * x, y * y, theta * theta)
    }
}

/// The single authoritative pose estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FusedPoseEstimate {
    pub pose: Pose2D,
    pub timestamp: f64,
    pub covariance: Covariance2D,
}

// ────────────────────────────────────────────────────────────────────────────
// Mechanisms
// ────────────────────────────────────────────────────────────────────────────

/// Per-cycle sensor snapshot of one mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MechanismInputs {
    /// Mechanism-side velocity (after the reduction).
    pub velocity_rotations_per_sec: f64,
    pub applied_volts: f64,
    pub stator_current_amps: f64,
    pub supply_current_amps: f64,
    pub temp_celsius: f64,
    /// `false` when the last hardware read failed and the values above are
    /// carried over from the previous cycle.
    pub connected: bool,
}

impl Default for MechanismInputs {
    fn default() -> Self {
        Self {
            velocity_rotations_per_sec: 0.0,
            applied_volts: 0.0,
            stator_current_amps: 0.0,
            supply_current_amps: 0.0,
            temp_celsius: 0.0,
            connected: true,
        }
    }
}

/// Static gains of a `ks + kv·v + ka·a` velocity feedforward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedforwardGains {
    #[serde(default)]
    pub ks: f64,
    #[serde(default)]
    pub kv: f64,
    #[serde(default)]
    pub ka: f64,
}

/// Static PID gains.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    #[serde(default)]
    pub kp: f64,
    #[serde(default)]
    pub ki: f64,
    #[serde(default)]
    pub kd: f64,
}

/// Wiring of a mechanism driven by a physical motor controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealMechanismConfig {
    /// Device id on the bus.
    pub id: u32,
    pub bus: String,
    pub stator_current_limit_amps: f64,
    pub supply_current_limit_amps: f64,
    #[serde(default)]
    pub invert: bool,
    #[serde(default = "default_brake_mode")]
    pub brake_mode: bool,
    /// Rotor rotations per mechanism rotation.
    pub reduction: f64,
}

fn default_brake_mode() -> bool {
    true
}

impl RealMechanismConfig {
    /// Reject configurations the hardware cannot honour.
    pub fn validate(&self) -> Result<(), RoverError> {
        if !(self.stator_current_limit_amps > 0.0) {
            return Err(RoverError::InvalidConfig(format!(
                "stator current limit must be positive, got {}",
                self.stator_current_limit_amps
            )));
        }
        if !(self.supply_current_limit_amps > 0.0) {
            return Err(RoverError::InvalidConfig(format!(
                "supply current limit must be positive, got {}",
                self.supply_current_limit_amps
            )));
        }
        if !(self.reduction > 0.0) || !self.reduction.is_finite() {
            return Err(RoverError::InvalidConfig(format!(
                "reduction must be a positive finite ratio, got {}",
                self.reduction
            )));
        }
        Ok(())
    }
}

/// Physical and controller parameters of a simulated mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimMechanismConfig {
    pub moment_of_inertia_kg_m2: f64,
    /// Motor rotations per mechanism rotation.
    pub gear_ratio: f64,
    #[serde(default)]
    pub feedforward: FeedforwardGains,
    #[serde(default)]
    pub feedback: PidGains,
}

impl SimMechanismConfig {
    pub fn validate(&self) -> Result<(), RoverError> {
        if !(self.moment_of_inertia_kg_m2 > 0.0) {
            return Err(RoverError::InvalidConfig(format!(
                "moment of inertia must be positive, got {}",
                self.moment_of_inertia_kg_m2
            )));
        }
        if !(self.gear_ratio > 0.0) {
            return Err(RoverError::InvalidConfig(format!(
                "gear ratio must be positive, got {}",
                self.gear_ratio
            )));
        }
        Ok(())
    }
}

/// Backend selection for one mechanism, fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum MechanismConfig {
    Real(RealMechanismConfig),
    Sim(SimMechanismConfig),
}

impl MechanismConfig {
    pub fn validate(&self) -> Result<(), RoverError> {
        match self {
            MechanismConfig::Real(cfg) => cfg.validate(),
            MechanismConfig::Sim(cfg) => cfg.validate(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace error type.
///
/// Only construction and I/O at the edges return errors; the per-tick
/// contracts (`update_inputs`, `add_vision_observation`, …) never do.
#[derive(Error, Debug)]
pub enum RoverError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Configuration file error: {0}")]
    Config(String),
}

impl RoverError {
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        Self::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }
}
