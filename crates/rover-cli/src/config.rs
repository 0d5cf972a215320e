//! Robot configuration – reads `rover.toml`.
//!
//! Every field has a default, so an empty file (or no file) describes the
//! competition robot: four northstar cameras, the field tag layout, and a
//! simulated end-effector roller.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use rover_hal::DcMotor;
use rover_perception::{
    EstimatorConfig, FusionPolicy, OdometryDrift, TagLayout, TagPose, VisionAcceptancePolicy,
};
use rover_types::{
    CameraConfig, DEFAULT_PERIOD_SECS, FeedforwardGains, MechanismConfig, PidGains, Pose2D,
    Pose3D, RoverError, SimMechanismConfig, StdDevModel, Twist2D,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "rover.toml";

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
        }
    }
}

/// Vision gating and weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_ambiguity_threshold")]
    pub ambiguity_threshold: f64,
    #[serde(default = "default_field_border_margin")]
    pub field_border_margin: f64,
    #[serde(default = "default_z_margin")]
    pub z_margin: f64,
    #[serde(default = "default_xy_std_dev_coefficient")]
    pub xy_std_dev_coefficient: f64,
    #[serde(default = "default_theta_std_dev_coefficient")]
    pub theta_std_dev_coefficient: f64,
    /// One per camera, in camera order.
    #[serde(default = "default_std_dev_factors")]
    pub std_dev_factors: Vec<f64>,
    #[serde(default = "default_buffer_horizon_secs")]
    pub buffer_horizon_secs: f64,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default)]
    pub fusion: FusionPolicy,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            ambiguity_threshold: default_ambiguity_threshold(),
            field_border_margin: default_field_border_margin(),
            z_margin: default_z_margin(),
            xy_std_dev_coefficient: default_xy_std_dev_coefficient(),
            theta_std_dev_coefficient: default_theta_std_dev_coefficient(),
            std_dev_factors: default_std_dev_factors(),
            buffer_horizon_secs: default_buffer_horizon_secs(),
            buffer_capacity: default_buffer_capacity(),
            fusion: FusionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default = "default_field_length")]
    pub length_m: f64,
    #[serde(default = "default_field_width")]
    pub width_m: f64,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            length_m: default_field_length(),
            width_m: default_field_width(),
        }
    }
}

/// One camera and its mounting pose on the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraEntry {
    pub instance_name: String,
    pub device: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub roll_deg: f64,
    #[serde(default)]
    pub pitch_deg: f64,
    #[serde(default)]
    pub yaw_deg: f64,
}

impl CameraEntry {
    pub fn to_camera_config(&self) -> CameraConfig {
        CameraConfig {
            instance_name: self.instance_name.clone(),
            device: self.device.clone(),
            extrinsic: Pose3D::from_xyz_rpy(
                self.x,
                self.y,
                self.z,
                self.roll_deg.to_radians(),
                self.pitch_deg.to_radians(),
                self.yaw_deg.to_radians(),
            ),
        }
    }
}

/// Scenario for hardware-free runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Start pose `[x, y, theta_deg]`.
    pub start: [f64; 3],
    /// Chassis velocity `[vx, vy, omega]` in m/s and rad/s.
    pub twist: [f64; 3],
    /// Fraction by which wheel odometry over-reads translation.
    pub wheel_slip: f64,
    pub camera_latency_ms: u64,
    pub camera_frame_ms: u64,
    pub camera_max_range_m: f64,
    /// Velocity goal handed to every roller at start-up.
    pub roller_goal_rps: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start: [3.0, 4.0, 0.0],
            twist: [1.0, 0.0, 0.4],
            wheel_slip: 0.03,
            camera_latency_ms: 30,
            camera_frame_ms: 40,
            camera_max_range_m: 6.0,
            roller_goal_rps: 40.0,
        }
    }
}

impl SimulationConfig {
    pub fn start_pose(&self) -> Pose2D {
        let [x, y, theta_deg] = self.start;
        Pose2D::new(x, y, theta_deg.to_radians())
    }

    pub fn chassis_twist(&self) -> Twist2D {
        let [vx, vy, omega] = self.twist;
        Twist2D::new(vx, vy, omega)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Root
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub field: FieldConfig,
    /// Odometry drift model.
    #[serde(default)]
    pub estimator: OdometryDrift,
    #[serde(default = "default_cameras")]
    pub cameras: Vec<CameraEntry>,
    #[serde(default = "default_tags")]
    pub tags: Vec<TagPose>,
    /// Mechanisms by name.
    #[serde(default = "default_mechanisms")]
    pub mechanisms: BTreeMap<String, MechanismConfig>,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            vision: VisionConfig::default(),
            field: FieldConfig::default(),
            estimator: OdometryDrift::default(),
            cameras: default_cameras(),
            tags: default_tags(),
            mechanisms: default_mechanisms(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.control.period_ms)
    }

    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig {
            std_dev_model: StdDevModel {
                xy_coefficient: self.vision.xy_std_dev_coefficient,
                theta_coefficient: self.vision.theta_std_dev_coefficient,
                per_camera_factors: self.vision.std_dev_factors.clone(),
            },
            acceptance: VisionAcceptancePolicy {
                ambiguity_threshold: self.vision.ambiguity_threshold,
                field_border_margin: self.vision.field_border_margin,
                z_margin: self.vision.z_margin,
                field_length: self.field.length_m,
                field_width: self.field.width_m,
            },
            drift: self.estimator.clone(),
            fusion: self.vision.fusion,
            horizon_secs: self.vision.buffer_horizon_secs,
            capacity: self.vision.buffer_capacity,
        }
    }

    pub fn camera_configs(&self) -> Vec<CameraConfig> {
        self.cameras.iter().map(CameraEntry::to_camera_config).collect()
    }

    pub fn tag_layout(&self) -> TagLayout {
        TagLayout::from_tag_poses(&self.tags)
    }

    /// Reject configurations the robot cannot run with.
    pub fn validate(&self) -> Result<(), RoverError> {
        if self.control.period_ms == 0 {
            return Err(RoverError::InvalidConfig(
                "control.period_ms must be positive".to_string(),
            ));
        }
        if self.cameras.is_empty() {
            return Err(RoverError::InvalidConfig(
                "at least one camera must be configured".to_string(),
            ));
        }
        if self.vision.std_dev_factors.len() != self.cameras.len() {
            return Err(RoverError::InvalidConfig(format!(
                "vision.std_dev_factors has {} entries but {} cameras are configured",
                self.vision.std_dev_factors.len(),
                self.cameras.len()
            )));
        }
        self.estimator_config().validate()?;
        for (name, mechanism) in &self.mechanisms {
            mechanism
                .validate()
                .map_err(|e| RoverError::InvalidConfig(format!("mechanism `{name}`: {e}")))?;
        }
        Ok(())
    }

    /// Replace every real mechanism with a simulated one of the same
    /// reduction.
    pub fn force_sim_backend(&mut self) {
        for mechanism in self.mechanisms.values_mut() {
            if let MechanismConfig::Real(real) = mechanism {
                *mechanism = MechanismConfig::Sim(sim_mechanism(real.reduction));
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

fn default_period_ms() -> u64 {
    (DEFAULT_PERIOD_SECS * 1000.0).round() as u64
}
fn default_ambiguity_threshold() -> f64 {
    0.2
}
fn default_field_border_margin() -> f64 {
    0.5
}
fn default_z_margin() -> f64 {
    0.75
}
fn default_xy_std_dev_coefficient() -> f64 {
    0.005
}
fn default_theta_std_dev_coefficient() -> f64 {
    0.01
}
fn default_std_dev_factors() -> Vec<f64> {
    vec![1.0, 1.0, 1.0, 1.0]
}
fn default_buffer_horizon_secs() -> f64 {
    0.3
}
fn default_buffer_capacity() -> usize {
    256
}
fn default_field_length() -> f64 {
    17.548
}
fn default_field_width() -> f64 {
    8.052
}

fn inches(v: f64) -> f64 {
    v * 0.0254
}

fn default_cameras() -> Vec<CameraEntry> {
    let camera = |name: &str, device: &str, [x, y, z]: [f64; 3], pitch_deg: f64, yaw_deg: f64| {
        CameraEntry {
            instance_name: name.to_string(),
            device: device.to_string(),
            x,
            y,
            z,
            roll_deg: 0.0,
            pitch_deg,
            yaw_deg,
        }
    };
    vec![
        camera("northstar_0", "/dev/video_cam3", [-0.190, -0.045, 0.22], -20.0, 180.0),
        camera("northstar_1", "/dev/video_cam2", [0.127, -0.247, 0.209], -20.0, 225.0),
        camera(
            "northstar_2",
            "/dev/v4l/by-path/platform-fc800000.usb-usb-0:1:1.0-video-index0",
            [inches(8.875), inches(-10.5), inches(8.25)],
            -28.125,
            -30.0,
        ),
        camera(
            "northstar_3",
            "/dev/v4l/by-path/platform-fc880000.usb-usb-0:1:1.0-video-index0",
            [inches(-16.0), inches(-12.0), inches(8.5)],
            -33.75,
            176.386,
        ),
    ]
}

/// Welded field AprilTag layout: `(id, x, y, z, yaw_deg)`.
const FIELD_TAGS: [(u32, f64, f64, f64, f64); 22] = [
    (1, 16.697, 0.655, 1.486, 126.0),
    (2, 16.697, 7.396, 1.486, 234.0),
    (3, 11.561, 8.056, 1.302, 270.0),
    (4, 9.276, 6.138, 1.868, 0.0),
    (5, 9.276, 1.915, 1.868, 0.0),
    (6, 13.474, 3.306, 0.308, 300.0),
    (7, 13.891, 4.026, 0.308, 0.0),
    (8, 13.474, 4.745, 0.308, 60.0),
    (9, 12.643, 4.745, 0.308, 120.0),
    (10, 12.227, 4.026, 0.308, 180.0),
    (11, 12.643, 3.306, 0.308, 240.0),
    (12, 0.851, 0.655, 1.486, 54.0),
    (13, 0.851, 7.396, 1.486, 306.0),
    (14, 8.272, 6.138, 1.868, 180.0),
    (15, 8.272, 1.915, 1.868, 180.0),
    (16, 5.988, -0.004, 1.302, 90.0),
    (17, 4.074, 3.306, 0.308, 240.0),
    (18, 3.658, 4.026, 0.308, 180.0),
    (19, 4.074, 4.745, 0.308, 120.0),
    (20, 4.905, 4.745, 0.308, 60.0),
    (21, 5.321, 4.026, 0.308, 0.0),
    (22, 4.905, 3.306, 0.308, 300.0),
];

fn default_tags() -> Vec<TagPose> {
    FIELD_TAGS
        .iter()
        .map(|&(id, x, y, z, yaw_deg)| TagPose { id, x, y, z, yaw_deg })
        .collect()
}

fn sim_mechanism(gear_ratio: f64) -> SimMechanismConfig {
    SimMechanismConfig {
        moment_of_inertia_kg_m2: 0.002,
        gear_ratio,
        feedforward: FeedforwardGains {
            ks: 0.0,
            kv: gear_ratio / DcMotor::kraken_x60_foc(1).rps_per_volt(),
            ka: 0.0,
        },
        feedback: PidGains {
            kp: 0.05,
            ki: 0.0,
            kd: 0.0,
        },
    }
}

fn default_mechanisms() -> BTreeMap<String, MechanismConfig> {
    BTreeMap::from([(
        "end_effector".to_string(),
        MechanismConfig::Sim(sim_mechanism(1.0)),
    )])
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, RoverError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RoverError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| RoverError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// | Variable | Effect |
/// |---|---|
/// | `ROVER_PERIOD_MS` | `control.period_ms` |
/// | `ROVER_AMBIGUITY_THRESHOLD` | `vision.ambiguity_threshold` |
/// | `ROVER_BACKEND=sim` | every mechanism runs simulated |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Extracted for testability without mutating the process environment.
pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("ROVER_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.control.period_ms = ms;
    }
    if let Some(v) = lookup("ROVER_AMBIGUITY_THRESHOLD")
        && let Ok(threshold) = v.parse::<f64>()
    {
        cfg.vision.ambiguity_threshold = threshold;
    }
    if let Some(v) = lookup("ROVER_BACKEND")
        && v.eq_ignore_ascii_case("sim")
    {
        cfg.force_sim_backend();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn write(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("rover.toml");
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn defaults_describe_the_competition_robot() {
        let cfg = Config::default();
        cfg.validate().expect("defaults are valid");
        assert_eq!(cfg.control.period_ms, 20);
        assert_eq!(cfg.cameras.len(), 4);
        assert_eq!(cfg.cameras[0].instance_name, "northstar_0");
        assert_eq!(cfg.tags.len(), 22);

        let est = cfg.estimator_config();
        assert_eq!(est.acceptance.ambiguity_threshold, 0.2);
        assert_eq!(est.acceptance.field_border_margin, 0.5);
        assert_eq!(est.acceptance.z_margin, 0.75);
        assert_eq!(est.std_dev_model.xy_coefficient, 0.005);
        assert_eq!(est.std_dev_model.theta_coefficient, 0.01);
        assert_eq!(est.horizon_secs, 0.3);
    }

    #[test]
    fn empty_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, "");
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.cameras, default_cameras());
        assert_eq!(cfg.vision, VisionConfig::default());
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let result = load_from(&dir.path().join("absent.toml")).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn parse_errors_are_config_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, "control = 5");
        assert!(matches!(load_from(&path), Err(RoverError::Config(_))));
    }

    #[test]
    fn full_file_round_trips_through_toml() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            &dir,
            r#"
[control]
period_ms = 10

[vision]
ambiguity_threshold = 0.15
std_dev_factors = [1.0, 2.5]
fusion = { law = "fixed_gain", xy = 0.2, theta = 0.1 }

[field]
length_m = 16.0

[[cameras]]
instance_name = "front"
device = "/dev/video0"
x = 0.3
y = 0.0
z = 0.2
pitch_deg = -15.0

[[cameras]]
instance_name = "rear"
device = "/dev/video1"
x = -0.3
y = 0.0
z = 0.2
yaw_deg = 180.0

[[tags]]
id = 7
x = 1.0
y = 2.0
z = 0.3

[mechanisms.end_effector]
backend = "real"
id = 14
bus = "canivore"
stator_current_limit_amps = 80.0
supply_current_limit_amps = 40.0
invert = true
reduction = 2.0

[mechanisms.intake]
backend = "sim"
moment_of_inertia_kg_m2 = 0.004
gear_ratio = 3.0

[mechanisms.intake.feedforward]
kv = 0.37

[simulation]
wheel_slip = 0.1
"#,
        );
        let cfg = load_from(&path).expect("load ok").expect("some");
        cfg.validate().expect("valid");

        assert_eq!(cfg.period(), Duration::from_millis(10));
        assert_eq!(cfg.vision.fusion, FusionPolicy::FixedGain { xy: 0.2, theta: 0.1 });
        assert_eq!(cfg.vision.z_margin, 0.75);
        assert_eq!(cfg.field.length_m, 16.0);
        assert_eq!(cfg.field.width_m, 8.052);
        assert_eq!(cfg.cameras[1].yaw_deg, 180.0);
        assert_eq!(cfg.tag_layout().len(), 1);
        assert_eq!(cfg.simulation.wheel_slip, 0.1);
        assert_eq!(cfg.simulation.camera_latency_ms, 30);

        match &cfg.mechanisms["end_effector"] {
            MechanismConfig::Real(real) => {
                assert_eq!(real.id, 14);
                assert!(real.invert);
                assert!(real.brake_mode);
            }
            other => panic!("expected real backend, got {other:?}"),
        }
        match &cfg.mechanisms["intake"] {
            MechanismConfig::Sim(sim) => {
                assert_eq!(sim.gear_ratio, 3.0);
                assert_eq!(sim.feedforward.kv, 0.37);
                assert_eq!(sim.feedback, PidGains::default());
            }
            other => panic!("expected sim backend, got {other:?}"),
        }

        let yaw = cfg.camera_configs()[1].extrinsic.rotation.yaw();
        assert!((yaw.abs() - std::f64::consts::PI).abs() < 1e-9);
    }

    #[test]
    fn validation_rejects_mismatched_factor_count() {
        let mut cfg = Config::default();
        cfg.vision.std_dev_factors.pop();
        assert!(matches!(cfg.validate(), Err(RoverError::InvalidConfig(_))));
    }

    #[test]
    fn validation_rejects_empty_cameras_and_zero_period() {
        let mut cfg = Config::default();
        cfg.cameras.clear();
        cfg.vision.std_dev_factors.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.control.period_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.vision.buffer_horizon_secs = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_names_the_bad_mechanism() {
        let mut cfg = Config::default();
        cfg.mechanisms.insert(
            "intake".to_string(),
            MechanismConfig::Sim(SimMechanismConfig {
                moment_of_inertia_kg_m2: -1.0,
                ..sim_mechanism(1.0)
            }),
        );
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("intake"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup(&[("ROVER_PERIOD_MS", "5"), ("ROVER_AMBIGUITY_THRESHOLD", "0.1")]),
        );
        assert_eq!(cfg.control.period_ms, 5);
        assert_eq!(cfg.vision.ambiguity_threshold, 0.1);
    }

    #[test]
    fn env_overrides_ignore_unparsable_values() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, lookup(&[("ROVER_PERIOD_MS", "fast")]));
        assert_eq!(cfg.control.period_ms, 20);
    }

    #[test]
    fn backend_override_forces_simulation() {
        let mut cfg = Config::default();
        cfg.mechanisms.insert(
            "end_effector".to_string(),
            MechanismConfig::Real(rover_types::RealMechanismConfig {
                id: 14,
                bus: "canivore".to_string(),
                stator_current_limit_amps: 80.0,
                supply_current_limit_amps: 40.0,
                invert: false,
                brake_mode: true,
                reduction: 4.0,
            }),
        );
        apply_overrides(&mut cfg, lookup(&[("ROVER_BACKEND", "sim")]));
        match &cfg.mechanisms["end_effector"] {
            MechanismConfig::Sim(sim) => assert_eq!(sim.gear_ratio, 4.0),
            other => panic!("expected sim backend, got {other:?}"),
        }
    }
}
