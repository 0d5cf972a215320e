//! Policies that blend a vision measurement into an odometry pose.
//!
//! A [`FusionLaw`] picks per-axis gains from the state variance and the
//! measurement standard deviations; the provided [`FusionLaw::fuse`] applies
//! them.  Angles are blended along the shortest arc.

use rover_types::{Covariance2D, Pose2D, VisionStdDevs, normalize_angle};
use serde::{Deserialize, Serialize};

/// Per-axis blend weights in `[0, 1]`: `0` keeps the prior, `1` snaps to
/// the measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionGains {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// A vision measurement waiting in the odometry buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub measurement: Pose2D,
    pub std_devs: VisionStdDevs,
}

pub trait FusionLaw: Send + Sync + std::fmt::Debug {
    fn gains(&self, covariance: &Covariance2D, std_devs: &VisionStdDevs) -> FusionGains;

    /// Variance left after applying `gains`.  Defaults to `(1 - k) · q`.
    fn posterior(&self, covariance: &Covariance2D, gains: &FusionGains) -> Covariance2D {
        Covariance2D {
            xx: (1.0 - gains.x) * covariance.xx,
            yy: (1.0 - gains.y) * covariance.yy,
            tt: (1.0 - gains.theta) * covariance.tt,
        }
    }

    fn fuse(
        &self,
        prior: &Pose2D,
        covariance: &Covariance2D,
        correction: &Correction,
    ) -> (Pose2D, Covariance2D) {
        let gains = self.gains(covariance, &correction.std_devs);
        let m = &correction.measurement;
        let pose = Pose2D::new(
            prior.x + gains.x * (m.x - prior.x),
            prior.y + gains.y * (m.y - prior.y),
            prior.theta + gains.theta * normalize_angle(m.theta - prior.theta),
        );
        (pose, self.posterior(covariance, &gains))
    }
}

fn kalman_gain(q: f64, r: f64) -> f64 {
    let total = q + r;
    if total > 0.0 && total.is_finite() {
        (q / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Scalar Kalman update per axis: `k = q / (q + r)`, `r = stddev²`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InverseVariance;

impl FusionLaw for InverseVariance {
    fn gains(&self, covariance: &Covariance2D, std_devs: &VisionStdDevs) -> FusionGains {
        let r_xy = std_devs.xy * std_devs.xy;
        let r_theta = std_devs.theta * std_devs.theta;
        FusionGains {
            x: kalman_gain(covariance.xx, r_xy),
            y: kalman_gain(covariance.yy, r_xy),
            theta: kalman_gain(covariance.tt, r_theta),
        }
    }
}

/// Complementary filter with constant gains.  Leaves the variance untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedGain {
    pub xy: f64,
    pub theta: f64,
}

impl FusionLaw for FixedGain {
    fn gains(&self, _: &Covariance2D, _: &VisionStdDevs) -> FusionGains {
        FusionGains {
            x: self.xy.clamp(0.0, 1.0),
            y: self.xy.clamp(0.0, 1.0),
            theta: self.theta.clamp(0.0, 1.0),
        }
    }

    fn posterior(&self, covariance: &Covariance2D, _: &FusionGains) -> Covariance2D {
        *covariance
    }
}

/// Serializable choice of fusion law.
///
/// ```toml
/// fusion = { law = "fixed_gain", xy = 0.1, theta = 0.05 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum FusionPolicy {
    #[default]
    InverseVariance,
    FixedGain { xy: f64, theta: f64 },
}

impl FusionPolicy {
    pub fn build(&self) -> Box<dyn FusionLaw> {
        match *self {
            FusionPolicy::InverseVariance => Box::new(InverseVariance),
            FusionPolicy::FixedGain { xy, theta } => Box::new(FixedGain { xy, theta }),
        }
    }
}
