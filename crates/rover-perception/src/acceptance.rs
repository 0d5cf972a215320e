//! Geometric and quality gate applied to every vision observation before it
//! may touch the pose estimate.

use rover_types::VisionObservation;
use serde::{Deserialize, Serialize};

/// Why an observation was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// No targets: distance and ambiguity are undefined.
    ZeroTargets,
    /// Ambiguity above the configured threshold.
    Ambiguous,
    /// Planar position outside the field plus its border margin, or a
    /// heading that is not finite.
    OutsideField,
    /// Height outside `[-z_margin, z_margin]`.
    OutsideZ,
    /// No std-dev scale factor for the reporting camera, or a target
    /// distance no weight can be computed from.
    UnknownCamera,
    /// Captured before the retained odometry window.
    Stale,
}

impl RejectReason {
    pub const ALL: [RejectReason; 6] = [
        RejectReason::ZeroTargets,
        RejectReason::Ambiguous,
        RejectReason::OutsideField,
        RejectReason::OutsideZ,
        RejectReason::UnknownCamera,
        RejectReason::Stale,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            RejectReason::ZeroTargets => 0,
            RejectReason::Ambiguous => 1,
            RejectReason::OutsideField => 2,
            RejectReason::OutsideZ => 3,
            RejectReason::UnknownCamera => 4,
            RejectReason::Stale => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::ZeroTargets => "zero_targets",
            RejectReason::Ambiguous => "ambiguous",
            RejectReason::OutsideField => "outside_field",
            RejectReason::OutsideZ => "outside_z",
            RejectReason::UnknownCamera => "unknown_camera",
            RejectReason::Stale => "stale",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds an observation must satisfy, checked in declaration order.
///
/// Boundaries are inclusive: an ambiguity exactly at the threshold, or a
/// position exactly on the expanded border, is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionAcceptancePolicy {
    pub ambiguity_threshold: f64,
    /// Metres the field rectangle is grown by on every side.
    pub field_border_margin: f64,
    pub z_margin: f64,
    pub field_length: f64,
    pub field_width: f64,
}

impl Default for VisionAcceptancePolicy {
    fn default() -> Self {
        Self {
            ambiguity_threshold: 0.2,
            field_border_margin: 0.5,
            z_margin: 0.75,
            field_length: 17.548,
            field_width: 8.052,
        }
    }
}

impl VisionAcceptancePolicy {
    pub fn check(&self, obs: &VisionObservation) -> Result<(), RejectReason> {
        if obs.num_targets == 0 {
            return Err(RejectReason::ZeroTargets);
        }
        // Written as `!(a <= b)` so NaN metrics are rejected too.
        if !(obs.ambiguity <= self.ambiguity_threshold) {
            return Err(RejectReason::Ambiguous);
        }

        let t = obs.estimated_pose.translation;
        let margin = self.field_border_margin;
        let inside_x = t.x >= -margin && t.x <= self.field_length + margin;
        let inside_y = t.y >= -margin && t.y <= self.field_width + margin;
        let heading_known = obs.estimated_pose.rotation.yaw().is_finite();
        if !(inside_x && inside_y && heading_known) {
            return Err(RejectReason::OutsideField);
        }
        if !(t.z.abs() <= self.z_margin) {
            return Err(RejectReason::OutsideZ);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::Pose3D;

    const EPS: f64 = 1e-9;

    fn obs(x: f64, y: f64, z: f64, ambiguity: f64) -> VisionObservation {
        VisionObservation {
            camera_id: 0,
            timestamp: 1.0,
            estimated_pose: Pose3D::from_xyz_rpy(x, y, z, 0.0, 0.0, 0.0),
            ambiguity,
            target_distance: 2.0,
            num_targets: 1,
        }
    }

    #[test]
    fn ambiguity_boundary() {
        let policy = VisionAcceptancePolicy::default();
        assert_eq!(policy.check(&obs(5.0, 4.0, 0.0, 0.2 + EPS)), Err(RejectReason::Ambiguous));
        assert!(policy.check(&obs(5.0, 4.0, 0.0, 0.2 - EPS)).is_ok());
        assert!(policy.check(&obs(5.0, 4.0, 0.0, 0.2)).is_ok());
        assert_eq!(policy.check(&obs(5.0, 4.0, 0.0, f64::NAN)), Err(RejectReason::Ambiguous));
    }

    #[test]
    fn field_border_boundary() {
        let policy = VisionAcceptancePolicy::default();
        assert_eq!(policy.check(&obs(-0.5 - EPS, 4.0, 0.0, 0.0)), Err(RejectReason::OutsideField));
        assert!(policy.check(&obs(-0.5 + EPS, 4.0, 0.0, 0.0)).is_ok());

        let far_x = policy.field_length + policy.field_border_margin;
        assert_eq!(policy.check(&obs(far_x + EPS, 4.0, 0.0, 0.0)), Err(RejectReason::OutsideField));
        assert!(policy.check(&obs(far_x - EPS, 4.0, 0.0, 0.0)).is_ok());

        let far_y = policy.field_width + policy.field_border_margin;
        assert_eq!(policy.check(&obs(5.0, far_y + EPS, 0.0, 0.0)), Err(RejectReason::OutsideField));
        assert!(policy.check(&obs(5.0, far_y - EPS, 0.0, 0.0)).is_ok());
    }

    #[test]
    fn non_finite_pose_is_rejected() {
        let policy = VisionAcceptancePolicy::default();
        assert_eq!(policy.check(&obs(f64::NAN, 4.0, 0.0, 0.0)), Err(RejectReason::OutsideField));
        assert_eq!(policy.check(&obs(5.0, f64::INFINITY, 0.0, 0.0)), Err(RejectReason::OutsideField));
        assert_eq!(policy.check(&obs(5.0, 4.0, f64::NAN, 0.0)), Err(RejectReason::OutsideZ));

        let mut spun = obs(5.0, 4.0, 0.0, 0.0);
        spun.estimated_pose = Pose3D::from_xyz_rpy(5.0, 4.0, 0.0, 0.0, 0.0, f64::NAN);
        assert_eq!(policy.check(&spun), Err(RejectReason::OutsideField));
    }

    #[test]
    fn z_margin_boundary() {
        let policy = VisionAcceptancePolicy::default();
        assert_eq!(policy.check(&obs(5.0, 4.0, 0.75 + EPS, 0.0)), Err(RejectReason::OutsideZ));
        assert_eq!(policy.check(&obs(5.0, 4.0, -0.75 - EPS, 0.0)), Err(RejectReason::OutsideZ));
        assert!(policy.check(&obs(5.0, 4.0, 0.75 - EPS, 0.0)).is_ok());
        assert!(policy.check(&obs(5.0, 4.0, -0.75 + EPS, 0.0)).is_ok());
    }

    #[test]
    fn zero_targets_rejected_before_anything_else() {
        let policy = VisionAcceptancePolicy::default();
        let mut o = obs(-100.0, 4.0, 9.0, 1.0);
        o.num_targets = 0;
        assert_eq!(policy.check(&o), Err(RejectReason::ZeroTargets));
    }

    #[test]
    fn checks_run_in_order() {
        let policy = VisionAcceptancePolicy::default();
        // Ambiguous and off-field: ambiguity wins.
        assert_eq!(policy.check(&obs(-100.0, 4.0, 0.0, 0.9)), Err(RejectReason::Ambiguous));
        // Off-field and too high: field wins.
        assert_eq!(policy.check(&obs(-100.0, 4.0, 9.0, 0.0)), Err(RejectReason::OutsideField));
    }

    #[test]
    fn reason_indices_are_distinct() {
        let mut seen = [false; RejectReason::ALL.len()];
        for reason in RejectReason::ALL {
            assert!(!seen[reason.index()]);
            seen[reason.index()] = true;
        }
        assert_eq!(RejectReason::Stale.to_string(), "stale");
    }
}
