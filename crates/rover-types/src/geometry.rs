//! Rigid-body geometry in the field frame.
//!
//! All angles are radians, all lengths metres.  [`Pose2D`] is the planar pose
//! the estimator tracks; [`Pose3D`] is what cameras report.  Both are plain
//! `Copy` values: every operation returns a new pose.
//!
//! # Example
//!
//! ```rust
//! use rover_types::geometry::{Pose2D, Twist2D};
//!
//! // Drive 1 m forward while turning 90°: a quarter circle of radius 2/π.
//! let start = Pose2D::identity();
//! let end = start.exp(Twist2D::new(1.0, 0.0, std::f64::consts::FRAC_PI_2));
//! assert!((end.theta - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
//!
//! // `log` recovers the twist that produced the motion.
//! let twist = start.log(&end);
//! assert!((twist.dx - 1.0).abs() < 1e-9);
//! ```

use std::f64::consts::{PI, TAU};

/// Wrap an angle into `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

// ────────────────────────────────────────────────────────────────────────────
// Planar types
// ────────────────────────────────────────────────────────────────────────────

/// A robot-frame velocity integrated over one step: forward `dx`, left `dy`,
/// counter-clockwise `dtheta`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist2D {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl Twist2D {
    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }

    /// Scale every component by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.dx * factor, self.dy * factor, self.dtheta * factor)
    }
}

/// A planar rigid transform: translation `(x, y)` and heading `theta`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    /// Heading, counter-clockwise from +X, kept in `(-π, π]` by every
    /// operation that produces a pose.
    pub theta: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta: normalize_angle(theta),
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// Compose two transforms: `self ⊕ other`, where `other` is expressed in
    /// the frame of `self`.
    pub fn compose(&self, other: &Pose2D) -> Pose2D {
        let (sin, cos) = self.theta.sin_cos();
        Pose2D::new(
            self.x + cos * other.x - sin * other.y,
            self.y + sin * other.x + cos * other.y,
            self.theta + other.theta,
        )
    }

    /// The transform that undoes `self`: `self ⊕ self.inverse() == identity`.
    pub fn inverse(&self) -> Pose2D {
        let (sin, cos) = self.theta.sin_cos();
        Pose2D::new(
            -cos * self.x - sin * self.y,
            sin * self.x - cos * self.y,
            -self.theta,
        )
    }

    /// Express `self` in the frame of `base`.
    pub fn relative_to(&self, base: &Pose2D) -> Pose2D {
        base.inverse().compose(self)
    }

    /// Euclidean length of the translation part.
    pub fn translation_norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Follow `twist` along a constant-curvature arc starting at `self`.
    pub fn exp(&self, twist: Twist2D) -> Pose2D {
        let Twist2D { dx, dy, dtheta } = twist;
        let (sin_theta, cos_theta) = dtheta.sin_cos();

        // Series expansion near zero avoids dividing by a vanishing angle.
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };

        let delta = Pose2D::new(dx * s - dy * c, dx * c + dy * s, dtheta);
        self.compose(&delta)
    }

    /// The twist that carries `self` onto `end` along a constant-curvature
    /// arc.  Inverse of [`exp`][Self::exp].
    pub fn log(&self, end: &Pose2D) -> Twist2D {
        let transform = end.relative_to(self);
        let dtheta = transform.theta;
        let half_dtheta = dtheta / 2.0;
        let cos_minus_one = dtheta.cos() - 1.0;

        let half_theta_by_tan = if cos_minus_one.abs() < 1e-9 {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * dtheta.sin()) / cos_minus_one
        };

        let (sin, cos) = (-half_dtheta).atan2(half_theta_by_tan).sin_cos();
        let scale = half_theta_by_tan.hypot(half_dtheta);
        Twist2D::new(
            (transform.x * cos - transform.y * sin) * scale,
            (transform.x * sin + transform.y * cos) * scale,
            dtheta,
        )
    }

    /// Pose a fraction `t ∈ [0, 1]` of the way from `self` to `end` along the
    /// connecting arc.
    pub fn interpolate(&self, end: &Pose2D, t: f64) -> Pose2D {
        let t = t.clamp(0.0, 1.0);
        self.exp(self.log(end).scaled(t))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Spatial types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Translation3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Translation3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }

    pub fn distance(&self, other: &Translation3) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// A 3-D rotation stored as a unit quaternion `(w, x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation3 {
    w: f64,
    x: f64,
    y: f64,
    z: f64,
}

impl Default for Rotation3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Rotation3 {
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Build from extrinsic roll (about X), then pitch (about Y), then yaw
    /// (about Z).
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll / 2.0).sin_cos();
        let (sp, cp) = (pitch / 2.0).sin_cos();
        let (sy, cy) = (yaw / 2.0).sin_cos();
        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
        .normalized()
    }

    fn normalized(self) -> Self {
        let norm = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if norm <= f64::EPSILON {
            return Self::identity();
        }
        Self {
            w: self.w / norm,
            x: self.x / norm,
            y: self.y / norm,
            z: self.z / norm,
        }
    }

    /// Hamilton product: apply `rhs` first, then `self`.
    fn mul(self, rhs: Self) -> Self {
        Self {
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        }
    }

    /// Apply `self`, then `other` (both about the fixed axes).
    pub fn rotate_by(&self, other: &Rotation3) -> Rotation3 {
        other.mul(*self).normalized()
    }

    pub fn inverse(&self) -> Rotation3 {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Rotate a vector: `v' = v + 2w(q × v) + 2 q × (q × v)`.
    pub fn rotate(&self, v: Translation3) -> Translation3 {
        let (qx, qy, qz) = (self.x, self.y, self.z);
        let tx = 2.0 * (qy * v.z - qz * v.y);
        let ty = 2.0 * (qz * v.x - qx * v.z);
        let tz = 2.0 * (qx * v.y - qy * v.x);
        Translation3::new(
            v.x + self.w * tx + (qy * tz - qz * ty),
            v.y + self.w * ty + (qz * tx - qx * tz),
            v.z + self.w * tz + (qx * ty - qy * tx),
        )
    }

    pub fn roll(&self) -> f64 {
        (2.0 * (self.w * self.x + self.y * self.z))
            .atan2(1.0 - 2.0 * (self.x * self.x + self.y * self.y))
    }

    pub fn pitch(&self) -> f64 {
        (2.0 * (self.w * self.y - self.z * self.x)).clamp(-1.0, 1.0).asin()
    }

    pub fn yaw(&self) -> f64 {
        (2.0 * (self.w * self.z + self.x * self.y))
            .atan2(1.0 - 2.0 * (self.y * self.y + self.z * self.z))
    }
}

/// A 3-D rigid transform.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose3D {
    pub translation: Translation3,
    pub rotation: Rotation3,
}

impl Pose3D {
    pub fn new(translation: Translation3, rotation: Rotation3) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Convenience constructor from position and extrinsic roll/pitch/yaw.
    pub fn from_xyz_rpy(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self::new(Translation3::new(x, y, z), Rotation3::from_euler(roll, pitch, yaw))
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// `self ⊕ other`: `other` is expressed in the frame of `self`.
    pub fn compose(&self, other: &Pose3D) -> Pose3D {
        Pose3D::new(
            self.translation.add(self.rotation.rotate(other.translation)),
            other.rotation.rotate_by(&self.rotation),
        )
    }

    pub fn inverse(&self) -> Pose3D {
        let inv = self.rotation.inverse();
        Pose3D::new(inv.rotate(self.translation.neg()), inv)
    }

    /// Project onto the floor plane, keeping only `x`, `y`, and yaw.
    pub fn to_pose2d(&self) -> Pose2D {
        Pose2D::new(self.translation.x, self.translation.y, self.rotation.yaw())
    }
}

impl From<Pose2D> for Pose3D {
    fn from(pose: Pose2D) -> Self {
        Pose3D::from_xyz_rpy(pose.x, pose.y, 0.0, 0.0, 0.0, pose.theta)
    }
}
