//! Bounded history of odometry deltas used to replay late vision.
//!
//! Every entry stores the delta that led to it and the pose and covariance
//! derived from its predecessor.  A late measurement is spliced in as a
//! correction entry at its capture time; the entries after it are then
//! re-derived by a left fold, so the result depends only on the sequence of
//! deltas and corrections and never on when they arrived.
//!
//! ```text
//!   anchor ── Δ1 ── e1 ── Δ2a ── [correction] ── Δ2b ── e2 ── Δ3 ── e3
//!                          ╰──────── Δ2 split at t ───────╯
//! ```

use std::collections::VecDeque;

use rover_types::{Covariance2D, Pose2D};
use serde::{Deserialize, Serialize};

use crate::fusion_law::Correction;

/// One step in the history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferEntry {
    pub timestamp: f64,
    /// Motion from the previous entry to this one, in the previous entry's
    /// frame.  Identity for the anchor and for corrections past the newest
    /// odometry.
    pub delta: Pose2D,
    pub pose: Pose2D,
    pub covariance: Covariance2D,
    pub correction: Option<Correction>,
}

impl BufferEntry {
    pub fn anchor(timestamp: f64, pose: Pose2D, covariance: Covariance2D) -> Self {
        Self {
            timestamp,
            delta: Pose2D::identity(),
            pose,
            covariance,
            correction: None,
        }
    }
}

/// Process noise added per unit of odometry motion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryDrift {
    /// Initial standard deviations `[x, y, theta]`.
    pub state_std_devs: [f64; 3],
    /// Metres of standard deviation per √metre travelled.
    pub drift_xy: f64,
    /// Radians of standard deviation per √radian turned.
    pub drift_theta: f64,
}

impl Default for OdometryDrift {
    fn default() -> Self {
        Self {
            state_std_devs: [0.1, 0.1, 0.1],
            drift_xy: 0.05,
            drift_theta: 0.05,
        }
    }
}

impl OdometryDrift {
    pub fn initial_covariance(&self) -> Covariance2D {
        let [x, y, theta] = self.state_std_devs;
        Covariance2D::from_std_devs(x, y, theta)
    }

    /// Covariance after moving by `delta`.
    pub fn grow(&self, covariance: &Covariance2D, delta: &Pose2D) -> Covariance2D {
        let linear = self.drift_xy * self.drift_xy * delta.translation_norm();
        let angular = self.drift_theta * self.drift_theta * delta.theta.abs();
        Covariance2D {
            xx: covariance.xx + linear,
            yy: covariance.yy + linear,
            tt: covariance.tt + angular,
        }
    }
}

/// Ring buffer of [`BufferEntry`] ordered by timestamp.
///
/// Holds at least one entry once seeded.  Entries older than `horizon`
/// behind the newest are pruned, except the one spanning the horizon
/// boundary, which anchors any replay that starts inside the window.
#[derive(Debug, Clone)]
pub struct OdometryBuffer {
    entries: VecDeque<BufferEntry>,
    horizon: f64,
    capacity: usize,
}

impl OdometryBuffer {
    pub fn new(horizon: f64, capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            horizon,
            capacity: capacity.max(1),
        }
    }

    /// Drop everything and start again from a single anchor.
    pub fn seed(&mut self, anchor: BufferEntry) {
        self.entries.clear();
        self.entries.push_back(anchor);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn oldest(&self) -> Option<&BufferEntry> {
        self.entries.front()
    }

    pub fn latest(&self) -> Option<&BufferEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferEntry> {
        self.entries.iter()
    }

    /// Whether a measurement captured at `timestamp` can still be replayed.
    pub fn covers(&self, timestamp: f64) -> bool {
        match (self.oldest(), self.latest()) {
            (Some(oldest), Some(latest)) => {
                timestamp >= oldest.timestamp && timestamp >= latest.timestamp - self.horizon
            }
            _ => false,
        }
    }

    /// Append a new newest entry and prune.
    pub fn push(&mut self, entry: BufferEntry) {
        self.entries.push_back(entry);
        self.prune();
    }

    fn prune(&mut self) {
        let Some(latest) = self.latest().map(|e| e.timestamp) else {
            return;
        };
        let cutoff = latest - self.horizon;
        while self.entries.len() > 1 && self.entries[1].timestamp <= cutoff {
            self.entries.pop_front();
        }
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Splice a correction in at `timestamp`, clamped to the newest entry.
    ///
    /// The delta of the entry after the insertion point is split so that
    /// `before ⊕ after` equals the original delta.  Returns the index of the
    /// correction entry, or `None` when the buffer does not cover
    /// `timestamp`.  The inserted entry's pose and covariance are
    /// placeholders until [`replay_from`][Self::replay_from] runs.
    pub fn insert_correction(&mut self, timestamp: f64, correction: Correction) -> Option<usize> {
        if !self.covers(timestamp) {
            return None;
        }
        let newest = self.latest()?.timestamp;
        let t = timestamp.min(newest);

        // After any entry sharing the same timestamp, so simultaneous
        // corrections apply in arrival order.
        let index = self.entries.partition_point(|e| e.timestamp <= t);
        let prev = self.entries[index - 1];

        let delta = match self.entries.get_mut(index) {
            Some(next) => {
                let span = next.timestamp - prev.timestamp;
                let fraction = if span > 0.0 { ((t - prev.timestamp) / span).clamp(0.0, 1.0) } else { 0.0 };
                let before = Pose2D::identity().interpolate(&next.delta, fraction);
                next.delta = before.inverse().compose(&next.delta);
                before
            }
            None => Pose2D::identity(),
        };

        self.entries.insert(
            index,
            BufferEntry {
                timestamp: t,
                delta,
                pose: prev.pose,
                covariance: prev.covariance,
                correction: Some(correction),
            },
        );
        // The entry preceding the correction must survive as its replay base.
        if self.entries.len() > self.capacity && index >= 2 {
            self.entries.pop_front();
            return Some(index - 1);
        }
        Some(index)
    }

    /// Re-derive every entry from `start` onward.
    ///
    /// `step` receives the previous entry and the entry being derived and
    /// returns its pose and covariance.  Index 0 is the anchor and is never
    /// re-derived.
    pub fn replay_from<F>(&mut self, start: usize, mut step: F)
    where
        F: FnMut(&BufferEntry, &BufferEntry) -> (Pose2D, Covariance2D),
    {
        for i in start.max(1)..self.entries.len() {
            let prev = self.entries[i - 1];
            let (pose, covariance) = step(&prev, &self.entries[i]);
            let entry = &mut self.entries[i];
            entry.pose = pose;
            entry.covariance = covariance;
        }
    }
}
