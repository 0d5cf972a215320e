//! Subsystems driven by the [`UpdateManager`](crate::update_manager::UpdateManager).
//!
//! - [`Roller`]: one actuator, commanded through a cloneable [`RollerHandle`].
//! - [`Localizer`]: feeds drivetrain odometry into the shared
//!   [`PoseEstimator`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rover_hal::Mechanism;
use rover_perception::PoseEstimator;
use rover_types::{MechanismInputs, OdometrySample};
use tracing::{info, warn};

use crate::update_manager::{TickContext, Updatable};

// ─────────────────────────────────────────────────────────────────────────────
// Roller
// ─────────────────────────────────────────────────────────────────────────────

/// What a roller should be doing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RollerGoal {
    #[default]
    Idle,
    /// Open-loop volts.
    Voltage(f64),
    /// Closed-loop mechanism rotations per second.
    Velocity(f64),
}

#[derive(Debug, Default)]
struct RollerShared {
    goal: RollerGoal,
    inputs: MechanismInputs,
}

/// Command and telemetry access to one [`Roller`] from outside the control
/// loop.
#[derive(Debug, Clone)]
pub struct RollerHandle {
    name: Arc<str>,
    shared: Arc<Mutex<RollerShared>>,
}

impl RollerHandle {
    fn lock(&self) -> MutexGuard<'_, RollerShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Takes effect at the next tick's `compute` phase.
    pub fn set_goal(&self, goal: RollerGoal) {
        self.lock().goal = goal;
    }

    pub fn goal(&self) -> RollerGoal {
        self.lock().goal
    }

    /// Snapshot taken in the latest `read_inputs` phase.
    pub fn inputs(&self) -> MechanismInputs {
        self.lock().inputs
    }
}

/// A single-motor roller (intake, end effector, …).
pub struct Roller {
    mechanism: Box<dyn Mechanism>,
    handle: RollerHandle,
    goal: RollerGoal,
    connected: bool,
}

impl Roller {
    pub fn new(mechanism: Box<dyn Mechanism>) -> Self {
        let handle = RollerHandle {
            name: Arc::from(mechanism.name()),
            shared: Arc::new(Mutex::new(RollerShared::default())),
        };
        info!(roller = %handle.name, "roller registered");
        Self {
            mechanism,
            handle,
            goal: RollerGoal::Idle,
            connected: true,
        }
    }

    pub fn handle(&self) -> RollerHandle {
        self.handle.clone()
    }
}

impl Updatable for Roller {
    fn name(&self) -> &str {
        self.mechanism.name()
    }

    fn read_inputs(&mut self, _ctx: &TickContext) {
        let inputs = self.mechanism.update_inputs();
        if inputs.connected != self.connected {
            if inputs.connected {
                info!(roller = %self.handle.name, "mechanism reconnected");
            } else {
                warn!(roller = %self.handle.name, "mechanism disconnected, inputs are stale");
            }
            self.connected = inputs.connected;
        }
        self.handle.lock().inputs = inputs;
    }

    fn compute(&mut self, _ctx: &TickContext) {
        self.goal = self.handle.goal();
    }

    fn write_outputs(&mut self, _ctx: &TickContext) {
        match self.goal {
            RollerGoal::Idle => self.mechanism.stop(),
            RollerGoal::Voltage(volts) => self.mechanism.set_voltage(volts),
            RollerGoal::Velocity(rps) => self.mechanism.set_velocity(rps),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Localizer
// ─────────────────────────────────────────────────────────────────────────────

/// Drivetrain boundary: yields the motion since the previous call.
pub trait OdometrySource: Send {
    fn sample(&mut self, timestamp: f64) -> Option<OdometrySample>;
}

/// Pulls one odometry sample per tick into the pose estimator.
pub struct Localizer {
    source: Box<dyn OdometrySource>,
    estimator: Arc<PoseEstimator>,
}

impl Localizer {
    pub fn new(source: Box<dyn OdometrySource>, estimator: Arc<PoseEstimator>) -> Self {
        Self { source, estimator }
    }
}

impl Updatable for Localizer {
    fn name(&self) -> &str {
        "localizer"
    }

    fn read_inputs(&mut self, ctx: &TickContext) {
        if let Some(sample) = self.source.sample(ctx.timestamp) {
            self.estimator.add_odometry_sample(sample);
        }
    }
}
