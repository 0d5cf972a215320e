//! `rover-runtime` – The control loop and the subsystems it drives.
//!
//! # Modules
//!
//! - [`update_manager`] – [`UpdateManager`]: fixed-period, three-phase tick
//!   over every registered [`Updatable`].
//! - [`subsystems`] – [`Roller`] and [`Localizer`].
//! - [`drivetrain`] – [`SimDrivetrain`], a simulated [`OdometrySource`].
//! - [`telemetry`] – `tracing` subscriber and OTLP exporter setup.

pub mod drivetrain;
pub mod subsystems;
pub mod telemetry;
pub mod update_manager;

pub use drivetrain::SimDrivetrain;
pub use subsystems::{Localizer, OdometrySource, Roller, RollerGoal, RollerHandle};
pub use update_manager::{
    Clock, MonotonicClock, TickContext, TickStats, Updatable, UpdateManager, UpdateManagerBuilder,
};
