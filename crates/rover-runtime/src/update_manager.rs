//! [`UpdateManager`] – the fixed-rate, three-phase control loop.
//!
//! Every registered [`Updatable`] sees the same tick split into three
//! phases, each run over all components in registration order before the
//! next phase starts:
//!
//! 1. `read_inputs` – sample hardware and sensors;
//! 2. `compute` – decide what to do;
//! 3. `write_outputs` – command actuators.
//!
//! Components can therefore rely on every input of the tick being fresh
//! before any output is written.
//!
//! Registration only exists on [`UpdateManagerBuilder`]; the component list
//! is frozen once the manager is built.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use rover_runtime::update_manager::{TickContext, Updatable, UpdateManagerBuilder};
//!
//! struct Counter(u32);
//!
//! impl Updatable for Counter {
//!     fn name(&self) -> &str { "counter" }
//!     fn compute(&mut self, _ctx: &TickContext) { self.0 += 1; }
//! }
//!
//! let mut manager = UpdateManagerBuilder::new(Duration::from_millis(20))
//!     .register(Box::new(Counter(0)))
//!     .build()
//!     .expect("positive period");
//! manager.tick(0.0);
//! assert_eq!(manager.stats().ticks, 1);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rover_types::RoverError;
use tracing::{info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Component contract
// ─────────────────────────────────────────────────────────────────────────────

/// What every component learns about the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// Seconds on the manager's clock at the start of the tick.
    pub timestamp: f64,
    /// Nominal loop period in seconds.
    pub period: f64,
}

/// A component driven by the [`UpdateManager`].  All phases default to
/// doing nothing.
pub trait Updatable: Send {
    fn name(&self) -> &str;

    fn read_inputs(&mut self, _ctx: &TickContext) {}

    fn compute(&mut self, _ctx: &TickContext) {}

    fn write_outputs(&mut self, _ctx: &TickContext) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Clocks
// ─────────────────────────────────────────────────────────────────────────────

/// Source of tick timestamps, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Seconds since construction, from [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Collects components before the loop starts.
pub struct UpdateManagerBuilder {
    period: Duration,
    components: Vec<Box<dyn Updatable>>,
}

impl UpdateManagerBuilder {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            components: Vec::new(),
        }
    }

    /// Append `component`; phases run in registration order.
    pub fn register(mut self, component: Box<dyn Updatable>) -> Self {
        self.components.push(component);
        self
    }

    /// # Errors
    ///
    /// [`RoverError::InvalidConfig`] for a zero period.
    pub fn build(self) -> Result<UpdateManager, RoverError> {
        if self.period.is_zero() {
            return Err(RoverError::InvalidConfig(
                "control period must be positive".to_string(),
            ));
        }
        let names: Vec<&str> = self.components.iter().map(|c| c.name()).collect();
        info!(
            period_ms = self.period.as_secs_f64() * 1000.0,
            components = ?names,
            "update manager built"
        );
        Ok(UpdateManager {
            period: self.period,
            components: self.components,
            stats: TickStats::default(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Loop timing counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickStats {
    pub ticks: u64,
    /// Ticks that finished after the next deadline.
    pub overruns: u64,
    /// Deadlines skipped to catch up after overruns.
    pub skipped: u64,
    pub max_tick_secs: f64,
}

pub struct UpdateManager {
    period: Duration,
    components: Vec<Box<dyn Updatable>>,
    stats: TickStats,
}

impl UpdateManager {
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Run one tick: all `read_inputs`, then all `compute`, then all
    /// `write_outputs`.
    pub fn tick(&mut self, timestamp: f64) {
        let ctx = TickContext {
            timestamp,
            period: self.period.as_secs_f64(),
        };
        for c in self.components.iter_mut() {
            c.read_inputs(&ctx);
        }
        for c in self.components.iter_mut() {
            c.compute(&ctx);
        }
        for c in self.components.iter_mut() {
            c.write_outputs(&ctx);
        }
        self.stats.ticks += 1;
    }

    /// Tick at the fixed period until `shutdown` is set.
    pub fn run(&mut self, clock: &dyn Clock, shutdown: &AtomicBool) {
        self.run_until(clock, shutdown, None);
    }

    /// Like [`run`][Self::run], stopping after at most `ticks` ticks.
    pub fn run_ticks(&mut self, ticks: u64, clock: &dyn Clock, shutdown: &AtomicBool) {
        self.run_until(clock, shutdown, Some(ticks));
    }

    fn run_until(&mut self, clock: &dyn Clock, shutdown: &AtomicBool, limit: Option<u64>) {
        let period_secs = self.period.as_secs_f64();
        let mut completed = 0u64;
        let mut deadline = Instant::now();
        info!(period_ms = period_secs * 1000.0, limit = ?limit, "control loop started");

        while !shutdown.load(Ordering::SeqCst) && limit.is_none_or(|n| completed < n) {
            let started = Instant::now();
            self.tick(clock.now());
            completed += 1;
            let elapsed = started.elapsed().as_secs_f64();
            self.stats.max_tick_secs = self.stats.max_tick_secs.max(elapsed);

            deadline += self.period;
            let now = Instant::now();
            if now > deadline {
                // Skip the missed deadlines rather than bursting to catch up.
                let missed = ((now - deadline).as_secs_f64() / period_secs).ceil().max(1.0) as u32;
                deadline += self.period * missed;
                self.stats.overruns += 1;
                self.stats.skipped += u64::from(missed);
                warn!(
                    tick = self.stats.ticks,
                    elapsed_ms = elapsed * 1000.0,
                    period_ms = period_secs * 1000.0,
                    skipped = missed,
                    "control tick overran its period"
                );
            }
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
        }

        info!(
            ticks = self.stats.ticks,
            overruns = self.stats.overruns,
            max_tick_ms = self.stats.max_tick_secs * 1000.0,
            "control loop stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Appends `"<name>:<phase>"` to a shared log.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn push(&self, phase: &str) {
            self.log.lock().unwrap().push(format!("{}:{phase}", self.name));
        }
    }

    impl Updatable for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn read_inputs(&mut self, _: &TickContext) {
            self.push("read");
        }
        fn compute(&mut self, _: &TickContext) {
            self.push("compute");
        }
        fn write_outputs(&mut self, _: &TickContext) {
            self.push("write");
        }
    }

    struct Slow(Duration);

    impl Updatable for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn compute(&mut self, _: &TickContext) {
            thread::sleep(self.0);
        }
    }

    struct FixedClock(f64);

    impl Clock for FixedClock {
        fn now(&self) -> f64 {
            self.0
        }
    }

    fn recorded(names: &[&'static str]) -> (UpdateManager, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = UpdateManagerBuilder::new(Duration::from_millis(20));
        for &name in names {
            builder = builder.register(Box::new(Recorder {
                name,
                log: log.clone(),
            }));
        }
        (builder.build().unwrap(), log)
    }

    #[test]
    fn phases_run_in_registration_order() {
        let (mut manager, log) = recorded(&["a", "b"]);
        manager.tick(0.0);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:read", "b:read", "a:compute", "b:compute", "a:write", "b:write"]
        );
        assert_eq!(manager.component_names(), vec!["a", "b"]);
        assert_eq!(manager.period(), Duration::from_millis(20));
    }

    #[test]
    fn zero_period_is_rejected() {
        let result = UpdateManagerBuilder::new(Duration::ZERO).build();
        assert!(matches!(result, Err(RoverError::InvalidConfig(_))));
    }

    #[test]
    fn run_ticks_stops_at_the_limit() {
        let (mut manager, log) = recorded(&["a"]);
        let shutdown = AtomicBool::new(false);
        manager.run_ticks(3, &FixedClock(1.0), &shutdown);
        assert_eq!(manager.stats().ticks, 3);
        assert_eq!(log.lock().unwrap().len(), 9);
    }

    #[test]
    fn shutdown_flag_stops_the_loop() {
        let (mut manager, _) = recorded(&["a"]);
        let shutdown = AtomicBool::new(true);
        manager.run(&FixedClock(0.0), &shutdown);
        assert_eq!(manager.stats().ticks, 0);
    }

    #[test]
    fn overruns_are_counted_and_skipped() {
        let mut manager = UpdateManagerBuilder::new(Duration::from_millis(2))
            .register(Box::new(Slow(Duration::from_millis(7))))
            .build()
            .unwrap();
        let shutdown = AtomicBool::new(false);
        let started = Instant::now();
        manager.run_ticks(3, &MonotonicClock::new(), &shutdown);
        let stats = manager.stats();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.overruns, 3);
        assert!(stats.skipped >= 3);
        assert!(stats.max_tick_secs >= 0.007);
        // No burst: three slow ticks take roughly three tick durations.
        assert!(started.elapsed() >= Duration::from_millis(21));
    }

    #[test]
    fn monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        thread::sleep(Duration::from_millis(2));
        assert!(clock.now() > a);
    }
}
