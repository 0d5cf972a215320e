//! `rover-cli` – robot process entry point.
//!
//! This binary builds the whole ownership graph once and then hands control
//! to the update loop.  It:
//!
//! 1. Loads `rover.toml` (or the path given as the first argument) and
//!    validates it.
//! 2. Builds the pose estimator, the localizer, and one roller per
//!    configured mechanism, and registers them with the update manager.
//! 3. Spawns one vision worker thread per camera.
//! 4. Runs the control loop until **Ctrl-C** or `--ticks N`, then stops every
//!    roller and reports the final pose.
//!
//! Without a vendor motor-controller or camera driver linked in, real
//! mechanisms run against the firmware emulator and cameras render from the
//! simulated ground truth.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use colored::Colorize;
use rover_hal::{DcMotor, EmulatedMotorController, MotorController, build_mechanism};
use rover_perception::{GroundTruth, PoseEstimator, SimVisionIo, TagLayout, VisionSource};
use rover_runtime::telemetry::{LogFormat, init_tracing};
use rover_runtime::{
    Clock, Localizer, MonotonicClock, Roller, RollerGoal, RollerHandle, SimDrivetrain,
    UpdateManagerBuilder,
};
use rover_types::{CameraConfig, RealMechanismConfig, RoverError};
use tracing::{info, warn};

use crate::config::Config;

/// Rotor-side inertia the firmware emulator spins when no hardware is
/// attached.
const EMULATED_ROTOR_INERTIA: f64 = 0.0005;

struct Args {
    config_path: PathBuf,
    explicit_path: bool,
    ticks: Option<u64>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, RoverError> {
    let mut parsed = Args {
        config_path: PathBuf::from(config::DEFAULT_CONFIG_PATH),
        explicit_path: false,
        ticks: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ticks" => {
                let value = args
                    .next()
                    .ok_or_else(|| RoverError::Config("--ticks needs a value".to_string()))?;
                let ticks = value
                    .parse::<u64>()
                    .map_err(|e| RoverError::Config(format!("invalid --ticks `{value}`: {e}")))?;
                parsed.ticks = Some(ticks);
            }
            flag if flag.starts_with("--") => {
                return Err(RoverError::Config(format!("unknown flag `{flag}`")));
            }
            path => {
                parsed.config_path = PathBuf::from(path);
                parsed.explicit_path = true;
            }
        }
    }
    Ok(parsed)
}

fn main() -> ExitCode {
    // Set ROVER_LOG_FORMAT=json for newline-delimited JSON logs.
    let _guard = init_tracing("rover", LogFormat::from_env());

    print_banner();

    match parse_args(std::env::args().skip(1)).and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Config, RoverError> {
    match config::load_from(&args.config_path)? {
        Some(cfg) => {
            println!(
                "  Config loaded from {}",
                args.config_path.display().to_string().bold()
            );
            Ok(cfg)
        }
        None if args.explicit_path => Err(RoverError::Config(format!(
            "config file {} not found",
            args.config_path.display()
        ))),
        None => {
            println!(
                "  {} not found, using the built-in robot configuration.",
                args.config_path.display().to_string().dimmed()
            );
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

fn run(args: Args) -> Result<(), RoverError> {
    let cfg = load_config(&args)?;
    cfg.validate()?;

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the control loop …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Ownership graph ───────────────────────────────────────────────────
    let clock = MonotonicClock::new();
    let start = cfg.simulation.start_pose();
    let truth = Arc::new(GroundTruth::new(clock.now(), start));
    let estimator = Arc::new(PoseEstimator::new(cfg.estimator_config(), start, clock.now())?);
    let drivetrain =
        SimDrivetrain::new(truth.clone(), cfg.simulation.chassis_twist(), cfg.simulation.wheel_slip);

    let period_secs = cfg.period().as_secs_f64();
    let mut builder = UpdateManagerBuilder::new(cfg.period())
        .register(Box::new(Localizer::new(Box::new(drivetrain), estimator.clone())));
    let mut rollers: Vec<RollerHandle> = Vec::new();
    for (name, mechanism_cfg) in &cfg.mechanisms {
        let mechanism = build_mechanism(name, mechanism_cfg, period_secs, |real| {
            Ok(emulated_device(real, period_secs))
        })?;
        let roller = Roller::new(mechanism);
        rollers.push(roller.handle());
        builder = builder.register(Box::new(roller));
    }
    let mut manager = builder.build()?;

    // ── Vision workers ────────────────────────────────────────────────────
    let layout = Arc::new(cfg.tag_layout());
    let mut workers = Vec::new();
    for (camera_id, camera) in cfg.camera_configs().into_iter().enumerate() {
        workers.push(spawn_vision_worker(
            camera_id,
            camera,
            &cfg,
            truth.clone(),
            layout.clone(),
            estimator.clone(),
            shutdown.clone(),
        )?);
    }

    for handle in &rollers {
        handle.set_goal(RollerGoal::Velocity(cfg.simulation.roller_goal_rps));
    }

    println!(
        "  {} {} camera(s), {} roller(s), {} ms period",
        "Running:".green().bold(),
        workers.len(),
        rollers.len(),
        manager.period().as_millis()
    );
    println!("  Press {} to stop.\n", "Ctrl-C".bold());

    // ── Control loop ──────────────────────────────────────────────────────
    match args.ticks {
        Some(n) => manager.run_ticks(n, &clock, &shutdown),
        None => manager.run(&clock, &shutdown),
    }

    // Leave every actuator at 0 V before exiting.
    for handle in &rollers {
        handle.set_goal(RollerGoal::Idle);
    }
    manager.tick(clock.now());

    shutdown.store(true, Ordering::SeqCst);
    for worker in workers {
        if worker.join().is_err() {
            warn!("vision worker panicked");
        }
    }

    report(&estimator, &truth, &rollers, manager.stats().ticks);
    Ok(())
}

fn emulated_device(real: &RealMechanismConfig, period: f64) -> Box<dyn MotorController> {
    info!(
        bus = %real.bus,
        id = real.id,
        "no motor-controller driver linked, using the firmware emulator"
    );
    Box::new(EmulatedMotorController::new(
        DcMotor::kraken_x60_foc(1),
        EMULATED_ROTOR_INERTIA,
        period,
    ))
}

fn spawn_vision_worker(
    camera_id: usize,
    camera: CameraConfig,
    cfg: &Config,
    truth: Arc<GroundTruth>,
    layout: Arc<TagLayout>,
    estimator: Arc<PoseEstimator>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, RoverError> {
    let io = SimVisionIo::new(
        truth,
        camera.extrinsic,
        layout.clone(),
        cfg.simulation.camera_max_range_m,
        Duration::from_millis(cfg.simulation.camera_latency_ms),
    );
    let frame_interval = Duration::from_millis(cfg.simulation.camera_frame_ms);
    let thread_name = format!("vision-{}", camera.instance_name);
    let mut source = VisionSource::new(camera_id, camera, Box::new(io), layout);

    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            info!(camera = source.camera_id(), name = source.name(), "vision worker started");
            while !shutdown.load(Ordering::SeqCst) {
                for obs in source.poll() {
                    estimator.add_vision_observation(obs);
                }
                thread::sleep(frame_interval);
            }
        })
        .map_err(|e| RoverError::hardware(thread_name, e.to_string()))
}

fn report(
    estimator: &PoseEstimator,
    truth: &GroundTruth,
    rollers: &[RollerHandle],
    ticks: u64,
) {
    let estimate = estimator.latest_estimate();
    let (_, true_pose) = truth.get();
    let stats = estimator.stats();
    let error = (estimate.pose.x - true_pose.x).hypot(estimate.pose.y - true_pose.y);

    info!(
        ticks,
        x = estimate.pose.x,
        y = estimate.pose.y,
        theta = estimate.pose.theta,
        error_m = error,
        accepted = stats.accepted,
        rejected = stats.total_rejected(),
        stale = stats.stale,
        disordered_odometry = stats.disordered_odometry,
        "final pose estimate"
    );

    println!();
    println!("  {}", "Final pose".bold());
    println!(
        "    estimate  x={:.3} m  y={:.3} m  θ={:.1}°",
        estimate.pose.x,
        estimate.pose.y,
        estimate.pose.theta.to_degrees()
    );
    println!(
        "    truth     x={:.3} m  y={:.3} m  θ={:.1}°",
        true_pose.x,
        true_pose.y,
        true_pose.theta.to_degrees()
    );
    println!("    error     {}", format!("{error:.3} m").cyan());
    println!(
        "  Vision: {} accepted, {} rejected ({} stale)",
        stats.accepted.to_string().green(),
        stats.total_rejected().to_string().yellow(),
        stats.stale
    );
    for handle in rollers {
        let inputs = handle.inputs();
        println!(
            "  Roller {}: {:.1} rot/s, {:.2} V{}",
            handle.name().bold(),
            inputs.velocity_rotations_per_sec,
            inputs.applied_volts,
            if inputs.connected { "" } else { " (disconnected)" }
        );
    }
    println!();
}

fn print_banner() {
    println!();
    println!("{}", r#"    ____                       "#.bold().cyan());
    println!("{}", r#"   / __ \____ _   _____  _____ "#.bold().cyan());
    println!("{}", r#"  / /_/ / __ \ | / / _ \/ ___/ "#.bold().cyan());
    println!("{}", r#" / _, _/ /_/ / |/ /  __/ /     "#.bold().cyan());
    println!("{}", r#"/_/ |_|\____/|___/\___/_/      "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Pose estimation and mechanism control");
    println!();
}
