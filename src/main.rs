//! gati-odom - Motor odometry daemon
//!
//! Converts raw incremental encoder ticks from the drive motor into velocity
//! estimates and an absolute position counter, republished over TCP for a
//! downstream state estimator.
//!
//! ## Channels
//!
//! - **TCP feed (port 5556)**: inbound encoder events, length-prefixed
//! - **TCP streaming (port 5555)**: outbound "odom" and "ticks" topics
//!
//! A watchdog substitutes zero-velocity estimates whenever the feed goes
//! silent past the configured deadline, so consumers never integrate a
//! stale velocity.

use gati_odom::app::OdomApp;
use gati_odom::config::AppConfig;
use gati_odom::error::Result;
use std::env;
use std::path::Path;

/// Default config location on the robot
const DEFAULT_CONFIG_PATH: &str = "/etc/gati-odom.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `gati-odom <path>` (positional)
/// - `gati-odom --config <path>` (flag-based)
/// - `gati-odom -c <path>` (short flag)
///
/// Returns None when no path was given.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

/// Load the configuration and describe where it came from
///
/// An explicitly given path must exist; the default path falls back to
/// built-in defaults when absent so the daemon can run on a bare system.
fn load_config() -> Result<(AppConfig, String)> {
    match parse_config_path() {
        Some(path) => {
            let config = AppConfig::from_file(&path)?;
            Ok((config, path))
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            let config = AppConfig::from_file(DEFAULT_CONFIG_PATH)?;
            Ok((config, DEFAULT_CONFIG_PATH.to_string()))
        }
        None => Ok((AppConfig::default(), "built-in defaults".to_string())),
    }
}

fn main() -> Result<()> {
    let (config, config_source) = load_config()?;

    // Initialize logger; RUST_LOG still overrides the configured level
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    );
    if config.logging.output == "stdout" {
        builder.target(env_logger::Target::Stdout);
    }
    builder.init();

    log::info!("gati-odom v0.3.0 starting...");
    log::info!("Using config: {}", config_source);
    log::info!(
        "Calibration: {} ticks/m, frame '{}', deadline {} ms",
        config.odometry.ticks_per_meter,
        config.odometry.frame_id,
        config.watchdog.deadline_timeout_ms
    );

    let mut app = OdomApp::new(config)?;
    app.run()?;

    log::info!("gati-odom stopped");
    Ok(())
}
