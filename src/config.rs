//! Configuration for the gati-odom daemon
//!
//! Loads configuration from a TOML file. Values are read once at startup and
//! never mutated; `validate()` rejects unusable values before any thread
//! starts.

use crate::error::{Error, Result};
use crate::streaming::wire::WireFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub odometry: OdometryConfig,
    pub watchdog: WatchdogConfig,
    pub streaming: StreamingConfig,
    pub logging: LoggingConfig,
    /// Simulated encoder feed; absent section means disabled
    #[serde(default)]
    pub sim: SimConfig,
}

/// Odometry calibration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OdometryConfig {
    /// Calibration constant: encoder ticks per meter of travel
    ///
    /// Measured empirically by driving a known distance and counting ticks.
    /// The default 310 is the calibrated value for the stock drive motor.
    pub ticks_per_meter: f64,

    /// Reference frame stamped on every velocity estimate
    pub frame_id: String,

    /// Fixed variance reported for the measured x axis
    ///
    /// Everything this sensor cannot observe is pinned to a large sentinel
    /// instead (see `estimator::UNMEASURED_VARIANCE`).
    pub uncertainty_fixed: f64,
}

/// Feed silence watchdog
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchdogConfig {
    /// Maximum silence before a zero-velocity estimate is substituted (ms)
    pub deadline_timeout_ms: u64,

    /// Watchdog check cadence (ms); keep well below the deadline
    pub poll_interval_ms: u64,
}

impl WatchdogConfig {
    /// Silence deadline as a Duration
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_timeout_ms)
    }

    /// Poll cadence as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// TCP streaming configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// TCP bind address for outbound estimate and tick broadcasts
    ///
    /// Examples:
    /// - `0.0.0.0:5555` - Bind to all interfaces on port 5555
    /// - `127.0.0.1:5555` - Localhost only
    pub pub_address: String,

    /// TCP bind address for the inbound encoder event feed
    pub feed_address: String,

    /// Payload encoding on both channels: "json" or "postcard"
    pub wire_format: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log output (stdout or stderr)
    pub output: String,
}

/// Simulated encoder feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Replace the TCP feed with a synthetic motion profile
    pub enabled: bool,
    /// Event emission period (ms)
    pub interval_ms: u64,
    /// Cruise speed of the synthetic profile (m/s)
    pub velocity_mps: f64,
    /// Multiplicative slip jitter amplitude (0.0 = deterministic)
    pub jitter: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 50,
            velocity_mps: 0.5,
            jitter: 0.0,
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// - `path`: Path to TOML configuration file
    ///
    /// # Returns
    /// Parsed configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Built-in default configuration
    ///
    /// Carries the calibrated defaults for the stock drive motor.
    /// Suitable for testing and development; production deployments should
    /// use a proper TOML configuration file.
    pub fn builtin_defaults() -> Self {
        Self {
            odometry: OdometryConfig {
                ticks_per_meter: 310.0,
                frame_id: "base_link".to_string(),
                uncertainty_fixed: 1e-3,
            },
            watchdog: WatchdogConfig {
                deadline_timeout_ms: 100,
                poll_interval_ms: 20,
            },
            streaming: StreamingConfig {
                pub_address: "0.0.0.0:5555".to_string(),
                feed_address: "0.0.0.0:5556".to_string(),
                wire_format: "json".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                output: "stderr".to_string(),
            },
            sim: SimConfig::default(),
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject unusable values before any thread starts
    ///
    /// Called once at startup; a failure here is fatal.
    pub fn validate(&self) -> Result<()> {
        if !self.odometry.ticks_per_meter.is_finite() || self.odometry.ticks_per_meter <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "ticks_per_meter must be positive and finite, got {}",
                self.odometry.ticks_per_meter
            )));
        }
        if !self.odometry.uncertainty_fixed.is_finite() || self.odometry.uncertainty_fixed <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "uncertainty_fixed must be positive and finite, got {}",
                self.odometry.uncertainty_fixed
            )));
        }
        if self.watchdog.deadline_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "deadline_timeout_ms must be nonzero".to_string(),
            ));
        }
        if self.watchdog.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "poll_interval_ms must be nonzero".to_string(),
            ));
        }
        self.streaming.wire_format.parse::<WireFormat>()?;
        match self.logging.output.as_str() {
            "stdout" | "stderr" => {}
            other => {
                return Err(Error::InvalidConfig(format!(
                    "logging output must be \"stdout\" or \"stderr\", got \"{}\"",
                    other
                )));
            }
        }
        if self.sim.enabled && self.sim.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "sim interval_ms must be nonzero when the sim feed is enabled".to_string(),
            ));
        }

        if self.watchdog.poll_interval_ms > self.watchdog.deadline_timeout_ms / 2 {
            log::warn!(
                "Watchdog poll interval ({} ms) is coarse next to the {} ms deadline; timeout publishes may lag",
                self.watchdog.poll_interval_ms,
                self.watchdog.deadline_timeout_ms
            );
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::builtin_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::builtin_defaults();
        assert_eq!(config.odometry.ticks_per_meter, 310.0);
        assert_eq!(config.odometry.frame_id, "base_link");
        assert_eq!(config.odometry.uncertainty_fixed, 1e-3);
        assert_eq!(config.watchdog.deadline_timeout_ms, 100);
        assert_eq!(config.watchdog.poll_interval_ms, 20);
        assert_eq!(config.streaming.pub_address, "0.0.0.0:5555");
        assert_eq!(config.streaming.feed_address, "0.0.0.0:5556");
        assert!(!config.sim.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_helpers() {
        let config = AppConfig::builtin_defaults();
        assert_eq!(config.watchdog.deadline(), Duration::from_millis(100));
        assert_eq!(config.watchdog.poll_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::builtin_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[odometry]"));
        assert!(toml_string.contains("[watchdog]"));
        assert!(toml_string.contains("[streaming]"));
        assert!(toml_string.contains("[logging]"));

        // Should contain key values
        assert!(toml_string.contains("ticks_per_meter = 310.0"));
        assert!(toml_string.contains("frame_id = \"base_link\""));
        assert!(toml_string.contains("deadline_timeout_ms = 100"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[odometry]
ticks_per_meter = 4464.0
frame_id = "odom_frame"
uncertainty_fixed = 0.01

[watchdog]
deadline_timeout_ms = 250
poll_interval_ms = 50

[streaming]
pub_address = "127.0.0.1:5555"
feed_address = "127.0.0.1:5556"
wire_format = "postcard"

[logging]
level = "debug"
output = "stdout"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.odometry.ticks_per_meter, 4464.0);
        assert_eq!(config.odometry.frame_id, "odom_frame");
        assert_eq!(config.watchdog.deadline_timeout_ms, 250);
        assert_eq!(config.streaming.wire_format, "postcard");
        assert_eq!(config.logging.level, "debug");
        // Missing [sim] section falls back to disabled
        assert!(!config.sim.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let mut config = AppConfig::builtin_defaults();
        config.odometry.ticks_per_meter = 412.5;
        config.sim.enabled = true;

        let path = std::env::temp_dir().join(format!("gati-odom-test-{}.toml", std::process::id()));
        config.to_file(&path).unwrap();
        let loaded = AppConfig::from_file(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.odometry.ticks_per_meter, 412.5);
        assert!(loaded.sim.enabled);
        assert_eq!(loaded.streaming.pub_address, config.streaming.pub_address);
    }

    #[test]
    fn test_validate_rejects_bad_calibration() {
        let mut config = AppConfig::builtin_defaults();
        config.odometry.ticks_per_meter = 0.0;
        assert!(config.validate().is_err());

        config.odometry.ticks_per_meter = -310.0;
        assert!(config.validate().is_err());

        config.odometry.ticks_per_meter = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_uncertainty() {
        let mut config = AppConfig::builtin_defaults();
        config.odometry.uncertainty_fixed = 0.0;
        assert!(config.validate().is_err());

        config.odometry.uncertainty_fixed = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timings() {
        let mut config = AppConfig::builtin_defaults();
        config.watchdog.deadline_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::builtin_defaults();
        config.watchdog.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::builtin_defaults();
        config.sim.enabled = true;
        config.sim.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_wire_format() {
        let mut config = AppConfig::builtin_defaults();
        config.streaming.wire_format = "protobuf".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_output() {
        let mut config = AppConfig::builtin_defaults();
        config.logging.output = "/var/log/odom.log".to_string();
        assert!(config.validate().is_err());
    }
}
