//! gati-odom - Motor odometry library
//!
//! Core components for converting incremental encoder ticks into velocity
//! estimates with liveness guarding and TCP streaming.
//!
//! The estimator itself (`estimator`) is transport-free; the `streaming`
//! module carries events in and estimates out, and `watchdog` keeps the
//! published stream live while the encoder is silent.

pub mod app;
pub mod config;
pub mod error;
pub mod estimator;
pub mod sim;
pub mod streaming;
pub mod watchdog;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use estimator::OdomEstimator;
