//! Message types for TCP streaming.
//!
//! This module defines the data structures used for bidirectional communication:
//! - Velocity estimates (outbound): Converted odometry with uncertainty
//! - Tick counts (outbound): Absolute encoder accumulator snapshots
//! - Encoder events (inbound): Raw tick/duration pairs from the sensor

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Topic for velocity estimates
pub const TOPIC_ODOM: &str = "odom";

/// Topic for absolute tick counts
pub const TOPIC_TICKS: &str = "ticks";

/// Raw encoder reading received on the feed channel
///
/// One event covers one accumulation window on the sensor side. The JSON
/// field names (`encoder_ticks`, `duration`) are the external contract and
/// must not change; the Rust field names carry the units instead.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderEvent {
    /// Signed tick delta for this window (negative = reverse rotation)
    #[serde(rename = "encoder_ticks")]
    pub ticks: i32,

    /// Accumulation window in microseconds
    ///
    /// A zero duration makes the velocity undefined; such events still
    /// carry valid tick data but produce no velocity estimate.
    #[serde(rename = "duration")]
    pub duration_us: u32,
}

/// Velocity estimate published on the "odom" topic
///
/// Published on every encoder event and on every watchdog timeout. Only the
/// linear x component is ever nonzero; the covariance tells downstream
/// filters which axes to ignore.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VelocityEstimate {
    /// Timestamp in microseconds since epoch
    pub timestamp: u64,

    /// Monotonically increasing publish counter (wraps at u32::MAX)
    ///
    /// Shared between event-triggered and timeout-triggered publishes, so
    /// consumers see a single strictly increasing sequence.
    pub seq: u32,

    /// Reference frame the velocity is expressed in
    pub frame_id: String,

    /// Linear velocity [x, y, z] in m/s
    pub linear: [f64; 3],

    /// Angular velocity [roll, pitch, yaw] in rad/s (always zero)
    pub angular: [f64; 3],

    /// Covariance over (x, y, z, roll, pitch, yaw)
    pub covariance: [[f64; 6]; 6],
}

impl VelocityEstimate {
    /// Forward velocity component in m/s
    pub fn velocity_x(&self) -> f64 {
        self.linear[0]
    }
}

/// Absolute tick counter published on the "ticks" topic
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickCount {
    /// Timestamp in microseconds since epoch
    pub timestamp: u64,

    /// Running sum of all tick deltas since startup (wrapping i32)
    pub ticks: i32,
}

/// Current wall-clock time in microseconds since epoch
pub fn epoch_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
