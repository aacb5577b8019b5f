//! Encoder event to velocity estimate conversion
//!
//! The estimator owns all odometry state: the absolute tick accumulator, the
//! publish sequence counter and the watchdog clock. Events and deadline
//! checks go through `&mut self` under one mutex, so the clock reset and the
//! staleness comparison can never interleave.

use crate::config::OdometryConfig;
use crate::error::{Error, Result};
use crate::streaming::messages::{EncoderEvent, TickCount, VelocityEstimate, epoch_micros};
use std::time::{Duration, Instant};

/// Variance sentinel for axes this sensor does not measure
///
/// Downstream filters read a huge variance as "ignore this axis"; the
/// cross-terms stay zero because single-motor odometry observes nothing
/// about how the axes relate.
pub const UNMEASURED_VARIANCE: f64 = 999.0;

/// Covariance matrix attached to every velocity estimate
///
/// Diagonal over (x, y, z, roll, pitch, yaw): the measured x axis carries
/// the configured variance, every other axis the unmeasured sentinel.
pub fn covariance_matrix(uncertainty_x: f64) -> [[f64; 6]; 6] {
    let mut cov = [[0.0; 6]; 6];
    for (i, row) in cov.iter_mut().enumerate() {
        row[i] = UNMEASURED_VARIANCE;
    }
    cov[0][0] = uncertainty_x;
    cov
}

/// Outputs produced by a single encoder event
#[derive(Debug)]
pub struct EventUpdate {
    /// Absolute tick counter snapshot; produced for every event
    pub tick_count: TickCount,
    /// Velocity estimate, or why the event could not produce one
    pub estimate: Result<VelocityEstimate>,
}

/// Converts encoder events into velocity estimates and tracks absolute position
pub struct OdomEstimator {
    config: OdometryConfig,

    /// Silence deadline for the watchdog check
    deadline: Duration,

    /// Running sum of all tick deltas since startup (wrapping i32)
    abs_ticks: i32,

    /// Publish counter shared by event and timeout publishes
    seq: u32,

    /// Clock of the most recent velocity publish
    ///
    /// None until the first publish, which makes a fresh estimator stale:
    /// the first watchdog check announces a zero-velocity baseline right
    /// away instead of leaving consumers without data.
    last_publish: Option<Instant>,

    events_seen: u64,
    timeout_publishes: u64,
    malformed_events: u64,

    /// Last velocity log time (for throttling)
    last_velocity_log: Option<Instant>,
}

impl OdomEstimator {
    /// Create a new estimator from calibration and the watchdog deadline
    pub fn new(config: OdometryConfig, deadline: Duration) -> Self {
        log::debug!(
            "OdomEstimator: initialized with ticks_per_meter={:.1}, frame_id={}, deadline={:?}",
            config.ticks_per_meter,
            config.frame_id,
            deadline
        );

        Self {
            config,
            deadline,
            abs_ticks: 0,
            seq: 0,
            last_publish: None,
            events_seen: 0,
            timeout_publishes: 0,
            malformed_events: 0,
            last_velocity_log: None,
        }
    }

    /// Apply one encoder event
    ///
    /// Always advances the absolute tick counter and snapshots it. Produces
    /// a velocity estimate unless the event duration is zero; a zero
    /// duration leaves the velocity undefined, so the estimate is replaced
    /// by a typed error and the watchdog clock keeps measuring silence from
    /// the previous publish.
    ///
    /// `now` is the monotonic arrival time, used only for the watchdog
    /// clock. The published timestamp comes from the wall clock.
    pub fn handle_event(&mut self, event: EncoderEvent, now: Instant) -> EventUpdate {
        self.events_seen += 1;
        let timestamp = epoch_micros();

        self.abs_ticks = self.abs_ticks.wrapping_add(event.ticks);
        let tick_count = TickCount {
            timestamp,
            ticks: self.abs_ticks,
        };

        if event.duration_us == 0 {
            self.malformed_events += 1;
            return EventUpdate {
                tick_count,
                estimate: Err(Error::MalformedEvent(format!(
                    "zero duration for {} ticks, velocity undefined",
                    event.ticks
                ))),
            };
        }

        let distance_m = f64::from(event.ticks) / self.config.ticks_per_meter;
        let elapsed_s = f64::from(event.duration_us) / 1_000_000.0;
        let velocity = distance_m / elapsed_s;

        // Log velocity updates periodically (throttled to 1Hz)
        let should_log = match self.last_velocity_log {
            Some(last) => last.elapsed() >= Duration::from_secs(1),
            None => true,
        };
        if should_log {
            log::debug!(
                "OdomEstimator: v={:.3} m/s ({} ticks over {} us, abs={})",
                velocity,
                event.ticks,
                event.duration_us,
                self.abs_ticks
            );
            self.last_velocity_log = Some(Instant::now());
        }

        EventUpdate {
            tick_count,
            estimate: Ok(self.build_estimate(velocity, timestamp, now)),
        }
    }

    /// Check whether the feed has gone silent past the deadline
    ///
    /// Stale means strictly older than the deadline (an elapsed time exactly
    /// equal to it is still fresh) or no publish ever. When stale, returns a
    /// zero-velocity estimate and resets the clock, so repeated checks
    /// within one deadline window return None while prolonged silence keeps
    /// producing one refresh per window. Never touches the tick accumulator.
    pub fn check_deadline(&mut self, now: Instant) -> Option<VelocityEstimate> {
        let stale = match self.last_publish {
            Some(last) => now.duration_since(last) > self.deadline,
            None => true,
        };
        if !stale {
            return None;
        }

        self.timeout_publishes += 1;
        log::debug!(
            "OdomEstimator: feed silent past {:?}, substituting zero velocity (timeout #{})",
            self.deadline,
            self.timeout_publishes
        );

        Some(self.build_estimate(0.0, epoch_micros(), now))
    }

    /// Build a fresh estimate, advancing the sequence and the watchdog clock
    fn build_estimate(&mut self, velocity_x: f64, timestamp: u64, now: Instant) -> VelocityEstimate {
        self.seq = self.seq.wrapping_add(1);
        self.last_publish = Some(now);

        VelocityEstimate {
            timestamp,
            seq: self.seq,
            frame_id: self.config.frame_id.clone(),
            linear: [velocity_x, 0.0, 0.0],
            angular: [0.0; 3],
            covariance: covariance_matrix(self.config.uncertainty_fixed),
        }
    }

    /// Absolute tick counter value
    pub fn abs_ticks(&self) -> i32 {
        self.abs_ticks
    }

    /// Sequence number of the most recent publish (0 = nothing published)
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Encoder events applied since startup
    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    /// Zero-velocity estimates substituted by the watchdog
    pub fn timeout_publishes(&self) -> u64 {
        self.timeout_publishes
    }

    /// Events dropped from the velocity path for zero duration
    pub fn malformed_events(&self) -> u64 {
        self.malformed_events
    }
}
