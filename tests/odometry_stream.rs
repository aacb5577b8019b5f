//! Odometry Stream Tests
//!
//! Synthetic encoder event streams against a virtual clock to validate the
//! estimator end to end without sockets:
//! - Velocity conversion at the calibrated default
//! - Watchdog refresh scheduling under silence
//! - Malformed events mid-stream
//! - Sequence and covariance guarantees across both publish paths
//!
//! ## Stream Scenarios
//!
//! | Scenario | Expectation |
//! |----------|-------------|
//! | 310 ticks over 1s | 1.0 m/s, count 310 |
//! | Silence > 100ms | one zero-velocity refresh per window |
//! | Zero-duration event | tick count advances, no velocity |
//! | Forward / reverse cycle | accumulator returns to zero |
//!
//! Run with: `cargo test --test odometry_stream`

use approx::assert_relative_eq;
use gati_odom::config::OdometryConfig;
use gati_odom::estimator::{OdomEstimator, UNMEASURED_VARIANCE};
use gati_odom::streaming::messages::{EncoderEvent, VelocityEstimate};
use std::time::{Duration, Instant};

// ============================================================================
// Test Configuration
// ============================================================================

const DEADLINE: Duration = Duration::from_millis(100);
const UNCERTAINTY: f64 = 1e-3;

/// Calibrated default configuration (310 ticks/m)
fn default_odom_config() -> OdometryConfig {
    OdometryConfig {
        ticks_per_meter: 310.0,
        frame_id: "base_link".to_string(),
        uncertainty_fixed: UNCERTAINTY,
    }
}

fn make_estimator() -> OdomEstimator {
    OdomEstimator::new(default_odom_config(), DEADLINE)
}

fn ev(ticks: i32, duration_us: u32) -> EncoderEvent {
    EncoderEvent { ticks, duration_us }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Every published estimate must carry the fixed uncertainty model
fn assert_covariance_invariant(estimate: &VelocityEstimate) {
    assert_eq!(estimate.covariance[0][0], UNCERTAINTY);
    for i in 1..6 {
        assert_eq!(estimate.covariance[i][i], UNMEASURED_VARIANCE);
    }
    for i in 0..6 {
        for j in 0..6 {
            if i != j {
                assert_eq!(estimate.covariance[i][j], 0.0, "cross-term [{}][{}]", i, j);
            }
        }
    }
    assert_eq!(estimate.linear[1], 0.0);
    assert_eq!(estimate.linear[2], 0.0);
    assert_eq!(estimate.angular, [0.0; 3]);
}

// ============================================================================
// Test: End-to-End Default Scenario
// ============================================================================

/// One meter in one second, then silence: the headline behavior of the
/// whole daemon with default calibration.
#[test]
fn test_one_meter_per_second_then_silence() {
    let mut estimator = make_estimator();
    let t0 = Instant::now();

    let update = estimator.handle_event(ev(310, 1_000_000), t0);
    assert_eq!(update.tick_count.ticks, 310);
    let estimate = update.estimate.unwrap();
    assert_relative_eq!(estimate.velocity_x(), 1.0);
    assert_covariance_invariant(&estimate);

    // Inside the deadline window nothing happens
    assert!(estimator.check_deadline(t0 + ms(80)).is_none());

    // Past the deadline: exactly one zero-velocity refresh
    let refresh = estimator.check_deadline(t0 + ms(101)).unwrap();
    assert_eq!(refresh.velocity_x(), 0.0);
    assert_covariance_invariant(&refresh);
    assert!(estimator.check_deadline(t0 + ms(120)).is_none());

    // The refresh must not disturb the position track
    assert_eq!(estimator.abs_ticks(), 310);
}

// ============================================================================
// Test: Constant Cruise
// ============================================================================

#[test]
fn test_constant_cruise_stream() {
    let mut estimator = make_estimator();
    let t0 = Instant::now();

    // 20 windows of 100ms, 31 ticks each: steady 1.0 m/s
    for i in 0..20u32 {
        let now = t0 + ms(u64::from(i) * 100);
        let update = estimator.handle_event(ev(31, 100_000), now);
        let estimate = update.estimate.unwrap();
        assert_relative_eq!(estimate.velocity_x(), 1.0);
        assert_eq!(estimate.seq, i + 1);

        // The stream itself keeps the watchdog quiet
        assert!(estimator.check_deadline(now + ms(50)).is_none());
    }

    assert_eq!(estimator.abs_ticks(), 620);
    assert_eq!(estimator.timeout_publishes(), 0);
}

// ============================================================================
// Test: Direction Reversal
// ============================================================================

#[test]
fn test_forward_reverse_cycle_returns_home() {
    let mut estimator = make_estimator();
    let t0 = Instant::now();

    for i in 0..10u64 {
        let update = estimator.handle_event(ev(31, 50_000), t0 + ms(i * 50));
        assert_relative_eq!(update.estimate.unwrap().velocity_x(), 2.0);
    }
    assert_eq!(estimator.abs_ticks(), 310);

    for i in 10..20u64 {
        let update = estimator.handle_event(ev(-31, 50_000), t0 + ms(i * 50));
        assert_relative_eq!(update.estimate.unwrap().velocity_x(), -2.0);
    }

    // Same distance back: the absolute counter returns to zero
    assert_eq!(estimator.abs_ticks(), 0);
}

// ============================================================================
// Test: Prolonged Silence
// ============================================================================

#[test]
fn test_prolonged_silence_refreshes_every_window() {
    let mut estimator = make_estimator();
    let t0 = Instant::now();
    estimator.handle_event(ev(310, 1_000_000), t0);

    // Poll at the watchdog cadence (20ms) across 3 deadline windows and
    // count refreshes: one per window, no more
    let mut refreshes = Vec::new();
    for poll in 1..=20u64 {
        let now = t0 + ms(poll * 20);
        if let Some(estimate) = estimator.check_deadline(now) {
            refreshes.push((poll * 20, estimate));
        }
    }

    // Stale at 120ms (first poll past 100ms), then at 240ms, then at 360ms
    let times: Vec<u64> = refreshes.iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![120, 240, 360]);
    assert_eq!(estimator.timeout_publishes(), 3);

    for (_, estimate) in &refreshes {
        assert_eq!(estimate.velocity_x(), 0.0);
        assert_covariance_invariant(estimate);
    }
    assert_eq!(estimator.abs_ticks(), 310);
}

// ============================================================================
// Test: Malformed Events Mid-Stream
// ============================================================================

#[test]
fn test_zero_duration_event_mid_stream() {
    let mut estimator = make_estimator();
    let t0 = Instant::now();

    let first = estimator.handle_event(ev(31, 100_000), t0);
    assert!(first.estimate.is_ok());

    // Sensor glitch: ticks without an accumulation window
    let bad = estimator.handle_event(ev(17, 0), t0 + ms(50));
    assert_eq!(bad.tick_count.ticks, 48);
    assert!(bad.estimate.is_err());

    let second = estimator.handle_event(ev(31, 100_000), t0 + ms(100));
    let estimate = second.estimate.unwrap();

    // The glitch consumed no sequence number and lost no tick data
    assert_eq!(estimate.seq, 2);
    assert_eq!(estimator.abs_ticks(), 79);
    assert_eq!(estimator.malformed_events(), 1);
}

// ============================================================================
// Test: Sequence Across Mixed Publish Paths
// ============================================================================

#[test]
fn test_seq_strictly_increases_across_mixed_stream() {
    let mut estimator = make_estimator();
    let t0 = Instant::now();
    let mut seqs = Vec::new();

    // Startup baseline comes from the watchdog
    seqs.push(estimator.check_deadline(t0).unwrap().seq);

    // Burst of events
    for i in 1..=3u64 {
        let update = estimator.handle_event(ev(10, 20_000), t0 + ms(i * 20));
        seqs.push(update.estimate.unwrap().seq);
    }

    // Silence, two refreshes
    seqs.push(estimator.check_deadline(t0 + ms(170)).unwrap().seq);
    seqs.push(estimator.check_deadline(t0 + ms(280)).unwrap().seq);

    // Feed recovers
    let update = estimator.handle_event(ev(10, 20_000), t0 + ms(300));
    seqs.push(update.estimate.unwrap().seq);

    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6, 7]);
}
