//! Simulated encoder feed for hardware-free runs
//!
//! Emits synthetic encoder events following a fixed motion profile so the
//! full event → estimate → broadcast path can run without a sensor
//! attached. The profile alternates cruise phases with silent phases, which
//! hands the stream over to the watchdog exactly like a real dropout.

use crate::config::SimConfig;
use crate::error::Result;
use crate::estimator::OdomEstimator;
use crate::streaming::messages::{EncoderEvent, TickCount, VelocityEstimate};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Motion profile: cruise forward, go silent, cruise back, go silent.
///
/// The direction is a sign on the configured cruise speed; `None` phases
/// emit no events at all.
const PROFILE: [(Option<f64>, Duration); 4] = [
    (Some(1.0), Duration::from_secs(3)),
    (None, Duration::from_secs(1)),
    (Some(-1.0), Duration::from_secs(3)),
    (None, Duration::from_secs(1)),
];

/// Synthetic encoder following the motion profile
pub struct SimEncoder {
    interval: Duration,
    velocity_mps: f64,
    jitter: f64,
    ticks_per_meter: f64,
    phase: usize,
    phase_elapsed: Duration,
    /// Accumulated fractional ticks carried between events
    carry: f64,
}

impl SimEncoder {
    /// Create a new simulated encoder
    pub fn new(config: &SimConfig, ticks_per_meter: f64) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            velocity_mps: config.velocity_mps,
            jitter: config.jitter,
            ticks_per_meter,
            phase: 0,
            phase_elapsed: Duration::ZERO,
            carry: 0.0,
        }
    }

    /// Advance the profile by one emission interval
    ///
    /// Returns the encoder event for this interval, or None during silent
    /// phases. Fractional ticks carry over between events so the long-run
    /// tick rate matches the commanded velocity exactly.
    pub fn next_event(&mut self) -> Option<EncoderEvent> {
        let (direction, phase_len) = PROFILE[self.phase];

        self.phase_elapsed += self.interval;
        if self.phase_elapsed >= phase_len {
            self.phase = (self.phase + 1) % PROFILE.len();
            self.phase_elapsed = Duration::ZERO;
        }

        let direction = direction?;
        let velocity = direction * self.velocity_mps;

        // Multiplicative slip, same shape real wheels show
        let slip = if self.jitter > 0.0 {
            1.0 + rand::rng().random_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };

        let ticks_exact =
            velocity * self.interval.as_secs_f64() * self.ticks_per_meter * slip + self.carry;
        let whole = ticks_exact.trunc();
        self.carry = ticks_exact - whole;

        Some(EncoderEvent {
            ticks: whole as i32,
            duration_us: self.interval.as_micros() as u32,
        })
    }
}

/// Spawn the simulated feed thread
///
/// Generates events on the configured interval and applies them through the
/// same estimator path as the TCP feed.
pub fn spawn_sim_feed(
    config: SimConfig,
    ticks_per_meter: f64,
    estimator: Arc<Mutex<OdomEstimator>>,
    estimate_queue: Arc<ArrayQueue<VelocityEstimate>>,
    ticks_queue: Arc<ArrayQueue<TickCount>>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("sim-feed".to_string())
        .spawn(move || {
            log::info!(
                "Sim: synthetic encoder feed started ({} ms interval, {:.2} m/s cruise)",
                config.interval_ms,
                config.velocity_mps
            );

            let interval = Duration::from_millis(config.interval_ms);
            let mut encoder = SimEncoder::new(&config, ticks_per_meter);

            while running.load(Ordering::Relaxed) {
                let cycle_start = Instant::now();

                if let Some(event) = encoder.next_event() {
                    // Same critical-section shape as the TCP feed path
                    let mut estimator = estimator.lock();
                    let update = estimator.handle_event(event, Instant::now());

                    if ticks_queue.push(update.tick_count).is_err() {
                        log::trace!("Sim: ticks queue full, dropped tick count");
                    }
                    match update.estimate {
                        Ok(estimate) => {
                            if estimate_queue.push(estimate).is_err() {
                                log::warn!("Sim: estimate queue full, dropped velocity estimate");
                            }
                        }
                        Err(e) => log::warn!("Sim: {}", e),
                    }
                }

                let elapsed = cycle_start.elapsed();
                if elapsed < interval {
                    thread::sleep(interval - elapsed);
                }
            }

            log::info!("Sim: synthetic encoder feed stopped");
        })?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic_config() -> SimConfig {
        SimConfig {
            enabled: true,
            interval_ms: 50,
            velocity_mps: 0.5,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_forward_tick_rate_matches_calibration() {
        let mut encoder = SimEncoder::new(&deterministic_config(), 310.0);

        // 1 second of cruise at 0.5 m/s should produce exactly 0.5m * 310 ticks
        let mut total = 0i64;
        for _ in 0..20 {
            let event = encoder.next_event().expect("cruise phase must emit");
            assert_eq!(event.duration_us, 50_000);
            total += i64::from(event.ticks);
        }
        assert_eq!(total, 155);
    }

    #[test]
    fn test_fractional_ticks_carry_over() {
        let mut encoder = SimEncoder::new(&deterministic_config(), 310.0);

        // 7.75 ticks per interval: whole ticks alternate while the carry
        // keeps the running sum exact
        let ticks: Vec<i32> = (0..4)
            .map(|_| encoder.next_event().unwrap().ticks)
            .collect();
        assert_eq!(ticks, vec![7, 8, 8, 8]);
    }

    #[test]
    fn test_profile_goes_silent_then_reverses() {
        let mut encoder = SimEncoder::new(&deterministic_config(), 310.0);

        // Forward phase: 3s at 50ms intervals
        for _ in 0..60 {
            assert!(encoder.next_event().is_some());
        }

        // Silent phase: 1s with no events, watchdog territory
        for _ in 0..20 {
            assert!(encoder.next_event().is_none());
        }

        // Reverse phase: negative ticks at the same rate
        let mut total = 0i64;
        for _ in 0..20 {
            let event = encoder.next_event().expect("reverse phase must emit");
            assert!(event.ticks <= 0);
            total += i64::from(event.ticks);
        }
        assert_eq!(total, -155);
    }
}
