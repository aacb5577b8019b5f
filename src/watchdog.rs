//! Silence watchdog for the encoder feed
//!
//! A downstream filter fed by this daemon assumes the robot keeps its last
//! commanded velocity until told otherwise. If the encoder goes quiet the
//! estimate must decay to zero explicitly, so a fixed-period thread checks
//! the estimator's publish clock and substitutes zero-velocity estimates
//! while the feed is silent.

use crate::error::Result;
use crate::estimator::OdomEstimator;
use crate::streaming::messages::VelocityEstimate;
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Spawn the watchdog thread
///
/// Each cycle locks the estimator, runs the deadline check and pushes any
/// synthesized zero-velocity estimate to the publisher queue. The push
/// happens under the estimator lock so broadcast order matches sequence
/// order. Exits when the running flag clears.
pub fn spawn_watchdog(
    estimator: Arc<Mutex<OdomEstimator>>,
    estimate_queue: Arc<ArrayQueue<VelocityEstimate>>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("watchdog".to_string())
        .spawn(move || {
            log::info!(
                "Watchdog: started ({:?} poll, guarding feed liveness)",
                poll_interval
            );

            while running.load(Ordering::Relaxed) {
                let cycle_start = Instant::now();

                {
                    let mut estimator = estimator.lock();
                    if let Some(estimate) = estimator.check_deadline(Instant::now())
                        && estimate_queue.push(estimate).is_err()
                    {
                        log::warn!("Watchdog: estimate queue full, dropped zero-velocity refresh");
                    }
                }

                // Maintain the poll cadence
                let elapsed = cycle_start.elapsed();
                if elapsed < poll_interval {
                    thread::sleep(poll_interval - elapsed);
                } else if elapsed > poll_interval * 2 {
                    log::warn!(
                        "Watchdog: check cycle overrun: {:?} (target: {:?})",
                        elapsed,
                        poll_interval
                    );
                }
            }

            log::info!("Watchdog: stopped");
        })?;

    Ok(handle)
}
