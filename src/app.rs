//! Application orchestration for the gati-odom daemon
//!
//! Manages estimator setup, streaming, the feed source, the watchdog and
//! graceful shutdown.

use crate::config::AppConfig;
use crate::error::Result;
use crate::estimator::OdomEstimator;
use crate::sim::spawn_sim_feed;
use crate::streaming::wire::{Serializer, WireFormat};
use crate::streaming::{TcpPublisher, TcpReceiver};
use crate::watchdog::spawn_watchdog;
use log::{debug, info};
use parking_lot::Mutex;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Main application structure that manages all components
pub struct OdomApp {
    config: AppConfig,
    serializer: Serializer,
    publisher: Arc<TcpPublisher>,
    estimator: Arc<Mutex<OdomEstimator>>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl OdomApp {
    /// Create new OdomApp instance
    ///
    /// Validates the configuration and initializes the estimator and the
    /// streaming publisher. Fails fast: nothing is spawned if any value or
    /// socket is unusable.
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing gati-odom");
        config.validate()?;

        let wire_format: WireFormat = config.streaming.wire_format.parse()?;
        let serializer = Serializer::new(wire_format);
        info!("Wire format: {:?}", wire_format);

        info!("Setting up TCP publisher on {}", config.streaming.pub_address);
        let publisher = Arc::new(TcpPublisher::new(
            &config.streaming.pub_address,
            serializer.clone(),
        )?);

        let estimator = Arc::new(Mutex::new(OdomEstimator::new(
            config.odometry.clone(),
            config.watchdog.deadline(),
        )));

        let running = Arc::new(AtomicBool::new(true));

        info!("✓ Estimator and streaming initialized");

        Ok(Self {
            config,
            serializer,
            publisher,
            estimator,
            running,
            threads: Vec::new(),
        })
    }

    /// Start all background threads and run the main loop
    pub fn run(&mut self) -> Result<()> {
        info!("Starting application threads");

        if self.config.sim.enabled {
            self.start_sim_feed()?;
        } else {
            self.start_feed_listener()?;
        }
        self.start_watchdog()?;
        self.setup_signal_handler();

        info!("✓ All threads started");
        info!(
            "Publishing estimates on: {}",
            self.config.streaming.pub_address
        );
        if !self.config.sim.enabled {
            info!(
                "Receiving encoder events on: {}",
                self.config.streaming.feed_address
            );
        }
        info!("");
        info!("Press Ctrl+C to stop");

        // Main loop - keep alive while streaming
        let mut last_stats = Instant::now();

        while self.running.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(100));

            // Print statistics every 10 seconds
            if last_stats.elapsed().as_secs() >= 10 {
                self.log_statistics();
                last_stats = Instant::now();
            }
        }

        info!("Shutdown signal received, stopping threads...");
        self.stop_all_threads();

        Ok(())
    }

    /// Start the TCP feed listener thread
    ///
    /// Binds here so a bad feed address fails startup. The thread accepts
    /// one source at a time; further connects wait in the backlog until the
    /// current source disconnects.
    fn start_feed_listener(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.streaming.feed_address)?;
        listener.set_nonblocking(true)?;

        let serializer = self.serializer.clone();
        let estimator = Arc::clone(&self.estimator);
        let estimate_queue = self.publisher.get_estimate_queue();
        let ticks_queue = self.publisher.get_ticks_queue();
        let running = Arc::clone(&self.running);
        let feed_address = self.config.streaming.feed_address.clone();

        let handle = std::thread::Builder::new()
            .name("feed-listener".to_string())
            .spawn(move || {
                log::info!("Feed: listening on {}", feed_address);

                while running.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, addr)) => {
                            log::info!("Feed: encoder source connected: {}", addr);
                            if let Err(e) = stream.set_nonblocking(false) {
                                log::error!(
                                    "Feed: failed to set blocking mode for {}: {}",
                                    addr,
                                    e
                                );
                                continue;
                            }

                            let conn_alive = Arc::new(AtomicBool::new(true));
                            let mut receiver = TcpReceiver::new(
                                serializer.clone(),
                                Arc::clone(&estimator),
                                Arc::clone(&estimate_queue),
                                Arc::clone(&ticks_queue),
                                Arc::clone(&running),
                                conn_alive,
                            );
                            if let Err(e) = receiver.run(stream) {
                                log::error!("Feed: receiver error: {}", e);
                            }
                            log::info!("Feed: encoder source disconnected: {}", addr);
                        }
                        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            // No source pending, sleep briefly
                            std::thread::sleep(Duration::from_millis(10));
                        }
                        Err(e) => {
                            log::error!("Feed: accept error: {}", e);
                        }
                    }
                }

                log::info!("Feed: listener stopped");
            })?;

        self.threads.push(handle);
        info!(
            "✓ Feed listener started on {}",
            self.config.streaming.feed_address
        );
        Ok(())
    }

    /// Start the simulated encoder feed thread
    fn start_sim_feed(&mut self) -> Result<()> {
        let handle = spawn_sim_feed(
            self.config.sim.clone(),
            self.config.odometry.ticks_per_meter,
            Arc::clone(&self.estimator),
            self.publisher.get_estimate_queue(),
            self.publisher.get_ticks_queue(),
            Arc::clone(&self.running),
        )?;

        self.threads.push(handle);
        info!("✓ Simulated encoder feed started (no hardware)");
        Ok(())
    }

    /// Start the watchdog thread
    fn start_watchdog(&mut self) -> Result<()> {
        let handle = spawn_watchdog(
            Arc::clone(&self.estimator),
            self.publisher.get_estimate_queue(),
            self.config.watchdog.poll_interval(),
            Arc::clone(&self.running),
        )?;

        self.threads.push(handle);
        info!(
            "✓ Watchdog started ({} ms poll, {} ms deadline)",
            self.config.watchdog.poll_interval_ms, self.config.watchdog.deadline_timeout_ms
        );
        Ok(())
    }

    /// Setup signal handler for graceful shutdown
    fn setup_signal_handler(&self) {
        let running = Arc::clone(&self.running);

        std::thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                let mut signals =
                    Signals::new([SIGINT, SIGTERM]).expect("Failed to register signal handlers");

                if let Some(sig) = signals.forever().next() {
                    info!("Received signal {:?}, initiating shutdown...", sig);
                    running.store(false, Ordering::Relaxed);
                }
            })
            .expect("Failed to spawn signal handler thread");
    }

    /// Log application statistics
    fn log_statistics(&self) {
        if let Some(estimator) = self.estimator.try_lock() {
            info!(
                "Odometry: events={} abs_ticks={} published_seq={} timeouts={} malformed={}",
                estimator.events_seen(),
                estimator.abs_ticks(),
                estimator.seq(),
                estimator.timeout_publishes(),
                estimator.malformed_events()
            );
        }
    }

    /// Stop all background threads
    fn stop_all_threads(&mut self) {
        info!("Stopping all threads...");

        // Signal shutdown to all threads
        self.running.store(false, Ordering::Relaxed);
        self.publisher.stop();

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        info!("✓ All threads stopped");
    }
}

impl Drop for OdomApp {
    fn drop(&mut self) {
        debug!("OdomApp cleaning up...");

        // Ensure shutdown is signaled even on an early exit path
        self.running.store(false, Ordering::Relaxed);
        if !self.threads.is_empty() {
            self.stop_all_threads();
        }
    }
}
