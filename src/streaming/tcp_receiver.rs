//! TCP receiver for the encoder event feed
//!
//! Handles incoming encoder events from the connected sensor bridge and
//! applies them to the shared estimator.
//!
//! # Wire Format
//!
//! Events use length-prefixed encoding; the feed channel carries no topic
//! tag because it speaks exactly one message type:
//!
//! ```text
//! ┌──────────────────┬─────────────────────┐
//! │ Length (4 bytes) │ EncoderEvent        │
//! │ Big-endian u32   │ (JSON or Postcard)  │
//! └──────────────────┴─────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Sensor bridge connects to the feed port
//! 2. Receiver loop decodes and applies events until disconnect
//! 3. EOF or reset is a normal disconnect; the listener accepts the next source
//! ```
//!
//! # Safety Features
//!
//! - **Read timeout**: 500ms timeout allows periodic shutdown flag checks
//! - **Buffer limit**: Frames > 1MB close the connection
//! - **Undecodable payloads**: logged and discarded, connection stays open

use crate::error::{Error, Result};
use crate::estimator::OdomEstimator;
use crate::streaming::messages::{EncoderEvent, TickCount, VelocityEstimate};
use crate::streaming::wire::{MAX_FRAME_SIZE, Serializer};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Initial capacity for the event read buffer (events are tiny)
const INITIAL_BUFFER_CAPACITY: usize = 256;

/// TCP receiver that applies encoder events from a connected feed source
pub struct TcpReceiver {
    serializer: Serializer,
    estimator: Arc<Mutex<OdomEstimator>>,
    estimate_queue: Arc<ArrayQueue<VelocityEstimate>>,
    ticks_queue: Arc<ArrayQueue<TickCount>>,
    /// Global running flag (daemon shutdown)
    running: Arc<AtomicBool>,
    /// Per-connection alive flag (connection health)
    conn_alive: Arc<AtomicBool>,
    /// Reusable buffer for reading event payloads (avoids allocation per event)
    read_buffer: Vec<u8>,
}

impl TcpReceiver {
    /// Create a new feed receiver
    pub fn new(
        serializer: Serializer,
        estimator: Arc<Mutex<OdomEstimator>>,
        estimate_queue: Arc<ArrayQueue<VelocityEstimate>>,
        ticks_queue: Arc<ArrayQueue<TickCount>>,
        running: Arc<AtomicBool>,
        conn_alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            serializer,
            estimator,
            estimate_queue,
            ticks_queue,
            running,
            conn_alive,
            read_buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Run the receiver loop for a connected feed source
    pub fn run(&mut self, mut stream: TcpStream) -> Result<()> {
        log::info!("Feed receiver started for source: {:?}", stream.peer_addr());

        // Set read timeout so we can check shutdown flag
        if let Err(e) = stream.set_read_timeout(Some(std::time::Duration::from_millis(500))) {
            log::warn!("Failed to set read timeout: {}", e);
        }

        loop {
            // Check both global running flag and per-connection alive flag
            if !self.running.load(Ordering::Relaxed) {
                log::debug!("Running flag cleared, exiting");
                break;
            }
            if !self.conn_alive.load(Ordering::Relaxed) {
                log::debug!("Connection alive flag cleared, exiting");
                break;
            }

            match self.read_event(&mut stream) {
                Ok(Some(event)) => {
                    log::trace!("Feed: event {:?}", event);
                    self.apply_event(event);
                }
                Ok(None) => {
                    // Timeout or discarded frame, continue loop
                }
                Err(e) => {
                    // Signal connection is dead and shutdown socket
                    self.conn_alive.store(false, Ordering::Relaxed);
                    let _ = stream.shutdown(std::net::Shutdown::Both);

                    // Check if it's a connection closed error
                    if let Error::Io(ref io_err) = e
                        && (io_err.kind() == std::io::ErrorKind::UnexpectedEof
                            || io_err.kind() == std::io::ErrorKind::ConnectionReset)
                    {
                        log::info!("Feed source disconnected");
                        return Ok(());
                    }
                    log::error!("Failed to read event: {}", e);
                    return Err(e);
                }
            }
        }

        // Clean shutdown: signal connection dead and close socket
        self.conn_alive.store(false, Ordering::Relaxed);
        let _ = stream.shutdown(std::net::Shutdown::Both);

        log::info!("Feed receiver stopped");
        Ok(())
    }

    /// Read one encoder event frame from the source
    ///
    /// Uses a reusable internal buffer to avoid allocation per event.
    /// Returns Ok(None) on read timeout and for discarded frames.
    fn read_event(&mut self, stream: &mut TcpStream) -> Result<Option<EncoderEvent>> {
        // Read length prefix
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        }

        let len = u32::from_be_bytes(len_buf) as usize;

        // Sanity check on length
        if len > MAX_FRAME_SIZE {
            return Err(Error::Other(format!("Frame too large: {} bytes", len)));
        }

        // Reuse buffer - resize only if needed (no allocation if capacity sufficient)
        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        stream.read_exact(&mut self.read_buffer)?;

        match self.serializer.deserialize_event(&self.read_buffer) {
            Ok(event) => Ok(Some(event)),
            Err(e) => {
                // Bad payload, not a bad connection: skip the frame
                log::warn!("Feed: discarding undecodable {}-byte frame: {}", len, e);
                Ok(None)
            }
        }
    }

    /// Apply one event to the estimator and enqueue the outputs
    ///
    /// Holds the estimator lock across the queue pushes so broadcast order
    /// matches sequence order even when the watchdog fires concurrently.
    fn apply_event(&self, event: EncoderEvent) {
        let mut estimator = self.estimator.lock();
        let update = estimator.handle_event(event, Instant::now());

        if self.ticks_queue.push(update.tick_count).is_err() {
            log::trace!("Feed: ticks queue full, dropped tick count");
        }
        match update.estimate {
            Ok(estimate) => {
                if self.estimate_queue.push(estimate).is_err() {
                    log::warn!("Feed: estimate queue full, dropped velocity estimate");
                }
            }
            Err(e) => log::warn!("Feed: {}", e),
        }
    }
}
