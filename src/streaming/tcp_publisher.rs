//! Estimate and tick count publisher using TCP sockets.
//!
//! Publishes velocity estimates and absolute tick counts to external
//! consumers via TCP.
//!
//! Uses a lock-free queue architecture so the feed and watchdog paths never
//! block on network I/O. A dedicated publisher thread owns the TCP listener;
//! estimator paths push to queues.

use crate::error::Result;
use crate::streaming::messages::{TOPIC_ODOM, TOPIC_TICKS, TickCount, VelocityEstimate};
use crate::streaming::wire::Serializer;
use crossbeam_queue::ArrayQueue;
use log::{debug, error, info, warn};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Queue capacity for either topic
///
/// 512 messages is several seconds of buffer even at peak event rate
/// (events ≤ ~100 Hz plus the watchdog refresh).
const QUEUE_CAPACITY: usize = 512;

/// Per-iteration drain cap, keeps one busy topic from starving the other
const BATCH_LIMIT: usize = 64;

/// Publisher that broadcasts estimates and tick counts via TCP
///
/// Estimator paths use `queue.push()` which returns immediately, never
/// blocking. A full queue drops the message rather than stalling the feed.
pub struct TcpPublisher {
    estimate_queue: Arc<ArrayQueue<VelocityEstimate>>,
    ticks_queue: Arc<ArrayQueue<TickCount>>,
    local_addr: SocketAddr,
    publisher_thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl TcpPublisher {
    /// Create a new TCP streaming publisher
    ///
    /// Binds the listener here, so a bad address fails startup and the
    /// ephemeral port is known before the publisher thread runs, then
    /// spawns the dedicated thread that owns it.
    ///
    /// # Arguments
    /// - `bind_address`: TCP bind address (e.g., "0.0.0.0:5555")
    /// - `serializer`: payload encoder shared with the feed side
    pub fn new(bind_address: &str, serializer: Serializer) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let estimate_queue = Arc::new(ArrayQueue::new(QUEUE_CAPACITY));
        let ticks_queue = Arc::new(ArrayQueue::new(QUEUE_CAPACITY));

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let estimate_queue_clone = Arc::clone(&estimate_queue);
        let ticks_queue_clone = Arc::clone(&ticks_queue);

        let publisher_thread = thread::Builder::new()
            .name("tcp-publisher".to_string())
            .spawn(move || {
                Self::publisher_thread_loop(
                    listener,
                    serializer,
                    estimate_queue_clone,
                    ticks_queue_clone,
                    shutdown_clone,
                );
            })?;

        info!("TCP streaming publisher started on {}", local_addr);

        Ok(Self {
            estimate_queue,
            ticks_queue,
            local_addr,
            publisher_thread: Some(publisher_thread),
            shutdown,
        })
    }

    /// Publisher thread main loop - owns the TCP listener
    ///
    /// Accepts clients non-blockingly and batch-drains both queues,
    /// broadcasting each message to every connected client.
    fn publisher_thread_loop(
        listener: TcpListener,
        serializer: Serializer,
        estimate_queue: Arc<ArrayQueue<VelocityEstimate>>,
        ticks_queue: Arc<ArrayQueue<TickCount>>,
        shutdown: Arc<AtomicBool>,
    ) {
        let mut clients: Vec<TcpStream> = Vec::new();
        let mut estimate_count = 0u64;
        let mut ticks_count = 0u64;
        let mut queue_full_warnings = 0u64;

        // Reusable buffer for frame assembly (avoids allocations)
        let mut frame_buffer = Vec::with_capacity(4096);

        while !shutdown.load(Ordering::Relaxed) {
            // Accept new client connections (non-blocking)
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        warn!("Failed to set blocking mode for client {}: {}", addr, e);
                    } else {
                        info!("New client connected: {}", addr);
                        clients.push(stream);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // No new connections, continue
                }
                Err(e) => {
                    error!("Error accepting client connection: {}", e);
                }
            }

            // Batch process velocity estimates
            let mut estimate_batch = 0;
            while let Some(estimate) = estimate_queue.pop() {
                if let Err(e) = Self::broadcast_to_clients(
                    &mut clients,
                    &serializer,
                    TOPIC_ODOM,
                    &estimate,
                    &mut frame_buffer,
                ) {
                    debug!("Failed to publish estimate: {}", e);
                } else {
                    estimate_count += 1;
                }

                estimate_batch += 1;
                if estimate_batch >= BATCH_LIMIT {
                    break;
                }
            }

            // Batch process tick counts
            let mut ticks_batch = 0;
            while let Some(count) = ticks_queue.pop() {
                if let Err(e) = Self::broadcast_to_clients(
                    &mut clients,
                    &serializer,
                    TOPIC_TICKS,
                    &count,
                    &mut frame_buffer,
                ) {
                    debug!("Failed to publish tick count: {}", e);
                } else {
                    ticks_count += 1;
                }

                ticks_batch += 1;
                if ticks_batch >= BATCH_LIMIT {
                    break;
                }
            }

            // Monitor queue health
            let estimate_len = estimate_queue.len();
            if estimate_len > (QUEUE_CAPACITY * 8 / 10) {
                queue_full_warnings += 1;
                if queue_full_warnings % 100 == 0 {
                    warn!(
                        "Estimate queue near full: {}/{} ({:.1}%)",
                        estimate_len,
                        QUEUE_CAPACITY,
                        (estimate_len as f32 / QUEUE_CAPACITY as f32) * 100.0
                    );
                }
            }

            // Sleep briefly if queues are empty (reduce CPU usage)
            if estimate_queue.is_empty() && ticks_queue.is_empty() {
                thread::sleep(Duration::from_millis(10));
            }
        }

        info!(
            "Publisher thread exiting ({} estimates, {} tick counts published)",
            estimate_count, ticks_count
        );
    }

    /// Broadcast a message to all connected TCP clients
    ///
    /// Message format: [4-byte length (big-endian)][topic (null-terminated)][payload]
    fn broadcast_to_clients<T: serde::Serialize>(
        clients: &mut Vec<TcpStream>,
        serializer: &Serializer,
        topic: &str,
        message: &T,
        buffer: &mut Vec<u8>,
    ) -> Result<()> {
        let payload = serializer.serialize(message)?;

        // Reuse buffer for assembling the frame
        buffer.clear();
        buffer.reserve(4 + topic.len() + 1 + payload.len());

        // Frame length covers topic + null + payload
        let frame_length = (topic.len() + 1 + payload.len()) as u32;
        buffer.extend_from_slice(&frame_length.to_be_bytes());

        buffer.extend_from_slice(topic.as_bytes());
        buffer.push(0); // Null terminator for topic

        buffer.extend_from_slice(&payload);

        // Send to all clients, removing disconnected ones
        clients.retain_mut(|client| match client.write_all(buffer) {
            Ok(_) => true,
            Err(e) => {
                if let Ok(addr) = client.peer_addr() {
                    debug!("Client {} disconnected: {}", addr, e);
                }
                false
            }
        });

        Ok(())
    }

    /// Get the estimate queue for direct access by estimator paths
    ///
    /// Push with `queue.push()`; the operation never blocks.
    pub fn get_estimate_queue(&self) -> Arc<ArrayQueue<VelocityEstimate>> {
        Arc::clone(&self.estimate_queue)
    }

    /// Get the tick count queue for direct access by estimator paths
    pub fn get_ticks_queue(&self) -> Arc<ArrayQueue<TickCount>> {
        Arc::clone(&self.ticks_queue)
    }

    /// Address the listener actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the publisher
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        info!("TCP streaming publisher shutdown requested");
    }
}

impl Drop for TcpPublisher {
    fn drop(&mut self) {
        self.stop();

        // Wait for publisher thread to finish
        if let Some(thread) = self.publisher_thread.take() {
            let _ = thread.join();
        }
    }
}
