// ============================================
// File: crates/tunhub-transport/src/tun/mock.rs
// ============================================
//! # Mock TUN Device Implementation
//!
//! ## Creation Reason
//! Lets the server's device loops run in tests without a kernel
//! interface or root privileges.
//!
//! ## Main Functionality
//! - Inject packets (or a read failure) for the device read loop
//! - Capture everything the device write loop writes
//! - Simulate short writes and write failures
//!
//! ## Usage in Tests
//! ```ignore
//! use tunhub_transport::tun::MockTun;
//! use tunhub_transport::traits::{TunConfig, TunDevice};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let tun = MockTun::new(TunConfig::new("mock0"));
//! tun.inject_packet(b"test packet".to_vec());
//!
//! let mut buf = [0u8; 1500];
//! let len = tun.read(&mut buf).await.unwrap();
//! assert_eq!(&buf[..len], b"test packet");
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Test-only; compiled under `cfg(test)` or the `mock` feature
//! - `read()` parks until something is injected, like a quiet device
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::{TunConfig, TunDevice};

// ============================================
// Constants
// ============================================

/// Maximum number of packets to queue.
const MAX_QUEUE_SIZE: usize = 1000;

// ============================================
// ReadEvent
// ============================================

/// What the next `read()` returns.
#[derive(Debug)]
enum ReadEvent {
    Packet(Vec<u8>),
    Error(String),
}

#[derive(Debug, Default)]
struct WriteBehavior {
    /// Accept at most this many bytes per write.
    limit: Option<usize>,
    /// Fail every write with this reason.
    failure: Option<String>,
}

// ============================================
// MockTun
// ============================================

/// Mock TUN device for testing.
///
/// # Example
/// ```
/// use tunhub_transport::tun::MockTun;
/// use tunhub_transport::traits::{TunConfig, TunDevice};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tun = MockTun::new(TunConfig::new("mock0"));
///
/// tun.write(b"test packet").await?;
///
/// let captured = tun.take_written_packets();
/// assert_eq!(captured.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockTun {
    /// Device configuration
    config: TunConfig,
    /// Events waiting to be returned by `read()`
    read_queue: Mutex<VecDeque<ReadEvent>>,
    /// Packets that have been written (captured for verification)
    write_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Short-write / failure simulation
    write_behavior: Mutex<WriteBehavior>,
    /// Notify when new read events are available
    read_notify: Notify,
    /// Notify on every captured write
    write_notify: Notify,
}

impl MockTun {
    /// Creates a new mock TUN device.
    #[must_use]
    pub fn new(config: TunConfig) -> Self {
        Self {
            config,
            read_queue: Mutex::new(VecDeque::with_capacity(100)),
            write_queue: Mutex::new(VecDeque::with_capacity(100)),
            write_behavior: Mutex::new(WriteBehavior::default()),
            read_notify: Notify::new(),
            write_notify: Notify::new(),
        }
    }

    /// Injects a packet to be returned by a later `read()` call.
    ///
    /// # Panics
    /// Panics if the queue is full (> `MAX_QUEUE_SIZE` events).
    pub fn inject_packet(&self, packet: Vec<u8>) {
        self.push_read_event(ReadEvent::Packet(packet));
    }

    /// Makes the next `read()` (after any already injected packets) fail.
    ///
    /// # Panics
    /// Panics if the queue is full.
    pub fn inject_read_error(&self, reason: impl Into<String>) {
        self.push_read_event(ReadEvent::Error(reason.into()));
    }

    fn push_read_event(&self, event: ReadEvent) {
        let mut queue = self.read_queue.lock();
        assert!(queue.len() < MAX_QUEUE_SIZE, "Mock TUN read queue overflow");
        queue.push_back(event);
        drop(queue);
        self.read_notify.notify_one();
    }

    /// Caps how many bytes each `write()` reports as written.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.write_behavior.lock().limit = limit;
    }

    /// Makes every subsequent `write()` fail.
    pub fn fail_writes(&self, reason: impl Into<String>) {
        self.write_behavior.lock().failure = Some(reason.into());
    }

    /// Takes all packets that have been written to the device.
    ///
    /// This clears the write queue.
    #[must_use]
    pub fn take_written_packets(&self) -> Vec<Vec<u8>> {
        let mut queue = self.write_queue.lock();
        queue.drain(..).collect()
    }

    /// Returns the number of events waiting to be read.
    #[must_use]
    pub fn pending_read_count(&self) -> usize {
        self.read_queue.lock().len()
    }

    /// Returns the number of packets that have been written.
    #[must_use]
    pub fn written_count(&self) -> usize {
        self.write_queue.lock().len()
    }

    /// Waits until at least `count` packets have been captured.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.write_notify.notified();
                if self.written_count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl TunDevice for MockTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            {
                let mut queue = self.read_queue.lock();
                match queue.pop_front() {
                    Some(ReadEvent::Packet(packet)) => {
                        let len = packet.len().min(buf.len());
                        buf[..len].copy_from_slice(&packet[..len]);
                        return Ok(len);
                    }
                    Some(ReadEvent::Error(reason)) => {
                        return Err(TransportError::TunReadFailed { reason });
                    }
                    None => {}
                }
            }

            self.read_notify.notified().await;
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let written = {
            let behavior = self.write_behavior.lock();
            if let Some(reason) = &behavior.failure {
                return Err(TransportError::TunWriteFailed {
                    reason: reason.clone(),
                });
            }
            behavior.limit.map_or(buf.len(), |limit| buf.len().min(limit))
        };

        let mut queue = self.write_queue.lock();
        if queue.len() >= MAX_QUEUE_SIZE {
            return Err(TransportError::TunWriteFailed {
                reason: "Write queue full".into(),
            });
        }
        queue.push_back(buf[..written].to_vec());
        drop(queue);
        self.write_notify.notify_waiters();

        Ok(written)
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn mtu(&self) -> u16 {
        self.config.mtu
    }
}

impl std::fmt::Debug for MockTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTun")
            .field("name", &self.config.name)
            .field("mtu", &self.config.mtu)
            .field("pending_reads", &self.pending_read_count())
            .field("written_packets", &self.written_count())
            .finish_non_exhaustive()
    }
}

impl Default for MockTun {
    fn default() -> Self {
        Self::new(TunConfig::default())
    }
}

// ============================================
// Tests
// ============================================
