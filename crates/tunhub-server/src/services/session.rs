// ============================================
// File: crates/tunhub-server/src/services/session.rs
// ============================================
//! # Client Session
//!
//! ## Creation Reason
//! Owns one peer TCP connection: a reader task that decodes frames from
//! the peer and a writer task that drains the session's outbound queue.
//!
//! ## Main Functionality
//! - `ClientSession`: per-peer state, outbound queue, claimed addresses
//! - `SessionState`: Active → Closing → Removed, one-shot transition
//! - `run_reader` / `run_writer`: the two per-session loops
//! - `start_session`: registers a session and spawns both loops
//!
//! ## Session Lifecycle
//! ```text
//! ┌──────────┐   accept + register   ┌──────────┐
//! │  (none)  │ ────────────────────► │  Active  │
//! └──────────┘                       └────┬─────┘
//!                                         │
//!                 ┌───────────────────────┼───────────────────┐
//!                 │                       │                   │
//!            reader error            writer error         shutdown
//!            decode error            encode error           drain
//!            peer EOF                     │                   │
//!                 │                       │                   │
//!                 └──────────► CAS Active → Closing ◄─────────┘
//!                                   (winner only)
//!                                         │
//!                       drop outbound sender, registry.remove
//!                                         │
//!                                         ▼
//!                                   ┌──────────┐
//!                                   │ Removed  │
//!                                   └──────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `queue_ip` is called from the dispatch loop: it must never block
//!   and never return an error; a full queue drops the packet
//! - Teardown is guarded by a compare-exchange on the state; both loops
//!   may race to call it and only the first one does anything
//! - The reader also stops when the session is torn down elsewhere, so
//!   a writer failure or shutdown releases the whole socket
//!
//! ## Last Modified
//! v0.1.0 - Initial session implementation

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, info_span, trace, warn, Instrument};

use tunhub_common::time::AtomicInstant;
use tunhub_common::types::ClientId;
use tunhub_core::{Frame, FrameCodec, RawPacket};

use crate::handlers::router::InboundPacket;
use crate::services::registry::ClientRegistry;

// ============================================
// Session State
// ============================================

/// Session state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Both loops running.
    Active = 0,
    /// A loop detected a failure; teardown in progress.
    Closing = 1,
    /// Registry cleanup done.
    Removed = 2,
}

impl SessionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Closing,
            _ => Self::Removed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Closing => write!(f, "Closing"),
            Self::Removed => write!(f, "Removed"),
        }
    }
}

/// Which path detected the end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOrigin {
    /// Reader loop: decode error, socket error or peer EOF.
    Reader,
    /// Writer loop: encode or socket write error.
    Writer,
    /// Server shutdown.
    Shutdown,
}

impl fmt::Display for TeardownOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reader => write!(f, "reader"),
            Self::Writer => write!(f, "writer"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Result of a non-blocking enqueue to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Packet is in the outbound queue.
    Queued,
    /// Queue was full; packet discarded.
    DroppedFull,
    /// Session is tearing down; packet discarded.
    Closed,
}

// ============================================
// Session Statistics
// ============================================

/// Per-session counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_in: AtomicU64,
    bytes_in: AtomicU64,
    frames_out: AtomicU64,
    bytes_out: AtomicU64,
    dropped: AtomicU64,
}

impl SessionStats {
    fn record_in(&self, bytes: usize) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_out(&self, bytes: usize) {
        self.frames_out.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StatsSnapshot {
    pub frames_in: u64,
    pub bytes_in: u64,
    pub frames_out: u64,
    pub bytes_out: u64,
    pub dropped: u64,
}

// ============================================
// ClientSession
// ============================================

/// One connected peer.
pub struct ClientSession {
    id: ClientId,
    peer: SocketAddr,
    state: AtomicU8,
    /// Taken on teardown so the writer's `recv()` ends.
    outbound: Mutex<Option<mpsc::Sender<RawPacket>>>,
    claimed: Mutex<Vec<IpAddr>>,
    closed: watch::Sender<bool>,
    connected_at: Instant,
    last_activity: AtomicInstant,
    stats: SessionStats,
}

impl ClientSession {
    /// Creates an active session that queues outbound packets on `outbound`.
    #[must_use]
    pub fn new(id: ClientId, peer: SocketAddr, outbound: mpsc::Sender<RawPacket>) -> Self {
        let now = Instant::now();
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer,
            state: AtomicU8::new(SessionState::Active as u8),
            outbound: Mutex::new(Some(outbound)),
            claimed: Mutex::new(Vec::new()),
            closed,
            connected_at: now,
            last_activity: AtomicInstant::from_instant(now),
            stats: SessionStats::default(),
        }
    }

    /// Returns the session id.
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Returns the peer's socket address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` while no teardown has started.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Returns how long the session has been connected.
    #[must_use]
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Returns the time since the last frame in either direction.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Returns a snapshot of the session counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns every address this peer has claimed, in claim order.
    #[must_use]
    pub fn claimed_addresses(&self) -> Vec<IpAddr> {
        self.claimed.lock().clone()
    }

    /// Returns the number of packets waiting in the outbound queue.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.outbound
            .lock()
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    /// Enqueues a packet for the peer without blocking.
    ///
    /// A full queue drops the packet and logs a warning.
    pub fn queue_ip(&self, packet: RawPacket) -> QueueOutcome {
        let guard = self.outbound.lock();
        let Some(tx) = guard.as_ref() else {
            return QueueOutcome::Closed;
        };

        match tx.try_send(packet) {
            Ok(()) => QueueOutcome::Queued,
            Err(TrySendError::Full(packet)) => {
                drop(guard);
                self.stats.record_drop();
                warn!(
                    client_id = %self.id,
                    destination = %packet.destination,
                    len = packet.len(),
                    "Client queue full, packet dropped"
                );
                QueueOutcome::DroppedFull
            }
            Err(TrySendError::Closed(_)) => QueueOutcome::Closed,
        }
    }

    /// Resolves once teardown has started.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // Err only if the sender is gone, which means `self` is gone too
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Tears the session down. Only the first caller does any work.
    ///
    /// Returns `true` if this call performed the teardown.
    pub fn teardown(&self, registry: &ClientRegistry, origin: TeardownOrigin) -> bool {
        if self
            .state
            .compare_exchange(
                SessionState::Active as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            trace!(client_id = %self.id, origin = %origin, "Teardown already done");
            return false;
        }

        self.outbound.lock().take();
        self.closed.send_replace(true);
        let purged = registry.remove(self.id).map_or(0, |(_, purged)| purged);
        self.state
            .store(SessionState::Removed as u8, Ordering::Release);

        let stats = self.stats.snapshot();
        info!(
            client_id = %self.id,
            peer = %self.peer,
            origin = %origin,
            addresses = ?self.claimed_addresses(),
            purged,
            frames_in = stats.frames_in,
            frames_out = stats.frames_out,
            bytes_in = stats.bytes_in,
            bytes_out = stats.bytes_out,
            dropped = stats.dropped,
            connected_secs = self.connected_for().as_secs(),
            idle_ms = u64::try_from(self.idle_time().as_millis()).unwrap_or(u64::MAX),
            "Session closed"
        );
        true
    }

    fn record_claim(&self, address: IpAddr) {
        let mut claimed = self.claimed.lock();
        if !claimed.contains(&address) {
            claimed.push(address);
        }
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("queued", &self.queued_len())
            .finish_non_exhaustive()
    }
}

// ============================================
// Session Loops
// ============================================

/// Registers a session for `stream` and spawns its reader and writer.
pub fn start_session(
    stream: TcpStream,
    peer: SocketAddr,
    registry: &Arc<ClientRegistry>,
    inbound: mpsc::Sender<InboundPacket>,
    codec: FrameCodec,
    queue_capacity: usize,
) -> Arc<ClientSession> {
    let (tx, rx) = mpsc::channel(queue_capacity);
    let session = registry.register(|id| ClientSession::new(id, peer, tx));

    let span = info_span!("client", client_id = %session.id(), peer = %peer);
    let (read_half, write_half) = stream.into_split();

    tokio::spawn(
        run_reader(
            Arc::clone(&session),
            FramedRead::new(read_half, codec),
            Arc::clone(registry),
            inbound,
        )
        .instrument(span.clone()),
    );
    tokio::spawn(
        run_writer(
            Arc::clone(&session),
            FramedWrite::new(write_half, codec),
            rx,
            Arc::clone(registry),
        )
        .instrument(span),
    );

    session
}

/// Decodes frames from the peer until EOF, an error, or teardown.
pub async fn run_reader<R>(
    session: Arc<ClientSession>,
    mut frames: FramedRead<R, FrameCodec>,
    registry: Arc<ClientRegistry>,
    inbound: mpsc::Sender<InboundPacket>,
) where
    R: AsyncRead + Unpin,
{
    debug!("Reader started");

    loop {
        tokio::select! {
            () = session.closed() => {
                debug!("Session closed elsewhere, reader exiting");
                break;
            }
            next = frames.next() => match next {
                Some(Ok(Frame::LocalAddress(address))) => {
                    session.last_activity.touch();
                    match registry.claim_address(session.id(), address) {
                        Ok(previous) => {
                            session.record_claim(address);
                            match previous {
                                Some(owner) => info!(
                                    address = %address,
                                    previous_owner = %owner,
                                    "Address taken over"
                                ),
                                None => info!(address = %address, "Address claimed"),
                            }
                        }
                        Err(e) => {
                            debug!(address = %address, error = %e, "Claim rejected");
                            break;
                        }
                    }
                }
                Some(Ok(Frame::IpPacket(packet))) => {
                    session.last_activity.touch();
                    session.stats.record_in(packet.len());
                    trace!(destination = %packet.destination, len = packet.len(), "Packet from peer");

                    if inbound
                        .send(InboundPacket::from_client(session.id(), packet))
                        .await
                        .is_err()
                    {
                        debug!("Inbound queue closed");
                        break;
                    }
                }
                Some(Err(e)) => {
                    if e.is_protocol_error() {
                        warn!(error = %e, "Invalid frame from peer");
                    } else {
                        info!(error = %e, "Peer connection failed");
                    }
                    break;
                }
                None => {
                    info!("Peer closed connection");
                    break;
                }
            }
        }
    }

    session.teardown(&registry, TeardownOrigin::Reader);
}

/// Writes queued packets to the peer until the queue closes or a write fails.
pub async fn run_writer<W>(
    session: Arc<ClientSession>,
    mut sink: FramedWrite<W, FrameCodec>,
    mut outbound: mpsc::Receiver<RawPacket>,
    registry: Arc<ClientRegistry>,
) where
    W: AsyncWrite + Unpin,
{
    debug!("Writer started");

    while let Some(packet) = outbound.recv().await {
        let len = packet.len();
        if let Err(e) = sink.send(Frame::IpPacket(packet)).await {
            warn!(error = %e, "Write to peer failed");
            if let Err(e) = sink.get_mut().shutdown().await {
                debug!(error = %e, "Socket shutdown failed");
            }
            session.teardown(&registry, TeardownOrigin::Writer);
            return;
        }
        session.stats.record_out(len);
        session.last_activity.touch();
    }

    debug!("Outbound queue closed, writer exiting");
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Socket close failed");
    }
}

// ============================================
// Tests
// ============================================
