// ============================================
// File: crates/tunhub-server/src/handlers/router.rs
// ============================================
//! # Packet Router
//!
//! ## Creation Reason
//! Decides where every packet on the shared inbound queue goes: to the
//! peer that claimed its destination, or out through the TUN device.
//!
//! ## Decision Order
//! ```text
//! InboundPacket
//!      │
//!      ▼
//! multicast? ──yes──► drop (no side effect)
//!      │ no
//!      ▼
//! registry.lookup(dst) ──found + active──► session.queue_ip()  (never blocks)
//!      │ not found / closing
//!      ▼
//! device_tx.send().await                                       (backpressure)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only the dispatch loop calls `route`, so routing decisions are
//!   serialized; the registry lock is held for the lookup only
//! - The device path blocks on a full queue on purpose; do not switch it
//!   to `try_send`
//!
//! ## Last Modified
//! v0.1.0 - Initial router

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use tunhub_common::types::ClientId;
use tunhub_core::RawPacket;

use crate::services::registry::ClientRegistry;
use crate::services::session::QueueOutcome;

// ============================================
// InboundPacket
// ============================================

/// Where a packet on the inbound queue came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOrigin {
    /// Read from the TUN device.
    Device,
    /// Sent by a connected peer.
    Client(ClientId),
}

/// A packet waiting for a routing decision.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    /// Source of the packet.
    pub origin: PacketOrigin,
    /// The packet itself.
    pub packet: RawPacket,
}

impl InboundPacket {
    /// Wraps a packet read from the device.
    #[must_use]
    pub const fn from_device(packet: RawPacket) -> Self {
        Self {
            origin: PacketOrigin::Device,
            packet,
        }
    }

    /// Wraps a packet sent by client `id`.
    #[must_use]
    pub const fn from_client(id: ClientId, packet: RawPacket) -> Self {
        Self {
            origin: PacketOrigin::Client(id),
            packet,
        }
    }
}

// ============================================
// RouteDecision
// ============================================

/// What the router did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Multicast destination; discarded.
    DroppedMulticast,
    /// Handed to a session's outbound queue.
    Client {
        /// Owning session.
        id: ClientId,
        /// Result of the enqueue.
        outcome: QueueOutcome,
    },
    /// Queued for the device write loop.
    Device,
    /// Device write loop is gone; discarded.
    DeviceUnavailable,
}

// ============================================
// PacketRouter
// ============================================

/// Routing logic used by the dispatch loop.
pub struct PacketRouter {
    registry: Arc<ClientRegistry>,
    device_tx: mpsc::Sender<RawPacket>,
}

impl PacketRouter {
    /// Creates a router that falls back to `device_tx`.
    #[must_use]
    pub const fn new(registry: Arc<ClientRegistry>, device_tx: mpsc::Sender<RawPacket>) -> Self {
        Self {
            registry,
            device_tx,
        }
    }

    /// Routes one packet.
    ///
    /// Never fails; a full client queue or a dead device loop discards
    /// the packet.
    pub async fn route(&self, inbound: InboundPacket) -> RouteDecision {
        let InboundPacket { origin, packet } = inbound;

        if packet.is_multicast() {
            trace!(origin = ?origin, destination = %packet.destination, "Multicast dropped");
            return RouteDecision::DroppedMulticast;
        }

        if let Some((id, session)) = self.registry.lookup(&packet.destination) {
            if session.is_active() {
                trace!(
                    origin = ?origin,
                    destination = %packet.destination,
                    client_id = %id,
                    "Routing to client"
                );
                let outcome = session.queue_ip(packet);
                return RouteDecision::Client { id, outcome };
            }
            debug!(
                client_id = %id,
                destination = %packet.destination,
                "Owner is closing, routing to device"
            );
        }

        trace!(origin = ?origin, destination = %packet.destination, "Routing to device");
        match self.device_tx.send(packet).await {
            Ok(()) => RouteDecision::Device,
            Err(mpsc::error::SendError(packet)) => {
                debug!(
                    destination = %packet.destination,
                    "Device writer stopped, packet discarded"
                );
                RouteDecision::DeviceUnavailable
            }
        }
    }
}

impl std::fmt::Debug for PacketRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketRouter")
            .field("registry", &self.registry)
            .field("device_closed", &self.device_tx.is_closed())
            .finish()
    }
}

// ============================================
// Tests
// ============================================
