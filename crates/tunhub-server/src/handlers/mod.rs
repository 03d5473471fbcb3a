// ============================================
// File: crates/tunhub-server/src/handlers/mod.rs
// ============================================
//! # Packet Handlers
//!
//! ## Creation Reason
//! Holds the routing decision applied by the dispatch loop to every
//! packet on the shared inbound queue.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`router`]: `PacketRouter` and the inbound packet envelope
//!
//! ## Data Flow
//! ```text
//! TUN → device read loop ─┐
//!                         ├─► inbound queue → dispatch → PacketRouter
//! Peer → session reader ──┘                                  │
//!                                    ┌───────────────────────┤
//!                                    ▼                       ▼
//!                          session outbound queue     device queue
//!                                    │                       │
//!                                    ▼                       ▼
//!                             session writer → Peer   device write → TUN
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Routing is on the critical path: no I/O besides the queue push
//!
//! ## Last Modified
//! v0.1.0 - Initial handlers structure

pub mod router;

pub use router::{InboundPacket, PacketOrigin, PacketRouter, RouteDecision};
