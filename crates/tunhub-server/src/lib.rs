// ============================================
// File: crates/tunhub-server/src/lib.rs
// ============================================
//! # TunHub Server Library
//!
//! ## Creation Reason
//! Provides the tunnel engine: it multiplexes IP traffic between a TUN
//! device and TCP-connected peers, routing each packet to the peer that
//! claimed its destination or back out through the device.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Server configuration management
//! - [`server`]: Main server orchestration
//! - [`services`]: Connection state
//!   - [`services::registry`]: Sessions and claimed addresses
//!   - [`services::session`]: Per-peer reader/writer loops
//! - [`handlers`]: Packet routing
//! - [`error`]: Server-specific error types
//! - [`logging`]: Tracing subscriber setup
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TunHub Server                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐    │
//! │  │   Config    │────►│   Server    │────►│  PacketRouter   │    │
//! │  │             │     │ Orchestrator│     │                 │    │
//! │  └─────────────┘     └──────┬──────┘     └────────┬────────┘    │
//! │                             │                     │             │
//! │                ┌────────────┴─────────┐           │             │
//! │                ▼                      ▼           ▼             │
//! │         ┌─────────────┐        ┌─────────────────────┐          │
//! │         │  Sessions   │◄──────►│   ClientRegistry    │          │
//! │         └─────────────┘        └─────────────────────┘          │
//! │                                                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                       Transport Layer                           │
//! │  ┌──────────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │  PeerListener    │  │  TUN Device  │  │  RouteManager    │   │
//! │  │  (TCP peers)     │  │ (IP packets) │  │  (ip route/link) │   │
//! │  └──────────────────┘  └──────────────┘  └──────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Server requires root or `CAP_NET_ADMIN` for TUN and routes
//! - Configuration changes require restart (no hot-reload)
//! - The tunnel is neither encrypted nor authenticated
//!
//! ## Last Modified
//! v0.1.0 - Initial server library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod server;
pub mod services;

// Re-export primary types
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::Server;
