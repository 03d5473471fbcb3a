// ============================================
// File: crates/tunhub-transport/src/lib.rs
// ============================================
//! # TunHub Transport - Host I/O Layer
//!
//! ## Creation Reason
//! Everything the tunnel server needs from the host lives here: the TUN
//! device, the TCP listener peers connect to, and the routing table
//! changes made at startup and undone at shutdown.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `TunDevice` trait and `TunConfig`
//! - [`tun`]: TUN device implementations (Linux, mock)
//! - [`tcp`]: `PeerListener`, socket2-bound TCP listener
//! - [`route`]: `RouteConfigurator`, `RouteManager`
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               tunhub-server                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │    tunhub-core         tunhub-transport             │
//! │                        You are here ◄──             │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │             tunhub-common                           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Platform Support
//! | Platform | TCP | TUN | Routes |
//! |----------|-----|-----|--------|
//! | Linux | ✅ | ✅ | ✅ (`ip`) |
//! | Other | ✅ | ❌ | ❌ |
//!
//! ## ⚠️ Important Note for Next Developer
//! - TUN and route operations require elevated privileges
//! - Mock implementations are available with the `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod route;
pub mod tcp;
pub mod traits;
pub mod tun;

// Re-export primary types
pub use error::{Result, TransportError};
pub use route::{parse_default_gateway, RouteConfigurator, RouteManager};
pub use tcp::PeerListener;
pub use traits::{TunConfig, TunDevice};

#[cfg(target_os = "linux")]
pub use route::IpCommandConfigurator;
#[cfg(target_os = "linux")]
pub use tun::LinuxTun;

#[cfg(any(test, feature = "mock"))]
pub use route::{RecordingConfigurator, RouteCall};
#[cfg(any(test, feature = "mock"))]
pub use tun::MockTun;
