// ============================================
// File: crates/tunhub-transport/src/tun/mod.rs
// ============================================
//! # TUN Device Module
//!
//! ## Creation Reason
//! Provides the packet-oriented virtual interface the server reads
//! outbound traffic from and writes peer traffic into.
//!
//! ## Platform Implementations
//! - `linux`: Uses `/dev/net/tun` with `IFF_TUN | IFF_NO_PI`
//! - `mock`: In-memory implementation for testing
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     User Space                            │
//! │  ┌────────────────┐          ┌────────────────────────┐   │
//! │  │  Application   │          │    TunHub Server       │   │
//! │  └───────┬────────┘          └───────────┬────────────┘   │
//! │          │ IP packets                    │ read/write     │
//! │          ▼                               ▼                │
//! ├───────────────────────────────────────────────────────────┤
//! │                     Kernel Space                          │
//! │  ┌────────────────────────────────────────────────────┐   │
//! │  │                  TUN Device (tun0)                 │   │
//! │  └────────────────────────────────────────────────────┘   │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - TUN operations require root or `CAP_NET_ADMIN`
//! - Device names are limited to 15 characters on Linux
//!
//! ## Last Modified
//! v0.1.0 - Initial TUN module structure

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "linux")]
pub use linux::LinuxTun;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTun;
