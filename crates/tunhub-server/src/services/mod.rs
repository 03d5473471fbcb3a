// ============================================
// File: crates/tunhub-server/src/services/mod.rs
// ============================================
//! # Server Services
//!
//! ## Creation Reason
//! Connection state for the TunHub server, separated from the routing
//! decision and from transport setup.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`registry`]: Live sessions and claimed addresses
//! - [`session`]: Per-peer state and the reader/writer loops
//!
//! ## Service Interactions
//! 1. The accept loop calls `start_session`, which registers the session
//! 2. The session reader claims addresses in the registry
//! 3. The router looks destinations up in the registry
//! 4. Either session loop tears the session down, removing it from the
//!    registry exactly once
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod registry;
pub mod session;

// Re-export primary types
pub use registry::ClientRegistry;
pub use session::{ClientSession, QueueOutcome, SessionState, TeardownOrigin};
