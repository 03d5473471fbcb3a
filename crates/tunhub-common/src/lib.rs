// ============================================
// File: crates/tunhub-common/src/lib.rs
// ============================================
//! # TunHub Common - Shared Types
//!
//! ## Creation Reason
//! Holds the small set of types every TunHub crate agrees on: client
//! identifiers, interface addresses and lock-free timestamps.
//!
//! ## Main Functionality
//! - [`types`]: `ClientId`, `InterfaceAddress`
//! - [`time`]: `AtomicInstant` for per-session activity tracking
//! - [`error`]: `CommonError` and its `Result` alias
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               tunhub-server                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │    tunhub-core         tunhub-transport             │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │             tunhub-common  ◄── You are here         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Leaf crate: no internal dependencies, keep external ones minimal
//! - Everything public implements `Debug`, `Clone` and friends
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

pub use error::{CommonError, Result};
pub use time::AtomicInstant;
pub use types::{ClientId, InterfaceAddress};
