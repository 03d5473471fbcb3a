// ============================================
// File: crates/tunhub-core/src/lib.rs
// ============================================
//! # TunHub Core - Wire Protocol & Packet Model
//!
//! ## Creation Reason
//! Defines what travels between the server and its peers and what a
//! captured IP datagram looks like once it is inside the server.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - Frame tags and frame values (`FrameType`, `Frame`)
//! - `FrameCodec`: tag + length-prefixed framing over a byte stream
//!
//! ### Packet Module ([`packet`])
//! - `RawPacket`: immutable datagram with parsed destination and protocol
//! - IPv4 / IPv6 header field extraction
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               tunhub-server                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │    tunhub-core  ◄──    tunhub-transport             │
//! │    You are here               │                     │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │             tunhub-common                           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Peers are built independently: any change to the frame layout is
//!   a breaking protocol change and needs a new tag, not a new layout
//! - No I/O happens in this crate; it only transforms bytes
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod packet;
pub mod protocol;

pub use error::{CoreError, Result};
pub use packet::RawPacket;
pub use protocol::{decode_frame, encode_frame, Frame, FrameCodec, FrameType};
