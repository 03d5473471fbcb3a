// ============================================
// File: crates/tunhub-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the framing spoken on every peer connection: a one-byte tag
//! followed by a length-prefixed body.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`messages`]: Frame tags and frame values
//! - [`codec`]: Stream framing (`FrameCodec`) and one-shot helpers
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Registration                             │
//! │                                                             │
//! │  Peer ───────── LocalAddress (tag 2) ───────────► Server    │
//! │                                                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Traffic                                  │
//! │                                                             │
//! │  Peer ◄════════ IPPacket (tag 1) ═══════════════► Server    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format Principles
//! - Little-endian byte order for multi-byte integers
//! - Every variable-length field carries its own length prefix
//! - No version negotiation: new frame kinds get new tags
//!
//! ## ⚠️ Important Note for Next Developer
//! - Tag 0 is reserved and rejected on decode
//! - A decode error means the stream is out of sync; never try to skip
//!   ahead and continue
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod messages;

// Re-export primary types
pub use codec::{decode_frame, encode_frame, FrameCodec};
pub use messages::{Frame, FrameType, DEFAULT_MAX_PACKET_LEN};
