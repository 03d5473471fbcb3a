// ============================================
// File: crates/tunhub-core/src/protocol/messages.rs
// ============================================
//! # Frame Definitions
//!
//! ## Creation Reason
//! Defines the values exchanged between peers and the server, separate
//! from how they are laid out on the wire.
//!
//! ## Frame Layout
//! | Frame | Body |
//! |-------|------|
//! | IPPacket | `raw_len:u16` `raw` `address` `protocol:u8` |
//! | LocalAddress | `address` |
//!
//! `address` is `addr_len:u8` followed by 4 or 16 octets.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Tag values are part of the protocol; never renumber them
//! - Add new frame kinds at the end with a fresh tag
//!
//! ## Last Modified
//! v0.1.0 - Initial frame definitions

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::packet::RawPacket;

// ============================================
// Constants
// ============================================

/// Default upper bound on an encapsulated packet (device read buffer size).
pub const DEFAULT_MAX_PACKET_LEN: usize = 4096;

/// Encoded length of an IPv4 address body.
pub const IPV4_ADDR_LEN: u8 = 4;

/// Encoded length of an IPv6 address body.
pub const IPV6_ADDR_LEN: u8 = 16;

/// Size of the tag byte.
pub const TAG_SIZE: usize = 1;

/// Size of the `raw_len` prefix on an `IPPacket` body.
pub const RAW_LEN_SIZE: usize = 2;

// ============================================
// FrameType
// ============================================

/// Frame tag identifier.
///
/// # Values
/// | Value | Type |
/// |-------|------|
/// | 0x00 | Unknown (reserved) |
/// | 0x01 | IPPacket |
/// | 0x02 | LocalAddress |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    /// Reserved; never valid on the wire.
    Unknown = 0x00,
    /// An encapsulated IP datagram.
    IpPacket = 0x01,
    /// An address the peer claims as local to it.
    LocalAddress = 0x02,
}

impl FrameType {
    /// Converts a byte to a `FrameType`.
    ///
    /// Returns `None` for tags outside the known set.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Unknown),
            0x01 => Some(Self::IpPacket),
            0x02 => Some(Self::LocalAddress),
            _ => None,
        }
    }

    /// Returns the byte representation.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::IpPacket => write!(f, "IPPacket"),
            Self::LocalAddress => write!(f, "LocalAddress"),
        }
    }
}

// ============================================
// Frame
// ============================================

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An IP datagram travelling through the tunnel.
    IpPacket(RawPacket),
    /// The peer claims `addr` as one of its local addresses.
    LocalAddress(IpAddr),
}

impl Frame {
    /// Returns the tag this frame is encoded with.
    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        match self {
            Self::IpPacket(_) => FrameType::IpPacket,
            Self::LocalAddress(_) => FrameType::LocalAddress,
        }
    }

    /// Returns the encoded size of this frame in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::IpPacket(packet) => {
                TAG_SIZE + RAW_LEN_SIZE + packet.raw.len() + address_len(&packet.destination) + 1
            }
            Self::LocalAddress(addr) => TAG_SIZE + address_len(addr),
        }
    }
}

impl From<RawPacket> for Frame {
    fn from(packet: RawPacket) -> Self {
        Self::IpPacket(packet)
    }
}

/// Encoded size of an address including its length prefix.
#[must_use]
pub const fn address_len(addr: &IpAddr) -> usize {
    match addr {
        IpAddr::V4(_) => 1 + IPV4_ADDR_LEN as usize,
        IpAddr::V6(_) => 1 + IPV6_ADDR_LEN as usize,
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::from_byte(0x00), Some(FrameType::Unknown));
        assert_eq!(FrameType::from_byte(0x01), Some(FrameType::IpPacket));
        assert_eq!(FrameType::from_byte(0x02), Some(FrameType::LocalAddress));
        assert_eq!(FrameType::from_byte(0x03), None);
        assert_eq!(FrameType::from_byte(0xFF), None);

        assert_eq!(FrameType::LocalAddress.as_byte(), 0x02);
    }

    #[test]
    fn test_encoded_len() {
        let v4 = Frame::LocalAddress("10.0.0.5".parse().unwrap());
        assert_eq!(v4.encoded_len(), 6);

        let v6 = Frame::LocalAddress("fd00::5".parse().unwrap());
        assert_eq!(v6.encoded_len(), 18);

        let packet = RawPacket::new(Bytes::from(vec![0u8; 28]), "10.0.0.5".parse().unwrap(), 6);
        let frame = Frame::from(packet);
        assert_eq!(frame.frame_type(), FrameType::IpPacket);
        assert_eq!(frame.encoded_len(), 1 + 2 + 28 + 5 + 1);
    }
}
