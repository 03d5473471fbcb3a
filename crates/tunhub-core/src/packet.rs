// ============================================
// File: crates/tunhub-core/src/packet.rs
// ============================================
//! # Raw IP Packets
//!
//! ## Creation Reason
//! Every packet the server moves, whether read from the TUN device or
//! decoded from a peer frame, is carried as a `RawPacket`: the untouched
//! datagram plus the two header fields routing needs.
//!
//! ## Header Fields Used
//! ```text
//! IPv4                              IPv6
//! ┌────────┬──────────────────┐     ┌────────┬──────────────────┐
//! │ off 0  │ version (hi 4b)  │     │ off 0  │ version (hi 4b)  │
//! │ off 9  │ protocol         │     │ off 6  │ next header      │
//! │ off 16 │ destination (4)  │     │ off 24 │ destination (16) │
//! └────────┴──────────────────┘     └────────┴──────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `raw` is `Bytes`: moving a packet between queues never copies the
//!   payload and nothing mutates it after construction
//! - Only the fixed header is inspected; IPv6 extension headers are
//!   not walked, so `protocol` is the first next-header value
//!
//! ## Last Modified
//! v0.1.0 - Initial packet model

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::Bytes;

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Minimum IPv4 header size.
pub const IPV4_HEADER_MIN_SIZE: usize = 20;

/// Fixed IPv6 header size.
pub const IPV6_HEADER_SIZE: usize = 40;

const IPV4_PROTOCOL_OFFSET: usize = 9;
const IPV4_DST_OFFSET: usize = 16;
const IPV6_NEXT_HEADER_OFFSET: usize = 6;
const IPV6_DST_OFFSET: usize = 24;

// ============================================
// RawPacket
// ============================================

/// A captured network-layer datagram.
///
/// # Example
/// ```
/// use bytes::Bytes;
/// use tunhub_core::RawPacket;
///
/// let mut header = vec![0u8; 20];
/// header[0] = 0x45;
/// header[9] = 17; // UDP
/// header[16..20].copy_from_slice(&[10, 0, 0, 5]);
///
/// let packet = RawPacket::parse(Bytes::from(header)).unwrap();
/// assert_eq!(packet.destination.to_string(), "10.0.0.5");
/// assert_eq!(packet.protocol, 17);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// The datagram exactly as captured.
    pub raw: Bytes,
    /// Destination address from the IP header.
    pub destination: IpAddr,
    /// Upper-layer protocol number (IPv4 protocol / IPv6 next header).
    pub protocol: u8,
}

impl RawPacket {
    /// Creates a packet from already-known header fields.
    #[must_use]
    pub const fn new(raw: Bytes, destination: IpAddr, protocol: u8) -> Self {
        Self {
            raw,
            destination,
            protocol,
        }
    }

    /// Parses the destination and protocol out of a raw datagram.
    ///
    /// # Errors
    /// Returns `MalformedPacket` if the buffer is shorter than the fixed
    /// header or the version nibble is neither 4 nor 6.
    pub fn parse(raw: Bytes) -> Result<Self> {
        let (destination, protocol) = parse_header(&raw)?;
        Ok(Self::new(raw, destination, protocol))
    }

    /// Returns the datagram length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the datagram is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns `true` if the destination is a multicast address.
    #[must_use]
    pub const fn is_multicast(&self) -> bool {
        self.destination.is_multicast()
    }
}

// ============================================
// Header Parsing
// ============================================

/// Extracts `(destination, protocol)` from an IPv4 or IPv6 header.
///
/// # Errors
/// Returns `MalformedPacket` for short buffers or unknown versions.
pub fn parse_header(packet: &[u8]) -> Result<(IpAddr, u8)> {
    let Some(&first) = packet.first() else {
        return Err(CoreError::malformed_packet("empty packet"));
    };

    match first >> 4 {
        4 => {
            if packet.len() < IPV4_HEADER_MIN_SIZE {
                return Err(CoreError::malformed_packet(format!(
                    "IPv4 packet of {} bytes is shorter than the {} byte header",
                    packet.len(),
                    IPV4_HEADER_MIN_SIZE
                )));
            }
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&packet[IPV4_DST_OFFSET..IPV4_DST_OFFSET + 4]);
            Ok((
                IpAddr::V4(Ipv4Addr::from(octets)),
                packet[IPV4_PROTOCOL_OFFSET],
            ))
        }
        6 => {
            if packet.len() < IPV6_HEADER_SIZE {
                return Err(CoreError::malformed_packet(format!(
                    "IPv6 packet of {} bytes is shorter than the {} byte header",
                    packet.len(),
                    IPV6_HEADER_SIZE
                )));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&packet[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16]);
            Ok((
                IpAddr::V6(Ipv6Addr::from(octets)),
                packet[IPV6_NEXT_HEADER_OFFSET],
            ))
        }
        version => Err(CoreError::malformed_packet(format!(
            "unsupported IP version {version}"
        ))),
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_ipv4_packet(dst: Ipv4Addr, protocol: u8) -> Vec<u8> {
        let mut packet = vec![0u8; 28];
        packet[0] = 0x45; // Version 4, IHL 5
        packet[3] = 28; // Total length
        packet[IPV4_PROTOCOL_OFFSET] = protocol;
        packet[12..16].copy_from_slice(&[10, 0, 0, 1]);
        packet[IPV4_DST_OFFSET..IPV4_DST_OFFSET + 4].copy_from_slice(&dst.octets());
        packet
    }

    fn create_test_ipv6_packet(dst: Ipv6Addr, next_header: u8) -> Vec<u8> {
        let mut packet = vec![0u8; 48];
        packet[0] = 0x60;
        packet[IPV6_NEXT_HEADER_OFFSET] = next_header;
        packet[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16].copy_from_slice(&dst.octets());
        packet
    }

    #[test]
    fn test_parse_ipv4() {
        let dst = Ipv4Addr::new(10, 0, 0, 5);
        let packet = RawPacket::parse(Bytes::from(create_test_ipv4_packet(dst, 6))).unwrap();

        assert_eq!(packet.destination, IpAddr::V4(dst));
        assert_eq!(packet.protocol, 6);
        assert_eq!(packet.len(), 28);
        assert!(!packet.is_multicast());
    }

    #[test]
    fn test_parse_ipv6() {
        let dst: Ipv6Addr = "fd00::5".parse().unwrap();
        let packet = RawPacket::parse(Bytes::from(create_test_ipv6_packet(dst, 58))).unwrap();

        assert_eq!(packet.destination, IpAddr::V6(dst));
        assert_eq!(packet.protocol, 58);
    }

    #[test]
    fn test_parse_short_packets() {
        assert!(RawPacket::parse(Bytes::new()).is_err());
        assert!(RawPacket::parse(Bytes::from_static(&[0x45, 0x00])).is_err());

        let mut v6 = vec![0u8; 39];
        v6[0] = 0x60;
        assert!(RawPacket::parse(Bytes::from(v6)).is_err());
    }

    #[test]
    fn test_parse_unknown_version() {
        let mut packet = vec![0u8; 40];
        packet[0] = 0x50;

        let err = RawPacket::parse(Bytes::from(packet)).unwrap_err();
        assert!(matches!(err, CoreError::MalformedPacket { .. }));
    }

    #[test]
    fn test_multicast_detection() {
        let v4 = RawPacket::parse(Bytes::from(create_test_ipv4_packet(
            Ipv4Addr::new(224, 0, 0, 251),
            17,
        )))
        .unwrap();
        assert!(v4.is_multicast());

        let v6 = RawPacket::parse(Bytes::from(create_test_ipv6_packet(
            "ff02::1".parse().unwrap(),
            58,
        )))
        .unwrap();
        assert!(v6.is_multicast());
    }
}
