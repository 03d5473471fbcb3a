// ============================================
// File: crates/tunhub-core/src/protocol/codec.rs
// ============================================
//! # Frame Codec
//!
//! ## Creation Reason
//! Turns the peer byte stream into discrete frames and back. The stream
//! has no external delimiter, so every boundary comes from the tag and
//! the length prefixes.
//!
//! ## Main Functionality
//! - `FrameCodec`: `tokio_util::codec` decoder/encoder for `Framed*`
//! - `encode_frame` / `decode_frame`: one-shot helpers for whole buffers
//!
//! ## Parsing Strategy
//! 1. Peek the tag and length prefixes without consuming anything
//! 2. Validate each prefix as soon as it is visible
//! 3. Return "need more bytes" until the whole frame is buffered
//! 4. Split the frame off and parse it with `Buf`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Validation happens before buffering: a bogus length is rejected
//!   without waiting for the bytes it announces
//! - `raw` is split out of the read buffer, not copied
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{CoreError, Result};
use crate::packet::RawPacket;
use crate::protocol::messages::{
    Frame, FrameType, DEFAULT_MAX_PACKET_LEN, IPV4_ADDR_LEN, IPV6_ADDR_LEN, RAW_LEN_SIZE,
    TAG_SIZE,
};

// ============================================
// FrameCodec
// ============================================

/// Stream codec for peer frames.
///
/// # Example
/// ```
/// use bytes::BytesMut;
/// use tokio_util::codec::{Decoder, Encoder};
/// use tunhub_core::{Frame, FrameCodec};
///
/// let mut codec = FrameCodec::new();
/// let mut buf = BytesMut::new();
/// codec.encode(Frame::LocalAddress("10.0.0.5".parse().unwrap()), &mut buf).unwrap();
///
/// let frame = codec.decode(&mut buf).unwrap().unwrap();
/// assert_eq!(frame, Frame::LocalAddress("10.0.0.5".parse().unwrap()));
/// assert!(buf.is_empty());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_packet_len: usize,
}

impl FrameCodec {
    /// Creates a codec with the default packet limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
        }
    }

    /// Sets the largest accepted `IPPacket` payload.
    ///
    /// Values above what the `u16` prefix can express are clamped.
    #[must_use]
    pub fn with_max_packet_len(mut self, max_packet_len: usize) -> Self {
        self.max_packet_len = max_packet_len.min(usize::from(u16::MAX));
        self
    }

    /// Returns the largest accepted `IPPacket` payload.
    #[must_use]
    pub const fn max_packet_len(&self) -> usize {
        self.max_packet_len
    }

    /// Computes the length of the frame at the start of `buf` without
    /// consuming it.
    ///
    /// # Returns
    /// - `Ok(Some(len))` - A complete frame of `len` bytes is buffered
    /// - `Ok(None)` - Incomplete frame, need more data
    /// - `Err(_)` - Invalid tag or length prefix
    pub fn frame_len(&self, buf: &[u8]) -> Result<Option<usize>> {
        let Some(&tag) = buf.first() else {
            return Ok(None);
        };

        match FrameType::from_byte(tag) {
            None => Err(CoreError::UnknownFrameType(tag)),
            Some(FrameType::Unknown) => Err(CoreError::ReservedFrameType),
            Some(FrameType::IpPacket) => {
                let header = TAG_SIZE + RAW_LEN_SIZE;
                if buf.len() < header {
                    return Ok(None);
                }
                let raw_len = usize::from(u16::from_le_bytes([buf[1], buf[2]]));
                self.check_packet_len(raw_len)?;

                let addr_at = header + raw_len;
                let Some(&addr_len) = buf.get(addr_at) else {
                    return Ok(None);
                };
                check_address_len(addr_len)?;

                let total = addr_at + 1 + usize::from(addr_len) + 1;
                Ok((buf.len() >= total).then_some(total))
            }
            Some(FrameType::LocalAddress) => {
                let Some(&addr_len) = buf.get(TAG_SIZE) else {
                    return Ok(None);
                };
                check_address_len(addr_len)?;

                let total = TAG_SIZE + 1 + usize::from(addr_len);
                Ok((buf.len() >= total).then_some(total))
            }
        }
    }

    fn check_packet_len(&self, raw_len: usize) -> Result<()> {
        if raw_len == 0 {
            return Err(CoreError::malformed("IPPacket with empty payload"));
        }
        if raw_len > self.max_packet_len {
            return Err(CoreError::too_large(self.max_packet_len, raw_len));
        }
        Ok(())
    }

    /// Parses one complete frame previously measured by `frame_len`.
    fn parse_frame(mut frame: Bytes) -> Result<Frame> {
        let tag = frame.get_u8();
        match FrameType::from_byte(tag) {
            Some(FrameType::IpPacket) => {
                let raw_len = usize::from(frame.get_u16_le());
                let raw = frame.split_to(raw_len);
                let destination = get_address(&mut frame)?;
                if !frame.has_remaining() {
                    return Err(CoreError::too_short(1, 0));
                }
                let protocol = frame.get_u8();
                Ok(Frame::IpPacket(RawPacket::new(raw, destination, protocol)))
            }
            Some(FrameType::LocalAddress) => Ok(Frame::LocalAddress(get_address(&mut frame)?)),
            Some(FrameType::Unknown) => Err(CoreError::ReservedFrameType),
            None => Err(CoreError::UnknownFrameType(tag)),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CoreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some(len) = self.frame_len(src)? else {
            return Ok(None);
        };
        let frame = src.split_to(len).freeze();
        Self::parse_frame(frame).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CoreError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(frame.encoded_len());
        dst.put_u8(frame.frame_type().as_byte());
        match frame {
            Frame::IpPacket(packet) => {
                self.check_packet_len(packet.raw.len())?;
                let raw_len = u16::try_from(packet.raw.len())
                    .map_err(|_| CoreError::too_large(usize::from(u16::MAX), packet.raw.len()))?;

                dst.put_u16_le(raw_len);
                dst.put_slice(&packet.raw);
                put_address(&packet.destination, dst);
                dst.put_u8(packet.protocol);
            }
            Frame::LocalAddress(addr) => {
                put_address(&addr, dst);
            }
        }
        Ok(())
    }
}

// ============================================
// Address Encoding
// ============================================

fn check_address_len(addr_len: u8) -> Result<()> {
    if addr_len == IPV4_ADDR_LEN || addr_len == IPV6_ADDR_LEN {
        Ok(())
    } else {
        Err(CoreError::InvalidAddressLength(addr_len))
    }
}

fn put_address(addr: &IpAddr, dst: &mut BytesMut) {
    match addr {
        IpAddr::V4(v4) => {
            dst.put_u8(IPV4_ADDR_LEN);
            dst.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            dst.put_u8(IPV6_ADDR_LEN);
            dst.put_slice(&v6.octets());
        }
    }
}

fn get_address(buf: &mut Bytes) -> Result<IpAddr> {
    if !buf.has_remaining() {
        return Err(CoreError::too_short(1, 0));
    }
    let addr_len = buf.get_u8();
    check_address_len(addr_len)?;

    let needed = usize::from(addr_len);
    if buf.remaining() < needed {
        return Err(CoreError::too_short(needed, buf.remaining()));
    }

    if addr_len == IPV4_ADDR_LEN {
        let mut octets = [0u8; 4];
        buf.copy_to_slice(&mut octets);
        Ok(IpAddr::V4(Ipv4Addr::from(octets)))
    } else {
        let mut octets = [0u8; 16];
        buf.copy_to_slice(&mut octets);
        Ok(IpAddr::V6(Ipv6Addr::from(octets)))
    }
}

// ============================================
// One-shot Helpers
// ============================================

/// Encodes a single frame with the default codec.
///
/// # Errors
/// Returns an error if an `IPPacket` payload is empty or too large.
pub fn encode_frame(frame: Frame) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    FrameCodec::new().encode(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Decodes a buffer holding exactly one frame.
///
/// # Errors
/// Returns an error if the frame is invalid, incomplete, or followed by
/// trailing bytes.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let mut buf = BytesMut::from(bytes);
    let frame = FrameCodec::new()
        .decode(&mut buf)?
        .ok_or_else(|| CoreError::malformed(format!("incomplete frame of {} bytes", bytes.len())))?;

    if !buf.is_empty() {
        return Err(CoreError::malformed(format!(
            "{} trailing bytes after frame",
            buf.len()
        )));
    }
    Ok(frame)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn sample_packet() -> RawPacket {
        let mut raw = vec![0u8; 28];
        raw[0] = 0x45;
        raw[9] = 17;
        raw[16..20].copy_from_slice(&[10, 0, 0, 6]);
        RawPacket::new(Bytes::from(raw), "10.0.0.6".parse().unwrap(), 17)
    }

    #[test]
    fn test_ip_packet_wire_layout() {
        let packet = RawPacket::new(
            Bytes::from_static(&[0xAA, 0xBB, 0xCC]),
            "10.0.0.5".parse().unwrap(),
            6,
        );
        let encoded = encode_frame(Frame::IpPacket(packet)).unwrap();

        assert_eq!(
            encoded.as_ref(),
            &[0x01, 0x03, 0x00, 0xAA, 0xBB, 0xCC, 0x04, 10, 0, 0, 5, 6]
        );
    }

    #[test]
    fn test_local_address_wire_layout() {
        let encoded = encode_frame(Frame::LocalAddress("10.0.0.5".parse().unwrap())).unwrap();
        assert_eq!(encoded.as_ref(), &[0x02, 0x04, 10, 0, 0, 5]);
    }

    #[test]
    fn test_ip_packet_roundtrip() {
        let packet = sample_packet();
        let encoded = encode_frame(Frame::IpPacket(packet.clone())).unwrap();

        match decode_frame(&encoded).unwrap() {
            Frame::IpPacket(decoded) => {
                assert_eq!(decoded.raw, packet.raw);
                assert_eq!(decoded.destination, packet.destination);
                assert_eq!(decoded.protocol, packet.protocol);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_ipv6_local_address_roundtrip() {
        let frame = Frame::LocalAddress("fd00::1234".parse().unwrap());
        let encoded = encode_frame(frame.clone()).unwrap();

        assert_eq!(encoded.len(), 18);
        assert_eq!(encoded[1], 16);
        assert_eq!(decode_frame(&encoded).unwrap(), frame);
    }

    #[test]
    fn test_partial_input_consumes_nothing() {
        let encoded = encode_frame(Frame::IpPacket(sample_packet())).unwrap();
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        for (i, byte) in encoded.iter().enumerate() {
            assert!(codec.decode(&mut buf).unwrap().is_none());
            assert_eq!(buf.len(), i);
            buf.put_u8(*byte);
        }

        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::LocalAddress("10.0.0.5".parse().unwrap()), &mut buf)
            .unwrap();
        codec.encode(Frame::IpPacket(sample_packet()), &mut buf).unwrap();

        assert!(matches!(codec.decode(&mut buf).unwrap(), Some(Frame::LocalAddress(_))));
        assert!(matches!(codec.decode(&mut buf).unwrap(), Some(Frame::IpPacket(_))));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_reserved_and_unknown_tags() {
        let mut codec = FrameCodec::new();

        let mut buf = BytesMut::from(&[0x00, 0x04][..]);
        assert!(matches!(codec.decode(&mut buf), Err(CoreError::ReservedFrameType)));

        let mut buf = BytesMut::from(&[0x07][..]);
        assert!(matches!(codec.decode(&mut buf), Err(CoreError::UnknownFrameType(0x07))));
    }

    #[test]
    fn test_invalid_address_length() {
        let mut codec = FrameCodec::new();

        let mut buf = BytesMut::from(&[0x02, 0x05][..]);
        assert!(matches!(codec.decode(&mut buf), Err(CoreError::InvalidAddressLength(5))));

        // Rejected as soon as the prefix is visible, before the octets arrive
        let mut buf = BytesMut::from(&[0x01, 0x01, 0x00, 0xAA, 0x08][..]);
        assert!(matches!(codec.decode(&mut buf), Err(CoreError::InvalidAddressLength(8))));
    }

    #[test]
    fn test_packet_length_limits() {
        let mut codec = FrameCodec::new().with_max_packet_len(1500);

        let mut buf = BytesMut::from(&[0x01, 0x00, 0x00][..]);
        assert!(matches!(codec.decode(&mut buf), Err(CoreError::MalformedMessage { .. })));

        let oversize = 1501u16.to_le_bytes();
        let mut buf = BytesMut::from(&[0x01, oversize[0], oversize[1]][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CoreError::MessageTooLarge { max: 1500, actual: 1501 })
        ));
    }

    #[test]
    fn test_encode_rejects_oversize_packet() {
        let mut codec = FrameCodec::new().with_max_packet_len(64);
        let packet = RawPacket::new(Bytes::from(vec![0u8; 65]), "10.0.0.5".parse().unwrap(), 6);
        let mut buf = BytesMut::new();

        let err = codec.encode(Frame::IpPacket(packet), &mut buf).unwrap_err();
        assert!(err.is_protocol_error());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_max_packet_len_clamped() {
        let codec = FrameCodec::new().with_max_packet_len(1 << 20);
        assert_eq!(codec.max_packet_len(), usize::from(u16::MAX));
    }

    #[test]
    fn test_decode_frame_rejects_trailing_bytes() {
        let mut encoded = encode_frame(Frame::LocalAddress("10.0.0.5".parse().unwrap()))
            .unwrap()
            .to_vec();
        encoded.push(0xFF);

        assert!(decode_frame(&encoded).is_err());
        assert!(decode_frame(&encoded[..3]).is_err());
    }

    #[tokio::test]
    async fn test_framed_stream() {
        let mut wire = Vec::new();
        {
            let mut writer = FramedWrite::new(&mut wire, FrameCodec::new());
            writer
                .send(Frame::LocalAddress("10.0.0.5".parse().unwrap()))
                .await
                .unwrap();
            writer.send(Frame::IpPacket(sample_packet())).await.unwrap();
        }

        let mut reader = FramedRead::new(wire.as_slice(), FrameCodec::new());
        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();

        assert_eq!(first, Frame::LocalAddress("10.0.0.5".parse().unwrap()));
        assert_eq!(second, Frame::IpPacket(sample_packet()));
        assert!(reader.next().await.is_none());
    }
}
