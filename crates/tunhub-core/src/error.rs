// ============================================
// File: crates/tunhub-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types for wire framing and IP packet parsing in the
//! TunHub core crate.
//!
//! ## Error Categories
//! 1. **Protocol Errors**: unknown tags, bad lengths, truncated frames
//! 2. **Packet Errors**: IP headers that cannot be parsed
//! 3. **I/O Errors**: surfaced through `tokio_util::codec` framing
//!
//! ## ⚠️ Important Note for Next Developer
//! - A protocol error on a stream is never recoverable; callers tear the
//!   connection down instead of trying to resynchronize
//! - `From<io::Error>` is required by `tokio_util::codec::Decoder`
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use tunhub_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for framing and packet parsing.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Protocol Errors
    // ========================================

    /// Unknown or unsupported frame tag.
    #[error("Unknown frame type: 0x{0:02x}")]
    UnknownFrameType(u8),

    /// The reserved tag 0 was received.
    #[error("Reserved frame type 0x00 is never valid on the wire")]
    ReservedFrameType,

    /// Frame is malformed.
    #[error("Malformed frame: {reason}")]
    MalformedMessage {
        /// What's wrong with the frame
        reason: String,
    },

    /// Buffer is too short to hold the value being decoded.
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum expected length
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Payload exceeds the configured maximum.
    #[error("Message too large: max {max} bytes, got {actual}")]
    MessageTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Actual size received
        actual: usize,
    },

    /// Address length prefix is neither 4 nor 16.
    #[error("Invalid address length: {0} (expected 4 or 16)")]
    InvalidAddressLength(u8),

    // ========================================
    // Packet Errors
    // ========================================

    /// Raw IP datagram could not be parsed.
    #[error("Malformed IP packet: {reason}")]
    MalformedPacket {
        /// Why the packet was rejected
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates a `MessageTooShort` error.
    #[must_use]
    pub const fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Creates a `MessageTooLarge` error.
    #[must_use]
    pub const fn too_large(max: usize, actual: usize) -> Self {
        Self::MessageTooLarge { max, actual }
    }

    /// Creates a `MalformedPacket` error.
    pub fn malformed_packet(reason: impl Into<String>) -> Self {
        Self::MalformedPacket {
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this is a wire protocol error.
    ///
    /// Protocol errors mean the byte stream is out of sync with the
    /// framing and the connection must be dropped.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownFrameType(_)
                | Self::ReservedFrameType
                | Self::MalformedMessage { .. }
                | Self::MessageTooShort { .. }
                | Self::MessageTooLarge { .. }
                | Self::InvalidAddressLength(_)
        )
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::UnknownFrameType(0xAB);
        assert!(err.to_string().contains("0xab"));

        let err = CoreError::too_large(1500, 9000);
        assert!(err.to_string().contains("1500"));
        assert!(err.to_string().contains("9000"));
    }

    #[test]
    fn test_error_classification() {
        assert!(CoreError::ReservedFrameType.is_protocol_error());
        assert!(CoreError::InvalidAddressLength(5).is_protocol_error());
        assert!(!CoreError::malformed_packet("short").is_protocol_error());

        let io = CoreError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(matches!(io, CoreError::Io(_)));
        assert!(!io.is_protocol_error());
    }

    #[test]
    fn test_common_error_conversion() {
        let common = CommonError::out_of_range("prefix_len", 40, 0, 32);
        let core: CoreError = common.into();
        assert!(matches!(core, CoreError::Common(_)));
    }
}
