// ============================================
// File: crates/tunhub-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for everything that touches the host: the peer
//! listener, the TUN device and the routing table.
//!
//! ## Error Categories
//! 1. **Network Errors**: listener bind/accept failures
//! 2. **TUN Errors**: device creation, read/write failures
//! 3. **Route Errors**: `ip` command failures, missing default gateway
//! 4. **System Errors**: permission denied
//!
//! ## ⚠️ Important Note for Next Developer
//! - TUN creation and route changes need `CAP_NET_ADMIN`
//! - A failed TUN read/write ends the device loop that saw it; the
//!   server decides what happens next
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use tunhub_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Network Errors
    // ========================================

    /// Failed to bind to address.
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind to
        addr: SocketAddr,
        /// Why binding failed
        reason: String,
    },

    /// Address already in use.
    #[error("Address {addr} already in use")]
    AddressInUse {
        /// The address that's in use
        addr: SocketAddr,
    },

    /// Accepting a connection failed.
    #[error("Failed to accept connection: {source}")]
    AcceptFailed {
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    // ========================================
    // TUN Device Errors
    // ========================================

    /// Failed to create TUN device.
    #[error("Failed to create TUN device '{name}': {reason}")]
    TunCreateFailed {
        /// Requested device name
        name: String,
        /// Why creation failed
        reason: String,
    },

    /// TUN device read failed.
    #[error("TUN read failed: {reason}")]
    TunReadFailed {
        /// Why read failed
        reason: String,
    },

    /// TUN device write failed.
    #[error("TUN write failed: {reason}")]
    TunWriteFailed {
        /// Why write failed
        reason: String,
    },

    // ========================================
    // Route Errors
    // ========================================

    /// A host configuration command failed.
    #[error("Command `{command}` failed: {reason}")]
    RouteCommandFailed {
        /// The command line that was run
        command: String,
        /// Exit status or stderr
        reason: String,
    },

    /// No default route found in the host routing table.
    #[error("No default gateway found")]
    GatewayNotFound,

    // ========================================
    // Configuration Errors
    // ========================================

    /// Invalid configuration.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Configuration field name
        field: String,
        /// Why it's invalid
        reason: String,
    },

    // ========================================
    // System Errors
    // ========================================

    /// Permission denied for operation.
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// What operation was denied
        operation: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `BindFailed` error, or `AddressInUse` when that is the cause.
    #[must_use]
    pub fn bind_failed(addr: SocketAddr, source: &io::Error) -> Self {
        if source.kind() == io::ErrorKind::AddrInUse {
            Self::AddressInUse { addr }
        } else {
            Self::BindFailed {
                addr,
                reason: source.to_string(),
            }
        }
    }

    /// Creates a `TunCreateFailed` error.
    pub fn tun_create_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TunCreateFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `RouteCommandFailed` error.
    pub fn route_command_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RouteCommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error is transient and retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { source, .. } | Self::AcceptFailed { source } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// Returns `true` if this error requires elevated privileges.
    #[must_use]
    pub const fn requires_privileges(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. } | Self::TunCreateFailed { .. }
        )
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "unspecified I/O operation".into(),
            source: err,
        }
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
        let source = io::Error::new(io::ErrorKind::Other, "no such device");
        let err = TransportError::bind_failed("127.0.0.1:9000".parse().unwrap(), &source);
        assert!(err.to_string().contains("127.0.0.1:9000"));
        assert!(err.to_string().contains("no such device"));

        let err = TransportError::route_command_failed("ip route add", "exit status 2");
        assert!(err.to_string().contains("ip route add"));
    }

    #[test]
    fn test_bind_failed_detects_address_in_use() {
        let source = io::Error::new(io::ErrorKind::AddrInUse, "in use");
        let err = TransportError::bind_failed("0.0.0.0:9000".parse().unwrap(), &source);
        assert!(matches!(err, TransportError::AddressInUse { .. }));
    }

    #[test]
    fn test_error_classification() {
        let tun_err = TransportError::tun_create_failed("tun0", "permission denied");
        assert!(tun_err.requires_privileges());

        let read_err = TransportError::TunReadFailed {
            reason: "bad fd".into(),
        };
        assert!(!read_err.is_retryable());
        assert!(!read_err.requires_privileges());

        let aborted = TransportError::AcceptFailed {
            source: io::Error::new(io::ErrorKind::ConnectionAborted, "aborted"),
        };
        assert!(aborted.is_retryable());

        let fd_limit = TransportError::AcceptFailed {
            source: io::Error::new(io::ErrorKind::Other, "too many open files"),
        };
        assert!(!fd_limit.is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::WouldBlock, "would block");
        let transport_err: TransportError = io_err.into();
        assert!(transport_err.is_retryable());
    }
}
