// ============================================
// File: crates/tunhub-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial server error definitions

use thiserror::Error;

use tunhub_common::error::CommonError;
use tunhub_common::ClientId;
use tunhub_core::error::CoreError;
use tunhub_transport::error::TransportError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        field: String,
        reason: String,
    },

    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    #[error("Server failed to start: {reason}")]
    StartupFailed {
        reason: String,
    },

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    #[must_use]
    pub fn requires_privileges(&self) -> bool {
        match self {
            Self::Transport(e) => e.requires_privileges(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::config_load("/etc/tunhub.toml", "file not found");
        assert!(err.to_string().contains("/etc/tunhub.toml"));

        let err = ServerError::ClientNotFound(ClientId::new(7));
        assert_eq!(err.to_string(), "Client not found: 7");
    }

    #[test]
    fn test_error_classification() {
        let config_err = ServerError::config_invalid("network.listen_addr", "port must be > 0");
        assert!(config_err.is_config_error());
        assert!(!config_err.requires_privileges());

        let not_found = ServerError::ClientNotFound(ClientId::new(1));
        assert!(!not_found.is_config_error());

        let tun: ServerError = TransportError::tun_create_failed("tun0", "EPERM").into();
        assert!(!tun.is_config_error());
        assert!(tun.requires_privileges());
    }
}
