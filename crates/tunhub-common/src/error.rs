// ============================================
// File: crates/tunhub-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Base error enum wrapped by the per-crate error types so that
//! parsing failures of shared types propagate with `?`.
//!
//! ## Main Functionality
//! - `CommonError`: validation and parse failures
//! - `Result<T>`: alias using `CommonError`
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Errors shared across TunHub crates.
///
/// # Example
/// ```
/// use tunhub_common::error::{CommonError, Result};
///
/// fn check_prefix(prefix: u8) -> Result<()> {
///     if prefix > 32 {
///         return Err(CommonError::out_of_range("prefix", prefix, 0, 32));
///     }
///     Ok(())
/// }
///
/// assert!(check_prefix(33).is_err());
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    /// Value is out of acceptable range.
    #[error("Value out of range for '{field}': {value} not in [{min}, {max}]")]
    OutOfRange {
        /// Name of the field or parameter
        field: String,
        /// The value that was out of range
        value: String,
        /// Minimum acceptable value
        min: String,
        /// Maximum acceptable value
        max: String,
    },

    /// Failed to parse a textual representation.
    #[error("Failed to parse {kind} from '{input}': {reason}")]
    Parse {
        /// What was being parsed (e.g. "interface address")
        kind: String,
        /// The offending input
        input: String,
        /// Why parsing failed
        reason: String,
    },
}

impl CommonError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `OutOfRange` error.
    pub fn out_of_range(
        field: impl Into<String>,
        value: impl std::fmt::Display,
        min: impl std::fmt::Display,
        max: impl std::fmt::Display,
    ) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Creates a `Parse` error.
    pub fn parse(
        kind: impl Into<String>,
        input: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Parse {
            kind: kind.into(),
            input: input.into(),
            reason: reason.into(),
        }
    }
}

// ============================================
// Tests
// ============================================
