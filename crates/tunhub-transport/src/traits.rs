// ============================================
// File: crates/tunhub-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Puts the TUN device behind a trait so the server loops can run
//! against the kernel device in production and an in-memory device in
//! tests.
//!
//! ## Main Functionality
//! - `TunDevice`: packet-oriented read/write on a virtual interface
//! - `TunConfig`: creation parameters for a TUN device
//!
//! ## ⚠️ Important Note for Next Developer
//! - Implementations must be Send + Sync; the read and write loops share
//!   one device handle through an `Arc`
//! - Interface address/link configuration is not part of `TunDevice`;
//!   it belongs to the route configurator
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use async_trait::async_trait;

use tunhub_common::types::InterfaceAddress;

use crate::error::{Result, TransportError};

// ============================================
// Constants
// ============================================

/// Smallest MTU accepted for a TUN device.
pub const MIN_MTU: u16 = 576;

/// Largest MTU accepted for a TUN device.
pub const MAX_MTU: u16 = 9000;

/// Linux interface names are limited to `IFNAMSIZ - 1` bytes.
pub const MAX_DEVICE_NAME_LEN: usize = 15;

/// Default transmit queue length for the interface.
pub const DEFAULT_TX_QUEUE_LEN: u32 = 300;

// ============================================
// TunDevice Trait
// ============================================

/// Abstract interface for TUN device operations.
///
/// # Data Format
/// Data read from and written to the TUN device is raw IP packets
/// (no Ethernet headers, no packet information prefix).
///
/// # Example
/// ```ignore
/// async fn pump<T: TunDevice>(tun: &T) -> Result<()> {
///     let mut buf = [0u8; 4096];
///     loop {
///         let len = tun.read(&mut buf).await?;
///         // IP packet in buf[..len]
///     }
/// }
/// ```
#[async_trait]
pub trait TunDevice: Send + Sync {
    /// Reads one IP packet from the device.
    ///
    /// # Returns
    /// Number of bytes read
    ///
    /// # Errors
    /// Returns `TunReadFailed` if the device cannot be read.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes one IP packet to the device.
    ///
    /// # Returns
    /// Number of bytes written, which may be less than `buf.len()`
    ///
    /// # Errors
    /// Returns `TunWriteFailed` if the device cannot be written.
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Returns the device name.
    fn name(&self) -> &str;

    /// Returns the MTU (Maximum Transmission Unit).
    fn mtu(&self) -> u16;
}

// ============================================
// TunConfig
// ============================================

/// Configuration for TUN device creation.
///
/// # Example
/// ```
/// use tunhub_transport::traits::TunConfig;
///
/// let config = TunConfig::new("tun0")
///     .with_address("10.0.0.1/24".parse().unwrap())
///     .with_mtu(1500)
///     .with_tx_queue_len(300);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct TunConfig {
    /// Device name (e.g., "tun0").
    pub name: String,
    /// Interface address and prefix length.
    pub address: InterfaceAddress,
    /// MTU size.
    pub mtu: u16,
    /// Interface transmit queue length.
    pub tx_queue_len: u32,
}

impl TunConfig {
    /// Creates a new TUN configuration with defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: default_address(),
            mtu: 1500,
            tx_queue_len: DEFAULT_TX_QUEUE_LEN,
        }
    }

    /// Sets the interface address.
    #[must_use]
    pub const fn with_address(mut self, address: InterfaceAddress) -> Self {
        self.address = address;
        self
    }

    /// Sets the MTU.
    #[must_use]
    pub const fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Sets the transmit queue length.
    #[must_use]
    pub const fn with_tx_queue_len(mut self, tx_queue_len: u32) -> Self {
        self.tx_queue_len = tx_queue_len;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TransportError::invalid_config(
                "name",
                "device name cannot be empty",
            ));
        }

        if self.name.len() > MAX_DEVICE_NAME_LEN {
            return Err(TransportError::invalid_config(
                "name",
                format!("device name cannot exceed {MAX_DEVICE_NAME_LEN} characters"),
            ));
        }

        if !(MIN_MTU..=MAX_MTU).contains(&self.mtu) {
            return Err(TransportError::invalid_config(
                "mtu",
                format!("MTU must be between {MIN_MTU} and {MAX_MTU} bytes"),
            ));
        }

        if self.tx_queue_len == 0 {
            return Err(TransportError::invalid_config(
                "tx_queue_len",
                "transmit queue length must be non-zero",
            ));
        }

        Ok(())
    }
}

impl Default for TunConfig {
    fn default() -> Self {
        Self::new("tun0")
    }
}

fn default_address() -> InterfaceAddress {
    InterfaceAddress::from_v4(std::net::Ipv4Addr::new(10, 0, 0, 1), 24)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tun_config_defaults() {
        let config = TunConfig::default();

        assert_eq!(config.name, "tun0");
        assert_eq!(config.address.to_string(), "10.0.0.1/24");
        assert_eq!(config.mtu, 1500);
        assert_eq!(config.tx_queue_len, 300);
    }

    #[test]
    fn test_tun_config_builder() {
        let config = TunConfig::new("test0")
            .with_address("172.16.0.1/16".parse().unwrap())
            .with_mtu(1400)
            .with_tx_queue_len(500);

        assert_eq!(config.address.prefix_len(), 16);
        assert_eq!(config.mtu, 1400);
        assert_eq!(config.tx_queue_len, 500);
    }

    #[test]
    fn test_tun_config_validation() {
        assert!(TunConfig::new("tun0").validate().is_ok());

        // Empty name
        assert!(TunConfig::new("").validate().is_err());

        // Name too long
        assert!(TunConfig::new("a".repeat(16)).validate().is_err());
        assert!(TunConfig::new("a".repeat(15)).validate().is_ok());

        // MTU bounds
        assert!(TunConfig::new("tun0").with_mtu(575).validate().is_err());
        assert!(TunConfig::new("tun0").with_mtu(576).validate().is_ok());
        assert!(TunConfig::new("tun0").with_mtu(9000).validate().is_ok());
        assert!(TunConfig::new("tun0").with_mtu(9001).validate().is_err());

        // Zero queue
        assert!(TunConfig::new("tun0").with_tx_queue_len(0).validate().is_err());
    }
}
