// ============================================
// File: crates/tunhub-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the TunHub server from a TOML
//! file, with a default for every field.
//!
//! ## Main Functionality
//! - `ServerConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//!
//! ## Configuration Sections
//! - `network`: TCP listen address for peers
//! - `tun`: TUN device settings and device failure policy
//! - `routes`: Optional default gateway and static routes
//! - `limits`: Queue capacities and timing
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:9000"
//!
//! [tun]
//! device_name = "tun0"
//! address = "10.0.0.1/24"
//! mtu = 1500
//! tx_queue_len = 300
//! on_device_failure = "continue"
//!
//! [routes]
//! default_gateway = "10.0.0.254"
//! static_routes = [{ destination = "192.168.50.0", via = "10.0.0.2" }]
//!
//! [limits]
//! inbound_queue = 400
//! device_queue = 150
//! client_queue = 200
//! accept_poll_ms = 300
//! shutdown_grace_secs = 5
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require server restart
//! - Queue capacities bound memory: each slot holds one packet
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use tunhub_common::types::InterfaceAddress;
use tunhub_transport::traits::{self, TunConfig as DeviceConfig};

use crate::error::{Result, ServerError};

// ============================================
// ServerConfig
// ============================================

/// Main server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// TUN device configuration.
    #[serde(default)]
    pub tun: TunConfig,

    /// Host routes installed at startup.
    #[serde(default)]
    pub routes: RoutesConfig,

    /// Queue capacities and timing.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed, or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!(path = %path_str, "Loading configuration");

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the string cannot be parsed or validated.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.tun.validate()?;
        self.routes.validate(&self.tun.address)?;
        self.limits.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    ///
    /// # Errors
    /// Returns `Internal` if the configuration cannot be represented as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ServerError::internal(format!("TOML serialization failed: {e}")))
    }

    /// Returns the TUN device creation parameters.
    #[must_use]
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(&self.tun.device_name)
            .with_address(self.tun.address)
            .with_mtu(self.tun.mtu)
            .with_tx_queue_len(self.tun.tx_queue_len)
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP listen address for peers.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9000))
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.listen_addr.port() == 0 {
            return Err(ServerError::config_invalid(
                "network.listen_addr",
                "port cannot be 0",
            ));
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

// ============================================
// TunConfig
// ============================================

/// What the server does when a device loop fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFailurePolicy {
    /// Keep routing between peers; only device traffic is lost.
    #[default]
    Continue,
    /// Stop the whole server.
    Shutdown,
}

impl fmt::Display for DeviceFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// TUN device configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunConfig {
    /// TUN device name.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Interface address in CIDR notation.
    #[serde(default = "default_tun_address")]
    pub address: InterfaceAddress,

    /// MTU size.
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Interface transmit queue length.
    #[serde(default = "default_tx_queue_len")]
    pub tx_queue_len: u32,

    /// Reaction to a fatal device read/write error.
    #[serde(default)]
    pub on_device_failure: DeviceFailurePolicy,
}

fn default_device_name() -> String {
    "tun0".to_string()
}

fn default_tun_address() -> InterfaceAddress {
    InterfaceAddress::from_v4(Ipv4Addr::new(10, 0, 0, 1), 24)
}

fn default_mtu() -> u16 {
    1500
}

fn default_tx_queue_len() -> u32 {
    traits::DEFAULT_TX_QUEUE_LEN
}

impl TunConfig {
    fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() {
            return Err(ServerError::config_invalid(
                "tun.device_name",
                "cannot be empty",
            ));
        }

        if self.device_name.len() > traits::MAX_DEVICE_NAME_LEN {
            return Err(ServerError::config_invalid(
                "tun.device_name",
                "cannot exceed 15 characters",
            ));
        }

        if self.device_name.chars().any(char::is_whitespace) {
            return Err(ServerError::config_invalid(
                "tun.device_name",
                "cannot contain whitespace",
            ));
        }

        if self.mtu < traits::MIN_MTU {
            return Err(ServerError::config_invalid(
                "tun.mtu",
                "must be at least 576",
            ));
        }

        if self.mtu > traits::MAX_MTU {
            return Err(ServerError::config_invalid(
                "tun.mtu",
                "cannot exceed 9000",
            ));
        }

        if self.tx_queue_len == 0 {
            return Err(ServerError::config_invalid(
                "tun.tx_queue_len",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for TunConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            address: default_tun_address(),
            mtu: default_mtu(),
            tx_queue_len: default_tx_queue_len(),
            on_device_failure: DeviceFailurePolicy::default(),
        }
    }
}

// ============================================
// RoutesConfig
// ============================================

/// A static route installed through the TUN device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Destination host or network address.
    pub destination: IpAddr,
    /// Next hop.
    pub via: IpAddr,
}

/// Host routes section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Replace the host default gateway with this address on the TUN device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<IpAddr>,

    /// Routes added at startup and removed at shutdown.
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
}

impl RoutesConfig {
    /// Next hops are reached through the tunnel, so they must sit on its
    /// network.
    fn validate(&self, tunnel: &InterfaceAddress) -> Result<()> {
        let network = format!("{}/{}", tunnel.network(), tunnel.prefix_len());

        if let Some(gateway) = self.default_gateway {
            if !tunnel.contains(&gateway) {
                return Err(ServerError::config_invalid(
                    "routes.default_gateway",
                    format!("{gateway} is outside the tunnel network {network}"),
                ));
            }
        }

        for (i, route) in self.static_routes.iter().enumerate() {
            if route.destination.is_ipv4() != route.via.is_ipv4() {
                return Err(ServerError::config_invalid(
                    format!("routes.static_routes[{i}]"),
                    "destination and via must be the same address family",
                ));
            }
            if !tunnel.contains(&route.via) {
                return Err(ServerError::config_invalid(
                    format!("routes.static_routes[{i}].via"),
                    format!("{} is outside the tunnel network {network}", route.via),
                ));
            }
        }
        Ok(())
    }
}

// ============================================
// LimitsConfig
// ============================================

/// Queue capacities and timing section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Shared inbound queue (device reads and peer packets).
    #[serde(default = "default_inbound_queue")]
    pub inbound_queue: usize,

    /// Device outbound queue.
    #[serde(default = "default_device_queue")]
    pub device_queue: usize,

    /// Per-client outbound queue.
    #[serde(default = "default_client_queue")]
    pub client_queue: usize,

    /// Accept loop wait between shutdown checks, in milliseconds.
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,

    /// How long shutdown waits for each loop, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_inbound_queue() -> usize {
    400
}

fn default_device_queue() -> usize {
    150
}

fn default_client_queue() -> usize {
    200
}

fn default_accept_poll_ms() -> u64 {
    300
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("limits.inbound_queue", self.inbound_queue),
            ("limits.device_queue", self.device_queue),
            ("limits.client_queue", self.client_queue),
        ] {
            if value == 0 {
                return Err(ServerError::config_invalid(field, "must be greater than 0"));
            }
        }

        if self.accept_poll_ms == 0 {
            return Err(ServerError::config_invalid(
                "limits.accept_poll_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Returns the accept loop poll interval.
    #[must_use]
    pub const fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    /// Returns the per-loop shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            inbound_queue: default_inbound_queue(),
            device_queue: default_device_queue(),
            client_queue: default_client_queue(),
            accept_poll_ms: default_accept_poll_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        crate::logging::build_filter(&self.level, None).map(|_| ())
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.network.listen_addr.port(), 9000);
        assert_eq!(config.tun.device_name, "tun0");
        assert_eq!(config.tun.on_device_failure, DeviceFailurePolicy::Continue);
        assert_eq!(config.limits.inbound_queue, 400);
        assert_eq!(config.limits.device_queue, 150);
        assert_eq!(config.limits.client_queue, 200);
        assert_eq!(config.limits.accept_poll(), Duration::from_millis(300));
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [network]
            listen_addr = "127.0.0.1:9100"

            [tun]
            device_name = "tun7"
            address = "10.8.0.1/16"
            mtu = 1400
            tx_queue_len = 500
            on_device_failure = "shutdown"

            [routes]
            default_gateway = "10.8.0.254"
            static_routes = [
                { destination = "192.168.50.0", via = "10.8.0.2" },
                { destination = "192.168.60.0", via = "10.8.0.3" },
            ]

            [limits]
            inbound_queue = 10
            device_queue = 20
            client_queue = 30
            accept_poll_ms = 50
            shutdown_grace_secs = 2

            [logging]
            level = "debug"
        "#;

        let config = ServerConfig::from_str(toml).unwrap();
        assert_eq!(config.network.listen_addr.port(), 9100);
        assert_eq!(config.tun.address.prefix_len(), 16);
        assert_eq!(config.tun.on_device_failure, DeviceFailurePolicy::Shutdown);
        assert_eq!(config.routes.default_gateway, Some("10.8.0.254".parse().unwrap()));
        assert_eq!(config.routes.static_routes.len(), 2);
        assert_eq!(config.limits.client_queue, 30);
        assert_eq!(config.logging.level, "debug");

        let device = config.device_config();
        assert_eq!(device.name, "tun7");
        assert_eq!(device.mtu, 1400);
        assert_eq!(device.tx_queue_len, 500);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = ServerConfig::from_str("[tun]\nmtu = 1400\n").unwrap();
        assert_eq!(config.tun.mtu, 1400);
        assert_eq!(config.tun.device_name, "tun0");
        assert_eq!(config.network.listen_addr.port(), 9000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "[network]\nlisten_addr = \"0.0.0.0:0\"\n",
            "[tun]\ndevice_name = \"\"\n",
            "[tun]\ndevice_name = \"a-very-long-device\"\n",
            "[tun]\nmtu = 100\n",
            "[tun]\nmtu = 9001\n",
            "[limits]\nclient_queue = 0\n",
            "[limits]\naccept_poll_ms = 0\n",
            "[routes]\nstatic_routes = [{ destination = \"fd00::1\", via = \"10.0.0.2\" }]\n",
            "[logging]\nlevel = \"tunhub=loud\"\n",
        ];

        for case in cases {
            let err = ServerConfig::from_str(case).unwrap_err();
            assert!(err.is_config_error(), "expected config error for {case:?}");
        }
    }

    #[test]
    fn test_bad_cidr_is_rejected() {
        assert!(ServerConfig::from_str("[tun]\naddress = \"10.0.0.1\"\n").is_err());
        assert!(ServerConfig::from_str("[tun]\naddress = \"10.0.0.1/40\"\n").is_err());
        assert!(ServerConfig::from_str("[tun]\non_device_failure = \"panic\"\n").is_err());
    }

    #[test]
    fn test_next_hops_must_be_on_tunnel_network() {
        let err = ServerConfig::from_str("[routes]\ndefault_gateway = \"192.168.1.1\"\n").unwrap_err();
        assert!(matches!(err, ServerError::ConfigInvalid { ref field, .. } if field == "routes.default_gateway"));

        let err = ServerConfig::from_str(
            "[routes]\nstatic_routes = [{ destination = \"192.168.50.0\", via = \"10.0.1.2\" }]\n",
        )
        .unwrap_err();
        assert!(
            matches!(err, ServerError::ConfigInvalid { ref field, .. } if field == "routes.static_routes[0].via")
        );

        // Same next hop is fine once the tunnel network covers it
        let config = ServerConfig::from_str(
            "[tun]\naddress = \"10.0.0.1/16\"\n\n[routes]\ndefault_gateway = \"10.0.1.254\"\nstatic_routes = [{ destination = \"192.168.50.0\", via = \"10.0.1.2\" }]\n",
        )
        .unwrap();
        assert_eq!(config.routes.static_routes.len(), 1);
    }

    #[test]
    fn test_log_level_checked_at_load() {
        let err = ServerConfig::from_str("[logging]\nlevel = \"tunhub=loud\"\n").unwrap_err();
        assert!(matches!(err, ServerError::ConfigInvalid { ref field, .. } if field == "logging.level"));

        let config = ServerConfig::from_str("[logging]\nlevel = \"tunhub_server=trace,warn\"\n").unwrap();
        assert_eq!(config.logging.level, "tunhub_server=trace,warn");
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = ServerConfig::default();
        config.routes.static_routes.push(StaticRoute {
            destination: "192.168.50.0".parse().unwrap(),
            via: "10.0.0.2".parse().unwrap(),
        });

        let text = config.to_toml().unwrap();
        let back = ServerConfig::from_str(&text).unwrap();

        assert_eq!(back.tun.address, config.tun.address);
        assert_eq!(back.routes.static_routes, config.routes.static_routes);
        assert!(back.routes.default_gateway.is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = ServerConfig::load("/nonexistent/tunhub.toml").await.unwrap_err();
        assert!(matches!(err, ServerError::ConfigLoad { .. }));
    }
}
