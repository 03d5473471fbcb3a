// ============================================
// File: crates/tunhub-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifiers and address types that cross crate
//! boundaries so the registry, the router and the configuration layer
//! all speak the same types.
//!
//! ## Main Functionality
//! - `ClientId`: server-unique, monotonically assigned session identifier
//! - `InterfaceAddress`: an interface address with its prefix length
//!   (`10.0.0.1/24`), used for TUN configuration
//!
//! ## ⚠️ Important Note for Next Developer
//! - `ClientId` values are never reused; the registry is the only
//!   component allowed to mint them
//! - `InterfaceAddress` serializes as its CIDR string so TOML configs
//!   stay human-readable
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// ClientId
// ============================================

/// Identifier of a connected peer session.
///
/// Assigned by the connection registry at accept time, starting at 0
/// and strictly increasing for the lifetime of the server.
///
/// # Example
/// ```
/// use tunhub_common::types::ClientId;
///
/// let id = ClientId::new(7);
/// assert_eq!(id.value(), 7);
/// assert_eq!(id.to_string(), "7");
/// assert!(ClientId::new(8) > id);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Wraps a raw identifier value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the identifier that follows this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ClientId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ClientId> for u64 {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

// ============================================
// InterfaceAddress
// ============================================

/// An interface address together with its network prefix length.
///
/// # Format
/// Parsed from and displayed as CIDR notation: `10.0.0.1/24`,
/// `fd00::1/64`.
///
/// # Example
/// ```
/// use tunhub_common::types::InterfaceAddress;
/// use std::net::{IpAddr, Ipv4Addr};
///
/// let addr: InterfaceAddress = "10.0.0.1/24".parse().unwrap();
/// assert_eq!(addr.prefix_len(), 24);
/// assert_eq!(addr.netmask(), IpAddr::V4(Ipv4Addr::new(255, 255, 255, 0)));
/// assert!(addr.contains(&"10.0.0.9".parse().unwrap()));
/// assert!(!addr.contains(&"10.0.1.9".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceAddress {
    addr: IpAddr,
    prefix_len: u8,
}

impl InterfaceAddress {
    /// Creates an interface address, validating the prefix length
    /// against the address family.
    ///
    /// # Errors
    /// Returns `OutOfRange` if the prefix exceeds 32 (IPv4) or 128 (IPv6).
    pub fn new(addr: IpAddr, prefix_len: u8) -> crate::Result<Self> {
        let max = Self::max_prefix(&addr);
        if prefix_len > max {
            return Err(CommonError::out_of_range("prefix_len", prefix_len, 0, max));
        }
        Ok(Self { addr, prefix_len })
    }

    /// Creates an IPv4 interface address, clamping the prefix to 32.
    #[must_use]
    pub fn from_v4(addr: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            addr: IpAddr::V4(addr),
            prefix_len: prefix_len.min(32),
        }
    }

    /// Returns the host address.
    #[must_use]
    pub const fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Returns the prefix length.
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns the netmask corresponding to the prefix length.
    #[must_use]
    pub fn netmask(&self) -> IpAddr {
        match self.addr {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(Self::mask_v4(self.prefix_len))),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(Self::mask_v6(self.prefix_len))),
        }
    }

    /// Returns the network address (host bits cleared).
    #[must_use]
    pub fn network(&self) -> IpAddr {
        match self.addr {
            IpAddr::V4(v4) => {
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & Self::mask_v4(self.prefix_len)))
            }
            IpAddr::V6(v6) => {
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & Self::mask_v6(self.prefix_len)))
            }
        }
    }

    /// Checks whether `ip` falls inside this address's network.
    ///
    /// Addresses of the other family never match.
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = Self::mask_v4(self.prefix_len);
                (u32::from(net) & mask) == (u32::from(*ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = Self::mask_v6(self.prefix_len);
                (u128::from(net) & mask) == (u128::from(*ip) & mask)
            }
            _ => false,
        }
    }

    const fn max_prefix(addr: &IpAddr) -> u8 {
        match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    const fn mask_v4(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            !0u32 << (32 - prefix_len as u32)
        }
    }

    const fn mask_v6(prefix_len: u8) -> u128 {
        if prefix_len == 0 {
            0
        } else {
            !0u128 << (128 - prefix_len as u32)
        }
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for InterfaceAddress {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| CommonError::parse("interface address", s, "expected CIDR notation"))?;

        let addr: IpAddr = addr
            .trim()
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                CommonError::parse("interface address", s, e.to_string())
            })?;

        let prefix_len: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| CommonError::parse("interface address", s, "invalid prefix length"))?;

        Self::new(addr, prefix_len)
    }
}

impl Serialize for InterfaceAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InterfaceAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_ordering() {
        let first = ClientId::new(0);
        let second = first.next();

        assert!(second > first);
        assert_eq!(second.value(), 1);
        assert_eq!(u64::from(second), 1);
    }

    #[test]
    fn test_client_id_json_is_plain_number() {
        let json = serde_json::to_string(&ClientId::new(42)).unwrap();
        assert_eq!(json, "42");

        let back: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ClientId::new(42));
    }

    #[test]
    fn test_interface_address_parse_v4() {
        let addr: InterfaceAddress = "10.0.0.1/24".parse().unwrap();

        assert_eq!(addr.addr(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(addr.prefix_len(), 24);
        assert_eq!(addr.network(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)));
        assert_eq!(addr.to_string(), "10.0.0.1/24");
    }

    #[test]
    fn test_interface_address_parse_v6() {
        let addr: InterfaceAddress = "fd00::1/64".parse().unwrap();

        assert_eq!(addr.prefix_len(), 64);
        assert!(addr.contains(&"fd00::abcd".parse().unwrap()));
        assert!(!addr.contains(&"fd01::1".parse().unwrap()));
        assert!(!addr.contains(&"10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_interface_address_rejects_bad_input() {
        assert!("10.0.0.1".parse::<InterfaceAddress>().is_err());
        assert!("10.0.0.1/33".parse::<InterfaceAddress>().is_err());
        assert!("10.0.0/24".parse::<InterfaceAddress>().is_err());
        assert!("10.0.0.1/abc".parse::<InterfaceAddress>().is_err());
        assert!("fd00::1/129".parse::<InterfaceAddress>().is_err());
    }

    #[test]
    fn test_interface_address_edge_prefixes() {
        let any: InterfaceAddress = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains(&"8.8.8.8".parse().unwrap()));
        assert_eq!(any.netmask(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let host: InterfaceAddress = "10.0.0.5/32".parse().unwrap();
        assert!(host.contains(&"10.0.0.5".parse().unwrap()));
        assert!(!host.contains(&"10.0.0.6".parse().unwrap()));
    }

    #[test]
    fn test_interface_address_from_v4_clamps() {
        let addr = InterfaceAddress::from_v4(Ipv4Addr::new(10, 0, 0, 1), 40);
        assert_eq!(addr.prefix_len(), 32);
    }

    #[test]
    fn test_interface_address_serde_as_string() {
        let addr: InterfaceAddress = "10.0.0.1/24".parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"10.0.0.1/24\"");

        let back: InterfaceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
