// ============================================
// File: crates/tunhub-transport/src/route/linux.rs
// ============================================
//! # `ip` Command Route Configurator
//!
//! ## Creation Reason
//! Linux backend for `RouteConfigurator`. Runs iproute2 commands and
//! reads `/proc/net/route` for the current default gateway.
//!
//! ## Commands
//! | Operation | Command |
//! |-----------|---------|
//! | link state | `ip link set dev D up\|down mtu M txqueuelen Q` |
//! | address | `ip addr replace A/P dev D` |
//! | default gateway | `ip route replace default via G dev D` |
//! | remove gateway | `ip route del default via G dev D` |
//! | add/delete route | `ip route add\|del X via G dev D` |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Needs `CAP_NET_ADMIN`; failures surface as `RouteCommandFailed`
//!   carrying the command line and stderr
//! - `/proc/net/route` is IPv4 only
//!
//! ## Last Modified
//! v0.1.0 - Initial iproute2 backend

#![cfg(target_os = "linux")]

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use tunhub_common::types::InterfaceAddress;

use crate::error::{Result, TransportError};
use crate::route::{parse_default_gateway, RouteConfigurator};

/// Kernel routing table exposed by procfs.
const PROC_NET_ROUTE: &str = "/proc/net/route";

/// `RouteConfigurator` backed by the `ip` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpCommandConfigurator;

impl IpCommandConfigurator {
    /// Creates the configurator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs `ip` with whitespace-separated `args`.
    async fn ip(args: String) -> Result<()> {
        let command = format!("ip {args}");
        debug!(command = %command, "Running host command");

        let output = Command::new("ip")
            .args(args.split_whitespace())
            .output()
            .await
            .map_err(|e| TransportError::route_command_failed(&command, e.to_string()))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Operation not permitted") {
            return Err(TransportError::PermissionDenied { operation: command });
        }
        Err(TransportError::route_command_failed(
            command,
            format!("{}: {}", output.status, stderr.trim()),
        ))
    }
}

#[async_trait]
impl RouteConfigurator for IpCommandConfigurator {
    async fn set_link_state(
        &self,
        device: &str,
        up: bool,
        mtu: u16,
        tx_queue_len: u32,
    ) -> Result<()> {
        let state = if up { "up" } else { "down" };
        Self::ip(format!(
            "link set dev {device} {state} mtu {mtu} txqueuelen {tx_queue_len}"
        ))
        .await
    }

    async fn assign_address(&self, device: &str, address: InterfaceAddress) -> Result<()> {
        Self::ip(format!("addr replace {address} dev {device}")).await
    }

    async fn set_default_gateway(&self, gateway: IpAddr, device: &str) -> Result<()> {
        Self::ip(format!("route replace default via {gateway} dev {device}")).await
    }

    async fn remove_default_gateway(&self, gateway: IpAddr, device: &str) -> Result<()> {
        Self::ip(format!("route del default via {gateway} dev {device}")).await
    }

    async fn add_route(&self, destination: IpAddr, via: IpAddr, device: &str) -> Result<()> {
        Self::ip(format!("route add {destination} via {via} dev {device}")).await
    }

    async fn delete_route(&self, destination: IpAddr, via: IpAddr, device: &str) -> Result<()> {
        Self::ip(format!("route del {destination} via {via} dev {device}")).await
    }

    async fn default_gateway(&self) -> Result<(IpAddr, String)> {
        let table = tokio::fs::read_to_string(PROC_NET_ROUTE)
            .await
            .map_err(|e| TransportError::io(format!("reading {PROC_NET_ROUTE}"), e))?;

        parse_default_gateway(&table)
            .map(|(gateway, device)| (IpAddr::V4(gateway), device))
            .ok_or(TransportError::GatewayNotFound)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_command_is_reported() {
        // Fails without privileges, or because `ip` is not installed
        let err = IpCommandConfigurator::ip("no-such-object".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::RouteCommandFailed { .. } | TransportError::PermissionDenied { .. }
        ));
    }
}
