// ============================================
// File: crates/tunhub-transport/src/route/mod.rs
// ============================================
//! # Route Configuration
//!
//! ## Creation Reason
//! Host network configuration (link state, interface address, routes,
//! default gateway) happens once at startup and once at shutdown. It is
//! kept behind `RouteConfigurator` so the packet path never touches it
//! and so it can be swapped per platform or recorded in tests.
//!
//! ## Main Functionality
//! - `RouteConfigurator`: the capability set the server needs
//! - `RouteManager`: applies changes and remembers how to undo them
//! - `parse_default_gateway`: reads the default route out of
//!   `/proc/net/route` text
//!
//! ## Teardown Order
//! ```text
//! startup:   link up ─► address ─► routes ─► default gateway
//! teardown:  default gateway restored ─► routes deleted (reverse) ─► link down
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Teardown is best-effort: a failing step is logged and the rest
//!   still run
//! - Only changes that succeeded are recorded, so teardown never undoes
//!   something that was never applied
//!
//! ## Last Modified
//! v0.1.0 - Initial route configuration layer

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use tunhub_common::types::InterfaceAddress;

use crate::error::Result;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "linux")]
pub use linux::IpCommandConfigurator;

#[cfg(any(test, feature = "mock"))]
pub use mock::{RecordingConfigurator, RouteCall};

// ============================================
// RouteConfigurator Trait
// ============================================

/// Host network configuration backend.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the server holds one for its
/// whole lifetime and calls it from the startup and shutdown paths.
#[async_trait]
pub trait RouteConfigurator: Send + Sync {
    /// Sets the administrative state, MTU and transmit queue length of
    /// an interface.
    async fn set_link_state(&self, device: &str, up: bool, mtu: u16, tx_queue_len: u32)
        -> Result<()>;

    /// Assigns an address (with prefix length) to an interface.
    async fn assign_address(&self, device: &str, address: InterfaceAddress) -> Result<()>;

    /// Installs `gateway` as the default route through `device`.
    async fn set_default_gateway(&self, gateway: IpAddr, device: &str) -> Result<()>;

    /// Removes a default route previously installed through `device`.
    async fn remove_default_gateway(&self, gateway: IpAddr, device: &str) -> Result<()>;

    /// Adds a route to `destination` via `via` on `device`.
    async fn add_route(&self, destination: IpAddr, via: IpAddr, device: &str) -> Result<()>;

    /// Deletes a route to `destination` via `via` on `device`.
    async fn delete_route(&self, destination: IpAddr, via: IpAddr, device: &str) -> Result<()>;

    /// Reads the host's current default gateway and its interface.
    ///
    /// # Errors
    /// Returns `GatewayNotFound` if there is no default route.
    async fn default_gateway(&self) -> Result<(IpAddr, String)>;
}

// ============================================
// Teardown Plan
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteEntry {
    destination: IpAddr,
    via: IpAddr,
    device: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GatewayChange {
    installed: (IpAddr, String),
    previous: Option<(IpAddr, String)>,
}

#[derive(Debug, Clone)]
struct LinkState {
    device: String,
    mtu: u16,
    tx_queue_len: u32,
}

#[derive(Debug, Default)]
struct TeardownPlan {
    routes: Vec<RouteEntry>,
    gateway: Option<GatewayChange>,
    link: Option<LinkState>,
}

// ============================================
// RouteManager
// ============================================

/// Applies host configuration and records how to revert it.
///
/// # Example
/// ```ignore
/// let routes = RouteManager::new(IpCommandConfigurator::new());
/// routes.bring_up("tun0", "10.0.0.1/24".parse()?, 1500, 300).await?;
/// routes.add_route(dest, via, "tun0").await?;
/// // ... run ...
/// routes.teardown().await;
/// ```
pub struct RouteManager<C> {
    configurator: C,
    plan: Mutex<TeardownPlan>,
}

impl<C: RouteConfigurator> RouteManager<C> {
    /// Wraps a configurator.
    #[must_use]
    pub fn new(configurator: C) -> Self {
        Self {
            configurator,
            plan: Mutex::new(TeardownPlan::default()),
        }
    }

    /// Returns the underlying configurator.
    #[must_use]
    pub const fn configurator(&self) -> &C {
        &self.configurator
    }

    /// Brings `device` up and assigns its address.
    ///
    /// # Errors
    /// Returns the first configurator error. If the link came up but the
    /// address failed, the link is still recorded for teardown.
    pub async fn bring_up(
        &self,
        device: &str,
        address: InterfaceAddress,
        mtu: u16,
        tx_queue_len: u32,
    ) -> Result<()> {
        self.configurator
            .set_link_state(device, true, mtu, tx_queue_len)
            .await?;
        self.plan.lock().link = Some(LinkState {
            device: device.to_string(),
            mtu,
            tx_queue_len,
        });

        self.configurator.assign_address(device, address).await?;
        info!(device = %device, address = %address, mtu, "Interface configured");
        Ok(())
    }

    /// Adds a static route and records its deletion.
    ///
    /// # Errors
    /// Returns the configurator error; nothing is recorded on failure.
    pub async fn add_route(&self, destination: IpAddr, via: IpAddr, device: &str) -> Result<()> {
        self.configurator.add_route(destination, via, device).await?;
        self.plan.lock().routes.push(RouteEntry {
            destination,
            via,
            device: device.to_string(),
        });
        debug!(destination = %destination, via = %via, device = %device, "Route added");
        Ok(())
    }

    /// Installs a new default gateway, remembering the current one.
    ///
    /// # Errors
    /// Returns the configurator error from installing the gateway. A
    /// missing previous gateway is not an error.
    pub async fn replace_default_gateway(&self, gateway: IpAddr, device: &str) -> Result<()> {
        let previous = match self.configurator.default_gateway().await {
            Ok(previous) => Some(previous),
            Err(e) => {
                debug!(error = %e, "No previous default gateway to restore");
                None
            }
        };

        self.configurator.set_default_gateway(gateway, device).await?;
        info!(
            gateway = %gateway,
            device = %device,
            previous = ?previous,
            "Default gateway replaced"
        );

        let mut plan = self.plan.lock();
        // Keep the original gateway if this is called more than once
        let previous = plan
            .gateway
            .take()
            .map_or(previous, |earlier| earlier.previous);
        plan.gateway = Some(GatewayChange {
            installed: (gateway, device.to_string()),
            previous,
        });
        Ok(())
    }

    /// Returns the number of recorded static routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.plan.lock().routes.len()
    }

    /// Reverts every recorded change.
    ///
    /// Safe to call more than once; later calls find nothing to undo.
    /// Returns the number of steps that failed.
    pub async fn teardown(&self) -> usize {
        let plan = std::mem::take(&mut *self.plan.lock());
        let mut failures = 0;

        if let Some(change) = plan.gateway {
            let (gateway, device) = &change.installed;
            let result = match &change.previous {
                Some((previous, previous_device)) => {
                    self.configurator
                        .set_default_gateway(*previous, previous_device)
                        .await
                }
                None => self.configurator.remove_default_gateway(*gateway, device).await,
            };
            if let Err(e) = result {
                warn!(gateway = %gateway, error = %e, "Failed to restore default gateway");
                failures += 1;
            }
        }

        for route in plan.routes.iter().rev() {
            if let Err(e) = self
                .configurator
                .delete_route(route.destination, route.via, &route.device)
                .await
            {
                warn!(destination = %route.destination, error = %e, "Failed to delete route");
                failures += 1;
            }
        }

        if let Some(link) = plan.link {
            if let Err(e) = self
                .configurator
                .set_link_state(&link.device, false, link.mtu, link.tx_queue_len)
                .await
            {
                warn!(device = %link.device, error = %e, "Failed to bring interface down");
                failures += 1;
            }
        }

        if failures == 0 {
            debug!("Route teardown complete");
        }
        failures
    }
}

impl<C> std::fmt::Debug for RouteManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plan = self.plan.lock();
        f.debug_struct("RouteManager")
            .field("routes", &plan.routes.len())
            .field("gateway", &plan.gateway)
            .field("link", &plan.link.as_ref().map(|l| l.device.as_str()))
            .finish_non_exhaustive()
    }
}

// ============================================
// /proc/net/route Parsing
// ============================================

/// Finds the default route in the text of `/proc/net/route`.
///
/// The default route is the row whose destination and mask are both
/// `00000000`. The gateway column is a little-endian hex IPv4 address.
///
/// # Example
/// ```
/// use tunhub_transport::route::parse_default_gateway;
///
/// let table = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\n\
///              eth0\t00000000\t0100A8C0\t0003\t0\t0\t100\t00000000\n";
/// let (gw, dev) = parse_default_gateway(table).unwrap();
/// assert_eq!(gw.to_string(), "192.168.0.1");
/// assert_eq!(dev, "eth0");
/// ```
#[must_use]
pub fn parse_default_gateway(table: &str) -> Option<(Ipv4Addr, String)> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (iface, destination, gateway, mask) =
            (fields.first()?, fields.get(1)?, fields.get(2)?, fields.get(7)?);

        if *destination != "00000000" || *mask != "00000000" {
            return None;
        }

        let raw = u32::from_str_radix(gateway, 16).ok()?;
        Some((Ipv4Addr::from(raw.to_le_bytes()), (*iface).to_string()))
    })
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0000A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0100A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
";

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_default_gateway() {
        let (gw, dev) = parse_default_gateway(ROUTE_TABLE).unwrap();
        assert_eq!(gw, Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(dev, "eth0");
    }

    #[test]
    fn test_parse_default_gateway_missing() {
        let table = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\n\
                     eth0\t0000A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\n";
        assert!(parse_default_gateway(table).is_none());
        assert!(parse_default_gateway("").is_none());
        assert!(parse_default_gateway("header\nshort line\n").is_none());
    }

    #[tokio::test]
    async fn test_bring_up_and_teardown_order() {
        let routes = RouteManager::new(RecordingConfigurator::new());

        routes
            .bring_up("tun0", "10.0.0.1/24".parse().unwrap(), 1500, 300)
            .await
            .unwrap();
        routes
            .add_route(addr("192.168.50.0"), addr("10.0.0.2"), "tun0")
            .await
            .unwrap();
        routes
            .add_route(addr("192.168.60.0"), addr("10.0.0.3"), "tun0")
            .await
            .unwrap();
        assert_eq!(routes.route_count(), 2);

        assert_eq!(routes.teardown().await, 0);

        let calls = routes.configurator().calls();
        assert_eq!(
            calls[4..],
            [
                RouteCall::DeleteRoute {
                    destination: addr("192.168.60.0"),
                    via: addr("10.0.0.3"),
                    device: "tun0".into(),
                },
                RouteCall::DeleteRoute {
                    destination: addr("192.168.50.0"),
                    via: addr("10.0.0.2"),
                    device: "tun0".into(),
                },
                RouteCall::SetLinkState {
                    device: "tun0".into(),
                    up: false,
                    mtu: 1500,
                    tx_queue_len: 300,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let routes = RouteManager::new(RecordingConfigurator::new());
        routes
            .add_route(addr("192.168.50.0"), addr("10.0.0.2"), "tun0")
            .await
            .unwrap();

        routes.teardown().await;
        let after_first = routes.configurator().calls().len();
        routes.teardown().await;

        assert_eq!(routes.configurator().calls().len(), after_first);
        assert_eq!(routes.route_count(), 0);
    }

    #[tokio::test]
    async fn test_gateway_restored_on_teardown() {
        let configurator =
            RecordingConfigurator::new().with_default_gateway(addr("192.168.0.1"), "eth0");
        let routes = RouteManager::new(configurator);

        routes
            .replace_default_gateway(addr("10.0.0.254"), "tun0")
            .await
            .unwrap();
        routes
            .replace_default_gateway(addr("10.0.0.253"), "tun0")
            .await
            .unwrap();
        routes.teardown().await;

        let last = routes.configurator().calls().pop().unwrap();
        assert_eq!(
            last,
            RouteCall::SetDefaultGateway {
                gateway: addr("192.168.0.1"),
                device: "eth0".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_gateway_removed_when_none_before() {
        let routes = RouteManager::new(RecordingConfigurator::new());

        routes
            .replace_default_gateway(addr("10.0.0.254"), "tun0")
            .await
            .unwrap();
        routes.teardown().await;

        let last = routes.configurator().calls().pop().unwrap();
        assert_eq!(
            last,
            RouteCall::RemoveDefaultGateway {
                gateway: addr("10.0.0.254"),
                device: "tun0".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_failed_route_is_not_recorded() {
        let routes = RouteManager::new(RecordingConfigurator::new());
        routes.configurator().set_failing(true);

        assert!(routes
            .add_route(addr("192.168.50.0"), addr("10.0.0.2"), "tun0")
            .await
            .is_err());
        assert_eq!(routes.route_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_continues_after_failure() {
        let routes = RouteManager::new(RecordingConfigurator::new());
        routes
            .bring_up("tun0", "10.0.0.1/24".parse().unwrap(), 1500, 300)
            .await
            .unwrap();
        routes
            .add_route(addr("192.168.50.0"), addr("10.0.0.2"), "tun0")
            .await
            .unwrap();

        routes.configurator().set_failing(true);
        assert_eq!(routes.teardown().await, 2);
    }
}
