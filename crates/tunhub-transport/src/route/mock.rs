// ============================================
// File: crates/tunhub-transport/src/route/mock.rs
// ============================================
//! # Recording Route Configurator
//!
//! ## Creation Reason
//! Host routing changes need root and alter the test machine. This
//! configurator records every call instead so tests can assert on the
//! exact sequence.
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use tunhub_common::types::InterfaceAddress;

use crate::error::{Result, TransportError};
use crate::route::RouteConfigurator;

/// One recorded configurator call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RouteCall {
    SetLinkState {
        device: String,
        up: bool,
        mtu: u16,
        tx_queue_len: u32,
    },
    AssignAddress {
        device: String,
        address: InterfaceAddress,
    },
    SetDefaultGateway {
        gateway: IpAddr,
        device: String,
    },
    RemoveDefaultGateway {
        gateway: IpAddr,
        device: String,
    },
    AddRoute {
        destination: IpAddr,
        via: IpAddr,
        device: String,
    },
    DeleteRoute {
        destination: IpAddr,
        via: IpAddr,
        device: String,
    },
}

/// Route configurator that records calls instead of running them.
#[derive(Debug, Default)]
pub struct RecordingConfigurator {
    calls: Mutex<Vec<RouteCall>>,
    default_gateway: Mutex<Option<(IpAddr, String)>>,
    failing: AtomicBool,
}

impl RecordingConfigurator {
    /// Creates a configurator with no default gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what `default_gateway()` reports.
    #[must_use]
    pub fn with_default_gateway(self, gateway: IpAddr, device: impl Into<String>) -> Self {
        *self.default_gateway.lock() = Some((gateway, device.into()));
        self
    }

    /// Makes every subsequent mutating call fail (still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Returns a copy of every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RouteCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: RouteCall) -> Result<()> {
        let failing = self.failing.load(Ordering::Relaxed);
        let description = format!("{call:?}");
        self.calls.lock().push(call);
        if failing {
            Err(TransportError::route_command_failed(description, "simulated failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RouteConfigurator for RecordingConfigurator {
    async fn set_link_state(
        &self,
        device: &str,
        up: bool,
        mtu: u16,
        tx_queue_len: u32,
    ) -> Result<()> {
        self.record(RouteCall::SetLinkState {
            device: device.to_string(),
            up,
            mtu,
            tx_queue_len,
        })
    }

    async fn assign_address(&self, device: &str, address: InterfaceAddress) -> Result<()> {
        self.record(RouteCall::AssignAddress {
            device: device.to_string(),
            address,
        })
    }

    async fn set_default_gateway(&self, gateway: IpAddr, device: &str) -> Result<()> {
        self.record(RouteCall::SetDefaultGateway {
            gateway,
            device: device.to_string(),
        })?;
        *self.default_gateway.lock() = Some((gateway, device.to_string()));
        Ok(())
    }

    async fn remove_default_gateway(&self, gateway: IpAddr, device: &str) -> Result<()> {
        self.record(RouteCall::RemoveDefaultGateway {
            gateway,
            device: device.to_string(),
        })?;
        *self.default_gateway.lock() = None;
        Ok(())
    }

    async fn add_route(&self, destination: IpAddr, via: IpAddr, device: &str) -> Result<()> {
        self.record(RouteCall::AddRoute {
            destination,
            via,
            device: device.to_string(),
        })
    }

    async fn delete_route(&self, destination: IpAddr, via: IpAddr, device: &str) -> Result<()> {
        self.record(RouteCall::DeleteRoute {
            destination,
            via,
            device: device.to_string(),
        })
    }

    async fn default_gateway(&self) -> Result<(IpAddr, String)> {
        self.default_gateway
            .lock()
            .clone()
            .ok_or(TransportError::GatewayNotFound)
    }
}
