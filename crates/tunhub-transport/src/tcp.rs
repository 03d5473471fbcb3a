// ============================================
// File: crates/tunhub-transport/src/tcp.rs
// ============================================
//! # Peer Listener
//!
//! ## Creation Reason
//! Peers reach the server over TCP. The listener is bound through
//! `socket2` so the socket options are set before `listen()`, then
//! handed to Tokio.
//!
//! ## Main Functionality
//! - `PeerListener::bind`: `SO_REUSEADDR` + non-blocking bind/listen
//! - `PeerListener::accept_timeout`: accept with a bounded wait so the
//!   caller can poll a shutdown flag between attempts
//!
//! ## ⚠️ Important Note for Next Developer
//! - A timed-out wait is `Ok(None)`, not an error; only real socket
//!   failures come back as `AcceptFailed`
//! - Must be bound from within a Tokio runtime
//!
//! ## Last Modified
//! v0.1.0 - Initial TCP listener implementation

use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

// ============================================
// Constants
// ============================================

/// Pending connection backlog passed to `listen()`.
const LISTEN_BACKLOG: i32 = 1024;

// ============================================
// PeerListener
// ============================================

/// TCP listener for peer connections.
///
/// # Example
/// ```ignore
/// use std::time::Duration;
/// use tunhub_transport::PeerListener;
///
/// let listener = PeerListener::bind("0.0.0.0:9000".parse()?)?;
/// while let Some((stream, peer)) = listener.accept_timeout(Duration::from_millis(300)).await? {
///     // hand `stream` to a session
/// }
/// ```
pub struct PeerListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl PeerListener {
    /// Binds a listener to `addr`.
    ///
    /// # Socket Options
    /// - `SO_REUSEADDR`: Enabled for quick rebinding after restart
    /// - Non-blocking: Required for Tokio
    ///
    /// # Errors
    /// - `AddressInUse`: If another socket holds the address
    /// - `BindFailed`: If binding or listening fails otherwise
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        info!(address = %addr, "Binding peer listener");

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| TransportError::io("creating TCP socket", e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::io("setting SO_REUSEADDR", e))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::io("setting non-blocking", e))?;

        socket
            .bind(&addr.into())
            .map_err(|e| TransportError::bind_failed(addr, &e))?;

        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| TransportError::bind_failed(addr, &e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| TransportError::io("converting to Tokio listener", e))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::io("getting local address", e))?;

        info!(address = %local_addr, "Peer listener bound");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Waits up to `wait` for the next connection.
    ///
    /// # Returns
    /// - `Ok(Some((stream, peer)))` - A peer connected
    /// - `Ok(None)` - Nothing arrived within `wait`
    ///
    /// # Errors
    /// Returns `AcceptFailed` if the listener reports an error.
    pub async fn accept_timeout(&self, wait: Duration) -> Result<Option<(TcpStream, SocketAddr)>> {
        match tokio::time::timeout(wait, self.listener.accept()).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(source)) => Err(TransportError::AcceptFailed { source }),
            Ok(Ok((stream, peer))) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                }
                Ok(Some((stream, peer)))
            }
        }
    }

    /// Returns the address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl std::fmt::Debug for PeerListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerListener")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
