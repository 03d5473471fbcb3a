// ============================================
// File: crates/tunhub-server/src/server.rs
// ============================================
//! # Server Orchestrator
//!
//! ## Creation Reason
//! Wires the TUN device, the peer listener and the registry together and
//! owns the lifecycle of the four core loops.
//!
//! ## Main Functionality
//! - `Server`: startup, the core loops, shutdown coordination
//! - Interface provisioning through a `RouteManager`
//! - Device failure policy (continue or shut down)
//!
//! ## Server Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                            Server                             │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌─────────────┐   start_session    ┌──────────────────────┐  │
//! │  │ Accept Task │ ─────────────────► │ Session reader/writer│  │
//! │  └─────────────┘                    └───┬──────────────▲───┘  │
//! │                                         │ IpPacket     │      │
//! │  ┌─────────────┐                        ▼              │      │
//! │  │ Device Read │ ───────────► inbound queue            │      │
//! │  └─────────────┘                        │         queue_ip    │
//! │                                         ▼              │      │
//! │                                 ┌───────────────┐      │      │
//! │                                 │ Dispatch Task │──────┘      │
//! │                                 │ PacketRouter  │             │
//! │                                 └───────┬───────┘             │
//! │                                         │ device queue        │
//! │  ┌──────────────┐                       │                     │
//! │  │ Device Write │ ◄─────────────────────┘                     │
//! │  └──────────────┘                                             │
//! │                                                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Server requires root or `CAP_NET_ADMIN` for TUN and route setup
//! - Every core loop checks the shutdown flag at the top of each
//!   iteration and also selects on the broadcast signal
//! - Session loops are not joined; they end when shutdown tears their
//!   session down
//! - Route changes are always reverted, even when startup fails halfway
//!
//! ## Last Modified
//! v0.1.0 - Initial server implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument, Span};

use tunhub_core::protocol::DEFAULT_MAX_PACKET_LEN;
use tunhub_core::{FrameCodec, RawPacket};
use tunhub_transport::{PeerListener, RouteConfigurator, RouteManager, TunDevice};

#[cfg(target_os = "linux")]
use tunhub_transport::{IpCommandConfigurator, LinuxTun};

use crate::config::{DeviceFailurePolicy, ServerConfig};
use crate::error::{Result, ServerError};
use crate::handlers::{InboundPacket, PacketRouter};
use crate::services::session::{start_session, TeardownOrigin};
use crate::services::ClientRegistry;

// ============================================
// ShutdownSignal
// ============================================

/// Atomic flag plus broadcast channel shared by every core loop.
#[derive(Clone)]
struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl ShutdownSignal {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

fn handle_device_failure(shutdown: &ShutdownSignal, policy: DeviceFailurePolicy) {
    match policy {
        DeviceFailurePolicy::Shutdown => {
            warn!("Device loop failed, shutting the server down");
            shutdown.trigger();
        }
        DeviceFailurePolicy::Continue => {
            warn!("Device loop failed, peer-to-peer routing continues without the device");
        }
    }
}

// ============================================
// Server
// ============================================

/// Main TunHub server.
///
/// # Lifecycle
/// 1. Create with `Server::new(config)`
/// 2. Start with `server.run().await`
/// 3. Shutdown via `shutdown()`, Ctrl+C or the device failure policy
pub struct Server {
    /// Server configuration.
    config: ServerConfig,
    /// Live sessions and claimed addresses.
    registry: Arc<ClientRegistry>,
    /// Shutdown flag and signal.
    shutdown: ShutdownSignal,
    /// Root span for everything this server logs.
    span: Span,
}

impl Server {
    /// Creates a new server instance.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let span = info_span!(
            "server",
            listen = %config.network.listen_addr,
            device = %config.tun.device_name
        );
        Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            shutdown: ShutdownSignal::new(),
            span,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the session registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Runs the server until shutdown.
    ///
    /// Creates the TUN device, configures it, binds the listener and
    /// serves. Route changes are reverted before returning.
    ///
    /// # Errors
    /// Returns error if the server fails to start.
    #[cfg(target_os = "linux")]
    pub async fn run(&self) -> Result<()> {
        async {
            info!("Starting TunHub server v{}", env!("CARGO_PKG_VERSION"));
            self.config.validate()?;

            // Kept typed so callers can tell a missing privilege apart
            let tun = Arc::new(LinuxTun::create(self.config.device_config())?);

            let routes = RouteManager::new(IpCommandConfigurator);
            let result = self.provision_and_serve(Arc::clone(&tun), &routes).await;

            let failures = routes.teardown().await;
            if failures > 0 {
                warn!(failures, "Some route changes could not be reverted");
            }
            result
        }
        .instrument(self.span.clone())
        .await
    }

    /// Runs the server until shutdown.
    ///
    /// # Errors
    /// Always fails: TUN devices are only supported on Linux.
    #[cfg(not(target_os = "linux"))]
    pub async fn run(&self) -> Result<()> {
        Err(ServerError::startup_failed(
            "TUN devices are only supported on Linux",
        ))
    }

    #[cfg(target_os = "linux")]
    async fn provision_and_serve<T, C>(&self, tun: Arc<T>, routes: &RouteManager<C>) -> Result<()>
    where
        T: TunDevice + 'static,
        C: RouteConfigurator,
    {
        self.provision(routes, tun.name()).await?;

        let listener = PeerListener::bind(self.config.network.listen_addr)
            .map_err(|e| ServerError::startup_failed(format!("TCP bind failed: {e}")))?;
        info!("TCP listener on {}", listener.local_addr());

        self.serve(tun, listener).await
    }

    /// Brings the interface up and installs the configured routes.
    ///
    /// Every change is recorded in `routes` so `teardown()` reverts it.
    ///
    /// # Errors
    /// Returns `StartupFailed` with the first configurator error.
    pub async fn provision<C: RouteConfigurator>(
        &self,
        routes: &RouteManager<C>,
        device: &str,
    ) -> Result<()> {
        let tun = &self.config.tun;
        routes
            .bring_up(device, tun.address, tun.mtu, tun.tx_queue_len)
            .await
            .map_err(|e| ServerError::startup_failed(format!("Interface setup failed: {e}")))?;

        for route in &self.config.routes.static_routes {
            routes
                .add_route(route.destination, route.via, device)
                .await
                .map_err(|e| ServerError::startup_failed(format!("Route setup failed: {e}")))?;
        }

        if let Some(gateway) = self.config.routes.default_gateway {
            routes
                .replace_default_gateway(gateway, device)
                .await
                .map_err(|e| ServerError::startup_failed(format!("Gateway setup failed: {e}")))?;
        }

        info!(
            device = %device,
            address = %tun.address,
            routes = routes.route_count(),
            "Interface provisioned"
        );
        Ok(())
    }

    /// Runs the core loops on an already configured device and listener
    /// until shutdown.
    ///
    /// # Errors
    /// Returns `ShuttingDown` if shutdown was already requested. Loop
    /// failures are logged, not returned.
    pub async fn serve<T>(&self, tun: Arc<T>, listener: PeerListener) -> Result<()>
    where
        T: TunDevice + 'static,
    {
        if self.shutdown.is_triggered() {
            return Err(ServerError::ShuttingDown);
        }

        self.serve_loops(tun, listener)
            .instrument(self.span.clone())
            .await
    }

    async fn serve_loops<T>(&self, tun: Arc<T>, listener: PeerListener) -> Result<()>
    where
        T: TunDevice + 'static,
    {
        let limits = &self.config.limits;
        let mtu = usize::from(tun.mtu());
        let codec = FrameCodec::new().with_max_packet_len(mtu);

        let (inbound_tx, inbound_rx) = mpsc::channel(limits.inbound_queue);
        let (device_tx, device_rx) = mpsc::channel(limits.device_queue);
        let router = PacketRouter::new(Arc::clone(&self.registry), device_tx);

        info!(
            listen = %listener.local_addr(),
            device = %tun.name(),
            mtu,
            "Server started"
        );

        let tasks = vec![
            (
                "accept",
                self.spawn_accept_task(listener, inbound_tx.clone(), codec),
            ),
            ("dispatch", self.spawn_dispatch_task(router, inbound_rx)),
            (
                "device-read",
                self.spawn_device_read_task(Arc::clone(&tun), inbound_tx, codec.max_packet_len()),
            ),
            ("device-write", self.spawn_device_write_task(tun, device_rx)),
        ];

        self.wait_for_shutdown().await;

        info!("Shutting down server...");
        self.shutdown.trigger();
        self.close_sessions();

        let grace = limits.shutdown_grace();
        for (name, task) in tasks {
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(())) => debug!("Task '{}' completed", name),
                Ok(Err(e)) => warn!("Task '{}' failed: {}", name, e),
                Err(_) => warn!("Task '{}' timed out during shutdown", name),
            }
        }

        // Catch sessions accepted while the accept task was stopping
        self.close_sessions();

        info!("Server shutdown complete");
        Ok(())
    }

    fn close_sessions(&self) {
        let addresses = self.registry.address_count();
        let sessions = self.registry.drain();
        if sessions.is_empty() {
            return;
        }

        let count = sessions.len();
        for session in sessions {
            session.teardown(&self.registry, TeardownOrigin::Shutdown);
        }
        info!(sessions = count, addresses, "Sessions closed");
    }

    /// Spawns the accept task.
    fn spawn_accept_task(
        &self,
        listener: PeerListener,
        inbound: mpsc::Sender<InboundPacket>,
        codec: FrameCodec,
    ) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        let mut shutdown_rx = shutdown.subscribe();
        let registry = Arc::clone(&self.registry);
        let poll = self.config.limits.accept_poll();
        let queue_capacity = self.config.limits.client_queue;
        let span = info_span!(parent: &self.span, "accept");

        tokio::spawn(
            async move {
                loop {
                    if shutdown.is_triggered() {
                        break;
                    }

                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            debug!("Accept task received shutdown signal");
                            break;
                        }
                        result = listener.accept_timeout(poll) => match result {
                            Ok(Some((stream, peer))) => {
                                if shutdown.is_triggered() {
                                    debug!(peer = %peer, "Dropping connection accepted during shutdown");
                                    break;
                                }
                                start_session(
                                    stream,
                                    peer,
                                    &registry,
                                    inbound.clone(),
                                    codec,
                                    queue_capacity,
                                );
                            }
                            Ok(None) => {}
                            Err(e) if e.is_retryable() => {
                                debug!(error = %e, "Transient accept error");
                            }
                            Err(e) => {
                                error!(error = %e, "Listener failed, no longer accepting peers");
                                break;
                            }
                        }
                    }
                }

                debug!("Accept task exiting");
            }
            .instrument(span),
        )
    }

    /// Spawns the dispatch task, the single consumer of the inbound queue.
    fn spawn_dispatch_task(
        &self,
        router: PacketRouter,
        mut inbound: mpsc::Receiver<InboundPacket>,
    ) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        let mut shutdown_rx = shutdown.subscribe();
        let span = info_span!(parent: &self.span, "dispatch");

        tokio::spawn(
            async move {
                loop {
                    if shutdown.is_triggered() {
                        break;
                    }

                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            debug!("Dispatch task received shutdown signal");
                            break;
                        }
                        next = inbound.recv() => match next {
                            Some(packet) => {
                                let decision = router.route(packet).await;
                                trace!(decision = ?decision, "Packet routed");
                            }
                            None => {
                                debug!("Inbound queue closed");
                                break;
                            }
                        }
                    }
                }

                debug!("Dispatch task exiting");
            }
            .instrument(span),
        )
    }

    /// Spawns the device read task.
    fn spawn_device_read_task<T>(
        &self,
        tun: Arc<T>,
        inbound: mpsc::Sender<InboundPacket>,
        max_len: usize,
    ) -> JoinHandle<()>
    where
        T: TunDevice + 'static,
    {
        let shutdown = self.shutdown.clone();
        let mut shutdown_rx = shutdown.subscribe();
        let policy = self.config.tun.on_device_failure;
        let span = info_span!(parent: &self.span, "device_read");

        tokio::spawn(
            async move {
                let mut buf = vec![0u8; max_len.max(DEFAULT_MAX_PACKET_LEN)];

                loop {
                    if shutdown.is_triggered() {
                        break;
                    }

                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            debug!("Device read task received shutdown signal");
                            break;
                        }
                        result = tun.read(&mut buf) => match result {
                            Ok(0) => {
                                if !shutdown.is_triggered() {
                                    error!("Device returned end of stream");
                                    handle_device_failure(&shutdown, policy);
                                }
                                break;
                            }
                            Ok(len) if len > max_len => {
                                debug!(len, max_len, "Oversized device packet skipped");
                            }
                            Ok(len) => match RawPacket::parse(Bytes::copy_from_slice(&buf[..len])) {
                                Ok(packet) => {
                                    trace!(destination = %packet.destination, len, "Packet from device");
                                    if inbound.send(InboundPacket::from_device(packet)).await.is_err() {
                                        debug!("Inbound queue closed");
                                        break;
                                    }
                                }
                                Err(e) => {
                                    debug!(error = %e, len, "Skipping unparseable device packet");
                                }
                            },
                            Err(e) => {
                                if !shutdown.is_triggered() {
                                    error!(error = %e, "Device read failed");
                                    handle_device_failure(&shutdown, policy);
                                }
                                break;
                            }
                        }
                    }
                }

                debug!("Device read task exiting");
            }
            .instrument(span),
        )
    }

    /// Spawns the device write task.
    fn spawn_device_write_task<T>(
        &self,
        tun: Arc<T>,
        mut outbound: mpsc::Receiver<RawPacket>,
    ) -> JoinHandle<()>
    where
        T: TunDevice + 'static,
    {
        let shutdown = self.shutdown.clone();
        let mut shutdown_rx = shutdown.subscribe();
        let policy = self.config.tun.on_device_failure;
        let span = info_span!(parent: &self.span, "device_write");

        tokio::spawn(
            async move {
                loop {
                    if shutdown.is_triggered() {
                        break;
                    }

                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            debug!("Device write task received shutdown signal");
                            break;
                        }
                        next = outbound.recv() => {
                            let Some(packet) = next else {
                                debug!("Device queue closed");
                                break;
                            };

                            match tun.write(&packet.raw).await {
                                Ok(written) if written < packet.len() => {
                                    warn!(
                                        written,
                                        expected = packet.len(),
                                        destination = %packet.destination,
                                        "Short device write"
                                    );
                                }
                                Ok(_) => {
                                    trace!(destination = %packet.destination, len = packet.len(), "Packet to device");
                                }
                                Err(e) => {
                                    if !shutdown.is_triggered() {
                                        error!(error = %e, "Device write failed");
                                        handle_device_failure(&shutdown, policy);
                                    }
                                    break;
                                }
                            }
                        }
                    }
                }

                debug!("Device write task exiting");
            }
            .instrument(span),
        )
    }

    /// Waits for Ctrl+C or a programmatic shutdown.
    async fn wait_for_shutdown(&self) {
        let mut shutdown_rx = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            return;
        }

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C"),
                Err(e) => {
                    warn!(error = %e, "Cannot listen for Ctrl+C, waiting for shutdown()");
                    let _ = shutdown_rx.recv().await;
                }
            },
            _ = shutdown_rx.recv() => info!("Received shutdown signal"),
        }
    }

    /// Triggers server shutdown programmatically.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen_addr", &self.config.network.listen_addr)
            .field("tun_device", &self.config.tun.device_name)
            .field("clients", &self.registry.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    use tunhub_core::Frame;
    use tunhub_transport::{MockTun, RecordingConfigurator, RouteCall, TunConfig};

    use crate::config::StaticRoute;

    type Peer = Framed<TcpStream, FrameCodec>;

    fn create_test_ipv4_packet(dst: Ipv4Addr) -> Vec<u8> {
        let mut packet = vec![0u8; 28];
        packet[0] = 0x45;
        packet[3] = 28;
        packet[9] = 17;
        packet[12..16].copy_from_slice(&[10, 0, 0, 1]);
        packet[16..20].copy_from_slice(&dst.octets());
        packet
    }

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn test_config(policy: DeviceFailurePolicy) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.tun.on_device_failure = policy;
        config.limits.accept_poll_ms = 20;
        config.limits.shutdown_grace_secs = 1;
        config
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(3), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    struct Harness {
        server: Arc<Server>,
        tun: Arc<MockTun>,
        addr: SocketAddr,
        handle: JoinHandle<Result<()>>,
    }

    impl Harness {
        async fn start(policy: DeviceFailurePolicy) -> Self {
            Self::start_with(test_config(policy)).await
        }

        async fn start_with(config: ServerConfig) -> Self {
            let tun = Arc::new(MockTun::new(TunConfig::new("tun0")));
            let listener = PeerListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
            let addr = listener.local_addr();
            let server = Arc::new(Server::new(config));

            let handle = {
                let server = Arc::clone(&server);
                let tun = Arc::clone(&tun);
                tokio::spawn(async move { server.serve(tun, listener).await })
            };

            Self {
                server,
                tun,
                addr,
                handle,
            }
        }

        async fn connect(&self) -> Peer {
            let stream = TcpStream::connect(self.addr).await.unwrap();
            Framed::new(stream, FrameCodec::new())
        }

        async fn claim(&self, peer: &mut Peer, addr: Ipv4Addr) {
            peer.send(Frame::LocalAddress(IpAddr::V4(addr))).await.unwrap();
            let registry = Arc::clone(self.server.registry());
            wait_until(move || registry.lookup(&IpAddr::V4(addr)).is_some()).await;
        }

        async fn stop(self) {
            self.server.shutdown();
            tokio::time::timeout(Duration::from_secs(10), self.handle)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
        }
    }

    async fn next_packet(peer: &mut Peer) -> RawPacket {
        match tokio::time::timeout(Duration::from_secs(2), peer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
        {
            Frame::IpPacket(packet) => packet,
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_device_packet_reaches_claiming_peer() {
        let h = Harness::start(DeviceFailurePolicy::Continue).await;
        let mut peer = h.connect().await;
        h.claim(&mut peer, ip(5)).await;

        h.tun.inject_packet(create_test_ipv4_packet(ip(5)));

        let packet = next_packet(&mut peer).await;
        assert_eq!(packet.destination, IpAddr::V4(ip(5)));
        assert_eq!(packet.len(), 28);
        assert_eq!(h.tun.written_count(), 0);

        h.stop().await;
    }

    #[tokio::test]
    async fn test_unclaimed_packet_goes_back_to_device() {
        let h = Harness::start(DeviceFailurePolicy::Continue).await;
        let mut peer = h.connect().await;
        h.claim(&mut peer, ip(5)).await;

        h.tun.inject_packet(create_test_ipv4_packet(ip(9)));

        assert!(h.tun.wait_for_writes(1, Duration::from_secs(2)).await);
        let written = h.tun.take_written_packets();
        assert_eq!(&written[0][16..20], &[10, 0, 0, 9]);

        let nothing = tokio::time::timeout(Duration::from_millis(100), peer.next()).await;
        assert!(nothing.is_err());

        h.stop().await;
    }

    #[tokio::test]
    async fn test_peer_to_peer_routing() {
        let h = Harness::start(DeviceFailurePolicy::Continue).await;
        let mut first = h.connect().await;
        let mut second = h.connect().await;
        h.claim(&mut first, ip(5)).await;
        h.claim(&mut second, ip(6)).await;

        let packet = RawPacket::parse(Bytes::from(create_test_ipv4_packet(ip(6)))).unwrap();
        first.send(Frame::IpPacket(packet)).await.unwrap();

        let received = next_packet(&mut second).await;
        assert_eq!(received.destination, IpAddr::V4(ip(6)));
        assert_eq!(h.tun.written_count(), 0);

        h.stop().await;
    }

    #[tokio::test]
    async fn test_dead_peer_addresses_fall_back_to_device() {
        let h = Harness::start(DeviceFailurePolicy::Continue).await;
        let mut peer = h.connect().await;
        h.claim(&mut peer, ip(5)).await;

        drop(peer);
        let registry = Arc::clone(h.server.registry());
        wait_until(move || registry.is_empty()).await;
        assert!(h.server.registry().lookup(&IpAddr::V4(ip(5))).is_none());

        h.tun.inject_packet(create_test_ipv4_packet(ip(5)));
        assert!(h.tun.wait_for_writes(1, Duration::from_secs(2)).await);

        h.stop().await;
    }

    #[tokio::test]
    async fn test_short_device_write_is_not_fatal() {
        let h = Harness::start(DeviceFailurePolicy::Shutdown).await;
        h.tun.set_write_limit(Some(10));

        h.tun.inject_packet(create_test_ipv4_packet(ip(9)));
        h.tun.inject_packet(create_test_ipv4_packet(ip(10)));

        assert!(h.tun.wait_for_writes(2, Duration::from_secs(2)).await);
        assert!(!h.server.is_shutting_down());

        h.stop().await;
    }

    #[tokio::test]
    async fn test_device_failure_shutdown_policy() {
        let h = Harness::start(DeviceFailurePolicy::Shutdown).await;

        h.tun.inject_read_error("device removed");

        tokio::time::timeout(Duration::from_secs(10), h.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(h.server.is_shutting_down());
    }

    #[tokio::test]
    async fn test_device_failure_continue_policy() {
        let h = Harness::start(DeviceFailurePolicy::Continue).await;
        h.tun.inject_read_error("device removed");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.server.is_shutting_down());

        let mut first = h.connect().await;
        let mut second = h.connect().await;
        h.claim(&mut first, ip(5)).await;
        h.claim(&mut second, ip(6)).await;

        let packet = RawPacket::parse(Bytes::from(create_test_ipv4_packet(ip(6)))).unwrap();
        first.send(Frame::IpPacket(packet)).await.unwrap();
        assert_eq!(next_packet(&mut second).await.destination, IpAddr::V4(ip(6)));

        h.stop().await;
    }

    #[tokio::test]
    async fn test_device_write_failure_continue_policy() {
        let mut config = test_config(DeviceFailurePolicy::Continue);
        config.limits.device_queue = 4;
        let h = Harness::start_with(config).await;
        h.tun.fail_writes("device gone");

        // More device-bound packets than the queue holds; none may wedge dispatch
        for _ in 0..11 {
            h.tun.inject_packet(create_test_ipv4_packet(ip(9)));
        }
        let tun = Arc::clone(&h.tun);
        wait_until(move || tun.pending_read_count() == 0).await;

        let mut first = h.connect().await;
        let mut second = h.connect().await;
        h.claim(&mut first, ip(5)).await;
        h.claim(&mut second, ip(6)).await;

        let packet = RawPacket::parse(Bytes::from(create_test_ipv4_packet(ip(6)))).unwrap();
        first.send(Frame::IpPacket(packet)).await.unwrap();
        assert_eq!(next_packet(&mut second).await.destination, IpAddr::V4(ip(6)));

        assert!(!h.server.is_shutting_down());
        assert_eq!(h.tun.written_count(), 0);

        h.stop().await;
    }

    #[tokio::test]
    async fn test_device_write_failure_shutdown_policy() {
        let h = Harness::start(DeviceFailurePolicy::Shutdown).await;
        h.tun.fail_writes("device gone");

        h.tun.inject_packet(create_test_ipv4_packet(ip(9)));

        tokio::time::timeout(Duration::from_secs(10), h.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(h.server.is_shutting_down());
    }

    #[tokio::test]
    async fn test_zero_length_read_ends_device_reads() {
        let h = Harness::start(DeviceFailurePolicy::Continue).await;
        h.tun.inject_packet(Vec::new());
        let tun = Arc::clone(&h.tun);
        wait_until(move || tun.pending_read_count() == 0).await;

        // Read loop is gone, so later packets stay unread
        h.tun.inject_packet(create_test_ipv4_packet(ip(9)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.tun.pending_read_count(), 1);
        assert!(!h.server.is_shutting_down());

        h.stop().await;
    }

    #[tokio::test]
    async fn test_zero_length_read_shutdown_policy() {
        let h = Harness::start(DeviceFailurePolicy::Shutdown).await;
        h.tun.inject_packet(Vec::new());

        tokio::time::timeout(Duration::from_secs(10), h.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(h.server.is_shutting_down());
    }

    #[tokio::test]
    async fn test_shutdown_closes_peers() {
        let h = Harness::start(DeviceFailurePolicy::Continue).await;
        let mut peer = h.connect().await;
        h.claim(&mut peer, ip(5)).await;

        let server = Arc::clone(&h.server);
        h.stop().await;
        assert!(server.registry().is_empty());

        let end = tokio::time::timeout(Duration::from_secs(2), peer.next())
            .await
            .unwrap();
        assert!(!matches!(end, Some(Ok(_))));
    }

    #[tokio::test]
    async fn test_serve_after_shutdown_is_rejected() {
        let server = Server::new(test_config(DeviceFailurePolicy::Continue));
        server.shutdown();

        let tun = Arc::new(MockTun::new(TunConfig::new("tun0")));
        let listener = PeerListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        let err = server.serve(tun, listener).await.unwrap_err();
        assert!(matches!(err, ServerError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_provision_records_and_reverts() {
        let mut config = ServerConfig::default();
        config.routes.default_gateway = Some(IpAddr::V4(ip(254)));
        config.routes.static_routes.push(StaticRoute {
            destination: "192.168.50.0".parse().unwrap(),
            via: IpAddr::V4(ip(2)),
        });
        let server = Server::new(config);

        let configurator = RecordingConfigurator::new()
            .with_default_gateway("192.168.1.1".parse().unwrap(), "eth0");
        let routes = RouteManager::new(configurator);

        server.provision(&routes, "tun0").await.unwrap();

        let calls = routes.configurator().calls();
        assert_eq!(
            calls[0],
            RouteCall::SetLinkState {
                device: "tun0".into(),
                up: true,
                mtu: 1500,
                tx_queue_len: 300,
            }
        );
        assert!(matches!(&calls[1], RouteCall::AssignAddress { device, .. } if device == "tun0"));
        assert!(matches!(&calls[2], RouteCall::AddRoute { via, .. } if *via == IpAddr::V4(ip(2))));
        assert!(matches!(&calls[3], RouteCall::SetDefaultGateway { gateway, .. } if *gateway == IpAddr::V4(ip(254))));
        assert_eq!(routes.route_count(), 1);

        assert_eq!(routes.teardown().await, 0);
        let calls = routes.configurator().calls();
        assert!(calls.iter().any(|c| matches!(c, RouteCall::DeleteRoute { .. })));
        assert!(matches!(
            calls.last().unwrap(),
            RouteCall::SetLinkState { up: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_provision_failure_aborts_startup() {
        let server = Server::new(ServerConfig::default());
        let configurator = RecordingConfigurator::new();
        configurator.set_failing(true);
        let routes = RouteManager::new(configurator);

        let err = server.provision(&routes, "tun0").await.unwrap_err();
        assert!(matches!(err, ServerError::StartupFailed { .. }));
    }
}
