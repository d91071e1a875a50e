//! Peer connection handle owned by a game session

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use magnet_shared::{HandshakePacket, is_valid_name};
use tokio::sync::mpsc::{self, error::TryRecvError};

use super::config::{ConnectionConfig, DirectTarget, RendezvousTarget};
use super::driver::{Driver, Mode};
use super::error::ConnectionError;
use super::socket::{PeerSocket, resolve};
use super::state::{ConnectionState, SharedState};
use crate::net::envelope::{Message, MessageRegistry};

/// One session's link to a single remote peer.
///
/// Setup (bind, first Register/Hello) happens synchronously in
/// [`rendezvous`](Self::rendezvous) or [`direct`](Self::direct) and reports
/// failures to the caller. Everything after that runs on a background
/// receive loop: matching, the Hello exchange, and decoding envelopes into
/// the inbound channel, which the session drains with
/// [`try_recv`](Self::try_recv) once per frame.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = MessageRegistry::new();
/// register_builtin(&mut registry);
/// let registry = Arc::new(registry);
///
/// let mut conn = PeerConnection::rendezvous(
///     ConnectionConfig::new("alice"),
///     RendezvousTarget::search("handshaker.example.net:20219", "bob"),
///     registry,
/// )?;
///
/// // every frame
/// while let Some(msg) = conn.try_recv() {
///     if let Some(greeting) = msg.downcast_ref::<Greeting>() { /* ... */ }
/// }
/// if conn.connected() {
///     conn.send(&Greeting::from_name("alice"))?;
/// }
/// ```
pub struct PeerConnection {
    name: String,
    /// Released by `close`
    socket: Option<PeerSocket>,
    local_addr: SocketAddr,
    shared: Arc<SharedState>,
    inbound: mpsc::Receiver<Box<dyn Message>>,
    worker: Option<JoinHandle<()>>,
}

impl PeerConnection {
    /// Meet a peer through a rendezvous server.
    ///
    /// Binds the local socket, sends `Register` (and `Await` when a target
    /// is given), then returns while the receive loop waits for `Arrived`.
    pub fn rendezvous(
        config: ConnectionConfig,
        target: RendezvousTarget,
        registry: Arc<MessageRegistry>,
    ) -> Result<Self, ConnectionError> {
        check_name(&config.name)?;
        if let Some(name) = &target.target {
            check_name(name)?;
        }

        let server = resolve(&target.server)?;
        let socket = PeerSocket::bind(config.bind_addr(), config.read_timeout)?;

        tracing::info!(
            local = %socket.local_addr(),
            %server,
            name = %config.name,
            target = ?target.target,
            "Registering with handshaker"
        );

        let mode = Mode::Rendezvous {
            server,
            target: target.target.clone(),
        };
        let (driver, conn) = Self::prepare(config, socket, mode, registry);

        // Setup failures are reported synchronously; the loop retries later sends itself
        let register = HandshakePacket::Register {
            name: conn.name.clone(),
        };
        driver.socket.send_handshake(server, &register)?;
        conn.shared.set_state(ConnectionState::Registering);

        if let Some(name) = target.target {
            let await_packet = HandshakePacket::Await { target: name };
            driver.socket.send_handshake(server, &await_packet)?;
            conn.shared.set_state(ConnectionState::Awaiting);
        }

        conn.start(driver)
    }

    /// Connect without a rendezvous server.
    ///
    /// With [`DirectTarget::join`] this says Hello to the remote address and
    /// handshakes with it. With [`DirectTarget::host`] it binds
    /// [`ConnectionConfig::local_addr`] and waits for the first Hello.
    pub fn direct(
        config: ConnectionConfig,
        target: DirectTarget,
        registry: Arc<MessageRegistry>,
    ) -> Result<Self, ConnectionError> {
        check_name(&config.name)?;
        if target.remote.is_none() && config.local_addr.is_none() {
            return Err(ConnectionError::InvalidConfig(
                "direct connection needs a local or a remote address",
            ));
        }

        let remote = target.remote.as_deref().map(resolve).transpose()?;
        let socket = PeerSocket::bind(config.bind_addr(), config.read_timeout)?;

        let (mut driver, conn) = Self::prepare(config, socket, Mode::Direct, registry);

        match remote {
            Some(remote) => {
                tracing::info!(local = %conn.local_addr(), %remote, "Joining peer directly");
                let hello = HandshakePacket::Hello {
                    name: conn.name.clone(),
                };
                driver.socket.send_handshake(remote, &hello)?;
                driver.pending_peer = Some(remote);
                conn.shared.set_state(ConnectionState::Handshaking);
            }
            None => {
                tracing::info!(local = %conn.local_addr(), "Hosting, waiting for a peer");
                conn.shared.set_state(ConnectionState::Awaiting);
            }
        }

        conn.start(driver)
    }

    fn prepare(
        config: ConnectionConfig,
        socket: PeerSocket,
        mode: Mode,
        registry: Arc<MessageRegistry>,
    ) -> (Driver, Self) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let shared = Arc::new(SharedState::new());
        let now = Instant::now();

        let driver = Driver {
            name: config.name.clone(),
            mode,
            socket: socket.clone(),
            shared: Arc::clone(&shared),
            registry,
            inbound: tx,
            pending_peer: None,
            hello_interval: config.hello_interval,
            reregister_interval: config.reregister_interval,
            last_hello: now,
            last_register: now,
        };

        let conn = Self {
            name: config.name,
            local_addr: socket.local_addr(),
            socket: Some(socket),
            shared,
            inbound: rx,
            worker: None,
        };

        (driver, conn)
    }

    fn start(mut self, driver: Driver) -> Result<Self, ConnectionError> {
        let handle = std::thread::Builder::new()
            .name(format!("magnet-peer-{}", self.name))
            .spawn(move || driver.run())
            .map_err(ConnectionError::Spawn)?;
        self.worker = Some(handle);
        Ok(self)
    }

    /// Local display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address the socket was bound to; still reported after `close`
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// A session has been started and not closed
    pub fn active(&self) -> bool {
        !matches!(self.state(), ConnectionState::Idle | ConnectionState::Closed)
    }

    /// The remote peer is locked in
    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Liveness flag maintained by the owning session's timeout policy
    pub fn disconnected(&self) -> bool {
        self.shared.disconnected()
    }

    pub fn set_disconnected(&self, disconnected: bool) {
        self.shared.set_disconnected(disconnected);
    }

    /// The locked-in remote address, once connected
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.shared.remote()
    }

    /// Time since the last packet accepted from the peer.
    ///
    /// `None` until the first peer packet (Hello or envelope) arrives.
    pub fn idle_for(&self) -> Option<Duration> {
        self.shared.idle_for()
    }

    /// Whether the handshaker has acknowledged any of our packets
    pub fn rendezvous_alive(&self) -> bool {
        self.shared.rendezvous_alive()
    }

    /// Send an application message to the connected peer
    pub fn send(&self, message: &dyn Message) -> Result<(), ConnectionError> {
        let Some(socket) = &self.socket else {
            return Err(ConnectionError::Closed);
        };
        if self.shared.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let remote = match (self.state(), self.shared.remote()) {
            (ConnectionState::Connected, Some(remote)) => remote,
            (ConnectionState::Closed, _) => return Err(ConnectionError::Closed),
            _ => return Err(ConnectionError::NotConnected),
        };
        socket.send_message(remote, message)
    }

    /// Take the next decoded message without blocking
    pub fn try_recv(&mut self) -> Option<Box<dyn Message>> {
        match self.inbound.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until a message arrives; `None` once the receive loop has exited.
    ///
    /// Must not be called from inside an async runtime.
    pub fn recv(&mut self) -> Option<Box<dyn Message>> {
        self.inbound.blocking_recv()
    }

    /// Take every message currently queued
    pub fn drain(&mut self) -> Vec<Box<dyn Message>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// The inbound channel itself, for async readers
    pub fn messages(&mut self) -> &mut mpsc::Receiver<Box<dyn Message>> {
        &mut self.inbound
    }

    /// Stop the receive loop and release the socket
    pub fn close(&mut self) {
        self.shared.close();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!(name = %self.name, "Peer receive loop panicked");
            }
            tracing::info!(name = %self.name, "Peer connection closed");
        }
        // The receive loop has exited and dropped its handle; this frees the port
        self.socket = None;
        self.shared.set_state(ConnectionState::Closed);
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("name", &self.name)
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .field("remote", &self.remote_addr())
            .finish()
    }
}

fn check_name(name: &str) -> Result<(), ConnectionError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ConnectionError::InvalidName(name.to_string()))
    }
}
