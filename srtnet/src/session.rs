//! Session: mode controller and data-plane façade.
//!
//! A [`Session`] runs in exactly one of two modes at a time:
//!
//! - **Server**: a listening socket, an accept thread and a readiness-polling
//!   event thread serving any number of admitted clients
//! - **Client**: one connected socket and a receive thread
//!
//! # Locking
//!
//! Two locks, never nested:
//!
//! - the **session lock** serialises `start_*` and `stop`. It is never taken on
//!   the data path.
//! - the **registry lock** (inside [`ConnectionRegistry`]) serialises insert and
//!   evict of server-side connections.
//!
//! Loops read the mode and active flags through atomics, so a callback may call
//! `send_data` or even `stop` without deadlocking against its own thread.
//! `stop` fires its disconnect notifications after releasing the session lock,
//! and the bound address lives outside it, so a disconnect callback may use
//! the accessors or restart the session.

use parking_lot::Mutex;
use srtnet_x::{
    ConnectionHandle, Library, LibraryGuard, MsgCtrl, PollEvents, PollId, Transport,
    TransportStats,
};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::callbacks::Callbacks;
use crate::context::NetworkConnection;
use crate::error::{Result, SessionError};
use crate::params::{ClientParams, LinkParams, ServerParams};
use crate::registry::{ClientMap, ConnectionRegistry};
use crate::telemetry::{record_metric, MetricsEvent};
use crate::worker::{
    accept::AcceptLoop, client::ClientLoop, events::EventLoop, LoopThread, STOP_TIMEOUT,
};

/// Pending-handshake queue length for the listening socket.
pub const LISTEN_BACKLOG: usize = 16;

/// Operating mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    Unknown = 0,
    Server = 1,
    Client = 2,
}

impl Mode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Mode::Server,
            2 => Mode::Client,
            _ => Mode::Unknown,
        }
    }
}

/// The client's single connection.
#[derive(Clone)]
pub(crate) struct ClientLink {
    pub(crate) handle: ConnectionHandle,
    pub(crate) ctx: Arc<NetworkConnection>,
}

/// State shared with the loop threads.
pub(crate) struct Shared {
    guard: LibraryGuard,
    mode: AtomicU8,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) callbacks: Callbacks,
    pub(crate) server_active: AtomicBool,
    pub(crate) client_active: AtomicBool,
    /// Whoever takes the listener closes it.
    pub(crate) listener: Mutex<Option<ConnectionHandle>>,
    /// Whoever takes the link closes it and notifies the disconnect.
    pub(crate) client: Mutex<Option<ClientLink>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Shared {
    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        self.guard.transport()
    }

    pub(crate) fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire))
    }

    fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    /// Close a handle whose failure is uninteresting (already broken peers).
    pub(crate) fn close_quietly(&self, handle: ConnectionHandle) {
        if let Err(e) = self.transport().close(handle) {
            debug!(%handle, error = %e, "Close failed");
        }
    }

    pub(crate) fn take_listener(&self) -> Option<ConnectionHandle> {
        self.listener.lock().take()
    }

    pub(crate) fn take_client(&self) -> Option<ClientLink> {
        self.client.lock().take()
    }

    /// Evict one server-side connection and notify its disconnect.
    ///
    /// Returns `false` when another path already removed it.
    pub(crate) fn disconnect_client(&self, handle: ConnectionHandle, poll: Option<PollId>) -> bool {
        let transport = self.transport();
        let evicted = self.registry.evict(handle, |h| {
            if let Some(poll) = poll {
                if let Err(e) = transport.poll_remove(poll, h) {
                    debug!(handle = %h, error = %e, "Readiness unregister failed");
                }
            }
            if let Err(e) = transport.close(h) {
                debug!(handle = %h, error = %e, "Close failed");
            }
        });
        match evicted {
            Some(ctx) => {
                self.callbacks.notify_disconnect(&ctx, handle);
                record_metric(MetricsEvent::ClientDisconnected);
                true
            }
            None => false,
        }
    }

    /// Evict and close every server-side connection. The caller notifies.
    fn drain_clients(&self) -> Vec<(ConnectionHandle, Arc<NetworkConnection>)> {
        let drained = self.registry.drain(|h| self.close_quietly(h));
        for (handle, _) in &drained {
            debug!(%handle, "Client evicted");
        }
        drained
    }
}

struct SessionState {
    mode: Mode,
    threads: Vec<LoopThread>,
}

/// One server or client endpoint.
///
/// Create with [`Session::new`], register callbacks, then call
/// [`start_server`](Self::start_server) or [`start_client`](Self::start_client).
/// Dropping a running session stops it.
pub struct Session {
    shared: Arc<Shared>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create an idle session, starting the transport library if this is its
    /// first user.
    pub fn new(library: &Arc<Library>) -> Result<Self> {
        let guard = library.acquire().map_err(SessionError::transport("startup"))?;
        Ok(Self {
            shared: Arc::new(Shared {
                guard,
                mode: AtomicU8::new(Mode::Unknown as u8),
                registry: ConnectionRegistry::new(),
                callbacks: Callbacks::default(),
                server_active: AtomicBool::new(false),
                client_active: AtomicBool::new(false),
                listener: Mutex::new(None),
                client: Mutex::new(None),
                local_addr: Mutex::new(None),
            }),
            state: Mutex::new(SessionState {
                mode: Mode::Unknown,
                threads: Vec::new(),
            }),
        })
    }

    // ---- callbacks ----

    /// Decide on each incoming peer. Required before `start_server`.
    pub fn set_admission_callback<F>(&self, callback: F)
    where
        F: Fn(SocketAddr, ConnectionHandle, Option<&Arc<NetworkConnection>>) -> Option<Arc<NetworkConnection>>
            + Send
            + Sync
            + 'static,
    {
        self.shared.callbacks.set_admission(Arc::new(callback));
    }

    /// Receive each message as an owned buffer. Replaces any borrowed handler.
    pub fn set_data_callback<F>(&self, callback: F)
    where
        F: Fn(bytes::Bytes, &MsgCtrl, &Arc<NetworkConnection>, ConnectionHandle)
            + Send
            + Sync
            + 'static,
    {
        self.shared.callbacks.set_copy_data(Arc::new(callback));
    }

    /// Receive each message as a slice valid for the call only. Replaces any
    /// owned handler.
    pub fn set_borrowed_data_callback<F>(&self, callback: F)
    where
        F: Fn(&[u8], &MsgCtrl, &Arc<NetworkConnection>, ConnectionHandle) + Send + Sync + 'static,
    {
        self.shared.callbacks.set_borrowed_data(Arc::new(callback));
    }

    /// Called exactly once per connection teardown, whichever side ends it.
    pub fn set_disconnect_callback<F>(&self, callback: F)
    where
        F: Fn(&Arc<NetworkConnection>, ConnectionHandle) + Send + Sync + 'static,
    {
        self.shared.callbacks.set_disconnect(Arc::new(callback));
    }

    // ---- mode controller ----

    /// Listen for clients.
    ///
    /// Returns once the listener is bound and listening. `server_ctx` is passed
    /// to every admission callback invocation.
    pub fn start_server(
        &self,
        params: &ServerParams,
        server_ctx: Option<Arc<NetworkConnection>>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.mode != Mode::Unknown {
            error!(mode = ?state.mode, "Start server refused, session already running");
            return Err(SessionError::ModeAlreadySet(state.mode));
        }
        if !self.shared.callbacks.has_admission() {
            error!("Start server refused, no admission callback registered");
            return Err(SessionError::MissingAdmissionCallback);
        }
        let bind_addr = match params.socket_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!(host = %params.host, "Server host is not an IP address");
                return Err(e);
            }
        };
        params.validate().map_err(|errors| {
            error!(errors = ?errors, "Invalid server parameters");
            SessionError::InvalidParams(errors.join("; "))
        })?;

        let transport = self.shared.transport();
        let (listener, local_addr) = open_listener(transport.as_ref(), bind_addr, &params.link)?;
        let poll = match transport.poll_create() {
            Ok(poll) => poll,
            Err(e) => {
                error!(error = %e, "Readiness set creation failed");
                self.shared.close_quietly(listener);
                return Err(SessionError::Transport {
                    op: "poll_create",
                    source: e,
                });
            }
        };

        if let Err(e) = transport.poll_add(poll, listener, PollEvents::ERR) {
            error!(error = %e, "Failed to watch listener");
            self.shared.close_quietly(listener);
            if let Err(e) = transport.poll_release(poll) {
                debug!(poll = %poll, error = %e, "Readiness set release failed");
            }
            return Err(SessionError::Transport {
                op: "poll_add",
                source: e,
            });
        }

        *self.shared.listener.lock() = Some(listener);
        self.shared.server_active.store(true, Ordering::Release);
        self.shared.set_mode(Mode::Server);

        let events = EventLoop::new(Arc::clone(&self.shared), poll, listener);
        let accept = AcceptLoop::new(
            Arc::clone(&self.shared),
            poll,
            server_ctx,
            params.single_sender,
        );
        let mut threads = Vec::with_capacity(2);
        let spawned = LoopThread::spawn("srtnet-events", move || events.run()).and_then(|events| {
            threads.push(events);
            LoopThread::spawn("srtnet-accept", move || accept.run())
        });

        match spawned {
            Ok(accept) => {
                threads.push(accept);
                state.threads = threads;
                *self.shared.local_addr.lock() = Some(local_addr);
                state.mode = Mode::Server;
                info!(
                    local = %local_addr,
                    single_sender = params.single_sender,
                    encrypted = !params.link.psk.is_empty(),
                    "Server started"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn server threads");
                self.shared.server_active.store(false, Ordering::Release);
                if let Some(listener) = self.shared.take_listener() {
                    self.shared.close_quietly(listener);
                }
                let events_ran = !threads.is_empty();
                let name = if events_ran { "srtnet-accept" } else { "srtnet-events" };
                for thread in threads {
                    thread.join_within(STOP_TIMEOUT);
                }
                if !events_ran {
                    if let Err(e) = transport.poll_release(poll) {
                        debug!(poll = %poll, error = %e, "Readiness set release failed");
                    }
                }
                self.shared.set_mode(Mode::Unknown);
                Err(SessionError::ThreadSpawn { name, source: e })
            }
        }
    }

    /// Connect to a server.
    ///
    /// A host name is resolved and every address tried in order; the first
    /// successful handshake wins. `ctx` is the context reported for the server
    /// connection in data and disconnect callbacks.
    pub fn start_client(&self, params: &ClientParams, ctx: Arc<NetworkConnection>) -> Result<()> {
        let mut state = self.state.lock();
        if state.mode != Mode::Unknown {
            error!(mode = ?state.mode, "Start client refused, session already running");
            return Err(SessionError::ModeAlreadySet(state.mode));
        }
        params.validate().map_err(|errors| {
            error!(errors = ?errors, "Invalid client parameters");
            SessionError::InvalidParams(errors.join("; "))
        })?;
        let local = params.local_addr()?;
        let targets = resolve(&params.host, params.port)?;

        let transport = self.shared.transport();
        let (handle, peer) = connect_any(transport.as_ref(), params, &targets, local)?;

        let local_addr = match transport.local_addr(handle) {
            Ok(addr) => addr,
            Err(e) => {
                self.shared.close_quietly(handle);
                return Err(SessionError::Transport {
                    op: "local_addr",
                    source: e,
                });
            }
        };

        *self.shared.client.lock() = Some(ClientLink {
            handle,
            ctx: Arc::clone(&ctx),
        });
        self.shared.client_active.store(true, Ordering::Release);
        self.shared.set_mode(Mode::Client);

        let receiver = ClientLoop::new(Arc::clone(&self.shared), handle, ctx);
        match LoopThread::spawn("srtnet-client", move || receiver.run()) {
            Ok(thread) => {
                state.threads.push(thread);
                *self.shared.local_addr.lock() = Some(local_addr);
                state.mode = Mode::Client;
                info!(%peer, local = %local_addr, %handle, "Client connected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn client thread");
                self.shared.client_active.store(false, Ordering::Release);
                if let Some(link) = self.shared.take_client() {
                    self.shared.close_quietly(link.handle);
                }
                self.shared.set_mode(Mode::Unknown);
                Err(SessionError::ThreadSpawn {
                    name: "srtnet-client",
                    source: e,
                })
            }
        }
    }

    /// Tear down the running mode.
    ///
    /// Signals the loops, closes the listener or client socket, evicts and
    /// notifies every connection, joins the threads within [`STOP_TIMEOUT`]
    /// each, then returns the session to [`Mode::Unknown`].
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        let mode = state.mode;
        if mode == Mode::Unknown {
            debug!("Stop called with nothing running");
            return Err(SessionError::NothingToStop);
        }
        info!(?mode, "Stopping session");

        let mut close_error = None;
        let mut departed = Vec::new();
        match mode {
            Mode::Server => {
                self.shared.server_active.store(false, Ordering::Release);
                if let Some(listener) = self.shared.take_listener() {
                    if let Err(e) = self.shared.transport().close(listener) {
                        error!(handle = %listener, error = %e, "Failed to close listener");
                        close_error = Some(e);
                    }
                }
                departed = self.shared.drain_clients();
                debug!(evicted = departed.len(), "Registry cleared");
            }
            Mode::Client => {
                self.shared.client_active.store(false, Ordering::Release);
                if let Some(link) = self.shared.take_client() {
                    if let Err(e) = self.shared.transport().close(link.handle) {
                        error!(handle = %link.handle, error = %e, "Failed to close client socket");
                        close_error = Some(e);
                    }
                    departed.push((link.handle, link.ctx));
                }
            }
            Mode::Unknown => {}
        }

        for thread in state.threads.drain(..) {
            let name = thread.name();
            if !thread.join_within(STOP_TIMEOUT) {
                warn!(thread = name, "Continuing stop with thread still running");
            }
        }

        if mode == Mode::Server {
            // Anything admitted while the threads wound down.
            departed.extend(self.shared.drain_clients());
        }

        *self.shared.local_addr.lock() = None;
        state.mode = Mode::Unknown;
        self.shared.set_mode(Mode::Unknown);
        drop(state);

        // No lock held: a callback may query or restart this session.
        for (handle, ctx) in &departed {
            self.shared.callbacks.notify_disconnect(ctx, *handle);
            if mode == Mode::Server {
                record_metric(MetricsEvent::ClientDisconnected);
            }
        }
        info!(?mode, notified = departed.len(), "Session stopped");

        match close_error {
            Some(source) => Err(SessionError::Transport { op: "close", source }),
            None => Ok(()),
        }
    }

    // ---- data plane ----

    /// Send one message.
    ///
    /// In client mode `target` is ignored. In server mode it must name an
    /// active client. A transport that accepts fewer bytes than `data.len()` is
    /// reported as [`SessionError::PartialSend`]; nothing is retried.
    pub fn send_data(
        &self,
        data: &[u8],
        ctrl: &MsgCtrl,
        target: Option<ConnectionHandle>,
    ) -> Result<()> {
        let handle = self.select_target(target)?;
        match self.shared.transport().send_msg(handle, data, ctrl) {
            Ok(sent) if sent == data.len() => {
                trace!(%handle, bytes = sent, "Message sent");
                record_metric(MetricsEvent::MessageSent { bytes: sent });
                Ok(())
            }
            Ok(sent) => {
                error!(%handle, sent, len = data.len(), "Partial send");
                record_metric(MetricsEvent::SendFailed);
                Err(SessionError::PartialSend {
                    sent,
                    len: data.len(),
                })
            }
            Err(e) => {
                warn!(%handle, len = data.len(), error = %e, "Send failed");
                record_metric(MetricsEvent::SendFailed);
                Err(SessionError::Transport {
                    op: "send",
                    source: e,
                })
            }
        }
    }

    /// Link statistics for the client connection or the named server-side
    /// client. `clear` resets the interval counters after reading.
    pub fn statistics(
        &self,
        clear: bool,
        instantaneous: bool,
        target: Option<ConnectionHandle>,
    ) -> Result<TransportStats> {
        let handle = self.select_target(target)?;
        self.shared
            .transport()
            .stats(handle, clear, instantaneous)
            .map_err(|e| {
                warn!(%handle, error = %e, "Statistics query failed");
                SessionError::Transport {
                    op: "stats",
                    source: e,
                }
            })
    }

    /// Run `visitor` over the live client table with the registry locked.
    ///
    /// The visitor must not block or call back into this session's registry.
    pub fn active_clients<R>(&self, visitor: impl FnOnce(&ClientMap) -> R) -> R {
        self.shared.registry.visit(visitor)
    }

    /// Handle and context of the server connection, client mode only.
    pub fn connected_server(&self) -> Option<(ConnectionHandle, Arc<NetworkConnection>)> {
        if self.shared.mode() != Mode::Client || !self.shared.client_active.load(Ordering::Acquire)
        {
            return None;
        }
        self.shared
            .client
            .lock()
            .as_ref()
            .map(|link| (link.handle, Arc::clone(&link.ctx)))
    }

    // ---- accessors ----

    pub fn mode(&self) -> Mode {
        self.shared.mode()
    }

    /// Whether the running mode's loops are still serving.
    pub fn is_active(&self) -> bool {
        match self.shared.mode() {
            Mode::Server => self.shared.server_active.load(Ordering::Acquire),
            Mode::Client => self.shared.client_active.load(Ordering::Acquire),
            Mode::Unknown => false,
        }
    }

    /// Bound address of the listener or the client socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.lock()
    }

    /// Bound port, useful after starting with port `0`.
    pub fn local_port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    fn select_target(&self, target: Option<ConnectionHandle>) -> Result<ConnectionHandle> {
        match self.shared.mode() {
            Mode::Client => {
                if !self.shared.client_active.load(Ordering::Acquire) {
                    return Err(SessionError::NotActive);
                }
                self.shared
                    .client
                    .lock()
                    .as_ref()
                    .map(|link| link.handle)
                    .ok_or(SessionError::NotActive)
            }
            Mode::Server => {
                if !self.shared.server_active.load(Ordering::Acquire) {
                    return Err(SessionError::NotActive);
                }
                let handle = target.ok_or(SessionError::MissingTarget)?;
                if self.shared.registry.contains(handle) {
                    Ok(handle)
                } else {
                    Err(SessionError::UnknownTarget(handle))
                }
            }
            Mode::Unknown => Err(SessionError::NotActive),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let running = self.state.lock().mode != Mode::Unknown;
        if running {
            if let Err(e) = self.stop() {
                warn!(error = %e, "Stop on drop reported an error");
            }
        }
    }
}

fn apply_options(
    transport: &dyn Transport,
    handle: ConnectionHandle,
    link: &LinkParams,
    sender: bool,
) -> Result<()> {
    let mut options = link.socket_options();
    if sender {
        options.push(srtnet_x::SocketOption::Sender(true));
    }
    for option in options {
        let name = option.name();
        transport.set_option(handle, option).map_err(|e| {
            error!(%handle, option = name, error = %e, "Failed to set socket option");
            SessionError::Transport {
                op: "set_option",
                source: e,
            }
        })?;
    }
    Ok(())
}

/// Create, configure, bind and listen. The socket is closed on any failure.
fn open_listener(
    transport: &dyn Transport,
    addr: SocketAddr,
    link: &LinkParams,
) -> Result<(ConnectionHandle, SocketAddr)> {
    let listener = transport
        .create_socket()
        .map_err(SessionError::transport("create_socket"))?;

    let setup = || -> Result<SocketAddr> {
        apply_options(transport, listener, link, false)?;
        transport.bind(listener, addr).map_err(|e| {
            error!(%addr, error = %e, "Bind failed");
            SessionError::Transport {
                op: "bind",
                source: e,
            }
        })?;
        transport
            .listen(listener, LISTEN_BACKLOG)
            .map_err(SessionError::transport("listen"))?;
        transport
            .local_addr(listener)
            .map_err(SessionError::transport("local_addr"))
    };

    match setup() {
        Ok(local) => Ok((listener, local)),
        Err(e) => {
            if let Err(close_err) = transport.close(listener) {
                debug!(handle = %listener, error = %close_err, "Close after failed listen");
            }
            Err(e)
        }
    }
}

/// One connect attempt on a fresh socket. The socket is closed on failure.
fn connect_one(
    transport: &dyn Transport,
    target: SocketAddr,
    local: Option<SocketAddr>,
    link: &LinkParams,
) -> Result<ConnectionHandle> {
    let handle = transport
        .create_socket()
        .map_err(SessionError::transport("create_socket"))?;

    let attempt = || -> Result<()> {
        apply_options(transport, handle, link, true)?;
        if let Some(local) = local {
            transport
                .bind(handle, local)
                .map_err(SessionError::transport("bind"))?;
        }
        transport
            .connect(handle, target)
            .map_err(SessionError::transport("connect"))
    };

    match attempt() {
        Ok(()) => Ok(handle),
        Err(e) => {
            if let Err(close_err) = transport.close(handle) {
                debug!(%handle, error = %close_err, "Close after failed connect");
            }
            Err(e)
        }
    }
}

/// Try each target in order on a fresh socket; the first handshake wins.
fn connect_any(
    transport: &dyn Transport,
    params: &ClientParams,
    targets: &[SocketAddr],
    local: Option<SocketAddr>,
) -> Result<(ConnectionHandle, SocketAddr)> {
    for target in targets {
        match connect_one(transport, *target, local, &params.link) {
            Ok(handle) => return Ok((handle, *target)),
            Err(e) => warn!(peer = %target, error = %e, "Connect attempt failed"),
        }
    }
    error!(host = %params.host, port = params.port, "Failed to connect to any address");
    Err(SessionError::ConnectFailed {
        host: params.host.clone(),
        port: params.port,
    })
}

/// IP literals are used as-is; anything else goes through the resolver.
fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| {
            error!(%host, error = %e, "Host resolution failed");
            SessionError::InvalidAddress(format!("{host}: {e}"))
        })?
        .collect();
    if addrs.is_empty() {
        return Err(SessionError::InvalidAddress(host.to_string()));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trips_through_atomic() {
        for mode in [Mode::Unknown, Mode::Server, Mode::Client] {
            assert_eq!(Mode::from_u8(mode as u8), mode);
        }
        assert_eq!(Mode::from_u8(200), Mode::Unknown);
    }

    fn listening_loopback(addr: SocketAddr) -> srtnet_x::loopback::LoopbackTransport {
        let transport = srtnet_x::loopback::LoopbackTransport::new();
        transport.startup().unwrap();
        let listener = transport.create_socket().unwrap();
        transport.bind(listener, addr).unwrap();
        transport.listen(listener, LISTEN_BACKLOG).unwrap();
        transport
    }

    #[test]
    fn test_connect_any_falls_through_to_next_address() {
        let bound: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let unbound: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let transport = listening_loopback(bound);
        assert_eq!(transport.open_sockets(), 1);

        let params = ClientParams::new("localhost", 9000);
        let (handle, peer) = connect_any(&transport, &params, &[unbound, bound], None).unwrap();
        assert_eq!(peer, bound);
        // Listener, connected client and its pending peer; the failed attempt is gone.
        assert_eq!(transport.open_sockets(), 3);
        assert!(transport.local_addr(handle).is_ok());
    }

    #[test]
    fn test_connect_any_stops_at_first_success() {
        let first: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let transport = listening_loopback(first);
        let second = "127.0.0.1:9002".parse().unwrap();
        let listener = transport.create_socket().unwrap();
        transport.bind(listener, second).unwrap();
        transport.listen(listener, LISTEN_BACKLOG).unwrap();

        let params = ClientParams::new("localhost", 9000);
        let (_, peer) = connect_any(&transport, &params, &[first, second], None).unwrap();
        assert_eq!(peer, first);
        assert_eq!(transport.open_sockets(), 4);
    }

    #[test]
    fn test_connect_any_reports_failure_when_every_address_fails() {
        let transport = listening_loopback("127.0.0.1:9000".parse().unwrap());
        let targets = [
            "127.0.0.1:9001".parse().unwrap(),
            "[::1]:9000".parse().unwrap(),
        ];

        let params = ClientParams::new("localhost", 9000);
        let result = connect_any(&transport, &params, &targets, None);
        assert!(matches!(
            result,
            Err(SessionError::ConnectFailed { ref host, port: 9000 }) if host == "localhost"
        ));
        assert_eq!(transport.open_sockets(), 1);
    }

    #[test]
    fn test_resolve_ip_literal_skips_resolver() {
        assert_eq!(
            resolve("::1", 8009).unwrap(),
            vec!["[::1]:8009".parse().unwrap()]
        );
    }
}
