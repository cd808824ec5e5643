//! Process-local transport.
//!
//! [`LoopbackTransport`] implements [`Transport`] over an in-memory network that
//! lives inside one process. It keeps the contract of a real reliable-UDP
//! library: handshakes against listening sockets, passphrase agreement,
//! message boundaries, payload limits, blocking calls that unblock on close,
//! readiness polling and per-socket statistics. No datagrams leave the process.
//!
//! # Model
//!
//! ```text
//!  client socket ──connect──▶ listener ──backlog──▶ accept()
//!       │                                         │
//!       └──────────── Link (peer handles) ────────┘
//!            send_msg pushes into the peer inbox
//! ```
//!
//! All state sits behind one mutex; one condition variable is signalled on every
//! change so blocking calls re-check their predicate.

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::{
    ConnectionHandle, Library, MsgCtrl, PollEvent, PollEvents, PollId, Result, SocketOption,
    Transport, TransportError, TransportStats, DEFAULT_PEER_IDLE_TIMEOUT, LIVE_MAX_PAYLOAD,
    PASSPHRASE_KEY_LEN, PASSPHRASE_MAX_LEN, PASSPHRASE_MIN_LEN,
};

/// First port handed out for auto-assigned binds.
pub const EPHEMERAL_PORT_START: u16 = 49152;
/// Last port handed out for auto-assigned binds.
pub const EPHEMERAL_PORT_END: u16 = 65535;

static SHARED: Lazy<Arc<Library>> = Lazy::new(|| Library::new(LoopbackTransport::new()));

/// Process-wide loopback library, created on first use.
pub fn shared() -> Arc<Library> {
    Arc::clone(&SHARED)
}

/// In-memory reliable message transport.
pub struct LoopbackTransport {
    network: Mutex<Network>,
    changed: Condvar,
    epoch: Instant,
}

struct Network {
    running: bool,
    next_handle: u32,
    next_poll: u32,
    next_port: u16,
    sockets: HashMap<ConnectionHandle, Socket>,
    polls: HashMap<PollId, HashMap<ConnectionHandle, PollEvents>>,
}

struct Socket {
    options: Options,
    local: Option<SocketAddr>,
    /// Accepted sockets share the listener's address without owning the port.
    owns_port: bool,
    role: Role,
    counters: Counters,
    created: Instant,
}

#[derive(Debug, Clone)]
struct Options {
    blocking: bool,
    sender: bool,
    latency: Duration,
    loss_max_ttl: u32,
    overhead_percent: u32,
    payload_size: usize,
    passphrase: Option<String>,
    key_len: u32,
    peer_idle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            blocking: true,
            sender: false,
            latency: Duration::from_millis(120),
            loss_max_ttl: 0,
            overhead_percent: 25,
            payload_size: LIVE_MAX_PAYLOAD,
            passphrase: None,
            key_len: PASSPHRASE_KEY_LEN,
            peer_idle_timeout: DEFAULT_PEER_IDLE_TIMEOUT,
        }
    }
}

enum Role {
    Idle,
    Listening {
        backlog: usize,
        pending: VecDeque<(ConnectionHandle, SocketAddr)>,
    },
    Connected(Link),
}

struct Link {
    peer: ConnectionHandle,
    inbox: VecDeque<(Vec<u8>, MsgCtrl)>,
    broken: bool,
    next_seq: i32,
    next_msg: i32,
}

impl Link {
    fn new(peer: ConnectionHandle) -> Self {
        Self {
            peer,
            inbox: VecDeque::new(),
            broken: false,
            next_seq: 0,
            next_msg: 1,
        }
    }
}

struct Counters {
    pkt_sent_total: i64,
    pkt_recv_total: i64,
    byte_sent_total: u64,
    byte_recv_total: u64,
    pkt_sent: i64,
    pkt_recv: i64,
    byte_sent: u64,
    byte_recv: u64,
    interval_start: Instant,
}

impl Counters {
    fn new(now: Instant) -> Self {
        Self {
            pkt_sent_total: 0,
            pkt_recv_total: 0,
            byte_sent_total: 0,
            byte_recv_total: 0,
            pkt_sent: 0,
            pkt_recv: 0,
            byte_sent: 0,
            byte_recv: 0,
            interval_start: now,
        }
    }

    fn on_sent(&mut self, bytes: usize) {
        self.pkt_sent_total += 1;
        self.pkt_sent += 1;
        self.byte_sent_total += bytes as u64;
        self.byte_sent += bytes as u64;
    }

    fn on_received(&mut self, bytes: usize) {
        self.pkt_recv_total += 1;
        self.pkt_recv += 1;
        self.byte_recv_total += bytes as u64;
        self.byte_recv += bytes as u64;
    }

    fn clear_interval(&mut self, now: Instant) {
        self.pkt_sent = 0;
        self.pkt_recv = 0;
        self.byte_sent = 0;
        self.byte_recv = 0;
        self.interval_start = now;
    }
}

fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        0.0
    } else {
        (bytes as f64 * 8.0) / secs / 1_000_000.0
    }
}

fn addr_overlaps(a: &SocketAddr, b: &SocketAddr) -> bool {
    a.port() == b.port()
        && a.is_ipv4() == b.is_ipv4()
        && (a.ip() == b.ip() || a.ip().is_unspecified() || b.ip().is_unspecified())
}

/// Whether a listener bound to `bound` answers handshakes sent to `target`.
fn listener_matches(bound: &SocketAddr, target: &SocketAddr) -> bool {
    bound.port() == target.port()
        && bound.is_ipv4() == target.is_ipv4()
        && (bound.ip() == target.ip() || bound.ip().is_unspecified())
}

fn loopback_for(target: &SocketAddr) -> IpAddr {
    if target.ip().is_unspecified() {
        match target {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
        }
    } else {
        target.ip()
    }
}

impl Network {
    fn new() -> Self {
        Self {
            running: false,
            next_handle: 1,
            next_poll: 1,
            next_port: EPHEMERAL_PORT_START,
            sockets: HashMap::new(),
            polls: HashMap::new(),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running {
            Ok(())
        } else {
            Err(TransportError::NotInitialized)
        }
    }

    fn socket(&self, handle: ConnectionHandle) -> Result<&Socket> {
        self.sockets
            .get(&handle)
            .ok_or(TransportError::InvalidHandle(handle))
    }

    fn socket_mut(&mut self, handle: ConnectionHandle) -> Result<&mut Socket> {
        self.sockets
            .get_mut(&handle)
            .ok_or(TransportError::InvalidHandle(handle))
    }

    fn allocate_handle(&mut self) -> ConnectionHandle {
        loop {
            let handle = ConnectionHandle(self.next_handle);
            self.next_handle = self.next_handle.wrapping_add(1).max(1);
            if !self.sockets.contains_key(&handle) {
                return handle;
            }
        }
    }

    fn address_in_use(&self, addr: &SocketAddr) -> bool {
        self.sockets.values().any(|s| {
            s.owns_port
                && s
                    .local
                    .as_ref()
                    .map(|local| addr_overlaps(local, addr))
                    .unwrap_or(false)
        })
    }

    fn allocate_port(&mut self, ip: IpAddr) -> Result<SocketAddr> {
        let span = (EPHEMERAL_PORT_END - EPHEMERAL_PORT_START) as usize + 1;
        for _ in 0..span {
            let port = self.next_port;
            self.next_port = if port == EPHEMERAL_PORT_END {
                EPHEMERAL_PORT_START
            } else {
                port + 1
            };
            let candidate = SocketAddr::new(ip, port);
            if !self.address_in_use(&candidate) {
                return Ok(candidate);
            }
        }
        Err(TransportError::PortsExhausted)
    }

    fn find_listener(&self, target: &SocketAddr) -> Option<ConnectionHandle> {
        self.sockets.iter().find_map(|(handle, s)| match (&s.role, &s.local) {
            (Role::Listening { .. }, Some(bound)) if listener_matches(bound, target) => {
                Some(*handle)
            }
            _ => None,
        })
    }

    fn break_link(&mut self, handle: ConnectionHandle) {
        if let Some(Socket {
            role: Role::Connected(link),
            ..
        }) = self.sockets.get_mut(&handle)
        {
            link.broken = true;
        }
    }

    /// Remove a socket, breaking every link that pointed at it.
    fn remove_socket(&mut self, handle: ConnectionHandle) -> Result<()> {
        let socket = self
            .sockets
            .remove(&handle)
            .ok_or(TransportError::InvalidHandle(handle))?;
        match socket.role {
            Role::Connected(link) => self.break_link(link.peer),
            Role::Listening { pending, .. } => {
                for (accepted, _) in pending {
                    if let Some(s) = self.sockets.remove(&accepted) {
                        if let Role::Connected(link) = s.role {
                            self.break_link(link.peer);
                        }
                    }
                }
            }
            Role::Idle => {}
        }
        Ok(())
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            network: Mutex::new(Network::new()),
            changed: Condvar::new(),
            epoch: Instant::now(),
        }
    }

    /// Number of open sockets, including accepted and pending ones.
    pub fn open_sockets(&self) -> usize {
        self.network.lock().sockets.len()
    }

    fn now_micros(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }
}

impl Transport for LoopbackTransport {
    fn startup(&self) -> Result<()> {
        let mut net = self.network.lock();
        net.running = true;
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        let mut net = self.network.lock();
        net.running = false;
        net.sockets.clear();
        net.polls.clear();
        self.changed.notify_all();
        Ok(())
    }

    fn create_socket(&self) -> Result<ConnectionHandle> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        let handle = net.allocate_handle();
        let now = Instant::now();
        net.sockets.insert(
            handle,
            Socket {
                options: Options::default(),
                local: None,
                owns_port: false,
                role: Role::Idle,
                counters: Counters::new(now),
                created: now,
            },
        );
        trace!(%handle, "Socket created");
        Ok(handle)
    }

    fn set_option(&self, handle: ConnectionHandle, option: SocketOption) -> Result<()> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        let socket = net.socket_mut(handle)?;
        let name = option.name();
        if !matches!(socket.role, Role::Idle) && !matches!(option, SocketOption::ReceiveBlocking(_))
        {
            return Err(TransportError::InvalidOption {
                name,
                reason: "only settable before connect or listen".to_string(),
            });
        }
        let opts = &mut socket.options;
        match option {
            SocketOption::ReceiveBlocking(v) => opts.blocking = v,
            SocketOption::Sender(v) => opts.sender = v,
            SocketOption::Latency(v) => opts.latency = v,
            SocketOption::LossMaxTtl(v) => opts.loss_max_ttl = v,
            SocketOption::OverheadBandwidth(v) => {
                if !(5..=100).contains(&v) {
                    return Err(TransportError::InvalidOption {
                        name,
                        reason: format!("{v}% outside 5..=100"),
                    });
                }
                opts.overhead_percent = v;
            }
            SocketOption::PayloadSize(v) => {
                if v == 0 || v > LIVE_MAX_PAYLOAD {
                    return Err(TransportError::InvalidOption {
                        name,
                        reason: format!("{v} outside 1..={LIVE_MAX_PAYLOAD}"),
                    });
                }
                opts.payload_size = v;
            }
            SocketOption::Passphrase(v) => {
                if v.is_empty() {
                    opts.passphrase = None;
                } else if !(PASSPHRASE_MIN_LEN..=PASSPHRASE_MAX_LEN).contains(&v.len()) {
                    return Err(TransportError::InvalidOption {
                        name,
                        reason: format!(
                            "length {} outside {PASSPHRASE_MIN_LEN}..={PASSPHRASE_MAX_LEN}",
                            v.len()
                        ),
                    });
                } else {
                    opts.passphrase = Some(v);
                }
            }
            SocketOption::KeyLength(v) => {
                if !matches!(v, 0 | 16 | 24 | 32) {
                    return Err(TransportError::InvalidOption {
                        name,
                        reason: format!("unsupported key length {v}"),
                    });
                }
                opts.key_len = v;
            }
            SocketOption::PeerIdleTimeout(v) => opts.peer_idle_timeout = v,
        }
        Ok(())
    }

    fn bind(&self, handle: ConnectionHandle, addr: SocketAddr) -> Result<()> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        let socket = net.socket(handle)?;
        if socket.local.is_some() || !matches!(socket.role, Role::Idle) {
            return Err(TransportError::InvalidState {
                handle,
                reason: "already bound",
            });
        }
        let local = if addr.port() == 0 {
            net.allocate_port(addr.ip())?
        } else if net.address_in_use(&addr) {
            return Err(TransportError::AddressInUse(addr));
        } else {
            addr
        };
        let socket = net.socket_mut(handle)?;
        socket.local = Some(local);
        socket.owns_port = true;
        debug!(%handle, %local, "Socket bound");
        Ok(())
    }

    fn listen(&self, handle: ConnectionHandle, backlog: usize) -> Result<()> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        let socket = net.socket_mut(handle)?;
        if socket.local.is_none() {
            return Err(TransportError::InvalidState {
                handle,
                reason: "listen before bind",
            });
        }
        if !matches!(socket.role, Role::Idle) {
            return Err(TransportError::InvalidState {
                handle,
                reason: "already listening or connected",
            });
        }
        socket.role = Role::Listening {
            backlog: backlog.max(1),
            pending: VecDeque::new(),
        };
        Ok(())
    }

    fn accept(&self, handle: ConnectionHandle) -> Result<(ConnectionHandle, SocketAddr)> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        net.socket(handle)?;
        loop {
            net.ensure_running()?;
            let socket = net
                .sockets
                .get_mut(&handle)
                .ok_or(TransportError::Closed(handle))?;
            match &mut socket.role {
                Role::Listening { pending, .. } => {
                    if let Some(accepted) = pending.pop_front() {
                        trace!(listener = %handle, accepted = %accepted.0, "Accepted");
                        return Ok(accepted);
                    }
                }
                _ => {
                    return Err(TransportError::InvalidState {
                        handle,
                        reason: "accept on a socket that is not listening",
                    })
                }
            }
            self.changed.wait(&mut net);
        }
    }

    fn connect(&self, handle: ConnectionHandle, addr: SocketAddr) -> Result<()> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        let client = net.socket(handle)?;
        if !matches!(client.role, Role::Idle) {
            return Err(TransportError::InvalidState {
                handle,
                reason: "already listening or connected",
            });
        }
        let client_passphrase = client.options.passphrase.clone();
        let client_local = client.local;

        let listener_handle = net
            .find_listener(&addr)
            .ok_or(TransportError::ConnectionRefused(addr))?;
        let listener = net.socket(listener_handle)?;
        if listener.options.passphrase != client_passphrase {
            return Err(TransportError::ConnectionRejected {
                addr,
                reason: "passphrase mismatch".to_string(),
            });
        }
        if let Role::Listening { backlog, pending } = &listener.role {
            if pending.len() >= *backlog {
                return Err(TransportError::ConnectionRefused(addr));
            }
        }
        let accepted_options = listener.options.clone();
        let accepted_local = listener
            .local
            .map(|bound| {
                if bound.ip().is_unspecified() {
                    SocketAddr::new(loopback_for(&addr), bound.port())
                } else {
                    bound
                }
            })
            .unwrap_or(addr);

        let client_local = match client_local {
            Some(local) => local,
            None => {
                let local = net.allocate_port(loopback_for(&addr))?;
                let client = net.socket_mut(handle)?;
                client.local = Some(local);
                client.owns_port = true;
                local
            }
        };

        let accepted = net.allocate_handle();
        let now = Instant::now();
        net.sockets.insert(
            accepted,
            Socket {
                options: accepted_options,
                local: Some(accepted_local),
                owns_port: false,
                role: Role::Connected(Link::new(handle)),
                counters: Counters::new(now),
                created: now,
            },
        );
        net.socket_mut(handle)?.role = Role::Connected(Link::new(accepted));
        if let Role::Listening { pending, .. } = &mut net.socket_mut(listener_handle)?.role {
            pending.push_back((accepted, client_local));
        }
        debug!(%handle, %accepted, peer = %addr, local = %client_local, "Handshake completed");
        self.changed.notify_all();
        Ok(())
    }

    fn close(&self, handle: ConnectionHandle) -> Result<()> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        net.remove_socket(handle)?;
        trace!(%handle, "Socket closed");
        self.changed.notify_all();
        Ok(())
    }

    fn local_addr(&self, handle: ConnectionHandle) -> Result<SocketAddr> {
        let net = self.network.lock();
        net.ensure_running()?;
        net.socket(handle)?
            .local
            .ok_or(TransportError::InvalidState {
                handle,
                reason: "not bound",
            })
    }

    fn send_msg(&self, handle: ConnectionHandle, data: &[u8], ctrl: &MsgCtrl) -> Result<usize> {
        let now_micros = self.now_micros();
        let mut net = self.network.lock();
        net.ensure_running()?;
        let socket = net.socket_mut(handle)?;
        let max = socket.options.payload_size;
        let link = match &mut socket.role {
            Role::Connected(link) => link,
            _ => {
                return Err(TransportError::InvalidState {
                    handle,
                    reason: "not connected",
                })
            }
        };
        if link.broken {
            return Err(TransportError::ConnectionLost(handle));
        }
        if data.len() > max {
            return Err(TransportError::MessageTooLarge {
                len: data.len(),
                max,
            });
        }
        let peer = link.peer;
        let delivered = MsgCtrl {
            msg_ttl: ctrl.msg_ttl,
            in_order: ctrl.in_order,
            boundary: ctrl.boundary,
            src_time: if ctrl.src_time == 0 {
                now_micros
            } else {
                ctrl.src_time
            },
            pkt_seq: link.next_seq,
            msg_no: link.next_msg,
        };
        link.next_seq = link.next_seq.wrapping_add(1);
        link.next_msg = link.next_msg.wrapping_add(1);
        socket.counters.on_sent(data.len());

        match net.sockets.get_mut(&peer) {
            Some(Socket {
                role: Role::Connected(peer_link),
                counters,
                ..
            }) => {
                peer_link.inbox.push_back((data.to_vec(), delivered));
                counters.on_received(data.len());
            }
            _ => {
                net.break_link(handle);
                return Err(TransportError::ConnectionLost(handle));
            }
        }
        self.changed.notify_all();
        Ok(data.len())
    }

    fn recv_msg(&self, handle: ConnectionHandle, buf: &mut [u8]) -> Result<(usize, MsgCtrl)> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        net.socket(handle)?;
        loop {
            net.ensure_running()?;
            let socket = net
                .sockets
                .get_mut(&handle)
                .ok_or(TransportError::Closed(handle))?;
            let blocking = socket.options.blocking;
            let link = match &mut socket.role {
                Role::Connected(link) => link,
                _ => {
                    return Err(TransportError::InvalidState {
                        handle,
                        reason: "not connected",
                    })
                }
            };
            if let Some((payload, ctrl)) = link.inbox.pop_front() {
                if payload.len() > buf.len() {
                    let len = payload.len();
                    link.inbox.push_front((payload, ctrl));
                    return Err(TransportError::MessageTooLarge {
                        len,
                        max: buf.len(),
                    });
                }
                buf[..payload.len()].copy_from_slice(&payload);
                return Ok((payload.len(), ctrl));
            }
            if link.broken {
                return Err(TransportError::ConnectionLost(handle));
            }
            if !blocking {
                return Err(TransportError::InvalidState {
                    handle,
                    reason: "no message available",
                });
            }
            self.changed.wait(&mut net);
        }
    }

    fn stats(
        &self,
        handle: ConnectionHandle,
        clear: bool,
        instantaneous: bool,
    ) -> Result<TransportStats> {
        let now = Instant::now();
        let mut net = self.network.lock();
        net.ensure_running()?;
        let socket = net.socket_mut(handle)?;
        let c = &socket.counters;
        let (sent, recv, window) = if instantaneous {
            (c.byte_sent, c.byte_recv, now - c.interval_start)
        } else {
            (c.byte_sent_total, c.byte_recv_total, now - socket.created)
        };
        let stats = TransportStats {
            ms_time_stamp: (now - socket.created).as_millis() as i64,
            pkt_sent_total: c.pkt_sent_total,
            pkt_recv_total: c.pkt_recv_total,
            byte_sent_total: c.byte_sent_total,
            byte_recv_total: c.byte_recv_total,
            pkt_snd_drop_total: 0,
            pkt_rcv_drop_total: 0,
            pkt_sent: c.pkt_sent,
            pkt_recv: c.pkt_recv,
            byte_sent: c.byte_sent,
            byte_recv: c.byte_recv,
            mbps_send_rate: mbps(sent, window),
            mbps_recv_rate: mbps(recv, window),
            ms_rtt: 0.0,
        };
        if clear {
            socket.counters.clear_interval(now);
        }
        Ok(stats)
    }

    fn poll_create(&self) -> Result<PollId> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        let id = PollId(net.next_poll);
        net.next_poll = net.next_poll.wrapping_add(1).max(1);
        net.polls.insert(id, HashMap::new());
        Ok(id)
    }

    fn poll_add(&self, poll: PollId, handle: ConnectionHandle, events: PollEvents) -> Result<()> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        net.socket(handle)?;
        net.polls
            .get_mut(&poll)
            .ok_or(TransportError::InvalidPoll(poll))?
            .insert(handle, events);
        self.changed.notify_all();
        Ok(())
    }

    fn poll_remove(&self, poll: PollId, handle: ConnectionHandle) -> Result<()> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        net.polls
            .get_mut(&poll)
            .ok_or(TransportError::InvalidPoll(poll))?
            .remove(&handle);
        Ok(())
    }

    fn poll_wait(
        &self,
        poll: PollId,
        events: &mut Vec<PollEvent>,
        max: usize,
        timeout: Duration,
    ) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut net = self.network.lock();
        loop {
            net.ensure_running()?;
            let members = net.polls.get(&poll).ok_or(TransportError::InvalidPoll(poll))?;
            events.clear();
            for (handle, interest) in members {
                if events.len() >= max {
                    break;
                }
                let (readable, error) = match net.sockets.get(handle) {
                    None => (false, true),
                    Some(socket) => match &socket.role {
                        Role::Connected(link) => {
                            let queued = !link.inbox.is_empty();
                            (queued, link.broken && !queued)
                        }
                        Role::Listening { pending, .. } => (!pending.is_empty(), false),
                        Role::Idle => (false, false),
                    },
                };
                let readable = readable && interest.readable;
                let error = error && interest.error;
                if readable || error {
                    events.push(PollEvent {
                        handle: *handle,
                        readable,
                        error,
                    });
                }
            }
            if !events.is_empty() {
                return Ok(events.len());
            }
            if self.changed.wait_until(&mut net, deadline).timed_out() {
                events.clear();
                return Ok(0);
            }
        }
    }

    fn poll_release(&self, poll: PollId) -> Result<()> {
        let mut net = self.network.lock();
        net.ensure_running()?;
        net.polls
            .remove(&poll)
            .ok_or(TransportError::InvalidPoll(poll))?;
        self.changed.notify_all();
        Ok(())
    }
}
