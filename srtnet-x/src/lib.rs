//! srtnet-x: Transport boundary for srtnet
//!
//! This crate defines the interface between the srtnet session engine and the
//! reliable-UDP transport library underneath it. The transport is a black box
//! exposing socket-like primitives; srtnet never looks past this trait.
//!
//! # Architecture
//!
//! - **Session threads** (native, blocking) in `srtnet` drive accept, receive and
//!   readiness-polling loops against a [`Transport`]
//! - **Transport** owns sockets, connection handshakes, encryption and
//!   retransmission, and reports readiness through poll sets
//! - **Library lifecycle** is reference counted through [`Library`] and
//!   [`LibraryGuard`]: first user starts the transport, last user cleans it up
//!
//! # Message Model
//!
//! The transport is message-oriented. One `send_msg` is delivered as exactly one
//! `recv_msg` on the peer, carrying a [`MsgCtrl`] with sequence metadata. There
//! is no byte-stream view.
//!
//! # Implementations
//!
//! [`loopback::LoopbackTransport`] implements the trait over a process-local
//! network. It is what the tests and the demo binary run on.

pub mod error;
pub mod library;
pub mod loopback;

pub use error::{Result, TransportError};
pub use library::{Library, LibraryGuard};

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Largest payload a single live-mode message may carry.
pub const LIVE_MAX_PAYLOAD: usize = 1456;

/// Default peer-idle timeout before a silent connection is declared broken.
pub const DEFAULT_PEER_IDLE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Key length in bytes used whenever a passphrase is configured.
pub const PASSPHRASE_KEY_LEN: u32 = 16;

/// Passphrase length bounds accepted by the transport.
pub const PASSPHRASE_MIN_LEN: usize = 10;
pub const PASSPHRASE_MAX_LEN: usize = 79;

/// Opaque identifier for one transport-level socket.
///
/// Unique while the socket is open. The transport may hand the same value out
/// again after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u32);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier for one readiness-polling set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollId(pub u32);

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll-{}", self.0)
    }
}

/// Per-message control metadata passed alongside every send and receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgCtrl {
    /// Time-to-live in milliseconds, `-1` for infinite.
    pub msg_ttl: i32,
    /// Deliver strictly in order.
    pub in_order: bool,
    /// Message boundary flags.
    pub boundary: i32,
    /// Source timestamp in microseconds, `0` lets the transport stamp it.
    pub src_time: i64,
    /// Packet sequence number, filled on receive.
    pub pkt_seq: i32,
    /// Message number, filled on receive.
    pub msg_no: i32,
}

impl Default for MsgCtrl {
    fn default() -> Self {
        Self {
            msg_ttl: -1,
            in_order: false,
            boundary: 0,
            src_time: 0,
            pkt_seq: -1,
            msg_no: -1,
        }
    }
}

/// Pre-connection socket options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOption {
    /// Blocking receive mode.
    ReceiveBlocking(bool),
    /// Mark the socket as the sending side of the link.
    Sender(bool),
    /// Latency budget; data older than this is dropped.
    Latency(Duration),
    /// Reorder tolerance in packets before loss is reported.
    LossMaxTtl(u32),
    /// Retransmission bandwidth overhead in percent of the stream rate.
    OverheadBandwidth(u32),
    /// Maximum payload bytes per message.
    PayloadSize(usize),
    /// Pre-shared passphrase; enables encryption.
    Passphrase(String),
    /// Encryption key length in bytes.
    KeyLength(u32),
    /// Silence duration before the peer is declared gone.
    PeerIdleTimeout(Duration),
}

impl SocketOption {
    /// Short option name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SocketOption::ReceiveBlocking(_) => "RCVSYN",
            SocketOption::Sender(_) => "SENDER",
            SocketOption::Latency(_) => "LATENCY",
            SocketOption::LossMaxTtl(_) => "LOSSMAXTTL",
            SocketOption::OverheadBandwidth(_) => "OHEADBW",
            SocketOption::PayloadSize(_) => "PAYLOADSIZE",
            SocketOption::Passphrase(_) => "PASSPHRASE",
            SocketOption::KeyLength(_) => "PBKEYLEN",
            SocketOption::PeerIdleTimeout(_) => "PEERIDLETIMEO",
        }
    }
}

/// Readiness interest for a handle in a poll set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEvents {
    pub readable: bool,
    pub error: bool,
}

impl PollEvents {
    /// Interest in incoming data and errors.
    pub const IN_ERR: PollEvents = PollEvents {
        readable: true,
        error: true,
    };

    /// Interest in errors only.
    pub const ERR: PollEvents = PollEvents {
        readable: false,
        error: true,
    };
}

/// One ready handle reported by [`Transport::poll_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEvent {
    pub handle: ConnectionHandle,
    pub readable: bool,
    pub error: bool,
}

/// Link statistics for one socket.
///
/// Totals count from socket creation. Interval counters count from the last
/// clearing read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStats {
    /// Milliseconds since the socket was created.
    pub ms_time_stamp: i64,
    pub pkt_sent_total: i64,
    pub pkt_recv_total: i64,
    pub byte_sent_total: u64,
    pub byte_recv_total: u64,
    pub pkt_snd_drop_total: i64,
    pub pkt_rcv_drop_total: i64,
    pub pkt_sent: i64,
    pub pkt_recv: i64,
    pub byte_sent: u64,
    pub byte_recv: u64,
    pub mbps_send_rate: f64,
    pub mbps_recv_rate: f64,
    pub ms_rtt: f64,
}

/// Socket-like primitives of a reliable-UDP transport library.
///
/// # Contract
///
/// - All methods are callable concurrently from any thread
/// - `accept` and `recv_msg` block; closing the handle from another thread makes
///   them return an error, which is the only cancellation mechanism
/// - `poll_wait` blocks at most `timeout`
/// - Every call fails with [`TransportError::NotInitialized`] outside a
///   `startup`/`cleanup` bracket
pub trait Transport: Send + Sync {
    /// Initialise process-wide library state.
    fn startup(&self) -> Result<()>;

    /// Tear down process-wide library state, closing anything still open.
    fn cleanup(&self) -> Result<()>;

    fn create_socket(&self) -> Result<ConnectionHandle>;

    fn set_option(&self, handle: ConnectionHandle, option: SocketOption) -> Result<()>;

    fn bind(&self, handle: ConnectionHandle, addr: SocketAddr) -> Result<()>;

    fn listen(&self, handle: ConnectionHandle, backlog: usize) -> Result<()>;

    /// Block until a peer has completed its handshake with the listener.
    fn accept(&self, handle: ConnectionHandle) -> Result<(ConnectionHandle, SocketAddr)>;

    /// Perform the connection handshake with `addr`.
    fn connect(&self, handle: ConnectionHandle, addr: SocketAddr) -> Result<()>;

    fn close(&self, handle: ConnectionHandle) -> Result<()>;

    fn local_addr(&self, handle: ConnectionHandle) -> Result<SocketAddr>;

    /// Send one message. Returns the number of bytes accepted.
    fn send_msg(&self, handle: ConnectionHandle, data: &[u8], ctrl: &MsgCtrl) -> Result<usize>;

    /// Block until one message arrives and copy it into `buf`.
    fn recv_msg(&self, handle: ConnectionHandle, buf: &mut [u8]) -> Result<(usize, MsgCtrl)>;

    fn stats(
        &self,
        handle: ConnectionHandle,
        clear: bool,
        instantaneous: bool,
    ) -> Result<TransportStats>;

    fn poll_create(&self) -> Result<PollId>;

    fn poll_add(&self, poll: PollId, handle: ConnectionHandle, events: PollEvents) -> Result<()>;

    fn poll_remove(&self, poll: PollId, handle: ConnectionHandle) -> Result<()>;

    /// Wait up to `timeout` for ready handles. Clears `events`, fills at most
    /// `max` entries and returns how many were filled.
    fn poll_wait(
        &self,
        poll: PollId,
        events: &mut Vec<PollEvent>,
        max: usize,
        timeout: Duration,
    ) -> Result<usize>;

    fn poll_release(&self, poll: PollId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msgctrl_default_matches_live_defaults() {
        let ctrl = MsgCtrl::default();
        assert_eq!(ctrl.msg_ttl, -1);
        assert!(!ctrl.in_order);
        assert_eq!(ctrl.pkt_seq, -1);
        assert_eq!(ctrl.msg_no, -1);
        assert_eq!(ctrl.src_time, 0);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(ConnectionHandle(42).to_string(), "#42");
        assert_eq!(PollId(3).to_string(), "poll-3");
    }

    #[test]
    fn test_option_names() {
        assert_eq!(SocketOption::LossMaxTtl(16).name(), "LOSSMAXTTL");
        assert_eq!(
            SocketOption::Passphrase("secret-key".into()).name(),
            "PASSPHRASE"
        );
    }
}
