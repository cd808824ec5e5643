//! Error types for transport operations.

use std::net::SocketAddr;
use thiserror::Error;

use crate::{ConnectionHandle, PollId};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Error type for transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The library has not been started or was already cleaned up.
    #[error("transport library not initialized")]
    NotInitialized,

    /// No open socket with this handle.
    #[error("invalid socket {0}")]
    InvalidHandle(ConnectionHandle),

    /// No poll set with this id.
    #[error("invalid poll set {0}")]
    InvalidPoll(PollId),

    /// The socket was closed while the call was pending.
    #[error("socket {0} closed")]
    Closed(ConnectionHandle),

    /// The peer went away; no more messages will arrive.
    #[error("connection lost on {0}")]
    ConnectionLost(ConnectionHandle),

    /// Nobody accepted the handshake at this address.
    #[error("connection to {0} refused")]
    ConnectionRefused(SocketAddr),

    /// The peer rejected the handshake (for example a passphrase mismatch).
    #[error("connection to {addr} rejected: {reason}")]
    ConnectionRejected { addr: SocketAddr, reason: String },

    /// Another socket already holds this address.
    #[error("address {0} already in use")]
    AddressInUse(SocketAddr),

    /// The message exceeds the configured payload size.
    #[error("message of {len} bytes exceeds payload size {max}")]
    MessageTooLarge { len: usize, max: usize },

    /// The call is not valid in the socket's current state.
    #[error("socket {handle}: {reason}")]
    InvalidState {
        handle: ConnectionHandle,
        reason: &'static str,
    },

    /// The option value was refused.
    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    /// No free port was left for auto-assignment.
    #[error("no free ephemeral port")]
    PortsExhausted,
}

impl TransportError {
    /// Whether the error means the connection is gone for good.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::Closed(_)
                | TransportError::ConnectionLost(_)
                | TransportError::InvalidHandle(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        let handle = ConnectionHandle(7);
        assert!(TransportError::Closed(handle).is_disconnect());
        assert!(TransportError::ConnectionLost(handle).is_disconnect());
        assert!(TransportError::InvalidHandle(handle).is_disconnect());
        assert!(!TransportError::NotInitialized.is_disconnect());
        assert!(!TransportError::MessageTooLarge { len: 2000, max: 1456 }.is_disconnect());
    }
}
