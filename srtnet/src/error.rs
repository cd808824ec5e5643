//! Session error type.

use srtnet_x::{ConnectionHandle, TransportError};
use thiserror::Error;

use crate::session::Mode;

/// Errors returned by [`Session`](crate::Session) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    // ---- configuration ----
    #[error("session already running in {0:?} mode")]
    ModeAlreadySet(Mode),

    #[error("no admission callback registered")]
    MissingAdmissionCallback,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    // ---- resources ----
    #[error("transport {op} failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("could not connect to {host}:{port}")]
    ConnectFailed { host: String, port: u16 },

    #[error("failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    // ---- data plane ----
    #[error("session is not active")]
    NotActive,

    #[error("server mode requires a target connection")]
    MissingTarget,

    #[error("no active client {0}")]
    UnknownTarget(ConnectionHandle),

    #[error("transport accepted {sent} of {len} bytes")]
    PartialSend { sent: usize, len: usize },

    // ---- lifecycle ----
    #[error("nothing to stop")]
    NothingToStop,
}

impl SessionError {
    pub(crate) fn transport(op: &'static str) -> impl FnOnce(TransportError) -> SessionError {
        move |source| SessionError::Transport { op, source }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
