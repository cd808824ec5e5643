//! srtnet: connection management and event dispatch over a reliable-UDP
//! transport.
//!
//! A [`Session`] either listens for clients and multiplexes their traffic
//! through one readiness-polling thread, or connects to a server and receives
//! on a dedicated thread. Applications plug in through callbacks for admission,
//! data and disconnect, and send through [`Session::send_data`].
//!
//! The transport itself lives behind the [`srtnet_x::Transport`] trait.
//!
//! ```no_run
//! use std::sync::Arc;
//! use srtnet::{NetworkConnection, ServerParams, Session};
//!
//! let session = Session::new(&srtnet_x::loopback::shared())?;
//! session.set_admission_callback(|_peer, _handle, _server_ctx| {
//!     Some(Arc::new(NetworkConnection::new("peer")))
//! });
//! session.set_data_callback(|data, _ctrl, _ctx, handle| {
//!     println!("{} bytes from {}", data.len(), handle);
//! });
//! session.start_server(&ServerParams::new("0.0.0.0", 8009), None)?;
//! # Ok::<(), srtnet::SessionError>(())
//! ```

pub mod callbacks;
pub mod config;
pub mod context;
pub mod error;
pub mod params;
pub mod registry;
pub mod session;
pub mod telemetry;
pub mod worker;

pub use callbacks::{AdmissionCallback, BorrowedDataCallback, CopyDataCallback, DisconnectCallback};
pub use context::NetworkConnection;
pub use error::{Result, SessionError};
pub use params::{ClientParams, LinkParams, ServerParams};
pub use registry::ClientMap;
pub use session::{Mode, Session, LISTEN_BACKLOG};
pub use srtnet_x::{ConnectionHandle, Library, MsgCtrl, TransportError, TransportStats};
