//! Consumer callback slots.
//!
//! Callbacks can be replaced at any time from any thread. Each invocation
//! clones the current `Arc` out of its slot and calls it with no lock held, so
//! a callback may call back into the session.

use bytes::Bytes;
use parking_lot::RwLock;
use srtnet_x::{ConnectionHandle, MsgCtrl};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::context::NetworkConnection;

/// Decides whether to admit a peer. `Some(ctx)` admits, `None` rejects.
pub type AdmissionCallback = dyn Fn(SocketAddr, ConnectionHandle, Option<&Arc<NetworkConnection>>) -> Option<Arc<NetworkConnection>>
    + Send
    + Sync;

/// Receives an owned copy of each message.
pub type CopyDataCallback =
    dyn Fn(Bytes, &MsgCtrl, &Arc<NetworkConnection>, ConnectionHandle) + Send + Sync;

/// Receives each message as a slice valid only for the call.
pub type BorrowedDataCallback =
    dyn Fn(&[u8], &MsgCtrl, &Arc<NetworkConnection>, ConnectionHandle) + Send + Sync;

/// Runs once per connection teardown.
pub type DisconnectCallback = dyn Fn(&Arc<NetworkConnection>, ConnectionHandle) + Send + Sync;

/// The one registered data handler. Registering either variant replaces the other.
#[derive(Clone)]
enum DataHandler {
    Copy(Arc<CopyDataCallback>),
    Borrowed(Arc<BorrowedDataCallback>),
}

#[derive(Default)]
pub(crate) struct Callbacks {
    admission: RwLock<Option<Arc<AdmissionCallback>>>,
    data: RwLock<Option<DataHandler>>,
    disconnect: RwLock<Option<Arc<DisconnectCallback>>>,
}

impl Callbacks {
    pub(crate) fn set_admission(&self, callback: Arc<AdmissionCallback>) {
        *self.admission.write() = Some(callback);
    }

    pub(crate) fn set_copy_data(&self, callback: Arc<CopyDataCallback>) {
        *self.data.write() = Some(DataHandler::Copy(callback));
    }

    pub(crate) fn set_borrowed_data(&self, callback: Arc<BorrowedDataCallback>) {
        *self.data.write() = Some(DataHandler::Borrowed(callback));
    }

    pub(crate) fn set_disconnect(&self, callback: Arc<DisconnectCallback>) {
        *self.disconnect.write() = Some(callback);
    }

    pub(crate) fn has_admission(&self) -> bool {
        self.admission.read().is_some()
    }

    /// Ask the admission callback about a peer. No callback means reject.
    pub(crate) fn admit(
        &self,
        peer: SocketAddr,
        handle: ConnectionHandle,
        server_ctx: Option<&Arc<NetworkConnection>>,
    ) -> Option<Arc<NetworkConnection>> {
        let callback = self.admission.read().clone()?;
        callback(peer, handle, server_ctx)
    }

    /// Hand one message to the data handler. Returns `false` when none is set.
    pub(crate) fn dispatch(
        &self,
        payload: &[u8],
        ctrl: &MsgCtrl,
        ctx: &Arc<NetworkConnection>,
        handle: ConnectionHandle,
    ) -> bool {
        let handler = self.data.read().clone();
        match handler {
            Some(DataHandler::Copy(callback)) => {
                callback(Bytes::copy_from_slice(payload), ctrl, ctx, handle);
                true
            }
            Some(DataHandler::Borrowed(callback)) => {
                callback(payload, ctrl, ctx, handle);
                true
            }
            None => false,
        }
    }

    pub(crate) fn notify_disconnect(&self, ctx: &Arc<NetworkConnection>, handle: ConnectionHandle) {
        let callback = self.disconnect.read().clone();
        if let Some(callback) = callback {
            callback(ctx, handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_without_handler_drops() {
        let callbacks = Callbacks::default();
        let ctx = NetworkConnection::shared(());
        assert!(!callbacks.dispatch(b"abc", &MsgCtrl::default(), &ctx, ConnectionHandle(1)));
    }

    #[test]
    fn test_registering_one_variant_replaces_the_other() {
        let callbacks = Callbacks::default();
        let copies = Arc::new(AtomicUsize::new(0));
        let borrows = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&copies);
        callbacks.set_copy_data(Arc::new(move |data: Bytes, _: &MsgCtrl, _: &Arc<NetworkConnection>, _: ConnectionHandle| {
            assert_eq!(&data[..], b"abc");
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let b = Arc::clone(&borrows);
        callbacks.set_borrowed_data(Arc::new(move |data: &[u8], _: &MsgCtrl, _: &Arc<NetworkConnection>, _: ConnectionHandle| {
            assert_eq!(data, b"abc");
            b.fetch_add(1, Ordering::SeqCst);
        }));

        let ctx = NetworkConnection::shared(());
        assert!(callbacks.dispatch(b"abc", &MsgCtrl::default(), &ctx, ConnectionHandle(1)));
        assert_eq!(copies.load(Ordering::SeqCst), 0);
        assert_eq!(borrows.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_admission_rejects() {
        let callbacks = Callbacks::default();
        assert!(!callbacks.has_admission());
        assert!(callbacks
            .admit("127.0.0.1:5000".parse().unwrap(), ConnectionHandle(3), None)
            .is_none());
    }

    #[test]
    fn test_admission_sees_server_context() {
        let callbacks = Callbacks::default();
        callbacks.set_admission(Arc::new(
            |_: SocketAddr, _: ConnectionHandle, server_ctx: Option<&Arc<NetworkConnection>>| {
                server_ctx.cloned()
            },
        ));
        let server_ctx = NetworkConnection::shared("server");
        let admitted = callbacks
            .admit(
                "127.0.0.1:5000".parse().unwrap(),
                ConnectionHandle(3),
                Some(&server_ctx),
            )
            .unwrap();
        assert!(Arc::ptr_eq(&admitted, &server_ctx));
    }
}
