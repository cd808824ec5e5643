//! Client receive loop.

use srtnet_x::ConnectionHandle;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, trace};

use super::RECV_BUFFER_SIZE;
use crate::context::NetworkConnection;
use crate::session::Shared;
use crate::telemetry::{record_metric, MetricsEvent};

/// Blocking receive on the single client connection.
pub(crate) struct ClientLoop {
    shared: Arc<Shared>,
    handle: ConnectionHandle,
    ctx: Arc<NetworkConnection>,
}

impl ClientLoop {
    pub(crate) fn new(
        shared: Arc<Shared>,
        handle: ConnectionHandle,
        ctx: Arc<NetworkConnection>,
    ) -> Self {
        Self {
            shared,
            handle,
            ctx,
        }
    }

    pub(crate) fn run(self) {
        record_metric(MetricsEvent::LoopStarted);
        debug!(handle = %self.handle, "Client receive loop started");

        let handle = self.handle;
        let transport = Arc::clone(self.shared.transport());
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        while self.shared.client_active.load(Ordering::Acquire) {
            match transport.recv_msg(handle, &mut buf) {
                Ok((0, _)) => {}
                Ok((len, ctrl)) => {
                    trace!(%handle, len, seq = ctrl.pkt_seq, "Message received");
                    record_metric(MetricsEvent::MessageReceived { bytes: len });
                    self.shared
                        .callbacks
                        .dispatch(&buf[..len], &ctrl, &self.ctx, handle);
                }
                Err(e) => {
                    if self.shared.client_active.swap(false, Ordering::AcqRel) {
                        error!(%handle, error = %e, "Connection to server lost");
                        record_metric(MetricsEvent::ReceiveFailed);
                    } else {
                        debug!(%handle, error = %e, "Receive ended by stop");
                    }
                    break;
                }
            }
        }

        // stop() notifies instead when it took the link first.
        if let Some(link) = self.shared.take_client() {
            self.shared.close_quietly(link.handle);
            self.shared.callbacks.notify_disconnect(&link.ctx, link.handle);
        }
        debug!(%handle, "Client receive loop exited");
        record_metric(MetricsEvent::LoopStopped);
    }
}
