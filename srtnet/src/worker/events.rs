//! Server event multiplexer.

use srtnet_x::{ConnectionHandle, PollEvent, PollId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace, warn};

use super::{MAX_POLL_EVENTS, POLL_RETRY_DELAY, POLL_TIMEOUT, RECV_BUFFER_SIZE};
use crate::session::Shared;
use crate::telemetry::{record_metric, MetricsEvent};

/// Waits on the readiness set and dispatches incoming messages.
///
/// The listener sits in the set with error interest only, so closing it wakes
/// the wait immediately instead of after [`POLL_TIMEOUT`].
pub(crate) struct EventLoop {
    shared: Arc<Shared>,
    poll: PollId,
    listener: ConnectionHandle,
}

impl EventLoop {
    pub(crate) fn new(shared: Arc<Shared>, poll: PollId, listener: ConnectionHandle) -> Self {
        Self {
            shared,
            poll,
            listener,
        }
    }

    pub(crate) fn run(self) {
        record_metric(MetricsEvent::LoopStarted);
        debug!(poll = %self.poll, "Event loop started");

        let transport = Arc::clone(self.shared.transport());
        let mut ready: Vec<PollEvent> = Vec::with_capacity(MAX_POLL_EVENTS);
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        while self.shared.server_active.load(Ordering::Acquire) {
            match transport.poll_wait(self.poll, &mut ready, MAX_POLL_EVENTS, POLL_TIMEOUT) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(e) => {
                    if !self.shared.server_active.load(Ordering::Acquire) {
                        break;
                    }
                    warn!(poll = %self.poll, error = %e, "Readiness wait failed, retrying");
                    thread::sleep(POLL_RETRY_DELAY);
                    continue;
                }
            }

            for event in &ready {
                if event.handle == self.listener {
                    // Listener closed, by stop() or after a single sender.
                    if let Err(e) = transport.poll_remove(self.poll, self.listener) {
                        debug!(handle = %self.listener, error = %e, "Readiness unregister failed");
                    }
                    continue;
                }
                self.receive(event.handle, &mut buf);
            }
        }

        if let Err(e) = transport.poll_release(self.poll) {
            debug!(poll = %self.poll, error = %e, "Readiness set release failed");
        }
        debug!("Event loop exited");
        record_metric(MetricsEvent::LoopStopped);
    }

    fn receive(&self, handle: ConnectionHandle, buf: &mut [u8]) {
        let transport = self.shared.transport();
        match transport.recv_msg(handle, buf) {
            Ok((0, _)) => {}
            Ok((len, ctrl)) => {
                record_metric(MetricsEvent::MessageReceived { bytes: len });
                let Some(ctx) = self.shared.registry.get(handle) else {
                    trace!(%handle, len, "Message for evicted client dropped");
                    return;
                };
                trace!(%handle, len, seq = ctrl.pkt_seq, "Message received");
                if !self.shared.callbacks.dispatch(&buf[..len], &ctrl, &ctx, handle) {
                    trace!(%handle, len, "No data callback, message dropped");
                }
            }
            Err(e) => {
                if e.is_disconnect() {
                    debug!(%handle, error = %e, "Client went away");
                } else {
                    warn!(%handle, error = %e, "Receive failed, dropping client");
                }
                record_metric(MetricsEvent::ReceiveFailed);
                if !self.shared.disconnect_client(handle, Some(self.poll)) {
                    // Evicted elsewhere; the handle only needs to leave the set.
                    if let Err(e) = transport.poll_remove(self.poll, handle) {
                        debug!(%handle, error = %e, "Readiness unregister failed");
                    }
                }
            }
        }
    }
}
