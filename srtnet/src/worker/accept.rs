//! Server accept loop.

use srtnet_x::{ConnectionHandle, PollEvents, PollId};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

use super::ACCEPT_RETRY_DELAY;
use crate::context::NetworkConnection;
use crate::session::Shared;
use crate::telemetry::{record_metric, MetricsEvent};

enum Admission {
    Continue,
    Done,
}

/// Accepts peers, asks the admission callback and registers admitted ones.
pub(crate) struct AcceptLoop {
    shared: Arc<Shared>,
    poll: PollId,
    server_ctx: Option<Arc<NetworkConnection>>,
    single_sender: bool,
}

impl AcceptLoop {
    pub(crate) fn new(
        shared: Arc<Shared>,
        poll: PollId,
        server_ctx: Option<Arc<NetworkConnection>>,
        single_sender: bool,
    ) -> Self {
        Self {
            shared,
            poll,
            server_ctx,
            single_sender,
        }
    }

    pub(crate) fn run(self) {
        record_metric(MetricsEvent::LoopStarted);
        debug!(single_sender = self.single_sender, "Accept loop started");

        while self.shared.server_active.load(Ordering::Acquire) {
            // Gone once stop() or single-sender took it.
            let Some(listener) = *self.shared.listener.lock() else {
                break;
            };

            match self.shared.transport().accept(listener) {
                Ok((handle, peer)) => {
                    if let Admission::Done = self.admit(handle, peer) {
                        break;
                    }
                }
                Err(e) => {
                    if !self.shared.server_active.load(Ordering::Acquire) {
                        debug!(error = %e, "Accept interrupted by stop");
                        break;
                    }
                    warn!(error = %e, "Accept failed, retrying");
                    thread::sleep(ACCEPT_RETRY_DELAY);
                }
            }
        }

        debug!("Accept loop exited");
        record_metric(MetricsEvent::LoopStopped);
    }

    fn admit(&self, handle: ConnectionHandle, peer: SocketAddr) -> Admission {
        let shared = &self.shared;
        let Some(ctx) = shared
            .callbacks
            .admit(peer, handle, self.server_ctx.as_ref())
        else {
            warn!(%peer, %handle, "Client rejected");
            shared.close_quietly(handle);
            record_metric(MetricsEvent::ClientRejected);
            return Admission::Continue;
        };

        // Closed before the entry is visible, so no second peer can slip in.
        if self.single_sender {
            if let Some(listener) = shared.take_listener() {
                shared.close_quietly(listener);
                info!(%peer, "Single sender admitted, listener closed");
            }
        }

        let admitted = shared
            .registry
            .admit(handle, ctx, &shared.server_active, |h| shared.close_quietly(h));
        if !admitted {
            debug!(%peer, %handle, "Session stopping, candidate closed");
            return Admission::Done;
        }

        if let Err(e) = shared
            .transport()
            .poll_add(self.poll, handle, PollEvents::IN_ERR)
        {
            error!(%peer, %handle, error = %e, "Failed to watch client");
            shared.disconnect_client(handle, None);
            return self.after_admission();
        }

        debug!(%peer, %handle, "Client accepted");
        record_metric(MetricsEvent::ClientAccepted);
        self.after_admission()
    }

    fn after_admission(&self) -> Admission {
        if self.single_sender {
            Admission::Done
        } else {
            Admission::Continue
        }
    }
}
