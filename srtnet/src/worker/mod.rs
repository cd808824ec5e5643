//! Session loop threads.
//!
//! Every long-running loop is a native OS thread, not an async task:
//!
//! - **accept** (`srtnet-accept`): blocks in the transport accept, runs the
//!   admission callback and populates the registry
//! - **events** (`srtnet-events`): waits on the readiness set with a bounded
//!   timeout, receives from ready connections and dispatches to the consumer
//! - **client** (`srtnet-client`): blocking receive on the single client socket
//!
//! # Shutdown
//!
//! There is no cancellation token. A loop observes its session's active flag
//! at each iteration boundary, and `stop()` closes the socket the loop is
//! blocked on so the pending call returns with an error. Each thread is then
//! joined with a bounded wait. A thread that does not exit within
//! [`STOP_TIMEOUT`] is logged and detached; teardown carries on regardless.

pub(crate) mod accept;
pub(crate) mod client;
pub(crate) mod events;

#[cfg(test)]
mod tests;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

/// How long `stop()` waits for each loop thread.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Ready handles taken per readiness wait.
pub const MAX_POLL_EVENTS: usize = 20;

/// Upper bound on one readiness wait, so the active flag is re-checked even
/// when no traffic arrives.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pause before retrying a failed accept.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Pause before retrying a failed readiness wait.
pub const POLL_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Receive buffer size. Comfortably above the largest live-mode payload.
pub const RECV_BUFFER_SIZE: usize = 2048;

/// A spawned loop thread that can be joined with a deadline.
pub(crate) struct LoopThread {
    name: &'static str,
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

impl LoopThread {
    /// Spawn `body` on a named thread.
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        // Never sent on; the sender is dropped when the thread ends, panics included.
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _exit_tx = exit_tx;
                body();
            })?;
        Ok(Self {
            name,
            handle,
            exited,
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Join within `timeout`. Returns `false` if the thread was left running.
    ///
    /// Called from the thread itself (a callback stopping its own session) this
    /// returns immediately without joining.
    pub(crate) fn join_within(self, timeout: Duration) -> bool {
        if self.handle.thread().id() == thread::current().id() {
            debug!(thread = self.name, "Stop called from loop thread, not joining itself");
            return true;
        }

        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    thread = self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Loop thread did not exit in time, detaching"
                );
                false
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                match self.handle.join() {
                    Ok(()) => debug!(thread = self.name, "Loop thread exited cleanly"),
                    Err(e) => error!(thread = self.name, error = ?e, "Loop thread panicked"),
                }
                true
            }
        }
    }
}
