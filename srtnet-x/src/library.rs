//! Reference-counted transport library lifecycle.
//!
//! A transport library has process-wide state that must be started before the
//! first socket is created and cleaned up after the last one is gone. Each
//! session holds a [`LibraryGuard`] for as long as it lives; the first guard
//! starts the library and dropping the last one cleans it up.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};

use crate::{Result, Transport};

/// Shared transport library with a user count.
pub struct Library {
    transport: Arc<dyn Transport>,
    users: Mutex<usize>,
}

impl Library {
    pub fn new<T: Transport + 'static>(transport: T) -> Arc<Self> {
        Self::from_arc(Arc::new(transport))
    }

    pub fn from_arc(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            users: Mutex::new(0),
        })
    }

    /// Register a user, starting the library on the first one.
    pub fn acquire(self: &Arc<Self>) -> Result<LibraryGuard> {
        let mut users = self.users.lock();
        if *users == 0 {
            self.transport.startup()?;
            debug!("Transport library started");
        }
        *users += 1;
        Ok(LibraryGuard {
            library: Arc::clone(self),
        })
    }

    /// Number of live guards.
    pub fn users(&self) -> usize {
        *self.users.lock()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn release(&self) {
        let mut users = self.users.lock();
        *users = users.saturating_sub(1);
        if *users == 0 {
            if let Err(e) = self.transport.cleanup() {
                error!(error = %e, "Transport library cleanup failed");
            } else {
                debug!("Transport library cleaned up");
            }
        }
    }
}

/// Keeps the transport library started while alive.
pub struct LibraryGuard {
    library: Arc<Library>,
}

impl LibraryGuard {
    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.library.transport()
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }
}

impl Drop for LibraryGuard {
    fn drop(&mut self) {
        self.library.release();
    }
}
