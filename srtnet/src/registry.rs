//! Connection registry.
//!
//! Maps live connection handles to their contexts. The registry is the single
//! source of truth for "is this peer still connected": a handle is present
//! exactly while its transport socket is open.
//!
//! Removal and close happen together under the registry lock so a handle value
//! that the transport recycles can never meet a stale entry. Whoever removes an
//! entry owns the disconnect notification for it; callers run that
//! notification after the lock is released.

use parking_lot::Mutex;
use srtnet_x::ConnectionHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::NetworkConnection;

/// Live clients keyed by handle, as seen by [`Session::active_clients`](crate::Session::active_clients).
pub type ClientMap = HashMap<ConnectionHandle, Arc<NetworkConnection>>;

#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<ClientMap>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an admitted connection while `active` holds.
    ///
    /// When the session is no longer active the candidate is closed instead
    /// and `false` is returned.
    pub fn admit(
        &self,
        handle: ConnectionHandle,
        ctx: Arc<NetworkConnection>,
        active: &AtomicBool,
        close: impl FnOnce(ConnectionHandle),
    ) -> bool {
        let mut entries = self.entries.lock();
        if !active.load(Ordering::Acquire) {
            close(handle);
            return false;
        }
        entries.insert(handle, ctx);
        true
    }

    /// Remove `handle`, closing it under the lock.
    ///
    /// Returns the context when this call removed the entry, `None` when it was
    /// already gone.
    pub fn evict(
        &self,
        handle: ConnectionHandle,
        close: impl FnOnce(ConnectionHandle),
    ) -> Option<Arc<NetworkConnection>> {
        let mut entries = self.entries.lock();
        let ctx = entries.remove(&handle)?;
        close(handle);
        Some(ctx)
    }

    /// Remove and close every entry.
    pub fn drain(
        &self,
        mut close: impl FnMut(ConnectionHandle),
    ) -> Vec<(ConnectionHandle, Arc<NetworkConnection>)> {
        let mut entries = self.entries.lock();
        let drained: Vec<_> = entries.drain().collect();
        for (handle, _) in &drained {
            close(*handle);
        }
        drained
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<Arc<NetworkConnection>> {
        self.entries.lock().get(&handle).cloned()
    }

    pub fn contains(&self, handle: ConnectionHandle) -> bool {
        self.entries.lock().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `visitor` with the lock held.
    pub fn visit<R>(&self, visitor: impl FnOnce(&ClientMap) -> R) -> R {
        let entries = self.entries.lock();
        visitor(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(tag: u32) -> Arc<NetworkConnection> {
        NetworkConnection::shared(tag)
    }

    #[test]
    fn test_admit_while_active() {
        let registry = ConnectionRegistry::new();
        let active = AtomicBool::new(true);
        let mut closed = Vec::new();
        assert!(registry.admit(ConnectionHandle(1), ctx(1), &active, |h| closed.push(h)));
        assert!(registry.contains(ConnectionHandle(1)));
        assert!(closed.is_empty());
    }

    #[test]
    fn test_admit_after_stop_closes_candidate() {
        let registry = ConnectionRegistry::new();
        let active = AtomicBool::new(false);
        let mut closed = Vec::new();
        assert!(!registry.admit(ConnectionHandle(4), ctx(4), &active, |h| closed.push(h)));
        assert!(registry.is_empty());
        assert_eq!(closed, vec![ConnectionHandle(4)]);
    }

    #[test]
    fn test_evict_is_exactly_once() {
        let registry = ConnectionRegistry::new();
        let active = AtomicBool::new(true);
        registry.admit(ConnectionHandle(2), ctx(2), &active, |_| {});

        let mut closes = 0;
        let first = registry.evict(ConnectionHandle(2), |_| closes += 1);
        let second = registry.evict(ConnectionHandle(2), |_| closes += 1);
        assert_eq!(first.and_then(|c| c.get::<u32>().copied()), Some(2));
        assert!(second.is_none());
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_drain_closes_everything() {
        let registry = ConnectionRegistry::new();
        let active = AtomicBool::new(true);
        for i in 1..=3 {
            registry.admit(ConnectionHandle(i), ctx(i), &active, |_| {});
        }
        let mut closed = Vec::new();
        let drained = registry.drain(|h| closed.push(h));
        closed.sort();
        assert_eq!(drained.len(), 3);
        assert_eq!(
            closed,
            vec![ConnectionHandle(1), ConnectionHandle(2), ConnectionHandle(3)]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_visit_sees_current_entries() {
        let registry = ConnectionRegistry::new();
        let active = AtomicBool::new(true);
        registry.admit(ConnectionHandle(9), ctx(9), &active, |_| {});
        let count = registry.visit(|clients| clients.len());
        assert_eq!(count, 1);
    }
}
