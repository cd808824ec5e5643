//! Opaque per-connection context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Consumer payload attached to one connection.
///
/// The session never looks inside. Consumers recover their own type with
/// [`NetworkConnection::get`]. Contexts are shared as `Arc<NetworkConnection>`
/// so a callback may keep one after the connection is gone.
pub struct NetworkConnection {
    object: Box<dyn Any + Send + Sync>,
}

impl NetworkConnection {
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self {
            object: Box::new(object),
        }
    }

    /// Wrap `object` ready for handing to a session.
    pub fn shared<T: Any + Send + Sync>(object: T) -> Arc<Self> {
        Arc::new(Self::new(object))
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.object.is::<T>()
    }
}

impl fmt::Debug for NetworkConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConnection").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tag(u32);

    #[test]
    fn test_downcast_to_stored_type() {
        let ctx = NetworkConnection::shared(Tag(7));
        assert_eq!(ctx.get::<Tag>(), Some(&Tag(7)));
        assert!(ctx.is::<Tag>());
    }

    #[test]
    fn test_downcast_to_other_type_fails() {
        let ctx = NetworkConnection::new(String::from("peer"));
        assert!(ctx.get::<Tag>().is_none());
        assert_eq!(ctx.get::<String>().map(String::as_str), Some("peer"));
    }
}
