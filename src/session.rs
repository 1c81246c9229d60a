//! Session identity and a registry of live relay sessions.
//!
//! `SessionRegistry` stores non-owning weak references to
//! [`SessionHandle`]s so server teardown can cancel every live session
//! without keeping finished ones alive. Dead entries are pruned
//! opportunistically or lazily at lookup time.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Identifier assigned to a relay session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl From<u64> for SessionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl SessionId {
    /// Create a new [`SessionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// Cancellation scope for one relay session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Create a handle for `id` governed by `cancel`.
    #[must_use]
    pub fn new(id: SessionId, cancel: CancellationToken) -> Self { Self { id, cancel } }

    /// The session's identifier.
    #[must_use]
    pub fn id(&self) -> SessionId { self.id }

    /// The session's cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken { &self.cancel }

    /// Request cancellation of this session.
    pub fn cancel(&self) { self.cancel.cancel(); }
}

/// Concurrent registry of session handles keyed by [`SessionId`].
#[derive(Default)]
pub struct SessionRegistry(DashMap<SessionId, Weak<SessionHandle>>);

impl SessionRegistry {
    /// Retrieve the handle for `id` if the session is still alive.
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        let guard = self.0.get(id);
        let handle = guard.as_ref().and_then(|w| w.upgrade());
        drop(guard);
        if handle.is_none() {
            self.0.remove_if(id, |_, weak| weak.strong_count() == 0);
        }
        handle
    }

    /// Insert a handle for a newly started session.
    pub fn insert(&self, handle: &Arc<SessionHandle>) {
        self.0.insert(handle.id(), Arc::downgrade(handle));
    }

    /// Remove a handle, typically on session teardown.
    pub fn remove(&self, id: &SessionId) { self.0.remove(id); }

    /// Remove all stale weak references.
    pub fn prune(&self) { self.0.retain(|_, weak| weak.strong_count() > 0); }

    /// Number of live sessions (stale entries are pruned first).
    #[must_use]
    pub fn len(&self) -> usize {
        self.prune();
        self.0.len()
    }

    /// Whether no live sessions remain.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Cancel every live session, pruning stale entries on the way.
    pub fn cancel_all(&self) {
        self.0.retain(|_, weak| {
            if let Some(handle) = weak.upgrade() {
                handle.cancel();
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::{SessionHandle, SessionId, SessionRegistry};

    fn handle(id: u64) -> Arc<SessionHandle> {
        Arc::new(SessionHandle::new(SessionId::new(id), CancellationToken::new()))
    }

    #[test]
    fn lookup_returns_live_handles_only() {
        let registry = SessionRegistry::default();
        let alive = handle(1);
        registry.insert(&alive);
        let dead = handle(2);
        registry.insert(&dead);
        drop(dead);

        assert!(registry.get(&SessionId::new(1)).is_some());
        assert!(registry.get(&SessionId::new(2)).is_none());
        // The dead entry was pruned lazily by the failed lookup.
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cancel_all_reaches_every_live_session() {
        let registry = SessionRegistry::default();
        let first = handle(1);
        let second = handle(2);
        registry.insert(&first);
        registry.insert(&second);

        registry.cancel_all();
        assert!(first.token().is_cancelled());
        assert!(second.token().is_cancelled());
    }

    #[test]
    fn remove_forgets_the_session() {
        let registry = SessionRegistry::default();
        let session = handle(7);
        registry.insert(&session);
        registry.remove(&SessionId::new(7));
        assert!(registry.get(&SessionId::new(7)).is_none());
    }
}
