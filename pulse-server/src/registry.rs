//! Registry of live viewer sessions.
//!
//! Sessions are keyed by a generated [`SessionId`] rather than by their
//! transport, so removal is a plain map delete and the transport stays owned
//! by whoever holds the [`SessionSink`]. The structural lock only ever guards
//! map updates; every write to a session happens on a [`snapshot`] taken
//! outside of it.
//!
//! [`snapshot`]: SessionRegistry::snapshot

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SessionError;

/// Identifier of one viewer session. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write half of a viewer session.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Send one serialized payload.
    async fn send(&self, payload: Arc<str>) -> Result<(), SessionError>;

    /// Close the transport. Safe to call more than once.
    async fn close(&self);
}

struct Entry {
    sink: Arc<dyn SessionSink>,
    evicted: CancellationToken,
}

/// Concurrency-safe set of live sessions.
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<SessionId, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session and return its id plus a token that fires once the
    /// session is removed, whoever removes it.
    pub fn add(&self, sink: Arc<dyn SessionSink>) -> (SessionId, CancellationToken) {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let evicted = CancellationToken::new();

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Entry {
                    sink,
                    evicted: evicted.clone(),
                },
            );

        debug!(session_id = %id, "Session registered");
        (id, evicted)
    }

    /// Remove a session. Returns false if it was already gone.
    pub fn remove(&self, id: SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match removed {
            Some(entry) => {
                entry.evicted.cancel();
                debug!(session_id = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of the membership.
    pub fn snapshot(&self) -> Vec<(SessionId, Arc<dyn SessionSink>)> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(&entry.sink)))
            .collect()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every session, signalling each one's read loop to stop.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Entry> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        for entry in &drained {
            entry.evicted.cancel();
        }
        drained.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
