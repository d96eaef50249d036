//! Per-connection session state machine.
//!
//! `Connecting -> Open -> Closed`. Opening registers the session exactly
//! once; closing removes it (idempotently) and releases the transport. While
//! open, the read loop only watches for the peer going away: inbound frames
//! are not interpreted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{SessionId, SessionRegistry, SessionSink};

/// Upper bound on releasing the transport when a session closes.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// What ended an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame.
    PeerClosed,
    /// The transport ended without a close frame.
    EndOfStream,
    /// Reading from the transport failed.
    ReadError,
    /// Removed from the registry by someone else, typically a failed broadcast write.
    Evicted,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::EndOfStream => "end of stream",
            CloseReason::ReadError => "read error",
            CloseReason::Evicted => "evicted",
            CloseReason::Shutdown => "shutdown",
        };
        f.write_str(reason)
    }
}

/// One viewer session.
pub struct Session {
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn SessionSink>,
    state: SessionState,
    id: Option<SessionId>,
    evicted: CancellationToken,
    close_timeout: Duration,
}

impl Session {
    pub fn new(registry: Arc<SessionRegistry>, sink: Arc<dyn SessionSink>) -> Self {
        Self {
            registry,
            sink,
            state: SessionState::Connecting,
            id: None,
            evicted: CancellationToken::new(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Give up on the close handshake after `close_timeout`. A peer that
    /// stopped reading would otherwise hold the transport forever.
    #[must_use]
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    /// Register with the registry. Only the first call has an effect.
    pub fn open(&mut self) -> Option<SessionId> {
        if self.state == SessionState::Connecting {
            let (id, evicted) = self.registry.add(Arc::clone(&self.sink));
            self.id = Some(id);
            self.evicted = evicted;
            self.state = SessionState::Open;
        }
        self.id
    }

    /// Leave the registry and release the transport. Only the first call has
    /// an effect.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(id) = self.id {
            self.registry.remove(id);
        }
        if tokio::time::timeout(self.close_timeout, self.sink.close())
            .await
            .is_err()
        {
            warn!(
                session_id = ?self.id,
                timeout = ?self.close_timeout,
                "Close handshake timed out, dropping transport"
            );
        }
        self.state = SessionState::Closed;
    }

    /// Open the session and read until it ends, then close it.
    pub async fn run<S, E>(mut self, mut inbound: S, shutdown: CancellationToken) -> CloseReason
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        let Some(id) = self.open() else {
            return CloseReason::Shutdown;
        };
        info!(session_id = %id, "Viewer session opened");

        let evicted = self.evicted.clone();
        let reason = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break CloseReason::Shutdown,
                _ = evicted.cancelled() => break CloseReason::Evicted,
                next = inbound.next() => match next {
                    Some(Ok(Message::Close(_))) => break CloseReason::PeerClosed,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(session_id = %id, error = %e, "Session read failed");
                        break CloseReason::ReadError;
                    }
                    None => break CloseReason::EndOfStream,
                },
            }
        };

        self.close().await;
        info!(session_id = %id, reason = %reason, "Viewer session closed");
        reason
    }
}
