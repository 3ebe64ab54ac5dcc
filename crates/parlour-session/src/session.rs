//! A live connection: identity, outbound channel, run state.
//!
//! One [`Session`] exists per accepted socket. The read side stays with
//! the connection's own task; the session holds everything other tasks
//! may touch — the locked write half, the identity set by the handshake,
//! and the flag the read loop polls to keep going.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use parlour_protocol::{Envelope, Identity};

use crate::error::SessionError;
use crate::registry::Registry;

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for one accepted connection.
///
/// Minted from a process-wide counter, so ids never repeat within a
/// server's lifetime and the registry can key on them safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connected peer.
///
/// Created on accept, registered immediately, destroyed when its read
/// loop exits. Identity arrives later (or never): a session without an
/// identity is still fully connected, it just cannot use operations that
/// need to know who it is.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,

    /// Write half of the socket. Every outbound frame goes through this
    /// lock, so concurrent senders cannot interleave bytes.
    writer: Mutex<OwnedWriteHalf>,

    /// Set exactly once by the `hello` handshake.
    identity: OnceLock<Identity>,

    /// Polled by the read loop between reads. The only field written
    /// from other tasks, which is why it is an atomic and not state
    /// under a lock.
    running: AtomicBool,

    /// The registry this session lives in, so handlers reached through
    /// the session can find everyone else.
    registry: Arc<Registry>,
}

impl Session {
    /// Wraps an accepted connection's write half.
    ///
    /// Sessions are always shared between the registry and the
    /// connection's task, so construction hands back an [`Arc`].
    pub fn new(
        peer: SocketAddr,
        writer: OwnedWriteHalf,
        registry: Arc<Registry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::next(),
            peer,
            writer: Mutex::new(writer),
            identity: OnceLock::new(),
            running: AtomicBool::new(true),
            registry,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The observed remote endpoint, regardless of what the peer claims.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // -- Run state --------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks the session's read loop to wind down.
    ///
    /// Cooperative: the loop notices at its next poll, which is bounded
    /// by one read timeout. Safe to call from any task, any number of
    /// times.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    // -- Identity ---------------------------------------------------------

    /// The identity declared by the handshake, if it has happened.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    /// The identity, or [`SessionError::NotIdentified`].
    ///
    /// Handlers whose operation only makes sense for an identified peer
    /// call this first.
    pub fn require_identity(&self) -> Result<&Identity, SessionError> {
        self.identity.get().ok_or(SessionError::NotIdentified)
    }

    /// Fixes this session's identity from the declared handle and the
    /// observed peer address.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyIdentified`] on a second handshake;
    /// the first identity wins and stays.
    pub fn identify(
        &self,
        handle: impl Into<String>,
    ) -> Result<&Identity, SessionError> {
        let candidate = Identity::new(handle, self.peer);
        if self.identity.set(candidate).is_err() {
            let existing = self.identity.get().expect("set failed, value present");
            return Err(SessionError::AlreadyIdentified(existing.handle.clone()));
        }
        Ok(self.identity.get().expect("just set"))
    }

    // -- Outbound ---------------------------------------------------------

    /// Sends one envelope as one newline-terminated frame.
    ///
    /// Atomic per call: the whole line is written under the outbound
    /// lock. Order between concurrent senders is whatever the lock
    /// decides; order within one sender is preserved.
    ///
    /// # Errors
    /// [`SessionError::Encode`] if serialization fails,
    /// [`SessionError::SendFailed`] if the socket write does — at which
    /// point the connection is gone.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), SessionError> {
        let line = envelope.encode()?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(SessionError::SendFailed)
    }

    /// Sends the standard `error` report for a failed message.
    pub async fn send_error(
        &self,
        reason: impl fmt::Display,
    ) -> Result<(), SessionError> {
        self.send(&Envelope::error_reply(reason)).await
    }

    /// Shuts down the write half, signalling EOF to the peer.
    ///
    /// Failures are logged, not returned: the usual cause is a peer that
    /// is already gone, and teardown proceeds either way.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(id = %self.id, error = %e, "socket shutdown failed");
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
