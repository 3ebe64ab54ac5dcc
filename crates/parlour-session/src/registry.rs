//! The registry of live sessions.
//!
//! This is the shared piece of the session layer. Everything that needs
//! to see more than its own connection goes through here:
//! - the accept loop registers each session before spawning its task
//! - each connection task deregisters itself on the way out
//! - handlers look peers up by handle or walk the whole set
//! - shutdown snapshots the set to stop every loop
//!
//! # Concurrency note
//!
//! One async [`Mutex`] guards the map, and no I/O ever happens under
//! it. Everything that iterates does so over a
//! [`snapshot`](Registry::snapshot) taken with the lock already
//! released, so a slow peer can never stall registration or anyone
//! else's lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use parlour_protocol::Envelope;

use crate::session::{Session, SessionId};

/// All currently registered sessions, keyed by id.
///
/// Think of it as the server's who-is-here list. A session is present
/// for exactly the stretch between registration on accept and
/// deregistration when its loop exits. Lookups between those points may
/// therefore see a session whose socket is already dying; callers treat
/// send failures as the peer's problem, not theirs.
#[derive(Default)]
pub struct Registry {
    /// Live sessions by id. `Arc` because three parties hold a session
    /// at once: this map, the connection task, and any handler that
    /// looked it up.
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a session under its id.
    ///
    /// Ids are unique for the process lifetime, so this cannot displace
    /// a live entry; if it ever does, that is a bug worth a loud log and
    /// nothing more.
    pub async fn add(&self, session: Arc<Session>) {
        let id = session.id();
        if self.sessions.lock().await.insert(id, session).is_some() {
            tracing::error!(%id, "registry already held an entry for this id");
        }
        tracing::debug!(%id, "session registered");
    }

    /// Deregisters a session, tolerating absence.
    ///
    /// Removal can race shutdown teardown. An entry that is already gone
    /// is an inconsistency to log, never a reason to fail the caller.
    pub async fn remove(&self, id: SessionId) {
        match self.sessions.lock().await.remove(&id) {
            Some(_) => tracing::debug!(%id, "session deregistered"),
            None => {
                tracing::warn!(%id, "deregistering a session that was not registered");
            }
        }
    }

    /// Clones the current session set out from under the lock.
    ///
    /// The lock is released before the caller iterates, so sessions may
    /// join or leave meanwhile. That is the contract: a point-in-time
    /// copy, not a live view.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// The first identified session whose handle matches.
    ///
    /// A linear scan, on purpose. Handles are not keys: nothing stops
    /// two peers from claiming the same one, and sessions that never
    /// said hello have no handle at all, so a by-handle index would
    /// have to cope with both anyway. At lobby sizes the scan is cheap.
    pub async fn find_by_handle(&self, handle: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .await
            .values()
            .find(|s| s.identity().is_some_and(|id| id.handle == handle))
            .cloned()
    }

    /// Sends an envelope to every registered session.
    ///
    /// Returns how many deliveries succeeded. Failures are logged and
    /// skipped; a dead peer's cleanup belongs to its own task.
    pub async fn broadcast(&self, envelope: &Envelope) -> usize {
        let mut delivered = 0;
        for session in self.snapshot().await {
            match session.send(envelope).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(id = %session.id(), error = %e, "broadcast delivery failed");
                }
            }
        }
        delivered
    }

    /// How many sessions are registered right now.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// True when nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    /// A session over a real socket pair. The registry passed to the
    /// session is a fresh one; tests register into their own.
    async fn make_session() -> (Arc<Session>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        let (_read, write) = stream.into_split();
        let session = Session::new(peer, write, Arc::new(Registry::new()));
        (session, client)
    }

    // =====================================================================
    // add() / remove() / len()
    // =====================================================================

    #[tokio::test]
    async fn test_add_then_len_counts_the_session() {
        let registry = Registry::new();
        let (session, _client) = make_session().await;

        assert!(registry.is_empty().await);
        registry.add(session).await;
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_registered_session_empties_registry() {
        let registry = Registry::new();
        let (session, _client) = make_session().await;
        let id = session.id();
        registry.add(session).await;

        registry.remove(id).await;

        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_absent_session_is_tolerated() {
        // Double-removal must be harmless: the loop's teardown and the
        // shutdown path may both try.
        let registry = Registry::new();
        let (session, _client) = make_session().await;
        let id = session.id();
        registry.add(session).await;

        registry.remove(id).await;
        registry.remove(id).await;

        assert!(registry.is_empty().await);
    }

    // =====================================================================
    // snapshot()
    // =====================================================================

    #[tokio::test]
    async fn test_snapshot_is_point_in_time() {
        let registry = Registry::new();
        let (first, _c1) = make_session().await;
        registry.add(first).await;

        let before = registry.snapshot().await;

        let (second, _c2) = make_session().await;
        registry.add(second).await;

        assert_eq!(before.len(), 1);
        assert_eq!(registry.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_hands_out_live_handles() {
        let registry = Registry::new();
        let (session, _client) = make_session().await;
        let id = session.id();
        registry.add(session).await;

        let snapshot = registry.snapshot().await;

        assert_eq!(snapshot[0].id(), id);
    }

    // =====================================================================
    // find_by_handle()
    // =====================================================================

    #[tokio::test]
    async fn test_find_by_handle_matches_identified_session() {
        let registry = Registry::new();
        let (ana, _c1) = make_session().await;
        ana.identify("ana").unwrap();
        let ana_id = ana.id();
        let (anon, _c2) = make_session().await;
        registry.add(ana).await;
        registry.add(anon).await;

        let found = registry.find_by_handle("ana").await.unwrap();

        assert_eq!(found.id(), ana_id);
        assert!(registry.find_by_handle("bo").await.is_none());
    }

    // =====================================================================
    // broadcast()
    // =====================================================================

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let registry = Registry::new();
        let (a, ca) = make_session().await;
        let (b, cb) = make_session().await;
        registry.add(a).await;
        registry.add(b).await;

        let delivered = registry
            .broadcast(&Envelope::new("announce"))
            .await;
        assert_eq!(delivered, 2);

        for client in [ca, cb] {
            let mut lines = BufReader::new(client).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let json: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(json["msgt"], "announce");
        }
    }
}
