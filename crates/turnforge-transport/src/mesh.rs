//! In-process multicast hub implementing [`PeerTransport`].
//!
//! Every [`MeshEndpoint`] handed out by one [`LocalMesh`] shares the same
//! session table, so several coordinators in one process (or one test) can
//! talk to each other without sockets. [`MeshFaults`] lets a test make the
//! hub misbehave the way a real multicast channel does.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::{PeerId, PeerStream, PeerTransport, TransportError, TransportEvent};

/// Faults the hub injects into every delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshFaults {
    /// Deliver every broadcast frame twice to each receiver.
    pub duplicate: bool,
}

/// Members of one session, ordered by identity so rosters are stable.
type Members = BTreeMap<PeerId, mpsc::UnboundedSender<TransportEvent>>;

/// A shared in-memory group-session hub.
///
/// Cheap to clone; clones refer to the same hub.
#[derive(Clone, Default)]
pub struct LocalMesh {
    sessions: Arc<Mutex<HashMap<String, Members>>>,
    faults: MeshFaults,
}

impl LocalMesh {
    /// Creates a hub that delivers every frame exactly once.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hub with the given fault injection.
    pub fn with_faults(faults: MeshFaults) -> Self {
        Self {
            sessions: Arc::default(),
            faults,
        }
    }

    /// Creates an endpoint for `peer`. The endpoint is not joined yet.
    pub fn endpoint(&self, peer: impl Into<PeerId>) -> MeshEndpoint {
        MeshEndpoint {
            mesh: self.clone(),
            peer: peer.into(),
            joined: Mutex::new(None),
        }
    }

    /// Current members of `session_id`, in identity order.
    pub async fn members(&self, session_id: &str) -> Vec<PeerId> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Disbands a session: every member receives
    /// [`TransportEvent::Invalidated`] and its stream then ends.
    ///
    /// Returns how many members were notified.
    pub async fn invalidate(&self, session_id: &str, reason: &str) -> usize {
        let Some(members) = self.sessions.lock().await.remove(session_id) else {
            return 0;
        };
        tracing::info!(session_id, members = members.len(), "mesh session invalidated");
        for tx in members.values() {
            let _ = tx.send(TransportEvent::Invalidated {
                reason: reason.to_string(),
            });
        }
        members.len()
    }

    async fn attach(
        &self,
        session_id: &str,
        peer: PeerId,
        tx: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let mut sessions = self.sessions.lock().await;
        let members = sessions.entry(session_id.to_string()).or_default();
        members.insert(peer, tx);
        notify_roster(members);
    }

    async fn detach(&self, session_id: &str, peer: &PeerId) {
        let mut sessions = self.sessions.lock().await;
        if let Some(members) = sessions.get_mut(session_id) {
            if members.remove(peer).is_some() {
                notify_roster(members);
            }
            if members.is_empty() {
                sessions.remove(session_id);
            }
        }
    }

    async fn deliver(
        &self,
        session_id: &str,
        from: &PeerId,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let sessions = self.sessions.lock().await;
        let members = sessions
            .get(session_id)
            .filter(|members| members.contains_key(from))
            .ok_or(TransportError::NotJoined)?;

        let copies = if self.faults.duplicate { 2 } else { 1 };
        for (peer, tx) in members {
            if peer == from {
                continue;
            }
            for _ in 0..copies {
                // A closed receiver just means that member stopped listening.
                let _ = tx.send(TransportEvent::Message {
                    data: data.to_vec(),
                    from: from.clone(),
                });
            }
        }
        tracing::trace!(session_id, %from, bytes = data.len(), "mesh broadcast");
        Ok(())
    }
}

fn notify_roster(members: &Members) {
    let roster: Vec<PeerId> = members.keys().cloned().collect();
    for tx in members.values() {
        let _ = tx.send(TransportEvent::RosterChanged(roster.clone()));
    }
}

/// One peer's handle on a [`LocalMesh`].
pub struct MeshEndpoint {
    mesh: LocalMesh,
    peer: PeerId,
    joined: Mutex<Option<String>>,
}

impl PeerTransport for MeshEndpoint {
    fn local_peer(&self) -> &PeerId {
        &self.peer
    }

    async fn join(&self, session_id: &str) -> Result<PeerStream, TransportError> {
        let mut joined = self.joined.lock().await;
        if let Some(previous) = joined.take() {
            self.mesh.detach(&previous, &self.peer).await;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.mesh.attach(session_id, self.peer.clone(), tx).await;
        *joined = Some(session_id.to_string());
        tracing::debug!(peer = %self.peer, session_id, "joined mesh session");
        Ok(PeerStream::new(rx))
    }

    async fn leave(&self) -> Result<(), TransportError> {
        if let Some(session_id) = self.joined.lock().await.take() {
            self.mesh.detach(&session_id, &self.peer).await;
            tracing::debug!(peer = %self.peer, %session_id, "left mesh session");
        }
        Ok(())
    }

    async fn broadcast(&self, data: &[u8]) -> Result<(), TransportError> {
        let joined = self.joined.lock().await;
        let session_id = joined.as_deref().ok_or(TransportError::NotJoined)?;
        self.mesh.deliver(session_id, &self.peer, data).await
    }

    async fn roster(&self) -> Vec<PeerId> {
        match self.joined.lock().await.as_deref() {
            Some(session_id) => self.mesh.members(session_id).await,
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<PeerId> {
        names.iter().map(|n| PeerId::new(*n)).collect()
    }

    /// Skips roster notifications and returns the next frame.
    async fn next_message(stream: &mut PeerStream) -> (Vec<u8>, PeerId) {
        loop {
            match stream.next().await.expect("stream open") {
                TransportEvent::Message { data, from } => return (data, from),
                TransportEvent::RosterChanged(_) => continue,
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_other_members_only() {
        let mesh = LocalMesh::new();
        let a = mesh.endpoint("a");
        let b = mesh.endpoint("b");
        let mut a_stream = a.join("s1").await.unwrap();
        let mut b_stream = b.join("s1").await.unwrap();

        a.broadcast(b"hi").await.unwrap();

        let (data, from) = next_message(&mut b_stream).await;
        assert_eq!(data, b"hi");
        assert_eq!(from, PeerId::new("a"));

        // `a` only ever sees roster updates, never its own frame.
        while let Ok(event) = a_stream.rx.try_recv() {
            assert!(matches!(event, TransportEvent::RosterChanged(_)));
        }
    }

    #[tokio::test]
    async fn test_duplicate_fault_delivers_twice() {
        let mesh = LocalMesh::with_faults(MeshFaults { duplicate: true });
        let a = mesh.endpoint("a");
        let b = mesh.endpoint("b");
        a.join("s1").await.unwrap();
        let mut b_stream = b.join("s1").await.unwrap();

        a.broadcast(b"x").await.unwrap();

        assert_eq!(next_message(&mut b_stream).await.0, b"x");
        assert_eq!(next_message(&mut b_stream).await.0, b"x");
    }

    #[tokio::test]
    async fn test_roster_notifications_track_membership() {
        let mesh = LocalMesh::new();
        let a = mesh.endpoint("a");
        let b = mesh.endpoint("b");
        let mut a_stream = a.join("s1").await.unwrap();
        assert_eq!(
            a_stream.next().await,
            Some(TransportEvent::RosterChanged(ids(&["a"])))
        );

        b.join("s1").await.unwrap();
        assert_eq!(
            a_stream.next().await,
            Some(TransportEvent::RosterChanged(ids(&["a", "b"])))
        );
        assert_eq!(a.roster().await, ids(&["a", "b"]));

        b.leave().await.unwrap();
        assert_eq!(
            a_stream.next().await,
            Some(TransportEvent::RosterChanged(ids(&["a"])))
        );
    }

    #[tokio::test]
    async fn test_broadcast_without_join_is_not_joined() {
        let mesh = LocalMesh::new();
        let a = mesh.endpoint("a");
        assert!(matches!(
            a.broadcast(b"x").await,
            Err(TransportError::NotJoined)
        ));
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let mesh = LocalMesh::new();
        let a = mesh.endpoint("a");
        a.leave().await.unwrap();
        a.join("s1").await.unwrap();
        a.leave().await.unwrap();
        a.leave().await.unwrap();
        assert!(mesh.members("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_ends_streams() {
        let mesh = LocalMesh::new();
        let a = mesh.endpoint("a");
        let mut a_stream = a.join("s1").await.unwrap();

        assert_eq!(mesh.invalidate("s1", "group ended").await, 1);

        let mut saw_invalidated = false;
        while let Some(event) = a_stream.next().await {
            if let TransportEvent::Invalidated { reason } = event {
                assert_eq!(reason, "group ended");
                saw_invalidated = true;
            }
        }
        assert!(saw_invalidated);
        assert!(matches!(
            a.broadcast(b"x").await,
            Err(TransportError::NotJoined)
        ));
    }

    #[tokio::test]
    async fn test_rejoin_moves_between_sessions() {
        let mesh = LocalMesh::new();
        let a = mesh.endpoint("a");
        a.join("s1").await.unwrap();
        a.join("s2").await.unwrap();

        assert!(mesh.members("s1").await.is_empty());
        assert_eq!(mesh.members("s2").await, ids(&["a"]));
    }
}
