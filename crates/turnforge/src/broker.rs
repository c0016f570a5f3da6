//! Relay broker for [`WebSocketPeer`](turnforge_transport::WebSocketPeer)s.
//!
//! Peers that can't multicast to each other directly connect here instead.
//! Each connection names one session in its first frame; after that the
//! broker fans every broadcast out to the other members of that session
//! and pushes the full roster whenever membership changes. It never looks
//! inside the payloads it relays.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use turnforge_transport::{
    BrokerFrame, Connection, ConnectionId, PeerId, Transport, TransportError, WebSocketConnection,
    WebSocketTransport,
};

use crate::TurnforgeError;

/// Broker settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub bind_addr: String,
    /// How long a new connection may take to send its join frame.
    pub join_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7400".to_string(),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl BrokerConfig {
    /// Listens on `addr` with default timeouts.
    pub fn bind(addr: impl Into<String>) -> Self {
        Self {
            bind_addr: addr.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

struct Member {
    conn: ConnectionId,
    outbound: mpsc::UnboundedSender<BrokerFrame>,
}

/// Session id → connected members, shared by every connection task.
#[derive(Default)]
struct Sessions {
    groups: Mutex<HashMap<String, BTreeMap<PeerId, Member>>>,
}

impl Sessions {
    /// Registers `peer` in `session_id` and pushes the new roster. A peer
    /// that was already connected under the same id is replaced; its
    /// connection task sees its outbound channel close and exits.
    async fn add(
        &self,
        session_id: &str,
        peer: PeerId,
        conn: ConnectionId,
        outbound: mpsc::UnboundedSender<BrokerFrame>,
    ) {
        let mut groups = self.groups.lock().await;
        let members = groups.entry(session_id.to_string()).or_default();
        if members.insert(peer.clone(), Member { conn, outbound }).is_some() {
            tracing::info!(session_id, %peer, "peer reconnected, replacing old link");
        }
        push_roster(members);
    }

    /// Removes `peer` if it is still registered by `conn`.
    async fn remove(&self, session_id: &str, peer: &PeerId, conn: ConnectionId) {
        let mut groups = self.groups.lock().await;
        let Some(members) = groups.get_mut(session_id) else {
            return;
        };
        if !members.get(peer).is_some_and(|m| m.conn == conn) {
            return;
        }
        members.remove(peer);
        if members.is_empty() {
            groups.remove(session_id);
            tracing::debug!(session_id, "session emptied");
        } else {
            push_roster(members);
        }
    }

    /// Queues `data` for every member of the session except the sender.
    async fn fan_out(&self, session_id: &str, from: &PeerId, data: Vec<u8>) -> usize {
        let groups = self.groups.lock().await;
        let Some(members) = groups.get(session_id) else {
            return 0;
        };
        let mut delivered = 0;
        for (peer, member) in members.iter().filter(|(peer, _)| *peer != from) {
            let frame = BrokerFrame::Deliver {
                from: from.clone(),
                data: data.clone(),
            };
            if member.outbound.send(frame).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(session_id, %peer, "member outbound closed");
            }
        }
        delivered
    }

    #[cfg(test)]
    async fn members(&self, session_id: &str) -> Vec<PeerId> {
        let groups = self.groups.lock().await;
        groups
            .get(session_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn push_roster(members: &BTreeMap<PeerId, Member>) {
    let peers: Vec<PeerId> = members.keys().cloned().collect();
    for member in members.values() {
        let _ = member.outbound.send(BrokerFrame::Roster {
            peers: peers.clone(),
        });
    }
}

/// Takes a peer out of its session when its connection task exits, even if
/// the task panics. `Drop` is synchronous, so the removal is spawned.
struct MembershipGuard {
    session_id: String,
    peer: PeerId,
    conn: ConnectionId,
    sessions: Arc<Sessions>,
}

impl Drop for MembershipGuard {
    fn drop(&mut self) {
        let session_id = std::mem::take(&mut self.session_id);
        let peer = self.peer.clone();
        let conn = self.conn;
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            sessions.remove(&session_id, &peer, conn).await;
        });
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// A running relay broker.
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), turnforge::TurnforgeError> {
/// use turnforge::{Broker, BrokerConfig};
///
/// let broker = Broker::bind(BrokerConfig::bind("0.0.0.0:7400")).await?;
/// broker.run().await
/// # }
/// ```
pub struct Broker {
    transport: WebSocketTransport,
    sessions: Arc<Sessions>,
    config: BrokerConfig,
}

impl Broker {
    /// Binds the listening socket. Connections are accepted once
    /// [`run`](Self::run) is called.
    pub async fn bind(config: BrokerConfig) -> Result<Self, TurnforgeError> {
        let transport = WebSocketTransport::bind(&config.bind_addr).await?;
        Ok(Self {
            transport,
            sessions: Arc::new(Sessions::default()),
            config,
        })
    }

    /// Returns the local address the broker is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Accepts connections and spawns a relay task for each until the
    /// process ends.
    pub async fn run(self) -> Result<(), TurnforgeError> {
        self.run_until(std::future::pending()).await
    }

    /// Like [`run`](Self::run), but stops accepting once `shutdown`
    /// completes. Connections already relaying keep going until their
    /// peers hang up.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), TurnforgeError> {
        tracing::info!("Turnforge broker running");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => accepted,
            };
            match accepted {
                Ok(conn) => {
                    let sessions = Arc::clone(&self.sessions);
                    let join_timeout = self.config.join_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = relay(conn, sessions, join_timeout).await {
                            tracing::debug!(error = %e, "broker connection ended with error");
                        }
                    });
                }
                Err(TransportError::Shutdown) => break,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        self.transport.shutdown().await?;
        tracing::info!("Turnforge broker stopped");
        Ok(())
    }
}

/// Drives one peer connection from join to close.
async fn relay(
    conn: WebSocketConnection,
    sessions: Arc<Sessions>,
    join_timeout: Duration,
) -> Result<(), TurnforgeError> {
    let conn_id = conn.id();
    let (session_id, peer) = await_join(&conn, join_timeout).await?;
    tracing::info!(%conn_id, %session_id, %peer, "peer joined");

    let (tx, mut outbound) = mpsc::unbounded_channel();
    sessions.add(&session_id, peer.clone(), conn_id, tx).await;
    let _guard = MembershipGuard {
        session_id: session_id.clone(),
        peer: peer.clone(),
        conn: conn_id,
        sessions: Arc::clone(&sessions),
    };

    loop {
        tokio::select! {
            incoming = conn.recv() => {
                let data = match incoming {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%peer, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%peer, error = %e, "recv error");
                        break;
                    }
                };
                match BrokerFrame::decode(&data) {
                    Ok(BrokerFrame::Broadcast { data }) => {
                        let n = sessions.fan_out(&session_id, &peer, data).await;
                        tracing::trace!(%peer, recipients = n, "relayed broadcast");
                    }
                    Ok(BrokerFrame::Leave) => {
                        tracing::info!(%peer, %session_id, "peer left");
                        break;
                    }
                    Ok(other) => tracing::debug!(%peer, ?other, "ignoring unexpected frame"),
                    Err(e) => tracing::debug!(%peer, error = %e, "dropping undecodable frame"),
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    tracing::info!(%peer, "superseded by a newer connection");
                    break;
                };
                conn.send(&frame.encode()?).await?;
            }
        }
    }

    let _ = conn.close().await;
    Ok(())
}

/// Waits for the join frame that must open every connection.
async fn await_join(
    conn: &WebSocketConnection,
    join_timeout: Duration,
) -> Result<(String, PeerId), TurnforgeError> {
    let data = match tokio::time::timeout(join_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(TransportError::ConnectionClosed("closed before join".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(TurnforgeError::Handshake("join timed out".into())),
    };

    match BrokerFrame::decode(&data)? {
        BrokerFrame::Join {
            session_id,
            peer_id,
        } => Ok((session_id, peer_id)),
        _ => Err(TurnforgeError::Handshake(
            "first frame must be a join".into(),
        )),
    }
}
