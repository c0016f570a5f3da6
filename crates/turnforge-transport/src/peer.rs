//! Client [`PeerTransport`] that reaches its group through a relay broker.

use std::io;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::websocket::{Inbound, link_error};
use crate::{BrokerFrame, PeerId, PeerStream, PeerTransport, TransportError, TransportEvent};

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A peer that joins sessions on a remote broker over WebSocket.
///
/// Each [`join`](PeerTransport::join) opens a fresh connection; leaving
/// closes it. Frames from the broker are pumped into the returned
/// [`PeerStream`] by a background reader task.
pub struct WebSocketPeer {
    url: String,
    peer: PeerId,
    link: Mutex<Option<Link>>,
}

struct Link {
    sink: SplitSink<ClientWs, Message>,
    reader: JoinHandle<()>,
    roster: Arc<Mutex<Vec<PeerId>>>,
}

impl Link {
    async fn close(mut self) {
        if let Ok(leave) = BrokerFrame::Leave.encode() {
            let _ = self.sink.send(Message::Binary(leave.into())).await;
        }
        let _ = self.sink.close().await;
        self.reader.abort();
    }
}

impl WebSocketPeer {
    /// Creates a peer that will connect to the broker at `url`
    /// (e.g. `ws://127.0.0.1:7400`).
    pub fn new(url: impl Into<String>, peer: impl Into<PeerId>) -> Self {
        Self {
            url: url.into(),
            peer: peer.into(),
            link: Mutex::new(None),
        }
    }
}

impl PeerTransport for WebSocketPeer {
    fn local_peer(&self) -> &PeerId {
        &self.peer
    }

    async fn join(&self, session_id: &str) -> Result<PeerStream, TransportError> {
        let mut link = self.link.lock().await;
        if let Some(previous) = link.take() {
            previous.close().await;
        }

        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::JoinFailed(e.to_string()))?;
        let (mut sink, stream) = ws.split();

        let join = BrokerFrame::Join {
            session_id: session_id.to_string(),
            peer_id: self.peer.clone(),
        }
        .encode()?;
        sink.send(Message::Binary(join.into()))
            .await
            .map_err(|e| TransportError::JoinFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let roster = Arc::new(Mutex::new(Vec::new()));
        let reader = tokio::spawn(read_frames(stream, tx, Arc::clone(&roster)));
        *link = Some(Link {
            sink,
            reader,
            roster,
        });

        tracing::info!(peer = %self.peer, url = %self.url, session_id, "joined broker session");
        Ok(PeerStream::new(rx))
    }

    async fn leave(&self) -> Result<(), TransportError> {
        if let Some(link) = self.link.lock().await.take() {
            link.close().await;
            tracing::info!(peer = %self.peer, "left broker session");
        }
        Ok(())
    }

    async fn broadcast(&self, data: &[u8]) -> Result<(), TransportError> {
        let frame = BrokerFrame::Broadcast {
            data: data.to_vec(),
        }
        .encode()?;
        let mut link = self.link.lock().await;
        let link = link.as_mut().ok_or(TransportError::NotJoined)?;
        link.sink
            .send(Message::Binary(frame.into()))
            .await
            .map_err(|e| TransportError::SendFailed(link_error(io::ErrorKind::BrokenPipe, e)))
    }

    async fn roster(&self) -> Vec<PeerId> {
        match self.link.lock().await.as_ref() {
            Some(link) => link.roster.lock().await.clone(),
            None => Vec::new(),
        }
    }
}

/// Pumps broker frames into the session's event channel until the link drops.
async fn read_frames(
    mut stream: SplitStream<ClientWs>,
    tx: mpsc::UnboundedSender<TransportEvent>,
    roster: Arc<Mutex<Vec<PeerId>>>,
) {
    let reason = loop {
        let data = match stream.next().await {
            Some(Ok(msg)) => match Inbound::classify(msg) {
                Inbound::Data(data) => data,
                Inbound::Control => continue,
                Inbound::Closed => break "broker closed the connection".to_string(),
            },
            None => break "broker closed the connection".to_string(),
            Some(Err(e)) => break format!("broker link failed: {e}"),
        };

        match BrokerFrame::decode(&data) {
            Ok(BrokerFrame::Deliver { from, data }) => {
                if tx.send(TransportEvent::Message { data, from }).is_err() {
                    return;
                }
            }
            Ok(BrokerFrame::Roster { peers }) => {
                *roster.lock().await = peers.clone();
                let _ = tx.send(TransportEvent::RosterChanged(peers));
            }
            Ok(other) => tracing::debug!(?other, "ignoring unexpected broker frame"),
            Err(e) => tracing::debug!(error = %e, "dropping undecodable broker frame"),
        }
    };

    tracing::info!(%reason, "broker link ended");
    let _ = tx.send(TransportEvent::Invalidated { reason });
}
