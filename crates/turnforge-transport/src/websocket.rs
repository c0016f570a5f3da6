//! Server side of the broker link: WebSocket accept and per-connection I/O.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{Connection, ConnectionId, Transport, TransportError};

static CONNECTION_IDS: AtomicU64 = AtomicU64::new(1);

type ServerWs = WebSocketStream<TcpStream>;

/// What a WebSocket message means to a byte-oriented reader.
pub(crate) enum Inbound {
    Data(Vec<u8>),
    Closed,
    /// Control traffic (ping, pong, raw frames).
    Control,
}

impl Inbound {
    pub(crate) fn classify(msg: Message) -> Self {
        match msg {
            Message::Binary(data) => Self::Data(data.into()),
            Message::Text(text) => Self::Data(text.as_bytes().to_vec()),
            Message::Close(_) => Self::Closed,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Self::Control,
        }
    }
}

/// Wraps a tungstenite error as the `io::Error` our error variants carry.
pub(crate) fn link_error(kind: io::ErrorKind, e: tungstenite::Error) -> io::Error {
    io::Error::new(kind, e)
}

/// Listens for broker connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    closed: AtomicBool,
}

impl WebSocketTransport {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            closed: AtomicBool::new(false),
        })
    }

    /// The address the listener is bound to (useful after binding port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<WebSocketConnection, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        let (tcp, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let ws = tokio_tungstenite::accept_async(tcp)
            .await
            .map_err(|e| TransportError::AcceptFailed(link_error(io::ErrorKind::ConnectionRefused, e)))?;

        let id = ConnectionId::new(CONNECTION_IDS.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "WebSocket upgrade complete");
        Ok(WebSocketConnection::new(id, ws))
    }

    /// Refuses further accepts. Open connections are left to their owners.
    async fn shutdown(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        tracing::info!("WebSocket transport shut down");
        Ok(())
    }
}

/// One accepted broker connection.
///
/// The read and write halves are locked independently so a task blocked in
/// [`recv`](Connection::recv) never stalls a concurrent `send`.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<ServerWs, Message>>,
    stream: Mutex<SplitStream<ServerWs>>,
}

impl WebSocketConnection {
    fn new(id: ConnectionId, ws: ServerWs) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(data.to_vec().into()))
            .await
            .map_err(|e| TransportError::SendFailed(link_error(io::ErrorKind::BrokenPipe, e)))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut stream = self.stream.lock().await;
        while let Some(msg) = stream.next().await {
            let msg = msg.map_err(|e| {
                TransportError::ReceiveFailed(link_error(io::ErrorKind::ConnectionReset, e))
            })?;
            match Inbound::classify(msg) {
                Inbound::Data(data) => return Ok(Some(data)),
                Inbound::Closed => return Ok(None),
                Inbound::Control => {}
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| TransportError::SendFailed(link_error(io::ErrorKind::BrokenPipe, e)))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
