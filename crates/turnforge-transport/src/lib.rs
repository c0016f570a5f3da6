//! Transport abstraction layer for Turnforge.
//!
//! Two families of traits live here:
//!
//! - [`PeerTransport`]: the capability a session coordinator needs from a
//!   multicast peer group: join/leave, a roster, best-effort `broadcast`,
//!   and a per-session [`PeerStream`] of incoming frames and membership
//!   notifications. Delivery is at-least-once and unordered; duplicates
//!   are possible and receivers are expected to deduplicate.
//! - [`Transport`] / [`Connection`]: server-side accept and per-connection
//!   I/O, used by the relay broker.
//!
//! # Implementations
//!
//! - [`LocalMesh`]: in-process multicast hub with fault injection
//! - [`WebSocketPeer`]: client that talks to a relay broker (feature `websocket`)
//! - [`WebSocketTransport`]: server side of that broker link (feature `websocket`)

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod frame;
mod mesh;
#[cfg(feature = "websocket")]
mod peer;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use frame::BrokerFrame;
pub use mesh::{LocalMesh, MeshEndpoint, MeshFaults};
#[cfg(feature = "websocket")]
pub use peer::WebSocketPeer;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque, stable identity of a peer in a group session.
///
/// The same value doubles as the player identity once the lobby is formed,
/// so it is serialized as a plain string.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a `PeerId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Broker-side handle number for one accepted link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Peer group capability
// ---------------------------------------------------------------------------

/// Something that happened on a joined group session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame broadcast by another member.
    Message { data: Vec<u8>, from: PeerId },

    /// The set of connected members changed. Carries the full roster.
    RosterChanged(Vec<PeerId>),

    /// The group session is gone (host left, group disbanded, link lost).
    /// No further events follow.
    Invalidated { reason: String },
}

/// The incoming side of one joined session.
///
/// Obtained fresh from every [`PeerTransport::join`]; it is not restartable.
/// `next` returns `None` once the transport drops the session.
#[derive(Debug)]
pub struct PeerStream {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl PeerStream {
    /// Wraps the receiving half of an event channel.
    pub fn new(rx: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self { rx }
    }

    /// Waits for the next event on this session.
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// A multicast peer group that a coordinator can join and broadcast into.
///
/// Methods return `Send` futures so a coordinator can drive the transport
/// from a spawned task.
pub trait PeerTransport: Send + Sync + 'static {
    /// The identity this process has in every group it joins.
    fn local_peer(&self) -> &PeerId;

    /// Joins the named session and returns its incoming event stream.
    ///
    /// Joining again (same or different session) leaves the previous one
    /// first, so the call is idempotent with respect to membership.
    fn join(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<PeerStream, TransportError>> + Send;

    /// Leaves the current session. A no-op when not joined.
    fn leave(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Best-effort send to every other connected member.
    ///
    /// May silently drop, duplicate, or reorder relative to other
    /// broadcasts.
    fn broadcast(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Currently connected members of the joined session, including self.
    fn roster(&self) -> impl Future<Output = Vec<PeerId>> + Send;
}

// ---------------------------------------------------------------------------
// Server-side accept
// ---------------------------------------------------------------------------

/// Listening side of the broker link.
///
/// Only the relay broker uses this; peers go through [`PeerTransport`].
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next peer to connect and completes its upgrade.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Stops handing out connections. Later `accept` calls fail.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// One accepted broker link carrying whole frames in both directions.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    fn id(&self) -> ConnectionId;

    /// Writes one frame to the peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads the next frame. `Ok(None)` means the peer hung up cleanly.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;
}
