//! Frames exchanged between a [`WebSocketPeer`](crate::WebSocketPeer) and
//! the relay broker.
//!
//! The broker never looks inside `data`; it only routes.

use serde::{Deserialize, Serialize};

use crate::{PeerId, TransportError};

/// One frame on the peer ↔ broker link.
///
/// Internally tagged JSON, e.g. `{"type":"join","sessionId":"…","peerId":"…"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BrokerFrame {
    /// Peer → broker: "put me in this session". Must be the first frame.
    Join { session_id: String, peer_id: PeerId },

    /// Peer → broker: "take me out of my session".
    Leave,

    /// Peer → broker: fan `data` out to every other member.
    Broadcast { data: Vec<u8> },

    /// Broker → peer: a frame another member broadcast.
    Deliver { from: PeerId, data: Vec<u8> },

    /// Broker → peer: the full member list after a change.
    Roster { peers: Vec<PeerId> },
}

impl BrokerFrame {
    /// Serializes the frame to JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(TransportError::InvalidFrame)
    }

    /// Parses a frame from JSON bytes.
    pub fn decode(data: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(data).map_err(TransportError::InvalidFrame)
    }
}
