//! The versioned envelope every broadcast travels in, and the codec that
//! seals and opens it.
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ schemaVersion: 1                   │  ← rejected if different
//! │ sessionID:  "9f2c…"                │  ← which game
//! │ messageID:  "04be…"                │  ← dedup key, fresh per send
//! │ senderID:   "ari"                  │
//! │ timestamp:  1760000000.25          │
//! │ type:       "turnSubmit"           │  ← decides how payload is read
//! │ payload:    [123, 34, …]           │  ← codec-encoded payload
//! └────────────────────────────────────┘
//! ```
//!
//! Decoding is pure. Whether a decoded envelope is stale, duplicate, or from
//! the wrong sender is the coordinator's business.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use turnforge_transport::PeerId;

use crate::types::unix_now;
use crate::{Codec, Message, MessageId, MessageKind, ProtocolError, SessionId};

/// The schema version this build writes and accepts.
pub const SCHEMA_VERSION: u32 = 1;

/// On-the-wire layout. The payload stays opaque until `kind` is known.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    schema_version: u32,
    #[serde(rename = "sessionID")]
    session_id: SessionId,
    #[serde(rename = "messageID")]
    message_id: MessageId,
    #[serde(rename = "senderID")]
    sender_id: PeerId,
    timestamp: f64,
    #[serde(rename = "type")]
    kind: MessageKind,
    payload: Vec<u8>,
}

/// Just enough of an envelope to check its version before trusting the rest.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaHeader {
    schema_version: u32,
}

/// A decoded envelope with its payload typed by kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub schema_version: u32,
    pub session_id: SessionId,
    pub message_id: MessageId,
    pub sender_id: PeerId,
    pub timestamp: f64,
    pub message: Message,
}

impl Envelope {
    /// Wraps `message` for sending now, with a fresh message id.
    pub fn new(session_id: SessionId, sender_id: PeerId, message: Message) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            session_id,
            message_id: MessageId::generate(),
            sender_id,
            timestamp: unix_now(),
            message,
        }
    }

    /// The envelope's `type` tag.
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }
}

/// Bytes ready for broadcast, plus the id they were sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub message_id: MessageId,
    pub bytes: Vec<u8>,
}

/// Seals typed messages into envelope bytes and opens them again.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec<C> {
    codec: C,
}

/// The envelope codec every coordinator uses by default.
#[cfg(feature = "json")]
pub type JsonEnvelopeCodec = EnvelopeCodec<crate::JsonCodec>;

impl<C: Codec> EnvelopeCodec<C> {
    /// Creates an envelope codec over the given payload codec.
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    /// Seals `message` into a fresh envelope and encodes it.
    pub fn encode(
        &self,
        session_id: &SessionId,
        sender_id: &PeerId,
        message: Message,
    ) -> Result<Sealed, ProtocolError> {
        let envelope = Envelope::new(session_id.clone(), sender_id.clone(), message);
        let bytes = self.encode_envelope(&envelope)?;
        Ok(Sealed {
            message_id: envelope.message_id,
            bytes,
        })
    }

    /// Encodes an already-built envelope as is, message id included.
    pub fn encode_envelope(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
        let payload = match &envelope.message {
            Message::LobbyState(p) => self.codec.encode(p)?,
            Message::TurnStart(p) => self.codec.encode(p)?,
            Message::TurnSubmit(p) | Message::TurnTimeout(p) => self.codec.encode(p)?,
            Message::Replay(p) => self.codec.encode(p)?,
            Message::Error(p) => self.codec.encode(p)?,
            Message::Hello(p) => self.codec.encode(p)?,
        };
        self.codec.encode(&WireEnvelope {
            schema_version: envelope.schema_version,
            session_id: envelope.session_id.clone(),
            message_id: envelope.message_id.clone(),
            sender_id: envelope.sender_id.clone(),
            timestamp: envelope.timestamp,
            kind: envelope.kind(),
            payload,
        })
    }

    /// Opens envelope bytes.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`]: not an envelope at all
    /// - [`ProtocolError::UnsupportedSchema`]: written by another schema version
    /// - [`ProtocolError::MalformedPayload`]: payload doesn't match its kind
    pub fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        let header: SchemaHeader = self.codec.decode(data)?;
        if header.schema_version != SCHEMA_VERSION {
            return Err(ProtocolError::UnsupportedSchema {
                expected: SCHEMA_VERSION,
                found: header.schema_version,
            });
        }

        let wire: WireEnvelope = self.codec.decode(data)?;
        let kind = wire.kind;
        let bytes = &wire.payload;
        let message = match kind {
            MessageKind::LobbyState => Message::LobbyState(self.payload(kind, bytes)?),
            MessageKind::TurnStart => Message::TurnStart(self.payload(kind, bytes)?),
            MessageKind::TurnSubmit => Message::TurnSubmit(self.payload(kind, bytes)?),
            MessageKind::TurnTimeout => Message::TurnTimeout(self.payload(kind, bytes)?),
            MessageKind::Replay => Message::Replay(self.payload(kind, bytes)?),
            MessageKind::Error => Message::Error(self.payload(kind, bytes)?),
            MessageKind::Hello => Message::Hello(self.payload(kind, bytes)?),
        };

        Ok(Envelope {
            schema_version: wire.schema_version,
            session_id: wire.session_id,
            message_id: wire.message_id,
            sender_id: wire.sender_id,
            timestamp: wire.timestamp,
            message,
        })
    }

    fn payload<T: DeserializeOwned>(
        &self,
        kind: MessageKind,
        bytes: &[u8],
    ) -> Result<T, ProtocolError> {
        self.codec
            .decode(bytes)
            .map_err(|e| ProtocolError::MalformedPayload {
                kind,
                reason: e.to_string(),
            })
    }
}
