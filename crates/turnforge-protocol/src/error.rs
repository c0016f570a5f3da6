//! Error types for the protocol layer.

use crate::MessageKind;

/// Errors that can occur while encoding or decoding envelopes.
///
/// Every variant except [`Encode`](Self::Encode) means an incoming frame is
/// malformed: the receiver drops it and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not a well-formed envelope.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope was written by a peer speaking another schema version.
    #[error("unsupported schema version {found} (expected {expected})")]
    UnsupportedSchema { expected: u32, found: u32 },

    /// The envelope parsed, but its payload is not the type its kind declares.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload { kind: MessageKind, reason: String },
}

impl ProtocolError {
    /// Whether this error describes a bad incoming message (as opposed to a
    /// local failure to produce one).
    pub fn is_malformed(&self) -> bool {
        match self {
            #[cfg(feature = "json")]
            Self::Encode(_) => false,
            _ => true,
        }
    }
}
