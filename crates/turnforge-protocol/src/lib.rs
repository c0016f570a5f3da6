//! Wire protocol for Turnforge.
//!
//! This crate defines the "language" peers in a turn-taking session speak:
//!
//! - **Types** ([`TurnStart`], [`TurnSubmission`], [`LobbyState`],
//!   [`ReplayPayload`], [`RoomContext`], …): the data model.
//! - **Envelope** ([`Envelope`], [`EnvelopeCodec`]): the versioned wrapper
//!   every broadcast travels in, with a fresh [`MessageId`] per send.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how payloads become bytes.
//! - **Errors** ([`ProtocolError`]): what a malformed frame looks like.
//!
//! ```text
//! PeerTransport (bytes) → Protocol (Envelope) → Session coordinator
//! ```

mod codec;
mod envelope;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
#[cfg(feature = "json")]
pub use envelope::JsonEnvelopeCodec;
pub use envelope::{Envelope, EnvelopeCodec, SCHEMA_VERSION, Sealed};
pub use error::ProtocolError;
pub use turnforge_transport::PeerId;
pub use types::{
    ErrorNotice, Hello, LobbyState, Message, MessageId, MessageKind, Player, ReplayItem,
    ReplayPayload, RoomContext, SessionId, TurnStart, TurnSubmission, unix_now,
};
