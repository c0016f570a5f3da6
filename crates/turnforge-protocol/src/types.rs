//! Core protocol types for Turnforge's wire format.
//!
//! Everything in here either travels inside an envelope payload or is the
//! host-side room description those payloads are derived from.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};
use turnforge_transport::PeerId;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifies one game session. Unique per hosted room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an existing identifier (e.g. one discovered by browsing).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(random_hex())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one broadcast. Fresh for every send, retries included;
/// receivers deduplicate on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(random_hex())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 32 lowercase hex characters (128 random bits).
fn random_hex() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Seconds since the Unix epoch, as carried in envelopes and submissions.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Room composition
// ---------------------------------------------------------------------------

/// A participant in the lobby. Immutable once the lobby is formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PeerId,
    pub display_name: String,
    pub is_host: bool,
}

impl Player {
    /// Creates a non-host player.
    pub fn new(id: impl Into<PeerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            is_host: false,
        }
    }

    /// Creates the host player.
    pub fn host(id: impl Into<PeerId>, display_name: impl Into<String>) -> Self {
        Self {
            is_host: true,
            ..Self::new(id, display_name)
        }
    }
}

/// The host's description of a game: who plays, in what order, about what,
/// and for how long each turn lasts.
///
/// Turn order is list order. Built once when the host starts the game and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomContext {
    pub session_id: SessionId,
    pub host_id: PeerId,
    pub players: Vec<Player>,
    pub prompt: String,
    pub turn_duration: Duration,
}

impl RoomContext {
    /// One turn per player, single round.
    pub fn total_turns(&self) -> u32 {
        self.players.len() as u32
    }

    /// Looks up a player by identity.
    pub fn player(&self, id: &PeerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// The lobby announcement describing this room.
    pub fn lobby_state(&self) -> LobbyState {
        LobbyState {
            session_id: self.session_id.clone(),
            players: self.players.clone(),
            prompt: self.prompt.clone(),
            turn_duration_sec: self.turn_duration.as_secs_f64(),
            total_turns: self.total_turns(),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Host → all: room composition, so joiners converge before play starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyState {
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
    pub players: Vec<Player>,
    pub prompt: String,
    pub turn_duration_sec: f64,
    pub total_turns: u32,
}

impl LobbyState {
    /// The per-turn duration. Non-finite or negative values read as zero.
    pub fn turn_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.turn_duration_sec).unwrap_or_default()
    }
}

/// Host → all: the authoritative announcement of whose turn is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStart {
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
    pub turn_index: u32,
    pub total_turns: u32,
    #[serde(rename = "currentPlayerID")]
    pub current_player_id: PeerId,
    pub prompt: String,
}

/// Participant → host: the text a player submitted for one turn.
///
/// Also used for `turnTimeout`, where `text` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSubmission {
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
    pub turn_index: u32,
    #[serde(rename = "playerID")]
    pub player_id: PeerId,
    pub text: String,
    pub timestamp: f64,
}

impl TurnSubmission {
    /// The empty-text stand-in used when a turn runs out of time.
    pub fn timeout(session_id: SessionId, turn_index: u32, player_id: PeerId) -> Self {
        Self {
            session_id,
            turn_index,
            player_id,
            text: String::new(),
            timestamp: unix_now(),
        }
    }
}

/// One accepted submission in the final replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayItem {
    pub turn_index: u32,
    #[serde(rename = "playerID")]
    pub player_id: PeerId,
    pub text: String,
    pub timestamp: f64,
}

impl From<TurnSubmission> for ReplayItem {
    fn from(sub: TurnSubmission) -> Self {
        Self {
            turn_index: sub.turn_index,
            player_id: sub.player_id,
            text: sub.text,
            timestamp: sub.timestamp,
        }
    }
}

/// Host → all: the terminal artifact of a session, ordered by turn index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayPayload {
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
    pub items: Vec<ReplayItem>,
}

/// Participant → host: "I'm here, add me to the lobby."
///
/// The player's identity is the envelope's sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub display_name: String,
}

/// Host → participants: something went wrong that they should see.
///
/// `code` follows HTTP-style conventions. Notices that answer one peer carry
/// its id in `recipientID`; everyone else drops them. Without a recipient the
/// notice is for the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: u16,
    pub message: String,
    #[serde(
        rename = "recipientID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recipient: Option<PeerId>,
}

impl ErrorNotice {
    /// A `hello` arrived after the game started.
    pub const GAME_IN_PROGRESS: u16 = 409;
    /// The lobby is at its player cap.
    pub const ROOM_FULL: u16 = 429;

    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            recipient: None,
        }
    }

    /// Addresses the notice to a single peer.
    pub fn to(mut self, peer: PeerId) -> Self {
        self.recipient = Some(peer);
        self
    }

    /// Returns `true` if `peer` should act on this notice.
    pub fn is_for(&self, peer: &PeerId) -> bool {
        self.recipient.as_ref().is_none_or(|r| r == peer)
    }
}

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// The `type` tag of an envelope. Decides how its payload bytes are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    LobbyState,
    TurnStart,
    TurnSubmit,
    TurnTimeout,
    Replay,
    Error,
    Hello,
}

impl MessageKind {
    /// Kinds only the host may originate.
    pub fn is_authoritative(self) -> bool {
        matches!(
            self,
            Self::LobbyState | Self::TurnStart | Self::Replay | Self::Error
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LobbyState => "lobbyState",
            Self::TurnStart => "turnStart",
            Self::TurnSubmit => "turnSubmit",
            Self::TurnTimeout => "turnTimeout",
            Self::Replay => "replay",
            Self::Error => "error",
            Self::Hello => "hello",
        };
        f.write_str(name)
    }
}

/// A decoded payload, typed by its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    LobbyState(LobbyState),
    TurnStart(TurnStart),
    TurnSubmit(TurnSubmission),
    TurnTimeout(TurnSubmission),
    Replay(ReplayPayload),
    Error(ErrorNotice),
    Hello(Hello),
}

impl Message {
    /// The wire tag this payload travels under.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::LobbyState(_) => MessageKind::LobbyState,
            Self::TurnStart(_) => MessageKind::TurnStart,
            Self::TurnSubmit(_) => MessageKind::TurnSubmit,
            Self::TurnTimeout(_) => MessageKind::TurnTimeout,
            Self::Replay(_) => MessageKind::Replay,
            Self::Error(_) => MessageKind::Error,
            Self::Hello(_) => MessageKind::Hello,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
