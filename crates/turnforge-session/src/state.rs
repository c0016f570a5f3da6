//! Locally observable session state.

use std::fmt;
use std::time::Duration;

use turnforge_protocol::{Player, ReplayItem, ReplayPayload, SessionId, TurnStart};
use turnforge_transport::PeerId;

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Where a participant is in the session lifecycle.
///
/// ```text
/// Idle → Lobby → InTurn → Replay → Ended
///   ↑      │        │        │
///   └──────┴────────┴────────┘  leave() or transport invalidation
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Not in any session.
    Idle,
    /// In a session, waiting for the host to start.
    Lobby,
    /// A turn is active.
    InTurn,
    /// Every turn is played; the replay is available.
    Replay,
    /// The local player finished with the session.
    Ended,
}

impl SessionPhase {
    /// Whether a new session may be hosted or joined from here.
    pub fn is_vacant(self) -> bool {
        matches!(self, Self::Idle | Self::Ended)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Lobby => "lobby",
            Self::InTurn => "inTurn",
            Self::Replay => "replay",
            Self::Ended => "ended",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters over incoming traffic. Cumulative across sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames handed over by the transport.
    pub received: u64,
    /// Envelopes dropped because their message id was already seen.
    pub duplicates: u64,
    /// Frames that failed to decode or had the wrong schema version.
    pub malformed: u64,
    /// Submissions the authority or the coordinator refused.
    pub rejected: u64,
    /// Host-only envelopes from a peer that isn't the pinned host, or
    /// envelopes whose sender doesn't match the transport sender.
    pub fenced: u64,
    /// Broadcasts the transport refused.
    pub send_failures: u64,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything a UI needs to render the session, taken on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub local_peer: PeerId,
    pub phase: SessionPhase,
    pub is_host: bool,
    pub session_id: Option<SessionId>,
    /// The host identity this participant trusts, once known.
    pub host_id: Option<PeerId>,
    pub players: Vec<Player>,
    /// Peers currently connected at the transport level.
    pub roster: Vec<PeerId>,
    pub prompt: String,
    pub turn_duration: Duration,
    pub active_turn: Option<TurnStart>,
    /// Time left on the local countdown for the active turn.
    pub turn_remaining: Option<Duration>,
    pub replay: Option<ReplayPayload>,
    /// Latest human-readable status (errors, send failures, resets).
    pub status: Option<String>,
    pub stats: SessionStats,
}

impl SessionSnapshot {
    /// Returns `true` if the active turn belongs to the local player.
    pub fn is_my_turn(&self) -> bool {
        self.active_turn
            .as_ref()
            .is_some_and(|t| t.current_player_id == self.local_peer)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Named transitions published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    /// The lobby roster was replaced.
    LobbyUpdated(Vec<Player>),
    /// A new active turn was adopted.
    TurnStarted(TurnStart),
    /// Host only: the authority accepted a submission.
    SubmissionAccepted(ReplayItem),
    ReplayReady(ReplayPayload),
    Status(String),
    /// The session was torn down underneath the participant.
    Reset {
        reason: String,
    },
}
