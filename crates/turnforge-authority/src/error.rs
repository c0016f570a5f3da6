//! Error types for the authority layer.

use turnforge_protocol::{PeerId, SessionId};

/// Why the authority refused a submission.
///
/// Rejections are expected traffic on an at-least-once channel (late
/// retries, duplicates, timeouts racing a real answer). Callers log them at
/// debug level and move on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The submission belongs to another session.
    #[error("submission for session {found}, authority runs {expected}")]
    WrongSession { expected: SessionId, found: SessionId },

    /// No turn has been started yet.
    #[error("turns have not started")]
    NotStarted,

    /// Every turn has already been played.
    #[error("session is complete")]
    Complete,

    /// The submission targets a turn other than the current one.
    #[error("submission for turn {found}, current turn is {expected}")]
    WrongTurn { expected: u32, found: u32 },

    /// The current turn already has its accepted submission.
    #[error("turn {0} already settled")]
    AlreadySettled(u32),

    /// The submitter is not the player whose turn it is.
    #[error("player {found} submitted during {expected}'s turn")]
    WrongPlayer { expected: PeerId, found: PeerId },
}

/// Errors creating an authority.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// A room needs at least one player to take turns.
    #[error("room {0} has no players")]
    NoPlayers(SessionId),
}
