//! Error types for the session layer.

use turnforge_authority::AuthorityError;
use turnforge_protocol::ProtocolError;
use turnforge_transport::TransportError;

use crate::SessionPhase;

/// Errors returned to callers of a [`CoordinatorHandle`](crate::CoordinatorHandle).
///
/// None of these stop the coordinator. Failures that happen while handling
/// incoming traffic never reach a caller; they become status text instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Only the host may do this.
    #[error("only the host can {0}")]
    NotHost(&'static str),

    /// The locally known active turn belongs to someone else.
    #[error("it is not this player's turn")]
    NotYourTurn,

    /// This player already submitted for the active turn.
    #[error("already submitted for turn {0}")]
    AlreadySubmitted(u32),

    /// The operation doesn't apply in the current phase.
    #[error("cannot {op} while {phase}")]
    InvalidPhase {
        op: &'static str,
        phase: SessionPhase,
    },

    /// A broadcast could not be handed to the transport. Not retried.
    #[error("send failed: {0}")]
    TransportSendFailure(#[source] TransportError),

    /// Joining the transport session failed. The coordinator is idle again.
    #[error("could not join session: {0}")]
    ActivationFailure(#[source] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// The coordinator task has stopped.
    #[error("coordinator is not running")]
    Unavailable,
}
