//! Unified error type for Turnforge.

use turnforge_authority::AuthorityError;
use turnforge_protocol::ProtocolError;
use turnforge_session::SessionError;
use turnforge_transport::TransportError;

/// Top-level error wrapping every layer's error type, so `?` works across
/// crates when you only depend on `turnforge`.
#[derive(Debug, thiserror::Error)]
pub enum TurnforgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// A broker connection sent something other than a join first.
    #[error("broker handshake failed: {0}")]
    Handshake(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: TurnforgeError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, TurnforgeError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: TurnforgeError = ProtocolError::UnsupportedSchema {
            expected: 1,
            found: 9,
        }
        .into();
        assert!(matches!(err, TurnforgeError::Protocol(_)));
        assert!(err.to_string().contains('9'));
    }

    #[test]
    fn test_from_session_error() {
        let err: TurnforgeError = SessionError::NotYourTurn.into();
        assert!(matches!(err, TurnforgeError::Session(_)));
    }

    #[test]
    fn test_from_authority_error() {
        let sid = turnforge_protocol::SessionId::new("s1");
        let err: TurnforgeError = AuthorityError::NoPlayers(sid).into();
        assert!(matches!(err, TurnforgeError::Authority(_)));
        assert!(err.to_string().contains("s1"));
    }
}
