//! The authority's lifecycle.

use std::fmt;

/// Where the authority is in a session.
///
/// Transitions are strictly ordered, one turn at a time:
///
/// ```text
/// NotStarted → Turn(0) → Turn(1) → … → Turn(n-1) → Complete
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityPhase {
    /// The room exists but no `TurnStart` has been issued.
    NotStarted,
    /// Turn `i` is active.
    Turn(u32),
    /// Every player has had their turn.
    Complete,
}

impl AuthorityPhase {
    /// The phase that follows this one in a session of `total_turns`.
    pub fn next(self, total_turns: u32) -> Option<Self> {
        match self {
            Self::NotStarted if total_turns == 0 => Some(Self::Complete),
            Self::NotStarted => Some(Self::Turn(0)),
            Self::Turn(i) if i + 1 >= total_turns => Some(Self::Complete),
            Self::Turn(i) => Some(Self::Turn(i + 1)),
            Self::Complete => None,
        }
    }

    /// Returns `true` if a turn is in progress.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Turn(_))
    }
}

impl fmt::Display for AuthorityPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Turn(i) => write!(f, "Turn({i})"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_next_follows_strict_order() {
        assert_eq!(AuthorityPhase::NotStarted.next(3), Some(AuthorityPhase::Turn(0)));
        assert_eq!(AuthorityPhase::Turn(0).next(3), Some(AuthorityPhase::Turn(1)));
        assert_eq!(AuthorityPhase::Turn(2).next(3), Some(AuthorityPhase::Complete));
        assert_eq!(AuthorityPhase::Complete.next(3), None);
    }

    #[test]
    fn test_phase_next_with_no_turns_completes() {
        assert_eq!(AuthorityPhase::NotStarted.next(0), Some(AuthorityPhase::Complete));
    }

    #[test]
    fn test_phase_is_active() {
        assert!(!AuthorityPhase::NotStarted.is_active());
        assert!(AuthorityPhase::Turn(1).is_active());
        assert!(!AuthorityPhase::Complete.is_active());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(AuthorityPhase::Turn(4).to_string(), "Turn(4)");
        assert_eq!(AuthorityPhase::Complete.to_string(), "Complete");
    }
}
