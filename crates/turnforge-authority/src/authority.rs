//! The turn authority: one canonical turn index, one accepted submission per
//! turn.
//!
//! ```text
//!   TurnSubmission ──► accept() ──► ReplayLog
//!                          │
//!                          ▼
//!                      advance() ──► TurnStart (next player)
//!                          │
//!                          ▼ (index == players)
//!                     build_replay()
//! ```
//!
//! Acceptance and advance are separate calls so the host can inspect state
//! between them, but the coordinator always goes through
//! [`TurnAuthority::accept_and_advance`]. No other submission can slip in
//! between the two because the authority is owned by a single task.

use std::collections::HashSet;

use tracing::{debug, info};
use turnforge_protocol::{Player, ReplayPayload, RoomContext, TurnStart, TurnSubmission};

use crate::{AuthorityError, AuthorityPhase, Rejection, ReplayLog};

/// What happened after a submission was accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// The next player's turn has begun.
    Next(TurnStart),
    /// That was the last turn. Here is the replay.
    Complete(ReplayPayload),
}

/// Host-side owner of the canonical turn index for one session.
#[derive(Debug)]
pub struct TurnAuthority {
    room: RoomContext,
    turn_index: u32,
    phase: AuthorityPhase,
    settled: HashSet<u32>,
    replay: ReplayLog,
}

impl TurnAuthority {
    /// Creates an authority at turn 0 for `room`.
    ///
    /// # Errors
    /// Returns [`AuthorityError::NoPlayers`] if the room is empty.
    pub fn new(room: RoomContext) -> Result<Self, AuthorityError> {
        if room.players.is_empty() {
            return Err(AuthorityError::NoPlayers(room.session_id));
        }
        let replay = ReplayLog::new(room.session_id.clone());
        Ok(Self {
            room,
            turn_index: 0,
            phase: AuthorityPhase::NotStarted,
            settled: HashSet::new(),
            replay,
        })
    }

    /// The canonical turn index.
    pub fn turn_index(&self) -> u32 {
        self.turn_index
    }

    pub fn phase(&self) -> AuthorityPhase {
        self.phase
    }

    /// Returns `true` once every player has had their turn.
    pub fn is_complete(&self) -> bool {
        self.phase == AuthorityPhase::Complete
    }

    /// Returns `true` if `turn_index` already has its accepted submission.
    pub fn is_settled(&self, turn_index: u32) -> bool {
        self.settled.contains(&turn_index)
    }

    /// The player whose turn it is. Wraps around past the last player, so it
    /// stays defined even after completion.
    pub fn current_player(&self) -> &Player {
        let slot = self.turn_index as usize % self.room.players.len();
        &self.room.players[slot]
    }

    /// Begins the current turn and describes it, or `None` once complete.
    /// Calling it again during a turn describes the same turn.
    pub fn start_turn(&mut self) -> Option<TurnStart> {
        if self.phase == AuthorityPhase::NotStarted {
            self.move_to(AuthorityPhase::NotStarted.next(self.room.total_turns()));
        }
        if !self.phase.is_active() {
            return None;
        }
        let player = self.current_player().id.clone();
        debug!(
            session = %self.room.session_id,
            turn = self.turn_index,
            %player,
            "turn started"
        );
        Some(TurnStart {
            session_id: self.room.session_id.clone(),
            turn_index: self.turn_index,
            total_turns: self.room.total_turns(),
            current_player_id: player,
            prompt: self.room.prompt.clone(),
        })
    }

    /// Validates `submission` against the current turn and, if it passes,
    /// records it in the replay log.
    ///
    /// # Errors
    /// Returns the first [`Rejection`] that applies. A rejected submission
    /// changes nothing.
    pub fn accept(&mut self, submission: &TurnSubmission) -> Result<(), Rejection> {
        if submission.session_id != self.room.session_id {
            return Err(Rejection::WrongSession {
                expected: self.room.session_id.clone(),
                found: submission.session_id.clone(),
            });
        }
        if self.is_complete() {
            return Err(Rejection::Complete);
        }
        if !self.phase.is_active() {
            return Err(Rejection::NotStarted);
        }
        if submission.turn_index != self.turn_index {
            return Err(Rejection::WrongTurn {
                expected: self.turn_index,
                found: submission.turn_index,
            });
        }
        if self.is_settled(self.turn_index) {
            return Err(Rejection::AlreadySettled(self.turn_index));
        }
        let expected = &self.current_player().id;
        if &submission.player_id != expected {
            return Err(Rejection::WrongPlayer {
                expected: expected.clone(),
                found: submission.player_id.clone(),
            });
        }

        self.settled.insert(self.turn_index);
        self.replay.record(submission.clone().into());
        debug!(
            session = %self.room.session_id,
            turn = self.turn_index,
            player = %submission.player_id,
            timed_out = submission.text.is_empty(),
            "submission accepted"
        );
        Ok(())
    }

    /// Moves to the next turn and starts it, or returns `None` once every
    /// player has gone. The index never moves past the player count.
    ///
    /// Before the first [`start_turn`](Self::start_turn) there is nothing to
    /// advance from, so this returns `None` and changes nothing.
    pub fn advance(&mut self) -> Option<TurnStart> {
        if !self.phase.is_active() {
            return None;
        }
        self.turn_index += 1;
        self.move_to(self.phase.next(self.room.total_turns()));
        if self.is_complete() {
            info!(
                session = %self.room.session_id,
                turns = self.replay.len(),
                "all turns played"
            );
            return None;
        }
        self.start_turn()
    }

    fn move_to(&mut self, next: Option<AuthorityPhase>) {
        if let Some(next) = next {
            debug!(
                session = %self.room.session_id,
                from = %self.phase,
                to = %next,
                "authority phase"
            );
            self.phase = next;
        }
    }

    /// Accepts `submission` and advances in one step.
    ///
    /// # Errors
    /// Same as [`accept`](Self::accept). On rejection the index does not move.
    pub fn accept_and_advance(&mut self, submission: &TurnSubmission) -> Result<Advance, Rejection> {
        self.accept(submission)?;
        Ok(match self.advance() {
            Some(start) => Advance::Next(start),
            None => Advance::Complete(self.build_replay()),
        })
    }

    /// The accepted submissions so far, ascending by turn index.
    pub fn build_replay(&self) -> ReplayPayload {
        self.replay.snapshot()
    }

    /// The replay log itself.
    pub fn replay(&self) -> &ReplayLog {
        &self.replay
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use turnforge_protocol::{PeerId, SessionId};

    fn room(ids: &[&str]) -> RoomContext {
        let players = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                if i == 0 {
                    Player::host(*id, id.to_uppercase())
                } else {
                    Player::new(*id, id.to_uppercase())
                }
            })
            .collect();
        RoomContext {
            session_id: SessionId::new("s1"),
            host_id: PeerId::new(ids.first().copied().unwrap_or("h")),
            players,
            prompt: "Once upon a time".into(),
            turn_duration: Duration::from_secs(30),
        }
    }

    fn submit(turn_index: u32, player: &str, text: &str) -> TurnSubmission {
        TurnSubmission {
            session_id: SessionId::new("s1"),
            turn_index,
            player_id: PeerId::new(player),
            text: text.into(),
            timestamp: 1.0,
        }
    }

    #[test]
    fn test_new_rejects_empty_room() {
        let err = TurnAuthority::new(room(&[])).unwrap_err();
        assert!(matches!(err, AuthorityError::NoPlayers(_)));
    }

    #[test]
    fn test_start_turn_describes_turn_zero() {
        let mut auth = TurnAuthority::new(room(&["h", "a"])).unwrap();
        assert_eq!(auth.phase(), AuthorityPhase::NotStarted);

        let start = auth.start_turn().unwrap();
        assert_eq!(start.turn_index, 0);
        assert_eq!(start.total_turns, 2);
        assert_eq!(start.current_player_id, PeerId::new("h"));
        assert_eq!(start.prompt, "Once upon a time");
        assert_eq!(auth.phase(), AuthorityPhase::Turn(0));
    }

    #[test]
    fn test_accept_before_start_is_rejected() {
        let mut auth = TurnAuthority::new(room(&["h"])).unwrap();
        assert_eq!(auth.accept(&submit(0, "h", "x")), Err(Rejection::NotStarted));
    }

    #[test]
    fn test_accept_records_and_advance_moves_on() {
        let mut auth = TurnAuthority::new(room(&["h", "a"])).unwrap();
        auth.start_turn();

        auth.accept(&submit(0, "h", "foo")).unwrap();
        assert!(auth.is_settled(0));
        let next = auth.advance().unwrap();
        assert_eq!(next.turn_index, 1);
        assert_eq!(next.current_player_id, PeerId::new("a"));
        assert_eq!(auth.replay().len(), 1);
    }

    #[test]
    fn test_second_acceptance_for_same_turn_is_rejected() {
        let mut auth = TurnAuthority::new(room(&["h", "a"])).unwrap();
        auth.start_turn();

        auth.accept(&submit(0, "h", "first")).unwrap();
        assert_eq!(
            auth.accept(&submit(0, "h", "second")),
            Err(Rejection::AlreadySettled(0))
        );
        assert_eq!(auth.build_replay().items[0].text, "first");
    }

    #[test]
    fn test_wrong_turn_and_wrong_player_are_rejected() {
        let mut auth = TurnAuthority::new(room(&["h", "a"])).unwrap();
        auth.start_turn();

        assert_eq!(
            auth.accept(&submit(1, "a", "early")),
            Err(Rejection::WrongTurn {
                expected: 0,
                found: 1
            })
        );
        assert_eq!(
            auth.accept(&submit(0, "a", "not mine")),
            Err(Rejection::WrongPlayer {
                expected: PeerId::new("h"),
                found: PeerId::new("a"),
            })
        );
        assert!(auth.build_replay().items.is_empty());
        assert_eq!(auth.turn_index(), 0);
    }

    #[test]
    fn test_wrong_session_is_rejected() {
        let mut auth = TurnAuthority::new(room(&["h"])).unwrap();
        auth.start_turn();
        let mut sub = submit(0, "h", "x");
        sub.session_id = SessionId::new("other");
        assert!(matches!(
            auth.accept(&sub),
            Err(Rejection::WrongSession { .. })
        ));
    }

    #[test]
    fn test_accept_and_advance_completes_on_last_turn() {
        let mut auth = TurnAuthority::new(room(&["h"])).unwrap();
        auth.start_turn();

        let outcome = auth.accept_and_advance(&submit(0, "h", "solo")).unwrap();
        let Advance::Complete(replay) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(replay.items.len(), 1);
        assert_eq!(auth.phase(), AuthorityPhase::Complete);
        assert_eq!(auth.accept(&submit(1, "h", "late")), Err(Rejection::Complete));
    }

    #[test]
    fn test_advance_before_start_changes_nothing() {
        let mut auth = TurnAuthority::new(room(&["h", "a"])).unwrap();
        assert!(auth.advance().is_none());
        assert_eq!(auth.phase(), AuthorityPhase::NotStarted);
        assert_eq!(auth.turn_index(), 0);

        let start = auth.start_turn().unwrap();
        assert_eq!(start.turn_index, 0);
    }

    #[test]
    fn test_phase_tracks_each_turn() {
        let mut auth = TurnAuthority::new(room(&["h", "a", "b"])).unwrap();
        auth.start_turn();
        let mut seen = vec![auth.phase()];
        while auth.advance().is_some() {
            seen.push(auth.phase());
        }
        seen.push(auth.phase());
        assert_eq!(
            seen,
            [
                AuthorityPhase::Turn(0),
                AuthorityPhase::Turn(1),
                AuthorityPhase::Turn(2),
                AuthorityPhase::Complete,
            ]
        );
        assert_eq!(auth.turn_index(), 3);
    }

    #[test]
    fn test_advance_never_passes_player_count() {
        let mut auth = TurnAuthority::new(room(&["h"])).unwrap();
        auth.start_turn();
        assert!(auth.advance().is_none());
        assert!(auth.advance().is_none());
        assert_eq!(auth.turn_index(), 1);
        assert!(auth.start_turn().is_none());
    }

    #[test]
    fn test_current_player_wraps_after_completion() {
        let mut auth = TurnAuthority::new(room(&["h", "a"])).unwrap();
        auth.start_turn();
        auth.advance();
        auth.advance();
        assert!(auth.is_complete());
        assert_eq!(auth.current_player().id, PeerId::new("h"));
    }
}
