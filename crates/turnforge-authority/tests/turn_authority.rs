//! Integration tests for the turn authority driven the way a host drives it.

use std::time::Duration;

use turnforge_authority::{Advance, AuthorityPhase, Rejection, TurnAuthority};
use turnforge_protocol::{PeerId, Player, RoomContext, SessionId, TurnSubmission};

// =========================================================================
// Helpers
// =========================================================================

fn three_player_room() -> RoomContext {
    RoomContext {
        session_id: SessionId::new("story"),
        host_id: PeerId::new("host"),
        players: vec![
            Player::host("host", "Host"),
            Player::new("p1", "One"),
            Player::new("p2", "Two"),
        ],
        prompt: "A lighthouse keeper finds a door".into(),
        turn_duration: Duration::from_secs(5),
    }
}

fn submission(turn_index: u32, player: &str, text: &str) -> TurnSubmission {
    TurnSubmission {
        session_id: SessionId::new("story"),
        turn_index,
        player_id: PeerId::new(player),
        text: text.into(),
        timestamp: 100.0 + f64::from(turn_index),
    }
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn test_full_round_with_a_timeout_produces_ordered_replay() {
    let mut auth = TurnAuthority::new(three_player_room()).unwrap();
    auth.start_turn().unwrap();

    let step = auth.accept_and_advance(&submission(0, "host", "foo")).unwrap();
    assert!(matches!(step, Advance::Next(ref s) if s.current_player_id == PeerId::new("p1")));

    let timeout = TurnSubmission::timeout(SessionId::new("story"), 1, PeerId::new("p1"));
    let step = auth.accept_and_advance(&timeout).unwrap();
    assert!(matches!(step, Advance::Next(ref s) if s.turn_index == 2));

    let step = auth.accept_and_advance(&submission(2, "p2", "bar")).unwrap();
    let Advance::Complete(replay) = step else {
        panic!("expected completion");
    };

    let texts: Vec<_> = replay.items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, ["foo", "", "bar"]);
    let indices: Vec<_> = replay.items.iter().map(|i| i.turn_index).collect();
    assert_eq!(indices, [0, 1, 2]);
    assert_eq!(auth.phase(), AuthorityPhase::Complete);
}

#[test]
fn test_future_index_is_rejected_without_side_effects() {
    let mut auth = TurnAuthority::new(three_player_room()).unwrap();
    auth.start_turn();
    auth.accept_and_advance(&submission(0, "host", "a")).unwrap();
    auth.accept_and_advance(&submission(1, "p1", "b")).unwrap();
    assert_eq!(auth.turn_index(), 2);

    let err = auth.accept(&submission(5, "p2", "from the future")).unwrap_err();

    assert_eq!(err, Rejection::WrongTurn { expected: 2, found: 5 });
    assert_eq!(auth.turn_index(), 2);
    assert_eq!(auth.replay().len(), 2);
}

#[test]
fn test_late_submission_for_settled_turn_is_stale() {
    let mut auth = TurnAuthority::new(three_player_room()).unwrap();
    auth.start_turn();
    auth.accept_and_advance(&submission(0, "host", "a")).unwrap();

    // The host's own retry arriving after the turn moved on.
    let err = auth.accept(&submission(0, "host", "a")).unwrap_err();
    assert_eq!(err, Rejection::WrongTurn { expected: 1, found: 0 });
}

#[test]
fn test_timeout_racing_real_submission_first_wins() {
    let mut auth = TurnAuthority::new(three_player_room()).unwrap();
    auth.start_turn();

    let real = submission(0, "host", "real words");
    let timeout = TurnSubmission::timeout(SessionId::new("story"), 0, PeerId::new("host"));

    auth.accept(&real).unwrap();
    assert_eq!(auth.accept(&timeout), Err(Rejection::AlreadySettled(0)));
    assert_eq!(auth.replay().get(0).unwrap().text, "real words");
}

#[test]
fn test_replay_has_one_entry_per_turn_in_order() {
    let room = three_player_room();
    let ids: Vec<_> = room.players.iter().map(|p| p.id.clone()).collect();
    let mut auth = TurnAuthority::new(room).unwrap();
    auth.start_turn();

    let mut last = None;
    for (i, id) in ids.iter().enumerate() {
        let i = i as u32;
        // Noise before each real answer: duplicates of past turns and
        // submissions from the wrong player.
        if i > 0 {
            let _ = auth.accept(&submission(i - 1, ids[(i - 1) as usize].as_str(), "dup"));
        }
        let _ = auth.accept(&submission(i, "stranger", "nope"));
        last = Some(auth.accept_and_advance(&submission(i, id.as_str(), "ok")).unwrap());
    }

    let Some(Advance::Complete(replay)) = last else {
        panic!("expected completion after last player");
    };
    assert_eq!(replay.items.len(), ids.len());
    for (i, item) in replay.items.iter().enumerate() {
        assert_eq!(item.turn_index as usize, i);
        assert_eq!(item.player_id, ids[i]);
        assert_eq!(item.text, "ok");
    }
}
