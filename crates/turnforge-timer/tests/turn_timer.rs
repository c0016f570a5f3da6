//! Integration tests for the turn timer.
//!
//! Every async test starts with a paused clock: sleeps resolve as soon as the
//! runtime has nothing else to do, and `advance` moves time explicitly.

use std::time::Duration;

use tokio::time::{self, Instant};
use turnforge_timer::{ArmedTurn, Expiry, TimerConfig, TurnTimer};

// =========================================================================
// Helpers
// =========================================================================

/// Polls `timer.expired()` for at most `within`. `None` if it never fired.
async fn fires_within(timer: &mut TurnTimer, within: Duration) -> Option<Expiry> {
    time::timeout(within, timer.expired()).await.ok()
}

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_expires_after_duration() {
    let mut timer = TurnTimer::default();
    let start = Instant::now();
    timer.arm(1, 0, Duration::from_secs(30));

    let expiry = timer.expired().await;

    assert_eq!(expiry.epoch, 1);
    assert_eq!(expiry.turn_index, 0);
    assert!(start.elapsed() >= Duration::from_secs(30));
    assert!(!timer.is_armed());
    assert_eq!(timer.stats().fired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_does_not_fire_early() {
    let mut timer = TurnTimer::default();
    timer.arm(1, 0, Duration::from_secs(10));

    assert!(fires_within(&mut timer, Duration::from_secs(9)).await.is_none());
    // The timed-out poll left the slot alone.
    assert_eq!(
        timer.armed(),
        Some(ArmedTurn {
            epoch: 1,
            turn_index: 0
        })
    );
    assert!(fires_within(&mut timer, Duration::from_secs(2)).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_grace_extends_deadline() {
    let mut timer = TurnTimer::new(TimerConfig {
        grace: Duration::from_secs(2),
    });
    timer.arm(1, 0, Duration::from_secs(5));

    assert!(fires_within(&mut timer, Duration::from_secs(6)).await.is_none());
    assert!(fires_within(&mut timer, Duration::from_secs(2)).await.is_some());
}

// =========================================================================
// Replacement and cancellation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_rearm_replaces_previous_deadline() {
    let mut timer = TurnTimer::default();
    timer.arm(1, 0, Duration::from_secs(5));
    time::advance(Duration::from_secs(4)).await;
    timer.arm(1, 1, Duration::from_secs(5));

    // Turn 0's deadline would have been at t=5.
    assert!(fires_within(&mut timer, Duration::from_secs(2)).await.is_none());

    let expiry = timer.expired().await;
    assert_eq!(expiry.turn_index, 1);
    assert_eq!(timer.stats().armed, 2);
    assert_eq!(timer.stats().cancelled, 1);
    assert_eq!(timer.stats().fired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_disarmed_timer_pends_forever() {
    let mut timer = TurnTimer::default();
    timer.arm(3, 2, Duration::from_secs(1));
    let armed = timer.disarm();

    assert_eq!(
        armed,
        Some(ArmedTurn {
            epoch: 3,
            turn_index: 2
        })
    );
    assert!(fires_within(&mut timer, Duration::from_secs(3600)).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_never_armed_timer_pends_forever() {
    let mut timer = TurnTimer::default();
    assert!(fires_within(&mut timer, Duration::from_secs(3600)).await.is_none());
    assert_eq!(timer.stats().fired, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fires_once_per_arm() {
    let mut timer = TurnTimer::default();
    timer.arm(1, 0, Duration::from_millis(100));
    timer.expired().await;

    assert!(fires_within(&mut timer, Duration::from_secs(60)).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_remaining_counts_down() {
    let mut timer = TurnTimer::default();
    timer.arm(1, 0, Duration::from_secs(10));
    time::advance(Duration::from_secs(4)).await;

    let left = timer.remaining().unwrap();
    assert!(left <= Duration::from_secs(6) && left > Duration::from_secs(5));
    timer.disarm();
    assert_eq!(timer.remaining(), None);
}

#[tokio::test(start_paused = true)]
async fn test_expired_inside_select_loses_to_ready_branch() {
    let mut timer = TurnTimer::default();
    timer.arm(1, 0, Duration::from_secs(1));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<u32>();
    tx.send(7).unwrap();

    let got = tokio::select! {
        biased;
        Some(v) = rx.recv() => v,
        _ = timer.expired() => 0,
    };

    assert_eq!(got, 7);
    assert!(timer.is_armed());
}
