//! Single-slot turn deadline timer for Turnforge.
//!
//! A coordinator owns exactly one [`TurnTimer`]. Arming it for a new turn
//! replaces whatever was armed before, so at most one deadline exists per
//! coordinator at any time.
//!
//! # Integration
//!
//! The timer sits inside the coordinator actor's `tokio::select!` loop. When
//! nothing is armed, [`TurnTimer::expired`] pends forever and `select!` keeps
//! serving the other branches:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* host_room, submit, ... */ }
//!         expiry = timer.expired() => {
//!             if expiry.epoch == epoch && expiry.turn_index == current_turn {
//!                 // the current player ran out of time
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! An [`Expiry`] carries the session epoch and turn index it was armed for.
//! The caller compares them with its live state before acting, so an expiry
//! that lost a race with an accepted submission is ignored.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timer configuration.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Extra time added to every deadline to absorb broadcast latency between
    /// the host's `turnStart` and the player seeing it. Default: zero.
    pub grace: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            grace: Duration::ZERO,
        }
    }
}

impl TimerConfig {
    /// Largest grace period accepted.
    pub const MAX_GRACE: Duration = Duration::from_secs(10);

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`TurnTimer::new`].
    pub fn validated(mut self) -> Self {
        if self.grace > Self::MAX_GRACE {
            warn!(
                grace_ms = self.grace.as_millis() as u64,
                max_ms = Self::MAX_GRACE.as_millis() as u64,
                "timer grace exceeds maximum, clamping"
            );
            self.grace = Self::MAX_GRACE;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Armed slot
// ---------------------------------------------------------------------------

/// Which turn a deadline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTurn {
    /// Session epoch at arming time. Bumped by the coordinator on every reset.
    pub epoch: u64,
    /// Turn index the deadline guards.
    pub turn_index: u32,
}

/// A deadline that has passed, returned by [`TurnTimer::expired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub epoch: u64,
    pub turn_index: u32,
    /// How late the wakeup was relative to the deadline.
    pub late_by: Duration,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub armed: u64,
    /// Deadlines replaced or disarmed before they fired.
    pub cancelled: u64,
    pub fired: u64,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Deadlines further out than this are treated as "never" in practice.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// One-shot, replaceable turn deadline.
#[derive(Debug)]
pub struct TurnTimer {
    config: TimerConfig,
    slot: Option<(Instant, ArmedTurn)>,
    stats: TimerStats,
}

impl Default for TurnTimer {
    fn default() -> Self {
        Self::new(TimerConfig::default())
    }
}

impl TurnTimer {
    pub fn new(config: TimerConfig) -> Self {
        Self {
            config: config.validated(),
            slot: None,
            stats: TimerStats::default(),
        }
    }

    /// Arms the deadline for `turn_index`, `duration` (plus grace) from now.
    ///
    /// Any previously armed deadline is cancelled and will never fire.
    /// A duration too large for the clock is armed [`FAR_FUTURE`] out instead.
    pub fn arm(&mut self, epoch: u64, turn_index: u32, duration: Duration) {
        if let Some((_, previous)) = self.slot.take() {
            self.stats.cancelled += 1;
            trace!(
                epoch = previous.epoch,
                turn = previous.turn_index,
                "turn timer replaced"
            );
        }
        let now = Instant::now();
        let deadline = match now.checked_add(duration.saturating_add(self.config.grace)) {
            Some(deadline) => deadline,
            None => {
                warn!(
                    epoch,
                    turn = turn_index,
                    secs = duration.as_secs_f64(),
                    "turn duration out of range, arming far deadline"
                );
                now + FAR_FUTURE
            }
        };
        self.slot = Some((deadline, ArmedTurn { epoch, turn_index }));
        self.stats.armed += 1;
        debug!(
            epoch,
            turn = turn_index,
            secs = duration.as_secs_f64(),
            "turn timer armed"
        );
    }

    /// Cancels the armed deadline, if any, and returns what it guarded.
    pub fn disarm(&mut self) -> Option<ArmedTurn> {
        let (_, armed) = self.slot.take()?;
        self.stats.cancelled += 1;
        debug!(epoch = armed.epoch, turn = armed.turn_index, "turn timer disarmed");
        Some(armed)
    }

    /// Waits for the armed deadline and clears the slot when it passes.
    ///
    /// Pends forever while nothing is armed. Cancel-safe: dropping the future
    /// before it completes leaves the slot untouched.
    pub async fn expired(&mut self) -> Expiry {
        let Some((deadline, _)) = self.slot else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(deadline).await;

        // Nothing awaits between the sleep and here, so the slot is the one
        // we slept on.
        let Some((_, armed)) = self.slot.take() else {
            unreachable!("slot cleared while its sleep was pending")
        };
        self.stats.fired += 1;
        let late_by = Instant::now().saturating_duration_since(deadline);
        debug!(
            epoch = armed.epoch,
            turn = armed.turn_index,
            late_ms = late_by.as_secs_f64() * 1000.0,
            "turn timer expired"
        );
        Expiry {
            epoch: armed.epoch,
            turn_index: armed.turn_index,
            late_by,
        }
    }

    /// The turn the timer is armed for, if any.
    pub fn armed(&self) -> Option<ArmedTurn> {
        self.slot.map(|(_, armed)| armed)
    }

    /// Whether a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.slot.is_some()
    }

    /// Time left before the armed deadline. `None` when disarmed.
    pub fn remaining(&self) -> Option<Duration> {
        self.slot
            .map(|(deadline, _)| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn stats(&self) -> TimerStats {
        self.stats
    }
}
