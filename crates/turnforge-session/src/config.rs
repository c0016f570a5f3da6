//! Coordinator configuration.

use std::time::Duration;

use tracing::warn;
use turnforge_timer::TimerConfig;

/// Configuration for one coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Name announced in `hello` and shown in the lobby.
    pub display_name: String,

    /// How many recent message ids are remembered for deduplication.
    pub dedup_capacity: usize,

    /// Bound on queued commands from the handle. Senders wait when full.
    pub command_channel_size: usize,

    /// Buffer of the event broadcast channel. Slow subscribers lag past it.
    pub event_channel_size: usize,

    /// Shortest turn a host may configure.
    pub min_turn_duration: Duration,

    /// Longest turn a host may configure.
    pub max_turn_duration: Duration,

    /// Lobby size cap. Further `hello`s are answered with an error.
    pub max_players: usize,

    pub timer: TimerConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            display_name: "Player".into(),
            dedup_capacity: 4096,
            command_channel_size: 64,
            event_channel_size: 256,
            min_turn_duration: Duration::from_secs(1),
            max_turn_duration: Duration::from_secs(600),
            max_players: 16,
            timer: TimerConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Smallest dedup window accepted. Below this, a burst of duplicated
    /// frames could evict ids that are still in flight.
    pub const MIN_DEDUP_CAPACITY: usize = 64;

    /// A default config with `display_name` set.
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called automatically when a coordinator is spawned.
    pub fn validated(mut self) -> Self {
        if self.dedup_capacity < Self::MIN_DEDUP_CAPACITY {
            warn!(
                capacity = self.dedup_capacity,
                min = Self::MIN_DEDUP_CAPACITY,
                "dedup_capacity too small, raising"
            );
            self.dedup_capacity = Self::MIN_DEDUP_CAPACITY;
        }
        self.command_channel_size = self.command_channel_size.max(1);
        self.event_channel_size = self.event_channel_size.max(1);
        self.max_players = self.max_players.max(1);
        if self.min_turn_duration.is_zero() {
            self.min_turn_duration = Duration::from_millis(1);
        }
        if self.max_turn_duration < self.min_turn_duration {
            self.max_turn_duration = self.min_turn_duration;
        }
        self.timer = self.timer.validated();
        self
    }

    /// `requested` limited to the configured turn duration range.
    pub fn clamp_turn_duration(&self, requested: Duration) -> Duration {
        requested.clamp(self.min_turn_duration, self.max_turn_duration)
    }
}
