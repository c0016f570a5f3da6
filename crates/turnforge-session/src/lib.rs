//! Session coordination for Turnforge.
//!
//! Every participant, host or not, runs one coordinator. It is an actor: a
//! Tokio task that owns all session state and is reached only through a
//! [`CoordinatorHandle`]. The task multiplexes three inputs with
//! `tokio::select!`:
//!
//! 1. **Commands** from the local player (host a room, start, submit, ...)
//! 2. **Transport events** (frames, roster changes, invalidation)
//! 3. **The turn timer**
//!
//! Because only that task touches state, a late submission and a timeout for
//! the same turn can never interleave: whichever the task sees first is
//! accepted and the turn advances before the other is looked at.
//!
//! # How it fits in the stack
//!
//! ```text
//! UI / demo (above)        ← CoordinatorHandle, SessionEvent, SessionSnapshot
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Authority + Timer        ← host-side turn state, single-slot countdown
//!     ↕
//! Protocol + Transport     ← envelopes, PeerTransport
//! ```

mod config;
mod coordinator;
mod dedup;
mod error;
mod state;

pub use config::CoordinatorConfig;
pub use coordinator::CoordinatorHandle;
pub use dedup::SeenMessages;
pub use error::SessionError;
pub use state::{SessionEvent, SessionPhase, SessionSnapshot, SessionStats};
