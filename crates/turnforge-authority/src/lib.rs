//! Host-side turn authority for Turnforge.
//!
//! The authority is the single owner of a session's canonical turn index.
//! It lives on the host only, inside the host coordinator's actor task,
//! and every mutation goes through `&mut self`: there is no shared access
//! to race on.
//!
//! # Key types
//!
//! - [`TurnAuthority`]: validates submissions and advances turns
//! - [`ReplayLog`]: accepted submissions in turn order
//! - [`AuthorityPhase`]: `NotStarted → Turn(i) → … → Complete`
//! - [`Rejection`]: why a submission was not accepted

mod authority;
mod error;
mod phase;
mod replay;

pub use authority::{Advance, TurnAuthority};
pub use error::{AuthorityError, Rejection};
pub use phase::AuthorityPhase;
pub use replay::ReplayLog;
