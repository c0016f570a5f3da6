//! # Turnforge
//!
//! Turn coordination for small, peer-hosted multiplayer sessions.
//!
//! One participant hosts a room. Everyone else joins over a best-effort
//! multicast [`PeerTransport`](turnforge_transport::PeerTransport), and the
//! host's [`TurnAuthority`](turnforge_authority::TurnAuthority) decides, one
//! turn at a time, whose submission counts. When every turn is settled the
//! host broadcasts an ordered replay.
//!
//! This crate re-exports the layers and adds the pieces that sit around
//! them: a relay [`Broker`] for WebSocket peers and [`telemetry`] setup.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use turnforge::prelude::*;
//!
//! # async fn demo() -> Result<(), TurnforgeError> {
//! let mesh = LocalMesh::new();
//! let host = CoordinatorHandle::spawn(mesh.endpoint("ana"), CoordinatorConfig::named("Ana"));
//! let guest = CoordinatorHandle::spawn(mesh.endpoint("ben"), CoordinatorConfig::named("Ben"));
//!
//! let session = host.host_room("The lighthouse keeper", Duration::from_secs(30)).await?;
//! guest.join_room(session).await?;
//! host.start_game().await?;
//! host.submit("The lamp went dark at midnight.").await?;
//! # Ok(())
//! # }
//! ```

mod broker;
mod error;
pub mod telemetry;

pub use broker::{Broker, BrokerConfig};
pub use error::TurnforgeError;

pub use turnforge_authority as authority;
pub use turnforge_protocol as protocol;
pub use turnforge_session as session;
pub use turnforge_timer as timer;
pub use turnforge_transport as transport;

/// Convenient re-exports for building a turn-based session.
pub mod prelude {
    pub use crate::{Broker, BrokerConfig, TurnforgeError};

    pub use turnforge_authority::{Advance, AuthorityPhase, Rejection, ReplayLog, TurnAuthority};
    pub use turnforge_protocol::{
        LobbyState, Player, ReplayItem, ReplayPayload, RoomContext, SessionId, TurnStart,
        TurnSubmission,
    };
    pub use turnforge_session::{
        CoordinatorConfig, CoordinatorHandle, SessionError, SessionEvent, SessionPhase,
        SessionSnapshot, SessionStats,
    };
    pub use turnforge_timer::TimerConfig;
    pub use turnforge_transport::{
        LocalMesh, MeshFaults, PeerId, PeerTransport, WebSocketPeer,
    };
}
