//! Log output setup for binaries built on Turnforge.
//!
//! Library crates only emit `tracing` events; whoever owns `main` decides
//! where they go. Filtering follows `RUST_LOG` when it is set.

use tracing_subscriber::EnvFilter;

/// Installs a formatted stdout subscriber at `info` unless `RUST_LOG` says
/// otherwise. Does nothing if a global subscriber is already set.
pub fn init() {
    init_with("info");
}

/// Like [`init`], with a custom fallback directive such as
/// `"turnforge_session=debug,info"`.
///
/// Returns `false` if another subscriber was installed first.
pub fn init_with(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
