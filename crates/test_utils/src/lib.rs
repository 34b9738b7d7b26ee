#![deny(missing_docs)]
//! Test utilities to be used by fetchbridge crates and their consumers.

use std::time::Duration;

pub mod callback;
pub mod consumer;
pub mod message;

/// How long the waiting helpers in this crate wait before panicking.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Enable tracing with the RUST_LOG environment variable.
///
/// This is intended to be used in tests, so it defaults to DEBUG level.
pub fn enable_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::DEBUG.into())
                .from_env_lossy(),
        )
        .try_init();
}
