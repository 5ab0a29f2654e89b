//! Client transport.
//!
//! Participants connect over WebSocket. Each connection owns one player,
//! sends JSON command frames and receives JSON notification frames. The
//! [`BroadcastHub`] fans engine notifications out to connections.

pub mod hub;
pub mod protocol;
pub mod ws;

pub use hub::BroadcastHub;
pub use protocol::{ClientCommand, parse_command};
pub use ws::{AppState, bind, router, serve};

use std::str::FromStr;

use crate::error::TransportError;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Default maximum inbound frame size in bytes (64 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Environment variable overriding [`DEFAULT_MAX_FRAME_SIZE`].
pub const MAX_FRAME_ENV: &str = "SKIRMISH_MAX_FRAME_BYTES";

/// Maximum inbound frame size, honouring [`MAX_FRAME_ENV`].
#[must_use]
pub fn max_frame_size() -> usize {
    env_or(MAX_FRAME_ENV, DEFAULT_MAX_FRAME_SIZE)
}

/// Truncates and strips control characters from untrusted input before
/// logging.
pub(crate) fn sanitize_for_log(input: &str, max_len: usize) -> String {
    input
        .chars()
        .take(max_len)
        .map(|c| {
            if c.is_control() && c != '\t' {
                '\u{FFFD}'
            } else {
                c
            }
        })
        .collect()
}

/// Reads an environment variable, parsing it to type `T`, or returns the
/// default. Logs a warning if the variable is set but cannot be parsed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(name, value = %v, "invalid env var value, using default");
            default
        }),
        Err(_) => default,
    }
}
