//! Transport-level error types.

use crate::ChannelId;
use std::time::Duration;

/// Errors surfaced by a [`ChatTransport`](crate::ChatTransport).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote service could not be reached or answered unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),

    /// The credentials were rejected.
    #[error("credentials rejected by the chat service")]
    Unauthorized,

    /// The service asked us to slow down.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The watched channel does not exist or is not visible to this identity.
    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),

    /// The transport was shut down.
    #[error("transport closed")]
    Closed,
}

/// Convenience alias used throughout duet.
pub type Result<T> = std::result::Result<T, Error>;
