use std::time::Duration;

/// Errors from the Discord REST API.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bot token is not a valid header value")]
    InvalidToken,

    #[error("Discord rejected the bot token (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Channel {0} not found or not visible to this bot")]
    ChannelNotFound(u64),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Discord API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode Discord response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to send after {attempts} attempts: {reason}")]
    Send { attempts: u32, reason: String },
}

impl DiscordError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DiscordError::Http(_) | DiscordError::RateLimited { .. } => true,
            DiscordError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type DiscordResult<T> = Result<T, DiscordError>;

impl From<DiscordError> for duet_proto::Error {
    fn from(err: DiscordError) -> Self {
        match err {
            DiscordError::Unauthorized { .. } | DiscordError::InvalidToken => {
                duet_proto::Error::Unauthorized
            }
            DiscordError::ChannelNotFound(id) => {
                duet_proto::Error::ChannelNotFound(duet_proto::ChannelId(id))
            }
            DiscordError::RateLimited { retry_after } => {
                duet_proto::Error::RateLimited { retry_after }
            }
            other => duet_proto::Error::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(DiscordError::RateLimited { retry_after: Duration::from_secs(1) }.is_retryable());
        assert!(DiscordError::Api { status: 502, body: String::new() }.is_retryable());
        assert!(!DiscordError::Api { status: 400, body: String::new() }.is_retryable());
        assert!(!DiscordError::Unauthorized { status: 401 }.is_retryable());
        assert!(!DiscordError::ChannelNotFound(1).is_retryable());
    }

    #[test]
    fn converts_to_transport_errors() {
        let err: duet_proto::Error = DiscordError::ChannelNotFound(9).into();
        assert!(matches!(err, duet_proto::Error::ChannelNotFound(duet_proto::ChannelId(9))));

        let err: duet_proto::Error = DiscordError::Unauthorized { status: 403 }.into();
        assert!(matches!(err, duet_proto::Error::Unauthorized));

        let err: duet_proto::Error = DiscordError::Api { status: 400, body: "bad".into() }.into();
        assert!(matches!(err, duet_proto::Error::Transport(ref s) if s.contains("400")));
    }
}
