//! Snowflake identifiers.
//!
//! Discord-style platforms identify users, channels, and messages with 64-bit
//! snowflakes. Each kind gets its own newtype so a channel id can never be
//! passed where a user id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Creates a new identifier from its raw value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw snowflake value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake!(
    /// Identifies a user or bot account.
    UserId
);

snowflake!(
    /// Identifies a channel.
    ChannelId
);

snowflake!(
    /// Identifies a single message.
    MessageId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_raw_number() {
        assert_eq!(UserId::new(42).to_string(), "42");
        assert_eq!(MessageId::from(7).get(), 7);
    }

    #[test]
    fn test_serde_transparent() {
        let id: ChannelId = serde_json::from_str("1234").unwrap();
        assert_eq!(id, ChannelId(1234));
        assert_eq!(serde_json::to_string(&id).unwrap(), "1234");
    }

    #[test]
    fn test_ordering_follows_raw_value() {
        assert!(MessageId(10) < MessageId(11));
    }
}
