//! # duet-proto
//!
//! Shared types, error definitions, and traits for the duet workspace.
//!
//! This crate provides the foundational abstractions used across all duet crates:
//! - Snowflake identifiers for users, channels, and messages
//! - The platform-neutral [`ChatMessage`] model, including reply references
//! - The [`ChatTransport`] trait every chat backend implements
//! - Common error types

mod error;
mod id;
mod message;
mod transport;

pub use error::{Error, Result};
pub use id::{ChannelId, MessageId, UserId};
pub use message::{BotUser, ChatMessage, MessageReference};
pub use transport::ChatTransport;
