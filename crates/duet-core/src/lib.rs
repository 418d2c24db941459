//! # duet-core
//!
//! Core replay functionality for duet.
//!
//! This crate provides:
//! - Scenario loading and validation (the ordered lines to exchange)
//! - A shared cursor that hands out each line exactly once
//! - The reply agent that answers the opposing identity in-thread
//! - Conversation orchestration: two agents, one stop signal
//! - Configuration loading and management
//! - An in-memory transport for deterministic tests

mod agent;
mod config;
mod conversation;
mod cursor;
mod scenario;
mod stop;
pub mod testing;

pub use agent::{
    AgentConfig, AgentError, AgentExit, Decision, IgnoreReason, ReplyAgent, TranscriptEntry,
};
pub use config::{
    ConfigError, ConfigWarning, DiscordConfig, DuetConfig, IdentityConfig, KickoffConfig,
    LogConfig, LogFormat, token_env_var,
};
pub use conversation::{Conversation, ConversationOutcome, ConversationSettings};
pub use cursor::{ScriptCursor, ScriptLine};
pub use scenario::{
    DayScenario, DaySelection, ScenarioError, ScenarioSet, ScenarioWarning, Script, load_scenarios,
};
pub use stop::{StopReason, StopSignal};
