//! Conversation orchestration: two reply agents, one script, one stop signal.
//!
//! The conversation owns the lifecycle of both identities:
//!
//! 1. Log both agents in.
//! 2. Start a listener task per transport feeding that agent's inbox.
//! 3. Optionally kick off (identity 1 posts an anchor and replies to it with line 0).
//! 4. Run both agents until the script is exhausted, an agent fails, or the
//!    caller's shutdown future resolves.
//! 5. Stop everything and return the combined transcript.

use crate::agent::{AgentConfig, AgentError, AgentExit, ReplyAgent, TranscriptEntry};
use crate::config::DuetConfig;
use crate::cursor::ScriptCursor;
use crate::scenario::Script;
use crate::stop::{StopReason, StopSignal};
use duet_proto::{ChannelId, ChatMessage, ChatTransport, UserId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Capacity of each agent's inbox.
const INBOX_CAPACITY: usize = 64;

const LABELS: [&str; 2] = ["identity_1", "identity_2"];

/// Everything a conversation needs besides transports and the script.
#[derive(Debug, Clone)]
pub struct ConversationSettings {
    pub channel_id: ChannelId,
    pub identity_1: UserId,
    pub identity_2: UserId,
    pub typing_delay: Duration,
    /// Anchor text for the kickoff; `None` waits for someone else to start.
    pub kickoff: Option<String>,
}

impl ConversationSettings {
    pub fn from_config(config: &DuetConfig) -> Self {
        Self {
            channel_id: config.discord.channel(),
            identity_1: config.identity_1.user_id(),
            identity_2: config.identity_2.user_id(),
            typing_delay: config.typing_delay(),
            kickoff: config
                .kickoff
                .enabled
                .then(|| config.kickoff.anchor.clone()),
        }
    }

    fn agent_config(&self, slot: usize) -> AgentConfig {
        let (me, opponent) = if slot == 0 {
            (self.identity_1, self.identity_2)
        } else {
            (self.identity_2, self.identity_1)
        };
        AgentConfig::new(LABELS[slot], me, opponent, self.channel_id)
            .with_typing_delay(self.typing_delay)
    }
}

/// How a conversation ended and what was said.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    pub reason: StopReason,
    /// Scripted lines actually sent, in script order.
    pub transcript: Vec<TranscriptEntry>,
    /// Number of lines the script had.
    pub script_len: usize,
}

impl ConversationOutcome {
    pub fn lines_sent(&self) -> usize {
        self.transcript.len()
    }

    /// True when every line of the script was sent.
    pub fn is_complete(&self) -> bool {
        self.reason.is_completed() && self.lines_sent() == self.script_len
    }
}

type AgentHandle = JoinHandle<AgentExit>;
type AgentJoin = Result<AgentExit, JoinError>;

/// Two identities replaying one script.
pub struct Conversation {
    settings: ConversationSettings,
    transports: [Arc<dyn ChatTransport>; 2],
    script: Script,
}

impl Conversation {
    pub fn new(
        settings: ConversationSettings,
        identity_1: Arc<dyn ChatTransport>,
        identity_2: Arc<dyn ChatTransport>,
        script: Script,
    ) -> Self {
        Self {
            settings,
            transports: [identity_1, identity_2],
            script,
        }
    }

    /// Runs until the script is exhausted, an agent fails, or Ctrl-C.
    pub async fn run(self) -> Result<ConversationOutcome, AgentError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C; running until the script ends");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs until the script is exhausted, an agent fails, or `shutdown` resolves.
    ///
    /// Login and kickoff failures are returned as errors. Failures after both
    /// agents are running end the conversation with [`StopReason::AgentFailed`].
    pub async fn run_until<F>(self, shutdown: F) -> Result<ConversationOutcome, AgentError>
    where
        F: Future<Output = ()>,
    {
        let script_len = self.script.len();
        let day = self.script.day;
        let cursor = Arc::new(ScriptCursor::new(self.script));
        let stop = StopSignal::new();

        info!(
            channel = %self.settings.channel_id,
            day = ?day,
            lines = script_len,
            kickoff = self.settings.kickoff.is_some(),
            "Starting conversation"
        );

        let [t1, t2] = self.transports;
        let mut agent_1 = ReplyAgent::new(
            self.settings.agent_config(0),
            Arc::clone(&t1),
            Arc::clone(&cursor),
            stop.clone(),
        );
        let mut agent_2 = ReplyAgent::new(
            self.settings.agent_config(1),
            Arc::clone(&t2),
            Arc::clone(&cursor),
            stop.clone(),
        );

        agent_1.login().await?;
        agent_2.login().await?;

        let (rx_1, listener_1) = spawn_listener(LABELS[0], t1);
        let (rx_2, listener_2) = spawn_listener(LABELS[1], t2);
        let listeners = [listener_1, listener_2];

        if let Some(anchor) = &self.settings.kickoff
            && let Err(e) = kickoff(&mut agent_1, anchor).await
        {
            for listener in &listeners {
                listener.abort();
            }
            return Err(e);
        }

        let mut handles: [AgentHandle; 2] = [
            tokio::spawn(agent_1.run(rx_1)),
            tokio::spawn(agent_2.run(rx_2)),
        ];
        let mut finished: [Option<AgentJoin>; 2] = [None, None];

        let shutdown = std::pin::pin!(shutdown);
        let [h1, h2] = &mut handles;
        let mut reason = tokio::select! {
            biased;
            reason = stop.wait() => reason,
            () = shutdown => {
                info!("Shutdown requested");
                StopReason::Interrupted
            }
            joined = h1 => {
                let reason = exit_reason(LABELS[0], &joined);
                finished[0] = Some(joined);
                reason
            }
            joined = h2 => {
                let reason = exit_reason(LABELS[1], &joined);
                finished[1] = Some(joined);
                reason
            }
        };

        if !stop.trigger(reason.clone()) {
            reason = stop.reason().unwrap_or(reason);
        }
        for listener in &listeners {
            listener.abort();
        }

        let mut transcript = Vec::new();
        for (slot, handle) in handles.into_iter().enumerate() {
            let joined = match finished[slot].take() {
                Some(joined) => joined,
                None => handle.await,
            };
            match joined {
                Ok(exit) => {
                    if let Some(e) = &exit.error {
                        warn!(agent = LABELS[slot], error = %e, "Agent ended with error");
                    }
                    transcript.extend(exit.transcript);
                }
                Err(e) => warn!(agent = LABELS[slot], error = %e, "Agent task panicked or was cancelled"),
            }
        }
        transcript.sort_by_key(|entry| entry.index);

        let outcome = ConversationOutcome {
            reason,
            transcript,
            script_len,
        };
        info!(
            reason = %outcome.reason,
            sent = outcome.lines_sent(),
            of = outcome.script_len,
            "Conversation finished"
        );
        Ok(outcome)
    }
}

/// Identity 1 posts the anchor, then replies to it with the first line.
async fn kickoff(agent: &mut ReplyAgent, anchor: &str) -> Result<(), AgentError> {
    let anchor_msg = agent.post(anchor).await?;
    debug!(agent = agent.label(), message_id = %anchor_msg.id, "Posted kickoff anchor");

    if !agent.open_with_next_line(anchor_msg.id).await? {
        info!(agent = agent.label(), "Script is empty, nothing to kick off");
    }
    Ok(())
}

fn spawn_listener(
    label: &'static str,
    transport: Arc<dyn ChatTransport>,
) -> (mpsc::Receiver<ChatMessage>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
    let handle = tokio::spawn(async move {
        match transport.listen(tx).await {
            Ok(()) => debug!(agent = label, "Listener stopped"),
            Err(e) => warn!(agent = label, error = %e, "Listener failed"),
        }
    });
    (rx, handle)
}

fn exit_reason(label: &str, joined: &AgentJoin) -> StopReason {
    match joined {
        Ok(AgentExit { error: None, .. }) => StopReason::AgentStopped {
            agent: label.to_string(),
        },
        Ok(AgentExit { error: Some(e), .. }) => StopReason::AgentFailed {
            agent: label.to_string(),
            error: e.to_string(),
        },
        Err(e) => StopReason::AgentFailed {
            agent: label.to_string(),
            error: e.to_string(),
        },
    }
}
