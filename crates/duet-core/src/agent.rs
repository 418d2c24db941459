//! The reply agent: one identity's side of the scripted exchange.
//!
//! An agent watches one channel through its [`ChatTransport`]. When the
//! opposing identity replies in-thread, the agent takes the next line from
//! the shared [`ScriptCursor`] and answers in-thread. When the cursor runs
//! dry it fires the shared [`StopSignal`], which ends both agents.

use crate::cursor::ScriptCursor;
use crate::stop::{StopReason, StopSignal};
use duet_proto::{BotUser, ChannelId, ChatMessage, ChatTransport, MessageId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default pause between showing the typing indicator and sending.
pub const DEFAULT_TYPING_DELAY: Duration = Duration::from_secs(5);

/// Static configuration for one agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name used in logs and transcripts (e.g. "identity_1").
    pub label: String,

    /// The account id this agent is configured to run as.
    pub expected_id: UserId,

    /// The identity whose replies this agent answers with script lines.
    pub opponent_id: UserId,

    /// The only channel this agent reacts in.
    pub channel_id: ChannelId,

    /// How long to show "typing" before each reply.
    pub typing_delay: Duration,
}

impl AgentConfig {
    pub fn new(
        label: impl Into<String>,
        expected_id: UserId,
        opponent_id: UserId,
        channel_id: ChannelId,
    ) -> Self {
        Self {
            label: label.into(),
            expected_id,
            opponent_id,
            channel_id,
            typing_delay: DEFAULT_TYPING_DELAY,
        }
    }

    pub fn with_typing_delay(mut self, delay: Duration) -> Self {
        self.typing_delay = delay;
        self
    }
}

/// Why an incoming message was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OtherChannel,
    OwnMessage,
    NotAReply,
    /// A third party replied to something that was not ours.
    NotAddressedToUs,
}

/// What an agent does with an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ignore(IgnoreReason),
    /// The opponent replied: answer with the next script line.
    ScriptTurn,
    /// Someone else replied to one of our messages: answer with a greeting.
    Greet,
}

/// A scripted line that was actually sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// Position of the line in the script.
    pub index: usize,
    /// Label of the agent that spoke it.
    pub speaker: String,
    pub message_id: MessageId,
    pub text: String,
}

/// Agent errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{agent}: login failed: {source}")]
    Login {
        agent: String,
        #[source]
        source: duet_proto::Error,
    },

    #[error("{agent}: failed to send message: {source}")]
    Send {
        agent: String,
        #[source]
        source: duet_proto::Error,
    },
}

/// What an agent leaves behind when its loop ends.
#[derive(Debug)]
pub struct AgentExit {
    /// Scripted lines this agent sent, including those sent before a failure.
    pub transcript: Vec<TranscriptEntry>,
    pub error: Option<AgentError>,
}

/// One identity's reply loop.
pub struct ReplyAgent {
    config: AgentConfig,
    transport: Arc<dyn ChatTransport>,
    cursor: Arc<ScriptCursor>,
    stop: StopSignal,
    me: Option<BotUser>,
    transcript: Vec<TranscriptEntry>,
}

impl ReplyAgent {
    pub fn new(
        config: AgentConfig,
        transport: Arc<dyn ChatTransport>,
        cursor: Arc<ScriptCursor>,
        stop: StopSignal,
    ) -> Self {
        Self {
            config,
            transport,
            cursor,
            stop,
            me: None,
            transcript: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// The id this agent acts as: the logged-in account once known, else the configured one.
    pub fn self_id(&self) -> UserId {
        self.me.as_ref().map_or(self.config.expected_id, |u| u.id)
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Logs in through the transport and remembers the account.
    pub async fn login(&mut self) -> Result<&BotUser, AgentError> {
        let user = self
            .transport
            .login()
            .await
            .map_err(|source| AgentError::Login {
                agent: self.config.label.clone(),
                source,
            })?;

        if user.id != self.config.expected_id {
            warn!(
                agent = %self.config.label,
                configured = %self.config.expected_id,
                actual = %user.id,
                "Logged-in account does not match configured identity id"
            );
        }
        info!(agent = %self.config.label, transport = self.transport.name(), "Logged in as {} ({})", user.name, user.id);

        Ok(self.me.insert(user))
    }

    /// Decides what to do with `msg` without side effects.
    pub fn classify(&self, msg: &ChatMessage) -> Decision {
        let self_id = self.self_id();

        if msg.channel_id != self.config.channel_id {
            return Decision::Ignore(IgnoreReason::OtherChannel);
        }
        if msg.author.id == self_id {
            return Decision::Ignore(IgnoreReason::OwnMessage);
        }
        if !msg.is_reply() {
            return Decision::Ignore(IgnoreReason::NotAReply);
        }
        if msg.author.id == self.config.opponent_id {
            return Decision::ScriptTurn;
        }

        match msg.replied_to_author() {
            Some(author) if author == self_id => Decision::Greet,
            _ => Decision::Ignore(IgnoreReason::NotAddressedToUs),
        }
    }

    /// Acts on a single incoming message.
    pub async fn handle(&mut self, msg: &ChatMessage) -> Result<(), AgentError> {
        match self.classify(msg) {
            Decision::Ignore(reason) => {
                debug!(agent = %self.config.label, message_id = %msg.id, ?reason, "Ignoring message");
                Ok(())
            }
            Decision::ScriptTurn => self.take_turn(msg).await,
            Decision::Greet => {
                let greeting = format!("Hello to {} from {}!", msg.author.id, self.self_id());
                info!(agent = %self.config.label, to = %msg.author.id, "Greeting third party");
                self.reply(msg.id, &greeting).await.map(|_| ())
            }
        }
    }

    async fn take_turn(&mut self, msg: &ChatMessage) -> Result<(), AgentError> {
        let Some(line) = self.cursor.next_line() else {
            info!(agent = %self.config.label, "Script exhausted, stopping conversation");
            self.stop.trigger(StopReason::ScriptExhausted {
                by: self.config.label.clone(),
            });
            return Ok(());
        };

        debug!(agent = %self.config.label, index = line.index, reply_to = %msg.id, "Taking scripted turn");
        if let Some(sent) = self.reply(msg.id, &line.text).await? {
            info!(
                agent = %self.config.label,
                index = line.index,
                message_id = %sent.id,
                "Sent scripted line"
            );
            self.record(line.index, sent.id, line.text);
        }
        Ok(())
    }

    /// Posts a standalone message in the watched channel.
    pub async fn post(&self, content: &str) -> Result<ChatMessage, AgentError> {
        self.transport
            .send_message(self.config.channel_id, content, None)
            .await
            .map_err(|source| AgentError::Send {
                agent: self.config.label.clone(),
                source,
            })
    }

    /// Sends the next script line as a reply to `target` without waiting for a
    /// turn. Returns false when the script was already exhausted.
    pub async fn open_with_next_line(&mut self, target: MessageId) -> Result<bool, AgentError> {
        let Some(line) = self.cursor.next_line() else {
            self.stop.trigger(StopReason::ScriptExhausted {
                by: self.config.label.clone(),
            });
            return Ok(false);
        };

        if let Some(sent) = self.reply(target, &line.text).await? {
            self.record(line.index, sent.id, line.text);
        }
        Ok(true)
    }

    /// Shows typing, waits, then replies in-thread. Returns `None` if the
    /// conversation was stopped while typing.
    async fn reply(
        &self,
        reply_to: MessageId,
        content: &str,
    ) -> Result<Option<ChatMessage>, AgentError> {
        let channel = self.config.channel_id;

        if let Err(e) = self.transport.trigger_typing(channel).await {
            warn!(agent = %self.config.label, error = %e, "Failed to trigger typing indicator");
        }

        tokio::select! {
            () = tokio::time::sleep(self.config.typing_delay) => {}
            _ = self.stop.wait() => {
                debug!(agent = %self.config.label, "Stopped while typing, reply dropped");
                return Ok(None);
            }
        }

        self.transport
            .send_message(channel, content, Some(reply_to))
            .await
            .map(Some)
            .map_err(|source| AgentError::Send {
                agent: self.config.label.clone(),
                source,
            })
    }

    fn record(&mut self, index: usize, message_id: MessageId, text: String) {
        self.transcript.push(TranscriptEntry {
            index,
            speaker: self.config.label.clone(),
            message_id,
            text,
        });
    }

    /// Runs the agent until the stop signal fires, `rx` closes, or a send fails.
    ///
    /// Logs in first if [`login`](Self::login) has not been called yet. The
    /// transcript is returned in every case, alongside the error if there was one.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ChatMessage>) -> AgentExit {
        let error = self.serve(&mut rx).await.err();

        debug!(agent = %self.config.label, lines = self.transcript.len(), failed = error.is_some(), "Agent finished");
        AgentExit {
            transcript: self.transcript,
            error,
        }
    }

    async fn serve(&mut self, rx: &mut mpsc::Receiver<ChatMessage>) -> Result<(), AgentError> {
        if self.me.is_none() {
            self.login().await?;
        }

        let stop = self.stop.clone();
        loop {
            tokio::select! {
                biased;
                _ = stop.wait() => return Ok(()),
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(&msg).await?,
                    None => {
                        debug!(agent = %self.config.label, "Message stream closed");
                        return Ok(());
                    }
                },
            }
        }
    }
}
