use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use duet_proto::{BotUser, ChannelId, ChatMessage, ChatTransport, MessageId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{DiscordHttp, MAX_PAGE, snowflake_at};
use crate::error::{DiscordError, DiscordResult};

/// Maximum number of attempts for sending a message.
pub const MAX_SEND_RETRIES: u32 = 3;

/// Base delay for exponential backoff (1 second).
pub const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Low snowflake bits, free for a per-transport sequence number.
const NONCE_SEQ_MASK: u64 = (1 << 22) - 1;

/// Nonce for one outgoing message: the current timestamp snowflake with
/// `seq` in the low bits, so sends from one transport never collide.
fn make_nonce(now: u64, seq: u64) -> String {
    ((now & !NONCE_SEQ_MASK) | (seq & NONCE_SEQ_MASK)).to_string()
}

/// Where polling starts: the local clock, pulled back to the newest message
/// Discord already has when the clock runs ahead of Discord's.
fn baseline_after(clock: u64, newest: Option<u64>) -> u64 {
    newest.map_or(clock, |newest| clock.min(newest))
}

/// Execute a fallible async send with exponential backoff retry.
///
/// Makes up to [`MAX_SEND_RETRIES`] attempts, sleeping 1s then 2s between
/// them. A rate-limit response stretches the sleep to the server's
/// `retry_after`. Errors that cannot succeed on retry (bad token, missing
/// channel, 4xx) are returned immediately. After the last attempt the error
/// is `DiscordError::Send`.
///
/// The `sleep_fn` parameter allows tests to substitute a no-op sleep.
pub async fn retry_with_backoff<T, F, Fut, S, SFut>(
    mut send_fn: F,
    mut sleep_fn: S,
) -> DiscordResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DiscordResult<T>>,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let mut last_error = String::new();

    for attempt in 1..=MAX_SEND_RETRIES {
        match send_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                last_error = e.to_string();
                warn!(
                    attempt = attempt,
                    max_retries = MAX_SEND_RETRIES,
                    error = %last_error,
                    "Discord send failed, {}",
                    if attempt < MAX_SEND_RETRIES {
                        "retrying with backoff"
                    } else {
                        "all retries exhausted"
                    }
                );
                if attempt < MAX_SEND_RETRIES {
                    let mut delay = BASE_RETRY_DELAY * 2u32.pow(attempt - 1);
                    if let DiscordError::RateLimited { retry_after } = e {
                        delay = delay.max(retry_after);
                    }
                    sleep_fn(delay).await;
                }
            }
        }
    }

    Err(DiscordError::Send {
        attempts: MAX_SEND_RETRIES,
        reason: last_error,
    })
}

/// A [`ChatTransport`] for one bot identity in one Discord channel.
///
/// New messages are discovered by polling `GET /channels/{id}/messages`
/// with an `after` cursor. The cursor starts at the snowflake of the moment
/// the transport was created, so existing history is never replayed. Login
/// lowers it to the channel's newest message if the local clock is ahead.
pub struct DiscordTransport {
    http: DiscordHttp,
    channel_id: ChannelId,
    poll_interval: Duration,
    baseline: AtomicU64,
    nonce_seq: AtomicU64,
}

impl DiscordTransport {
    pub fn new(http: DiscordHttp, channel_id: ChannelId, poll_interval: Duration) -> Self {
        Self {
            http,
            channel_id,
            poll_interval,
            baseline: AtomicU64::new(snowflake_at(Utc::now())),
            nonce_seq: AtomicU64::new(0),
        }
    }

    /// Overrides the polling start point.
    pub fn with_baseline(self, after: MessageId) -> Self {
        self.baseline.store(after.get(), Ordering::SeqCst);
        self
    }

    /// The id polling starts after.
    pub fn baseline(&self) -> MessageId {
        MessageId(self.baseline.load(Ordering::SeqCst))
    }

    fn next_nonce(&self) -> String {
        let seq = self.nonce_seq.fetch_add(1, Ordering::Relaxed);
        make_nonce(snowflake_at(Utc::now()), seq)
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn token_masked(&self) -> String {
        self.http.token_masked()
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    fn name(&self) -> &str {
        "discord"
    }

    async fn login(&self) -> duet_proto::Result<BotUser> {
        let user = self.http.current_user().await?;
        debug!(
            token = %self.http.token_masked(),
            user_id = user.id,
            bot = user.bot,
            "Discord credentials accepted"
        );
        if !user.bot {
            warn!(user_id = user.id, "Token belongs to a user account, not a bot");
        }

        let clock = self.baseline.load(Ordering::SeqCst);
        let newest = self
            .http
            .latest_message(self.channel_id.get())
            .await?
            .map(|m| m.id);
        let after = baseline_after(clock, newest);
        if after < clock {
            warn!(
                clock,
                newest = after,
                "Local clock is ahead of Discord; polling from the newest channel message"
            );
        }
        self.baseline.store(after, Ordering::SeqCst);

        Ok(user.into())
    }

    /// Polls the channel until `tx` closes.
    ///
    /// Network and server errors are logged and retried after 5s; rate limits
    /// wait for `retry_after`. A rejected token or missing channel ends the
    /// listener with an error.
    async fn listen(&self, tx: mpsc::Sender<ChatMessage>) -> duet_proto::Result<()> {
        let channel = self.channel_id.get();
        let mut after = self.baseline.load(Ordering::SeqCst);

        info!(channel, after, "Discord polling task started");

        while !tx.is_closed() {
            let mut full_page = false;

            match self.http.messages_after(channel, after, MAX_PAGE).await {
                Ok(batch) => {
                    full_page = batch.len() == usize::from(MAX_PAGE);
                    for msg in batch {
                        after = after.max(msg.id);
                        if tx.send(msg.into()).await.is_err() {
                            break;
                        }
                    }
                }
                Err(DiscordError::RateLimited { retry_after }) => {
                    debug!(?retry_after, "Polling rate limited");
                    tokio::time::sleep(retry_after).await;
                    continue;
                }
                Err(e @ (DiscordError::Unauthorized { .. } | DiscordError::ChannelNotFound(_))) => {
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(error = %e, "Discord polling error - retrying in 5s");
                    tokio::select! {
                        () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                        () = tx.closed() => break,
                    }
                    continue;
                }
            }

            // A full page means more messages are waiting; fetch them right away.
            if full_page {
                continue;
            }
            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                () = tx.closed() => break,
            }
        }

        info!(channel, "Discord polling task stopped");
        Ok(())
    }

    async fn trigger_typing(&self, channel: ChannelId) -> duet_proto::Result<()> {
        self.http.trigger_typing(channel.get()).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> duet_proto::Result<ChatMessage> {
        // Every attempt carries the same nonce, so a retry after a lost
        // response returns the stored message instead of posting again.
        let nonce = self.next_nonce();
        let sent = retry_with_backoff(
            |_attempt| {
                self.http.create_message(
                    channel.get(),
                    content,
                    reply_to.map(MessageId::get),
                    Some(nonce.as_str()),
                )
            },
            tokio::time::sleep,
        )
        .await?;
        Ok(sent.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Recorder<T> = Arc<Mutex<Vec<T>>>;

    fn recorder<T>() -> Recorder<T> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn transient(attempt: u32) -> DiscordError {
        DiscordError::Api {
            status: 503,
            body: format!("failure on attempt {}", attempt),
        }
    }

    #[tokio::test]
    async fn retry_with_backoff_succeeds_on_first_attempt() {
        let attempts = recorder();
        let result = retry_with_backoff(
            |attempt| {
                attempts.lock().unwrap().push(attempt);
                async { Ok(42) }
            },
            |_delay| async {},
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempts.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn retry_with_backoff_succeeds_on_third_attempt() {
        let attempts = recorder();
        let delays = recorder();

        let result = retry_with_backoff(
            |attempt| {
                attempts.lock().unwrap().push(attempt);
                async move {
                    if attempt < 3 {
                        Err(transient(attempt))
                    } else {
                        Ok(7)
                    }
                }
            },
            |delay| {
                delays.lock().unwrap().push(delay);
                async {}
            },
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(*attempts.lock().unwrap(), vec![1, 2, 3]);
        // Delays: 1s * 2^0 = 1s, 1s * 2^1 = 2s
        assert_eq!(
            *delays.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn retry_with_backoff_fails_after_all_retries() {
        let delays = recorder();

        let result: DiscordResult<()> = retry_with_backoff(
            |attempt| async move { Err(transient(attempt)) },
            |delay| {
                delays.lock().unwrap().push(delay);
                async {}
            },
        )
        .await;

        match result.unwrap_err() {
            DiscordError::Send { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("failure on attempt 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // No delay after the final attempt.
        assert_eq!(delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retry_with_backoff_honours_rate_limit() {
        let delays = recorder();

        let result = retry_with_backoff(
            |attempt| async move {
                if attempt == 1 {
                    Err(DiscordError::RateLimited {
                        retry_after: Duration::from_secs(7),
                    })
                } else {
                    Ok("sent")
                }
            },
            |delay| {
                delays.lock().unwrap().push(delay);
                async {}
            },
        )
        .await;

        assert_eq!(result.unwrap(), "sent");
        assert_eq!(*delays.lock().unwrap(), vec![Duration::from_secs(7)]);
    }

    #[tokio::test]
    async fn retry_with_backoff_gives_up_on_permanent_errors() {
        let attempts = recorder();

        let result: DiscordResult<()> = retry_with_backoff(
            |attempt| {
                attempts.lock().unwrap().push(attempt);
                async { Err(DiscordError::Unauthorized { status: 401 }) }
            },
            |_delay| async {},
        )
        .await;

        assert!(matches!(result, Err(DiscordError::Unauthorized { .. })));
        assert_eq!(*attempts.lock().unwrap(), vec![1]);
    }

    #[test]
    fn baseline_starts_at_creation_time() {
        let before = snowflake_at(Utc::now());
        let http = DiscordHttp::new("https://example.invalid", "abcd1234efgh5678").unwrap();
        let transport = DiscordTransport::new(http, ChannelId(5), Duration::from_secs(2));
        assert!(transport.baseline().get() >= before);
        assert_eq!(transport.channel_id(), ChannelId(5));
        assert_eq!(transport.token_masked(), "abcd...5678");

        let rewound = transport.with_baseline(MessageId(1));
        assert_eq!(rewound.baseline(), MessageId(1));
    }

    #[test]
    fn baseline_follows_discord_when_clock_runs_ahead() {
        let clock = 5_000 << 22;
        let newest = 4_000 << 22;
        assert_eq!(baseline_after(clock, Some(newest)), newest);
        // A slow clock keeps the local value: nothing after it is missed.
        assert_eq!(baseline_after(clock, Some(6_000 << 22)), clock);
        assert_eq!(baseline_after(clock, None), clock);
    }

    #[test]
    fn nonces_are_distinct_and_fit_discord_limit() {
        let now = snowflake_at(Utc::now());
        let first = make_nonce(now, 0);
        let second = make_nonce(now, 1);
        assert_ne!(first, second);
        assert!(first.len() <= 25);

        let http = DiscordHttp::new("https://example.invalid", "abcd1234efgh5678").unwrap();
        let transport = DiscordTransport::new(http, ChannelId(5), Duration::from_secs(2));
        assert_ne!(transport.next_nonce(), transport.next_nonce());
    }
}
