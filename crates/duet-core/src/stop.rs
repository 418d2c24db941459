//! One-shot stop signal shared by both agents and the conversation.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Why a conversation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// An agent asked for the next line and there was none.
    ScriptExhausted { by: String },
    /// The process was asked to shut down (Ctrl-C).
    Interrupted,
    /// An agent returned an error.
    AgentFailed { agent: String, error: String },
    /// An agent's message stream closed without an error.
    AgentStopped { agent: String },
}

impl StopReason {
    /// Returns true only for a conversation that played to the end of its script.
    pub fn is_completed(&self) -> bool {
        matches!(self, StopReason::ScriptExhausted { .. })
    }

    /// Process exit code for this reason.
    ///
    /// - 0: script played to the end
    /// - 1: an agent failed or stopped on its own
    /// - 130: user interrupt (SIGINT = 128 + 2)
    pub fn exit_code(&self) -> i32 {
        match self {
            StopReason::ScriptExhausted { .. } => 0,
            StopReason::AgentFailed { .. } | StopReason::AgentStopped { .. } => 1,
            StopReason::Interrupted => 130,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ScriptExhausted { by } => write!(f, "script exhausted (noticed by {by})"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::AgentFailed { agent, error } => write!(f, "{agent} failed: {error}"),
            StopReason::AgentStopped { agent } => write!(f, "{agent} stopped unexpectedly"),
        }
    }
}

/// Cloneable signal that fires once. The first reason recorded wins.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<Option<StopReason>>>,
    rx: watch::Receiver<Option<StopReason>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fires the signal. Returns false if it had already fired.
    pub fn trigger(&self, reason: StopReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The reason recorded by the first trigger, if any.
    pub fn reason(&self) -> Option<StopReason> {
        self.rx.borrow().clone()
    }

    /// Resolves once the signal has fired, returning the winning reason.
    pub async fn wait(&self) -> StopReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            // The sender lives in `self`, so `changed` cannot observe a closed channel here.
            if rx.changed().await.is_err() {
                return StopReason::Interrupted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_trigger_wins() {
        let stop = StopSignal::new();
        assert!(!stop.is_triggered());
        assert!(stop.trigger(StopReason::ScriptExhausted { by: "a".into() }));
        assert!(!stop.trigger(StopReason::Interrupted));
        assert_eq!(
            stop.reason(),
            Some(StopReason::ScriptExhausted { by: "a".into() })
        );
    }

    #[tokio::test]
    async fn test_wait_resolves_after_trigger_from_clone() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.trigger(StopReason::Interrupted);
        });

        let reason = tokio::time::timeout(Duration::from_secs(2), stop.wait())
            .await
            .expect("stop signal never fired");
        assert_eq!(reason, StopReason::Interrupted);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_fired() {
        let stop = StopSignal::new();
        stop.trigger(StopReason::AgentStopped { agent: "b".into() });
        assert_eq!(
            stop.wait().await,
            StopReason::AgentStopped { agent: "b".into() }
        );
    }

    #[test]
    fn test_only_exhaustion_counts_as_completed() {
        assert!(StopReason::ScriptExhausted { by: "x".into() }.is_completed());
        assert!(!StopReason::Interrupted.is_completed());
        assert_eq!(StopReason::ScriptExhausted { by: "x".into() }.exit_code(), 0);
        assert_eq!(StopReason::Interrupted.exit_code(), 130);
        assert_eq!(
            StopReason::AgentFailed {
                agent: "a".into(),
                error: "boom".into()
            }
            .exit_code(),
            1
        );
    }
}
