//! Running one handler under supervision.
//!
//! Every handler runs on its own tokio task so that a panic stays inside that
//! task and a deadline can be enforced without killing anything: when the
//! deadline passes the handler's token is cancelled, the join handle is
//! dropped (detaching the task) and a `Timeout` is reported.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::HandlerError;
use crate::event::EventKind;
use crate::options::CallbackOptions;

/// Context passed to every handler invocation.
///
/// The token is cancelled when the dispatch context is cancelled, when the
/// handler's deadline passes, or (for background handlers) when the registry
/// stops. Handlers are expected to observe it; nothing is aborted forcibly.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    options: Arc<CallbackOptions>,
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl HandlerContext {
    pub(crate) fn new(options: Arc<CallbackOptions>, token: CancellationToken) -> Self {
        let deadline = (!options.timeout.is_zero()).then(|| Instant::now() + options.timeout);
        Self {
            options,
            token,
            deadline,
        }
    }

    /// ID of the callback being invoked.
    pub fn id(&self) -> &str {
        &self.options.id
    }

    /// Registration options, including metadata.
    pub fn options(&self) -> &CallbackOptions {
        &self.options
    }

    /// Whether the handler should stop.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the handler should stop.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// The token itself, for passing to other APIs.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// When the invocation times out, if it has a timeout.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Waits for a spawned handler and classifies the outcome.
pub(crate) async fn supervise(
    id: &str,
    event: EventKind,
    mut task: JoinHandle<anyhow::Result<()>>,
    timeout: Duration,
    token: &CancellationToken,
) -> Result<(), HandlerError> {
    let joined = if timeout.is_zero() {
        Some((&mut task).await)
    } else {
        tokio::time::timeout(timeout, &mut task).await.ok()
    };

    match joined {
        None => {
            token.cancel();
            Err(HandlerError::timed_out(id, event, timeout))
        }
        Some(Ok(Ok(()))) => Ok(()),
        Some(Ok(Err(e))) => Err(HandlerError::handler(id, event, format!("{e:#}"))),
        Some(Err(e)) if e.is_panic() => {
            Err(HandlerError::panicked(id, event, panic_message(e.into_panic())))
        }
        Some(Err(e)) => Err(HandlerError::handler(id, event, e)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map_or_else(|| "panic with non-string payload".to_string(), |s| (*s).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerErrorKind;

    fn ctx(timeout: Duration) -> HandlerContext {
        HandlerContext::new(
            Arc::new(CallbackOptions::new("t").timeout(timeout)),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_supervise_ok() {
        let token = CancellationToken::new();
        let task = tokio::spawn(async { Ok(()) });
        assert!(supervise("a", EventKind::Loaded, task, Duration::ZERO, &token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_supervise_error_keeps_context() {
        let token = CancellationToken::new();
        let task = tokio::spawn(async {
            Err(anyhow::anyhow!("disk full").context("flushing cache"))
        });
        let err = supervise("a", EventKind::Reloaded, task, Duration::ZERO, &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind, HandlerErrorKind::Handler);
        assert_eq!(err.cause, "flushing cache: disk full");
    }

    #[tokio::test]
    async fn test_supervise_panic() {
        let token = CancellationToken::new();
        let task = tokio::spawn(async {
            if true {
                panic!("bad state {}", 7);
            }
            Ok(())
        });
        let err = supervise("p", EventKind::Reloaded, task, Duration::ZERO, &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind, HandlerErrorKind::Panic);
        assert_eq!(err.cause, "bad state 7");
    }

    #[tokio::test]
    async fn test_supervise_timeout_cancels_token() {
        let token = CancellationToken::new();
        let observed = token.clone();
        let task = tokio::spawn(async move {
            observed.cancelled().await;
            Ok(())
        });
        let err = supervise(
            "t",
            EventKind::Reloaded,
            task,
            Duration::from_millis(20),
            &token,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, HandlerErrorKind::Timeout);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_panic_message_static_str() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(3_u8)), "panic with non-string payload");
    }

    #[test]
    fn test_context_deadline() {
        assert!(ctx(Duration::ZERO).deadline().is_none());
        let c = ctx(Duration::from_secs(5));
        assert!(c.remaining().unwrap() <= Duration::from_secs(5));
        assert_eq!(c.id(), "t");
        assert!(!c.is_cancelled());
    }
}
