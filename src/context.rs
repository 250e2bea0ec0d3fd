//! Cancellation and deadlines for remote calls.
//!
//! Every call against GitLab runs inside a [`Context`]. A context is cancelled
//! when the host stops the provider, and may carry a deadline. Once a context
//! is cancelled every further call made with it fails immediately, so a
//! multi-call sequence such as update-then-read stops at the first call after
//! the cancellation point.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ProviderError, Result};

/// Fires cancellation for every [`Context`] derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a new, not yet cancelled handle.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Create a context observing this handle.
    pub fn context(&self) -> Context {
        Context {
            cancel: self.tx.subscribe(),
            deadline: None,
        }
    }

    /// Cancel every context observing this handle.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Ambient cancellation and deadline of one operation.
#[derive(Debug, Clone)]
pub struct Context {
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            cancel: rx,
            deadline: None,
        }
    }

    /// Derive a context whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(match self.deadline {
                Some(existing) if existing < deadline => existing,
                _ => deadline,
            }),
        }
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ProviderError::Cancelled(
                "operation cancelled by the host".to_string(),
            ));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ProviderError::DeadlineExceeded(
                    "operation deadline elapsed".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Run `fut` unless the context is cancelled or its deadline passes first.
    ///
    /// On cancellation the future is dropped, aborting any in-flight request.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            // A dropped sender can never cancel.
            if cancel.wait_for(|c| *c).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = cancelled => Err(ProviderError::Cancelled(
                "operation cancelled by the host".to_string(),
            )),
            _ = deadline => Err(ProviderError::DeadlineExceeded(
                "operation deadline elapsed".to_string(),
            )),
        }
    }

    /// Sleep for `duration`, observing cancellation and the deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_fast() {
        let handle = CancelHandle::new();
        let ctx = handle.context();
        handle.cancel();

        let mut polled = false;
        let result: Result<()> = ctx
            .run(async {
                polled = true;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Cancelled(_))));
        assert!(!polled);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_call() {
        let handle = CancelHandle::new();
        let ctx = handle.context();

        let call = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                ctx.run(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                })
                .await
            }
        });

        tokio::task::yield_now().await;
        handle.cancel();

        let result = call.await.unwrap();
        assert!(matches!(result, Err(ProviderError::Cancelled(_))));
        // The next call of the same sequence observes the cancellation too.
        assert!(ctx.check().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let result: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ProviderError::DeadlineExceeded(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_keeps_earlier_deadline() {
        let outer = Context::background().with_timeout(Duration::from_secs(1));
        let inner = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(inner.deadline(), outer.deadline());
    }
}
