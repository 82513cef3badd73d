//! Call Context: Deadlines and Cancellation
//!
//! Every suspension point in the pipeline (admission wait, retry backoff,
//! outbound request) runs through a [`CallContext`], which aborts the wait
//! when the caller's deadline passes or its [`CancelHandle`] fires.
//!
//! ## Usage
//!
//! ```ignore
//! use studyforge::ai::cancel::CallContext;
//!
//! let (ctx, handle) = CallContext::cancellable();
//! let ctx = ctx.with_timeout(Duration::from_secs(30));
//! // hand `handle` to whoever may abort the call
//! let result = generator.generate_text(&request, &ctx).await;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::types::ForgeError;

/// Why a wait was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The caller fired its cancel handle
    Canceled,
    /// The caller's deadline passed
    DeadlineExceeded,
}

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Canceled => write!(f, "the request was canceled"),
            Self::DeadlineExceeded => write!(f, "the request deadline passed"),
        }
    }
}

impl From<Interrupted> for ForgeError {
    fn from(reason: Interrupted) -> Self {
        ForgeError::Canceled(reason.to_string())
    }
}

/// Fires cancellation for every context cloned from the same pair
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even when every receiver is gone
        self.tx.send_replace(true);
    }

    pub fn is_canceled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Per-call deadline and cancellation signal
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl CallContext {
    /// Context that never interrupts
    pub fn new() -> Self {
        Self::default()
    }

    /// Context paired with a handle that cancels it
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: Some(rx),
            },
            CancelHandle { tx },
        )
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Check without waiting whether the call should stop
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(Interrupted::Canceled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Interrupted::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves once the call is canceled or its deadline passes.
    ///
    /// Pends forever on a context with neither.
    pub async fn interrupted(&self) -> Interrupted {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        let signal = async {
            match self.cancel.clone() {
                Some(mut rx) => {
                    while !*rx.borrow_and_update() {
                        if rx.changed().await.is_err() {
                            // Handle dropped without canceling
                            std::future::pending::<()>().await;
                        }
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = signal => Interrupted::Canceled,
            _ = deadline => Interrupted::DeadlineExceeded,
        }
    }

    /// Sleep for `duration` unless interrupted first
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.run(tokio::time::sleep(duration)).await
    }

    /// Drive `future` to completion unless interrupted first
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Interrupted> {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.interrupted() => Err(reason),
            output = future => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_plain_context_never_interrupts() {
        let ctx = CallContext::new();
        assert!(ctx.sleep(Duration::from_secs(3600)).await.is_ok());
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_sleep_short() {
        let start = Instant::now();
        let ctx = CallContext::new().with_timeout(Duration::from_secs(5));
        let result = ctx.sleep(Duration::from_secs(60)).await;
        assert_eq!(result, Err(Interrupted::DeadlineExceeded));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_handle_interrupts_waiters() {
        let (ctx, handle) = CallContext::cancellable();
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.sleep(Duration::from_secs(60)).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
        assert!(handle.is_canceled());
        assert_eq!(waiter.await.unwrap(), Err(Interrupted::Canceled));
    }

    #[tokio::test]
    async fn test_already_canceled_context_rejects_immediately() {
        let (ctx, handle) = CallContext::cancellable();
        handle.cancel();
        assert_eq!(ctx.check(), Err(Interrupted::Canceled));
        assert_eq!(ctx.run(async { 1 }).await, Err(Interrupted::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = CallContext::cancellable();
        drop(handle);
        assert!(ctx.sleep(Duration::from_secs(10)).await.is_ok());
    }

    #[test]
    fn test_interrupted_converts_to_canceled_error() {
        let err: ForgeError = Interrupted::DeadlineExceeded.into();
        assert_eq!(err.kind(), crate::types::ErrorKind::Canceled);
    }
}
