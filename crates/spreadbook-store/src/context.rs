//! Operation context: a deadline plus a cancellation signal.
//!
//! Every store call, lease wait and feed call runs under an [`OpContext`].
//! Clones share the same cancellation signal, so cancelling any clone stops
//! all work derived from it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use spreadbook_types::{Result, SpreadbookError};
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: Arc<watch::Sender<bool>>,
}

impl OpContext {
    /// A context with no deadline that is only stopped by [`OpContext::cancel`].
    #[must_use]
    pub fn background() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            deadline: None,
            cancel: Arc::new(tx),
        }
    }

    /// A fresh context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let mut ctx = Self::background();
        ctx.deadline = Some(Instant::now() + timeout);
        ctx
    }

    /// A derived context sharing this one's cancellation, expiring after
    /// `timeout` or at this context's deadline, whichever is sooner.
    #[must_use]
    pub fn child(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            cancel: Arc::clone(&self.cancel),
        }
    }

    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(SpreadbookError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(SpreadbookError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves with the reason once the context is cancelled or expires.
    pub async fn done(&self) -> SpreadbookError {
        let mut rx = self.cancel.subscribe();
        let cancelled = async move {
            // The sender lives in `self`, so this only returns on cancel.
            let _ = rx.wait_for(|c| *c).await;
        };
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = cancelled => SpreadbookError::Cancelled,
                () = tokio::time::sleep_until(deadline) => SpreadbookError::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                SpreadbookError::Cancelled
            }
        }
    }

    /// Run `fut` unless the context finishes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            res = fut => res,
            err = self.done() => Err(err),
        }
    }

    /// Sleep for `duration`, waking early with an error if the context ends.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}
