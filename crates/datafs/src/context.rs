//! Execution context threaded from the caller into filesystems.
//!
//! Carries the cancellation signal and optional deadline for one rendering
//! session. Filesystems that do network I/O receive it through
//! [`ContextAware`](crate::vfs::ContextAware) and race their requests
//! against it; local operations ignore it.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Cancellation and deadline for filesystem operations.
#[derive(Debug, Clone, Default)]
pub struct FsContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl FsContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context bound to the given cancellation token.
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Add a deadline `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once the token fired or the deadline passed.
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast when the context is already done.
    pub fn check(&self) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled.into_io());
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
        }
        Ok(())
    }

    /// Run `fut` until it completes, the token fires or the deadline passes.
    pub async fn run<T, F>(&self, fut: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            res = fut => res,
            _ = self.cancel.cancelled() => Err(Error::Cancelled.into_io()),
            _ = deadline => Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")),
        }
    }
}
