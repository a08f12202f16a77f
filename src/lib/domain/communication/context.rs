//! Cancellation and deadlines for a send

use std::future::Future;

use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::errors::{SendError, SessionError, Stage};

/// Caller-owned cancellation signal and optional deadline.
///
/// Every network step of a send races against both; whichever fires first
/// aborts the step and the in-flight future is dropped.
#[derive(Clone, Debug)]
pub struct SendContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for SendContext {
    fn default() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }
}

impl SendContext {
    /// A context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Use an existing cancellation token, e.g. a child of a shutdown token
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// The token cancelling this context
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel every send using this context
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Run one protocol step, unless cancelled or past the deadline first.
    pub(crate) async fn run<T, F>(&self, stage: Stage, step: F) -> Result<T, SendError>
    where
        F: Future<Output = Result<T, SessionError>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = self.token.cancelled() => Err(SendError::Cancelled { stage }),
            _ = deadline => Err(SendError::TimedOut { stage }),
            result = step => result.map_err(|source| stage.fail(source)),
        }
    }
}
