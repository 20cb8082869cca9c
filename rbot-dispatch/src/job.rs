//! Delayed one-shot jobs.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A future scheduled to run once after a delay.
///
/// [`cancel`](Job::cancel) only prevents a job that hasn't started yet; once the delay has
/// elapsed the work runs to completion. Dropping a `Job` leaves it scheduled.
pub struct Job {
    token: CancellationToken,
    handle: JoinHandle<bool>,
}

impl Job {
    pub fn schedule<F>(delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Job cancelled before running");
                    false
                }
                _ = tokio::time::sleep(delay) => {
                    work.await;
                    true
                }
            }
        });
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the job; `true` when the work ran, `false` when it was cancelled or panicked.
    pub async fn join(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}
