//! Concurrency gate that admits at most N tasks at a time.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::trace;

/// Bounded task runner.
///
/// Tasks are admitted through [`TaskLimiter::submit`], which waits for a free
/// slot, and joined through [`TaskLimiter::wait`]. A slot is owned by the
/// spawned task and released when the task finishes, however it finishes.
#[derive(Clone, Debug)]
pub struct TaskLimiter {
    limit: NonZeroUsize,
    semaphore: Arc<Semaphore>,
    task_tracker: TaskTracker,
}

impl TaskLimiter {
    /// Creates a limiter that runs at most `limit` tasks concurrently.
    #[must_use]
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit.get())),
            task_tracker: TaskTracker::new(),
        }
    }

    /// The concurrency ceiling this limiter was built with.
    #[must_use]
    pub const fn limit(&self) -> NonZeroUsize {
        self.limit
    }

    /// Number of admitted tasks that have not finished yet.
    #[must_use]
    pub fn running(&self) -> usize {
        self.limit.get() - self.semaphore.available_permits()
    }

    /// Waits for a free slot and spawns `task` into it.
    ///
    /// Returns `true` as soon as the task has been admitted, not when it
    /// completes. Returns `false` without running the task if `cancel` is
    /// already cancelled or becomes cancelled while waiting for a slot.
    pub async fn submit<F>(&self, cancel: &CancellationToken, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return false;
        }

        let permit = tokio::select! {
            biased;

            () = cancel.cancelled() => return false,
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                // The semaphore is never closed while the limiter is alive.
                Err(_) => return false,
            },
        };

        trace!(running = self.running(), "task admitted");

        self.task_tracker.spawn(async move {
            let _permit = permit;
            task.await;
        });

        true
    }

    /// Waits until every task admitted so far has completed.
    ///
    /// Submissions from other callers stay possible while waiting; tasks
    /// admitted after this call started may or may not be awaited.
    pub async fn wait(&self) {
        self.task_tracker.close();
        self.task_tracker.wait().await;
        self.task_tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn limiter(limit: usize) -> TaskLimiter {
        TaskLimiter::new(NonZeroUsize::new(limit).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_limit() {
        let limiter = limiter(3);
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let completed = Arc::clone(&completed);

            let admitted = limiter
                .submit(&cancel, async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            assert!(admitted);
        }

        limiter.wait().await;

        assert_eq!(completed.load(Ordering::SeqCst), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_submit_never_runs() {
        let limiter = limiter(2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let ran = Arc::clone(&ran);
            let admitted = limiter
                .submit(&cancel, async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            assert!(!admitted);
        }

        limiter.wait().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_slot() {
        let limiter = limiter(1);
        let cancel = CancellationToken::new();
        let release = CancellationToken::new();

        let blocker = release.clone();
        assert!(
            limiter
                .submit(&cancel, async move { blocker.cancelled().await })
                .await
        );

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let admitted = limiter
            .submit(&cancel, async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(!admitted);

        release.cancel();
        limiter.wait().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slot_released_after_panic() {
        let limiter = limiter(1);
        let cancel = CancellationToken::new();

        assert!(limiter.submit(&cancel, async { panic!("boom") }).await);
        limiter.wait().await;
        assert_eq!(limiter.running(), 0);

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        assert!(
            limiter
                .submit(&cancel, async move {
                    ran_clone.fetch_add(1, Ordering::SeqCst);
                })
                .await
        );
        limiter.wait().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_can_be_repeated() {
        let limiter = limiter(2);
        let cancel = CancellationToken::new();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let ran = Arc::clone(&ran);
            assert!(
                limiter
                    .submit(&cancel, async move {
                        ran.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            );
            limiter.wait().await;
        }

        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }
}
