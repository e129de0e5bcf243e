//! Background execution port.
//!
//! A [`Background`] accepts units of work that must run to completion after
//! the caller has returned, without the caller waiting on them. Hosts that
//! cannot honor "run to completion" should not offer one; callers then await
//! the same work inline.

use futures::future::BoxFuture;
use tokio_util::task::TaskTracker;

/// Schedules fire-and-forget work with host-guaranteed completion.
pub trait Background: Send + Sync {
    /// Schedules `task` to run after the current operation returns.
    fn schedule(&self, task: BoxFuture<'static, ()>);
}

/// [`Background`] backed by the current tokio runtime.
///
/// Every scheduled task is spawned and tracked, so a host can wait for all
/// outstanding work before shutting down.
#[derive(Clone, Default)]
pub struct TokioBackground {
    tracker: TaskTracker,
}

impl TokioBackground {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scheduled tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every task scheduled so far has finished.
    ///
    /// Tasks scheduled while waiting are waited for as well.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl Background for TokioBackground {
    fn schedule(&self, task: BoxFuture<'static, ()>) {
        tracing::trace!(pending = self.tracker.len(), "scheduling background task");
        self.tracker.spawn(task);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::FutureExt;

    use super::*;

    #[tokio::test]
    async fn should_run_scheduled_tasks_to_completion() {
        // given
        let background = TokioBackground::new();
        let counter = Arc::new(AtomicUsize::new(0));

        // when
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            background.schedule(
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                .boxed(),
            );
        }
        background.wait_idle().await;

        // then
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(background.pending(), 0);
    }

    #[tokio::test]
    async fn should_accept_new_tasks_after_waiting() {
        // given
        let background = TokioBackground::new();
        background.wait_idle().await;
        let counter = Arc::new(AtomicUsize::new(0));

        // when
        let task_counter = Arc::clone(&counter);
        background.schedule(
            async move {
                task_counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );
        background.wait_idle().await;

        // then
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
