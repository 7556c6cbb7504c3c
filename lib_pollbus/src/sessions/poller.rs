//! Periodic task set shared by the polling sessions.
//!
//! One tokio task per target, all tied to a single `CancellationToken`.
//! Cancellation is only observed between ticks, so a tick that has started
//! always finishes unless the stop grace period runs out.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub(crate) struct PollerSet {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl PollerSet {
    pub(crate) fn new(grace: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            grace,
        }
    }

    pub(crate) fn set_grace(&mut self, grace: Duration) {
        self.grace = grace;
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Runs `tick` every `period`, first one `period` after now.
    ///
    /// Ticks of one task never overlap. Deadlines missed while a tick is
    /// still running collapse into one late tick; they are not queued.
    pub(crate) fn spawn<F, Fut>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick().await,
                }
            }
        });
        self.tasks.push(handle);
    }

    /// Cancels every task and waits for in-flight ticks, aborting whatever is
    /// still running once the grace period is over.
    pub(crate) async fn shutdown(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        self.cancel.cancel();
        let deadline = Instant::now() + self.grace;
        let mut aborted = 0usize;

        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                task.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            log::warn!("{} polling task(s) did not finish within {:?} and were aborted", aborted, self.grace);
        }
        // fresh token for the next start
        self.cancel = CancellationToken::new();
    }
}

impl Drop for PollerSet {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}
