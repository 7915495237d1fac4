//! Graceful shutdown
//!
//! One cancellation token fans out to every subscription task. Cancelling
//! stops intake; each task finishes and settles the delivery it holds, then
//! exits. The coordinator waits for all of them, bounded by an optional
//! drain timeout.

use parking_lot::Mutex;
use shared::Topic;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use shared::signal::shutdown_signal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainReport {
    /// Every subscription task exited on its own.
    Clean,
    /// The drain timeout fired and these tasks were aborted mid-delivery.
    Forced { aborted: Vec<Topic> },
}

pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
    drain_timeout: Option<Duration>,
    tasks: Mutex<Vec<(Topic, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    /// `None` waits for in-flight work however long it takes.
    pub fn new(drain_timeout: Option<Duration>) -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            drain_timeout,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Subscription tasks still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    pub(crate) fn spawn<F>(&self, topic: Topic, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.tracker.spawn(task);
        tracing::debug!(topic = %topic, "Registered subscription task");
        self.tasks.lock().push((topic, handle));
    }

    /// Wait for `signal`, then drain.
    pub async fn run<S>(&self, signal: S) -> DrainReport
    where
        S: Future<Output = ()>,
    {
        signal.await;
        self.shutdown().await
    }

    /// Stop intake and wait for every subscription task to finish.
    pub async fn shutdown(&self) -> DrainReport {
        tracing::info!(active = self.active(), "Stopping consumers");
        self.token.cancel();
        self.tracker.close();

        let Some(limit) = self.drain_timeout else {
            self.tracker.wait().await;
            tracing::info!("All consumers drained");
            return DrainReport::Clean;
        };

        if tokio::time::timeout(limit, self.tracker.wait()).await.is_ok() {
            tracing::info!("All consumers drained");
            return DrainReport::Clean;
        }

        let aborted: Vec<Topic> = self
            .tasks
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(topic, handle)| {
                handle.abort();
                *topic
            })
            .collect();

        tracing::error!(
            timeout = ?limit,
            topics = ?aborted,
            "Drain timeout exceeded; aborting consumers, their in-flight commands are lost"
        );
        self.tracker.wait().await;
        DrainReport::Forced { aborted }
    }
}
