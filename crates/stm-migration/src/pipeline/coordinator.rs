//! Completion coordinator
//!
//! Holds the last result sender. Once every worker has returned it drops
//! the sender, which closes the result queue, and signals the progress
//! monitor.

use super::JobResult;
use crate::error::MigrationError;
use crate::logger::Logger;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub(crate) struct CompletionCoordinator {
    pub(crate) workers: TaskTracker,
    pub(crate) results: mpsc::Sender<JobResult>,
    pub(crate) workers_finished: CancellationToken,
    pub(crate) log: Arc<dyn Logger>,
}

impl CompletionCoordinator {
    pub(crate) async fn run(self) -> Result<(), MigrationError> {
        let started = Instant::now();
        self.workers.close();
        self.workers.wait().await;

        drop(self.results);
        self.workers_finished.cancel();
        self.log.info(format_args!(
            "All workers done after {:?}",
            started.elapsed()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NullLogger;
    use std::time::Duration;

    #[tokio::test]
    async fn closes_results_after_last_worker() {
        let tracker = TaskTracker::new();
        let (tx, mut rx) = mpsc::channel::<JobResult>(4);
        let finished = CancellationToken::new();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let worker_tx = tx.clone();
        tracker.spawn(async move {
            let _ = release_rx.await;
            drop(worker_tx);
        });

        let handle = tokio::spawn(
            CompletionCoordinator {
                workers: tracker,
                results: tx,
                workers_finished: finished.clone(),
                log: Arc::new(NullLogger),
            }
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!finished.is_cancelled());
        assert!(rx.try_recv().is_err());

        release_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(finished.is_cancelled());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn no_workers_finishes_immediately() {
        let (tx, mut rx) = mpsc::channel::<JobResult>(1);
        let finished = CancellationToken::new();
        CompletionCoordinator {
            workers: TaskTracker::new(),
            results: tx,
            workers_finished: finished.clone(),
            log: Arc::new(NullLogger),
        }
        .run()
        .await
        .unwrap();

        assert!(finished.is_cancelled());
        assert!(rx.recv().await.is_none());
    }
}
