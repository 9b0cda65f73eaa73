//! First-error-wins task group
//!
//! Every task runs on its own tokio task. The first task to fail records its
//! error and cancels the group token; later failures, including the
//! cancellation echoes of the first one, are dropped. An echo that lands
//! before the failure it echoes (a stage seeing a closed channel on another
//! thread) is replaced by that failure. [`TaskGroup::wait`] joins every task
//! before returning.

use crate::error::MigrationError;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub(crate) struct TaskGroup {
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    first_error: Arc<Mutex<Option<MigrationError>>>,
}

impl TaskGroup {
    /// Create a group whose token is a child of `parent`
    pub(crate) fn new(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel: parent.child_token(),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Shared cancellation token of the group
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a task in the group
    pub(crate) fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), MigrationError>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let first_error = Arc::clone(&self.first_error);
        self.tasks.spawn(async move {
            if let Err(err) = task.await {
                fail(&first_error, &cancel, err);
            }
        });
    }

    /// Join every task and return the first error, if any
    pub(crate) async fn wait(mut self) -> Result<(), MigrationError> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(join_err) = joined {
                fail(
                    &self.first_error,
                    &self.cancel,
                    MigrationError::TaskPanicked(join_err.to_string()),
                );
            }
        }
        match self.first_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn fail(slot: &Mutex<Option<MigrationError>>, cancel: &CancellationToken, err: MigrationError) {
    {
        let mut slot = slot.lock();
        let replace = match slot.as_ref() {
            None => true,
            Some(held) => held.is_cancellation() && !err.is_cancellation(),
        };
        if replace {
            *slot = Some(err);
        }
    }
    cancel.cancel();
}
