//! Result writer
//!
//! The only task that touches the output tree. It drains the result queue
//! until the coordinator closes it and hands the tree back through a
//! oneshot so the orchestrator can flush it.

use super::JobResult;
use crate::error::MigrationError;
use crate::logger::Logger;
use std::sync::Arc;
use std::time::Instant;
use stm_state::StateTree;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Output of a finished writer
#[derive(Debug)]
pub(crate) struct WrittenTree {
    pub(crate) tree: StateTree,
    pub(crate) written: u64,
}

pub(crate) struct ResultWriter {
    pub(crate) tree: StateTree,
    pub(crate) results: mpsc::Receiver<JobResult>,
    pub(crate) done: oneshot::Sender<WrittenTree>,
    pub(crate) cancel: CancellationToken,
    pub(crate) log: Arc<dyn Logger>,
}

impl ResultWriter {
    pub(crate) async fn run(self) -> Result<(), MigrationError> {
        let Self {
            mut tree,
            mut results,
            done,
            cancel,
            log,
        } = self;
        let started = Instant::now();
        let mut written = 0u64;
        log.info(format_args!("Result writer started"));

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MigrationError::Cancelled),
                next = results.recv() => next,
            };
            let Some(JobResult { address, actor }) = next else { break };
            tree.set_actor(address, actor).map_err(MigrationError::Write)?;
            written += 1;
        }

        log.info(format_args!(
            "Result writer wrote {written} results to state tree after {:?}",
            started.elapsed()
        ));
        // The receiver only goes away when the orchestrator has already failed.
        let _ = done.send(WrittenTree { tree, written });
        Ok(())
    }
}
