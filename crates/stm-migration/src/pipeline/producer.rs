//! Job producer
//!
//! Walks the input tree in its native order and publishes one job per
//! non-deferred actor. Owns the only job sender, so returning closes the
//! job queue exactly once.

use super::Job;
use crate::error::MigrationError;
use crate::logger::Logger;
use crate::progress::MigrationProgress;
use crate::registry::MigrationRegistry;
use std::sync::Arc;
use stm_state::{Cid, StateTree};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) struct JobProducer {
    pub(crate) tree: StateTree,
    pub(crate) root: Cid,
    pub(crate) registry: Arc<MigrationRegistry>,
    pub(crate) jobs: mpsc::Sender<Job>,
    pub(crate) progress: Arc<MigrationProgress>,
    pub(crate) cancel: CancellationToken,
    pub(crate) log: Arc<dyn Logger>,
}

impl JobProducer {
    pub(crate) async fn run(self) -> Result<(), MigrationError> {
        let Self {
            tree,
            root,
            registry,
            jobs,
            progress,
            cancel,
            log,
        } = self;
        log.info(format_args!("Creating migration jobs for tree {root}"));

        let (registry, jobs, progress, cancel) = (&*registry, &jobs, &*progress, &cancel);
        tree.for_each(move |address, actor| async move {
            if registry.is_deferred(&actor.code) {
                return Ok(());
            }
            let job = Job {
                address,
                actor,
                migration: registry.resolve(&actor.code)?,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MigrationError::Cancelled),
                sent = jobs.send(job) => sent.map_err(|_| MigrationError::Cancelled)?,
            }
            progress.job_created();
            Ok::<(), MigrationError>(())
        })
        .await?;

        log.info(format_args!(
            "Done creating {} migration jobs for tree {root} after {:?}",
            progress.jobs_created(),
            progress.elapsed()
        ));
        Ok(())
    }
}
