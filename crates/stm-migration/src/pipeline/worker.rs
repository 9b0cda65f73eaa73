//! Migration workers
//!
//! Each worker pulls jobs from the shared job queue until it is closed and
//! drained, runs the job's migration and publishes the result. A failed
//! migration stops the worker and fails the run; there is no retry. An
//! in-flight migration is dropped when the run is cancelled.

use super::{Job, JobResult};
use crate::error::MigrationError;
use crate::logger::Logger;
use crate::progress::MigrationProgress;
use crate::registry::StateMigrationInput;
use std::sync::Arc;
use stm_state::{actor_name_by_code, ActorRecord, Blockstore, ChainEpoch};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Receiving end of the job queue, shared by every worker
pub(crate) type SharedJobs = Arc<Mutex<mpsc::Receiver<Job>>>;

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) jobs: SharedJobs,
    pub(crate) results: mpsc::Sender<JobResult>,
    pub(crate) store: Arc<dyn Blockstore>,
    pub(crate) prior_epoch: ChainEpoch,
    pub(crate) progress: Arc<MigrationProgress>,
    pub(crate) cancel: CancellationToken,
    pub(crate) log: Arc<dyn Logger>,
}

impl Worker {
    pub(crate) async fn run(self) -> Result<(), MigrationError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(MigrationError::Cancelled),
                job = next_job(&self.jobs) => job,
            };
            let Some(job) = next else { break };

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(MigrationError::Cancelled),
                result = migrate_one_actor(&*self.store, job, self.prior_epoch) => result?,
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(MigrationError::Cancelled),
                sent = self.results.send(result) => sent.map_err(|_| MigrationError::Cancelled)?,
            }
            self.progress.job_done();
        }
        self.log.info(format_args!("Worker {} done", self.id));
        Ok(())
    }
}

async fn next_job(jobs: &SharedJobs) -> Option<Job> {
    jobs.lock().await.recv().await
}

/// Run one job's migration and build the output record
///
/// Balance and call sequence number are carried over unchanged.
pub(crate) async fn migrate_one_actor(
    store: &dyn Blockstore,
    job: Job,
    prior_epoch: ChainEpoch,
) -> Result<JobResult, MigrationError> {
    let Job {
        address,
        actor,
        migration,
    } = job;
    let migrated = migration
        .migrate_state(
            store,
            StateMigrationInput {
                address,
                balance: actor.balance,
                head: actor.head,
                prior_epoch,
            },
        )
        .await
        .map_err(|err| MigrationError::StateMigration {
            actor: actor_name_by_code(&actor.code),
            address,
            source: err.into(),
        })?;

    Ok(JobResult {
        address,
        actor: ActorRecord {
            code: migrated.new_code_cid,
            head: migrated.new_head,
            call_seq_num: actor.call_seq_num,
            balance: actor.balance,
        },
    })
}
