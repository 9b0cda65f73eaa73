//! State tree migration orchestrator
//!
//! Wires the pipeline stages together for one run:
//!
//! ```text
//! producer ──jobs──▶ worker × N ──results──▶ writer ──▶ flush
//!                         │
//!                     coordinator (closes results, stops monitor)
//! ```
//!
//! All stages share one cancellation token. The first stage to fail cancels
//! it, every other stage unblocks with a cancellation error, and the run
//! surfaces the first failure only.

use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::logger::{Logger, TracingLogger};
use crate::pipeline::coordinator::CompletionCoordinator;
use crate::pipeline::producer::JobProducer;
use crate::pipeline::worker::Worker;
use crate::pipeline::writer::{ResultWriter, WrittenTree};
use crate::progress::{join_monitor, per_second, spawn_monitor, MigrationProgress};
use crate::registry::MigrationRegistry;
use crate::task_group::TaskGroup;
use std::fmt;
use std::sync::Arc;
use stm_state::{Blockstore, ChainEpoch, Cid, StateTree};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Reusable migration entry point
///
/// # Example
///
/// ```rust,ignore
/// let migrator = StateTreeMigrator::new(store, registry)
///     .with_config(MigrationConfig::new().with_max_workers(8));
/// let new_root = migrator.migrate(&cancel, old_root, ChainEpoch(1000)).await?;
/// ```
#[derive(Clone)]
pub struct StateTreeMigrator {
    store: Arc<dyn Blockstore>,
    registry: Arc<MigrationRegistry>,
    config: MigrationConfig,
    log: Arc<dyn Logger>,
}

impl fmt::Debug for StateTreeMigrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTreeMigrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StateTreeMigrator {
    /// Create a migrator with default config, logging through `tracing`
    #[must_use]
    pub fn new(store: Arc<dyn Blockstore>, registry: MigrationRegistry) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            config: MigrationConfig::default(),
            log: Arc::new(TracingLogger),
        }
    }

    /// With run configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// With a logging sink
    #[inline]
    #[must_use]
    pub fn with_logger(mut self, log: Arc<dyn Logger>) -> Self {
        self.log = log;
        self
    }

    /// Get config
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Migrate the tree at `root`, returning the new root
    ///
    /// # Errors
    /// See [`migrate_state_tree`]
    pub async fn migrate(
        &self,
        cancel: &CancellationToken,
        root: Cid,
        prior_epoch: ChainEpoch,
    ) -> Result<Cid, MigrationError> {
        migrate_state_tree(
            cancel,
            Arc::clone(&self.store),
            root,
            prior_epoch,
            Arc::clone(&self.registry),
            &self.config,
            Arc::clone(&self.log),
        )
        .await
    }
}

/// Migrate every actor of the tree at `root_in` into a new tree
///
/// Non-deferred actors are migrated through the registry; deferred ones are
/// left out for the caller to migrate explicitly. Only the new root is
/// written; the input tree is never modified.
///
/// # Errors
/// Returns the first failure of the run:
/// - [`MigrationError::Config`] for an invalid config, before any task starts
/// - [`MigrationError::Enumeration`] if the input tree cannot be read
/// - [`MigrationError::Registry`] for an actor code with no migration
/// - [`MigrationError::StateMigration`] if a migration fails
/// - [`MigrationError::Write`] if the output tree cannot be written
/// - [`MigrationError::Cancelled`] if `cancel` fires first
pub async fn migrate_state_tree(
    cancel: &CancellationToken,
    store: Arc<dyn Blockstore>,
    root_in: Cid,
    prior_epoch: ChainEpoch,
    registry: Arc<MigrationRegistry>,
    config: &MigrationConfig,
    log: Arc<dyn Logger>,
) -> Result<Cid, MigrationError> {
    config.validate()?;

    let progress = Arc::new(MigrationProgress::new());
    let input = StateTree::load(Arc::clone(&store), &root_in)?;
    let output = StateTree::new(Arc::clone(&store)).map_err(MigrationError::Write)?;

    let WrittenTree { mut tree, written } = Pipeline {
        store,
        registry: Arc::clone(&registry),
        config,
        prior_epoch,
        progress: Arc::clone(&progress),
        log: Arc::clone(&log),
    }
    .run(cancel, input, root_in, output)
    .await?;

    let deferred = registry.deferred().count();
    if deferred > 0 {
        log.info(format_args!(
            "Left {deferred} deferred actor codes for explicit migration"
        ));
    }

    let elapsed = progress.elapsed();
    log.info(format_args!(
        "All {written} done after {elapsed:?} ({:.0}/s). Flushing state tree root.",
        per_second(written, elapsed)
    ));
    let root_out = tree.flush().map_err(MigrationError::Write)?;
    log.debug(format_args!("Migrated state tree {root_in} to {root_out}"));
    Ok(root_out)
}

/// Stages of one run over already loaded trees
struct Pipeline<'a> {
    store: Arc<dyn Blockstore>,
    registry: Arc<MigrationRegistry>,
    config: &'a MigrationConfig,
    prior_epoch: ChainEpoch,
    progress: Arc<MigrationProgress>,
    log: Arc<dyn Logger>,
}

impl Pipeline<'_> {
    /// Migrate `input` into `output` and hand back the unflushed output
    async fn run(
        self,
        cancel: &CancellationToken,
        input: StateTree,
        root_in: Cid,
        output: StateTree,
    ) -> Result<WrittenTree, MigrationError> {
        let Self {
            store,
            registry,
            config,
            prior_epoch,
            progress,
            log,
        } = self;

        let (job_tx, job_rx) = mpsc::channel(config.job_channel_capacity());
        let (result_tx, result_rx) = mpsc::channel(config.result_channel_capacity());
        let (done_tx, done_rx) = oneshot::channel::<WrittenTree>();
        let workers_finished = CancellationToken::new();

        let mut group = TaskGroup::new(cancel);
        let token = group.token();

        group.spawn(
            JobProducer {
                tree: input,
                root: root_in,
                registry,
                jobs: job_tx,
                progress: Arc::clone(&progress),
                cancel: token.clone(),
                log: Arc::clone(&log),
            }
            .run(),
        );

        let jobs = Arc::new(Mutex::new(job_rx));
        let workers = TaskTracker::new();
        for id in 0..config.max_workers {
            group.spawn(
                workers.track_future(
                    Worker {
                        id,
                        jobs: Arc::clone(&jobs),
                        results: result_tx.clone(),
                        store: Arc::clone(&store),
                        prior_epoch,
                        progress: Arc::clone(&progress),
                        cancel: token.clone(),
                        log: Arc::clone(&log),
                    }
                    .run(),
                ),
            );
        }
        drop(jobs);
        log.info(format_args!("Started {} workers", config.max_workers));

        group.spawn(
            CompletionCoordinator {
                workers,
                results: result_tx,
                workers_finished: workers_finished.clone(),
                log: Arc::clone(&log),
            }
            .run(),
        );
        group.spawn(
            ResultWriter {
                tree: output,
                results: result_rx,
                done: done_tx,
                cancel: token.clone(),
                log: Arc::clone(&log),
            }
            .run(),
        );

        let monitor = spawn_monitor(
            config.progress_log_period,
            progress,
            workers_finished.clone(),
            token,
            Arc::clone(&log),
        );

        let outcome = group.wait().await;
        workers_finished.cancel();
        join_monitor(monitor, &*log).await;
        outcome?;

        done_rx.await.map_err(|_| MigrationError::Cancelled)
    }
}
