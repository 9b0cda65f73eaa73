//! Migration simulator
//!
//! Builds a seeded synthetic V2 state tree in memory, migrates it to V3 and
//! checks the output against the input:
//! - every non-deferred address is present, and nothing else
//! - balance and call sequence number are copied unchanged
//! - nil-migrated actors keep their head
//! - optionally, a single-worker rerun produces the same root

use anyhow::Context as _;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stm_migration::{
    per_second, CancellationToken, Logger, MigrationConfig, MigrationRegistry, StateTreeMigrator,
    TransformMigrator,
};
use stm_state::{
    ActorKind, ActorRecord, ActorsVersion, Address, Blockstore, BlockstoreExt, ChainEpoch, Cid,
    MemoryBlockstore, StateTree, StoreError, TokenAmount,
};

/// Kinds whose state layout is unchanged between V2 and V3
pub const NIL_KINDS: [ActorKind; 4] = [
    ActorKind::Account,
    ActorKind::Cron,
    ActorKind::Reward,
    ActorKind::System,
];

/// First id handed out to synthetic actors
const FIRST_ACTOR_ID: u64 = 100;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of synthetic actors
    pub actors: u64,
    /// Epoch passed to every state migration
    pub prior_epoch: ChainEpoch,
    /// Pipeline configuration
    pub migration: MigrationConfig,
    /// Rerun with one worker and compare roots
    pub check_determinism: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            actors: 10_000,
            prior_epoch: ChainEpoch(1_000),
            migration: MigrationConfig::default(),
            check_determinism: false,
        }
    }
}

/// A mismatch between input and output trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Migrated actor absent from the output
    Missing { address: Address },
    /// Output holds an address that was not migrated
    Unexpected { address: Address },
    /// Balance or call sequence number changed
    NotCopied { address: Address },
    /// Code is not the V3 code of the input kind
    WrongCode { address: Address },
    /// Nil-migrated actor has a different head
    HeadChanged { address: Address },
    /// Single-worker rerun produced another root
    NonDeterministic { parallel: Cid, sequential: Cid },
}

/// Final report from the simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub root_in: Cid,
    pub root_out: Cid,
    pub migrated: usize,
    pub blocks: usize,
    pub elapsed: Duration,
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if the run passed every check
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== State Tree Migration Report ===\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Actors: {}", self.config.actors);
        let _ = writeln!(report, "Workers: {}", self.config.migration.max_workers);
        let _ = writeln!(
            report,
            "Queues: {} jobs, {} results",
            self.config.migration.job_queue_size, self.config.migration.result_queue_size
        );
        let _ = writeln!(report, "Input Root: {}", self.root_in);
        let _ = writeln!(report, "Output Root: {}", self.root_out);
        let _ = writeln!(report, "Migrated: {}", self.migrated);
        let _ = writeln!(report, "Blocks: {}", self.blocks);
        let _ = writeln!(
            report,
            "Elapsed: {:?} ({:.0} actors/s)",
            self.elapsed,
            per_second(self.migrated as u64, self.elapsed)
        );
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().take(20).enumerate() {
                let _ = writeln!(report, "{}. {:?}", i + 1, v);
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// V2 → V3 registry: nil for [`NIL_KINDS`], a state rewrite for the rest
///
/// # Errors
/// Returns error if the classification is incomplete
pub fn simulation_registry() -> anyhow::Result<MigrationRegistry> {
    let registry = ActorKind::ALL
        .into_iter()
        .fold(MigrationRegistry::builder(), |builder, kind| {
            let from = kind.code(ActorsVersion::V2);
            let to = kind.code(ActorsVersion::V3);
            if NIL_KINDS.contains(&kind) {
                builder.nil(from, to)
            } else {
                builder.migrate(from, Arc::new(TransformMigrator::new(to, upgrade_state)))
            }
        })
        .build_for(ActorsVersion::V2)?;
    Ok(registry)
}

/// Stamp the state with the new version and the migration epoch
fn upgrade_state(
    mut state: Value,
    input: &stm_migration::StateMigrationInput,
) -> anyhow::Result<Value> {
    let fields = state
        .as_object_mut()
        .context("actor state is not an object")?;
    fields.insert("version".into(), json!(ActorsVersion::V3.number()));
    fields.insert("migrated_at".into(), json!(input.prior_epoch.0));
    Ok(state)
}

/// Write `count` seeded actors to a new tree and return its root
///
/// # Errors
/// Returns error if the store rejects a write
pub fn generate_tree(store: &Arc<dyn Blockstore>, seed: u64, count: u64) -> Result<Cid, StoreError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tree = StateTree::new(Arc::clone(store))?;
    for i in 0..count {
        let id = FIRST_ACTOR_ID + i;
        let kind = ActorKind::ALL[rng.gen_range(0..ActorKind::ALL.len())];
        let state = json!({
            "version": ActorsVersion::V2.number(),
            "kind": kind.name(),
            "nonce": rng.gen::<u32>(),
        });
        let head = store.put_obj(&state)?;
        tree.set_actor(
            Address::new_id(id),
            ActorRecord::new(
                kind.code(ActorsVersion::V2),
                head,
                rng.gen_range(0..1_000),
                TokenAmount::from_atto(rng.gen_range(0..1_000_000_000_000u128)),
            ),
        )?;
    }
    tree.flush()
}

/// Run one simulated migration
///
/// # Errors
/// Returns error if the tree cannot be built or the migration fails
pub async fn run_simulator(
    config: SimulatorConfig,
    log: Arc<dyn Logger>,
) -> anyhow::Result<SimulatorReport> {
    let memory = Arc::new(MemoryBlockstore::new());
    let store: Arc<dyn Blockstore> = memory.clone();
    let root_in = generate_tree(&store, config.seed, config.actors)
        .context("failed to generate input tree")?;

    let migrator = StateTreeMigrator::new(Arc::clone(&store), simulation_registry()?)
        .with_config(config.migration.clone())
        .with_logger(log);
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let root_out = migrator
        .migrate(&cancel, root_in, config.prior_epoch)
        .await
        .context("migration failed")?;
    let elapsed = started.elapsed();

    let before = collect(&store, &root_in).await?;
    let after = collect(&store, &root_out).await?;
    let mut violations = check_trees(&before, &after);

    if config.check_determinism {
        let sequential = migrator
            .with_config(config.migration.clone().with_max_workers(1))
            .migrate(&cancel, root_in, config.prior_epoch)
            .await
            .context("sequential rerun failed")?;
        if sequential != root_out {
            violations.push(Violation::NonDeterministic {
                parallel: root_out,
                sequential,
            });
        }
    }

    Ok(SimulatorReport {
        config,
        root_in,
        root_out,
        migrated: after.len(),
        blocks: memory.len(),
        elapsed,
        violations,
    })
}

async fn collect(
    store: &Arc<dyn Blockstore>,
    root: &Cid,
) -> Result<BTreeMap<Address, ActorRecord>, StoreError> {
    let tree = StateTree::load(Arc::clone(store), root)?;
    let mut records = BTreeMap::new();
    tree.for_each(|address, record| {
        records.insert(address, record);
        async { Ok::<(), StoreError>(()) }
    })
    .await?;
    Ok(records)
}

/// Compare an input tree with its migrated output
#[must_use]
pub fn check_trees(
    before: &BTreeMap<Address, ActorRecord>,
    after: &BTreeMap<Address, ActorRecord>,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (address, old) in before {
        let Some(new) = after.get(address) else {
            violations.push(Violation::Missing { address: *address });
            continue;
        };
        if new.balance != old.balance || new.call_seq_num != old.call_seq_num {
            violations.push(Violation::NotCopied { address: *address });
        }
        let kind = stm_state::builtin::lookup(&old.code).map(|(_, kind)| kind);
        if kind.map(|k| k.code(ActorsVersion::V3)) != Some(new.code) {
            violations.push(Violation::WrongCode { address: *address });
        }
        if kind.is_some_and(|k| NIL_KINDS.contains(&k)) && new.head != old.head {
            violations.push(Violation::HeadChanged { address: *address });
        }
    }
    violations.extend(
        after
            .keys()
            .filter(|address| !before.contains_key(address))
            .map(|address| Violation::Unexpected { address: *address }),
    );
    violations
}
