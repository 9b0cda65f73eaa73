//! Testing utilities for the state tree migration workspace
//!
//! Tree fixtures, instrumented migrations and stores, and a capturing
//! logger.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stm_migration::{
    LogLevel, Logger, MigrationRegistry, RegistryBuilder, StateMigration, StateMigrationInput,
    StateMigrationResult, TransformMigrator,
};
use stm_state::{
    ActorKind, ActorRecord, ActorsVersion, Address, Blockstore, BlockstoreExt, Cid,
    MemoryBlockstore, StateTree, StoreError, TokenAmount,
};

// ---------------------------------------------------------------------------
// Fixtures

/// One actor to seed into a fixture tree
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureActor {
    pub address: Address,
    pub kind: ActorKind,
    pub state: Value,
    pub call_seq_num: u64,
    pub balance: TokenAmount,
}

/// Actor with a small JSON state whose `value` field equals its id
pub fn fixture_actor(id: u64, kind: ActorKind) -> FixtureActor {
    FixtureActor {
        address: Address::new_id(id),
        kind,
        state: json!({ "id": id, "value": id }),
        call_seq_num: id % 7,
        balance: TokenAmount::from_atto(u128::from(id) * 1_000),
    }
}

/// `count` actors with ids from 100, cycling through every builtin kind
pub fn synthetic_actors(count: usize) -> Vec<FixtureActor> {
    (0..count)
        .map(|i| fixture_actor(100 + i as u64, ActorKind::ALL[i % ActorKind::ALL.len()]))
        .collect()
}

pub fn memory_store() -> Arc<dyn Blockstore> {
    Arc::new(MemoryBlockstore::new())
}

/// Store every actor state and write the tree, using `version` codes
pub fn write_tree(
    store: &Arc<dyn Blockstore>,
    version: ActorsVersion,
    actors: &[FixtureActor],
) -> Cid {
    let mut tree = StateTree::new(Arc::clone(store)).unwrap();
    for actor in actors {
        let head = store.put_obj(&actor.state).unwrap();
        tree.set_actor(
            actor.address,
            ActorRecord::new(actor.kind.code(version), head, actor.call_seq_num, actor.balance),
        )
        .unwrap();
    }
    tree.flush().unwrap()
}

/// Read every record of the tree at `root`
pub async fn read_tree(store: &Arc<dyn Blockstore>, root: &Cid) -> BTreeMap<Address, ActorRecord> {
    let tree = StateTree::load(Arc::clone(store), root).unwrap();
    let mut records = BTreeMap::new();
    tree.for_each(|address, record| {
        records.insert(address, record);
        async { Ok::<(), StoreError>(()) }
    })
    .await
    .unwrap();
    records
}

/// Load the JSON state stored at `head`
pub fn read_state(store: &Arc<dyn Blockstore>, head: &Cid) -> Value {
    store.get_obj(head).unwrap()
}

// ---------------------------------------------------------------------------
// Registries

/// V2 → V3 registry mapping every kind except `except` to a nil migration
pub fn nil_registry_except(except: &[ActorKind]) -> RegistryBuilder {
    ActorKind::ALL
        .into_iter()
        .filter(|kind| !except.contains(kind))
        .fold(MigrationRegistry::builder(), |builder, kind| {
            builder.nil(kind.code(ActorsVersion::V2), kind.code(ActorsVersion::V3))
        })
}

/// V2 → V3 registry of nil migrations for every kind
pub fn nil_registry() -> MigrationRegistry {
    nil_registry_except(&[]).build_for(ActorsVersion::V2).unwrap()
}

/// Migration to the V3 code of `kind` that doubles the state's `value`
pub fn doubling_migrator(kind: ActorKind) -> TransformMigrator {
    TransformMigrator::new(kind.code(ActorsVersion::V3), |mut state, _input| {
        let value = state["value"]
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("state has no numeric value"))?;
        state["value"] = json!(value * 2);
        Ok(state)
    })
}

// ---------------------------------------------------------------------------
// Instrumented migrations

/// Migration that always fails
#[derive(Debug, Clone)]
pub struct FailingMigrator {
    pub message: String,
}

impl FailingMigrator {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl StateMigration for FailingMigrator {
    async fn migrate_state(
        &self,
        _store: &dyn Blockstore,
        _input: StateMigrationInput,
    ) -> anyhow::Result<StateMigrationResult> {
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// Wraps a migration, sleeping before each call
pub struct SlowMigrator {
    pub delay: Duration,
    pub inner: Arc<dyn StateMigration>,
}

impl fmt::Debug for SlowMigrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlowMigrator")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StateMigration for SlowMigrator {
    async fn migrate_state(
        &self,
        store: &dyn Blockstore,
        input: StateMigrationInput,
    ) -> anyhow::Result<StateMigrationResult> {
        tokio::time::sleep(self.delay).await;
        self.inner.migrate_state(store, input).await
    }
}

/// Wraps a migration, counting calls per address
pub struct CountingMigrator {
    pub inner: Arc<dyn StateMigration>,
    calls: Mutex<HashMap<Address, u32>>,
}

impl CountingMigrator {
    pub fn new(inner: Arc<dyn StateMigration>) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> HashMap<Address, u32> {
        self.calls.lock().clone()
    }
}

impl fmt::Debug for CountingMigrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingMigrator")
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StateMigration for CountingMigrator {
    async fn migrate_state(
        &self,
        store: &dyn Blockstore,
        input: StateMigrationInput,
    ) -> anyhow::Result<StateMigrationResult> {
        *self.calls.lock().entry(input.address).or_default() += 1;
        self.inner.migrate_state(store, input).await
    }
}

// ---------------------------------------------------------------------------
// Stores and loggers

/// In-memory store whose writes can be switched to fail
#[derive(Debug, Default)]
pub struct FailingBlockstore {
    inner: MemoryBlockstore,
    fail_puts: AtomicBool,
}

impl FailingBlockstore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

impl Blockstore for FailingBlockstore {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(cid)
    }

    fn put(&self, data: &[u8]) -> Result<Cid, StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.put(data)
    }
}

/// In-memory store whose reads block the calling thread for `delay`
#[derive(Debug, Default)]
pub struct SlowBlockstore {
    pub delay: Duration,
    pub inner: MemoryBlockstore,
}

impl Blockstore for SlowBlockstore {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        std::thread::sleep(self.delay);
        self.inner.get(cid)
    }

    fn put(&self, data: &[u8]) -> Result<Cid, StoreError> {
        self.inner.put(data)
    }
}

/// Logger that keeps every message
#[derive(Debug, Default)]
pub struct CaptureLogger {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl CaptureLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    /// Number of messages containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|(_, line)| line.contains(needle))
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.count_containing(needle) > 0
    }
}

impl Logger for CaptureLogger {
    fn log(&self, level: LogLevel, message: fmt::Arguments<'_>) {
        self.lines.lock().push((level, message.to_string()));
    }
}
