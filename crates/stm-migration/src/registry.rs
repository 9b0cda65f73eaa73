//! Migration registry
//!
//! Maps each prior-version actor code to the [`StateMigration`] that
//! rewrites it, plus the set of codes deferred from the main pass. Built
//! once by the caller and read-only for the duration of a run.

use crate::error::RegistryError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use stm_state::{
    actor_name_by_code, builtin, ActorsVersion, Address, Blockstore, ChainEpoch, Cid, TokenAmount,
};

/// Input to a single actor's state migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMigrationInput {
    /// Actor address
    pub address: Address,
    /// Actor balance
    pub balance: TokenAmount,
    /// Actor state head
    pub head: Cid,
    /// Epoch of the last state transition prior to migration
    pub prior_epoch: ChainEpoch,
}

/// Output of a single actor's state migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMigrationResult {
    /// Code of the actor in the new version
    pub new_code_cid: Cid,
    /// New state head
    pub new_head: Cid,
}

/// Per-code state transformation
///
/// Loads an actor's state from the store and writes the new state back to
/// it. Called concurrently from many workers; the store must tolerate
/// concurrent writes even with a single worker configured.
#[async_trait]
pub trait StateMigration: Send + Sync {
    /// Migrate one actor's state
    async fn migrate_state(
        &self,
        store: &dyn Blockstore,
        input: StateMigrationInput,
    ) -> anyhow::Result<StateMigrationResult>;
}

/// Migration that keeps the head and swaps in a fixed code
///
/// For actors whose state representation is unchanged across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NilMigrator {
    /// Code assigned to every migrated actor
    pub out_code: Cid,
}

impl NilMigrator {
    #[inline]
    #[must_use]
    pub fn new(out_code: Cid) -> Self {
        Self { out_code }
    }
}

#[async_trait]
impl StateMigration for NilMigrator {
    async fn migrate_state(
        &self,
        _store: &dyn Blockstore,
        input: StateMigrationInput,
    ) -> anyhow::Result<StateMigrationResult> {
        Ok(StateMigrationResult {
            new_code_cid: self.out_code,
            new_head: input.head,
        })
    }
}

/// Immutable code classification used by a run
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    migrations: HashMap<Cid, Arc<dyn StateMigration>>,
    deferred: HashSet<Cid>,
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("migrations", &self.migrations.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

impl MigrationRegistry {
    /// Start building a registry
    #[inline]
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Check whether a code is deferred from the main pass
    #[inline]
    #[must_use]
    pub fn is_deferred(&self, code: &Cid) -> bool {
        self.deferred.contains(code)
    }

    /// Migration registered for a code
    #[inline]
    #[must_use]
    pub fn get(&self, code: &Cid) -> Option<&Arc<dyn StateMigration>> {
        self.migrations.get(code)
    }

    /// Resolve the migration for a live, non-deferred code
    ///
    /// # Errors
    /// Returns [`RegistryError::Unregistered`] if the code is not mapped
    pub fn resolve(&self, code: &Cid) -> Result<Arc<dyn StateMigration>, RegistryError> {
        self.migrations
            .get(code)
            .cloned()
            .ok_or_else(|| RegistryError::Unregistered {
                actor: actor_name_by_code(code),
                code: *code,
            })
    }

    /// Deferred codes
    pub fn deferred(&self) -> impl Iterator<Item = &Cid> {
        self.deferred.iter()
    }

    /// Number of mapped codes
    #[inline]
    #[must_use]
    pub fn migration_count(&self) -> usize {
        self.migrations.len()
    }
}

/// Builder for [`MigrationRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    migrations: HashMap<Cid, Arc<dyn StateMigration>>,
    deferred: HashSet<Cid>,
}

impl RegistryBuilder {
    /// Map a code to a migration
    #[must_use]
    pub fn migrate(mut self, from: Cid, migration: Arc<dyn StateMigration>) -> Self {
        self.migrations.insert(from, migration);
        self
    }

    /// Map a code to a [`NilMigrator`] producing `to`
    #[must_use]
    pub fn nil(self, from: Cid, to: Cid) -> Self {
        self.migrate(from, Arc::new(NilMigrator::new(to)))
    }

    /// Defer a code for explicit migration after the main pass
    #[must_use]
    pub fn defer(mut self, from: Cid) -> Self {
        self.deferred.insert(from);
        self
    }

    /// Finish, asserting mapped ∪ deferred is exactly `expected`
    ///
    /// # Errors
    /// Returns [`RegistryError::Overlap`] if a code is both mapped and
    /// deferred, or [`RegistryError::Incomplete`] if the classification does
    /// not match the expected set
    pub fn build(
        self,
        expected: impl IntoIterator<Item = Cid>,
    ) -> Result<MigrationRegistry, RegistryError> {
        if let Some(code) = self
            .deferred
            .iter()
            .find(|code| self.migrations.contains_key(code))
        {
            return Err(RegistryError::Overlap(*code));
        }

        let expected: HashSet<Cid> = expected.into_iter().collect();
        let classified: HashSet<Cid> = self
            .migrations
            .keys()
            .chain(self.deferred.iter())
            .copied()
            .collect();

        let mut missing: Vec<Cid> = expected.difference(&classified).copied().collect();
        let mut unexpected: Vec<Cid> = classified.difference(&expected).copied().collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            missing.sort_unstable();
            unexpected.sort_unstable();
            return Err(RegistryError::Incomplete {
                mapped: self.migrations.len(),
                missing,
                unexpected,
            });
        }

        Ok(MigrationRegistry {
            migrations: self.migrations,
            deferred: self.deferred,
        })
    }

    /// Finish against the builtin code set of `version`
    ///
    /// # Errors
    /// See [`build`](Self::build)
    pub fn build_for(self, version: ActorsVersion) -> Result<MigrationRegistry, RegistryError> {
        self.build(builtin::codes(version))
    }
}
