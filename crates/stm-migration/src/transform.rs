//! Closure-backed state migration
//!
//! [`TransformMigrator`] decodes an actor's head as JSON, hands it to a
//! transform function, stores the returned state and reports it under a
//! fixed new code.

use crate::registry::{StateMigration, StateMigrationInput, StateMigrationResult};
use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use stm_state::{Blockstore, BlockstoreExt, Cid};

/// Signature of a state transform
pub type StateTransform =
    dyn Fn(Value, &StateMigrationInput) -> anyhow::Result<Value> + Send + Sync + 'static;

/// Migration built from a state transform
pub struct TransformMigrator {
    out_code: Cid,
    transform: Box<StateTransform>,
}

impl fmt::Debug for TransformMigrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformMigrator")
            .field("out_code", &self.out_code)
            .finish_non_exhaustive()
    }
}

impl TransformMigrator {
    /// Create a migrator producing `out_code`
    pub fn new<F>(out_code: Cid, transform: F) -> Self
    where
        F: Fn(Value, &StateMigrationInput) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            out_code,
            transform: Box::new(transform),
        }
    }
}

#[async_trait]
impl StateMigration for TransformMigrator {
    async fn migrate_state(
        &self,
        store: &dyn Blockstore,
        input: StateMigrationInput,
    ) -> anyhow::Result<StateMigrationResult> {
        let state: Value = store
            .get_obj(&input.head)
            .with_context(|| format!("loading state {}", input.head))?;
        let migrated = (self.transform)(state, &input)?;
        let new_head = store
            .put_obj(&migrated)
            .context("storing migrated state")?;
        Ok(StateMigrationResult {
            new_code_cid: self.out_code,
            new_head,
        })
    }
}
