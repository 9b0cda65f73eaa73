//! Migration pipeline stages
//!
//! Data flows one way: input tree → job queue → workers → result queue →
//! output tree. Failure flows the other way through the shared
//! cancellation token; every blocking queue operation races it.

use crate::registry::StateMigration;
use std::fmt;
use std::sync::Arc;
use stm_state::{ActorRecord, Address};

pub(crate) mod coordinator;
pub(crate) mod producer;
pub(crate) mod worker;
pub(crate) mod writer;

/// One actor to migrate, with its migration resolved up front
pub(crate) struct Job {
    pub(crate) address: Address,
    pub(crate) actor: ActorRecord,
    pub(crate) migration: Arc<dyn StateMigration>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("address", &self.address)
            .field("actor", &self.actor)
            .finish_non_exhaustive()
    }
}

/// A migrated actor ready to be written to the output tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JobResult {
    pub(crate) address: Address,
    pub(crate) actor: ActorRecord,
}
