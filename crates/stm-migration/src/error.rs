//! Error types for state tree migration
//!
//! One top-level [`MigrationError`] is surfaced per run. It is always the
//! first failure observed by any pipeline task; failures caused by reacting
//! to that first one ([`MigrationError::Cancelled`]) are suppressed.

use stm_state::{Address, Cid, StoreError};

/// Boxed error produced by a state migration capability
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main migration error type
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Configuration rejected before any task started
    #[error("invalid migration config: {0}")]
    Config(#[from] ConfigError),

    /// Registry does not classify a code
    #[error("migration registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Input tree could not be loaded or walked
    #[error("failed to enumerate input state tree: {0}")]
    Enumeration(#[from] StoreError),

    /// A state migration capability failed for one actor
    #[error("state migration failed for {actor} actor, addr {address}: {source}")]
    StateMigration {
        /// Actor kind name of the input code
        actor: &'static str,
        /// Address of the failing actor
        address: Address,
        /// Underlying capability failure
        #[source]
        source: BoxError,
    },

    /// Output tree insertion or flush failed
    #[error("failed to write output state tree: {0}")]
    Write(#[source] StoreError),

    /// Run was cancelled
    #[error("migration cancelled")]
    Cancelled,

    /// A pipeline task panicked
    #[error("migration task panicked: {0}")]
    TaskPanicked(String),
}

impl MigrationError {
    /// Check if this is the cancellation class
    ///
    /// Cancellation errors are the echo of another task's failure or of the
    /// caller cancelling the run.
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Worker count must be positive
    #[error("invalid migration config with {0} workers")]
    InvalidWorkers(usize),

    /// Config file could not be read
    #[error("failed to read config {path}: {message}")]
    Io { path: String, message: String },

    /// Config text is not valid TOML for the schema
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Registry classification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Mapped and deferred codes do not cover exactly the expected set
    #[error(
        "incomplete migration registry with {mapped} code CIDs: {} missing, {} unexpected",
        .missing.len(),
        .unexpected.len()
    )]
    Incomplete {
        /// Number of mapped codes
        mapped: usize,
        /// Expected codes neither mapped nor deferred
        missing: Vec<Cid>,
        /// Classified codes outside the expected set
        unexpected: Vec<Cid>,
    },

    /// A code is both mapped and deferred
    #[error("code {0} is both migrated and deferred")]
    Overlap(Cid),

    /// A live, non-deferred code has no migration
    #[error("no migration registered for {actor} code {code}")]
    Unregistered {
        /// Actor kind name of the code
        actor: &'static str,
        /// The unclassified code
        code: Cid,
    },
}
