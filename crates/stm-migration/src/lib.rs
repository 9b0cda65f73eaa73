//! Concurrent actor state tree migration
//!
//! Rewrites every actor of a state tree from one actors version to the next
//! through a bounded producer, worker pool and single writer pipeline, and
//! returns the root of the new tree.
//!
//! # Core Concepts
//!
//! - [`MigrationRegistry`]: classifies every input code as migrated or deferred
//! - [`StateMigration`]: per-code capability that rewrites one actor's state
//! - [`MigrationConfig`]: worker count, queue capacities, progress period
//! - [`StateTreeMigrator`]: runs one migration and returns the new root
//!
//! # Example
//!
//! ```rust,ignore
//! use stm_migration::{MigrationConfig, MigrationRegistry, StateTreeMigrator};
//! use stm_state::{ActorKind, ActorsVersion, ChainEpoch};
//!
//! let registry = ActorKind::ALL
//!     .into_iter()
//!     .fold(MigrationRegistry::builder(), |b, kind| {
//!         b.nil(kind.code(ActorsVersion::V2), kind.code(ActorsVersion::V3))
//!     })
//!     .build_for(ActorsVersion::V2)?;
//!
//! let new_root = StateTreeMigrator::new(store, registry)
//!     .with_config(MigrationConfig::new().with_max_workers(4))
//!     .migrate(&CancellationToken::new(), old_root, ChainEpoch(1000))
//!     .await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod error;
mod logger;
mod migrate;
mod pipeline;
mod progress;
mod registry;
mod task_group;
mod transform;

pub use config::MigrationConfig;
pub use error::{BoxError, ConfigError, MigrationError, RegistryError};
pub use logger::{LogLevel, Logger, NullLogger, TracingLogger};
pub use migrate::{migrate_state_tree, StateTreeMigrator};
pub use progress::{per_second, spawn_monitor, MigrationProgress, ProgressSnapshot};
pub use registry::{
    MigrationRegistry, NilMigrator, RegistryBuilder, StateMigration, StateMigrationInput,
    StateMigrationResult,
};
pub use transform::{StateTransform, TransformMigrator};

pub use tokio_util::sync::CancellationToken;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
