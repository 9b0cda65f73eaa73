//! Loading run configuration from TOML files
//!
//! Run with: cargo test --package stm-migration --test config_file

use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use stm_migration::{CancellationToken, ConfigError, MigrationConfig, NullLogger, StateTreeMigrator};
use stm_state::{ActorsVersion, ChainEpoch};
use stm_test_utils::{memory_store, nil_registry, synthetic_actors, write_tree};

fn config_file(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn loads_partial_file_over_defaults() {
    let file = config_file("max_workers = 2\nprogress_log_period_ms = 1500\n");
    let config = MigrationConfig::load(file.path()).unwrap();

    let defaults = MigrationConfig::default();
    assert_eq!(config.max_workers, 2);
    assert_eq!(config.job_queue_size, defaults.job_queue_size);
    assert_eq!(config.result_queue_size, defaults.result_queue_size);
    assert_eq!(config.progress_log_period, Duration::from_millis(1500));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = MigrationConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[tokio::test]
async fn loaded_config_drives_a_run() {
    let file = config_file("max_workers = 3\njob_queue_size = 0\nresult_queue_size = 0\n");
    let config = MigrationConfig::load(file.path()).unwrap();

    let store = memory_store();
    let root = write_tree(&store, ActorsVersion::V2, &synthetic_actors(40));
    let migrator = StateTreeMigrator::new(Arc::clone(&store), nil_registry())
        .with_logger(Arc::new(NullLogger));

    let from_file = migrator
        .clone()
        .with_config(config)
        .migrate(&CancellationToken::new(), root, ChainEpoch(0))
        .await
        .unwrap();
    let from_defaults = migrator
        .migrate(&CancellationToken::new(), root, ChainEpoch(0))
        .await
        .unwrap();
    assert_eq!(from_file, from_defaults);
}

#[test]
fn zero_workers_in_file_fails_validation() {
    let file = config_file("max_workers = 0\n");
    let config = MigrationConfig::load(file.path()).unwrap();
    assert_eq!(config.validate(), Err(ConfigError::InvalidWorkers(0)));
}

#[tokio::test]
async fn huge_queue_sizes_still_complete() {
    let file = config_file(&format!(
        "max_workers = 2\njob_queue_size = {max}\nresult_queue_size = {max}\n",
        max = i64::MAX
    ));
    let from_file = MigrationConfig::load(file.path()).unwrap();
    assert!(from_file.validate().is_ok());

    let store = memory_store();
    let root = write_tree(&store, ActorsVersion::V2, &synthetic_actors(25));
    let migrator = StateTreeMigrator::new(Arc::clone(&store), nil_registry())
        .with_logger(Arc::new(NullLogger));
    let baseline = migrator
        .migrate(&CancellationToken::new(), root, ChainEpoch(0))
        .await
        .unwrap();

    for config in [
        from_file,
        MigrationConfig::new()
            .with_max_workers(2)
            .with_job_queue_size(usize::MAX)
            .with_result_queue_size(usize::MAX),
    ] {
        let migrated = migrator
            .clone()
            .with_config(config)
            .migrate(&CancellationToken::new(), root, ChainEpoch(0))
            .await
            .unwrap();
        assert_eq!(migrated, baseline);
    }
}
