//! Lifecycle and progress log lines
//!
//! Run with: cargo test --package stm-migration --test logging

use std::sync::Arc;
use std::time::Duration;
use stm_migration::{
    CancellationToken, LogLevel, MigrationConfig, MigrationRegistry, NilMigrator,
    StateTreeMigrator,
};
use stm_state::{ActorKind, ActorsVersion, Blockstore, ChainEpoch};
use stm_test_utils::{
    memory_store, nil_registry, nil_registry_except, synthetic_actors, write_tree, CaptureLogger,
    SlowBlockstore, SlowMigrator,
};

/// Parse the `{:?}` duration out of an "All N done after ..." line
fn reported_elapsed(line: &str) -> Duration {
    let text = line
        .split("done after ")
        .nth(1)
        .and_then(|rest| rest.split(" (").next())
        .unwrap();
    let unit_at = text.find(|c: char| c.is_alphabetic()).unwrap();
    let (value, unit) = text.split_at(unit_at);
    let value: f64 = value.parse().unwrap();
    match unit {
        "s" => Duration::from_secs_f64(value),
        "ms" => Duration::from_secs_f64(value / 1e3),
        "µs" => Duration::from_secs_f64(value / 1e6),
        "ns" => Duration::from_secs_f64(value / 1e9),
        other => panic!("unexpected unit {other:?} in {line}"),
    }
}

#[tokio::test]
async fn lifecycle_messages_are_emitted() {
    let store = memory_store();
    let root = write_tree(&store, ActorsVersion::V2, &synthetic_actors(50));
    let log = CaptureLogger::new();

    StateTreeMigrator::new(Arc::clone(&store), nil_registry())
        .with_config(MigrationConfig::new().with_max_workers(3))
        .with_logger(log.clone())
        .migrate(&CancellationToken::new(), root, ChainEpoch(9))
        .await
        .unwrap();

    assert!(log.contains(&format!("Creating migration jobs for tree {root}")));
    assert!(log.contains("Done creating 50 migration jobs"));
    assert!(log.contains("Started 3 workers"));
    for id in 0..3 {
        assert!(log.contains(&format!("Worker {id} done")), "worker {id}");
    }
    assert!(log.contains("All workers done after"));
    assert!(log.contains("Result writer started"));
    assert!(log.contains("Result writer wrote 50 results"));
    assert!(log.contains("All 50 done after"));
    // Progress logging is off by default.
    assert_eq!(log.count_containing("jobs created"), 0);
}

#[tokio::test]
async fn deferred_codes_are_reported() {
    let store = memory_store();
    let root = write_tree(&store, ActorsVersion::V2, &synthetic_actors(22));
    let log = CaptureLogger::new();
    let registry = nil_registry_except(&[ActorKind::StorageMarket])
        .defer(ActorKind::StorageMarket.code(ActorsVersion::V2))
        .build_for(ActorsVersion::V2)
        .unwrap();

    StateTreeMigrator::new(Arc::clone(&store), registry)
        .with_logger(log.clone())
        .migrate(&CancellationToken::new(), root, ChainEpoch(9))
        .await
        .unwrap();

    assert!(log.contains("Done creating 20 migration jobs"));
    assert!(log.contains("Left 1 deferred actor codes"));
}

#[tokio::test(start_paused = true)]
async fn progress_is_logged_each_period() {
    let store = memory_store();
    let root = write_tree(&store, ActorsVersion::V2, &synthetic_actors(10));
    let log = CaptureLogger::new();
    let registry = ActorKind::ALL
        .into_iter()
        .fold(MigrationRegistry::builder(), |b, kind| {
            b.migrate(
                kind.code(ActorsVersion::V2),
                Arc::new(SlowMigrator {
                    delay: Duration::from_secs(1),
                    inner: Arc::new(NilMigrator::new(kind.code(ActorsVersion::V3))),
                }),
            )
        })
        .build_for(ActorsVersion::V2)
        .unwrap();

    StateTreeMigrator::new(Arc::clone(&store), registry)
        .with_config(
            MigrationConfig::new()
                .with_max_workers(1)
                .with_progress_log_period(Duration::from_secs(2)),
        )
        .with_logger(log.clone())
        .migrate(&CancellationToken::new(), root, ChainEpoch(9))
        .await
        .unwrap();

    let progress: Vec<String> = log
        .lines()
        .into_iter()
        .filter(|(level, line)| *level == LogLevel::Info && line.contains("jobs created"))
        .map(|(_, line)| line)
        .collect();
    assert!(progress.len() >= 3, "{progress:?}");
    assert!(progress.iter().all(|line| line.contains("pending after")));
    assert_eq!(log.count_containing("Job queue monitor done"), 1);
}

#[tokio::test]
async fn reported_duration_includes_loading_the_input_tree() {
    let delay = Duration::from_millis(50);
    let store: Arc<dyn Blockstore> = Arc::new(SlowBlockstore {
        delay,
        ..SlowBlockstore::default()
    });
    // Empty tree: the only read of the run is the input root.
    let root = write_tree(&store, ActorsVersion::V2, &[]);
    let log = CaptureLogger::new();

    StateTreeMigrator::new(Arc::clone(&store), nil_registry())
        .with_config(MigrationConfig::new().with_max_workers(2))
        .with_logger(log.clone())
        .migrate(&CancellationToken::new(), root, ChainEpoch(9))
        .await
        .unwrap();

    let summary = log
        .lines()
        .into_iter()
        .map(|(_, line)| line)
        .find(|line| line.starts_with("All 0 done after"))
        .unwrap();
    assert!(reported_elapsed(&summary) >= delay, "{summary}");
}
