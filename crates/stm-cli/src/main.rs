use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::io::IsTerminal as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stm_cli::simulator::{run_simulator, SimulatorConfig};
use stm_migration::{MigrationConfig, TracingLogger};
use stm_state::ChainEpoch;

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("TOML migration config; flags override its values")
}

fn cli() -> Command {
    Command::new("stm")
        .version(stm_migration::VERSION)
        .about("Actor state tree migration")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Migrate a synthetic state tree and check the result")
                .arg(
                    Arg::new("actors")
                        .long("actors")
                        .default_value("10000")
                        .value_parser(value_parser!(u64))
                        .help("Number of synthetic actors"),
                )
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .value_parser(value_parser!(usize))
                        .help("Number of migration workers"),
                )
                .arg(
                    Arg::new("job-queue")
                        .long("job-queue")
                        .value_parser(value_parser!(usize))
                        .help("Job queue capacity"),
                )
                .arg(
                    Arg::new("result-queue")
                        .long("result-queue")
                        .value_parser(value_parser!(usize))
                        .help("Result queue capacity"),
                )
                .arg(
                    Arg::new("progress-ms")
                        .long("progress-ms")
                        .value_parser(value_parser!(u64))
                        .help("Progress log period in milliseconds, 0 to disable"),
                )
                .arg(
                    Arg::new("epoch")
                        .long("epoch")
                        .default_value("1000")
                        .value_parser(value_parser!(i64))
                        .help("Prior epoch passed to every state migration"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("check-determinism")
                        .long("check-determinism")
                        .action(ArgAction::SetTrue)
                        .help("Rerun with one worker and compare roots"),
                )
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective migration config as TOML")
                .arg(config_arg()),
        )
}

fn load_config(args: &ArgMatches) -> anyhow::Result<MigrationConfig> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => MigrationConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MigrationConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn simulate_config(args: &ArgMatches) -> anyhow::Result<SimulatorConfig> {
    let mut migration = load_config(args)?;
    if let Some(workers) = args.get_one::<usize>("workers") {
        migration = migration.with_max_workers(*workers);
    }
    if let Some(size) = args.get_one::<usize>("job-queue") {
        migration = migration.with_job_queue_size(*size);
    }
    if let Some(size) = args.get_one::<usize>("result-queue") {
        migration = migration.with_result_queue_size(*size);
    }
    if let Some(ms) = args.get_one::<u64>("progress-ms") {
        migration = migration.with_progress_log_period(Duration::from_millis(*ms));
    }
    migration.validate()?;

    Ok(SimulatorConfig {
        seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
        actors: args.get_one::<u64>("actors").copied().unwrap_or(10_000),
        prior_epoch: ChainEpoch(args.get_one::<i64>("epoch").copied().unwrap_or(1_000)),
        migration,
        check_determinism: args.get_flag("check-determinism"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = simulate_config(args)?;
            tracing::info!(
                actors = config.actors,
                workers = config.migration.max_workers,
                seed = config.seed,
                "starting simulation"
            );
            let report = run_simulator(config, Arc::new(TracingLogger)).await?;
            println!("{}", report.generate_text());
            if !report.passed() {
                std::process::exit(1);
            }
        }
        Some(("config", args)) => {
            print!("{}", load_config(args)?.to_toml_string()?);
        }
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let matches = cli().get_matches_from([
            "stm",
            "simulate",
            "--actors",
            "12",
            "--workers",
            "3",
            "--job-queue",
            "0",
            "--progress-ms",
            "250",
        ]);
        let (_, args) = matches.subcommand().unwrap();
        let config = simulate_config(args).unwrap();
        assert_eq!(config.actors, 12);
        assert_eq!(config.migration.max_workers, 3);
        assert_eq!(config.migration.job_queue_size, 0);
        assert_eq!(config.migration.progress_log_period, Duration::from_millis(250));
        assert!(!config.check_determinism);
    }

    #[test]
    fn zero_workers_flag_is_rejected() {
        let matches = cli().get_matches_from(["stm", "simulate", "--workers", "0"]);
        let (_, args) = matches.subcommand().unwrap();
        assert!(simulate_config(args).is_err());
    }
}
