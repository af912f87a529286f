// amcache-ingest
// Acquire an Amcache hive (live snapshot or exported copy) and ingest it into SQLite

use amc_acquire::host_platform;
use amc_ingest::config::parse_search_keys;
use amc_ingest::logging::init_logging;
use amc_ingest::{
    ConfigError, IngestConfig, InputMode, NtHiveDecoder, OutputKind, Pipeline, PipelineError,
    RunOutcome,
};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "amcache-ingest")]
#[command(about = "Snapshot the Amcache hive and ingest it into a SQLite store")]
struct Args {
    /// Snapshot the live Amcache hive (requires an elevated process)
    #[arg(long, conflicts_with = "offline")]
    live: bool,

    /// Hive file to ingest instead of the live one
    #[arg(long, value_name = "PATH")]
    offline: Option<PathBuf>,

    /// Treat --offline as an already exported copy (no privileged snapshot)
    #[arg(long, requires = "offline")]
    exported: bool,

    /// SQLite database path
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Output kind written next to the database
    #[arg(long, value_enum)]
    output: Option<OutputKind>,

    /// Comma-separated categories to ingest (default: all)
    #[arg(long, value_name = "A,B")]
    search_keys: Option<String>,

    /// Key holding the categories, relative to the hive root
    #[arg(long)]
    root_path: Option<String>,

    /// YAML or JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep the snapshot at this path
    #[arg(long, value_name = "PATH")]
    snapshot_out: Option<PathBuf>,

    /// Snapshot attempts before giving up
    #[arg(long)]
    attempts: Option<u32>,

    /// Delay between snapshot attempts, in milliseconds
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Also write logs to a daily file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn input_mode(&self) -> Result<InputMode, ConfigError> {
        match (&self.offline, self.live, self.exported) {
            (Some(path), _, true) => Ok(InputMode::Exported(path.clone())),
            (Some(path), _, false) => Ok(InputMode::Offline(path.clone())),
            (None, true, _) => Ok(InputMode::Live),
            (None, false, _) => Err(ConfigError::Invalid(
                "choose a source: --live or --offline <PATH>".to_string(),
            )),
        }
    }

    /// File, then environment, then flags
    fn load_config(&self) -> Result<IngestConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => IngestConfig::from_file(path)?,
            None => IngestConfig::default(),
        };
        config.apply_env()?;

        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(keys) = &self.search_keys {
            config.search_keys = parse_search_keys(keys);
        }
        if let Some(root) = &self.root_path {
            config.root_path = root.clone();
        }
        if let Some(out) = &self.snapshot_out {
            config.acquisition.snapshot_out = Some(out.clone());
        }
        if let Some(attempts) = self.attempts {
            config.acquisition.attempts = attempts;
        }
        if let Some(backoff) = self.backoff_ms {
            config.acquisition.backoff_ms = backoff;
        }

        config.validate()?;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<RunOutcome, PipelineError> {
    let mode = args.input_mode()?;
    let config = args.load_config()?;
    let platform = host_platform();

    if mode.is_live() && platform.supports_live_acquisition() && !platform.is_elevated() {
        return Err(amc_acquire::AcquireError::Privilege {
            privilege: "SeBackupPrivilege".to_string(),
            reason: "live acquisition needs an elevated (administrator) process".to_string(),
            code: 0,
        }
        .into());
    }

    let source = mode.source(&config);
    info!(source = %source.describe(), db = %config.db_path.display(), "Starting ingestion");

    let decoder = NtHiveDecoder::new();
    Pipeline::new(&config, platform.as_ref(), &decoder).run(&source)
}

fn print_outcome(outcome: &RunOutcome) {
    println!("{}", outcome.summary);
    println!("Snapshot:   {} bytes, sha256 {}", outcome.size, outcome.sha256);
    if outcome.dirty {
        println!("⚠ Hive was not cleanly committed; recent writes may be missing");
    }
    if let Some((path, written)) = &outcome.export {
        println!("Export:     {} ({} written)", path.display(), written);
    }
}

fn main() {
    let args = Args::parse();
    let guard = init_logging(args.log_dir.as_deref());

    match run(&args) {
        Ok(outcome) => print_outcome(&outcome),
        Err(err) => {
            let report = err.report();
            error!(code = %report.code, "{}", report.message);
            eprintln!("❌ {}", report);
            // exit() skips destructors; flush the file log first
            drop(guard);
            std::process::exit(err.exit_code());
        }
    }
}
