//! adi-cli: ad-hoc queue inspection and administration, standalone from the
//! daemon binary (spec.md §2's "operator tooling" row). Talks to the same
//! Postgres tracking database through `adi-persistence::PgTracker`, so an
//! operator never needs direct SQL access for routine triage.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use adi_core::Tracker;
use adi_domain::Stage;
use adi_persistence::{connect, DbConfig, PgTracker};

#[derive(Parser)]
#[command(name = "adi-cli", about = "Operator tooling for the ingestion daemon's tracking queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every order currently IMPORT_STARTED (possibly abandoned by a
    /// crashed daemon instance, if the lifecycle recovery step hasn't run).
    ListDangling,
    /// Print the current stage for a single order.
    Show {
        uuid: Uuid,
    },
    /// Force an order to IMPORT_FAILED, e.g. to unblock a stuck claim by
    /// hand before restarting the daemon.
    ForceFail {
        uuid: Uuid,
        #[arg(long, default_value = "forced failure via adi-cli")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let config = match DbConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("missing database configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let pool = match connect(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("failed to connect to tracking database: {e}");
            return ExitCode::FAILURE;
        }
    };

    let tracker = PgTracker::new(pool);

    let result = match cli.command {
        Command::ListDangling => list_dangling(&tracker).await,
        Command::Show { uuid } => show(&tracker, uuid).await,
        Command::ForceFail { uuid, message } => force_fail(&tracker, uuid, message).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn list_dangling(tracker: &PgTracker) -> Result<(), adi_core::TrackerError> {
    let dangling = tracker.list_dangling().await?;
    if dangling.is_empty() {
        println!("no dangling orders");
    }
    for uuid in dangling {
        println!("{uuid}");
    }
    Ok(())
}

async fn show(tracker: &PgTracker, uuid: Uuid) -> Result<(), adi_core::TrackerError> {
    let stage = tracker.current_stage(uuid).await?;
    println!("{uuid}: {stage}");
    Ok(())
}

async fn force_fail(tracker: &PgTracker, uuid: Uuid, message: String) -> Result<(), adi_core::TrackerError> {
    let current = tracker.current_stage(uuid).await?;
    if current != Stage::ImportStarted {
        eprintln!("refusing to force-fail {uuid}: current stage is {current}, not IMPORT_STARTED");
        return Ok(());
    }
    tracker.record(uuid, Stage::ImportFailed, Some(message)).await?;
    println!("{uuid}: forced to IMPORT_FAILED");
    Ok(())
}
