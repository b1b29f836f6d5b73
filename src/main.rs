//! adi: the OMERO Automated Data Import ingestion daemon entrypoint.
//!
//! Wires `AppConfig` -> `PipelineDeps` -> `lifecycle::run_until_signal`,
//! following the structure of
//! `examples/other_examples/93178445_groblegark-oddjobs__crates-daemon-src-main.rs.rs`:
//! load config, set up non-blocking file logging, run startup recovery,
//! then block until SIGTERM/SIGINT.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use adi_adapters::{Importer, ImporterConfig, Preprocessor};
use adi_core::Tracker;
use adi_infra::{recover_dangling, run_until_signal, AppConfig, OmeroConnectionConfig, PipelineDeps};
use adi_persistence::{connect, run_pending_migrations, DbConfig, PgPreprocessingRepository, PgTracker};
use adi_providers::{CliContainerRuntime, CliOmeroGateway};

#[derive(Parser)]
#[command(name = "adi", about = "OMERO Automated Data Import ingestion daemon")]
struct Args {
    /// Path to the TOML config document (spec.md §6).
    #[arg(long, default_value = "adi.toml")]
    config: PathBuf,

    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if args.version {
        println!("adi {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let app_config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL_BOOT: failed to load config at {}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match config::setup_logging(&app_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("FATAL_BOOT: failed to set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("starting adi ingestion daemon");

    match run(app_config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("FATAL_BOOT: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(app_config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let omero_config = OmeroConnectionConfig::from_env()?;
    let db_config = DbConfig {
        url: app_config.ingest_tracking_db.clone(),
        min_connections: 2,
        max_connections: 16,
    };

    let pool = connect(&db_config).await?;
    run_pending_migrations(&pool).await?;

    let tracker: Arc<dyn Tracker> = Arc::new(PgTracker::new(pool.clone()));
    let preprocessing_repo = Arc::new(PgPreprocessingRepository::new(pool));

    let recovered = recover_dangling(tracker.as_ref()).await?;
    if recovered > 0 {
        info!(recovered, "recovered dangling orders from a previous instance");
    }

    let gateway = Arc::new(CliOmeroGateway::new(
        omero_config.host,
        omero_config.user,
        omero_config.password,
        omero_config.port,
        app_config.base_dir.clone(),
    ));

    let preprocessor = Arc::new(Preprocessor::new(
        Arc::new(CliContainerRuntime::new()),
        app_config.container_runtime_binary.clone(),
        std::env::var("PODMAN_USERNS_MODE").ok(),
        app_config.log_file_path.parent().unwrap_or_else(|| std::path::Path::new("logs")).to_path_buf(),
    ));

    let importer = Arc::new(Importer::new(
        gateway.clone(),
        ImporterConfig {
            parallel_upload: app_config.parallel_upload_per_worker,
            parallel_fileset: app_config.parallel_filesets_per_worker,
            skip_checksum: app_config.skip_checksum,
            skip_minmax: app_config.skip_minmax,
            skip_thumbnails: app_config.skip_thumbnails,
            skip_upgrade: app_config.skip_upgrade,
            skip_all: app_config.skip_all,
            use_register_zarr: app_config.use_register_zarr,
            session_ttl: app_config.session_ttl(),
            logs_dir: app_config.log_file_path.parent().unwrap_or_else(|| std::path::Path::new("logs")).to_path_buf(),
        },
    ));

    let deps = Arc::new(PipelineDeps {
        tracker: tracker.clone(),
        preprocessing_repo,
        gateway,
        preprocessor,
        importer,
    });

    run_until_signal(deps, app_config.max_workers, app_config.poll_interval(), app_config.shutdown_grace()).await;
    Ok(())
}
