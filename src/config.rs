//! Logging setup for the daemon binary, grounded on `setup_logging` in
//! `examples/other_examples/93178445_groblegark-oddjobs__crates-daemon-src-main.rs.rs`:
//! a non-rotating file appender wrapped in `tracing-appender`'s non-blocking
//! writer, filtered by `RUST_LOG` (falling back to `AppConfig::log_level`).

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adi_infra::AppConfig;

pub fn setup_logging(config: &AppConfig) -> Result<WorkerGuard, std::io::Error> {
    if let Some(parent) = config.log_file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let dir = config.log_file_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = config.log_file_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("app.logs"));
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();

    Ok(guard)
}
