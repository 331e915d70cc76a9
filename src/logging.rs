use std::io::IsTerminal;
use std::path::Path;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_LOG_LEVEL: &str = "info";
const ENV_VAR_NAME: &str = "SPARKSUB_LOG";

static INIT: Once = Once::new();

/// Initialize the global tracing subscriber.
///
/// Human-readable output goes to stderr; stdout is reserved for the result
/// JSON. When `log_file` is provided, structured JSON events are appended
/// there as well, unfiltered, so a run's full stream transcript survives
/// even at a quiet stderr level. Filter precedence: `SPARKSUB_LOG` env var
/// > `log_level` argument > default (`info`).
pub fn init(log_level: Option<&str>, log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut init_err: Option<anyhow::Error> = None;

    INIT.call_once(|| {
        if let Err(e) = try_init(log_level, log_file) {
            init_err = Some(e);
        }
    });

    match init_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn try_init(log_level: Option<&str>, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = build_filter(log_level);

    // Orchestrators capture stderr alongside the stdout result JSON; color
    // codes there would corrupt the captured transcript.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact();

    let result: Result<(), TryInitError> = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file.with_max_level(Level::TRACE))
                .with_target(false)
                .with_ansi(false)
                .json();

            tracing_subscriber::registry()
                .with(stderr_layer.with_filter(filter))
                .with(file_layer)
                .try_init()
        }
        None => tracing_subscriber::registry()
            .with(stderr_layer.with_filter(filter))
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

fn build_filter(log_level: Option<&str>) -> EnvFilter {
    // SPARKSUB_LOG takes highest precedence (EnvFilter::try_from_env).
    EnvFilter::try_from_env(ENV_VAR_NAME).unwrap_or_else(|_| {
        let directive = log_level.unwrap_or(DEFAULT_LOG_LEVEL);
        EnvFilter::new(directive)
    })
}

fn open_log_file(path: &Path) -> anyhow::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "failed to create log file directory {}: {e}",
                    parent.display()
                )
            })?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("failed to open log file {}: {e}", path.display()))
}
