//! blockflow demo runner
//!
//! Builds a small block program (a counter feeding a collector over a
//! synchronous link, and a scaler feeding a second collector in lock-step)
//! and runs it until every block finished.

use anyhow::Context;
use blockflow::blocks::{CollectorBlock, CounterBlock, ScaleBlock};
use blockflow::block::MAX_ITERATIONS_PROPERTY;
use blockflow::{Application, BlockHandle, LinkDiscipline, RuntimeConfig};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEMO_ITERATIONS: i32 = 10;

fn init_logging(config: &RuntimeConfig) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_filter = config
        .log_filter
        .clone()
        .unwrap_or_else(|| "info,blockflow=debug".to_string());

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .with_context(|| format!("log file {:?} has no file name", path))?;
            let appender = tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Cap a demo block unless the command line already set a limit.
///
/// Returns the effective limit.
fn limit_iterations(block: &BlockHandle) -> anyhow::Result<i32> {
    let limit = block.property_value::<i32>(MAX_ITERATIONS_PROPERTY)?;
    if limit >= 0 {
        return Ok(limit);
    }
    block.set_property_value(MAX_ITERATIONS_PROPERTY, DEMO_ITERATIONS)?;
    Ok(DEMO_ITERATIONS)
}

fn run() -> anyhow::Result<u8> {
    let (config, config_error) = match RuntimeConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (RuntimeConfig::default(), Some(e)),
    };
    let _guard = init_logging(&config)?;
    if let Some(e) = config_error {
        tracing::warn!("Using default runtime configuration: {}", e);
    }

    tracing::info!("Starting blockflow demo");

    let app = Application::with_config(
        std::env::args().skip(1),
        "blockflow demo: counter -> collector (synchronous), scale -> collector (sequential)",
        config,
    );

    let counter = app.create_block("counter", CounterBlock::new())?;
    let (counts, collected_counts) = CollectorBlock::new(0i32);
    let counts = app.create_block("counts", counts)?;
    counter
        .link_property("x", &counts, "in", LinkDiscipline::Synchronous)
        .context("Failed to link counter")?;
    // The collector stops once it has seen every count.
    let limit = limit_iterations(&counter)?;
    counts.set_property_value(MAX_ITERATIONS_PROPERTY, limit)?;

    let scale = app.create_block("scale", ScaleBlock::new(0.5))?;
    let (scaled, collected_scaled) = CollectorBlock::new(0.0f64);
    let scaled = app.create_block("scaled", scaled)?;
    scale
        .link_property("out", &scaled, "in", LinkDiscipline::Sequential)
        .context("Failed to link scale")?;
    limit_iterations(&scale)?;

    let status = app.exec();

    tracing::info!(
        "counts received {} value(s), last {:?}",
        collected_counts.len(),
        collected_counts.last()
    );
    tracing::info!(
        "scaled received {} value(s), last {:?}",
        collected_scaled.len(),
        collected_scaled.last()
    );
    Ok(status)
}

fn main() -> ExitCode {
    match run() {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            eprintln!("blockflow: {:#}", e);
            ExitCode::from(blockflow::app::EXIT_STARTUP_FAILED)
        }
    }
}
