//! Logging built on `tracing-subscriber`.
//!
//! - console output with color control
//! - a rotating system log file (Full, Compact or JSON)
//! - an optional cluster log file that receives only consensus-library events

pub mod compression;
pub mod config;
pub mod rotation;
pub(crate) mod writer;

pub use config::*;

use std::io::IsTerminal;
use tracing::Metadata;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::filter_fn, fmt, layer::SubscriberExt,
    util::SubscriberInitExt,
};
use writer::RotatingFileWriter;

/// Event target prefix of the consensus library.
pub const CLUSTER_LOG_TARGET: &str = "openraft";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn is_cluster_event(meta: &Metadata<'_>) -> bool {
    meta.target().starts_with(CLUSTER_LOG_TARGET)
}

/// Initialize the global subscriber.
pub fn init_logger(config: LoggerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let split_cluster = config.cluster_file.enabled;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    // File layers go first so console ANSI settings never leak into file output.
    if config.file.enabled {
        let writer = RotatingFileWriter::new(&config.file.path, &config.file.retention)?;
        let system_only = filter_fn(move |meta| !(split_cluster && is_cluster_event(meta)));
        layers.push(file_layer(config.file.format, writer, system_only));
    }

    if split_cluster {
        let writer =
            RotatingFileWriter::new(&config.cluster_file.path, &config.file.retention)?;
        layers.push(file_layer(
            config.file.format,
            writer,
            filter_fn(is_cluster_event),
        ));
    }

    if config.console.enabled {
        let use_ansi = config.console.colored && std::io::stdout().is_terminal();
        layers.push(
            fmt::layer()
                .with_ansi(use_ansi)
                .with_target(true)
                .with_level(true)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;
    Ok(())
}

fn file_layer<F>(format: LogFormat, writer: RotatingFileWriter, filter: F) -> BoxedLayer
where
    F: tracing_subscriber::layer::Filter<Registry> + Send + Sync + 'static,
{
    match format {
        LogFormat::Full => fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .compact()
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_ansi(false)
            .json()
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}
