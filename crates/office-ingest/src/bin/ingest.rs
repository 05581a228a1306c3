//! Office document ingestion binary
//!
//! Run with: cargo run -p office-ingest --bin office-ingest -- --config ingest.toml

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Parser;
use office_ingest::{IngestConfig, IngestPipeline};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status when the run was interrupted
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "office-ingest",
    version,
    about = "Load DOCX/XLSX files, embed their text and upsert it into a vector index"
)]
struct Cli {
    /// TOML settings file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the input files are resolved against
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Input file name, relative to the base directory (repeatable)
    #[arg(long = "file")]
    files: Vec<String>,

    /// Print the run report as JSON instead of text
    #[arg(long, default_value_t = false)]
    json: bool,
}

/// Set `stop` on the first interrupt. Returns `true` once a second
/// interrupt arrives, `false` if the signal stream fails.
async fn watch_interrupts<F, Fut>(stop: &AtomicBool, mut interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    tracing::warn!("Interrupt received, stopping after in-flight batches (Ctrl-C again to exit now)");
    stop.store(true, Ordering::Release);

    if interrupt().await.is_err() {
        return false;
    }
    tracing::warn!("Second interrupt received, exiting without waiting for in-flight batches");
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "office_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = IngestConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(base_dir) = cli.base_dir {
        config.settings.input.base_dir = base_dir;
    }
    if !cli.files.is_empty() {
        config.settings.input.files = cli.files;
    }
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Index: {}", config.index_name);
    tracing::info!("  - Embedding model: {}", config.settings.embeddings.model);
    tracing::info!("  - Embedding dimensions: {}", config.settings.embeddings.dimensions);
    tracing::info!("  - Input directory: {}", config.settings.input.base_dir.display());

    let pipeline = IngestPipeline::from_config(&config)?;

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if watch_interrupts(&stop, tokio::signal::ctrl_c).await {
            std::process::exit(i32::from(EXIT_CANCELLED));
        }
    });

    let report = pipeline.run(config.settings.input.source_files()).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    if report.cancelled {
        Ok(ExitCode::from(EXIT_CANCELLED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
