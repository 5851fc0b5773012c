//! `lss-reduce`: reduces the kernels of a run file and writes the export.
//!
//! **Usage:**
//! ```text
//! lss-reduce --config <run.toml> [--out <path>] [--summary <path>] [-v]
//! ```
//!
//! Statements go to `--out`, or to stdout when it is absent. Logs go to
//! stderr; `RUST_LOG` refines the filter.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lss_clients::{execute, RunConfig};
use tracing_subscriber::EnvFilter;

/// Reduce one-loop kernels and assemble redshift-space spectra.
#[derive(Parser)]
#[command(
    name = "lss-reduce",
    about = "Reduce one-loop power spectrum kernels and export the assembled terms"
)]
struct Args {
    /// Path to the TOML run file.
    #[arg(long)]
    config: PathBuf,

    /// Write the export here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write a JSON run summary here.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = RunConfig::load(&args.config)
        .with_context(|| format!("Failed to load run file {}", args.config.display()))?;
    tracing::info!(
        "Loaded '{}' with {} kernel(s) and {} redshift-space request(s)",
        config.spectrum.name,
        config.kernels.len(),
        config.rsd.len()
    );

    let output = execute(&config)
        .with_context(|| format!("Failed to reduce '{}'", config.spectrum.name))?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, &output.export)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote export to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(output.export.as_bytes())
                .context("Failed to write export to stdout")?;
        }
    }

    if let Some(path) = &args.summary {
        let json = serde_json::to_string_pretty(&output.summary)
            .context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Wrote summary to {}", path.display());
    }

    Ok(())
}
