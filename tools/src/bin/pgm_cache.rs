use anyhow::Context;
use clap::{Parser, Subcommand};
use pgm_dataset::{DatasetConfig, PgmDataset};
use pgm_tools::{warm_cache, DatasetArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pgm_cache", about = "Populate and inspect the PGM sample cache")]
struct Cli {
    /// Dataset config TOML (defaults to $PGM_DATASET_CONFIG or ./pgm-dataset.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    dataset: DatasetArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode, resize, and cache every sample of the split.
    Warm {
        /// Worker threads (defaults to one per core).
        #[arg(long)]
        jobs: Option<usize>,
        /// Write a JSON summary here.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
    /// Print one sample's labels and provenance.
    Inspect {
        #[arg(long, default_value_t = 0)]
        index: usize,
        /// Also export the 16 resized panels as PNG files into this directory.
        #[arg(long)]
        png_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let base = match &cli.config {
        Some(path) => DatasetConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DatasetConfig::load().context("loading dataset config")?,
    };
    let cfg = cli.dataset.apply(base);

    match cli.command {
        Command::Warm { jobs, summary_json } => {
            let summary = warm_cache(&cfg, jobs)?;
            println!(
                "Cache warm {} {} @{}: total={} cached={} decoded={} warnings={} failed={} ({:.1}s)",
                summary.regime,
                summary.split,
                summary.image_size,
                summary.total,
                summary.from_cache,
                summary.from_raw,
                summary.warnings,
                summary.failed.len(),
                summary.elapsed_ms as f64 / 1000.0
            );
            for failure in summary.failed.iter().take(20) {
                println!(" - [{}] {}: {}", failure.index, failure.identifier, failure.error);
            }
            if let Some(path) = summary_json {
                summary.save_json(&path)?;
                println!("Summary written to {}", path.display());
            }
            if !summary.failed.is_empty() {
                anyhow::bail!("{} samples failed to load", summary.failed.len());
            }
        }
        Command::Inspect { index, png_dir } => {
            let dataset = PgmDataset::new(cfg).context("opening dataset")?;
            let fetched = dataset.fetch_record(index)?;
            let labels = &fetched.record.labels;
            println!("identifier: {}", fetched.identifier);
            println!("tier: {}", fetched.report.tier.as_str());
            println!("panels: {:?}", fetched.record.panels.as_array().dim());
            println!("target: {}", labels.target);
            println!("meta_target: {:?}", labels.meta_target.as_slice());
            println!(
                "relation_structure_encoded: shape {:?}",
                labels.relation_structure_encoded.shape()
            );
            for warning in &fetched.report.warnings {
                println!("warning: {warning}");
            }
            if let Some(dir) = png_dir {
                let written = dataset.export_panels_png(index, &dir)?;
                println!("Wrote {} panels under {}", written.len(), dir.display());
            }
        }
    }
    Ok(())
}
