//! Populate the compressed cache for a whole split ahead of training.

use anyhow::Context;
use pgm_dataset::{DatasetConfig, PgmDataset, Tier};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct WarmFailure {
    pub index: usize,
    pub identifier: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmSummary {
    pub split: String,
    pub regime: String,
    pub image_size: u32,
    pub total: usize,
    /// Samples that were already cached.
    pub from_cache: usize,
    /// Samples decoded from raw files and written to the cache.
    pub from_raw: usize,
    pub warnings: usize,
    pub failed: Vec<WarmFailure>,
    pub elapsed_ms: u64,
}

impl WarmSummary {
    pub fn save_json(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))
    }
}

/// Resolve every sample of the split with caching forced on.
///
/// Workers do not coordinate; two of them may decode the same cold sample,
/// and the cache keeps whichever identical entry lands last.
pub fn warm_cache(cfg: &DatasetConfig, jobs: Option<usize>) -> anyhow::Result<WarmSummary> {
    let cfg = DatasetConfig {
        use_cache: true,
        save_cache: true,
        in_memory: false,
        flip: false,
        permute: false,
        ..cfg.clone()
    };
    let started = Instant::now();
    let dataset = PgmDataset::new(cfg).context("opening dataset")?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()
        .context("building worker pool")?;

    let outcomes: Vec<_> = pool.install(|| {
        (0..dataset.len())
            .into_par_iter()
            .map(|index| {
                let outcome = dataset
                    .fetch_record(index)
                    .map(|fetched| (fetched.report.tier, fetched.report.warnings.len()));
                (index, outcome)
            })
            .collect()
    });

    let config = dataset.config();
    let mut summary = WarmSummary {
        split: config.split.clone(),
        regime: config.regime.clone(),
        image_size: config.image_size,
        total: dataset.len(),
        ..Default::default()
    };
    for (index, outcome) in outcomes {
        match outcome {
            Ok((tier, warnings)) => {
                summary.warnings += warnings;
                match tier {
                    Tier::Cache => summary.from_cache += 1,
                    Tier::Raw => summary.from_raw += 1,
                    Tier::Memory => {}
                }
            }
            Err(err) => summary.failed.push(WarmFailure {
                index,
                identifier: dataset.identifiers()[index].clone(),
                error: err.to_string(),
            }),
        }
    }
    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(summary)
}
