//! Public dataset facade: length plus indexed access to augmented samples.

use crate::accessor::{FetchReport, Fetched, SampleAccessor};
use crate::aug::{AugmentationPipeline, PanelTransform};
use crate::config::DatasetConfig;
use crate::index::SampleIndex;
use crate::types::{DatasetResult, PgmDatasetError, PgmSample, NUM_PANELS};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A split of a PGM regime, resolved from memory, cache, or raw files.
///
/// Holds no locks; share `&PgmDataset` across worker threads.
#[derive(Debug)]
pub struct PgmDataset {
    config: DatasetConfig,
    accessor: SampleAccessor,
    augmentation: AugmentationPipeline,
}

impl PgmDataset {
    pub fn new(config: DatasetConfig) -> DatasetResult<Self> {
        config.validate()?;
        info!("dataset {}", config.describe());
        let index = SampleIndex::build(&config)?;
        info!("dataset {} size {}", config.split, index.len());
        let mut accessor = SampleAccessor::from_config(&config, index);
        if config.in_memory {
            accessor = accessor.preload()?;
        }
        let augmentation = AugmentationPipeline::from_config(&config);
        Ok(Self {
            config,
            accessor,
            augmentation,
        })
    }

    /// Run `transform` on the 8-bit panels of every sample before augmentation.
    pub fn with_transform(mut self, transform: Arc<dyn PanelTransform>) -> Self {
        self.augmentation = self.augmentation.with_transform(transform);
        self
    }

    pub fn len(&self) -> usize {
        self.accessor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessor.is_empty()
    }

    pub fn identifiers(&self) -> &[String] {
        self.accessor.index().identifiers()
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn accessor(&self) -> &SampleAccessor {
        &self.accessor
    }

    pub fn get(&self, index: usize) -> DatasetResult<PgmSample> {
        self.get_with_report(index).map(|(sample, _)| sample)
    }

    /// Like [`get`](Self::get), also returning which tier served the sample
    /// and any warnings raised on the way.
    pub fn get_with_report(&self, index: usize) -> DatasetResult<(PgmSample, FetchReport)> {
        match self.config.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed ^ index as u64);
                self.sample_with_rng(index, &mut rng)
            }
            None => self.sample_with_rng(index, &mut rand::rng()),
        }
    }

    pub fn get_with_rng<R: Rng + ?Sized>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> DatasetResult<PgmSample> {
        self.sample_with_rng(index, rng).map(|(sample, _)| sample)
    }

    fn sample_with_rng<R: Rng + ?Sized>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> DatasetResult<(PgmSample, FetchReport)> {
        let fetched = self.accessor.fetch(index)?;
        let sample = self
            .augmentation
            .apply(&fetched.record, fetched.identifier, rng)?;
        Ok((sample, fetched.report))
    }

    /// The resized, un-augmented record behind `index`.
    pub fn fetch_record(&self, index: usize) -> DatasetResult<Fetched<'_>> {
        self.accessor.fetch(index)
    }

    /// Write the 16 resized panels of `index` as `{stem}_{slot:02}.png` under `dir`.
    pub fn export_panels_png(&self, index: usize, dir: &Path) -> DatasetResult<Vec<PathBuf>> {
        let fetched = self.accessor.fetch(index)?;
        fs::create_dir_all(dir).map_err(|e| PgmDatasetError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let stem = Path::new(fetched.identifier)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(fetched.identifier);
        let mut written = Vec::with_capacity(NUM_PANELS);
        for slot in 0..NUM_PANELS {
            let panel = fetched.record.panels.panel(slot);
            let (rows, cols) = panel.dim();
            let img = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
                Luma([panel[[y as usize, x as usize]]])
            });
            let path = dir.join(format!("{stem}_{slot:02}.png"));
            img.save(&path).map_err(|e| PgmDatasetError::Image {
                path: path.clone(),
                source: e,
            })?;
            written.push(path);
        }
        Ok(written)
    }
}
