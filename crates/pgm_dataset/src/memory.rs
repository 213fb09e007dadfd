//! Whole-dataset in-memory table.

use crate::accessor::SampleAccessor;
use crate::types::{DatasetResult, SampleRecord};
use std::time::Instant;
use tracing::info;

const PROGRESS_EVERY_SAMPLES: usize = 10_000;

/// Every sample of the index, resized, held for the lifetime of the dataset.
///
/// Built all at once or not at all: any sample that fails to load aborts the
/// build.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    records: Vec<SampleRecord>,
}

impl MemoryTable {
    /// Resolve each identifier once, in index order, through cache or raw storage.
    pub fn build(accessor: &SampleAccessor) -> DatasetResult<Self> {
        let total = accessor.len();
        let started = Instant::now();
        let mut records = Vec::with_capacity(total);
        for index in 0..total {
            let fetched = accessor.fetch_from_storage(index)?;
            records.push(fetched.record.into_owned());
            if (index + 1) % PROGRESS_EVERY_SAMPLES == 0 {
                info!(
                    "loading memory: {}/{} samples ({:.1}s)",
                    index + 1,
                    total,
                    started.elapsed().as_secs_f32()
                );
            }
        }
        let table = Self { records };
        info!(
            "memory table ready: {} samples, {} MiB of panels in {:.1}s",
            table.len(),
            table.panel_bytes() / (1024 * 1024),
            started.elapsed().as_secs_f32()
        );
        Ok(table)
    }

    pub fn from_records(records: Vec<SampleRecord>) -> Self {
        Self { records }
    }

    pub fn get(&self, index: usize) -> Option<&SampleRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bytes held by panel pixels alone.
    pub fn panel_bytes(&self) -> usize {
        self.records
            .iter()
            .map(|record| record.panels.as_array().len())
            .sum()
    }
}
