//! Tiered sample resolution: memory table, then compressed cache, then raw file.

use crate::cache::{CacheLookup, CompressedCache};
use crate::config::DatasetConfig;
use crate::index::SampleIndex;
use crate::memory::MemoryTable;
use crate::raw::RawSampleLoader;
use crate::types::{DatasetResult, PgmDatasetError, SampleRecord};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Memory,
    Cache,
    Raw,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Cache => "cache",
            Tier::Raw => "raw",
        }
    }
}

const ALL_TIERS: [Tier; 3] = [Tier::Memory, Tier::Cache, Tier::Raw];
const STORAGE_TIERS: [Tier; 2] = [Tier::Cache, Tier::Raw];

/// Recoverable conditions hit while resolving a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchWarning {
    CorruptCacheEntry { path: PathBuf, error: String },
    /// Caching is on, saving is off, and the entry was not there.
    ExpectedCacheMissing { identifier: String },
    CacheWriteFailed { path: PathBuf, error: String },
}

impl fmt::Display for FetchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchWarning::CorruptCacheEntry { path, error } => {
                write!(f, "could not open cached file {}: {error}", path.display())
            }
            FetchWarning::ExpectedCacheMissing { identifier } => write!(
                f,
                "expected cached data for {identifier} but the cache entry was not found"
            ),
            FetchWarning::CacheWriteFailed { path, error } => {
                write!(f, "failed to write cache entry {}: {error}", path.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Tier that produced the record.
    pub tier: Tier,
    pub warnings: Vec<FetchWarning>,
}

#[derive(Debug)]
pub struct Fetched<'a> {
    pub record: Cow<'a, SampleRecord>,
    pub identifier: &'a str,
    pub report: FetchReport,
}

#[derive(Debug)]
pub struct SampleAccessor {
    index: SampleIndex,
    raw: RawSampleLoader,
    cache: Option<CompressedCache>,
    save_cache: bool,
    memory: Option<MemoryTable>,
}

impl SampleAccessor {
    pub fn new(
        index: SampleIndex,
        raw: RawSampleLoader,
        cache: Option<CompressedCache>,
        save_cache: bool,
    ) -> Self {
        Self {
            index,
            raw,
            cache,
            save_cache,
            memory: None,
        }
    }

    pub fn from_config(cfg: &DatasetConfig, index: SampleIndex) -> Self {
        Self::new(
            index,
            RawSampleLoader::from_config(cfg),
            CompressedCache::from_config(cfg),
            cfg.save_cache,
        )
    }

    /// Materialize every sample into a memory table and serve from it from now on.
    pub fn preload(self) -> DatasetResult<Self> {
        let table = MemoryTable::build(&self)?;
        self.with_memory(table)
    }

    pub fn with_memory(mut self, table: MemoryTable) -> DatasetResult<Self> {
        if table.len() != self.index.len() {
            return Err(PgmDatasetError::config(format!(
                "memory table holds {} samples but the index has {}",
                table.len(),
                self.index.len()
            )));
        }
        self.memory = Some(table);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &SampleIndex {
        &self.index
    }

    pub fn cache(&self) -> Option<&CompressedCache> {
        self.cache.as_ref()
    }

    pub fn memory(&self) -> Option<&MemoryTable> {
        self.memory.as_ref()
    }

    /// Resolve `index` through memory, cache, and raw tiers; first hit wins.
    pub fn fetch(&self, index: usize) -> DatasetResult<Fetched<'_>> {
        self.resolve(index, &ALL_TIERS)
    }

    /// Resolve `index` from disk only, skipping the memory table.
    pub fn fetch_from_storage(&self, index: usize) -> DatasetResult<Fetched<'_>> {
        self.resolve(index, &STORAGE_TIERS)
    }

    fn resolve(&self, index: usize, tiers: &[Tier]) -> DatasetResult<Fetched<'_>> {
        let identifier = self.index.get(index)?;
        let mut warnings = Vec::new();
        for &tier in tiers {
            if let Some(record) = self.lookup(tier, index, identifier, &mut warnings)? {
                return Ok(Fetched {
                    record,
                    identifier,
                    report: FetchReport { tier, warnings },
                });
            }
        }
        Err(PgmDatasetError::config(format!(
            "no storage tier could resolve {identifier}"
        )))
    }

    fn lookup(
        &self,
        tier: Tier,
        index: usize,
        identifier: &str,
        warnings: &mut Vec<FetchWarning>,
    ) -> DatasetResult<Option<Cow<'_, SampleRecord>>> {
        match tier {
            Tier::Memory => Ok(self
                .memory
                .as_ref()
                .and_then(|table| table.get(index))
                .map(Cow::Borrowed)),
            Tier::Cache => Ok(self.lookup_cache(identifier, warnings).map(Cow::Owned)),
            Tier::Raw => self
                .lookup_raw(identifier, warnings)
                .map(|record| Some(Cow::Owned(record))),
        }
    }

    fn lookup_cache(
        &self,
        identifier: &str,
        warnings: &mut Vec<FetchWarning>,
    ) -> Option<SampleRecord> {
        let cache = self.cache.as_ref()?;
        match cache.read(identifier) {
            CacheLookup::Hit(record) => return Some(record),
            CacheLookup::Absent => {}
            CacheLookup::Corrupt(err) => push_warning(
                warnings,
                FetchWarning::CorruptCacheEntry {
                    path: cache.entry_path(identifier),
                    error: err.to_string(),
                },
            ),
        }
        if !self.save_cache {
            push_warning(
                warnings,
                FetchWarning::ExpectedCacheMissing {
                    identifier: identifier.to_string(),
                },
            );
        }
        None
    }

    fn lookup_raw(
        &self,
        identifier: &str,
        warnings: &mut Vec<FetchWarning>,
    ) -> DatasetResult<SampleRecord> {
        let record = self.raw.load(identifier)?;
        if let Some(cache) = self.cache.as_ref().filter(|_| self.save_cache) {
            if let Err(err) = cache.write(identifier, &record) {
                let warning = FetchWarning::CacheWriteFailed {
                    path: cache.entry_path(identifier),
                    error: err.to_string(),
                };
                error!("{warning}");
                warnings.push(warning);
            }
        }
        Ok(record)
    }
}

fn push_warning(warnings: &mut Vec<FetchWarning>, warning: FetchWarning) {
    warn!("{warning}");
    warnings.push(warning);
}
