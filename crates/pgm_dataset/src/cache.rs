//! Per-sample compressed cache of resized panels and labels.
//!
//! Layout: `{cache_root}/cache/{regime}/{split}_{resolution}/{identifier}`, one
//! npz archive per sample. Entries are immutable once written. Reads never
//! fail; anything unreadable is reported as a miss so the caller can fall
//! back to the raw file.

use crate::archive::NpzArchive;
use crate::config::DatasetConfig;
use crate::raw::{
    decode_record, IMAGE_KEY, META_TARGET_KEY, RELATION_STRUCTURE_ENCODED_KEY,
    RELATION_STRUCTURE_KEY, TARGET_KEY,
};
use crate::types::{ArchiveError, DatasetResult, PgmDatasetError, SampleRecord};
use ndarray::arr0;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum CacheLookup {
    Hit(SampleRecord),
    /// No entry on disk yet.
    Absent,
    /// An entry exists but could not be decoded.
    Corrupt(ArchiveError),
}

#[derive(Debug, Clone)]
pub struct CompressedCache {
    dir: PathBuf,
    image_size: u32,
}

impl CompressedCache {
    pub fn new(dir: PathBuf, image_size: u32) -> Self {
        Self { dir, image_size }
    }

    /// `None` when caching is disabled or no cache root can be derived.
    pub fn from_config(cfg: &DatasetConfig) -> Option<Self> {
        if !cfg.use_cache {
            return None;
        }
        cfg.cache_dir().map(|dir| Self::new(dir, cfg.image_size))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, identifier: &str) -> PathBuf {
        self.dir.join(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entry_path(identifier).is_file()
    }

    pub fn read(&self, identifier: &str) -> CacheLookup {
        let path = self.entry_path(identifier);
        if !path.is_file() {
            return CacheLookup::Absent;
        }
        match NpzArchive::open(&path)
            .and_then(|archive| decode_record(&archive, self.image_size as usize))
        {
            Ok(record) => CacheLookup::Hit(record),
            Err(err) => CacheLookup::Corrupt(err),
        }
    }

    /// Persist `record` under `identifier`.
    ///
    /// The archive is written to a uniquely named sibling and renamed into
    /// place, so a reader never observes a partial entry even when two
    /// workers race to populate the same identifier.
    pub fn write(&self, identifier: &str, record: &SampleRecord) -> DatasetResult<PathBuf> {
        let path = self.entry_path(identifier);
        let write_error = |source: ArchiveError| PgmDatasetError::CacheWrite {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(|e| {
            write_error(ArchiveError::Io {
                path: self.dir.clone(),
                source: e,
            })
        })?;
        let archive = encode_record(record).map_err(write_error)?;
        let tmp_path = self.dir.join(format!(
            ".{identifier}.{}.{:016x}.tmp",
            std::process::id(),
            rand::rng().random::<u64>()
        ));
        if let Err(err) = archive.write(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(write_error(err));
        }
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            write_error(ArchiveError::Io {
                path: path.clone(),
                source: e,
            })
        })?;
        Ok(path)
    }
}

fn encode_record(record: &SampleRecord) -> Result<NpzArchive, ArchiveError> {
    let labels = &record.labels;
    let mut archive = NpzArchive::new();
    archive.insert_array(IMAGE_KEY, record.panels.as_array())?;
    archive.insert_array(TARGET_KEY, &arr0(labels.target as i64))?;
    archive.insert_array(META_TARGET_KEY, &labels.meta_target)?;
    archive.insert_blob(RELATION_STRUCTURE_KEY, &labels.relation_structure);
    archive.insert_array(
        RELATION_STRUCTURE_ENCODED_KEY,
        &labels.relation_structure_encoded,
    )?;
    Ok(archive)
}
