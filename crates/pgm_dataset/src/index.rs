//! Ordered sample identifiers for one split.

use crate::config::DatasetConfig;
use crate::types::{DatasetResult, PgmDatasetError};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Canonical split sizes of the full dataset.
pub const EXPECTED_SPLIT_COUNTS: [(&str, usize); 3] =
    [("train", 1_200_000), ("val", 20_000), ("test", 200_000)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndex {
    identifiers: Vec<String>,
}

impl SampleIndex {
    /// Resolve the index from the configured manifest, or by scanning the data
    /// directory (the cache directory when no dataset root is set).
    pub fn build(cfg: &DatasetConfig) -> DatasetResult<Self> {
        if let Some(manifest) = cfg.manifest_path() {
            return Self::from_manifest(&manifest);
        }
        let dir = cfg.data_dir().or_else(|| cfg.cache_dir()).ok_or_else(|| {
            PgmDatasetError::config("neither a dataset root nor a cache root is configured")
        })?;
        let index = Self::scan(&dir, &cfg.split)?;
        if cfg.verify_split_counts {
            index.verify_split_count(&cfg.split)?;
        }
        Ok(index)
    }

    /// Every regular file in `dir` whose name contains `split`, sorted.
    ///
    /// Hidden names and `*.tmp` files are staging leftovers of cache writers
    /// and never count as samples.
    pub fn scan(dir: &Path, split: &str) -> DatasetResult<Self> {
        if !dir.is_dir() {
            return Err(PgmDatasetError::config(format!(
                "data directory {} does not exist",
                dir.display()
            )));
        }
        let entries = fs::read_dir(dir).map_err(|e| {
            PgmDatasetError::config(format!("cannot list {}: {e}", dir.display()))
        })?;
        let mut identifiers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PgmDatasetError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(path = %path.display(), "skipping non UTF-8 file name {raw:?}");
                    continue;
                }
            };
            if is_staging_name(&name) || !name.contains(split) {
                continue;
            }
            identifiers.push(name);
        }
        identifiers.sort();
        Ok(Self { identifiers })
    }

    /// Newline-delimited paths reduced to basenames, in file order.
    pub fn from_manifest(path: &Path) -> DatasetResult<Self> {
        if !path.is_file() {
            return Err(PgmDatasetError::config(format!(
                "subset manifest {} not found",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path).map_err(|e| PgmDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let identifiers = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                Path::new(line)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(line)
                    .to_string()
            })
            .collect();
        Ok(Self { identifiers })
    }

    pub fn from_identifiers(identifiers: Vec<String>) -> Self {
        Self { identifiers }
    }

    /// A partial or mismatched copy of a canonical split is a configuration error.
    pub fn verify_split_count(&self, split: &str) -> DatasetResult<()> {
        let expected = EXPECTED_SPLIT_COUNTS
            .iter()
            .find(|(name, _)| *name == split)
            .map(|(_, count)| *count);
        match expected {
            Some(expected) if expected != self.len() => Err(PgmDatasetError::config(format!(
                "split `{split}` has {} samples, expected {expected}",
                self.len()
            ))),
            _ => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn get(&self, index: usize) -> DatasetResult<&str> {
        self.identifiers
            .get(index)
            .map(String::as_str)
            .ok_or(PgmDatasetError::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }
}

fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(".tmp")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").expect("write file");
    }

    #[test]
    fn scan_filters_by_split_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b_train.npz", "a_train.npz", "c_val.npz", "d_test.npz"] {
            touch(dir.path(), name);
        }
        fs::create_dir(dir.path().join("z_train_dir")).expect("mkdir");
        let index = SampleIndex::scan(dir.path(), "train").expect("scan");
        assert_eq!(index.identifiers(), &["a_train.npz", "b_train.npz"]);
    }

    #[test]
    fn scan_skips_cache_staging_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "a_train.npz",
            ".a_train.npz.4242.00000000deadbeef.tmp",
            "b_train.npz.tmp",
        ] {
            touch(dir.path(), name);
        }
        let index = SampleIndex::scan(dir.path(), "train").expect("scan");
        assert_eq!(index.identifiers(), &["a_train.npz"]);
    }

    #[cfg(unix)]
    #[test]
    fn unlistable_directory_is_a_configuration_error() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).expect("mkdir");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");
        let result = SampleIndex::scan(&locked, "train");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");
        // Privileged users can list the directory regardless of its mode.
        if let Err(err) = result {
            assert!(matches!(err, PgmDatasetError::Configuration { .. }));
        }
    }

    #[test]
    fn missing_directory_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = SampleIndex::scan(&dir.path().join("absent"), "train").unwrap_err();
        assert!(matches!(err, PgmDatasetError::Configuration { .. }));
    }

    #[test]
    fn manifest_keeps_order_and_strips_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("small_val.txt");
        fs::write(&path, "/x/y/z_val.npz\n\na_val.npz\nrel/m_val.npz\n").expect("write");
        let index = SampleIndex::from_manifest(&path).expect("manifest");
        assert_eq!(index.identifiers(), &["z_val.npz", "a_val.npz", "m_val.npz"]);
    }

    #[test]
    fn missing_manifest_is_a_configuration_error() {
        let err = SampleIndex::from_manifest(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, PgmDatasetError::Configuration { .. }));
    }

    #[test]
    fn canonical_split_counts_are_enforced() {
        let index = SampleIndex::from_identifiers(vec!["a_val.npz".into()]);
        assert!(index.verify_split_count("val").is_err());
        assert!(index.verify_split_count("custom").is_ok());
    }

    #[test]
    fn out_of_range_lookup_fails() {
        let index = SampleIndex::from_identifiers(vec!["a".into()]);
        assert_eq!(index.get(0).ok(), Some("a"));
        assert!(matches!(
            index.get(1),
            Err(PgmDatasetError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }
}
