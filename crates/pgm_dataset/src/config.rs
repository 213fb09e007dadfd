//! Dataset configuration: every path, resolution, and policy flag the loader
//! needs, passed explicitly to each component at construction.

use crate::types::{DatasetResult, PgmDatasetError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "PGM_DATASET_CONFIG";
const DEFAULT_CONFIG_NAME: &str = "pgm-dataset.toml";
const DEFAULT_REGIME: &str = "neutral";
const DEFAULT_SPLIT: &str = "train";
const DEFAULT_IMAGE_SIZE: u32 = 80;
const DEFAULT_MANIFEST_DIR: &str = "files/pgm";

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetConfig {
    /// Raw dataset root. `None` runs cache-only.
    pub root: Option<PathBuf>,
    /// Root under which `cache/` lives; falls back to `root`.
    pub cache_root: Option<PathBuf>,
    pub split: String,
    pub regime: String,
    /// Target side length of every panel.
    pub image_size: u32,
    pub use_cache: bool,
    pub save_cache: bool,
    pub in_memory: bool,
    pub flip: bool,
    pub permute: bool,
    /// Named subset; selects `{manifest_dir}/{subset}_{split}.txt`.
    pub subset: Option<String>,
    pub manifest_dir: PathBuf,
    /// Explicit manifest file; takes precedence over `subset`.
    pub manifest: Option<PathBuf>,
    /// Assert the canonical train/val/test sizes when scanning a directory.
    pub verify_split_counts: bool,
    /// Seed for per-index reproducible augmentation.
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: None,
            cache_root: None,
            split: DEFAULT_SPLIT.to_string(),
            regime: DEFAULT_REGIME.to_string(),
            image_size: DEFAULT_IMAGE_SIZE,
            use_cache: false,
            save_cache: false,
            in_memory: false,
            flip: false,
            permute: false,
            subset: None,
            manifest_dir: PathBuf::from(DEFAULT_MANIFEST_DIR),
            manifest: None,
            verify_split_counts: true,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct DatasetConfigFile {
    root: Option<String>,
    cache_root: Option<String>,
    split: Option<String>,
    regime: Option<String>,
    image_size: Option<u32>,
    subset: Option<String>,
    manifest_dir: Option<String>,
    manifest: Option<String>,
    verify_split_counts: Option<bool>,
    seed: Option<u64>,
    cache: Option<CacheSection>,
    augment: Option<AugmentSection>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheSection {
    use_cache: Option<bool>,
    save_cache: Option<bool>,
    in_memory: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct AugmentSection {
    flip: Option<bool>,
    permute: Option<bool>,
}

impl DatasetConfig {
    /// Load from `$PGM_DATASET_CONFIG`, else `./pgm-dataset.toml`, else defaults.
    pub fn load() -> DatasetResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_NAME);
        if default_path.exists() {
            return Self::from_path(default_path);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> DatasetResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PgmDatasetError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            PgmDatasetError::Configuration { msg } => {
                PgmDatasetError::config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> DatasetResult<Self> {
        let file: DatasetConfigFile =
            toml::from_str(raw).map_err(|e| PgmDatasetError::config(e.to_string()))?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: DatasetConfigFile) -> Self {
        let defaults = Self::default();
        let cache = file.cache.unwrap_or_default();
        let augment = file.augment.unwrap_or_default();
        Self {
            root: file.root.map(|v| expand_path(&v)),
            cache_root: file.cache_root.map(|v| expand_path(&v)),
            split: file
                .split
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.split),
            regime: file
                .regime
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.regime),
            image_size: file.image_size.unwrap_or(defaults.image_size),
            use_cache: cache.use_cache.unwrap_or(defaults.use_cache),
            save_cache: cache.save_cache.unwrap_or(defaults.save_cache),
            in_memory: cache.in_memory.unwrap_or(defaults.in_memory),
            flip: augment.flip.unwrap_or(defaults.flip),
            permute: augment.permute.unwrap_or(defaults.permute),
            subset: file.subset.filter(|s| !s.trim().is_empty()),
            manifest_dir: file
                .manifest_dir
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.manifest_dir),
            manifest: file.manifest.map(|v| expand_path(&v)),
            verify_split_counts: file
                .verify_split_counts
                .unwrap_or(defaults.verify_split_counts),
            seed: file.seed,
        }
    }

    pub fn validate(&self) -> DatasetResult<()> {
        if self.image_size == 0 {
            return Err(PgmDatasetError::config("image_size must be positive"));
        }
        if self.split.trim().is_empty() {
            return Err(PgmDatasetError::config("split name is empty"));
        }
        if self.save_cache && !self.use_cache {
            return Err(PgmDatasetError::config(
                "save_cache requires use_cache to be enabled",
            ));
        }
        if self.root.is_none() && !self.use_cache {
            return Err(PgmDatasetError::config(
                "no dataset root configured and caching disabled; nothing to load from",
            ));
        }
        Ok(())
    }

    /// Directory holding the raw sample files for the configured regime.
    pub fn data_dir(&self) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        let nested = root.join("data");
        if nested.is_dir() {
            Some(nested.join(&self.regime))
        } else {
            Some(root.join(&self.regime))
        }
    }

    /// Root holding `cache/`: `cache_root` when set, else the dataset root.
    pub fn effective_cache_root(&self) -> Option<&Path> {
        self.cache_root.as_deref().or(self.root.as_deref())
    }

    /// `{cache_root}/cache/{regime}/{split}_{image_size}`.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.effective_cache_root().map(|root| {
            root.join("cache")
                .join(&self.regime)
                .join(format!("{}_{}", self.split, self.image_size))
        })
    }

    /// Manifest selecting a subset of the split, if one is configured.
    pub fn manifest_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.manifest {
            return Some(path.clone());
        }
        self.subset
            .as_ref()
            .map(|subset| self.manifest_dir.join(format!("{subset}_{}.txt", self.split)))
    }

    pub fn describe(&self) -> String {
        format!(
            "split={} regime={} image_size={} use_cache={} save_cache={} in_memory={} flip={} permute={} subset={} seed={}",
            self.split,
            self.regime,
            self.image_size,
            self.use_cache,
            self.save_cache,
            self.in_memory,
            self.flip,
            self.permute,
            self.subset.as_deref().unwrap_or("none"),
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}

fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

/// Substitute `${VAR}` references; unknown variables are left as written.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&rest[start..start + 3 + end]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_sections_override_defaults() -> DatasetResult<()> {
        let cfg = DatasetConfig::from_toml_str(
            r#"
root = "/data/pgm"
split = "val"
image_size = 160

[cache]
use_cache = true
save_cache = true

[augment]
permute = true
"#,
        )?;
        assert_eq!(cfg.root, Some(PathBuf::from("/data/pgm")));
        assert_eq!(cfg.split, "val");
        assert_eq!(cfg.regime, "neutral");
        assert_eq!(cfg.image_size, 160);
        assert!(cfg.use_cache && cfg.save_cache && !cfg.in_memory);
        assert!(cfg.permute && !cfg.flip);
        cfg.validate()
    }

    #[test]
    fn cache_dir_is_keyed_by_regime_split_and_resolution() {
        let cfg = DatasetConfig {
            root: Some(PathBuf::from("/data/pgm")),
            cache_root: Some(PathBuf::from("/scratch")),
            split: "test".into(),
            regime: "interpolation".into(),
            image_size: 64,
            ..Default::default()
        };
        assert_eq!(
            cfg.cache_dir(),
            Some(PathBuf::from("/scratch/cache/interpolation/test_64"))
        );
    }

    #[test]
    fn cache_root_falls_back_to_dataset_root() {
        let cfg = DatasetConfig {
            root: Some(PathBuf::from("/data/pgm")),
            ..Default::default()
        };
        assert_eq!(
            cfg.cache_dir(),
            Some(PathBuf::from("/data/pgm/cache/neutral/train_80"))
        );
    }

    #[test]
    fn subset_manifest_path_includes_split() {
        let cfg = DatasetConfig {
            subset: Some("small".into()),
            split: "val".into(),
            ..Default::default()
        };
        assert_eq!(
            cfg.manifest_path(),
            Some(PathBuf::from("files/pgm/small_val.txt"))
        );
    }

    #[test]
    fn save_without_use_cache_is_rejected() {
        let cfg = DatasetConfig {
            root: Some(PathBuf::from("/data")),
            save_cache: true,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(PgmDatasetError::Configuration { .. })
        ));
    }

    #[test]
    fn unknown_env_vars_are_kept_verbatim() {
        assert_eq!(
            expand_env("/a/${PGM_DATASET_SURELY_UNSET_VAR}/b"),
            "/a/${PGM_DATASET_SURELY_UNSET_VAR}/b"
        );
    }
}
