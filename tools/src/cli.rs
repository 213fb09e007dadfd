use clap::Args;
use pgm_dataset::DatasetConfig;
use std::path::PathBuf;

/// Dataset selection flags shared by the pgm tools; each overrides the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct DatasetArgs {
    /// Dataset root containing `{regime}/` or `data/{regime}/`.
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Root under which `cache/` is created (defaults to the dataset root).
    #[arg(long)]
    pub cache_root: Option<PathBuf>,
    /// Split tag, e.g. train, val, test.
    #[arg(long)]
    pub split: Option<String>,
    /// Regime directory name, e.g. neutral.
    #[arg(long)]
    pub regime: Option<String>,
    /// Target panel side length.
    #[arg(long)]
    pub image_size: Option<u32>,
    /// Named subset manifest (`{manifest_dir}/{subset}_{split}.txt`).
    #[arg(long)]
    pub subset: Option<String>,
    /// Skip the canonical split-size check.
    #[arg(long, default_value_t = false)]
    pub no_verify_counts: bool,
}

impl DatasetArgs {
    pub fn apply(&self, mut cfg: DatasetConfig) -> DatasetConfig {
        if let Some(root) = &self.root {
            cfg.root = Some(root.clone());
        }
        if let Some(cache_root) = &self.cache_root {
            cfg.cache_root = Some(cache_root.clone());
        }
        if let Some(split) = &self.split {
            cfg.split = split.clone();
        }
        if let Some(regime) = &self.regime {
            cfg.regime = regime.clone();
        }
        if let Some(size) = self.image_size {
            cfg.image_size = size;
        }
        if let Some(subset) = &self.subset {
            cfg.subset = Some(subset.clone());
        }
        if self.no_verify_counts {
            cfg.verify_split_counts = false;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_only_what_is_set() {
        let base = DatasetConfig {
            regime: "extrapolation".into(),
            image_size: 64,
            ..Default::default()
        };
        let args = DatasetArgs {
            split: Some("val".into()),
            no_verify_counts: true,
            ..Default::default()
        };
        let cfg = args.apply(base);
        assert_eq!(cfg.split, "val");
        assert_eq!(cfg.regime, "extrapolation");
        assert_eq!(cfg.image_size, 64);
        assert!(!cfg.verify_split_counts);
    }
}
