use std::fs;
use std::path::PathBuf;

use pgm_dataset::{DatasetConfig, PgmDatasetError};
use pgm_tools::DatasetArgs;

#[test]
fn loads_config_file_and_applies_flags() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pgm-dataset.toml");
    fs::write(
        &path,
        "root = \"/datasets/pgm\"\nregime = \"interpolation\"\n\n[cache]\nuse_cache = true\n",
    )?;
    let cfg = DatasetConfig::from_path(&path)?;
    assert_eq!(cfg.root, Some(PathBuf::from("/datasets/pgm")));
    assert!(cfg.use_cache);

    let args = DatasetArgs {
        image_size: Some(160),
        ..Default::default()
    };
    let cfg = args.apply(cfg);
    assert_eq!(cfg.image_size, 160);
    assert_eq!(cfg.regime, "interpolation");
    Ok(())
}

#[test]
fn invalid_toml_is_a_configuration_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.toml");
    fs::write(&path, "image_size = \"big\"\n")?;
    assert!(matches!(
        DatasetConfig::from_path(&path),
        Err(PgmDatasetError::Configuration { .. })
    ));
    Ok(())
}
