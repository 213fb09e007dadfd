//! Loading raw sample archives and resizing their panels.

use crate::archive::NpzArchive;
use crate::config::DatasetConfig;
use crate::types::{
    ArchiveError, DatasetResult, Labels, PanelShapeError, PanelStack, PgmDatasetError,
    SampleRecord, NATIVE_RESOLUTION, NUM_CANDIDATES, NUM_PANELS,
};
use image::imageops::FilterType;
use image::{GrayImage, Luma};
use ndarray::{Array3, ArrayView2};
use std::path::{Path, PathBuf};

pub const IMAGE_KEY: &str = "image";
pub const TARGET_KEY: &str = "target";
pub const META_TARGET_KEY: &str = "meta_target";
pub const RELATION_STRUCTURE_KEY: &str = "relation_structure";
pub const RELATION_STRUCTURE_ENCODED_KEY: &str = "relation_structure_encoded";

#[derive(Debug, Clone)]
pub struct RawSampleLoader {
    data_dir: Option<PathBuf>,
    image_size: u32,
}

impl RawSampleLoader {
    pub fn new(data_dir: Option<PathBuf>, image_size: u32) -> Self {
        Self {
            data_dir,
            image_size,
        }
    }

    pub fn from_config(cfg: &DatasetConfig) -> Self {
        Self::new(cfg.data_dir(), cfg.image_size)
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Read `identifier` from the data directory and resize it to the target resolution.
    pub fn load(&self, identifier: &str) -> DatasetResult<SampleRecord> {
        let dir = self.data_dir.as_ref().ok_or_else(|| {
            PgmDatasetError::config(format!(
                "no raw data directory configured; cannot load {identifier}"
            ))
        })?;
        let path = dir.join(identifier);
        let source_error = |source: ArchiveError| PgmDatasetError::SourceRead {
            path: path.clone(),
            source,
        };
        let archive = NpzArchive::open(&path).map_err(source_error)?;
        let record =
            decode_record(&archive, NATIVE_RESOLUTION as usize).map_err(source_error)?;
        let panels = resize_panels(&record.panels, self.image_size)
            .map_err(|e| source_error(shape_error(IMAGE_KEY, e)))?;
        Ok(SampleRecord {
            panels,
            labels: record.labels,
        })
    }
}

/// Decode the five named members, expecting an image of `[16, side, side]` pixels.
pub(crate) fn decode_record(
    archive: &NpzArchive,
    side: usize,
) -> Result<SampleRecord, ArchiveError> {
    let image = archive.read_u8(IMAGE_KEY)?;
    let expected = NUM_PANELS * side * side;
    if image.len() != expected {
        return Err(ArchiveError::Malformed {
            member: IMAGE_KEY.to_string(),
            msg: format!(
                "expected {expected} pixels for [{NUM_PANELS}, {side}, {side}], got shape {:?}",
                image.shape()
            ),
        });
    }
    let flat: Vec<u8> = image.iter().copied().collect();
    let panels = Array3::from_shape_vec((NUM_PANELS, side, side), flat).map_err(|e| {
        ArchiveError::Malformed {
            member: IMAGE_KEY.to_string(),
            msg: e.to_string(),
        }
    })?;
    let panels = PanelStack::new(panels).map_err(|e| shape_error(IMAGE_KEY, e))?;

    let raw_target = archive.read_scalar_i64(TARGET_KEY)?;
    let target = usize::try_from(raw_target)
        .ok()
        .filter(|t| *t < NUM_CANDIDATES)
        .ok_or_else(|| ArchiveError::Malformed {
            member: TARGET_KEY.to_string(),
            msg: format!("target {raw_target} outside 0..{NUM_CANDIDATES}"),
        })?;

    Ok(SampleRecord {
        panels,
        labels: Labels {
            target,
            meta_target: archive.read_f32(META_TARGET_KEY)?,
            relation_structure: archive.blob(RELATION_STRUCTURE_KEY)?,
            relation_structure_encoded: archive.read_f32(RELATION_STRUCTURE_ENCODED_KEY)?,
        },
    })
}

/// Bilinear (triangle filter) resize of every panel to `size`x`size`.
///
/// The filter support widens with the downscale ratio, which gives the
/// anti-aliasing. A stack already at `size` is returned unchanged.
///
/// Filtered values are rounded to the nearest `u8`. Caches written by the
/// Python loader truncated after a Gaussian prefilter instead, so their
/// entries can differ from ours by a level or two; do not mix the two in one
/// cache directory.
pub fn resize_panels(panels: &PanelStack, size: u32) -> Result<PanelStack, PanelShapeError> {
    if panels.resolution() == size as usize {
        return Ok(panels.clone());
    }
    let resized: Vec<GrayImage> = (0..NUM_PANELS)
        .map(|slot| resize_panel(panels.panel(slot), size))
        .collect();
    let side = size as usize;
    PanelStack::new(Array3::from_shape_fn(
        (NUM_PANELS, side, side),
        |(slot, row, col)| resized[slot].get_pixel(col as u32, row as u32)[0],
    ))
}

fn resize_panel(panel: ArrayView2<'_, u8>, size: u32) -> GrayImage {
    let (rows, cols) = panel.dim();
    let img = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([panel[[y as usize, x as usize]]])
    });
    image::imageops::resize(&img, size, size, FilterType::Triangle)
}

fn shape_error(member: &str, err: PanelShapeError) -> ArchiveError {
    ArchiveError::Malformed {
        member: member.to_string(),
        msg: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, arr1, Array2};

    fn gradient_stack(side: usize) -> PanelStack {
        PanelStack::new(Array3::from_shape_fn((NUM_PANELS, side, side), |(p, r, c)| {
            ((p * 13 + r * 3 + c) % 256) as u8
        }))
        .expect("valid stack")
    }

    #[test]
    fn native_resolution_is_identity() {
        let stack = gradient_stack(NATIVE_RESOLUTION as usize);
        let resized = resize_panels(&stack, NATIVE_RESOLUTION).expect("resize");
        assert_eq!(resized, stack);
    }

    #[test]
    fn downscale_keeps_panel_count_and_range() {
        let stack = PanelStack::new(Array3::from_elem((NUM_PANELS, 160, 160), 200u8))
            .expect("valid stack");
        let resized = resize_panels(&stack, 80).expect("resize");
        assert_eq!(resized.as_array().dim(), (NUM_PANELS, 80, 80));
        assert!(resized.as_array().iter().all(|&v| v == 200));
    }

    #[test]
    fn resize_rounds_to_nearest_level() {
        let stack = PanelStack::new(Array3::from_shape_fn((NUM_PANELS, 2, 2), |(_, _, c)| {
            if c == 0 { 0 } else { 255 }
        }))
        .expect("valid stack");
        let resized = resize_panels(&stack, 1).expect("resize");
        assert_eq!(resized.panel(0)[[0, 0]], 128);
    }

    #[test]
    fn resize_keeps_panels_apart() {
        let stack = PanelStack::new(Array3::from_shape_fn((NUM_PANELS, 32, 32), |(p, _, _)| {
            (p * 10) as u8
        }))
        .expect("valid stack");
        let resized = resize_panels(&stack, 8).expect("resize");
        for slot in 0..NUM_PANELS {
            assert!(resized.panel(slot).iter().all(|&v| v == (slot * 10) as u8));
        }
    }

    fn archive_with_target(target: i64) -> NpzArchive {
        let mut archive = NpzArchive::new();
        archive
            .insert_array(IMAGE_KEY, &Array2::<u8>::zeros((4 * NUM_PANELS, 4)))
            .expect("image");
        archive.insert_array(TARGET_KEY, &arr0(target)).expect("target");
        archive
            .insert_array(META_TARGET_KEY, &arr1(&[1u8, 0, 1]))
            .expect("meta");
        archive
            .insert_array(RELATION_STRUCTURE_KEY, &arr1(&[7u8]))
            .expect("structure");
        archive
            .insert_array(RELATION_STRUCTURE_ENCODED_KEY, &Array2::<u8>::ones((2, 3)))
            .expect("encoded");
        archive
    }

    #[test]
    fn decode_flattens_image_into_panels() {
        let record = decode_record(&archive_with_target(3), 4).expect("decode");
        assert_eq!(record.panels.as_array().dim(), (NUM_PANELS, 4, 4));
        assert_eq!(record.labels.target, 3);
        assert_eq!(record.labels.relation_structure_encoded.shape(), &[2, 3]);
    }

    #[test]
    fn decode_rejects_target_outside_candidates() {
        let err = decode_record(&archive_with_target(8), 4).unwrap_err();
        assert!(matches!(err, ArchiveError::Malformed { ref member, .. } if member == TARGET_KEY));
    }

    #[test]
    fn decode_rejects_wrong_pixel_count() {
        assert!(decode_record(&archive_with_target(0), 5).is_err());
    }

    #[test]
    fn missing_raw_file_is_a_source_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = RawSampleLoader::new(Some(dir.path().to_path_buf()), 80);
        assert!(matches!(
            loader.load("absent_train.npz"),
            Err(PgmDatasetError::SourceRead { .. })
        ));
    }
}
