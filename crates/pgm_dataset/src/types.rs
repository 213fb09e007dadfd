//! Core types, error definitions, and data structures for pgm_dataset.

use ndarray::{Array1, Array3, ArrayD, ArrayView2, Axis};
use std::path::PathBuf;
use thiserror::Error;

/// Panels per puzzle: 8 context panels followed by 8 candidate answers.
pub const NUM_PANELS: usize = 16;
pub const NUM_CONTEXT: usize = 8;
pub const NUM_CANDIDATES: usize = 8;
/// Side length of the panels stored in the raw dataset files.
pub const NATIVE_RESOLUTION: u32 = 160;

pub type DatasetResult<T> = Result<T, PgmDatasetError>;

#[derive(Debug, Error)]
pub enum PgmDatasetError {
    #[error("configuration error: {msg}")]
    Configuration { msg: String },
    #[error("cannot read source sample {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
    #[error("cannot write cache entry {path}: {source}")]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
    #[error("index {index} out of range for dataset of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("panel transform failed: {0}")]
    Transform(String),
    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PgmDatasetError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PgmDatasetError::Configuration { msg: msg.into() }
    }
}

/// Failures while reading or writing a `.npz` archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("zip error at {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("cannot decode member `{member}`: {source}")]
    NpyRead {
        member: String,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },
    #[error("cannot encode member `{member}`: {source}")]
    NpyWrite {
        member: String,
        #[source]
        source: ndarray_npy::WriteNpyError,
    },
    #[error("member `{member}` missing from archive")]
    MissingMember { member: String },
    #[error("member `{member}` is malformed: {msg}")]
    Malformed { member: String, msg: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected a [16, H, H] panel stack, got {shape:?}")]
pub struct PanelShapeError {
    pub shape: Vec<usize>,
}

/// The correct answer's pixels moved somewhere other than the relabeled target.
///
/// This is a logic defect in the permutation code, never a data problem, so
/// the augmentation pipeline logs it and aborts instead of returning it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "answer invariant violated: candidate {old_target} before permutation differs from candidate {new_target} after"
)]
pub struct AnswerInvariantViolation {
    pub old_target: usize,
    pub new_target: usize,
}

/// Sixteen square 8-bit panels in `[panel, row, col]` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelStack(Array3<u8>);

impl PanelStack {
    pub fn new(panels: Array3<u8>) -> Result<Self, PanelShapeError> {
        let (count, rows, cols) = panels.dim();
        if count != NUM_PANELS || rows != cols || rows == 0 {
            return Err(PanelShapeError {
                shape: vec![count, rows, cols],
            });
        }
        Ok(Self(panels))
    }

    /// Side length of every panel.
    pub fn resolution(&self) -> usize {
        self.0.dim().1
    }

    pub fn panel(&self, slot: usize) -> ArrayView2<'_, u8> {
        self.0.index_axis(Axis(0), slot)
    }

    /// Candidate panel `slot` in `0..8`.
    pub fn candidate(&self, slot: usize) -> ArrayView2<'_, u8> {
        self.panel(NUM_CONTEXT + slot)
    }

    /// Build a new stack whose panel `i` is this stack's panel `order[i]`.
    pub fn gather(&self, order: &[usize; NUM_PANELS]) -> Self {
        Self(self.0.select(Axis(0), order))
    }

    pub fn as_array(&self) -> &Array3<u8> {
        &self.0
    }

    pub fn into_array(self) -> Array3<u8> {
        self.0
    }

    pub fn to_tensor(&self) -> Array3<f32> {
        self.0.mapv(f32::from)
    }
}

/// A serialized `.npy` member kept byte-for-byte.
///
/// The raw relation structure is a NumPy byte-string array; it is never
/// interpreted here, only carried from the source file into cache entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpyBlob(pub Vec<u8>);

impl NpyBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
    /// Index of the correct candidate, always in `0..8`.
    pub target: usize,
    pub meta_target: ArrayD<f32>,
    pub relation_structure: NpyBlob,
    pub relation_structure_encoded: ArrayD<f32>,
}

/// Resized panels plus labels: the content of a cache or memory table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub panels: PanelStack,
    pub labels: Labels,
}

/// A fully materialized, augmented sample ready for a training loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PgmSample {
    /// `[16, H, H]` intensities in `0.0..=255.0`.
    pub panels: Array3<f32>,
    pub target: i64,
    pub meta_target: Array1<f32>,
    pub structure_encoded: Array1<f32>,
    /// Source file basename, for tracing a sample back to disk.
    pub identifier: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_stack_rejects_wrong_panel_count() {
        let err = PanelStack::new(Array3::zeros((15, 4, 4))).unwrap_err();
        assert_eq!(err.shape, vec![15, 4, 4]);
    }

    #[test]
    fn panel_stack_rejects_non_square_panels() {
        assert!(PanelStack::new(Array3::zeros((16, 4, 5))).is_err());
    }

    #[test]
    fn gather_reorders_whole_panels() {
        let panels = Array3::from_shape_fn((16, 2, 2), |(p, _, _)| p as u8);
        let stack = PanelStack::new(panels).unwrap();
        let mut order: [usize; NUM_PANELS] = std::array::from_fn(|i| i);
        order.swap(0, 15);
        let gathered = stack.gather(&order);
        assert!(gathered.panel(0).iter().all(|&v| v == 15));
        assert!(gathered.panel(15).iter().all(|&v| v == 0));
        assert_eq!(gathered.candidate(0), stack.candidate(0));
    }
}
