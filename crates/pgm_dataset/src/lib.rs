//! Dataset loading for PGM matrix-completion puzzles.
//!
//! This crate provides:
//! - Split indexing from a directory scan or a subset manifest
//! - Raw npz sample loading with bilinear panel resizing
//! - A per-sample compressed cache keyed by regime, split, and resolution
//! - An optional whole-dataset memory table
//! - Context flip and answer-permutation augmentations

pub mod accessor;
pub mod archive;
pub mod aug;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod index;
pub mod memory;
pub mod raw;
pub mod types;

pub use accessor::{FetchReport, FetchWarning, Fetched, SampleAccessor, Tier};
pub use archive::NpzArchive;
pub use aug::{
    apply_permutation, flip_context, verify_answer_invariant, AugmentationPipeline,
    CandidatePermutation, PanelTransform, FLIP_CONTEXT_ORDER,
};
pub use cache::{CacheLookup, CompressedCache};
pub use config::DatasetConfig;
pub use dataset::PgmDataset;
pub use index::SampleIndex;
pub use memory::MemoryTable;
pub use raw::{resize_panels, RawSampleLoader};
pub use types::*;
