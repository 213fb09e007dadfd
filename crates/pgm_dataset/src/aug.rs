//! Panel augmentations: context flip and answer-position permutation.
//!
//! Both are expressed as a gather over panel indices that builds a new
//! stack. The permutation is split into draw, apply, and verify so each step
//! can be exercised on its own.

use crate::config::DatasetConfig;
use crate::types::{
    AnswerInvariantViolation, DatasetResult, PanelStack, PgmSample, SampleRecord, NUM_CANDIDATES,
    NUM_CONTEXT, NUM_PANELS,
};
use ndarray::{Array1, ArrayD};
use rand::seq::SliceRandom;
use rand::Rng;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// Context reordering applied by the flip augmentation. Keep this exact list;
/// it swaps rows and columns of the 3x3 context grid.
pub const FLIP_CONTEXT_ORDER: [usize; NUM_CONTEXT] = [0, 3, 6, 1, 4, 7, 2, 5];
const FLIP_PROB: f64 = 0.5;

/// User hook run on the 8-bit panels before any augmentation.
pub trait PanelTransform: Send + Sync {
    fn apply(&self, panels: PanelStack) -> DatasetResult<PanelStack>;
}

impl<F> PanelTransform for F
where
    F: Fn(PanelStack) -> DatasetResult<PanelStack> + Send + Sync,
{
    fn apply(&self, panels: PanelStack) -> DatasetResult<PanelStack> {
        self(panels)
    }
}

fn identity_order() -> [usize; NUM_PANELS] {
    std::array::from_fn(|i| i)
}

/// Reorder the context panels through [`FLIP_CONTEXT_ORDER`]; candidates stay put.
pub fn flip_context(panels: &PanelStack) -> PanelStack {
    let mut order = identity_order();
    order[..NUM_CONTEXT].copy_from_slice(&FLIP_CONTEXT_ORDER);
    panels.gather(&order)
}

/// Relabeling of the candidate slots: the panel in slot `i` moves to slot `slots[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidatePermutation([usize; NUM_CANDIDATES]);

impl CandidatePermutation {
    pub fn identity() -> Self {
        Self(std::array::from_fn(|i| i))
    }

    /// Uniformly random permutation of the eight candidate slots.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut slots = Self::identity().0;
        slots.shuffle(rng);
        Self(slots)
    }

    /// `None` unless `slots` contains each of `0..8` exactly once.
    pub fn from_slots(slots: [usize; NUM_CANDIDATES]) -> Option<Self> {
        let mut seen = [false; NUM_CANDIDATES];
        for &slot in &slots {
            if slot >= NUM_CANDIDATES || seen[slot] {
                return None;
            }
            seen[slot] = true;
        }
        Some(Self(slots))
    }

    pub fn destination(&self, slot: usize) -> usize {
        self.0[slot]
    }

    pub fn slots(&self) -> &[usize; NUM_CANDIDATES] {
        &self.0
    }

    /// Full-stack gather order: for each output panel, the input panel it comes from.
    fn source_order(&self) -> [usize; NUM_PANELS] {
        let mut order = identity_order();
        for (from, &to) in self.0.iter().enumerate() {
            order[NUM_CONTEXT + to] = NUM_CONTEXT + from;
        }
        order
    }
}

/// Move every candidate to its new slot and return the relabeled target.
pub fn apply_permutation(
    panels: &PanelStack,
    target: usize,
    permutation: &CandidatePermutation,
) -> (PanelStack, usize) {
    (
        panels.gather(&permutation.source_order()),
        permutation.destination(target),
    )
}

/// The answer panel after relabeling must be bit-identical to the one before.
pub fn verify_answer_invariant(
    before: &PanelStack,
    old_target: usize,
    after: &PanelStack,
    new_target: usize,
) -> Result<(), AnswerInvariantViolation> {
    let violation = AnswerInvariantViolation {
        old_target,
        new_target,
    };
    if old_target >= NUM_CANDIDATES || new_target >= NUM_CANDIDATES {
        return Err(violation);
    }
    if before.candidate(old_target) != after.candidate(new_target) {
        return Err(violation);
    }
    Ok(())
}

#[derive(Clone, Default)]
pub struct AugmentationPipeline {
    flip: bool,
    permute: bool,
    transform: Option<Arc<dyn PanelTransform>>,
}

impl fmt::Debug for AugmentationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AugmentationPipeline")
            .field("flip", &self.flip)
            .field("permute", &self.permute)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl AugmentationPipeline {
    pub fn new(flip: bool, permute: bool) -> Self {
        Self {
            flip,
            permute,
            transform: None,
        }
    }

    pub fn from_config(cfg: &DatasetConfig) -> Self {
        Self::new(cfg.flip, cfg.permute)
    }

    pub fn with_transform(mut self, transform: Arc<dyn PanelTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn flip(&self) -> bool {
        self.flip
    }

    pub fn permute(&self) -> bool {
        self.permute
    }

    /// Transform, maybe flip, maybe permute, then convert to the float sample.
    ///
    /// Aborts the process if the permutation moved the answer panel anywhere
    /// but the new target slot. That can only be caused by a bug in this
    /// module, and a worker thread must not carry on with a mislabeled sample.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        record: &SampleRecord,
        identifier: &str,
        rng: &mut R,
    ) -> DatasetResult<PgmSample> {
        let mut panels = match &self.transform {
            Some(transform) => Cow::Owned(transform.apply(record.panels.clone())?),
            None => Cow::Borrowed(&record.panels),
        };
        let mut target = record.labels.target;

        if self.flip && rng.random_bool(FLIP_PROB) {
            panels = Cow::Owned(flip_context(&panels));
        }

        if self.permute {
            let permutation = CandidatePermutation::random(rng);
            let (permuted, new_target) = apply_permutation(&panels, target, &permutation);
            if let Err(violation) =
                verify_answer_invariant(&panels, target, &permuted, new_target)
            {
                error!("{identifier}: {violation} (permutation {:?})", permutation.slots());
                std::process::abort();
            }
            panels = Cow::Owned(permuted);
            target = new_target;
        }

        Ok(PgmSample {
            panels: panels.to_tensor(),
            target: target as i64,
            meta_target: flatten(&record.labels.meta_target),
            structure_encoded: flatten(&record.labels.relation_structure_encoded),
            identifier: identifier.to_string(),
        })
    }
}

fn flatten(values: &ArrayD<f32>) -> Array1<f32> {
    values.iter().copied().collect()
}
