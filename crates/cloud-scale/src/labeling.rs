//! Sample-to-region labeling with O(1) per-region population accounting.
//!
//! A [`Labeling`] maps every sample to a region label (or
//! [`UNLABELED`]) and maintains the population of each region
//! incrementally, so region sizes never need a rescan. Labels allocate
//! monotonically and are never reused within one labeling; compaction
//! renumbers them densely for downstream structures that index regions
//! by label.

use crate::error::{ScaleError, ScaleResult};

/// Sentinel label for samples not assigned to any region.
pub const UNLABELED: i32 = -1;

/// A sample → region map with incrementally maintained region
/// populations.
///
/// Populations are stored as `counts[label + 1]`, slot 0 counting
/// unlabeled samples, so `sum(counts) == sample_count` at all times.
/// Debug builds re-verify this invariant after every mutation.
///
/// # Example
///
/// ```
/// use cloud_scale::{Labeling, UNLABELED};
///
/// let mut labeling = Labeling::new(4);
/// let region = labeling.new_label();
/// labeling.set_label(0, region);
/// labeling.set_label(1, region);
///
/// assert_eq!(labeling.population(region), 2);
/// assert_eq!(labeling.unlabeled_count(), 2);
/// assert_eq!(labeling.label_of(3), UNLABELED);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labeling {
    labels: Vec<i32>,
    counts: Vec<usize>,
}

impl Labeling {
    /// Creates a labeling with every sample unlabeled and no regions
    /// allocated.
    #[must_use]
    pub fn new(sample_count: usize) -> Self {
        Self {
            labels: vec![UNLABELED; sample_count],
            counts: vec![sample_count],
        }
    }

    /// Reconstructs a labeling from raw per-sample labels, rebuilding
    /// populations (used when loading persisted scale-space state).
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::InvalidLabel`] if any label is below
    /// [`UNLABELED`].
    pub fn from_labels(labels: Vec<i32>) -> ScaleResult<Self> {
        let mut sup = 0i32;
        for (sample, &label) in labels.iter().enumerate() {
            if label < UNLABELED {
                return Err(ScaleError::InvalidLabel { sample, label });
            }
            sup = sup.max(label + 1);
        }
        #[allow(clippy::cast_sign_loss)]
        let mut counts = vec![0usize; sup as usize + 1];
        for &label in &labels {
            #[allow(clippy::cast_sign_loss)]
            let slot = (label + 1) as usize;
            counts[slot] += 1;
        }
        let labeling = Self { labels, counts };
        debug_assert!(labeling.invariants_hold());
        Ok(labeling)
    }

    /// Number of samples.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.labels.len()
    }

    /// Exclusive upper bound of allocated labels: labels live in
    /// `[0, label_sup)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn label_sup(&self) -> i32 {
        (self.counts.len() - 1) as i32
    }

    /// The label of `sample`.
    ///
    /// # Panics
    ///
    /// Panics if `sample` is out of range; an out-of-range sample is a
    /// precondition violation.
    #[must_use]
    pub fn label_of(&self, sample: u32) -> i32 {
        self.labels[sample as usize]
    }

    /// Population of a region (or of the unlabeled pool for
    /// [`UNLABELED`]).
    ///
    /// # Panics
    ///
    /// Panics if `label` is outside `[-1, label_sup)`.
    #[must_use]
    pub fn population(&self, label: i32) -> usize {
        assert!(label >= UNLABELED && label < self.label_sup());
        #[allow(clippy::cast_sign_loss)]
        let slot = (label + 1) as usize;
        self.counts[slot]
    }

    /// Number of unlabeled samples.
    #[must_use]
    pub fn unlabeled_count(&self) -> usize {
        self.counts[0]
    }

    /// Allocates a fresh region label with zero population.
    ///
    /// Labels grow monotonically; invalidated labels are never reused
    /// within one labeling.
    pub fn new_label(&mut self) -> i32 {
        let label = self.label_sup();
        self.counts.push(0);
        label
    }

    /// Moves `sample` to `label`, updating both populations.
    ///
    /// # Panics
    ///
    /// Panics if `sample` is out of range or `label` was never
    /// allocated.
    pub fn set_label(&mut self, sample: u32, label: i32) {
        assert!(label >= UNLABELED && label < self.label_sup());
        let old = self.labels[sample as usize];
        #[allow(clippy::cast_sign_loss)]
        {
            self.counts[(old + 1) as usize] -= 1;
            self.counts[(label + 1) as usize] += 1;
        }
        self.labels[sample as usize] = label;
        debug_assert!(self.invariants_hold());
    }

    /// Moves every sample of every region matched by
    /// `predicate(label, population)` back to [`UNLABELED`], zeroing the
    /// region's population. Returns the number of samples invalidated.
    pub fn invalidate<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(i32, usize) -> bool,
    {
        let sup = self.label_sup();
        let mut doomed = vec![false; self.counts.len() - 1];
        let mut moved = 0usize;
        for label in 0..sup {
            #[allow(clippy::cast_sign_loss)]
            let slot = (label + 1) as usize;
            if self.counts[slot] > 0 && predicate(label, self.counts[slot]) {
                doomed[slot - 1] = true;
                moved += self.counts[slot];
                self.counts[0] += self.counts[slot];
                self.counts[slot] = 0;
            }
        }
        if moved > 0 {
            for label in &mut self.labels {
                #[allow(clippy::cast_sign_loss)]
                if *label >= 0 && doomed[*label as usize] {
                    *label = UNLABELED;
                }
            }
        }
        debug_assert!(self.invariants_hold());
        moved
    }

    /// `true` when no sample is unlabeled.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.counts[0] == 0
    }

    /// `true` when no zero-population label sits below the highest
    /// populated one.
    #[must_use]
    pub fn is_continuous(&self) -> bool {
        let populated = &self.counts[1..];
        let highest = match populated.iter().rposition(|&c| c > 0) {
            Some(p) => p,
            None => return true,
        };
        populated[..highest].iter().all(|&c| c > 0)
    }

    /// `true` when every allocated label is populated: continuous with
    /// no trailing empty labels.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.counts[1..].iter().all(|&c| c > 0)
    }

    /// `true` when every sample is labeled and every label populated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_valid() && self.is_full()
    }

    /// Renumbers labels so populated ones form a dense order-preserving
    /// prefix; empty labels move behind them (still allocated). Returns
    /// the number of populated labels.
    pub fn make_continuous(&mut self) -> usize {
        let sup = self.label_sup();
        let mut remap = vec![UNLABELED; self.counts.len() - 1];
        let mut next = 0i32;
        for label in 0..sup {
            #[allow(clippy::cast_sign_loss)]
            if self.counts[(label + 1) as usize] > 0 {
                #[allow(clippy::cast_sign_loss)]
                {
                    remap[label as usize] = next;
                }
                next += 1;
            }
        }
        // Empty labels keep their relative order behind the populated ones.
        let mut tail = next;
        for slot in &mut remap {
            if *slot == UNLABELED {
                *slot = tail;
                tail += 1;
            }
        }
        self.apply_relabeling(&remap);
        #[allow(clippy::cast_sign_loss)]
        let populated = next as usize;
        populated
    }

    /// Compacts to a dense labeling: [`Self::make_continuous`] plus
    /// dropping the empty tail, so `label_sup` equals the number of
    /// populated regions. Returns that number.
    pub fn make_full(&mut self) -> usize {
        let populated = self.make_continuous();
        self.counts.truncate(populated + 1);
        debug_assert!(self.is_full());
        debug_assert!(self.invariants_hold());
        populated
    }

    /// Applies a label bijection in place: sample labels are rewritten
    /// through `new_of_old` and populations permuted accordingly.
    /// [`UNLABELED`] samples are unaffected.
    ///
    /// # Panics
    ///
    /// Panics if `new_of_old` is not a permutation of `[0, label_sup)`.
    pub fn apply_relabeling(&mut self, new_of_old: &[i32]) {
        assert_eq!(new_of_old.len() + 1, self.counts.len());
        let mut new_counts = vec![0usize; self.counts.len()];
        new_counts[0] = self.counts[0];
        let mut hit = vec![false; new_of_old.len()];
        for (old, &new) in new_of_old.iter().enumerate() {
            #[allow(clippy::cast_sign_loss)]
            let new_slot = new as usize;
            assert!(
                new >= 0 && new_slot < new_of_old.len() && !hit[new_slot],
                "relabeling is not a bijection"
            );
            hit[new_slot] = true;
            new_counts[new_slot + 1] = self.counts[old + 1];
        }
        for label in &mut self.labels {
            if *label >= 0 {
                #[allow(clippy::cast_sign_loss)]
                {
                    *label = new_of_old[*label as usize];
                }
            }
        }
        self.counts = new_counts;
        debug_assert!(self.invariants_hold());
    }

    /// All samples currently carrying `label`.
    #[must_use]
    pub fn samples_of(&self, label: i32) -> Vec<u32> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == label)
            .map(|(i, _)| {
                #[allow(clippy::cast_possible_truncation)]
                let id = i as u32;
                id
            })
            .collect()
    }

    /// Raw per-sample labels.
    #[must_use]
    pub fn as_slice(&self) -> &[i32] {
        &self.labels
    }

    pub(crate) fn invariants_hold(&self) -> bool {
        let total: usize = self.counts.iter().sum();
        if total != self.labels.len() {
            return false;
        }
        let mut actual = vec![0usize; self.counts.len()];
        for &label in &self.labels {
            if label < UNLABELED || label >= self.label_sup() {
                return false;
            }
            #[allow(clippy::cast_sign_loss)]
            {
                actual[(label + 1) as usize] += 1;
            }
        }
        actual == self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn new_labeling_is_all_unlabeled() {
        let labeling = Labeling::new(5);
        assert_eq!(labeling.unlabeled_count(), 5);
        assert_eq!(labeling.label_sup(), 0);
        assert!(!labeling.is_valid());
        assert!(labeling.is_full());
    }

    #[test]
    fn set_label_moves_populations() {
        let mut labeling = Labeling::new(3);
        let a = labeling.new_label();
        let b = labeling.new_label();

        labeling.set_label(0, a);
        labeling.set_label(1, a);
        labeling.set_label(1, b);

        assert_eq!(labeling.population(a), 1);
        assert_eq!(labeling.population(b), 1);
        assert_eq!(labeling.unlabeled_count(), 1);
    }

    #[test]
    fn labels_allocate_monotonically() {
        let mut labeling = Labeling::new(1);
        assert_eq!(labeling.new_label(), 0);
        assert_eq!(labeling.new_label(), 1);
        assert_eq!(labeling.new_label(), 2);
        assert_eq!(labeling.label_sup(), 3);
    }

    #[test]
    fn invalidate_zeroes_matched_regions() {
        let mut labeling = Labeling::new(6);
        let a = labeling.new_label();
        let b = labeling.new_label();
        for i in 0..4 {
            labeling.set_label(i, a);
        }
        labeling.set_label(4, b);
        labeling.set_label(5, b);

        let moved = labeling.invalidate(|_, population| population < 3);
        assert_eq!(moved, 2);
        assert_eq!(labeling.population(b), 0);
        assert_eq!(labeling.population(a), 4);
        assert_eq!(labeling.unlabeled_count(), 2);
        assert_eq!(labeling.label_of(4), UNLABELED);
    }

    #[test]
    fn continuity_and_fullness_predicates() {
        let mut labeling = Labeling::new(4);
        let a = labeling.new_label();
        let b = labeling.new_label();
        let c = labeling.new_label();
        labeling.set_label(0, a);
        labeling.set_label(1, b);
        labeling.set_label(2, c);
        labeling.set_label(3, c);
        assert!(labeling.is_continuous());
        assert!(labeling.is_full());

        // Knock out the middle region: a hole appears.
        labeling.invalidate(|label, _| label == b);
        assert!(!labeling.is_continuous());
        assert!(!labeling.is_full());

        labeling.make_continuous();
        assert!(labeling.is_continuous());
        assert!(!labeling.is_full()); // empty tail label remains allocated
        assert_eq!(labeling.label_of(2), 1);

        labeling.make_full();
        assert!(labeling.is_full());
        assert_eq!(labeling.label_sup(), 2);
    }

    #[test]
    fn make_continuous_preserves_order() {
        let mut labeling = Labeling::new(3);
        for _ in 0..5 {
            labeling.new_label();
        }
        labeling.set_label(0, 1);
        labeling.set_label(1, 3);
        labeling.set_label(2, 4);

        labeling.make_full();
        assert_eq!(labeling.label_of(0), 0);
        assert_eq!(labeling.label_of(1), 1);
        assert_eq!(labeling.label_of(2), 2);
    }

    #[test]
    fn apply_relabeling_permutes_counts() {
        let mut labeling = Labeling::new(3);
        let a = labeling.new_label();
        let b = labeling.new_label();
        labeling.set_label(0, a);
        labeling.set_label(1, a);
        labeling.set_label(2, b);

        labeling.apply_relabeling(&[1, 0]);
        assert_eq!(labeling.population(0), 1);
        assert_eq!(labeling.population(1), 2);
        assert_eq!(labeling.label_of(0), 1);
    }

    #[test]
    fn from_labels_rebuilds_counts() {
        let labeling = Labeling::from_labels(vec![0, 0, 2, UNLABELED]).unwrap();
        assert_eq!(labeling.label_sup(), 3);
        assert_eq!(labeling.population(0), 2);
        assert_eq!(labeling.population(1), 0);
        assert_eq!(labeling.population(2), 1);
        assert_eq!(labeling.unlabeled_count(), 1);
    }

    #[test]
    fn from_labels_rejects_bad_label() {
        assert!(Labeling::from_labels(vec![0, -2]).is_err());
    }

    #[test]
    fn randomized_operation_sequences_keep_invariants() {
        let mut rng = SmallRng::seed_from_u64(99);
        let n = 64usize;
        let mut labeling = Labeling::new(n);

        for _ in 0..2_000 {
            match rng.gen_range(0..10) {
                0 => {
                    labeling.new_label();
                }
                1 if labeling.label_sup() > 0 => {
                    let cutoff = rng.gen_range(0..4);
                    labeling.invalidate(|_, population| population <= cutoff);
                }
                2 => {
                    labeling.make_continuous();
                }
                3 => {
                    labeling.make_full();
                }
                _ if labeling.label_sup() > 0 => {
                    #[allow(clippy::cast_possible_truncation)]
                    let sample = rng.gen_range(0..n) as u32;
                    let label = rng.gen_range(-1..labeling.label_sup());
                    labeling.set_label(sample, label);
                }
                _ => {}
            }
            assert!(labeling.invariants_hold());
        }
    }
}
