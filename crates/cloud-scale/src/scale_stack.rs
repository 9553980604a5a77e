//! Ordered stack of per-scale labelings.

use crate::error::{ScaleError, ScaleResult};
use crate::labeling::Labeling;

/// One [`Labeling`] per analysis scale, scales strictly increasing.
///
/// Filled one level at a time as the pipeline sweeps scales; once
/// complete it is the immutable input to persistence tracking (which
/// only relabels it through [`Labeling::apply_relabeling`]).
///
/// # Example
///
/// ```
/// use cloud_scale::{Labeling, ScaleStack};
///
/// let mut stack = ScaleStack::new();
/// stack.push(0.5, Labeling::new(10)).unwrap();
/// stack.push(1.0, Labeling::new(10)).unwrap();
///
/// assert_eq!(stack.level_count(), 2);
/// assert_eq!(stack.sample_count(), 10);
/// // Scales must keep increasing:
/// assert!(stack.push(0.75, Labeling::new(10)).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleStack {
    scales: Vec<f64>,
    levels: Vec<Labeling>,
}

impl ScaleStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a level.
    ///
    /// # Errors
    ///
    /// Returns an error if `scale` does not increase over the previous
    /// level or the labeling's sample count differs from the stack's.
    pub fn push(&mut self, scale: f64, labeling: Labeling) -> ScaleResult<()> {
        if let Some(&last) = self.scales.last() {
            if scale <= last {
                return Err(ScaleError::NonIncreasingScales {
                    level: self.scales.len(),
                    value: scale,
                });
            }
        }
        if let Some(first) = self.levels.first() {
            if labeling.sample_count() != first.sample_count() {
                return Err(ScaleError::SampleCountMismatch {
                    expected: first.sample_count(),
                    actual: labeling.sample_count(),
                });
            }
        }
        self.scales.push(scale);
        self.levels.push(labeling);
        Ok(())
    }

    /// Number of levels.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Returns `true` if the stack holds no levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of samples per level (0 for an empty stack).
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.levels.first().map_or(0, Labeling::sample_count)
    }

    /// The scale value of a level.
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of range.
    #[must_use]
    pub fn scale(&self, level: usize) -> f64 {
        self.scales[level]
    }

    /// All scale values, finest first.
    #[must_use]
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// The labeling of a level.
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of range.
    #[must_use]
    pub fn labeling(&self, level: usize) -> &Labeling {
        &self.levels[level]
    }

    /// Mutable access to a level's labeling (persistence relabeling).
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of range.
    pub fn labeling_mut(&mut self, level: usize) -> &mut Labeling {
        &mut self.levels[level]
    }

    /// Iterates `(scale, labeling)` pairs, finest first.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Labeling)> {
        self.scales.iter().copied().zip(self.levels.iter())
    }
}
