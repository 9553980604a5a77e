//! Error types for scale-space segmentation.

use thiserror::Error;

/// Result type for scale-space operations.
pub type ScaleResult<T> = Result<T, ScaleError>;

/// Errors that can occur during scale-space segmentation and
/// persistence I/O.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// The point set is empty.
    #[error("point set is empty")]
    EmptyPointSet,

    /// No analysis scales were supplied.
    #[error("scale list is empty")]
    EmptyScaleList,

    /// Scales must be strictly increasing.
    #[error("scale {value} at level {level} does not increase over the previous scale")]
    NonIncreasingScales {
        /// Level of the offending scale.
        level: usize,
        /// The offending scale value.
        value: f64,
    },

    /// A labeling's sample count does not match the stack's.
    #[error("labeling has {actual} samples, stack expects {expected}")]
    SampleCountMismatch {
        /// Sample count the stack was created with.
        expected: usize,
        /// Sample count of the rejected labeling.
        actual: usize,
    },

    /// Per-point feature arrays do not match the point count.
    #[error("feature array `{name}` has {actual} entries for {expected} points")]
    FeatureLengthMismatch {
        /// Name of the offending feature array.
        name: &'static str,
        /// Number of points.
        expected: usize,
        /// Length of the feature array.
        actual: usize,
    },

    /// Persisted data failed validation against the expected point count.
    #[error("persisted scale space holds {actual} points, companion data expects {expected}")]
    PointCountMismatch {
        /// Point count expected by the caller.
        expected: usize,
        /// Point count found in the file.
        actual: usize,
    },

    /// Persisted scale array length disagrees with the header.
    #[error("scale array holds {trailer} scales, header declares {header}")]
    ScaleCountMismatch {
        /// Scale count declared in the header.
        header: usize,
        /// Scale count of the trailing array.
        trailer: usize,
    },

    /// A persisted label is below the unlabeled sentinel.
    #[error("sample {sample} carries invalid label {label}")]
    InvalidLabel {
        /// The offending sample id.
        sample: usize,
        /// The invalid label value.
        label: i32,
    },

    /// A persisted level graph is internally inconsistent.
    #[error("corrupt level graph: {reason}")]
    CorruptLevelGraph {
        /// What failed validation.
        reason: String,
    },

    /// A spatial index failure from the neighbor stage.
    #[error(transparent)]
    Spatial(#[from] cloud_spatial::SpatialError),

    /// An underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
