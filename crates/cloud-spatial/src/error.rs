//! Error types for spatial operations.

use thiserror::Error;

/// Result type for spatial operations.
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Errors that can occur while building spatial structures.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The point set is empty.
    #[error("point set is empty")]
    EmptyPointSet,

    /// The index subset is empty.
    #[error("index subset is empty")]
    EmptySubset,

    /// A sample index is out of bounds.
    #[error("sample index {index} out of bounds (point set has {point_count} points)")]
    SampleOutOfBounds {
        /// The invalid sample index.
        index: u32,
        /// Total number of points in the point set.
        point_count: usize,
    },
}
