//! Static binary space-partitioning index over a borrowed point slice.
//!
//! The index never copies positions: it borrows the caller's
//! `&[Point3<f64>]` and owns only an index permutation plus a compact node
//! array. Rebuilding re-partitions the permutation in place and reuses the
//! node storage.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SpatialError, SpatialResult};

/// Construction parameters for [`SpatialIndex`].
///
/// Both limits guard against pathological inputs: a run of duplicate
/// coordinates cannot be partitioned by a plane, so recursion bottoms out
/// at `max_depth` instead of looping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Ranges at or below this size become leaves.
    pub min_cell_size: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_cell_size: 64,
            max_depth: 32,
        }
    }
}

/// A tree node: either a contiguous permutation run or an axis split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Node {
    /// A leaf referencing `permutation[start..start + count]`.
    Leaf {
        /// First slot of the run in the permutation.
        start: u32,
        /// Run length.
        count: u32,
    },
    /// An internal split along one axis.
    Internal {
        /// Split dimension (0, 1 or 2).
        dim: u8,
        /// Split plane position along `dim`.
        split: f64,
        /// Node id of the `< split` half.
        left: u32,
        /// Node id of the `>= split` half.
        right: u32,
    },
}

/// Static spatial index over a borrowed position array.
///
/// Supports nearest, bounded-k-nearest and radius queries, each
/// addressable by an arbitrary point or by an existing sample id (which
/// excludes itself from results). Query implementations live in
/// [`crate::query`].
///
/// # Example
///
/// ```
/// use cloud_spatial::{IndexConfig, SpatialIndex};
/// use nalgebra::Point3;
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.1, 0.0, 0.0),
/// ];
/// let index = SpatialIndex::build(&points, &IndexConfig::default()).unwrap();
///
/// let (id, dist_sq) = index.nearest_of(0).unwrap();
/// assert_eq!(id, 2);
/// assert!((dist_sq - 0.01).abs() < 1e-12);
/// ```
#[derive(Debug)]
pub struct SpatialIndex<'a> {
    points: &'a [Point3<f64>],
    permutation: Vec<u32>,
    active: Vec<bool>,
    nodes: Vec<Node>,
    root: u32,
    config: IndexConfig,
    generation: u64,
}

impl<'a> SpatialIndex<'a> {
    /// Builds an index over every point in `points`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyPointSet`] if `points` is empty.
    pub fn build(points: &'a [Point3<f64>], config: &IndexConfig) -> SpatialResult<Self> {
        if points.is_empty() {
            return Err(SpatialError::EmptyPointSet);
        }
        #[allow(clippy::cast_possible_truncation)]
        let permutation: Vec<u32> = (0..points.len() as u32).collect();
        let mut index = Self {
            points,
            permutation,
            active: vec![true; points.len()],
            nodes: Vec::new(),
            root: 0,
            config: *config,
            generation: 0,
        };
        index.partition();
        Ok(index)
    }

    /// Builds an index over a subset of sample ids.
    ///
    /// Samples outside `subset` stay addressable through `points` but are
    /// invisible to queries. Querying *by* such a sample id is a
    /// precondition violation.
    ///
    /// # Errors
    ///
    /// Returns an error if `subset` is empty or contains an out-of-range
    /// id.
    pub fn build_subset(
        points: &'a [Point3<f64>],
        subset: &[u32],
        config: &IndexConfig,
    ) -> SpatialResult<Self> {
        if points.is_empty() {
            return Err(SpatialError::EmptyPointSet);
        }
        let mut index = Self {
            points,
            permutation: Vec::new(),
            active: Vec::new(),
            nodes: Vec::new(),
            root: 0,
            config: *config,
            generation: 0,
        };
        index.set_subset(subset)?;
        index.partition();
        Ok(index)
    }

    /// Re-partitions the full point set, reusing node and permutation
    /// storage. Outstanding resumable queries become invalid.
    pub fn rebuild(&mut self) {
        self.permutation.clear();
        #[allow(clippy::cast_possible_truncation)]
        self.permutation.extend(0..self.points.len() as u32);
        self.active.clear();
        self.active.resize(self.points.len(), true);
        self.partition();
    }

    /// Re-partitions over a new subset, reusing storage.
    ///
    /// # Errors
    ///
    /// Returns an error if `subset` is empty or contains an out-of-range
    /// id. The index is left unchanged on error.
    pub fn rebuild_subset(&mut self, subset: &[u32]) -> SpatialResult<()> {
        self.set_subset(subset)?;
        self.partition();
        Ok(())
    }

    fn set_subset(&mut self, subset: &[u32]) -> SpatialResult<()> {
        if subset.is_empty() {
            return Err(SpatialError::EmptySubset);
        }
        for &id in subset {
            if id as usize >= self.points.len() {
                return Err(SpatialError::SampleOutOfBounds {
                    index: id,
                    point_count: self.points.len(),
                });
            }
        }
        self.permutation.clear();
        self.permutation.extend_from_slice(subset);
        self.active.clear();
        self.active.resize(self.points.len(), false);
        for &id in subset {
            self.active[id as usize] = true;
        }
        Ok(())
    }

    fn partition(&mut self) {
        self.nodes.clear();
        self.generation += 1;
        let end = self.permutation.len();
        self.root = self.split_range(0, end, 0);
        debug!(
            points = self.permutation.len(),
            nodes = self.nodes.len(),
            generation = self.generation,
            "spatial index partitioned"
        );
    }

    /// Recursively partitions `permutation[start..end]`, returning the id
    /// of the subtree root. Recursion depth is bounded by `max_depth`.
    #[allow(clippy::cast_possible_truncation)]
    fn split_range(&mut self, start: usize, end: usize, depth: usize) -> u32 {
        let count = end - start;
        if count <= self.config.min_cell_size || depth >= self.config.max_depth {
            return self.push_leaf(start, count);
        }

        // Bounding box of the active range.
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for &id in &self.permutation[start..end] {
            let p = &self.points[id as usize];
            for d in 0..3 {
                min[d] = min[d].min(p[d]);
                max[d] = max[d].max(p[d]);
            }
        }

        // Split the widest extent at the box center.
        let mut dim = 0;
        for d in 1..3 {
            if max[d] - min[d] > max[dim] - min[dim] {
                dim = d;
            }
        }
        let extent = max[dim] - min[dim];
        if extent <= 0.0 {
            // All coordinates coincide; a plane cannot partition this run.
            return self.push_leaf(start, count);
        }
        let split = min[dim] + extent * 0.5;

        // In-place partition by `< split`.
        let mut i = start;
        let mut j = end;
        while i < j {
            if self.points[self.permutation[i] as usize][dim] < split {
                i += 1;
            } else {
                j -= 1;
                self.permutation.swap(i, j);
            }
        }

        let left = self.split_range(start, i, depth + 1);
        let right = self.split_range(i, end, depth + 1);
        self.nodes.push(Node::Internal {
            dim: dim as u8,
            split,
            left,
            right,
        });
        (self.nodes.len() - 1) as u32
    }

    #[allow(clippy::cast_possible_truncation)]
    fn push_leaf(&mut self, start: usize, count: usize) -> u32 {
        self.nodes.push(Node::Leaf {
            start: start as u32,
            count: count as u32,
        });
        (self.nodes.len() - 1) as u32
    }

    /// The borrowed position array this index was built over.
    #[must_use]
    pub fn points(&self) -> &'a [Point3<f64>] {
        self.points
    }

    /// Total number of points in the backing array.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of samples visible to queries.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.permutation.len()
    }

    /// Returns `true` if `sample` is part of the current partition.
    #[must_use]
    pub fn is_active(&self, sample: u32) -> bool {
        self.active.get(sample as usize).copied().unwrap_or(false)
    }

    /// Monotonic counter bumped on every (re)partition. Resumable queries
    /// are only valid against the generation they were seeded from.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn node(&self, id: u32) -> Node {
        self.nodes[id as usize]
    }

    pub(crate) fn root(&self) -> u32 {
        self.root
    }

    pub(crate) fn run(&self, start: u32, count: u32) -> &[u32] {
        &self.permutation[start as usize..(start + count) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn grid_points(n: usize) -> Vec<Point3<f64>> {
        (0..n)
            .flat_map(|i| {
                (0..n).map(move |j| {
                    Point3::new(i as f64, j as f64, ((i * n + j) % 3) as f64 * 0.25)
                })
            })
            .collect()
    }

    #[test]
    fn build_empty_fails() {
        let points: Vec<Point3<f64>> = Vec::new();
        assert!(SpatialIndex::build(&points, &IndexConfig::default()).is_err());
    }

    #[test]
    fn build_covers_all_points() {
        let points = grid_points(10);
        let index = SpatialIndex::build(&points, &IndexConfig::default()).unwrap();
        assert_eq!(index.active_count(), 100);
        assert!(index.is_active(0));
        assert!(index.is_active(99));
        assert!(!index.is_active(100));
    }

    #[test]
    fn leaf_runs_partition_permutation() {
        let points = grid_points(12);
        let config = IndexConfig {
            min_cell_size: 8,
            max_depth: 32,
        };
        let index = SpatialIndex::build(&points, &config).unwrap();

        // Every active id appears exactly once across all leaf runs.
        let mut seen = vec![0usize; points.len()];
        for node in &index.nodes {
            if let Node::Leaf { start, count } = *node {
                for &id in index.run(start, count) {
                    seen[id as usize] += 1;
                }
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn duplicate_points_terminate() {
        let points = vec![Point3::new(1.0, 2.0, 3.0); 500];
        let config = IndexConfig {
            min_cell_size: 4,
            max_depth: 32,
        };
        let index = SpatialIndex::build(&points, &config).unwrap();
        assert_eq!(index.active_count(), 500);
    }

    #[test]
    fn subset_build_limits_visibility() {
        let points = grid_points(5);
        let subset: Vec<u32> = (0..25).filter(|i| i % 2 == 0).collect();
        let index = SpatialIndex::build_subset(&points, &subset, &IndexConfig::default()).unwrap();

        assert_eq!(index.active_count(), subset.len());
        assert!(index.is_active(0));
        assert!(!index.is_active(1));
    }

    #[test]
    fn subset_out_of_range_fails() {
        let points = grid_points(3);
        let result = SpatialIndex::build_subset(&points, &[0, 99], &IndexConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn rebuild_bumps_generation() {
        let points = grid_points(4);
        let mut index = SpatialIndex::build(&points, &IndexConfig::default()).unwrap();
        let first = index.generation();
        index.rebuild();
        assert!(index.generation() > first);

        index.rebuild_subset(&[0, 1, 2]).unwrap();
        assert_eq!(index.active_count(), 3);
        assert!(!index.is_active(5));
    }

    #[test]
    fn failed_rebuild_leaves_index_usable() {
        let points = grid_points(4);
        let mut index = SpatialIndex::build(&points, &IndexConfig::default()).unwrap();
        assert!(index.rebuild_subset(&[]).is_err());
        assert!(index.nearest(&Point3::origin()).is_some());
    }
}
