//! Precomputed fixed-degree nearest-neighbor table.
//!
//! Trades spatial-index re-traversal for a cheap graph walk: each active
//! sample's K nearest neighbors are computed once (in parallel) and
//! stored in a flat table, and later range expansions flood-fill over
//! that table instead of re-touching the index.

use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::index::SpatialIndex;
use crate::query::KnnQuery;

/// Padding value for table slots with no neighbor.
pub const NO_NEIGHBOR: u32 = u32::MAX;

/// A `point_count x K` table of neighbor sample ids, closest first.
///
/// Rows of samples outside the source index's partition are fully
/// padded. The table is a snapshot: it must be rebuilt whenever its
/// source index is re-partitioned.
///
/// # Example
///
/// ```
/// use cloud_spatial::{IndexConfig, NeighborGraph, SpatialIndex};
/// use nalgebra::Point3;
///
/// let points: Vec<_> = (0..6).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
/// let index = SpatialIndex::build(&points, &IndexConfig::default()).unwrap();
/// let graph = NeighborGraph::build(&index, 2);
///
/// assert_eq!(graph.neighbors(0), &[1, 2]);
/// assert_eq!(graph.neighbors(3).len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct NeighborGraph {
    neighbor_count: usize,
    point_count: usize,
    table: Vec<u32>,
    active: Vec<bool>,
}

impl NeighborGraph {
    /// Builds the table by running one k-nearest-by-sample query per
    /// active sample, in parallel. The only shared mutable state is a
    /// progress counter.
    #[must_use]
    pub fn build(index: &SpatialIndex<'_>, neighbor_count: usize) -> Self {
        let point_count = index.point_count();
        let active: Vec<bool> = (0..point_count)
            .map(|i| {
                #[allow(clippy::cast_possible_truncation)]
                let id = i as u32;
                index.is_active(id)
            })
            .collect();

        let mut table = vec![NO_NEIGHBOR; point_count * neighbor_count];
        if neighbor_count > 0 {
            let progress = AtomicUsize::new(0);
            // Each worker restarts one query object in place, reusing its
            // traversal allocations across all its rows.
            table
                .par_chunks_mut(neighbor_count)
                .enumerate()
                .for_each_init(KnnQuery::new, |query, (i, row)| {
                    #[allow(clippy::cast_possible_truncation)]
                    let id = i as u32;
                    if !index.is_active(id) {
                        return;
                    }
                    let target = index.points()[i];
                    query.restart(index, target, neighbor_count, Some(id));
                    for slot in row.iter_mut() {
                        match query.next(index) {
                            Some((neighbor, _)) => *slot = neighbor,
                            None => break,
                        }
                    }
                    let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 100_000 == 0 {
                        debug!(done, "neighbor table rows built");
                    }
                });
            info!(
                points = index.active_count(),
                k = neighbor_count,
                "neighbor table built"
            );
        }

        Self {
            neighbor_count,
            point_count,
            table,
            active,
        }
    }

    /// Number of neighbor slots per sample.
    #[must_use]
    pub fn neighbor_count(&self) -> usize {
        self.neighbor_count
    }

    /// Number of samples (table rows).
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Returns `true` if `sample` had a row computed (was active in the
    /// source index snapshot).
    #[must_use]
    pub fn is_active(&self, sample: u32) -> bool {
        self.active.get(sample as usize).copied().unwrap_or(false)
    }

    /// The neighbors of `sample` in increasing-distance order, with
    /// padding trimmed.
    ///
    /// # Panics
    ///
    /// Panics if `sample` is out of range of the table.
    #[must_use]
    pub fn neighbors(&self, sample: u32) -> &[u32] {
        let start = sample as usize * self.neighbor_count;
        let row = &self.table[start..start + self.neighbor_count];
        let len = row
            .iter()
            .position(|&n| n == NO_NEIGHBOR)
            .unwrap_or(self.neighbor_count);
        &row[..len]
    }

    /// Approximates the metric ball around `seed` by flood-filling the
    /// neighbor table: pop a sample, keep it if its true distance to the
    /// seed is below `radius`, and expand through its table neighbors.
    ///
    /// The approximation is sound when K exceeds the expected
    /// neighborhood size at the queried radius. A non-positive radius
    /// yields an empty result.
    ///
    /// # Panics
    ///
    /// Panics if `points` is shorter than the table or `seed` is out of
    /// range.
    #[must_use]
    pub fn range_neighbors(&self, points: &[Point3<f64>], seed: u32, radius: f64) -> Vec<u32> {
        assert!(points.len() >= self.point_count, "point slice too short");
        let radius_sq = radius * radius;
        let origin = points[seed as usize];

        let mut visited = vec![false; self.point_count];
        let mut stack = vec![seed];
        visited[seed as usize] = true;
        let mut inside = Vec::new();

        while let Some(i) = stack.pop() {
            let d = (points[i as usize] - origin).norm_squared();
            if radius <= 0.0 || d >= radius_sq {
                continue;
            }
            inside.push(i);
            for &n in self.neighbors(i) {
                if !visited[n as usize] {
                    visited[n as usize] = true;
                    stack.push(n);
                }
            }
        }

        inside
    }
}
