//! Proximity queries over a [`SpatialIndex`].
//!
//! All query shapes share one branch-and-bound traversal: a LIFO work
//! stack of `(node, lower-bound squared distance)` entries seeded at the
//! root. Internal nodes are descended in place toward the near child
//! while the far child is pushed with its plane-offset bound; leaves are
//! scanned linearly against true distance. The pruning test gives
//! expected logarithmic cost on well-distributed data and degrades to
//! linear on adversarial data.
//!
//! Both query shapes are resumable: the traversal state lives in a
//! [`RangeQuery`] or [`KnnQuery`] value advanced by a step function, so
//! callers can pull one result at a time and interleave traversal with
//! their own bookkeeping instead of materializing full result lists.
//! Either value restarts in place, reusing its allocations across many
//! queries.

use nalgebra::Point3;

use crate::bounded_queue::BoundedQueue;
use crate::index::{Node, SpatialIndex};

#[inline]
fn distance_sq(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (a - b).norm_squared()
}

impl SpatialIndex<'_> {
    /// Returns the active sample closest to `target` with its squared
    /// distance, or `None` if nothing is indexed.
    #[must_use]
    pub fn nearest(&self, target: &Point3<f64>) -> Option<(u32, f64)> {
        self.knn(*target, 1).next(self)
    }

    /// Returns the active sample closest to `sample`, excluding the
    /// sample itself.
    ///
    /// # Panics
    ///
    /// Panics if `sample` is not part of the current partition; querying
    /// by an inactive id is a precondition violation.
    #[must_use]
    pub fn nearest_of(&self, sample: u32) -> Option<(u32, f64)> {
        self.knn_of(sample, 1).next(self)
    }

    /// Returns up to `k` active samples closest to `target`, as
    /// `(id, squared distance)` pairs in increasing-distance order.
    ///
    /// `k == 0` yields an empty result, not an error.
    #[must_use]
    pub fn k_nearest(&self, target: &Point3<f64>, k: usize) -> Vec<(u32, f64)> {
        self.knn(*target, k).collect_remaining(self)
    }

    /// Returns up to `k` active samples closest to `sample`, excluding
    /// the sample itself.
    ///
    /// # Panics
    ///
    /// Panics if `sample` is not part of the current partition.
    #[must_use]
    pub fn k_nearest_of(&self, sample: u32, k: usize) -> Vec<(u32, f64)> {
        self.knn_of(sample, k).collect_remaining(self)
    }

    /// Starts a resumable k-nearest query around an arbitrary point.
    ///
    /// Results come out one per [`KnnQuery::next`] call, in
    /// increasing-distance order. `k == 0` yields an empty producer.
    #[must_use]
    pub fn knn(&self, target: Point3<f64>, k: usize) -> KnnQuery {
        let mut query = KnnQuery::new();
        query.restart(self, target, k, None);
        query
    }

    /// Starts a resumable k-nearest query around an existing sample,
    /// excluding the sample itself.
    ///
    /// # Panics
    ///
    /// Panics if `sample` is not part of the current partition.
    #[must_use]
    pub fn knn_of(&self, sample: u32, k: usize) -> KnnQuery {
        assert!(
            self.is_active(sample),
            "sample {sample} is not in the current partition"
        );
        let target = self.points()[sample as usize];
        let mut query = KnnQuery::new();
        query.restart(self, target, k, Some(sample));
        query
    }

    /// Starts a resumable radius query around an arbitrary point.
    ///
    /// Results are samples with true distance strictly below `radius`,
    /// in traversal order (not sorted). A non-positive radius yields an
    /// empty producer.
    #[must_use]
    pub fn range(&self, target: Point3<f64>, radius: f64) -> RangeQuery {
        let mut query = RangeQuery::new();
        query.restart(self, target, radius, None);
        query
    }

    /// Starts a resumable radius query around an existing sample,
    /// excluding the sample itself.
    ///
    /// # Panics
    ///
    /// Panics if `sample` is not part of the current partition.
    #[must_use]
    pub fn range_of(&self, sample: u32, radius: f64) -> RangeQuery {
        assert!(
            self.is_active(sample),
            "sample {sample} is not in the current partition"
        );
        let target = self.points()[sample as usize];
        let mut query = RangeQuery::new();
        query.restart(self, target, radius, Some(sample));
        query
    }
}

/// Resumable radius-query state machine.
///
/// Holds the work stack and leaf-scan bookmark of one in-flight radius
/// query. [`RangeQuery::next`] advances the traversal by at most one
/// result; [`RangeQuery::restart`] re-seeds the state in place so a
/// worker can reuse one query object (and its stack allocation) across
/// many queries.
///
/// The query is only valid against the index generation it was seeded
/// from; advancing it after a rebuild is a precondition violation.
///
/// # Example
///
/// ```
/// use cloud_spatial::{IndexConfig, SpatialIndex};
/// use nalgebra::Point3;
///
/// let points: Vec<_> = (0..10).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
/// let index = SpatialIndex::build(&points, &IndexConfig::default()).unwrap();
///
/// let mut query = index.range(Point3::new(0.0, 0.0, 0.0), 2.5);
/// let mut hits = Vec::new();
/// while let Some((id, _d2)) = query.next(&index) {
///     hits.push(id);
/// }
/// hits.sort_unstable();
/// assert_eq!(hits, vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RangeQuery {
    stack: Vec<(u32, f64)>,
    leaf_cursor: u32,
    leaf_end: u32,
    target: Point3<f64>,
    radius_sq: f64,
    exclude: Option<u32>,
    generation: u64,
}

impl RangeQuery {
    /// Creates an empty, exhausted query. Seed it with [`Self::restart`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            leaf_cursor: 0,
            leaf_end: 0,
            target: Point3::origin(),
            radius_sq: 0.0,
            exclude: None,
            generation: 0,
        }
    }

    /// Re-seeds the query in place, reusing the stack allocation.
    ///
    /// A non-positive `radius` leaves the query exhausted.
    pub fn restart(
        &mut self,
        index: &SpatialIndex<'_>,
        target: Point3<f64>,
        radius: f64,
        exclude: Option<u32>,
    ) {
        self.stack.clear();
        self.leaf_cursor = 0;
        self.leaf_end = 0;
        self.target = target;
        self.radius_sq = radius * radius;
        self.exclude = exclude;
        self.generation = index.generation();
        if radius > 0.0 && index.active_count() > 0 {
            self.stack.push((index.root(), 0.0));
        }
    }

    /// Advances the traversal, returning the next sample strictly inside
    /// the radius as `(id, squared distance)`, or `None` once exhausted.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `index` has been rebuilt since this
    /// query was seeded.
    pub fn next(&mut self, index: &SpatialIndex<'_>) -> Option<(u32, f64)> {
        debug_assert_eq!(
            self.generation,
            index.generation(),
            "range query advanced against a rebuilt index"
        );
        loop {
            // Drain the bookmarked leaf run first.
            while self.leaf_cursor < self.leaf_end {
                let slot = self.leaf_cursor;
                self.leaf_cursor += 1;
                let id = index.run(slot, 1)[0];
                if self.exclude == Some(id) {
                    continue;
                }
                let d = distance_sq(&self.target, &index.points()[id as usize]);
                if d < self.radius_sq {
                    return Some((id, d));
                }
            }

            let (mut node_id, bound) = self.stack.pop()?;
            if bound >= self.radius_sq {
                continue;
            }
            // Descend to the next reachable leaf, pushing far children.
            loop {
                match index.node(node_id) {
                    Node::Leaf { start, count } => {
                        self.leaf_cursor = start;
                        self.leaf_end = start + count;
                        break;
                    }
                    Node::Internal {
                        dim,
                        split,
                        left,
                        right,
                    } => {
                        let offset = self.target[dim as usize] - split;
                        let (near, far) = if offset < 0.0 {
                            (left, right)
                        } else {
                            (right, left)
                        };
                        let far_bound = (offset * offset).max(bound);
                        if far_bound < self.radius_sq {
                            self.stack.push((far, far_bound));
                        }
                        node_id = near;
                    }
                }
            }
        }
    }

    /// Drains the remaining results into a vector.
    #[must_use]
    pub fn collect_remaining(&mut self, index: &SpatialIndex<'_>) -> Vec<(u32, f64)> {
        let mut out = Vec::new();
        while let Some(hit) = self.next(index) {
            out.push(hit);
        }
        out
    }
}

/// Resumable k-nearest-query state machine.
///
/// Holds the work stack, candidate queue and emission cursor of one
/// in-flight k-nearest query. Unlike a radius query, the k-best set is
/// only known once the whole pruned traversal has run, so the first
/// [`KnnQuery::next`] call finishes the outstanding traversal before
/// emitting; subsequent calls hand out the remaining results one at a
/// time in increasing-distance order. [`KnnQuery::restart`] re-seeds
/// the state in place so a worker can reuse one query object (and its
/// stack and queue allocations) across many queries.
///
/// The query is only valid against the index generation it was seeded
/// from; advancing it after a rebuild is a precondition violation.
///
/// # Example
///
/// ```
/// use cloud_spatial::{IndexConfig, SpatialIndex};
/// use nalgebra::Point3;
///
/// let points: Vec<_> = (0..10).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
/// let index = SpatialIndex::build(&points, &IndexConfig::default()).unwrap();
///
/// let mut query = index.knn(Point3::new(0.2, 0.0, 0.0), 3);
/// let mut hits = Vec::new();
/// while let Some((id, _d2)) = query.next(&index) {
///     hits.push(id);
/// }
/// assert_eq!(hits, vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct KnnQuery {
    stack: Vec<(u32, f64)>,
    queue: BoundedQueue<u32>,
    cursor: usize,
    target: Point3<f64>,
    exclude: Option<u32>,
    generation: u64,
}

impl Default for KnnQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl KnnQuery {
    /// Creates an empty, exhausted query. Seed it with [`Self::restart`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            queue: BoundedQueue::new(0),
            cursor: 0,
            target: Point3::origin(),
            exclude: None,
            generation: 0,
        }
    }

    /// Re-seeds the query in place, reusing the stack and (for an
    /// unchanged `k`) queue allocations.
    ///
    /// `k == 0` leaves the query exhausted.
    pub fn restart(
        &mut self,
        index: &SpatialIndex<'_>,
        target: Point3<f64>,
        k: usize,
        exclude: Option<u32>,
    ) {
        self.stack.clear();
        if self.queue.capacity() == k {
            self.queue.clear();
        } else {
            self.queue = BoundedQueue::new(k);
        }
        self.cursor = 0;
        self.target = target;
        self.exclude = exclude;
        self.generation = index.generation();
        if k > 0 && index.active_count() > 0 {
            self.stack.push((index.root(), 0.0));
        }
    }

    /// Returns the next-closest sample as `(id, squared distance)`, or
    /// `None` once `k` results (or every active sample) have been
    /// emitted.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `index` has been rebuilt since this
    /// query was seeded.
    pub fn next(&mut self, index: &SpatialIndex<'_>) -> Option<(u32, f64)> {
        debug_assert_eq!(
            self.generation,
            index.generation(),
            "k-nearest query advanced against a rebuilt index"
        );
        // Results are final only once the work stack is exhausted.
        while let Some((mut node_id, bound)) = self.stack.pop() {
            loop {
                // A full queue's bottom is the current pruning threshold.
                if self.queue.is_full()
                    && self.queue.worst_key().is_some_and(|worst| bound >= worst)
                {
                    break;
                }
                match index.node(node_id) {
                    Node::Leaf { start, count } => {
                        for &id in index.run(start, count) {
                            if self.exclude == Some(id) {
                                continue;
                            }
                            let d = distance_sq(&self.target, &index.points()[id as usize]);
                            self.queue.push(d, id);
                        }
                        break;
                    }
                    Node::Internal {
                        dim,
                        split,
                        left,
                        right,
                    } => {
                        let offset = self.target[dim as usize] - split;
                        let (near, far) = if offset < 0.0 {
                            (left, right)
                        } else {
                            (right, left)
                        };
                        // Far child can be no closer than the split plane.
                        let far_bound = (offset * offset).max(bound);
                        self.stack.push((far, far_bound));
                        // Continue into the near child in place; its lower
                        // bound is inherited from the parent.
                        node_id = near;
                    }
                }
            }
        }

        let &(d, id) = self.queue.as_slice().get(self.cursor)?;
        self.cursor += 1;
        Some((id, d))
    }

    /// Drains the remaining results into a vector.
    #[must_use]
    pub fn collect_remaining(&mut self, index: &SpatialIndex<'_>) -> Vec<(u32, f64)> {
        let mut out = Vec::new();
        while let Some(hit) = self.next(index) {
            out.push(hit);
        }
        out
    }
}
