//! Seeded region growing over a precomputed neighbor table.
//!
//! Seeds are taken in priority order; each unlabeled seed opens a new
//! region which is flood-filled through the neighbor table under an
//! acceptance rule. Regions are maximal connected components of the
//! accept relation restricted to the table topology; boundary conflicts
//! resolve first-come by seed priority, which is local rather than
//! globally optimal.

use std::cmp::Ordering;

use cloud_spatial::NeighborGraph;
use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::labeling::{Labeling, UNLABELED};

/// Strategy interface steering one region-growth pass.
///
/// Replaces the usual trio of callbacks with named methods implemented
/// per call site.
pub trait GrowthPolicy {
    /// Whether the region `label`, currently at sample `from`, may
    /// absorb the neighboring sample `to`.
    fn accept(&self, label: i32, from: u32, to: u32) -> bool;

    /// Whether sample `a` should seed before sample `b`. Used once to
    /// sort the seed worklist in descending priority.
    fn higher_priority(&self, a: u32, b: u32) -> bool;

    /// Called once per freshly allocated region, before its flood fill.
    fn on_seed_created(&mut self, _label: i32, _seed: u32) {}
}

/// Grows regions until every active sample is labeled.
///
/// All active samples are sorted by descending policy priority; each
/// still-unlabeled sample in that order becomes the seed of a new region,
/// which is expanded depth-first through the neighbor table. A neighbor
/// joins (and is re-pushed) only while unlabeled and accepted by the
/// policy. Returns the number of regions created.
///
/// Two runs over the same table, priority and acceptance rule produce
/// identical labelings; the pass is single-threaded by design since it
/// mutates shared label/count state.
///
/// # Panics
///
/// Panics if `labeling` does not cover the table's samples.
pub fn grow_regions<P: GrowthPolicy>(
    graph: &NeighborGraph,
    labeling: &mut Labeling,
    policy: &mut P,
) -> usize {
    assert_eq!(
        labeling.sample_count(),
        graph.point_count(),
        "labeling and neighbor table cover different sample sets"
    );

    #[allow(clippy::cast_possible_truncation)]
    let mut order: Vec<u32> = (0..graph.point_count() as u32)
        .filter(|&i| graph.is_active(i))
        .collect();
    order.sort_by(|&a, &b| {
        if policy.higher_priority(a, b) {
            Ordering::Less
        } else if policy.higher_priority(b, a) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    });

    let mut stack: Vec<u32> = Vec::new();
    let mut regions = 0usize;

    for &seed in &order {
        if labeling.label_of(seed) != UNLABELED {
            continue;
        }
        let label = labeling.new_label();
        regions += 1;
        policy.on_seed_created(label, seed);
        labeling.set_label(seed, label);

        stack.push(seed);
        while let Some(from) = stack.pop() {
            for &to in graph.neighbors(from) {
                if labeling.label_of(to) == UNLABELED && policy.accept(label, from, to) {
                    labeling.set_label(to, label);
                    stack.push(to);
                }
            }
        }
    }

    debug!(regions, samples = order.len(), "region growth finished");
    regions
}

/// Production growth policy for locally-planar surface regions.
///
/// Accepts a step from `from` to `to` when the two samples' normals
/// agree within a maximum angle, the target's planarity deviation is
/// under a threshold, and the step stays inside the current analysis
/// radius. Flatter samples (smaller deviation) seed first.
///
/// Normals and deviations are precomputed by the upstream fitting stage
/// and only borrowed here.
#[derive(Debug, Clone)]
pub struct PlanarPolicy<'a> {
    points: &'a [Point3<f64>],
    normals: &'a [Vector3<f64>],
    deviations: &'a [f64],
    cos_max_angle: f64,
    max_deviation: f64,
    radius_sq: f64,
}

impl<'a> PlanarPolicy<'a> {
    /// Creates a policy over borrowed per-point features.
    ///
    /// Defaults: 30 degree normal tolerance, unbounded deviation and
    /// step radius.
    ///
    /// # Panics
    ///
    /// Panics if the feature arrays do not match the point count.
    #[must_use]
    pub fn new(
        points: &'a [Point3<f64>],
        normals: &'a [Vector3<f64>],
        deviations: &'a [f64],
    ) -> Self {
        assert_eq!(points.len(), normals.len());
        assert_eq!(points.len(), deviations.len());
        Self {
            points,
            normals,
            deviations,
            cos_max_angle: (std::f64::consts::FRAC_PI_6).cos(),
            max_deviation: f64::INFINITY,
            radius_sq: f64::INFINITY,
        }
    }

    /// Sets the maximum angle (radians) between neighboring normals.
    #[must_use]
    pub fn with_max_angle(mut self, radians: f64) -> Self {
        self.cos_max_angle = radians.cos();
        self
    }

    /// Sets the maximum planarity deviation a sample may carry to join
    /// a region.
    #[must_use]
    pub fn with_max_deviation(mut self, deviation: f64) -> Self {
        self.max_deviation = deviation;
        self
    }

    /// Bounds a single growth step to `radius` (the analysis scale).
    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius_sq = if radius > 0.0 {
            radius * radius
        } else {
            f64::INFINITY
        };
        self
    }
}

impl GrowthPolicy for PlanarPolicy<'_> {
    fn accept(&self, _label: i32, from: u32, to: u32) -> bool {
        if self.deviations[to as usize] > self.max_deviation {
            return false;
        }
        let step = self.points[to as usize] - self.points[from as usize];
        if step.norm_squared() >= self.radius_sq {
            return false;
        }
        self.normals[from as usize].dot(&self.normals[to as usize]) >= self.cos_max_angle
    }

    fn higher_priority(&self, a: u32, b: u32) -> bool {
        self.deviations[a as usize] < self.deviations[b as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloud_spatial::{IndexConfig, SpatialIndex};

    /// Two flat 4x4 patches meeting at a right angle, like a floor and
    /// a wall.
    fn bent_sheet() -> (Vec<Point3<f64>>, Vec<Vector3<f64>>, Vec<f64>) {
        let mut points = Vec::new();
        let mut normals = Vec::new();
        let mut deviations = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                points.push(Point3::new(f64::from(i), f64::from(j), 0.0));
                normals.push(Vector3::z());
                deviations.push(0.01);
            }
        }
        for i in 0..4 {
            for j in 0..4 {
                points.push(Point3::new(-1.0 - f64::from(i), f64::from(j), f64::from(i) + 1.0));
                normals.push(Vector3::x());
                deviations.push(0.02);
            }
        }
        (points, normals, deviations)
    }

    fn neighbor_graph(points: &[Point3<f64>], k: usize) -> NeighborGraph {
        let config = IndexConfig {
            min_cell_size: 4,
            max_depth: 32,
        };
        let index = SpatialIndex::build(points, &config).unwrap();
        NeighborGraph::build(&index, k)
    }

    #[test]
    fn splits_at_the_crease() {
        let (points, normals, deviations) = bent_sheet();
        let graph = neighbor_graph(&points, 6);
        let mut labeling = Labeling::new(points.len());
        let mut policy = PlanarPolicy::new(&points, &normals, &deviations)
            .with_max_angle(std::f64::consts::FRAC_PI_4);

        let regions = grow_regions(&graph, &mut labeling, &mut policy);
        assert_eq!(regions, 2);
        assert!(labeling.is_valid());

        // All floor samples share one label, all wall samples the other.
        let floor = labeling.label_of(0);
        let wall = labeling.label_of(16);
        assert_ne!(floor, wall);
        for i in 0..16u32 {
            assert_eq!(labeling.label_of(i), floor);
            assert_eq!(labeling.label_of(i + 16), wall);
        }
    }

    #[test]
    fn flattest_sample_seeds_first() {
        let (points, normals, deviations) = bent_sheet();
        let graph = neighbor_graph(&points, 6);
        let mut labeling = Labeling::new(points.len());

        struct Recording<'a> {
            inner: PlanarPolicy<'a>,
            seeds: Vec<u32>,
        }
        impl GrowthPolicy for Recording<'_> {
            fn accept(&self, label: i32, from: u32, to: u32) -> bool {
                self.inner.accept(label, from, to)
            }
            fn higher_priority(&self, a: u32, b: u32) -> bool {
                self.inner.higher_priority(a, b)
            }
            fn on_seed_created(&mut self, _label: i32, seed: u32) {
                self.seeds.push(seed);
            }
        }

        let mut policy = Recording {
            inner: PlanarPolicy::new(&points, &normals, &deviations),
            seeds: Vec::new(),
        };
        grow_regions(&graph, &mut labeling, &mut policy);

        // Floor deviations (0.01) beat wall deviations (0.02).
        assert!(policy.seeds[0] < 16);
    }

    #[test]
    fn growth_is_deterministic() {
        let (points, normals, deviations) = bent_sheet();
        let graph = neighbor_graph(&points, 6);

        let run = || {
            let mut labeling = Labeling::new(points.len());
            let mut policy = PlanarPolicy::new(&points, &normals, &deviations);
            grow_regions(&graph, &mut labeling, &mut policy);
            labeling
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn deviation_threshold_excludes_samples() {
        let (points, normals, mut deviations) = bent_sheet();
        deviations[5] = 10.0;
        let graph = neighbor_graph(&points, 6);
        let mut labeling = Labeling::new(points.len());
        let mut policy =
            PlanarPolicy::new(&points, &normals, &deviations).with_max_deviation(1.0);

        grow_regions(&graph, &mut labeling, &mut policy);
        // The outlier still seeds its own region eventually, but never
        // joins a foreign one: it stays a singleton.
        assert_eq!(labeling.population(labeling.label_of(5)), 1);
    }

    #[test]
    fn radius_bound_limits_steps() {
        let points: Vec<Point3<f64>> = (0..5)
            .map(|i| Point3::new(f64::from(i) * f64::from(i + 1) / 2.0, 0.0, 0.0))
            .collect();
        // Spacing grows: 1, 2, 3, 4.
        let normals = vec![Vector3::z(); 5];
        let deviations = vec![0.0; 5];
        let graph = neighbor_graph(&points, 4);
        let mut labeling = Labeling::new(5);
        let mut policy =
            PlanarPolicy::new(&points, &normals, &deviations).with_radius(2.5);

        let regions = grow_regions(&graph, &mut labeling, &mut policy);
        // Steps of length 1 and 2 pass, 3 and 4 do not.
        assert_eq!(regions, 3);
    }
}
