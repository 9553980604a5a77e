//! End-to-end multi-scale segmentation driver.
//!
//! Sweeps a list of analysis scales over one point set: at each scale
//! the spatial index is repartitioned, a neighbor table built, regions
//! grown under the planar policy, and undersized regions discarded. The
//! per-scale labelings are stacked and handed to persistence tracking.

use cloud_spatial::{IndexConfig, NeighborGraph, SpatialIndex};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ScaleError, ScaleResult};
use crate::grow::{grow_regions, PlanarPolicy};
use crate::labeling::Labeling;
use crate::level_graph::LevelGraph;
use crate::persistence::{track_persistence, Component};
use crate::scale_stack::ScaleStack;

/// Tuning knobs for [`analyze_scales`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleSpaceConfig {
    /// Neighbors per sample in the fixed-k table.
    pub neighbor_count: usize,
    /// Spatial index partitioning limits.
    pub index: IndexConfig,
    /// Maximum angle (radians) between neighboring normals.
    pub max_angle: f64,
    /// Maximum planarity deviation a sample may carry to join a region.
    pub max_deviation: f64,
    /// Regions below this population are discarded at every scale.
    pub min_region_size: usize,
}

impl Default for ScaleSpaceConfig {
    fn default() -> Self {
        Self {
            neighbor_count: 16,
            index: IndexConfig::default(),
            max_angle: std::f64::consts::FRAC_PI_6,
            max_deviation: f64::INFINITY,
            min_region_size: 10,
        }
    }
}

/// Everything one multi-scale run produces.
#[derive(Debug, Clone)]
pub struct ScaleSpaceResult {
    /// Per-scale labelings, relabeled for persistence.
    pub stack: ScaleStack,
    /// The reorganized region graph across scales.
    pub graph: LevelGraph,
    /// Birth/death records of persistent regions.
    pub components: Vec<Component>,
}

/// Segments `points` at every scale in `scales` and tracks region
/// persistence across the resulting stack.
///
/// `normals` and `deviations` are per-point features from the upstream
/// fitting stage. `scales` must be strictly increasing; each scale
/// bounds a single growth step and the minimum region extent.
///
/// # Errors
///
/// Returns an error if `points` or `scales` is empty, a feature array
/// does not match the point count, or `scales` is not strictly
/// increasing.
pub fn analyze_scales(
    points: &[Point3<f64>],
    normals: &[Vector3<f64>],
    deviations: &[f64],
    scales: &[f64],
    config: &ScaleSpaceConfig,
) -> ScaleResult<ScaleSpaceResult> {
    if points.is_empty() {
        return Err(ScaleError::EmptyPointSet);
    }
    if scales.is_empty() {
        return Err(ScaleError::EmptyScaleList);
    }
    check_feature_len("normals", points.len(), normals.len())?;
    check_feature_len("deviations", points.len(), deviations.len())?;

    let mut index = SpatialIndex::build(points, &config.index)?;
    let mut stack = ScaleStack::new();

    for (level, &scale) in scales.iter().enumerate() {
        if level > 0 {
            // Repartitioning resets resumable queries tied to the old
            // generation before the next neighbor table is built.
            index.rebuild();
        }
        let graph = NeighborGraph::build(&index, config.neighbor_count);

        let mut labeling = Labeling::new(points.len());
        let mut policy = PlanarPolicy::new(points, normals, deviations)
            .with_max_angle(config.max_angle)
            .with_max_deviation(config.max_deviation)
            .with_radius(scale);
        let regions = grow_regions(&graph, &mut labeling, &mut policy);

        let diagonals = region_diagonals(points, &labeling);
        let min_size = config.min_region_size;
        let dropped = labeling.invalidate(|label, population| {
            population < min_size || diagonals[label as usize] < scale
        });
        labeling.make_full();

        info!(
            level,
            scale,
            regions,
            kept = labeling.label_sup(),
            dropped_samples = dropped,
            "scale segmented"
        );
        stack.push(scale, labeling)?;
    }

    let (graph, components) = track_persistence(&mut stack);
    info!(
        levels = stack.level_count(),
        components = components.len(),
        "scale sweep complete"
    );
    Ok(ScaleSpaceResult {
        stack,
        graph,
        components,
    })
}

fn check_feature_len(name: &'static str, expected: usize, actual: usize) -> ScaleResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ScaleError::FeatureLengthMismatch {
            name,
            expected,
            actual,
        })
    }
}

/// Bounding-box diagonal of every region. Regions smaller in extent
/// than the analysis scale are noise at that scale.
#[allow(clippy::cast_sign_loss)]
fn region_diagonals(points: &[Point3<f64>], labeling: &Labeling) -> Vec<f64> {
    let sup = labeling.label_sup() as usize;
    let mut mins = vec![Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY); sup];
    let mut maxs = vec![
        Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        sup
    ];
    for (sample, point) in points.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let label = labeling.label_of(sample as u32);
        if label < 0 {
            continue;
        }
        let (min, max) = (&mut mins[label as usize], &mut maxs[label as usize]);
        for dim in 0..3 {
            min[dim] = min[dim].min(point[dim]);
            max[dim] = max[dim].max(point[dim]);
        }
    }
    mins.iter()
        .zip(&maxs)
        .map(|(min, max)| {
            if min.x > max.x {
                0.0
            } else {
                (max - min).norm()
            }
        })
        .collect()
}
