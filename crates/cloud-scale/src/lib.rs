//! Multi-scale persistent surface segmentation for 3D point clouds.
//!
//! The crate segments one point set at a series of increasing analysis
//! scales and tracks which regions persist across them:
//!
//! 1. [`grow_regions`] flood-fills regions over a `cloud-spatial`
//!    neighbor table under a [`GrowthPolicy`] ([`PlanarPolicy`] for
//!    locally planar surfaces), producing a [`Labeling`] per scale.
//! 2. The labelings stack up in a [`ScaleStack`], finest scale first.
//! 3. [`build_level_graph`] links regions at adjacent scales by shared
//!    samples, [`reorganize`] relabels every level so persistent
//!    regions keep stable labels, and [`extract_components`] turns the
//!    graph into explicit birth/death [`Component`] records.
//!
//! [`analyze_scales`] drives the whole pipeline; the [`io`] module
//! persists stacks and graphs in a validated binary format.
//!
//! ```
//! use cloud_scale::{analyze_scales, ScaleSpaceConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! let points: Vec<Point3<f64>> = (0..40)
//!     .map(|i| Point3::new(f64::from(i % 8), f64::from(i / 8), 0.0))
//!     .collect();
//! let normals = vec![Vector3::z(); points.len()];
//! let deviations = vec![0.0; points.len()];
//!
//! let config = ScaleSpaceConfig { min_region_size: 4, ..Default::default() };
//! let result = analyze_scales(&points, &normals, &deviations, &[3.0, 6.0], &config)?;
//! assert_eq!(result.stack.level_count(), 2);
//! # Ok::<(), cloud_scale::ScaleError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod grow;
pub mod io;
mod labeling;
mod level_graph;
mod persistence;
mod pipeline;
mod scale_stack;

pub use error::{ScaleError, ScaleResult};
pub use grow::{grow_regions, GrowthPolicy, PlanarPolicy};
pub use labeling::{Labeling, UNLABELED};
pub use level_graph::{LevelEdge, LevelGraph, LevelNode};
pub use persistence::{
    build_level_graph, extract_components, reorganize, track_persistence, Component,
};
pub use pipeline::{analyze_scales, ScaleSpaceConfig, ScaleSpaceResult};
pub use scale_stack::ScaleStack;
