//! Spatial indexing substrate for point cloud analysis.
//!
//! This crate provides the proximity-query layer used by multi-scale
//! surface segmentation:
//!
//! - [`SpatialIndex`] - Static binary space-partitioning index over a
//!   borrowed position slice, rebuilt in place between analysis scales
//! - [`RangeQuery`] / [`KnnQuery`] - Resumable radius and k-nearest
//!   query state machines
//! - [`BoundedQueue`] - Fixed-capacity sorted k-best container
//! - [`NeighborGraph`] - Precomputed fixed-degree nearest-neighbor table
//!   with graph-local range expansion
//!
//! # Ownership
//!
//! The point cloud owns its positions. [`SpatialIndex`] and query objects
//! only borrow them and operate on integer sample ids; nothing here can
//! outlive or copy the caller's point array.
//!
//! # Example
//!
//! ```
//! use cloud_spatial::{IndexConfig, NeighborGraph, SpatialIndex};
//! use nalgebra::Point3;
//!
//! let points: Vec<_> = (0..100)
//!     .map(|i| Point3::new(f64::from(i % 10), f64::from(i / 10), 0.0))
//!     .collect();
//!
//! let index = SpatialIndex::build(&points, &IndexConfig::default()).unwrap();
//! let (nearest, _) = index.nearest(&Point3::new(4.2, 5.1, 0.0)).unwrap();
//! assert_eq!(points[nearest as usize], Point3::new(4.0, 5.0, 0.0));
//!
//! // Fixed-degree neighbor table for repeated graph-local expansion.
//! let graph = NeighborGraph::build(&index, 8);
//! assert_eq!(graph.neighbors(0).len(), 8);
//! ```
//!
//! # Concurrency
//!
//! Index arrays are read-only during queries, so concurrent workers may
//! query one index freely as long as each owns its private query object.
//! [`NeighborGraph::build`] exploits this with a rayon parallel loop; its
//! only shared mutable state is an atomic progress counter.

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod bounded_queue;
mod error;
mod index;
mod neighbors;
mod query;

pub use bounded_queue::BoundedQueue;
pub use error::{SpatialError, SpatialResult};
pub use index::{IndexConfig, SpatialIndex};
pub use neighbors::{NeighborGraph, NO_NEIGHBOR};
pub use query::{KnnQuery, RangeQuery};

pub use nalgebra::{Point3, Vector3};
