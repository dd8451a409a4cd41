//! `wayfinder-perception` – spatial reasoning over the SLAM landmark cloud.
//!
//! Turns the raw point cloud into the representations the planner and the
//! room index need.
//!
//! # Modules
//!
//! - [`geometry`] – [`Point3`][geometry::Point3] and axis-aligned
//!   [`Bounds`][geometry::Bounds].
//! - [`snapshot`] – [`MapSnapshot`][snapshot::MapSnapshot]: loader for the
//!   tracker's JSON map export.
//! - [`grid`] – [`OccupancyGrid`][grid::OccupancyGrid]: centred 2-D
//!   rasterisation with disk-shaped obstacle inflation and nearest-free-cell
//!   recovery.
//! - [`astar`] – 8-connected A* search over an occupancy grid.
//! - [`path`] – conversion of cell paths to world points and heading-change
//!   simplification.
//! - [`cluster`] – connected-component room segmentation on a coarse grid.

pub mod astar;
pub mod cluster;
pub mod geometry;
pub mod grid;
pub mod path;
pub mod snapshot;

pub use astar::plan_path;
pub use cluster::{ClusterConfig, LandmarkCluster, cluster_landmarks};
pub use geometry::{Bounds, Point3};
pub use grid::{GridCell, GridConfig, OccupancyGrid};
pub use snapshot::{MapSnapshot, SnapshotError};
