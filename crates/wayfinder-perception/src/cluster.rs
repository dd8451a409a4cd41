//! Room segmentation by connected components on a coarse grid.
//!
//! Each landmark is dropped into a square cell of edge `cell_size`. Non-empty
//! cells become graph nodes joined to their 8 neighbours, and each connected
//! component is a room candidate. Candidates holding fewer than
//! `min_cluster_size` landmarks are treated as noise.
//!
//! When no candidate survives (including inputs smaller than
//! `min_cluster_size`), every landmark is returned as one cluster so a
//! non-empty map always yields at least one navigable room. An empty input
//! yields no clusters.
//!
//! The method is resolution-sensitive and axis-aligned: two rooms joined by a
//! doorway wider than one cell merge, and rotated layouts fragment unevenly.
//! It is an approximation suited to indoor floor plans, not a general
//! segmentation algorithm.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};
use wayfinder_types::Landmark;

use crate::geometry::{Bounds, Point3};
use crate::grid::NEIGHBOURS_8;

/// Parameters for [`cluster_landmarks`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterConfig {
    /// Edge length of a clustering cell (metres).
    pub cell_size: f32,
    /// Minimum landmarks for a component to count as a room.
    pub min_cluster_size: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.5,
            min_cluster_size: 50,
        }
    }
}

/// One room candidate: its member landmarks and their extent.
#[derive(Debug, Clone)]
pub struct LandmarkCluster {
    pub landmarks: Vec<Landmark>,
    pub bounds: Bounds,
    /// Mean position of the members.
    pub center: Point3,
}

impl LandmarkCluster {
    /// Build a cluster from its members; `None` when `landmarks` is empty.
    pub fn from_landmarks(landmarks: Vec<Landmark>) -> Option<Self> {
        let bounds = Bounds::from_points(landmarks.iter().map(Point3::from))?;
        let center = Point3::mean(landmarks.iter().map(Point3::from))?;
        Some(Self {
            landmarks,
            bounds,
            center,
        })
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

type CellKey = (i64, i64);

/// Cell holding `l`. `None` for non-finite coordinates; far outliers
/// saturate to the edge of the key space.
fn cell_key(l: &Landmark, cell_size: f32) -> Option<CellKey> {
    let i = (f64::from(l.x) / f64::from(cell_size)).floor();
    let j = (f64::from(l.y) / f64::from(cell_size)).floor();
    (i.is_finite() && j.is_finite()).then_some((i as i64, j as i64))
}

fn neighbour(key: CellKey, dx: i32, dy: i32) -> Option<CellKey> {
    Some((
        key.0.checked_add(i64::from(dx))?,
        key.1.checked_add(i64::from(dy))?,
    ))
}

/// Partition `landmarks` into spatially connected clusters.
///
/// Output order is deterministic: components are discovered in ascending
/// order of their smallest cell key, and members keep their input order.
/// Landmarks with non-finite coordinates are dropped.
pub fn cluster_landmarks(landmarks: &[Landmark], config: &ClusterConfig) -> Vec<LandmarkCluster> {
    let finite: Vec<Landmark> = landmarks.iter().filter(|l| is_finite(l)).copied().collect();
    if finite.len() < landmarks.len() {
        warn!(dropped = landmarks.len() - finite.len(), "ignoring non-finite landmarks");
    }
    let landmarks = finite.as_slice();
    if landmarks.is_empty() {
        return Vec::new();
    }
    if !(config.cell_size > 0.0) {
        warn!(cell_size = config.cell_size, "non-positive cell size; using a single cluster");
        return fallback(landmarks);
    }
    if landmarks.len() < config.min_cluster_size {
        debug!(
            landmarks = landmarks.len(),
            min = config.min_cluster_size,
            "too few landmarks to cluster; using a single cluster"
        );
        return fallback(landmarks);
    }

    let mut cells: BTreeMap<CellKey, Vec<usize>> = BTreeMap::new();
    for (idx, l) in landmarks.iter().enumerate() {
        if let Some(key) = cell_key(l, config.cell_size) {
            cells.entry(key).or_default().push(idx);
        }
    }

    let mut visited: HashSet<CellKey> = HashSet::with_capacity(cells.len());
    let mut clusters = Vec::new();
    let mut components = 0usize;
    let mut noise = 0usize;

    for &seed in cells.keys() {
        if !visited.insert(seed) {
            continue;
        }
        components += 1;

        let mut members: Vec<usize> = Vec::new();
        let mut stack = vec![seed];
        while let Some(key) = stack.pop() {
            if let Some(idxs) = cells.get(&key) {
                members.extend_from_slice(idxs);
            }
            for (dx, dy) in NEIGHBOURS_8 {
                let Some(next) = neighbour(key, dx, dy) else {
                    continue;
                };
                if cells.contains_key(&next) && visited.insert(next) {
                    stack.push(next);
                }
            }
        }

        if members.len() < config.min_cluster_size {
            noise += members.len();
            continue;
        }
        members.sort_unstable();
        let points: Vec<Landmark> = members.into_iter().map(|i| landmarks[i]).collect();
        clusters.extend(LandmarkCluster::from_landmarks(points));
    }

    debug!(
        cells = cells.len(),
        components,
        accepted = clusters.len(),
        noise,
        "landmark clustering finished"
    );

    if clusters.is_empty() {
        return fallback(landmarks);
    }
    clusters
}

pub(crate) fn is_finite(l: &Landmark) -> bool {
    l.x.is_finite() && l.y.is_finite() && l.z.is_finite()
}

fn fallback(landmarks: &[Landmark]) -> Vec<LandmarkCluster> {
    LandmarkCluster::from_landmarks(landmarks.to_vec())
        .into_iter()
        .collect()
}
