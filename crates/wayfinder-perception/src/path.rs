//! Post-processing of planner output into drivable waypoints.

use crate::grid::{GridCell, OccupancyGrid};

/// World coordinates of every cell in `cells` (cell centres).
pub fn cells_to_world(grid: &OccupancyGrid, cells: &[GridCell]) -> Vec<(f32, f32)> {
    cells.iter().map(|c| grid.grid_to_world(*c)).collect()
}

/// Heading of the segment `a → b` in radians.
pub fn segment_heading(a: (f32, f32), b: (f32, f32)) -> f32 {
    (b.1 - a.1).atan2(b.0 - a.0)
}

/// Absolute difference between two headings, wrapped to `[0, π]`.
pub fn heading_change(from: f32, to: f32) -> f32 {
    let mut d = to - from;
    while d > std::f32::consts::PI {
        d -= std::f32::consts::TAU;
    }
    while d < -std::f32::consts::PI {
        d += std::f32::consts::TAU;
    }
    d.abs()
}

/// Drop interior points where the path barely turns.
///
/// An interior point survives when the heading of its outgoing segment
/// differs from the heading of its incoming segment by at least
/// `angle_threshold` radians. The first and last points are always kept;
/// consecutive duplicates are collapsed first.
pub fn simplify_path(points: &[(f32, f32)], angle_threshold: f32) -> Vec<(f32, f32)> {
    let mut deduped: Vec<(f32, f32)> = Vec::with_capacity(points.len());
    for p in points {
        if deduped.last() != Some(p) {
            deduped.push(*p);
        }
    }
    if deduped.len() <= 2 {
        return deduped;
    }

    let mut kept = vec![deduped[0]];
    for w in deduped.windows(3) {
        let incoming = segment_heading(w[0], w[1]);
        let outgoing = segment_heading(w[1], w[2]);
        if heading_change(incoming, outgoing) >= angle_threshold {
            kept.push(w[1]);
        }
    }
    kept.push(deduped[deduped.len() - 1]);
    kept
}
