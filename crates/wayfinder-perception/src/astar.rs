//! A* search over an [`OccupancyGrid`].
//!
//! `f(n) = g(n) + h(n)` where
//!
//! * `g(n)` – cost so far: 1 per axis-aligned step, √2 per diagonal step;
//! * `h(n)` – straight-line Euclidean distance to the goal.
//!
//! The heuristic never overestimates the octile step cost and satisfies the
//! triangle inequality, so the first time the goal is popped its path is
//! optimal. Entries with equal `f` pop in insertion order (a monotonic
//! sequence number rides along with the priority), which makes the returned
//! path deterministic for a given grid.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::grid::{GridCell, NEIGHBOURS_8, OccupancyGrid};

#[derive(Debug, Clone, Copy)]
struct Frontier {
    f: f64,
    seq: u64,
    cell: GridCell,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

// BinaryHeap is a max-heap: invert both keys so the lowest `f`, then the
// earliest insertion, surfaces first.
impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn heuristic(a: GridCell, b: GridCell) -> f64 {
    let dx = f64::from(a.0 - b.0);
    let dy = f64::from(a.1 - b.1);
    (dx * dx + dy * dy).sqrt()
}

fn step_cost(dx: i32, dy: i32) -> f64 {
    if dx != 0 && dy != 0 {
        std::f64::consts::SQRT_2
    } else {
        1.0
    }
}

/// Find the cheapest 8-connected path from `start` to `goal`.
///
/// Both endpoints must already be free; callers recover occupied endpoints
/// with [`OccupancyGrid::find_nearest_free`] first. Returns the inclusive
/// cell sequence, or `None` when the goal is unreachable (including when
/// either endpoint is blocked).
pub fn plan_path(grid: &OccupancyGrid, start: GridCell, goal: GridCell) -> Option<Vec<GridCell>> {
    if !grid.is_free(start) || !grid.is_free(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let cells = grid.width() * grid.height();
    let mut g_score = vec![f64::INFINITY; cells];
    let mut came_from: Vec<Option<GridCell>> = vec![None; cells];
    let mut closed = vec![false; cells];
    let mut open = BinaryHeap::new();
    let mut seq = 0u64;

    g_score[grid.index(start)] = 0.0;
    open.push(Frontier {
        f: heuristic(start, goal),
        seq,
        cell: start,
    });

    while let Some(Frontier { cell: current, .. }) = open.pop() {
        let current_idx = grid.index(current);
        if closed[current_idx] {
            continue;
        }
        if current == goal {
            let path = reconstruct(grid, &came_from, goal);
            trace!(pushed = seq, length = path.len(), "A* reached goal");
            return Some(path);
        }
        closed[current_idx] = true;

        let current_g = g_score[current_idx];
        for (dx, dy) in NEIGHBOURS_8 {
            let next = (current.0 + dx, current.1 + dy);
            if !grid.is_free(next) {
                continue;
            }
            let next_idx = grid.index(next);
            if closed[next_idx] {
                continue;
            }
            let tentative = current_g + step_cost(dx, dy);
            if tentative < g_score[next_idx] {
                g_score[next_idx] = tentative;
                came_from[next_idx] = Some(current);
                seq += 1;
                open.push(Frontier {
                    f: tentative + heuristic(next, goal),
                    seq,
                    cell: next,
                });
            }
        }
    }

    trace!(pushed = seq, "A* frontier exhausted");
    None
}

fn reconstruct(grid: &OccupancyGrid, came_from: &[Option<GridCell>], goal: GridCell) -> Vec<GridCell> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(prev) = came_from[grid.index(current)] {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// Total step cost of a cell path (1 per straight move, √2 per diagonal).
pub fn path_cost(path: &[GridCell]) -> f64 {
    path.windows(2)
        .map(|w| step_cost(w[1].0 - w[0].0, w[1].1 - w[0].1))
        .sum()
}
