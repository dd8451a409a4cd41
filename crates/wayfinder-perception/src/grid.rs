//! Static 2-D occupancy grid built from the landmark cloud.
//!
//! The grid is square, centred on the map origin, and holds a binary
//! free/occupied state per cell. It is built once per planning session:
//!
//! 1. every landmark whose height lies inside the ground band
//!    `[z_min, z_max]` marks its cell occupied (points outside the grid's
//!    extent are dropped);
//! 2. every occupied cell is dilated by a disk of
//!    `⌈robot_radius / resolution⌉` cells.
//!
//! The occupied set only ever grows within one build; a changed map means a
//! new grid.
//!
//! Cell indices are `(i, j)` = (column along +x, row along +y). World
//! coordinates map to cells with `origin = -(size × resolution) / 2` on each
//! axis, so world `(0, 0)` sits at the centre of the grid.

use std::collections::{HashSet, VecDeque};

use tracing::debug;
use wayfinder_types::Landmark;

/// Grid cell index `(i, j)`. Signed so that off-grid conversions stay
/// representable; [`OccupancyGrid::in_bounds`] tells them apart.
pub type GridCell = (i32, i32);

/// The 8-neighbourhood, axis-aligned moves first.
pub const NEIGHBOURS_8: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Parameters for building a planning grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    /// Edge length of the square grid in cells.
    pub size: usize,
    /// Metres per cell.
    pub resolution: f32,
    /// Robot footprint radius used for obstacle inflation (metres).
    pub robot_radius: f32,
    /// Lower edge of the ground-obstacle height band (metres).
    pub z_min: f32,
    /// Upper edge of the ground-obstacle height band (metres).
    pub z_max: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: 400,
            resolution: 0.05,
            robot_radius: 0.2,
            z_min: 0.05,
            z_max: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Free,
    Occupied,
}

/// Binary occupancy grid centred on the world origin.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    resolution: f32,
    width: usize,
    height: usize,
    origin_x: f32,
    origin_y: f32,
    cells: Vec<CellState>,
}

impl OccupancyGrid {
    /// An all-free grid of `width × height` cells centred on the origin.
    pub fn new(width: usize, height: usize, resolution: f32) -> Self {
        Self {
            resolution,
            width,
            height,
            origin_x: -(width as f32 * resolution) / 2.0,
            origin_y: -(height as f32 * resolution) / 2.0,
            cells: vec![CellState::Free; width * height],
        }
    }

    /// Rasterise the ground-band landmarks and inflate by the robot radius.
    pub fn from_landmarks(landmarks: &[Landmark], config: &GridConfig) -> Self {
        let mut grid = Self::new(config.size, config.size, config.resolution);
        let mut marked = 0usize;
        for l in landmarks {
            if l.z < config.z_min || l.z > config.z_max {
                continue;
            }
            let cell = grid.world_to_grid(l.x, l.y);
            if grid.in_bounds(cell) {
                grid.set_obstacle(cell);
                marked += 1;
            }
        }
        grid.inflate_obstacles(config.robot_radius);
        debug!(
            landmarks = landmarks.len(),
            marked,
            occupied = grid.occupied_count(),
            "occupancy grid built"
        );
        grid
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// World coordinates of the lower-left corner of cell `(0, 0)`.
    pub fn origin(&self) -> (f32, f32) {
        (self.origin_x, self.origin_y)
    }

    /// Convert world coordinates to the cell containing them.
    ///
    /// The result may be out of bounds; check with [`in_bounds`][Self::in_bounds].
    pub fn world_to_grid(&self, x: f32, y: f32) -> GridCell {
        let i = ((x - self.origin_x) / self.resolution).floor();
        let j = ((y - self.origin_y) / self.resolution).floor();
        (i as i32, j as i32)
    }

    /// World coordinates of the centre of `cell`.
    pub fn grid_to_world(&self, cell: GridCell) -> (f32, f32) {
        (
            self.origin_x + (cell.0 as f32 + 0.5) * self.resolution,
            self.origin_y + (cell.1 as f32 + 0.5) * self.resolution,
        )
    }

    pub fn in_bounds(&self, (i, j): GridCell) -> bool {
        i >= 0 && j >= 0 && (i as usize) < self.width && (j as usize) < self.height
    }

    pub(crate) fn index(&self, (i, j): GridCell) -> usize {
        j as usize * self.width + i as usize
    }

    /// True when `cell` is inside the grid and not occupied.
    pub fn is_free(&self, cell: GridCell) -> bool {
        self.in_bounds(cell) && self.cells[self.index(cell)] == CellState::Free
    }

    /// Mark `cell` occupied. Out-of-range cells are ignored.
    pub fn set_obstacle(&mut self, cell: GridCell) {
        if self.in_bounds(cell) {
            let idx = self.index(cell);
            self.cells[idx] = CellState::Occupied;
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == CellState::Occupied).count()
    }

    /// Dilate every occupied cell by a disk of `⌈radius / resolution⌉` cells.
    ///
    /// The structuring element is a true disk (`dx² + dy² ≤ r²`), not a
    /// square, so diagonal clearance matches axis-aligned clearance.
    pub fn inflate_obstacles(&mut self, radius: f32) {
        let r = (radius / self.resolution).ceil() as i32;
        if r <= 0 {
            return;
        }
        let disk: Vec<(i32, i32)> = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .filter(|(dx, dy)| dx * dx + dy * dy <= r * r)
            .collect();

        // Seeds are collected first so freshly inflated cells do not grow again.
        let seeds: Vec<GridCell> = (0..self.height as i32)
            .flat_map(|j| (0..self.width as i32).map(move |i| (i, j)))
            .filter(|c| self.cells[self.index(*c)] == CellState::Occupied)
            .collect();

        for (ci, cj) in seeds {
            for (dx, dy) in &disk {
                self.set_obstacle((ci + dx, cj + dy));
            }
        }
    }

    /// Breadth-first search over 8-neighbours for the free cell closest to
    /// `start`.
    ///
    /// BFS depth over the 8-neighbourhood equals Chebyshev distance, so the
    /// search covers the square of rings `0..=max_radius` around `start`.
    /// Returns `None` when `start` is off the grid or no free cell lies
    /// within the budget.
    pub fn find_nearest_free(&self, start: GridCell, max_radius: u32) -> Option<GridCell> {
        if !self.in_bounds(start) {
            return None;
        }
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0u32)]);

        while let Some((cell, depth)) = queue.pop_front() {
            if self.is_free(cell) {
                return Some(cell);
            }
            if depth == max_radius {
                continue;
            }
            for (dx, dy) in NEIGHBOURS_8 {
                let next = (cell.0 + dx, cell.1 + dy);
                if self.in_bounds(next) && visited.insert(next) {
                    queue.push_back((next, depth + 1));
                }
            }
        }
        None
    }
}
