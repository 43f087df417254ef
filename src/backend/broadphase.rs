use std::collections::{HashMap, HashSet};

use glam::Vec3;

use super::shape::Aabb;

/// Uniform grid spatial partitioning used by the broad-phase.
pub struct SpatialGrid {
    cell_size: f32,
    grid: HashMap<(i32, i32, i32), Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1e-3),
            grid: HashMap::new(),
        }
    }

    fn world_to_grid(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    pub fn clear(&mut self) {
        self.grid.clear();
    }

    pub fn insert(&mut self, index: usize, bounds: &Aabb) {
        let min_cell = self.world_to_grid(bounds.min);
        let max_cell = self.world_to_grid(bounds.max);

        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    self.grid.entry((x, y, z)).or_default().push(index);
                }
            }
        }
    }

    pub fn query(&self, bounds: &Aabb) -> Vec<usize> {
        let mut results = Vec::new();
        let min_cell = self.world_to_grid(bounds.min);
        let max_cell = self.world_to_grid(bounds.max);

        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    if let Some(entries) = self.grid.get(&(x, y, z)) {
                        results.extend(entries);
                    }
                }
            }
        }

        results.sort_unstable();
        results.dedup();
        results
    }
}

/// Broad phase driver returning index pairs whose world bounds overlap.
pub struct BroadPhase {
    grid: SpatialGrid,
}

impl BroadPhase {
    /// Cells larger than this are clamped so a huge ground plane does not
    /// blow up the cell count.
    const MAX_CELLS_PER_AXIS: f32 = 64.0;

    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
        }
    }

    /// Sorted `(i, j)` pairs with `i < j`.
    pub fn potential_pairs(&mut self, bounds: &[Aabb]) -> Vec<(usize, usize)> {
        self.grid.clear();

        let mut oversized = Vec::new();
        for (index, aabb) in bounds.iter().enumerate() {
            if !aabb.is_valid() {
                continue;
            }
            let span = (aabb.max - aabb.min) / self.grid.cell_size;
            if span.max_element() > Self::MAX_CELLS_PER_AXIS {
                oversized.push(index);
            } else {
                self.grid.insert(index, aabb);
            }
        }

        let mut pairs = Vec::new();
        let mut checked = HashSet::new();
        let mut push_pair = |a: usize, b: usize| {
            if a == b {
                return;
            }
            let key = if a < b { (a, b) } else { (b, a) };
            if bounds[key.0].overlaps(&bounds[key.1]) && checked.insert(key) {
                pairs.push(key);
            }
        };

        for (index, aabb) in bounds.iter().enumerate() {
            if !aabb.is_valid() || oversized.contains(&index) {
                continue;
            }
            for other in self.grid.query(aabb) {
                push_pair(index, other);
            }
        }

        // Oversized proxies are tested against everything directly.
        for &index in &oversized {
            for other in 0..bounds.len() {
                if bounds[other].is_valid() {
                    push_pair(index, other);
                }
            }
        }

        pairs.sort_unstable();
        pairs
    }
}
