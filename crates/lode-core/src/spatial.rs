// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Uniform grid over effect bounding boxes.
//!
//! Cell size is one tile. Every live effect occupies the cells covered by
//! its inflated AABB; a per-cell capacity guard rejects upserts that would
//! saturate a cell, and the caller is expected to drop the effect.

use rustc_hash::FxHashMap;

use crate::coord::TILE_SIZE;

/// Axis-aligned bounding box in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    /// Minimum x.
    pub min_x: f64,
    /// Minimum y.
    pub min_y: f64,
    /// Maximum x.
    pub max_x: f64,
    /// Maximum y.
    pub max_y: f64,
}

impl Aabb {
    /// Constructs a box from a center and half-extents.
    #[must_use]
    pub fn from_center(x: f64, y: f64, half_w: f64, half_h: f64) -> Self {
        Self {
            min_x: x - half_w,
            min_y: y - half_h,
            max_x: x + half_w,
            max_y: y + half_h,
        }
    }

    /// Inflates degenerate extents to `min_extent` around the center.
    #[must_use]
    fn clamped_to_min_extent(self, min_extent: f64) -> Self {
        let mut out = self;
        if out.max_x - out.min_x < min_extent {
            let cx = (out.min_x + out.max_x) / 2.0;
            out.min_x = cx - min_extent / 2.0;
            out.max_x = cx + min_extent / 2.0;
        }
        if out.max_y - out.min_y < min_extent {
            let cy = (out.min_y + out.max_y) / 2.0;
            out.min_y = cy - min_extent / 2.0;
            out.max_y = cy + min_extent / 2.0;
        }
        out
    }
}

/// Uniform grid index with a per-cell capacity guard.
#[derive(Debug)]
pub struct SpatialIndex {
    cell_size: f64,
    max_per_cell: usize,
    cells: FxHashMap<(i64, i64), Vec<String>>,
    coverage: FxHashMap<String, Vec<(i64, i64)>>,
}

/// Default per-cell occupancy bound.
pub const DEFAULT_MAX_PER_CELL: usize = 32;

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(TILE_SIZE, DEFAULT_MAX_PER_CELL)
    }
}

impl SpatialIndex {
    /// Creates an index with the given cell size and capacity bound.
    #[must_use]
    pub fn new(cell_size: f64, max_per_cell: usize) -> Self {
        Self {
            cell_size,
            max_per_cell,
            cells: FxHashMap::default(),
            coverage: FxHashMap::default(),
        }
    }

    fn cells_for(&self, aabb: Aabb) -> Vec<(i64, i64)> {
        // Clamp the minimum extent to a quarter cell so a degenerate box
        // still lands in at least one cell.
        let aabb = aabb.clamped_to_min_extent(self.cell_size * 0.25);
        let min_cx = (aabb.min_x / self.cell_size).floor() as i64;
        let min_cy = (aabb.min_y / self.cell_size).floor() as i64;
        let max_cx = (aabb.max_x / self.cell_size).floor() as i64;
        let max_cy = (aabb.max_y / self.cell_size).floor() as i64;
        let mut out = Vec::with_capacity(((max_cx - min_cx + 1) * (max_cy - min_cy + 1)) as usize);
        for cy in min_cy..=max_cy {
            for cx in min_cx..=max_cx {
                out.push((cx, cy));
            }
        }
        out
    }

    /// Inserts or relocates `id` to cover `aabb`.
    ///
    /// Returns `false` when any covered cell would exceed the capacity
    /// bound; the index is left unchanged and the caller must drop the
    /// effect.
    pub fn upsert(&mut self, id: &str, aabb: Aabb) -> bool {
        let wanted = self.cells_for(aabb);
        for cell in &wanted {
            let occupants = self.cells.get(cell).map_or(0, Vec::len);
            let already_here = self
                .cells
                .get(cell)
                .is_some_and(|v| v.iter().any(|o| o == id));
            let existing = usize::from(already_here);
            if occupants - existing >= self.max_per_cell {
                return false;
            }
        }
        self.remove(id);
        for cell in &wanted {
            self.cells.entry(*cell).or_default().push(id.to_owned());
        }
        self.coverage.insert(id.to_owned(), wanted);
        true
    }

    /// Removes `id` from every cell it covers. O(cells-per-effect).
    pub fn remove(&mut self, id: &str) {
        let Some(covered) = self.coverage.remove(id) else {
            return;
        };
        for cell in covered {
            if let Some(occupants) = self.cells.get_mut(&cell) {
                occupants.retain(|o| o != id);
                if occupants.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    /// Ids of effects whose coverage intersects `aabb`, sorted and deduped.
    #[must_use]
    pub fn query(&self, aabb: Aabb) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for cell in self.cells_for(aabb) {
            if let Some(occupants) = self.cells.get(&cell) {
                out.extend(occupants.iter().cloned());
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Number of indexed effects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coverage.len()
    }

    /// True when nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coverage.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_query_round_trip() {
        let mut index = SpatialIndex::default();
        assert!(index.upsert("e1", Aabb::from_center(20.0, 20.0, 5.0, 5.0)));
        assert!(index.upsert("e2", Aabb::from_center(100.0, 100.0, 5.0, 5.0)));
        let hits = index.query(Aabb::from_center(20.0, 20.0, 10.0, 10.0));
        assert_eq!(hits, vec!["e1".to_owned()]);
    }

    #[test]
    fn upsert_relocates_instead_of_duplicating() {
        let mut index = SpatialIndex::default();
        assert!(index.upsert("e1", Aabb::from_center(20.0, 20.0, 5.0, 5.0)));
        assert!(index.upsert("e1", Aabb::from_center(500.0, 500.0, 5.0, 5.0)));
        assert!(index.query(Aabb::from_center(20.0, 20.0, 10.0, 10.0)).is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn capacity_guard_rejects_saturated_cell() {
        let mut index = SpatialIndex::new(TILE_SIZE, 2);
        assert!(index.upsert("e1", Aabb::from_center(20.0, 20.0, 1.0, 1.0)));
        assert!(index.upsert("e2", Aabb::from_center(21.0, 21.0, 1.0, 1.0)));
        assert!(!index.upsert("e3", Aabb::from_center(22.0, 22.0, 1.0, 1.0)));
        // A resident effect can still move within the saturated cell.
        assert!(index.upsert("e2", Aabb::from_center(23.0, 23.0, 1.0, 1.0)));
    }

    #[test]
    fn remove_clears_coverage() {
        let mut index = SpatialIndex::default();
        assert!(index.upsert("e1", Aabb::from_center(20.0, 20.0, 50.0, 50.0)));
        index.remove("e1");
        assert!(index.is_empty());
        assert!(index.query(Aabb::from_center(20.0, 20.0, 60.0, 60.0)).is_empty());
    }

    #[test]
    fn degenerate_box_still_covers_a_cell() {
        let mut index = SpatialIndex::default();
        assert!(index.upsert("e1", Aabb::from_center(20.0, 20.0, 0.0, 0.0)));
        assert_eq!(
            index.query(Aabb::from_center(20.0, 20.0, 1.0, 1.0)),
            vec!["e1".to_owned()]
        );
    }
}
