// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tile navmesh and A* path search.
//!
//! The mesh derives from the obstacle set: a cell is walkable when its
//! center fits inside the world bounds shrunk by the actor half-extent and
//! overlaps no movement-blocking obstacle inflated by the same half-extent.
//! Search is 8-connected with the usual corner-cutting guard; ties break on
//! cell index so identical worlds produce identical paths.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::world::Obstacle;

/// Default cell size in world units (half a tile).
pub const DEFAULT_NAV_CELL: f64 = 20.0;

const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// Grid navmesh over the static obstacle set.
#[derive(Debug, Clone)]
pub struct Navmesh {
    cell_size: f64,
    cols: i64,
    rows: i64,
    walkable: Vec<bool>,
}

impl Navmesh {
    /// Builds a mesh for a `width × height` world, carving out obstacles
    /// inflated by `half_extent`.
    #[must_use]
    pub fn build(
        width: f64,
        height: f64,
        obstacles: &[Obstacle],
        half_extent: f64,
        cell_size: f64,
    ) -> Self {
        let cols = (width / cell_size).ceil().max(1.0) as i64;
        let rows = (height / cell_size).ceil().max(1.0) as i64;
        let mut walkable = vec![false; (cols * rows) as usize];
        for cy in 0..rows {
            for cx in 0..cols {
                let (x, y) = center_of(cx, cy, cell_size);
                let in_bounds = x >= half_extent
                    && x <= width - half_extent
                    && y >= half_extent
                    && y <= height - half_extent;
                let blocked = obstacles.iter().any(|o| {
                    o.kind.blocks_movement() && o.contains_with_margin(x, y, half_extent)
                });
                walkable[(cy * cols + cx) as usize] = in_bounds && !blocked;
            }
        }
        Self {
            cell_size,
            cols,
            rows,
            walkable,
        }
    }

    /// Cell coordinates containing the world position.
    #[must_use]
    pub fn cell_of(&self, x: f64, y: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    /// World-space center of a cell.
    #[must_use]
    pub fn center_of(&self, cx: i64, cy: i64) -> (f64, f64) {
        center_of(cx, cy, self.cell_size)
    }

    /// True when the cell exists and is walkable.
    #[must_use]
    pub fn is_walkable(&self, cx: i64, cy: i64) -> bool {
        cx >= 0
            && cy >= 0
            && cx < self.cols
            && cy < self.rows
            && self.walkable[(cy * self.cols + cx) as usize]
    }

    /// Finds the closest walkable cell center within `max_radius` cells of
    /// `goal`, scanning expanding squares.
    #[must_use]
    pub fn nearest_walkable(&self, goal: (f64, f64), max_radius: i64) -> Option<(f64, f64)> {
        let (gx, gy) = self.cell_of(goal.0, goal.1);
        if self.is_walkable(gx, gy) {
            return Some(self.center_of(gx, gy));
        }
        for radius in 1..=max_radius {
            let mut best: Option<((f64, f64), f64)> = None;
            for cy in (gy - radius)..=(gy + radius) {
                for cx in (gx - radius)..=(gx + radius) {
                    let on_ring = cx == gx - radius
                        || cx == gx + radius
                        || cy == gy - radius
                        || cy == gy + radius;
                    if !on_ring || !self.is_walkable(cx, cy) {
                        continue;
                    }
                    let center = self.center_of(cx, cy);
                    let d = (center.0 - goal.0).powi(2) + (center.1 - goal.1).powi(2);
                    let closer = best.is_none_or(|(_, bd)| d < bd);
                    if closer {
                        best = Some((center, d));
                    }
                }
            }
            if let Some((center, _)) = best {
                return Some(center);
            }
        }
        None
    }

    /// A* from `from` to `to` in world coordinates.
    ///
    /// Returns cell-center waypoints with the final waypoint replaced by the
    /// exact target, or `None` when no route exists. An unwalkable goal is
    /// first redirected to the nearest walkable center.
    #[must_use]
    pub fn find_path(&self, from: (f64, f64), to: (f64, f64)) -> Option<Vec<(f64, f64)>> {
        let start = self.cell_of(from.0, from.1);
        let mut target = to;
        let mut goal = self.cell_of(to.0, to.1);
        if !self.is_walkable(goal.0, goal.1) {
            let fallback = self.nearest_walkable(to, 16)?;
            goal = self.cell_of(fallback.0, fallback.1);
            target = fallback;
        }
        if !self.is_walkable(start.0, start.1) {
            return None;
        }
        if start == goal {
            return Some(vec![target]);
        }

        let idx = |c: (i64, i64)| (c.1 * self.cols + c.0) as usize;
        let len = (self.cols * self.rows) as usize;
        let mut g_score = vec![f64::INFINITY; len];
        let mut came_from: Vec<Option<(i64, i64)>> = vec![None; len];
        let mut closed = vec![false; len];

        let h = |c: (i64, i64)| {
            let dx = (c.0 - goal.0) as f64;
            let dy = (c.1 - goal.1) as f64;
            (dx * dx + dy * dy).sqrt() * self.cell_size
        };

        let mut open = BinaryHeap::new();
        g_score[idx(start)] = 0.0;
        open.push(OpenCell {
            f: h(start),
            index: idx(start),
            cell: start,
        });

        while let Some(current) = open.pop() {
            if current.cell == goal {
                let mut waypoints = Vec::new();
                let mut cursor = current.cell;
                while cursor != start {
                    waypoints.push(self.center_of(cursor.0, cursor.1));
                    match came_from[idx(cursor)] {
                        Some(prev) => cursor = prev,
                        None => break,
                    }
                }
                waypoints.reverse();
                if let Some(last) = waypoints.last_mut() {
                    *last = target;
                }
                return Some(waypoints);
            }
            if closed[idx(current.cell)] {
                continue;
            }
            closed[idx(current.cell)] = true;

            for (dx, dy) in NEIGHBORS {
                let next = (current.cell.0 + dx, current.cell.1 + dy);
                if !self.is_walkable(next.0, next.1) {
                    continue;
                }
                // Diagonal moves require both orthogonal neighbors walkable.
                if dx != 0
                    && dy != 0
                    && !(self.is_walkable(current.cell.0 + dx, current.cell.1)
                        && self.is_walkable(current.cell.0, current.cell.1 + dy))
                {
                    continue;
                }
                let step = if dx != 0 && dy != 0 {
                    self.cell_size * SQRT_2
                } else {
                    self.cell_size
                };
                let tentative = g_score[idx(current.cell)] + step;
                if tentative < g_score[idx(next)] {
                    g_score[idx(next)] = tentative;
                    came_from[idx(next)] = Some(current.cell);
                    open.push(OpenCell {
                        f: tentative + h(next),
                        index: idx(next),
                        cell: next,
                    });
                }
            }
        }
        None
    }
}

const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

fn center_of(cx: i64, cy: i64, cell_size: f64) -> (f64, f64) {
    (
        cx as f64 * cell_size + cell_size / 2.0,
        cy as f64 * cell_size + cell_size / 2.0,
    )
}

/// Open-set entry ordered for a min-heap on `(f, index)`.
#[derive(Debug, Clone, Copy)]
struct OpenCell {
    f: f64,
    index: usize,
    cell: (i64, i64),
}

impl PartialEq for OpenCell {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.index == other.index
    }
}

impl Eq for OpenCell {}

impl Ord for OpenCell {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest f first.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for OpenCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Obstacle;

    fn open_field() -> Navmesh {
        Navmesh::build(400.0, 400.0, &[], 10.0, DEFAULT_NAV_CELL)
    }

    #[test]
    fn straight_path_in_open_field() {
        let mesh = open_field();
        let path = mesh.find_path((30.0, 30.0), (350.0, 30.0)).expect("path");
        assert_eq!(path.last().copied(), Some((350.0, 30.0)));
        // Straight east: every waypoint shares the row.
        for (_, y) in &path {
            assert!((y - 30.0).abs() < DEFAULT_NAV_CELL);
        }
    }

    #[test]
    fn routes_around_a_wall() {
        let wall = Obstacle::rock(180.0, 0.0, 40.0, 300.0);
        let mesh = Navmesh::build(400.0, 400.0, &[wall], 10.0, DEFAULT_NAV_CELL);
        let path = mesh.find_path((30.0, 30.0), (370.0, 30.0)).expect("path");
        assert_eq!(path.last().copied(), Some((370.0, 30.0)));
        // The route must dip below the wall's southern end.
        let max_y = path.iter().map(|(_, y)| *y).fold(0.0_f64, f64::max);
        assert!(max_y > 300.0);
    }

    #[test]
    fn lava_does_not_block_paths() {
        let mut lava = Obstacle::rock(180.0, 0.0, 40.0, 400.0);
        lava.kind = crate::world::ObstacleKind::Lava;
        let mesh = Navmesh::build(400.0, 400.0, &[lava], 10.0, DEFAULT_NAV_CELL);
        assert!(mesh.find_path((30.0, 30.0), (370.0, 30.0)).is_some());
    }

    #[test]
    fn unwalkable_goal_redirects_to_nearest_center() {
        let block = Obstacle::rock(160.0, 160.0, 80.0, 80.0);
        let mesh = Navmesh::build(400.0, 400.0, &[block], 10.0, DEFAULT_NAV_CELL);
        let path = mesh.find_path((30.0, 30.0), (200.0, 200.0)).expect("path");
        let (end_x, end_y) = path.last().copied().expect("non-empty");
        assert!(!mesh.is_walkable(
            mesh.cell_of(200.0, 200.0).0,
            mesh.cell_of(200.0, 200.0).1
        ));
        let (ex, ey) = mesh.cell_of(end_x, end_y);
        assert!(mesh.is_walkable(ex, ey));
    }

    #[test]
    fn nearest_walkable_prefers_closest_ring_cell() {
        let block = Obstacle::rock(160.0, 160.0, 80.0, 80.0);
        let mesh = Navmesh::build(400.0, 400.0, &[block], 10.0, DEFAULT_NAV_CELL);
        let near = mesh.nearest_walkable((170.0, 200.0), 8).expect("walkable");
        // Closest open cell is west of the block.
        assert!(near.0 < 160.0);
    }

    #[test]
    fn fully_blocked_world_has_no_paths() {
        let block = Obstacle::rock(0.0, 0.0, 400.0, 400.0);
        let mesh = Navmesh::build(400.0, 400.0, &[block], 10.0, DEFAULT_NAV_CELL);
        assert!(mesh.find_path((30.0, 30.0), (370.0, 30.0)).is_none());
    }
}
