// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Movement integration and collision resolution.
//!
//! Per actor, per tick: normalize intent, integrate X then Y independently
//! with axis sweeps against inflated obstacle AABBs, resolve residual
//! penetration along the minimum axis, then run bounded pairwise actor
//! separation. Actors iterate in id order so the outcome is deterministic.

use crate::actor::Facing;
use crate::world::mutate::normalize_intent;
use crate::world::{Obstacle, World};

/// Pairwise separation iterations per tick.
const SEPARATION_ITERATIONS: usize = 4;

/// Minimum per-tick displacement below which a pathing actor counts as
/// blocked, for replanning.
const PATH_STALL_EPSILON: f64 = 0.1;

struct MovingActor {
    id: String,
    x: f64,
    y: f64,
    dx: f64,
    dy: f64,
    is_player: bool,
}

impl World {
    /// Runs the movement phase for every actor.
    pub(crate) fn step_movement(&mut self, dt: f64) {
        let half = self.config.player_half_extent;
        let blocking: Vec<Obstacle> = self
            .obstacles
            .iter()
            .filter(|o| o.kind.blocks_movement())
            .copied()
            .collect();

        let mut moving = self.collect_intents(dt);

        // Axis-by-axis integration with obstacle sweeps.
        for actor in &mut moving {
            let stepped_x = sweep_axis_x(actor.x, actor.y, actor.dx, half, &blocking);
            actor.x = stepped_x;
            let stepped_y = sweep_axis_y(actor.x, actor.y, actor.dy, half, &blocking);
            actor.y = stepped_y;
            resolve_penetration(&mut actor.x, &mut actor.y, half, &blocking);
        }

        // Pairwise separation, re-resolving obstacles each round.
        for _ in 0..SEPARATION_ITERATIONS {
            let mut any = false;
            for i in 0..moving.len() {
                for j in (i + 1)..moving.len() {
                    let (left, right) = moving.split_at_mut(j);
                    let a = &mut left[i];
                    let b = &mut right[0];
                    if separate_pair(a, b, half) {
                        any = true;
                    }
                }
            }
            if !any {
                break;
            }
            for actor in &mut moving {
                resolve_penetration(&mut actor.x, &mut actor.y, half, &blocking);
            }
        }

        for actor in &moving {
            self.set_actor_pos(&actor.id, actor.x, actor.y);
            if !actor.is_player {
                if let Some(facing) = Facing::from_vec(actor.dx, actor.dy) {
                    self.set_actor_facing(&actor.id, facing);
                }
            }
        }

        self.follow_paths_bookkeeping(&moving);
    }

    /// Computes per-actor displacement for this tick, consuming paths and
    /// intents. Players first, then NPCs, both in id order.
    fn collect_intents(&mut self, dt: f64) -> Vec<MovingActor> {
        let mut moving = Vec::with_capacity(self.players.len() + self.npcs.len());
        let player_speed = self.config.player_move_speed;
        let npc_speed = self.config.npc_move_speed;

        let player_ids: Vec<String> = self.players.keys().cloned().collect();
        for id in player_ids {
            let (x, y, mut ix, mut iy) = {
                let p = &self.players[&id];
                (p.actor.x, p.actor.y, p.intent_x, p.intent_y)
            };
            if let Some(dir) = self.consume_path_direction(&id, true, x, y) {
                ix = dir.0;
                iy = dir.1;
            }
            let (nx, ny) = normalize_intent(ix, iy);
            moving.push(MovingActor {
                id,
                x,
                y,
                dx: nx * player_speed * dt,
                dy: ny * player_speed * dt,
                is_player: true,
            });
        }

        let npc_ids: Vec<String> = self.npcs.keys().cloned().collect();
        for id in npc_ids {
            let (x, y, mut ix, mut iy) = {
                let n = &self.npcs[&id];
                (n.actor.x, n.actor.y, n.intent.0, n.intent.1)
            };
            if let Some(dir) = self.consume_path_direction(&id, false, x, y) {
                ix = dir.0;
                iy = dir.1;
            }
            let (nx, ny) = normalize_intent(ix, iy);
            moving.push(MovingActor {
                id,
                x,
                y,
                dx: nx * npc_speed * dt,
                dy: ny * npc_speed * dt,
                is_player: false,
            });
        }
        moving
    }

    /// Direction toward the next waypoint, advancing and clearing the path
    /// as waypoints are reached.
    fn consume_path_direction(
        &mut self,
        id: &str,
        is_player: bool,
        x: f64,
        y: f64,
    ) -> Option<(f64, f64)> {
        let path = if is_player {
            self.players.get_mut(id).and_then(|p| p.path.as_mut())
        } else {
            self.npcs.get_mut(id).and_then(|n| n.path.as_mut())
        }?;

        while path.next_index < path.waypoints.len() {
            let (wx, wy) = path.waypoints[path.next_index];
            let dist = ((wx - x).powi(2) + (wy - y).powi(2)).sqrt();
            if dist <= path.arrive_radius {
                path.next_index += 1;
            } else {
                return Some(((wx - x) / dist, (wy - y) / dist));
            }
        }

        // Path exhausted.
        if is_player {
            if let Some(p) = self.players.get_mut(id) {
                p.path = None;
            }
            self.set_player_intent(id, 0.0, 0.0);
        } else if let Some(n) = self.npcs.get_mut(id) {
            n.path = None;
            n.intent = (0.0, 0.0);
        }
        None
    }

    /// Replans paths whose replanning cooldown elapsed while the actor was
    /// still trying to move.
    fn follow_paths_bookkeeping(&mut self, moved: &[MovingActor]) {
        let tick = self.tick;
        let mut replans: Vec<(String, (f64, f64), (f64, f64))> = Vec::new();
        for actor in moved {
            if actor.dx.abs() + actor.dy.abs() < PATH_STALL_EPSILON {
                continue;
            }
            let Some(current) = self.actor(&actor.id) else {
                continue;
            };
            let pos = (current.x, current.y);
            let path = if actor.is_player {
                self.players.get(&actor.id).and_then(|p| p.path.as_ref())
            } else {
                self.npcs.get(&actor.id).and_then(|n| n.path.as_ref())
            };
            let Some(path) = path else {
                continue;
            };
            if tick >= path.replan_at {
                replans.push((actor.id.clone(), pos, path.target));
            }
        }
        for (id, from, target) in replans {
            if let Some(waypoints) = self.nav.find_path(from, target) {
                let follow = crate::actor::PathFollow {
                    target,
                    waypoints,
                    next_index: 0,
                    arrive_radius: 12.0,
                    replan_at: tick + 15,
                };
                if let Some(p) = self.players.get_mut(&id) {
                    if p.path.is_some() {
                        p.path = Some(follow);
                    }
                } else if let Some(n) = self.npcs.get_mut(&id) {
                    if n.path.is_some() {
                        n.path = Some(follow);
                    }
                }
            }
        }
    }
}

fn y_overlaps(y: f64, half: f64, o: &Obstacle) -> bool {
    y + half > o.y && y - half < o.max_y()
}

fn x_overlaps(x: f64, half: f64, o: &Obstacle) -> bool {
    x + half > o.x && x - half < o.max_x()
}

fn sweep_axis_x(x: f64, y: f64, dx: f64, half: f64, obstacles: &[Obstacle]) -> f64 {
    if dx == 0.0 {
        return x;
    }
    let mut next = x + dx;
    for o in obstacles {
        if !y_overlaps(y, half, o) {
            continue;
        }
        if dx > 0.0 && x + half <= o.x && next + half > o.x {
            next = o.x - half;
        } else if dx < 0.0 && x - half >= o.max_x() && next - half < o.max_x() {
            next = o.max_x() + half;
        }
    }
    next
}

fn sweep_axis_y(x: f64, y: f64, dy: f64, half: f64, obstacles: &[Obstacle]) -> f64 {
    if dy == 0.0 {
        return y;
    }
    let mut next = y + dy;
    for o in obstacles {
        if !x_overlaps(x, half, o) {
            continue;
        }
        if dy > 0.0 && y + half <= o.y && next + half > o.y {
            next = o.y - half;
        } else if dy < 0.0 && y - half >= o.max_y() && next - half < o.max_y() {
            next = o.max_y() + half;
        }
    }
    next
}

/// Pushes a point out of any obstacle it penetrates, along the axis of
/// minimum overlap.
fn resolve_penetration(x: &mut f64, y: &mut f64, half: f64, obstacles: &[Obstacle]) {
    for o in obstacles {
        if !(x_overlaps(*x, half, o) && y_overlaps(*y, half, o)) {
            continue;
        }
        let push_left = (*x + half) - o.x;
        let push_right = o.max_x() - (*x - half);
        let push_up = (*y + half) - o.y;
        let push_down = o.max_y() - (*y - half);
        let min_x = push_left.min(push_right);
        let min_y = push_up.min(push_down);
        if min_x <= min_y {
            if push_left <= push_right {
                *x -= push_left;
            } else {
                *x += push_right;
            }
        } else if push_up <= push_down {
            *y -= push_up;
        } else {
            *y += push_down;
        }
    }
}

/// Separates one overlapping actor pair symmetrically. Returns whether a
/// push happened.
fn separate_pair(a: &mut MovingActor, b: &mut MovingActor, half: f64) -> bool {
    let min_dist = 2.0 * half;
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let dist_sq = dx * dx + dy * dy;
    if dist_sq >= min_dist * min_dist {
        return false;
    }
    let dist = dist_sq.sqrt();
    let (nx, ny) = if dist > 1e-9 {
        (dx / dist, dy / dist)
    } else {
        // Exactly coincident: push apart along x, id order decides sides.
        (1.0, 0.0)
    };
    let overlap = min_dist - dist;
    let push = overlap / 2.0;
    a.x -= nx * push;
    a.y -= ny * push;
    b.x += nx * push;
    b.y += ny * push;
    true
}
