// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Actors: players, NPCs, and the per-NPC blackboard.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::item::{Equipment, Inventory};

/// Cardinal facing for actors and effect aiming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Negative y.
    Up,
    /// Positive y.
    #[default]
    Down,
    /// Negative x.
    Left,
    /// Positive x.
    Right,
}

impl Facing {
    /// Unit direction vector for this facing.
    #[must_use]
    pub fn as_vec(self) -> (f64, f64) {
        match self {
            Self::Up => (0.0, -1.0),
            Self::Down => (0.0, 1.0),
            Self::Left => (-1.0, 0.0),
            Self::Right => (1.0, 0.0),
        }
    }

    /// Dominant facing for a movement vector; `None` when the vector is
    /// effectively zero.
    #[must_use]
    pub fn from_vec(dx: f64, dy: f64) -> Option<Self> {
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        Some(if dx.abs() >= dy.abs() {
            if dx >= 0.0 {
                Self::Right
            } else {
                Self::Left
            }
        } else if dy >= 0.0 {
            Self::Down
        } else {
            Self::Up
        })
    }
}

/// Fields shared by players and NPCs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// Unique actor id (`player-N` or `npc-N`).
    pub id: String,
    /// World x.
    pub x: f64,
    /// World y.
    pub y: f64,
    /// Current facing.
    pub facing: Facing,
    /// Hit points, clamped to `[0, max_health]`.
    pub health: i64,
    /// Maximum hit points.
    pub max_health: i64,
    /// Carried items.
    pub inventory: Inventory,
    /// Worn items.
    pub equipment: Equipment,
}

impl Actor {
    /// Constructs a full-health actor at a position.
    #[must_use]
    pub fn new(id: String, x: f64, y: f64, max_health: i64, inventory: Inventory) -> Self {
        Self {
            id,
            x,
            y,
            facing: Facing::default(),
            health: max_health,
            max_health,
            inventory,
            equipment: Equipment::default(),
        }
    }

    /// Squared distance to another actor.
    #[must_use]
    pub fn dist_sq_to(&self, other: &Actor) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Navmesh path-following state for one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathFollow {
    /// Final goal in world units.
    pub target: (f64, f64),
    /// Remaining waypoints, consumed front to back.
    pub waypoints: Vec<(f64, f64)>,
    /// Index of the next waypoint to chase.
    pub next_index: usize,
    /// Arrival radius in world units.
    pub arrive_radius: f64,
    /// Tick before which the path may not be replanned.
    pub replan_at: u64,
}

/// A connected player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Shared actor fields.
    #[serde(flatten)]
    pub actor: Actor,
    /// Normalized movement intent x.
    pub intent_x: f64,
    /// Normalized movement intent y.
    pub intent_y: f64,
    /// Last heartbeat arrival, loop milliseconds.
    #[serde(skip)]
    pub last_heartbeat_ms: u64,
    /// Per-action cooldown expiry ticks.
    #[serde(skip)]
    pub cooldowns: FxHashMap<String, u64>,
    /// Active path-follow state, when any.
    #[serde(skip)]
    pub path: Option<PathFollow>,
    /// Bumped on every mutation; diagnostics only.
    #[serde(skip)]
    pub version: u64,
}

impl PlayerState {
    /// Constructs a player around an actor core.
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            intent_x: 0.0,
            intent_y: 0.0,
            last_heartbeat_ms: 0,
            cooldowns: FxHashMap::default(),
            path: None,
            version: 0,
        }
    }
}

/// Number of AI ability slots.
pub const ABILITY_SLOTS: usize = 4;

/// Per-NPC memory used by the AI FSM.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blackboard {
    /// Index of the waypoint currently being traveled to.
    pub waypoint_index: usize,
    /// Best distance achieved toward the current waypoint.
    pub waypoint_best_dist: f64,
    /// Distance to the current waypoint at the last bookkeeping pass.
    pub waypoint_last_dist: f64,
    /// Ticks without progress toward the current waypoint.
    pub waypoint_stall: u32,
    /// Tick until which the NPC holds still (enter timers).
    pub wait_until: u64,
    /// Next tick the executor will evaluate this NPC.
    pub next_decision_at: u64,
    /// Tick the current state was entered.
    pub state_entered_tick: u64,
    /// Pinned perception target, when any.
    pub target_actor_id: Option<String>,
    /// Tick until which the chase persists after losing sight.
    pub chase_until: u64,
    /// Position at the last bookkeeping pass, for stuck detection.
    pub last_pos: (f64, f64),
    /// Distance moved since the last bookkeeping pass.
    pub last_move_delta: f64,
    /// Consecutive passes with movement below epsilon.
    pub stuck_counter: u32,
    /// Movement threshold below which a pass counts as stuck.
    pub stuck_epsilon: f64,
    /// Earliest tick each ability slot is ready again.
    pub next_ability_ready: [u64; ABILITY_SLOTS],
    /// Current wander destination, for random-destination behaviors.
    pub wander_target: Option<(f64, f64)>,
}

impl Blackboard {
    /// Fresh blackboard at a spawn position.
    #[must_use]
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            waypoint_best_dist: f64::INFINITY,
            waypoint_last_dist: f64::INFINITY,
            last_pos: (x, y),
            stuck_epsilon: 0.5,
            ..Self::default()
        }
    }

    /// Resets waypoint progress bookkeeping (on waypoint advance).
    pub fn reset_waypoint_progress(&mut self) {
        self.waypoint_best_dist = f64::INFINITY;
        self.waypoint_last_dist = f64::INFINITY;
        self.waypoint_stall = 0;
    }
}

/// A server-driven NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcState {
    /// Shared actor fields.
    #[serde(flatten)]
    pub actor: Actor,
    /// Type tag (`goblin`, `rat`).
    #[serde(rename = "type")]
    pub npc_type: String,
    /// Behavior config id, when FSM-driven.
    pub ai_config: Option<String>,
    /// Current FSM state index.
    pub state_index: usize,
    /// FSM memory.
    pub blackboard: Blackboard,
    /// Patrol waypoints in world units.
    pub waypoints: Vec<(f64, f64)>,
    /// Spawn anchor the NPC returns to.
    pub home: (f64, f64),
    /// Movement intent chosen by the AI this tick.
    #[serde(skip)]
    pub intent: (f64, f64),
    /// Active path-follow state, when any.
    #[serde(skip)]
    pub path: Option<PathFollow>,
}

impl NpcState {
    /// Constructs an NPC of `npc_type` at a spawn position.
    #[must_use]
    pub fn new(actor: Actor, npc_type: String, ai_config: Option<String>) -> Self {
        let home = (actor.x, actor.y);
        let blackboard = Blackboard::at(actor.x, actor.y);
        Self {
            actor,
            npc_type,
            ai_config,
            state_index: 0,
            blackboard,
            waypoints: Vec::new(),
            home,
            intent: (0.0, 0.0),
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facing_from_vec_prefers_dominant_axis() {
        assert_eq!(Facing::from_vec(1.0, 0.2), Some(Facing::Right));
        assert_eq!(Facing::from_vec(-0.2, -1.0), Some(Facing::Up));
        assert_eq!(Facing::from_vec(0.5, 0.5), Some(Facing::Right));
        assert_eq!(Facing::from_vec(0.0, 0.0), None);
    }

    #[test]
    fn blackboard_at_starts_unstalled() {
        let bb = Blackboard::at(10.0, 20.0);
        assert_eq!(bb.last_pos, (10.0, 20.0));
        assert_eq!(bb.waypoint_stall, 0);
        assert!(bb.waypoint_best_dist.is_infinite());
    }
}
