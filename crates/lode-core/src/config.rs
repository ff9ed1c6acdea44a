// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! World configuration: threaded through constructors, echoed in every
//! keyframe, and normalized from reset requests. No process-wide singleton;
//! the server binary's composition root owns the only long-lived value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default simulation rate in ticks per second.
pub const DEFAULT_TICK_RATE: u32 = 15;

/// Full world configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldConfig {
    /// World width in world units.
    pub width: f64,
    /// World height in world units.
    pub height: f64,
    /// Seed string for all deterministic streams.
    pub seed: String,
    /// Whether to scatter rock obstacles.
    pub obstacles: bool,
    /// How many rock obstacles to scatter.
    pub obstacles_count: u32,
    /// Whether to scatter gold mines.
    pub gold_mines: bool,
    /// How many gold mines to scatter.
    pub gold_mine_count: u32,
    /// Whether to scatter lava pools.
    pub lava: bool,
    /// How many lava pools to scatter.
    pub lava_count: u32,
    /// Whether to spawn NPCs at world init.
    pub npcs: bool,
    /// Goblins to spawn.
    pub goblin_count: u32,
    /// Rats to spawn.
    pub rat_count: u32,
    /// Simulation rate, ticks per second.
    pub tick_rate: u32,
    /// Ticks between periodic keyframes.
    pub keyframe_interval: u32,
    /// Keyframe ring capacity.
    pub max_keyframes: usize,
    /// Keyframe retention age in milliseconds.
    pub max_keyframe_age_ms: u64,
    /// Expected client heartbeat cadence in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Player movement speed, world units per second.
    pub player_move_speed: f64,
    /// NPC movement speed, world units per second.
    pub npc_move_speed: f64,
    /// Actor collision half-extent in world units.
    pub player_half_extent: f64,
    /// Burn damage while standing in lava, hit points per second.
    pub lava_damage_per_second: i64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 2400.0,
            height: 1600.0,
            seed: "prospect".to_owned(),
            obstacles: true,
            obstacles_count: 12,
            gold_mines: true,
            gold_mine_count: 4,
            lava: true,
            lava_count: 2,
            npcs: true,
            goblin_count: 2,
            rat_count: 3,
            tick_rate: DEFAULT_TICK_RATE,
            keyframe_interval: 30,
            max_keyframes: 32,
            max_keyframe_age_ms: 60_000,
            heartbeat_interval_ms: 2_000,
            player_move_speed: 120.0,
            npc_move_speed: 60.0,
            player_half_extent: 10.0,
            lava_damage_per_second: 10,
        }
    }
}

impl WorldConfig {
    /// Seconds per tick.
    #[must_use]
    pub fn tick_duration(&self) -> f64 {
        1.0 / f64::from(self.tick_rate.max(1))
    }

    /// Milliseconds per tick, rounded.
    #[must_use]
    pub fn tick_millis(&self) -> u64 {
        (1000.0 / f64::from(self.tick_rate.max(1))).round() as u64
    }

    /// Converts a duration in seconds to ticks, never below one.
    #[must_use]
    pub fn duration_to_ticks(&self, seconds: f64) -> u32 {
        let ticks = (seconds * f64::from(self.tick_rate.max(1))).round() as i64;
        ticks.max(1) as u32
    }

    /// Heartbeat timeout: disconnect after three missed intervals.
    #[must_use]
    pub fn disconnect_after_ms(&self) -> u64 {
        self.heartbeat_interval_ms.saturating_mul(3)
    }

    /// Validates values a running world cannot tolerate.
    ///
    /// # Errors
    /// [`ConfigError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.width.is_finite() && self.width > 0.0)
            || !(self.height.is_finite() && self.height > 0.0)
        {
            return Err(ConfigError::InvalidBounds);
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::InvalidTickRate);
        }
        if self.max_keyframes == 0 {
            return Err(ConfigError::InvalidKeyframeRing);
        }
        if self.seed.is_empty() {
            return Err(ConfigError::EmptySeed);
        }
        Ok(())
    }
}

/// Startup configuration failures. Fatal: the process aborts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Non-positive or non-finite world extent.
    #[error("world bounds must be positive and finite")]
    InvalidBounds,
    /// Zero tick rate.
    #[error("tick rate must be at least 1")]
    InvalidTickRate,
    /// Zero-capacity keyframe ring.
    #[error("keyframe ring needs at least one frame")]
    InvalidKeyframeRing,
    /// Empty seed string.
    #[error("world seed must be non-empty")]
    EmptySeed,
}

/// Body of `POST /world/reset`: every field optional, falling back to the
/// current config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetRequest {
    /// Scatter rock obstacles.
    pub obstacles: Option<bool>,
    /// Rock obstacle count.
    pub obstacles_count: Option<u32>,
    /// Scatter gold mines.
    pub gold_mines: Option<bool>,
    /// Gold mine count.
    pub gold_mine_count: Option<u32>,
    /// Spawn NPCs.
    pub npcs: Option<bool>,
    /// Goblin count.
    pub goblin_count: Option<u32>,
    /// Rat count.
    pub rat_count: Option<u32>,
    /// Legacy total NPC count; splits two-thirds rats, one-third goblins
    /// when the per-type counts are absent.
    pub npc_count: Option<u32>,
    /// Scatter lava pools.
    pub lava: Option<bool>,
    /// Lava pool count.
    pub lava_count: Option<u32>,
    /// New seed string.
    pub seed: Option<String>,
    /// New world width.
    pub width: Option<f64>,
    /// New world height.
    pub height: Option<f64>,
}

impl ResetRequest {
    /// Produces the normalized config for a reset on top of `current`.
    #[must_use]
    pub fn normalize(&self, current: &WorldConfig) -> WorldConfig {
        let mut next = current.clone();
        if let Some(v) = self.obstacles {
            next.obstacles = v;
        }
        if let Some(v) = self.obstacles_count {
            next.obstacles_count = v;
        }
        if let Some(v) = self.gold_mines {
            next.gold_mines = v;
        }
        if let Some(v) = self.gold_mine_count {
            next.gold_mine_count = v;
        }
        if let Some(v) = self.npcs {
            next.npcs = v;
        }
        match (self.goblin_count, self.rat_count, self.npc_count) {
            (Some(g), Some(r), _) => {
                next.goblin_count = g;
                next.rat_count = r;
            }
            (Some(g), None, _) => next.goblin_count = g,
            (None, Some(r), _) => next.rat_count = r,
            (None, None, Some(total)) => {
                next.rat_count = total * 2 / 3;
                next.goblin_count = total - next.rat_count;
            }
            (None, None, None) => {}
        }
        if let Some(v) = self.lava {
            next.lava = v;
        }
        if let Some(v) = self.lava_count {
            next.lava_count = v;
        }
        if let Some(v) = &self.seed {
            if !v.is_empty() {
                next.seed.clone_from(v);
            }
        }
        if let Some(v) = self.width {
            if v.is_finite() && v > 0.0 {
                next.width = v;
            }
        }
        if let Some(v) = self.height {
            if v.is_finite() && v > 0.0 {
                next.height = v;
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        WorldConfig::default().validate().unwrap();
    }

    #[test]
    fn duration_to_ticks_has_a_floor_of_one() {
        let config = WorldConfig::default();
        assert_eq!(config.duration_to_ticks(0.0), 1);
        assert_eq!(config.duration_to_ticks(-1.0), 1);
        assert_eq!(config.duration_to_ticks(1.0), 15);
        assert_eq!(config.duration_to_ticks(3.0), 45);
        assert_eq!(config.duration_to_ticks(0.2), 3);
    }

    #[test]
    fn reset_splits_legacy_npc_count() {
        let current = WorldConfig::default();
        let req = ResetRequest {
            npc_count: Some(9),
            ..ResetRequest::default()
        };
        let next = req.normalize(&current);
        assert_eq!(next.rat_count, 6);
        assert_eq!(next.goblin_count, 3);
    }

    #[test]
    fn reset_ignores_degenerate_dimensions() {
        let current = WorldConfig::default();
        let req = ResetRequest {
            width: Some(-5.0),
            height: Some(f64::NAN),
            seed: Some(String::new()),
            ..ResetRequest::default()
        };
        let next = req.normalize(&current);
        assert_eq!(next.width, current.width);
        assert_eq!(next.height, current.height);
        assert_eq!(next.seed, current.seed);
    }

    #[test]
    fn validate_rejects_zero_tick_rate() {
        let config = WorldConfig {
            tick_rate: 0,
            ..WorldConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTickRate));
    }
}
