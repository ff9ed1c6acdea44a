// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Static world obstacles.

use serde::{Deserialize, Serialize};

/// Obstacle flavor. Lava blocks nothing but burns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObstacleKind {
    /// Solid rock; blocks movement.
    #[default]
    Rock,
    /// Mineable gold deposit; blocks movement.
    GoldMine,
    /// Molten ground; walkable, applies burning.
    Lava,
}

impl ObstacleKind {
    /// True when actors cannot pass through.
    #[must_use]
    pub fn blocks_movement(self) -> bool {
        !matches!(self, Self::Lava)
    }
}

/// Axis-aligned rectangular obstacle in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Minimum x of the rectangle.
    pub x: f64,
    /// Minimum y of the rectangle.
    pub y: f64,
    /// Width in world units.
    pub width: f64,
    /// Height in world units.
    pub height: f64,
    /// Obstacle flavor.
    #[serde(default)]
    pub kind: ObstacleKind,
}

impl Obstacle {
    /// Constructs a solid obstacle from its min corner and extent.
    #[must_use]
    pub fn rock(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            kind: ObstacleKind::Rock,
        }
    }

    /// Maximum x of the rectangle.
    #[must_use]
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    /// Maximum y of the rectangle.
    #[must_use]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// True when `(px, py)` lies inside the rectangle inflated by `margin`.
    #[must_use]
    pub fn contains_with_margin(&self, px: f64, py: f64, margin: f64) -> bool {
        px >= self.x - margin
            && px <= self.max_x() + margin
            && py >= self.y - margin
            && py <= self.max_y() + margin
    }
}
