// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed commands and the bounded per-actor command queue.
//!
//! Producers (network readers, the AI executor) enqueue; exactly one
//! consumer (the engine) drains at the start of each tick. The queue never
//! blocks on I/O and applies a stable `(origin_tick, issued_at, insertion)`
//! order so replays reproduce byte-identical outcomes.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::actor::Facing;

/// Console commands reachable from the client prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleCmd {
    /// Drop gold from the inventory onto the ground.
    DropGold,
    /// Pick up the nearest gold pile.
    PickupGold,
}

impl ConsoleCmd {
    /// The wire name of the command.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DropGold => "drop_gold",
            Self::PickupGold => "pickup_gold",
        }
    }
}

/// Payload of a queued command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandPayload {
    /// Set the movement intent, optionally pinning a facing.
    Move {
        /// Intent x in `[-1, 1]`.
        dx: f64,
        /// Intent y in `[-1, 1]`.
        dy: f64,
        /// Explicit facing override.
        facing: Option<Facing>,
    },
    /// Clear the movement intent.
    Stop,
    /// Trigger a named action (`attack`, `fireball`).
    Action {
        /// Action name.
        name: String,
    },
    /// Start path-following toward a world position.
    SetPath {
        /// Goal x in world units.
        x: f64,
        /// Goal y in world units.
        y: f64,
    },
    /// Cancel path-following.
    ClearPath,
    /// Liveness signal carrying the client's send time.
    Heartbeat {
        /// Client clock at send, milliseconds.
        sent_at_ms: u64,
    },
    /// Console command with an optional quantity.
    Console {
        /// Which console command.
        cmd: ConsoleCmd,
        /// Quantity; 0 means "all"/default.
        qty: u32,
    },
}

/// A command bound to one actor, stamped for stable ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Target actor id.
    pub actor_id: String,
    /// Tick current when the command entered the hub.
    pub origin_tick: u64,
    /// Producer-side sequence/time for intra-tick ordering.
    pub issued_at: u64,
    /// The typed payload.
    pub payload: CommandPayload,
}

/// Enqueue failures, reported to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// Global capacity reached.
    #[error("queue_full")]
    QueueFull,
    /// Per-actor bound reached.
    #[error("per_actor_limit")]
    PerActorLimit,
    /// Actor does not exist in the world.
    #[error("unknown_actor")]
    UnknownActor,
}

/// Global queue capacity.
pub const DEFAULT_COMMAND_CAPACITY: usize = 4096;
/// Per-actor queued-command bound.
pub const DEFAULT_PER_ACTOR_LIMIT: usize = 64;
/// Emit a backpressure warning every this many queued commands per actor.
pub const DEFAULT_WARNING_STEP: usize = 16;

#[derive(Debug, Clone)]
struct QueuedCommand {
    command: Command,
    insertion: u64,
}

/// Bounded multi-producer command queue with per-actor fairness caps.
#[derive(Debug)]
pub struct CommandQueue {
    entries: Vec<QueuedCommand>,
    per_actor: FxHashMap<String, usize>,
    capacity: usize,
    per_actor_limit: usize,
    warning_step: usize,
    insertion_counter: u64,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(
            DEFAULT_COMMAND_CAPACITY,
            DEFAULT_PER_ACTOR_LIMIT,
            DEFAULT_WARNING_STEP,
        )
    }
}

impl CommandQueue {
    /// Creates a queue with explicit bounds.
    #[must_use]
    pub fn new(capacity: usize, per_actor_limit: usize, warning_step: usize) -> Self {
        Self {
            entries: Vec::new(),
            per_actor: FxHashMap::default(),
            capacity,
            per_actor_limit,
            warning_step: warning_step.max(1),
            insertion_counter: 0,
        }
    }

    /// Queued commands across all actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued commands for one actor.
    #[must_use]
    pub fn queued_for(&self, actor_id: &str) -> usize {
        self.per_actor.get(actor_id).copied().unwrap_or(0)
    }

    /// Enqueues a command.
    ///
    /// # Errors
    /// [`EnqueueError::QueueFull`] at global capacity,
    /// [`EnqueueError::PerActorLimit`] at the per-actor bound. Actor
    /// existence is the engine's concern; the queue accepts any id.
    pub fn enqueue(&mut self, command: Command) -> Result<(), EnqueueError> {
        if self.entries.len() >= self.capacity {
            return Err(EnqueueError::QueueFull);
        }
        let queued = self.queued_for(&command.actor_id);
        if queued >= self.per_actor_limit {
            return Err(EnqueueError::PerActorLimit);
        }
        let next = queued + 1;
        if next % self.warning_step == 0 {
            warn!(
                actor = %command.actor_id,
                queued = next,
                limit = self.per_actor_limit,
                "command queue backpressure"
            );
        }
        self.per_actor.insert(command.actor_id.clone(), next);
        self.insertion_counter += 1;
        self.entries.push(QueuedCommand {
            command,
            insertion: self.insertion_counter,
        });
        Ok(())
    }

    /// Drains every queued command in stable apply order:
    /// `(origin_tick, issued_at, insertion)` ascending.
    pub fn drain(&mut self) -> Vec<Command> {
        let mut taken = std::mem::take(&mut self.entries);
        self.per_actor.clear();
        taken.sort_by(|a, b| {
            a.command
                .origin_tick
                .cmp(&b.command.origin_tick)
                .then_with(|| a.command.issued_at.cmp(&b.command.issued_at))
                .then_with(|| a.insertion.cmp(&b.insertion))
        });
        taken.into_iter().map(|q| q.command).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(actor: &str, origin_tick: u64, issued_at: u64) -> Command {
        Command {
            actor_id: actor.to_owned(),
            origin_tick,
            issued_at,
            payload: CommandPayload::Stop,
        }
    }

    #[test]
    fn drain_orders_by_origin_then_issue_then_insertion() {
        let mut queue = CommandQueue::default();
        queue.enqueue(cmd("b", 5, 2)).unwrap();
        queue.enqueue(cmd("a", 4, 9)).unwrap();
        queue.enqueue(cmd("c", 5, 1)).unwrap();
        queue.enqueue(cmd("d", 5, 1)).unwrap();
        let order: Vec<String> = queue.drain().into_iter().map(|c| c.actor_id).collect();
        assert_eq!(order, vec!["a", "c", "d", "b"]);
    }

    #[test]
    fn per_actor_limit_is_enforced() {
        let mut queue = CommandQueue::new(100, 3, 10);
        for i in 0..3 {
            queue.enqueue(cmd("a", 0, i)).unwrap();
        }
        assert_eq!(queue.enqueue(cmd("a", 0, 3)), Err(EnqueueError::PerActorLimit));
        // Other actors are unaffected.
        queue.enqueue(cmd("b", 0, 0)).unwrap();
        assert_eq!(queue.queued_for("a"), 3);
    }

    #[test]
    fn global_capacity_is_enforced() {
        let mut queue = CommandQueue::new(2, 10, 10);
        queue.enqueue(cmd("a", 0, 0)).unwrap();
        queue.enqueue(cmd("b", 0, 0)).unwrap();
        assert_eq!(queue.enqueue(cmd("c", 0, 0)), Err(EnqueueError::QueueFull));
    }

    #[test]
    fn drain_resets_per_actor_counts() {
        let mut queue = CommandQueue::new(10, 2, 10);
        queue.enqueue(cmd("a", 0, 0)).unwrap();
        queue.enqueue(cmd("a", 0, 1)).unwrap();
        assert!(queue.enqueue(cmd("a", 0, 2)).is_err());
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.enqueue(cmd("a", 1, 0)).is_ok());
    }
}
