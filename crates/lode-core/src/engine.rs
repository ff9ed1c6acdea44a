// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The simulation engine: one serialized owner of the world and its
//! command queue.
//!
//! `advance` is the only public stepping entry point. It converts the
//! injected wall clock into a bounded number of back-to-back ticks
//! (catch-up), drains the queue in stable order for each, and hands back a
//! snapshot. Journal drains are separate calls so the broadcast layer can
//! retry after encode failures (at-least-once).

use std::collections::BTreeMap;

use crate::command::{Command, CommandQueue, EnqueueError};
use crate::config::{ConfigError, WorldConfig};
use crate::journal::{EffectUpdateFields, KeyframeRecordOutcome, ResyncHint};
use crate::snapshot::{Keyframe, TickSnapshot};
use crate::world::{ConsoleOutcome, World};

/// Maximum back-to-back ticks processed when the loop falls behind.
pub const CATCHUP_MAX_TICKS: u32 = 8;

/// The deterministic simulation engine.
#[derive(Debug)]
pub struct Engine {
    world: World,
    queue: CommandQueue,
    last_now_ms: Option<u64>,
    catchup_max_ticks: u32,
}

impl Engine {
    /// Builds an engine around a fresh world.
    ///
    /// # Errors
    /// [`ConfigError`] when the config cannot host a world.
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            world: World::new(config)?,
            queue: CommandQueue::default(),
            last_now_ms: None,
            catchup_max_ticks: CATCHUP_MAX_TICKS,
        })
    }

    /// Read access to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access for composition (join, reset) and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Current tick.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.world.tick()
    }

    /// Enqueues a command for the next tick.
    ///
    /// # Errors
    /// [`EnqueueError::UnknownActor`] when the actor does not exist, plus
    /// the queue's own capacity errors.
    pub fn enqueue(&mut self, command: Command) -> Result<(), EnqueueError> {
        if !self.world.has_actor(&command.actor_id) {
            return Err(EnqueueError::UnknownActor);
        }
        self.queue.enqueue(command)
    }

    /// Applies commands directly, bypassing the queue (tests, scripts).
    pub fn apply(&mut self, commands: &[Command]) {
        for command in commands {
            self.world.apply_command(command);
        }
    }

    /// Runs exactly one tick at the injected clock.
    pub fn step(&mut self, now_ms: u64) {
        let commands = self.queue.drain();
        self.world.advance(now_ms, &commands);
    }

    /// Advances the simulation to `now_ms`, processing up to the catch-up
    /// cap of back-to-back ticks, and returns the resulting snapshot.
    pub fn advance(&mut self, now_ms: u64) -> TickSnapshot {
        let tick_millis = self.world.config().tick_millis().max(1);
        let pending = match self.last_now_ms {
            None => 1,
            Some(last) => {
                let elapsed = now_ms.saturating_sub(last);
                ((elapsed / tick_millis) as u32).max(1)
            }
        };
        let ticks = pending.min(self.catchup_max_ticks);
        for i in 0..ticks {
            // Interior ticks get interpolated clocks; the last gets `now`.
            let t = if ticks == 1 || i + 1 == ticks {
                now_ms
            } else {
                now_ms.saturating_sub(u64::from(ticks - 1 - i) * tick_millis)
            };
            self.step(t);
        }
        self.last_now_ms = Some(now_ms);
        self.snapshot()
    }

    /// The current snapshot: live views plus copies of the staged diffs.
    pub fn snapshot(&mut self) -> TickSnapshot {
        TickSnapshot {
            tick: self.world.tick(),
            players: self.world.players_snapshot(),
            npcs: self.world.npcs_snapshot(),
            effects: self.world.effects_snapshot(),
            effect_triggers: self.world.drain_effect_triggers(),
            ground_items: self.world.ground_items_snapshot(),
            patches: self.world.journal().snapshot_patches(),
            effect_events: self.world.journal().snapshot_effect_events(),
        }
    }

    /// Drains console outcomes staged during the last tick(s).
    pub fn drain_console_outcomes(&mut self) -> Vec<ConsoleOutcome> {
        self.world.drain_console_outcomes()
    }

    // ── Journal passthrough ────────────────────────────────────────────

    /// Empties and returns staged patches.
    pub fn drain_patches(&mut self) -> Vec<crate::patch::Patch> {
        self.world.journal_mut().drain_patches()
    }

    /// Copies staged patches without clearing.
    #[must_use]
    pub fn snapshot_patches(&self) -> Vec<crate::patch::Patch> {
        self.world.journal().snapshot_patches()
    }

    /// Re-prepends drained patches after an encode failure.
    pub fn restore_patches(&mut self, drained: Vec<crate::patch::Patch>) {
        self.world.journal_mut().restore_patches(drained);
    }

    /// Empties and returns staged lifecycle events.
    pub fn drain_effect_events(&mut self) -> crate::events::EffectEventBatch {
        self.world.journal_mut().drain_effect_events()
    }

    /// Copies staged lifecycle events without clearing.
    #[must_use]
    pub fn snapshot_effect_events(&self) -> crate::events::EffectEventBatch {
        self.world.journal().snapshot_effect_events()
    }

    /// Re-prepends drained lifecycle events after an encode failure.
    pub fn restore_effect_events(&mut self, drained: crate::events::EffectEventBatch) {
        self.world.journal_mut().restore_effect_events(drained);
    }

    /// Per-id effect sequence cursors.
    #[must_use]
    pub fn effect_seq_cursors(&self) -> BTreeMap<String, u64> {
        self.world.journal().seq_cursors()
    }

    /// One-shot resync hint, when the journal armed one.
    pub fn consume_effect_resync_hint(&mut self) -> Option<ResyncHint> {
        self.world.journal_mut().consume_resync_hint()
    }

    /// Records an externally sequenced effect update (replay ingestion).
    pub fn record_external_effect_update(
        &mut self,
        id: &str,
        seq: u64,
        fields: EffectUpdateFields,
    ) -> Option<u64> {
        let tick = self.world.tick();
        self.world
            .journal_mut()
            .record_effect_update_external(tick, id, seq, fields)
    }

    // ── Keyframes ──────────────────────────────────────────────────────

    /// Captures and records a keyframe of the current state.
    pub fn record_keyframe(&mut self, now_ms: u64) -> KeyframeRecordOutcome {
        let frame = self.world.build_keyframe();
        self.world.journal_mut().record_keyframe(frame, now_ms)
    }

    /// A retained keyframe by ring sequence.
    #[must_use]
    pub fn keyframe_by_sequence(&self, sequence: u64) -> Option<&Keyframe> {
        self.world.journal().keyframe_by_sequence(sequence)
    }

    /// `(oldest, newest)` retained keyframe sequences.
    #[must_use]
    pub fn keyframe_window(&self) -> Option<(u64, u64)> {
        self.world.journal().keyframe_window()
    }

    /// The most recent retained keyframe.
    #[must_use]
    pub fn latest_keyframe(&self) -> Option<&Keyframe> {
        self.world.journal().latest_keyframe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandPayload, EnqueueError};

    fn quiet_engine() -> Engine {
        Engine::new(WorldConfig {
            obstacles: false,
            gold_mines: false,
            lava: false,
            npcs: false,
            ..WorldConfig::default()
        })
        .unwrap()
    }

    fn move_cmd(actor: &str, origin_tick: u64) -> Command {
        Command {
            actor_id: actor.to_owned(),
            origin_tick,
            issued_at: 0,
            payload: CommandPayload::Move {
                dx: 1.0,
                dy: 0.0,
                facing: None,
            },
        }
    }

    #[test]
    fn enqueue_rejects_unknown_actor() {
        let mut engine = quiet_engine();
        assert_eq!(
            engine.enqueue(move_cmd("player-404", 0)),
            Err(EnqueueError::UnknownActor)
        );
    }

    #[test]
    fn advance_applies_queued_commands() {
        let mut engine = quiet_engine();
        let id = engine.world_mut().add_player().actor.id;
        let x0 = engine.world().player(&id).unwrap().actor.x;
        engine.enqueue(move_cmd(&id, 0)).unwrap();
        let snapshot = engine.advance(66);
        assert_eq!(snapshot.tick, 1);
        let x1 = engine.world().player(&id).unwrap().actor.x;
        assert!(x1 > x0);
    }

    #[test]
    fn catchup_is_capped() {
        let mut engine = quiet_engine();
        let _ = engine.advance(66);
        // A huge stall: far more than the cap's worth of elapsed time.
        let snapshot = engine.advance(66 + 1000 * 66);
        assert_eq!(snapshot.tick, 1 + u64::from(CATCHUP_MAX_TICKS));
    }

    #[test]
    fn stale_origin_ticks_still_apply() {
        let mut engine = quiet_engine();
        let id = engine.world_mut().add_player().actor.id;
        let _ = engine.advance(66);
        let _ = engine.advance(132);
        // A command stamped far in the past is applied, not discarded.
        engine.enqueue(move_cmd(&id, 0)).unwrap();
        let x0 = engine.world().player(&id).unwrap().actor.x;
        let _ = engine.advance(198);
        assert!(engine.world().player(&id).unwrap().actor.x > x0);
    }

    #[test]
    fn apply_bypasses_the_queue() {
        let mut engine = quiet_engine();
        let id = engine.world_mut().add_player().actor.id;
        let x0 = engine.world().player(&id).unwrap().actor.x;
        engine.apply(&[move_cmd(&id, 0)]);
        // The intent landed without a tick; movement happens on step.
        assert!(engine.world().player(&id).unwrap().intent_x > 0.0);
        engine.step(66);
        assert!(engine.world().player(&id).unwrap().actor.x > x0);
    }

    #[test]
    fn keyframe_round_trip() {
        let mut engine = quiet_engine();
        let _ = engine.advance(66);
        let outcome = engine.record_keyframe(66);
        assert_eq!(outcome.size, 1);
        assert_eq!(outcome.newest, 1);
        assert!(engine.keyframe_by_sequence(1).is_some());
        assert_eq!(engine.keyframe_window(), Some((1, 1)));
    }
}
