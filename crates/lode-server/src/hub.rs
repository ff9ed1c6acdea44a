// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The hub: subscriber management, command ingress, and broadcast fan-out.
//!
//! The hub owns the engine behind one async mutex and every subscriber's
//! outbound channel behind another (lock order: subscribers after engine,
//! never the reverse). Network reads and writes never happen under either
//! lock; sockets live in per-connection tasks that talk to the hub through
//! bounded channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use lode_core::command::{Command, CommandPayload, ConsoleCmd, EnqueueError};
use lode_core::config::WorldConfig;
use lode_core::engine::Engine;
use lode_core::world::ConsoleOutcome;
use lode_proto::{
    encode_server_message, AckStatus, ClientMessage, DiagnosticsResponse, JoinResponse,
    ServerMessage, StatePayload, PROTOCOL_VERSION,
};

/// Outbound frames per subscriber before backpressure disconnects them.
pub const SUBSCRIBER_CHANNEL_DEPTH: usize = 64;

/// A connected subscriber's hub-side handle.
struct Subscriber {
    tx: mpsc::Sender<String>,
    last_ack: AtomicU64,
}

/// The hub.
pub struct Hub {
    engine: Mutex<Engine>,
    subscribers: Mutex<HashMap<String, Subscriber>>,
    started: Instant,
    keyframe_interval: AtomicU32,
}

impl Hub {
    /// Builds a hub around a fresh engine.
    ///
    /// # Errors
    /// Propagates config validation failure.
    pub fn new(config: WorldConfig) -> Result<Self, lode_core::config::ConfigError> {
        let keyframe_interval = config.keyframe_interval.max(1);
        Ok(Self {
            engine: Mutex::new(Engine::new(config)?),
            subscribers: Mutex::new(HashMap::new()),
            started: Instant::now(),
            keyframe_interval: AtomicU32::new(keyframe_interval),
        })
    }

    /// Milliseconds since the hub started; the loop clock injected into
    /// the simulation.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Creates a player and returns the join snapshot.
    pub async fn join(&self) -> JoinResponse {
        let mut engine = self.engine.lock().await;
        let player = engine.world_mut().add_player();
        let world = engine.world();
        JoinResponse {
            ver: PROTOCOL_VERSION,
            id: player.actor.id,
            players: world.players_snapshot(),
            npcs: world.npcs_snapshot(),
            obstacles: world.obstacles().to_vec(),
            effects: world.effects_snapshot(),
            ground_items: world.ground_items_snapshot(),
            config: world.config().clone(),
            keyframe_interval: Some(self.keyframe_interval.load(Ordering::Relaxed)),
        }
    }

    /// Registers a subscriber channel for `player_id`, replacing (and
    /// thereby closing) any previous subscription for the same id.
    pub async fn subscribe(&self, player_id: &str, tx: mpsc::Sender<String>) {
        let mut subs = self.subscribers.lock().await;
        let previous = subs.insert(
            player_id.to_owned(),
            Subscriber {
                tx,
                last_ack: AtomicU64::new(0),
            },
        );
        if previous.is_some() {
            info!(player = %player_id, "subscriber replaced; previous connection closes");
        } else {
            info!(player = %player_id, "subscriber joined");
        }
    }

    /// Removes the subscriber and its player. Returns whether the player
    /// existed.
    pub async fn disconnect(&self, player_id: &str) -> bool {
        {
            let mut subs = self.subscribers.lock().await;
            subs.remove(player_id);
        }
        let mut engine = self.engine.lock().await;
        let removed = engine.world_mut().remove_player(player_id);
        if removed {
            info!(player = %player_id, "disconnected");
        }
        removed
    }

    /// Records a client ack; regressions log but are not enforced.
    pub async fn record_ack(&self, player_id: &str, ack: u64) {
        let subs = self.subscribers.lock().await;
        if let Some(sub) = subs.get(player_id) {
            let prev = sub.last_ack.swap(ack, Ordering::Relaxed);
            if ack < prev {
                warn!(player = %player_id, prev, ack, "ack regression");
            }
        }
    }

    async fn enqueue(&self, player_id: &str, payload: CommandPayload) -> Result<(), EnqueueError> {
        let mut engine = self.engine.lock().await;
        let origin_tick = engine.current_tick();
        let command = Command {
            actor_id: player_id.to_owned(),
            origin_tick,
            issued_at: self.now_ms(),
            payload,
        };
        engine.enqueue(command)
    }

    /// Routes one decoded client message. Returns an optional direct reply
    /// for the sending subscriber.
    pub async fn handle_message(
        &self,
        player_id: &str,
        message: ClientMessage,
    ) -> Option<ServerMessage> {
        match message {
            ClientMessage::Input { dx, dy, facing, ack, .. } => {
                if let Some(ack) = ack {
                    self.record_ack(player_id, ack).await;
                }
                let payload = CommandPayload::Move { dx, dy, facing };
                self.report_enqueue(player_id, payload).await;
                None
            }
            ClientMessage::Path { x, y, .. } => {
                self.report_enqueue(player_id, CommandPayload::SetPath { x, y })
                    .await;
                None
            }
            ClientMessage::CancelPath { .. } => {
                self.report_enqueue(player_id, CommandPayload::ClearPath).await;
                None
            }
            ClientMessage::Action { action, .. } => {
                self.report_enqueue(player_id, CommandPayload::Action { name: action })
                    .await;
                None
            }
            ClientMessage::Heartbeat { sent_at, .. } => {
                let now = self.now_ms();
                self.report_enqueue(player_id, CommandPayload::Heartbeat { sent_at_ms: sent_at })
                    .await;
                Some(ServerMessage::Heartbeat {
                    ver: PROTOCOL_VERSION,
                    server_time: now,
                    client_time: sent_at,
                    rtt: now.saturating_sub(sent_at),
                })
            }
            ClientMessage::Console { cmd, qty, .. } => {
                let parsed = match cmd.as_str() {
                    "drop_gold" => Some(ConsoleCmd::DropGold),
                    "pickup_gold" => Some(ConsoleCmd::PickupGold),
                    _ => None,
                };
                match parsed {
                    Some(console) => {
                        self.report_enqueue(
                            player_id,
                            CommandPayload::Console {
                                cmd: console,
                                qty: qty.unwrap_or(0),
                            },
                        )
                        .await;
                        None
                    }
                    None => Some(ServerMessage::ConsoleAck {
                        ver: PROTOCOL_VERSION,
                        cmd,
                        status: AckStatus::Error,
                        qty: None,
                        reason: Some("unknown_command".to_owned()),
                        stack_id: None,
                    }),
                }
            }
            ClientMessage::KeyframeRequest { keyframe_seq, .. } => {
                Some(self.serve_keyframe(keyframe_seq).await)
            }
            ClientMessage::KeyframeCadence { keyframe_interval, .. } => {
                self.keyframe_interval
                    .store(keyframe_interval.max(1), Ordering::Relaxed);
                None
            }
        }
    }

    async fn report_enqueue(&self, player_id: &str, payload: CommandPayload) {
        if let Err(err) = self.enqueue(player_id, payload).await {
            debug!(player = %player_id, %err, "command rejected");
        }
    }

    /// Serves a keyframe from the ring, or a nack when it is gone.
    pub async fn serve_keyframe(&self, sequence: u64) -> ServerMessage {
        let engine = self.engine.lock().await;
        match engine.keyframe_by_sequence(sequence) {
            Some(frame) => ServerMessage::Keyframe {
                ver: PROTOCOL_VERSION,
                frame: frame.clone(),
            },
            None => {
                let reason = match engine.keyframe_window() {
                    Some((oldest, _)) if sequence < oldest => "expired",
                    _ => "unknown",
                }
                .to_owned();
                ServerMessage::KeyframeNack {
                    ver: PROTOCOL_VERSION,
                    sequence,
                    reason,
                }
            }
        }
    }

    /// Diagnostics snapshot for the HTTP surface.
    pub async fn diagnostics(&self) -> DiagnosticsResponse {
        let engine = self.engine.lock().await;
        let world = engine.world();
        DiagnosticsResponse {
            status: "ok".to_owned(),
            server_time: self.now_ms(),
            tick_rate: world.config().tick_rate,
            heartbeat_millis: world.config().heartbeat_interval_ms,
            players: world
                .players_snapshot()
                .into_iter()
                .map(|p| p.actor.id)
                .collect(),
        }
    }

    /// Resets the world onto a normalized config and returns the echo.
    pub async fn reset_world(&self, request: &lode_core::config::ResetRequest) -> WorldConfig {
        let mut engine = self.engine.lock().await;
        let next = request.normalize(engine.world().config());
        engine.world_mut().reset(next.clone());
        next
    }

    /// One loop firing: advance the simulation, time out stale players,
    /// drain the journal, and fan the broadcast out.
    pub async fn tick(&self) {
        let now_ms = self.now_ms();
        let (state, console_outcomes, stale) = {
            let mut engine = self.engine.lock().await;
            let snapshot = engine.advance(now_ms);
            let stale = engine.world().stale_players(now_ms);

            let resync = engine.consume_effect_resync_hint();
            if let Some(hint) = &resync {
                warn!(
                    lost_spawns = hint.lost_spawns,
                    total_events = hint.total_events,
                    "journal requested resync; forcing keyframe"
                );
            }

            // Keyframe cadence, plus forced frames on resync.
            let interval = u64::from(self.keyframe_interval.load(Ordering::Relaxed).max(1));
            if snapshot.tick % interval == 0 || resync.is_some() {
                let outcome = engine.record_keyframe(now_ms);
                debug!(
                    size = outcome.size,
                    newest = outcome.newest,
                    evicted = outcome.evicted.len(),
                    "keyframe recorded"
                );
            }

            let patches = engine.drain_patches();
            let events = engine.drain_effect_events();
            let console_outcomes = engine.drain_console_outcomes();
            let world = engine.world();
            let state = StatePayload {
                ver: PROTOCOL_VERSION,
                t: snapshot.tick,
                players: snapshot.players,
                npcs: snapshot.npcs,
                obstacles: world.obstacles().to_vec(),
                effects: snapshot.effects,
                effect_triggers: snapshot.effect_triggers,
                ground_items: snapshot.ground_items,
                patches,
                effect_spawned: events.spawns,
                effect_update: events.updates,
                effect_ended: events.ends,
                effect_seq_cursors: engine.effect_seq_cursors(),
                resync: resync.is_some(),
                keyframe_interval: Some(self.keyframe_interval.load(Ordering::Relaxed)),
                config: world.config().clone(),
                server_time: now_ms,
            };
            (state, console_outcomes, stale)
        };

        for player_id in stale {
            warn!(player = %player_id, "heartbeat timeout");
            self.disconnect(&player_id).await;
        }

        self.deliver_console_acks(console_outcomes).await;
        self.broadcast_state(state).await;
    }

    async fn deliver_console_acks(&self, outcomes: Vec<ConsoleOutcome>) {
        if outcomes.is_empty() {
            return;
        }
        let subs = self.subscribers.lock().await;
        for outcome in outcomes {
            let Some(sub) = subs.get(&outcome.player_id) else {
                continue;
            };
            let ack = ServerMessage::ConsoleAck {
                ver: PROTOCOL_VERSION,
                cmd: outcome.cmd.as_str().to_owned(),
                status: if outcome.ok { AckStatus::Ok } else { AckStatus::Error },
                qty: (outcome.qty > 0).then_some(outcome.qty),
                reason: (!outcome.reason.is_empty()).then_some(outcome.reason),
                stack_id: outcome.stack_id,
            };
            if let Ok(encoded) = encode_server_message(&ack) {
                let _ = sub.tx.try_send(encoded);
            }
        }
    }

    /// Serializes the state envelope once and writes it to every
    /// subscriber channel; full or closed channels disconnect that
    /// subscriber and the broadcast carries on.
    async fn broadcast_state(&self, state: StatePayload) {
        let message = ServerMessage::State(Box::new(state));
        let encoded = match encode_server_message(&message) {
            Ok(encoded) => encoded,
            Err(err) => {
                // Put the drained diffs back so the next tick retries.
                warn!(%err, "state encode failed; restoring journal");
                let ServerMessage::State(state) = message else {
                    return;
                };
                let mut engine = self.engine.lock().await;
                engine.restore_patches(state.patches);
                engine.restore_effect_events(lode_core::events::EffectEventBatch {
                    spawns: state.effect_spawned,
                    updates: state.effect_update,
                    ends: state.effect_ended,
                });
                return;
            }
        };

        let mut dead: Vec<String> = Vec::new();
        {
            let subs = self.subscribers.lock().await;
            for (player_id, sub) in subs.iter() {
                if sub.tx.try_send(encoded.clone()).is_err() {
                    dead.push(player_id.clone());
                }
            }
        }
        for player_id in dead {
            warn!(player = %player_id, "subscriber channel saturated; disconnecting");
            self.disconnect(&player_id).await;
        }
    }

    /// Tick interval for the loop task.
    pub async fn tick_millis(&self) -> u64 {
        let engine = self.engine.lock().await;
        engine.world().config().tick_millis().max(1)
    }

    /// Test access to the engine.
    #[cfg(test)]
    pub(crate) fn engine(&self) -> &Mutex<Engine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn quiet_config() -> WorldConfig {
        WorldConfig {
            obstacles: false,
            gold_mines: false,
            lava: false,
            npcs: false,
            ..WorldConfig::default()
        }
    }

    async fn hub_with_player() -> (Hub, String, mpsc::Receiver<String>) {
        let hub = Hub::new(quiet_config()).unwrap();
        let join = hub.join().await;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_DEPTH);
        hub.subscribe(&join.id, tx).await;
        (hub, join.id, rx)
    }

    #[tokio::test]
    async fn join_snapshot_contains_the_new_player() {
        let hub = Hub::new(quiet_config()).unwrap();
        let join = hub.join().await;
        assert_eq!(join.ver, PROTOCOL_VERSION);
        assert!(join.players.iter().any(|p| p.actor.id == join.id));
        // Seeded inventory: gold and potions.
        let me = join.players.iter().find(|p| p.actor.id == join.id).unwrap();
        assert_eq!(me.actor.inventory.slots().len(), 2);
    }

    #[tokio::test]
    async fn tick_broadcasts_state_to_subscribers() {
        let (hub, _id, mut rx) = hub_with_player().await;
        hub.tick().await;
        let frame = timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
            .expect("state frame");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["t"], 1);
        assert_eq!(value["ver"], u64::from(PROTOCOL_VERSION));
    }

    #[tokio::test]
    async fn heartbeat_gets_a_direct_reply() {
        let (hub, id, _rx) = hub_with_player().await;
        let reply = hub
            .handle_message(
                &id,
                ClientMessage::Heartbeat {
                    ver: PROTOCOL_VERSION,
                    sent_at: 0,
                },
            )
            .await
            .expect("heartbeat reply");
        assert!(matches!(reply, ServerMessage::Heartbeat { .. }));
    }

    #[tokio::test]
    async fn unknown_console_command_nacks_immediately() {
        let (hub, id, _rx) = hub_with_player().await;
        let reply = hub
            .handle_message(
                &id,
                ClientMessage::Console {
                    ver: PROTOCOL_VERSION,
                    cmd: "rm_rf".to_owned(),
                    qty: None,
                },
            )
            .await
            .expect("console nack");
        match reply {
            ServerMessage::ConsoleAck { status, reason, .. } => {
                assert_eq!(status, AckStatus::Error);
                assert_eq!(reason.as_deref(), Some("unknown_command"));
            }
            other => panic!("wrong reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn console_round_trip_acks_through_the_loop() {
        let (hub, id, mut rx) = hub_with_player().await;
        let none = hub
            .handle_message(
                &id,
                ClientMessage::Console {
                    ver: PROTOCOL_VERSION,
                    cmd: "drop_gold".to_owned(),
                    qty: Some(10),
                },
            )
            .await;
        assert!(none.is_none());
        hub.tick().await;
        // Two frames arrive: the console ack and the state broadcast.
        let mut saw_ack = false;
        for _ in 0..2 {
            let frame = timeout(Duration::from_secs(1), rx.recv())
                .await
                .ok()
                .flatten()
                .expect("frame");
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            if value["type"] == "console_ack" {
                assert_eq!(value["status"], "ok");
                assert_eq!(value["qty"], 10);
                saw_ack = true;
            }
        }
        assert!(saw_ack);
    }

    #[tokio::test]
    async fn keyframe_request_misses_nack() {
        let (hub, _id, _rx) = hub_with_player().await;
        let reply = hub.serve_keyframe(999).await;
        match reply {
            ServerMessage::KeyframeNack { sequence, reason, .. } => {
                assert_eq!(sequence, 999);
                assert_eq!(reason, "unknown");
            }
            other => panic!("wrong reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn keyframe_cadence_records_and_serves_frames() {
        let (hub, _id, _rx) = hub_with_player().await;
        // Default interval is 30; run enough ticks for one cadence frame.
        for _ in 0..30 {
            hub.tick().await;
        }
        let engine = hub.engine().lock().await;
        assert!(engine.keyframe_window().is_some());
    }

    #[tokio::test]
    async fn subscribe_replaces_previous_connection() {
        let (hub, id, mut old_rx) = hub_with_player().await;
        let (tx, mut new_rx) = mpsc::channel(SUBSCRIBER_CHANNEL_DEPTH);
        hub.subscribe(&id, tx).await;
        hub.tick().await;
        // The replaced channel is dropped by the hub: no more frames.
        assert!(timeout(Duration::from_millis(50), old_rx.recv())
            .await
            .ok()
            .flatten()
            .is_none());
        assert!(timeout(Duration::from_secs(1), new_rx.recv())
            .await
            .ok()
            .flatten()
            .is_some());
    }

    #[tokio::test]
    async fn ack_regressions_are_tolerated() {
        let (hub, id, _rx) = hub_with_player().await;
        hub.record_ack(&id, 10).await;
        hub.record_ack(&id, 4).await; // logged, not enforced
        hub.record_ack(&id, 11).await;
    }
}
