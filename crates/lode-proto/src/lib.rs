// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! lode-proto: wire schema for the mine-and-die server.
//!
//! All traffic is JSON, tagged by `type`, and stamped with `ver`. Patch
//! and effect-event coordinates are quantized integers; floats appear
//! only in full actor snapshots and client intent vectors.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn,
    clippy::use_self
)]

pub mod wire;

pub use wire::{decode_client_message, encode_server_message, WireError};

use serde::{Deserialize, Serialize};

use lode_core::actor::{Facing, NpcState, PlayerState};
use lode_core::config::WorldConfig;
use lode_core::effect::EffectSnapshot;
use lode_core::events::{EffectEndEvent, EffectSpawnEvent, EffectUpdateEvent};
use lode_core::item::GroundItem;
use lode_core::patch::Patch;
use lode_core::snapshot::Keyframe;
use lode_core::world::Obstacle;

/// Protocol version stamped on every message.
pub const PROTOCOL_VERSION: u32 = 1;

/// Client keyframe-retry backoff base, milliseconds.
pub const KEYFRAME_RETRY_BASE_MS: u64 = 200;
/// Client keyframe-retry backoff ceiling, milliseconds.
pub const KEYFRAME_RETRY_MAX_MS: u64 = 2_000;
/// Client keyframe-retry attempts before forcing a full resync.
pub const KEYFRAME_RETRY_ATTEMPTS: u32 = 3;

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Movement intent, optionally acknowledging an applied tick.
    #[serde(rename_all = "camelCase")]
    Input {
        /// Protocol version.
        ver: u32,
        /// Intent x in `[-1, 1]`.
        dx: f64,
        /// Intent y in `[-1, 1]`.
        dy: f64,
        /// Explicit facing, when the client pins one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        facing: Option<Facing>,
        /// Highest tick the client has fully applied.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<u64>,
    },
    /// Click-to-move request.
    #[serde(rename_all = "camelCase")]
    Path {
        /// Protocol version.
        ver: u32,
        /// Goal x, world units.
        x: f64,
        /// Goal y, world units.
        y: f64,
    },
    /// Cancels click-to-move.
    #[serde(rename_all = "camelCase")]
    CancelPath {
        /// Protocol version.
        ver: u32,
    },
    /// Named action trigger.
    #[serde(rename_all = "camelCase")]
    Action {
        /// Protocol version.
        ver: u32,
        /// Action name (`attack`, `fireball`).
        action: String,
        /// Free-form action parameters; currently unused server-side.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<serde_json::Value>,
    },
    /// Liveness ping.
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        /// Protocol version.
        ver: u32,
        /// Client clock at send, milliseconds.
        sent_at: u64,
    },
    /// Console command.
    #[serde(rename_all = "camelCase")]
    Console {
        /// Protocol version.
        ver: u32,
        /// Command name (`drop_gold`, `pickup_gold`).
        cmd: String,
        /// Optional quantity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qty: Option<u32>,
    },
    /// Request for a retained keyframe.
    #[serde(rename_all = "camelCase")]
    KeyframeRequest {
        /// Protocol version.
        ver: u32,
        /// Requested ring sequence.
        keyframe_seq: u64,
        /// Tick hint, diagnostics only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keyframe_tick: Option<u64>,
    },
    /// Client-driven keyframe cadence override.
    #[serde(rename_all = "camelCase")]
    KeyframeCadence {
        /// Protocol version.
        ver: u32,
        /// Requested ticks between keyframes.
        keyframe_interval: u32,
    },
}

/// A console ack's status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    /// The command succeeded.
    Ok,
    /// The command failed; see `reason`.
    Error,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Per-tick state broadcast: authoritative views plus diffs.
    #[serde(rename = "state")]
    State(Box<StatePayload>),
    /// A retained keyframe, served on request or forced by resync.
    #[serde(rename = "keyframe", rename_all = "camelCase")]
    Keyframe {
        /// Protocol version.
        ver: u32,
        /// The frame.
        #[serde(flatten)]
        frame: Keyframe,
    },
    /// The requested keyframe is not retained.
    #[serde(rename = "keyframeNack", rename_all = "camelCase")]
    KeyframeNack {
        /// Protocol version.
        ver: u32,
        /// The sequence that missed.
        sequence: u64,
        /// Why (`expired`, `unknown`).
        reason: String,
    },
    /// Heartbeat echo with measured round trip.
    #[serde(rename = "heartbeat", rename_all = "camelCase")]
    Heartbeat {
        /// Protocol version.
        ver: u32,
        /// Server loop clock, milliseconds.
        server_time: u64,
        /// Echoed client send time.
        client_time: u64,
        /// Round trip estimate, milliseconds.
        rtt: u64,
    },
    /// Console command result.
    #[serde(rename = "console_ack", rename_all = "camelCase")]
    ConsoleAck {
        /// Protocol version.
        ver: u32,
        /// The command this answers.
        cmd: String,
        /// Outcome.
        status: AckStatus,
        /// Quantity moved, when meaningful.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qty: Option<u32>,
        /// Failure reason code, on error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// Stack involved, when any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack_id: Option<String>,
    },
}

/// Body of a `state` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    /// Protocol version.
    pub ver: u32,
    /// Tick this state describes.
    pub t: u64,
    /// All players.
    pub players: Vec<PlayerState>,
    /// All NPCs.
    pub npcs: Vec<NpcState>,
    /// Static obstacles.
    pub obstacles: Vec<Obstacle>,
    /// Live effects.
    pub effects: Vec<EffectSnapshot>,
    /// One-shot client-managed triggers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effect_triggers: Vec<EffectSnapshot>,
    /// Ground items.
    pub ground_items: Vec<GroundItem>,
    /// Entity diffs for this batch.
    pub patches: Vec<Patch>,
    /// Effect spawns, monotonic per id.
    #[serde(
        rename = "effect_spawned",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub effect_spawned: Vec<EffectSpawnEvent>,
    /// Effect updates, monotonic per id.
    #[serde(
        rename = "effect_update",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub effect_update: Vec<EffectUpdateEvent>,
    /// Effect ends, monotonic per id.
    #[serde(
        rename = "effect_ended",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub effect_ended: Vec<EffectEndEvent>,
    /// Per-id sequence cursors for replay validation.
    #[serde(
        rename = "effect_seq_cursors",
        default,
        skip_serializing_if = "std::collections::BTreeMap::is_empty"
    )]
    pub effect_seq_cursors: std::collections::BTreeMap<String, u64>,
    /// Set when the client must discard pending diffs and rehydrate.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resync: bool,
    /// Current keyframe cadence, ticks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyframe_interval: Option<u32>,
    /// World config echo.
    pub config: WorldConfig,
    /// Server loop clock, milliseconds.
    pub server_time: u64,
}

/// Body of the `POST /join` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    /// Protocol version.
    pub ver: u32,
    /// The id assigned to the joining player.
    pub id: String,
    /// All players, the newcomer included.
    pub players: Vec<PlayerState>,
    /// All NPCs.
    pub npcs: Vec<NpcState>,
    /// Static obstacles.
    pub obstacles: Vec<Obstacle>,
    /// Live effects.
    pub effects: Vec<EffectSnapshot>,
    /// Ground items.
    pub ground_items: Vec<GroundItem>,
    /// World config echo.
    pub config: WorldConfig,
    /// Keyframe cadence, ticks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyframe_interval: Option<u32>,
}

/// Body of the `GET /diagnostics` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    /// Always `ok` while the process serves.
    pub status: String,
    /// Server loop clock, milliseconds.
    pub server_time: u64,
    /// Tick rate, Hz.
    pub tick_rate: u32,
    /// Heartbeat interval, milliseconds.
    pub heartbeat_millis: u64,
    /// Connected player ids.
    pub players: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_input_round_trips() {
        let json = r#"{"type":"input","ver":1,"dx":0.5,"dy":-1.0,"facing":"left","ack":42}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match &msg {
            ClientMessage::Input { dx, facing, ack, .. } => {
                assert_eq!(*dx, 0.5);
                assert_eq!(*facing, Some(Facing::Left));
                assert_eq!(*ack, Some(42));
            }
            other => panic!("wrong variant: {other:?}"),
        }
        let back = serde_json::to_string(&msg).unwrap();
        let again: ClientMessage = serde_json::from_str(&back).unwrap();
        assert_eq!(msg, again);
    }

    #[test]
    fn keyframe_request_uses_camel_case_fields() {
        let json = r#"{"type":"keyframeRequest","ver":1,"keyframeSeq":7}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::KeyframeRequest {
                ver: 1,
                keyframe_seq: 7,
                keyframe_tick: None
            }
        );
    }

    #[test]
    fn state_envelope_round_trips_with_core_types() {
        use lode_core::actor::{Actor, PlayerState};
        use lode_core::item::Inventory;

        let player = PlayerState::new(Actor::new(
            "player-1".to_owned(),
            200.0,
            200.0,
            100,
            Inventory::with_capacity(4),
        ));
        let state = StatePayload {
            ver: PROTOCOL_VERSION,
            t: 7,
            players: vec![player],
            npcs: Vec::new(),
            obstacles: Vec::new(),
            effects: Vec::new(),
            effect_triggers: Vec::new(),
            ground_items: Vec::new(),
            patches: vec![Patch::PlayerPos {
                id: "player-1".to_owned(),
                x: 80,
                y: 80,
            }],
            effect_spawned: Vec::new(),
            effect_update: Vec::new(),
            effect_ended: Vec::new(),
            effect_seq_cursors: std::collections::BTreeMap::new(),
            resync: false,
            keyframe_interval: Some(30),
            config: WorldConfig::default(),
            server_time: 1234,
        };
        let msg = ServerMessage::State(Box::new(state));
        let encoded = wire::encode_server_message(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["t"], 7);
        assert_eq!(value["patches"][0]["kind"], "playerPos");
        assert_eq!(value["players"][0]["maxHealth"], 100);
        assert_eq!(value["serverTime"], 1234);
        // Empty event streams stay off the wire entirely.
        assert!(value.get("effect_spawned").is_none());
        assert!(value.get("resync").is_none());
        let back: ServerMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn console_ack_serializes_snake_type() {
        let msg = ServerMessage::ConsoleAck {
            ver: PROTOCOL_VERSION,
            cmd: "drop_gold".to_owned(),
            status: AckStatus::Error,
            qty: None,
            reason: Some("insufficient_gold".to_owned()),
            stack_id: None,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "console_ack");
        assert_eq!(value["status"], "error");
        assert_eq!(value["reason"], "insufficient_gold");
    }
}
