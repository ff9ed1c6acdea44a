// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Goblin patrol behavior: waypoint cycling, and stall-based advancement
//! when a waypoint is unreachable.

use lode_core::config::WorldConfig;
use lode_core::engine::Engine;
use lode_core::world::Obstacle;

const WAYPOINT_A: (f64, f64) = (360.0, 260.0);
const WAYPOINT_B: (f64, f64) = (480.0, 260.0);

fn patrol_config() -> WorldConfig {
    WorldConfig {
        obstacles: false,
        gold_mines: false,
        lava: false,
        npcs: false,
        ..WorldConfig::default()
    }
}

fn patrol_engine() -> (Engine, String) {
    let mut engine = Engine::new(patrol_config()).expect("config");
    let id = engine.world_mut().add_npc(
        "goblin",
        WAYPOINT_A.0,
        WAYPOINT_A.1,
        vec![WAYPOINT_A, WAYPOINT_B],
    );
    (engine, id)
}

#[test]
fn goblin_patrols_out_and_back() {
    let (mut engine, id) = patrol_engine();

    let mut saw_outbound_wait = false; // index 1 while waiting at A
    let mut reached_b = false; // physically near B
    let mut saw_return_wait = false; // index 0 while waiting at B
    for t in 1..=400u64 {
        engine.step(t * 66);
        let world = engine.world();
        let npc = world.npc(&id).expect("goblin alive");
        let state = world.npc_ai_state(&id).unwrap_or("");
        if npc.blackboard.waypoint_index == 1 && state == "Wait" {
            saw_outbound_wait = true;
        }
        if (npc.actor.x - WAYPOINT_B.0).abs() <= 16.0
            && (npc.actor.y - WAYPOINT_B.1).abs() <= 16.0
        {
            reached_b = true;
        }
        if reached_b && npc.blackboard.waypoint_index == 0 && state == "Wait" {
            saw_return_wait = true;
            break;
        }
    }

    assert!(saw_outbound_wait, "goblin never targeted the second waypoint");
    assert!(reached_b, "goblin never reached the second waypoint");
    assert!(saw_return_wait, "goblin never turned back toward the first");
}

#[test]
fn blocked_waypoint_advances_by_stall() {
    let mut engine = Engine::new(patrol_config()).expect("config");
    // A 60×60 block centered on the second waypoint.
    engine.world_mut().add_obstacle(Obstacle::rock(
        WAYPOINT_B.0 - 30.0,
        WAYPOINT_B.1 - 30.0,
        60.0,
        60.0,
    ));
    let id = engine.world_mut().add_npc(
        "goblin",
        WAYPOINT_A.0,
        WAYPOINT_A.1,
        vec![WAYPOINT_A, WAYPOINT_B],
    );

    // Within 40 ticks the goblin targets the blocked waypoint.
    let mut targeted_blocked = None;
    for t in 1..=40u64 {
        engine.step(t * 66);
        if engine.world().npc(&id).expect("alive").blackboard.waypoint_index == 1 {
            targeted_blocked = Some(t);
            break;
        }
    }
    let start = targeted_blocked.expect("goblin never targeted the second waypoint");

    // Within the next 560 ticks, the stall hysteresis advances past it.
    let mut advanced = false;
    for t in (start + 1)..=(start + 560) {
        engine.step(t * 66);
        if engine.world().npc(&id).expect("alive").blackboard.waypoint_index != 1 {
            advanced = true;
            break;
        }
    }
    assert!(advanced, "stall never advanced past the blocked waypoint");
}

#[test]
fn goblin_chases_a_player_in_range() {
    let (mut engine, id) = patrol_engine();
    // Drop a player just inside the perception radius.
    let player = engine.world_mut().add_player();
    let player_id = player.actor.id;
    engine
        .world_mut()
        .set_actor_pos(&player_id, WAYPOINT_A.0 + 100.0, WAYPOINT_A.1);

    let mut chased = false;
    for t in 1..=60u64 {
        engine.step(t * 66);
        if engine.world().npc_ai_state(&id) == Some("Chase") {
            chased = true;
            break;
        }
    }
    assert!(chased, "goblin ignored a player inside 140 units");
    let npc = engine.world().npc(&id).expect("alive");
    assert_eq!(
        npc.blackboard.target_actor_id.as_deref(),
        Some(player_id.as_str())
    );
}
