// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fireball lifecycle: one spawn, monotonic updates, one end, and damage
//! on impact.

use lode_core::command::{Command, CommandPayload};
use lode_core::config::WorldConfig;
use lode_core::engine::Engine;
use lode_core::events::{EffectEndReason, EffectEventBatch};

fn quiet_config() -> WorldConfig {
    WorldConfig {
        obstacles: false,
        gold_mines: false,
        lava: false,
        npcs: false,
        ..WorldConfig::default()
    }
}

struct FireballRun {
    events: EffectEventBatch,
    fireball_id: String,
    target_health_before: i64,
    target_health_after: i64,
}

fn run_fireball_at_target() -> FireballRun {
    let mut engine = Engine::new(quiet_config()).expect("config");
    let shooter = engine.world_mut().add_player().actor.id;
    let target = engine.world_mut().add_player().actor.id;
    engine.world_mut().set_actor_pos(&shooter, 200.0, 200.0);
    engine
        .world_mut()
        .set_actor_pos(&target, 200.0 + 96.0, 200.0);
    engine.world_mut().set_actor_facing(&shooter, lode_core::actor::Facing::Right);
    let target_health_before = engine.world().player(&target).expect("target").actor.health;

    engine
        .enqueue(Command {
            actor_id: shooter,
            origin_tick: 0,
            issued_at: 0,
            payload: CommandPayload::Action {
                name: "fireball".to_owned(),
            },
        })
        .expect("enqueue");

    let mut events = EffectEventBatch::default();
    for t in 1..=50u64 {
        engine.step(t * 66);
        let batch = engine.drain_effect_events();
        events.spawns.extend(batch.spawns);
        events.updates.extend(batch.updates);
        events.ends.extend(batch.ends);
    }

    let fireball_id = events
        .spawns
        .iter()
        .find(|s| s.instance.effect_type == "fireball")
        .map(|s| s.instance.id.clone())
        .expect("fireball spawn event");
    let target_health_after = engine.world().player(&target).expect("target").actor.health;
    FireballRun {
        events,
        fireball_id,
        target_health_before,
        target_health_after,
    }
}

#[test]
fn lifecycle_is_one_spawn_updates_one_end() {
    let run = run_fireball_at_target();
    let spawns: Vec<_> = run
        .events
        .spawns
        .iter()
        .filter(|s| s.instance.id == run.fireball_id)
        .collect();
    assert_eq!(spawns.len(), 1, "exactly one spawn");
    assert_eq!(spawns[0].seq, 1, "spawn seq starts at 1");

    let updates: Vec<_> = run
        .events
        .updates
        .iter()
        .filter(|u| u.id == run.fireball_id)
        .collect();
    assert!(!updates.is_empty(), "a moving fireball must update");
    let mut last_seq = 1;
    for update in &updates {
        assert!(update.seq > last_seq, "seqs strictly increase");
        last_seq = update.seq;
    }

    let ends: Vec<_> = run
        .events
        .ends
        .iter()
        .filter(|e| e.id == run.fireball_id)
        .collect();
    assert_eq!(ends.len(), 1, "exactly one end");
    assert!(ends[0].seq > last_seq, "end seq follows the last update");
    assert!(
        matches!(
            ends[0].reason,
            EffectEndReason::Expired | EffectEndReason::OwnerLost | EffectEndReason::Cancelled
        ),
        "unexpected end reason {:?}",
        ends[0].reason
    );
}

#[test]
fn impact_damages_the_target_by_health_delta() {
    let run = run_fireball_at_target();
    assert_eq!(
        run.target_health_before - run.target_health_after,
        25,
        "first-hit impact applies |healthDelta|"
    );
    // Impact terminates the projectile.
    let end = run
        .events
        .ends
        .iter()
        .find(|e| e.id == run.fireball_id)
        .expect("end event");
    assert_eq!(end.reason, EffectEndReason::Cancelled);
}

#[test]
fn a_miss_expires_by_lifetime_or_range() {
    let mut engine = Engine::new(quiet_config()).expect("config");
    let shooter = engine.world_mut().add_player().actor.id;
    engine.world_mut().set_actor_pos(&shooter, 200.0, 200.0);
    engine.world_mut().set_actor_facing(&shooter, lode_core::actor::Facing::Right);
    engine
        .enqueue(Command {
            actor_id: shooter,
            origin_tick: 0,
            issued_at: 0,
            payload: CommandPayload::Action {
                name: "fireball".to_owned(),
            },
        })
        .expect("enqueue");

    let mut events = EffectEventBatch::default();
    for t in 1..=60u64 {
        engine.step(t * 66);
        let batch = engine.drain_effect_events();
        events.spawns.extend(batch.spawns);
        events.updates.extend(batch.updates);
        events.ends.extend(batch.ends);
    }

    let id = events
        .spawns
        .iter()
        .find(|s| s.instance.effect_type == "fireball")
        .map(|s| s.instance.id.clone())
        .expect("spawn");
    let end = events.ends.iter().find(|e| e.id == id).expect("end");
    assert_eq!(end.reason, EffectEndReason::Expired);
}

#[test]
fn blood_splatter_triggers_on_hit() {
    let run = run_fireball_at_target();
    assert!(
        run.events
            .spawns
            .iter()
            .any(|s| s.instance.effect_type == "blood-splatter"),
        "a hit sprays a client-managed decal"
    );
}
