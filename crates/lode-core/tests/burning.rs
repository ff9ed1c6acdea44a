// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Burning condition: periodic damage totals and the follow-visual
//! lifecycle tied to the condition's expiry.

use lode_core::config::WorldConfig;
use lode_core::engine::Engine;
use lode_core::events::EffectEventBatch;
use lode_core::world::{ConditionSpec, CONDITION_BURNING};

fn quiet_config() -> WorldConfig {
    WorldConfig {
        obstacles: false,
        gold_mines: false,
        lava: false,
        npcs: false,
        ..WorldConfig::default()
    }
}

#[test]
fn burning_deals_dps_times_duration() {
    let mut engine = Engine::new(quiet_config()).expect("config");
    let id = engine.world_mut().add_player().actor.id;
    let start_health = engine.world().player(&id).expect("player").actor.health;
    let dps = engine.world().config().lava_damage_per_second;

    // 3 s burn at 200 ms tick interval.
    let spec = ConditionSpec::burning(Some("lava".to_owned()), 3.0, dps);
    engine.world_mut().apply_condition(&id, &spec).expect("applied");

    // Run well past the condition's end so every queued damage carrier
    // lands.
    for t in 1..=60u64 {
        engine.step(t * 66);
    }

    let end_health = engine.world().player(&id).expect("player").actor.health;
    let lost = start_health - end_health;
    let expected = dps * 3;
    assert!(
        (lost - expected).abs() <= 1,
        "lost {lost}, expected {expected} ±1"
    );
    assert!(!engine.world().has_condition(&id, CONDITION_BURNING));
}

#[test]
fn burning_visual_lives_and_dies_with_the_condition() {
    let mut engine = Engine::new(quiet_config()).expect("config");
    let id = engine.world_mut().add_player().actor.id;
    let dps = engine.world().config().lava_damage_per_second;
    let spec = ConditionSpec::burning(Some("lava".to_owned()), 3.0, dps);
    engine.world_mut().apply_condition(&id, &spec).expect("applied");

    let visual_id = engine
        .world()
        .condition(&id, CONDITION_BURNING)
        .expect("condition")
        .attached_effect
        .clone()
        .expect("visual attached");

    let mut all_events = EffectEventBatch::default();
    let mut condition_gone_at = None;
    for t in 1..=60u64 {
        engine.step(t * 66);
        let batch = engine.drain_effect_events();
        all_events.spawns.extend(batch.spawns);
        all_events.updates.extend(batch.updates);
        all_events.ends.extend(batch.ends);
        if condition_gone_at.is_none() && !engine.world().has_condition(&id, CONDITION_BURNING) {
            condition_gone_at = Some(engine.world().tick());
        }
        if condition_gone_at.is_none() {
            // While the condition runs, the visual is alive and following.
            let effect = engine.world().effect(&visual_id).expect("visual alive");
            assert_eq!(effect.follow_actor_id.as_deref(), Some(id.as_str()));
        }
    }

    let expired = condition_gone_at.expect("condition expired");
    assert!(engine.world().effect(&visual_id).is_none());
    let end = all_events
        .ends
        .iter()
        .find(|e| e.id == visual_id)
        .expect("visual end event");
    assert_eq!(end.tick, expired, "visual must end in the expiry tick");
}

#[test]
fn refresh_extends_instead_of_stacking() {
    let mut engine = Engine::new(quiet_config()).expect("config");
    let id = engine.world_mut().add_player().actor.id;
    let dps = engine.world().config().lava_damage_per_second;
    let spec = ConditionSpec::burning(Some("lava".to_owned()), 3.0, dps);
    engine.world_mut().apply_condition(&id, &spec).expect("applied");
    let first_visual = engine
        .world()
        .condition(&id, CONDITION_BURNING)
        .expect("condition")
        .attached_effect
        .clone();

    for t in 1..=10u64 {
        engine.step(t * 66);
    }
    engine.world_mut().apply_condition(&id, &spec).expect("refreshed");
    let second_visual = engine
        .world()
        .condition(&id, CONDITION_BURNING)
        .expect("condition")
        .attached_effect
        .clone();
    assert_eq!(first_visual, second_visual, "refresh must keep the visual");
    // The refreshed expiry is 45 ticks out from the refresh.
    let cond = engine.world().condition(&id, CONDITION_BURNING).expect("condition");
    assert_eq!(cond.expires_at, engine.world().tick() + 45);
}

#[test]
fn non_positive_duration_is_rejected() {
    let mut engine = Engine::new(quiet_config()).expect("config");
    let id = engine.world_mut().add_player().actor.id;
    let spec = ConditionSpec::burning(None, 0.0, 10);
    assert!(engine.world_mut().apply_condition(&id, &spec).is_err());
    let spec = ConditionSpec::burning(None, -1.0, 10);
    assert!(engine.world_mut().apply_condition(&id, &spec).is_err());
}

#[test]
fn standing_in_lava_ignites() {
    let mut engine = Engine::new(WorldConfig {
        obstacles: false,
        gold_mines: false,
        npcs: false,
        lava: false,
        ..WorldConfig::default()
    })
    .expect("config");
    engine.world_mut().add_obstacle(lode_core::world::Obstacle {
        x: 100.0,
        y: 100.0,
        width: 80.0,
        height: 80.0,
        kind: lode_core::world::ObstacleKind::Lava,
    });
    let id = engine.world_mut().add_player().actor.id;
    engine.world_mut().set_actor_pos(&id, 140.0, 140.0);
    engine.step(66);
    assert!(engine.world().has_condition(&id, CONDITION_BURNING));
}
