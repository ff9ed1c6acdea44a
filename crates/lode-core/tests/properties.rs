// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property-based invariants: quantization round trips, queue bounds,
//! ring bounds, collision soundness, and stack fungibility.

use proptest::prelude::*;

use lode_core::command::{Command, CommandPayload, CommandQueue, EnqueueError};
use lode_core::config::WorldConfig;
use lode_core::coord::{dequantize_world, quantize_world};
use lode_core::engine::Engine;
use lode_core::item::{compose_key, Inventory, InventorySlot, ItemStack};
use lode_core::journal::Journal;
use lode_core::snapshot::Keyframe;
use lode_core::world::{Obstacle, World};

fn quiet_config() -> WorldConfig {
    WorldConfig {
        obstacles: false,
        gold_mines: false,
        lava: false,
        npcs: false,
        ..WorldConfig::default()
    }
}

proptest! {
    #[test]
    fn quantize_dequantize_round_trips(q in -100_000i64..100_000) {
        prop_assert_eq!(quantize_world(dequantize_world(q)), q);
    }

    #[test]
    fn quantize_is_monotone(a in -1.0e6f64..1.0e6, b in -1.0e6f64..1.0e6) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(quantize_world(lo) <= quantize_world(hi));
    }

    #[test]
    fn per_actor_queue_never_exceeds_limit(
        pushes in proptest::collection::vec(0u8..4, 1..200)
    ) {
        let limit = 8;
        let mut queue = CommandQueue::new(10_000, limit, 1_000);
        for (i, actor) in pushes.iter().enumerate() {
            let actor_id = format!("player-{actor}");
            let result = queue.enqueue(Command {
                actor_id: actor_id.clone(),
                origin_tick: 0,
                issued_at: i as u64,
                payload: CommandPayload::Stop,
            });
            if queue.queued_for(&actor_id) == limit {
                // At the bound, further pushes must fail with the typed reason.
                let overflow_cmd = Command {
                    actor_id: actor_id.clone(),
                    origin_tick: 0,
                    issued_at: 0,
                    payload: CommandPayload::Stop,
                };
                let overflow_result = queue.enqueue(overflow_cmd);
                prop_assert!(matches!(overflow_result, Err(EnqueueError::PerActorLimit)));
            } else {
                prop_assert!(result.is_ok());
            }
            prop_assert!(queue.queued_for(&actor_id) <= limit);
        }
    }

    #[test]
    fn keyframe_ring_stays_bounded(
        times in proptest::collection::vec(0u64..100_000, 1..64)
    ) {
        let max_frames = 5;
        let mut journal = Journal::new(max_frames, 10_000);
        let mut now = 0;
        for dt in times {
            now += dt;
            let outcome = journal.record_keyframe(
                Keyframe {
                    sequence: 0,
                    tick: 0,
                    players: Vec::new(),
                    npcs: Vec::new(),
                    obstacles: Vec::new(),
                    ground_items: Vec::new(),
                    config: quiet_config(),
                    recorded_at_ms: 0,
                },
                now,
            );
            prop_assert!(outcome.size <= max_frames);
            prop_assert!(outcome.newest >= outcome.oldest);
        }
    }

    #[test]
    fn fungibility_key_is_order_insensitive(
        tags in proptest::collection::vec("[a-c]{1,3}", 0..4),
        tier in 0u8..5
    ) {
        let mut reversed = tags.clone();
        reversed.reverse();
        prop_assert_eq!(
            compose_key("ore", tier, &tags),
            compose_key("ore", tier, &reversed)
        );
    }

    #[test]
    fn inventory_from_slots_is_idempotent(
        quantities in proptest::collection::vec(1u32..50, 0..8)
    ) {
        let slots: Vec<InventorySlot> = quantities
            .iter()
            .enumerate()
            .map(|(i, q)| InventorySlot {
                index: (i % 5) as u32,
                stack: ItemStack {
                    item_type: "gold".to_owned(),
                    fungibility_key: "gold#t1".to_owned(),
                    quantity: *q,
                },
            })
            .collect();
        let once = Inventory::from_slots(slots, 24);
        let twice = Inventory::from_slots(once.slots().to_vec(), 24);
        prop_assert_eq!(once, twice);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn collision_keeps_actors_out_of_rock(
        seed_x in 50.0f64..2000.0,
        seed_y in 50.0f64..1400.0,
        dx in -1.0f64..1.0,
        dy in -1.0f64..1.0,
    ) {
        let mut engine = Engine::new(quiet_config()).expect("config");
        engine.world_mut().add_obstacle(Obstacle::rock(600.0, 400.0, 200.0, 200.0));
        let id = engine.world_mut().add_player().actor.id;
        engine.world_mut().set_actor_pos(&id, seed_x, seed_y);
        engine.world_mut().set_player_intent(&id, dx, dy);
        for t in 1..=30u64 {
            engine.step(t * 66);
            prop_assert!(actor_clear_of_rock(engine.world(), &id));
        }
    }

    #[test]
    fn pairwise_separation_holds_in_open_field(
        ax in 200.0f64..400.0,
        ay in 200.0f64..400.0,
        bx in 200.0f64..400.0,
        by in 200.0f64..400.0,
    ) {
        let mut engine = Engine::new(quiet_config()).expect("config");
        let a = engine.world_mut().add_player().actor.id;
        let b = engine.world_mut().add_player().actor.id;
        engine.world_mut().set_actor_pos(&a, ax, ay);
        engine.world_mut().set_actor_pos(&b, bx, by);
        // Drive both toward the same point.
        engine.world_mut().set_player_intent(&a, 0.5, 0.5);
        engine.world_mut().set_player_intent(&b, -0.5, -0.5);
        for t in 1..=20u64 {
            engine.step(t * 66);
            let pa = engine.world().player(&a).expect("a").actor.clone();
            let pb = engine.world().player(&b).expect("b").actor.clone();
            let dist = ((pa.x - pb.x).powi(2) + (pa.y - pb.y).powi(2)).sqrt();
            let min = 2.0 * engine.world().config().player_half_extent;
            prop_assert!(dist >= min - 1e-6, "tick {}: dist {} < {}", t, dist, min);
        }
    }
}

fn actor_clear_of_rock(world: &World, id: &str) -> bool {
    let Some(actor) = world.actor(id) else {
        return false;
    };
    let half = world.config().player_half_extent;
    // Strictly inside means penetration; resting on the boundary is fine.
    !world.obstacles().iter().any(|o| {
        o.kind.blocks_movement()
            && actor.x + half > o.x + 1e-6
            && actor.x - half < o.max_x() - 1e-6
            && actor.y + half > o.y + 1e-6
            && actor.y - half < o.max_y() - 1e-6
    })
}
