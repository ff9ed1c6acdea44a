// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replay-twice determinism: the same seed and script must hash to the
//! same journal state, byte for byte.

use lode_core::command::{Command, CommandPayload};
use lode_core::config::WorldConfig;
use lode_core::engine::Engine;

fn harness_config() -> WorldConfig {
    WorldConfig {
        seed: "idiom-phase-0-harness".to_owned(),
        obstacles: false,
        gold_mines: false,
        lava: false,
        npcs: false,
        ..WorldConfig::default()
    }
}

struct HarnessRun {
    patch_checksum: [u8; 32],
    journal_checksum: [u8; 32],
    total_patches: u64,
    total_events: u64,
}

fn run_harness() -> HarnessRun {
    let mut engine = Engine::new(harness_config()).expect("config");
    let id = engine.world_mut().add_player().actor.id;

    let script: Vec<CommandPayload> = vec![
        CommandPayload::Move {
            dx: 1.0,
            dy: 0.0,
            facing: None,
        },
        CommandPayload::Move {
            dx: 0.0,
            dy: 1.0,
            facing: None,
        },
        CommandPayload::Move {
            dx: -1.0,
            dy: 0.0,
            facing: None,
        },
        CommandPayload::Move {
            dx: 0.0,
            dy: -1.0,
            facing: None,
        },
        CommandPayload::Stop,
        CommandPayload::Heartbeat { sent_at_ms: 0 },
    ];

    for (i, payload) in script.into_iter().enumerate() {
        let tick = i as u64;
        engine
            .enqueue(Command {
                actor_id: id.clone(),
                origin_tick: tick,
                issued_at: tick,
                payload,
            })
            .expect("enqueue");
        engine.step((tick + 1) * 66);
    }

    let journal = engine.world().journal();
    HarnessRun {
        patch_checksum: journal.patch_checksum(),
        journal_checksum: journal.journal_checksum(),
        total_patches: journal.metrics().total_patches,
        total_events: journal.metrics().total_events,
    }
}

#[test]
fn replay_twice_is_bit_identical() {
    let first = run_harness();
    let second = run_harness();
    assert_eq!(first.patch_checksum, second.patch_checksum);
    assert_eq!(first.journal_checksum, second.journal_checksum);
    assert_eq!(first.total_patches, second.total_patches);
    assert_eq!(first.total_events, second.total_events);
}

#[test]
fn harness_moves_produce_patches_and_no_effects() {
    let run = run_harness();
    assert!(run.total_patches > 0, "movement must emit patches");
    assert_eq!(run.total_events, 0, "no effects were spawned");
}

#[test]
fn different_seeds_diverge_in_generated_worlds() {
    let a = Engine::new(WorldConfig {
        seed: "seed-a".to_owned(),
        ..WorldConfig::default()
    })
    .expect("config");
    let b = Engine::new(WorldConfig {
        seed: "seed-b".to_owned(),
        ..WorldConfig::default()
    })
    .expect("config");
    assert_ne!(a.world().obstacles(), b.world().obstacles());
}

#[test]
fn same_seed_generates_the_same_world() {
    let a = Engine::new(WorldConfig::default()).expect("config");
    let b = Engine::new(WorldConfig::default()).expect("config");
    assert_eq!(a.world().obstacles(), b.world().obstacles());
    assert_eq!(
        a.world().npcs_snapshot().len(),
        b.world().npcs_snapshot().len()
    );
}
