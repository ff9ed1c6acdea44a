// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Keyframe ring bounds: age eviction first, then count eviction.

use lode_core::config::WorldConfig;
use lode_core::engine::Engine;
use lode_core::journal::EvictReason;

fn ring_config() -> WorldConfig {
    WorldConfig {
        obstacles: false,
        gold_mines: false,
        lava: false,
        npcs: false,
        max_keyframes: 4,
        max_keyframe_age_ms: 10_000,
        ..WorldConfig::default()
    }
}

#[test]
fn ten_frames_leave_four_with_six_evictions() {
    let mut engine = Engine::new(ring_config()).expect("config");
    let mut evicted = Vec::new();

    // Frames 1–2 recorded early, frames 3–10 after the age window has
    // swallowed the first two.
    for i in 1..=2u64 {
        let outcome = engine.record_keyframe(i * 100);
        evicted.extend(outcome.evicted);
    }
    let mut last = None;
    for i in 3..=10u64 {
        let outcome = engine.record_keyframe(15_000 + i * 100);
        evicted.extend(outcome.evicted.clone());
        last = Some(outcome);
    }

    let last = last.expect("recorded");
    assert_eq!(last.size, 4);
    assert_eq!(last.newest, 10);
    assert_eq!(last.oldest, 7);

    assert_eq!(evicted.len(), 6);
    let expired = evicted
        .iter()
        .filter(|e| e.reason == EvictReason::Expired)
        .count();
    let by_count = evicted
        .iter()
        .filter(|e| e.reason == EvictReason::Count)
        .count();
    assert_eq!(expired, 2, "the first two frames aged out");
    assert_eq!(by_count, 4, "the rest were pushed out by capacity");

    // Window and lookup agree with the outcome.
    assert_eq!(engine.keyframe_window(), Some((7, 10)));
    assert!(engine.keyframe_by_sequence(6).is_none());
    assert!(engine.keyframe_by_sequence(7).is_some());
}

#[test]
fn keyframes_echo_the_world_config() {
    let mut engine = Engine::new(ring_config()).expect("config");
    let _ = engine.advance(66);
    let outcome = engine.record_keyframe(200);
    let frame = engine
        .keyframe_by_sequence(outcome.newest)
        .expect("retained");
    assert_eq!(frame.config.max_keyframes, 4);
    assert_eq!(frame.tick, 1);
    assert_eq!(frame.recorded_at_ms, 200);
}
