// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The world: actors, obstacles, effects, ground items, conditions, and the
//! journal, behind mutation primitives that record patches.
//!
//! Exactly one owner (the engine) mutates a world. All randomness flows
//! through named seed streams and the clock is injected, so stepping the
//! same world twice with the same commands is bit-identical.

mod conditions;
mod ground_items;
mod movement;
mod mutate;
mod obstacle;

pub use conditions::{Condition, ConditionError, ConditionSpec, CONDITION_BURNING};
pub use ground_items::GroundItemFailure;
pub use obstacle::{Obstacle, ObstacleKind};

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::actor::{Actor, Blackboard, Facing, NpcState, PathFollow, PlayerState};
use crate::ai::BehaviorLibrary;
use crate::command::{Command, CommandPayload, ConsoleCmd};
use crate::config::{ConfigError, WorldConfig};
use crate::contract::ContractRegistry;
use crate::coord::TILE_SIZE;
use crate::effect::instance::{EffectInstance, EffectSnapshot};
use crate::effect::intent::{EffectIntent, ProjectileTemplate, MELEE_COOLDOWN_TICKS};
use crate::events::EffectEndReason;
use crate::item::{
    GroundItem, Inventory, ItemCatalog, ItemStack, DEFAULT_INVENTORY_CAPACITY, ITEM_GOLD,
    ITEM_HEALTH_POTION,
};
use crate::journal::Journal;
use crate::nav::{Navmesh, DEFAULT_NAV_CELL};
use crate::prng::Prng;
use crate::snapshot::Keyframe;
use crate::spatial::SpatialIndex;

/// Gold seeded into a fresh player's inventory.
pub const JOIN_GOLD: u32 = 50;
/// Potions seeded into a fresh player's inventory.
pub const JOIN_POTIONS: u32 = 2;
/// Default player spawn position.
pub const DEFAULT_SPAWN: (f64, f64) = (200.0, 200.0);
/// Default player/NPC maximum health.
pub const DEFAULT_MAX_HEALTH: i64 = 100;
/// Pickup reach for console commands, world units.
pub const PICKUP_RANGE: f64 = 60.0;

/// Outcome of a console command, surfaced as a `console_ack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleOutcome {
    /// Player that issued the command.
    pub player_id: String,
    /// The command.
    pub cmd: ConsoleCmd,
    /// `true` on success.
    pub ok: bool,
    /// Quantity moved, when meaningful.
    pub qty: u32,
    /// Failure reason string, empty on success.
    pub reason: String,
    /// Ground-item or inventory stack involved, when any.
    pub stack_id: Option<String>,
}

/// The authoritative world state.
#[derive(Debug)]
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) tick: u64,
    pub(crate) now_ms: u64,
    pub(crate) players: BTreeMap<String, PlayerState>,
    pub(crate) npcs: BTreeMap<String, NpcState>,
    pub(crate) obstacles: Vec<Obstacle>,
    pub(crate) ground_items: BTreeMap<String, GroundItem>,
    pub(crate) tile_index: FxHashMap<(i64, i64), Vec<String>>,
    pub(crate) effects: BTreeMap<String, EffectInstance>,
    pub(crate) conditions: BTreeMap<(String, String), Condition>,
    pub(crate) journal: Journal,
    pub(crate) registry: ContractRegistry,
    pub(crate) catalog: ItemCatalog,
    pub(crate) spatial: SpatialIndex,
    pub(crate) nav: Navmesh,
    pub(crate) behaviors: BehaviorLibrary,
    pub(crate) rat_rng: Prng,
    pub(crate) scatter_rng: Prng,
    pub(crate) blood_rng: Prng,
    pub(crate) intents: Vec<EffectIntent>,
    pub(crate) pending_effect_ends: Vec<(String, EffectEndReason)>,
    pub(crate) effect_triggers: Vec<EffectSnapshot>,
    pub(crate) console_outcomes: Vec<ConsoleOutcome>,
    pub(crate) next_player_id: u64,
    pub(crate) next_npc_id: u64,
    pub(crate) next_effect_id: u64,
    pub(crate) next_ground_item_id: u64,
}

impl World {
    /// Builds a world from a validated config, scattering terrain and NPCs
    /// per the config's feature toggles.
    ///
    /// # Errors
    /// [`ConfigError`] when the config cannot host a world.
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let journal = Journal::new(config.max_keyframes, config.max_keyframe_age_ms);
        let scatter_rng = Prng::stream(&config.seed, "world.scatter");
        let rat_rng = Prng::stream(&config.seed, "rat.wander");
        let blood_rng = Prng::stream(&config.seed, "effects.blood");
        let mut world = Self {
            config,
            tick: 0,
            now_ms: 0,
            players: BTreeMap::new(),
            npcs: BTreeMap::new(),
            obstacles: Vec::new(),
            ground_items: BTreeMap::new(),
            tile_index: FxHashMap::default(),
            effects: BTreeMap::new(),
            conditions: BTreeMap::new(),
            journal,
            registry: ContractRegistry::builtin(),
            catalog: ItemCatalog::builtin(),
            spatial: SpatialIndex::default(),
            nav: Navmesh::build(1.0, 1.0, &[], 0.0, DEFAULT_NAV_CELL),
            behaviors: BehaviorLibrary::builtin(),
            rat_rng,
            scatter_rng,
            blood_rng,
            intents: Vec::new(),
            pending_effect_ends: Vec::new(),
            effect_triggers: Vec::new(),
            console_outcomes: Vec::new(),
            next_player_id: 0,
            next_npc_id: 0,
            next_effect_id: 0,
            next_ground_item_id: 0,
        };
        world.generate_terrain();
        world.rebuild_navmesh();
        world.spawn_initial_npcs();
        Ok(world)
    }

    /// The active config.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Current tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Injected loop time, milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Journal access for the engine and tests.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Mutable journal access for the engine.
    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }

    // ── Lookup ─────────────────────────────────────────────────────────

    /// Actor fields for any player or NPC.
    #[must_use]
    pub fn actor(&self, id: &str) -> Option<&Actor> {
        self.players
            .get(id)
            .map(|p| &p.actor)
            .or_else(|| self.npcs.get(id).map(|n| &n.actor))
    }

    /// True when a player or NPC with `id` exists.
    #[must_use]
    pub fn has_actor(&self, id: &str) -> bool {
        self.players.contains_key(id) || self.npcs.contains_key(id)
    }

    /// A player by id.
    #[must_use]
    pub fn player(&self, id: &str) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// An NPC by id.
    #[must_use]
    pub fn npc(&self, id: &str) -> Option<&NpcState> {
        self.npcs.get(id)
    }

    /// A live effect by id.
    #[must_use]
    pub fn effect(&self, id: &str) -> Option<&EffectInstance> {
        self.effects.get(id)
    }

    /// All players, id order.
    #[must_use]
    pub fn players_snapshot(&self) -> Vec<PlayerState> {
        self.players.values().cloned().collect()
    }

    /// All NPCs, id order.
    #[must_use]
    pub fn npcs_snapshot(&self) -> Vec<NpcState> {
        self.npcs.values().cloned().collect()
    }

    /// Replicated views of all live effects, id order.
    #[must_use]
    pub fn effects_snapshot(&self) -> Vec<EffectSnapshot> {
        self.effects.values().map(EffectInstance::snapshot).collect()
    }

    /// All ground items, id order.
    #[must_use]
    pub fn ground_items_snapshot(&self) -> Vec<GroundItem> {
        self.ground_items.values().cloned().collect()
    }

    /// Static obstacles.
    #[must_use]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Navmesh built from the current obstacle set.
    #[must_use]
    pub fn navmesh(&self) -> &Navmesh {
        &self.nav
    }

    // ── Players ────────────────────────────────────────────────────────

    /// Creates a player with a fresh `player-N` id, seeded inventory, and
    /// the default spawn. Returns the new state.
    pub fn add_player(&mut self) -> PlayerState {
        self.next_player_id += 1;
        let id = format!("player-{}", self.next_player_id);
        self.add_player_at(id, DEFAULT_SPAWN.0, DEFAULT_SPAWN.1)
    }

    /// Creates a player with an explicit id and spawn (tests, resets).
    pub fn add_player_at(&mut self, id: String, x: f64, y: f64) -> PlayerState {
        let mut inventory = Inventory::with_capacity(DEFAULT_INVENTORY_CAPACITY);
        if let Some(gold) = self.catalog.get(ITEM_GOLD) {
            let _ = inventory.insert(ItemStack::of(gold, JOIN_GOLD), gold.stackable);
        }
        if let Some(potion) = self.catalog.get(ITEM_HEALTH_POTION) {
            let _ = inventory.insert(ItemStack::of(potion, JOIN_POTIONS), potion.stackable);
        }
        let (x, y) = self.clamp_to_bounds(x, y);
        let actor = Actor::new(id.clone(), x, y, DEFAULT_MAX_HEALTH, inventory);
        let mut player = PlayerState::new(actor);
        player.last_heartbeat_ms = self.now_ms;
        info!(player = %id, x, y, "player joined");
        self.players.insert(id, player.clone());
        player
    }

    /// Removes a player, recording the `PlayerRemoved` patch last for the
    /// entity. Returns `false` when the id was unknown.
    pub fn remove_player(&mut self, id: &str) -> bool {
        if self.players.remove(id).is_none() {
            return false;
        }
        // Effects owned by the departed player may end, per end policy.
        let owned: Vec<String> = self
            .effects
            .values()
            .filter(|e| {
                e.end.on_owner_lost && e.owner_actor_id.as_deref() == Some(id)
            })
            .map(|e| e.id.clone())
            .collect();
        for effect_id in owned {
            self.end_effect(&effect_id, EffectEndReason::OwnerLost);
        }
        self.journal.record_patch(crate::patch::Patch::PlayerRemoved {
            id: id.to_owned(),
        });
        info!(player = %id, "player left");
        true
    }

    /// Players whose last heartbeat is older than the disconnect window.
    #[must_use]
    pub fn stale_players(&self, now_ms: u64) -> Vec<String> {
        let cutoff = self.config.disconnect_after_ms();
        self.players
            .values()
            .filter(|p| now_ms.saturating_sub(p.last_heartbeat_ms) > cutoff)
            .map(|p| p.actor.id.clone())
            .collect()
    }

    // ── NPCs ───────────────────────────────────────────────────────────

    /// Spawns an NPC of `npc_type` at a position with optional patrol
    /// waypoints. Returns its id.
    pub fn add_npc(
        &mut self,
        npc_type: &str,
        x: f64,
        y: f64,
        waypoints: Vec<(f64, f64)>,
    ) -> String {
        self.next_npc_id += 1;
        let id = format!("npc-{}", self.next_npc_id);
        let (x, y) = self.clamp_to_bounds(x, y);
        let actor = Actor::new(
            id.clone(),
            x,
            y,
            DEFAULT_MAX_HEALTH,
            Inventory::with_capacity(DEFAULT_INVENTORY_CAPACITY),
        );
        let ai_config = self.behaviors.config_for(npc_type).map(str::to_owned);
        let mut npc = NpcState::new(actor, npc_type.to_owned(), ai_config);
        npc.waypoints = waypoints;
        npc.blackboard = Blackboard::at(x, y);
        self.npcs.insert(id.clone(), npc);
        id
    }

    /// Adds a static obstacle and rebuilds the navmesh (tests, tools).
    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
        self.rebuild_navmesh();
    }

    // ── Commands ───────────────────────────────────────────────────────

    /// Applies one drained command. Unknown actors are dropped quietly.
    pub fn apply_command(&mut self, command: &Command) {
        if !self.has_actor(&command.actor_id) {
            debug!(actor = %command.actor_id, "command for unknown actor dropped");
            return;
        }
        match &command.payload {
            CommandPayload::Move { dx, dy, facing } => {
                if self.players.contains_key(&command.actor_id) {
                    self.set_player_intent(&command.actor_id, *dx, *dy);
                    // Manual steering cancels path-following.
                    if *dx != 0.0 || *dy != 0.0 {
                        if let Some(player) = self.players.get_mut(&command.actor_id) {
                            player.path = None;
                        }
                    }
                } else if let Some(npc) = self.npcs.get_mut(&command.actor_id) {
                    npc.intent = (*dx, *dy);
                    if *dx != 0.0 || *dy != 0.0 {
                        npc.path = None;
                    }
                }
                let facing = facing.or_else(|| Facing::from_vec(*dx, *dy));
                if let Some(facing) = facing {
                    self.set_actor_facing(&command.actor_id, facing);
                }
            }
            CommandPayload::Stop => {
                if self.players.contains_key(&command.actor_id) {
                    self.set_player_intent(&command.actor_id, 0.0, 0.0);
                    if let Some(player) = self.players.get_mut(&command.actor_id) {
                        player.path = None;
                    }
                } else if let Some(npc) = self.npcs.get_mut(&command.actor_id) {
                    npc.intent = (0.0, 0.0);
                    npc.path = None;
                }
            }
            CommandPayload::Action { name } => {
                self.apply_action(&command.actor_id, name);
            }
            CommandPayload::SetPath { x, y } => {
                self.start_path(&command.actor_id, *x, *y);
            }
            CommandPayload::ClearPath => {
                if let Some(player) = self.players.get_mut(&command.actor_id) {
                    player.path = None;
                }
                self.set_player_intent(&command.actor_id, 0.0, 0.0);
            }
            CommandPayload::Heartbeat { .. } => {
                let now_ms = self.now_ms;
                if let Some(player) = self.players.get_mut(&command.actor_id) {
                    player.last_heartbeat_ms = now_ms;
                }
            }
            CommandPayload::Console { cmd, qty } => {
                self.apply_console(&command.actor_id, *cmd, *qty);
            }
        }
    }

    fn apply_action(&mut self, actor_id: &str, name: &str) {
        let tick = self.tick;
        // NPC ability cooldowns live in the blackboard and are enforced by
        // the executor before it emits the command.
        let ready = self
            .players
            .get(actor_id)
            .and_then(|p| p.cooldowns.get(name).copied())
            .unwrap_or(0);
        if tick < ready {
            debug!(actor = %actor_id, action = %name, "action on cooldown");
            return;
        }
        let Some(actor) = self.actor(actor_id).cloned() else {
            return;
        };
        let cooldown = match name {
            "attack" => {
                self.queue_intent(EffectIntent::melee(&actor));
                MELEE_COOLDOWN_TICKS
            }
            "fireball" => {
                let template = ProjectileTemplate::fireball();
                let cooldown = template.cooldown_ticks;
                self.queue_intent(EffectIntent::projectile(
                    &actor,
                    &template,
                    self.config.tick_rate,
                ));
                cooldown
            }
            other => {
                debug!(actor = %actor_id, action = %other, "unknown action dropped");
                return;
            }
        };
        if let Some(player) = self.players.get_mut(actor_id) {
            player
                .cooldowns
                .insert(name.to_owned(), tick + u64::from(cooldown));
        }
    }

    fn apply_console(&mut self, player_id: &str, cmd: ConsoleCmd, qty: u32) {
        let outcome = match cmd {
            ConsoleCmd::DropGold => self.drop_gold(player_id, qty),
            ConsoleCmd::PickupGold => self.pickup_gold(player_id),
        };
        self.console_outcomes.push(outcome);
    }

    /// Drains console outcomes staged this tick.
    pub fn drain_console_outcomes(&mut self) -> Vec<ConsoleOutcome> {
        std::mem::take(&mut self.console_outcomes)
    }

    /// Drains one-shot effect triggers staged this tick.
    pub fn drain_effect_triggers(&mut self) -> Vec<EffectSnapshot> {
        std::mem::take(&mut self.effect_triggers)
    }

    // ── Paths ──────────────────────────────────────────────────────────

    fn start_path(&mut self, actor_id: &str, x: f64, y: f64) {
        let Some(actor) = self.actor(actor_id) else {
            return;
        };
        let from = (actor.x, actor.y);
        let Some(waypoints) = self.nav.find_path(from, (x, y)) else {
            debug!(actor = %actor_id, x, y, "path request unroutable");
            return;
        };
        let follow = PathFollow {
            target: (x, y),
            waypoints,
            next_index: 0,
            arrive_radius: 12.0,
            replan_at: self.tick + 15,
        };
        if let Some(player) = self.players.get_mut(actor_id) {
            player.path = Some(follow);
        } else if let Some(npc) = self.npcs.get_mut(actor_id) {
            npc.path = Some(follow);
        }
    }

    // ── Tick ───────────────────────────────────────────────────────────

    /// Advances one tick: AI, movement, effects, conditions, ground items.
    ///
    /// `now_ms` is the injected loop clock; `commands` were drained by the
    /// engine and are applied in their stable order first.
    pub fn advance(&mut self, now_ms: u64, commands: &[Command]) {
        self.tick += 1;
        self.now_ms = now_ms;
        self.journal.advance_tick(self.tick);

        for command in commands {
            self.apply_command(command);
        }

        self.prune_expired_effects();

        let ai_commands = crate::ai::run_executor(self);
        for command in &ai_commands {
            self.apply_command(command);
        }

        let dt = self.config.tick_duration();
        self.step_movement(dt);
        self.check_lava();

        self.spawn_pending_intents();
        self.advance_effect_motion();
        self.resolve_effect_impacts();
        self.evaluate_effect_ends();

        self.advance_conditions();
        self.sync_ground_item_tiles();
    }

    fn check_lava(&mut self) {
        let dps = self.config.lava_damage_per_second;
        let lava: Vec<Obstacle> = self
            .obstacles
            .iter()
            .filter(|o| o.kind == ObstacleKind::Lava)
            .copied()
            .collect();
        if lava.is_empty() {
            return;
        }
        let ids: Vec<String> = self
            .players
            .keys()
            .chain(self.npcs.keys())
            .cloned()
            .collect();
        for id in ids {
            let Some(actor) = self.actor(&id) else {
                continue;
            };
            let (x, y) = (actor.x, actor.y);
            if lava.iter().any(|o| o.contains_with_margin(x, y, 0.0)) {
                let spec = ConditionSpec::burning(Some("lava".to_owned()), 3.0, dps);
                let _ = self.apply_condition(&id, &spec);
            }
        }
    }

    // ── Keyframes / reset ──────────────────────────────────────────────

    /// Builds the full keyframe image of the current state. The journal
    /// assigns the sequence when the frame is recorded.
    #[must_use]
    pub fn build_keyframe(&self) -> Keyframe {
        Keyframe {
            sequence: 0,
            tick: self.tick,
            players: self.players_snapshot(),
            npcs: self.npcs_snapshot(),
            obstacles: self.obstacles.clone(),
            ground_items: self.ground_items_snapshot(),
            config: self.config.clone(),
            recorded_at_ms: 0,
        }
    }

    /// Resets the world onto a new config: existing players survive with
    /// re-seeded positions; effects, conditions, ground items, and NPCs are
    /// cleared and terrain regenerates.
    pub fn reset(&mut self, config: WorldConfig) {
        let effect_ids: Vec<String> = self.effects.keys().cloned().collect();
        for id in effect_ids {
            self.end_effect(&id, EffectEndReason::MapChange);
        }
        self.conditions.clear();
        self.ground_items.clear();
        self.tile_index.clear();
        self.npcs.clear();
        self.intents.clear();
        self.pending_effect_ends.clear();
        self.effect_triggers.clear();

        self.config = config;
        self.scatter_rng = Prng::stream(&self.config.seed, "world.scatter");
        self.rat_rng = Prng::stream(&self.config.seed, "rat.wander");
        self.blood_rng = Prng::stream(&self.config.seed, "effects.blood");
        self.obstacles.clear();
        self.generate_terrain();
        self.rebuild_navmesh();
        self.spawn_initial_npcs();

        // Re-seed surviving players onto fresh ground.
        let ids: Vec<String> = self.players.keys().cloned().collect();
        for id in ids {
            let x = self.scatter_rng.next_f64() * (self.config.width - 200.0) + 100.0;
            let y = self.scatter_rng.next_f64() * (self.config.height - 200.0) + 100.0;
            let (x, y) = match self.nav.nearest_walkable((x, y), 16) {
                Some(open) => open,
                None => DEFAULT_SPAWN,
            };
            self.set_actor_pos(&id, x, y);
            if let Some(player) = self.players.get_mut(&id) {
                player.path = None;
                player.intent_x = 0.0;
                player.intent_y = 0.0;
            }
        }
        info!(seed = %self.config.seed, "world reset");
    }

    // ── Generation ─────────────────────────────────────────────────────

    fn clamp_to_bounds(&self, x: f64, y: f64) -> (f64, f64) {
        let half = self.config.player_half_extent;
        (
            x.clamp(half, self.config.width - half),
            y.clamp(half, self.config.height - half),
        )
    }

    fn scatter_position(&mut self, extent: f64) -> (f64, f64) {
        let x = self.scatter_rng.next_f64() * (self.config.width - 2.0 * extent) + extent;
        let y = self.scatter_rng.next_f64() * (self.config.height - 2.0 * extent) + extent;
        (x, y)
    }

    fn generate_terrain(&mut self) {
        if self.config.obstacles {
            for _ in 0..self.config.obstacles_count {
                let w = self.scatter_rng.next_int(40, 100) as f64;
                let h = self.scatter_rng.next_int(40, 100) as f64;
                let (x, y) = self.scatter_position(120.0);
                self.obstacles.push(Obstacle::rock(x, y, w, h));
            }
        }
        if self.config.gold_mines {
            for _ in 0..self.config.gold_mine_count {
                let (x, y) = self.scatter_position(120.0);
                self.obstacles.push(Obstacle {
                    x,
                    y,
                    width: TILE_SIZE,
                    height: TILE_SIZE,
                    kind: ObstacleKind::GoldMine,
                });
            }
        }
        if self.config.lava {
            for _ in 0..self.config.lava_count {
                let (x, y) = self.scatter_position(160.0);
                self.obstacles.push(Obstacle {
                    x,
                    y,
                    width: 80.0,
                    height: 80.0,
                    kind: ObstacleKind::Lava,
                });
            }
        }
    }

    pub(crate) fn rebuild_navmesh(&mut self) {
        self.nav = Navmesh::build(
            self.config.width,
            self.config.height,
            &self.obstacles,
            self.config.player_half_extent,
            DEFAULT_NAV_CELL,
        );
    }

    fn spawn_initial_npcs(&mut self) {
        if !self.config.npcs {
            return;
        }
        for _ in 0..self.config.goblin_count {
            let (x, y) = self.scatter_position(160.0);
            let (x, y) = self.nav.nearest_walkable((x, y), 16).unwrap_or((x, y));
            let waypoints = vec![(x, y), (x + 120.0, y)];
            self.add_npc("goblin", x, y, waypoints);
        }
        for _ in 0..self.config.rat_count {
            let (x, y) = self.scatter_position(120.0);
            let (x, y) = self.nav.nearest_walkable((x, y), 16).unwrap_or((x, y));
            self.add_npc("rat", x, y, Vec::new());
        }
    }

    // ── Id allocation ──────────────────────────────────────────────────

    pub(crate) fn alloc_effect_id(&mut self) -> (String, u64) {
        self.next_effect_id += 1;
        (format!("effect-{}", self.next_effect_id), self.next_effect_id)
    }

    pub(crate) fn alloc_ground_item_id(&mut self) -> String {
        self.next_ground_item_id += 1;
        format!("gi-{}", self.next_ground_item_id)
    }
}
