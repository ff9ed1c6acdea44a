// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The AI library: JSON behavior configs compiled into ID-indexed state
//! tables with per-kind parameter pools.
//!
//! Compilation resolves every state name, action kind, and condition kind
//! once at load; the per-tick executor only walks integer indices. Unknown
//! kinds and dangling state references are compile errors, not runtime
//! surprises.

mod executor;

pub use executor::run_executor;

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// What a movement-ish action or arrival test aims at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    /// The current patrol waypoint.
    Waypoint,
    /// The pinned perception target.
    TargetActor,
    /// The NPC's home anchor.
    Home,
    /// The blackboard's wander destination.
    WanderTarget,
}

/// Cooldown sources for `cooldownReady`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownSlot {
    /// The state enter-timer (`wait_until`).
    Wait,
    /// One of the ability slots.
    Ability(usize),
}

/// Parameters for `moveToward` / `moveAway` / `face`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveParams {
    /// Steering target.
    pub target: MoveTarget,
}

/// Parameters for `useAbility`.
#[derive(Debug, Clone, PartialEq)]
pub struct UseAbilityParams {
    /// Blackboard ability slot.
    pub slot: usize,
    /// Action name handed to the command stream.
    pub ability: String,
    /// Cooldown applied after use, in ticks.
    pub cooldown_ticks: u32,
}

/// Parameters for `setTimer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetTimerParams {
    /// Ticks added to `wait_until`.
    pub ticks: u32,
}

/// Parameters for `setWaypoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetWaypointParams {
    /// Signed waypoint-index step (usually 1).
    pub advance: i64,
}

/// Parameters for `randomDestination`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomDestinationParams {
    /// Wander radius around home, world units.
    pub radius: f64,
}

/// Parameters for `reachedWaypoint`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReachedWaypointParams {
    /// Which anchor counts as "the waypoint".
    pub target: MoveTarget,
    /// Arrival radius, world units.
    pub arrive_radius: f64,
}

/// Parameters for `playerWithin` / `nonRatWithin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityParams {
    /// Detection radius, world units.
    pub radius: f64,
}

/// Parameters for `lostSight`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LostSightParams {
    /// Radius beyond which the target is out of sight.
    pub radius: f64,
    /// Ticks of persistence after sight is lost.
    pub grace_ticks: u32,
}

/// Parameters for `stuck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckParams {
    /// Consecutive stuck passes required.
    pub threshold: u32,
}

/// Parameters for `cooldownReady`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownReadyParams {
    /// Which cooldown to test.
    pub slot: CooldownSlot,
}

/// Action kinds the executor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Steer toward a target.
    MoveToward,
    /// Steer directly away from a target.
    MoveAway,
    /// Fire an ability command.
    UseAbility,
    /// Face a target without moving.
    Face,
    /// Arm the wait timer (entry tick only).
    SetTimer,
    /// Step the waypoint index (entry tick only).
    SetWaypoint,
    /// Pick a fresh wander destination (entry tick only).
    RandomDestination,
}

/// Condition kinds the executor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    /// Arrived at (or hopelessly stalled against) the waypoint.
    ReachedWaypoint,
    /// A player is within radius.
    PlayerWithin,
    /// The pinned target is gone or out of range past the grace window.
    LostSight,
    /// A cooldown elapsed.
    CooldownReady,
    /// Stuck against geometry.
    Stuck,
    /// Any non-rat actor is within radius.
    NonRatWithin,
}

/// An action reference into the parameter pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRef {
    /// Action kind.
    pub kind: ActionKind,
    /// Index into the kind's pool.
    pub param_idx: usize,
}

/// A transition reference into the parameter pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRef {
    /// Condition kind.
    pub kind: ConditionKind,
    /// Index into the kind's pool.
    pub param_idx: usize,
    /// Destination state index.
    pub to_state: usize,
}

/// One compiled FSM state.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledState {
    /// Human-readable state name (diagnostics, tests).
    pub name: String,
    /// Ticks the NPC holds after entering, 0 for none.
    pub enter_timer: u32,
    /// Decision cadence in ticks.
    pub cadence: u32,
    /// Actions executed on each decision.
    pub actions: Vec<ActionRef>,
    /// Transitions evaluated in order; first true wins.
    pub transitions: Vec<TransitionRef>,
}

/// Parameter pools, one per action/condition kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamPools {
    /// `moveToward`/`moveAway`/`face` parameters.
    pub moves: Vec<MoveParams>,
    /// `useAbility` parameters.
    pub abilities: Vec<UseAbilityParams>,
    /// `setTimer` parameters.
    pub timers: Vec<SetTimerParams>,
    /// `setWaypoint` parameters.
    pub waypoints: Vec<SetWaypointParams>,
    /// `randomDestination` parameters.
    pub destinations: Vec<RandomDestinationParams>,
    /// `reachedWaypoint` parameters.
    pub arrivals: Vec<ReachedWaypointParams>,
    /// `playerWithin`/`nonRatWithin` parameters.
    pub proximities: Vec<ProximityParams>,
    /// `lostSight` parameters.
    pub sights: Vec<LostSightParams>,
    /// `cooldownReady` parameters.
    pub cooldowns: Vec<CooldownReadyParams>,
    /// `stuck` parameters.
    pub stucks: Vec<StuckParams>,
}

/// A fully compiled behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBehavior {
    /// Behavior id.
    pub id: String,
    /// NPC type this behavior drives by default.
    pub npc_type: String,
    /// States, index-addressed.
    pub states: Vec<CompiledState>,
    /// Parameter pools.
    pub pools: ParamPools,
}

/// Compile-time failures for behavior configs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AiCompileError {
    /// The JSON did not parse.
    #[error("behavior config is not valid JSON: {0}")]
    Json(String),
    /// A config without states cannot run.
    #[error("behavior {0} has no states")]
    NoStates(String),
    /// A transition referenced a state that does not exist.
    #[error("behavior {behavior}: unknown state {state}")]
    UnknownState {
        /// Behavior id.
        behavior: String,
        /// The dangling state name.
        state: String,
    },
    /// Unknown action kind.
    #[error("behavior {behavior}: unknown action kind {kind}")]
    UnknownAction {
        /// Behavior id.
        behavior: String,
        /// The unknown kind string.
        kind: String,
    },
    /// Unknown condition kind.
    #[error("behavior {behavior}: unknown condition kind {kind}")]
    UnknownCondition {
        /// Behavior id.
        behavior: String,
        /// The unknown kind string.
        kind: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBehavior {
    id: String,
    #[serde(default)]
    npc_type: String,
    states: Vec<RawState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawState {
    name: String,
    #[serde(default)]
    enter_timer: u32,
    #[serde(default = "default_cadence")]
    cadence: u32,
    #[serde(default)]
    actions: Vec<RawAction>,
    #[serde(default)]
    transitions: Vec<RawTransition>,
}

fn default_cadence() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    kind: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    slot: Option<usize>,
    #[serde(default)]
    ability: Option<String>,
    #[serde(default)]
    cooldown_ticks: Option<u32>,
    #[serde(default)]
    advance: Option<i64>,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(default)]
    ticks: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransition {
    condition: String,
    to: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(default)]
    arrive_radius: Option<f64>,
    #[serde(default)]
    grace_ticks: Option<u32>,
    #[serde(default)]
    slot: Option<String>,
    #[serde(default)]
    threshold: Option<u32>,
}

fn parse_target(raw: Option<&str>) -> MoveTarget {
    match raw {
        Some("target") => MoveTarget::TargetActor,
        Some("home") => MoveTarget::Home,
        Some("wander") => MoveTarget::WanderTarget,
        _ => MoveTarget::Waypoint,
    }
}

/// Compiles a JSON behavior config.
///
/// # Errors
/// [`AiCompileError`] on malformed JSON, empty state lists, unknown kinds,
/// or dangling state references.
pub fn compile(json: &str) -> Result<CompiledBehavior, AiCompileError> {
    let raw: RawBehavior =
        serde_json::from_str(json).map_err(|e| AiCompileError::Json(e.to_string()))?;
    if raw.states.is_empty() {
        return Err(AiCompileError::NoStates(raw.id));
    }
    let index_of: BTreeMap<&str, usize> = raw
        .states
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut pools = ParamPools::default();
    let mut states = Vec::with_capacity(raw.states.len());
    for state in &raw.states {
        let mut actions = Vec::with_capacity(state.actions.len());
        for action in &state.actions {
            let compiled = match action.kind.as_str() {
                "moveToward" | "moveAway" | "face" => {
                    pools.moves.push(MoveParams {
                        target: parse_target(action.target.as_deref()),
                    });
                    let kind = match action.kind.as_str() {
                        "moveToward" => ActionKind::MoveToward,
                        "moveAway" => ActionKind::MoveAway,
                        _ => ActionKind::Face,
                    };
                    ActionRef {
                        kind,
                        param_idx: pools.moves.len() - 1,
                    }
                }
                "useAbility" => {
                    pools.abilities.push(UseAbilityParams {
                        slot: action.slot.unwrap_or(0).min(crate::actor::ABILITY_SLOTS - 1),
                        ability: action.ability.clone().unwrap_or_else(|| "attack".to_owned()),
                        cooldown_ticks: action.cooldown_ticks.unwrap_or(15),
                    });
                    ActionRef {
                        kind: ActionKind::UseAbility,
                        param_idx: pools.abilities.len() - 1,
                    }
                }
                "setTimer" => {
                    pools.timers.push(SetTimerParams {
                        ticks: action.ticks.unwrap_or(15),
                    });
                    ActionRef {
                        kind: ActionKind::SetTimer,
                        param_idx: pools.timers.len() - 1,
                    }
                }
                "setWaypoint" => {
                    pools.waypoints.push(SetWaypointParams {
                        advance: action.advance.unwrap_or(1),
                    });
                    ActionRef {
                        kind: ActionKind::SetWaypoint,
                        param_idx: pools.waypoints.len() - 1,
                    }
                }
                "randomDestination" => {
                    pools.destinations.push(RandomDestinationParams {
                        radius: action.radius.unwrap_or(200.0),
                    });
                    ActionRef {
                        kind: ActionKind::RandomDestination,
                        param_idx: pools.destinations.len() - 1,
                    }
                }
                other => {
                    return Err(AiCompileError::UnknownAction {
                        behavior: raw.id.clone(),
                        kind: other.to_owned(),
                    })
                }
            };
            actions.push(compiled);
        }

        let mut transitions = Vec::with_capacity(state.transitions.len());
        for transition in &state.transitions {
            let Some(&to_state) = index_of.get(transition.to.as_str()) else {
                return Err(AiCompileError::UnknownState {
                    behavior: raw.id.clone(),
                    state: transition.to.clone(),
                });
            };
            let compiled = match transition.condition.as_str() {
                "reachedWaypoint" => {
                    pools.arrivals.push(ReachedWaypointParams {
                        target: parse_target(transition.target.as_deref()),
                        arrive_radius: transition.arrive_radius.unwrap_or(12.0),
                    });
                    TransitionRef {
                        kind: ConditionKind::ReachedWaypoint,
                        param_idx: pools.arrivals.len() - 1,
                        to_state,
                    }
                }
                "playerWithin" | "nonRatWithin" => {
                    pools.proximities.push(ProximityParams {
                        radius: transition.radius.unwrap_or(140.0),
                    });
                    let kind = if transition.condition == "playerWithin" {
                        ConditionKind::PlayerWithin
                    } else {
                        ConditionKind::NonRatWithin
                    };
                    TransitionRef {
                        kind,
                        param_idx: pools.proximities.len() - 1,
                        to_state,
                    }
                }
                "lostSight" => {
                    pools.sights.push(LostSightParams {
                        radius: transition.radius.unwrap_or(220.0),
                        grace_ticks: transition.grace_ticks.unwrap_or(0),
                    });
                    TransitionRef {
                        kind: ConditionKind::LostSight,
                        param_idx: pools.sights.len() - 1,
                        to_state,
                    }
                }
                "cooldownReady" => {
                    let slot = match transition.slot.as_deref() {
                        Some("wait") | None => CooldownSlot::Wait,
                        Some(s) => CooldownSlot::Ability(
                            s.parse::<usize>()
                                .unwrap_or(0)
                                .min(crate::actor::ABILITY_SLOTS - 1),
                        ),
                    };
                    pools.cooldowns.push(CooldownReadyParams { slot });
                    TransitionRef {
                        kind: ConditionKind::CooldownReady,
                        param_idx: pools.cooldowns.len() - 1,
                        to_state,
                    }
                }
                "stuck" => {
                    pools.stucks.push(StuckParams {
                        threshold: transition.threshold.unwrap_or(45),
                    });
                    TransitionRef {
                        kind: ConditionKind::Stuck,
                        param_idx: pools.stucks.len() - 1,
                        to_state,
                    }
                }
                other => {
                    return Err(AiCompileError::UnknownCondition {
                        behavior: raw.id.clone(),
                        kind: other.to_owned(),
                    })
                }
            };
            transitions.push(compiled);
        }

        states.push(CompiledState {
            name: state.name.clone(),
            enter_timer: state.enter_timer,
            cadence: state.cadence.max(1),
            actions,
            transitions,
        });
    }

    Ok(CompiledBehavior {
        id: raw.id,
        npc_type: raw.npc_type,
        states,
        pools,
    })
}

/// The goblin patrol behavior shipped with the server.
pub const GOBLIN_PATROL_JSON: &str = r#"{
  "id": "goblin-patrol",
  "npcType": "goblin",
  "states": [
    {
      "name": "Patrol",
      "cadence": 2,
      "actions": [ { "kind": "moveToward", "target": "waypoint" } ],
      "transitions": [
        { "condition": "reachedWaypoint", "arriveRadius": 12.0, "to": "Wait" },
        { "condition": "playerWithin", "radius": 140.0, "to": "Chase" }
      ]
    },
    {
      "name": "Wait",
      "enterTimer": 30,
      "cadence": 5,
      "actions": [
        { "kind": "setWaypoint", "advance": 1 },
        { "kind": "face", "target": "waypoint" }
      ],
      "transitions": [
        { "condition": "playerWithin", "radius": 140.0, "to": "Chase" },
        { "condition": "cooldownReady", "slot": "wait", "to": "Patrol" }
      ]
    },
    {
      "name": "Chase",
      "cadence": 2,
      "actions": [ { "kind": "moveToward", "target": "target" } ],
      "transitions": [
        { "condition": "playerWithin", "radius": 30.0, "to": "Attack" },
        { "condition": "lostSight", "radius": 220.0, "graceTicks": 45, "to": "Return" }
      ]
    },
    {
      "name": "Attack",
      "cadence": 4,
      "actions": [
        { "kind": "face", "target": "target" },
        { "kind": "useAbility", "slot": 0, "ability": "attack", "cooldownTicks": 20 }
      ],
      "transitions": [
        { "condition": "lostSight", "radius": 45.0, "graceTicks": 0, "to": "Chase" }
      ]
    },
    {
      "name": "Return",
      "cadence": 3,
      "actions": [ { "kind": "moveToward", "target": "home" } ],
      "transitions": [
        { "condition": "playerWithin", "radius": 140.0, "to": "Chase" },
        { "condition": "reachedWaypoint", "target": "home", "arriveRadius": 16.0, "to": "Patrol" }
      ]
    }
  ]
}"#;

/// Compiled behaviors, addressable by id and default-bound by NPC type.
#[derive(Debug, Clone, Default)]
pub struct BehaviorLibrary {
    behaviors: BTreeMap<String, CompiledBehavior>,
    by_npc_type: BTreeMap<String, String>,
}

impl BehaviorLibrary {
    /// Empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Library seeded with the built-in behaviors.
    #[must_use]
    pub fn builtin() -> Self {
        let mut library = Self::new();
        if let Ok(behavior) = compile(GOBLIN_PATROL_JSON) {
            library.insert(behavior);
        }
        library
    }

    /// Adds a compiled behavior, binding it to its NPC type.
    pub fn insert(&mut self, behavior: CompiledBehavior) {
        if !behavior.npc_type.is_empty() {
            self.by_npc_type
                .insert(behavior.npc_type.clone(), behavior.id.clone());
        }
        self.behaviors.insert(behavior.id.clone(), behavior);
    }

    /// The behavior bound to an NPC type, when any.
    #[must_use]
    pub fn config_for(&self, npc_type: &str) -> Option<&str> {
        self.by_npc_type.get(npc_type).map(String::as_str)
    }

    /// A behavior by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CompiledBehavior> {
        self.behaviors.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_goblin_patrol_compiles() {
        let behavior = compile(GOBLIN_PATROL_JSON).expect("builtin compiles");
        assert_eq!(behavior.id, "goblin-patrol");
        assert_eq!(behavior.states.len(), 5);
        assert_eq!(behavior.states[1].name, "Wait");
        assert_eq!(behavior.states[1].enter_timer, 30);
        // Wait's first action advances the waypoint on entry.
        assert_eq!(behavior.states[1].actions[0].kind, ActionKind::SetWaypoint);
    }

    #[test]
    fn dangling_transition_is_a_compile_error() {
        let json = r#"{"id":"broken","states":[
            {"name":"A","transitions":[{"condition":"stuck","to":"Nowhere"}]}
        ]}"#;
        let err = compile(json).unwrap_err();
        assert_eq!(
            err,
            AiCompileError::UnknownState {
                behavior: "broken".to_owned(),
                state: "Nowhere".to_owned()
            }
        );
    }

    #[test]
    fn unknown_kinds_are_compile_errors() {
        let json = r#"{"id":"broken","states":[
            {"name":"A","actions":[{"kind":"teleport"}]}
        ]}"#;
        assert!(matches!(
            compile(json),
            Err(AiCompileError::UnknownAction { .. })
        ));
        let json = r#"{"id":"broken","states":[
            {"name":"A","transitions":[{"condition":"psychic","to":"A"}]}
        ]}"#;
        assert!(matches!(
            compile(json),
            Err(AiCompileError::UnknownCondition { .. })
        ));
    }

    #[test]
    fn empty_state_list_is_rejected() {
        let json = r#"{"id":"empty","states":[]}"#;
        assert_eq!(compile(json), Err(AiCompileError::NoStates("empty".to_owned())));
    }

    #[test]
    fn library_binds_npc_types() {
        let library = BehaviorLibrary::builtin();
        assert_eq!(library.config_for("goblin"), Some("goblin-patrol"));
        assert_eq!(library.config_for("rat"), None);
        assert!(library.get("goblin-patrol").is_some());
    }
}
