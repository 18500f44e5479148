//! Per-session state owned by the host

use crate::{
    ActorId, ClockConfig, GameClock, GameRng, Rejection, Result, Rule, RuleSet, Scheduler,
    Snapshot, TimerCheckpoint, TimerRule, TurnFacts, VariableStore,
};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Everything one game owns
///
/// The engine holds no state of its own; every call borrows a session.
/// Sessions share nothing, so separate games can run in parallel.
#[derive(Debug, Clone)]
pub struct Session {
    pub variables: VariableStore,
    pub clock: GameClock,
    pub rng: GameRng,
    pub rules: RuleSet,
    pub timers: Scheduler,
    /// Actors that currently exist; owners outside it are orphans
    pub roster: IndexSet<ActorId>,
    pub locations: IndexMap<ActorId, String>,
}

impl Session {
    pub fn new(config: &ClockConfig) -> Result<Self> {
        Self::with_seed(config, GameRng::default().state())
    }

    pub fn with_seed(config: &ClockConfig, seed: u64) -> Result<Self> {
        Ok(Self {
            variables: VariableStore::new(),
            clock: GameClock::new(config)?,
            rng: GameRng::new(seed),
            rules: RuleSet::new(),
            timers: Scheduler::new(),
            roster: IndexSet::new(),
            locations: IndexMap::new(),
        })
    }

    pub fn add_actor(&mut self, actor: impl Into<ActorId>) -> bool {
        self.roster.insert(actor.into())
    }

    /// Take an actor off the roster
    ///
    /// Their variables are kept; rules and timers that still reference them
    /// are flagged as orphans until they are edited or the actor returns.
    pub fn remove_actor(&mut self, actor: &ActorId) -> bool {
        self.locations.shift_remove(actor);
        self.roster.shift_remove(actor)
    }

    pub fn has_actor(&self, actor: &ActorId) -> bool {
        self.roster.contains(actor)
    }

    pub fn actor_location(&self, actor: &ActorId) -> Option<&str> {
        self.locations.get(actor).map(String::as_str)
    }

    /// Hot reload: replace the whole rule population
    pub fn replace_rules(&mut self, rules: impl IntoIterator<Item = Rule>) -> Vec<Rejection> {
        let (rules, rejections) = RuleSet::load(rules);
        tracing::info!(accepted = rules.len(), rejected = rejections.len(), "rules loaded");
        self.rules = rules;
        rejections
    }

    /// Hot reload: replace the whole timer population
    pub fn replace_timers(&mut self, timers: impl IntoIterator<Item = TimerRule>) -> Vec<Rejection> {
        let rejections = self.timers.replace(timers, &self.clock, &mut self.rng);
        tracing::info!(
            accepted = self.timers.len(),
            rejected = rejections.len(),
            "timers loaded"
        );
        rejections
    }

    pub fn snapshot(&self, facts: &TurnFacts) -> Snapshot {
        Snapshot::capture(facts, &self.variables, &self.clock)
    }

    /// Save the mutable parts of the session
    ///
    /// Rule and timer definitions are not included; they come from their
    /// sources on reload.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            variables: self.variables.clone(),
            clock: self.clock.clone(),
            rng: self.rng.clone(),
            timers: self.timers.checkpoint(),
            roster: self.roster.clone(),
            locations: self.locations.clone(),
        }
    }

    /// Load a checkpoint over this session
    ///
    /// Call after the rule and timer populations are loaded so that saved
    /// fire times land on their timers.
    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        self.variables = checkpoint.variables.clone();
        self.clock = checkpoint.clock.clone();
        self.rng = checkpoint.rng.clone();
        self.timers.restore(&checkpoint.timers);
        self.roster = checkpoint.roster.clone();
        self.locations = checkpoint.locations.clone();
    }
}

/// Serializable session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub variables: VariableStore,
    pub clock: GameClock,
    pub rng: GameRng,
    pub timers: TimerCheckpoint,
    #[serde(default)]
    pub roster: IndexSet<ActorId>,
    #[serde(default)]
    pub locations: IndexMap<ActorId, String>,
}
