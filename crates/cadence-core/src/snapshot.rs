//! Immutable state captured once per evaluation pass

use crate::clock::FictionReading;
use crate::{GameClock, TurnFacts, Value, VarRef, VariableStore};

/// Frozen read of everything conditions may look at
///
/// Taken at the start of a phase pass or scheduler tick. Actions mutate the
/// live session, never the snapshot, so conditions evaluated later in the
/// same pass still see phase-start state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub facts: TurnFacts,
    pub variables: VariableStore,
    pub fiction: FictionReading,
    pub real_seconds: f64,
}

impl Snapshot {
    pub fn capture(facts: &TurnFacts, variables: &VariableStore, clock: &GameClock) -> Self {
        Self {
            facts: facts.clone(),
            variables: variables.clone(),
            fiction: clock.fiction_reading(),
            real_seconds: clock.real_elapsed().as_secs_f64(),
        }
    }

    /// Look up a variable, resolving "current owner" references
    pub fn read(&self, var: &VarRef) -> Option<&Value> {
        var.read(&self.variables, &self.facts)
    }
}
