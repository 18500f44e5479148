//! Engine entry points: turn phases and scheduler ticks
//!
//! Both paths take one snapshot up front, evaluate conditions against it,
//! and run the actions of every qualifying rule or timer in declaration
//! order against the live session. The finished batch is returned and, when
//! a sink is given, handed to it once at the end.

use crate::{
    Action, ActionOutcome, ActorId, DefId, EffectBatch, EffectSink, ExecContext, Flag, Phase,
    RuleOutcome, Session, SkipReason, TurnFacts,
};
use indexmap::IndexSet;
use std::time::Duration;

/// Stateless evaluator; one instance can serve any number of sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every rule eligible for `phase`
    ///
    /// Conditions see the session as it was when the pass started; rules
    /// fired earlier in the same pass do not affect later rules' conditions.
    /// A rule that would touch an actor missing from the roster is skipped
    /// whole.
    pub fn run_phase(
        &self,
        session: &mut Session,
        phase: Phase,
        facts: &TurnFacts,
        sink: Option<&mut dyn EffectSink>,
    ) -> EffectBatch {
        let snap = session.snapshot(facts);
        let Session {
            variables,
            rng,
            rules,
            roster,
            locations,
            ..
        } = session;

        let mut batch = EffectBatch::new();
        for rule in rules.iter() {
            if let Some(reason) = rule.skip_reason(phase) {
                batch.outcomes.push((rule.id.clone(), RuleOutcome::Skipped(reason)));
                continue;
            }
            if !rule.conditions.evaluate(&snap) {
                batch
                    .outcomes
                    .push((rule.id.clone(), RuleOutcome::Skipped(SkipReason::ConditionsFailed)));
                continue;
            }
            if let Some(detail) = find_orphan(&rule.actions, roster, facts) {
                skip_orphaned(&mut batch, &rule.id, detail);
                continue;
            }

            tracing::debug!(rule = %rule.id, %phase, "rule fired");
            let mut ctx = ExecContext {
                variables: &mut *variables,
                locations: &mut *locations,
                roster: &*roster,
                rng: &mut *rng,
                facts,
                source: &rule.id,
            };
            execute(&rule.actions, &mut ctx, &mut batch);
            batch.outcomes.push((rule.id.clone(), RuleOutcome::Fired));
        }

        hand_over(batch, sink)
    }

    /// Advance the clock by `wall` and fire due timers
    ///
    /// Every due timer is probed before any fires, so timer actions in this
    /// tick never change which timers qualify. All due timers re-arm,
    /// including those whose conditions failed or whose owner is gone.
    pub fn tick(
        &self,
        session: &mut Session,
        wall: Duration,
        facts: &TurnFacts,
        sink: Option<&mut dyn EffectSink>,
    ) -> EffectBatch {
        session.clock.advance(wall);
        let due = session.timers.mark_due(&session.clock);
        if due.is_empty() {
            return hand_over(EffectBatch::new(), sink);
        }

        let mut batch = EffectBatch::new();
        let mut snap = session.snapshot(facts);
        let Session {
            variables,
            clock,
            rng,
            timers,
            roster,
            locations,
            ..
        } = session;

        let mut passing = Vec::new();
        for id in &due {
            let Some(timer) = timers.get(id.as_str()) else {
                continue;
            };
            if let Some(owner) = timer.owner.as_ref().filter(|owner| !roster.contains(*owner)) {
                skip_orphaned(&mut batch, id, format!("owner {} is not on the roster", owner));
                continue;
            }

            snap.facts.character = timer.owner.clone().or_else(|| facts.character.clone());
            if timer.conditions.evaluate(&snap) {
                passing.push(id);
            } else {
                tracing::debug!(timer = %id, "timer due but conditions failed");
                batch
                    .outcomes
                    .push((id.clone(), RuleOutcome::Skipped(SkipReason::ConditionsFailed)));
            }
        }

        for id in passing {
            let Some(timer) = timers.get(id.as_str()) else {
                continue;
            };
            let owner_facts;
            let facts = match &timer.owner {
                Some(owner) => {
                    owner_facts = facts.clone().with_character(owner.clone());
                    &owner_facts
                }
                None => facts,
            };
            if let Some(detail) = find_orphan(&timer.actions, roster, facts) {
                skip_orphaned(&mut batch, id, detail);
                continue;
            }

            tracing::debug!(timer = %id, "timer fired");
            let mut ctx = ExecContext {
                variables: &mut *variables,
                locations: &mut *locations,
                roster: &*roster,
                rng: &mut *rng,
                facts,
                source: id,
            };
            execute(&timer.actions, &mut ctx, &mut batch);
            batch.outcomes.push((id.clone(), RuleOutcome::Fired));
        }

        for id in &due {
            timers.rearm(id, clock, rng);
        }
        hand_over(batch, sink)
    }
}

fn find_orphan(actions: &[Action], roster: &IndexSet<ActorId>, facts: &TurnFacts) -> Option<String> {
    actions.iter().find_map(|action| action.orphan(roster, facts))
}

fn skip_orphaned(batch: &mut EffectBatch, source: &DefId, detail: String) {
    tracing::warn!(%source, %detail, "orphaned reference, skipping");
    batch.flags.push(Flag::Orphan {
        source: source.clone(),
        detail,
    });
    batch
        .outcomes
        .push((source.clone(), RuleOutcome::Skipped(SkipReason::Orphaned)));
}

fn execute(actions: &[Action], ctx: &mut ExecContext<'_>, batch: &mut EffectBatch) {
    for action in actions {
        let outcome = action.apply(ctx);
        match &outcome {
            ActionOutcome::Orphaned(detail) => {
                tracing::warn!(source = %ctx.source, %detail, "orphaned action skipped")
            }
            ActionOutcome::Anomaly(detail) => {
                tracing::warn!(source = %ctx.source, %detail, "action anomaly")
            }
            ActionOutcome::Mutated | ActionOutcome::Effect(_) => {}
        }
        batch.record(ctx.source, outcome);
    }
}

fn hand_over(batch: EffectBatch, sink: Option<&mut dyn EffectSink>) -> EffectBatch {
    if let Some(sink) = sink {
        sink.consume(&batch);
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Action, ClockConfig, CompareOp, Condition, EffectRequest, Interval, ModifyOp,
        Placement, PromptTarget, Rule, TimeMode, TimerRule, Value, VarRef,
    };

    fn session() -> Session {
        Session::with_seed(&ClockConfig::default(), 3).unwrap()
    }

    #[test]
    fn test_same_phase_rules_see_phase_start_state() {
        let mut session = session();
        session.replace_rules(vec![
            Rule::new("open_door", Phase::BeforeSend)
                .then(Action::set(VarRef::global("door_open"), true)),
            Rule::new("draft", Phase::BeforeSend)
                .when(Condition::variable(VarRef::global("door_open"), CompareOp::Eq, true))
                .then(Action::sound("wind")),
        ]);

        let engine = Engine::new();
        let facts = TurnFacts::new();
        let first = engine.run_phase(&mut session, Phase::BeforeSend, &facts, None);
        assert_eq!(first.outcome("open_door"), Some(RuleOutcome::Fired));
        assert_eq!(
            first.outcome("draft"),
            Some(RuleOutcome::Skipped(SkipReason::ConditionsFailed))
        );

        let next = engine.run_phase(&mut session, Phase::BeforeSend, &facts, None);
        assert_eq!(next.outcome("draft"), Some(RuleOutcome::Fired));
    }

    #[test]
    fn test_actions_in_one_rule_see_earlier_writes() {
        let mut session = session();
        session.replace_rules(vec![Rule::new("copy", Phase::Always)
            .then(Action::set(VarRef::global("a"), 5i64))
            .then(Action::modify(
                VarRef::global("b"),
                ModifyOp::Set,
                crate::Operand::Variable(VarRef::global("a")),
            ))]);

        let batch = Engine::new().run_phase(&mut session, Phase::AfterReceive, &TurnFacts::new(), None);
        assert!(batch.flags.is_empty());
        assert_eq!(session.variables.get_global("b"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_disabled_and_wrong_phase_rules_skip() {
        let mut session = session();
        session.replace_rules(vec![
            Rule::new("off", Phase::BeforeSend).disabled().then(Action::sound("x")),
            Rule::new("later", Phase::AfterReceive).then(Action::sound("y")),
        ]);
        let batch = Engine::new().run_phase(&mut session, Phase::BeforeSend, &TurnFacts::new(), None);
        assert!(batch.requests.is_empty());
        assert_eq!(batch.outcome("off"), Some(RuleOutcome::Skipped(SkipReason::Disabled)));
        assert_eq!(batch.outcome("later"), Some(RuleOutcome::Skipped(SkipReason::WrongPhase)));
    }

    #[test]
    fn test_sink_gets_the_finished_batch() {
        let mut session = session();
        session.replace_rules(vec![Rule::new("tavern", Phase::BeforeSend)
            .then(Action::inject(Placement::Append, PromptTarget::UserMessage, "Smoke hangs low."))
            .then(Action::sound("lute"))]);

        let mut received: Vec<EffectRequest> = Vec::new();
        let batch = Engine::new().run_phase(
            &mut session,
            Phase::BeforeSend,
            &TurnFacts::new(),
            Some(&mut received),
        );
        assert_eq!(received, batch.requests);
        assert_eq!(received.len(), 2);

        let quiet = Engine::new().tick(
            &mut session,
            Duration::from_secs(1),
            &TurnFacts::new(),
            Some(&mut received),
        );
        assert!(quiet.is_empty());
        assert_eq!(received.len(), 2);
    }

    #[test]
    fn test_rule_with_orphaned_target_runs_no_actions() {
        let mut session = session();
        session.add_actor("Mira");
        session.replace_rules(vec![Rule::new("haunt", Phase::BeforeSend)
            .then(Action::set(VarRef::global("chill"), true))
            .then(Action::set(
                VarRef::owned(crate::VariableScope::Character, "Ghost", "hp"),
                0i64,
            ))
            .then(Action::inject(Placement::Append, PromptTarget::UserMessage, "A cold draft."))]);

        let batch = Engine::new().run_phase(&mut session, Phase::BeforeSend, &TurnFacts::new(), None);
        assert_eq!(batch.outcome("haunt"), Some(RuleOutcome::Skipped(SkipReason::Orphaned)));
        assert!(batch.requests.is_empty());
        assert!(matches!(batch.flags.as_slice(), [Flag::Orphan { .. }]));
        assert_eq!(session.variables.get_global("chill"), None);
    }

    #[test]
    fn test_orphaned_timer_rearms_without_firing() {
        let mut session = session();
        session.replace_timers(vec![TimerRule::new(
            "ghost_whisper",
            TimeMode::RealTime,
            Interval::fixed(10.0),
        )
        .owned_by("Ghost")
        .then(Action::sound("whisper"))]);

        let batch = Engine::new().tick(&mut session, Duration::from_secs(10), &TurnFacts::new(), None);
        assert!(batch.requests.is_empty());
        assert!(matches!(batch.flags.as_slice(), [Flag::Orphan { .. }]));
        assert_eq!(
            batch.outcome("ghost_whisper"),
            Some(RuleOutcome::Skipped(SkipReason::Orphaned))
        );
        assert_eq!(session.timers.next_fire_at("ghost_whisper"), Some(20.0));
    }

    #[test]
    fn test_owned_timer_binds_current_character() {
        let mut session = session();
        session.add_actor("Mira");
        session.replace_timers(vec![TimerRule::new("tired", TimeMode::RealTime, Interval::fixed(5.0))
            .owned_by("Mira")
            .then(Action::modify(
                VarRef::current(crate::VariableScope::Character, "fatigue"),
                ModifyOp::Add,
                1i64,
            ))]);

        let engine = Engine::new();
        engine.tick(&mut session, Duration::from_secs(5), &TurnFacts::new(), None);
        engine.tick(&mut session, Duration::from_secs(5), &TurnFacts::new(), None);
        assert_eq!(
            session
                .variables
                .get(crate::VariableScope::Character, "Mira", "fatigue"),
            Some(&Value::Int(2))
        );
    }
}
