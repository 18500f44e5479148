//! Timer rules and their scheduler
//!
//! Each timer has exactly one pending fire time, measured in seconds on the
//! clock its [`TimeMode`] selects. A tick marks armed timers whose time has
//! come as due; the engine evaluates them and then re-arms every due timer,
//! whether or not it fired.

use crate::action::validate_actions;
use crate::rule::enabled_by_default;
use crate::{
    Action, ActorId, ConditionSet, ConfigError, DefId, GameClock, GameRng, Rejection, Result,
    TimeMode,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Time between firings, in seconds of the timer's clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Interval {
    Fixed { secs: f64 },
    /// Re-sampled uniformly from `[min, max]` on every arm
    Range { min: f64, max: f64 },
}

impl Interval {
    pub fn fixed(secs: f64) -> Self {
        Interval::Fixed { secs }
    }

    pub fn range(min: f64, max: f64) -> Self {
        Interval::Range { min, max }
    }

    pub fn sample(&self, rng: &mut GameRng) -> f64 {
        match *self {
            Interval::Fixed { secs } => secs,
            Interval::Range { min, max } => rng.range_inclusive_f64(min, max),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |secs: f64| secs.is_finite() && secs > 0.0;
        match *self {
            Interval::Fixed { secs } if !positive(secs) => Err(ConfigError::InvalidInterval(
                format!("{} seconds is not a positive duration", secs),
            )),
            Interval::Range { min, max } if !positive(min) || !positive(max) => {
                Err(ConfigError::InvalidInterval(format!(
                    "range {}..={} must be positive",
                    min, max
                )))
            }
            Interval::Range { min, max } if min > max => Err(ConfigError::InvalidInterval(
                format!("range {}..={} is inverted", min, max),
            )),
            _ => Ok(()),
        }
    }
}

/// A condition set and action list fired on a recurring interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerRule {
    pub id: DefId,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// `None` for a global timer
    #[serde(default)]
    pub owner: Option<ActorId>,
    #[serde(default)]
    pub mode: TimeMode,
    pub interval: Interval,
    #[serde(default)]
    pub conditions: ConditionSet,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl TimerRule {
    pub fn new(id: impl Into<DefId>, mode: TimeMode, interval: Interval) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            enabled: true,
            owner: None,
            mode,
            interval,
            conditions: ConditionSet::new(),
            actions: Vec::new(),
        }
    }

    pub fn owned_by(mut self, owner: impl Into<ActorId>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn when(mut self, condition: crate::Condition) -> Self {
        self.conditions.0.push(condition);
        self
    }

    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_blank() {
            return Err(ConfigError::EmptyId);
        }
        self.interval.validate()?;
        self.conditions.validate()?;
        validate_actions(&self.actions)
    }
}

/// Lifecycle of a timer's pending activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerStatus {
    Armed,
    /// Fire time reached; awaiting evaluation this tick
    Due,
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    rule: TimerRule,
    next_fire_at: f64,
    status: TimerStatus,
}

/// Saved fire times, keyed by timer id
pub type TimerCheckpoint = IndexMap<DefId, f64>;

/// The timer population of one session, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scheduler {
    slots: IndexMap<DefId, Slot>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and arm timers, rejecting bad records individually
    pub fn load(
        timers: impl IntoIterator<Item = TimerRule>,
        clock: &GameClock,
        rng: &mut GameRng,
    ) -> (Self, Vec<Rejection>) {
        let mut scheduler = Self::new();
        let rejections = scheduler.extend(timers, clock, rng, &IndexMap::new());
        (scheduler, rejections)
    }

    /// Add and arm one timer
    pub fn insert(&mut self, rule: TimerRule, clock: &GameClock, rng: &mut GameRng) -> Result<()> {
        self.check(&rule)?;
        let next_fire_at = clock.reading(rule.mode) + rule.interval.sample(rng);
        self.arm(rule, next_fire_at);
        Ok(())
    }

    fn check(&self, rule: &TimerRule) -> Result<()> {
        rule.validate()?;
        if self.slots.contains_key(&rule.id) {
            return Err(ConfigError::DuplicateDefinition(rule.id.to_string()));
        }
        Ok(())
    }

    fn arm(&mut self, rule: TimerRule, next_fire_at: f64) {
        tracing::debug!(timer = %rule.id, next_fire_at, "timer armed");
        self.slots.insert(
            rule.id.clone(),
            Slot {
                rule,
                next_fire_at,
                status: TimerStatus::Armed,
            },
        );
    }

    /// Swap in a new population
    ///
    /// Timers whose id survives with the same mode keep their pending fire
    /// time; new ones are armed from now.
    pub fn replace(
        &mut self,
        timers: impl IntoIterator<Item = TimerRule>,
        clock: &GameClock,
        rng: &mut GameRng,
    ) -> Vec<Rejection> {
        let previous = std::mem::take(&mut self.slots);
        let kept: IndexMap<DefId, (TimeMode, f64)> = previous
            .into_iter()
            .map(|(id, slot)| (id, (slot.rule.mode, slot.next_fire_at)))
            .collect();
        self.extend(timers, clock, rng, &kept)
    }

    fn extend(
        &mut self,
        timers: impl IntoIterator<Item = TimerRule>,
        clock: &GameClock,
        rng: &mut GameRng,
        kept: &IndexMap<DefId, (TimeMode, f64)>,
    ) -> Vec<Rejection> {
        let mut rejections = Vec::new();
        for rule in timers {
            if let Err(reason) = self.check(&rule) {
                tracing::warn!(timer = %rule.id, %reason, "timer rejected");
                rejections.push(Rejection::new(rule.id.to_string(), reason));
                continue;
            }
            // Survivors keep their pending fire time without drawing from the rng
            let next_fire_at = match kept.get(&rule.id) {
                Some((mode, fire_at)) if *mode == rule.mode => *fire_at,
                _ => clock.reading(rule.mode) + rule.interval.sample(rng),
            };
            self.arm(rule, next_fire_at);
        }
        rejections
    }

    /// Mark enabled, armed timers whose clock has reached their fire time
    ///
    /// Returns the due ids in declaration order.
    pub fn mark_due(&mut self, clock: &GameClock) -> Vec<DefId> {
        let mut due = Vec::new();
        for (id, slot) in &mut self.slots {
            if !slot.rule.enabled || slot.status != TimerStatus::Armed {
                continue;
            }
            if clock.reading(slot.rule.mode) >= slot.next_fire_at {
                slot.status = TimerStatus::Due;
                due.push(id.clone());
            }
        }
        due
    }

    /// Arm a due timer for its next firing
    ///
    /// The next fire time counts from the previous one. If that is already
    /// behind the clock, it counts from now instead so no backlog builds.
    pub fn rearm(&mut self, id: &DefId, clock: &GameClock, rng: &mut GameRng) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        let now = clock.reading(slot.rule.mode);
        let interval = slot.rule.interval.sample(rng);
        let mut next = slot.next_fire_at + interval;
        if next <= now {
            tracing::debug!(timer = %id, missed_at = slot.next_fire_at, "timer re-anchored");
            next = now + interval;
        }
        slot.next_fire_at = next;
        slot.status = TimerStatus::Armed;
        tracing::debug!(timer = %id, next_fire_at = next, "timer re-armed");
    }

    /// Toggle a timer; the pending fire time is left alone
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.slots.get_mut(&DefId::new(id)) {
            Some(slot) => {
                slot.rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&TimerRule> {
        self.slots.get(&DefId::new(id)).map(|slot| &slot.rule)
    }

    pub fn next_fire_at(&self, id: &str) -> Option<f64> {
        self.slots.get(&DefId::new(id)).map(|slot| slot.next_fire_at)
    }

    pub fn status(&self, id: &str) -> Option<TimerStatus> {
        self.slots.get(&DefId::new(id)).map(|slot| slot.status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimerRule> {
        self.slots.values().map(|slot| &slot.rule)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn checkpoint(&self) -> TimerCheckpoint {
        self.slots
            .iter()
            .map(|(id, slot)| (id.clone(), slot.next_fire_at))
            .collect()
    }

    /// Restore saved fire times; unknown ids are ignored
    pub fn restore(&mut self, saved: &TimerCheckpoint) {
        for (id, fire_at) in saved {
            if let Some(slot) = self.slots.get_mut(id) {
                slot.next_fire_at = *fire_at;
                slot.status = TimerStatus::Armed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClockConfig;
    use std::time::Duration;

    fn setup() -> (GameClock, GameRng) {
        (GameClock::new(&ClockConfig::default()).unwrap(), GameRng::new(7))
    }

    fn patrol() -> TimerRule {
        TimerRule::new("patrol", TimeMode::RealTime, Interval::fixed(300.0))
    }

    #[test]
    fn test_due_at_interval_boundary() {
        let (mut clock, mut rng) = setup();
        let (mut scheduler, rejections) = Scheduler::load(vec![patrol()], &clock, &mut rng);
        assert!(rejections.is_empty());

        clock.advance(Duration::from_secs(299));
        assert!(scheduler.mark_due(&clock).is_empty());
        assert_eq!(scheduler.status("patrol"), Some(TimerStatus::Armed));

        clock.advance(Duration::from_secs(1));
        assert_eq!(scheduler.mark_due(&clock), vec![DefId::new("patrol")]);
        assert_eq!(scheduler.status("patrol"), Some(TimerStatus::Due));

        scheduler.rearm(&DefId::new("patrol"), &clock, &mut rng);
        assert_eq!(scheduler.next_fire_at("patrol"), Some(600.0));
        assert_eq!(scheduler.status("patrol"), Some(TimerStatus::Armed));
    }

    #[test]
    fn test_missed_intervals_reanchor() {
        let (mut clock, mut rng) = setup();
        let (mut scheduler, _) = Scheduler::load(vec![patrol()], &clock, &mut rng);

        clock.advance(Duration::from_secs(1000));
        assert_eq!(scheduler.mark_due(&clock).len(), 1);
        scheduler.rearm(&DefId::new("patrol"), &clock, &mut rng);
        assert_eq!(scheduler.next_fire_at("patrol"), Some(1300.0));
    }

    #[test]
    fn test_disabled_keeps_fire_time() {
        let (mut clock, mut rng) = setup();
        let (mut scheduler, _) = Scheduler::load(vec![patrol()], &clock, &mut rng);

        assert!(scheduler.set_enabled("patrol", false));
        clock.advance(Duration::from_secs(400));
        assert!(scheduler.mark_due(&clock).is_empty());
        assert_eq!(scheduler.next_fire_at("patrol"), Some(300.0));

        scheduler.set_enabled("patrol", true);
        assert_eq!(scheduler.mark_due(&clock).len(), 1);
    }

    #[test]
    fn test_range_interval_samples_within_bounds() {
        let (mut clock, mut rng) = setup();
        let gossip = TimerRule::new("gossip", TimeMode::GameTime, Interval::range(60.0, 120.0));
        let (mut scheduler, _) = Scheduler::load(vec![gossip], &clock, &mut rng);

        let mut gaps = Vec::new();
        for _ in 0..40 {
            let before = scheduler.next_fire_at("gossip").unwrap();
            assert!(clock.fiction_elapsed().as_secs_f64() < before);
            let wait = before - clock.fiction_elapsed().as_secs_f64() + 0.001;
            clock.advance(Duration::from_secs_f64(wait));
            assert_eq!(scheduler.mark_due(&clock).len(), 1);
            scheduler.rearm(&DefId::new("gossip"), &clock, &mut rng);
            let gap = scheduler.next_fire_at("gossip").unwrap() - before;
            assert!((60.0..=120.0).contains(&gap), "gap {} out of range", gap);
            gaps.push(gap);
        }
        let first = gaps[0];
        assert!(gaps.iter().any(|gap| (gap - first).abs() > 1e-9));
    }

    #[test]
    fn test_invalid_timers_rejected() {
        let (clock, mut rng) = setup();
        let timers = vec![
            TimerRule::new("zero", TimeMode::RealTime, Interval::fixed(0.0)),
            TimerRule::new("inverted", TimeMode::RealTime, Interval::range(10.0, 5.0)),
            patrol(),
            patrol(),
        ];
        let (scheduler, rejections) = Scheduler::load(timers, &clock, &mut rng);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(rejections.len(), 3);
        assert!(matches!(rejections[0].reason, ConfigError::InvalidInterval(_)));
        assert_eq!(rejections[2].reason, ConfigError::DuplicateDefinition("patrol".into()));
    }

    #[test]
    fn test_replace_keeps_surviving_fire_times() {
        let (mut clock, mut rng) = setup();
        let (mut scheduler, _) = Scheduler::load(vec![patrol()], &clock, &mut rng);
        clock.advance(Duration::from_secs(100));

        let bell = TimerRule::new("bell", TimeMode::RealTime, Interval::fixed(50.0));
        let rejections = scheduler.replace(vec![bell, patrol()], &clock, &mut rng);
        assert!(rejections.is_empty());
        assert_eq!(scheduler.next_fire_at("patrol"), Some(300.0));
        assert_eq!(scheduler.next_fire_at("bell"), Some(150.0));
        let ids: Vec<_> = scheduler.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["bell", "patrol"]);
    }

    #[test]
    fn test_replace_leaves_rng_alone_for_survivors() {
        let (clock, mut rng) = setup();
        let gossip = || TimerRule::new("gossip", TimeMode::RealTime, Interval::range(60.0, 120.0));
        let (mut scheduler, _) = Scheduler::load(vec![gossip()], &clock, &mut rng);
        let before = rng.clone();
        let fire_at = scheduler.next_fire_at("gossip");

        scheduler.replace(vec![gossip()], &clock, &mut rng);
        assert_eq!(rng, before);
        assert_eq!(scheduler.next_fire_at("gossip"), fire_at);
    }

    #[test]
    fn test_checkpoint_restore() {
        let (mut clock, mut rng) = setup();
        let (mut scheduler, _) = Scheduler::load(vec![patrol()], &clock, &mut rng);
        clock.advance(Duration::from_secs(300));
        scheduler.mark_due(&clock);
        scheduler.rearm(&DefId::new("patrol"), &clock, &mut rng);
        let saved = scheduler.checkpoint();
        clock.advance(Duration::from_secs(50));

        let (mut fresh, _) = Scheduler::load(vec![patrol()], &clock, &mut rng);
        fresh.restore(&saved);
        assert_eq!(fresh.next_fire_at("patrol"), Some(600.0));
    }
}
