//! Condition evaluation
//!
//! Conditions are loaded from RON scripts and evaluated against a
//! [`Snapshot`]. Evaluation is pure and total: a condition that cannot be
//! decided (missing fact, mismatched types) is simply false.

use crate::variables::compare;
use crate::{CompareOp, ConfigError, Result, Snapshot, Value, VarRef, VariableScope};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Which part of fiction time a `GameTimeCompare` looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeField {
    /// Fiction seconds since session start
    ElapsedSeconds,
    /// Whole fiction days since session start
    ElapsedDays,
    /// Hour of day, 0-23
    Hour,
    /// Minute of hour, 0-59
    Minute,
    /// Absolute fiction timestamp; the operand is an ISO-8601 string
    Timestamp,
}

/// A single test against one fact of the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    LocationMatch {
        #[serde(default)]
        op: CompareOp,
        value: Value,
    },
    RegionMatch {
        #[serde(default)]
        op: CompareOp,
        value: Value,
    },
    WorldMatch {
        #[serde(default)]
        op: CompareOp,
        value: Value,
    },
    VariableCompare {
        var: VarRef,
        op: CompareOp,
        #[serde(default)]
        value: Value,
    },
    SceneCountCompare {
        op: CompareOp,
        value: Value,
    },
    GameTimeCompare {
        field: TimeField,
        op: CompareOp,
        value: Value,
    },
    DialogueDetected {
        topic: String,
        #[serde(default = "default_expected")]
        expected: bool,
    },
}

fn default_expected() -> bool {
    true
}

impl Condition {
    /// Current location equals `name`
    pub fn location(name: impl Into<String>) -> Self {
        Condition::LocationMatch {
            op: CompareOp::Eq,
            value: Value::String(name.into()),
        }
    }

    /// Current region equals `name`
    pub fn region(name: impl Into<String>) -> Self {
        Condition::RegionMatch {
            op: CompareOp::Eq,
            value: Value::String(name.into()),
        }
    }

    /// Current world equals `name`
    pub fn world(name: impl Into<String>) -> Self {
        Condition::WorldMatch {
            op: CompareOp::Eq,
            value: Value::String(name.into()),
        }
    }

    pub fn variable(var: VarRef, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::VariableCompare {
            var,
            op,
            value: value.into(),
        }
    }

    pub fn scene(op: CompareOp, count: i64) -> Self {
        Condition::SceneCountCompare {
            op,
            value: Value::Int(count),
        }
    }

    pub fn game_time(field: TimeField, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::GameTimeCompare {
            field,
            op,
            value: value.into(),
        }
    }

    pub fn dialogue(topic: impl Into<String>) -> Self {
        Condition::DialogueDetected {
            topic: topic.into(),
            expected: true,
        }
    }

    /// Evaluate against a snapshot
    pub fn evaluate(&self, snap: &Snapshot) -> bool {
        match self {
            Condition::LocationMatch { op, value } => {
                compare_name(snap.facts.location.as_deref(), *op, value)
            }
            Condition::RegionMatch { op, value } => {
                compare_name(snap.facts.region.as_deref(), *op, value)
            }
            Condition::WorldMatch { op, value } => {
                compare_name(snap.facts.world.as_deref(), *op, value)
            }
            Condition::VariableCompare { var, op, value } => compare(snap.read(var), *op, value),
            Condition::SceneCountCompare { op, value } => {
                compare(Some(&Value::Int(snap.facts.scene as i64)), *op, value)
            }
            Condition::GameTimeCompare { field, op, value } => {
                let fiction = &snap.fiction;
                match field {
                    TimeField::ElapsedSeconds => {
                        compare(Some(&Value::Float(fiction.elapsed_seconds)), *op, value)
                    }
                    TimeField::ElapsedDays => {
                        compare(Some(&Value::Int(fiction.elapsed_days)), *op, value)
                    }
                    TimeField::Hour => compare(Some(&Value::Int(fiction.hour as i64)), *op, value),
                    TimeField::Minute => {
                        compare(Some(&Value::Int(fiction.minute as i64)), *op, value)
                    }
                    TimeField::Timestamp => {
                        let Some(target) = parse_timestamp(value) else {
                            return false;
                        };
                        let now = fiction.timestamp.and_utc().timestamp();
                        compare(Some(&Value::Int(now)), *op, &Value::Int(target))
                    }
                }
            }
            Condition::DialogueDetected { topic, expected } => {
                snap.facts.dialogue_detected(topic) == *expected
            }
        }
    }

    /// Static checks run at load time
    ///
    /// Catches conditions that could never be true as written, such as
    /// ordering a location name or comparing the hour against a string.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Condition::LocationMatch { op, value }
            | Condition::RegionMatch { op, value }
            | Condition::WorldMatch { op, value } => {
                if op.is_ordering() {
                    return Err(format!("operator {} cannot order place names", op));
                }
                if !op.is_presence() && value.as_str().is_none() {
                    return Err(format!("place name must be a string, got {}", value.type_name()));
                }
                Ok(())
            }
            Condition::VariableCompare { var, op, value } => {
                if var.name.trim().is_empty() {
                    return Err("variable name is empty".to_string());
                }
                if var.scope == VariableScope::Global && var.owner.is_some() {
                    return Err(format!("global variable {} cannot name an owner", var.name));
                }
                if op.is_ordering() && !value.is_number() {
                    return Err(format!(
                        "operator {} needs a numeric operand, got {}",
                        op,
                        value.type_name()
                    ));
                }
                Ok(())
            }
            Condition::SceneCountCompare { op, value } => numeric_operand(*op, value),
            Condition::GameTimeCompare { field, op, value } => match field {
                TimeField::Timestamp => {
                    if matches!(op, CompareOp::Contains | CompareOp::NotContains) {
                        return Err(format!("operator {} does not apply to time", op));
                    }
                    if parse_timestamp(value).is_none() {
                        return Err(format!("unparseable fiction timestamp {}", value));
                    }
                    Ok(())
                }
                _ => numeric_operand(*op, value),
            },
            Condition::DialogueDetected { topic, .. } => {
                if topic.trim().is_empty() {
                    Err("dialogue topic is empty".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn compare_name(fact: Option<&str>, op: CompareOp, value: &Value) -> bool {
    let fact = fact.map(|name| Value::String(name.to_string()));
    compare(fact.as_ref(), op, value)
}

fn numeric_operand(op: CompareOp, value: &Value) -> std::result::Result<(), String> {
    if matches!(op, CompareOp::Contains | CompareOp::NotContains) {
        return Err(format!("operator {} does not apply to counters", op));
    }
    if !op.is_presence() && !value.is_number() {
        return Err(format!("expected a number, got {}", value.type_name()));
    }
    Ok(())
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    let text = value.as_str()?;
    let parsed: NaiveDateTime = text.trim().parse().ok()?;
    Some(parsed.and_utc().timestamp())
}

/// Ordered list of conditions combined with AND
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet(pub Vec<Condition>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every condition holds; an empty set is always true
    pub fn evaluate(&self, snap: &Snapshot) -> bool {
        self.0.iter().all(|condition| condition.evaluate(snap))
    }

    pub fn validate(&self) -> Result<()> {
        for (index, condition) in self.0.iter().enumerate() {
            condition
                .validate()
                .map_err(|reason| ConfigError::MalformedCondition { index, reason })?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }
}

impl From<Vec<Condition>> for ConditionSet {
    fn from(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<T: IntoIterator<Item = Condition>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClockConfig, GameClock, TurnFacts, VariableStore};
    use std::time::Duration;

    fn snapshot(facts: TurnFacts, variables: VariableStore, clock: &GameClock) -> Snapshot {
        Snapshot::capture(&facts, &variables, clock)
    }

    fn evening_clock() -> GameClock {
        let start = "1320-04-02T18:00:00".parse().unwrap();
        let mut clock = GameClock::new(&ClockConfig::new(60.0, start)).unwrap();
        clock.advance(Duration::from_secs(150)); // 2.5 fiction hours
        clock
    }

    #[test]
    fn test_empty_set_is_vacuously_true() {
        let snap = snapshot(TurnFacts::new(), VariableStore::new(), &GameClock::default());
        assert!(ConditionSet::new().evaluate(&snap));
    }

    #[test]
    fn test_place_conditions() {
        let facts = TurnFacts::new()
            .with_location("Rusty Anchor")
            .with_region("Harbor")
            .with_world("Aldmere");
        let snap = snapshot(facts, VariableStore::new(), &GameClock::default());

        assert!(Condition::location("Rusty Anchor").evaluate(&snap));
        assert!(!Condition::location("Old Mill").evaluate(&snap));
        assert!(Condition::region("Harbor").evaluate(&snap));
        assert!(Condition::world("Aldmere").evaluate(&snap));

        let partial = Condition::LocationMatch {
            op: CompareOp::Contains,
            value: "anchor".into(),
        };
        assert!(partial.evaluate(&snap));

        let nowhere = snapshot(TurnFacts::new(), VariableStore::new(), &GameClock::default());
        assert!(!Condition::location("Rusty Anchor").evaluate(&nowhere));
        let unset = Condition::LocationMatch {
            op: CompareOp::NotExists,
            value: Value::Null,
        };
        assert!(unset.evaluate(&nowhere));
    }

    #[test]
    fn test_variable_and_scene_conditions() {
        let mut vars = VariableStore::new();
        vars.set_global("alarm", 3i64);
        vars.set(VariableScope::Character, "Mira", "trust", 7i64);
        let facts = TurnFacts::new().with_scene(5).with_character("Mira");
        let snap = snapshot(facts, vars, &GameClock::default());

        let set: ConditionSet = vec![
            Condition::variable(VarRef::global("alarm"), CompareOp::Ge, 3i64),
            Condition::variable(
                VarRef::current(VariableScope::Character, "trust"),
                CompareOp::Gt,
                5i64,
            ),
            Condition::scene(CompareOp::Eq, 5),
        ]
        .into();
        assert!(set.evaluate(&snap));

        let failing: ConditionSet = vec![
            Condition::scene(CompareOp::Eq, 5),
            Condition::variable(VarRef::global("alarm"), CompareOp::Gt, "high"),
        ]
        .into();
        assert!(!failing.evaluate(&snap));
    }

    #[test]
    fn test_game_time_conditions() {
        let snap = snapshot(TurnFacts::new(), VariableStore::new(), &evening_clock());

        assert!(Condition::game_time(TimeField::Hour, CompareOp::Eq, 20i64).evaluate(&snap));
        assert!(Condition::game_time(TimeField::Minute, CompareOp::Eq, 30i64).evaluate(&snap));
        assert!(
            Condition::game_time(TimeField::ElapsedSeconds, CompareOp::Ge, 9000.0).evaluate(&snap)
        );
        assert!(Condition::game_time(TimeField::ElapsedDays, CompareOp::Eq, 0i64).evaluate(&snap));
        assert!(Condition::game_time(
            TimeField::Timestamp,
            CompareOp::Gt,
            "1320-04-02T20:00:00"
        )
        .evaluate(&snap));
    }

    #[test]
    fn test_dialogue_condition() {
        let facts = TurnFacts::new().with_dialogue("bribe");
        let snap = snapshot(facts, VariableStore::new(), &GameClock::default());

        assert!(Condition::dialogue("bribe").evaluate(&snap));
        assert!(!Condition::dialogue("threat").evaluate(&snap));
        let absent = Condition::DialogueDetected {
            topic: "threat".into(),
            expected: false,
        };
        assert!(absent.evaluate(&snap));
    }

    #[test]
    fn test_validation_rejects_impossible_conditions() {
        let ordering_place = Condition::LocationMatch {
            op: CompareOp::Gt,
            value: "Harbor".into(),
        };
        assert!(ordering_place.validate().is_err());

        let set: ConditionSet = vec![
            Condition::scene(CompareOp::Ge, 1),
            Condition::game_time(TimeField::Hour, CompareOp::Lt, "noon"),
        ]
        .into();
        assert!(matches!(
            set.validate(),
            Err(ConfigError::MalformedCondition { index: 1, .. })
        ));

        let bad_stamp = Condition::game_time(TimeField::Timestamp, CompareOp::Lt, "soon");
        assert!(bad_stamp.validate().is_err());
        assert!(Condition::dialogue(" ").validate().is_err());
        assert!(Condition::variable(VarRef::global(""), CompareOp::Exists, Value::Null)
            .validate()
            .is_err());
    }

    #[test]
    fn test_conditions_from_ron() {
        let source = r#"[
            LocationMatch(value: "Rusty Anchor"),
            VariableCompare(var: (scope: Global, name: "alarm"), op: Exists),
            DialogueDetected(topic: "bribe"),
        ]"#;
        let set: ConditionSet = ron::from_str(source).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.validate().is_ok());
    }
}
