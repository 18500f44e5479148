//! Per-observer visibility of narrative events

use crate::variables::compare;
use crate::{ActorId, CompareOp, Snapshot, Value, VarRef, VariableScope};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisibilityMode {
    VisibleOnlyTo,
    HiddenFrom,
}

/// A variable test evaluated for the observer
///
/// Character and player references without an owner bind to the observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableTest {
    pub var: VarRef,
    #[serde(default)]
    pub op: CompareOp,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Criterion {
    NameMatch(Vec<String>),
    VariableMatch(Vec<VariableTest>),
}

/// Who may see an event
///
/// An observer "matches" if any criterion matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    pub mode: VisibilityMode,
    pub criteria: Vec<Criterion>,
}

impl Visibility {
    pub fn only_to<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: VisibilityMode::VisibleOnlyTo,
            criteria: vec![Criterion::NameMatch(names.into_iter().map(Into::into).collect())],
        }
    }

    pub fn hidden_from<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: VisibilityMode::HiddenFrom,
            criteria: vec![Criterion::NameMatch(names.into_iter().map(Into::into).collect())],
        }
    }

    pub fn or_variable(mut self, test: VariableTest) -> Self {
        self.criteria.push(Criterion::VariableMatch(vec![test]));
        self
    }

    fn matches(&self, observer: &ActorId, snap: &Snapshot) -> bool {
        self.criteria.iter().any(|criterion| match criterion {
            Criterion::NameMatch(names) => names.iter().any(|name| same_name(name, observer.as_str())),
            Criterion::VariableMatch(tests) => tests.iter().any(|test| {
                let var = bind_observer(&test.var, observer);
                compare(snap.read(&var), test.op, &test.value)
            }),
        })
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn bind_observer(var: &VarRef, observer: &ActorId) -> VarRef {
    match var.scope {
        VariableScope::Character | VariableScope::Player if var.owner.is_none() => {
            VarRef::owned(var.scope, observer.as_str(), var.name.clone())
        }
        _ => var.clone(),
    }
}

/// A generated piece of narrative, produced outside the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeEvent {
    pub role: String,
    pub text: String,
    pub scene: u32,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

impl NarrativeEvent {
    pub fn new(role: impl Into<String>, text: impl Into<String>, scene: u32) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
            scene,
            timestamp: None,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// Decide whether `observer` may see `event`, against current state
pub fn is_visible(event: &NarrativeEvent, observer: &ActorId, snap: &Snapshot) -> bool {
    let Some(visibility) = &event.visibility else {
        return true;
    };
    let matched = visibility.matches(observer, snap);
    match visibility.mode {
        VisibilityMode::VisibleOnlyTo => matched,
        VisibilityMode::HiddenFrom => !matched,
    }
}

/// Events `observer` may see, in order
pub fn visible_events<'a>(
    events: impl IntoIterator<Item = &'a NarrativeEvent>,
    observer: &'a ActorId,
    snap: &'a Snapshot,
) -> impl Iterator<Item = &'a NarrativeEvent> {
    events
        .into_iter()
        .filter(move |event| is_visible(event, observer, snap))
}
