//! Turn-boundary rules

use crate::action::validate_actions;
use crate::{Action, ConditionSet, ConfigError, DefId, Rejection, Result, SkipReason};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// When in a turn a rule is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Phase {
    /// Before the user's message goes to the narrator
    #[default]
    BeforeSend,
    /// After the narrator's reply comes back
    AfterReceive,
    /// Eligible in every phase pass
    Always,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::BeforeSend => write!(f, "before_send"),
            Phase::AfterReceive => write!(f, "after_receive"),
            Phase::Always => write!(f, "always"),
        }
    }
}

pub(crate) fn enabled_by_default() -> bool {
    true
}

/// A condition set and action list evaluated at a turn boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: DefId,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub conditions: ConditionSet,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(id: impl Into<DefId>, phase: Phase) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            enabled: true,
            phase,
            conditions: ConditionSet::new(),
            actions: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
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

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether a pass for `phase` should consider this rule
    pub fn runs_in(&self, phase: Phase) -> bool {
        self.phase == phase || self.phase == Phase::Always
    }

    /// Why this rule will not be evaluated in `phase`, if it won't
    pub fn skip_reason(&self, phase: Phase) -> Option<SkipReason> {
        if !self.runs_in(phase) {
            Some(SkipReason::WrongPhase)
        } else if !self.enabled {
            Some(SkipReason::Disabled)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_blank() {
            return Err(ConfigError::EmptyId);
        }
        self.conditions.validate()?;
        validate_actions(&self.actions)
    }
}

/// Rules in declaration order, unique by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: IndexMap<DefId, Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and collect rules, rejecting bad records individually
    pub fn load(rules: impl IntoIterator<Item = Rule>) -> (Self, Vec<Rejection>) {
        let mut set = Self::new();
        let mut rejections = Vec::new();
        for rule in rules {
            let id = rule.id.to_string();
            if let Err(reason) = set.insert(rule) {
                tracing::warn!(rule = %id, %reason, "rule rejected");
                rejections.push(Rejection::new(id, reason));
            }
        }
        (set, rejections)
    }

    /// Add a rule at the end of the declaration order
    pub fn insert(&mut self, rule: Rule) -> Result<()> {
        rule.validate()?;
        if self.rules.contains_key(&rule.id) {
            return Err(ConfigError::DuplicateDefinition(rule.id.to_string()));
        }
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.get(&DefId::new(id))
    }

    /// Toggle a rule; returns false if no rule has this id
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.rules.get_mut(&DefId::new(id)) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
