//! Scoped variable store
//!
//! Variables live under a scope (global, character, player, location) and an
//! owner key within that scope. Global variables use the empty owner.
//!
//! Lookups never fail: an unset variable reads as `None`, which is distinct
//! from any stored value including `Value::Null`, `Bool(false)` and `Int(0)`.

use crate::{ActorId, TurnFacts, Value, ValueMap};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which family of owners a variable belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableScope {
    Global,
    Character,
    Player,
    Location,
}

impl fmt::Display for VariableScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableScope::Global => "global",
            VariableScope::Character => "character",
            VariableScope::Player => "player",
            VariableScope::Location => "location",
        };
        f.write_str(name)
    }
}

/// A reference to a variable as written in rule scripts
///
/// `owner: None` on a non-global scope binds to the current character,
/// player or location named in the turn facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    pub scope: VariableScope,
    #[serde(default)]
    pub owner: Option<String>,
    pub name: String,
}

impl VarRef {
    /// Reference a global variable
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            scope: VariableScope::Global,
            owner: None,
            name: name.into(),
        }
    }

    /// Reference a variable with an explicit owner
    pub fn owned(scope: VariableScope, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope,
            owner: Some(owner.into()),
            name: name.into(),
        }
    }

    /// Reference a variable owned by whoever is current this turn
    pub fn current(scope: VariableScope, name: impl Into<String>) -> Self {
        Self {
            scope,
            owner: None,
            name: name.into(),
        }
    }

    /// Resolve the owner key against the turn facts
    ///
    /// Returns `None` when the reference names no owner and the facts have no
    /// current owner for the scope.
    pub fn owner_key(&self, facts: &TurnFacts) -> Option<String> {
        if self.scope == VariableScope::Global {
            return Some(String::new());
        }
        if let Some(owner) = &self.owner {
            return Some(owner.clone());
        }
        let current = match self.scope {
            VariableScope::Character => facts.character.as_ref().map(ActorId::as_str),
            VariableScope::Player => facts.player.as_ref().map(ActorId::as_str),
            VariableScope::Location => facts.location.as_deref(),
            VariableScope::Global => None,
        };
        current.map(str::to_string)
    }

    /// Read this variable from a store
    pub fn read<'a>(&self, store: &'a VariableStore, facts: &TurnFacts) -> Option<&'a Value> {
        let owner = self.owner_key(facts)?;
        store.get(self.scope, &owner, &self.name)
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{}[{}].{}", self.scope, owner, self.name),
            None => write!(f, "{}.{}", self.scope, self.name),
        }
    }
}

/// Session variables keyed by scope, owner and name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStore {
    scopes: IndexMap<VariableScope, IndexMap<String, ValueMap>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a variable; `None` means it was never set (or was removed)
    pub fn get(&self, scope: VariableScope, owner: &str, name: &str) -> Option<&Value> {
        self.scopes.get(&scope)?.get(owner)?.get(name)
    }

    /// Write a variable, returning the previous value if there was one
    ///
    /// No schema is enforced: a name may hold different types over time.
    pub fn set(
        &mut self,
        scope: VariableScope,
        owner: &str,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.scopes
            .entry(scope)
            .or_default()
            .entry(owner.to_string())
            .or_default()
            .insert(name.into(), value.into())
    }

    /// Convenience for global reads
    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.get(VariableScope::Global, "", name)
    }

    /// Convenience for global writes
    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.set(VariableScope::Global, "", name, value)
    }

    /// Remove a variable, returning its last value
    pub fn remove(&mut self, scope: VariableScope, owner: &str, name: &str) -> Option<Value> {
        self.scopes
            .get_mut(&scope)?
            .get_mut(owner)?
            .shift_remove(name)
    }

    /// Drop every variable held by one owner
    pub fn clear_owner(&mut self, scope: VariableScope, owner: &str) -> Option<ValueMap> {
        self.scopes.get_mut(&scope)?.shift_remove(owner)
    }

    /// Owners that currently hold at least one variable in a scope
    pub fn owners(&self, scope: VariableScope) -> impl Iterator<Item = &str> {
        self.scopes
            .get(&scope)
            .into_iter()
            .flat_map(|owners| owners.keys().map(String::as_str))
    }

    /// All variables of one owner
    pub fn owner_vars(&self, scope: VariableScope, owner: &str) -> Option<&ValueMap> {
        self.scopes.get(&scope)?.get(owner)
    }

    /// Total number of stored variables
    pub fn len(&self) -> usize {
        self.scopes
            .values()
            .flat_map(|owners| owners.values())
            .map(|vars| vars.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Comparison operators usable in conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CompareOp {
    #[default]
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    NotContains,
    Exists,
    NotExists,
}

impl CompareOp {
    /// Operators that only make sense with numeric operands
    pub fn is_ordering(&self) -> bool {
        matches!(self, CompareOp::Gt | CompareOp::Lt | CompareOp::Ge | CompareOp::Le)
    }

    /// Operators that ignore the right-hand operand
    pub fn is_presence(&self) -> bool {
        matches!(self, CompareOp::Exists | CompareOp::NotExists)
    }
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "==" | "eq" => Ok(CompareOp::Eq),
            "!=" | "ne" => Ok(CompareOp::Ne),
            ">" | "gt" => Ok(CompareOp::Gt),
            "<" | "lt" => Ok(CompareOp::Lt),
            ">=" | "ge" => Ok(CompareOp::Ge),
            "<=" | "le" => Ok(CompareOp::Le),
            "contains" => Ok(CompareOp::Contains),
            "notContains" | "not_contains" => Ok(CompareOp::NotContains),
            "exists" => Ok(CompareOp::Exists),
            "notExists" | "not_exists" => Ok(CompareOp::NotExists),
            other => Err(format!("unknown comparison operator '{}'", other)),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Contains => "contains",
            CompareOp::NotContains => "notContains",
            CompareOp::Exists => "exists",
            CompareOp::NotExists => "notExists",
        };
        f.write_str(symbol)
    }
}

/// Compare a looked-up value against an operand
///
/// Total: mismatched shapes resolve to `false` instead of erroring.
/// `Ne` is the negation of `Eq`, so an absent value is "not equal" to
/// anything. `NotContains` is only true when membership could be tested.
pub fn compare(lhs: Option<&Value>, op: CompareOp, rhs: &Value) -> bool {
    match op {
        CompareOp::Exists => lhs.is_some(),
        CompareOp::NotExists => lhs.is_none(),
        CompareOp::Eq => lhs.is_some_and(|v| v.loosely_equals(rhs)),
        CompareOp::Ne => !lhs.is_some_and(|v| v.loosely_equals(rhs)),
        CompareOp::Contains => lhs.and_then(|v| v.contains(rhs)) == Some(true),
        CompareOp::NotContains => lhs.and_then(|v| v.contains(rhs)) == Some(false),
        CompareOp::Gt | CompareOp::Lt | CompareOp::Ge | CompareOp::Le => {
            let (Some(a), Some(b)) = (lhs.and_then(Value::as_float), rhs.as_float()) else {
                return false;
            };
            match op {
                CompareOp::Gt => a > b,
                CompareOp::Lt => a < b,
                CompareOp::Ge => a >= b,
                _ => a <= b,
            }
        }
    }
}
