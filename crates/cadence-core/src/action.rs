//! Actions fired by rules and timers
//!
//! Actions are the "write" side of the engine. `SetVariable` and `MoveActor`
//! mutate session state directly; the rest produce an [`EffectRequest`] for
//! the host to carry out. Nothing here renders text or plays media.

use crate::{ActorId, ConfigError, DefId, GameRng, Result, TurnFacts, Value, ValueMap, VarRef};
use crate::{VariableScope, VariableStore};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// An operation that combines a variable's current value with an operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ModifyOp {
    /// Replace with the operand
    #[default]
    Set,
    /// Numeric add, or string concatenation when the current value is a string
    Add,
    Sub,
    Mul,
    Div,
    /// Keep the smaller of current and operand
    Min,
    /// Keep the larger of current and operand
    Max,
    /// Push onto a list (created if absent) or extend a string
    Append,
    /// Flip a boolean; absent becomes `true`
    Toggle,
}

impl ModifyOp {
    /// Combine the current value with an operand
    ///
    /// Numeric operators treat an absent current value as zero. Returns a
    /// description of the mismatch when the shapes don't fit.
    pub fn apply(&self, current: Option<&Value>, operand: Value) -> std::result::Result<Value, String> {
        match self {
            ModifyOp::Set => Ok(operand),
            ModifyOp::Toggle => match current {
                None => Ok(Value::Bool(true)),
                Some(Value::Bool(b)) => Ok(Value::Bool(!b)),
                Some(other) => Err(format!("cannot toggle a {}", other.type_name())),
            },
            ModifyOp::Append => match current {
                None => Ok(Value::List(vec![operand])),
                Some(Value::List(items)) => {
                    let mut items = items.clone();
                    items.push(operand);
                    Ok(Value::List(items))
                }
                Some(Value::String(s)) => Ok(Value::String(format!("{}{}", s, operand.to_plain_string()))),
                Some(other) => Err(format!("cannot append to a {}", other.type_name())),
            },
            ModifyOp::Add => match current {
                Some(Value::String(s)) => Ok(Value::String(format!("{}{}", s, operand.to_plain_string()))),
                None if matches!(operand, Value::String(_)) => Ok(operand),
                _ => numeric(*self, current, &operand),
            },
            _ => numeric(*self, current, &operand),
        }
    }

    /// Operators that require a numeric operand
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ModifyOp::Sub | ModifyOp::Mul | ModifyOp::Div | ModifyOp::Min | ModifyOp::Max
        )
    }
}

fn numeric(op: ModifyOp, current: Option<&Value>, operand: &Value) -> std::result::Result<Value, String> {
    let current = current.cloned().unwrap_or(Value::Int(0));
    if let (Value::Int(a), Value::Int(b)) = (&current, operand) {
        let (a, b) = (*a, *b);
        let exact = match op {
            ModifyOp::Add => a.checked_add(b),
            ModifyOp::Sub => a.checked_sub(b),
            ModifyOp::Mul => a.checked_mul(b),
            ModifyOp::Div if b == 0 => return Err("division by zero".to_string()),
            ModifyOp::Div if a.checked_rem(b) == Some(0) => a.checked_div(b),
            ModifyOp::Min => Some(a.min(b)),
            ModifyOp::Max => Some(a.max(b)),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::Int(result));
        }
    }

    let (Some(a), Some(b)) = (current.as_float(), operand.as_float()) else {
        return Err(format!(
            "{:?} needs numbers, got {} and {}",
            op,
            current.type_name(),
            operand.type_name()
        ));
    };
    let result = match op {
        ModifyOp::Add => a + b,
        ModifyOp::Sub => a - b,
        ModifyOp::Mul => a * b,
        ModifyOp::Div if b == 0.0 => return Err("division by zero".to_string()),
        ModifyOp::Div => a / b,
        ModifyOp::Min => a.min(b),
        ModifyOp::Max => a.max(b),
        _ => return Err(format!("{:?} is not numeric", op)),
    };
    Ok(Value::Float(result))
}

/// Where a `SetVariable` gets its operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Literal(Value),
    /// Read another variable from the live store
    Variable(VarRef),
    /// Uniform integer in `[min, max]` from the session RNG
    RandomInt { min: i64, max: i64 },
}

impl Default for Operand {
    fn default() -> Self {
        Operand::Literal(Value::Null)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Operand {
            fn from(value: $ty) -> Self {
                Operand::Literal(value.into())
            }
        })*
    };
}

literal_operand!(bool, i64, i32, f64, String, &str);

/// How an injected fragment combines with the text it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Placement {
    Prepend,
    #[default]
    Append,
    Replace,
}

/// Which text an injected fragment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PromptTarget {
    #[default]
    UserMessage,
    GeneratedReply,
    FullHistory,
}

/// One step of a rule or timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    InjectPrompt {
        #[serde(default)]
        placement: Placement,
        #[serde(default)]
        target: PromptTarget,
        #[serde(default)]
        tag: String,
        /// May contain `{{name}}` placeholders for global variables
        text: String,
    },
    SetVariable {
        var: VarRef,
        #[serde(default)]
        op: ModifyOp,
        #[serde(default)]
        value: Operand,
    },
    MoveActor {
        /// `None` moves the current character
        #[serde(default)]
        actor: Option<ActorId>,
        location: String,
    },
    TriggerEvent {
        event: DefId,
        #[serde(default)]
        payload: ValueMap,
    },
    ScreenEffect {
        effect: String,
        #[serde(default)]
        params: ValueMap,
    },
    PlaySound {
        sound: String,
    },
}

/// A side effect for the host to carry out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EffectRequest {
    InjectPrompt {
        source: DefId,
        placement: Placement,
        target: PromptTarget,
        tag: String,
        text: String,
    },
    TriggerEvent {
        source: DefId,
        event: DefId,
        payload: ValueMap,
    },
    ScreenEffect {
        source: DefId,
        effect: String,
        params: ValueMap,
    },
    PlaySound {
        source: DefId,
        sound: String,
    },
}

impl EffectRequest {
    /// The rule or timer that produced this request
    pub fn source(&self) -> &DefId {
        match self {
            EffectRequest::InjectPrompt { source, .. }
            | EffectRequest::TriggerEvent { source, .. }
            | EffectRequest::ScreenEffect { source, .. }
            | EffectRequest::PlaySound { source, .. } => source,
        }
    }
}

/// What happened when one action ran
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Session state changed; nothing for the host
    Mutated,
    /// The host should carry this out
    Effect(EffectRequest),
    /// The action referenced an actor that is not on the roster
    Orphaned(String),
    /// Type mismatch or unresolvable reference; nothing changed
    Anomaly(String),
}

/// Mutable session state an action may touch
pub struct ExecContext<'a> {
    pub variables: &'a mut VariableStore,
    pub locations: &'a mut IndexMap<ActorId, String>,
    pub roster: &'a IndexSet<ActorId>,
    pub rng: &'a mut GameRng,
    pub facts: &'a TurnFacts,
    /// Rule or timer the action belongs to
    pub source: &'a DefId,
}

impl Action {
    pub fn inject(placement: Placement, target: PromptTarget, text: impl Into<String>) -> Self {
        Action::InjectPrompt {
            placement,
            target,
            tag: String::new(),
            text: text.into(),
        }
    }

    pub fn set(var: VarRef, value: impl Into<Operand>) -> Self {
        Action::SetVariable {
            var,
            op: ModifyOp::Set,
            value: value.into(),
        }
    }

    pub fn modify(var: VarRef, op: ModifyOp, value: impl Into<Operand>) -> Self {
        Action::SetVariable {
            var,
            op,
            value: value.into(),
        }
    }

    pub fn move_actor(actor: impl Into<ActorId>, location: impl Into<String>) -> Self {
        Action::MoveActor {
            actor: Some(actor.into()),
            location: location.into(),
        }
    }

    pub fn trigger(event: impl Into<DefId>) -> Self {
        Action::TriggerEvent {
            event: event.into(),
            payload: ValueMap::new(),
        }
    }

    pub fn screen(effect: impl Into<String>) -> Self {
        Action::ScreenEffect {
            effect: effect.into(),
            params: ValueMap::new(),
        }
    }

    pub fn sound(sound: impl Into<String>) -> Self {
        Action::PlaySound {
            sound: sound.into(),
        }
    }

    /// Execute this action against live session state
    pub fn apply(&self, ctx: &mut ExecContext<'_>) -> ActionOutcome {
        let source = ctx.source.clone();
        match self {
            Action::InjectPrompt {
                placement,
                target,
                tag,
                text,
            } => ActionOutcome::Effect(EffectRequest::InjectPrompt {
                source,
                placement: *placement,
                target: *target,
                tag: tag.clone(),
                text: render_template(text, ctx.variables),
            }),
            Action::SetVariable { var, op, value } => set_variable(ctx, var, *op, value),
            Action::MoveActor { actor, location } => {
                let Some(actor) = actor.clone().or_else(|| ctx.facts.character.clone()) else {
                    return ActionOutcome::Anomaly("no actor to move this turn".to_string());
                };
                if !ctx.roster.contains(&actor) {
                    return ActionOutcome::Orphaned(format!("{} is not on the roster", actor));
                }
                ctx.locations.insert(actor, location.clone());
                ActionOutcome::Mutated
            }
            Action::TriggerEvent { event, payload } => {
                ActionOutcome::Effect(EffectRequest::TriggerEvent {
                    source,
                    event: event.clone(),
                    payload: payload.clone(),
                })
            }
            Action::ScreenEffect { effect, params } => {
                ActionOutcome::Effect(EffectRequest::ScreenEffect {
                    source,
                    effect: effect.clone(),
                    params: params.clone(),
                })
            }
            Action::PlaySound { sound } => ActionOutcome::Effect(EffectRequest::PlaySound {
                source,
                sound: sound.clone(),
            }),
        }
    }

    /// Describe the off-roster actor this action would touch, if any
    ///
    /// Character and player writes and actor moves need their target on the
    /// roster. Location owners are free-form.
    pub fn orphan(&self, roster: &IndexSet<ActorId>, facts: &TurnFacts) -> Option<String> {
        match self {
            Action::SetVariable { var, .. }
                if matches!(var.scope, VariableScope::Character | VariableScope::Player) =>
            {
                let owner = var.owner_key(facts)?;
                (!roster.contains(&ActorId::new(owner.as_str())))
                    .then(|| format!("{} owner '{}' is not on the roster", var, owner))
            }
            Action::MoveActor { actor, .. } => {
                let actor = actor.clone().or_else(|| facts.character.clone())?;
                (!roster.contains(&actor)).then(|| format!("{} is not on the roster", actor))
            }
            _ => None,
        }
    }

    /// Static checks run at load time
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Action::InjectPrompt {
                placement, text, ..
            } => {
                if *placement != Placement::Replace && text.trim().is_empty() {
                    return Err("prompt text is empty".to_string());
                }
                Ok(())
            }
            Action::SetVariable { var, op, value } => {
                if var.name.trim().is_empty() {
                    return Err("variable name is empty".to_string());
                }
                if var.scope == VariableScope::Global && var.owner.is_some() {
                    return Err(format!("global variable {} cannot name an owner", var.name));
                }
                match value {
                    Operand::Literal(literal) if op.is_numeric() && !literal.is_number() => Err(
                        format!("{:?} needs a numeric operand, got {}", op, literal.type_name()),
                    ),
                    Operand::RandomInt { min, max } if min > max => {
                        Err(format!("random range {}..={} is inverted", min, max))
                    }
                    Operand::Variable(source) if source.name.trim().is_empty() => {
                        Err("operand variable name is empty".to_string())
                    }
                    _ => Ok(()),
                }
            }
            Action::MoveActor { location, .. } => non_blank(location, "destination"),
            Action::TriggerEvent { event, .. } => non_blank(event.as_str(), "event id"),
            Action::ScreenEffect { effect, .. } => non_blank(effect, "screen effect id"),
            Action::PlaySound { sound } => non_blank(sound, "sound id"),
        }
    }
}

fn non_blank(text: &str, what: &str) -> std::result::Result<(), String> {
    if text.trim().is_empty() {
        Err(format!("{} is empty", what))
    } else {
        Ok(())
    }
}

fn set_variable(ctx: &mut ExecContext<'_>, var: &VarRef, op: ModifyOp, value: &Operand) -> ActionOutcome {
    let Some(owner) = var.owner_key(ctx.facts) else {
        return ActionOutcome::Anomaly(format!("{} has no owner this turn", var));
    };
    if matches!(var.scope, VariableScope::Character | VariableScope::Player)
        && !ctx.roster.contains(&ActorId::new(owner.as_str()))
    {
        return ActionOutcome::Orphaned(format!("{} owner '{}' is not on the roster", var, owner));
    }

    let operand = match value {
        Operand::Literal(literal) => literal.clone(),
        Operand::Variable(source) => match source.read(ctx.variables, ctx.facts) {
            Some(found) => found.clone(),
            None => return ActionOutcome::Anomaly(format!("operand {} is not set", source)),
        },
        Operand::RandomInt { min, max } => Value::Int(ctx.rng.range_i64(*min, *max)),
    };

    let current = ctx.variables.get(var.scope, &owner, &var.name);
    match op.apply(current, operand) {
        Ok(next) => {
            ctx.variables.set(var.scope, &owner, var.name.clone(), next);
            ActionOutcome::Mutated
        }
        Err(reason) => ActionOutcome::Anomaly(format!("{}: {}", var, reason)),
    }
}

/// Replace `{{name}}` with the global variable `name`; unknown names stay verbatim
pub fn render_template(text: &str, variables: &VariableStore) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);
        let key = rest[open + 2..open + 2 + close].trim();
        match variables.get_global(key) {
            Some(value) => out.push_str(&value.to_plain_string()),
            None => out.push_str(&rest[open..open + 4 + close]),
        }
        rest = &rest[open + 4 + close..];
    }
    out.push_str(rest);
    out
}

/// Validate an ordered action list, reporting the first bad index
pub fn validate_actions(actions: &[Action]) -> Result<()> {
    for (index, action) in actions.iter().enumerate() {
        action
            .validate()
            .map_err(|reason| ConfigError::MalformedAction { index, reason })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        variables: VariableStore,
        locations: IndexMap<ActorId, String>,
        roster: IndexSet<ActorId>,
        rng: GameRng,
        facts: TurnFacts,
        source: DefId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut roster = IndexSet::new();
            roster.insert(ActorId::new("Mira"));
            Self {
                variables: VariableStore::new(),
                locations: IndexMap::new(),
                roster,
                rng: GameRng::new(42),
                facts: TurnFacts::new().with_character("Mira"),
                source: DefId::new("test_rule"),
            }
        }

        fn run(&mut self, action: &Action) -> ActionOutcome {
            let mut ctx = ExecContext {
                variables: &mut self.variables,
                locations: &mut self.locations,
                roster: &self.roster,
                rng: &mut self.rng,
                facts: &self.facts,
                source: &self.source,
            };
            action.apply(&mut ctx)
        }
    }

    #[test]
    fn test_modify_op() {
        let ten = Value::Int(10);
        assert_eq!(ModifyOp::Set.apply(Some(&ten), Value::Int(5)), Ok(Value::Int(5)));
        assert_eq!(ModifyOp::Add.apply(Some(&ten), Value::Int(5)), Ok(Value::Int(15)));
        assert_eq!(ModifyOp::Sub.apply(Some(&ten), Value::Int(5)), Ok(Value::Int(5)));
        assert_eq!(ModifyOp::Mul.apply(Some(&ten), Value::Int(5)), Ok(Value::Int(50)));
        assert_eq!(ModifyOp::Div.apply(Some(&ten), Value::Int(4)), Ok(Value::Float(2.5)));
        assert_eq!(ModifyOp::Min.apply(Some(&ten), Value::Int(5)), Ok(Value::Int(5)));
        assert_eq!(ModifyOp::Max.apply(Some(&ten), Value::Float(12.5)), Ok(Value::Float(12.5)));
        assert_eq!(ModifyOp::Add.apply(None, Value::Int(1)), Ok(Value::Int(1)));
        assert!(ModifyOp::Div.apply(Some(&ten), Value::Int(0)).is_err());
        assert!(ModifyOp::Sub.apply(Some(&Value::from("x")), Value::Int(1)).is_err());
    }

    #[test]
    fn test_div_overflow_falls_back_to_float() {
        let min = Value::Int(i64::MIN);
        assert_eq!(
            ModifyOp::Div.apply(Some(&min), Value::Int(-1)),
            Ok(Value::Float(-(i64::MIN as f64)))
        );
        assert_eq!(ModifyOp::Div.apply(Some(&min), Value::Int(1)), Ok(min.clone()));
    }

    #[test]
    fn test_string_and_list_ops() {
        let greeting = Value::from("Hello");
        assert_eq!(
            ModifyOp::Add.apply(Some(&greeting), ", traveler".into()),
            Ok(Value::from("Hello, traveler"))
        );
        assert_eq!(
            ModifyOp::Append.apply(None, "rope".into()),
            Ok(Value::from(vec!["rope"]))
        );
        assert_eq!(ModifyOp::Toggle.apply(None, Value::Null), Ok(Value::Bool(true)));
        assert_eq!(
            ModifyOp::Toggle.apply(Some(&Value::Bool(true)), Value::Null),
            Ok(Value::Bool(false))
        );
    }

    #[test]
    fn test_set_variable_counter_is_not_idempotent() {
        let mut fx = Fixture::new();
        let bump = Action::modify(VarRef::global("visits"), ModifyOp::Add, 1i64);
        assert_eq!(fx.run(&bump), ActionOutcome::Mutated);
        assert_eq!(fx.run(&bump), ActionOutcome::Mutated);
        assert_eq!(fx.variables.get_global("visits"), Some(&Value::Int(2)));

        let assign = Action::set(VarRef::global("mood"), "wary");
        fx.run(&assign);
        fx.run(&assign);
        assert_eq!(fx.variables.get_global("mood"), Some(&Value::from("wary")));
    }

    #[test]
    fn test_variable_operand_reads_live_store() {
        let mut fx = Fixture::new();
        fx.run(&Action::set(VarRef::global("a"), 4i64));
        let copy = Action::set(VarRef::global("b"), Operand::Variable(VarRef::global("a")));
        assert_eq!(fx.run(&copy), ActionOutcome::Mutated);
        assert_eq!(fx.variables.get_global("b"), Some(&Value::Int(4)));

        let missing = Action::set(VarRef::global("c"), Operand::Variable(VarRef::global("nope")));
        assert!(matches!(fx.run(&missing), ActionOutcome::Anomaly(_)));
        assert_eq!(fx.variables.get_global("c"), None);
    }

    #[test]
    fn test_random_operand_in_range() {
        let mut fx = Fixture::new();
        let roll = Action::set(VarRef::global("roll"), Operand::RandomInt { min: 1, max: 6 });
        for _ in 0..50 {
            fx.run(&roll);
            let value = fx.variables.get_global("roll").and_then(Value::as_int).unwrap();
            assert!((1..=6).contains(&value));
        }
    }

    #[test]
    fn test_orphaned_owner_is_not_written() {
        let mut fx = Fixture::new();
        let var = VarRef::owned(VariableScope::Character, "Ghost", "hp");
        let outcome = fx.run(&Action::set(var, 3i64));
        assert!(matches!(outcome, ActionOutcome::Orphaned(_)));
        assert_eq!(fx.variables.get(VariableScope::Character, "Ghost", "hp"), None);

        let current = VarRef::current(VariableScope::Character, "hp");
        assert_eq!(fx.run(&Action::set(current, 3i64)), ActionOutcome::Mutated);
        assert_eq!(fx.variables.get(VariableScope::Character, "Mira", "hp"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_move_actor() {
        let mut fx = Fixture::new();
        let walk = Action::MoveActor {
            actor: None,
            location: "Cellar".into(),
        };
        assert_eq!(fx.run(&walk), ActionOutcome::Mutated);
        assert_eq!(fx.locations.get(&ActorId::new("Mira")).map(String::as_str), Some("Cellar"));

        let ghost = Action::move_actor("Ghost", "Attic");
        assert!(matches!(fx.run(&ghost), ActionOutcome::Orphaned(_)));
    }

    #[test]
    fn test_orphan_detection() {
        let fx = Fixture::new();
        let ghost_hp = Action::set(VarRef::owned(VariableScope::Character, "Ghost", "hp"), 1i64);
        let mira_hp = Action::set(VarRef::current(VariableScope::Character, "hp"), 1i64);
        let cellar = Action::set(VarRef::owned(VariableScope::Location, "Cellar", "lit"), true);

        assert!(ghost_hp.orphan(&fx.roster, &fx.facts).is_some());
        assert_eq!(mira_hp.orphan(&fx.roster, &fx.facts), None);
        assert_eq!(cellar.orphan(&fx.roster, &fx.facts), None);
        assert!(Action::move_actor("Ghost", "Attic").orphan(&fx.roster, &fx.facts).is_some());
        assert_eq!(Action::sound("bell").orphan(&fx.roster, &fx.facts), None);
    }

    #[test]
    fn test_effect_actions_carry_source() {
        let mut fx = Fixture::new();
        fx.variables.set_global("weather", "rain");
        let inject = Action::inject(Placement::Append, PromptTarget::UserMessage, "It is {{weather}}. {{unknown}}");

        match fx.run(&inject) {
            ActionOutcome::Effect(EffectRequest::InjectPrompt { source, text, .. }) => {
                assert_eq!(source.as_str(), "test_rule");
                assert_eq!(text, "It is rain. {{unknown}}");
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        match fx.run(&Action::sound("thunder")) {
            ActionOutcome::Effect(request) => assert_eq!(request.source().as_str(), "test_rule"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        assert!(Action::inject(Placement::Append, PromptTarget::UserMessage, " ")
            .validate()
            .is_err());
        assert!(Action::inject(Placement::Replace, PromptTarget::UserMessage, "")
            .validate()
            .is_ok());
        assert!(Action::modify(VarRef::global("x"), ModifyOp::Mul, "two")
            .validate()
            .is_err());
        assert!(Action::set(VarRef::global("x"), Operand::RandomInt { min: 5, max: 1 })
            .validate()
            .is_err());

        let actions = vec![Action::sound("bell"), Action::trigger("")];
        assert!(matches!(
            validate_actions(&actions),
            Err(ConfigError::MalformedAction { index: 1, .. })
        ));
    }
}
