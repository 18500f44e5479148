//! Cadence Core - rule and timer engine for narrative sessions
//!
//! This crate decides which deterministic state changes and context
//! injections happen in a narrative game. It never writes prose:
//! - Scoped variables (`VariableStore`, `Value`)
//! - A dual real/fiction clock (`GameClock`)
//! - Conditions evaluated against a per-pass `Snapshot`
//! - Actions that mutate state or request effects from the host
//! - Turn-phase rules (`RuleSet`) and recurring timers (`Scheduler`)
//! - Per-observer visibility of narrative events
//!
//! ## Usage
//!
//! ```
//! use cadence_core::{Action, ClockConfig, Engine, Phase, Rule, Session, TurnFacts, VarRef};
//!
//! let mut session = Session::new(&ClockConfig::default()).unwrap();
//! session.replace_rules(vec![
//!     Rule::new("count_turns", Phase::BeforeSend)
//!         .then(Action::modify(VarRef::global("turns"), cadence_core::ModifyOp::Add, 1i64)),
//! ]);
//!
//! let batch = Engine::new().run_phase(&mut session, Phase::BeforeSend, &TurnFacts::new(), None);
//! assert_eq!(batch.fired().count(), 1);
//! ```

pub mod action;
mod batch;
pub mod clock;
mod condition;
mod engine;
mod error;
mod facts;
mod identity;
mod rng;
mod rule;
mod session;
mod snapshot;
pub mod timer;
mod value;
pub mod variables;
pub mod visibility;

pub use action::{
    Action, ActionOutcome, EffectRequest, ExecContext, ModifyOp, Operand, Placement, PromptTarget,
};
pub use batch::{EffectBatch, EffectSink, Flag, RuleOutcome, SkipReason};
pub use clock::{ClockConfig, FictionReading, GameClock, TimeMode};
pub use condition::{Condition, ConditionSet, TimeField};
pub use engine::Engine;
pub use error::{ConfigError, Rejection, Result};
pub use facts::{DialogueProbe, KeywordProbe, TurnFacts};
pub use identity::{ActorId, DefId};
pub use rng::GameRng;
pub use rule::{Phase, Rule, RuleSet};
pub use session::{Checkpoint, Session};
pub use snapshot::Snapshot;
pub use timer::{Interval, Scheduler, TimerCheckpoint, TimerRule, TimerStatus};
pub use value::{Value, ValueMap};
pub use variables::{compare, CompareOp, VarRef, VariableScope, VariableStore};
pub use visibility::{
    is_visible, visible_events, Criterion, NarrativeEvent, VariableTest, Visibility, VisibilityMode,
};
