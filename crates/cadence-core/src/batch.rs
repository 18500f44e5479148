//! Results of a phase pass or scheduler tick

use crate::{ActionOutcome, DefId, EffectRequest, Placement, PromptTarget};

/// Something the host should know about but that did not stop evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Flag {
    /// Type mismatch or unresolvable reference in an action
    Anomaly { source: DefId, detail: String },
    /// A rule or timer referenced an actor that is not on the roster
    Orphan { source: DefId, detail: String },
}

impl Flag {
    pub fn source(&self) -> &DefId {
        match self {
            Flag::Anomaly { source, .. } | Flag::Orphan { source, .. } => source,
        }
    }
}

/// Why a rule or timer did not fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    ConditionsFailed,
    WrongPhase,
    /// Owner or action target is not on the roster
    Orphaned,
}

/// Per-rule or per-timer result of one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Fired,
    Skipped(SkipReason),
}

/// Everything one pass produced, in execution order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectBatch {
    /// Side effects for the host
    pub requests: Vec<EffectRequest>,
    /// Anomalies and orphans
    pub flags: Vec<Flag>,
    /// What happened to each rule or timer considered
    pub outcomes: Vec<(DefId, RuleOutcome)>,
}

impl EffectBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another batch into this one
    pub fn merge(&mut self, other: EffectBatch) {
        self.requests.extend(other.requests);
        self.flags.extend(other.flags);
        self.outcomes.extend(other.outcomes);
    }

    /// Record one action's outcome; returns the request if it produced one
    pub fn record(&mut self, source: &DefId, outcome: ActionOutcome) -> Option<&EffectRequest> {
        match outcome {
            ActionOutcome::Mutated => None,
            ActionOutcome::Effect(request) => {
                self.requests.push(request);
                self.requests.last()
            }
            ActionOutcome::Orphaned(detail) => {
                self.flags.push(Flag::Orphan {
                    source: source.clone(),
                    detail,
                });
                None
            }
            ActionOutcome::Anomaly(detail) => {
                self.flags.push(Flag::Anomaly {
                    source: source.clone(),
                    detail,
                });
                None
            }
        }
    }

    pub fn outcome(&self, id: &str) -> Option<RuleOutcome> {
        self.outcomes
            .iter()
            .find(|(def, _)| def.as_str() == id)
            .map(|(_, outcome)| *outcome)
    }

    pub fn fired(&self) -> impl Iterator<Item = &DefId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == RuleOutcome::Fired)
            .map(|(id, _)| id)
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.flags.is_empty()
    }

    /// Apply this batch's prompt injections for one target to `base`, in order
    ///
    /// Prepend and append join with a newline. Replace discards everything
    /// assembled so far.
    pub fn compose_prompt(&self, target: PromptTarget, base: &str) -> String {
        let mut text = base.to_string();
        for request in &self.requests {
            let EffectRequest::InjectPrompt {
                placement,
                target: injected_into,
                text: fragment,
                ..
            } = request
            else {
                continue;
            };
            if *injected_into != target {
                continue;
            }
            text = match placement {
                Placement::Replace => fragment.clone(),
                Placement::Prepend if text.is_empty() => fragment.clone(),
                Placement::Append if text.is_empty() => fragment.clone(),
                Placement::Prepend => format!("{}\n{}", fragment, text),
                Placement::Append => format!("{}\n{}", text, fragment),
            };
        }
        text
    }
}

/// Host-side consumer of finished batches
///
/// Handed each [`EffectBatch`] once, after the phase pass or tick that
/// produced it has completed.
pub trait EffectSink {
    fn consume(&mut self, batch: &EffectBatch);
}

impl EffectSink for Vec<EffectRequest> {
    fn consume(&mut self, batch: &EffectBatch) {
        self.extend(batch.requests.iter().cloned());
    }
}
