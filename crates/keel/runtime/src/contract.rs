use std::collections::BTreeSet;

use keel_effects::{EffectContext, EffectResult, EffectStep};
use serde::{Deserialize, Serialize};

/// Outcome of a contract hook.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCheck {
    pub ok: bool,
    pub reasons: Vec<String>,
}

impl ContractCheck {
    pub fn pass() -> Self {
        Self {
            ok: true,
            reasons: Vec::new(),
        }
    }

    /// Passes iff `reasons` is empty.
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            ok: reasons.is_empty(),
            reasons,
        }
    }
}

/// Caller-supplied policy consulted around every step.
pub trait Contract: Send + Sync {
    fn preconditions(&self, step: &EffectStep, ctx: &EffectContext) -> ContractCheck;

    fn postconditions(
        &self,
        step: &EffectStep,
        _ctx: &EffectContext,
        result: &EffectResult,
    ) -> ContractCheck {
        default_postconditions(step, result)
    }
}

/// A result must belong to its step, and an `ok` result must not carry
/// refusal reasons.
pub fn default_postconditions(step: &EffectStep, result: &EffectResult) -> ContractCheck {
    let mut reasons = Vec::new();
    if result.step_id != step.step_id {
        reasons.push(format!(
            "postcondition failed: result for {} reported as {}",
            step.step_id, result.step_id
        ));
    }
    if result.ok && !result.refusal_reasons.is_empty() {
        reasons.push(format!(
            "postcondition failed: {} returned ok with refusal reasons",
            step.step_id
        ));
    }
    ContractCheck::from_reasons(reasons)
}

/// Step allowlist plus an optional backend requirement.
///
/// An empty `allowed_steps` places no restriction on step ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContract {
    #[serde(default)]
    pub allowed_steps: BTreeSet<String>,
    #[serde(default)]
    pub required_backend: Option<String>,
}

impl ExecutionContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_steps.extend(steps.into_iter().map(Into::into));
        self
    }

    pub fn require_backend(mut self, backend: impl Into<String>) -> Self {
        self.required_backend = Some(backend.into());
        self
    }
}

impl Contract for ExecutionContract {
    fn preconditions(&self, step: &EffectStep, _ctx: &EffectContext) -> ContractCheck {
        let mut reasons = Vec::new();
        if !self.allowed_steps.is_empty() && !self.allowed_steps.contains(&step.step_id) {
            reasons.push(format!("step not allowed: {}", step.step_id));
        }
        // Steps without a declared backend are not subject to the requirement.
        if let (Some(expected), Some(actual)) = (&self.required_backend, &step.requires.backend) {
            if !expected.trim().eq_ignore_ascii_case(actual.trim()) {
                reasons.push(format!(
                    "required backend mismatch: expected {}, got {}",
                    expected.trim().to_ascii_uppercase(),
                    actual.trim().to_ascii_uppercase()
                ));
            }
        }
        ContractCheck::from_reasons(reasons)
    }
}
