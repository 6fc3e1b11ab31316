//! Token gates evaluated from a step's `requires` tags before dispatch.
//!
//! Gates run in a fixed order and the first refusal wins.

use keel_effects::{EffectContext, EffectStep};
use keel_registry::LoadedRegistry;
use keel_token::{Lane, DEFAULT_NONCE_POLICY};

/// What a gate may look at.
pub struct GateInput<'a> {
    pub step: &'a EffectStep,
    pub index: usize,
    pub ctx: &'a EffectContext,
    /// Present when the run enforces the operator registry.
    pub registry: Option<&'a LoadedRegistry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    Refuse { refusal_type: String, reason: String },
}

impl GateOutcome {
    fn refuse(refusal_type: &str, reason: impl Into<String>) -> Self {
        Self::Refuse {
            refusal_type: refusal_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Refusals whose reason doubles as their type.
    fn named(reason: String) -> Self {
        Self::Refuse {
            refusal_type: reason.clone(),
            reason,
        }
    }
}

pub trait StepGate: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, input: &GateInput<'_>) -> GateOutcome;
}

pub struct BackendGate;

impl StepGate for BackendGate {
    fn name(&self) -> &'static str {
        "backend"
    }

    fn evaluate(&self, input: &GateInput<'_>) -> GateOutcome {
        match input.step.requires.backend.as_deref() {
            Some(backend) if !input.ctx.token.permits_backend(backend) => GateOutcome::refuse(
                "backend_not_permitted",
                format!("backend not permitted: {}", backend.trim().to_ascii_uppercase()),
            ),
            _ => GateOutcome::Pass,
        }
    }
}

pub struct BudgetGate;

impl StepGate for BudgetGate {
    fn name(&self) -> &'static str {
        "budget"
    }

    fn evaluate(&self, input: &GateInput<'_>) -> GateOutcome {
        if input.index as u64 >= input.ctx.token.budget_steps {
            GateOutcome::named("budget_steps_exceeded".into())
        } else {
            GateOutcome::Pass
        }
    }
}

/// Scope, endpoint, call budget, timeout and nonce checks for one lane.
pub struct LaneGate {
    pub lane: Lane,
}

impl LaneGate {
    fn reason(&self, check: &str) -> String {
        // The IO endpoint refusal predates the lane prefix convention.
        if self.lane == Lane::Io && check == "EndpointNotAllowed" {
            return check.to_string();
        }
        format!("{}{}", self.lane.reason_prefix(), check)
    }
}

impl StepGate for LaneGate {
    fn name(&self) -> &'static str {
        match self.lane {
            Lane::Io => "io",
            Lane::Net => "net",
        }
    }

    fn evaluate(&self, input: &GateInput<'_>) -> GateOutcome {
        let step = input.step;
        if !step.uses_lane(self.lane) {
            return GateOutcome::Pass;
        }
        let rules = input.ctx.token.lane(self.lane);

        let granted = rules.allowed
            && step
                .lane_scope(self.lane)
                .is_some_and(|scope| rules.grants_scope(scope));
        if !granted {
            return GateOutcome::named(self.reason("PermissionDenied"));
        }

        let endpoint = step.requires.endpoint.as_deref().or_else(|| {
            step.args
                .get("endpoint")
                .and_then(|v| v.as_str())
                .filter(|e| !e.trim().is_empty())
        });
        if let Some(endpoint) = endpoint {
            if !rules.allows_endpoint(endpoint) {
                return GateOutcome::named(self.reason("EndpointNotAllowed"));
            }
        }

        if input.ctx.lane_calls(self.lane) >= rules.budget_calls {
            return GateOutcome::named(self.reason("BudgetExceeded"));
        }

        if step
            .requires
            .latency_ms
            .is_some_and(|ms| ms > rules.timeout_ms)
        {
            return GateOutcome::named(self.reason("Timeout"));
        }

        let nonce_ok = match step.requires.nonce.as_deref() {
            // The handler derives the nonce itself when none is declared.
            None => rules.nonce_policy == DEFAULT_NONCE_POLICY,
            Some(nonce) if rules.nonce_policy == DEFAULT_NONCE_POLICY => {
                nonce == format!("nonce-{}", input.index)
            }
            Some(nonce) => !nonce.trim().is_empty(),
        };
        if !nonce_ok {
            return GateOutcome::named(self.reason("NonceInvalid"));
        }
        GateOutcome::Pass
    }
}

pub struct RegistryGate;

impl StepGate for RegistryGate {
    fn name(&self) -> &'static str {
        "operator_registry"
    }

    fn evaluate(&self, input: &GateInput<'_>) -> GateOutcome {
        match (input.registry, input.step.requires.operator_id.as_deref()) {
            (Some(registry), Some(op)) if !registry.contains(op) => GateOutcome::refuse(
                "operator_not_in_registry",
                format!("operator not in registry: {op}"),
            ),
            _ => GateOutcome::Pass,
        }
    }
}

/// Irreversible steps need admissible delta-S evidence when the token
/// requires it.
pub struct DeltaSGate;

impl StepGate for DeltaSGate {
    fn name(&self) -> &'static str {
        "delta_s"
    }

    fn evaluate(&self, input: &GateInput<'_>) -> GateOutcome {
        let token = &input.ctx.token;
        if !input.step.requires.irreversible || !token.collapse_requires_delta_s {
            return GateOutcome::Pass;
        }
        match &input.ctx.delta_s {
            None => GateOutcome::named("delta_s_evidence_missing".into()),
            Some(e) if !token.delta_s_policy.admits(e.delta_s) => {
                GateOutcome::named("delta_s_inadmissible".into())
            }
            Some(_) => GateOutcome::Pass,
        }
    }
}

/// Backend, budget, IO, NET, operator registry, delta-S.
pub fn default_gates() -> Vec<Box<dyn StepGate>> {
    vec![
        Box::new(BackendGate),
        Box::new(BudgetGate),
        Box::new(LaneGate { lane: Lane::Io }),
        Box::new(LaneGate { lane: Lane::Net }),
        Box::new(RegistryGate),
        Box::new(DeltaSGate),
    ]
}
