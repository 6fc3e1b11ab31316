use keel_canon::Digest;
use keel_token::Lane;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capability tags a step declares. The engine checks them generically
/// against the execution token before the handler runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requires {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_cap: Option<String>,
    #[serde(default)]
    pub irreversible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Declared latency; only its bucket is ever reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl Requires {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn io_scope(mut self, scope: impl Into<String>) -> Self {
        self.io_scope = Some(scope.into());
        self
    }

    pub fn net_cap(mut self, cap: impl Into<String>) -> Self {
        self.net_cap = Some(cap.into());
        self
    }

    pub fn irreversible(mut self) -> Self {
        self.irreversible = true;
        self
    }

    pub fn operator(mut self, operator_id: impl Into<String>) -> Self {
        self.operator_id = Some(operator_id.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }

    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

/// Declared cost of a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    pub units: u64,
    pub kind: String,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            units: 1,
            kind: "unit".into(),
        }
    }
}

/// One unit of planned work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectStep {
    pub step_id: String,
    pub effect_type: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub requires: Requires,
    #[serde(default)]
    pub cost_model: CostModel,
    #[serde(default)]
    pub expected_artifacts: Vec<String>,
}

impl EffectStep {
    pub fn new(step_id: impl Into<String>, effect_type: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            effect_type: effect_type.into(),
            args: Map::new(),
            requires: Requires::default(),
            cost_model: CostModel::default(),
            expected_artifacts: Vec::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn requires(mut self, requires: Requires) -> Self {
        self.requires = requires;
        self
    }

    pub fn cost(mut self, units: u64, kind: impl Into<String>) -> Self {
        self.cost_model = CostModel {
            units,
            kind: kind.into(),
        };
        self
    }

    pub fn expect_artifact(mut self, name: impl Into<String>) -> Self {
        self.expected_artifacts.push(name.into());
        self
    }

    /// Does this step engage the given lane?
    ///
    /// A step engages a lane when it declares the lane's capability tag or
    /// when its effect type carries the lane prefix.
    pub fn uses_lane(&self, lane: Lane) -> bool {
        self.lane_scope(lane).is_some() || self.has_lane_prefix(lane)
    }

    /// The scope or capability declared for a lane.
    pub fn lane_scope(&self, lane: Lane) -> Option<&str> {
        match lane {
            Lane::Io => self.requires.io_scope.as_deref(),
            Lane::Net => self.requires.net_cap.as_deref(),
        }
    }

    fn has_lane_prefix(&self, lane: Lane) -> bool {
        self.effect_type
            .strip_prefix(lane.effect_prefix())
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

/// Outcome of one step.
///
/// A refused result always carries a refusal type and at least one reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectResult {
    pub step_id: String,
    pub effect_type: String,
    pub ok: bool,
    pub refusal_type: Option<String>,
    pub refusal_reasons: Vec<String>,
    pub artifact_digests: Vec<Digest>,
}

impl EffectResult {
    pub fn ok(step: &EffectStep, artifact_digests: Vec<Digest>) -> Self {
        Self {
            step_id: step.step_id.clone(),
            effect_type: step.effect_type.clone(),
            ok: true,
            refusal_type: None,
            refusal_reasons: Vec::new(),
            artifact_digests,
        }
    }

    /// Build a refusal. An empty refusal type or reason list is replaced so
    /// the refusal invariant always holds.
    pub fn refused(
        step: &EffectStep,
        refusal_type: impl Into<String>,
        reasons: Vec<String>,
        artifact_digests: Vec<Digest>,
    ) -> Self {
        let mut refusal_type = refusal_type.into();
        if refusal_type.trim().is_empty() {
            refusal_type = "unspecified_refusal".into();
        }
        let mut refusal_reasons: Vec<String> = reasons
            .into_iter()
            .filter(|r| !r.trim().is_empty())
            .collect();
        if refusal_reasons.is_empty() {
            refusal_reasons.push("unspecified_refusal".into());
        }
        Self {
            step_id: step.step_id.clone(),
            effect_type: step.effect_type.clone(),
            ok: false,
            refusal_type: Some(refusal_type),
            refusal_reasons,
            artifact_digests,
        }
    }

    /// A refusal whose type is also its only reason.
    pub fn refused_with(step: &EffectStep, reason: &str, artifact_digests: Vec<Digest>) -> Self {
        Self::refused(step, reason, vec![reason.to_string()], artifact_digests)
    }
}
