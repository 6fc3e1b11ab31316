use keel_canon::{digest_value, Digest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::coerce::{as_bool, as_string, as_string_list, as_u64, normalize_list};
use crate::policy::{DeltaSPolicy, IoPolicy, Lane, LaneRules, NetPolicy};

/// Step budget used when the caller does not state one.
pub const DEFAULT_BUDGET_STEPS: u64 = 64;
/// The only determinism mode the kernel currently runs under.
pub const DEFAULT_DETERMINISM_MODE: &str = "strict";

/// Caller-facing input to [`ExecutionToken::build`].
///
/// Every field is optional; absent fields take the fail-closed defaults.
#[derive(Clone, Debug, Default)]
pub struct TokenSpec {
    pub allowed_backends: Vec<String>,
    pub budget_steps: Option<u64>,
    pub determinism_mode: Option<String>,
    pub io_policy: Option<IoPolicy>,
    pub net_policy: Option<NetPolicy>,
    pub delta_s_policy: Option<DeltaSPolicy>,
    pub collapse_requires_delta_s: Option<bool>,
}

impl TokenSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_backends = backends.into_iter().map(Into::into).collect();
        self
    }

    pub fn budget_steps(mut self, budget: u64) -> Self {
        self.budget_steps = Some(budget);
        self
    }

    pub fn determinism_mode(mut self, mode: impl Into<String>) -> Self {
        self.determinism_mode = Some(mode.into());
        self
    }

    pub fn io_policy(mut self, policy: IoPolicy) -> Self {
        self.io_policy = Some(policy);
        self
    }

    pub fn net_policy(mut self, policy: NetPolicy) -> Self {
        self.net_policy = Some(policy);
        self
    }

    pub fn delta_s_policy(mut self, policy: DeltaSPolicy) -> Self {
        self.delta_s_policy = Some(policy);
        self
    }

    pub fn collapse_requires_delta_s(mut self, required: bool) -> Self {
        self.collapse_requires_delta_s = Some(required);
        self
    }
}

/// Immutable, content-addressed capability and policy descriptor.
///
/// `token_id` is the digest of the canonical JSON of every other field.
/// The token is built once per plan and never mutated; the runtime only
/// reads it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionToken {
    pub token_id: Digest,
    pub allowed_backends: Vec<String>,
    pub budget_steps: u64,
    pub determinism_mode: String,
    pub io_policy: IoPolicy,
    pub net_policy: NetPolicy,
    pub delta_s_policy: DeltaSPolicy,
    pub collapse_requires_delta_s: bool,
}

/// The hashed part of a token.
#[derive(Serialize)]
struct TokenCore<'a> {
    allowed_backends: &'a [String],
    budget_steps: u64,
    determinism_mode: &'a str,
    io_policy: &'a IoPolicy,
    net_policy: &'a NetPolicy,
    delta_s_policy: &'a DeltaSPolicy,
    collapse_requires_delta_s: bool,
}

impl ExecutionToken {
    /// Normalize the inputs and compute the token id. Never fails.
    pub fn build(spec: TokenSpec) -> Self {
        let allowed_backends = normalize_list(
            spec.allowed_backends
                .into_iter()
                .map(|b| b.trim().to_ascii_uppercase()),
        );
        let determinism_mode = spec
            .determinism_mode
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_DETERMINISM_MODE.to_string());

        let mut token = Self {
            token_id: Digest::of_bytes(b""),
            allowed_backends,
            budget_steps: spec.budget_steps.unwrap_or(DEFAULT_BUDGET_STEPS),
            determinism_mode,
            io_policy: spec.io_policy.unwrap_or_default().normalized(),
            net_policy: spec.net_policy.unwrap_or_default().normalized(),
            delta_s_policy: spec.delta_s_policy.unwrap_or_default().normalized(),
            collapse_requires_delta_s: spec.collapse_requires_delta_s.unwrap_or(true),
        };
        token.token_id = token.compute_id();
        debug!(token_id = %token.token_id, "Execution token built");
        token
    }

    /// Reconstruct a token from a persisted document.
    ///
    /// Malformed fields fall back to defaults. When `token_id` is absent the
    /// id is recomputed through [`ExecutionToken::build`], so hand-authored
    /// fixtures hash the same way as tokens built in-process.
    pub fn from_value(data: &Value) -> Self {
        let empty = Map::new();
        let map = data.as_object().unwrap_or(&empty);

        let spec = TokenSpec {
            allowed_backends: as_string_list(map.get("allowed_backends")),
            budget_steps: Some(as_u64(map.get("budget_steps"), DEFAULT_BUDGET_STEPS)),
            determinism_mode: Some(as_string(
                map.get("determinism_mode"),
                DEFAULT_DETERMINISM_MODE,
            )),
            io_policy: Some(IoPolicy::from_map(object(map, "io_policy", &empty))),
            net_policy: Some(NetPolicy::from_map(object(map, "net_policy", &empty))),
            delta_s_policy: Some(DeltaSPolicy::from_map(object(map, "delta_s_policy", &empty))),
            collapse_requires_delta_s: Some(as_bool(map.get("collapse_requires_delta_s"), true)),
        };
        let mut token = Self::build(spec);

        if let Some(persisted) = map.get("token_id").and_then(Value::as_str) {
            match Digest::parse(persisted) {
                Ok(id) => token.token_id = id,
                Err(_) => debug!(persisted, "Ignoring malformed persisted token_id"),
            }
        }
        token
    }

    fn compute_id(&self) -> Digest {
        let core = TokenCore {
            allowed_backends: &self.allowed_backends,
            budget_steps: self.budget_steps,
            determinism_mode: &self.determinism_mode,
            io_policy: &self.io_policy,
            net_policy: &self.net_policy,
            delta_s_policy: &self.delta_s_policy,
            collapse_requires_delta_s: self.collapse_requires_delta_s,
        };
        digest_value(&serde_json::to_value(&core).unwrap_or_default())
    }

    /// Does the stored id match the token's contents?
    pub fn verify_id(&self) -> bool {
        self.token_id == self.compute_id()
    }

    /// Is the backend (case-insensitive) permitted?
    pub fn permits_backend(&self, backend: &str) -> bool {
        let wanted = backend.trim().to_ascii_uppercase();
        self.allowed_backends.iter().any(|b| *b == wanted)
    }

    pub fn lane(&self, lane: Lane) -> LaneRules<'_> {
        match lane {
            Lane::Io => self.io_policy.rules(),
            Lane::Net => self.net_policy.rules(),
        }
    }
}

fn object<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    empty: &'a Map<String, Value>,
) -> &'a Map<String, Value> {
    map.get(key).and_then(Value::as_object).unwrap_or(empty)
}

impl Default for ExecutionToken {
    fn default() -> Self {
        Self::build(TokenSpec::default())
    }
}
