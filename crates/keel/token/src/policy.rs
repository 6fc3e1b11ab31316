use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce::{as_bool, as_f64, as_string, as_string_list, as_u64, normalize_list};

/// Default per-call timeout for both lanes.
pub const DEFAULT_TIMEOUT_MS: u64 = 2500;
/// Lanes run against simulated endpoints unless told otherwise.
pub const DEFAULT_LANE_MODE: &str = "dry_run";
/// Nonces derive from the step index, never from randomness.
pub const DEFAULT_NONCE_POLICY: &str = "deterministic-step-index";
/// Redaction policy applied to lane trails before serialization.
pub const DEFAULT_REDACTION_POLICY_ID: &str = "redact-secrets-v1";

/// The two capability lanes a step can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Io,
    Net,
}

impl Lane {
    /// Prefix used in refusal reasons (`IOPermissionDenied`, `NetTimeout`).
    pub fn reason_prefix(&self) -> &'static str {
        match self {
            Lane::Io => "IO",
            Lane::Net => "Net",
        }
    }

    /// Prefix used in effect type names (`IO_SUBMIT`, `NET_QUERY`).
    pub fn effect_prefix(&self) -> &'static str {
        match self {
            Lane::Io => "IO",
            Lane::Net => "NET",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Io => write!(f, "io"),
            Lane::Net => write!(f, "net"),
        }
    }
}

/// Borrowed, lane-agnostic view over an IO or NET policy.
#[derive(Clone, Copy, Debug)]
pub struct LaneRules<'a> {
    pub lane: Lane,
    pub allowed: bool,
    pub scopes: &'a [String],
    pub endpoints_allowlist: &'a [String],
    pub budget_calls: u64,
    pub timeout_ms: u64,
    pub mode: &'a str,
    pub nonce_policy: &'a str,
    pub redaction_policy_id: &'a str,
}

impl LaneRules<'_> {
    pub fn grants_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn allows_endpoint(&self, endpoint: &str) -> bool {
        self.endpoints_allowlist.iter().any(|e| e == endpoint)
    }
}

/// IO lane policy (broker-style side effects).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IoPolicy {
    pub io_allowed: bool,
    pub io_scopes: Vec<String>,
    pub io_endpoints_allowlist: Vec<String>,
    pub io_budget_calls: u64,
    pub io_timeout_ms: u64,
    pub io_mode: String,
    pub io_nonce_policy: String,
    pub io_redaction_policy_id: String,
}

impl Default for IoPolicy {
    fn default() -> Self {
        Self {
            io_allowed: false,
            io_scopes: Vec::new(),
            io_endpoints_allowlist: Vec::new(),
            io_budget_calls: 0,
            io_timeout_ms: DEFAULT_TIMEOUT_MS,
            io_mode: DEFAULT_LANE_MODE.into(),
            io_nonce_policy: DEFAULT_NONCE_POLICY.into(),
            io_redaction_policy_id: DEFAULT_REDACTION_POLICY_ID.into(),
        }
    }
}

impl IoPolicy {
    /// An IO policy that permits the given scopes with a call budget.
    pub fn allowing(scopes: &[&str], budget_calls: u64) -> Self {
        Self {
            io_allowed: true,
            io_scopes: scopes.iter().map(|s| s.to_string()).collect(),
            io_budget_calls: budget_calls,
            ..Self::default()
        }
        .normalized()
    }

    pub fn with_endpoints(mut self, endpoints: &[&str]) -> Self {
        self.io_endpoints_allowlist = endpoints.iter().map(|s| s.to_string()).collect();
        self.normalized()
    }

    pub fn normalized(mut self) -> Self {
        let d = Self::default();
        self.io_scopes = normalize_list(self.io_scopes);
        self.io_endpoints_allowlist = normalize_list(self.io_endpoints_allowlist);
        fill_blank(&mut self.io_mode, &d.io_mode);
        fill_blank(&mut self.io_nonce_policy, &d.io_nonce_policy);
        fill_blank(&mut self.io_redaction_policy_id, &d.io_redaction_policy_id);
        if self.io_timeout_ms == 0 {
            self.io_timeout_ms = d.io_timeout_ms;
        }
        self
    }

    pub(crate) fn from_map(map: &Map<String, Value>) -> Self {
        let d = Self::default();
        Self {
            io_allowed: as_bool(map.get("io_allowed"), d.io_allowed),
            io_scopes: as_string_list(map.get("io_scopes")),
            io_endpoints_allowlist: as_string_list(map.get("io_endpoints_allowlist")),
            io_budget_calls: as_u64(map.get("io_budget_calls"), d.io_budget_calls),
            io_timeout_ms: as_u64(map.get("io_timeout_ms"), d.io_timeout_ms),
            io_mode: as_string(map.get("io_mode"), &d.io_mode),
            io_nonce_policy: as_string(map.get("io_nonce_policy"), &d.io_nonce_policy),
            io_redaction_policy_id: as_string(
                map.get("io_redaction_policy_id"),
                &d.io_redaction_policy_id,
            ),
        }
        .normalized()
    }

    pub fn rules(&self) -> LaneRules<'_> {
        LaneRules {
            lane: Lane::Io,
            allowed: self.io_allowed,
            scopes: &self.io_scopes,
            endpoints_allowlist: &self.io_endpoints_allowlist,
            budget_calls: self.io_budget_calls,
            timeout_ms: self.io_timeout_ms,
            mode: &self.io_mode,
            nonce_policy: &self.io_nonce_policy,
            redaction_policy_id: &self.io_redaction_policy_id,
        }
    }
}

/// NET lane policy (outbound network capability).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetPolicy {
    pub net_allowed: bool,
    pub net_caps: Vec<String>,
    pub net_endpoints_allowlist: Vec<String>,
    pub net_budget_calls: u64,
    pub net_timeout_ms: u64,
    pub net_mode: String,
    pub net_nonce_policy: String,
    pub net_redaction_policy_id: String,
}

impl Default for NetPolicy {
    fn default() -> Self {
        Self {
            net_allowed: false,
            net_caps: Vec::new(),
            net_endpoints_allowlist: Vec::new(),
            net_budget_calls: 0,
            net_timeout_ms: DEFAULT_TIMEOUT_MS,
            net_mode: DEFAULT_LANE_MODE.into(),
            net_nonce_policy: DEFAULT_NONCE_POLICY.into(),
            net_redaction_policy_id: DEFAULT_REDACTION_POLICY_ID.into(),
        }
    }
}

impl NetPolicy {
    pub fn allowing(caps: &[&str], budget_calls: u64) -> Self {
        Self {
            net_allowed: true,
            net_caps: caps.iter().map(|s| s.to_string()).collect(),
            net_budget_calls: budget_calls,
            ..Self::default()
        }
        .normalized()
    }

    pub fn with_endpoints(mut self, endpoints: &[&str]) -> Self {
        self.net_endpoints_allowlist = endpoints.iter().map(|s| s.to_string()).collect();
        self.normalized()
    }

    pub fn normalized(mut self) -> Self {
        let d = Self::default();
        self.net_caps = normalize_list(self.net_caps);
        self.net_endpoints_allowlist = normalize_list(self.net_endpoints_allowlist);
        fill_blank(&mut self.net_mode, &d.net_mode);
        fill_blank(&mut self.net_nonce_policy, &d.net_nonce_policy);
        fill_blank(&mut self.net_redaction_policy_id, &d.net_redaction_policy_id);
        if self.net_timeout_ms == 0 {
            self.net_timeout_ms = d.net_timeout_ms;
        }
        self
    }

    pub(crate) fn from_map(map: &Map<String, Value>) -> Self {
        let d = Self::default();
        Self {
            net_allowed: as_bool(map.get("net_allowed"), d.net_allowed),
            net_caps: as_string_list(map.get("net_caps")),
            net_endpoints_allowlist: as_string_list(map.get("net_endpoints_allowlist")),
            net_budget_calls: as_u64(map.get("net_budget_calls"), d.net_budget_calls),
            net_timeout_ms: as_u64(map.get("net_timeout_ms"), d.net_timeout_ms),
            net_mode: as_string(map.get("net_mode"), &d.net_mode),
            net_nonce_policy: as_string(map.get("net_nonce_policy"), &d.net_nonce_policy),
            net_redaction_policy_id: as_string(
                map.get("net_redaction_policy_id"),
                &d.net_redaction_policy_id,
            ),
        }
        .normalized()
    }

    pub fn rules(&self) -> LaneRules<'_> {
        LaneRules {
            lane: Lane::Net,
            allowed: self.net_allowed,
            scopes: &self.net_caps,
            endpoints_allowlist: &self.net_endpoints_allowlist,
            budget_calls: self.net_budget_calls,
            timeout_ms: self.net_timeout_ms,
            mode: &self.net_mode,
            nonce_policy: &self.net_nonce_policy,
            redaction_policy_id: &self.net_redaction_policy_id,
        }
    }
}

/// How delta-S evidence is treated before irreversible steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaSMode {
    /// Evidence must exist and meet the threshold.
    Enforce,
    /// Evidence must exist; the threshold is recorded but not enforced.
    Observe,
}

/// Delta-S admissibility policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaSPolicy {
    pub mode: DeltaSMode,
    pub min_delta_s: f64,
}

impl Default for DeltaSPolicy {
    fn default() -> Self {
        Self {
            mode: DeltaSMode::Enforce,
            min_delta_s: 0.0,
        }
    }
}

impl DeltaSPolicy {
    pub fn enforcing(min_delta_s: f64) -> Self {
        Self {
            mode: DeltaSMode::Enforce,
            min_delta_s,
        }
        .normalized()
    }

    pub fn normalized(mut self) -> Self {
        if !self.min_delta_s.is_finite() {
            self.min_delta_s = 0.0;
        }
        self
    }

    /// Whether a measured delta-S clears this policy.
    pub fn admits(&self, delta_s: f64) -> bool {
        match self.mode {
            DeltaSMode::Observe => true,
            DeltaSMode::Enforce => delta_s.is_finite() && delta_s >= self.min_delta_s,
        }
    }

    pub(crate) fn from_map(map: &Map<String, Value>) -> Self {
        let d = Self::default();
        let mode = match map.get("mode").and_then(Value::as_str) {
            Some(m) if m.eq_ignore_ascii_case("observe") => DeltaSMode::Observe,
            _ => d.mode,
        };
        Self {
            mode,
            min_delta_s: as_f64(map.get("min_delta_s"), d.min_delta_s),
        }
        .normalized()
    }
}

fn fill_blank(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.to_string();
    } else {
        *field = field.trim().to_string();
    }
}
