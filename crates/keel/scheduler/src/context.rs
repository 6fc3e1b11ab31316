use std::path::PathBuf;

use keel_token::{DeltaSPolicy, IoPolicy, NetPolicy, TokenSpec};
use serde::{Deserialize, Serialize};

use crate::ir::ProgramIr;

/// Backends a default context permits.
pub const DEFAULT_BACKENDS: [&str; 3] = ["CLASSICAL", "PYTHON", "QASM"];
/// Backend stamped on legacy steps when neither context nor program names one.
pub const DEFAULT_BACKEND: &str = "CLASSICAL";

/// Everything the planner needs besides the program.
///
/// Token fields left `None` take the token's own defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerContext {
    /// Caller-supplied time, stamped on witness records only.
    pub timestamp: String,
    /// Track template; overrides the program's own policy.
    pub track: Option<String>,
    pub allowed_backends: Vec<String>,
    pub budget_steps: Option<u64>,
    pub determinism_mode: Option<String>,
    pub io_policy: Option<IoPolicy>,
    pub net_policy: Option<NetPolicy>,
    pub delta_s_policy: Option<DeltaSPolicy>,
    pub collapse_requires_delta_s: Option<bool>,
    /// Backend for legacy steps; overrides the program's own policy.
    pub backend: Option<String>,
    pub enforce_operator_registry: bool,
    pub registry_paths: Vec<PathBuf>,
    pub require_epoch_verification: bool,
    pub epoch_anchor_path: Option<PathBuf>,
    pub epoch_root: Option<String>,
    pub commit_override: Option<String>,
    pub fixture_path: Option<PathBuf>,
}

impl Default for SchedulerContext {
    fn default() -> Self {
        Self {
            timestamp: "1970-01-01T00:00:00Z".into(),
            track: None,
            allowed_backends: DEFAULT_BACKENDS.iter().map(|b| b.to_string()).collect(),
            budget_steps: None,
            determinism_mode: None,
            io_policy: None,
            net_policy: None,
            delta_s_policy: None,
            collapse_requires_delta_s: None,
            backend: None,
            enforce_operator_registry: false,
            registry_paths: Vec::new(),
            require_epoch_verification: false,
            epoch_anchor_path: None,
            epoch_root: None,
            commit_override: None,
            fixture_path: None,
        }
    }
}

impl SchedulerContext {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Self::default()
        }
    }

    pub fn with_track(mut self, track: impl Into<String>) -> Self {
        self.track = Some(track.into());
        self
    }

    pub fn with_backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_backends = backends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_budget_steps(mut self, budget: u64) -> Self {
        self.budget_steps = Some(budget);
        self
    }

    pub fn with_io_policy(mut self, policy: IoPolicy) -> Self {
        self.io_policy = Some(policy);
        self
    }

    pub fn with_net_policy(mut self, policy: NetPolicy) -> Self {
        self.net_policy = Some(policy);
        self
    }

    pub fn with_delta_s_policy(mut self, policy: DeltaSPolicy) -> Self {
        self.delta_s_policy = Some(policy);
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_registry<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.enforce_operator_registry = true;
        self.registry_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_epoch_anchor(mut self, path: impl Into<PathBuf>, root: impl Into<String>) -> Self {
        self.require_epoch_verification = true;
        self.epoch_anchor_path = Some(path.into());
        self.epoch_root = Some(root.into());
        self
    }

    pub fn with_fixture_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixture_path = Some(path.into());
        self
    }

    /// Token inputs carried by this context.
    pub fn token_spec(&self) -> TokenSpec {
        TokenSpec {
            allowed_backends: self.allowed_backends.clone(),
            budget_steps: self.budget_steps,
            determinism_mode: self.determinism_mode.clone(),
            io_policy: self.io_policy.clone(),
            net_policy: self.net_policy.clone(),
            delta_s_policy: self.delta_s_policy.clone(),
            collapse_requires_delta_s: self.collapse_requires_delta_s,
        }
    }

    pub fn resolve_track<'a>(&'a self, ir: &'a ProgramIr) -> Option<&'a str> {
        self.track
            .as_deref()
            .or(ir.scheduler_policy.track.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Backend for legacy steps, upper-cased.
    pub fn resolve_backend(&self, ir: &ProgramIr) -> String {
        self.backend
            .as_deref()
            .or(ir.scheduler_policy.backend.as_deref())
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BACKEND)
            .to_ascii_uppercase()
    }
}
