use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use keel_canon::Digest;
use keel_token::{ExecutionToken, Lane};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::{dry_run_adapter, AdapterKind, AdapterSettings, LaneAdapter, LiveTransport};
use crate::error::EffectError;

/// Discretize a latency so that only its bucket is ever recorded.
pub fn latency_bucket(ms: u64) -> &'static str {
    match ms {
        0..=99 => "lt_100ms",
        100..=499 => "lt_500ms",
        500..=999 => "lt_1000ms",
        1000..=2499 => "lt_2500ms",
        2500..=4999 => "lt_5000ms",
        _ => "ge_5000ms",
    }
}

/// Evidence produced by `DELTA_S_COMPUTE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaSEvidence {
    pub entropy_before: f64,
    pub entropy_after: f64,
    pub delta_s: f64,
    pub evidence_digest: Digest,
}

/// Per-run mutable state shared by the handlers of one run.
pub struct EffectContext {
    pub step_index: usize,
    pub timestamp: String,
    pub token: ExecutionToken,
    pub artifact_dir: Option<PathBuf>,
    pub fixture_path: Option<PathBuf>,
    pub delta_s: Option<DeltaSEvidence>,
    pub operator_allowlist: Option<BTreeSet<String>>,
    /// Intermediate values passed between chained steps of one family.
    pub blackboard: BTreeMap<String, Value>,
    io_adapter: Box<dyn LaneAdapter>,
    net_adapter: Box<dyn LaneAdapter>,
    io_calls: u64,
    net_calls: u64,
}

impl EffectContext {
    /// A context with dry-run adapters on both lanes.
    pub fn new(timestamp: impl Into<String>, token: ExecutionToken) -> Self {
        Self {
            step_index: 0,
            timestamp: timestamp.into(),
            token,
            artifact_dir: None,
            fixture_path: None,
            delta_s: None,
            operator_allowlist: None,
            blackboard: BTreeMap::new(),
            io_adapter: dry_run_adapter(Lane::Io),
            net_adapter: dry_run_adapter(Lane::Net),
            io_calls: 0,
            net_calls: 0,
        }
    }

    /// Replace both lane adapters according to `settings`.
    pub fn with_adapters(
        mut self,
        settings: &AdapterSettings,
        transport: Option<Arc<dyn LiveTransport>>,
    ) -> Result<Self, EffectError> {
        self.io_adapter = settings
            .kind_for(Lane::Io)
            .build(Lane::Io, settings, transport.clone())?;
        self.net_adapter = settings
            .kind_for(Lane::Net)
            .build(Lane::Net, settings, transport)?;
        if self.fixture_path.is_none() {
            self.fixture_path = settings.fixture_path.clone();
        }
        Ok(self)
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn with_fixture_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixture_path = Some(path.into());
        self
    }

    pub fn with_operator_allowlist<I, S>(mut self, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operator_allowlist = Some(operators.into_iter().map(Into::into).collect());
        self
    }

    pub fn adapter(&self, lane: Lane) -> &dyn LaneAdapter {
        match lane {
            Lane::Io => self.io_adapter.as_ref(),
            Lane::Net => self.net_adapter.as_ref(),
        }
    }

    pub fn adapter_kind(&self, lane: Lane) -> AdapterKind {
        self.adapter(lane).kind()
    }

    /// Lane calls made so far in this run.
    pub fn lane_calls(&self, lane: Lane) -> u64 {
        match lane {
            Lane::Io => self.io_calls,
            Lane::Net => self.net_calls,
        }
    }

    pub fn record_lane_call(&mut self, lane: Lane) {
        match lane {
            Lane::Io => self.io_calls += 1,
            Lane::Net => self.net_calls += 1,
        }
    }

    /// The nonce a lane step at the current index is expected to carry.
    pub fn expected_nonce(&self) -> String {
        format!("nonce-{}", self.step_index)
    }

    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.blackboard.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.blackboard.get(key)
    }
}

impl std::fmt::Debug for EffectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectContext")
            .field("step_index", &self.step_index)
            .field("timestamp", &self.timestamp)
            .field("token_id", &self.token.token_id)
            .field("io_adapter", &self.io_adapter.kind())
            .field("net_adapter", &self.net_adapter.kind())
            .field("io_calls", &self.io_calls)
            .field("net_calls", &self.net_calls)
            .field("blackboard_keys", &self.blackboard.keys().collect::<Vec<_>>())
            .finish()
    }
}
