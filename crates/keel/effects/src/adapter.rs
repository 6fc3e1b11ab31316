//! IO and NET lane adapters.
//!
//! Adapters form a closed set selected by [`AdapterKind`]. Dry-run adapters
//! synthesize deterministic responses, fixture adapters replay a recorded
//! file, and live adapters refuse unless readiness has been asserted and a
//! transport has been injected.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keel_canon::{digest_value, Digest};
use keel_token::Lane;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::EffectError;

/// Which adapter backs a lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    #[default]
    DryRun,
    Fixture,
    Live,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DryRun => "dry_run",
            Self::Fixture => "fixture",
            Self::Live => "live",
        }
    }

    /// Lenient parse used for configuration values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "dry_run" | "dryrun" | "dry" => Some(Self::DryRun),
            "fixture" | "replay" => Some(Self::Fixture),
            "live" => Some(Self::Live),
            _ => None,
        }
    }

    /// Construct the adapter for one lane.
    pub fn build(
        self,
        lane: Lane,
        settings: &AdapterSettings,
        transport: Option<Arc<dyn LiveTransport>>,
    ) -> Result<Box<dyn LaneAdapter>, EffectError> {
        debug!(lane = %lane, kind = self.as_str(), "Building lane adapter");
        Ok(match self {
            Self::DryRun => dry_run_adapter(lane),
            Self::Fixture => {
                let path = settings.fixture_path.as_deref().ok_or_else(|| {
                    EffectError::AdapterConfig(format!(
                        "{lane} lane uses the fixture adapter but no fixture_path is set"
                    ))
                })?;
                Box::new(FixtureAdapter::load(lane, path)?)
            }
            Self::Live => Box::new(LiveAdapter {
                lane,
                ready: settings.live_ready,
                transport,
            }),
        })
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter selection for both lanes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSettings {
    #[serde(default)]
    pub io: AdapterKind,
    #[serde(default)]
    pub net: AdapterKind,
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
    /// Live adapters refuse every call unless this is set.
    #[serde(default)]
    pub live_ready: bool,
}

impl AdapterSettings {
    pub fn kind_for(&self, lane: Lane) -> AdapterKind {
        match lane {
            Lane::Io => self.io,
            Lane::Net => self.net,
        }
    }
}

/// The fixed operation set every lane supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneOp {
    Connect,
    Submit,
    Cancel,
    Query,
    Reconcile,
    Rollback,
}

impl LaneOp {
    pub const ALL: [LaneOp; 6] = [
        LaneOp::Connect,
        LaneOp::Submit,
        LaneOp::Cancel,
        LaneOp::Query,
        LaneOp::Reconcile,
        LaneOp::Rollback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Submit => "submit",
            Self::Cancel => "cancel",
            Self::Query => "query",
            Self::Reconcile => "reconcile",
            Self::Rollback => "rollback",
        }
    }

    /// `IO_SUBMIT`, `NET_QUERY` and so on.
    pub fn effect_type(&self, lane: Lane) -> String {
        format!(
            "{}_{}",
            lane.effect_prefix(),
            self.as_str().to_ascii_uppercase()
        )
    }

    /// Split a lane effect type back into its lane and operation.
    pub fn from_effect_type(effect_type: &str) -> Option<(Lane, LaneOp)> {
        let (prefix, op) = effect_type.split_once('_')?;
        let lane = [Lane::Io, Lane::Net]
            .into_iter()
            .find(|l| l.effect_prefix() == prefix)?;
        let op = Self::ALL
            .into_iter()
            .find(|o| o.as_str().eq_ignore_ascii_case(op))?;
        Some((lane, op))
    }
}

impl fmt::Display for LaneOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lane call, already redacted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneRequest {
    pub lane: Lane,
    pub op: LaneOp,
    pub step_id: String,
    pub endpoint: Option<String>,
    pub nonce: String,
    pub payload: Value,
}

impl LaneRequest {
    pub fn to_value(&self) -> Value {
        json!({
            "lane": self.lane,
            "op": self.op,
            "step_id": self.step_id,
            "endpoint": self.endpoint,
            "nonce": self.nonce,
            "payload": self.payload,
        })
    }

    pub fn digest(&self) -> Digest {
        digest_value(&self.to_value())
    }
}

/// What an adapter made of a request.
#[derive(Clone, Debug, PartialEq)]
pub enum AdapterOutcome {
    Accepted(Value),
    Refused { refusal_type: String, reason: String },
}

impl AdapterOutcome {
    fn refused(refusal_type: &str) -> Self {
        Self::Refused {
            refusal_type: refusal_type.to_string(),
            reason: refusal_type.to_string(),
        }
    }
}

/// A broker or network endpoint behind a lane.
pub trait LaneAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;
    fn connect(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError>;
    fn submit(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError>;
    fn cancel(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError>;
    fn query(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError>;
    fn reconcile(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError>;
    fn rollback(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError>;

    fn call(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        match request.op {
            LaneOp::Connect => self.connect(request),
            LaneOp::Submit => self.submit(request),
            LaneOp::Cancel => self.cancel(request),
            LaneOp::Query => self.query(request),
            LaneOp::Reconcile => self.reconcile(request),
            LaneOp::Rollback => self.rollback(request),
        }
    }
}

/// Carries live requests to a real endpoint. Injected by the embedding
/// application; the kernel ships none.
///
/// The request arrives unredacted so credentials in step args reach the
/// endpoint. Only the recorded trail is redacted.
pub trait LiveTransport: Send + Sync {
    fn send(&self, request: &LaneRequest) -> Result<Value, EffectError>;
}

struct DryRunAdapter {
    lane: Lane,
}

pub(crate) fn dry_run_adapter(lane: Lane) -> Box<dyn LaneAdapter> {
    Box::new(DryRunAdapter { lane })
}

impl DryRunAdapter {
    fn respond(&self, request: &LaneRequest, status: &str) -> AdapterOutcome {
        let mut body = Map::new();
        body.insert("lane".into(), json!(self.lane));
        body.insert("mode".into(), json!(AdapterKind::DryRun.as_str()));
        body.insert("op".into(), json!(request.op));
        body.insert("status".into(), json!(status));
        match request.op {
            LaneOp::Submit => {
                body.insert(
                    "order_id".into(),
                    json!(format!("dry-{}", request.digest().short())),
                );
            }
            LaneOp::Cancel => {
                let order = request.payload.get("order_id").cloned().unwrap_or(Value::Null);
                body.insert("order_id".into(), order);
            }
            LaneOp::Query => {
                body.insert("open_orders".into(), json!([]));
            }
            LaneOp::Reconcile => {
                body.insert("breaks".into(), json!(0));
            }
            LaneOp::Connect | LaneOp::Rollback => {}
        }
        AdapterOutcome::Accepted(Value::Object(body))
    }
}

impl LaneAdapter for DryRunAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::DryRun
    }

    fn connect(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.respond(request, "connected"))
    }

    fn submit(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.respond(request, "accepted"))
    }

    fn cancel(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.respond(request, "cancelled"))
    }

    fn query(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.respond(request, "ok"))
    }

    fn reconcile(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.respond(request, "reconciled"))
    }

    fn rollback(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.respond(request, "rolled_back"))
    }
}

/// Replays responses recorded in a JSON file.
///
/// Lookup order for a call is `"<lane>.<op>"`, then `{"<lane>": {"<op>": ..}}`,
/// then `"<op>"`. A recorded response of the form `{"refused": "<Type>"}`
/// replays a refusal.
struct FixtureAdapter {
    lane: Lane,
    responses: Map<String, Value>,
}

impl FixtureAdapter {
    fn load(lane: Lane, path: &Path) -> Result<Self, EffectError> {
        let text = std::fs::read_to_string(path).map_err(|source| EffectError::FixtureRead {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: Value =
            serde_json::from_str(&text).map_err(|e| EffectError::FixtureParse {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        let responses = match doc {
            Value::Object(map) => map,
            _ => {
                return Err(EffectError::FixtureParse {
                    path: path.to_path_buf(),
                    detail: "top level must be an object".into(),
                })
            }
        };
        Ok(Self { lane, responses })
    }

    fn lookup(&self, op: LaneOp) -> Option<&Value> {
        let lane = self.lane.to_string();
        self.responses
            .get(&format!("{lane}.{op}"))
            .or_else(|| {
                self.responses
                    .get(&lane)
                    .and_then(|nested| nested.get(op.as_str()))
            })
            .or_else(|| self.responses.get(op.as_str()))
    }

    fn replay(&self, request: &LaneRequest) -> AdapterOutcome {
        let Some(recorded) = self.lookup(request.op) else {
            warn!(lane = %self.lane, op = %request.op, "Fixture has no recorded response");
            return AdapterOutcome::Refused {
                refusal_type: "FixtureResponseMissing".into(),
                reason: format!("fixture_response_missing:{}", request.op),
            };
        };
        if let Some(refusal) = recorded.get("refused").and_then(Value::as_str) {
            return AdapterOutcome::refused(refusal);
        }
        let mut body = match recorded {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("response".into(), other.clone());
                map
            }
        };
        body.insert("mode".into(), json!(AdapterKind::Fixture.as_str()));
        AdapterOutcome::Accepted(Value::Object(body))
    }
}

impl LaneAdapter for FixtureAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Fixture
    }

    fn connect(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.replay(request))
    }

    fn submit(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.replay(request))
    }

    fn cancel(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.replay(request))
    }

    fn query(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.replay(request))
    }

    fn reconcile(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.replay(request))
    }

    fn rollback(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        Ok(self.replay(request))
    }
}

/// Fail-closed live adapter.
struct LiveAdapter {
    lane: Lane,
    ready: bool,
    transport: Option<Arc<dyn LiveTransport>>,
}

impl LiveAdapter {
    fn forward(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        if !self.ready {
            warn!(lane = %self.lane, op = %request.op, "Live adapter not ready");
            return Ok(AdapterOutcome::refused("LiveAdapterNotReady"));
        }
        match &self.transport {
            None => Ok(AdapterOutcome::refused("LiveTransportUnavailable")),
            Some(transport) => transport.send(request).map(AdapterOutcome::Accepted),
        }
    }
}

impl LaneAdapter for LiveAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Live
    }

    fn connect(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        self.forward(request)
    }

    fn submit(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        self.forward(request)
    }

    fn cancel(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        self.forward(request)
    }

    fn query(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        self.forward(request)
    }

    fn reconcile(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        self.forward(request)
    }

    fn rollback(&self, request: &LaneRequest) -> Result<AdapterOutcome, EffectError> {
        self.forward(request)
    }
}
