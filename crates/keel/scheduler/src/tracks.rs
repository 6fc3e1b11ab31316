//! Fixed plan templates.
//!
//! A track is an explicitly enumerated step sequence. The only branching is
//! on optional configuration: an anchor path adds an anchor-digest step and
//! a fixture path replaces the built-in price series.

use std::fmt;
use std::path::Path;

use keel_effects::{EffectStep, LaneOp, Requires};
use keel_token::Lane;
use serde_json::json;
use tracing::debug;

use crate::ir::ProgramIr;

/// Price series used by trading tracks when no fixture is configured.
pub const DEFAULT_PRICES: [f64; 12] = [
    100.0, 100.5, 101.0, 101.8, 102.4, 101.9, 101.1, 100.2, 99.6, 99.9, 100.7, 101.5,
];

/// IO scope a broker step of this operation declares.
pub fn broker_scope(op: LaneOp) -> String {
    format!("broker.{}", op.as_str())
}

/// NET capability a feed step of this operation declares.
pub fn feed_cap(op: LaneOp) -> String {
    format!("feed.{}", op.as_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Track {
    CiGovernance,
    AgentGovernance,
    TradingPaper,
    TradingShadow,
    TradingIoShadow,
    TradingIoLive,
    NavierStokes,
    NetShadow,
    BackendLowering,
}

impl Track {
    pub const ALL: [Track; 9] = [
        Track::CiGovernance,
        Track::AgentGovernance,
        Track::TradingPaper,
        Track::TradingShadow,
        Track::TradingIoShadow,
        Track::TradingIoLive,
        Track::NavierStokes,
        Track::NetShadow,
        Track::BackendLowering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Track::CiGovernance => "ci-governance",
            Track::AgentGovernance => "agent-governance",
            Track::TradingPaper => "trading-paper",
            Track::TradingShadow => "trading-shadow",
            Track::TradingIoShadow => "trading-io-shadow",
            Track::TradingIoLive => "trading-io-live",
            Track::NavierStokes => "navier-stokes",
            Track::NetShadow => "net-shadow",
            Track::BackendLowering => "backend-lowering",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Unknown names fall back to backend lowering.
    pub fn resolve(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            debug!(track = name, "Unknown track, using backend-lowering");
            Track::BackendLowering
        })
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a template may read.
#[derive(Clone, Copy, Debug)]
pub struct TrackInputs<'a> {
    pub ir: &'a ProgramIr,
    pub program_id: &'a str,
    /// Normalized backends of the plan's token.
    pub allowed_backends: &'a [String],
    pub backend: &'a str,
    pub anchor_path: Option<&'a Path>,
    pub fixture_path: Option<&'a Path>,
}

/// Step list under construction. Lane steps get the nonce of their index.
#[derive(Default)]
struct Template {
    steps: Vec<EffectStep>,
}

impl Template {
    fn push(&mut self, mut step: EffectStep) {
        if step.uses_lane(Lane::Io) || step.uses_lane(Lane::Net) {
            step.requires.nonce = Some(format!("nonce-{}", self.steps.len()));
        }
        self.steps.push(step);
    }

    fn summary(&mut self, id: &str, track: Track, inputs: &TrackInputs<'_>) {
        self.push(EffectStep::new(id, "EMIT_ARTIFACT").arg(
            "payload",
            json!({
                "track": track.as_str(),
                "program_id": inputs.program_id,
                "steps": self.steps.len(),
            }),
        ));
    }

    fn anchor_digest(&mut self, id: &str, inputs: &TrackInputs<'_>) {
        if let Some(path) = inputs.anchor_path {
            self.push(
                EffectStep::new(id, "ARTIFACT_DIGEST").arg("path", path.display().to_string()),
            );
        }
    }
}

/// One step per term.
pub fn legacy_steps(inputs: &TrackInputs<'_>) -> Vec<EffectStep> {
    inputs
        .ir
        .terms
        .iter()
        .map(|term| {
            let mut requires = Requires::new().backend(inputs.backend);
            if let Some(op) = inputs.ir.operator_for(term) {
                requires = requires.operator(op);
            }
            EffectStep::new(&term.id, "TERM_APPLY")
                .arg("term", term.id.as_str())
                .arg("coef", term.coef)
                .requires(requires)
        })
        .collect()
}

pub fn track_steps(track: Track, inputs: &TrackInputs<'_>) -> Vec<EffectStep> {
    let mut t = Template::default();
    match track {
        Track::CiGovernance => {
            let term_ids: Vec<&str> = inputs.ir.terms.iter().map(|t| t.id.as_str()).collect();
            t.push(
                EffectStep::new("ci.program", "EMIT_ARTIFACT")
                    .arg("name", "program")
                    .arg(
                        "payload",
                        json!({
                            "program_id": inputs.program_id,
                            "terms": term_ids,
                            "invariants": inputs.ir.invariants.len(),
                        }),
                    ),
            );
            t.anchor_digest("ci.anchor", inputs);
            t.push(lower("ci.lower", inputs.backend, inputs.program_id));
            t.summary("ci.summary", track, inputs);
        }
        Track::AgentGovernance => {
            t.push(delta_s("agent.delta_s", 1.0, 0.25));
            for term in &inputs.ir.terms {
                if let Some(op) = inputs.ir.operator_for(term) {
                    t.push(
                        EffectStep::new(format!("agent.invoke.{}", term.id), "OPERATOR_INVOKE")
                            .arg("operator_id", op)
                            .arg("inputs", json!({"term": term.id, "coef": term.coef}))
                            .requires(Requires::new().operator(op)),
                    );
                }
            }
            t.push(
                EffectStep::new("agent.collapse", "COLLAPSE_COMMIT")
                    .arg("label", inputs.program_id)
                    .requires(Requires::new().irreversible()),
            );
            t.summary("agent.summary", track, inputs);
        }
        Track::TradingPaper | Track::TradingShadow => {
            let mode = if track == Track::TradingPaper {
                "paper"
            } else {
                "shadow"
            };
            trading_head(&mut t, inputs, mode);
            t.push(EffectStep::new("trading.report", "TRADING_REPORT"));
        }
        Track::TradingIoShadow => {
            trading_head(&mut t, inputs, "shadow");
            for op in [LaneOp::Connect, LaneOp::Submit, LaneOp::Query, LaneOp::Reconcile] {
                t.push(broker_step(op));
            }
            t.push(EffectStep::new("trading.report", "TRADING_REPORT"));
        }
        Track::TradingIoLive => {
            trading_head(&mut t, inputs, "shadow");
            t.push(delta_s("trading.delta_s", 1.0, 0.4));
            t.push(broker_step(LaneOp::Connect));
            let mut submit = broker_step(LaneOp::Submit);
            submit.requires.irreversible = true;
            t.push(submit);
            t.push(broker_step(LaneOp::Reconcile));
            t.push(EffectStep::new("trading.report", "TRADING_REPORT"));
        }
        Track::NavierStokes => {
            t.push(
                EffectStep::new("pde.evolve", "PDE_EVOLVE")
                    .arg("n", 16)
                    .arg("nu", 0.1)
                    .arg("dt", 0.01)
                    .arg("steps", 10),
            );
            t.push(EffectStep::new("pde.project", "PDE_PROJECT"));
            t.push(EffectStep::new("pde.barrier", "PDE_BARRIER_CHECK").arg("barrier", 10.0));
            t.summary("pde.summary", track, inputs);
        }
        Track::NetShadow => {
            for op in [LaneOp::Connect, LaneOp::Query, LaneOp::Reconcile] {
                t.push(
                    EffectStep::new(format!("net.{}", op.as_str()), op.effect_type(Lane::Net))
                        .arg("feed", "quotes")
                        .requires(Requires::new().net_cap(feed_cap(op))),
                );
            }
            t.summary("net.summary", track, inputs);
        }
        Track::BackendLowering => {
            t.anchor_digest("lower.anchor", inputs);
            if inputs.allowed_backends.is_empty() {
                t.push(lower(
                    &format!("lower.{}", inputs.backend),
                    inputs.backend,
                    inputs.program_id,
                ));
            }
            for backend in inputs.allowed_backends {
                t.push(lower(&format!("lower.{backend}"), backend, inputs.program_id));
            }
        }
    }
    t.steps
}

fn lower(id: &str, backend: &str, program_id: &str) -> EffectStep {
    EffectStep::new(id, "LOWER_BACKEND")
        .arg("backend", backend)
        .arg("program_id", program_id)
        .requires(Requires::new().backend(backend))
}

fn delta_s(id: &str, before: f64, after: f64) -> EffectStep {
    EffectStep::new(id, "DELTA_S_COMPUTE")
        .arg("entropy_before", before)
        .arg("entropy_after", after)
}

fn broker_step(op: LaneOp) -> EffectStep {
    EffectStep::new(format!("io.{}", op.as_str()), op.effect_type(Lane::Io))
        .arg("symbol", "SIM")
        .arg("quantity", 1)
        .requires(Requires::new().io_scope(broker_scope(op)))
}

fn trading_head(t: &mut Template, inputs: &TrackInputs<'_>, mode: &str) {
    let mut signal = EffectStep::new("trading.signal", "TRADING_SIGNAL")
        .arg("short_window", 3)
        .arg("long_window", 5);
    signal = match inputs.fixture_path {
        Some(path) => signal.arg("fixture", path.display().to_string()),
        None => signal.arg("prices", json!(DEFAULT_PRICES)),
    };
    t.push(signal);
    t.push(
        EffectStep::new("trading.fill", "TRADING_FILL")
            .arg("mode", mode)
            .arg("slippage_bps", 5.0),
    );
    t.push(EffectStep::new("trading.risk", "TRADING_RISK").arg("max_position", 1.0));
}
