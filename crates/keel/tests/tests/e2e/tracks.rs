//! E2E: every fixed track planned and run with the built-in handlers.

use std::sync::Arc;

use keel_canon::digest_file;
use keel_effects::{
    AdapterKind, AdapterSettings, EffectContext, EffectError, EffectResult, EffectStep,
    HandlerRegistry, LaneRequest, LiveTransport,
};
use keel_runtime::{ExecutionContract, RunStatus, RuntimeContext, RuntimeEngine, RuntimeResult};
use keel_scheduler::{plan, ExecutionPlan, SchedulerContext};
use keel_tests::{
    broker_io, builtin_engine, feed_net, step_ids, surf_ir, surf_ir_with_operators,
    write_prices, TS,
};
use serde_json::{json, Value};

fn plan_track(track: &str, ctx: SchedulerContext) -> ExecutionPlan {
    plan(&surf_ir_with_operators(), &ctx.with_track(track)).unwrap()
}

fn run(p: &ExecutionPlan, rctx: &RuntimeContext) -> RuntimeResult {
    builtin_engine()
        .run(p, rctx, &ExecutionContract::new())
        .unwrap()
}

struct AcceptAll;

impl LiveTransport for AcceptAll {
    fn send(&self, request: &LaneRequest) -> Result<Value, EffectError> {
        Ok(json!({"status": "accepted", "op": request.op, "order_id": "live-1"}))
    }
}

fn live_adapters(ready: bool) -> AdapterSettings {
    AdapterSettings {
        io: AdapterKind::Live,
        live_ready: ready,
        ..AdapterSettings::default()
    }
}

// ---------------------------------------------------------------------------
// Governance tracks
// ---------------------------------------------------------------------------

#[test]
fn ci_governance_completes() {
    let p = plan_track("ci-governance", SchedulerContext::new(TS));
    assert_eq!(
        p.steps.iter().map(|s| s.step_id.as_str()).collect::<Vec<_>>(),
        vec!["ci.program", "ci.lower", "ci.summary"]
    );
    let r = run(&p, &RuntimeContext::new(TS));
    assert!(r.is_completed(), "{:?}", r.reasons);
}

#[test]
fn agent_governance_invokes_operators_then_collapses() {
    let p = plan_track("agent-governance", SchedulerContext::new(TS));
    let r = run(&p, &RuntimeContext::new(TS));
    assert!(r.is_completed(), "{:?}", r.reasons);
    assert_eq!(
        step_ids(&r),
        vec![
            "agent.delta_s",
            "agent.invoke.SURF_A",
            "agent.invoke.SURF_B",
            "agent.collapse",
            "agent.summary"
        ]
    );
    // The collapse cites the delta-S evidence it relied on.
    let evidence = &r.steps[0].artifact_digests[0];
    assert!(r.steps[3].artifact_digests.contains(evidence));
}

// ---------------------------------------------------------------------------
// Trading tracks
// ---------------------------------------------------------------------------

#[test]
fn trading_paper_completes() {
    let p = plan_track("trading-paper", SchedulerContext::new(TS));
    let r = run(&p, &RuntimeContext::new(TS));
    assert!(r.is_completed(), "{:?}", r.reasons);
    assert_eq!(
        step_ids(&r),
        vec!["trading.signal", "trading.fill", "trading.risk", "trading.report"]
    );
}

#[test]
fn trading_io_shadow_completes_with_broker_grant() {
    let ctx = SchedulerContext::new(TS).with_io_policy(broker_io(4));
    let p = plan_track("trading-io-shadow", ctx);
    let r = run(&p, &RuntimeContext::new(TS));
    assert!(r.is_completed(), "{:?}", r.reasons);
    assert_eq!(r.steps.len(), 8);
}

#[test]
fn trading_io_shadow_fails_closed_by_default() {
    let p = plan_track("trading-io-shadow", SchedulerContext::new(TS));
    let r = run(&p, &RuntimeContext::new(TS));
    assert_eq!(r.status, RunStatus::Denied);
    assert_eq!(r.reasons, vec!["IOPermissionDenied"]);
    assert_eq!(step_ids(&r).last(), Some(&"io.connect"));
    assert_eq!(r.steps.len(), 4);
}

#[test]
fn trading_io_shadow_call_budget() {
    let ctx = SchedulerContext::new(TS).with_io_policy(broker_io(2));
    let p = plan_track("trading-io-shadow", ctx);
    let r = run(&p, &RuntimeContext::new(TS));
    assert_eq!(r.reasons, vec!["IOBudgetExceeded"]);
    assert_eq!(step_ids(&r).last(), Some(&"io.query"));
}

#[test]
fn trading_io_live_refuses_until_ready() {
    let ctx = SchedulerContext::new(TS).with_io_policy(broker_io(4));
    let p = plan_track("trading-io-live", ctx);
    let rctx = RuntimeContext::new(TS).with_adapters(live_adapters(false));
    let r = builtin_engine()
        .with_live_transport(Arc::new(AcceptAll))
        .run(&p, &rctx, &ExecutionContract::new())
        .unwrap();

    assert_eq!(r.reasons, vec!["LiveAdapterNotReady"]);
    let refused = r.steps.last().unwrap();
    assert_eq!(refused.step_id, "io.connect");
    assert_eq!(refused.refusal_type.as_deref(), Some("LiveAdapterNotReady"));
    // The refused call still leaves its trail.
    assert_eq!(refused.artifact_digests.len(), 1);
}

#[test]
fn trading_io_live_completes_with_transport() {
    let ctx = SchedulerContext::new(TS).with_io_policy(broker_io(4));
    let p = plan_track("trading-io-live", ctx);
    let rctx = RuntimeContext::new(TS).with_adapters(live_adapters(true));
    let r = builtin_engine()
        .with_live_transport(Arc::new(AcceptAll))
        .run(&p, &rctx, &ExecutionContract::new())
        .unwrap();
    assert!(r.is_completed(), "{:?}", r.reasons);
    assert!(step_ids(&r).contains(&"io.submit"));
}

#[test]
fn fixture_prices_are_digested_into_signal() {
    let dir = tempfile::tempdir().unwrap();
    let prices = write_prices(dir.path(), &[10.0, 10.0, 10.0, 10.0, 10.0, 11.0, 12.0, 9.0]).unwrap();
    let ctx = SchedulerContext::new(TS).with_fixture_path(&prices);
    let p = plan_track("trading-paper", ctx);
    let r = run(&p, &RuntimeContext::new(TS));

    assert!(r.is_completed(), "{:?}", r.reasons);
    assert_eq!(r.steps[0].artifact_digests[0], digest_file(&prices).unwrap());
    assert_eq!(r.steps[0].artifact_digests.len(), 2);
}

// ---------------------------------------------------------------------------
// PDE, NET and lowering
// ---------------------------------------------------------------------------

#[test]
fn navier_stokes_completes() {
    let p = plan_track("navier-stokes", SchedulerContext::new(TS));
    let r = run(&p, &RuntimeContext::new(TS));
    assert!(r.is_completed(), "{:?}", r.reasons);
    assert_eq!(
        step_ids(&r),
        vec!["pde.evolve", "pde.project", "pde.barrier", "pde.summary"]
    );
}

/// Built-ins, with the PDE evolution pushed into an unstable regime.
fn unstable_pde_engine() -> RuntimeEngine {
    let builtins = HandlerRegistry::with_builtins();
    let mut handlers = HandlerRegistry::with_builtins();
    handlers.register(
        "PDE_EVOLVE",
        move |step: &EffectStep, ctx: &mut EffectContext| -> Result<EffectResult, EffectError> {
            let unstable = step
                .clone()
                .arg("nu", 5.0)
                .arg("dt", 0.5)
                .arg("steps", 400);
            builtins.dispatch(&unstable, ctx)
        },
    );
    RuntimeEngine::new(handlers)
}

#[test]
fn navier_stokes_blow_up_is_a_barrier_denial() {
    let p = plan_track("navier-stokes", SchedulerContext::new(TS));
    let r = unstable_pde_engine()
        .run(&p, &RuntimeContext::new(TS), &ExecutionContract::new())
        .unwrap();
    assert_eq!(r.status, RunStatus::Denied);
    assert_eq!(r.reasons, vec!["barrier_violated"]);
    assert_eq!(step_ids(&r), vec!["pde.evolve", "pde.project", "pde.barrier"]);
    assert!(r.steps[1].ok);
    assert_eq!(r.constraint_witnesses.len(), 1);
    assert!(r.constraint_witnesses[0].verify_id());
}

#[test]
fn net_shadow_fails_closed_by_default() {
    let p = plan_track("net-shadow", SchedulerContext::new(TS));
    let r = run(&p, &RuntimeContext::new(TS));
    assert_eq!(r.reasons, vec!["NetPermissionDenied"]);
    assert_eq!(step_ids(&r), vec!["net.connect"]);
}

#[test]
fn net_shadow_completes_with_feed_grant() {
    let ctx = SchedulerContext::new(TS).with_net_policy(feed_net(3));
    let p = plan_track("net-shadow", ctx);
    let r = run(&p, &RuntimeContext::new(TS));
    assert!(r.is_completed(), "{:?}", r.reasons);
    assert_eq!(r.steps.len(), 4);
}

#[test]
fn unknown_track_lowers_for_every_backend() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS).with_track("mystery")).unwrap();
    let r = run(&p, &RuntimeContext::new(TS));
    assert!(r.is_completed(), "{:?}", r.reasons);
    assert_eq!(
        step_ids(&r),
        vec!["lower.CLASSICAL", "lower.PYTHON", "lower.QASM"]
    );
}
