//! Adversarial: lanes, adapters, handlers, contracts and sinks fail closed.

use std::sync::Arc;

use keel_effects::{
    AdapterKind, AdapterSettings, EffectContext, EffectError, EffectResult, EffectStep,
    HandlerRegistry,
};
use keel_runtime::{
    Contract, ContractCheck, ExecutionContract, RunStatus, RuntimeContext, RuntimeEngine,
    RuntimeFault, RuntimeResult,
};
use keel_scheduler::{plan, ExecutionPlan, SchedulerContext};
use keel_tests::{broker_io, builtin_engine, feed_net, step_ids, surf_ir, TS};
use keel_token::{IoPolicy, NetPolicy};
use keel_witness::{TraceSink, WitnessError, WitnessRecord};
use serde_json::json;

fn io_shadow(io: IoPolicy) -> ExecutionPlan {
    let ctx = SchedulerContext::new(TS)
        .with_track("trading-io-shadow")
        .with_io_policy(io);
    plan(&surf_ir(), &ctx).unwrap()
}

fn net_shadow(net: NetPolicy) -> ExecutionPlan {
    let ctx = SchedulerContext::new(TS)
        .with_track("net-shadow")
        .with_net_policy(net);
    plan(&surf_ir(), &ctx).unwrap()
}

fn run_with(p: &ExecutionPlan, rctx: &RuntimeContext) -> RuntimeResult {
    builtin_engine()
        .run(p, rctx, &ExecutionContract::new())
        .unwrap()
}

fn write_fixture(dir: &std::path::Path, doc: serde_json::Value) -> std::path::PathBuf {
    let path = dir.join("broker.json");
    std::fs::write(&path, doc.to_string()).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Lane policy
// ---------------------------------------------------------------------------

#[test]
fn ungranted_scope_is_refused() {
    let p = io_shadow(IoPolicy::allowing(&["broker.connect"], 4));
    let r = run_with(&p, &RuntimeContext::new(TS));
    assert_eq!(r.reasons, vec!["IOPermissionDenied"]);
    assert_eq!(step_ids(&r).last(), Some(&"io.submit"));
}

#[test]
fn allowed_flag_off_ignores_scopes() {
    let mut io = IoPolicy::allowing(&["broker.connect"], 4);
    io.io_allowed = false;
    let r = run_with(&io_shadow(io), &RuntimeContext::new(TS));
    assert_eq!(r.reasons, vec!["IOPermissionDenied"]);
    assert_eq!(step_ids(&r).last(), Some(&"io.connect"));
}

#[test]
fn zero_call_budget_allows_no_calls() {
    let r = run_with(&net_shadow(feed_net(0)), &RuntimeContext::new(TS));
    assert_eq!(r.reasons, vec!["NetBudgetExceeded"]);
    assert_eq!(step_ids(&r), vec!["net.connect"]);
}

#[test]
fn gate_refusal_happens_before_any_call() {
    let r = run_with(&net_shadow(NetPolicy::default()), &RuntimeContext::new(TS));
    // Gate refusals carry no trail; the adapter was never reached.
    assert!(r.steps[0].artifact_digests.is_empty());
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

#[test]
fn live_adapter_without_transport_refuses() {
    let rctx = RuntimeContext::new(TS).with_adapters(AdapterSettings {
        net: AdapterKind::Live,
        live_ready: true,
        ..AdapterSettings::default()
    });
    let r = run_with(&net_shadow(feed_net(3)), &rctx);
    assert_eq!(r.reasons, vec!["LiveTransportUnavailable"]);
}

#[test]
fn fixture_adapter_without_path_is_a_fault() {
    let rctx = RuntimeContext::new(TS).with_adapters(AdapterSettings {
        io: AdapterKind::Fixture,
        ..AdapterSettings::default()
    });
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let err = builtin_engine()
        .run(&p, &rctx, &ExecutionContract::new())
        .unwrap_err();
    assert!(matches!(err, RuntimeFault::Effect(EffectError::AdapterConfig(_))));
}

#[test]
fn fixture_recorded_refusal_is_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = write_fixture(
        dir.path(),
        json!({"io.connect": {"refused": "BrokerHalted"}}),
    );
    let rctx = RuntimeContext::new(TS).with_adapters(AdapterSettings {
        io: AdapterKind::Fixture,
        fixture_path: Some(fixture),
        ..AdapterSettings::default()
    });
    let r = run_with(&io_shadow(broker_io(4)), &rctx);
    assert_eq!(r.reasons, vec!["BrokerHalted"]);
    assert_eq!(r.steps.last().unwrap().refusal_type.as_deref(), Some("BrokerHalted"));
}

#[test]
fn fixture_missing_response_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = write_fixture(dir.path(), json!({"io": {"connect": {"status": "up"}}}));
    let rctx = RuntimeContext::new(TS).with_adapters(AdapterSettings {
        io: AdapterKind::Fixture,
        fixture_path: Some(fixture),
        ..AdapterSettings::default()
    });
    let r = run_with(&io_shadow(broker_io(4)), &rctx);
    assert_eq!(r.reasons, vec!["fixture_response_missing:submit"]);
    let refused = r.steps.last().unwrap();
    assert_eq!(refused.step_id, "io.submit");
    assert_eq!(refused.refusal_type.as_deref(), Some("FixtureResponseMissing"));
}

// ---------------------------------------------------------------------------
// Handlers, contracts and sinks
// ---------------------------------------------------------------------------

#[test]
fn handler_fault_is_an_error_not_a_denial() {
    let mut handlers = HandlerRegistry::with_builtins();
    handlers.register(
        "TERM_APPLY",
        |step: &EffectStep, _ctx: &mut EffectContext| -> Result<EffectResult, EffectError> {
            Err(EffectError::Transport(format!("backend down at {}", step.step_id)))
        },
    );
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let err = RuntimeEngine::new(handlers)
        .run(&p, &RuntimeContext::new(TS), &ExecutionContract::new())
        .unwrap_err();
    assert!(err.to_string().contains("backend down at SURF_A"));
}

#[test]
fn misattributed_result_fails_postconditions() {
    let mut handlers = HandlerRegistry::with_builtins();
    handlers.register(
        "TERM_APPLY",
        |step: &EffectStep, _ctx: &mut EffectContext| -> Result<EffectResult, EffectError> {
            let mut result = EffectResult::ok(step, vec![]);
            result.step_id = "SOMEONE_ELSE".into();
            Ok(result)
        },
    );
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let r = RuntimeEngine::new(handlers)
        .run(&p, &RuntimeContext::new(TS), &ExecutionContract::new())
        .unwrap();
    assert_eq!(r.status, RunStatus::Denied);
    assert_eq!(
        r.steps[0].refusal_type.as_deref(),
        Some("contract_postcondition_failed")
    );
}

struct NoSecondTerm;

impl Contract for NoSecondTerm {
    fn preconditions(&self, step: &EffectStep, ctx: &EffectContext) -> ContractCheck {
        if ctx.step_index > 0 {
            ContractCheck::from_reasons(vec![format!("{} arrives too late", step.step_id)])
        } else {
            ContractCheck::pass()
        }
    }
}

#[test]
fn custom_precondition_refuses() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let r = builtin_engine()
        .run(&p, &RuntimeContext::new(TS), &NoSecondTerm)
        .unwrap();
    assert_eq!(r.reasons, vec!["SURF_B arrives too late"]);
    assert_eq!(
        r.steps[1].refusal_type.as_deref(),
        Some("contract_precondition_failed")
    );
}

struct BrokenSink;

impl TraceSink for BrokenSink {
    fn record(&self, _record: &WitnessRecord) -> Result<(), WitnessError> {
        Err(WitnessError::SinkUnavailable("disk full".into()))
    }
}

#[test]
fn failing_sink_is_a_fault() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let err = builtin_engine()
        .with_sink(Arc::new(BrokenSink))
        .run(&p, &RuntimeContext::new(TS), &ExecutionContract::new())
        .unwrap_err();
    assert!(matches!(err, RuntimeFault::Witness(_)));
}
