//! Adversarial: irreversible steps cannot run without admissible delta-S
//! evidence.

use keel_effects::{HandlerRegistry, NoopHandler};
use keel_runtime::{ExecutionContract, RunStatus, RuntimeContext, RuntimeEngine, RuntimeResult};
use keel_scheduler::{plan, SchedulerContext};
use keel_tests::{broker_io, builtin_engine, step_ids, surf_ir_with_operators, TS};
use keel_token::{DeltaSMode, DeltaSPolicy};

/// Built-ins with delta-S computation swapped for a no-op, so no evidence
/// is ever recorded.
fn evidence_free_engine() -> RuntimeEngine {
    let mut handlers = HandlerRegistry::with_builtins();
    handlers.register("DELTA_S_COMPUTE", NoopHandler);
    RuntimeEngine::new(handlers)
}

fn agent_ctx() -> SchedulerContext {
    SchedulerContext::new(TS).with_track("agent-governance")
}

fn run(engine: &RuntimeEngine, ctx: &SchedulerContext) -> RuntimeResult {
    let p = plan(&surf_ir_with_operators(), ctx).unwrap();
    engine
        .run(&p, &RuntimeContext::new(TS), &ExecutionContract::new())
        .unwrap()
}

#[test]
fn collapse_without_evidence_is_refused() {
    let r = run(&evidence_free_engine(), &agent_ctx());
    assert_eq!(r.status, RunStatus::Denied);
    assert_eq!(r.reasons, vec!["delta_s_evidence_missing"]);
    assert_eq!(step_ids(&r).last(), Some(&"agent.collapse"));
    // Everything before the collapse ran.
    assert!(r.steps[..r.steps.len() - 1].iter().all(|s| s.ok));
}

#[test]
fn collapse_below_threshold_is_refused() {
    // The agent track measures delta-S = 1.0 - 0.25 = 0.75.
    let ctx = agent_ctx().with_delta_s_policy(DeltaSPolicy::enforcing(0.9));
    let r = run(&builtin_engine(), &ctx);
    assert_eq!(r.reasons, vec!["delta_s_inadmissible"]);
    assert_eq!(step_ids(&r).last(), Some(&"agent.collapse"));
}

#[test]
fn collapse_at_threshold_is_admitted() {
    let ctx = agent_ctx().with_delta_s_policy(DeltaSPolicy::enforcing(0.75));
    assert!(run(&builtin_engine(), &ctx).is_completed());
}

#[test]
fn observe_mode_records_without_enforcing() {
    let ctx = agent_ctx().with_delta_s_policy(DeltaSPolicy {
        mode: DeltaSMode::Observe,
        min_delta_s: 0.9,
    });
    assert!(run(&builtin_engine(), &ctx).is_completed());

    // Observe still needs evidence to exist.
    let r = run(&evidence_free_engine(), &ctx);
    assert_eq!(r.reasons, vec!["delta_s_evidence_missing"]);
}

#[test]
fn unrequired_collapse_runs_without_evidence() {
    let mut ctx = agent_ctx();
    ctx.collapse_requires_delta_s = Some(false);
    let r = run(&evidence_free_engine(), &ctx);
    assert!(r.is_completed(), "{:?}", r.reasons);
}

#[test]
fn irreversible_submit_needs_evidence() {
    let ctx = SchedulerContext::new(TS)
        .with_track("trading-io-live")
        .with_io_policy(broker_io(4));
    let r = run(&evidence_free_engine(), &ctx);
    assert_eq!(r.reasons, vec!["delta_s_evidence_missing"]);
    assert_eq!(step_ids(&r).last(), Some(&"io.submit"));
    // The reversible connect ahead of it was admitted.
    assert!(r.steps[r.steps.len() - 2].ok);
}

#[test]
fn refused_collapse_token_records_policy() {
    let ctx = agent_ctx().with_delta_s_policy(DeltaSPolicy::enforcing(0.9));
    let p = plan(&surf_ir_with_operators(), &ctx).unwrap();
    assert!(p.execution_token.collapse_requires_delta_s);
    assert_eq!(p.execution_token.delta_s_policy.min_delta_s, 0.9);
}
