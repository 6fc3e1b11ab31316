//! E2E: the two-term SURF program through planner and runtime.
//!
//! Covers the approved path and every denial a contract or token can raise
//! on a legacy (one step per term) plan.

use keel_runtime::{ExecutionContract, RunStatus, RuntimeContext, COMPLETE_STAGE, START_STAGE};
use keel_scheduler::{plan, PlanStatus, SchedulerContext, PLAN_STAGE};
use keel_tests::{builtin_engine, stages, step_ids, surf_ir, TS};

fn rctx() -> RuntimeContext {
    RuntimeContext::new(TS)
}

// ---------------------------------------------------------------------------
// Approved path
// ---------------------------------------------------------------------------

#[test]
fn surf_plan_and_run_complete() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    assert_eq!(p.status, PlanStatus::Planned);
    assert_eq!(p.steps.len(), 2);
    assert_eq!(
        p.execution_token.allowed_backends,
        vec!["CLASSICAL", "PYTHON", "QASM"]
    );
    assert_eq!(p.witness_records.last().unwrap().stage, PLAN_STAGE);

    let r = builtin_engine()
        .run(&p, &rctx(), &ExecutionContract::new())
        .unwrap();
    assert_eq!(r.status, RunStatus::Completed);
    assert_eq!(step_ids(&r), vec!["SURF_A", "SURF_B"]);
    assert!(r.steps.iter().all(|s| s.ok && s.artifact_digests.len() == 1));
    assert_eq!(
        stages(&r),
        vec![
            START_STAGE,
            "runtime_step:SURF_A",
            "runtime_step:SURF_B",
            COMPLETE_STAGE
        ]
    );
    assert!(r.witness_records.iter().all(|w| w.verify_attestation()));
    assert!(r.verify_id());
}

#[test]
fn step_witness_carries_step_digests() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let r = builtin_engine()
        .run(&p, &rctx(), &ExecutionContract::new())
        .unwrap();
    for (step, witness) in r.steps.iter().zip(&r.witness_records[1..]) {
        assert_eq!(witness.artifact_digests, step.artifact_digests);
    }
}

// ---------------------------------------------------------------------------
// Contract denials
// ---------------------------------------------------------------------------

#[test]
fn allowlist_denies_first_unlisted_step() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let contract = ExecutionContract::new().allow_steps(["SURF_B"]);
    let r = builtin_engine().run(&p, &rctx(), &contract).unwrap();

    assert_eq!(r.status, RunStatus::Denied);
    assert_eq!(r.reasons, vec!["step not allowed: SURF_A"]);
    // SURF_B never runs.
    assert_eq!(step_ids(&r), vec!["SURF_A"]);
    assert!(!r.steps[0].ok);

    let cw = &r.constraint_witnesses[0];
    assert_eq!(cw.stage, "runtime_step:SURF_A");
    assert!(cw.artifact_digests.contains(&p.plan_id));
    assert!(cw.verify_id());

    let report = &r.observer_reports[0];
    assert_eq!(report.constraint_witness_id, cw.witness_id);
    let dual = report.dual_proposal.as_ref().unwrap();
    assert_eq!(dual.dual_actions[0].target, "step not allowed: SURF_A");
}

#[test]
fn required_backend_mismatch() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let contract = ExecutionContract::new().require_backend("QASM");
    let r = builtin_engine().run(&p, &rctx(), &contract).unwrap();
    assert_eq!(
        r.reasons,
        vec!["required backend mismatch: expected QASM, got CLASSICAL"]
    );
}

#[test]
fn empty_allowlist_places_no_restriction() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let contract = ExecutionContract::new().allow_steps(Vec::<String>::new());
    let r = builtin_engine().run(&p, &rctx(), &contract).unwrap();
    assert!(r.is_completed());
}

// ---------------------------------------------------------------------------
// Token denials
// ---------------------------------------------------------------------------

#[test]
fn budget_of_one_refuses_second_step() {
    let ctx = SchedulerContext::new(TS).with_budget_steps(1);
    let p = plan(&surf_ir(), &ctx).unwrap();
    let r = builtin_engine()
        .run(&p, &rctx(), &ExecutionContract::new())
        .unwrap();

    assert_eq!(r.status, RunStatus::Denied);
    assert_eq!(r.reasons, vec!["budget_steps_exceeded"]);
    assert!(r.steps[0].ok);
    assert_eq!(
        r.steps[1].refusal_type.as_deref(),
        Some("budget_steps_exceeded")
    );

    // Evidence names what ran before the refusal.
    let cw = &r.constraint_witnesses[0];
    assert_eq!(cw.stage, "runtime_step:SURF_B");
    assert!(cw.artifact_digests.contains(&r.steps[0].artifact_digests[0]));
}

#[test]
fn backend_outside_token_is_refused() {
    let ctx = SchedulerContext::new(TS)
        .with_backends(["CLASSICAL"])
        .with_backend("QASM");
    let p = plan(&surf_ir(), &ctx).unwrap();
    assert_eq!(p.execution_token.allowed_backends, vec!["CLASSICAL"]);

    let r = builtin_engine()
        .run(&p, &rctx(), &ExecutionContract::new())
        .unwrap();
    assert_eq!(r.reasons, vec!["backend not permitted: QASM"]);
    assert_eq!(r.steps.len(), 1);
}

#[test]
fn ir_policy_backend_applies_without_context_override() {
    let mut ir = surf_ir();
    ir.scheduler_policy.backend = Some("python".into());
    let p = plan(&ir, &SchedulerContext::new(TS)).unwrap();
    assert_eq!(p.steps[0].requires.backend.as_deref(), Some("PYTHON"));

    let p = plan(&ir, &SchedulerContext::new(TS).with_backend("qasm")).unwrap();
    assert_eq!(p.steps[0].requires.backend.as_deref(), Some("QASM"));
}
