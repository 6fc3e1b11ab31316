//! Adversarial: edited plans, tokens, witnesses and results are detected.

use keel_runtime::{ExecutionContract, RunStatus, RuntimeContext, RuntimeResult, PREFLIGHT_STAGE};
use keel_scheduler::{plan, ExecutionPlan, PlanStatus, SchedulerContext};
use keel_token::{ExecutionToken, TokenSpec};
use keel_tests::{builtin_engine, surf_ir, surf_ir_with_operators, write_registry, TS};
use keel_witness::{ObserverAction, ObserverAuthority};

const PLAN_TAMPERED: &str = "plan integrity check failed: plan_id does not match contents";
const TOKEN_TAMPERED: &str =
    "execution token integrity check failed: token_id does not match policy";

fn approved() -> ExecutionPlan {
    plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap()
}

fn run(p: &ExecutionPlan) -> RuntimeResult {
    builtin_engine()
        .run(p, &RuntimeContext::new(TS), &ExecutionContract::new())
        .unwrap()
}

// ---------------------------------------------------------------------------
// Plans and tokens
// ---------------------------------------------------------------------------

#[test]
fn edited_step_args_are_detected() {
    let mut p = approved();
    p.steps[0] = p.steps[0].clone().arg("coef", 100.0);
    assert!(!p.verify_id());

    let r = run(&p);
    assert_eq!(r.status, RunStatus::Denied);
    assert_eq!(r.reasons, vec![PLAN_TAMPERED]);
    assert!(r.steps.is_empty());
    assert_eq!(r.constraint_witnesses[0].stage, PREFLIGHT_STAGE);
}

#[test]
fn appended_step_is_detected() {
    let mut p = approved();
    let extra = p.steps[1].clone();
    p.steps.push(extra);
    assert_eq!(run(&p).reasons, vec![PLAN_TAMPERED]);
}

#[test]
fn widened_token_is_detected() {
    let mut p = plan(
        &surf_ir(),
        &SchedulerContext::new(TS).with_backends(["CLASSICAL"]),
    )
    .unwrap();
    p.execution_token.allowed_backends.push("QASM".into());
    p.execution_token.budget_steps = 1_000;

    let r = run(&p);
    assert!(r.reasons.contains(&TOKEN_TAMPERED.to_string()));
    assert!(r.reasons.contains(&PLAN_TAMPERED.to_string()));
}

#[test]
fn reissued_token_id_still_breaks_plan_id() {
    // Re-deriving a consistent token does not re-derive the plan id.
    let mut p = approved();
    p.execution_token = ExecutionToken::build(
        TokenSpec::new()
            .backends(["CLASSICAL", "PYTHON", "QASM"])
            .budget_steps(1_000),
    );
    assert!(p.execution_token.verify_id());
    assert_eq!(run(&p).reasons, vec![PLAN_TAMPERED]);
}

#[test]
fn denied_plan_flipped_to_planned_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let ops = write_registry(dir.path(), "ops.json", &["H_KIN"]).unwrap();
    let mut p = plan(
        &surf_ir_with_operators(),
        &SchedulerContext::new(TS).with_registry([&ops]),
    )
    .unwrap();
    assert_eq!(p.status, PlanStatus::Denied);

    p.status = PlanStatus::Planned;
    p.reasons.clear();
    assert_eq!(run(&p).reasons, vec![PLAN_TAMPERED]);
}

#[test]
fn injected_reason_is_detected() {
    let mut p = approved();
    p.reasons.push("looks fine".into());
    assert!(!p.verify_id());
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

#[test]
fn edited_witness_fails_attestation() {
    let mut r = run(&approved());
    assert!(r.witness_records.iter().all(|w| w.verify_attestation()));

    r.witness_records[1].artifact_digests.clear();
    assert!(!r.witness_records[1].verify_attestation());

    let mut w = r.witness_records[0].clone();
    w.timestamp = "2030-01-01T00:00:00Z".into();
    assert!(!w.verify_attestation());
}

#[test]
fn edited_result_fails_verification() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS).with_budget_steps(1)).unwrap();
    let r = run(&p);
    assert!(r.verify_id());

    let mut flipped = r.clone();
    flipped.status = RunStatus::Completed;
    assert!(!flipped.verify_id());

    let mut cleared = r.clone();
    cleared.reasons.clear();
    assert!(!cleared.verify_id());

    let mut truncated = r.clone();
    truncated.steps.pop();
    assert!(!truncated.verify_id());
}

#[test]
fn edited_constraint_witness_fails_verification() {
    let p = plan(&surf_ir(), &SchedulerContext::new(TS).with_budget_steps(1)).unwrap();
    let mut cw = run(&p).constraint_witnesses.remove(0);
    assert!(cw.verify_id());
    cw.refusal_reasons = vec!["nothing to see".into()];
    assert!(!cw.verify_id());
}

// ---------------------------------------------------------------------------
// Observer authority
// ---------------------------------------------------------------------------

#[test]
fn observer_cannot_act() {
    for action in [
        ObserverAction::AuthorizeCollapse,
        ObserverAction::DefineSemantics,
        ObserverAction::OverrideInvariant,
    ] {
        assert!(ObserverAuthority.check(action).is_err(), "{action}");
        assert!(!ObserverAuthority.permits(action));
    }
    for action in [
        ObserverAction::Observe,
        ObserverAction::EmitTrace,
        ObserverAction::EmitAttestation,
    ] {
        assert!(ObserverAuthority.check(action).is_ok(), "{action}");
    }
}
