//! E2E: runs wired from a `KernelConfig`.

use keel_effects::HandlerRegistry;
use keel_runtime::{ExecutionContract, KernelConfig, RuntimeContext, RuntimeEngine};
use keel_scheduler::{plan, SchedulerContext};
use keel_tests::{surf_ir, TS};
use keel_witness::WitnessRecord;

fn trace_lines(path: &std::path::Path) -> Vec<WitnessRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn configured_sink_mirrors_every_witness() {
    let dir = tempfile::tempdir().unwrap();
    let sink = dir.path().join("trace").join("witness.jsonl");
    let mut config = KernelConfig::default();
    config.trace.sink_path = Some(sink.clone());

    let engine = RuntimeEngine::from_config(HandlerRegistry::with_builtins(), &config);
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let r = engine
        .run(
            &p,
            &RuntimeContext::from_config(&config, TS),
            &ExecutionContract::new(),
        )
        .unwrap();

    let mirrored = trace_lines(&sink);
    assert_eq!(mirrored, r.witness_records);
    assert!(mirrored.iter().all(|w| w.verify_attestation()));
}

#[test]
fn sink_appends_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let sink = dir.path().join("witness.jsonl");
    let mut config = KernelConfig::default();
    config.trace.sink_path = Some(sink.clone());

    let engine = RuntimeEngine::from_config(HandlerRegistry::with_builtins(), &config);
    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let rctx = RuntimeContext::from_config(&config, TS);
    let first = engine.run(&p, &rctx, &ExecutionContract::new()).unwrap();
    let second = engine.run(&p, &rctx, &ExecutionContract::new()).unwrap();

    assert_eq!(
        trace_lines(&sink).len(),
        first.witness_records.len() + second.witness_records.len()
    );
}

#[test]
fn configured_observers_off_suppresses_reports() {
    let mut config = KernelConfig::default();
    config.runtime.observers = Some(vec![]);

    let p = plan(&surf_ir(), &SchedulerContext::new(TS).with_budget_steps(1)).unwrap();
    let r = RuntimeEngine::from_config(HandlerRegistry::with_builtins(), &config)
        .run(
            &p,
            &RuntimeContext::from_config(&config, TS),
            &ExecutionContract::new(),
        )
        .unwrap();

    assert!(!r.is_completed());
    assert!(r.observer_reports.is_empty());
    // Evidence is still produced.
    assert_eq!(r.constraint_witnesses.len(), 1);
}

#[test]
fn configured_dual_proposal_off() {
    let mut config = KernelConfig::default();
    config.runtime.emit_dual_proposal = false;

    let p = plan(&surf_ir(), &SchedulerContext::new(TS).with_budget_steps(1)).unwrap();
    let r = RuntimeEngine::from_config(HandlerRegistry::with_builtins(), &config)
        .run(
            &p,
            &RuntimeContext::from_config(&config, TS),
            &ExecutionContract::new(),
        )
        .unwrap();

    assert_eq!(r.observer_reports.len(), 1);
    assert!(r.observer_reports[0].dual_proposal.is_none());
}

#[test]
fn trace_sink_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let sink = dir.path().join("witness.jsonl");
    let file = dir.path().join("keel.toml");
    std::fs::write(
        &file,
        format!("[trace]\nsink_path = {:?}\n", sink.display().to_string()),
    )
    .unwrap();

    let config = KernelConfig::load(Some(&file)).unwrap();
    assert_eq!(config.trace.sink_path.as_deref(), Some(sink.as_path()));

    let p = plan(&surf_ir(), &SchedulerContext::new(TS)).unwrap();
    let r = RuntimeEngine::from_config(HandlerRegistry::with_builtins(), &config)
        .run(
            &p,
            &RuntimeContext::from_config(&config, TS),
            &ExecutionContract::new(),
        )
        .unwrap();
    assert_eq!(trace_lines(&sink).len(), r.witness_records.len());
}
