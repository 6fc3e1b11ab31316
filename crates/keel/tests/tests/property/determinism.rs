//! Property tests: planning and running are pure functions of their inputs.

use keel_runtime::{ExecutionContract, RuntimeContext};
use keel_scheduler::{plan, ProgramIr, SchedulerContext, Term, Track};
use keel_tests::builtin_engine;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A program of 1..8 uniquely named terms with finite coefficients.
fn arb_program() -> impl Strategy<Value = ProgramIr> {
    prop::collection::btree_map("[A-Z]{1,6}", -1000.0f64..1000.0, 1..8).prop_map(|terms| {
        terms
            .into_iter()
            .fold(ProgramIr::new(), |ir, (id, coef)| ir.term(Term::new(id, coef)))
    })
}

fn arb_track() -> impl Strategy<Value = Option<Track>> {
    prop_oneof![
        Just(None),
        Just(Some(Track::CiGovernance)),
        Just(Some(Track::AgentGovernance)),
        Just(Some(Track::TradingPaper)),
        Just(Some(Track::NavierStokes)),
        Just(Some(Track::BackendLowering)),
    ]
}

fn arb_timestamp() -> impl Strategy<Value = String> {
    (2020u32..2040, 1u32..13, 1u32..29)
        .prop_map(|(y, m, d)| format!("{y:04}-{m:02}-{d:02}T00:00:00Z"))
}

fn ctx(ts: &str, track: Option<Track>) -> SchedulerContext {
    let ctx = SchedulerContext::new(ts);
    match track {
        Some(track) => ctx.with_track(track.as_str()),
        None => ctx,
    }
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Identical inputs give byte-identical canonical plans.
    #[test]
    fn plan_is_byte_identical(ir in arb_program(), track in arb_track()) {
        let a = plan(&ir, &ctx("2026-01-01T00:00:00Z", track)).unwrap();
        let b = plan(&ir, &ctx("2026-01-01T00:00:00Z", track)).unwrap();
        prop_assert_eq!(a.to_canonical_json().unwrap(), b.to_canonical_json().unwrap());
        prop_assert!(a.verify_id());
    }

    /// The timestamp reaches witnesses only, never the plan id.
    #[test]
    fn plan_id_ignores_timestamp(
        ir in arb_program(),
        track in arb_track(),
        t1 in arb_timestamp(),
        t2 in arb_timestamp(),
    ) {
        let a = plan(&ir, &ctx(&t1, track)).unwrap();
        let b = plan(&ir, &ctx(&t2, track)).unwrap();
        prop_assert_eq!(a.plan_id, b.plan_id);
    }

    /// Running one plan twice gives the same result id and witnesses.
    #[test]
    fn run_is_deterministic(ir in arb_program(), track in arb_track()) {
        let p = plan(&ir, &ctx("2026-01-01T00:00:00Z", track)).unwrap();
        let engine = builtin_engine();
        let rctx = RuntimeContext::new("2026-01-01T00:00:00Z");
        let a = engine.run(&p, &rctx, &ExecutionContract::new()).unwrap();
        let b = engine.run(&p, &rctx, &ExecutionContract::new()).unwrap();
        prop_assert_eq!(&a.result_id, &b.result_id);
        prop_assert_eq!(&a.witness_records, &b.witness_records);
        prop_assert!(a.verify_id());
    }

    /// Default tracks never touch a lane, so they complete under the
    /// default token.
    #[test]
    fn lane_free_tracks_complete(ir in arb_program(), track in arb_track()) {
        let p = plan(&ir, &ctx("2026-01-01T00:00:00Z", track)).unwrap();
        let r = builtin_engine()
            .run(&p, &RuntimeContext::new("2026-01-01T00:00:00Z"), &ExecutionContract::new())
            .unwrap();
        prop_assert!(r.is_completed(), "{:?}", r.reasons);
    }
}
