//! Shared fixtures for the Keel integration tests.
//!
//! Builds programs, policies, registry files and signed epoch anchors so
//! the test binaries under `tests/` can drive the planner and runtime end
//! to end.

use std::io;
use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use keel_effects::{HandlerRegistry, LaneOp};
use keel_runtime::{RuntimeEngine, RuntimeResult};
use keel_scheduler::{broker_scope, feed_cap, ProgramIr, Term};
use keel_token::{IoPolicy, NetPolicy};
use serde_json::json;

/// Timestamp every fixture run is stamped with.
pub const TS: &str = "2026-01-01T00:00:00Z";

/// Seed of the key that signs fixture anchors.
pub const ANCHOR_KEY_SEED: [u8; 32] = [42u8; 32];

/// Two-term program used throughout: `SURF_A` (coef 1) and `SURF_B` (coef 2).
pub fn surf_ir() -> ProgramIr {
    ProgramIr::new()
        .term(Term::new("SURF_A", 1.0))
        .term(Term::new("SURF_B", 2.0))
}

/// `surf_ir` with `SURF_A -> H_KIN` and `SURF_B -> H_POT`.
pub fn surf_ir_with_operators() -> ProgramIr {
    surf_ir()
        .operator("SURF_A", "H_KIN")
        .operator("SURF_B", "H_POT")
}

/// Program of `n` terms named `T0..`.
pub fn terms_ir(n: usize) -> ProgramIr {
    (0..n).fold(ProgramIr::new(), |ir, i| {
        ir.term(Term::new(format!("T{i}"), i as f64 + 1.0))
    })
}

pub fn builtin_engine() -> RuntimeEngine {
    RuntimeEngine::new(HandlerRegistry::with_builtins())
}

/// IO policy granting every broker operation.
pub fn broker_io(budget_calls: u64) -> IoPolicy {
    let scopes: Vec<String> = LaneOp::ALL.iter().map(|op| broker_scope(*op)).collect();
    let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
    IoPolicy::allowing(&scopes, budget_calls)
}

/// NET policy granting every feed operation.
pub fn feed_net(budget_calls: u64) -> NetPolicy {
    let caps: Vec<String> = LaneOp::ALL.iter().map(|op| feed_cap(*op)).collect();
    let caps: Vec<&str> = caps.iter().map(String::as_str).collect();
    NetPolicy::allowing(&caps, budget_calls)
}

/// Write `{"operators": [{"operator_id": ..}, ..]}` to `dir/name`.
pub fn write_registry(dir: &Path, name: &str, operator_ids: &[&str]) -> io::Result<PathBuf> {
    let operators: Vec<_> = operator_ids
        .iter()
        .map(|id| json!({"operator_id": id, "arity": 1}))
        .collect();
    let path = dir.join(name);
    std::fs::write(&path, json!({ "operators": operators }).to_string())?;
    Ok(path)
}

/// Write an anchor for `root` signed with the fixture key.
pub fn write_anchor(dir: &Path, epoch_id: &str, root: &str, commit: &str) -> io::Result<PathBuf> {
    let key = SigningKey::from_bytes(&ANCHOR_KEY_SEED);
    let anchor = keel_epoch::sign_anchor(&key, epoch_id, root, commit).map_err(io::Error::other)?;
    let text = serde_json::to_string_pretty(&anchor).map_err(io::Error::other)?;
    let path = dir.join(format!("{epoch_id}.anchor.json"));
    std::fs::write(&path, text)?;
    Ok(path)
}

/// Write a `{"prices": [..]}` fixture.
pub fn write_prices(dir: &Path, prices: &[f64]) -> io::Result<PathBuf> {
    let path = dir.join("prices.json");
    std::fs::write(&path, json!({ "prices": prices }).to_string())?;
    Ok(path)
}

/// Witness stages of a run, in order.
pub fn stages(result: &RuntimeResult) -> Vec<&str> {
    result
        .witness_records
        .iter()
        .map(|w| w.stage.as_str())
        .collect()
}

/// Ids of the steps a run produced results for.
pub fn step_ids(result: &RuntimeResult) -> Vec<&str> {
    result.steps.iter().map(|s| s.step_id.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_registry::{JsonRegistryLoader, RegistrySource};

    #[test]
    fn broker_io_covers_every_op() {
        let io = broker_io(3);
        assert!(io.io_allowed);
        assert_eq!(io.io_scopes.len(), LaneOp::ALL.len());
        assert_eq!(io.io_budget_calls, 3);
    }

    #[test]
    fn registry_fixture_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_registry(dir.path(), "ops.json", &["H_KIN", "H_POT"]).unwrap();
        let loaded = JsonRegistryLoader::new([path]).load().unwrap();
        assert!(loaded.contains("H_KIN"));
        assert!(loaded.errors.is_empty());
    }
}
