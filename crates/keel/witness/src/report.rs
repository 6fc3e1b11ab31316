use keel_canon::{digest_value, Digest};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::constraint::{invert_constraints, ConstraintWitness, DualProposal};
use crate::record::OBSERVER_ID;

/// Observer-gated summary of a refusal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverReport {
    pub report_id: Digest,
    pub observer_id: String,
    pub stage: String,
    pub constraint_witness_id: Digest,
    pub refusal_reasons: Vec<String>,
    pub dual_proposal: Option<DualProposal>,
}

impl ObserverReport {
    /// Summarize a constraint witness, embedding its dual proposal when asked.
    pub fn from_witness(witness: &ConstraintWitness, include_dual: bool) -> Self {
        let dual_proposal = include_dual.then(|| invert_constraints(witness));
        let report_id = digest_value(&json!({
            "observer_id": OBSERVER_ID,
            "stage": witness.stage,
            "constraint_witness_id": witness.witness_id,
            "refusal_reasons": witness.refusal_reasons,
            "dual_proposal": dual_proposal,
        }));
        Self {
            report_id,
            observer_id: OBSERVER_ID.to_string(),
            stage: witness.stage.clone(),
            constraint_witness_id: witness.witness_id.clone(),
            refusal_reasons: witness.refusal_reasons.clone(),
            dual_proposal,
        }
    }
}

/// Observer reports are on when no allowlist is given, or when the
/// allowlist names the observer. An empty list turns them off.
pub fn observer_reports_enabled(observers: Option<&[String]>) -> bool {
    match observers {
        None => true,
        Some(list) => list.iter().any(|o| o.trim() == OBSERVER_ID),
    }
}
