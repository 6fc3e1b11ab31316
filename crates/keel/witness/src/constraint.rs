use keel_canon::{digest_value, Digest};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Canonical evidence of a refusal.
///
/// Reasons and artifact digests are sorted and deduplicated before hashing,
/// so equal refusals always carry equal `witness_id`s.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintWitness {
    pub witness_id: Digest,
    pub stage: String,
    pub refusal_reasons: Vec<String>,
    pub artifact_digests: Vec<Digest>,
}

impl ConstraintWitness {
    pub fn new(
        stage: impl Into<String>,
        reasons: impl IntoIterator<Item = String>,
        artifact_digests: impl IntoIterator<Item = Digest>,
    ) -> Self {
        let stage = stage.into();
        let mut refusal_reasons: Vec<String> = reasons.into_iter().collect();
        refusal_reasons.sort();
        refusal_reasons.dedup();
        let mut artifact_digests: Vec<Digest> = artifact_digests.into_iter().collect();
        artifact_digests.sort();
        artifact_digests.dedup();

        let witness_id = witness_core_id(&stage, &refusal_reasons, &artifact_digests);
        Self {
            witness_id,
            stage,
            refusal_reasons,
            artifact_digests,
        }
    }

    pub fn verify_id(&self) -> bool {
        self.witness_id
            == witness_core_id(&self.stage, &self.refusal_reasons, &self.artifact_digests)
    }
}

fn witness_core_id(stage: &str, reasons: &[String], digests: &[Digest]) -> Digest {
    digest_value(&json!({
        "stage": stage,
        "refusal_reasons": reasons,
        "artifact_digests": digests,
    }))
}

/// One relaxation in a dual proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualAction {
    pub action: String,
    pub target: String,
}

impl DualAction {
    pub fn relax(target: impl Into<String>) -> Self {
        Self {
            action: "relax".into(),
            target: target.into(),
        }
    }
}

/// Deterministic relaxation proposal derived from a constraint witness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualProposal {
    pub source_witness_id: Digest,
    pub refusal_reasons: Vec<String>,
    pub dual_actions: Vec<DualAction>,
    pub dual_proposal_id: Digest,
}

/// Map a refusal to the set of constraints whose relaxation would lift it.
///
/// Pure: one `relax` action per distinct sorted reason, identical output
/// on every call.
pub fn invert_constraints(witness: &ConstraintWitness) -> DualProposal {
    let mut reasons = witness.refusal_reasons.clone();
    reasons.sort();
    reasons.dedup();
    let dual_actions: Vec<DualAction> = reasons.iter().map(DualAction::relax).collect();

    let dual_proposal_id = digest_value(&json!({
        "source_witness_id": witness.witness_id,
        "refusal_reasons": reasons,
        "dual_actions": dual_actions,
    }));

    DualProposal {
        source_witness_id: witness.witness_id.clone(),
        refusal_reasons: reasons,
        dual_actions,
        dual_proposal_id,
    }
}
