use serde_json::json;
use tracing::{info, warn};

use super::{arg_f64, arg_str, emit};
use crate::context::{DeltaSEvidence, EffectContext};
use crate::error::EffectError;
use crate::step::{EffectResult, EffectStep};

/// `delta_s = entropy_before - entropy_after`, recorded as evidence for a
/// later irreversible step.
pub(super) fn compute(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let entropy_before = arg_f64(step, "entropy_before")?;
    let entropy_after = arg_f64(step, "entropy_after")?;
    let delta_s = entropy_before - entropy_after;

    let record = json!({
        "entropy_before": entropy_before,
        "entropy_after": entropy_after,
        "delta_s": delta_s,
        "policy": ctx.token.delta_s_policy,
    });
    let evidence_digest = emit(ctx, &format!("{}.delta_s", step.step_id), &record)?;
    ctx.delta_s = Some(DeltaSEvidence {
        entropy_before,
        entropy_after,
        delta_s,
        evidence_digest: evidence_digest.clone(),
    });
    info!(step_id = %step.step_id, delta_s, "Delta-S evidence recorded");
    Ok(EffectResult::ok(step, vec![evidence_digest]))
}

/// Irreversible commit, admitted only on sufficient delta-S evidence when
/// the token requires it.
pub(super) fn collapse_commit(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    if ctx.token.collapse_requires_delta_s {
        match &ctx.delta_s {
            None => {
                warn!(step_id = %step.step_id, "Collapse without delta-S evidence");
                return Ok(EffectResult::refused_with(step, "delta_s_evidence_missing", vec![]));
            }
            Some(evidence) if !ctx.token.delta_s_policy.admits(evidence.delta_s) => {
                warn!(step_id = %step.step_id, delta_s = evidence.delta_s, "Collapse inadmissible");
                return Ok(EffectResult::refused_with(
                    step,
                    "delta_s_inadmissible",
                    vec![evidence.evidence_digest.clone()],
                ));
            }
            Some(_) => {}
        }
    }

    let evidence = ctx.delta_s.as_ref();
    let commit = json!({
        "commit": arg_str(step, "label").unwrap_or(step.step_id.as_str()),
        "delta_s": evidence.map(|e| e.delta_s),
        "evidence_digest": evidence.map(|e| e.evidence_digest.clone()),
        "timestamp": ctx.timestamp,
    });
    let mut digests = Vec::new();
    if let Some(e) = evidence {
        digests.push(e.evidence_digest.clone());
    }
    digests.push(emit(ctx, &format!("{}.collapse", step.step_id), &commit)?);
    info!(step_id = %step.step_id, "Collapse committed");
    Ok(EffectResult::ok(step, digests))
}
