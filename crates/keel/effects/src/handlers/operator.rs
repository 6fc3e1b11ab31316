use serde_json::{json, Value};
use tracing::warn;

use super::{arg_str, emit};
use crate::context::EffectContext;
use crate::error::EffectError;
use crate::step::{EffectResult, EffectStep};

/// Invoke a canonical operator on the given inputs.
///
/// The invocation is bookkeeping: its artifact is the digest of the
/// operator id and inputs. When the context carries an allowlist the
/// operator must be on it.
pub(super) fn invoke(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let operator_id = arg_str(step, "operator_id")
        .or(step.requires.operator_id.as_deref())
        .ok_or_else(|| EffectError::missing(&step.effect_type, "operator_id"))?;

    if let Some(allowlist) = &ctx.operator_allowlist {
        if !allowlist.contains(operator_id) {
            warn!(step_id = %step.step_id, operator_id, "Operator not on allowlist");
            return Ok(EffectResult::refused(
                step,
                "operator_not_allowlisted",
                vec![format!("operator_not_allowlisted: {operator_id}")],
                vec![],
            ));
        }
    }

    let inputs = step.args.get("inputs").cloned().unwrap_or(Value::Null);
    let invocation = json!({
        "operator_id": operator_id,
        "inputs": inputs,
    });
    let digest = emit(ctx, &format!("{}.operator", step.step_id), &invocation)?;
    ctx.put(format!("operator.{operator_id}"), json!(digest));
    Ok(EffectResult::ok(step, vec![digest]))
}
