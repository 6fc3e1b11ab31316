use std::path::PathBuf;

use keel_canon::digest_file;
use serde_json::{json, Value};

use super::{arg_str, emit};
use crate::context::EffectContext;
use crate::error::EffectError;
use crate::step::{EffectResult, EffectStep};

/// Digest `args.payload` (or all args when there is no payload) and write it
/// under the artifact directory when one is configured.
pub(super) fn emit_artifact(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let payload = match step.args.get("payload") {
        Some(p) => p.clone(),
        None => Value::Object(step.args.clone()),
    };
    let name = arg_str(step, "name").unwrap_or(step.step_id.as_str());
    let digest = emit(ctx, name, &payload)?;
    ctx.put(format!("artifact.{}", step.step_id), json!(digest));
    Ok(EffectResult::ok(step, vec![digest]))
}

/// Digest an existing file. A missing file is a fault.
pub(super) fn artifact_digest(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let raw = arg_str(step, "path").ok_or_else(|| EffectError::missing(&step.effect_type, "path"))?;
    let mut path = PathBuf::from(raw);
    if path.is_relative() {
        if let Some(dir) = &ctx.artifact_dir {
            path = dir.join(path);
        }
    }
    let digest = digest_file(&path)?;
    ctx.put(format!("artifact.{}", step.step_id), json!(digest));
    Ok(EffectResult::ok(step, vec![digest]))
}

/// Legacy per-term step.
pub(super) fn term_apply(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let term = arg_str(step, "term").unwrap_or(step.step_id.as_str());
    let coef = step.args.get("coef").cloned().unwrap_or(Value::Null);
    let record = json!({
        "term": term,
        "coef": coef,
        "backend": step.requires.backend,
    });
    let digest = emit(ctx, &format!("term.{}", step.step_id), &record)?;
    Ok(EffectResult::ok(step, vec![digest]))
}

/// Records the request to lower the program for one backend. The lowering
/// itself happens outside the kernel.
pub(super) fn lower_backend(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let backend = arg_str(step, "backend")
        .map(str::to_string)
        .or_else(|| step.requires.backend.clone())
        .ok_or_else(|| EffectError::missing(&step.effect_type, "backend"))?;
    let request = json!({
        "request": "lower",
        "backend": backend.to_ascii_uppercase(),
        "program_id": step.args.get("program_id").cloned().unwrap_or(Value::Null),
    });
    let digest = emit(ctx, &format!("lower.{}", step.step_id), &request)?;
    Ok(EffectResult::ok(step, vec![digest]))
}
