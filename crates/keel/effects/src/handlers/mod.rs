//! Built-in effect families.

mod delta_s;
mod generic;
mod lane;
mod operator;
mod pde;
mod trading;

use keel_canon::{canonical_json, CanonError, Digest};
use keel_token::Lane;
use serde::Serialize;
use serde_json::Value;

use crate::adapter::LaneOp;
use crate::context::EffectContext;
use crate::error::EffectError;
use crate::redact::redact_value;
use crate::registry::HandlerRegistry;
use crate::step::EffectStep;

pub use lane::LaneHandler;

pub(crate) fn register_builtins(registry: &mut HandlerRegistry) {
    registry.register("NOOP", crate::registry::NoopHandler);
    registry.register("EMIT_ARTIFACT", generic::emit_artifact);
    registry.register("ARTIFACT_DIGEST", generic::artifact_digest);
    registry.register("TERM_APPLY", generic::term_apply);
    registry.register("LOWER_BACKEND", generic::lower_backend);

    for lane in [Lane::Io, Lane::Net] {
        for op in LaneOp::ALL {
            registry.register(op.effect_type(lane), LaneHandler::new(lane, op));
        }
    }

    registry.register("DELTA_S_COMPUTE", delta_s::compute);
    registry.register("COLLAPSE_COMMIT", delta_s::collapse_commit);
    registry.register("OPERATOR_INVOKE", operator::invoke);

    registry.register("TRADING_SIGNAL", trading::signal);
    registry.register("TRADING_FILL", trading::fill);
    registry.register("TRADING_RISK", trading::risk);
    registry.register("TRADING_REPORT", trading::report);

    registry.register("PDE_EVOLVE", pde::evolve);
    registry.register("PDE_PROJECT", pde::project);
    registry.register("PDE_BARRIER_CHECK", pde::barrier_check);
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|f: &f64| f.is_finite())
}

pub(crate) fn arg_f64(step: &EffectStep, key: &str) -> Result<f64, EffectError> {
    let value = step
        .args
        .get(key)
        .ok_or_else(|| EffectError::missing(&step.effect_type, key))?;
    number(value).ok_or_else(|| EffectError::invalid(&step.effect_type, key, "not a finite number"))
}

pub(crate) fn arg_f64_or(step: &EffectStep, key: &str, default: f64) -> Result<f64, EffectError> {
    match step.args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(_) => arg_f64(step, key),
    }
}

pub(crate) fn arg_usize_or(
    step: &EffectStep,
    key: &str,
    default: usize,
) -> Result<usize, EffectError> {
    match step.args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            .map(|n| n as usize)
            .ok_or_else(|| {
                EffectError::invalid(&step.effect_type, key, "not a non-negative integer")
            }),
    }
}

pub(crate) fn arg_str<'a>(step: &'a EffectStep, key: &str) -> Option<&'a str> {
    step.args
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A list of finite numbers, if the argument is present.
pub(crate) fn arg_f64_list(step: &EffectStep, key: &str) -> Result<Option<Vec<f64>>, EffectError> {
    match step.args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => f64_list(value)
            .map(Some)
            .ok_or_else(|| EffectError::invalid(&step.effect_type, key, "not a list of numbers")),
    }
}

pub(crate) fn f64_list(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(number).collect()
}

/// A blackboard entry an earlier step of the same family must have left.
pub(crate) fn upstream<'a>(
    ctx: &'a EffectContext,
    step: &EffectStep,
    key: &str,
) -> Result<&'a Value, EffectError> {
    ctx.get(key).ok_or_else(|| EffectError::MissingInput {
        effect_type: step.effect_type.clone(),
        key: key.to_string(),
    })
}

/// Redact `value`, digest it and, when an artifact directory is configured,
/// write its canonical encoding to `<dir>/<name>.json`. The digest always
/// covers the exact bytes written.
pub(crate) fn emit<T: Serialize + ?Sized>(
    ctx: &EffectContext,
    name: &str,
    value: &T,
) -> Result<Digest, EffectError> {
    let value = serde_json::to_value(value).map_err(CanonError::from)?;
    let text = canonical_json(&redact_value(&value))?;
    let digest = Digest::of_bytes(text.as_bytes());
    if let Some(dir) = &ctx.artifact_dir {
        let path = dir.join(format!("{}.json", sanitize(name)));
        let write_err = |source| EffectError::ArtifactWrite {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(write_err)?;
        std::fs::write(&path, text.as_bytes()).map_err(write_err)?;
    }
    Ok(digest)
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "artifact".to_string()
    } else {
        trimmed.to_string()
    }
}
