use std::f64::consts::PI;

use serde_json::json;
use tracing::warn;

use super::{arg_f64_list, arg_f64_or, arg_usize_or, emit, f64_list, upstream};
use crate::context::EffectContext;
use crate::error::EffectError;
use crate::step::{EffectResult, EffectStep};

const FIELD: &str = "pde.field";

/// One explicit step of periodic viscous Burgers,
/// `u_t + u u_x = nu u_xx`, with central differences.
fn burgers_step(u: &[f64], nu: f64, dt: f64, dx: f64) -> Vec<f64> {
    let n = u.len();
    (0..n)
        .map(|i| {
            let left = u[(i + n - 1) % n];
            let right = u[(i + 1) % n];
            let advection = u[i] * (right - left) / (2.0 * dx);
            let diffusion = nu * (right - 2.0 * u[i] + left) / (dx * dx);
            u[i] + dt * (diffusion - advection)
        })
        .collect()
}

pub(super) fn evolve(step: &EffectStep, ctx: &mut EffectContext) -> Result<EffectResult, EffectError> {
    let initial = match arg_f64_list(step, "initial")? {
        Some(u) => u,
        None => {
            let n = arg_usize_or(step, "n", 16)?;
            (0..n)
                .map(|i| (2.0 * PI * i as f64 / n as f64).sin())
                .collect()
        }
    };
    if initial.len() < 3 {
        return Err(EffectError::invalid(
            &step.effect_type,
            "n",
            format!("need at least 3 grid points, got {}", initial.len()),
        ));
    }
    let nu = arg_f64_or(step, "nu", 0.1)?;
    let dt = arg_f64_or(step, "dt", 0.01)?;
    let dx = arg_f64_or(step, "dx", 1.0 / initial.len() as f64)?;
    let steps = arg_usize_or(step, "steps", 10)?;
    if dx <= 0.0 {
        return Err(EffectError::invalid(&step.effect_type, "dx", "must be positive"));
    }

    let mut u = initial;
    for _ in 0..steps {
        u = burgers_step(&u, nu, dt, dx);
    }

    // Non-finite values cannot be encoded as JSON numbers; they become null
    // and the barrier check treats them as violations.
    let record = json!({
        "nu": nu,
        "dt": dt,
        "dx": dx,
        "steps": steps,
        "field": u,
    });
    let digest = emit(ctx, &format!("{}.field", step.step_id), &record)?;
    ctx.put(FIELD, record["field"].clone());
    Ok(EffectResult::ok(step, vec![digest]))
}

/// Remove the field mean. A field with non-finite entries passes through
/// unchanged; the barrier check refuses it.
pub(super) fn project(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let field = upstream(ctx, step, FIELD)?;
    if !field.is_array() {
        return Err(EffectError::invalid(&step.effect_type, FIELD, "not a list"));
    }
    let Some(u) = f64_list(field) else {
        warn!(step_id = %step.step_id, "Field has non-finite entries, not projected");
        let record = json!({"removed_mean": null, "field": field, "finite": false});
        let digest = emit(ctx, &format!("{}.projected", step.step_id), &record)?;
        return Ok(EffectResult::ok(step, vec![digest]));
    };
    let mean = u.iter().sum::<f64>() / u.len().max(1) as f64;
    let projected: Vec<f64> = u.iter().map(|x| x - mean).collect();

    let digest = emit(
        ctx,
        &format!("{}.projected", step.step_id),
        &json!({"removed_mean": mean, "field": projected}),
    )?;
    ctx.put(FIELD, json!(projected));
    Ok(EffectResult::ok(step, vec![digest]))
}

/// Refuse when any value is non-finite or exceeds the barrier in magnitude.
pub(super) fn barrier_check(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let field = upstream(ctx, step, FIELD)?;
    let barrier = arg_f64_or(step, "barrier", 10.0)?;
    let values = field.as_array().cloned().unwrap_or_default();
    let finite: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    let all_finite = finite.len() == values.len();
    let max_abs = finite.iter().fold(0.0_f64, |m, x| m.max(x.abs()));

    let record = json!({
        "barrier": barrier,
        "max_abs": max_abs,
        "finite": all_finite,
    });
    let digest = emit(ctx, &format!("{}.barrier", step.step_id), &record)?;
    if !all_finite || max_abs > barrier {
        warn!(step_id = %step.step_id, max_abs, barrier, all_finite, "Barrier violated");
        return Ok(EffectResult::refused_with(step, "barrier_violated", vec![digest]));
    }
    Ok(EffectResult::ok(step, vec![digest]))
}
