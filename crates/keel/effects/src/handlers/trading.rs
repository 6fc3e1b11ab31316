//! Simulated trading pipeline: signal, fill, risk, report.
//!
//! Steps pass prices, signals and fills forward through the blackboard
//! under `trading.*` keys.

use std::path::{Path, PathBuf};

use keel_canon::{digest_file, Digest};
use serde_json::{json, Value};
use tracing::warn;

use super::{arg_f64_list, arg_f64_or, arg_str, arg_usize_or, emit, f64_list, upstream};
use crate::context::EffectContext;
use crate::error::EffectError;
use crate::step::{EffectResult, EffectStep};

const PRICES: &str = "trading.prices";
const SIGNALS: &str = "trading.signals";
const FILLS: &str = "trading.fills";
const MODE: &str = "trading.mode";

const EPS: f64 = 1e-9;

fn read_fixture_prices(path: &Path) -> Result<Vec<f64>, EffectError> {
    let text = std::fs::read_to_string(path).map_err(|source| EffectError::FixtureRead {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_json::from_str(&text).map_err(|e| EffectError::FixtureParse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let list = match &doc {
        Value::Array(_) => &doc,
        other => other.get("prices").unwrap_or(&Value::Null),
    };
    f64_list(list).ok_or_else(|| EffectError::FixtureParse {
        path: path.to_path_buf(),
        detail: "expected a `prices` list of numbers".into(),
    })
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Moving-average crossover: +1 when the short average is above the long
/// one, -1 when below, 0 until enough history exists or on a tie.
pub(crate) fn crossover(prices: &[f64], short: usize, long: usize) -> Vec<i64> {
    (0..prices.len())
        .map(|i| {
            if i + 1 < long {
                return 0;
            }
            let s = mean(&prices[i + 1 - short..=i]);
            let l = mean(&prices[i + 1 - long..=i]);
            if s > l + EPS {
                1
            } else if s + EPS < l {
                -1
            } else {
                0
            }
        })
        .collect()
}

pub(super) fn signal(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let mut digests: Vec<Digest> = Vec::new();
    let prices = match arg_f64_list(step, "prices")? {
        Some(prices) => prices,
        None => {
            let path = arg_str(step, "fixture")
                .map(PathBuf::from)
                .or_else(|| ctx.fixture_path.clone())
                .ok_or_else(|| EffectError::missing(&step.effect_type, "prices"))?;
            digests.push(digest_file(&path)?);
            read_fixture_prices(&path)?
        }
    };

    let short = arg_usize_or(step, "short_window", 3)?;
    let long = arg_usize_or(step, "long_window", 5)?;
    if short == 0 || short >= long {
        return Err(EffectError::invalid(
            &step.effect_type,
            "short_window",
            format!("need 0 < short_window < long_window, got {short} and {long}"),
        ));
    }

    let signals = crossover(&prices, short, long);
    let record = json!({
        "short_window": short,
        "long_window": long,
        "prices": prices,
        "signals": signals,
    });
    digests.push(emit(ctx, &format!("{}.signal", step.step_id), &record)?);
    ctx.put(PRICES, json!(prices));
    ctx.put(SIGNALS, json!(signals));
    Ok(EffectResult::ok(step, digests))
}

pub(super) fn fill(step: &EffectStep, ctx: &mut EffectContext) -> Result<EffectResult, EffectError> {
    let prices = f64_list(upstream(ctx, step, PRICES)?).unwrap_or_default();
    let signals: Vec<f64> = f64_list(upstream(ctx, step, SIGNALS)?).unwrap_or_default();
    let mode = arg_str(step, "mode").unwrap_or("paper").to_string();
    let slippage_bps = arg_f64_or(step, "slippage_bps", 5.0)?;
    let quantity = arg_f64_or(step, "quantity", 1.0)?;

    let mut position = 0.0;
    let mut fills = Vec::new();
    for (index, (price, signal)) in prices.iter().zip(signals.iter()).enumerate() {
        let target = signal * quantity;
        let qty = target - position;
        if qty.abs() <= EPS {
            continue;
        }
        let fill_price = price * (1.0 + qty.signum() * slippage_bps / 10_000.0);
        fills.push(json!({
            "index": index,
            "side": if qty > 0.0 { "buy" } else { "sell" },
            "qty": qty,
            "price": fill_price,
        }));
        position = target;
    }

    let record = json!({
        "mode": mode,
        "slippage_bps": slippage_bps,
        "fills": fills,
    });
    let digest = emit(ctx, &format!("{}.fills", step.step_id), &record)?;
    ctx.put(FILLS, Value::Array(fills));
    ctx.put(MODE, json!(mode));
    Ok(EffectResult::ok(step, vec![digest]))
}

/// `(qty, price)` pairs from the fills on the blackboard.
fn fill_legs(fills: &Value) -> Vec<(f64, f64)> {
    fills
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|f| Some((f.get("qty")?.as_f64()?, f.get("price")?.as_f64()?)))
                .collect()
        })
        .unwrap_or_default()
}

pub(super) fn risk(step: &EffectStep, ctx: &mut EffectContext) -> Result<EffectResult, EffectError> {
    let legs = fill_legs(upstream(ctx, step, FILLS)?);
    let max_position = arg_f64_or(step, "max_position", 1.0)?;
    let net_position: f64 = legs.iter().map(|(qty, _)| qty).sum();

    let record = json!({
        "net_position": net_position,
        "max_position": max_position,
    });
    let digest = emit(ctx, &format!("{}.risk", step.step_id), &record)?;
    if net_position.abs() > max_position + EPS {
        warn!(step_id = %step.step_id, net_position, max_position, "Risk limit exceeded");
        return Ok(EffectResult::refused_with(
            step,
            "risk_limit_exceeded",
            vec![digest],
        ));
    }
    Ok(EffectResult::ok(step, vec![digest]))
}

pub(super) fn report(
    step: &EffectStep,
    ctx: &mut EffectContext,
) -> Result<EffectResult, EffectError> {
    let prices = f64_list(upstream(ctx, step, PRICES)?).unwrap_or_default();
    let legs = fill_legs(upstream(ctx, step, FILLS)?);
    let mode = ctx
        .get(MODE)
        .and_then(Value::as_str)
        .unwrap_or("paper")
        .to_string();

    let cash: f64 = legs.iter().map(|(qty, price)| -qty * price).sum();
    let net_position: f64 = legs.iter().map(|(qty, _)| qty).sum();
    let last_price = prices.last().copied().unwrap_or(0.0);
    let report = json!({
        "mode": mode,
        "fills": legs.len(),
        "net_position": net_position,
        "last_price": last_price,
        "pnl": cash + net_position * last_price,
    });
    let digest = emit(ctx, &format!("{}.report", step.step_id), &report)?;
    ctx.put("trading.report", report);
    Ok(EffectResult::ok(step, vec![digest]))
}
