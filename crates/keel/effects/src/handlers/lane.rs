use keel_canon::digest_value;
use keel_token::Lane;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{arg_str, emit};
use crate::adapter::{AdapterOutcome, LaneOp, LaneRequest};
use crate::context::{latency_bucket, EffectContext};
use crate::error::EffectError;
use crate::redact::redact_value;
use crate::registry::EffectHandler;
use crate::step::{EffectResult, EffectStep};

/// Handler for one `<LANE>_<OP>` effect type.
///
/// The adapter sees the request as declared; every call leaves a redacted
/// request/response/event trail whose digest is attached to the result,
/// refused or not.
#[derive(Clone, Copy, Debug)]
pub struct LaneHandler {
    lane: Lane,
    op: LaneOp,
}

impl LaneHandler {
    pub fn new(lane: Lane, op: LaneOp) -> Self {
        Self { lane, op }
    }

    fn key(&self, name: &str) -> String {
        format!("lane.{}.{}", self.lane, name)
    }

    fn build_request(&self, step: &EffectStep, ctx: &EffectContext) -> LaneRequest {
        let mut payload = Value::Object(step.args.clone());
        if self.op == LaneOp::Cancel && payload.get("order_id").is_none() {
            if let (Some(map), Some(order)) =
                (payload.as_object_mut(), ctx.get(&self.key("last_order_id")))
            {
                map.insert("order_id".into(), order.clone());
            }
        }
        LaneRequest {
            lane: self.lane,
            op: self.op,
            step_id: step.step_id.clone(),
            endpoint: step
                .requires
                .endpoint
                .clone()
                .or_else(|| arg_str(step, "endpoint").map(str::to_string)),
            nonce: step
                .requires
                .nonce
                .clone()
                .unwrap_or_else(|| ctx.expected_nonce()),
            payload,
        }
    }
}

impl EffectHandler for LaneHandler {
    fn handle(
        &self,
        step: &EffectStep,
        ctx: &mut EffectContext,
    ) -> Result<EffectResult, EffectError> {
        let request = self.build_request(step, ctx);
        let recorded_request = redact_value(&request.to_value());
        let request_digest = digest_value(&recorded_request);
        let adapter_kind = ctx.adapter_kind(self.lane);
        let (mode, redaction_policy_id) = {
            let rules = ctx.token.lane(self.lane);
            (rules.mode.to_string(), rules.redaction_policy_id.to_string())
        };

        ctx.record_lane_call(self.lane);
        let outcome = ctx.adapter(self.lane).call(&request)?;

        let mut events = vec![json!({
            "event": "request_built",
            "request_digest": request_digest,
        })];
        let response = match &outcome {
            AdapterOutcome::Accepted(body) => {
                let body = redact_value(body);
                events.push(json!({
                    "event": "adapter_response",
                    "status": body.get("status").cloned().unwrap_or(Value::Null),
                }));
                body
            }
            AdapterOutcome::Refused { refusal_type, .. } => {
                events.push(json!({
                    "event": "adapter_refused",
                    "refusal_type": refusal_type,
                }));
                Value::Null
            }
        };

        let trail = json!({
            "lane": self.lane,
            "op": self.op,
            "step_id": step.step_id,
            "adapter": adapter_kind,
            "mode": mode,
            "redaction_policy_id": redaction_policy_id,
            "latency_bucket": latency_bucket(step.requires.latency_ms.unwrap_or(0)),
            "request": recorded_request,
            "response": response,
            "events": events,
        });
        let trail_digest = emit(
            ctx,
            &format!("{}.{}.trail", step.step_id, self.lane),
            &trail,
        )?;

        match outcome {
            AdapterOutcome::Accepted(_) => {
                debug!(lane = %self.lane, op = %self.op, step_id = %step.step_id, "Lane call accepted");
                if let Some(order) = response.get("order_id").filter(|v| !v.is_null()) {
                    ctx.put(self.key("last_order_id"), order.clone());
                }
                ctx.put(self.key("last_response"), response);
                Ok(EffectResult::ok(step, vec![trail_digest]))
            }
            AdapterOutcome::Refused {
                refusal_type,
                reason,
            } => {
                warn!(lane = %self.lane, op = %self.op, step_id = %step.step_id, %refusal_type, "Lane call refused by adapter");
                Ok(EffectResult::refused(
                    step,
                    refusal_type,
                    vec![reason],
                    vec![trail_digest],
                ))
            }
        }
    }
}
