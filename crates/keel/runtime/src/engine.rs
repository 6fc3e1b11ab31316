use std::fmt;
use std::sync::Arc;

use keel_canon::{canonical_json, digest_of, CanonError, Digest};
use keel_effects::{EffectContext, EffectResult, EffectStep, HandlerRegistry, LiveTransport};
use keel_epoch::{Ed25519EpochVerifier, EpochVerifier};
use keel_registry::{JsonRegistryLoader, LoadedRegistry, RegistrySource};
use keel_scheduler::{check_epoch, check_registry, ExecutionPlan, Verification, EPOCH_STAGE};
use keel_witness::{
    observer_reports_enabled, ConstraintWitness, JsonlFileSink, NullSink, ObserverReport,
    TraceSink, WitnessLog, WitnessRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::KernelConfig;
use crate::context::RuntimeContext;
use crate::contract::Contract;
use crate::error::RuntimeFault;
use crate::gates::{default_gates, GateInput, GateOutcome, StepGate};

pub const START_STAGE: &str = "runtime_start";
pub const PREFLIGHT_STAGE: &str = "runtime_preflight";
pub const COMPLETE_STAGE: &str = "runtime_complete";

/// Witness stage for one step.
pub fn step_stage(step_id: &str) -> String {
    format!("runtime_step:{step_id}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Denied,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::Denied => f.write_str("denied"),
        }
    }
}

/// Outcome of one run.
///
/// `result_id` covers status, reasons, steps and verification; the
/// witnesses and reports that name it are excluded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResult {
    pub result_id: Digest,
    pub status: RunStatus,
    pub reasons: Vec<String>,
    pub steps: Vec<EffectResult>,
    pub verification: Verification,
    pub witness_records: Vec<WitnessRecord>,
    pub constraint_witnesses: Vec<ConstraintWitness>,
    pub observer_reports: Vec<ObserverReport>,
}

#[derive(Serialize)]
struct ResultCore<'a> {
    status: RunStatus,
    reasons: &'a [String],
    steps: &'a [EffectResult],
    verification: &'a Verification,
}

fn result_core_id(
    status: RunStatus,
    reasons: &[String],
    steps: &[EffectResult],
    verification: &Verification,
) -> Result<Digest, CanonError> {
    digest_of(&ResultCore {
        status,
        reasons,
        steps,
        verification,
    })
}

impl RuntimeResult {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn to_canonical_json(&self) -> Result<String, CanonError> {
        canonical_json(self)
    }

    pub fn verify_id(&self) -> bool {
        result_core_id(self.status, &self.reasons, &self.steps, &self.verification)
            .is_ok_and(|id| id == self.result_id)
    }
}

/// Where a run stopped and why.
struct Denial {
    stage: String,
    reasons: Vec<String>,
}

/// Runs approved plans step by step under their execution token.
///
/// Every step passes the contract preconditions, then the token gates, then
/// its handler, then the contract postconditions. The first failure ends
/// the run; nothing is rolled back.
pub struct RuntimeEngine {
    handlers: HandlerRegistry,
    gates: Vec<Box<dyn StepGate>>,
    registry: Option<Arc<dyn RegistrySource>>,
    verifier: Option<Arc<dyn EpochVerifier>>,
    sink: Arc<dyn TraceSink>,
    transport: Option<Arc<dyn LiveTransport>>,
}

impl RuntimeEngine {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self {
            handlers,
            gates: default_gates(),
            registry: None,
            verifier: None,
            sink: Arc::new(NullSink),
            transport: None,
        }
    }

    /// Engine with the trace sink named by `config`.
    pub fn from_config(handlers: HandlerRegistry, config: &KernelConfig) -> Self {
        let engine = Self::new(handlers);
        match &config.trace.sink_path {
            Some(path) => engine.with_sink(Arc::new(JsonlFileSink::new(path.clone()))),
            None => engine,
        }
    }

    pub fn with_registry_source(mut self, source: Arc<dyn RegistrySource>) -> Self {
        self.registry = Some(source);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn EpochVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_live_transport(mut self, transport: Arc<dyn LiveTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Append a gate after the built-in ones.
    pub fn with_gate(mut self, gate: Box<dyn StepGate>) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Execute `plan` under `rctx`, consulting `contract` around every step.
    ///
    /// Denials come back as a `denied` result. `Err` means a fault: an
    /// unreadable input, a failing handler or sink, or a denial without
    /// evidence.
    pub fn run(
        &self,
        plan: &ExecutionPlan,
        rctx: &RuntimeContext,
        contract: &dyn Contract,
    ) -> Result<RuntimeResult, RuntimeFault> {
        let ts = rctx.timestamp.as_str();
        let token = &plan.execution_token;
        let mut witnesses = WitnessLog::new();
        witnesses.append(
            START_STAGE,
            vec![plan.plan_id.clone(), token.token_id.clone()],
            ts,
        );
        info!(plan_id = %plan.plan_id, steps = plan.steps.len(), "Run started");

        let mut ectx = EffectContext::new(ts, token.clone())
            .with_adapters(&rctx.adapters, self.transport.clone())?;
        if let Some(dir) = &rctx.artifact_dir {
            ectx = ectx.with_artifact_dir(dir.clone());
        }

        let mut verification = Verification::default();
        let mut steps: Vec<EffectResult> = Vec::new();
        let mut produced: Vec<Digest> = Vec::new();

        let (registry, preflight) = self.preflight(plan, rctx, &mut verification, &mut witnesses)?;
        if let Some(registry) = &registry {
            ectx.operator_allowlist = Some(
                registry
                    .operator_ids()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            );
        }

        let denial = match preflight {
            Some(denial) => Some(denial),
            None => self.run_steps(
                plan,
                contract,
                registry.as_ref(),
                &mut ectx,
                &mut steps,
                &mut produced,
                &mut witnesses,
            )?,
        };

        let (status, stage, reasons) = match denial {
            None => (RunStatus::Completed, None, Vec::new()),
            Some(Denial { stage, reasons }) => (RunStatus::Denied, Some(stage), reasons),
        };
        let result_id = result_core_id(status, &reasons, &steps, &verification)?;

        let mut constraint_witnesses = Vec::new();
        let mut observer_reports = Vec::new();
        if let Some(stage) = stage {
            warn!(plan_id = %plan.plan_id, stage = %stage, reasons = ?reasons, "Run denied");
            let cw = ConstraintWitness::new(
                stage,
                reasons.iter().cloned(),
                produced.iter().cloned().chain([plan.plan_id.clone()]),
            );
            if observer_reports_enabled(rctx.observers.as_deref()) {
                observer_reports.push(ObserverReport::from_witness(&cw, rctx.emit_dual_proposal));
            }
            constraint_witnesses.push(cw);
        } else {
            info!(plan_id = %plan.plan_id, result_id = %result_id, "Run completed");
        }

        let mut complete = vec![result_id.clone(), plan.plan_id.clone()];
        complete.extend(constraint_witnesses.iter().map(|w| w.witness_id.clone()));
        witnesses.append(COMPLETE_STAGE, complete, ts);

        let result = RuntimeResult {
            result_id,
            status,
            reasons,
            steps,
            verification,
            witness_records: witnesses.into_records(),
            constraint_witnesses,
            observer_reports,
        };
        check_refusal_invariant(&result)?;

        self.sink.record_all(&result.witness_records)?;
        Ok(result)
    }

    /// Plan approval, integrity, operator registry and epoch anchor.
    fn preflight(
        &self,
        plan: &ExecutionPlan,
        rctx: &RuntimeContext,
        verification: &mut Verification,
        witnesses: &mut WitnessLog,
    ) -> Result<(Option<LoadedRegistry>, Option<Denial>), RuntimeFault> {
        if !plan.is_planned() {
            return Ok((None, Some(preflight_denial(vec!["plan not approved".into()]))));
        }

        let mut reasons = Vec::new();
        if !plan.verify_id() {
            reasons.push("plan integrity check failed: plan_id does not match contents".into());
        }
        if !plan.execution_token.verify_id() {
            reasons.push("execution token integrity check failed: token_id does not match policy".into());
        }

        let mut registry = None;
        if rctx.enforce_operator_registry {
            let referenced = plan
                .steps
                .iter()
                .filter_map(|s| s.requires.operator_id.as_deref());
            let (loaded, check) = match &self.registry {
                Some(source) => check_registry(source.as_ref(), referenced)?,
                None => check_registry(
                    &JsonRegistryLoader::new(rctx.registry_paths.iter().cloned()),
                    referenced,
                )?,
            };
            // Membership is enforced per step so earlier steps still run.
            reasons.extend(
                check
                    .errors
                    .iter()
                    .map(|e| format!("operator registry error: {e}")),
            );
            verification.operator_registry = Some(check);
            registry = Some(loaded);
        }

        if rctx.require_epoch_verification {
            let fallback = Ed25519EpochVerifier;
            let verifier: &dyn EpochVerifier = match &self.verifier {
                Some(v) => v.as_ref(),
                None => &fallback,
            };
            let check = check_epoch(
                verifier,
                rctx.epoch_anchor_path.as_deref(),
                rctx.epoch_root.as_deref(),
                rctx.commit_override.as_deref(),
            )?;
            reasons.extend(check.reasons());
            witnesses.append(EPOCH_STAGE, vec![digest_of(&check)?], &rctx.timestamp);
            verification.epoch = Some(check);
        }

        let denial = (!reasons.is_empty()).then(|| preflight_denial(reasons));
        Ok((registry, denial))
    }

    #[allow(clippy::too_many_arguments)]
    fn run_steps(
        &self,
        plan: &ExecutionPlan,
        contract: &dyn Contract,
        registry: Option<&LoadedRegistry>,
        ectx: &mut EffectContext,
        steps: &mut Vec<EffectResult>,
        produced: &mut Vec<Digest>,
        witnesses: &mut WitnessLog,
    ) -> Result<Option<Denial>, RuntimeFault> {
        for (index, step) in plan.steps.iter().enumerate() {
            ectx.step_index = index;
            let stage = step_stage(&step.step_id);
            debug!(step_id = %step.step_id, index, effect_type = %step.effect_type, "Evaluating step");

            let result = match self.admit(step, index, ectx, contract, registry) {
                Some(refused) => refused,
                None => {
                    let result = self.handlers.dispatch(step, ectx)?;
                    let post = contract.postconditions(step, ectx, &result);
                    if post.ok {
                        result
                    } else {
                        EffectResult::refused(
                            step,
                            "contract_postcondition_failed",
                            post.reasons,
                            result.artifact_digests,
                        )
                    }
                }
            };

            produced.extend(result.artifact_digests.iter().cloned());
            witnesses.append(stage.clone(), result.artifact_digests.clone(), &ectx.timestamp);
            let refused = !result.ok;
            let reasons = result.refusal_reasons.clone();
            steps.push(result);

            if refused {
                warn!(step_id = %step.step_id, index, reasons = ?reasons, "Step refused");
                return Ok(Some(Denial { stage, reasons }));
            }
            debug!(step_id = %step.step_id, "Step completed");
        }
        Ok(None)
    }

    /// Contract preconditions, then the token gates. Returns the refusal, if
    /// any.
    fn admit(
        &self,
        step: &EffectStep,
        index: usize,
        ectx: &EffectContext,
        contract: &dyn Contract,
        registry: Option<&LoadedRegistry>,
    ) -> Option<EffectResult> {
        let pre = contract.preconditions(step, ectx);
        if !pre.ok {
            return Some(EffectResult::refused(
                step,
                "contract_precondition_failed",
                pre.reasons,
                vec![],
            ));
        }

        let input = GateInput {
            step,
            index,
            ctx: ectx,
            registry,
        };
        self.gates.iter().find_map(|gate| match gate.evaluate(&input) {
            GateOutcome::Pass => None,
            GateOutcome::Refuse {
                refusal_type,
                reason,
            } => {
                debug!(gate = gate.name(), step_id = %step.step_id, %reason, "Gate refused step");
                Some(EffectResult::refused(step, refusal_type, vec![reason], vec![]))
            }
        })
    }
}

impl fmt::Debug for RuntimeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeEngine")
            .field("handlers", &self.handlers)
            .field(
                "gates",
                &self.gates.iter().map(|g| g.name()).collect::<Vec<_>>(),
            )
            .field("registry", &self.registry.is_some())
            .field("verifier", &self.verifier.is_some())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

fn preflight_denial(reasons: Vec<String>) -> Denial {
    Denial {
        stage: PREFLIGHT_STAGE.to_string(),
        reasons,
    }
}

/// A denied result must explain itself, and every refused step must carry
/// a type and at least one reason.
fn check_refusal_invariant(result: &RuntimeResult) -> Result<(), RuntimeFault> {
    if result.status == RunStatus::Denied {
        if result.reasons.is_empty() {
            return Err(RuntimeFault::RefusalInvariant(
                "denied result carries no reasons".into(),
            ));
        }
        if result.constraint_witnesses.is_empty() {
            return Err(RuntimeFault::RefusalInvariant(
                "denied result carries no constraint witness".into(),
            ));
        }
    }
    for step in result.steps.iter().filter(|s| !s.ok) {
        if step.refusal_type.is_none() || step.refusal_reasons.is_empty() {
            return Err(RuntimeFault::RefusalInvariant(format!(
                "refused step {} carries no refusal type or reasons",
                step.step_id
            )));
        }
    }
    Ok(())
}
