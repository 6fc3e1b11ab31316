use std::fmt;
use std::sync::Arc;

use keel_canon::{canonical_json, digest_of, CanonError, Digest};
use keel_effects::EffectStep;
use keel_epoch::{Ed25519EpochVerifier, EpochVerifier};
use keel_registry::{JsonRegistryLoader, RegistrySource};
use keel_token::ExecutionToken;
use keel_witness::{ConstraintWitness, WitnessLog, WitnessRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::SchedulerContext;
use crate::error::SchedulerFault;
use crate::ir::ProgramIr;
use crate::tracks::{legacy_steps, track_steps, Track, TrackInputs};
use crate::verification::{check_epoch, check_registry, Verification};

/// Stage name of the witness appended after planning.
pub const PLAN_STAGE: &str = "scheduler_plan";
/// Stage name of the epoch verification witness.
pub const EPOCH_STAGE: &str = "epoch_verification";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Planned,
    Denied,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStatus::Planned => f.write_str("planned"),
            PlanStatus::Denied => f.write_str("denied"),
        }
    }
}

/// Scheduler output.
///
/// `plan_id` covers everything except the witness records and constraint
/// witnesses, which are derived from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: Digest,
    pub program_id: String,
    pub status: PlanStatus,
    pub steps: Vec<EffectStep>,
    pub reasons: Vec<String>,
    pub verification: Verification,
    pub execution_token: ExecutionToken,
    pub witness_records: Vec<WitnessRecord>,
    #[serde(default)]
    pub constraint_witnesses: Vec<ConstraintWitness>,
}

#[derive(Serialize)]
struct PlanCore<'a> {
    program_id: &'a str,
    status: PlanStatus,
    steps: &'a [EffectStep],
    reasons: &'a [String],
    verification: &'a Verification,
    execution_token: &'a ExecutionToken,
}

fn plan_core_id(
    program_id: &str,
    status: PlanStatus,
    steps: &[EffectStep],
    reasons: &[String],
    verification: &Verification,
    execution_token: &ExecutionToken,
) -> Result<Digest, CanonError> {
    digest_of(&PlanCore {
        program_id,
        status,
        steps,
        reasons,
        verification,
        execution_token,
    })
}

impl ExecutionPlan {
    pub fn is_planned(&self) -> bool {
        self.status == PlanStatus::Planned
    }

    pub fn to_canonical_json(&self) -> Result<String, CanonError> {
        canonical_json(self)
    }

    /// Recompute `plan_id` from the plan's contents.
    pub fn verify_id(&self) -> bool {
        plan_core_id(
            &self.program_id,
            self.status,
            &self.steps,
            &self.reasons,
            &self.verification,
            &self.execution_token,
        )
        .is_ok_and(|id| id == self.plan_id)
    }
}

/// Deterministic planner with injectable collaborators.
///
/// Without an injected registry source the context's `registry_paths` are
/// loaded as JSON registries; without an injected verifier anchors are
/// checked as Ed25519 signatures.
#[derive(Clone, Default)]
pub struct Scheduler {
    registry: Option<Arc<dyn RegistrySource>>,
    verifier: Option<Arc<dyn EpochVerifier>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, source: Arc<dyn RegistrySource>) -> Self {
        self.registry = Some(source);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn EpochVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Plan `ir` under `ctx`.
    ///
    /// Policy failures are collected into `reasons`; only unreadable or
    /// unserialisable inputs return `Err`.
    pub fn plan(
        &self,
        ir: &ProgramIr,
        ctx: &SchedulerContext,
    ) -> Result<ExecutionPlan, SchedulerFault> {
        let token = ExecutionToken::build(ctx.token_spec());
        let program_id = ir.resolve_program_id()?;
        let mut reasons = Vec::new();
        let mut verification = Verification::default();
        let mut witnesses = WitnessLog::new();

        if ctx.enforce_operator_registry {
            let (_, check) = match &self.registry {
                Some(source) => check_registry(source.as_ref(), ir.referenced_operators())?,
                None => check_registry(
                    &JsonRegistryLoader::new(ctx.registry_paths.iter().cloned()),
                    ir.referenced_operators(),
                )?,
            };
            reasons.extend(check.reasons());
            verification.operator_registry = Some(check);
        }

        if ctx.require_epoch_verification {
            let fallback = Ed25519EpochVerifier;
            let verifier: &dyn EpochVerifier = match &self.verifier {
                Some(v) => v.as_ref(),
                None => &fallback,
            };
            let check = check_epoch(
                verifier,
                ctx.epoch_anchor_path.as_deref(),
                ctx.epoch_root.as_deref(),
                ctx.commit_override.as_deref(),
            )?;
            reasons.extend(check.reasons());
            witnesses.append(EPOCH_STAGE, vec![digest_of(&check)?], &ctx.timestamp);
            verification.epoch = Some(check);
        }

        let backend = ctx.resolve_backend(ir);
        let inputs = TrackInputs {
            ir,
            program_id: &program_id,
            allowed_backends: &token.allowed_backends,
            backend: &backend,
            anchor_path: ctx.epoch_anchor_path.as_deref(),
            fixture_path: ctx.fixture_path.as_deref(),
        };
        let steps = match ctx.resolve_track(ir) {
            Some(name) => track_steps(Track::resolve(name), &inputs),
            None => legacy_steps(&inputs),
        };

        let status = if reasons.is_empty() {
            PlanStatus::Planned
        } else {
            PlanStatus::Denied
        };
        let plan_id = plan_core_id(
            &program_id,
            status,
            &steps,
            &reasons,
            &verification,
            &token,
        )?;
        witnesses.append(
            PLAN_STAGE,
            vec![plan_id.clone(), token.token_id.clone()],
            &ctx.timestamp,
        );

        let constraint_witnesses = match status {
            PlanStatus::Planned => {
                info!(plan_id = %plan_id, steps = steps.len(), "Plan approved");
                Vec::new()
            }
            PlanStatus::Denied => {
                warn!(plan_id = %plan_id, reasons = ?reasons, "Plan denied");
                vec![ConstraintWitness::new(
                    PLAN_STAGE,
                    reasons.iter().cloned(),
                    [plan_id.clone()],
                )]
            }
        };

        Ok(ExecutionPlan {
            plan_id,
            program_id,
            status,
            steps,
            reasons,
            verification,
            execution_token: token,
            witness_records: witnesses.into_records(),
            constraint_witnesses,
        })
    }
}

/// Plan with default collaborators.
pub fn plan(ir: &ProgramIr, ctx: &SchedulerContext) -> Result<ExecutionPlan, SchedulerFault> {
    Scheduler::new().plan(ir, ctx)
}
