#![deny(unsafe_code)]
//! # keel-runtime
//!
//! Executes an [`keel_scheduler::ExecutionPlan`] under its execution token.
//!
//! ```text
//! START -> plan approval -> [operator registry] -> [epoch anchor] -> STEP LOOP -> COMPLETE | DENIED
//! ```
//!
//! Each step passes, in order: the caller's [`Contract`] preconditions, the
//! token gates (backend, budget, IO lane, NET lane, operator registry,
//! delta-S), its effect handler and the contract postconditions. The first
//! refusal halts the run. A denied run always carries reasons, a
//! [`keel_witness::ConstraintWitness`] and, unless observers are switched
//! off, an [`keel_witness::ObserverReport`].
//!
//! The engine holds no global state. Handlers, registry source, epoch
//! verifier, trace sink and live transport are all injected.
//!
//! ## Key Types
//!
//! - [`RuntimeEngine`] / [`RuntimeResult`]: the engine and its output
//! - [`RuntimeContext`]: explicit per-run inputs
//! - [`ExecutionContract`]: step allowlist and backend requirement
//! - [`KernelConfig`]: layered configuration; [`init_tracing`] for logging

pub mod config;
pub mod context;
pub mod contract;
pub mod engine;
pub mod error;
pub mod gates;
pub mod telemetry;

pub use config::{
    AdapterConfig, KernelConfig, RuntimeSection, TelemetryConfig, TraceConfig, ENV_PREFIX,
};
pub use context::RuntimeContext;
pub use contract::{default_postconditions, Contract, ContractCheck, ExecutionContract};
pub use engine::{
    step_stage, RunStatus, RuntimeEngine, RuntimeResult, COMPLETE_STAGE, PREFLIGHT_STAGE,
    START_STAGE,
};
pub use error::RuntimeFault;
pub use gates::{default_gates, GateInput, GateOutcome, StepGate};
pub use telemetry::init_tracing;
