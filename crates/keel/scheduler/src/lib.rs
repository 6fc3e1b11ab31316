#![deny(unsafe_code)]
//! # keel-scheduler
//!
//! Turns a [`ProgramIr`] and a [`SchedulerContext`] into an
//! [`ExecutionPlan`]: ordered effect steps, the execution token they run
//! under, verification findings and a status.
//!
//! Planning is a pure function of its inputs and the injected collaborators
//! (operator registry, epoch verifier). Identical inputs produce
//! byte-identical canonical plans.
//!
//! The token is always built first, so a denied plan still records the
//! policy it was judged against. Registry and epoch failures accumulate as
//! reasons; a plan with any reason is `denied` and carries a
//! [`keel_witness::ConstraintWitness`].
//!
//! ## Key Types
//!
//! - [`Scheduler`] / [`plan`]: the planner
//! - [`ExecutionPlan`]: its output, with `plan_id` over the witness-free core
//! - [`Track`]: fixed step templates selected by name
//! - [`Verification`]: registry and epoch findings, shared with the runtime

pub mod context;
pub mod error;
pub mod ir;
pub mod plan;
pub mod tracks;
pub mod verification;

pub use context::{SchedulerContext, DEFAULT_BACKEND, DEFAULT_BACKENDS};
pub use error::SchedulerFault;
pub use ir::{ProgramIr, SchedulerPolicy, Term};
pub use plan::{plan, ExecutionPlan, PlanStatus, Scheduler, EPOCH_STAGE, PLAN_STAGE};
pub use tracks::{broker_scope, feed_cap, Track, DEFAULT_PRICES};
pub use verification::{check_epoch, check_registry, EpochCheck, RegistryCheck, Verification};
