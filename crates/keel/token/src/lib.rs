#![deny(unsafe_code)]
//! # keel-token
//!
//! The Execution Token: an immutable, content-addressed description of what
//! a plan may do at runtime.
//!
//! A token pins the permitted backends, the step budget, the determinism
//! mode, the IO and NET lane policies and the delta-S requirements for
//! irreversible steps. It is built once per plan by the scheduler and read,
//! never mutated, by the runtime engine.
//!
//! ## Key Types
//!
//! - [`ExecutionToken`]: the token itself (`build`, `from_value`, `verify_id`)
//! - [`TokenSpec`]: builder input with fail-closed defaults
//! - [`IoPolicy`] / [`NetPolicy`]: lane policies, viewed uniformly via [`LaneRules`]
//! - [`DeltaSPolicy`]: admissibility threshold for irreversible steps

mod coerce;
pub mod policy;
pub mod token;

pub use policy::{
    DeltaSMode, DeltaSPolicy, IoPolicy, Lane, LaneRules, NetPolicy, DEFAULT_LANE_MODE,
    DEFAULT_NONCE_POLICY, DEFAULT_REDACTION_POLICY_ID, DEFAULT_TIMEOUT_MS,
};
pub use token::{ExecutionToken, TokenSpec, DEFAULT_BUDGET_STEPS, DEFAULT_DETERMINISM_MODE};
