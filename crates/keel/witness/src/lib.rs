#![deny(unsafe_code)]
//! # keel-witness
//!
//! Provenance and refusal evidence for the Keel kernel.
//!
//! Witness records are strictly observational. The observer identity
//! (`"papas"`) may observe, emit trace and emit attestations; it can never
//! authorize a collapse, define semantics or override an invariant. Nothing
//! in the planner or runtime reads a witness to make a decision.
//!
//! Refusals become data: a [`ConstraintWitness`] is the canonical digest of
//! why something was refused, and [`invert_constraints`] turns it into a
//! deterministic [`DualProposal`] naming what would have to be relaxed.
//!
//! ## Key Types
//!
//! - [`WitnessRecord`] / [`WitnessLog`]: append-only phase-transition records
//! - [`ObserverAuthority`]: what the observer may and may not do
//! - [`ConstraintWitness`] / [`DualProposal`]: refusal evidence and its inversion
//! - [`ObserverReport`]: observer-gated summary of a refusal
//! - [`TraceSink`]: where witness records are mirrored (file, memory, nowhere)

pub mod constraint;
pub mod error;
pub mod record;
pub mod report;
pub mod sink;

pub use constraint::{invert_constraints, ConstraintWitness, DualAction, DualProposal};
pub use error::WitnessError;
pub use record::{ObserverAction, ObserverAuthority, WitnessLog, WitnessRecord, OBSERVER_ID};
pub use report::{observer_reports_enabled, ObserverReport};
pub use sink::{JsonlFileSink, MemorySink, NullSink, TraceSink};
