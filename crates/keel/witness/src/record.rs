use std::fmt;

use keel_canon::{digest_value, Digest};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::WitnessError;

/// The only observer identity the kernel emits witnesses under.
pub const OBSERVER_ID: &str = "papas";

/// Actions an observer might attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObserverAction {
    Observe,
    EmitTrace,
    EmitAttestation,
    AuthorizeCollapse,
    DefineSemantics,
    OverrideInvariant,
}

impl fmt::Display for ObserverAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Observe => "observe",
            Self::EmitTrace => "emit_trace",
            Self::EmitAttestation => "emit_attestation",
            Self::AuthorizeCollapse => "authorize_collapse",
            Self::DefineSemantics => "define_semantics",
            Self::OverrideInvariant => "override_invariant",
        };
        f.write_str(s)
    }
}

/// Fixed authority table for the observer.
///
/// The barred actions are not configurable.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObserverAuthority;

impl ObserverAuthority {
    pub fn permits(&self, action: ObserverAction) -> bool {
        matches!(
            action,
            ObserverAction::Observe | ObserverAction::EmitTrace | ObserverAction::EmitAttestation
        )
    }

    pub fn check(&self, action: ObserverAction) -> Result<(), WitnessError> {
        if self.permits(action) {
            Ok(())
        } else {
            Err(WitnessError::AuthorityViolation {
                observer: OBSERVER_ID.to_string(),
                action: action.to_string(),
            })
        }
    }
}

/// One observational record of a phase transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessRecord {
    pub observer_id: String,
    pub stage: String,
    pub artifact_digests: Vec<Digest>,
    pub timestamp: String,
    pub attestation: Digest,
}

impl WitnessRecord {
    /// Build a record; the attestation is the digest of every other field.
    pub fn new(stage: impl Into<String>, artifact_digests: Vec<Digest>, timestamp: &str) -> Self {
        let stage = stage.into();
        let attestation = attest(OBSERVER_ID, &stage, &artifact_digests, timestamp);
        Self {
            observer_id: OBSERVER_ID.to_string(),
            stage,
            artifact_digests,
            timestamp: timestamp.to_string(),
            attestation,
        }
    }

    pub fn verify_attestation(&self) -> bool {
        self.attestation
            == attest(
                &self.observer_id,
                &self.stage,
                &self.artifact_digests,
                &self.timestamp,
            )
    }
}

fn attest(observer_id: &str, stage: &str, digests: &[Digest], timestamp: &str) -> Digest {
    digest_value(&json!({
        "observer_id": observer_id,
        "stage": stage,
        "artifact_digests": digests,
        "timestamp": timestamp,
    }))
}

/// Append-only list of witness records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WitnessLog {
    records: Vec<WitnessRecord>,
}

impl WitnessLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record for `stage` and return a reference to it.
    pub fn append(
        &mut self,
        stage: impl Into<String>,
        artifact_digests: Vec<Digest>,
        timestamp: &str,
    ) -> &WitnessRecord {
        let record = WitnessRecord::new(stage, artifact_digests, timestamp);
        tracing::trace!(stage = %record.stage, attestation = %record.attestation, "Witness appended");
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[WitnessRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stages(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.stage.as_str()).collect()
    }

    pub fn into_records(self) -> Vec<WitnessRecord> {
        self.records
    }
}
