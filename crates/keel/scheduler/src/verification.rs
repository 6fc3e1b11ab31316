//! Registry and epoch checks shared by the planner and the runtime's
//! preflight. Findings are reasons; only unreadable inputs are faults.

use std::path::Path;

use keel_epoch::{load_anchor, EpochError, EpochVerifier};
use keel_registry::{LoadedRegistry, RegistryError, RegistrySource};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of checking referenced operators against a registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCheck {
    pub ok: bool,
    pub sources: Vec<String>,
    pub missing: Vec<String>,
    pub errors: Vec<String>,
}

impl RegistryCheck {
    pub fn evaluate<'a, I>(registry: &LoadedRegistry, referenced: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let missing = registry.missing(referenced);
        let errors = registry.errors.clone();
        Self {
            ok: missing.is_empty() && errors.is_empty(),
            sources: registry.sources.clone(),
            missing,
            errors,
        }
    }

    pub fn reasons(&self) -> Vec<String> {
        self.missing
            .iter()
            .map(|id| format!("operator not in registry: {id}"))
            .chain(
                self.errors
                    .iter()
                    .map(|e| format!("operator registry error: {e}")),
            )
            .collect()
    }
}

/// Load the registry and check `referenced` against it.
pub fn check_registry<'a, I>(
    source: &dyn RegistrySource,
    referenced: I,
) -> Result<(LoadedRegistry, RegistryCheck), RegistryError>
where
    I: IntoIterator<Item = &'a str>,
{
    let registry = source.load()?;
    let check = RegistryCheck::evaluate(&registry, referenced);
    if !check.ok {
        warn!(
            missing = check.missing.len(),
            errors = check.errors.len(),
            "Operator registry check failed"
        );
    }
    Ok((registry, check))
}

/// Outcome of epoch-anchor verification.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochCheck {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub errors: Vec<String>,
}

impl EpochCheck {
    pub fn reasons(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| format!("epoch verification failed: {e}"))
            .collect()
    }
}

/// Verify the anchor at `anchor_path`.
///
/// No configured path is a finding. A configured path that cannot be read
/// or parsed is a fault.
pub fn check_epoch(
    verifier: &dyn EpochVerifier,
    anchor_path: Option<&Path>,
    root: Option<&str>,
    commit_override: Option<&str>,
) -> Result<EpochCheck, EpochError> {
    let Some(path) = anchor_path else {
        warn!("Epoch verification required but no anchor path configured");
        return Ok(EpochCheck {
            ok: false,
            epoch_id: None,
            root: root.map(str::to_string),
            errors: vec!["epoch anchor path not configured".into()],
        });
    };
    let anchor = load_anchor(path)?;
    let verification = verifier.verify(&anchor, root, commit_override);
    debug!(epoch_id = %anchor.epoch_id, ok = verification.ok, "Epoch anchor verified");
    Ok(EpochCheck {
        ok: verification.ok,
        epoch_id: Some(anchor.epoch_id),
        root: Some(anchor.root),
        errors: verification.errors,
    })
}

/// Verification block attached to plans and results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_registry: Option<RegistryCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<EpochCheck>,
}
