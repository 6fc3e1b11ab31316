use keel_canon::CanonError;
use keel_effects::EffectError;
use keel_epoch::EpochError;
use keel_registry::RegistryError;
use keel_witness::WitnessError;
use thiserror::Error;

/// Defects raised while running a plan.
///
/// Denials are never faults; they come back as a `denied` result.
#[derive(Error, Debug)]
pub enum RuntimeFault {
    #[error("effect handler fault: {0}")]
    Effect(#[from] EffectError),

    #[error("operator registry unavailable: {0}")]
    Registry(#[from] RegistryError),

    #[error("epoch anchor unavailable: {0}")]
    Epoch(#[from] EpochError),

    #[error("witness fault: {0}")]
    Witness(#[from] WitnessError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("refusal invariant violated: {0}")]
    RefusalInvariant(String),

    #[error(transparent)]
    Canon(#[from] CanonError),
}
