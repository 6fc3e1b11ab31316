use keel_canon::CanonError;
use keel_epoch::EpochError;
use keel_registry::RegistryError;
use thiserror::Error;

/// Defects raised while planning.
///
/// Policy failures never land here; they become plan `reasons`.
#[derive(Error, Debug)]
pub enum SchedulerFault {
    #[error("operator registry unavailable: {0}")]
    Registry(#[from] RegistryError),

    #[error("epoch anchor unavailable: {0}")]
    Epoch(#[from] EpochError),

    #[error(transparent)]
    Canon(#[from] CanonError),
}
