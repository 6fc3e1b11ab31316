use std::path::PathBuf;

use keel_canon::CanonError;

/// Faults raised while reading or producing an epoch anchor.
#[derive(Debug, thiserror::Error)]
pub enum EpochError {
    #[error("epoch anchor not readable: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("epoch anchor is malformed: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("canonical encoding failed: {0}")]
    Canon(#[from] CanonError),
}
